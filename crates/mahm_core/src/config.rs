//! Configuração unificada via TOML.
//!
//! Um único `config.toml` ao lado do executável. Campos ausentes usam o padrão.

use crate::region::MAHM_SHARED_MEMORY;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Configuração da leitura da shared memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Nome da região publicada pelo Afterburner
    pub shm_name: String,
    /// Intervalo entre leituras em segundos
    pub interval_secs: f64,
    /// Diretório das regiões nomeadas (ignorado no Windows)
    pub shm_dir: String,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            shm_name: MAHM_SHARED_MEMORY.into(),
            interval_secs: 1.0,
            shm_dir: "/dev/shm".into(),
        }
    }
}

/// Faixa aceita para `interval_secs`.
pub const INTERVAL_RANGE_SECS: std::ops::RangeInclusive<f64> = 0.1..=60.0;

impl PollerConfig {
    /// Intervalo entre leituras, sempre dentro de [`INTERVAL_RANGE_SECS`].
    ///
    /// NaN/infinito usam o padrão de 1s.
    pub fn interval(&self) -> Duration {
        let secs = if self.interval_secs.is_finite() {
            self.interval_secs
                .clamp(*INTERVAL_RANGE_SECS.start(), *INTERVAL_RANGE_SECS.end())
        } else {
            PollerConfig::default().interval_secs
        };
        Duration::from_secs_f64(secs)
    }
}

/// Configuração do servidor HTTP.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// IP local para bind
    pub bind_ip: String,
    /// Porta TCP
    pub port: u16,
    /// Valor de `Access-Control-Allow-Origin`
    pub allow_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_ip: "0.0.0.0".into(),
            port: 8080,
            allow_origin: "*".into(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_ip, self.port)
    }
}

/// Controle de instância única.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    /// Encerra processos anteriores do mesmo executável na inicialização
    pub kill_existing: bool,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            kill_existing: true,
        }
    }
}

/// Configuração raiz do aplicativo.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub poller: PollerConfig,
    pub server: ServerConfig,
    pub instance: InstanceConfig,
}

impl AppConfig {
    /// Carrega configuração de um arquivo TOML.
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match toml::from_str::<AppConfig>(&content) {
                    Ok(config) => {
                        info!("Configuração carregada de {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        warn!("Erro ao parsear {}: {}", path.display(), e);
                    }
                },
                Err(e) => {
                    warn!("Erro ao ler {}: {}", path.display(), e);
                }
            }
        }

        info!("Usando configuração padrão");
        AppConfig::default()
    }

    /// Carrega e substitui campos inválidos pelo valor padrão.
    pub fn load_validated(path: &Path) -> Self {
        Self::load(path).sanitized()
    }

    /// Troca cada campo que falha em [`validate`](Self::validate) pelo padrão.
    pub fn sanitized(mut self) -> Self {
        for e in self.validate() {
            warn!("Config: {e} – usando valor padrão");
        }

        let defaults = AppConfig::default();
        if self.server.port == 0 {
            self.server.port = defaults.server.port;
        }
        if !INTERVAL_RANGE_SECS.contains(&self.poller.interval_secs) {
            self.poller.interval_secs = defaults.poller.interval_secs;
        }
        if self.poller.shm_name.trim().is_empty() {
            self.poller.shm_name = defaults.poller.shm_name;
        }
        self
    }

    /// Salva configuração em arquivo TOML.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let content = toml::to_string_pretty(self).map_err(|e| e.to_string())?;
        std::fs::write(path, content).map_err(|e| e.to_string())?;
        info!("Configuração salva em {}", path.display());
        Ok(())
    }

    /// Retorna o caminho padrão do config.toml.
    pub fn default_path() -> PathBuf {
        let exe_dir = std::env::current_exe()
            .map(|p| p.parent().unwrap_or(Path::new(".")).to_path_buf())
            .unwrap_or_else(|_| PathBuf::from("."));
        exe_dir.join("config.toml")
    }

    /// Valida a configuração e retorna lista de erros.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push("Porta do servidor não pode ser 0".into());
        }
        if !INTERVAL_RANGE_SECS.contains(&self.poller.interval_secs) {
            errors.push(format!(
                "Intervalo do poller inválido: {} (0.1–60.0)",
                self.poller.interval_secs
            ));
        }
        if self.poller.shm_name.trim().is_empty() {
            errors.push("Nome da shared memory não pode ser vazio".into());
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        let errors = config.validate();
        assert!(errors.is_empty(), "Erros: {:?}", errors);
        assert_eq!(config.poller.shm_name, "MAHMSharedMemory");
        assert_eq!(config.poller.interval(), Duration::from_secs(1));
        assert_eq!(config.server.bind_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.server.port, parsed.server.port);
        assert_eq!(config.poller.shm_name, parsed.poller.shm_name);
        assert_eq!(config.instance.kill_existing, parsed.instance.kill_existing);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let partial = r#"
[server]
port = 9999
"#;
        let config: AppConfig = toml::from_str(partial).unwrap();
        assert_eq!(config.server.port, 9999);
        // Outros campos devem ter valor padrão
        assert_eq!(config.server.allow_origin, "*");
        assert_eq!(config.poller.interval_secs, 1.0);
        assert!(config.instance.kill_existing);
    }

    #[test]
    fn invalid_values_are_reported() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        config.poller.interval_secs = 0.0;
        config.poller.shm_name = "  ".into();
        assert_eq!(config.validate().len(), 3);
    }

    #[test]
    fn load_falls_back_on_missing_or_broken_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        assert_eq!(AppConfig::load(&path).server.port, 8080);

        std::fs::write(&path, "[server\nport = ").unwrap();
        assert_eq!(AppConfig::load(&path).server.port, 8080);
    }

    #[test]
    fn negative_interval_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[poller]\ninterval_secs = -1.0\n").unwrap();

        let raw = AppConfig::load(&path);
        assert_eq!(raw.validate().len(), 1);
        // Mesmo sem sanitizar, interval() não pode entrar em panic
        assert_eq!(raw.poller.interval(), Duration::from_millis(100));

        let config = AppConfig::load_validated(&path);
        assert!(config.validate().is_empty());
        assert_eq!(config.poller.interval_secs, 1.0);
        assert_eq!(config.poller.interval(), Duration::from_secs(1));
    }

    #[test]
    fn interval_is_always_bounded() {
        let mut poller = PollerConfig::default();
        for (secs, expected) in [
            (0.0, Duration::from_millis(100)),
            (-5.0, Duration::from_millis(100)),
            (f64::NAN, Duration::from_secs(1)),
            (f64::INFINITY, Duration::from_secs(1)),
            (3600.0, Duration::from_secs(60)),
            (2.5, Duration::from_millis(2500)),
        ] {
            poller.interval_secs = secs;
            assert_eq!(poller.interval(), expected, "interval_secs = {secs}");
        }
    }

    #[test]
    fn sanitized_resets_only_invalid_fields() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        config.server.bind_ip = "127.0.0.1".into();
        config.poller.interval_secs = 0.0;
        config.poller.shm_name = String::new();

        let config = config.sanitized();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.bind_ip, "127.0.0.1");
        assert_eq!(config.poller.interval_secs, 1.0);
        assert_eq!(config.poller.shm_name, "MAHMSharedMemory");
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = AppConfig::default();
        config.server.port = 8181;
        config.instance.kill_existing = false;
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path);
        assert_eq!(loaded.server.port, 8181);
        assert!(!loaded.instance.kill_existing);
    }
}
