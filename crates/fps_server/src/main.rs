//! # FPS Monitor
//!
//! Lê a telemetria que o MSI Afterburner publica na shared memory
//! `MAHMSharedMemory` e a expõe como JSON via HTTP, para Home Assistant e
//! outros clientes que fazem polling.
//!
//! ## Rotas
//! - `/fps`, `/gpu`, `/cpu`, `/memory`, `/all` – leituras por categoria
//! - `/status` – snapshot completo com contadores
//! - `/debug/memory` – diagnóstico do processo
//!
//! `Ctrl+C` encerra o servidor e o poller.

mod http;
mod instance;

use http::AppState;
use mahm_core::config::AppConfig;
use mahm_core::poller::{self, SharedMemorySource};
use mahm_core::store::SnapshotStore;
use std::sync::Arc;
use tracing::{error, info, warn};

fn main() {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── Carregar config ──
    let config_path = AppConfig::default_path();
    let config = AppConfig::load_validated(&config_path);

    // Salva config padrão se não existir
    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }

    // ── Instância única ──
    if config.instance.kill_existing {
        instance::kill_existing_instances();
    }

    // ── Poller ──
    let store = Arc::new(SnapshotStore::new());
    let source = shared_memory_source(&config);
    let interval = config.poller.interval();

    let mut poller = match poller::spawn(source, Arc::clone(&store), interval) {
        Ok(handle) => handle,
        Err(e) => {
            error!("Falha ao criar thread do poller: {e}");
            std::process::exit(1);
        }
    };

    // ── Banner ──
    println!();
    println!("══════════════════════════════════════════════");
    println!("   ⚡ FPS MONITOR – ATIVO (Rust)");
    println!("══════════════════════════════════════════════");
    println!("  Região:    {}", config.poller.shm_name);
    println!("  Intervalo: {:.1}s", interval.as_secs_f64());
    println!("  HTTP:      {}", config.server.bind_addr());
    println!("══════════════════════════════════════════════");
    println!();

    // ── Servidor HTTP ──
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!("Falha ao criar runtime tokio: {e}");
            poller.stop();
            std::process::exit(1);
        }
    };

    let state = AppState::new(
        Arc::clone(&store),
        poller.state_cell(),
        &config.server.allow_origin,
    );
    let result = runtime.block_on(http::serve(&config.server, state, shutdown_signal()));

    // Nenhuma publicação depois daqui
    poller.stop();

    match result {
        Ok(()) => info!("Encerrado"),
        Err(e) => {
            error!("Servidor HTTP em {}: {e}", config.server.bind_addr());
            std::process::exit(1);
        }
    }
}

#[cfg(windows)]
fn shared_memory_source(config: &AppConfig) -> SharedMemorySource {
    SharedMemorySource::new(config.poller.shm_name.clone())
}

#[cfg(not(windows))]
fn shared_memory_source(config: &AppConfig) -> SharedMemorySource {
    SharedMemorySource::in_dir(&config.poller.shm_dir, config.poller.shm_name.clone())
}

/// Completa no primeiro Ctrl+C.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Ctrl+C recebido, encerrando..."),
        Err(e) => {
            error!("Falha ao instalar handler de Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    }
}
