//! Definição de tipos para a telemetria lida da shared memory.
//!
//! Um [`Snapshot`] é construído inteiro a cada ciclo do poller e nunca é
//! alterado depois de publicado. Os subconjuntos por categoria são limitados
//! a [`MAX_READINGS`] entradas para manter as respostas HTTP pequenas.

use serde::{Deserialize, Serialize};

/// Máximo de leituras por subconjunto (fps, gpu, cpu, memory e all).
pub const MAX_READINGS: usize = 100;

// ──────────────────────────────────────────────
// Categoria
// ──────────────────────────────────────────────

/// Categoria grosseira de um sensor, derivada do nome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Fps,
    Gpu,
    Cpu,
    Memory,
    Other,
}

impl Category {
    /// Classifica um sensor pelo nome (substring, sem diferenciar maiúsculas).
    ///
    /// Apenas a primeira regra que casar vale:
    /// fps/framerate/frametime → gpu → cpu → memory/ram → other.
    pub fn classify(name: &str) -> Category {
        let nm = name.to_lowercase();

        if nm.contains("fps") || nm.contains("framerate") || nm.contains("frametime") {
            Category::Fps
        } else if nm.contains("gpu") {
            Category::Gpu
        } else if nm.contains("cpu") {
            Category::Cpu
        } else if nm.contains("memory") || nm.contains("ram") {
            Category::Memory
        } else {
            Category::Other
        }
    }

    /// Nome usado no JSON e nas rotas HTTP.
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Fps => "fps",
            Category::Gpu => "gpu",
            Category::Cpu => "cpu",
            Category::Memory => "memory",
            Category::Other => "other",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ──────────────────────────────────────────────
// Leitura de sensor
// ──────────────────────────────────────────────

/// Uma leitura decodificada de um registro da shared memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Nome do sensor (ex: "GPU temperature")
    pub name: String,
    /// Valor atual; `None` quando o Afterburner reporta o sentinela "sem dados"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f32>,
    /// Unidade (ex: "°C", "FPS")
    pub unit: String,
    /// Índice da GPU a que o sensor pertence
    pub gpu_index: u32,
    pub category: Category,
    /// Momento da captura do snapshot (segundos desde a epoch)
    pub timestamp: i64,
}

// ──────────────────────────────────────────────
// Snapshot
// ──────────────────────────────────────────────

/// Visão imutável e já categorizada de toda a telemetria de um ciclo.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    timestamp: i64,
    fps: Vec<SensorReading>,
    gpu: Vec<SensorReading>,
    cpu: Vec<SensorReading>,
    memory: Vec<SensorReading>,
    all: Vec<SensorReading>,
}

impl Snapshot {
    /// Snapshot sem nenhum sensor (região ausente ou inválida).
    pub fn empty(timestamp: i64) -> Self {
        Self {
            timestamp,
            ..Default::default()
        }
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn fps(&self) -> &[SensorReading] {
        &self.fps
    }

    pub fn gpu(&self) -> &[SensorReading] {
        &self.gpu
    }

    pub fn cpu(&self) -> &[SensorReading] {
        &self.cpu
    }

    pub fn memory(&self) -> &[SensorReading] {
        &self.memory
    }

    /// Todas as leituras, incluindo as de categoria `other`.
    pub fn all(&self) -> &[SensorReading] {
        &self.all
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }
}

/// Monta um [`Snapshot`] respeitando o limite de [`MAX_READINGS`] por lista.
#[derive(Debug)]
pub struct SnapshotBuilder {
    inner: Snapshot,
}

impl SnapshotBuilder {
    pub fn new(timestamp: i64) -> Self {
        Self {
            inner: Snapshot::empty(timestamp),
        }
    }

    pub fn timestamp(&self) -> i64 {
        self.inner.timestamp
    }

    /// Adiciona uma leitura em `all` e na lista da sua categoria.
    ///
    /// Cada lista tem seu próprio limite: uma categoria cheia descarta a
    /// leitura só naquela lista.
    pub fn push(&mut self, reading: SensorReading) {
        let list = match reading.category {
            Category::Fps => Some(&mut self.inner.fps),
            Category::Gpu => Some(&mut self.inner.gpu),
            Category::Cpu => Some(&mut self.inner.cpu),
            Category::Memory => Some(&mut self.inner.memory),
            Category::Other => None,
        };

        if let Some(list) = list {
            if list.len() < MAX_READINGS {
                list.push(reading.clone());
            }
        }

        if self.inner.all.len() < MAX_READINGS {
            self.inner.all.push(reading);
        }
    }

    pub fn build(self) -> Snapshot {
        self.inner
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
