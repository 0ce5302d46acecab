//! # MAHM Core
//!
//! Leitura da shared memory `MAHMSharedMemory` do MSI Afterburner e
//! publicação de um snapshot categorizado, legível sem bloqueio.
//!
//! ## Módulos
//! - [`region`] – Mapeamento somente-leitura da região nomeada
//! - [`layout`] – Header/registros binários e decodificação em [`Snapshot`]
//! - [`types`] – Leituras, categorias e snapshot
//! - [`store`] – Slot único com publicação/leitura sem espera
//! - [`poller`] – Thread que lê a região em intervalo fixo
//! - [`config`] – Configuração unificada via TOML

pub mod config;
pub mod layout;
pub mod poller;
pub mod region;
pub mod store;
pub mod types;

// Re-exports convenientes
pub use config::AppConfig;
pub use layout::{DecodeError, decode};
pub use poller::{PollerHandle, PollerState, SharedMemorySource, TelemetrySource};
pub use region::{MAHM_SHARED_MEMORY, RegionError, SharedRegion};
pub use store::{SnapshotStore, Unavailable};
pub use types::{Category, MAX_READINGS, SensorReading, Snapshot};
