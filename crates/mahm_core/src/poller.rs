//! Poller – lê a shared memory em intervalo fixo e publica no [`SnapshotStore`].
//!
//! Roda numa thread própria (`shm-poller`). A cada tick: mapeia a região,
//! decodifica, libera o mapeamento e tenta publicar. Publicação recusada por
//! contenção é ignorada e o ritmo segue igual.

use crate::layout;
use crate::region::{RegionError, SharedRegion};
use crate::store::SnapshotStore;
use crate::types::Snapshot;
use crossbeam_channel::{Receiver, Sender, bounded, select, tick};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

// ──────────────────────────────────────────────
// Fonte de telemetria
// ──────────────────────────────────────────────

/// Produz um snapshot completo por ciclo.
pub trait TelemetrySource: Send + 'static {
    /// Lê os sensores atuais. Falhas viram snapshot vazio.
    fn sample(&mut self, captured_at: i64) -> Snapshot;
}

impl<F> TelemetrySource for F
where
    F: FnMut(i64) -> Snapshot + Send + 'static,
{
    fn sample(&mut self, captured_at: i64) -> Snapshot {
        self(captured_at)
    }
}

/// Fonte real: a região nomeada do Afterburner.
#[derive(Debug, Clone)]
pub struct SharedMemorySource {
    name: String,
    #[cfg(not(windows))]
    dir: std::path::PathBuf,
    /// Evita repetir o log de "região ausente" a cada segundo
    was_available: Option<bool>,
}

impl SharedMemorySource {
    #[cfg(windows)]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            was_available: None,
        }
    }

    #[cfg(not(windows))]
    pub fn new(name: impl Into<String>) -> Self {
        Self::in_dir(crate::region::DEFAULT_SHM_DIR, name)
    }

    /// Região `name` dentro de `dir` (sistemas sem shared memory nomeada do Windows).
    #[cfg(not(windows))]
    pub fn in_dir(dir: impl Into<std::path::PathBuf>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dir: dir.into(),
            was_available: None,
        }
    }

    fn open(&self) -> Result<SharedRegion, RegionError> {
        #[cfg(windows)]
        {
            SharedRegion::open(&self.name)
        }
        #[cfg(not(windows))]
        {
            SharedRegion::open_in(&self.dir, &self.name)
        }
    }

    fn note_availability(&mut self, available: bool) {
        if self.was_available != Some(available) {
            if available {
                info!("✓ Shared memory '{}' disponível", self.name);
            } else {
                info!("✗ Shared memory '{}' indisponível – aguardando Afterburner", self.name);
            }
            self.was_available = Some(available);
        }
    }
}

impl TelemetrySource for SharedMemorySource {
    fn sample(&mut self, captured_at: i64) -> Snapshot {
        let mut region = match self.open() {
            Ok(region) => region,
            Err(e) => {
                self.note_availability(false);
                match e {
                    RegionError::NotFound(_) => debug!("{e}"),
                    _ => warn!("{e}"),
                }
                return Snapshot::empty(captured_at);
            }
        };
        self.note_availability(true);

        let snapshot = layout::decode(region.view(), captured_at);
        region.close();
        snapshot
    }
}

// ──────────────────────────────────────────────
// Estado
// ──────────────────────────────────────────────

/// Estado do poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Ticking,
    Stopped,
}

impl PollerState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => PollerState::Idle,
            1 => PollerState::Ticking,
            _ => PollerState::Stopped,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PollerState::Idle => "idle",
            PollerState::Ticking => "ticking",
            PollerState::Stopped => "stopped",
        }
    }
}

/// Estado compartilhado entre a thread do poller e quem consulta.
#[derive(Debug, Clone, Default)]
pub struct StateCell(Arc<AtomicU8>);

impl StateCell {
    pub fn get(&self) -> PollerState {
        PollerState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: PollerState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

// ──────────────────────────────────────────────
// Poller
// ──────────────────────────────────────────────

/// Segundos desde a epoch.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Handle da thread do poller. `stop()` (ou o `Drop`) encerra e aguarda a thread.
#[derive(Debug)]
pub struct PollerHandle {
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
    state: StateCell,
}

impl PollerHandle {
    pub fn state(&self) -> PollerState {
        self.state.get()
    }

    /// Cópia do estado para consultas de outras threads.
    pub fn state_cell(&self) -> StateCell {
        self.state.clone()
    }

    /// Sinaliza a parada e espera o tick em andamento terminar.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.try_send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Thread do poller terminou com panic");
            }
            self.state.set(PollerState::Stopped);
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Menor intervalo aceito pelo poller. Um ticker de zero giraria sem parar.
pub const MIN_INTERVAL: Duration = Duration::from_millis(5);

/// Inicia o poller numa thread dedicada.
///
/// Intervalos abaixo de [`MIN_INTERVAL`] são elevados até ele.
pub fn spawn<S: TelemetrySource>(
    source: S,
    store: Arc<SnapshotStore>,
    interval: Duration,
) -> std::io::Result<PollerHandle> {
    if interval < MIN_INTERVAL {
        warn!(
            "Intervalo do poller {:?} abaixo do mínimo, usando {:?}",
            interval, MIN_INTERVAL
        );
    }
    let interval = interval.max(MIN_INTERVAL);
    let (stop_tx, stop_rx) = bounded::<()>(1);
    let state = StateCell::default();

    let thread_state = state.clone();
    let thread = std::thread::Builder::new()
        .name("shm-poller".into())
        .spawn(move || {
            poll_loop(source, &store, interval, &stop_rx, &thread_state);
        })?;

    Ok(PollerHandle {
        stop_tx: Some(stop_tx),
        thread: Some(thread),
        state,
    })
}

fn poll_loop<S: TelemetrySource>(
    mut source: S,
    store: &SnapshotStore,
    interval: Duration,
    stop_rx: &Receiver<()>,
    state: &StateCell,
) {
    info!("Poller iniciado (intervalo {:.1}s)", interval.as_secs_f64());
    state.set(PollerState::Ticking);

    // Primeira leitura imediata, depois no ritmo do ticker
    run_tick(&mut source, store);

    let ticker = tick(interval);
    loop {
        select! {
            recv(stop_rx) -> _ => break,
            recv(ticker) -> _ => {
                // Parada pendente tem prioridade sobre um tick acumulado
                if !stop_rx.is_empty() {
                    break;
                }
                run_tick(&mut source, store);
            }
        }
    }

    state.set(PollerState::Stopped);
    info!("Poller encerrado");
}

fn run_tick<S: TelemetrySource>(source: &mut S, store: &SnapshotStore) {
    let snapshot = source.sample(unix_now());
    let count = snapshot.all().len();
    if store.try_publish(snapshot) {
        debug!("Snapshot publicado ({count} sensores)");
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
