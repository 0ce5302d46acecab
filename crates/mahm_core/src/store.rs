//! Slot único com o snapshot mais recente.
//!
//! Um produtor (o poller) e vários leitores (handlers HTTP). Nenhum lado
//! espera pelo outro:
//! - [`SnapshotStore::try_publish`] desiste do ciclo se houver leitura ou
//!   outra publicação em andamento;
//! - [`SnapshotStore::try_read`] devolve [`Unavailable::Contended`] se uma
//!   publicação estiver em andamento.
//!
//! O snapshot publicado é imutável e compartilhado via `Arc`, então o lock
//! só é segurado durante a troca/clonagem do ponteiro.

use crate::types::Snapshot;
use std::sync::{Arc, RwLock, TryLockError};
use tracing::debug;

/// Motivo de uma leitura sem dados. Diferente de "zero sensores".
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Unavailable {
    #[error("Nenhum snapshot publicado ainda")]
    NotReady,

    #[error("Publicação em andamento")]
    Contended,
}

/// Armazena o snapshot atual.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    slot: RwLock<Option<Arc<Snapshot>>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tenta instalar `snapshot` como atual. `false` mantém o anterior.
    ///
    /// O snapshot substituído é liberado depois de soltar o lock.
    pub fn try_publish(&self, snapshot: Snapshot) -> bool {
        let snapshot = Some(Arc::new(snapshot));
        let previous = match self.slot.try_write() {
            Ok(mut guard) => std::mem::replace(&mut *guard, snapshot),
            Err(TryLockError::Poisoned(e)) => std::mem::replace(&mut *e.into_inner(), snapshot),
            Err(TryLockError::WouldBlock) => {
                debug!("Store ocupado, publicação descartada");
                return false;
            }
        };
        drop(previous);
        true
    }

    /// Tenta obter o snapshot atual sem esperar.
    pub fn try_read(&self) -> Result<Arc<Snapshot>, Unavailable> {
        let current = match self.slot.try_read() {
            Ok(guard) => guard.clone(),
            Err(TryLockError::Poisoned(e)) => e.into_inner().clone(),
            Err(TryLockError::WouldBlock) => return Err(Unavailable::Contended),
        };
        current.ok_or(Unavailable::NotReady)
    }

    /// Segura o slot como leitor, simulando um handler HTTP lento.
    #[cfg(test)]
    pub(crate) fn slot_read_guard_for_tests(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, Option<Arc<Snapshot>>> {
        self.slot.read().unwrap_or_else(|e| e.into_inner())
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
