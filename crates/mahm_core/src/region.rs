//! Acesso somente-leitura à shared memory nomeada do Afterburner.
//!
//! - **Windows**: `OpenFileMappingW` + `MapViewOfFile`, tamanho da view via `VirtualQuery`.
//! - **Outros sistemas**: a região `<dir>/<nome>` (por padrão `/dev/shm`) mapeada com `memmap2`.
//!
//! Região ausente é o estado normal quando o Afterburner não está rodando:
//! [`SharedRegion::open`] devolve [`RegionError::NotFound`] e o chamador
//! trata igual a qualquer outra falha de decodificação.
//!
//! O mapeamento é liberado em [`SharedRegion::close`] (idempotente) ou no `Drop`.

use tracing::debug;

/// Nome padrão da região publicada pelo MSI Afterburner.
pub const MAHM_SHARED_MEMORY: &str = "MAHMSharedMemory";

/// Falhas ao abrir/mapear a região.
#[derive(Debug, thiserror::Error)]
pub enum RegionError {
    #[error("Região '{0}' não encontrada (Afterburner não está rodando?)")]
    NotFound(String),

    #[error("Falha ao mapear '{name}': {reason}")]
    MapFailed { name: String, reason: String },

    #[error("Região '{0}' mapeada com tamanho zero")]
    Empty(String),
}

// ──────────────────────────────────────────────
// Windows
// ──────────────────────────────────────────────

#[cfg(windows)]
mod imp {
    use super::RegionError;
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;
    use windows::Win32::Foundation::{CloseHandle, HANDLE};
    use windows::Win32::System::Memory::{
        FILE_MAP_READ, MEMORY_BASIC_INFORMATION, MEMORY_MAPPED_VIEW_ADDRESS, MapViewOfFile,
        OpenFileMappingW, UnmapViewOfFile, VirtualQuery,
    };
    use windows::core::PCWSTR;

    pub struct Mapping {
        handle: HANDLE,
        view: MEMORY_MAPPED_VIEW_ADDRESS,
        len: usize,
    }

    impl Mapping {
        pub fn open(name: &str) -> Result<Self, RegionError> {
            let wide: Vec<u16> = OsStr::new(name)
                .encode_wide()
                .chain(std::iter::once(0))
                .collect();

            let handle = unsafe { OpenFileMappingW(FILE_MAP_READ.0, false, PCWSTR(wide.as_ptr())) }
                .map_err(|_| RegionError::NotFound(name.to_string()))?;

            let view = unsafe { MapViewOfFile(handle, FILE_MAP_READ, 0, 0, 0) };
            if view.Value.is_null() {
                let reason = windows::core::Error::from_win32().message();
                unsafe {
                    let _ = CloseHandle(handle);
                }
                return Err(RegionError::MapFailed {
                    name: name.to_string(),
                    reason,
                });
            }

            // MapViewOfFile não informa o tamanho; VirtualQuery devolve a região reservada.
            let mut info = MEMORY_BASIC_INFORMATION::default();
            let written = unsafe {
                VirtualQuery(
                    Some(view.Value as *const _),
                    &mut info,
                    std::mem::size_of::<MEMORY_BASIC_INFORMATION>(),
                )
            };
            let len = if written == 0 { 0 } else { info.RegionSize };

            let mapping = Mapping { handle, view, len };
            if len == 0 {
                return Err(RegionError::Empty(name.to_string()));
            }
            Ok(mapping)
        }

        pub fn bytes(&self) -> &[u8] {
            unsafe { std::slice::from_raw_parts(self.view.Value as *const u8, self.len) }
        }
    }

    impl Drop for Mapping {
        fn drop(&mut self) {
            unsafe {
                let _ = UnmapViewOfFile(self.view);
                let _ = CloseHandle(self.handle);
            }
        }
    }
}

// ──────────────────────────────────────────────
// Linux / outros (memmap2)
// ──────────────────────────────────────────────

#[cfg(not(windows))]
mod imp {
    use super::RegionError;
    use std::fs::File;
    use std::io::ErrorKind;
    use std::path::Path;

    pub struct Mapping {
        mmap: memmap2::Mmap,
    }

    impl Mapping {
        pub fn open_in(dir: &Path, name: &str) -> Result<Self, RegionError> {
            let path = dir.join(name);
            let file = File::open(&path).map_err(|e| match e.kind() {
                ErrorKind::NotFound => RegionError::NotFound(name.to_string()),
                _ => RegionError::MapFailed {
                    name: name.to_string(),
                    reason: e.to_string(),
                },
            })?;

            let len = file.metadata().map(|m| m.len()).unwrap_or(0);
            if len == 0 {
                return Err(RegionError::Empty(name.to_string()));
            }

            // Outro processo pode escrever na região enquanto ela está mapeada;
            // a leitura é sempre feita com bounds check sobre o slice.
            let mmap = unsafe { memmap2::Mmap::map(&file) }.map_err(|e| RegionError::MapFailed {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

            Ok(Mapping { mmap })
        }

        pub fn bytes(&self) -> &[u8] {
            &self.mmap
        }
    }
}

// ──────────────────────────────────────────────
// API pública
// ──────────────────────────────────────────────

/// Diretório que contém as regiões nomeadas fora do Windows.
#[cfg(not(windows))]
pub const DEFAULT_SHM_DIR: &str = "/dev/shm";

/// Região nomeada mapeada somente-leitura.
pub struct SharedRegion {
    name: String,
    mapping: Option<imp::Mapping>,
}

impl SharedRegion {
    /// Abre e mapeia a região pelo nome.
    #[cfg(windows)]
    pub fn open(name: &str) -> Result<Self, RegionError> {
        let mapping = imp::Mapping::open(name)?;
        debug!("Região '{name}' mapeada ({} bytes)", mapping.bytes().len());
        Ok(Self {
            name: name.to_string(),
            mapping: Some(mapping),
        })
    }

    /// Abre e mapeia a região pelo nome, em [`DEFAULT_SHM_DIR`].
    #[cfg(not(windows))]
    pub fn open(name: &str) -> Result<Self, RegionError> {
        Self::open_in(std::path::Path::new(DEFAULT_SHM_DIR), name)
    }

    /// Abre a região `name` dentro de `dir`.
    #[cfg(not(windows))]
    pub fn open_in(dir: &std::path::Path, name: &str) -> Result<Self, RegionError> {
        let mapping = imp::Mapping::open_in(dir, name)?;
        debug!("Região '{name}' mapeada ({} bytes)", mapping.bytes().len());
        Ok(Self {
            name: name.to_string(),
            mapping: Some(mapping),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bytes mapeados. Vazio depois de [`close`](Self::close).
    pub fn view(&self) -> &[u8] {
        self.mapping.as_ref().map(imp::Mapping::bytes).unwrap_or(&[])
    }

    pub fn is_open(&self) -> bool {
        self.mapping.is_some()
    }

    /// Libera o mapeamento. Chamadas repetidas não fazem nada.
    pub fn close(&mut self) {
        if self.mapping.take().is_some() {
            debug!("Região '{}' liberada", self.name);
        }
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for SharedRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRegion")
            .field("name", &self.name)
            .field("len", &self.view().len())
            .finish()
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
