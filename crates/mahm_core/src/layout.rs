//! Layout binário da shared memory `MAHMSharedMemory` (MSI Afterburner).
//!
//! ```text
//! ┌───────────────────────────┬──────────┬──────────┬─────┬──────────────┐
//! │ Header (header_size)      │ Entry 0  │ Entry 1  │ ... │ Entry N-1    │
//! └───────────────────────────┴──────────┴──────────┴─────┴──────────────┘
//!                               ← entry_size →
//! ```
//!
//! Header (little-endian):
//!
//! | offset | campo             | tipo |
//! |--------|-------------------|------|
//! | 0      | signature ("MAHM")| u32  |
//! | 4      | version           | u32  |
//! | 8      | header_size       | u32  |
//! | 12     | entry_count       | u32  |
//! | 16     | entry_size        | u32  |
//! | 20     | time              | i32  |
//! | 24     | gpu_entry_count   | u32  |
//! | 28     | gpu_entry_size    | u32  |
//!
//! Toda leitura é feita com bounds check sobre o slice mapeado. Memória
//! corrompida ou no meio de uma escrita vira um [`Snapshot`] vazio, nunca
//! um panic.

use crate::types::{Category, SensorReading, Snapshot, SnapshotBuilder};
use tracing::debug;

/// Assinatura `'MAHM'` lida como u32 little-endian.
pub const MAHM_SIGNATURE: u32 = 0x4D41_484D;

/// Tamanho do header v2.0 (com os campos de GPU).
pub const HEADER_LEN: usize = 32;

/// Header mínimo aceito (versões sem os campos de GPU).
pub const MIN_HEADER_LEN: usize = 24;

/// Largura fixa dos buffers de texto (`MAX_PATH`).
pub const STRING_LEN: usize = 260;

/// Bytes de cada registro efetivamente lidos (até `src_id` inclusive).
pub const MIN_ENTRY_LEN: usize = 1324;

/// Magnitude a partir da qual o valor é o sentinela "sem dados".
pub const INVALID_VALUE_THRESHOLD: f32 = 3.4e38;

// Offsets dentro de um registro
const OFF_SRC_NAME: usize = 0;
const OFF_SRC_UNITS: usize = OFF_SRC_NAME + STRING_LEN;
const OFF_LOCAL_NAME: usize = OFF_SRC_UNITS + STRING_LEN;
const OFF_LOCAL_UNITS: usize = OFF_LOCAL_NAME + STRING_LEN;
const OFF_FORMAT: usize = OFF_LOCAL_UNITS + STRING_LEN;
const OFF_DATA: usize = OFF_FORMAT + STRING_LEN;
const OFF_MIN: usize = OFF_DATA + 4;
const OFF_MAX: usize = OFF_MIN + 4;
const OFF_FLAGS: usize = OFF_MAX + 4;
const OFF_GPU_INDEX: usize = OFF_FLAGS + 4;
const OFF_SRC_ID: usize = OFF_GPU_INDEX + 4;

/// Erros de decodificação. Nenhum deles é fatal para o poller.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Região muito curta ({0} bytes, mínimo {MIN_HEADER_LEN})")]
    TooShort(usize),

    #[error("Assinatura inválida: 0x{0:08X} (esperado 0x{MAHM_SIGNATURE:08X})")]
    InvalidSignature(u32),

    #[error("header_size inválido: {0} (mínimo {MIN_HEADER_LEN})")]
    HeaderTooSmall(u32),

    #[error("entry_size inválido: {0} (mínimo {MIN_ENTRY_LEN})")]
    EntryTooSmall(u32),

    #[error("Array de registros fora da região: precisa {needed} bytes, mapeados {available}")]
    OutOfBounds { needed: u64, available: usize },
}

// ──────────────────────────────────────────────
// Header
// ──────────────────────────────────────────────

/// Header decodificado da região.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawHeader {
    pub signature: u32,
    pub version: u32,
    pub header_size: u32,
    pub entry_count: u32,
    pub entry_size: u32,
    /// Timestamp do Afterburner (não usado no snapshot)
    pub time: i32,
    pub gpu_entry_count: u32,
    pub gpu_entry_size: u32,
}

impl RawHeader {
    /// Lê e valida o header, incluindo os limites do array de registros.
    pub fn parse(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < MIN_HEADER_LEN {
            return Err(DecodeError::TooShort(bytes.len()));
        }

        let signature = read_u32(bytes, 0).unwrap_or(0);
        if signature != MAHM_SIGNATURE {
            return Err(DecodeError::InvalidSignature(signature));
        }

        let header_size = read_u32(bytes, 8).unwrap_or(0);
        if (header_size as usize) < MIN_HEADER_LEN {
            return Err(DecodeError::HeaderTooSmall(header_size));
        }

        let header = RawHeader {
            signature,
            version: read_u32(bytes, 4).unwrap_or(0),
            header_size,
            entry_count: read_u32(bytes, 12).unwrap_or(0),
            entry_size: read_u32(bytes, 16).unwrap_or(0),
            time: read_u32(bytes, 20).unwrap_or(0) as i32,
            // Campos de GPU só existem a partir do header de 32 bytes
            gpu_entry_count: if header_size as usize >= HEADER_LEN {
                read_u32(bytes, 24).unwrap_or(0)
            } else {
                0
            },
            gpu_entry_size: if header_size as usize >= HEADER_LEN {
                read_u32(bytes, 28).unwrap_or(0)
            } else {
                0
            },
        };

        if header.entry_count > 0 && (header.entry_size as usize) < MIN_ENTRY_LEN {
            return Err(DecodeError::EntryTooSmall(header.entry_size));
        }

        let needed = header.header_size as u64 + header.entry_count as u64 * header.entry_size as u64;
        if needed > bytes.len() as u64 {
            return Err(DecodeError::OutOfBounds {
                needed,
                available: bytes.len(),
            });
        }

        Ok(header)
    }

    /// Offset do registro `index`, se ele couber inteiro em `len` bytes.
    fn entry_range(&self, index: u32, len: usize) -> Option<std::ops::Range<usize>> {
        let start = (self.header_size as usize)
            .checked_add((index as usize).checked_mul(self.entry_size as usize)?)?;
        let end = start.checked_add(self.entry_size as usize)?;
        (end <= len).then_some(start..end)
    }
}

// ──────────────────────────────────────────────
// Registro
// ──────────────────────────────────────────────

/// Um slot do array de registros.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub src_name: String,
    pub src_units: String,
    pub local_name: String,
    pub local_units: String,
    pub format: String,
    pub data: f32,
    pub min: f32,
    pub max: f32,
    pub flags: u32,
    pub gpu_index: u32,
    pub src_id: u32,
}

impl RawRecord {
    /// Decodifica um registro. `entry` precisa ter pelo menos [`MIN_ENTRY_LEN`] bytes.
    pub fn parse(entry: &[u8]) -> Option<Self> {
        if entry.len() < MIN_ENTRY_LEN {
            return None;
        }

        Some(RawRecord {
            src_name: read_cstr(&entry[OFF_SRC_NAME..OFF_SRC_NAME + STRING_LEN]),
            src_units: read_cstr(&entry[OFF_SRC_UNITS..OFF_SRC_UNITS + STRING_LEN]),
            local_name: read_cstr(&entry[OFF_LOCAL_NAME..OFF_LOCAL_NAME + STRING_LEN]),
            local_units: read_cstr(&entry[OFF_LOCAL_UNITS..OFF_LOCAL_UNITS + STRING_LEN]),
            format: read_cstr(&entry[OFF_FORMAT..OFF_FORMAT + STRING_LEN]),
            data: read_f32(entry, OFF_DATA)?,
            min: read_f32(entry, OFF_MIN)?,
            max: read_f32(entry, OFF_MAX)?,
            flags: read_u32(entry, OFF_FLAGS)?,
            gpu_index: read_u32(entry, OFF_GPU_INDEX)?,
            src_id: read_u32(entry, OFF_SRC_ID)?,
        })
    }

    /// Valor utilizável, ou `None` para o sentinela/NaN.
    pub fn value(&self) -> Option<f32> {
        sanitize_value(self.data)
    }

    /// Converte em leitura categorizada, carimbada com o momento da captura.
    pub fn into_reading(self, timestamp: i64) -> SensorReading {
        let value = self.value();
        SensorReading {
            category: Category::classify(&self.src_name),
            name: self.src_name,
            value,
            unit: self.src_units,
            gpu_index: self.gpu_index,
            timestamp,
        }
    }
}

/// Aplica a regra do sentinela: `|v| >= 3.4e38` (ou NaN) → sem dados.
pub fn sanitize_value(value: f32) -> Option<f32> {
    if value.is_nan() || value >= INVALID_VALUE_THRESHOLD || value <= -INVALID_VALUE_THRESHOLD {
        None
    } else {
        Some(value)
    }
}

// ──────────────────────────────────────────────
// Decodificação completa
// ──────────────────────────────────────────────

/// Decodifica a região inteira em registros crus.
pub fn parse_records(bytes: &[u8]) -> Result<(RawHeader, Vec<RawRecord>), DecodeError> {
    let header = RawHeader::parse(bytes)?;

    let mut records = Vec::with_capacity(header.entry_count.min(1024) as usize);
    for i in 0..header.entry_count {
        let Some(range) = header.entry_range(i, bytes.len()) else {
            break;
        };
        if let Some(record) = RawRecord::parse(&bytes[range]) {
            records.push(record);
        }
    }

    Ok((header, records))
}

/// Decodifica a região em um [`Snapshot`] categorizado.
///
/// Header inválido ou fora dos limites resulta em snapshot vazio.
pub fn decode(bytes: &[u8], captured_at: i64) -> Snapshot {
    match try_decode(bytes, captured_at) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            debug!("Shared memory ignorada: {e}");
            Snapshot::empty(captured_at)
        }
    }
}

/// Como [`decode`], mas expõe o motivo da falha.
pub fn try_decode(bytes: &[u8], captured_at: i64) -> Result<Snapshot, DecodeError> {
    let (_, records) = parse_records(bytes)?;
    let mut builder = SnapshotBuilder::new(captured_at);
    for record in records {
        builder.push(record.into_reading(captured_at));
    }
    Ok(builder.build())
}

// ──────────────────────────────────────────────
// Helpers de leitura
// ──────────────────────────────────────────────

fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    let raw: [u8; 4] = bytes.get(offset..offset.checked_add(4)?)?.try_into().ok()?;
    Some(u32::from_le_bytes(raw))
}

fn read_f32(bytes: &[u8], offset: usize) -> Option<f32> {
    read_u32(bytes, offset).map(f32::from_bits)
}

/// Texto até o primeiro NUL, ou o buffer inteiro se não houver terminador.
fn read_cstr(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
