use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::storage::layout::{INDEX_RECORD_LEN, is_valid_object_name};
use crate::store::{CorruptColumnSnafu, InvalidColumnSpecSnafu, StoreResult};

/// Cursor-local column handle returned by `add_column`.
pub type ColumnId = u32;

/// Persisted description of one column (`col/<NAME>/desc.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDesc {
    /// Column name.
    pub name: String,
    /// Declared type name.
    pub type_name: String,
    /// Width of one element in bits.
    pub elem_bits: u32,
    /// Id of the first row.
    pub first_row: i64,
}

/// A parsed `NAME` or `(type)NAME` column spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    /// Requested type, if the spec carried one.
    pub type_name: Option<String>,
    /// Column name.
    pub name: String,
}

impl ColumnSpec {
    /// Parse a column spec.
    pub fn parse(spec: &str) -> StoreResult<Self> {
        let spec = spec.trim();
        let (type_name, name) = match spec.strip_prefix('(') {
            Some(rest) => {
                let (ty, name) = rest
                    .split_once(')')
                    .context(InvalidColumnSpecSnafu { spec })?;
                let ty = ty.trim();
                ensure!(!ty.is_empty(), InvalidColumnSpecSnafu { spec });
                (Some(ty.to_string()), name.trim())
            }
            None => (None, spec),
        };
        ensure!(is_valid_object_name(name), InvalidColumnSpecSnafu { spec });
        Ok(ColumnSpec {
            type_name,
            name: name.to_string(),
        })
    }

    /// Spec with an explicit type.
    pub fn typed(type_name: impl Into<String>, name: impl Into<String>) -> String {
        format!("({}){}", type_name.into(), name.into())
    }
}

/// One row's entry in the column index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct IndexRecord {
    /// Bit position of the cell's first element within `data`.
    pub bit_offset: u64,
    /// Number of elements in the cell.
    pub count: u32,
}

impl IndexRecord {
    pub(crate) fn encode(&self) -> [u8; INDEX_RECORD_LEN] {
        let mut out = [0u8; INDEX_RECORD_LEN];
        out[..8].copy_from_slice(&self.bit_offset.to_le_bytes());
        out[8..].copy_from_slice(&self.count.to_le_bytes());
        out
    }

    pub(crate) fn decode_all(column: &str, bytes: &[u8]) -> StoreResult<Vec<IndexRecord>> {
        ensure!(
            bytes.len() % INDEX_RECORD_LEN == 0,
            CorruptColumnSnafu {
                column,
                msg: format!(
                    "index length {} is not a multiple of {INDEX_RECORD_LEN}",
                    bytes.len()
                ),
            }
        );
        Ok(bytes
            .chunks_exact(INDEX_RECORD_LEN)
            .map(|rec| {
                let mut off = [0u8; 8];
                let mut cnt = [0u8; 4];
                off.copy_from_slice(&rec[..8]);
                cnt.copy_from_slice(&rec[8..]);
                IndexRecord {
                    bit_offset: u64::from_le_bytes(off),
                    count: u32::from_le_bytes(cnt),
                }
            })
            .collect())
    }
}

/// A borrowed view of one cell.
///
/// `data` starts at the byte holding the first element; `bit_offset` is the
/// position of that element within the byte (0 for byte-aligned cells).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellData<'a> {
    /// Payload bytes covering the cell.
    pub data: &'a [u8],
    /// Width of one element in bits.
    pub elem_bits: u32,
    /// Bit position of the first element within `data[0]`.
    pub bit_offset: u32,
    /// Number of elements.
    pub count: u32,
}

impl<'a> CellData<'a> {
    /// The cell as whole bytes.
    ///
    /// Only meaningful for byte-aligned cells of byte-multiple elements;
    /// callers check [`CellData::is_byte_aligned`] first.
    pub fn bytes(&self) -> &'a [u8] {
        let len = (self.count as usize) * (self.elem_bits as usize / 8);
        &self.data[..len.min(self.data.len())]
    }

    /// True when the cell starts on a byte boundary and every element is a
    /// whole number of bytes.
    pub fn is_byte_aligned(&self) -> bool {
        self.bit_offset == 0 && self.elem_bits % 8 == 0
    }
}

/// Slice the cell described by `rec` out of `data`.
pub(crate) fn cell_slice<'a>(
    column: &str,
    elem_bits: u32,
    rec: IndexRecord,
    data: &'a [u8],
) -> StoreResult<CellData<'a>> {
    let runs_past = || CorruptColumnSnafu {
        column,
        msg: format!(
            "cell at bit {} with {} elements runs past {} data bytes",
            rec.bit_offset,
            rec.count,
            data.len()
        ),
    };
    let total_bits = u64::from(rec.count)
        .checked_mul(u64::from(elem_bits))
        .and_then(|bits| bits.checked_add(rec.bit_offset))
        .with_context(&runs_past)?;
    let start = usize::try_from(rec.bit_offset / 8).ok().with_context(&runs_past)?;
    let end = usize::try_from(total_bits.div_ceil(8)).ok().with_context(&runs_past)?;
    ensure!(start <= end && end <= data.len(), runs_past());
    Ok(CellData {
        data: &data[start..end],
        elem_bits,
        bit_offset: (rec.bit_offset % 8) as u32,
        count: rec.count,
    })
}
