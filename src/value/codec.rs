//! NaN-boxed value cells
//!
//! Every value crosses the boundary as one little-endian 8-byte cell:
//!
//! | cell | meaning |
//! |------|---------|
//! | `0x00000000_00000000` | `undefined` |
//! | `(0x7FF80000 \| flag) << 32 \| id` | reference `id` in the [`RefTable`] |
//! | anything else | an IEEE-754 double |
//!
//! Quiet NaNs never occur as plain numbers: NaN itself is reference 0 and
//! `+0.0` is reference 1 so that it cannot be mistaken for `undefined`. The
//! flag carries the JavaScript `typeof` class the guest runtime switches on.

use super::table::RefTable;
use super::Value;
use crate::error::{Error, Result};
use crate::memory::Memory;

/// High word shared by every boxed cell
pub const NAN_HEAD: u32 = 0x7FF8_0000;
/// Bits of the high word that carry the type flag
pub const TYPE_FLAG_MASK: u32 = 0x7;

pub const TYPE_FLAG_OBJECT: u32 = 0;
pub const TYPE_FLAG_STRING: u32 = 1;
/// Reserved by the guest runtime; never produced here
pub const TYPE_FLAG_SYMBOL: u32 = 2;
pub const TYPE_FLAG_FUNCTION: u32 = 3;

/// The `undefined` cell
pub const UNDEFINED_CELL: u64 = 0;

fn type_flag(value: &Value) -> u32 {
    match value {
        Value::String(_) => TYPE_FLAG_STRING,
        Value::Function(_) => TYPE_FLAG_FUNCTION,
        _ => TYPE_FLAG_OBJECT,
    }
}

/// Boxed cell for reference `id`
pub fn boxed(id: u32, flag: u32) -> u64 {
    (u64::from(NAN_HEAD | flag) << 32) | u64::from(id)
}

/// Encode `value` into a cell, allocating a reference id when needed
pub fn encode(table: &mut RefTable, value: &Value) -> Result<u64> {
    match value {
        Value::Undefined => Ok(UNDEFINED_CELL),
        Value::Number(n) if !n.is_nan() && n.to_bits() != 0 => Ok(n.to_bits()),
        _ => {
            let id = table.id_for(value)?;
            Ok(boxed(id, type_flag(value)))
        }
    }
}

/// Decode a cell written by the guest
pub fn decode(table: &RefTable, cell: u64) -> Result<Value> {
    if cell == UNDEFINED_CELL {
        return Ok(Value::Undefined);
    }
    let head = (cell >> 32) as u32;
    if head & NAN_HEAD != NAN_HEAD {
        return Ok(Value::Number(f64::from_bits(cell)));
    }
    if head & !TYPE_FLAG_MASK != NAN_HEAD {
        return Err(Error::abi(format!("malformed value cell {:#018x}", cell)));
    }

    let id = cell as u32;
    let flag = head & TYPE_FLAG_MASK;
    let value = table.value_for(id)?;
    if type_flag(&value) != flag {
        return Err(Error::abi(format!(
            "reference {} is a {} but the cell is tagged {}",
            id,
            value.kind(),
            flag
        )));
    }
    Ok(value)
}

/// Encode `value` and write it at `addr`
pub fn store_value(mem: &mut Memory<'_>, table: &mut RefTable, addr: u64, value: &Value) -> Result<()> {
    let cell = encode(table, value)?;
    mem.set_u64(addr, cell)
}

/// Read and decode the cell at `addr`
pub fn load_value(mem: &Memory<'_>, table: &RefTable, addr: u64) -> Result<Value> {
    decode(table, mem.get_u64(addr)?)
}

/// Decode the guest value slice whose header sits at `addr`
pub fn load_values(mem: &Memory<'_>, table: &RefTable, addr: u64) -> Result<Vec<Value>> {
    mem.load_cells(addr)?
        .into_iter()
        .map(|cell| decode(table, cell))
        .collect()
}
