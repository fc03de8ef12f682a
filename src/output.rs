//! JSON output for inventory results

use crate::error::{InventoryError, Result};
use serde::Serialize;
use std::io::Write;

/// Write `value` as compact JSON with no trailing newline
pub fn write_json<W: Write, T: Serialize + ?Sized>(writer: &mut W, value: &T) -> Result<()> {
    serde_json::to_writer(&mut *writer, value)
        .map_err(|e| InventoryError::Output(e.into()))?;
    writer.flush().map_err(InventoryError::Output)
}
