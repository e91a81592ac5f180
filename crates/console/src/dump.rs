//! Hex Dump Formatting
//!
//! Formats multi-read output and accepted data pages: offset-labelled
//! rows, ` xNN` per byte, zeroed cells shown as `  - `.

/// Bytes rendered per dump row
pub const DUMP_COLUMNS: usize = 0x20;

/// Render a byte sequence as dump rows
pub fn hex_dump(bytes: &[u8], columns: usize) -> Vec<String> {
    if bytes.is_empty() || columns == 0 {
        return Vec::new();
    }

    let mut lines = Vec::with_capacity(bytes.len().div_ceil(columns));
    for (row, chunk) in bytes.chunks(columns).enumerate() {
        let mut line = format!("  {:04X}:", row * columns);
        for byte in chunk {
            if *byte == 0 {
                line.push_str("  - ");
            } else {
                line.push_str(&format!(" x{byte:02X}"));
            }
        }
        lines.push(line);
    }
    lines
}
