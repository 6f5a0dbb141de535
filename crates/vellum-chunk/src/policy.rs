//! Piece sizing and split-mode policy.

use vellum_core::{FilePath, MAX_DOC_SIZE_BIN};

/// Extensions whose content splits well at text delimiters.
const TEXT_SPLITTABLE_EXTENSIONS: [&str; 4] = ["md", "markdown", "txt", "canvas"];

/// Computes the piece size ceiling in bytes.
///
/// `custom_chunk_size` scales the base ceiling; the legacy format applies the
/// multiplier at full weight, the current format at one tenth.
pub fn piece_size(custom_chunk_size: u32, v1: bool) -> usize {
    let weight = if v1 { 1.0 } else { 0.1 };
    let factor = f64::from(custom_chunk_size) * weight + 1.0;
    (MAX_DOC_SIZE_BIN as f64 * factor).floor() as usize
}

/// Returns true when the path should be split at natural text delimiters.
pub fn is_plain_splittable(path: &FilePath) -> bool {
    match path.extension() {
        Some(ext) => {
            let ext = ext.to_ascii_lowercase();
            TEXT_SPLITTABLE_EXTENSIONS.iter().any(|e| *e == ext)
        }
        None => false,
    }
}
