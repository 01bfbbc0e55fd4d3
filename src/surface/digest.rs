//! BLAKE3 digest of a surface's observable state.
//!
//! Two surfaces with the same digest render the same tree: same targets,
//! content, display modes, styles and attributes, in the same order.

use super::memory::MemorySurface;

/// Hash a string. Returns `"blake3:{hex}"`.
pub fn hash_string(s: &str) -> String {
    format!("blake3:{}", blake3::hash(s.as_bytes()).to_hex())
}

/// Digest of the full tree below the root.
pub fn digest(surface: &MemorySurface) -> Result<String, String> {
    let json = serde_json::to_string(&surface.snapshot())
        .map_err(|e| format!("JSON serialize error: {}", e))?;
    Ok(hash_string(&json))
}
