//! weft: reactive dependency propagation for compiled UI pages.
//!
//! A compiled page ships a variable table whose entries carry dependency
//! descriptors. Writing a variable runs a cascade that updates content,
//! visibility and styles on a render surface, regenerates list templates,
//! and re-parents conditionally placed nodes.

pub mod cli;
pub mod core;
pub mod surface;
