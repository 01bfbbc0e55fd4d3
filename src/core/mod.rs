//! Core propagation logic: values, paths, descriptors, the cascade engine and its actions.

pub mod actions;
pub mod engine;
pub mod error;
pub mod list;
pub mod parser;
pub mod path;
pub mod placement;
pub mod resolver;
pub mod runtime;
pub mod style;
pub mod theme;
pub mod types;
