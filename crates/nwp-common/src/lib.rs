//! Common types and utilities shared across the NWP ingestion crates.

pub mod bbox;
pub mod error;
pub mod grid;

pub use bbox::BoundingBox;
pub use error::{NwpError, NwpResult};
pub use grid::{Dimension, GridField};
