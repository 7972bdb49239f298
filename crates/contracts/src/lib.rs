//! # Contracts
//!
//! Frozen interface contracts shared by every crate in the workspace.
//! Business crates may only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Byte model
//! - A destination receives plain byte slices, one call per chunk
//! - Destinations are shared (`Arc`), identity is the allocation, not the content

mod config;
mod error;
mod sink;

pub use config::*;
pub use error::*;
pub use sink::*;
