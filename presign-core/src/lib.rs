//! # PRESIGN Core
//!
//! Core types, errors, and traits for the PRESIGN batched signed-URL cache.
//!
//! This crate provides the foundational building blocks used by all other PRESIGN crates:
//!
//! - **Types**: Logical keys, resource paths, cache entries and status
//! - **Errors**: Resolution errors and the crate-wide error type
//! - **Constants**: Configuration defaults
//! - **Traits**: The batch resolver seam between the cache and the signing backend
//!
//! ## Example
//!
//! ```rust
//! use presign_core::{LogicalKey, ResourceDescriptor};
//!
//! let node = ResourceDescriptor::new("node-1", "media/node-1.png");
//! assert_eq!(node.key, LogicalKey::from("node-1"));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]

pub mod constants;
pub mod error;
pub mod traits;
pub mod types;

// Re-export commonly used items at crate root
pub use constants::*;
pub use error::{PresignError, ResolveError, Result};
pub use traits::*;
pub use types::*;
