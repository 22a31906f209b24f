//! graphwire-core: Shared types, configuration, and error handling for the graphwire driver.
//!
//! This crate provides the foundational types used by every backend:
//! - The property value domain (scalars and homogeneous arrays)
//! - Relationship traversal direction and result wrapping options
//! - Connection configuration
//! - The driver error taxonomy

pub mod config;
pub mod error;
pub mod types;

pub use config::{Backend, ConnectionConfig};
pub use error::{GraphError, Result};
pub use types::{ConstraintKind, Direction, PropertyArray, PropertyMap, PropertyValue, WrapLevel};
