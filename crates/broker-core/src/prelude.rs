//! Common prelude for the broker-core crate.
//!
//! Standard imports for consistent error handling and logging across the
//! module.

pub use anyhow::{Context, Result};
pub use thiserror::Error;
pub use tracing::{debug, info, warn};
