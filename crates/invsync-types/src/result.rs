//! Result type alias for InvSync operations

use crate::Error;

/// Result type alias for InvSync operations
pub type Result<T> = std::result::Result<T, Error>;
