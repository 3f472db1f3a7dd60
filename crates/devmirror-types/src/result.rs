//! Result type alias for devmirror operations

use crate::Error;

/// Result type alias for devmirror operations
pub type Result<T> = std::result::Result<T, Error>;
