//! Error types and handling for devmirror
//!
//! The taxonomy follows the propagation boundaries of a backup run: listing
//! failures abort one folder's scan, transfer and local I/O failures stay
//! attached to a single scan item, metadata failures during diffing are logged
//! and swallowed, and channel failures end one folder configuration.

use std::path::PathBuf;

/// Main error type for devmirror operations
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Failed to enumerate a remote directory
    #[error("Failed to list remote directory '{path}': {message}")]
    RemoteListing {
        /// Remote (POSIX) path that was being listed
        path: String,
        /// Error message from the channel
        message: String,
    },

    /// Failed while streaming a remote file
    #[error("Failed to pull remote file '{path}': {message}")]
    RemoteTransfer {
        /// Remote (POSIX) path that was being pulled
        path: String,
        /// Error message from the channel
        message: String,
    },

    /// Local filesystem operation failed (directory creation, write, timestamps)
    #[error("Local I/O error on '{path}': {message}")]
    LocalIo {
        /// Destination path involved
        path: PathBuf,
        /// Error message describing the failure
        message: String,
    },

    /// Local metadata query failed for a reason other than "not found"
    #[error("Failed to query metadata for '{path}': {message}")]
    MetadataQuery {
        /// Destination path that was queried
        path: PathBuf,
        /// Error message describing the failure
        message: String,
    },

    /// Opening a sync session for a device failed
    #[error("Failed to open sync channel for device '{device}': {message}")]
    ChannelOpen {
        /// Device identifier
        device: String,
        /// Error message describing the failure
        message: String,
    },

    /// The remote peer violated the wire protocol
    #[error("Protocol error: {message}")]
    Protocol {
        /// Error message describing the violation
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message describing the configuration issue
        message: String,
    },

    /// I/O operation failed outside of a specific destination entry
    #[error("I/O error: {message}")]
    Io {
        /// Error message from the I/O operation
        message: String,
    },

    /// Generic error with custom message
    #[error("{message}")]
    Other {
        /// Custom error message
        message: String,
    },
}

/// Error kind for categorizing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ErrorKind {
    /// Remote listing errors
    RemoteListing,
    /// Remote transfer errors
    RemoteTransfer,
    /// Local I/O errors
    LocalIo,
    /// Metadata query errors
    MetadataQuery,
    /// Channel acquisition errors
    ChannelOpen,
    /// Wire protocol errors
    Protocol,
    /// Configuration errors
    Config,
    /// Generic I/O errors
    Io,
    /// Other errors
    Other,
}

impl Error {
    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RemoteListing { .. } => ErrorKind::RemoteListing,
            Self::RemoteTransfer { .. } => ErrorKind::RemoteTransfer,
            Self::LocalIo { .. } => ErrorKind::LocalIo,
            Self::MetadataQuery { .. } => ErrorKind::MetadataQuery,
            Self::ChannelOpen { .. } => ErrorKind::ChannelOpen,
            Self::Protocol { .. } => ErrorKind::Protocol,
            Self::Config { .. } => ErrorKind::Config,
            Self::Io { .. } => ErrorKind::Io,
            Self::Other { .. } => ErrorKind::Other,
        }
    }

    /// Whether this error is confined to a single scan item.
    ///
    /// Item-local errors are recorded in a transfer outcome and never stop
    /// the processing of sibling items.
    pub fn is_item_local(&self) -> bool {
        matches!(
            self,
            Self::RemoteTransfer { .. } | Self::LocalIo { .. } | Self::MetadataQuery { .. }
        )
    }

    /// Create a new remote listing error
    pub fn remote_listing<P: Into<String>, S: ToString>(path: P, message: S) -> Self {
        Self::RemoteListing {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Create a new remote transfer error
    pub fn remote_transfer<P: Into<String>, S: ToString>(path: P, message: S) -> Self {
        Self::RemoteTransfer {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Create a new local I/O error
    pub fn local_io<P: Into<PathBuf>, S: ToString>(path: P, message: S) -> Self {
        Self::LocalIo {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Create a new metadata query error
    pub fn metadata_query<P: Into<PathBuf>, S: ToString>(path: P, message: S) -> Self {
        Self::MetadataQuery {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Create a new channel open error
    pub fn channel_open<D: Into<String>, S: ToString>(device: D, message: S) -> Self {
        Self::ChannelOpen {
            device: device.into(),
            message: message.to_string(),
        }
    }

    /// Create a new protocol error
    pub fn protocol<S: Into<String>>(message: S) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    proptest! {
        #[test]
        fn test_error_kind_consistency(message in ".*", path in "/[a-z/]{0,20}") {
            let errors = vec![
                Error::remote_listing(path.clone(), message.clone()),
                Error::remote_transfer(path.clone(), message.clone()),
                Error::local_io(path.clone(), message.clone()),
                Error::metadata_query(path.clone(), message.clone()),
                Error::channel_open("device", message.clone()),
                Error::protocol(message.clone()),
            ];

            for error in errors {
                match error {
                    Error::RemoteListing { .. } => prop_assert_eq!(error.kind(), ErrorKind::RemoteListing),
                    Error::RemoteTransfer { .. } => prop_assert_eq!(error.kind(), ErrorKind::RemoteTransfer),
                    Error::LocalIo { .. } => prop_assert_eq!(error.kind(), ErrorKind::LocalIo),
                    Error::MetadataQuery { .. } => prop_assert_eq!(error.kind(), ErrorKind::MetadataQuery),
                    Error::ChannelOpen { .. } => prop_assert_eq!(error.kind(), ErrorKind::ChannelOpen),
                    Error::Protocol { .. } => prop_assert_eq!(error.kind(), ErrorKind::Protocol),
                    _ => {}
                }
            }
        }
    }

    #[rstest]
    #[case(Error::remote_transfer("/sdcard/a.jpg", "closed"), true)]
    #[case(Error::local_io("/backup/a.jpg", "disk full"), true)]
    #[case(Error::metadata_query("/backup/a.jpg", "denied"), true)]
    #[case(Error::remote_listing("/sdcard", "gone"), false)]
    #[case(Error::channel_open("emulator-5554", "offline"), false)]
    #[case(Error::config("bad"), false)]
    fn test_item_local_classification(#[case] error: Error, #[case] expected: bool) {
        assert_eq!(error.is_item_local(), expected);
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "test file");
        let error = Error::from(io_error);

        assert_eq!(error.kind(), ErrorKind::Io);
        assert!(error.to_string().contains("test file"));
    }

    #[test]
    fn test_error_messages_name_the_path() {
        let error = Error::remote_listing("/sdcard/DCIM", "permission denied");
        assert_eq!(
            error.to_string(),
            "Failed to list remote directory '/sdcard/DCIM': permission denied"
        );

        let error = Error::channel_open("R58M123ABC", "device offline");
        assert!(error.to_string().contains("R58M123ABC"));
    }
}
