//! Android debug bridge sync channel for devmirror
//!
//! This crate implements the remote channel contracts of `devmirror-types`
//! on top of a running debug bridge server:
//!
//! - **Protocol**: smart-socket requests and the file-sync framing
//!   (`LIST`, `LIS2`, `RECV`, `QUIT`), generic over any async byte stream
//! - **Connection**: TCP connection, device feature query and transport
//!   selection
//! - **Channel**: [`AdbSyncChannel`] sessions and the [`AdbChannelProvider`]
//!   opening them with a bounded setup time
//!
//! # Examples
//!
//! ```rust,no_run
//! use devmirror_adb::AdbChannelProvider;
//! use devmirror_types::{ChannelProvider, RemoteSyncChannel};
//!
//! # async fn example() -> devmirror_types::Result<()> {
//! let provider = AdbChannelProvider::new("127.0.0.1", 5037);
//! let mut channel = provider.open("emulator-5554").await?;
//! for entry in channel.list_directory("/sdcard").await? {
//!     println!("{}", entry.name);
//! }
//! channel.close().await?;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod channel;
pub mod connection;
pub mod protocol;

pub use channel::{AdbChannelProvider, AdbSyncChannel};
pub use connection::{ServerAddress, DEFAULT_CONNECT_TIMEOUT};
pub use protocol::{ListVersion, DEFAULT_PORT};
