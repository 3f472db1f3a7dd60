//! Wire format of the debug bridge server
//!
//! Two framings are spoken on the same socket. Host services use the
//! smart-socket framing: a request is its payload prefixed with the payload
//! length as four hex digits, and the reply starts with `OKAY` or with
//! `FAIL` followed by a hex-length-prefixed message. Once `sync:` has been
//! accepted the socket switches to the file-sync framing: a four byte id
//! followed by a little-endian `u32` and, depending on the id, a payload.
//!
//! Directory listings come in two flavours. `LIST` replies carry 32-bit
//! sizes and timestamps; devices advertising the `ls_v2` feature also accept
//! `LIS2`, whose `DNT2` records carry 64-bit ones.

use bytes::Bytes;
use devmirror_types::{Error, RemoteEntry, Result};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Default port of the debug bridge server
pub const DEFAULT_PORT: u16 = 5037;

/// Largest payload a smart-socket request can carry
pub const MAX_REQUEST_LENGTH: usize = 0xFFFF;

/// Largest `DATA` frame the server sends
pub const MAX_DATA_LENGTH: usize = 64 * 1024;

/// Largest remote path accepted in a sync request
pub const MAX_PATH_LENGTH: usize = 1024;

/// Successful status reply
pub const OKAY: [u8; 4] = *b"OKAY";
/// Failure status reply, or failure frame in sync mode
pub const FAIL: [u8; 4] = *b"FAIL";

/// Sync request: list a directory
pub const LIST: [u8; 4] = *b"LIST";
/// Sync request: list a directory with 64-bit sizes and timestamps
pub const LIS2: [u8; 4] = *b"LIS2";
/// Sync request: receive a file
pub const RECV: [u8; 4] = *b"RECV";
/// Sync request: end the sync session
pub const QUIT: [u8; 4] = *b"QUIT";
/// Sync reply: one directory entry
pub const DENT: [u8; 4] = *b"DENT";
/// Sync reply: one directory entry of a `LIS2` listing
pub const DNT2: [u8; 4] = *b"DNT2";
/// Sync reply: one chunk of file content
pub const DATA: [u8; 4] = *b"DATA";
/// Sync reply: end of a listing or of a file
pub const DONE: [u8; 4] = *b"DONE";

/// Device feature advertising `LIS2` support
pub const FEATURE_LS_V2: &str = "ls_v2";

const LIST_DONE_TRAILER: usize = 16;
const LIS2_DONE_TRAILER: usize = 72;

const S_IFMT: u32 = 0o170_000;
const S_IFDIR: u32 = 0o040_000;
const S_IFREG: u32 = 0o100_000;

/// Listing request spoken on a sync session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ListVersion {
    /// `LIST`; sizes of 4GB and more wrap around
    #[default]
    V1,
    /// `LIS2`
    V2,
}

impl ListVersion {
    /// Pick the listing request supported by a device with `features`
    pub fn from_features<'a, I>(features: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        if features.into_iter().any(|feature| feature == FEATURE_LS_V2) {
            Self::V2
        } else {
            Self::V1
        }
    }

    /// Request id of this listing flavour
    pub fn request_id(self) -> [u8; 4] {
        match self {
            Self::V1 => LIST,
            Self::V2 => LIS2,
        }
    }
}

/// One record of a `LIST` or `LIS2` reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListFrame {
    /// A directory entry with its raw stat fields
    Entry {
        /// Unix mode bits, zero when the device could not stat the entry
        mode: u32,
        /// Size in bytes
        size: u64,
        /// Modification time, Unix seconds
        mtime: i64,
        /// Entry name
        name: String,
    },
    /// A directory entry whose name is not valid UTF-8
    UndecodableName {
        /// Lossily decoded name, for logging
        name: String,
    },
    /// End of the listing
    Done,
    /// The server refused the listing
    Fail(String),
}

impl ListFrame {
    /// Convert an entry record into a [`RemoteEntry`].
    ///
    /// Returns `None` for `.` and `..` and for anything that is neither a
    /// regular file nor a directory.
    pub fn into_remote_entry(self) -> Option<RemoteEntry> {
        let Self::Entry {
            mode,
            size,
            mtime,
            name,
        } = self
        else {
            return None;
        };

        if name == "." || name == ".." {
            return None;
        }

        let modified = mtime_to_system_time(mtime);
        match mode & S_IFMT {
            S_IFDIR => Some(RemoteEntry::directory(name, modified)),
            S_IFREG => Some(RemoteEntry::file(name, size, modified)),
            _ => None,
        }
    }
}

/// One frame of a `RECV` reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataFrame {
    /// A chunk of file content
    Data(Bytes),
    /// End of the file
    Done,
    /// The server aborted the transfer
    Fail(String),
}

/// Encode a smart-socket request
pub fn encode_request(payload: &str) -> Result<Vec<u8>> {
    if payload.len() > MAX_REQUEST_LENGTH {
        return Err(Error::protocol(format!(
            "Request too long: {} bytes",
            payload.len()
        )));
    }

    let mut request = format!("{:04x}", payload.len()).into_bytes();
    request.extend_from_slice(payload.as_bytes());
    Ok(request)
}

/// Send a smart-socket request
pub async fn send_request<S>(stream: &mut S, payload: &str) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    let request = encode_request(payload)?;
    stream.write_all(&request).await?;
    stream.flush().await?;
    Ok(())
}

/// Read a smart-socket status reply.
///
/// The outer result carries I/O and framing errors, the inner one the
/// server's own refusal message.
pub async fn read_status<S>(stream: &mut S) -> Result<std::result::Result<(), String>>
where
    S: AsyncRead + Unpin,
{
    let mut status = [0u8; 4];
    stream.read_exact(&mut status).await?;

    match status {
        OKAY => Ok(Ok(())),
        FAIL => Ok(Err(read_hex_string(stream).await?)),
        other => Err(Error::protocol(format!(
            "Unexpected status {:?}",
            String::from_utf8_lossy(&other)
        ))),
    }
}

/// Read a smart-socket payload prefixed with its length in hex digits
pub async fn read_hex_string<S>(stream: &mut S) -> Result<String>
where
    S: AsyncRead + Unpin,
{
    let mut length = [0u8; 4];
    stream.read_exact(&mut length).await?;
    let length = parse_hex_length(&length)?;
    read_string(stream, length).await
}

/// Write a sync request carrying `path`
pub async fn write_sync_request<S>(stream: &mut S, id: [u8; 4], path: &str) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    if path.len() > MAX_PATH_LENGTH {
        return Err(Error::protocol(format!(
            "Remote path too long: {} bytes",
            path.len()
        )));
    }

    let mut request = Vec::with_capacity(8 + path.len());
    request.extend_from_slice(&id);
    request.extend_from_slice(&(path.len() as u32).to_le_bytes());
    request.extend_from_slice(path.as_bytes());
    stream.write_all(&request).await?;
    stream.flush().await?;
    Ok(())
}

/// Read one record of a listing reply of the given flavour
pub async fn read_list_frame<S>(stream: &mut S, version: ListVersion) -> Result<ListFrame>
where
    S: AsyncRead + Unpin,
{
    let mut id = [0u8; 4];
    stream.read_exact(&mut id).await?;

    match (id, version) {
        (DENT, ListVersion::V1) => {
            let mode = stream.read_u32_le().await?;
            let size = stream.read_u32_le().await?;
            let mtime = stream.read_u32_le().await?;
            read_entry(stream, mode, u64::from(size), i64::from(mtime)).await
        }
        (DNT2, ListVersion::V2) => {
            let error = stream.read_u32_le().await?;
            let _dev = stream.read_u64_le().await?;
            let _ino = stream.read_u64_le().await?;
            let mode = stream.read_u32_le().await?;
            let _nlink = stream.read_u32_le().await?;
            let _uid = stream.read_u32_le().await?;
            let _gid = stream.read_u32_le().await?;
            let size = stream.read_u64_le().await?;
            let _atime = stream.read_i64_le().await?;
            let mtime = stream.read_i64_le().await?;
            let _ctime = stream.read_i64_le().await?;
            // A non-zero errno means the stat fields are meaningless
            let mode = if error == 0 { mode } else { 0 };
            read_entry(stream, mode, size, mtime).await
        }
        (DONE, _) => {
            let trailer = match version {
                ListVersion::V1 => LIST_DONE_TRAILER,
                ListVersion::V2 => LIS2_DONE_TRAILER,
            };
            let mut buffer = vec![0u8; trailer];
            stream.read_exact(&mut buffer).await?;
            Ok(ListFrame::Done)
        }
        (FAIL, _) => Ok(ListFrame::Fail(read_fail_message(stream).await?)),
        (other, _) => Err(unexpected_frame(other)),
    }
}

/// Read one frame of a `RECV` reply
pub async fn read_data_frame<S>(stream: &mut S) -> Result<DataFrame>
where
    S: AsyncRead + Unpin,
{
    let mut id = [0u8; 4];
    stream.read_exact(&mut id).await?;

    match id {
        DATA => {
            let length = stream.read_u32_le().await? as usize;
            if length > MAX_DATA_LENGTH {
                return Err(Error::protocol(format!("Data frame too large: {}", length)));
            }
            let mut chunk = vec![0u8; length];
            stream.read_exact(&mut chunk).await?;
            Ok(DataFrame::Data(Bytes::from(chunk)))
        }
        DONE => {
            stream.read_u32_le().await?;
            Ok(DataFrame::Done)
        }
        FAIL => Ok(DataFrame::Fail(read_fail_message(stream).await?)),
        other => Err(unexpected_frame(other)),
    }
}

/// Modification time carried by a sync reply, as a [`SystemTime`]
pub fn mtime_to_system_time(mtime: i64) -> SystemTime {
    let offset = Duration::from_secs(mtime.unsigned_abs());
    if mtime >= 0 {
        UNIX_EPOCH + offset
    } else {
        UNIX_EPOCH - offset
    }
}

async fn read_entry<S>(stream: &mut S, mode: u32, size: u64, mtime: i64) -> Result<ListFrame>
where
    S: AsyncRead + Unpin,
{
    let length = stream.read_u32_le().await? as usize;
    if length > MAX_PATH_LENGTH {
        return Err(Error::protocol(format!("Entry name too long: {}", length)));
    }
    let mut raw = vec![0u8; length];
    stream.read_exact(&mut raw).await?;

    Ok(match String::from_utf8(raw) {
        Ok(name) => ListFrame::Entry {
            mode,
            size,
            mtime,
            name,
        },
        Err(e) => ListFrame::UndecodableName {
            name: String::from_utf8_lossy(e.as_bytes()).into_owned(),
        },
    })
}

async fn read_fail_message<S>(stream: &mut S) -> Result<String>
where
    S: AsyncRead + Unpin,
{
    let length = stream.read_u32_le().await? as usize;
    if length > MAX_DATA_LENGTH {
        return Err(Error::protocol(format!("Failure message too long: {}", length)));
    }
    read_string(stream, length).await
}

async fn read_string<S>(stream: &mut S, length: usize) -> Result<String>
where
    S: AsyncRead + Unpin,
{
    let mut buffer = vec![0u8; length];
    stream.read_exact(&mut buffer).await?;
    String::from_utf8(buffer).map_err(|e| Error::protocol(format!("Invalid UTF-8: {}", e)))
}

fn parse_hex_length(digits: &[u8; 4]) -> Result<usize> {
    std::str::from_utf8(digits)
        .ok()
        .and_then(|digits| usize::from_str_radix(digits, 16).ok())
        .ok_or_else(|| {
            Error::protocol(format!(
                "Invalid length prefix {:?}",
                String::from_utf8_lossy(digits)
            ))
        })
}

fn unexpected_frame(id: [u8; 4]) -> Error {
    Error::protocol(format!(
        "Unexpected sync frame {:?}",
        String::from_utf8_lossy(&id)
    ))
}
