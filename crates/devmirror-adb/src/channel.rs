//! Sync sessions over the debug bridge

use crate::connection::{self, ServerAddress, DEFAULT_CONNECT_TIMEOUT};
use crate::protocol::{self, DataFrame, ListFrame, ListVersion};
use async_trait::async_trait;
use devmirror_types::{
    ChannelProvider, Error, PullStream, RemoteEntry, RemoteSyncChannel, Result,
};
use futures::stream;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// A file-sync session with one device.
///
/// Requests are strictly sequential. A pull stream dropped before its last
/// frame leaves the rest of the reply on the socket; it is drained before the
/// next request.
#[derive(Debug)]
pub struct AdbSyncChannel<S> {
    stream: S,
    device_id: String,
    list_version: ListVersion,
    pending_recv: bool,
    broken: bool,
    closed: bool,
}

impl<S> AdbSyncChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap a stream that already switched to sync mode
    pub fn new<D: Into<String>>(stream: S, device_id: D) -> Self {
        Self {
            stream,
            device_id: device_id.into(),
            list_version: ListVersion::default(),
            pending_recv: false,
            broken: false,
            closed: false,
        }
    }

    /// Set the listing request used by [`RemoteSyncChannel::list_directory`]
    pub fn with_list_version(mut self, version: ListVersion) -> Self {
        self.list_version = version;
        self
    }

    /// Device this session talks to
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Listing request spoken on this session
    pub fn list_version(&self) -> ListVersion {
        self.list_version
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.closed {
            return Err(Error::protocol("Sync session is closed"));
        }
        if self.broken {
            return Err(Error::protocol("Sync session is out of sync with the server"));
        }
        Ok(())
    }

    async fn drain_pending(&mut self) -> Result<()> {
        if !self.pending_recv {
            return Ok(());
        }

        debug!("Draining unfinished transfer on [{}]", self.device_id);
        loop {
            match protocol::read_data_frame(&mut self.stream).await {
                Ok(DataFrame::Data(_)) => {}
                Ok(DataFrame::Done | DataFrame::Fail(_)) => {
                    self.pending_recv = false;
                    return Ok(());
                }
                Err(e) => {
                    self.broken = true;
                    return Err(e);
                }
            }
        }
    }

    async fn prepare(&mut self) -> Result<()> {
        self.ensure_usable()?;
        self.drain_pending().await
    }

    async fn read_listing(&mut self, path: &str) -> Result<Vec<RemoteEntry>> {
        let version = self.list_version;
        protocol::write_sync_request(&mut self.stream, version.request_id(), path).await?;

        let mut entries = Vec::new();
        loop {
            match protocol::read_list_frame(&mut self.stream, version).await? {
                ListFrame::Done => return Ok(entries),
                ListFrame::Fail(message) => return Err(Error::remote_listing(path, message)),
                ListFrame::UndecodableName { name } => {
                    debug!("Skipping [{}] in [{}]: name is not valid UTF-8", name, path);
                }
                frame => {
                    if let Some(entry) = frame.clone().into_remote_entry() {
                        entries.push(entry);
                    } else if let ListFrame::Entry { name, mode, .. } = frame {
                        debug!("Skipping [{}] in [{}] (mode {:o})", name, path, mode);
                    }
                }
            }
        }
    }
}

#[async_trait]
impl<S> RemoteSyncChannel for AdbSyncChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn list_directory(&mut self, path: &str) -> Result<Vec<RemoteEntry>> {
        self.prepare()
            .await
            .map_err(|e| Error::remote_listing(path, e))?;

        match self.read_listing(path).await {
            Ok(entries) => Ok(entries),
            Err(e @ Error::RemoteListing { .. }) => Err(e),
            Err(e) => {
                self.broken = true;
                Err(Error::remote_listing(path, e))
            }
        }
    }

    async fn pull_file<'a>(&'a mut self, path: &str) -> Result<PullStream<'a>> {
        self.prepare()
            .await
            .map_err(|e| Error::remote_transfer(path, e))?;

        if let Err(e) = protocol::write_sync_request(&mut self.stream, protocol::RECV, path).await
        {
            self.broken = true;
            return Err(Error::remote_transfer(path, e));
        }
        self.pending_recv = true;

        let state = (self, path.to_string());
        let chunks = stream::try_unfold(state, |(channel, path)| async move {
            match protocol::read_data_frame(&mut channel.stream).await {
                Ok(DataFrame::Data(chunk)) => Ok(Some((chunk, (channel, path)))),
                Ok(DataFrame::Done) => {
                    channel.pending_recv = false;
                    Ok(None)
                }
                Ok(DataFrame::Fail(message)) => {
                    channel.pending_recv = false;
                    Err(Error::remote_transfer(path, message))
                }
                Err(e) => {
                    channel.broken = true;
                    Err(Error::remote_transfer(path, e))
                }
            }
        });

        Ok(Box::pin(chunks))
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }

        let quit = async {
            self.prepare().await?;
            protocol::write_sync_request(&mut self.stream, protocol::QUIT, "").await
        };
        let result = quit.await;
        self.closed = true;

        if let Err(e) = self.stream.shutdown().await {
            debug!("Socket shutdown for [{}] failed: {}", self.device_id, e);
        }
        result
    }
}

/// Opens [`AdbSyncChannel`]s through a local debug bridge server
#[derive(Debug, Clone)]
pub struct AdbChannelProvider {
    address: ServerAddress,
    connect_timeout: Duration,
}

impl AdbChannelProvider {
    /// Create a provider for the server at `host:port`
    pub fn new<H: Into<String>>(host: H, port: u16) -> Self {
        Self {
            address: ServerAddress::new(host, port),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Set the timeout covering connection and session setup
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Server address
    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    async fn open_session(&self, device_id: &str) -> Result<AdbSyncChannel<TcpStream>> {
        let list_version = match connection::query_features(&self.address, device_id).await {
            Ok(features) => ListVersion::from_features(features.iter().map(String::as_str)),
            Err(e) => {
                debug!("Feature query for [{}] failed, using LIST: {}", device_id, e);
                ListVersion::V1
            }
        };

        let mut stream = connection::connect(&self.address, device_id).await?;
        connection::start_sync_session(&mut stream, device_id).await?;
        debug!("Listing [{}] with {:?}", device_id, list_version);
        Ok(AdbSyncChannel::new(stream, device_id).with_list_version(list_version))
    }
}

impl Default for AdbChannelProvider {
    fn default() -> Self {
        let address = ServerAddress::default();
        Self::new(address.host, address.port)
    }
}

#[async_trait]
impl ChannelProvider for AdbChannelProvider {
    type Channel = AdbSyncChannel<TcpStream>;

    async fn open(&self, device_id: &str) -> Result<Self::Channel> {
        match tokio::time::timeout(self.connect_timeout, self.open_session(device_id)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "Opening sync session for [{}] timed out after {:?}",
                    device_id, self.connect_timeout
                );
                Err(Error::channel_open(
                    device_id,
                    format!("Timed out after {:?}", self.connect_timeout),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tokio::io::{duplex, AsyncReadExt, DuplexStream};

    fn dent(mode: u32, size: u32, mtime: u32, name: &str) -> Vec<u8> {
        raw_dent(mode, size, mtime, name.as_bytes())
    }

    fn raw_dent(mode: u32, size: u32, mtime: u32, name: &[u8]) -> Vec<u8> {
        let mut frame = b"DENT".to_vec();
        for value in [mode, size, mtime, name.len() as u32] {
            frame.extend_from_slice(&value.to_le_bytes());
        }
        frame.extend_from_slice(name);
        frame
    }

    fn dent_v2(mode: u32, size: u64, mtime: i64, name: &str) -> Vec<u8> {
        let mut frame = b"DNT2".to_vec();
        frame.extend_from_slice(&0u32.to_le_bytes());
        frame.extend_from_slice(&[0u8; 16]);
        frame.extend_from_slice(&mode.to_le_bytes());
        frame.extend_from_slice(&[0u8; 12]);
        frame.extend_from_slice(&size.to_le_bytes());
        frame.extend_from_slice(&mtime.to_le_bytes());
        frame.extend_from_slice(&mtime.to_le_bytes());
        frame.extend_from_slice(&mtime.to_le_bytes());
        frame.extend_from_slice(&(name.len() as u32).to_le_bytes());
        frame.extend_from_slice(name.as_bytes());
        frame
    }

    fn list_v2_done() -> Vec<u8> {
        let mut frame = b"DONE".to_vec();
        frame.extend_from_slice(&[0u8; 72]);
        frame
    }

    fn list_done() -> Vec<u8> {
        let mut frame = b"DONE".to_vec();
        frame.extend_from_slice(&[0u8; 16]);
        frame
    }

    fn data(chunk: &[u8]) -> Vec<u8> {
        let mut frame = b"DATA".to_vec();
        frame.extend_from_slice(&(chunk.len() as u32).to_le_bytes());
        frame.extend_from_slice(chunk);
        frame
    }

    fn data_done() -> Vec<u8> {
        let mut frame = b"DONE".to_vec();
        frame.extend_from_slice(&0u32.to_le_bytes());
        frame
    }

    fn fail(message: &str) -> Vec<u8> {
        let mut frame = b"FAIL".to_vec();
        frame.extend_from_slice(&(message.len() as u32).to_le_bytes());
        frame.extend_from_slice(message.as_bytes());
        frame
    }

    async fn read_request(server: &mut DuplexStream) -> (Vec<u8>, String) {
        let mut id = [0u8; 4];
        server.read_exact(&mut id).await.unwrap();
        let length = server.read_u32_le().await.unwrap() as usize;
        let mut path = vec![0u8; length];
        server.read_exact(&mut path).await.unwrap();
        (id.to_vec(), String::from_utf8(path).unwrap())
    }

    #[tokio::test]
    async fn test_list_directory() {
        let (client, mut server) = duplex(64 * 1024);
        let mut channel = AdbSyncChannel::new(client, "emulator-5554");

        let mut reply = Vec::new();
        reply.extend(dent(0o040_755, 4096, 100, "."));
        reply.extend(dent(0o040_755, 4096, 100, ".."));
        reply.extend(dent(0o100_644, 10, 1000, "a.txt"));
        reply.extend(dent(0o040_771, 4096, 2000, "sub"));
        reply.extend(dent(0o120_777, 7, 3000, "link"));
        reply.extend(list_done());
        server.write_all(&reply).await.unwrap();

        let entries = channel.list_directory("/src").await.unwrap();
        assert_eq!(
            entries,
            vec![
                RemoteEntry::file("a.txt", 10, protocol::mtime_to_system_time(1000)),
                RemoteEntry::directory("sub", protocol::mtime_to_system_time(2000)),
            ]
        );

        let (id, path) = read_request(&mut server).await;
        assert_eq!(id, b"LIST");
        assert_eq!(path, "/src");
    }

    #[tokio::test]
    async fn test_undecodable_name_is_skipped() {
        let (client, mut server) = duplex(64 * 1024);
        let mut channel = AdbSyncChannel::new(client, "device");

        let mut reply = Vec::new();
        reply.extend(dent(0o100_644, 10, 1000, "good.jpg"));
        reply.extend(raw_dent(0o100_644, 20, 1000, b"bad\xff.jpg"));
        reply.extend(list_done());
        reply.extend(dent(0o100_644, 5, 1000, "next.jpg"));
        reply.extend(list_done());
        server.write_all(&reply).await.unwrap();

        let entries = channel.list_directory("/DCIM").await.unwrap();
        assert_eq!(
            entries,
            vec![RemoteEntry::file(
                "good.jpg",
                10,
                protocol::mtime_to_system_time(1000)
            )]
        );

        // The session is still usable
        let entries = channel.list_directory("/DCIM/sub").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "next.jpg");
    }

    #[tokio::test]
    async fn test_list_directory_v2() {
        let (client, mut server) = duplex(64 * 1024);
        let mut channel =
            AdbSyncChannel::new(client, "device").with_list_version(ListVersion::V2);
        let size = 5 * 1024 * 1024 * 1024_u64;

        let mut reply = Vec::new();
        reply.extend(dent_v2(0o040_755, 4096, 100, "."));
        reply.extend(dent_v2(0o100_644, size, 1_700_000_000, "movie.mp4"));
        reply.extend(list_v2_done());
        reply.extend(data(b"tail"));
        reply.extend(data_done());
        server.write_all(&reply).await.unwrap();

        let entries = channel.list_directory("/Movies").await.unwrap();
        assert_eq!(
            entries,
            vec![RemoteEntry::file(
                "movie.mp4",
                size,
                protocol::mtime_to_system_time(1_700_000_000)
            )]
        );

        let chunks: Vec<_> = channel.pull_file("/Movies/tail").await.unwrap().collect().await;
        assert_eq!(chunks.len(), 1);

        let (id, path) = read_request(&mut server).await;
        assert_eq!(id, b"LIS2");
        assert_eq!(path, "/Movies");
    }

    #[tokio::test]
    async fn test_list_failure() {
        let (client, mut server) = duplex(64 * 1024);
        let mut channel = AdbSyncChannel::new(client, "device");
        server.write_all(&fail("permission denied")).await.unwrap();

        let result = channel.list_directory("/data").await;
        assert!(matches!(result, Err(Error::RemoteListing { .. })));
    }

    #[tokio::test]
    async fn test_pull_file_streams_chunks() {
        let (client, mut server) = duplex(64 * 1024);
        let mut channel = AdbSyncChannel::new(client, "device");

        let mut reply = Vec::new();
        reply.extend(data(b"hello "));
        reply.extend(data(b"world"));
        reply.extend(data_done());
        server.write_all(&reply).await.unwrap();

        let chunks: Vec<_> = channel
            .pull_file("/src/a.txt")
            .await
            .unwrap()
            .collect()
            .await;
        let content: Vec<u8> = chunks
            .into_iter()
            .flat_map(|chunk| chunk.unwrap().to_vec())
            .collect();
        assert_eq!(content, b"hello world");

        let (id, path) = read_request(&mut server).await;
        assert_eq!(id, b"RECV");
        assert_eq!(path, "/src/a.txt");
    }

    #[tokio::test]
    async fn test_pull_failure_frame() {
        let (client, mut server) = duplex(64 * 1024);
        let mut channel = AdbSyncChannel::new(client, "device");

        let mut reply = Vec::new();
        reply.extend(data(b"partial"));
        reply.extend(fail("No such file or directory"));
        server.write_all(&reply).await.unwrap();

        let mut chunks = channel.pull_file("/missing").await.unwrap();
        assert!(chunks.next().await.unwrap().is_ok());
        let error = chunks.next().await.unwrap().unwrap_err();
        assert!(matches!(error, Error::RemoteTransfer { .. }));
        assert!(chunks.next().await.is_none());
    }

    #[tokio::test]
    async fn test_dropped_pull_is_drained_before_next_request() {
        let (client, mut server) = duplex(64 * 1024);
        let mut channel = AdbSyncChannel::new(client, "device");

        let mut reply = Vec::new();
        reply.extend(data(b"first"));
        reply.extend(data(b"second"));
        reply.extend(data_done());
        reply.extend(dent(0o100_644, 1, 5, "x"));
        reply.extend(list_done());
        server.write_all(&reply).await.unwrap();

        {
            let mut chunks = channel.pull_file("/a").await.unwrap();
            assert_eq!(&chunks.next().await.unwrap().unwrap()[..], b"first");
        }

        let entries = channel.list_directory("/").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "x");
    }

    #[tokio::test]
    async fn test_close_sends_quit_once() {
        let (client, mut server) = duplex(64 * 1024);
        let mut channel = AdbSyncChannel::new(client, "device");

        channel.close().await.unwrap();
        channel.close().await.unwrap();

        let (id, path) = read_request(&mut server).await;
        assert_eq!(id, b"QUIT");
        assert!(path.is_empty());

        let mut rest = Vec::new();
        server.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());

        assert!(channel.list_directory("/").await.is_err());
    }

    #[tokio::test]
    async fn test_provider_reports_refused_connection() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let provider = AdbChannelProvider::new("127.0.0.1", port)
            .with_connect_timeout(Duration::from_secs(2));
        let result = provider.open("device").await;
        assert!(matches!(result, Err(Error::ChannelOpen { .. })));
    }

    #[tokio::test]
    async fn test_provider_opens_session() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let fake_server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 31];
            socket.read_exact(&mut request).await.unwrap();
            assert_eq!(&request, b"001bhost-serial:serial:features");
            socket.write_all(b"OKAY000acmd,ls_v2,").await.unwrap();
            drop(socket);

            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 25];
            socket.read_exact(&mut request).await.unwrap();
            assert_eq!(&request, b"0015host:transport:serial");
            socket.write_all(b"OKAY").await.unwrap();
            let mut request = [0u8; 9];
            socket.read_exact(&mut request).await.unwrap();
            socket.write_all(b"OKAY").await.unwrap();
        });

        let provider = AdbChannelProvider::new("127.0.0.1", port);
        let channel = provider.open("serial").await.unwrap();
        assert_eq!(channel.device_id(), "serial");
        assert_eq!(channel.list_version(), ListVersion::V2);
        fake_server.await.unwrap();
    }

    #[tokio::test]
    async fn test_provider_falls_back_to_list() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let fake_server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 31];
            socket.read_exact(&mut request).await.unwrap();
            socket.write_all(b"FAIL000funknown command").await.unwrap();
            drop(socket);

            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 25];
            socket.read_exact(&mut request).await.unwrap();
            socket.write_all(b"OKAY").await.unwrap();
            let mut request = [0u8; 9];
            socket.read_exact(&mut request).await.unwrap();
            socket.write_all(b"OKAY").await.unwrap();
        });

        let provider = AdbChannelProvider::new("127.0.0.1", port);
        let channel = provider.open("serial").await.unwrap();
        assert_eq!(channel.list_version(), ListVersion::V1);
        fake_server.await.unwrap();
    }
}
