//! Connection setup with the debug bridge server

use crate::protocol;
use devmirror_types::{Error, Result};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

/// Default timeout for connecting to the server and entering sync mode
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Address of a debug bridge server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    /// Host name or IP address
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl ServerAddress {
    /// Create a new server address
    pub fn new<S: Into<String>>(host: S, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl Default for ServerAddress {
    fn default() -> Self {
        Self::new("127.0.0.1", protocol::DEFAULT_PORT)
    }
}

impl std::fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Open a TCP connection to the server
pub async fn connect(address: &ServerAddress, device_id: &str) -> Result<TcpStream> {
    debug!("Connecting to debug bridge at {}", address);
    let stream = TcpStream::connect((address.host.as_str(), address.port))
        .await
        .map_err(|e| {
            Error::channel_open(
                device_id,
                format!("Failed to connect to {}: {}", address, e),
            )
        })?;
    stream
        .set_nodelay(true)
        .map_err(|e| Error::channel_open(device_id, e))?;
    Ok(stream)
}

/// Switch an open server connection to `device_id` and enter sync mode.
///
/// Refusals from the server, like an unknown or unauthorized device, become
/// [`Error::ChannelOpen`].
pub async fn start_sync_session<S>(stream: &mut S, device_id: &str) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    request_service(stream, device_id, &format!("host:transport:{}", device_id)).await?;
    request_service(stream, device_id, "sync:").await?;
    debug!("Sync session open for device [{}]", device_id);
    Ok(())
}

/// Ask the server which features `device_id` supports
pub async fn query_features(address: &ServerAddress, device_id: &str) -> Result<Vec<String>> {
    let mut stream = connect(address, device_id).await?;
    read_features(&mut stream, device_id).await
}

/// Request the feature list of `device_id` on an open server connection
pub async fn read_features<S>(stream: &mut S, device_id: &str) -> Result<Vec<String>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let service = format!("host-serial:{}:features", device_id);
    request_service(stream, device_id, &service).await?;
    let features = protocol::read_hex_string(stream)
        .await
        .map_err(|e| Error::channel_open(device_id, e))?;

    Ok(features
        .split(',')
        .map(str::trim)
        .filter(|feature| !feature.is_empty())
        .map(str::to_string)
        .collect())
}

async fn request_service<S>(stream: &mut S, device_id: &str, service: &str) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    protocol::send_request(stream, service)
        .await
        .map_err(|e| Error::channel_open(device_id, e))?;

    match protocol::read_status(stream).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(message)) => Err(Error::channel_open(
            device_id,
            format!("{} refused: {}", service, message),
        )),
        Err(e) => Err(Error::channel_open(device_id, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_start_sync_session() {
        let (mut client, mut server) = duplex(1024);

        let fake_server = tokio::spawn(async move {
            let mut request = [0u8; 32];
            server.read_exact(&mut request).await.unwrap();
            assert_eq!(&request, b"001chost:transport:emulator-5554");
            server.write_all(b"OKAY").await.unwrap();

            let mut request = [0u8; 9];
            server.read_exact(&mut request).await.unwrap();
            assert_eq!(&request, b"0005sync:");
            server.write_all(b"OKAY").await.unwrap();
        });

        start_sync_session(&mut client, "emulator-5554").await.unwrap();
        fake_server.await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_device_is_refused() {
        let (mut client, mut server) = duplex(1024);

        tokio::spawn(async move {
            let mut request = [0u8; 26];
            server.read_exact(&mut request).await.unwrap();
            server.write_all(b"FAIL0010device not found").await.unwrap();
        });

        let result = start_sync_session(&mut client, "missing").await;
        match result {
            Err(Error::ChannelOpen { device, message }) => {
                assert_eq!(device, "missing");
                assert!(message.contains("device not found"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_read_features() {
        let mut stream = tokio_test::io::Builder::new()
            .write(b"0022host-serial:emulator-5554:features")
            .read(b"OKAY")
            .read(b"0013shell_v2,cmd,ls_v2,")
            .build();

        let features = read_features(&mut stream, "emulator-5554").await.unwrap();
        assert_eq!(features, vec!["shell_v2", "cmd", "ls_v2"]);
    }

    #[test]
    fn test_server_address_display() {
        assert_eq!(ServerAddress::default().to_string(), "127.0.0.1:5037");
    }
}
