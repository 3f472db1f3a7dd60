//! In-memory remote device tree implementing the channel contracts

use async_trait::async_trait;
use bytes::Bytes;
use devmirror_types::{
    ChannelProvider, Error, PullStream, RemoteEntry, RemoteSyncChannel, Result,
};
use futures::stream;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

/// Size of the chunks produced by [`MemoryChannel::pull_file`]
pub const CHUNK_SIZE: usize = 4;

#[derive(Debug, Clone)]
enum Node {
    File { content: Bytes, modified: SystemTime },
    Directory { modified: SystemTime },
}

/// A remote file tree kept in memory, shared by every channel it hands out.
///
/// Paths are absolute and `/`-separated. Parent directories must be added
/// before their children.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    nodes: Mutex<BTreeMap<String, Node>>,
    failing_listings: Mutex<HashSet<String>>,
    failing_pulls: Mutex<HashSet<String>>,
    offline_devices: Mutex<HashSet<String>>,
    listings: Mutex<Vec<String>>,
    pulls: Mutex<Vec<String>>,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl MemoryRemote {
    /// Create an empty remote containing only `/`
    pub fn new() -> Arc<Self> {
        let remote = Self::default();
        remote.add_dir("/", SystemTime::UNIX_EPOCH);
        Arc::new(remote)
    }

    /// Add or replace a directory
    pub fn add_dir(&self, path: &str, modified: SystemTime) {
        self.lock_nodes()
            .insert(normalize(path), Node::Directory { modified });
    }

    /// Add or replace a file
    pub fn add_file(&self, path: &str, content: &[u8], modified: SystemTime) {
        self.lock_nodes().insert(
            normalize(path),
            Node::File {
                content: Bytes::copy_from_slice(content),
                modified,
            },
        );
    }

    /// Make every listing of `path` fail
    pub fn fail_listing(&self, path: &str) {
        lock(&self.failing_listings).insert(normalize(path));
    }

    /// Make every pull of `path` fail after its first chunk
    pub fn fail_pull(&self, path: &str) {
        lock(&self.failing_pulls).insert(normalize(path));
    }

    /// Refuse to open channels for `device_id`
    pub fn set_offline(&self, device_id: &str) {
        lock(&self.offline_devices).insert(device_id.to_string());
    }

    /// Directories listed so far, in call order
    pub fn listings(&self) -> Vec<String> {
        lock(&self.listings).clone()
    }

    /// Files pulled so far, in call order
    pub fn pulls(&self) -> Vec<String> {
        lock(&self.pulls).clone()
    }

    /// Number of channels opened
    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Number of channels closed
    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Create a channel provider serving this tree
    pub fn provider(self: &Arc<Self>) -> MemoryChannelProvider {
        MemoryChannelProvider {
            remote: Arc::clone(self),
        }
    }

    /// Open a channel directly, bypassing the provider
    pub fn channel(self: &Arc<Self>) -> MemoryChannel {
        self.opened.fetch_add(1, Ordering::SeqCst);
        MemoryChannel {
            remote: Arc::clone(self),
            closed: false,
        }
    }

    fn lock_nodes(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Node>> {
        lock(&self.nodes)
    }

    fn list(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        let path = normalize(path);
        lock(&self.listings).push(path.clone());

        if lock(&self.failing_listings).contains(&path) {
            return Err(Error::remote_listing(path, "injected listing failure"));
        }

        let nodes = self.lock_nodes();
        match nodes.get(&path) {
            Some(Node::Directory { .. }) => {}
            _ => return Err(Error::remote_listing(path, "No such directory")),
        }

        Ok(nodes
            .iter()
            .filter_map(|(key, node)| {
                let (parent, name) = split_parent(key)?;
                if parent != path {
                    return None;
                }
                Some(match node {
                    Node::File { content, modified } => {
                        RemoteEntry::file(name, content.len() as u64, *modified)
                    }
                    Node::Directory { modified } => RemoteEntry::directory(name, *modified),
                })
            })
            .collect())
    }

    fn content(&self, path: &str) -> Result<(Bytes, bool)> {
        let path = normalize(path);
        lock(&self.pulls).push(path.clone());

        let failing = lock(&self.failing_pulls).contains(&path);
        match self.lock_nodes().get(&path) {
            Some(Node::File { content, .. }) => Ok((content.clone(), failing)),
            _ => Err(Error::remote_transfer(path, "No such file")),
        }
    }
}

/// Channel over a [`MemoryRemote`]
#[derive(Debug)]
pub struct MemoryChannel {
    remote: Arc<MemoryRemote>,
    closed: bool,
}

#[async_trait]
impl RemoteSyncChannel for MemoryChannel {
    async fn list_directory(&mut self, path: &str) -> Result<Vec<RemoteEntry>> {
        self.remote.list(path)
    }

    async fn pull_file<'a>(&'a mut self, path: &str) -> Result<PullStream<'a>> {
        let (content, failing) = self.remote.content(path)?;

        let mut chunks: Vec<Result<Bytes>> = content
            .chunks(CHUNK_SIZE)
            .map(Bytes::copy_from_slice)
            .map(Ok)
            .collect();
        if failing {
            chunks.truncate(1);
            chunks.push(Err(Error::remote_transfer(path, "injected transfer failure")));
        }

        Ok(Box::pin(stream::iter(chunks)))
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.remote.closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Provider handing out [`MemoryChannel`]s
#[derive(Debug, Clone)]
pub struct MemoryChannelProvider {
    remote: Arc<MemoryRemote>,
}

#[async_trait]
impl ChannelProvider for MemoryChannelProvider {
    type Channel = MemoryChannel;

    async fn open(&self, device_id: &str) -> Result<Self::Channel> {
        if lock(&self.remote.offline_devices).contains(device_id) {
            return Err(Error::channel_open(device_id, "device offline"));
        }
        Ok(self.remote.channel())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

fn split_parent(path: &str) -> Option<(String, &str)> {
    if path == "/" {
        return None;
    }
    let (parent, name) = path.rsplit_once('/')?;
    let parent = if parent.is_empty() { "/" } else { parent };
    Some((parent.to_string(), name))
}
