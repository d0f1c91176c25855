//! # In-Memory Remote Filesystem
//!
//! Doppio di test che soddisfa il contratto `RemoteFs` senza rete.
//! Tutto lo stato vive dietro un unico `Mutex`, mai tenuto attraverso un `.await`.

use super::{ConnectionConfig, PathResolver, RemoteEntry, RemoteFs, RemoteReader, RemoteWriter};
use crate::error::RemoteFsError;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::SystemTime;
use tokio::io::AsyncWrite;

const DIR_MODE: u32 = 0o040755;
const FILE_MODE: u32 = 0o644;

struct MemoryFile {
    data: Vec<u8>,
    mode: u32,
    mod_time: SystemTime,
}

#[derive(Default)]
struct MemoryState {
    files: HashMap<String, MemoryFile>,
    dirs: HashSet<String>,
    read_only: HashSet<String>,
    connected: bool,
}

/// In-memory RemoteFs backend
pub struct MemoryFs {
    root: String,
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryFs {
    /// Crea un filesystem vuoto (già connesso) con la root indicata
    pub fn new(root: &str) -> Self {
        let root = PathResolver::resolve("/", root);
        let mut state = MemoryState {
            connected: true,
            ..Default::default()
        };
        state.dirs.insert(root.clone());

        Self {
            root,
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Scrive un file di test, creando le directory padre
    pub fn put_file(&self, path: &str, data: &[u8]) {
        let path = self.resolve(path);
        if let Ok(mut state) = self.state.lock() {
            Self::ensure_parents(&mut state, &self.root, &path);
            state.files.insert(
                path,
                MemoryFile {
                    data: data.to_vec(),
                    mode: FILE_MODE,
                    mod_time: SystemTime::now(),
                },
            );
        }
    }

    pub fn mkdir(&self, path: &str) {
        let path = self.resolve(path);
        if let Ok(mut state) = self.state.lock() {
            Self::ensure_parents(&mut state, &self.root, &path);
            state.dirs.insert(path);
        }
    }

    /// Contenuto corrente di un file, se presente
    pub fn read_file(&self, path: &str) -> Option<Vec<u8>> {
        let path = self.resolve(path);
        self.state
            .lock()
            .ok()
            .and_then(|state| state.files.get(&path).map(|f| f.data.clone()))
    }

    /// Rende `path` non scrivibile: `create` fallirà con PermissionDenied
    pub fn set_read_only(&self, path: &str) {
        let path = self.resolve(path);
        if let Ok(mut state) = self.state.lock() {
            state.read_only.insert(path);
        }
    }

    fn ensure_parents(state: &mut MemoryState, root: &str, path: &str) {
        let mut current = PathResolver::parent(path);
        while let Some(dir) = current {
            if !PathResolver::is_within(root, &dir) || !state.dirs.insert(dir.clone()) {
                break;
            }
            current = PathResolver::parent(&dir);
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, RemoteFsError> {
        let state = self
            .state
            .lock()
            .map_err(|_| RemoteFsError::Connection("memory filesystem lock poisoned".to_string()))?;
        if !state.connected {
            return Err(RemoteFsError::Connection("not connected".to_string()));
        }
        Ok(state)
    }

    fn file_entry(path: &str, file: &MemoryFile) -> RemoteEntry {
        RemoteEntry {
            path: path.to_string(),
            name: PathResolver::file_name(path),
            size: file.data.len() as u64,
            mode: file.mode,
            mod_time: file.mod_time,
            is_dir: false,
            is_symlink: false,
            symlink_target: None,
        }
    }

    fn dir_entry(path: &str) -> RemoteEntry {
        RemoteEntry {
            path: path.to_string(),
            name: PathResolver::file_name(path),
            size: 0,
            mode: DIR_MODE,
            mod_time: SystemTime::UNIX_EPOCH,
            is_dir: true,
            is_symlink: false,
            symlink_target: None,
        }
    }
}

#[async_trait]
impl RemoteFs for MemoryFs {
    async fn connect(&self, _config: &ConnectionConfig) -> Result<(), RemoteFsError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| RemoteFsError::Connection("memory filesystem lock poisoned".to_string()))?;
        state.connected = true;
        Ok(())
    }

    async fn close(&self) -> Result<(), RemoteFsError> {
        if let Ok(mut state) = self.state.lock() {
            state.connected = false;
        }
        Ok(())
    }

    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>, RemoteFsError> {
        let dir = self.resolve(path);
        let state = self.lock()?;
        if !state.dirs.contains(&dir) {
            return Err(RemoteFsError::NotFound(dir));
        }

        let is_child = |p: &str| p != dir && PathResolver::parent(p).as_deref() == Some(dir.as_str());

        let mut out: Vec<RemoteEntry> = state
            .dirs
            .iter()
            .filter(|d| is_child(d.as_str()))
            .map(|d| Self::dir_entry(d))
            .chain(
                state
                    .files
                    .iter()
                    .filter(|(p, _)| is_child(p.as_str()))
                    .map(|(p, f)| Self::file_entry(p, f)),
            )
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn stat(&self, path: &str) -> Result<RemoteEntry, RemoteFsError> {
        let path = self.resolve(path);
        let state = self.lock()?;
        if let Some(file) = state.files.get(&path) {
            return Ok(Self::file_entry(&path, file));
        }
        if state.dirs.contains(&path) {
            return Ok(Self::dir_entry(&path));
        }
        Err(RemoteFsError::NotFound(path))
    }

    async fn open(&self, path: &str) -> Result<(RemoteReader, RemoteEntry), RemoteFsError> {
        let path = self.resolve(path);
        let state = self.lock()?;
        let file = state
            .files
            .get(&path)
            .ok_or_else(|| RemoteFsError::NotFound(path.clone()))?;
        let entry = Self::file_entry(&path, file);
        let reader: RemoteReader = Box::new(io::Cursor::new(file.data.clone()));
        Ok((reader, entry))
    }

    async fn create(&self, path: &str, overwrite: bool) -> Result<RemoteWriter, RemoteFsError> {
        let path = self.resolve(path);
        let state = self.lock()?;

        if state.read_only.contains(&path) {
            return Err(RemoteFsError::PermissionDenied(path));
        }
        if state.dirs.contains(&path) {
            return Err(RemoteFsError::AlreadyExists(path));
        }
        if !overwrite && state.files.contains_key(&path) {
            return Err(RemoteFsError::AlreadyExists(path));
        }
        let parent = PathResolver::parent(&path).unwrap_or_else(|| self.root.clone());
        if !state.dirs.contains(&parent) {
            return Err(RemoteFsError::NotFound(parent));
        }

        Ok(Box::new(MemoryWriter {
            path,
            buffer: Vec::new(),
            state: Arc::clone(&self.state),
            committed: false,
        }))
    }

    fn root(&self) -> String {
        self.root.clone()
    }

    fn is_connected(&self) -> bool {
        self.state.lock().map(|s| s.connected).unwrap_or(false)
    }
}

/// Buffer di scrittura: il contenuto viene pubblicato al `shutdown()`
struct MemoryWriter {
    path: String,
    buffer: Vec<u8>,
    state: Arc<Mutex<MemoryState>>,
    committed: bool,
}

impl AsyncWrite for MemoryWriter {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, data: &[u8]) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        this.buffer.extend_from_slice(data);
        Poll::Ready(Ok(data.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.committed {
            return Poll::Ready(Ok(()));
        }

        let mut state = match this.state.lock() {
            Ok(state) => state,
            Err(_) => return Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, "lock poisoned"))),
        };
        state.files.insert(
            this.path.clone(),
            MemoryFile {
                data: std::mem::take(&mut this.buffer),
                mode: FILE_MODE,
                mod_time: SystemTime::now(),
            },
        );
        this.committed = true;
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_open_reads_back_put_file() {
        let fs = MemoryFs::new("/data");
        fs.put_file("pics/a.jpg", b"hello");

        let (mut reader, entry) = fs.open("/data/pics/a.jpg").await.unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();

        assert_eq!(buf, b"hello");
        assert_eq!(entry.size, 5);
        assert_eq!(entry.name, "a.jpg");
        assert_eq!(entry.path, "/data/pics/a.jpg");
    }

    #[tokio::test]
    async fn test_list_returns_direct_children_only() {
        let fs = MemoryFs::new("/");
        fs.put_file("/pics/a.jpg", b"a");
        fs.put_file("/pics/b.png", b"bb");
        fs.put_file("/pics/2024/c.jpg", b"ccc");

        let entries = fs.list("/pics").await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["2024", "a.jpg", "b.png"]);
        assert!(entries[0].is_dir);

        assert!(matches!(fs.list("/missing").await, Err(RemoteFsError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_create_without_overwrite_keeps_existing() {
        let fs = MemoryFs::new("/");
        fs.put_file("/a.jpg", b"original");

        let result = fs.create("/a.jpg", false).await;
        assert!(matches!(result, Err(RemoteFsError::AlreadyExists(_))));
        assert_eq!(fs.read_file("/a.jpg").unwrap(), b"original");

        let mut writer = fs.create("/a.jpg", true).await.unwrap();
        writer.write_all(b"new").await.unwrap();
        assert_eq!(fs.read_file("/a.jpg").unwrap(), b"original");
        writer.shutdown().await.unwrap();
        assert_eq!(fs.read_file("/a.jpg").unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_create_errors() {
        let fs = MemoryFs::new("/");
        fs.put_file("/locked.jpg", b"x");
        fs.set_read_only("/locked.jpg");

        assert!(matches!(
            fs.create("/locked.jpg", true).await,
            Err(RemoteFsError::PermissionDenied(_))
        ));
        assert!(matches!(
            fs.create("/nowhere/x.jpg", true).await,
            Err(RemoteFsError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_mkdir_creates_empty_listable_dirs() {
        let fs = MemoryFs::new("/data");
        fs.mkdir("albums/2024");

        assert!(fs.list("/data/albums/2024").await.unwrap().is_empty());
        let parent = fs.list("albums").await.unwrap();
        assert_eq!(parent.len(), 1);
        assert!(parent[0].is_dir);
        assert_eq!(parent[0].path, "/data/albums/2024");

        let mut writer = fs.create("albums/2024/new.jpg", false).await.unwrap();
        writer.write_all(b"n").await.unwrap();
        writer.shutdown().await.unwrap();
        assert_eq!(fs.read_file("/data/albums/2024/new.jpg").unwrap(), b"n");
    }

    #[tokio::test]
    async fn test_traversal_stays_inside_root() {
        let fs = MemoryFs::new("/home/user");
        fs.put_file("pics/a.jpg", b"a");

        let escaped = fs.stat("../../etc").await.unwrap();
        assert_eq!(escaped.path, "/home/user");
        assert!(escaped.is_dir);

        let listing = fs.list("../..").await.unwrap();
        assert_eq!(listing.len(), 1);
        assert!(listing.iter().all(|e| e.path.starts_with("/home/user/")));
    }

    #[tokio::test]
    async fn test_close_disconnects() {
        let fs = MemoryFs::new("/");
        fs.put_file("/a.jpg", b"a");
        fs.close().await.unwrap();
        fs.close().await.unwrap();

        assert!(!fs.is_connected());
        assert!(matches!(fs.stat("/a.jpg").await, Err(RemoteFsError::Connection(_))));

        fs.connect(&ConnectionConfig::default()).await.unwrap();
        assert!(fs.stat("/a.jpg").await.is_ok());
    }
}
