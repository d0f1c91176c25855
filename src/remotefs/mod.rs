//! # Remote Filesystem Module
//!
//! Astrazione protocol-agnostic di un albero di file remoto.
//!
//! ## Responsabilità:
//! - Definisce il trait `RemoteFs` (connect, list, stat, open, create, join, root)
//! - Definisce `RemoteEntry` e `ConnectionConfig`
//! - Confina ogni path dentro la root configurata tramite `PathResolver`
//!
//! ## Backend:
//! - `local`: albero di directory locale trattato come "remoto"
//! - `memory`: doppio in-memory per i test
//!
//! ## Contratto degli stream:
//! - `open` restituisce un reader sequenziale, rilasciato al drop
//! - `create` restituisce un writer; la scrittura è confermata da `shutdown()`

pub mod local;
pub mod memory;
pub mod path_resolver;

pub use local::LocalFs;
pub use memory::MemoryFs;
pub use path_resolver::PathResolver;

use crate::error::RemoteFsError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::SystemTime;
use tokio::io::{AsyncRead, AsyncWrite};

/// Sequential byte source returned by `RemoteFs::open`
pub type RemoteReader = Box<dyn AsyncRead + Send + Unpin>;

/// Destination returned by `RemoteFs::create`
pub type RemoteWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Remote connection parameters
#[derive(Clone, Default)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Optional password fallback
    pub password: Option<String>,
    /// Optional private key path
    pub key_path: Option<PathBuf>,
    /// Root ("chroot") of the session; empty or `/` means the backend default
    pub remote_path: String,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("key_path", &self.key_path)
            .field("remote_path", &self.remote_path)
            .finish()
    }
}

/// One object in the remote tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub path: String,
    pub name: String,
    pub size: u64,
    pub mode: u32,
    pub mod_time: SystemTime,
    pub is_dir: bool,
    pub is_symlink: bool,
    /// Resolved target if symlink (always within root)
    pub symlink_target: Option<String>,
}

impl RemoteEntry {
    /// Entry di un file regolare con metadata di default
    pub fn file(path: &str, size: u64) -> Self {
        Self {
            path: path.to_string(),
            name: PathResolver::file_name(path),
            size,
            mode: 0o644,
            mod_time: SystemTime::now(),
            is_dir: false,
            is_symlink: false,
            symlink_target: None,
        }
    }
}

/// Capability of a remote tree confined to a root.
///
/// Implementations must be safe for concurrent use: the pipeline calls them
/// from up to `concurrency` tasks at once.
#[async_trait]
pub trait RemoteFs: Send + Sync {
    /// Establish the backend session
    async fn connect(&self, config: &ConnectionConfig) -> Result<(), RemoteFsError>;

    /// Release backend resources; idempotent
    async fn close(&self) -> Result<(), RemoteFsError>;

    /// Direct children of `path`
    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>, RemoteFsError>;

    async fn stat(&self, path: &str) -> Result<RemoteEntry, RemoteFsError>;

    /// Sequential reader plus metadata of the opened object
    async fn open(&self, path: &str) -> Result<(RemoteReader, RemoteEntry), RemoteFsError>;

    /// With `overwrite = false` an existing object fails with `AlreadyExists`
    async fn create(&self, path: &str, overwrite: bool) -> Result<RemoteWriter, RemoteFsError>;

    fn root(&self) -> String;

    fn is_connected(&self) -> bool;

    fn join(&self, segments: &[&str]) -> String {
        PathResolver::join(segments)
    }

    /// Risolve un path contro la root con clamp
    fn resolve(&self, path: &str) -> String {
        PathResolver::resolve(&self.root(), path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_config_debug_hides_password() {
        let config = ConnectionConfig {
            host: "example.org".to_string(),
            port: 22,
            user: "me".to_string(),
            password: Some("secret".to_string()),
            ..Default::default()
        };
        let printed = format!("{:?}", config);
        assert!(!printed.contains("secret"));
        assert!(printed.contains("example.org"));
    }

    #[test]
    fn test_entry_round_trips_through_json() {
        let entry = RemoteEntry::file("/pics/a.jpg", 42);
        assert_eq!(entry.name, "a.jpg");

        let json = serde_json::to_string(&entry).unwrap();
        let back: RemoteEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }
}
