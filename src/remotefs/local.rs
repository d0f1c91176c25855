//! # Local Directory Backend
//!
//! Implementa il contratto `RemoteFs` sopra un albero di directory locale.
//!
//! ## Responsabilità:
//! - `connect`: canonicalizza e valida la root (vuota o `/` = working directory)
//! - Traduce gli errori di I/O nella tassonomia `RemoteFsError`
//! - Risolve i symlink dentro la root, mai fuori
//! - Verifica la posizione reale su disco (canonicalize) prima di ogni accesso:
//!   una directory o un file raggiunto tramite symlink fuori dalla root è `PermissionDenied`
//!
//! Serve come backend reale per la CLI e come banco di prova del clamp su un
//! filesystem vero.

use super::{ConnectionConfig, PathResolver, RemoteEntry, RemoteFs, RemoteReader, RemoteWriter};
use crate::error::RemoteFsError;
use async_trait::async_trait;
use std::fs::Metadata;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::SystemTime;
use tokio::fs;
use tracing::{debug, info, warn};

/// RemoteFs backed by a local directory
#[derive(Default)]
pub struct LocalFs {
    root: RwLock<Option<String>>,
}

impl LocalFs {
    pub fn new() -> Self {
        Self::default()
    }

    fn session_root(&self) -> Result<String, RemoteFsError> {
        self.root
            .read()
            .ok()
            .and_then(|root| root.clone())
            .ok_or_else(|| RemoteFsError::Connection("not connected".to_string()))
    }

    /// Costruisce la entry per un path già risolto
    async fn describe(&self, root: &str, path: &str) -> Result<RemoteEntry, RemoteFsError> {
        let link_meta = fs::symlink_metadata(path)
            .await
            .map_err(|e| RemoteFsError::from_io(path, e))?;
        let is_symlink = link_meta.file_type().is_symlink();

        let (meta, symlink_target) = if is_symlink {
            let raw = fs::read_link(path)
                .await
                .map_err(|e| RemoteFsError::from_io(path, e))?;
            let raw = raw.to_string_lossy().to_string();
            let target = if raw.starts_with('/') {
                PathResolver::resolve(root, &raw)
            } else {
                let base = PathResolver::parent(path).unwrap_or_else(|| root.to_string());
                PathResolver::resolve(root, &PathResolver::join(&[&base, &raw]))
            };
            // Dangling or escaping links keep the link's own metadata
            let meta = match Self::real_path(root, &target).await {
                Ok(real) => fs::metadata(&real).await.unwrap_or(link_meta),
                Err(_) => link_meta,
            };
            (meta, Some(target))
        } else {
            (link_meta, None)
        };

        Ok(RemoteEntry {
            path: path.to_string(),
            name: PathResolver::file_name(path),
            size: if meta.is_dir() { 0 } else { meta.len() },
            mode: Self::mode_of(&meta),
            mod_time: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            is_dir: meta.is_dir(),
            is_symlink,
            symlink_target,
        })
    }

    /// Posizione reale su disco di un path già risolto, confinata nella root
    async fn real_path(root: &str, path: &str) -> Result<String, RemoteFsError> {
        let canonical = fs::canonicalize(path)
            .await
            .map_err(|e| RemoteFsError::from_io(path, e))?;
        Self::confined(root, path, &canonical)
    }

    fn confined(root: &str, path: &str, real: &Path) -> Result<String, RemoteFsError> {
        let real = PathResolver::normalize(&real.to_string_lossy());
        if PathResolver::is_within(root, &real) {
            Ok(real)
        } else {
            warn!("{} resolves to {} outside root {}", path, real, root);
            Err(RemoteFsError::PermissionDenied(path.to_string()))
        }
    }

    /// Le directory intermedie di `path` non devono uscire dalla root
    async fn check_parent(root: &str, path: &str) -> Result<(), RemoteFsError> {
        if path == root {
            return Ok(());
        }
        let parent = PathResolver::parent(path).unwrap_or_else(|| root.to_string());
        Self::real_path(root, &parent).await.map(|_| ())
    }

    /// Destinazione reale di una scrittura: mai un file fuori dalla root
    async fn write_target(root: &str, path: &str) -> Result<String, RemoteFsError> {
        match fs::symlink_metadata(path).await {
            Ok(meta) if meta.file_type().is_symlink() => {
                // Dangling links are refused, live ones are written through their real target
                Self::real_path(root, path).await.map_err(|e| match e {
                    RemoteFsError::NotFound(_) => RemoteFsError::PermissionDenied(path.to_string()),
                    other => other,
                })
            }
            Ok(_) => Self::real_path(root, path).await,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let parent = PathResolver::parent(path).unwrap_or_else(|| root.to_string());
                let parent = Self::real_path(root, &parent).await?;
                Ok(PathResolver::join(&[&parent, &PathResolver::file_name(path)]))
            }
            Err(e) => Err(RemoteFsError::from_io(path, e)),
        }
    }

    #[cfg(unix)]
    fn mode_of(meta: &Metadata) -> u32 {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode()
    }

    #[cfg(not(unix))]
    fn mode_of(meta: &Metadata) -> u32 {
        if meta.permissions().readonly() {
            0o444
        } else {
            0o644
        }
    }
}

#[async_trait]
impl RemoteFs for LocalFs {
    async fn connect(&self, config: &ConnectionConfig) -> Result<(), RemoteFsError> {
        let requested = if config.remote_path.is_empty() || config.remote_path == "/" {
            std::env::current_dir().map_err(|e| RemoteFsError::Connection(e.to_string()))?
        } else {
            PathBuf::from(&config.remote_path)
        };

        let canonical = fs::canonicalize(&requested).await.map_err(|e| {
            RemoteFsError::Connection(format!("cannot open root {}: {}", requested.display(), e))
        })?;
        let meta = fs::metadata(&canonical)
            .await
            .map_err(|e| RemoteFsError::Connection(e.to_string()))?;
        if !meta.is_dir() {
            return Err(RemoteFsError::Connection(format!(
                "root is not a directory: {}",
                canonical.display()
            )));
        }

        let root = PathResolver::normalize(&canonical.to_string_lossy());
        info!("Connected to local tree rooted at {}", root);

        let mut slot = self
            .root
            .write()
            .map_err(|_| RemoteFsError::Connection("session lock poisoned".to_string()))?;
        *slot = Some(root);
        Ok(())
    }

    async fn close(&self) -> Result<(), RemoteFsError> {
        if let Ok(mut slot) = self.root.write() {
            if slot.take().is_some() {
                debug!("Local session closed");
            }
        }
        Ok(())
    }

    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>, RemoteFsError> {
        let root = self.session_root()?;
        let dir = PathResolver::resolve(&root, path);
        let real_dir = Self::real_path(&root, &dir).await?;

        let mut read_dir = fs::read_dir(&real_dir)
            .await
            .map_err(|e| RemoteFsError::from_io(&dir, e))?;

        let mut out = Vec::new();
        while let Some(item) = read_dir
            .next_entry()
            .await
            .map_err(|e| RemoteFsError::from_io(&dir, e))?
        {
            let name = item.file_name().to_string_lossy().to_string();
            let child = PathResolver::join(&[&dir, &name]);
            out.push(self.describe(&root, &child).await?);
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));

        debug!("Listed {} entries in {}", out.len(), dir);
        Ok(out)
    }

    async fn stat(&self, path: &str) -> Result<RemoteEntry, RemoteFsError> {
        let root = self.session_root()?;
        let path = PathResolver::resolve(&root, path);
        Self::check_parent(&root, &path).await?;
        self.describe(&root, &path).await
    }

    async fn open(&self, path: &str) -> Result<(RemoteReader, RemoteEntry), RemoteFsError> {
        let root = self.session_root()?;
        let path = PathResolver::resolve(&root, path);
        Self::check_parent(&root, &path).await?;
        let entry = self.describe(&root, &path).await?;
        if entry.is_dir {
            return Err(RemoteFsError::Transport {
                path,
                source: std::io::Error::new(std::io::ErrorKind::Other, "is a directory"),
            });
        }

        // Read the real location, never a raw link
        let source = Self::real_path(&root, &path).await?;
        let file = fs::File::open(&source)
            .await
            .map_err(|e| RemoteFsError::from_io(&path, e))?;
        Ok((Box::new(file), entry))
    }

    async fn create(&self, path: &str, overwrite: bool) -> Result<RemoteWriter, RemoteFsError> {
        let root = self.session_root()?;
        let path = PathResolver::resolve(&root, path);
        let target = Self::write_target(&root, &path).await?;

        let mut options = fs::OpenOptions::new();
        options.write(true);
        if overwrite {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }

        let file = options
            .open(&target)
            .await
            .map_err(|e| RemoteFsError::from_io(&path, e))?;
        Ok(Box::new(file))
    }

    fn root(&self) -> String {
        self.root
            .read()
            .ok()
            .and_then(|root| root.clone())
            .unwrap_or_default()
    }

    fn is_connected(&self) -> bool {
        self.root.read().map(|root| root.is_some()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn connected(dir: &TempDir) -> LocalFs {
        let fs = LocalFs::new();
        let config = ConnectionConfig {
            remote_path: dir.path().to_string_lossy().to_string(),
            ..Default::default()
        };
        fs.connect(&config).await.unwrap();
        fs
    }

    #[tokio::test]
    async fn test_connect_rejects_missing_root() {
        let fs = LocalFs::new();
        let config = ConnectionConfig {
            remote_path: "/definitely/not/here".to_string(),
            ..Default::default()
        };
        assert!(matches!(fs.connect(&config).await, Err(RemoteFsError::Connection(_))));
        assert!(!fs.is_connected());
        assert!(matches!(fs.list(".").await, Err(RemoteFsError::Connection(_))));
    }

    #[tokio::test]
    async fn test_list_open_and_create() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir(temp_dir.path().join("pics")).unwrap();
        std::fs::write(temp_dir.path().join("pics/a.jpg"), b"abc").unwrap();
        let fs = connected(&temp_dir).await;

        let entries = fs.list("pics").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "a.jpg");
        assert_eq!(entries[0].size, 3);

        let (mut reader, entry) = fs.open("pics/a.jpg").await.unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"abc");
        assert!(!entry.is_dir);

        assert!(matches!(
            fs.create("pics/a.jpg", false).await,
            Err(RemoteFsError::AlreadyExists(_))
        ));

        let mut writer = fs.create("pics/a.jpg", true).await.unwrap();
        writer.write_all(b"z").await.unwrap();
        writer.shutdown().await.unwrap();
        drop(writer);
        assert_eq!(std::fs::read(temp_dir.path().join("pics/a.jpg")).unwrap(), b"z");
    }

    #[tokio::test]
    async fn test_traversal_never_leaves_root() {
        let temp_dir = TempDir::new().unwrap();
        let fs = connected(&temp_dir).await;

        let escaped = fs.stat("../../..").await.unwrap();
        assert_eq!(escaped.path, fs.root());
        assert!(escaped.is_dir);

        assert!(matches!(fs.stat("missing.jpg").await, Err(RemoteFsError::NotFound(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_target_is_confined() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("real.jpg"), b"data").unwrap();
        std::os::unix::fs::symlink("real.jpg", temp_dir.path().join("link.jpg")).unwrap();
        std::os::unix::fs::symlink("/etc/hostname", temp_dir.path().join("escape")).unwrap();
        let fs = connected(&temp_dir).await;

        let link = fs.stat("link.jpg").await.unwrap();
        assert!(link.is_symlink);
        assert_eq!(link.size, 4);
        assert_eq!(link.symlink_target, Some(format!("{}/real.jpg", fs.root())));

        let escape = fs.stat("escape").await.unwrap();
        let target = escape.symlink_target.unwrap();
        assert!(PathResolver::is_within(&fs.root(), &target));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_create_never_writes_through_escaping_link() {
        let temp_dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let victim = outside.path().join("victim.jpg");
        std::fs::write(&victim, b"original").unwrap();
        std::os::unix::fs::symlink(&victim, temp_dir.path().join("evil.jpg")).unwrap();
        std::os::unix::fs::symlink(outside.path().join("gone.jpg"), temp_dir.path().join("dangling.jpg")).unwrap();
        std::os::unix::fs::symlink(outside.path(), temp_dir.path().join("linkdir")).unwrap();
        let fs = connected(&temp_dir).await;

        assert!(matches!(
            fs.create("evil.jpg", true).await,
            Err(RemoteFsError::PermissionDenied(_))
        ));
        assert!(matches!(
            fs.create("dangling.jpg", true).await,
            Err(RemoteFsError::PermissionDenied(_))
        ));
        assert!(matches!(
            fs.create("linkdir/new.jpg", true).await,
            Err(RemoteFsError::PermissionDenied(_))
        ));

        assert_eq!(std::fs::read(&victim).unwrap(), b"original");
        assert!(!outside.path().join("gone.jpg").exists());
        assert!(!outside.path().join("new.jpg").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_linked_directory_outside_root_is_refused() {
        let temp_dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        std::fs::write(outside.path().join("victim.jpg"), b"secret").unwrap();
        std::os::unix::fs::symlink(outside.path(), temp_dir.path().join("linkdir")).unwrap();
        // A chain: hop -> linkdir -> outside
        std::os::unix::fs::symlink("linkdir", temp_dir.path().join("hop")).unwrap();
        let fs = connected(&temp_dir).await;

        assert!(matches!(fs.list("linkdir").await, Err(RemoteFsError::PermissionDenied(_))));
        assert!(matches!(fs.list("hop").await, Err(RemoteFsError::PermissionDenied(_))));
        assert!(matches!(
            fs.open("linkdir/victim.jpg").await,
            Err(RemoteFsError::PermissionDenied(_))
        ));
        assert!(matches!(
            fs.stat("hop/victim.jpg").await,
            Err(RemoteFsError::PermissionDenied(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_links_inside_root_are_followed() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir(temp_dir.path().join("pics")).unwrap();
        std::fs::write(temp_dir.path().join("pics/a.jpg"), b"abc").unwrap();
        std::os::unix::fs::symlink("pics", temp_dir.path().join("album")).unwrap();
        std::os::unix::fs::symlink("pics/a.jpg", temp_dir.path().join("cover.jpg")).unwrap();
        let fs = connected(&temp_dir).await;

        let entries = fs.list("album").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, format!("{}/album/a.jpg", fs.root()));

        let mut writer = fs.create("cover.jpg", true).await.unwrap();
        writer.write_all(b"xy").await.unwrap();
        writer.shutdown().await.unwrap();
        drop(writer);

        assert_eq!(std::fs::read(temp_dir.path().join("pics/a.jpg")).unwrap(), b"xy");
        assert!(std::fs::symlink_metadata(temp_dir.path().join("cover.jpg"))
            .unwrap()
            .file_type()
            .is_symlink());
    }
}
