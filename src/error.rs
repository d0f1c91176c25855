//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore custom della pipeline remota.
//!
//! ## Responsabilità:
//! - `RemoteFsError`: errori del filesystem remoto (connessione, path, trasporto)
//! - `OptimizeError`: errori dell'ottimizzatore di bytes
//! - `CacheError`: errori della cache delle directory
//! - `PipelineError`: errori di setup a livello di Run (canale errori dedicato)
//! - `FileError`: errore terminale di un singolo file, allegato al suo ProgressEvent
//!
//! ## Politica:
//! - Gli errori per singolo file non interrompono mai gli altri file
//! - Nessun retry interno: ritentare è responsabilità del chiamante
//! - Gli errori di deserializzazione della cache non diventano mai un "miss"
//!
//! ## Esempio:
//! ```ignore
//! if !exists {
//!     return Err(RemoteFsError::NotFound(path.to_string()));
//! }
//! ```

use std::io;

/// Errors surfaced by any RemoteFs backend
#[derive(thiserror::Error, Debug)]
pub enum RemoteFsError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Transport error on {path}: {source}")]
    Transport {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl RemoteFsError {
    /// Mappa un errore di I/O sulla tassonomia remota
    pub fn from_io(path: &str, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_string()),
            io::ErrorKind::AlreadyExists => Self::AlreadyExists(path.to_string()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_string()),
            _ => Self::Transport {
                path: path.to_string(),
                source: err,
            },
        }
    }
}

/// Errors returned by an Optimizer
#[derive(thiserror::Error, Debug)]
pub enum OptimizeError {
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Optimizer task failed: {0}")]
    Task(String),
}

/// Errors returned by the directory cache
#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    #[error("Cache store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("Cache directory error: {0}")]
    Io(#[from] io::Error),

    #[error("Cache payload error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Any call after `close()` is caller misuse
    #[error("Cache used after close")]
    Closed,

    #[error("Cache lock poisoned")]
    Poisoned,
}

/// Run-level failures, delivered on the dedicated error channel
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Terminal error of a single file
#[derive(thiserror::Error, Debug)]
pub enum FileError {
    #[error(transparent)]
    Remote(#[from] RemoteFsError),

    #[error(transparent)]
    Optimize(#[from] OptimizeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_io_maps_kinds() {
        let err = RemoteFsError::from_io("/a", io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, RemoteFsError::NotFound(p) if p == "/a"));

        let err = RemoteFsError::from_io("/a", io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, RemoteFsError::PermissionDenied(_)));

        let err = RemoteFsError::from_io("/a", io::Error::from(io::ErrorKind::AlreadyExists));
        assert!(matches!(err, RemoteFsError::AlreadyExists(_)));

        let err = RemoteFsError::from_io("/a", io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(matches!(err, RemoteFsError::Transport { .. }));
    }

    #[test]
    fn test_file_error_is_transparent() {
        let err: FileError = RemoteFsError::NotFound("/x.jpg".to_string()).into();
        assert_eq!(err.to_string(), "Not found: /x.jpg");
    }
}
