//! # File Management Module
//!
//! Questo modulo gestisce la navigazione dell'albero remoto e la discovery di media.
//!
//! ## Responsabilità:
//! - Listing delle directory remote con cache read-through
//! - Discovery (opzionalmente ricorsiva) di file media remoti
//! - Selezione dei task per la pipeline (formato e dimensione minima)
//! - Utilità per calcoli dimensioni e percentuali
//!
//! ## Formati supportati:
//! - **Immagini**: JPG, JPEG, PNG
//!
//! ## Cache:
//! - Una listing fresca in cache evita la chiamata remota
//! - Errori di lettura/scrittura della cache producono solo un warning:
//!   la listing remota resta la fonte di verità

use crate::cache::DirectoryCache;
use crate::error::RemoteFsError;
use crate::pipeline::FileTask;
use crate::remotefs::{PathResolver, RemoteEntry, RemoteFs};
use tracing::{debug, warn};

/// Remote browsing and file helpers
pub struct FileManager;

impl FileManager {
    /// Lista una directory remota, servendo dalla cache se fresca
    pub async fn list_dir(
        fs: &dyn RemoteFs,
        cache: Option<&DirectoryCache>,
        path: &str,
    ) -> Result<Vec<RemoteEntry>, RemoteFsError> {
        let dir = fs.resolve(path);

        if let Some(cache) = cache {
            match cache.get::<Vec<RemoteEntry>>(&dir) {
                Ok(Some(entries)) => {
                    debug!("Serving {} entries for {} from cache", entries.len(), dir);
                    return Ok(entries);
                }
                Ok(None) => {}
                Err(e) => warn!("Ignoring unreadable cache entry for {}: {}", dir, e),
            }
        }

        let entries = fs.list(&dir).await?;

        if let Some(cache) = cache {
            if let Err(e) = cache.put(&dir, &entries) {
                warn!("Failed to cache listing for {}: {}", dir, e);
            }
        }

        Ok(entries)
    }

    /// Trova tutti i file media sotto `dir`; i symlink non vengono seguiti
    pub async fn find_media_files(
        fs: &dyn RemoteFs,
        cache: Option<&DirectoryCache>,
        dir: &str,
        recursive: bool,
    ) -> Result<Vec<RemoteEntry>, RemoteFsError> {
        let mut files = Vec::new();
        let mut pending = vec![fs.resolve(dir)];

        while let Some(current) = pending.pop() {
            for entry in Self::list_dir(fs, cache, &current).await? {
                if entry.is_symlink {
                    debug!("Skipping symlink {}", entry.path);
                } else if entry.is_dir {
                    if recursive {
                        pending.push(entry.path);
                    }
                } else if Self::is_image(&entry.name) {
                    files.push(entry);
                }
            }
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    /// Converte le entry in task: solo immagini regolari con `size >= min_size`
    pub fn select_tasks(entries: Vec<RemoteEntry>, min_size: u64) -> Vec<FileTask> {
        entries
            .into_iter()
            .filter(|e| !e.is_dir && !e.is_symlink)
            .filter(|e| Self::is_image(&e.name))
            .filter(|e| {
                let keep = e.size >= min_size;
                if !keep {
                    debug!("Skipping {} ({} < min size)", e.path, Self::format_size(e.size));
                }
                keep
            })
            .map(FileTask::new)
            .collect()
    }

    /// Check if a file name is a supported image
    pub fn is_image(name: &str) -> bool {
        matches!(Self::format_hint(name).as_str(), "jpg" | "jpeg" | "png")
    }

    /// Estensione lowercase del nome, vuota se assente
    pub fn format_hint(name: &str) -> String {
        let name = PathResolver::file_name(name);
        match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => ext.to_lowercase(),
            _ => String::new(),
        }
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }

    /// Calculate percentage reduction
    pub fn calculate_reduction(original_size: u64, new_size: u64) -> f64 {
        if original_size == 0 {
            0.0
        } else {
            ((original_size as f64 - new_size as f64) / original_size as f64) * 100.0
        }
    }
}
