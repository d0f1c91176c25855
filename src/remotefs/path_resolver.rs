//! # Path Resolution Module
//!
//! Centralizza tutta la logica di risoluzione dei path remoti.
//! Ogni backend RemoteFs delega qui, così il confinamento nella root ("chroot")
//! è implementato una sola volta.
//!
//! I path remoti sono sempre stringhe POSIX con separatore `/`, indipendentemente
//! dal sistema operativo locale.

use tracing::debug;

/// Utility per calcolare i path remoti in modo centralizzato
pub struct PathResolver;

impl PathResolver {
    /// Risolve `path` rispetto a `root` e lo confina dentro `root`.
    ///
    /// - vuoto o `.` → root
    /// - relativo → unito alla root, normalizzato, poi clampato
    /// - assoluto già dentro la root → mantenuto
    /// - assoluto fuori dalla root → reinterpretato come relativo alla root, poi clampato
    pub fn resolve(root: &str, path: &str) -> String {
        let root = Self::normalize_root(root);
        let path = path.trim();

        if path.is_empty() || path == "." {
            return root;
        }

        if path.starts_with('/') {
            let candidate = Self::normalize(path);
            if Self::is_within(&root, &candidate) {
                return candidate;
            }
            let relative = path.trim_start_matches('/');
            return Self::clamp(&root, Self::normalize(&format!("{}/{}", root, relative)));
        }

        Self::clamp(&root, Self::normalize(&format!("{}/{}", root, path)))
    }

    /// Unisce segmenti e normalizza il risultato (nessun clamp)
    pub fn join(segments: &[&str]) -> String {
        let joined = segments
            .iter()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("/");
        Self::normalize(&joined)
    }

    /// Normalizzazione lessicale: collassa `.`, `..` e separatori doppi
    pub fn normalize(path: &str) -> String {
        let absolute = path.starts_with('/');
        let mut parts: Vec<&str> = Vec::new();

        for segment in path.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    if parts.last().map_or(false, |last| *last != "..") {
                        parts.pop();
                    } else if !absolute {
                        parts.push("..");
                    }
                }
                other => parts.push(other),
            }
        }

        let joined = parts.join("/");
        if absolute {
            format!("/{}", joined)
        } else if joined.is_empty() {
            ".".to_string()
        } else {
            joined
        }
    }

    /// True se `path` coincide con `root` o sta sotto di essa (per componenti, non per prefisso)
    pub fn is_within(root: &str, path: &str) -> bool {
        if root == "/" {
            return path.starts_with('/');
        }
        path == root
            || path
                .strip_prefix(root)
                .map_or(false, |rest| rest.starts_with('/'))
    }

    /// Directory padre; `None` per la root del filesystem
    pub fn parent(path: &str) -> Option<String> {
        let path = Self::normalize(path);
        if path == "/" || path == "." {
            return None;
        }
        match path.rfind('/') {
            Some(0) => Some("/".to_string()),
            Some(idx) => Some(path[..idx].to_string()),
            None => Some(".".to_string()),
        }
    }

    /// Ultimo componente del path
    pub fn file_name(path: &str) -> String {
        let path = Self::normalize(path);
        path.rsplit('/').next().unwrap_or_default().to_string()
    }

    fn normalize_root(root: &str) -> String {
        let root = root.trim();
        if root.is_empty() {
            return "/".to_string();
        }
        Self::normalize(root)
    }

    fn clamp(root: &str, candidate: String) -> String {
        if Self::is_within(root, &candidate) {
            candidate
        } else {
            debug!("Path {} escapes root {}, clamped to root", candidate, root);
            root.to_string()
        }
    }
}
