//! # Audit Module
//!
//! Registro per-file degli esiti di una run, scritto come array JSON.
//!
//! ## Responsabilità:
//! - `AuditRecord`: dimensioni, risparmio ed esito di un file
//! - `AuditLogger`: apre il file con `[`, accoda record separati da `,`,
//!   chiude con `]` in `close()` (idempotente)
//!
//! Il file è un array JSON valido solo dopo `close()`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

/// Outcome of a file in the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Optimized,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub path: String,
    pub original_size: u64,
    pub optimized_size: u64,
    pub savings_bytes: i64,
    pub savings_percent: f64,
    pub status: AuditStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AuditRecord {
    pub fn new(
        path: &str,
        original_size: u64,
        optimized_size: u64,
        status: AuditStatus,
        reason: Option<String>,
    ) -> Self {
        Self {
            path: path.to_string(),
            original_size,
            optimized_size,
            savings_bytes: original_size as i64 - optimized_size as i64,
            savings_percent: crate::file_manager::FileManager::calculate_reduction(
                original_size,
                optimized_size,
            ),
            status,
            reason,
        }
    }
}

struct AuditFile {
    writer: BufWriter<File>,
    first: bool,
}

/// Appends audit records to a JSON array file
pub struct AuditLogger {
    inner: Mutex<Option<AuditFile>>,
}

impl AuditLogger {
    /// Crea (o tronca) il file di audit
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create audit file {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        writer.write_all(b"[")?;

        debug!("Audit log opened at {}", path.display());
        Ok(Self {
            inner: Mutex::new(Some(AuditFile {
                writer,
                first: true,
            })),
        })
    }

    /// Accoda un record; no-op dopo `close()`
    pub fn append(&self, record: &AuditRecord) -> Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("audit lock poisoned"))?;
        let audit = match guard.as_mut() {
            Some(audit) => audit,
            None => return Ok(()),
        };

        if !audit.first {
            audit.writer.write_all(b",")?;
        }
        serde_json::to_writer(&mut audit.writer, record)?;
        audit.first = false;
        Ok(())
    }

    pub fn close(&self) -> Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("audit lock poisoned"))?;
        if let Some(mut audit) = guard.take() {
            audit.writer.write_all(b"]\n")?;
            audit.writer.flush()?;
        }
        Ok(())
    }
}
