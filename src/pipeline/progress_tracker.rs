//! # Progress Tracking Module
//!
//! Consumer degli eventi della pipeline: unifica progress bar, statistiche,
//! output JSON e audit in un singolo tracker.
//!
//! ## Responsabilità:
//! - Avanza la progress bar di un'unità per ogni evento terminale
//! - Accumula `OptimizationStats` (byte scaricati, caricati, risparmiati)
//! - Emette una riga JSON per evento quando `json_output` è attivo
//! - Scrive un `AuditRecord` per ogni file concluso

use super::{Phase, ProgressEvent};
use crate::{
    audit::{AuditLogger, AuditRecord, AuditStatus},
    error::PipelineError,
    json_output::JsonMessage,
    optimizer::OptimizeResult,
    progress::{OptimizationStats, ProgressManager},
};
use anyhow::Result;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, warn};

/// Tracker progress unificato
pub struct ProgressTracker {
    progress: ProgressManager,
    stats: OptimizationStats,
    json_output: bool,
    audit: Option<AuditLogger>,
    /// Risultati di Optimize in attesa dell'evento terminale del file
    pending: HashMap<usize, OptimizeResult>,
}

impl ProgressTracker {
    /// Crea un nuovo tracker; in modalità JSON la progress bar è nascosta
    pub fn new(total_files: usize, json_output: bool, audit: Option<AuditLogger>) -> Self {
        let progress = if json_output {
            ProgressManager::hidden(total_files as u64)
        } else {
            ProgressManager::new(total_files as u64)
        };
        Self::with_manager(progress, json_output, audit)
    }

    pub fn with_manager(progress: ProgressManager, json_output: bool, audit: Option<AuditLogger>) -> Self {
        Self {
            progress,
            stats: OptimizationStats::new(),
            json_output,
            audit,
            pending: HashMap::new(),
        }
    }

    pub fn stats(&self) -> &OptimizationStats {
        &self.stats
    }

    /// Consuma eventi finché la pipeline non chiude il canale
    pub async fn consume(&mut self, events: &mut mpsc::Receiver<ProgressEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(&event);
        }
    }

    pub fn handle_event(&mut self, event: &ProgressEvent) {
        if self.json_output {
            JsonMessage::progress(event).emit();
        }

        if event.phase == Phase::Download && event.error.is_none() {
            self.stats.add_downloaded(event.bytes);
        }

        if !event.done {
            if let Some(result) = &event.result {
                self.pending.insert(event.file_id, result.clone());
            }
            return;
        }

        let pending = self.pending.remove(&event.file_id);
        let result = event.result.clone().or(pending);
        let original_size = result.as_ref().map_or(event.total, |r| r.original_size);

        let (message, record) = if let Some(err) = &event.error {
            self.stats.add_error();
            (
                format!("[ERR] {} ({}): {}", event.name, event.phase, err),
                AuditRecord::new(
                    &event.path,
                    original_size,
                    original_size,
                    AuditStatus::Failed,
                    Some(err.to_string()),
                ),
            )
        } else if event.is_skip() {
            self.stats.add_skipped(original_size);
            let reason = result.as_ref().and_then(|r| r.reason.clone());
            (
                format!(
                    "[SKIP] {}: {}",
                    event.name,
                    reason.as_deref().unwrap_or("no optimization needed")
                ),
                AuditRecord::new(&event.path, original_size, original_size, AuditStatus::Skipped, reason),
            )
        } else {
            let uploaded = event.bytes;
            self.stats.add_optimized(original_size, uploaded);
            let record = AuditRecord::new(&event.path, original_size, uploaded, AuditStatus::Optimized, None);
            (
                format!("[OK] {}: {:.1}% saved", event.name, record.savings_percent),
                record,
            )
        };

        if self.json_output {
            JsonMessage::file_complete(event, record.original_size, record.optimized_size).emit();
        }
        if let Some(audit) = &self.audit {
            if let Err(e) = audit.append(&record) {
                warn!("Failed to write audit record for {}: {}", event.path, e);
            }
        }
        self.progress.update(&message);
    }

    /// Riporta un errore di run
    pub fn handle_run_error(&self, err: &PipelineError) {
        error!("Run failed: {}", err);
        if self.json_output {
            JsonMessage::error("Run failed".to_string(), Some(err.to_string())).emit();
        } else {
            self.progress.set_message(&format!("Run failed: {}", err));
        }
    }

    /// Finalizza progress bar, audit e output JSON
    pub fn finish(self, elapsed: Duration) -> Result<OptimizationStats> {
        if let Some(audit) = &self.audit {
            audit.close()?;
        }
        if self.json_output {
            JsonMessage::complete(&self.stats, elapsed.as_secs_f64()).emit();
        }
        self.progress.finish(&self.stats.format_summary());
        Ok(self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FileError, RemoteFsError};
    use std::time::SystemTime;
    use tempfile::TempDir;

    fn event(file_id: usize, phase: Phase, bytes: u64, total: u64, done: bool) -> ProgressEvent {
        ProgressEvent {
            file_id,
            name: format!("f{}.jpg", file_id),
            path: format!("/srv/f{}.jpg", file_id),
            phase,
            bytes,
            total,
            done,
            error: None,
            result: None,
            timestamp: SystemTime::now(),
        }
    }

    fn optimized(original: u64, new: u64) -> OptimizeResult {
        OptimizeResult {
            original_size: original,
            optimized_size: new,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_tracker_accumulates_outcomes() {
        let temp_dir = TempDir::new().unwrap();
        let audit_path = temp_dir.path().join("audit.json");
        let audit = AuditLogger::create(&audit_path).unwrap();
        let mut tracker = ProgressTracker::with_manager(ProgressManager::hidden(3), false, Some(audit));

        let (tx, mut rx) = mpsc::channel(16);

        // f0: uploaded
        tx.send(event(0, Phase::Download, 1000, 1000, false)).await.unwrap();
        let mut opt = event(0, Phase::Optimize, 400, 1000, false);
        opt.result = Some(optimized(1000, 400));
        tx.send(opt).await.unwrap();
        tx.send(event(0, Phase::Upload, 400, 400, true)).await.unwrap();

        // f1: skipped
        tx.send(event(1, Phase::Download, 50, 50, false)).await.unwrap();
        let mut skip = event(1, Phase::Optimize, 50, 50, true);
        skip.result = Some(OptimizeResult::skipped(50, "insufficient-reduction", Duration::ZERO));
        tx.send(skip).await.unwrap();

        // f2: failed download
        let mut failed = event(2, Phase::Download, 0, 70, true);
        failed.error = Some(FileError::Remote(RemoteFsError::NotFound("/srv/f2.jpg".to_string())));
        tx.send(failed).await.unwrap();
        drop(tx);

        tracker.consume(&mut rx).await;
        let stats = tracker.finish(Duration::from_secs(1)).unwrap();

        assert_eq!(stats.files_processed, 3);
        assert_eq!(stats.files_optimized, 1);
        assert_eq!(stats.files_skipped, 1);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.bytes_downloaded, 1050);
        assert_eq!(stats.bytes_uploaded, 400);
        assert_eq!(stats.total_bytes_saved, 600);

        let records: Vec<AuditRecord> =
            serde_json::from_str(&std::fs::read_to_string(&audit_path).unwrap()).unwrap();
        let statuses: Vec<_> = records.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![AuditStatus::Optimized, AuditStatus::Skipped, AuditStatus::Failed]
        );
        assert_eq!(records[0].savings_bytes, 600);
        assert_eq!(records[2].original_size, 70);
    }

    #[test]
    fn test_upload_failure_uses_pending_result() {
        let mut tracker = ProgressTracker::with_manager(ProgressManager::hidden(1), false, None);

        let mut opt = event(0, Phase::Optimize, 300, 900, false);
        opt.result = Some(optimized(900, 300));
        tracker.handle_event(&opt);

        let mut failed = event(0, Phase::Upload, 0, 900, true);
        failed.error = Some(FileError::Remote(RemoteFsError::PermissionDenied("/srv/f0.jpg".to_string())));
        tracker.handle_event(&failed);

        assert_eq!(tracker.stats().errors, 1);
        assert_eq!(tracker.stats().bytes_uploaded, 0);
        assert!(tracker.pending.is_empty());
    }
}
