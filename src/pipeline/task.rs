//! # Task Optimizer Module
//!
//! Worker per l'elaborazione di singoli file remoti.
//! Separato dall'orchestratore per maggiore modularità.
//!
//! ## Macchina a stati per file:
//! `Pending → Downloading → Downloaded → Optimizing → Optimized → (Uploading → Uploaded) | Skipped`
//! con `Failed` assorbente, raggiungibile da ogni stato non terminale.
//!
//! ## Eventi:
//! - Download: bytes letti vs. dimensione dichiarata della entry
//! - Optimize: dimensione ottimizzata vs. originale (terminale se skip)
//! - Upload: bytes scritti (sempre terminale)
//! - Un errore produce un solo evento terminale con `error`, nessuna fase successiva

use super::{Phase, ProgressEvent};
use crate::{
    error::{FileError, RemoteFsError},
    file_manager::FileManager,
    optimizer::{OptimizeParams, OptimizeResult, Optimizer},
    remotefs::{RemoteEntry, RemoteFs},
};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// One remote file designated for processing
#[derive(Debug, Clone)]
pub struct FileTask {
    pub entry: RemoteEntry,
}

impl FileTask {
    pub fn new(entry: RemoteEntry) -> Self {
        Self { entry }
    }
}

impl From<RemoteEntry> for FileTask {
    fn from(entry: RemoteEntry) -> Self {
        Self::new(entry)
    }
}

/// Per-file state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Pending,
    Downloading,
    Downloaded,
    Optimizing,
    Optimized,
    Uploading,
    Uploaded,
    Skipped,
    Failed,
}

impl FileState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Uploaded | Self::Skipped | Self::Failed)
    }

    /// Transizioni legali della macchina a stati
    pub fn can_transition_to(&self, next: FileState) -> bool {
        use FileState::*;
        match (self, next) {
            (from, Failed) => !from.is_terminal(),
            (Pending, Downloading)
            | (Downloading, Downloaded)
            | (Downloaded, Optimizing)
            | (Optimizing, Optimized)
            | (Optimizing, Skipped)
            | (Optimized, Uploading)
            | (Uploading, Uploaded) => true,
            _ => false,
        }
    }
}

/// Worker per elaborazione singoli file
pub struct TaskOptimizer {
    pub fs: Arc<dyn RemoteFs>,
    pub optimizer: Arc<dyn Optimizer>,
    pub params: OptimizeParams,
    pub events: mpsc::Sender<ProgressEvent>,
}

impl TaskOptimizer {
    /// Processa un singolo file e restituisce lo stato terminale raggiunto
    pub async fn process_single_file(&self, file_id: usize, task: FileTask) -> FileState {
        let entry = task.entry;
        let mut state = FileState::Pending;

        // Download
        self.advance(&mut state, FileState::Downloading, &entry);
        let data = match self.download(&entry.path).await {
            Ok(data) => data,
            Err(e) => return self.fail(&mut state, file_id, &entry, Phase::Download, e.into()).await,
        };
        self.advance(&mut state, FileState::Downloaded, &entry);
        let mut event = self.event(file_id, &entry, Phase::Download);
        event.bytes = data.len() as u64;
        event.total = entry.size;
        self.emit(event).await;

        // Optimize
        self.advance(&mut state, FileState::Optimizing, &entry);
        let hint = FileManager::format_hint(&entry.name);
        let optimized = match self.optimizer.optimize_bytes(data, &hint, &self.params).await {
            Ok(optimized) => optimized,
            Err(e) => return self.fail(&mut state, file_id, &entry, Phase::Optimize, e.into()).await,
        };

        if optimized.result.skipped {
            self.advance(&mut state, FileState::Skipped, &entry);
            debug!(
                "Skipping upload of {}: {}",
                entry.path,
                optimized.result.reason.as_deref().unwrap_or("skipped")
            );
            self.emit(self.optimize_event(file_id, &entry, optimized.result, true)).await;
            return state;
        }

        self.advance(&mut state, FileState::Optimized, &entry);
        self.emit(self.optimize_event(file_id, &entry, optimized.result, false)).await;

        // Upload
        self.advance(&mut state, FileState::Uploading, &entry);
        match self.upload(&entry.path, &optimized.bytes).await {
            Ok(written) => {
                self.advance(&mut state, FileState::Uploaded, &entry);
                let mut event = self.event(file_id, &entry, Phase::Upload);
                event.bytes = written;
                event.total = optimized.bytes.len() as u64;
                event.done = true;
                self.emit(event).await;
                state
            }
            Err(e) => self.fail(&mut state, file_id, &entry, Phase::Upload, e.into()).await,
        }
    }

    /// Legge l'intero oggetto; il reader viene rilasciato su ogni percorso di uscita
    async fn download(&self, path: &str) -> Result<Vec<u8>, RemoteFsError> {
        let (mut reader, _entry) = self.fs.open(path).await?;
        let mut data = Vec::new();
        reader
            .read_to_end(&mut data)
            .await
            .map_err(|source| RemoteFsError::Transport {
                path: path.to_string(),
                source,
            })?;
        Ok(data)
    }

    async fn upload(&self, path: &str, bytes: &[u8]) -> Result<u64, RemoteFsError> {
        let mut writer = self.fs.create(path, true).await?;
        let transport = |source| RemoteFsError::Transport {
            path: path.to_string(),
            source,
        };
        writer.write_all(bytes).await.map_err(transport)?;
        writer.shutdown().await.map_err(transport)?;
        Ok(bytes.len() as u64)
    }

    async fn fail(
        &self,
        state: &mut FileState,
        file_id: usize,
        entry: &RemoteEntry,
        phase: Phase,
        error: FileError,
    ) -> FileState {
        warn!("{} failed during {}: {}", entry.path, phase, error);
        self.advance(state, FileState::Failed, entry);

        let mut event = self.event(file_id, entry, phase);
        event.total = entry.size;
        event.done = true;
        event.error = Some(error);
        self.emit(event).await;
        *state
    }

    fn advance(&self, state: &mut FileState, next: FileState, entry: &RemoteEntry) {
        debug_assert!(
            state.can_transition_to(next),
            "illegal transition {:?} -> {:?}",
            state,
            next
        );
        debug!("{}: {:?} -> {:?}", entry.path, state, next);
        *state = next;
    }

    fn event(&self, file_id: usize, entry: &RemoteEntry, phase: Phase) -> ProgressEvent {
        ProgressEvent {
            file_id,
            name: entry.name.clone(),
            path: entry.path.clone(),
            phase,
            bytes: 0,
            total: 0,
            done: false,
            error: None,
            result: None,
            timestamp: SystemTime::now(),
        }
    }

    fn optimize_event(
        &self,
        file_id: usize,
        entry: &RemoteEntry,
        result: OptimizeResult,
        done: bool,
    ) -> ProgressEvent {
        let mut event = self.event(file_id, entry, Phase::Optimize);
        event.bytes = result.optimized_size;
        event.total = result.original_size;
        event.done = done;
        event.result = Some(result);
        event
    }

    /// Invia un evento; blocca finché il consumer non legge (backpressure)
    async fn emit(&self, event: ProgressEvent) {
        if self.events.send(event).await.is_err() {
            debug!("Progress receiver dropped, event discarded");
        }
    }
}
