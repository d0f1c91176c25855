//! # Remote Pipeline Orchestrator
//!
//! Orchestratore che esegue Download → Optimize → Upload su un insieme di
//! file remoti con concorrenza limitata.
//!
//! ## Responsabilità:
//! - Ammissione dei task tramite semaforo (al più `concurrency` file in volo)
//! - Canale di progresso (capacità 1: il consumer lento rallenta i worker)
//! - Canale di errori di run a slot singolo (solo errori di setup)
//! - Cancellazione cooperativa via `watch`: i task non ancora partiti non partono
//! - Isolamento dei fallimenti: un file che fallisce non ferma gli altri
//!
//! Entrambi i canali vengono chiusi dal supervisore quando tutti i task sono terminati.

use super::{
    task::{FileState, FileTask, TaskOptimizer},
    ProgressEvent,
};
use crate::{
    error::PipelineError,
    optimizer::{OptimizeParams, Optimizer},
    remotefs::RemoteFs,
};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Semaphore};
use tracing::{debug, error, info};

/// Default number of files in flight
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Scheduler della pipeline remota
pub struct Orchestrator {
    fs: Arc<dyn RemoteFs>,
    optimizer: Arc<dyn Optimizer>,
    concurrency: usize,
    params: OptimizeParams,
}

/// Conteggio finale degli stati raggiunti, usato per il log di fine run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunTally {
    pub uploaded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub not_started: usize,
}

impl RunTally {
    fn record(&mut self, outcome: Option<FileState>) {
        match outcome {
            Some(FileState::Uploaded) => self.uploaded += 1,
            Some(FileState::Skipped) => self.skipped += 1,
            Some(_) => self.failed += 1,
            None => self.not_started += 1,
        }
    }
}

impl Orchestrator {
    pub fn new(fs: Arc<dyn RemoteFs>, optimizer: Arc<dyn Optimizer>) -> Self {
        Self {
            fs,
            optimizer,
            concurrency: DEFAULT_CONCURRENCY,
            params: OptimizeParams::default(),
        }
    }

    /// Imposta il limite di file in volo; 0 viene trattato come 1
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_params(mut self, params: OptimizeParams) -> Self {
        self.params = params;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Avvia la run e ritorna subito i due canali.
    ///
    /// Il canale di progresso riceve gli eventi di tutti i file; quello di
    /// errori riceve al più un errore di setup. Entrambi si chiudono a fine run.
    /// Deve essere chiamato dentro un runtime tokio.
    pub fn run(
        &self,
        tasks: Vec<FileTask>,
        cancel: watch::Receiver<bool>,
    ) -> (mpsc::Receiver<ProgressEvent>, mpsc::Receiver<PipelineError>) {
        let (progress_tx, progress_rx) = mpsc::channel(1);
        let (error_tx, error_rx) = mpsc::channel(1);

        let fs = Arc::clone(&self.fs);
        let optimizer = Arc::clone(&self.optimizer);
        let params = self.params;
        let concurrency = self.concurrency;

        tokio::spawn(async move {
            if !fs.is_connected() {
                error!("Pipeline setup failed: remote filesystem is not connected");
                let _ = error_tx
                    .send(PipelineError::Configuration(
                        "remote filesystem is not connected".to_string(),
                    ))
                    .await;
                return;
            }

            let total = tasks.len();
            info!(
                "Starting pipeline for {} files under {} ({} concurrent)",
                total,
                fs.root(),
                concurrency
            );

            let semaphore = Arc::new(Semaphore::new(concurrency));
            let worker = Arc::new(TaskOptimizer {
                fs,
                optimizer,
                params,
                events: progress_tx,
            });

            let handles: Vec<_> = tasks
                .into_iter()
                .enumerate()
                .map(|(file_id, task)| {
                    let semaphore = Arc::clone(&semaphore);
                    let worker = Arc::clone(&worker);
                    let cancel = cancel.clone();

                    tokio::spawn(async move {
                        let _permit = semaphore.acquire_owned().await.ok()?;
                        let cancelled = *cancel.borrow();
                        if cancelled {
                            debug!("Run cancelled, not starting {}", task.entry.path);
                            return None;
                        }
                        Some(worker.process_single_file(file_id, task).await)
                    })
                })
                .collect();

            // Senza questo riferimento il canale di progresso si chiude con l'ultimo task
            drop(worker);

            let mut tally = RunTally::default();
            for outcome in join_all(handles).await {
                match outcome {
                    Ok(state) => tally.record(state),
                    Err(e) => {
                        error!("File task panicked: {}", e);
                        tally.failed += 1;
                    }
                }
            }

            info!(
                "Pipeline finished: {} uploaded, {} skipped, {} failed, {} not started (of {})",
                tally.uploaded, tally.skipped, tally.failed, tally.not_started, total
            );
        });

        (progress_rx, error_rx)
    }
}
