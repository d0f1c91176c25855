//! # Remote Media Optimizer Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare dell'applicazione
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per altri consumatori
//!
//! ## Architettura dei moduli:
//! - `remotefs`: Albero remoto confinato a una root (trait + backend local/memory)
//! - `optimizer`: Trasformazione bytes → bytes ottimizzati (trait + ImageOptimizer)
//! - `pipeline`: Orchestratore Download → Optimize → Upload con concorrenza limitata
//! - `cache`: Cache TTL delle listing su SQLite
//! - `file_manager`: Navigazione remota e selezione dei file
//! - `config`: Gestione configurazione e validazione parametri
//! - `error`: Tipi di errore custom per diverse operazioni
//! - `progress` / `json_output` / `audit`: Reporting
//!
//! ## Utilizzo:
//! ```ignore
//! use remote_media_optimizer::{ImageOptimizer, LocalFs, Orchestrator};
//!
//! let fs = Arc::new(LocalFs::new());
//! fs.connect(&connection).await?;
//! let orchestrator = Orchestrator::new(fs, Arc::new(ImageOptimizer::default()));
//! let (mut events, mut errors) = orchestrator.run(tasks, cancel);
//! ```

pub mod audit;
pub mod cache;
pub mod config;
pub mod error;
pub mod file_manager;
pub mod json_output;
pub mod optimizer;
pub mod pipeline;
pub mod progress;
pub mod remotefs;

pub use cache::DirectoryCache;
pub use config::Config;
pub use error::{CacheError, FileError, OptimizeError, PipelineError, RemoteFsError};
pub use optimizer::{ImageOptimizer, OptimizeParams, OptimizeResult, Optimizer};
pub use pipeline::{FileState, FileTask, Orchestrator, Phase, ProgressEvent, ProgressTracker};
pub use remotefs::{ConnectionConfig, LocalFs, MemoryFs, RemoteEntry, RemoteFs};
