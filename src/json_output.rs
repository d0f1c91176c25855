//! # JSON Output Module
//!
//! Questo modulo gestisce l'output strutturato in JSON (una riga per messaggio)
//! per l'uso programmatico della CLI.
//!
//! ## Tipi di messaggi:
//! - `start`: Inizio run (root remota, directory, numero di file, config)
//! - `progress`: Un `ProgressEvent` della pipeline
//! - `file_complete`: Esito finale di un file
//! - `complete`: Fine run con statistiche finali
//! - `error`: Errore di run

use crate::config::Config;
use crate::pipeline::{Phase, ProgressEvent};
use crate::progress::OptimizationStats;
use serde::Serialize;

/// Tipo di messaggio JSON
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum JsonMessage {
    #[serde(rename = "start")]
    Start {
        root: String,
        dir: String,
        total_files: usize,
        config: JsonConfig,
    },

    #[serde(rename = "progress")]
    Progress {
        file_id: usize,
        path: String,
        phase: Phase,
        bytes: u64,
        total: u64,
        done: bool,
    },

    #[serde(rename = "file_complete")]
    FileComplete {
        path: String,
        original_size: u64,
        optimized_size: u64,
        reduction_percent: f64,
        skipped: bool,
        reason: Option<String>,
        error: Option<String>,
    },

    #[serde(rename = "complete")]
    Complete {
        #[serde(flatten)]
        stats: OptimizationStats,
        average_reduction: f64,
        duration_seconds: f64,
    },

    #[serde(rename = "error")]
    Error {
        message: String,
        details: Option<String>,
    },
}

/// Configurazione per output JSON
#[derive(Debug, Serialize)]
pub struct JsonConfig {
    pub jpeg_quality: u8,
    pub max_width: u32,
    pub max_height: u32,
    pub concurrency: usize,
    pub cache_ttl_secs: u64,
    pub skip_cache: bool,
}

impl JsonMessage {
    /// Serializza il messaggio su una riga
    pub fn to_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Emette il messaggio JSON su stdout
    pub fn emit(&self) {
        if let Ok(json) = self.to_line() {
            println!("{}", json);
        }
    }

    pub fn start(root: String, dir: String, total_files: usize, config: JsonConfig) -> Self {
        Self::Start {
            root,
            dir,
            total_files,
            config,
        }
    }

    pub fn progress(event: &ProgressEvent) -> Self {
        Self::Progress {
            file_id: event.file_id,
            path: event.path.clone(),
            phase: event.phase,
            bytes: event.bytes,
            total: event.total,
            done: event.done,
        }
    }

    /// Messaggio di completamento per l'evento terminale di un file
    pub fn file_complete(event: &ProgressEvent, original_size: u64, optimized_size: u64) -> Self {
        Self::FileComplete {
            path: event.path.clone(),
            original_size,
            optimized_size,
            reduction_percent: crate::file_manager::FileManager::calculate_reduction(
                original_size,
                optimized_size,
            ),
            skipped: event.is_skip(),
            reason: event.result.as_ref().and_then(|r| r.reason.clone()),
            error: event.error.as_ref().map(|e| e.to_string()),
        }
    }

    pub fn complete(stats: &OptimizationStats, duration_seconds: f64) -> Self {
        Self::Complete {
            average_reduction: stats.overall_reduction_percent(),
            stats: stats.clone(),
            duration_seconds,
        }
    }

    pub fn error(message: String, details: Option<String>) -> Self {
        Self::Error { message, details }
    }
}

impl From<&Config> for JsonConfig {
    fn from(config: &Config) -> Self {
        Self {
            jpeg_quality: config.jpeg_quality,
            max_width: config.max_width,
            max_height: config.max_height,
            concurrency: config.concurrency,
            cache_ttl_secs: config.cache_ttl_secs,
            skip_cache: config.skip_cache,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::time::SystemTime;

    #[test]
    fn test_progress_message_shape() {
        let event = ProgressEvent {
            file_id: 2,
            name: "a.jpg".to_string(),
            path: "/srv/a.jpg".to_string(),
            phase: Phase::Download,
            bytes: 10,
            total: 20,
            done: false,
            error: None,
            result: None,
            timestamp: SystemTime::now(),
        };

        let line = JsonMessage::progress(&event).to_line().unwrap();
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["type"], "progress");
        assert_eq!(value["phase"], "download");
        assert_eq!(value["file_id"], 2);
        assert_eq!(value["total"], 20);
    }

    #[test]
    fn test_complete_flattens_stats() {
        let mut stats = OptimizationStats::new();
        stats.add_optimized(100, 40);

        let line = JsonMessage::complete(&stats, 1.5).to_line().unwrap();
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["type"], "complete");
        assert_eq!(value["files_optimized"], 1);
        assert_eq!(value["total_bytes_saved"], 60);
        assert_eq!(value["average_reduction"], 60.0);
    }
}
