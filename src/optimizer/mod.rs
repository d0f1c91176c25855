//! # Optimizer Module
//!
//! Capability che trasforma i bytes grezzi di un file in bytes ottimizzati.
//! La pipeline dipende solo dal trait `Optimizer`; l'implementazione concreta
//! (`ImageOptimizer`) vive nel sottomodulo `image_optimizer`.

pub mod image_optimizer;

pub use image_optimizer::ImageOptimizer;

use crate::error::OptimizeError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Parametri di ottimizzazione passati per ogni file
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptimizeParams {
    /// JPEG quality (1-100)
    pub quality: u8,
    /// Max output width, 0 = unlimited
    pub max_width: u32,
    /// Max output height, 0 = unlimited
    pub max_height: u32,
}

impl Default for OptimizeParams {
    fn default() -> Self {
        Self {
            quality: 80,
            max_width: 0,
            max_height: 0,
        }
    }
}

/// Outcome of one optimization
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizeResult {
    pub original_size: u64,
    pub optimized_size: u64,
    pub duration: Duration,
    pub skipped: bool,
    pub reason: Option<String>,
}

impl OptimizeResult {
    /// Risultato "skip": nessun upload deve seguire
    pub fn skipped(original_size: u64, reason: &str, duration: Duration) -> Self {
        Self {
            original_size,
            optimized_size: original_size,
            duration,
            skipped: true,
            reason: Some(reason.to_string()),
        }
    }

    pub fn savings_bytes(&self) -> i64 {
        self.original_size as i64 - self.optimized_size as i64
    }

    pub fn savings_percent(&self) -> f64 {
        crate::file_manager::FileManager::calculate_reduction(self.original_size, self.optimized_size)
    }
}

/// Optimized bytes plus the result describing them
#[derive(Debug, Clone)]
pub struct Optimized {
    pub bytes: Vec<u8>,
    pub result: OptimizeResult,
}

/// Transforms the bytes of one file.
///
/// `format_hint` is the lowercase extension of the file name (`"jpg"`, `"png"`),
/// empty when the name has none. Unsupported inputs should come back as a
/// skipped result rather than an error.
#[async_trait]
pub trait Optimizer: Send + Sync {
    async fn optimize_bytes(
        &self,
        data: Vec<u8>,
        format_hint: &str,
        params: &OptimizeParams,
    ) -> Result<Optimized, OptimizeError>;
}
