//! # Directory Cache Module
//!
//! Cache TTL delle listing remote su uno store embedded durevole (SQLite).
//!
//! ## Responsabilità:
//! - `put`: serializza il valore in JSON e lo salva con il timestamp corrente
//! - `get`: restituisce il valore solo se `now - stored_at <= ttl`
//! - Le entry scadute restano nello store finché non vengono sovrascritte
//! - `close`: rilascia lo store; ogni chiamata successiva fallisce con `Closed`
//!
//! ## Strategia di persistence:
//! - Un file SQLite per endpoint remoto (vedi `ConfigPaths`)
//! - Tabella `dir(path TEXT PRIMARY KEY, stored_at INTEGER, payload BLOB)`
//! - `stored_at` in millisecondi Unix
//!
//! L'orologio è iniettabile per rendere testabile la scadenza.

use crate::error::CacheError;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Sorgente del tempo corrente
pub type Clock = Arc<dyn Fn() -> SystemTime + Send + Sync>;

/// Raw row as stored, regardless of freshness
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRecord {
    pub stored_at: SystemTime,
    pub payload: Vec<u8>,
}

/// TTL cache of directory listings keyed by directory path
pub struct DirectoryCache {
    conn: Mutex<Option<Connection>>,
    ttl: Duration,
    clock: Clock,
}

impl DirectoryCache {
    /// Apre (o crea) lo store al path indicato
    pub fn open(path: &Path, ttl: Duration) -> Result<Self, CacheError> {
        Self::open_with_clock(path, ttl, Arc::new(SystemTime::now))
    }

    pub fn open_with_clock(path: &Path, ttl: Duration, clock: Clock) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(1))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS dir (
                path      TEXT PRIMARY KEY,
                stored_at INTEGER NOT NULL,
                payload   BLOB NOT NULL
            );",
        )?;

        info!("Directory cache opened at {} (ttl {:?})", path.display(), ttl);
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            ttl,
            clock,
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Salva `value` sotto `dir`, sostituendo ogni entry precedente
    pub fn put<T: Serialize>(&self, dir: &str, value: &T) -> Result<(), CacheError> {
        let payload = serde_json::to_vec(value)?;
        let stored_at = to_millis((self.clock)());

        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO dir (path, stored_at, payload) VALUES (?1, ?2, ?3)",
                params![dir, stored_at, payload],
            )?;
            Ok(())
        })?;

        debug!("Cached listing for {} ({} bytes)", dir, payload.len());
        Ok(())
    }

    /// Valore fresco per `dir`; `None` se assente o scaduto.
    ///
    /// Un payload non decodificabile è un errore, non un miss.
    pub fn get<T: DeserializeOwned>(&self, dir: &str) -> Result<Option<T>, CacheError> {
        let record = match self.record(dir)? {
            Some(record) => record,
            None => {
                debug!("Cache miss for {}", dir);
                return Ok(None);
            }
        };

        let age = (self.clock)()
            .duration_since(record.stored_at)
            .unwrap_or(Duration::ZERO);
        if age > self.ttl {
            debug!("Cache entry for {} is stale ({:?} old)", dir, age);
            return Ok(None);
        }

        Ok(Some(serde_json::from_slice(&record.payload)?))
    }

    /// Riga grezza per `dir`, fresca o scaduta
    pub fn record(&self, dir: &str) -> Result<Option<CacheRecord>, CacheError> {
        let row = self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT stored_at, payload FROM dir WHERE path = ?1",
                    params![dir],
                    |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?)),
                )
                .optional()?)
        })?;

        Ok(row.map(|(stored_at, payload)| CacheRecord {
            stored_at: from_millis(stored_at),
            payload,
        }))
    }

    /// Chiude lo store; idempotente
    pub fn close(&self) -> Result<(), CacheError> {
        let mut slot = self.conn.lock().map_err(|_| CacheError::Poisoned)?;
        if let Some(conn) = slot.take() {
            conn.close().map_err(|(_, e)| CacheError::Store(e))?;
            debug!("Directory cache closed");
        }
        Ok(())
    }

    fn with_conn<R>(
        &self,
        f: impl FnOnce(&Connection) -> Result<R, CacheError>,
    ) -> Result<R, CacheError> {
        let slot = self.conn.lock().map_err(|_| CacheError::Poisoned)?;
        match slot.as_ref() {
            Some(conn) => f(conn),
            None => Err(CacheError::Closed),
        }
    }
}

fn to_millis(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis().min(i64::MAX as u128) as i64)
        .unwrap_or(0)
}

fn from_millis(millis: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(millis.max(0) as u64)
}
