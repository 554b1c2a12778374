// src/storage/cache.rs
//! On-disk copy of the server list.
//!
//! The file is only ever replaced through `<path>.tmp` and a rename, so a
//! reader sees either the previous list or the new one.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use crate::models::server::ServerRecord;

pub const CACHE_VERSION: u32 = 3;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid cache data: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Cache version {found} is older than {expected}")]
    Incompatible { found: u32, expected: u32 },
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    servers: Vec<ServerRecord>,
}

/// Servers read back from disk together with the time they were written.
#[derive(Debug)]
pub struct LoadedCache {
    pub servers: Vec<ServerRecord>,
    pub captured_at: Option<SystemTime>,
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

pub fn load(path: &Path) -> Result<LoadedCache, CacheError> {
    let bytes = fs::read(path)?;
    let captured_at = fs::metadata(path).and_then(|m| m.modified()).ok();

    let data: CacheFile = serde_json::from_slice(&bytes)?;
    if data.version < CACHE_VERSION {
        return Err(CacheError::Incompatible {
            found: data.version,
            expected: CACHE_VERSION,
        });
    }

    debug!("Read {} cached servers from {}", data.servers.len(), path.display());
    Ok(LoadedCache {
        servers: data.servers,
        captured_at,
    })
}

/// Like [`load`], but every failure means "no cache".
pub fn load_or_empty(path: &Path) -> Option<LoadedCache> {
    match load(path) {
        Ok(cache) => Some(cache),
        Err(CacheError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("No server cache at {}, starting empty", path.display());
            None
        }
        Err(e) => {
            warn!("Ignoring server cache {}: {}", path.display(), e);
            None
        }
    }
}

pub fn save(path: &Path, servers: &[ServerRecord]) -> Result<(), CacheError> {
    #[derive(Serialize)]
    struct CacheFileRef<'a> {
        version: u32,
        servers: &'a [ServerRecord],
    }

    let data = serde_json::to_vec_pretty(&CacheFileRef {
        version: CACHE_VERSION,
        servers,
    })?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp = temp_path(path);
    {
        let mut file = File::create(&tmp)?;
        file.write_all(&data)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;

    info!("Wrote {} servers to {}", servers.len(), path.display());
    Ok(())
}
