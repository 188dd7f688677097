//! Test utilities shared by unit and integration tests.

// Test utilities are allowed to use std::fs since they only run on native platforms
#![allow(clippy::disallowed_methods)]

use crate::resolver::Resolver;
use crate::runtime::{Runtime, RuntimeError, RuntimeResult};
use crate::stages::{ChunkEmitter, ChunkRequest, EmittedChunk};
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};

/// Runtime over the real filesystem, rooted at a test directory.
///
/// Tests create files under a `tempfile::TempDir` and read them back through
/// the async [`Runtime`] API.
#[derive(Debug)]
pub struct TestRuntime {
    cwd: PathBuf,
}

impl TestRuntime {
    pub fn new(cwd: PathBuf) -> Self {
        Self { cwd }
    }
}

impl Default for TestRuntime {
    fn default() -> Self {
        Self::new(std::env::temp_dir())
    }
}

#[async_trait]
impl Runtime for TestRuntime {
    async fn read_file(&self, path: &Path) -> RuntimeResult<Vec<u8>> {
        std::fs::read(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RuntimeError::FileNotFound(path.to_path_buf())
            } else {
                RuntimeError::Io(e.to_string())
            }
        })
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn get_cwd(&self) -> RuntimeResult<PathBuf> {
        Ok(self.cwd.clone())
    }
}

/// Resolver backed by a fixed specifier table.
///
/// Unknown specifiers fail with [`Error::Resolution`]. Every call is recorded
/// so tests can assert on resolution traffic.
#[derive(Debug, Default)]
pub struct StaticResolver {
    table: FxHashMap<String, PathBuf>,
    calls: Mutex<Vec<String>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, specifier: &str, path: impl Into<PathBuf>) -> Self {
        self.table.insert(specifier.to_string(), path.into());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Resolver for StaticResolver {
    async fn resolve(&self, specifier: &str, importer: &Path) -> Result<PathBuf> {
        self.calls.lock().push(specifier.to_string());
        self.table
            .get(specifier)
            .cloned()
            .ok_or_else(|| Error::Resolution {
                specifier: specifier.to_string(),
                importer: importer.to_path_buf(),
                reason: "not in test table".to_string(),
            })
    }
}

/// Chunk emitter that names every chunk `<stem>.chunk.js` under `/assets`.
#[derive(Debug, Default)]
pub struct RecordingEmitter {
    emitted: Mutex<Vec<PathBuf>>,
}

impl RecordingEmitter {
    pub fn emitted(&self) -> Vec<PathBuf> {
        self.emitted.lock().clone()
    }
}

#[async_trait]
impl ChunkEmitter for RecordingEmitter {
    async fn emit_chunk(&self, path: &Path, _request: &ChunkRequest) -> Result<EmittedChunk> {
        self.emitted.lock().push(path.to_path_buf());
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("chunk");
        Ok(EmittedChunk {
            file_name: format!("/assets/{stem}.chunk.js"),
        })
    }
}
