//! Specifier resolution.
//!
//! Stages only depend on the [`Resolver`] trait; bundler integrations plug in
//! their own resolution. [`NodeResolver`] is the standalone default and
//! follows the node lookup order:
//!
//! 1. **Relative** (`./`, `../`): against the importer's directory
//! 2. **Absolute** (`/`): as is
//! 3. **Bare filenames** (`file.wasm`): next to the importer first, then
//!    `node_modules` (the wasm-bindgen pattern)
//! 4. **Packages** (`pkg/file`, `@scope/pkg/file`): walk up looking for
//!    `node_modules/<specifier>`
//!
//! Each candidate is tried verbatim, then with every configured extension,
//! then as a directory with an `index` file.

use crate::runtime::Runtime;
use crate::{Error, Result};
use async_trait::async_trait;
use path_clean::PathClean;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Resolve `specifier` as imported from `importer` to an absolute path.
#[async_trait]
pub trait Resolver: Send + Sync + std::fmt::Debug {
    async fn resolve(&self, specifier: &str, importer: &Path) -> Result<PathBuf>;
}

#[derive(Debug, Clone)]
pub struct NodeResolver {
    runtime: Arc<dyn Runtime>,
    cwd: PathBuf,
    extensions: Vec<String>,
}

impl NodeResolver {
    pub fn new(runtime: Arc<dyn Runtime>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            runtime,
            cwd: cwd.into(),
            extensions: crate::TransformConfig::default().extensions,
        }
    }

    /// Resolver rooted at the runtime's working directory.
    pub fn from_runtime_cwd(runtime: Arc<dyn Runtime>) -> Result<Self> {
        let cwd = runtime.get_cwd()?;
        Ok(Self::new(runtime, cwd))
    }

    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions;
        self
    }

    fn base_dir<'p>(&'p self, importer: &'p Path) -> &'p Path {
        // the importer may be virtual, so judge by extension rather than is_file()
        if importer.extension().is_some() {
            importer.parent().unwrap_or(&self.cwd)
        } else {
            importer
        }
    }

    fn absolutize(&self, path: PathBuf) -> PathBuf {
        if path.is_absolute() {
            path.clean()
        } else {
            self.cwd.join(path).clean()
        }
    }

    /// First existing file among `candidate`, `candidate.<ext>` and
    /// `candidate/index.<ext>`.
    fn probe(&self, candidate: &Path) -> Option<PathBuf> {
        tracing::trace!(candidate = %candidate.display(), "probing");
        if self.runtime.exists(candidate) && candidate.extension().is_some() {
            return Some(candidate.to_path_buf());
        }
        let file_name = candidate.file_name()?.to_string_lossy().into_owned();
        for ext in &self.extensions {
            let with_ext = candidate.with_file_name(format!("{file_name}{ext}"));
            if self.runtime.exists(&with_ext) {
                return Some(with_ext);
            }
        }
        for ext in &self.extensions {
            let index = candidate.join(format!("index{ext}"));
            if self.runtime.exists(&index) {
                return Some(index);
            }
        }
        None
    }

    fn resolve_relative(&self, specifier: &str, importer: &Path) -> Option<PathBuf> {
        let joined = self.absolutize(self.base_dir(importer).join(specifier));
        self.probe(&joined)
    }

    fn resolve_from_node_modules(&self, specifier: &str, importer: &Path) -> Option<PathBuf> {
        let start = self.absolutize(self.base_dir(importer).to_path_buf());
        start
            .ancestors()
            .map(|dir| dir.join("node_modules").join(specifier))
            .find_map(|candidate| self.probe(&candidate))
    }

    fn not_found(&self, specifier: &str, importer: &Path) -> Error {
        Error::Resolution {
            specifier: specifier.to_string(),
            importer: importer.to_path_buf(),
            reason: "no matching file found".to_string(),
        }
    }
}

#[async_trait]
impl Resolver for NodeResolver {
    async fn resolve(&self, specifier: &str, importer: &Path) -> Result<PathBuf> {
        let (specifier, _suffix) = split_query(specifier);
        tracing::trace!(specifier, importer = %importer.display(), "resolving");

        let resolved = if specifier.starts_with('.') {
            self.resolve_relative(specifier, importer)
        } else if specifier.starts_with('/') {
            self.probe(&PathBuf::from(specifier).clean())
        } else {
            let is_simple_filename = !specifier.contains('/')
                || (specifier.starts_with('@') && specifier.matches('/').count() == 1);
            if is_simple_filename {
                self.resolve_relative(specifier, importer)
                    .or_else(|| self.resolve_from_node_modules(specifier, importer))
            } else {
                self.resolve_from_node_modules(specifier, importer)
            }
        };

        match resolved {
            Some(path) => {
                tracing::trace!(resolved = %path.display(), "resolved");
                Ok(path)
            }
            None => Err(self.not_found(specifier, importer)),
        }
    }
}

/// Split `?query` / `#hash` suffixes off a specifier.
pub fn split_query(specifier: &str) -> (&str, &str) {
    match specifier.find(['?', '#']) {
        Some(0) | None => (specifier, ""),
        Some(index) => specifier.split_at(index),
    }
}
