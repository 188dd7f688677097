//! Build-facing facade over the entry cache and stage registry.
//!
//! A [`Pipeline`] lives for one build. Files may be transformed concurrently;
//! stages for one file run strictly in registry order while that file's
//! entry is locked.

use crate::Result;
use crate::cache::{EntryCache, SharedEntry};
use crate::config::TransformConfig;
use crate::diagnostics::Diagnostic;
use crate::entry::{Entry, EntryState, FinalOutput};
use crate::resolver::Resolver;
use crate::runtime::Runtime;
use crate::stages::{ChunkEmitter, ChunkRequest, Stage, StageContext, StageRegistry};
use crate::target::Target;
use crate::transform::{TransformContext, TransformOptions, TransformResult};
use std::path::Path;
use std::sync::Arc;

/// Output of [`Pipeline::transform_file`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedFile {
    pub output: FinalOutput,
    /// Any stage changed the code.
    pub changed: bool,
    /// TypeScript or JSX was lowered to JavaScript.
    pub transpiled: bool,
    pub diagnostics: Vec<Diagnostic>,
    pub chunks: Vec<ChunkRequest>,
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    config: TransformConfig,
    cache: EntryCache,
    runtime: Arc<dyn Runtime>,
    resolver: Arc<dyn Resolver>,
    emitter: Option<Arc<dyn ChunkEmitter>>,
    registry: StageRegistry,
}

impl Pipeline {
    /// Pipeline with no stages registered.
    pub fn new(
        config: TransformConfig,
        runtime: Arc<dyn Runtime>,
        resolver: Arc<dyn Resolver>,
    ) -> Self {
        Self {
            config,
            cache: EntryCache::new(),
            runtime,
            resolver,
            emitter: None,
            registry: StageRegistry::new(),
        }
    }

    /// Register every built-in stage.
    pub fn with_default_stages(mut self) -> Self {
        for stage in StageRegistry::with_default_stages().iter() {
            self.registry.add_shared(stage.clone());
        }
        self
    }

    pub fn with_stage<S: Stage + 'static>(mut self, stage: S) -> Self {
        self.registry.add(stage);
        self
    }

    /// Build worker chunks through `emitter` instead of only recording them.
    pub fn with_emitter(mut self, emitter: Arc<dyn ChunkEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    pub fn config(&self) -> &TransformConfig {
        &self.config
    }

    pub fn cache(&self) -> &EntryCache {
        &self.cache
    }

    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    /// Cached entry for `path`, created from `initial` or a file read.
    pub async fn get_or_create_entry(
        &self,
        path: &Path,
        initial: Option<String>,
    ) -> Result<SharedEntry> {
        self.cache
            .get_or_create(
                path,
                initial,
                self.runtime.as_ref(),
                self.config.load_input_source_maps,
            )
            .await
    }

    /// Run one stage callback against `entry`.
    pub fn run_transform_stage<F>(
        &self,
        entry: &mut Entry,
        options: &TransformOptions,
        callback: F,
    ) -> Result<()>
    where
        F: FnOnce(&TransformContext<'_>) -> Result<Option<TransformResult>>,
    {
        entry.run_stage(options, callback)
    }

    /// Finalize `entry` with the configured map settings.
    pub fn finalize_entry(&self, entry: &mut Entry) -> FinalOutput {
        entry.finalize(&self.finalize_options(entry))
    }

    fn finalize_options(&self, entry: &Entry) -> TransformOptions {
        TransformOptions {
            source: Some(entry.path().to_string_lossy().into_owned()),
            sourcemap: self.config.sourcemap,
            sources_content: self.config.sources_content,
        }
    }

    /// Create the entry, run every enabled stage in phase order and finalize.
    ///
    /// A file that was already processed in this build is not transformed
    /// again; its output is recomputed from the cached entry.
    pub async fn transform_file(
        &self,
        path: &Path,
        initial: Option<String>,
    ) -> Result<ProcessedFile> {
        let shared = self.get_or_create_entry(path, initial).await?;
        let mut entry = shared.lock().await;

        if entry.state() != EntryState::Finalized {
            let ctx = StageContext {
                resolver: self.resolver.as_ref(),
                emitter: self.emitter.as_deref(),
                config: &self.config,
            };
            for stage in self.registry.enabled(&self.config.stages) {
                let report = stage.run(&mut entry, &ctx).await?;
                tracing::debug!(
                    path = %path.display(),
                    stage = stage.name(),
                    changed = report.changed,
                    diagnostics = report.diagnostics.len(),
                    "stage finished"
                );
                for diagnostic in report.diagnostics {
                    entry.push_diagnostic(diagnostic);
                }
                for chunk in report.chunks {
                    entry.push_chunk(chunk);
                }
            }
        }

        let output = self.finalize_entry(&mut entry);
        Ok(ProcessedFile {
            changed: entry.is_changed(),
            transpiled: Target::from_path(path).requires_transpile()
                && !entry.target().requires_transpile(),
            diagnostics: entry.diagnostics().to_vec(),
            chunks: entry.chunks().to_vec(),
            output,
        })
    }

    /// Forget every entry; the next build starts from fresh reads.
    pub fn reset(&self) {
        self.cache.clear();
    }
}
