//! Feature stages and their registry.
//!
//! A [`Stage`] is one rewrite pass over an [`Entry`]. Stages never hold an
//! AST across an await: they scan synchronously through [`Entry::analyze`],
//! resolve what they found through the async [`Resolver`], then apply edits
//! through [`Entry::run_stage`] with the buffer only.
//!
//! Stages run in phase order (lower first):
//!
//! | Phase     | Stage             |
//! |-----------|-------------------|
//! | `Cleanup` | `unwebpack`       |
//! | `Interop` | `commonjs`        |
//! | `Chunks`  | `worker`          |
//! | `Assets`  | `meta-url`, `require-resolve` |
//!
//! `worker` must precede `meta-url`: it consumes `new URL(..)` arguments of
//! worker constructors that `meta-url` would otherwise turn into plain asset
//! imports.

mod bindings;
pub mod commonjs;
pub mod meta_url;
pub mod require_resolve;
pub mod unwebpack;
pub mod worker;

pub use bindings::{ImportBindings, ImportStyle, insertion_point, quote, sanitize_identifier};
pub use commonjs::CommonJsStage;
pub use meta_url::MetaUrlStage;
pub use require_resolve::RequireResolveStage;
pub use unwebpack::UnwebpackStage;
pub use worker::WorkerStage;

use crate::config::{StageToggles, TransformConfig};
use crate::diagnostics::Diagnostic;
use crate::entry::Entry;
use crate::resolver::Resolver;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Stage execution phases; stages run in ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StagePhase {
    /// Strip bundler-specific constructs the later stages should not see.
    Cleanup = 10,
    /// Module format interop.
    Interop = 20,
    /// References that spawn separate chunks.
    Chunks = 30,
    /// Asset and path references.
    Assets = 40,
}

/// Output format requested for a nested chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkFormat {
    /// ES module (`{ type: 'module' }`).
    Module,
    /// Classic script.
    Classic,
}

/// A file a stage needs built as its own chunk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ChunkRequest {
    pub path: PathBuf,
    pub importer: PathBuf,
    pub format: ChunkFormat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedChunk {
    /// Public file name of the built chunk.
    pub file_name: String,
}

/// Builds a nested chunk, e.g. a worker entry point.
#[async_trait]
pub trait ChunkEmitter: Send + Sync + std::fmt::Debug {
    async fn emit_chunk(&self, path: &Path, request: &ChunkRequest) -> Result<EmittedChunk>;
}

/// Collaborators a stage may use while running.
#[derive(Clone, Copy)]
pub struct StageContext<'a> {
    pub resolver: &'a dyn Resolver,
    pub emitter: Option<&'a dyn ChunkEmitter>,
    pub config: &'a TransformConfig,
}

/// What a stage did to an entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageReport {
    pub changed: bool,
    pub diagnostics: Vec<Diagnostic>,
    pub chunks: Vec<ChunkRequest>,
}

impl StageReport {
    pub(crate) fn warn(&mut self, stage: &'static str, file: &Path, message: impl Into<String>) {
        self.diagnostics
            .push(Diagnostic::warning(stage, file, message));
    }
}

#[async_trait]
pub trait Stage: Send + Sync + std::fmt::Debug {
    /// Stable name, also the key in [`StageToggles`].
    fn name(&self) -> &'static str;

    fn phase(&self) -> StagePhase;

    /// Cheap substring test on raw code. `false` means the stage cannot
    /// possibly change the file and [`Stage::run`] is skipped.
    fn precheck(&self, code: &str) -> bool;

    async fn run(&self, entry: &mut Entry, ctx: &StageContext<'_>) -> Result<StageReport>;
}

/// Stages kept in phase order.
#[derive(Debug, Default, Clone)]
pub struct StageRegistry {
    stages: Vec<Arc<dyn Stage>>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in stage.
    pub fn with_default_stages() -> Self {
        let mut registry = Self::new();
        registry.add(UnwebpackStage);
        registry.add(CommonJsStage);
        registry.add(WorkerStage);
        registry.add(MetaUrlStage);
        registry.add(RequireResolveStage);
        registry
    }

    pub fn add<S: Stage + 'static>(&mut self, stage: S) {
        self.add_shared(Arc::new(stage));
    }

    /// Insert after every stage of the same or an earlier phase, so
    /// registration order is kept within a phase.
    pub fn add_shared(&mut self, stage: Arc<dyn Stage>) {
        let phase = stage.phase();
        let index = self.stages.partition_point(|existing| existing.phase() <= phase);
        self.stages.insert(index, stage);
    }

    /// Stages enabled by `toggles`, in execution order.
    pub fn enabled<'r>(
        &'r self,
        toggles: &'r StageToggles,
    ) -> impl Iterator<Item = &'r Arc<dyn Stage>> + 'r {
        self.stages
            .iter()
            .filter(move |stage| toggles.is_enabled(stage.name()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Stage>> {
        self.stages.iter()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

/// Common stage prologue.
///
/// Returns `false` for non-script files and files the precheck rules out.
/// Otherwise lowers TypeScript/JSX first so the scan sees plain JavaScript,
/// and re-checks the lowered code.
pub(crate) fn prepare<S: Stage>(
    stage: &S,
    entry: &mut Entry,
    ctx: &StageContext<'_>,
) -> Result<bool> {
    if !entry.loader().is_script() || !stage.precheck(entry.code()) {
        return Ok(false);
    }
    entry.ensure_transpiled(ctx.config.transpile_target)?;
    Ok(stage.precheck(entry.code()))
}

/// A replacement of `start..end` in the scanned code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Edit {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

impl Edit {
    pub fn new(span: oxc_span::Span, text: impl Into<String>) -> Self {
        Self {
            start: span.start as usize,
            end: span.end as usize,
            text: text.into(),
        }
    }
}

/// Buffer edits collected by a stage, applied in one orchestrator run.
#[derive(Debug, Default)]
pub(crate) struct Rewrite {
    pub edits: Vec<Edit>,
    /// Statements for the top of the file, after any shebang.
    pub prelude: String,
    /// Text appended at the end of the file.
    pub trailer: String,
}

impl Rewrite {
    pub fn is_empty(&self) -> bool {
        self.edits.is_empty() && self.prelude.is_empty() && self.trailer.is_empty()
    }

    pub fn apply(self, entry: &mut Entry) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        let options = entry.stage_options();
        entry.run_stage(&options, |tcx| {
            let mut buffer = tcx.buffer();
            for edit in &self.edits {
                buffer.overwrite(edit.start, edit.end, &edit.text)?;
            }
            if !self.prelude.is_empty() {
                let (offset, needs_newline) = insertion_point(tcx.code());
                if needs_newline {
                    buffer.prepend_left(offset, &format!("\n{}", self.prelude))?;
                } else {
                    buffer.prepend_left(offset, &self.prelude)?;
                }
            }
            if !self.trailer.is_empty() {
                buffer.append(&self.trailer);
            }
            Ok(None)
        })
    }
}

/// Resolve `specifier`, applying the configured failure policy.
///
/// With `strict_resolution` a failure is returned as an error. Otherwise the
/// reference is skipped (`Ok(None)`) and a warning lands on `report`.
pub(crate) async fn resolve_reference(
    ctx: &StageContext<'_>,
    stage: &'static str,
    specifier: &str,
    importer: &Path,
    report: &mut StageReport,
) -> Result<Option<PathBuf>> {
    match ctx.resolver.resolve(specifier, importer).await {
        Ok(path) => Ok(Some(path)),
        Err(err) if ctx.config.strict_resolution => Err(err),
        Err(err) => {
            let reason = match &err {
                Error::Resolution { reason, .. } => reason.clone(),
                other => other.to_string(),
            };
            report.warn(
                stage,
                importer,
                format!("skipped '{specifier}': {reason}"),
            );
            Ok(None)
        }
    }
}
