//! Per-file pipeline state.
//!
//! An [`Entry`] moves `Created` → `Transpiled` → `Transformed` → `Finalized`.
//! Every stage that changes the code appends its incremental map to
//! `source_maps`, so the list always describes the chain from `original` to
//! `code`, oldest first.

use crate::config::SourceMapMode;
use crate::diagnostics::Diagnostic;
use crate::sourcemap::{SourceMap, inline_source_map, merge_source_maps, remove_source_map_comment};
use crate::stages::ChunkRequest;
use crate::target::{Loader, Target};
use crate::transform::{TransformContext, TransformOptions, TransformResult, inspect, transform};
use crate::transpile::transpile;
use crate::{Error, Result};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Freshly read, `code == original`.
    Created,
    /// Syntax lowered to a concrete JavaScript target.
    Transpiled,
    /// At least one feature stage changed the code.
    Transformed,
    /// Output computed; no further mutation.
    Finalized,
}

/// Result of [`Entry::finalize`].
#[derive(Debug, Clone, PartialEq)]
pub struct FinalOutput {
    pub code: String,
    pub map: Option<SourceMap>,
    pub loader: Loader,
}

#[derive(Debug, Clone)]
pub struct Entry {
    path: PathBuf,
    original: String,
    code: String,
    target: Target,
    loader: Loader,
    source_maps: Vec<SourceMap>,
    state: EntryState,
    /// Bumped on every code change.
    revision: u32,
    /// A stage changed the code without providing a map.
    map_chain_broken: bool,
    diagnostics: Vec<Diagnostic>,
    chunks: Vec<ChunkRequest>,
}

impl Entry {
    /// New entry for `path`, classified by extension.
    pub fn new(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        let path = path.into();
        let contents = contents.into();
        Self {
            target: Target::from_path(&path),
            loader: Loader::from_path(&path),
            original: contents.clone(),
            code: contents,
            path,
            source_maps: Vec::new(),
            state: EntryState::Created,
            revision: 0,
            map_chain_broken: false,
            diagnostics: Vec::new(),
            chunks: Vec::new(),
        }
    }

    /// Seed the chain with a map the file already carried, so the final map
    /// points at the pre-existing sources.
    pub fn with_input_map(mut self, map: SourceMap) -> Self {
        self.source_maps.push(map);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn target(&self) -> Target {
        self.target
    }

    pub fn loader(&self) -> Loader {
        self.loader
    }

    pub fn source_maps(&self) -> &[SourceMap] {
        &self.source_maps
    }

    pub fn state(&self) -> EntryState {
        self.state
    }

    /// Number of code changes applied so far.
    pub fn revision(&self) -> u32 {
        self.revision
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn chunks(&self) -> &[ChunkRequest] {
        &self.chunks
    }

    pub fn is_changed(&self) -> bool {
        self.code != self.original
    }

    pub fn push_diagnostic(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn push_chunk(&mut self, chunk: ChunkRequest) {
        if !self.chunks.contains(&chunk) {
            self.chunks.push(chunk);
        }
    }

    /// Options stages use so each link of the map chain is named after this file.
    pub fn stage_options(&self) -> TransformOptions {
        TransformOptions::default().with_source(self.path.to_string_lossy())
    }

    /// Run a stage callback and fold its output into the entry.
    ///
    /// Code and map are replaced only when the code actually changed; loader
    /// and target follow whatever the stage reported.
    pub fn run_stage<F>(&mut self, options: &TransformOptions, callback: F) -> Result<()>
    where
        F: FnOnce(&TransformContext<'_>) -> Result<Option<TransformResult>>,
    {
        self.ensure_open()?;
        let result = transform(&self.code, &self.path, self.loader, options, callback)?;
        self.apply(result);
        Ok(())
    }

    /// Inspect the current code through the orchestrator without mutating.
    pub fn analyze<T, F>(&self, callback: F) -> Result<T>
    where
        F: FnOnce(&TransformContext<'_>) -> Result<T>,
    {
        self.ensure_open()?;
        inspect(&self.code, &self.path, self.loader, callback)
    }

    /// Lower TypeScript/JSX to `target` if the entry still owes it.
    pub fn ensure_transpiled(&mut self, target: Target) -> Result<()> {
        if !self.target.requires_transpile() {
            return Ok(());
        }
        let options = self.stage_options();
        tracing::debug!(path = %self.path.display(), %target, "transpiling");
        self.run_stage(&options, |ctx| {
            transpile(ctx.code(), ctx.path(), ctx.loader(), target).map(Some)
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state == EntryState::Finalized {
            return Err(Error::EntryFinalized(self.path.clone()));
        }
        Ok(())
    }

    fn apply(&mut self, result: TransformResult) {
        let lowered = result
            .target
            .is_some_and(|target| self.target.requires_transpile() && target.is_concrete());

        if result.code != self.code {
            match result.map {
                Some(map) => self.source_maps.push(map),
                None => self.map_chain_broken = true,
            }
            self.code = result.code;
            self.revision += 1;
            self.state = if lowered && self.state == EntryState::Created {
                EntryState::Transpiled
            } else {
                EntryState::Transformed
            };
        }
        if let Some(loader) = result.loader {
            self.loader = loader;
        }
        if let Some(target) = result.target {
            self.target = target;
        }
    }

    /// Compute the output: current code plus the merged map.
    ///
    /// No map is produced when nothing changed, no stage recorded a map, the
    /// chain is incomplete, or maps are disabled. A failed merge degrades to
    /// no map.
    pub fn finalize(&mut self, options: &TransformOptions) -> FinalOutput {
        self.state = EntryState::Finalized;

        let unmapped = FinalOutput {
            code: self.code.clone(),
            map: None,
            loader: self.loader,
        };
        if !options.sourcemap.is_enabled()
            || self.source_maps.is_empty()
            || !self.is_changed()
            || self.map_chain_broken
        {
            return unmapped;
        }

        let mut map = match merge_source_maps(&self.source_maps) {
            Ok(Some(map)) => map,
            Ok(None) => return unmapped,
            Err(e) => {
                tracing::debug!(path = %self.path.display(), error = %e, "source map merge failed");
                return unmapped;
            }
        };

        map.file = options.source.clone();
        if !options.sources_content {
            map.sources_content = None;
        }

        let code = match options.sourcemap {
            SourceMapMode::Inline => match inline_source_map(&self.code, &map) {
                Ok(code) => code,
                Err(e) => {
                    tracing::debug!(path = %self.path.display(), error = %e, "inlining failed");
                    return unmapped;
                }
            },
            _ => remove_source_map_comment(&self.code),
        };

        FinalOutput {
            code,
            map: Some(map),
            loader: self.loader,
        }
    }
}
