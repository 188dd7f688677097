#![cfg_attr(docsrs, feature(doc_cfg))]

//! # estransform
//!
//! Transform pipeline and source map stitching for JavaScript build tooling.
//!
//! A source file enters the pipeline as an [`Entry`]. Any number of stages
//! rewrite it in sequence, each one appending the incremental source map it
//! produced, and [`Entry::finalize`] composes the chain into a single map that
//! points back at the original file.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use estransform::{NativeRuntime, NodeResolver, Pipeline, TransformConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let runtime = Arc::new(NativeRuntime);
//! let cwd = std::env::current_dir()?;
//! let resolver = Arc::new(NodeResolver::new(runtime.clone(), cwd));
//! let pipeline = Pipeline::new(TransformConfig::default(), runtime, resolver)
//!     .with_default_stages();
//!
//! let processed = pipeline.transform_file("src/index.ts".as_ref(), None).await?;
//! println!("{}", processed.output.code);
//! # Ok(()) }
//! ```
//!
//! ## Writing a stage callback
//!
//! ```no_run
//! use estransform::{Entry, TransformOptions};
//!
//! # fn run(entry: &mut Entry) -> estransform::Result<()> {
//! entry.run_stage(&TransformOptions::default(), |ctx| {
//!     if !ctx.code().contains("debugger") {
//!         return Ok(None);
//!     }
//!     let offset = ctx.code().find("debugger").unwrap_or_default();
//!     ctx.buffer().overwrite(offset, offset + "debugger".len(), "void 0")?;
//!     Ok(None)
//! })
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod diagnostics;
pub mod entry;
pub mod magic_string;
pub mod parser;
pub mod pipeline;
pub mod resolver;
pub mod runtime;
pub mod sourcemap;
pub mod stages;
pub mod target;
pub mod transform;
pub mod transpile;

// Logging utilities (optional, enabled with "logging" feature)
#[cfg(feature = "logging")]
#[cfg_attr(docsrs, doc(cfg(feature = "logging")))]
pub mod logging;

#[cfg(feature = "logging")]
#[cfg_attr(docsrs, doc(cfg(feature = "logging")))]
pub use logging::{LogLevel, init_logging, init_logging_from_env};

pub use cache::{EntryCache, SharedEntry};
pub use config::{RequireResolveMode, SourceMapMode, StageToggles, TransformConfig};
pub use diagnostics::{Diagnostic, Severity};
pub use entry::{Entry, EntryState, FinalOutput};
pub use magic_string::{MagicString, MapOptions};
pub use pipeline::{Pipeline, ProcessedFile};
pub use resolver::{NodeResolver, Resolver};
pub use runtime::{Runtime, RuntimeError, RuntimeResult};
pub use sourcemap::{
    SourceMap, inline_source_map, load_source_map_from_comment, merge_source_maps,
    parse_source_map, remove_source_map_comment,
};
pub use stages::{
    ChunkEmitter, ChunkFormat, ChunkRequest, EmittedChunk, Stage, StageContext, StagePhase,
    StageRegistry, StageReport,
};
pub use target::{Loader, Target};
pub use transform::{TransformContext, TransformOptions, TransformResult, transform};

pub use runtime::native::NativeRuntime;

// Test utilities (available in test builds for both unit and integration tests)
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use std::path::PathBuf;

/// Error types for estransform operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Source text could not be parsed into an AST.
    #[error("Failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    /// A source map payload was not valid JSON.
    #[error("Invalid source map: {0}")]
    SourceMapParse(String),

    /// Source map composition failed.
    #[error("Failed to merge source maps: {0}")]
    SourceMapMerge(String),

    /// A specifier could not be resolved from its importer.
    #[error("Cannot resolve '{specifier}' from {}: {reason}", importer.display())]
    Resolution {
        specifier: String,
        importer: PathBuf,
        reason: String,
    },

    /// TypeScript or JSX lowering failed.
    #[error("Failed to transpile {}: {message}", path.display())]
    Transpile { path: PathBuf, message: String },

    /// A stage tried to mutate an entry that was already finalized.
    #[error("Entry for {} is already finalized", .0.display())]
    EntryFinalized(PathBuf),

    /// A buffer edit addressed bytes outside the original string.
    #[error("Invalid range {start}..{end} for a buffer of {len} bytes")]
    InvalidRange { start: usize, end: usize, len: usize },

    /// A nested chunk build failed.
    #[error("Failed to emit chunk for {}: {reason}", path.display())]
    ChunkEmit { path: PathBuf, reason: String },

    /// File system access through the runtime failed.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for estransform operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Whether this error is attributable to malformed input source.
    pub fn is_parse_error(&self) -> bool {
        matches!(self, Error::Parse { .. })
    }
}

impl miette::Diagnostic for Error {
    fn code(&self) -> Option<Box<dyn std::fmt::Display + '_>> {
        Some(Box::new(match self {
            Error::Parse { .. } => "PARSE_ERROR",
            Error::SourceMapParse(_) => "SOURCEMAP_PARSE_ERROR",
            Error::SourceMapMerge(_) => "SOURCEMAP_MERGE_ERROR",
            Error::Resolution { .. } => "RESOLUTION_ERROR",
            Error::Transpile { .. } => "TRANSPILE_ERROR",
            Error::EntryFinalized(_) => "ENTRY_FINALIZED",
            Error::InvalidRange { .. } => "INVALID_RANGE",
            Error::ChunkEmit { .. } => "CHUNK_EMIT_ERROR",
            Error::Runtime(_) => "RUNTIME_ERROR",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
        }))
    }

    fn severity(&self) -> Option<miette::Severity> {
        Some(miette::Severity::Error)
    }

    fn help(&self) -> Option<Box<dyn std::fmt::Display + '_>> {
        match self {
            Error::Parse { path, .. } => Some(Box::new(format!(
                "Fix the syntax error in '{}' or exclude the file from transformation.",
                path.display()
            ))),
            Error::Resolution { specifier, .. } => Some(Box::new(format!(
                "Check that '{}' exists relative to the importing file or in node_modules.\nDisable strict_resolution to skip unresolved references with a warning.",
                specifier
            ))),
            Error::EntryFinalized(_) => Some(Box::new(
                "Stages must run before the entry is finalized. Reset the pipeline to start a new build.",
            )),
            Error::InvalidConfig(msg) => Some(Box::new(format!(
                "Check your configuration file for syntax errors.\nError: {}",
                msg
            ))),
            _ => None,
        }
    }
}
