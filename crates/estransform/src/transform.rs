//! Transform orchestrator.
//!
//! [`transform`] hands a stage callback a [`TransformContext`] with lazy,
//! memoized access to the parsed AST and to a [`MagicString`] over the
//! current code, then folds whatever the callback did into a
//! [`TransformResult`]. A callback that bails out after a cheap pre-check
//! never pays for parsing or buffer allocation.

use crate::Result;
use crate::config::SourceMapMode;
use crate::magic_string::{MagicString, MapOptions};
use crate::parser::{ParsedModule, parse_module};
use crate::sourcemap::SourceMap;
use crate::target::{Loader, Target};
use once_cell::unsync::OnceCell;
use oxc_allocator::Allocator;
use std::cell::{RefCell, RefMut};
use std::path::Path;

/// Output options shared by stages and finalize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOptions {
    /// File name recorded as the map's source and `file`.
    pub source: Option<String>,
    pub sourcemap: SourceMapMode,
    pub sources_content: bool,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            source: None,
            sourcemap: SourceMapMode::External,
            sources_content: true,
        }
    }
}

impl TransformOptions {
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// What a stage produced.
///
/// `loader` and `target` are `Some` only when the stage changed them.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformResult {
    pub code: String,
    pub map: Option<SourceMap>,
    pub loader: Option<Loader>,
    pub target: Option<Target>,
}

impl TransformResult {
    pub fn unchanged(code: &str) -> Self {
        Self {
            code: code.to_string(),
            map: None,
            loader: None,
            target: None,
        }
    }
}

/// Accessors handed to a stage callback.
pub struct TransformContext<'a> {
    allocator: &'a Allocator,
    code: &'a str,
    path: &'a Path,
    loader: Loader,
    ast: OnceCell<ParsedModule<'a>>,
    buffer: OnceCell<RefCell<MagicString>>,
}

impl<'a> TransformContext<'a> {
    fn new(allocator: &'a Allocator, code: &'a str, path: &'a Path, loader: Loader) -> Self {
        Self {
            allocator,
            code,
            path,
            loader,
            ast: OnceCell::new(),
            buffer: OnceCell::new(),
        }
    }

    pub fn code(&self) -> &'a str {
        self.code
    }

    pub fn path(&self) -> &'a Path {
        self.path
    }

    pub fn loader(&self) -> Loader {
        self.loader
    }

    pub fn allocator(&self) -> &'a Allocator {
        self.allocator
    }

    /// Parsed program and scoping, built on first access.
    ///
    /// A parse failure is returned on every access; it is never cached as
    /// success.
    pub fn ast(&self) -> Result<&ParsedModule<'a>> {
        self.ast.get_or_try_init(|| {
            tracing::trace!(path = %self.path.display(), "parsing for stage");
            parse_module(
                self.allocator,
                self.code,
                self.loader.source_type(self.path),
                self.path,
            )
        })
    }

    /// Edit buffer over the current code, created on first access.
    pub fn buffer(&self) -> RefMut<'_, MagicString> {
        self.buffer
            .get_or_init(|| RefCell::new(MagicString::new(self.code)))
            .borrow_mut()
    }

    fn into_buffer(self) -> Option<MagicString> {
        self.buffer.into_inner().map(RefCell::into_inner)
    }
}

/// Run `callback` against `code` and fold its effect into a result.
///
/// An explicit result from the callback wins. Otherwise a touched buffer is
/// rendered together with its map, and an untouched context yields the input
/// code with no map.
pub fn transform<F>(
    code: &str,
    path: &Path,
    loader: Loader,
    options: &TransformOptions,
    callback: F,
) -> Result<TransformResult>
where
    F: FnOnce(&TransformContext<'_>) -> Result<Option<TransformResult>>,
{
    let allocator = Allocator::default();
    let context = TransformContext::new(&allocator, code, path, loader);

    if let Some(result) = callback(&context)? {
        return Ok(result);
    }

    let Some(buffer) = context.into_buffer() else {
        return Ok(TransformResult::unchanged(code));
    };
    if !buffer.has_changed() {
        return Ok(TransformResult::unchanged(code));
    }

    let map = if options.sourcemap.is_enabled() {
        Some(buffer.generate_map(&MapOptions {
            source: options.source.clone(),
            file: options.source.clone(),
            include_content: options.sources_content,
        })?)
    } else {
        None
    };

    Ok(TransformResult {
        code: buffer.to_string(),
        map,
        loader: None,
        target: None,
    })
}

/// Run a read-only callback with the same lazy accessors.
pub(crate) fn inspect<T, F>(code: &str, path: &Path, loader: Loader, callback: F) -> Result<T>
where
    F: FnOnce(&TransformContext<'_>) -> Result<T>,
{
    let allocator = Allocator::default();
    let context = TransformContext::new(&allocator, code, path, loader);
    callback(&context)
}
