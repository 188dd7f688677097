//! Synthesized import bindings shared by the rewriting stages.

use indexmap::IndexMap;
use oxc_syntax::keyword::is_reserved_keyword;
use rustc_hash::FxHashSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStyle {
    /// `import name from 'source';`
    Default,
    /// `import * as name from 'source';`
    Namespace,
}

#[derive(Debug, Clone)]
struct Binding {
    name: String,
    source: String,
}

/// One binding per resolved path, in first-use order.
///
/// Names come from the first specifier that resolved to a path and never
/// collide with a symbol already declared in the file or with each other.
#[derive(Debug, Clone)]
pub struct ImportBindings {
    style: ImportStyle,
    prefix: &'static str,
    bindings: IndexMap<PathBuf, Binding>,
    taken: FxHashSet<String>,
}

impl ImportBindings {
    pub fn new<I, S>(style: ImportStyle, declared: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            style,
            prefix: "",
            bindings: IndexMap::new(),
            taken: declared.into_iter().map(Into::into).collect(),
        }
    }

    /// Prefix every generated name, e.g. `__cjs_`.
    pub fn with_prefix(mut self, prefix: &'static str) -> Self {
        self.prefix = prefix;
        self
    }

    /// Binding name for `resolved`, allocating one on first use.
    ///
    /// `source` is the module specifier written into the import statement.
    pub fn bind(&mut self, resolved: &Path, specifier: &str, source: impl Into<String>) -> &str {
        if !self.bindings.contains_key(resolved) {
            let name = self.fresh_name(specifier);
            self.bindings.insert(
                resolved.to_path_buf(),
                Binding {
                    name,
                    source: source.into(),
                },
            );
        }
        &self.bindings[resolved].name
    }

    /// Claim a fresh local name derived from `base` without adding an import.
    pub fn reserve(&mut self, base: &str) -> String {
        self.fresh_name(base)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Import statements, one per line, each terminated by `\n`.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for binding in self.bindings.values() {
            let source = quote(&binding.source);
            // writing to a String cannot fail
            let _ = match self.style {
                ImportStyle::Default => writeln!(out, "import {} from {source};", binding.name),
                ImportStyle::Namespace => {
                    writeln!(out, "import * as {} from {source};", binding.name)
                }
            };
        }
        out
    }

    fn fresh_name(&mut self, specifier: &str) -> String {
        let base = format!("{}{}", self.prefix, sanitize_identifier(specifier));
        let mut name = base.clone();
        let mut suffix = 1;
        while self.taken.contains(&name) {
            name = format!("{base}_{suffix}");
            suffix += 1;
        }
        self.taken.insert(name.clone());
        name
    }
}

/// Identifier derived from a specifier: every run of characters outside
/// `[A-Za-z0-9_$]` becomes `_`, and a leading digit or a reserved word gets
/// a `_` prefix.
pub fn sanitize_identifier(specifier: &str) -> String {
    let mut out = String::with_capacity(specifier.len() + 1);
    let mut in_run = false;
    for ch in specifier.chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' || ch == '$' {
            out.push(ch);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) || is_reserved_keyword(&out)
    {
        out.insert(0, '_');
    }
    out
}

/// Single-quoted JavaScript string literal.
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            _ => out.push(ch),
        }
    }
    out.push('\'');
    out
}

/// Offset where top-of-file statements go, and whether a newline has to be
/// written first.
///
/// A shebang must stay the first line, so insertions land after it.
pub fn insertion_point(code: &str) -> (usize, bool) {
    if !code.starts_with("#!") {
        return (0, false);
    }
    match code.find('\n') {
        Some(newline) => (newline + 1, false),
        None => (code.len(), true),
    }
}
