//! CommonJS to ESM interop shim.
//!
//! Files that already use `import`/`export` are left alone. For the rest:
//!
//! - `require('x')` becomes `__cjs_default(__cjs_x)` over a hoisted
//!   `import * as __cjs_x from 'x'`
//! - `module` and `exports` are declared when referenced, and the file gets
//!   `export default module.exports` plus a named export for every
//!   `exports.NAME = ..` / `module.exports.NAME = ..` assignment
//! - `global` becomes `globalThis`
//! - bindings named after words reserved in module code (`package`,
//!   `interface`, ..) get a `_` prefix
//! - a body with a top-level `return` is wrapped in a function
//!
//! Specifiers are kept as written; the bundler resolves the generated
//! imports like any other.

use super::{
    Edit, ImportBindings, ImportStyle, Rewrite, Stage, StageContext, StagePhase, StageReport,
    prepare,
};
use crate::Result;
use crate::diagnostics::Diagnostic;
use crate::entry::Entry;
use crate::parser::{ParsedModule, is_global_reference, static_string_argument};
use async_trait::async_trait;
use indexmap::IndexSet;
use oxc_ast::ast::{
    ArrowFunctionExpression, AssignmentExpression, AssignmentTarget,
    AssignmentTargetPropertyIdentifier, BindingIdentifier, BindingPatternKind, BindingProperty,
    CallExpression, Expression, Function, IdentifierReference, ObjectProperty, ReturnStatement,
};
use oxc_ast_visit::{Visit, walk};
use oxc_semantic::SymbolId;
use oxc_span::{GetSpan, Span};
use oxc_syntax::keyword::is_reserved_keyword;
use oxc_syntax::scope::ScopeFlags;
use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt::Write as _;
use std::path::Path;

const NAME: &str = "commonjs";

const WRAPPER_OPEN: &str = "(function () {\n";
const WRAPPER_CLOSE: &str = "\n})();\n";

const DEFAULT_HELPER: &str = "function __cjs_default(mod) { return mod && typeof mod === 'object' && 'default' in mod ? mod.default : mod; }\n";

#[derive(Debug, Default, Clone, Copy)]
pub struct CommonJsStage;

#[derive(Debug, Default)]
struct Scan {
    is_esm: bool,
    requires: Vec<(Span, String)>,
    dynamic_requires: Vec<Span>,
    /// `global` and renamed bindings.
    identifiers: Vec<Edit>,
    renamed: Vec<(String, String)>,
    uses_module: bool,
    uses_exports: bool,
    /// A `return` outside any function, legal only in a CommonJS wrapper.
    top_level_return: bool,
    named_exports: IndexSet<String>,
    declared: Vec<String>,
}

struct CommonJsScanner<'m, 'a> {
    module: &'m ParsedModule<'a>,
    /// Bindings whose names are reserved in module code, e.g. `package`.
    renames: FxHashMap<SymbolId, String>,
    /// Start offsets of identifiers written as shorthand properties.
    shorthand: FxHashSet<u32>,
    function_depth: usize,
    scan: Scan,
}

impl<'a> CommonJsScanner<'_, 'a> {
    fn is_global_named(&self, expr: &Expression<'a>, name: &str) -> bool {
        matches!(
            expr.without_parentheses(),
            Expression::Identifier(ident)
                if ident.name.as_str() == name && is_global_reference(&self.module.scoping, ident)
        )
    }

    /// `exports` or `module.exports`
    fn is_exports_object(&self, expr: &Expression<'a>) -> bool {
        if self.is_global_named(expr, "exports") {
            return true;
        }
        match expr.without_parentheses() {
            Expression::StaticMemberExpression(member) => {
                member.property.name.as_str() == "exports"
                    && self.is_global_named(&member.object, "module")
            }
            _ => false,
        }
    }

    /// Replace an identifier, keeping the key of a shorthand property.
    fn replace_identifier(&mut self, span: Span, name: &str, text: &str) {
        let text = if self.shorthand.contains(&span.start) {
            format!("{name}: {text}")
        } else {
            text.to_string()
        };
        self.scan.identifiers.push(Edit::new(span, text));
    }
}

impl<'a> Visit<'a> for CommonJsScanner<'_, 'a> {
    fn visit_call_expression(&mut self, it: &CallExpression<'a>) {
        if self.is_global_named(&it.callee, "require") {
            match static_string_argument(it.arguments.first()) {
                Some(specifier) if it.arguments.len() == 1 => {
                    self.scan.requires.push((it.span, specifier));
                }
                _ => self.scan.dynamic_requires.push(it.span),
            }
        }
        walk::walk_call_expression(self, it);
    }

    fn visit_assignment_expression(&mut self, it: &AssignmentExpression<'a>) {
        if let AssignmentTarget::StaticMemberExpression(member) = &it.left {
            let name = member.property.name.as_str();
            if name != "default" && name != "__esModule" && self.is_exports_object(&member.object) {
                self.scan.named_exports.insert(name.to_string());
            }
        }
        walk::walk_assignment_expression(self, it);
    }

    fn visit_object_property(&mut self, it: &ObjectProperty<'a>) {
        if it.shorthand {
            self.shorthand.insert(it.value.span().start);
        }
        walk::walk_object_property(self, it);
    }

    fn visit_binding_property(&mut self, it: &BindingProperty<'a>) {
        if it.shorthand {
            let ident = match &it.value.kind {
                BindingPatternKind::BindingIdentifier(ident) => Some(ident.span),
                BindingPatternKind::AssignmentPattern(pattern) => match &pattern.left.kind {
                    BindingPatternKind::BindingIdentifier(ident) => Some(ident.span),
                    _ => None,
                },
                _ => None,
            };
            if let Some(span) = ident {
                self.shorthand.insert(span.start);
            }
        }
        walk::walk_binding_property(self, it);
    }

    fn visit_assignment_target_property_identifier(
        &mut self,
        it: &AssignmentTargetPropertyIdentifier<'a>,
    ) {
        self.shorthand.insert(it.binding.span.start);
        walk::walk_assignment_target_property_identifier(self, it);
    }

    fn visit_function(&mut self, it: &Function<'a>, flags: ScopeFlags) {
        self.function_depth += 1;
        walk::walk_function(self, it, flags);
        self.function_depth -= 1;
    }

    fn visit_arrow_function_expression(&mut self, it: &ArrowFunctionExpression<'a>) {
        self.function_depth += 1;
        walk::walk_arrow_function_expression(self, it);
        self.function_depth -= 1;
    }

    fn visit_return_statement(&mut self, it: &ReturnStatement<'a>) {
        if self.function_depth == 0 {
            self.scan.top_level_return = true;
        }
        walk::walk_return_statement(self, it);
    }

    fn visit_binding_identifier(&mut self, it: &BindingIdentifier<'a>) {
        let renamed = it.symbol_id.get().and_then(|id| self.renames.get(&id)).cloned();
        if let Some(renamed) = renamed {
            self.replace_identifier(it.span, it.name.as_str(), &renamed);
        }
    }

    fn visit_identifier_reference(&mut self, it: &IdentifierReference<'a>) {
        let scoping = &self.module.scoping;
        let symbol = it
            .reference_id
            .get()
            .and_then(|reference_id| scoping.get_reference(reference_id).symbol_id());
        match symbol {
            None => match it.name.as_str() {
                "module" => self.scan.uses_module = true,
                "exports" => self.scan.uses_exports = true,
                "global" => self.replace_identifier(it.span, "global", "globalThis"),
                _ => {}
            },
            Some(symbol_id) => {
                if let Some(renamed) = self.renames.get(&symbol_id).cloned() {
                    self.replace_identifier(it.span, it.name.as_str(), &renamed);
                }
            }
        }
    }
}

fn scan_module(module: &ParsedModule<'_>) -> Scan {
    if module.has_module_syntax() {
        return Scan {
            is_esm: true,
            ..Scan::default()
        };
    }
    let declared: Vec<String> = module.declared_names().map(String::from).collect();

    // legal in a sloppy script, reserved once the file becomes a module
    let mut locals = ImportBindings::new(ImportStyle::Default, declared.iter().cloned());
    let mut renames = FxHashMap::default();
    let mut renamed = Vec::new();
    for symbol_id in module.scoping.symbol_ids() {
        let name = module.scoping.symbol_name(symbol_id);
        if is_reserved_keyword(name) {
            let fresh = locals.reserve(&format!("_{name}"));
            renamed.push((name.to_string(), fresh.clone()));
            renames.insert(symbol_id, fresh);
        }
    }

    let mut scanner = CommonJsScanner {
        module,
        renames,
        shorthand: FxHashSet::default(),
        function_depth: 0,
        scan: Scan::default(),
    };
    scanner.visit_program(&module.program);
    scanner.scan.declared = declared;
    scanner.scan.renamed = renamed;
    scanner.scan
}

/// Declarations for `module`/`exports` and the name of the exported object.
fn shims(scan: &Scan) -> Option<(String, &'static str)> {
    match (scan.uses_module, scan.uses_exports) {
        (true, true) => Some((
            "var module = { exports: {} };\nvar exports = module.exports;\n".to_string(),
            "module.exports",
        )),
        (true, false) => Some(("var module = { exports: {} };\n".to_string(), "module.exports")),
        (false, true) => Some(("var exports = {};\n".to_string(), "exports")),
        (false, false) => None,
    }
}

fn exports_trailer(scan: &Scan, root: &str, taken: &mut ImportBindings) -> String {
    let mut out = format!("\nexport default {root};\n");
    if scan.named_exports.is_empty() {
        return out;
    }
    let mut specifiers = Vec::with_capacity(scan.named_exports.len());
    for name in &scan.named_exports {
        let local = taken.reserve(&format!("export_{name}"));
        // writing to a String cannot fail
        let _ = writeln!(out, "var {local} = {root}.{name};");
        specifiers.push(format!("{local} as {name}"));
    }
    let _ = writeln!(out, "export {{ {} }};", specifiers.join(", "));
    out
}

#[async_trait]
impl Stage for CommonJsStage {
    fn name(&self) -> &'static str {
        NAME
    }

    fn phase(&self) -> StagePhase {
        StagePhase::Interop
    }

    fn precheck(&self, code: &str) -> bool {
        code.contains("require(") || code.contains("exports") || code.contains("global")
    }

    async fn run(&self, entry: &mut Entry, ctx: &StageContext<'_>) -> Result<StageReport> {
        let mut report = StageReport::default();
        let revision = entry.revision();
        if !prepare(self, entry, ctx)? {
            report.changed = entry.revision() != revision;
            return Ok(report);
        }

        let scan = entry.analyze(|tcx| Ok(scan_module(tcx.ast()?)))?;
        if scan.is_esm {
            report.changed = entry.revision() != revision;
            return Ok(report);
        }
        for span in &scan.dynamic_requires {
            report.diagnostics.push(Diagnostic::info(
                NAME,
                entry.path(),
                format!(
                    "require at offset {} has a non-literal argument and was left as is",
                    span.start
                ),
            ));
        }

        let mut imports = ImportBindings::new(ImportStyle::Namespace, scan.declared.iter().cloned())
            .with_prefix("__cjs_");
        let mut rewrite = Rewrite::default();
        for (span, specifier) in &scan.requires {
            let binding = imports.bind(Path::new(specifier), specifier, specifier.as_str());
            rewrite
                .edits
                .push(Edit::new(*span, format!("__cjs_default({binding})")));
        }
        rewrite.edits.extend(scan.identifiers.iter().cloned());

        let mut prelude = imports.render();
        if !scan.requires.is_empty() {
            prelude.push_str(DEFAULT_HELPER);
        }
        if let Some((declarations, root)) = shims(&scan) {
            prelude.push_str(&declarations);
            let mut locals =
                ImportBindings::new(ImportStyle::Default, scan.declared.iter().cloned())
                    .with_prefix("__cjs_");
            rewrite.trailer = exports_trailer(&scan, root, &mut locals);
        }
        rewrite.prelude = prelude;
        if scan.top_level_return && !rewrite.is_empty() {
            rewrite.prelude.push_str(WRAPPER_OPEN);
            rewrite.trailer.insert_str(0, WRAPPER_CLOSE);
        }

        if !rewrite.is_empty() {
            tracing::debug!(
                path = %entry.path().display(),
                requires = scan.requires.len(),
                exports = scan.named_exports.len(),
                "commonjs interop"
            );
        }
        for (name, fresh) in &scan.renamed {
            tracing::debug!(
                path = %entry.path().display(),
                name,
                fresh,
                "renamed reserved binding"
            );
        }
        rewrite.apply(entry)?;

        report.changed = entry.revision() != revision;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransformConfig;
    use crate::test_utils::StaticResolver;

    async fn run(code: &str) -> (Entry, StageReport) {
        let config = TransformConfig::default();
        let resolver = StaticResolver::new();
        let ctx = StageContext {
            resolver: &resolver,
            emitter: None,
            config: &config,
        };
        let mut entry = Entry::new("/src/legacy.js", code);
        let report = CommonJsStage.run(&mut entry, &ctx).await.unwrap();
        assert!(resolver.calls().is_empty());
        (entry, report)
    }

    #[tokio::test]
    async fn converts_requires_and_module_exports() {
        let (entry, report) = run("const a = require('./a');\nmodule.exports = { a };\n").await;
        assert!(report.changed);
        let code = entry.code();
        assert!(code.starts_with("import * as __cjs__a from './a';\nfunction __cjs_default(mod)"));
        assert!(code.contains("var module = { exports: {} };\n"));
        assert!(code.contains("const a = __cjs_default(__cjs__a);"));
        assert!(code.ends_with("\nexport default module.exports;\n"));
    }

    #[tokio::test]
    async fn named_exports_from_assignments() {
        let (entry, _) = run("exports.foo = 1;\nmodule.exports.bar = function bar() {};\n").await;
        let code = entry.code();
        assert!(code.contains("var module = { exports: {} };\nvar exports = module.exports;\n"));
        assert!(code.contains("var __cjs_export_foo = module.exports.foo;\n"));
        assert!(code.contains("var __cjs_export_bar = module.exports.bar;\n"));
        assert!(code.ends_with("export { __cjs_export_foo as foo, __cjs_export_bar as bar };\n"));
    }

    #[tokio::test]
    async fn exports_only_file() {
        let (entry, _) = run("exports.answer = 42;").await;
        assert!(entry.code().starts_with("var exports = {};\nexports.answer = 42;"));
        assert!(entry.code().contains("export default exports;\n"));
    }

    #[tokio::test]
    async fn repeated_require_shares_binding() {
        let (entry, _) = run("require('fs');\nrequire('fs');").await;
        assert_eq!(entry.code().matches("import * as __cjs_fs from 'fs';").count(), 1);
        assert_eq!(entry.code().matches("__cjs_default(__cjs_fs)").count(), 2);
    }

    #[tokio::test]
    async fn global_becomes_global_this() {
        let (entry, _) = run("global.x = 1;\nconst g = { global };").await;
        assert_eq!(entry.code(), "globalThis.x = 1;\nconst g = { global: globalThis };");
    }

    #[tokio::test]
    async fn reserved_bindings_are_renamed() {
        let (entry, report) = run(
            "var package = require('./package.json');\nfunction read({ interface: i, private: p = 1 }) { return package[i] + p; }\nmodule.exports = { package, version: package.version };\n",
        )
        .await;
        assert!(report.changed);
        let code = entry.code();
        assert!(code.contains("var _package = __cjs_default(__cjs__package_json);"));
        assert!(code.contains("return _package[i] + p;"));
        assert!(
            code.contains("module.exports = { package: _package, version: _package.version };")
        );
        assert!(!code.contains("var package"));
    }

    #[tokio::test]
    async fn renamed_shorthand_patterns_keep_their_keys() {
        let (entry, _) = run(
            "var { interface = 2, public: pub } = require('./opts');\n({ interface } = other);\nexports.x = interface + pub;",
        )
        .await;
        let code = entry.code();
        assert!(code.contains(
            "var { interface: _interface = 2, public: pub } = __cjs_default(__cjs__opts);"
        ));
        assert!(code.contains("({ interface: _interface } = other);"));
        assert!(code.contains("exports.x = _interface + pub;"));
    }

    #[tokio::test]
    async fn renamed_binding_avoids_existing_names() {
        let (entry, _) =
            run("var _package = 1;\nvar package = 2;\nmodule.exports = package + _package;").await;
        assert!(entry.code().contains("var _package_1 = 2;"));
        assert!(entry.code().contains("module.exports = _package_1 + _package;"));
    }

    #[tokio::test]
    async fn top_level_return_is_wrapped() {
        let (entry, report) =
            run("if (typeof window === 'undefined') return;\nmodule.exports = 1;\n").await;
        assert!(report.changed);
        assert_eq!(
            entry.code(),
            "var module = { exports: {} };\n(function () {\nif (typeof window === 'undefined') return;\nmodule.exports = 1;\n\n})();\n\nexport default module.exports;\n"
        );
    }

    #[tokio::test]
    async fn nested_return_needs_no_wrapper() {
        let (entry, _) =
            run("module.exports = () => { return 1; };\nfunction f() { return 2; }").await;
        assert!(!entry.code().contains("(function () {"));
    }

    #[tokio::test]
    async fn esm_files_are_untouched() {
        let code = "import a from './a';\nexport const b = require('./b');";
        let (entry, report) = run(code).await;
        assert!(!report.changed);
        assert_eq!(entry.code(), code);
    }

    #[tokio::test]
    async fn shadowed_require_and_dynamic_calls() {
        let code = "function load(require) { return require('./a'); }\nrequire(name);";
        let (entry, report) = run(code).await;
        assert_eq!(entry.code(), code);
        assert_eq!(report.diagnostics.len(), 1);
    }
}
