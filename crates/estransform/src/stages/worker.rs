//! Worker constructor rewriting.
//!
//! Recognized first arguments of `new Worker(..)` / `new SharedWorker(..)`
//! (and their `window.`/`self.`/`globalThis.` forms):
//!
//! - a string literal: `new Worker('./worker.js')`
//! - a URL: `new Worker(new URL('./worker.js', import.meta.url))`
//! - a `const` bound to either of the above
//!
//! The argument becomes `new URL(<binding>, import.meta.url)` over an import
//! of the worker file, and the file is recorded as a [`ChunkRequest`]. A
//! `const` holding a URL has the URL's own argument replaced instead, so the
//! asset stage does not import the worker a second time. With a
//! [`ChunkEmitter`](super::ChunkEmitter) configured the chunk is built right
//! away and the binding imports the emitted file instead.

use super::{
    ChunkFormat, ChunkRequest, Edit, ImportBindings, ImportStyle, Rewrite, Stage, StageContext,
    StagePhase, StageReport, prepare, resolve_reference,
};
use crate::Result;
use crate::diagnostics::Diagnostic;
use crate::entry::Entry;
use crate::parser::{
    ParsedModule, is_absolute_url, is_global_callee, static_string, url_constructor_parts,
};
use async_trait::async_trait;
use oxc_ast::ast::{
    Argument, BindingPatternKind, Expression, NewExpression, ObjectPropertyKind,
    VariableDeclarationKind, VariableDeclarator,
};
use oxc_ast_visit::{Visit, walk};
use oxc_semantic::SymbolId;
use oxc_span::{GetSpan, Span};
use rustc_hash::{FxHashMap, FxHashSet};
use std::path::PathBuf;

const NAME: &str = "worker";

#[derive(Debug, Default, Clone, Copy)]
pub struct WorkerStage;

#[derive(Debug)]
enum Source {
    Specifier(String),
    Constant(SymbolId),
    Dynamic,
}

/// Value of a `const` a worker may be constructed from.
#[derive(Debug)]
struct Constant {
    specifier: String,
    /// First argument of `new URL(.., import.meta.url)` in the initializer.
    url_argument: Option<Span>,
}

#[derive(Debug)]
struct WorkerCall {
    /// Span of the first argument.
    span: Span,
    source: Source,
    format: ChunkFormat,
}

struct WorkerScanner<'m, 'a> {
    module: &'m ParsedModule<'a>,
    constructors: &'m [String],
    constants: FxHashMap<SymbolId, Constant>,
    found: Vec<WorkerCall>,
}

impl<'a> WorkerScanner<'_, 'a> {
    fn is_worker_constructor(&self, callee: &Expression<'a>) -> bool {
        self.constructors
            .iter()
            .any(|name| is_global_callee(&self.module.scoping, callee, name))
    }

    fn constant_of(&self, init: &Expression<'a>) -> Option<Constant> {
        if let Some(specifier) = static_string(init) {
            return Some(Constant {
                specifier,
                url_argument: None,
            });
        }
        let Expression::NewExpression(url) = init.without_parentheses() else {
            return None;
        };
        url_constructor_parts(&self.module.scoping, url).map(|(argument, specifier)| Constant {
            specifier,
            url_argument: Some(argument.span()),
        })
    }

    fn source_of(&self, argument: &Argument<'a>) -> Source {
        let Some(expr) = argument.as_expression() else {
            return Source::Dynamic;
        };
        if let Some(specifier) = static_string(expr) {
            return Source::Specifier(specifier);
        }
        match expr.without_parentheses() {
            Expression::NewExpression(url) => {
                match url_constructor_parts(&self.module.scoping, url) {
                    Some((_, specifier)) => Source::Specifier(specifier),
                    None => Source::Dynamic,
                }
            }
            Expression::Identifier(ident) => ident
                .reference_id
                .get()
                .and_then(|reference_id| {
                    self.module.scoping.get_reference(reference_id).symbol_id()
                })
                .map_or(Source::Dynamic, Source::Constant),
            _ => Source::Dynamic,
        }
    }
}

/// `{ type: 'module' }` selects an ES module worker.
fn worker_format(options: Option<&Argument<'_>>) -> ChunkFormat {
    let Some(Expression::ObjectExpression(object)) =
        options.and_then(|arg| arg.as_expression()).map(|expr| expr.without_parentheses())
    else {
        return ChunkFormat::Classic;
    };
    let is_module = object.properties.iter().any(|property| match property {
        ObjectPropertyKind::ObjectProperty(property) => {
            property.key.static_name().is_some_and(|key| key == "type")
                && static_string(&property.value).as_deref() == Some("module")
        }
        ObjectPropertyKind::SpreadProperty(_) => false,
    });
    if is_module {
        ChunkFormat::Module
    } else {
        ChunkFormat::Classic
    }
}

impl<'a> Visit<'a> for WorkerScanner<'_, 'a> {
    fn visit_variable_declarator(&mut self, it: &VariableDeclarator<'a>) {
        if it.kind == VariableDeclarationKind::Const {
            if let (BindingPatternKind::BindingIdentifier(ident), Some(init)) =
                (&it.id.kind, &it.init)
            {
                if let (Some(symbol_id), Some(constant)) =
                    (ident.symbol_id.get(), self.constant_of(init))
                {
                    self.constants.insert(symbol_id, constant);
                }
            }
        }
        walk::walk_variable_declarator(self, it);
    }

    fn visit_new_expression(&mut self, it: &NewExpression<'a>) {
        if self.is_worker_constructor(&it.callee) {
            if let Some(first) = it.arguments.first() {
                self.found.push(WorkerCall {
                    span: first.span(),
                    source: self.source_of(first),
                    format: worker_format(it.arguments.get(1)),
                });
            }
        }
        walk::walk_new_expression(self, it);
    }
}

#[async_trait]
impl Stage for WorkerStage {
    fn name(&self) -> &'static str {
        NAME
    }

    fn phase(&self) -> StagePhase {
        StagePhase::Chunks
    }

    fn precheck(&self, code: &str) -> bool {
        code.contains("Worker(")
    }

    async fn run(&self, entry: &mut Entry, ctx: &StageContext<'_>) -> Result<StageReport> {
        let mut report = StageReport::default();
        let revision = entry.revision();
        if !prepare(self, entry, ctx)? {
            report.changed = entry.revision() != revision;
            return Ok(report);
        }

        let constructors = ctx.config.worker_constructors.as_slice();
        let (calls, constants, declared) = entry.analyze(|tcx| {
            let module = tcx.ast()?;
            let mut scanner = WorkerScanner {
                module,
                constructors,
                constants: FxHashMap::default(),
                found: Vec::new(),
            };
            scanner.visit_program(&module.program);
            let declared: Vec<String> = module.declared_names().map(String::from).collect();
            Ok((scanner.found, scanner.constants, declared))
        })?;

        let mut bindings = ImportBindings::new(ImportStyle::Default, declared);
        let mut emitted: FxHashMap<PathBuf, String> = FxHashMap::default();
        let mut rewrite = Rewrite::default();
        let mut rewritten_constants: FxHashSet<Span> = FxHashSet::default();
        for call in calls {
            let (specifier, edit_span) = match call.source {
                Source::Specifier(specifier) => (specifier, None),
                Source::Constant(symbol_id) => match constants.get(&symbol_id) {
                    Some(constant) => (constant.specifier.clone(), constant.url_argument),
                    None => {
                        report.diagnostics.push(dynamic_source(entry, call.span));
                        continue;
                    }
                },
                Source::Dynamic => {
                    report.diagnostics.push(dynamic_source(entry, call.span));
                    continue;
                }
            };
            if is_absolute_url(&specifier) {
                continue;
            }
            let Some(resolved) =
                resolve_reference(ctx, NAME, &specifier, entry.path(), &mut report).await?
            else {
                continue;
            };

            let request = ChunkRequest {
                path: resolved.clone(),
                importer: entry.path().to_path_buf(),
                format: call.format,
            };
            let source = match (ctx.emitter, emitted.get(&resolved)) {
                (_, Some(file_name)) => file_name.clone(),
                (Some(emitter), None) => {
                    let file_name = emitter.emit_chunk(&resolved, &request).await?.file_name;
                    emitted.insert(resolved.clone(), file_name.clone());
                    file_name
                }
                (None, None) => resolved.to_string_lossy().into_owned(),
            };
            tracing::debug!(
                importer = %entry.path().display(),
                worker = %resolved.display(),
                format = ?call.format,
                "worker chunk"
            );
            if !report.chunks.contains(&request) {
                report.chunks.push(request.clone());
            }
            entry.push_chunk(request);

            let name = bindings.bind(&resolved, &specifier, source);
            match edit_span {
                Some(span) => {
                    if rewritten_constants.insert(span) {
                        rewrite.edits.push(Edit::new(span, name));
                    }
                }
                None => rewrite
                    .edits
                    .push(Edit::new(call.span, format!("new URL({name}, import.meta.url)"))),
            }
        }
        rewrite.prelude = bindings.render();
        rewrite.apply(entry)?;

        report.changed = entry.revision() != revision;
        Ok(report)
    }
}

fn dynamic_source(entry: &Entry, span: Span) -> Diagnostic {
    Diagnostic::info(
        NAME,
        entry.path(),
        format!(
            "worker at offset {} has a non-static script argument and was left as is",
            span.start
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransformConfig;
    use crate::stages::ChunkEmitter;
    use crate::test_utils::{RecordingEmitter, StaticResolver};

    async fn run(
        code: &str,
        resolver: &StaticResolver,
        emitter: Option<&dyn ChunkEmitter>,
    ) -> (Entry, StageReport) {
        let config = TransformConfig::default();
        let ctx = StageContext {
            resolver,
            emitter,
            config: &config,
        };
        let mut entry = Entry::new("/src/main.js", code);
        let report = WorkerStage.run(&mut entry, &ctx).await.unwrap();
        (entry, report)
    }

    #[tokio::test]
    async fn shadowed_worker_is_skipped_but_global_form_is_rewritten() {
        let resolver = StaticResolver::new().with("./x.js", "/abs/x.js");
        let (entry, report) = run(
            "class Worker {}\nexport const w = new Worker('./x.js');\nexport const v = new window.Worker('./x.js');",
            &resolver,
            None,
        )
        .await;
        assert!(report.changed);
        assert_eq!(
            entry.code(),
            "import _x_js from '/abs/x.js';\nclass Worker {}\nexport const w = new Worker('./x.js');\nexport const v = new window.Worker(new URL(_x_js, import.meta.url));"
        );
        assert_eq!(report.chunks.len(), 1);
        assert_eq!(report.chunks[0].format, ChunkFormat::Classic);
    }

    #[tokio::test]
    async fn url_and_constant_arguments() {
        let resolver = StaticResolver::new()
            .with("./a.js", "/abs/a.js")
            .with("./b.js", "/abs/b.js");
        let (entry, report) = run(
            "const script = new URL('./b.js', import.meta.url);\nnew Worker(new URL('./a.js', import.meta.url), { type: 'module' });\nnew SharedWorker(script);",
            &resolver,
            None,
        )
        .await;
        assert!(entry
            .code()
            .contains("new Worker(new URL(_a_js, import.meta.url), { type: 'module' });"));
        assert!(entry
            .code()
            .contains("const script = new URL(_b_js, import.meta.url);\n"));
        assert!(entry.code().ends_with("new SharedWorker(script);"));
        let formats: Vec<_> = report.chunks.iter().map(|chunk| chunk.format).collect();
        assert_eq!(formats, vec![ChunkFormat::Module, ChunkFormat::Classic]);
        assert_eq!(entry.chunks().len(), 2);
    }

    #[tokio::test]
    async fn shared_url_constant_is_rewritten_once() {
        let resolver = StaticResolver::new().with("./b.js", "/abs/b.js");
        let (entry, report) = run(
            "const script = new URL('./b.js', import.meta.url);\nnew Worker(script);\nnew Worker(script, { type: 'module' });",
            &resolver,
            None,
        )
        .await;
        assert_eq!(
            entry.code(),
            "import _b_js from '/abs/b.js';\nconst script = new URL(_b_js, import.meta.url);\nnew Worker(script);\nnew Worker(script, { type: 'module' });"
        );
        assert_eq!(report.chunks.len(), 2);
    }

    #[tokio::test]
    async fn string_constant_rewrites_the_argument() {
        let resolver = StaticResolver::new().with("./b.js", "/abs/b.js");
        let (entry, _) =
            run("const script = './b.js';\nnew Worker(script);", &resolver, None).await;
        assert_eq!(
            entry.code(),
            "import _b_js from '/abs/b.js';\nconst script = './b.js';\nnew Worker(new URL(_b_js, import.meta.url));"
        );
    }

    #[tokio::test]
    async fn mutable_binding_is_not_followed() {
        let resolver = StaticResolver::new().with("./a.js", "/abs/a.js");
        let code = "let script = './a.js';\nnew Worker(script);";
        let (entry, report) = run(code, &resolver, None).await;
        assert_eq!(entry.code(), code);
        assert_eq!(report.diagnostics.len(), 1);
        assert!(resolver.calls().is_empty());
    }

    #[tokio::test]
    async fn emitter_names_the_import() {
        let resolver = StaticResolver::new().with("./x.js", "/abs/x.js");
        let emitter = RecordingEmitter::default();
        let (entry, report) = run(
            "new Worker('./x.js');\nnew Worker('./x.js');",
            &resolver,
            Some(&emitter),
        )
        .await;
        assert!(entry.code().starts_with("import _x_js from '/assets/x.chunk.js';\n"));
        assert_eq!(entry.code().matches("new URL(_x_js, import.meta.url)").count(), 2);
        assert_eq!(report.chunks.len(), 1);
        assert_eq!(emitter.emitted(), vec![PathBuf::from("/abs/x.js")]);
    }
}
