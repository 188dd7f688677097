//! `new URL('./asset', import.meta.url)` rewriting.
//!
//! ```javascript
//! const u = new URL('./b.png', import.meta.url).href;
//! ```
//!
//! becomes
//!
//! ```javascript
//! import _b_png from '/abs/b.png';
//! const u = new URL(_b_png, import.meta.url).href;
//! ```
//!
//! so the bundler sees a real dependency on the asset and substitutes its
//! emitted URL for the binding.

use super::{
    Edit, ImportBindings, ImportStyle, Rewrite, Stage, StageContext, StagePhase, StageReport,
    prepare, resolve_reference,
};
use crate::Result;
use crate::entry::Entry;
use crate::parser::{ParsedModule, is_absolute_url, url_constructor_parts};
use async_trait::async_trait;
use oxc_ast::ast::NewExpression;
use oxc_ast_visit::{Visit, walk};
use oxc_span::{GetSpan, Span};

const NAME: &str = "meta-url";

#[derive(Debug, Default, Clone, Copy)]
pub struct MetaUrlStage;

#[derive(Debug)]
struct UrlReference {
    span: Span,
    specifier: String,
}

struct UrlScanner<'m, 'a> {
    module: &'m ParsedModule<'a>,
    found: Vec<UrlReference>,
}

impl<'a> Visit<'a> for UrlScanner<'_, 'a> {
    fn visit_new_expression(&mut self, it: &NewExpression<'a>) {
        if let Some((argument, specifier)) = url_constructor_parts(&self.module.scoping, it) {
            if !is_absolute_url(&specifier) {
                self.found.push(UrlReference {
                    span: argument.span(),
                    specifier,
                });
            }
        }
        walk::walk_new_expression(self, it);
    }
}

#[async_trait]
impl Stage for MetaUrlStage {
    fn name(&self) -> &'static str {
        NAME
    }

    fn phase(&self) -> StagePhase {
        StagePhase::Assets
    }

    fn precheck(&self, code: &str) -> bool {
        code.contains("URL(") && code.contains("import.meta.url")
    }

    async fn run(&self, entry: &mut Entry, ctx: &StageContext<'_>) -> Result<StageReport> {
        let mut report = StageReport::default();
        let revision = entry.revision();
        if !prepare(self, entry, ctx)? {
            report.changed = entry.revision() != revision;
            return Ok(report);
        }

        let (references, declared) = entry.analyze(|tcx| {
            let module = tcx.ast()?;
            let mut scanner = UrlScanner {
                module,
                found: Vec::new(),
            };
            scanner.visit_program(&module.program);
            let declared: Vec<String> = module.declared_names().map(String::from).collect();
            Ok((scanner.found, declared))
        })?;
        tracing::trace!(path = %entry.path().display(), count = references.len(), "url references");

        let mut bindings = ImportBindings::new(ImportStyle::Default, declared);
        let mut rewrite = Rewrite::default();
        for reference in references {
            let Some(resolved) =
                resolve_reference(ctx, NAME, &reference.specifier, entry.path(), &mut report).await?
            else {
                continue;
            };
            let source = resolved.to_string_lossy().into_owned();
            let name = bindings.bind(&resolved, &reference.specifier, source);
            rewrite.edits.push(Edit::new(reference.span, name));
        }
        rewrite.prelude = bindings.render();
        rewrite.apply(entry)?;

        report.changed = entry.revision() != revision;
        Ok(report)
    }
}
