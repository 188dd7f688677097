//! `require.resolve('./file')` rewriting.
//!
//! In [`RequireResolveMode::Import`] mode the call becomes a synthesized
//! import binding, one per resolved file. In [`RequireResolveMode::Inline`]
//! mode it becomes the quoted resolved path.

use super::{
    Edit, ImportBindings, ImportStyle, Rewrite, Stage, StageContext, StagePhase, StageReport,
    prepare, quote, resolve_reference,
};
use crate::Result;
use crate::config::RequireResolveMode;
use crate::diagnostics::Diagnostic;
use crate::entry::Entry;
use crate::parser::{ParsedModule, is_global_reference, static_string_argument};
use async_trait::async_trait;
use oxc_ast::ast::{CallExpression, Expression};
use oxc_ast_visit::{Visit, walk};
use oxc_span::Span;

const NAME: &str = "require-resolve";

#[derive(Debug, Default, Clone, Copy)]
pub struct RequireResolveStage;

#[derive(Debug)]
enum Call {
    Literal { span: Span, specifier: String },
    Dynamic { span: Span },
}

struct ResolveScanner<'m, 'a> {
    module: &'m ParsedModule<'a>,
    found: Vec<Call>,
}

impl ResolveScanner<'_, '_> {
    fn is_require_resolve(&self, callee: &Expression<'_>) -> bool {
        match callee.without_parentheses() {
            Expression::StaticMemberExpression(member) => {
                member.property.name.as_str() == "resolve"
                    && matches!(
                        member.object.without_parentheses(),
                        Expression::Identifier(object)
                            if object.name.as_str() == "require"
                                && is_global_reference(&self.module.scoping, object)
                    )
            }
            _ => false,
        }
    }
}

impl<'a> Visit<'a> for ResolveScanner<'_, 'a> {
    fn visit_call_expression(&mut self, it: &CallExpression<'a>) {
        if self.is_require_resolve(&it.callee) {
            let call = match static_string_argument(it.arguments.first()) {
                Some(specifier) if it.arguments.len() == 1 => Call::Literal {
                    span: it.span,
                    specifier,
                },
                _ => Call::Dynamic { span: it.span },
            };
            self.found.push(call);
        }
        walk::walk_call_expression(self, it);
    }
}

#[async_trait]
impl Stage for RequireResolveStage {
    fn name(&self) -> &'static str {
        NAME
    }

    fn phase(&self) -> StagePhase {
        StagePhase::Assets
    }

    fn precheck(&self, code: &str) -> bool {
        code.contains("require.resolve(")
    }

    async fn run(&self, entry: &mut Entry, ctx: &StageContext<'_>) -> Result<StageReport> {
        let mut report = StageReport::default();
        let revision = entry.revision();
        if !prepare(self, entry, ctx)? {
            report.changed = entry.revision() != revision;
            return Ok(report);
        }

        let (calls, declared) = entry.analyze(|tcx| {
            let module = tcx.ast()?;
            let mut scanner = ResolveScanner {
                module,
                found: Vec::new(),
            };
            scanner.visit_program(&module.program);
            let declared: Vec<String> = module.declared_names().map(String::from).collect();
            Ok((scanner.found, declared))
        })?;

        let mut bindings = ImportBindings::new(ImportStyle::Default, declared);
        let mut rewrite = Rewrite::default();
        for call in calls {
            let (span, specifier) = match call {
                Call::Literal { span, specifier } => (span, specifier),
                Call::Dynamic { span } => {
                    report.diagnostics.push(Diagnostic::info(
                        NAME,
                        entry.path(),
                        format!(
                            "require.resolve at offset {} has a non-literal argument and was left as is",
                            span.start
                        ),
                    ));
                    continue;
                }
            };
            let Some(resolved) =
                resolve_reference(ctx, NAME, &specifier, entry.path(), &mut report).await?
            else {
                continue;
            };
            let source = resolved.to_string_lossy().into_owned();
            let replacement = match ctx.config.require_resolve {
                RequireResolveMode::Import => {
                    bindings.bind(&resolved, &specifier, source).to_string()
                }
                RequireResolveMode::Inline => quote(&source),
            };
            rewrite.edits.push(Edit::new(span, replacement));
        }
        rewrite.prelude = bindings.render();
        rewrite.apply(entry)?;

        report.changed = entry.revision() != revision;
        Ok(report)
    }
}
