//! Removes webpack-only constructs.
//!
//! - `/* webpackChunkName: "x" */` style magic comments inside `import()`
//! - `module.hot` and `import.meta.webpackHot` become `undefined`, which
//!   turns HMR blocks into dead code
//! - `require.context(..)` has no ESM equivalent and is only reported

use super::{Edit, Rewrite, Stage, StageContext, StagePhase, StageReport, prepare};
use crate::Result;
use crate::entry::Entry;
use crate::parser::{ParsedModule, is_global_reference, is_import_meta};
use async_trait::async_trait;
use oxc_ast::ast::{CallExpression, Expression, ImportExpression, StaticMemberExpression};
use oxc_ast_visit::{Visit, walk};
use oxc_span::Span;

const NAME: &str = "unwebpack";

#[derive(Debug, Default, Clone, Copy)]
pub struct UnwebpackStage;

struct WebpackScanner<'m, 'a> {
    module: &'m ParsedModule<'a>,
    imports: Vec<Span>,
    hot: Vec<Span>,
    contexts: Vec<Span>,
}

impl WebpackScanner<'_, '_> {
    fn is_global(&self, expr: &Expression<'_>, name: &str) -> bool {
        matches!(
            expr.without_parentheses(),
            Expression::Identifier(ident)
                if ident.name.as_str() == name && is_global_reference(&self.module.scoping, ident)
        )
    }
}

impl<'a> Visit<'a> for WebpackScanner<'_, 'a> {
    fn visit_import_expression(&mut self, it: &ImportExpression<'a>) {
        self.imports.push(it.span);
        walk::walk_import_expression(self, it);
    }

    fn visit_static_member_expression(&mut self, it: &StaticMemberExpression<'a>) {
        let property = it.property.name.as_str();
        let is_hot = (property == "hot" && self.is_global(&it.object, "module"))
            || (property == "webpackHot" && is_import_meta(&it.object));
        if is_hot {
            self.hot.push(it.span);
            return;
        }
        walk::walk_static_member_expression(self, it);
    }

    fn visit_call_expression(&mut self, it: &CallExpression<'a>) {
        if let Expression::StaticMemberExpression(member) = it.callee.without_parentheses() {
            if member.property.name.as_str() == "context"
                && self.is_global(&member.object, "require")
            {
                self.contexts.push(it.span);
            }
        }
        walk::walk_call_expression(self, it);
    }
}

/// Whether a block comment's text is a webpack directive.
fn is_magic_comment(text: &str) -> bool {
    let body = text
        .strip_prefix("/*")
        .and_then(|rest| rest.strip_suffix("*/"))
        .unwrap_or(text)
        .trim_start_matches(['*', ' ', '\t', '\n', '\r']);
    body.starts_with("webpack")
}

/// Spans of magic comments inside `imports`, each widened over the
/// whitespace that follows it.
fn magic_comment_spans(code: &str, comments: &[Span], imports: &[Span]) -> Vec<Span> {
    comments
        .iter()
        .filter(|comment| {
            imports
                .iter()
                .any(|import| import.start < comment.start && comment.end <= import.end)
        })
        .filter(|comment| is_magic_comment(&code[comment.start as usize..comment.end as usize]))
        .map(|comment| {
            let rest = &code[comment.end as usize..];
            let trailing = rest.len() - rest.trim_start_matches([' ', '\t']).len();
            Span::new(comment.start, comment.end + trailing as u32)
        })
        .collect()
}

#[async_trait]
impl Stage for UnwebpackStage {
    fn name(&self) -> &'static str {
        NAME
    }

    fn phase(&self) -> StagePhase {
        StagePhase::Cleanup
    }

    fn precheck(&self, code: &str) -> bool {
        code.contains("webpack") || code.contains("module.hot") || code.contains("require.context")
    }

    async fn run(&self, entry: &mut Entry, ctx: &StageContext<'_>) -> Result<StageReport> {
        let mut report = StageReport::default();
        let revision = entry.revision();
        if !prepare(self, entry, ctx)? {
            report.changed = entry.revision() != revision;
            return Ok(report);
        }

        let (comments, hot, contexts) = entry.analyze(|tcx| {
            let module = tcx.ast()?;
            let mut scanner = WebpackScanner {
                module,
                imports: Vec::new(),
                hot: Vec::new(),
                contexts: Vec::new(),
            };
            scanner.visit_program(&module.program);
            let block_comments: Vec<Span> = module
                .program
                .comments
                .iter()
                .filter(|comment| comment.is_block())
                .map(|comment| comment.span)
                .collect();
            let comments = magic_comment_spans(tcx.code(), &block_comments, &scanner.imports);
            Ok((comments, scanner.hot, scanner.contexts))
        })?;

        for span in &contexts {
            report.warn(
                NAME,
                entry.path(),
                format!(
                    "require.context at offset {} is not supported and was left as is",
                    span.start
                ),
            );
        }

        let mut rewrite = Rewrite::default();
        rewrite
            .edits
            .extend(comments.into_iter().map(|span| Edit::new(span, "")));
        rewrite
            .edits
            .extend(hot.into_iter().map(|span| Edit::new(span, "undefined")));
        rewrite.apply(entry)?;

        report.changed = entry.revision() != revision;
        Ok(report)
    }
}
