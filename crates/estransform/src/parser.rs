//! Parsing and AST shape helpers shared by the feature stages.

use crate::{Error, Result};
use oxc_allocator::Allocator;
use oxc_ast::ast::{Argument, Expression, IdentifierReference, NewExpression, Program};
use oxc_parser::{ParseOptions, Parser, ParserReturn};
use oxc_semantic::{Scoping, SemanticBuilder};
use oxc_span::SourceType;
use std::path::Path;

/// Objects whose members alias the global scope.
const GLOBAL_OBJECTS: [&str; 4] = ["window", "self", "globalThis", "global"];

/// A parsed program together with its scope tree.
pub struct ParsedModule<'a> {
    pub program: Program<'a>,
    pub scoping: Scoping,
}

impl<'a> ParsedModule<'a> {
    /// Whether `ident` refers to a global that no local binding shadows.
    pub fn is_global(&self, ident: &IdentifierReference<'a>) -> bool {
        is_global_reference(&self.scoping, ident)
    }

    /// Whether the program contains `import`/`export` declarations.
    pub fn has_module_syntax(&self) -> bool {
        self.program
            .body
            .iter()
            .any(|statement| statement.is_module_declaration())
    }

    /// Names of every declared symbol, in any scope.
    pub fn declared_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.scoping
            .symbol_ids()
            .map(|symbol_id| self.scoping.symbol_name(symbol_id))
    }
}

/// Parse `code` and build its scope tree.
///
/// Any parser diagnostic is fatal; the error carries `path`. Code without a
/// declared module goal is tried as a module first, then as a script, where
/// a top-level `return` is allowed as in CommonJS.
pub fn parse_module<'a>(
    allocator: &'a Allocator,
    code: &'a str,
    source_type: SourceType,
    path: &Path,
) -> Result<ParsedModule<'a>> {
    if !source_type.is_unambiguous() {
        return parse_with(allocator, code, source_type, path);
    }
    parse_with(allocator, code, source_type.with_module(true), path).or_else(|module_err| {
        parse_with(allocator, code, source_type.with_script(true), path).map_err(|_| module_err)
    })
}

fn parse_with<'a>(
    allocator: &'a Allocator,
    code: &'a str,
    source_type: SourceType,
    path: &Path,
) -> Result<ParsedModule<'a>> {
    let options = ParseOptions {
        allow_return_outside_function: source_type.is_script(),
        ..ParseOptions::default()
    };
    let ParserReturn {
        program,
        errors,
        panicked,
        ..
    } = Parser::new(allocator, code, source_type)
        .with_options(options)
        .parse();

    if panicked || !errors.is_empty() {
        let message = errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(Error::parse(path, message));
    }

    let scoping = SemanticBuilder::new().build(&program).semantic.into_scoping();
    Ok(ParsedModule { program, scoping })
}

pub fn is_global_reference(scoping: &Scoping, ident: &IdentifierReference<'_>) -> bool {
    ident
        .reference_id
        .get()
        .is_none_or(|reference_id| scoping.get_reference(reference_id).symbol_id().is_none())
}

/// Matches `name`, or `window.name`/`self.name`/`globalThis.name`/`global.name`
/// where the receiver object is itself an unshadowed global.
pub fn is_global_callee(scoping: &Scoping, callee: &Expression<'_>, name: &str) -> bool {
    match callee.without_parentheses() {
        Expression::Identifier(ident) => {
            ident.name.as_str() == name && is_global_reference(scoping, ident)
        }
        Expression::StaticMemberExpression(member) => {
            member.property.name.as_str() == name
                && matches!(
                    member.object.without_parentheses(),
                    Expression::Identifier(object)
                        if GLOBAL_OBJECTS.contains(&object.name.as_str())
                            && is_global_reference(scoping, object)
                )
        }
        _ => false,
    }
}

/// Value of a string literal or a substitution-free template literal.
pub fn static_string(expr: &Expression<'_>) -> Option<String> {
    match expr.without_parentheses() {
        Expression::StringLiteral(lit) => Some(lit.value.to_string()),
        Expression::TemplateLiteral(tpl) if tpl.expressions.is_empty() => tpl
            .quasis
            .first()
            .and_then(|quasi| quasi.value.cooked.as_ref())
            .map(|cooked| cooked.to_string()),
        _ => None,
    }
}

pub fn static_string_argument(argument: Option<&Argument<'_>>) -> Option<String> {
    argument.and_then(|arg| arg.as_expression()).and_then(static_string)
}

/// `import.meta.url`
pub fn is_import_meta_url(expr: &Expression<'_>) -> bool {
    match expr.without_parentheses() {
        Expression::StaticMemberExpression(member) => {
            member.property.name.as_str() == "url" && is_import_meta(&member.object)
        }
        _ => false,
    }
}

pub fn is_import_meta(expr: &Expression<'_>) -> bool {
    matches!(
        expr.without_parentheses(),
        Expression::MetaProperty(meta)
            if meta.meta.name.as_str() == "import" && meta.property.name.as_str() == "meta"
    )
}

/// `new URL(<static string>, import.meta.url)` with a global `URL` callee:
/// the first argument and its value.
pub fn url_constructor_parts<'e, 'a>(
    scoping: &Scoping,
    new_expr: &'e NewExpression<'a>,
) -> Option<(&'e Argument<'a>, String)> {
    if !is_global_callee(scoping, &new_expr.callee, "URL") || new_expr.arguments.len() != 2 {
        return None;
    }
    let base = new_expr.arguments[1].as_expression()?;
    if !is_import_meta_url(base) {
        return None;
    }
    let first = new_expr.arguments.first()?;
    Some((first, static_string_argument(Some(first))?))
}

/// Specifiers that name a URL rather than a module or file.
pub fn is_absolute_url(specifier: &str) -> bool {
    if specifier.starts_with("//") || specifier.starts_with('#') {
        return true;
    }
    match specifier.split_once(':') {
        // `C:\` style drive letters are paths, not schemes
        Some((scheme, _)) => {
            scheme.len() > 1
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}
