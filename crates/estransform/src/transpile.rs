//! Syntax lowering sub-stage.
//!
//! Strips TypeScript types and lowers JSX so the feature stages only ever see
//! plain JavaScript. Runs through `oxc_transformer` and re-prints with
//! `oxc_codegen`, which also produces the map for this link of the chain.

use crate::sourcemap::SourceMap;
use crate::target::{Loader, Target};
use crate::transform::TransformResult;
use crate::{Error, Result};
use oxc_allocator::Allocator;
use oxc_codegen::{Codegen, CodegenOptions, CodegenReturn};
use oxc_parser::Parser;
use oxc_semantic::SemanticBuilder;
use oxc_transformer::{TransformOptions as OxcTransformOptions, Transformer};
use std::path::Path;

/// Lower `code` to `target`.
///
/// The returned result always carries loader `js` and the concrete target,
/// even when the printed code happens to equal the input.
pub fn transpile(
    code: &str,
    path: &Path,
    loader: Loader,
    target: Target,
) -> Result<TransformResult> {
    if !target.is_concrete() {
        return Err(Error::Transpile {
            path: path.to_path_buf(),
            message: format!("'{target}' is not a JavaScript target"),
        });
    }

    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, code, loader.source_type(path)).parse();
    if ret.panicked || !ret.errors.is_empty() {
        let message = ret
            .errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(Error::parse(path, message));
    }
    let mut program = ret.program;

    let options = OxcTransformOptions::from_target(target.as_str()).map_err(|e| Error::Transpile {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let semantic = SemanticBuilder::new()
        .with_check_syntax_error(false)
        .build(&program);
    let transformed = Transformer::new(&allocator, path, &options)
        .build_with_scoping(semantic.semantic.into_scoping(), &mut program);
    if !transformed.errors.is_empty() {
        let message = transformed
            .errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(Error::Transpile {
            path: path.to_path_buf(),
            message,
        });
    }

    let CodegenReturn { code: printed, map, .. } = Codegen::new()
        .with_options(CodegenOptions {
            source_map_path: Some(path.to_path_buf()),
            ..CodegenOptions::default()
        })
        .build(&program);

    let map = map
        .as_ref()
        .map(SourceMap::from_oxc)
        .transpose()?
        .map(|mut map| {
            map.sources = vec![path.to_string_lossy().into_owned()];
            map.sources_content = Some(vec![Some(code.to_string())]);
            map
        });

    tracing::debug!(path = %path.display(), %target, "transpiled");

    Ok(TransformResult {
        code: printed,
        map,
        loader: Some(Loader::Js),
        target: Some(target),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_types() {
        let result = transpile(
            "interface A { a: number }\nexport const a: number = 1;\n",
            Path::new("/src/a.ts"),
            Loader::Ts,
            Target::Es2020,
        )
        .unwrap();
        assert!(!result.code.contains("interface"));
        assert!(result.code.contains("export const a = 1"));
        assert_eq!(result.loader, Some(Loader::Js));
        assert_eq!(result.target, Some(Target::Es2020));

        let map = result.map.unwrap();
        assert_eq!(map.sources, vec!["/src/a.ts".to_string()]);
        assert!(!map.mappings.is_empty());
    }

    #[test]
    fn lowers_jsx() {
        let result = transpile(
            "export const el = <div className=\"x\" />;\n",
            Path::new("/src/el.jsx"),
            Loader::Jsx,
            Target::Es2020,
        )
        .unwrap();
        assert!(!result.code.contains("<div"));
    }

    #[test]
    fn syntax_errors_are_parse_errors() {
        let err = transpile("let a: = ;", Path::new("/src/bad.ts"), Loader::Ts, Target::Es2020)
            .unwrap_err();
        assert!(err.is_parse_error());
    }

    #[test]
    fn rejects_non_concrete_target() {
        let err = transpile("a;", Path::new("/src/a.ts"), Loader::Ts, Target::Typescript)
            .unwrap_err();
        assert!(matches!(err, Error::Transpile { .. }));
    }
}
