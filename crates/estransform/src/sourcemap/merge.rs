use super::SourceMap;
use crate::{Error, Result};
use oxc_sourcemap::SourceMapBuilder;

/// Compose an ordered chain of incremental maps, oldest first, into one map
/// from the final generated code back to the first map's sources.
///
/// An empty chain yields `None`; a single map is returned as is, stamped with
/// version 3.
pub fn merge_source_maps(maps: &[SourceMap]) -> Result<Option<SourceMap>> {
    let Some((first, rest)) = maps.split_first() else {
        return Ok(None);
    };

    let mut composed = SourceMap {
        version: 3,
        ..first.clone()
    };
    for next in rest {
        composed = compose(&composed, next)?;
    }
    Ok(Some(composed))
}

/// Resolve every token of `next` through `base`.
///
/// Tokens whose original position has no mapping on the same line of `base`
/// are dropped; the composed map never invents positions.
fn compose(base: &SourceMap, next: &SourceMap) -> Result<SourceMap> {
    let upstream = base.to_oxc()?;
    let downstream = next.to_oxc()?;
    let lookup = upstream.generate_lookup_table();

    let mut builder = SourceMapBuilder::default();
    for source in &base.sources {
        builder.add_source_and_content(source, "");
    }

    for token in downstream.get_tokens() {
        if token.get_source_id().is_none() {
            continue;
        }
        let (line, column) = (token.get_src_line(), token.get_src_col());
        let Some(original) = upstream.lookup_token(&lookup, line, column) else {
            continue;
        };
        if original.get_dst_line() != line {
            continue;
        }
        let Some(source_id) = original.get_source_id() else {
            continue;
        };

        let name = original
            .get_name_id()
            .and_then(|id| base.names.get(id as usize))
            .or_else(|| {
                token
                    .get_name_id()
                    .and_then(|id| next.names.get(id as usize))
            });
        let name_id = name.map(|name| builder.add_name(name));

        builder.add_token(
            token.get_dst_line(),
            token.get_dst_col(),
            original.get_src_line(),
            original.get_src_col(),
            Some(source_id),
            name_id,
        );
    }

    let mut merged = SourceMap::from_oxc(&builder.into_sourcemap())
        .map_err(|e| Error::SourceMapMerge(e.to_string()))?;
    merged.version = 3;
    merged.sources = base.sources.clone();
    merged.sources_content = base.sources_content.clone();
    merged.source_root = base.source_root.clone();
    merged.file = next.file.clone().or_else(|| base.file.clone());
    Ok(merged)
}
