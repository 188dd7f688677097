//! Source map utilities: parse, detect, strip, inline and merge.
//!
//! [`SourceMap`] is the serde data model used throughout the pipeline. Token
//! level work (composition, generation) goes through `oxc_sourcemap`, the same
//! implementation oxc's codegen and rolldown use, so maps move between the
//! pipeline and the bundler without re-encoding surprises.

mod comment;
mod merge;

pub use comment::{
    inline_source_map, load_source_map_from_comment, remove_source_map_comment,
    source_map_url,
};
pub use merge::merge_source_maps;

use crate::{Error, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

/// A version 3 source map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMap {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_root: Option<String>,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources_content: Option<Vec<Option<String>>>,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub mappings: String,
}

fn default_version() -> u32 {
    3
}

impl SourceMap {
    /// Serialize to compact JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::SourceMapParse(e.to_string()))
    }

    /// `data:` URI carrying the base64 encoded JSON.
    pub fn to_data_url(&self) -> Result<String> {
        Ok(format!(
            "data:application/json;charset=utf-8;base64,{}",
            STANDARD.encode(self.to_json()?)
        ))
    }

    pub(crate) fn to_oxc(&self) -> Result<oxc_sourcemap::SourceMap> {
        oxc_sourcemap::SourceMap::from_json_string(&self.to_json()?)
            .map_err(|e| Error::SourceMapParse(format!("{e:?}")))
    }

    pub(crate) fn from_oxc(map: &oxc_sourcemap::SourceMap) -> Result<Self> {
        parse_source_map(&map.to_json_string())
    }
}

/// Parse a JSON source map.
///
/// Malformed JSON is an error here; callers that treat maps as advisory use
/// [`load_source_map_from_comment`], which degrades to `None` instead.
pub fn parse_source_map(text: &str) -> Result<SourceMap> {
    serde_json::from_str(text).map_err(|e| Error::SourceMapParse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_map() {
        let map =
            parse_source_map(r#"{"version":3,"sources":["a.js"],"names":[],"mappings":"AAAA"}"#)
                .unwrap();
        assert_eq!(map.version, 3);
        assert_eq!(map.sources, vec!["a.js".to_string()]);
        assert_eq!(map.sources_content, None);
        assert_eq!(map.file, None);
    }

    #[test]
    fn malformed_json_is_an_error() {
        let err = parse_source_map("{\"version\":3,").unwrap_err();
        assert!(matches!(err, Error::SourceMapParse(_)));
    }

    #[test]
    fn keeps_null_sources_content() {
        let map = parse_source_map(
            r#"{"version":3,"sources":["a.js","b.js"],"sourcesContent":["x",null],"names":[],"mappings":""}"#,
        )
        .unwrap();
        assert_eq!(
            map.sources_content,
            Some(vec![Some("x".to_string()), None])
        );
        let json = map.to_json().unwrap();
        assert!(json.contains(r#""sourcesContent":["x",null]"#));
    }
}
