use super::{SourceMap, parse_source_map};
use crate::Runtime;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

/// Trailing `//# sourceMappingURL=...` or `/*# sourceMappingURL=... */`, with
/// `#`, `@` or no marker, followed only by whitespace.
static SOURCE_MAP_COMMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?://[#@]?[ \t]*sourceMappingURL=([^\s'\x22]+)[ \t]*|/\*[#@]?[ \t]*sourceMappingURL=([^\s'\x22*]+)[ \t]*\*/)\s*\z",
    )
    .expect("source map comment pattern is valid")
});

/// URL of the trailing source map comment, if any.
pub fn source_map_url(code: &str) -> Option<&str> {
    let captures = SOURCE_MAP_COMMENT.captures(code)?;
    captures
        .get(1)
        .or_else(|| captures.get(2))
        .map(|m| m.as_str())
}

/// Strip a trailing source map comment, leaving everything before it untouched.
pub fn remove_source_map_comment(code: &str) -> String {
    match SOURCE_MAP_COMMENT.find(code) {
        Some(m) => code[..m.start()].to_string(),
        None => code.to_string(),
    }
}

/// Append an inline `data:` source map comment, replacing an existing one.
pub fn inline_source_map(code: &str, map: &SourceMap) -> crate::Result<String> {
    let mut output = remove_source_map_comment(code);
    if !output.is_empty() && !output.ends_with('\n') {
        output.push('\n');
    }
    output.push_str("//# sourceMappingURL=");
    output.push_str(&map.to_data_url()?);
    Ok(output)
}

/// Best-effort load of the map referenced by `code`'s trailing comment.
///
/// Inline `data:` URIs are decoded directly. File references are resolved
/// against `file_path`'s directory and read through `runtime`. Any failure
/// yields `None`.
pub async fn load_source_map_from_comment(
    code: &str,
    file_path: Option<&Path>,
    runtime: &dyn Runtime,
) -> Option<SourceMap> {
    let url = source_map_url(code)?;

    if let Some(data) = url.strip_prefix("data:") {
        return decode_data_url(data);
    }

    if url.contains("://") && !url.starts_with("file://") {
        tracing::debug!(url, "ignoring remote source map reference");
        return None;
    }

    let file_path = file_path?;
    let reference = url.strip_prefix("file://").unwrap_or(url);
    let reference = urlencoding::decode(reference).ok()?;
    let map_path = match file_path.parent() {
        Some(dir) => dir.join(reference.as_ref()),
        None => Path::new(reference.as_ref()).to_path_buf(),
    };

    let bytes = match runtime.read_file(&map_path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::debug!(path = %map_path.display(), error = %e, "source map file unreadable");
            return None;
        }
    };
    let text = String::from_utf8(bytes).ok()?;
    parse_source_map(&text).ok()
}

fn decode_data_url(data: &str) -> Option<SourceMap> {
    let (header, payload) = data.split_once(',')?;
    let json = if header.split(';').any(|part| part == "base64") {
        let bytes = STANDARD.decode(payload.trim()).ok()?;
        String::from_utf8(bytes).ok()?
    } else {
        urlencoding::decode(payload).ok()?.into_owned()
    };
    parse_source_map(&json).ok()
}
