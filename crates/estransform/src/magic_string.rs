//! Offset-addressed text editing with source map generation.
//!
//! Every edit is keyed by byte offsets into the string the buffer was built
//! from. Offsets are never renumbered after earlier edits, so a stage can
//! collect spans from the AST and apply them in any order.

use crate::sourcemap::SourceMap;
use crate::{Error, Result};
use oxc_sourcemap::SourceMapBuilder;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone)]
struct Overwrite {
    end: usize,
    content: String,
}

/// Options for [`MagicString::generate_map`].
#[derive(Debug, Clone, Default)]
pub struct MapOptions {
    /// Name recorded in `sources`.
    pub source: Option<String>,
    /// Value of the map's `file` field.
    pub file: Option<String>,
    /// Embed the original string as `sourcesContent`.
    pub include_content: bool,
}

/// Mutable text buffer over an immutable original string.
#[derive(Debug, Clone)]
pub struct MagicString {
    original: String,
    intro: String,
    outro: String,
    overwrites: BTreeMap<usize, Overwrite>,
    insertions: BTreeMap<usize, String>,
}

enum Piece<'s> {
    Inserted(&'s str),
    Original { start: usize, end: usize },
    Replaced { start: usize, content: &'s str },
}

impl MagicString {
    pub fn new(original: impl Into<String>) -> Self {
        Self {
            original: original.into(),
            intro: String::new(),
            outro: String::new(),
            overwrites: BTreeMap::new(),
            insertions: BTreeMap::new(),
        }
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    /// Insert at the very start of the output.
    pub fn prepend(&mut self, content: &str) -> &mut Self {
        self.intro.insert_str(0, content);
        self
    }

    /// Insert at the very end of the output.
    pub fn append(&mut self, content: &str) -> &mut Self {
        self.outro.push_str(content);
        self
    }

    /// Insert before the character at `offset`, after earlier insertions there.
    pub fn append_left(&mut self, offset: usize, content: &str) -> Result<&mut Self> {
        self.check_offset(offset)?;
        self.insertions
            .entry(offset)
            .or_default()
            .push_str(content);
        Ok(self)
    }

    /// Insert before the character at `offset`, ahead of earlier insertions there.
    pub fn prepend_left(&mut self, offset: usize, content: &str) -> Result<&mut Self> {
        self.check_offset(offset)?;
        self.insertions
            .entry(offset)
            .or_default()
            .insert_str(0, content);
        Ok(self)
    }

    /// Replace `start..end` of the original string.
    ///
    /// Last writer wins: earlier overwrites intersecting the range are
    /// discarded, so their non-intersecting parts revert to original text.
    pub fn overwrite(&mut self, start: usize, end: usize, content: &str) -> Result<&mut Self> {
        self.check_range(start, end)?;

        let stale: Vec<usize> = self
            .overwrites
            .range(..end)
            .filter(|(_, existing)| existing.end > start)
            .map(|(&existing_start, _)| existing_start)
            .collect();
        for key in stale {
            self.overwrites.remove(&key);
        }

        self.overwrites.insert(
            start,
            Overwrite {
                end,
                content: content.to_string(),
            },
        );
        Ok(self)
    }

    pub fn remove(&mut self, start: usize, end: usize) -> Result<&mut Self> {
        self.overwrite(start, end, "")
    }

    pub fn has_changed(&self) -> bool {
        !self.intro.is_empty()
            || !self.outro.is_empty()
            || !self.overwrites.is_empty()
            || self.insertions.values().any(|text| !text.is_empty())
    }

    /// Source map from the edited string back to the original.
    ///
    /// Lines are zero based and columns count UTF-16 code units. Untouched
    /// text is mapped at every line start and token boundary, an overwrite
    /// maps to the start of the range it replaced, inserted text is unmapped.
    pub fn generate_map(&self, options: &MapOptions) -> Result<SourceMap> {
        let index = LineIndex::new(&self.original);
        let mut builder = SourceMapBuilder::default();
        let source_name = options.source.as_deref().unwrap_or_default();
        let content = if options.include_content {
            self.original.as_str()
        } else {
            ""
        };
        let source_id = builder.add_source_and_content(source_name, content);
        if let Some(file) = &options.file {
            builder.set_file(file);
        }

        let mut generated = Position::default();
        for piece in self.pieces() {
            match piece {
                Piece::Inserted(text) => generated.advance(text),
                Piece::Replaced { start, content } => {
                    if !content.is_empty() {
                        let (line, column) = index.position(start);
                        builder.add_token(
                            generated.line,
                            generated.column,
                            line,
                            column,
                            Some(source_id),
                            None,
                        );
                    }
                    generated.advance(content);
                }
                Piece::Original { start, end } => {
                    let (mut line, mut column) = index.position(start);
                    let mut previous: Option<char> = None;
                    for ch in self.original[start..end].chars() {
                        let boundary = match previous {
                            None | Some('\n') => true,
                            Some(prev) => {
                                !ch.is_whitespace()
                                    && (!is_word_char(ch) || !is_word_char(prev))
                            }
                        };
                        if boundary && ch != '\n' {
                            builder.add_token(
                                generated.line,
                                generated.column,
                                line,
                                column,
                                Some(source_id),
                                None,
                            );
                        }
                        if ch == '\n' {
                            line += 1;
                            column = 0;
                        } else {
                            column += ch.len_utf16() as u32;
                        }
                        generated.step(ch);
                        previous = Some(ch);
                    }
                }
            }
        }

        let mut map = SourceMap::from_oxc(&builder.into_sourcemap())?;
        if !options.include_content {
            map.sources_content = None;
        }
        map.file = options.file.clone();
        Ok(map)
    }

    fn pieces(&self) -> Vec<Piece<'_>> {
        let mut pieces = Vec::new();
        if !self.intro.is_empty() {
            pieces.push(Piece::Inserted(&self.intro));
        }
        let mut position = 0;
        for (&start, overwrite) in &self.overwrites {
            self.push_segment(&mut pieces, position, start);
            pieces.push(Piece::Replaced {
                start,
                content: &overwrite.content,
            });
            position = overwrite.end;
        }
        self.push_segment(&mut pieces, position, self.original.len());
        if !self.outro.is_empty() {
            pieces.push(Piece::Inserted(&self.outro));
        }
        pieces
    }

    /// Original text in `from..to` interleaved with insertions at offsets in
    /// `from..=to`.
    fn push_segment<'s>(&'s self, pieces: &mut Vec<Piece<'s>>, from: usize, to: usize) {
        let mut cursor = from;
        for (&offset, text) in self.insertions.range(from..=to) {
            if offset > cursor {
                pieces.push(Piece::Original {
                    start: cursor,
                    end: offset,
                });
                cursor = offset;
            }
            if !text.is_empty() {
                pieces.push(Piece::Inserted(text));
            }
        }
        if to > cursor {
            pieces.push(Piece::Original {
                start: cursor,
                end: to,
            });
        }
    }

    fn check_offset(&self, offset: usize) -> Result<()> {
        if offset > self.original.len() || !self.original.is_char_boundary(offset) {
            return Err(Error::InvalidRange {
                start: offset,
                end: offset,
                len: self.original.len(),
            });
        }
        Ok(())
    }

    fn check_range(&self, start: usize, end: usize) -> Result<()> {
        let len = self.original.len();
        if start >= end
            || end > len
            || !self.original.is_char_boundary(start)
            || !self.original.is_char_boundary(end)
        {
            return Err(Error::InvalidRange { start, end, len });
        }
        Ok(())
    }
}

impl fmt::Display for MagicString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for piece in self.pieces() {
            match piece {
                Piece::Inserted(text) => f.write_str(text)?,
                Piece::Original { start, end } => f.write_str(&self.original[start..end])?,
                Piece::Replaced { content, .. } => f.write_str(content)?,
            }
        }
        Ok(())
    }
}

fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '$'
}

#[derive(Debug, Default, Clone, Copy)]
struct Position {
    line: u32,
    column: u32,
}

impl Position {
    fn step(&mut self, ch: char) {
        if ch == '\n' {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += ch.len_utf16() as u32;
        }
    }

    fn advance(&mut self, text: &str) {
        for ch in text.chars() {
            self.step(ch);
        }
    }
}

struct LineIndex<'s> {
    text: &'s str,
    starts: Vec<usize>,
}

impl<'s> LineIndex<'s> {
    fn new(text: &'s str) -> Self {
        let starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { text, starts }
    }

    /// Zero-based line and UTF-16 column of a byte offset.
    fn position(&self, offset: usize) -> (u32, u32) {
        let line = self.starts.partition_point(|&start| start <= offset) - 1;
        let column = self.text[self.starts[line]..offset].encode_utf16().count();
        (line as u32, column as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(map: &SourceMap) -> Vec<(u32, u32, u32, u32)> {
        let oxc = map.to_oxc().unwrap();
        oxc.get_tokens()
            .map(|t| (t.get_dst_line(), t.get_dst_col(), t.get_src_line(), t.get_src_col()))
            .collect()
    }

    #[test]
    fn untouched_buffer_renders_original() {
        let buffer = MagicString::new("const a = 1;");
        assert!(!buffer.has_changed());
        assert_eq!(buffer.to_string(), "const a = 1;");
    }

    #[test]
    fn edits_use_original_offsets() {
        let mut buffer = MagicString::new("abc def ghi");
        buffer.overwrite(8, 11, "GHI").unwrap();
        buffer.overwrite(0, 3, "A").unwrap();
        buffer.append_left(4, "<").unwrap();
        buffer.prepend("> ").append(" <");
        assert_eq!(buffer.to_string(), "> A <def GHI <");
    }

    #[test]
    fn insertion_order_at_same_offset() {
        let mut buffer = MagicString::new("x");
        buffer.append_left(0, "b").unwrap();
        buffer.append_left(0, "c").unwrap();
        buffer.prepend_left(0, "a").unwrap();
        assert_eq!(buffer.to_string(), "abcx");
    }

    #[test]
    fn last_overwrite_wins_without_corrupting_neighbours() {
        let mut buffer = MagicString::new("0123456789");
        buffer.overwrite(2, 6, "ab").unwrap();
        buffer.overwrite(4, 8, "XY").unwrap();
        // 2..4 reverts to original text, 8.. is untouched
        assert_eq!(buffer.to_string(), "0123XY89");
    }

    #[test]
    fn insertions_inside_overwrite_are_dropped() {
        let mut buffer = MagicString::new("foo(bar)");
        buffer.append_left(5, "!").unwrap();
        buffer.append_left(4, "[").unwrap();
        buffer.append_left(7, "]").unwrap();
        buffer.overwrite(4, 7, "baz").unwrap();
        assert_eq!(buffer.to_string(), "foo([baz])");
    }

    #[test]
    fn remove_drops_text() {
        let mut buffer = MagicString::new("a /* x */ b");
        buffer.remove(2, 10).unwrap();
        assert_eq!(buffer.to_string(), "a b");
        assert!(buffer.has_changed());
    }

    #[test]
    fn rejects_invalid_ranges() {
        let mut buffer = MagicString::new("héllo");
        assert!(matches!(buffer.overwrite(3, 3, "x"), Err(Error::InvalidRange { .. })));
        assert!(matches!(buffer.overwrite(0, 99, "x"), Err(Error::InvalidRange { .. })));
        // inside the two-byte `é`
        assert!(matches!(buffer.overwrite(2, 4, "x"), Err(Error::InvalidRange { .. })));
        assert!(buffer.append_left(2, "x").is_err());
        assert!(buffer.append_left(6, "x").is_ok());
    }

    #[test]
    fn map_tracks_insertions_and_overwrites() {
        let mut buffer = MagicString::new("let a = 1;\nlet b = 2;");
        buffer.prepend("import x from 'x';\n");
        let two = "let a = 1;\nlet b = ".len();
        buffer.overwrite(two, two + 1, "x").unwrap();

        let map = buffer
            .generate_map(&MapOptions {
                source: Some("in.js".to_string()),
                file: Some("out.js".to_string()),
                include_content: true,
            })
            .unwrap();
        assert_eq!(map.sources, vec!["in.js".to_string()]);
        assert_eq!(map.file.as_deref(), Some("out.js"));
        assert_eq!(
            map.sources_content,
            Some(vec![Some("let a = 1;\nlet b = 2;".to_string())])
        );

        let tokens = tokens(&map);
        assert!(tokens.contains(&(1, 0, 0, 0)));
        assert!(tokens.contains(&(1, 4, 0, 4)));
        assert!(tokens.contains(&(2, 0, 1, 0)));
        assert!(tokens.contains(&(2, 8, 1, 8)));
        assert!(tokens.iter().all(|&(line, ..)| line != 0));
    }

    #[test]
    fn map_columns_count_utf16_units() {
        let mut buffer = MagicString::new("'😀'; go();");
        buffer.prepend("x;");
        let map = buffer.generate_map(&MapOptions::default()).unwrap();
        assert_eq!(map.sources_content, None);
        // the emoji is two UTF-16 units, so `go` starts at column 6
        assert!(tokens(&map).contains(&(0, 8, 0, 6)));
    }
}
