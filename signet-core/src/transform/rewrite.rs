//! Byte-offset edits over original source text.
//!
//! The transform never re-prints the AST: it computes byte positions from
//! `proc-macro2` span locations and splices strings into the original
//! text. Everything the transform does not touch stays byte-identical,
//! including comments and formatting.

use proc_macro2::LineColumn;

/// A single pending edit. Edits are applied back-to-front so earlier
/// offsets stay valid.
#[derive(Debug)]
pub(crate) enum Edit {
    /// Insert `text` at `offset`.
    Insert { offset: usize, text: String },
    /// Delete the byte range `start..end` (a whole line, newline included).
    DeleteLine { start: usize, end: usize },
}

impl Edit {
    fn offset(&self) -> usize {
        match self {
            Edit::Insert { offset, .. } => *offset,
            Edit::DeleteLine { start, .. } => *start,
        }
    }
}

/// Apply non-overlapping edits to `source`.
pub(crate) fn apply(source: &str, mut edits: Vec<Edit>) -> String {
    edits.sort_by_key(|e| std::cmp::Reverse(e.offset()));
    let mut out = source.to_string();
    for edit in edits {
        match edit {
            Edit::Insert { offset, text } => out.insert_str(offset, &text),
            Edit::DeleteLine { start, end } => out.replace_range(start..end, ""),
        }
    }
    out
}

/// Byte offset of the start of each line, 1-indexed via `starts[line - 1]`.
pub(crate) fn line_starts(source: &str) -> Vec<usize> {
    let mut starts = vec![0];
    for (i, b) in source.bytes().enumerate() {
        if b == b'\n' {
            starts.push(i + 1);
        }
    }
    starts
}

/// Convert a span position to a byte offset. Span columns count characters,
/// not bytes, so the line is walked char by char.
pub(crate) fn byte_offset(source: &str, starts: &[usize], pos: LineColumn) -> usize {
    let Some(&line_start) = starts.get(pos.line.saturating_sub(1)) else {
        return source.len();
    };
    let rest = &source[line_start..];
    match rest.char_indices().nth(pos.column) {
        Some((i, _)) => line_start + i,
        None => source.len(),
    }
}

/// Byte range of one whole line, trailing newline included.
pub(crate) fn line_span(source: &str, starts: &[usize], line: usize) -> (usize, usize) {
    let start = starts.get(line.saturating_sub(1)).copied().unwrap_or(source.len());
    let end = starts.get(line).copied().unwrap_or(source.len());
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untouched_source_is_byte_identical() {
        let source = "fn main() {\n    // comment\n}\n";
        assert_eq!(apply(source, Vec::new()), source);
    }

    #[test]
    fn inserts_apply_back_to_front() {
        let source = "abcdef";
        let edits = vec![
            Edit::Insert {
                offset: 1,
                text: "X".into(),
            },
            Edit::Insert {
                offset: 4,
                text: "Y".into(),
            },
        ];
        assert_eq!(apply(source, edits), "aXbcdYef");
    }

    #[test]
    fn delete_line_removes_the_newline() {
        let source = "one\ntwo\nthree\n";
        let starts = line_starts(source);
        let (start, end) = line_span(source, &starts, 2);
        let edits = vec![Edit::DeleteLine { start, end }];
        assert_eq!(apply(source, edits), "one\nthree\n");
    }

    #[test]
    fn byte_offset_counts_multibyte_chars() {
        let source = "// héllo\nfn f() {}\n";
        let starts = line_starts(source);
        let pos = LineColumn { line: 2, column: 3 };
        let offset = byte_offset(source, &starts, pos);
        assert_eq!(&source[offset..offset + 1], "f");
    }
}
