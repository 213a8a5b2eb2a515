use serde::{Deserialize, Serialize};
use std::fmt;

pub const FENCE: &str = "```";
pub const CURRENT_MARKER: &str = "<<<<<<< CURRENT";
pub const SEPARATOR_MARKER: &str = "=======";
pub const NEW_MARKER: &str = ">>>>>>> NEW";

/// One proposed file edit, parsed from a fenced CURRENT/NEW block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffBlock {
    pub language: String,
    pub file_path: String,
    pub current_content: String,
    pub new_content: String,
}

impl DiffBlock {
    /// Both halves carry content. Blocks failing this are never applied.
    pub fn is_complete(&self) -> bool {
        !self.current_content.trim().is_empty() && !self.new_content.trim().is_empty()
    }

    /// Canonical wire form, the same shape the model is asked to emit.
    pub fn to_fenced(&self) -> String {
        format!(
            "{FENCE}{}\n{CURRENT_MARKER} {}\n{}\n{SEPARATOR_MARKER}\n{}\n{NEW_MARKER}\n{FENCE}",
            self.language, self.file_path, self.current_content, self.new_content
        )
    }
}

impl fmt::Display for DiffBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_fenced())
    }
}

/// Parses the first fenced CURRENT/NEW block in `text`.
///
/// Delimiters are located with plain substring search in strict order:
/// fence open, `<<<<<<< CURRENT <path>`, `=======`, `>>>>>>> NEW`, fence
/// close. A missing delimiter means "no block"; malformed model output is
/// expected and never an error.
pub fn parse_diff_block(text: &str) -> Option<DiffBlock> {
    parse_block_at(text, 0).map(|(block, _)| block)
}

/// Parses every CURRENT/NEW block in a complete response, in order.
pub fn parse_diff_blocks(text: &str) -> Vec<DiffBlock> {
    let mut blocks = Vec::new();
    let mut from = 0usize;

    while let Some(open) = find_from(text, from, FENCE) {
        match parse_block_at(text, open) {
            Some((block, end)) => {
                blocks.push(block);
                from = end;
            }
            None => from = open + FENCE.len(),
        }
    }

    blocks
}

fn parse_block_at(text: &str, from: usize) -> Option<(DiffBlock, usize)> {
    let open = find_from(text, from, FENCE)?;
    let language_start = open + FENCE.len();
    let language_end = find_from(text, language_start, "\n")?;
    let language = text[language_start..language_end].trim().to_string();

    let header = find_from(text, language_end, CURRENT_MARKER)?;
    // Only whitespace may sit between the fence line and the header.
    if !text[language_end..header].trim().is_empty() {
        return None;
    }
    let path_start = header + CURRENT_MARKER.len();
    let header_newline = find_from(text, path_start, "\n")?;
    let file_path = text[path_start..header_newline].trim().to_string();
    if file_path.is_empty() {
        return None;
    }

    let separator_newline = find_marker_line(text, header_newline, SEPARATOR_MARKER, true)?;
    let current_content = slice_between_lines(text, header_newline, separator_newline);

    let separator_end = find_from(text, separator_newline + 1, "\n")?;
    let new_newline = find_marker_line(text, separator_end, NEW_MARKER, false)?;
    let new_content = slice_between_lines(text, separator_end, new_newline);

    let close = find_from(text, new_newline + 1 + NEW_MARKER.len(), FENCE)?;

    Some((
        DiffBlock {
            language,
            file_path,
            current_content,
            new_content,
        },
        close + FENCE.len(),
    ))
}

fn find_from(text: &str, from: usize, needle: &str) -> Option<usize> {
    text.get(from..)?.find(needle).map(|index| from + index)
}

/// Finds the newline that starts a line beginning with `marker`. With
/// `exact`, the rest of that line must be blank.
fn find_marker_line(text: &str, from: usize, marker: &str, exact: bool) -> Option<usize> {
    let mut search = from;
    loop {
        let newline = find_from(text, search, "\n")?;
        let line_start = newline + 1;
        let line_end = find_from(text, line_start, "\n").unwrap_or(text.len());
        let line = &text[line_start..line_end];
        if let Some(rest) = line.strip_prefix(marker) {
            if !exact || rest.trim().is_empty() {
                return Some(newline);
            }
        }
        search = line_start;
    }
}

/// Text strictly between the newline at `after_newline` and the newline at
/// `before_newline`.
fn slice_between_lines(text: &str, after_newline: usize, before_newline: usize) -> String {
    if before_newline <= after_newline {
        return String::new();
    }
    let slice = &text[after_newline + 1..before_newline];
    slice.strip_suffix('\r').unwrap_or(slice).to_string()
}
