//! Locating `current_content` inside a file. Pure functions, no I/O.

use super::{PatchAction, PatchFailure};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedEdit {
    pub action: PatchAction,
    pub content: String,
}

/// Decides what applying one block to `existing` produces.
///
/// A missing or empty file is created from `new`. Otherwise `current` must
/// occur exactly once, first verbatim, then after trimming every line; the
/// trimmed match recovers the indentation of its first line and retries
/// verbatim with both halves re-indented.
pub fn plan_edit(existing: Option<&str>, current: &str, new: &str) -> Result<PlannedEdit, PatchFailure> {
    let content = match existing {
        Some(content) if !content.is_empty() => content,
        _ => {
            return Ok(PlannedEdit {
                action: PatchAction::Created,
                content: new.to_string(),
            })
        }
    };

    if current.trim().is_empty() {
        return Err(PatchFailure::NotFound);
    }

    match count_occurrences(content, current) {
        1 => {
            return Ok(PlannedEdit {
                action: PatchAction::Updated { reindented: false },
                content: replace_once(content, current, new),
            })
        }
        0 => {}
        matches => return Err(PatchFailure::Ambiguous { matches }),
    }

    let normalized_content = normalize_lines(content);
    let normalized_current = normalize_lines(current);
    let offset = match count_occurrences(&normalized_content, &normalized_current) {
        0 => return Err(PatchFailure::NotFound),
        1 => normalized_content
            .find(&normalized_current)
            .ok_or(PatchFailure::NotFound)?,
        matches => return Err(PatchFailure::Ambiguous { matches }),
    };

    let line_index = normalized_content[..offset].matches('\n').count();
    let indent = content
        .lines()
        .nth(line_index)
        .map(leading_whitespace)
        .unwrap_or("");
    let line_ending = if content.contains("\r\n") { "\r\n" } else { "\n" };
    let current_reindented = reindent(current, indent, line_ending);
    let new_reindented = reindent(new, indent, line_ending);

    match count_occurrences(content, &current_reindented) {
        1 => Ok(PlannedEdit {
            action: PatchAction::Updated { reindented: true },
            content: replace_once(content, &current_reindented, &new_reindented),
        }),
        0 => Err(PatchFailure::NotFound),
        matches => Err(PatchFailure::Ambiguous { matches }),
    }
}

/// Counts matches, overlapping ones included.
pub fn count_occurrences(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    let mut count = 0;
    let mut from = 0;
    while let Some(index) = haystack[from..].find(needle) {
        count += 1;
        let start = from + index;
        from = start + needle.chars().next().map_or(1, char::len_utf8);
    }
    count
}

fn replace_once(content: &str, needle: &str, replacement: &str) -> String {
    match content.find(needle) {
        Some(index) => {
            let mut out = String::with_capacity(content.len() + replacement.len());
            out.push_str(&content[..index]);
            out.push_str(replacement);
            out.push_str(&content[index + needle.len()..]);
            out
        }
        None => content.to_string(),
    }
}

pub fn normalize_lines(text: &str) -> String {
    text.lines().map(str::trim).collect::<Vec<_>>().join("\n")
}

fn leading_whitespace(line: &str) -> &str {
    let trimmed = line.trim_start();
    &line[..line.len() - trimmed.len()]
}

/// Strips the common indentation of `text` and prefixes `indent` to every
/// non-blank line. Blank lines come out empty. Lines are rejoined with
/// `line_ending` so the result matches the file being edited.
fn reindent(text: &str, indent: &str, line_ending: &str) -> String {
    let lines: Vec<&str> = text
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .collect();
    let common = lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.chars().take_while(|c| c.is_whitespace()).count())
        .min()
        .unwrap_or(0);

    lines
        .iter()
        .map(|line| {
            if line.trim().is_empty() {
                String::new()
            } else {
                let body = line
                    .char_indices()
                    .nth(common)
                    .map_or("", |(index, _)| &line[index..]);
                format!("{indent}{body}")
            }
        })
        .collect::<Vec<_>>()
        .join(line_ending)
}
