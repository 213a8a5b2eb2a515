use crate::diff_block::{CURRENT_MARKER, FENCE, NEW_MARKER, SEPARATOR_MARKER};
use crate::patch::PatchReport;
use std::fmt::Write;

pub const SYSTEM_PROMPT: &str = "You are a coding assistant that edits files in the user's project.

When you change a file, emit one fenced block per edit in exactly this shape:

```<language>
<<<<<<< CURRENT <relative/file/path>
<the exact lines currently in the file>
=======
<the replacement lines>
>>>>>>> NEW
```

Rules:
- Copy the CURRENT lines verbatim from the file, including indentation.
- Keep each CURRENT section small but unique within its file.
- For a new file, write a single line `(new file)` in the CURRENT section.
- Paths are relative to the project root.
- Use ordinary fenced code blocks for anything that is not an edit.";

pub fn incomplete_block_prompt() -> String {
    format!(
        "Your last response ended inside a code block. Complete edits before it are kept. \
         Resend the unfinished edit in full, including the closing `{NEW_MARKER}` line \
         and the closing {FENCE} fence."
    )
}

/// Lists the blocks that would not apply, so the model can resend them.
pub fn patch_retry_prompt(report: &PatchReport) -> String {
    let mut prompt = String::from("Some edits could not be applied:\n");
    for outcome in report.failures() {
        if let Err(failure) = &outcome.result {
            let _ = writeln!(prompt, "- {}: {failure}", outcome.file_path);
        }
    }
    let _ = write!(
        prompt,
        "\nEdits not listed here are kept. Resend corrected blocks for these files only. \
         The `{CURRENT_MARKER}` section must match the file exactly once; add surrounding \
         lines to make it unique. Keep the `{SEPARATOR_MARKER}` separator on its own line."
    );
    prompt
}
