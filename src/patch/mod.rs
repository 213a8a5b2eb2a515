//! Applying parsed diff blocks to files in the workspace.

mod applier;
mod matcher;

pub use applier::PatchApplier;
pub use matcher::{count_occurrences, normalize_lines, plan_edit, PlannedEdit};

use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchAction {
    Created,
    /// `reindented` is set when the match only succeeded after recovering
    /// the file's indentation.
    Updated { reindented: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchFailure {
    #[error("current content not found in file")]
    NotFound,
    #[error("current content matches {matches} locations; it must be unique")]
    Ambiguous { matches: usize },
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("write failed: {0}")]
    Io(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockOutcome {
    pub file_path: String,
    pub result: Result<PatchAction, PatchFailure>,
}

impl BlockOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Per-block results of one `check` or `apply` call, in block order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchReport {
    pub outcomes: Vec<BlockOutcome>,
    pub dry_run: bool,
}

impl PatchReport {
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(BlockOutcome::is_success)
    }

    pub fn failures(&self) -> impl Iterator<Item = &BlockOutcome> {
        self.outcomes.iter().filter(|outcome| !outcome.is_success())
    }

    pub fn succeeded_count(&self) -> usize {
        self.outcomes.iter().filter(|outcome| outcome.is_success()).count()
    }

    pub fn summary(&self) -> String {
        let verb = if self.dry_run { "would apply" } else { "applied" };
        format!(
            "{verb} {}/{} block(s)",
            self.succeeded_count(),
            self.outcomes.len()
        )
    }
}

impl PatchReport {
    /// One human-readable line per block.
    pub fn outcome_line(&self, outcome: &BlockOutcome) -> String {
        match &outcome.result {
            Ok(PatchAction::Created) => {
                let verb = if self.dry_run { "would create" } else { "created" };
                format!("✓ {verb} {}", outcome.file_path)
            }
            Ok(PatchAction::Updated { reindented }) => {
                let verb = if self.dry_run { "would update" } else { "updated" };
                let note = if *reindented { " (indentation adjusted)" } else { "" };
                format!("✓ {verb} {}{note}", outcome.file_path)
            }
            Err(failure) => format!("✗ {}: {failure}", outcome.file_path),
        }
    }
}

impl fmt::Display for PatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for outcome in &self.outcomes {
            writeln!(f, "  {}", self.outcome_line(outcome))?;
        }
        write!(f, "{}", self.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_summary_and_display() {
        let report = PatchReport {
            outcomes: vec![
                BlockOutcome {
                    file_path: "a.rs".to_string(),
                    result: Ok(PatchAction::Updated { reindented: true }),
                },
                BlockOutcome {
                    file_path: "b.rs".to_string(),
                    result: Err(PatchFailure::Ambiguous { matches: 3 }),
                },
            ],
            dry_run: false,
        };
        assert!(!report.all_succeeded());
        assert_eq!(report.failures().count(), 1);
        assert_eq!(report.summary(), "applied 1/2 block(s)");

        let rendered = report.to_string();
        assert!(rendered.contains("✓ updated a.rs (indentation adjusted)"));
        assert!(rendered.contains("✗ b.rs: current content matches 3 locations"));
    }

    #[test]
    fn test_dry_run_wording() {
        let report = PatchReport {
            outcomes: vec![BlockOutcome {
                file_path: "new.txt".to_string(),
                result: Ok(PatchAction::Created),
            }],
            dry_run: true,
        };
        assert!(report.to_string().contains("would create new.txt"));
        assert_eq!(report.summary(), "would apply 1/1 block(s)");
    }
}
