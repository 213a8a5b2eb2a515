use super::matcher::plan_edit;
use super::{BlockOutcome, PatchAction, PatchFailure, PatchReport};
use crate::api::logging::emit_warning;
use crate::diff_block::DiffBlock;
use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Applies diff blocks to files under a working directory. Paths that would
/// leave the working directory are rejected.
#[derive(Debug, Clone)]
pub struct PatchApplier {
    working_dir: PathBuf,
    canonical_working_dir: PathBuf,
}

impl PatchApplier {
    pub fn new(working_dir: PathBuf) -> Self {
        let canonical_working_dir =
            fs::canonicalize(&working_dir).unwrap_or_else(|_| working_dir.clone());
        Self {
            working_dir,
            canonical_working_dir,
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Runs every block against the current files without writing. Later
    /// blocks see the planned result of earlier blocks on the same file.
    pub fn check(&self, blocks: &[DiffBlock]) -> PatchReport {
        self.run(blocks, false)
    }

    /// Applies blocks in order. A failing block is reported and skipped; the
    /// others are still applied.
    pub fn apply(&self, blocks: &[DiffBlock]) -> PatchReport {
        self.run(blocks, true)
    }

    fn run(&self, blocks: &[DiffBlock], write: bool) -> PatchReport {
        let mut planned: HashMap<PathBuf, String> = HashMap::new();
        let outcomes = blocks
            .iter()
            .map(|block| {
                let result = self.apply_one(block, write, &mut planned);
                if let (true, Err(failure)) = (write, &result) {
                    emit_warning("patch_failed", &format!("{}: {failure}", block.file_path));
                }
                BlockOutcome {
                    file_path: block.file_path.clone(),
                    result,
                }
            })
            .collect();

        PatchReport {
            outcomes,
            dry_run: !write,
        }
    }

    fn apply_one(
        &self,
        block: &DiffBlock,
        write: bool,
        planned: &mut HashMap<PathBuf, String>,
    ) -> Result<PatchAction, PatchFailure> {
        let resolved = self
            .resolve_path(&block.file_path)
            .map_err(|error| PatchFailure::InvalidPath(format!("{error:#}")))?;

        let existing = match planned.get(&resolved) {
            Some(content) => Some(content.clone()),
            None => fs::read_to_string(&resolved).ok(),
        };

        let edit = plan_edit(
            existing.as_deref(),
            &block.current_content,
            &block.new_content,
        )?;

        if write {
            write_file(&resolved, &edit.content)
                .map_err(|error| PatchFailure::Io(format!("{error:#}")))?;
        }
        planned.insert(resolved, edit.content);
        Ok(edit.action)
    }

    fn resolve_path(&self, path: &str) -> Result<PathBuf> {
        if path.trim().is_empty() {
            bail!("empty path");
        }
        if path.starts_with('/') || path.contains('\\') || Path::new(path).is_absolute() {
            bail!("absolute or platform-specific path not allowed: {path}");
        }

        let relative_path = Path::new(path);
        for component in relative_path.components() {
            if matches!(component, Component::ParentDir) {
                bail!("path traversal detected: {path}");
            }
        }

        let requested = self.working_dir.join(relative_path);
        let normalized = normalize_path(&requested);
        self.ensure_path_is_within_workspace(&normalized)?;

        Ok(normalized)
    }

    fn ensure_path_is_within_workspace(&self, path: &Path) -> Result<()> {
        let guard_path = nearest_existing_ancestor(path)
            .context("could not find an existing parent path")?;

        let canonical_guard = fs::canonicalize(guard_path)
            .with_context(|| format!("failed to canonicalize {}", guard_path.display()))?;
        if !canonical_guard.starts_with(&self.canonical_working_dir) {
            bail!(
                "path escapes working directory via symlink: {}",
                path.display()
            );
        }
        Ok(())
    }
}

fn nearest_existing_ancestor(path: &Path) -> Option<&Path> {
    let mut current = path;
    while !current.exists() {
        current = current.parent()?;
    }
    Some(current)
}

fn normalize_path(path: &Path) -> PathBuf {
    path.components()
        .filter(|component| !matches!(component, Component::CurDir))
        .collect()
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))
}
