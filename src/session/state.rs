use crate::api::ApiClient;
use crate::config::{ApplyMode, Config};
use crate::diff_block::DiffBlock;
use crate::patch::{PatchApplier, PatchReport};
use crate::types::ChatMessage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Live progress of a turn, sent to the frontend as it happens.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    Text(String),
    CodeStarted,
    CodeEnded,
    Block(DiffBlock),
    RawCode(String),
    Warning(String),
    Retrying { attempt: usize, reason: String },
    Report(PatchReport),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnOutcome {
    /// Assistant text of the final round.
    pub response: String,
    pub blocks: Vec<DiffBlock>,
    pub report: Option<PatchReport>,
    pub cancelled: bool,
    pub rounds: usize,
}

/// Holds the busy flag for as long as a turn runs.
#[derive(Debug)]
pub struct BusyGuard {
    flag: Arc<AtomicBool>,
}

impl BusyGuard {
    pub fn try_acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                flag: Arc::clone(flag),
            })
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct Session {
    pub(super) client: Arc<ApiClient>,
    pub(super) applier: PatchApplier,
    pub(super) history: Vec<ChatMessage>,
    pub(super) apply_mode: ApplyMode,
    pub(super) patch_attempts: usize,
    pub(super) streaming: bool,
    pub(super) busy: Arc<AtomicBool>,
}

impl Session {
    pub fn new(client: ApiClient, config: &Config) -> Self {
        Self::with_applier(
            client,
            PatchApplier::new(config.working_dir.clone()),
            config.apply_mode,
            config.patch_attempts,
        )
    }

    pub fn with_applier(
        client: ApiClient,
        applier: PatchApplier,
        apply_mode: ApplyMode,
        patch_attempts: usize,
    ) -> Self {
        Self {
            client: Arc::new(client),
            applier,
            history: Vec::new(),
            apply_mode,
            patch_attempts,
            streaming: true,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Use the non-streaming endpoint for subsequent turns.
    pub fn set_streaming(&mut self, streaming: bool) {
        self.streaming = streaming;
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn apply_mode(&self) -> ApplyMode {
        self.apply_mode
    }

    /// Shared with input readers so they can refuse new prompts mid-turn.
    pub fn busy_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.busy)
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn client(&self) -> Arc<ApiClient> {
        Arc::clone(&self.client)
    }
}
