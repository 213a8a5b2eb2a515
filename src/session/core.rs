use super::prompt::{incomplete_block_prompt, patch_retry_prompt, SYSTEM_PROMPT};
use super::state::{BusyGuard, Session, SessionUpdate, TurnOutcome};
use crate::api::logging::emit_warning;
use crate::api::ApiError;
use crate::config::ApplyMode;
use crate::diff_block::DiffBlock;
use crate::stream::{BlockScanner, ResponsePipeline, ScanEvent};
use crate::types::ChatMessage;
use anyhow::{anyhow, Result};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

type UpdateSender<'a> = Option<&'a mpsc::UnboundedSender<SessionUpdate>>;

#[derive(Debug, Default)]
struct Round {
    text: String,
    blocks: Vec<DiffBlock>,
    unterminated: bool,
    cancelled: bool,
}

impl Session {
    /// Runs one user turn to completion.
    ///
    /// The turn may take several model rounds: a response that ends inside a
    /// code block, or whose blocks fail the dry-run check, is answered with a
    /// corrective prompt while re-prompt attempts remain. Blocks that are
    /// complete, and still pass the check, carry over to the next round; only
    /// failed or truncated edits are asked for again. Nothing is written
    /// after cancellation. On error the turn is dropped from history.
    pub async fn send_message(
        &mut self,
        prompt: String,
        update_tx: UpdateSender<'_>,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome> {
        let _busy = BusyGuard::try_acquire(&self.busy)
            .ok_or_else(|| anyhow!("a response is already in progress"))?;

        let mut turn_messages = vec![ChatMessage::user(prompt)];
        let mut pending: Vec<DiffBlock> = Vec::new();
        let mut reprompts = 0usize;
        let mut rounds = 0usize;

        loop {
            rounds += 1;
            let round = self.run_round(&turn_messages, update_tx, cancel).await?;

            if round.cancelled {
                // A turn cancelled before any text arrived leaves no trace.
                if !round.text.is_empty() {
                    turn_messages.push(ChatMessage::assistant(round.text.clone()));
                    self.history.extend(turn_messages);
                }
                return Ok(TurnOutcome {
                    response: round.text,
                    blocks: round.blocks,
                    report: None,
                    cancelled: true,
                    rounds,
                });
            }
            turn_messages.push(ChatMessage::assistant(round.text.clone()));
            merge_blocks(&mut pending, round.blocks);

            if round.unterminated && reprompts < self.patch_attempts {
                reprompts += 1;
                emit_update(
                    update_tx,
                    SessionUpdate::Retrying {
                        attempt: reprompts,
                        reason: "response ended inside a code block".to_string(),
                    },
                );
                turn_messages.push(ChatMessage::user(incomplete_block_prompt()));
                continue;
            }

            if pending.is_empty() || self.apply_mode == ApplyMode::Off {
                self.history.extend(turn_messages);
                return Ok(TurnOutcome {
                    response: round.text,
                    blocks: pending,
                    report: None,
                    cancelled: false,
                    rounds,
                });
            }

            let check = self.applier.check(&pending);
            if !check.all_succeeded() && reprompts < self.patch_attempts {
                reprompts += 1;
                emit_update(
                    update_tx,
                    SessionUpdate::Retrying {
                        attempt: reprompts,
                        reason: format!("{} block(s) would not apply", check.failures().count()),
                    },
                );
                turn_messages.push(ChatMessage::user(patch_retry_prompt(&check)));
                pending = pending
                    .into_iter()
                    .zip(&check.outcomes)
                    .filter(|(_, outcome)| outcome.is_success())
                    .map(|(block, _)| block)
                    .collect();
                continue;
            }

            let report = match self.apply_mode {
                ApplyMode::Apply => self.applier.apply(&pending),
                ApplyMode::DryRun | ApplyMode::Off => check,
            };
            emit_update(update_tx, SessionUpdate::Report(report.clone()));

            self.history.extend(turn_messages);
            return Ok(TurnOutcome {
                response: round.text,
                blocks: pending,
                report: Some(report),
                cancelled: false,
                rounds,
            });
        }
    }

    async fn run_round(
        &self,
        turn_messages: &[ChatMessage],
        update_tx: UpdateSender<'_>,
        cancel: &CancellationToken,
    ) -> Result<Round> {
        let mut messages = self.history.clone();
        messages.extend_from_slice(turn_messages);
        let request = self.client.request(SYSTEM_PROMPT, &messages);
        let mut round = Round::default();

        if !self.streaming {
            let text = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    round.cancelled = true;
                    return Ok(round);
                }
                text = self.client.complete(&request) => text?,
            };
            let mut scanner = BlockScanner::new();
            let mut events = scanner.push(&text);
            events.extend(scanner.finish());
            handle_scan_events(events, &mut round, update_tx);
            round.text = text;
            return Ok(round);
        }

        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                round.cancelled = true;
                return Ok(round);
            }
            stream = self.client.create_stream(&request) => stream?,
        };

        let mut pipeline = ResponsePipeline::new(self.client.provider());
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    round.cancelled = true;
                    break;
                }
                next = stream.next() => match next {
                    Some(chunk) => {
                        let events = pipeline.push_bytes(&chunk?);
                        handle_scan_events(events, &mut round, update_tx);
                        if pipeline.failure().is_some() {
                            break;
                        }
                    }
                    None => {
                        let events = pipeline.finish();
                        handle_scan_events(events, &mut round, update_tx);
                        break;
                    }
                },
            }
        }
        drop(stream);

        if let Some(message) = pipeline.failure() {
            return Err(ApiError::StreamFailed {
                url: self.client.provider().endpoint(true),
                message: message.to_string(),
            }
            .into());
        }

        if pipeline.dropped_fragments() > 0 {
            emit_update(
                update_tx,
                SessionUpdate::Warning(format!(
                    "skipped {} unreadable stream fragment(s)",
                    pipeline.dropped_fragments()
                )),
            );
        }
        round.text = pipeline.into_normalized_text();
        Ok(round)
    }
}

fn handle_scan_events(events: Vec<ScanEvent>, round: &mut Round, update_tx: UpdateSender<'_>) {
    for event in events {
        match event {
            ScanEvent::Plain(text) => emit_update(update_tx, SessionUpdate::Text(text)),
            ScanEvent::CodeStarted => emit_update(update_tx, SessionUpdate::CodeStarted),
            ScanEvent::CodeEnded => emit_update(update_tx, SessionUpdate::CodeEnded),
            ScanEvent::Diff(block) => {
                emit_update(update_tx, SessionUpdate::Block(block.clone()));
                round.blocks.push(block);
            }
            ScanEvent::RawCode(code) => emit_update(update_tx, SessionUpdate::RawCode(code)),
            ScanEvent::Malformed { raw, reason } => {
                emit_warning("malformed_diff_block", &reason);
                emit_update(update_tx, SessionUpdate::RawCode(raw));
                emit_update(
                    update_tx,
                    SessionUpdate::Warning(format!("skipped malformed diff block: {reason}")),
                );
            }
            ScanEvent::Unterminated(raw) => {
                round.unterminated = true;
                emit_update(update_tx, SessionUpdate::RawCode(raw));
                emit_update(
                    update_tx,
                    SessionUpdate::Warning("response ended inside a code block".to_string()),
                );
            }
        }
    }
}

/// Adds a round's blocks to the turn, skipping exact repeats of blocks
/// already carried over.
fn merge_blocks(pending: &mut Vec<DiffBlock>, blocks: Vec<DiffBlock>) {
    for block in blocks {
        if !pending.contains(&block) {
            pending.push(block);
        }
    }
}

fn emit_update(update_tx: UpdateSender<'_>, update: SessionUpdate) {
    if let Some(tx) = update_tx {
        let _ = tx.send(update);
    }
}
