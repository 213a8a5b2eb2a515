//! Terminal output for a running session.

use crate::api::ApiError;
use crate::diff_block::DiffBlock;
use crate::patch::PatchReport;
use crate::session::SessionUpdate;
use crossterm::style::{Color, Stylize};
use std::io::{self, Write};

pub struct Renderer<W: Write> {
    out: W,
    color: bool,
    at_line_start: bool,
}

impl<W: Write> Renderer<W> {
    pub fn new(out: W, color: bool) -> Self {
        Self {
            out,
            color,
            at_line_start: true,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn render(&mut self, update: &SessionUpdate) -> io::Result<()> {
        match update {
            SessionUpdate::Text(text) => self.write_plain(text)?,
            SessionUpdate::CodeStarted => self.status_line("⋯ writing code", Color::DarkGrey)?,
            SessionUpdate::CodeEnded => self.status_line("✓ code block complete", Color::DarkGrey)?,
            SessionUpdate::Block(block) => self.render_block(block)?,
            SessionUpdate::RawCode(code) => {
                self.write_plain(code)?;
                self.end_line()?;
            }
            SessionUpdate::Warning(message) => {
                self.status_line(&format!("warning: {message}"), Color::Yellow)?
            }
            SessionUpdate::Retrying { attempt, reason } => self.status_line(
                &format!("↻ asking for a corrected response (attempt {attempt}): {reason}"),
                Color::Yellow,
            )?,
            SessionUpdate::Report(report) => self.render_report(report)?,
        }
        self.out.flush()
    }

    pub fn render_block(&mut self, block: &DiffBlock) -> io::Result<()> {
        self.end_line()?;
        let header = if block.language.is_empty() {
            format!("── {} ──", block.file_path)
        } else {
            format!("── {} ({}) ──", block.file_path, block.language)
        };
        self.paint_line(&header, Color::Cyan)?;
        for line in block.current_content.lines() {
            self.paint_line(&format!("- {line}"), Color::Red)?;
        }
        for line in block.new_content.lines() {
            self.paint_line(&format!("+ {line}"), Color::Green)?;
        }
        Ok(())
    }

    pub fn render_report(&mut self, report: &PatchReport) -> io::Result<()> {
        self.end_line()?;
        for outcome in &report.outcomes {
            let color = if outcome.is_success() {
                Color::Green
            } else {
                Color::Red
            };
            self.paint_line(&format!("  {}", report.outcome_line(outcome)), color)?;
        }
        self.paint_line(&report.summary(), Color::White)?;
        self.out.flush()
    }

    pub fn render_error(&mut self, error: &anyhow::Error) -> io::Result<()> {
        self.end_line()?;
        let message = match error.downcast_ref::<ApiError>().and_then(ApiError::status) {
            Some(status) => format!("error (HTTP {}): {error:#}", status.as_u16()),
            None => format!("error: {error:#}"),
        };
        self.paint_line(&message, Color::Red)?;
        self.out.flush()
    }

    pub fn notice(&mut self, message: &str) -> io::Result<()> {
        self.status_line(message, Color::DarkGrey)?;
        self.out.flush()
    }

    /// Terminates a partially written line.
    pub fn end_line(&mut self) -> io::Result<()> {
        if !self.at_line_start {
            self.write_plain("\n")?;
        }
        Ok(())
    }

    fn status_line(&mut self, message: &str, color: Color) -> io::Result<()> {
        self.end_line()?;
        self.paint_line(message, color)
    }

    fn write_plain(&mut self, text: &str) -> io::Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        self.out.write_all(text.as_bytes())?;
        self.at_line_start = text.ends_with('\n');
        Ok(())
    }

    fn paint_line(&mut self, text: &str, color: Color) -> io::Result<()> {
        if self.color {
            writeln!(self.out, "{}", text.with(color))?;
        } else {
            writeln!(self.out, "{text}")?;
        }
        self.at_line_start = true;
        Ok(())
    }
}
