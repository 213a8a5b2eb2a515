use anyhow::{bail, Context, Result};
use diffcast::api::ApiClient;
use diffcast::config::{ApplyMode, Config};
use diffcast::diff_block::parse_diff_blocks;
use diffcast::patch::PatchApplier;
use diffcast::render::Renderer;
use diffcast::session::Session;
use std::io::{self, IsTerminal, Stdout, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const USAGE: &str = "usage:
  diffcast [--dry-run | --no-apply] [--no-stream] [prompt...]
  diffcast apply <response-file> [--dry-run]

Without a prompt, diffcast reads prompts from stdin, one per line.
Ctrl-C cancels the response in progress.";

#[derive(Debug, PartialEq)]
enum Command {
    Chat {
        prompt: Option<String>,
        apply_mode: Option<ApplyMode>,
        stream: bool,
    },
    Apply {
        response_file: PathBuf,
        dry_run: bool,
    },
    Help,
}

fn parse_args(args: Vec<String>) -> Result<Command> {
    if args.first().map(String::as_str) == Some("apply") {
        let mut response_file = None;
        let mut dry_run = false;
        for arg in &args[1..] {
            match arg.as_str() {
                "--dry-run" => dry_run = true,
                flag if flag.starts_with("--") => bail!("unknown option '{flag}'\n\n{USAGE}"),
                path if response_file.is_none() => response_file = Some(PathBuf::from(path)),
                extra => bail!("unexpected argument '{extra}'\n\n{USAGE}"),
            }
        }
        let response_file =
            response_file.with_context(|| format!("apply needs a response file\n\n{USAGE}"))?;
        return Ok(Command::Apply {
            response_file,
            dry_run,
        });
    }

    let mut apply_mode = None;
    let mut stream = true;
    let mut words = Vec::new();
    for arg in args {
        match arg.as_str() {
            "-h" | "--help" => return Ok(Command::Help),
            "--dry-run" => apply_mode = Some(ApplyMode::DryRun),
            "--no-apply" => apply_mode = Some(ApplyMode::Off),
            "--no-stream" => stream = false,
            flag if flag.starts_with("--") => bail!("unknown option '{flag}'\n\n{USAGE}"),
            _ => words.push(arg),
        }
    }

    let prompt = (!words.is_empty()).then(|| words.join(" "));
    Ok(Command::Chat {
        prompt,
        apply_mode,
        stream,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    match parse_args(std::env::args().skip(1).collect())? {
        Command::Help => {
            println!("{USAGE}");
            Ok(())
        }
        Command::Apply {
            response_file,
            dry_run,
        } => run_apply(&response_file, dry_run),
        Command::Chat {
            prompt,
            apply_mode,
            stream,
        } => run_chat(prompt, apply_mode, stream).await,
    }
}

fn run_apply(response_file: &Path, dry_run: bool) -> Result<()> {
    let config = Config::load()?;
    let response = std::fs::read_to_string(response_file)
        .with_context(|| format!("failed to read {}", response_file.display()))?;
    let mut renderer = Renderer::new(io::stdout(), io::stdout().is_terminal());

    let (blocks, incomplete): (Vec<_>, Vec<_>) = parse_diff_blocks(&response)
        .into_iter()
        .partition(|block| block.is_complete());
    for block in &incomplete {
        renderer.notice(&format!(
            "skipping {}: CURRENT or NEW section is empty",
            block.file_path
        ))?;
    }
    if blocks.is_empty() {
        bail!("no usable diff blocks in {}", response_file.display());
    }

    let applier = PatchApplier::new(config.working_dir);
    let report = if dry_run {
        applier.check(&blocks)
    } else {
        applier.apply(&blocks)
    };
    renderer.render_report(&report)?;

    if !report.all_succeeded() {
        bail!("{} block(s) failed", report.failures().count());
    }
    Ok(())
}

async fn run_chat(prompt: Option<String>, apply_mode: Option<ApplyMode>, stream: bool) -> Result<()> {
    let mut config = Config::load()?;
    if let Some(apply_mode) = apply_mode {
        config.apply_mode = apply_mode;
    }
    config.validate()?;

    let client = ApiClient::new(&config)?;
    let mut session = Session::new(client, &config);
    session.set_streaming(stream);
    let mut renderer = Renderer::new(io::stdout(), io::stdout().is_terminal());

    if let Some(prompt) = prompt {
        return run_turn(&mut session, prompt, &mut renderer).await;
    }

    let busy = session.busy_flag();
    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if busy.load(Ordering::Acquire) {
                eprintln!("busy: wait for the current response to finish");
                continue;
            }
            if line_tx.send(line).is_err() {
                break;
            }
        }
    });

    loop {
        print!("> ");
        io::stdout().flush()?;
        let line = tokio::select! {
            line = line_rx.recv() => match line {
                Some(line) => line,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        };

        let prompt = line.trim();
        if prompt.is_empty() {
            continue;
        }
        if matches!(prompt, "exit" | "quit") {
            break;
        }
        if let Err(error) = run_turn(&mut session, prompt.to_string(), &mut renderer).await {
            renderer.render_error(&error)?;
        }
    }

    renderer.end_line()?;
    Ok(())
}

async fn run_turn(
    session: &mut Session,
    prompt: String,
    renderer: &mut Renderer<Stdout>,
) -> Result<()> {
    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let (update_tx, mut update_rx) = mpsc::unbounded_channel();
    let result = {
        let turn = session.send_message(prompt, Some(&update_tx), &cancel);
        tokio::pin!(turn);
        loop {
            tokio::select! {
                biased;
                Some(update) = update_rx.recv() => renderer.render(&update)?,
                result = &mut turn => break result,
            }
        }
    };
    interrupt.abort();

    drop(update_tx);
    while let Some(update) = update_rx.recv().await {
        renderer.render(&update)?;
    }

    let outcome = result?;
    if outcome.cancelled {
        renderer.notice("cancelled; no changes were applied")?;
    } else if outcome.blocks.is_empty() {
        renderer.end_line()?;
    } else if outcome.report.is_none() {
        renderer.notice("changes not applied (--no-apply)")?;
    }
    Ok(())
}
