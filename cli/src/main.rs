mod script;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "chatsync", version, about = "Drive the chat reconciliation core from a script")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Replay a JSON script of server replies and subscription events, then
    /// print the resulting state.
    Replay {
        script: PathBuf,

        /// Directory holding `chatsync_config.json`. Defaults to a scratch
        /// directory under the system temp dir.
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Print only the message ids, one per line.
        #[arg(long)]
        ids: bool,
    },
}

fn main() -> ExitCode {
    chatsync_core::init_logging();
    let cli = Cli::parse();
    let res = match cli.cmd {
        Cmd::Replay {
            script,
            data_dir,
            ids,
        } => replay(&script, data_dir, ids),
    };
    match res {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn replay(path: &PathBuf, data_dir: Option<PathBuf>, ids: bool) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read script {}", path.display()))?;
    let script: script::Script =
        serde_json::from_str(&raw).with_context(|| format!("parse script {}", path.display()))?;

    let data_dir = match data_dir {
        Some(dir) => dir,
        None => std::env::temp_dir().join(format!("chatsync-replay-{}", std::process::id())),
    };
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("create data dir {}", data_dir.display()))?;

    let state = script::run(script, &data_dir)?;
    if ids {
        for id in state.message_ids() {
            println!("{id}");
        }
    } else {
        println!("{}", serde_json::to_string_pretty(&state)?);
    }
    Ok(())
}
