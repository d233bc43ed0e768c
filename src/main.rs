//! Pilot 命令行入口
//!
//! - `pilot chat [MESSAGE]`：单条消息或交互式对话（不带 MESSAGE 时进入 REPL）
//! - `pilot ingest <PATH>`：把 .txt / .md 文档导入文档目录，供 rag_search 检索

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use pilot::agent::{ingest_documents, Agent};
use pilot::config::{load_config, AppConfig};
use pilot::memory::{ConversationHistory, HistoryTurn};
use pilot::{TurnInput, TurnOutput};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pilot", version, about = "Conversational task-orchestration agent")]
struct Cli {
    /// 额外的配置文件（覆盖 config/default.toml）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ask a single question, or start an interactive session when MESSAGE is omitted
    Chat {
        message: Option<String>,
        /// Attach a document and answer from it
        #[arg(long)]
        file: Option<PathBuf>,
        /// Print the phase log after each answer
        #[arg(long)]
        verbose: bool,
    },
    /// Copy documents into the library used by rag_search
    Ingest { path: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志：默认 info，可通过 RUST_LOG 覆盖；写到 stderr，不干扰回答输出
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let cfg = match load_config(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load config, using defaults");
            AppConfig::default()
        }
    };

    match cli.command {
        Command::Ingest { path } => ingest(&cfg, &path),
        Command::Chat { message, file, verbose } => {
            let agent = Agent::from_config(&cfg).context("Failed to create agent")?;
            let attached = match file {
                Some(path) => Some(agent.attach_file(&path)?),
                None => None,
            };
            match message {
                Some(msg) => {
                    let mut input = TurnInput::new(msg);
                    if let Some(name) = attached {
                        input = input.with_file(name);
                    }
                    let out = agent.run_turn(input).await;
                    print_output(&out, verbose);
                    Ok(())
                }
                None => repl(&agent, &cfg, attached, verbose).await,
            }
        }
    }
}

fn ingest(cfg: &AppConfig, path: &Path) -> anyhow::Result<()> {
    let report = ingest_documents(cfg, path)?;
    for (file, chunks) in &report {
        println!("{} ({} chunks)", file.display(), chunks);
    }
    println!("Ingested {} document(s) into {}", report.len(), cfg.docs_dir().display());
    Ok(())
}

async fn repl(
    agent: &Agent,
    cfg: &AppConfig,
    attached: Option<String>,
    verbose: bool,
) -> anyhow::Result<()> {
    let mut history = ConversationHistory::new(cfg.agent.history_turns.max(1));
    let stdin = std::io::stdin();
    println!("Pilot ready. Type /exit to quit, /clear to reset the conversation.");

    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        match line {
            "" => continue,
            "/exit" | "/quit" => break,
            "/clear" => {
                history.clear();
                println!("Conversation cleared.");
                continue;
            }
            _ => {}
        }

        let mut input = TurnInput::new(line).with_history(history.to_vec());
        if let Some(name) = &attached {
            input = input.with_file(name.clone());
        }

        let handle = agent.begin_turn();
        let id = handle.id;
        let turn = agent.run_registered(handle, input);
        tokio::pin!(turn);
        let out = tokio::select! {
            out = &mut turn => out,
            _ = tokio::signal::ctrl_c() => {
                agent.interrupt(id);
                turn.await
            }
        };

        print_output(&out, verbose);
        if !out.interrupted {
            history.push(HistoryTurn::new(line, out.final_answer.clone()));
        }
    }

    agent.shutdown();
    Ok(())
}

fn print_output(out: &TurnOutput, verbose: bool) {
    if verbose {
        for line in &out.log {
            println!("  · {}", line);
        }
    }
    println!("{}", out.final_answer);
}
