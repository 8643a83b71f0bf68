//! harvest 命令行入口
//!
//! `harvest plan <goal>` 只打印计划；`harvest capabilities` 列出能力；`harvest run [goal]` 规划并执行，计划被阻塞时以非零码退出。

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use harvest::core::create_builder;
use harvest::react::AgentEvent;

const DEFAULT_GOAL: &str = "Generate a dataset of YouTube AI tutorial videos and their transcripts. \
The dataset is a CSV file with two columns: URL (the YouTube URL) and Transcript (the path to the saved transcript file). \
If a video has no transcript, skip that video.";

#[derive(Parser)]
#[command(name = "harvest")]
#[command(about = "Plan a data-collection goal and execute it with delegated agents", long_about = None)]
#[command(version)]
struct Cli {
    /// Extra config file layered over config/default.toml
    #[arg(long, global = true, env = "HARVEST_CONFIG")]
    config: Option<PathBuf>,

    /// Workspace root (overrides [app].workspace_root)
    #[arg(long, global = true)]
    workspace: Option<PathBuf>,

    /// Print progress events as JSON lines on stdout
    #[arg(long, global = true)]
    events: bool,

    /// Debug logging (RUST_LOG still wins)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate and print the plan for a goal
    Plan {
        /// The data-collection goal
        goal: String,
    },

    /// List the capabilities available to worker agents
    Capabilities,

    /// Plan and execute a goal
    Run {
        /// The data-collection goal (defaults to the AI tutorial transcript dataset)
        goal: Option<String>,

        /// Print the final report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    harvest::observability::init(cli.verbose);

    let mut builder = create_builder(cli.config.clone());
    if let Some(ws) = cli.workspace.clone() {
        builder = builder.with_workspace(ws);
    }
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<AgentEvent>();
    if cli.events {
        builder = builder.with_events(tx);
    } else {
        drop(tx);
    }
    let harvester = builder.build().context("Failed to build harvester")?;

    // 事件打印与执行在同一任务内并发推进；harvester 释放后通道关闭，打印结束
    let printer = async move {
        while let Some(ev) = rx.recv().await {
            match serde_json::to_string(&ev) {
                Ok(line) => println!("{}", line),
                Err(e) => tracing::warn!(error = %e, "cannot serialize event"),
            }
        }
    };

    let work = async move {
        let result = match cli.command {
            Commands::Plan { goal } => {
                let plan = harvester.plan(&goal).await.context("Planning failed")?;
                println!("{}", plan.render());
                ExitCode::SUCCESS
            }
            Commands::Capabilities => {
                println!("{}", harvester.executor().registry().describe());
                ExitCode::SUCCESS
            }
            Commands::Run { goal, json } => {
                let goal = goal.unwrap_or_else(|| DEFAULT_GOAL.to_string());
                let report = harvester.run(&goal).await.context("Planning failed")?;
                let (prompt_tokens, completion_tokens, total_tokens) = harvester.reasoner().token_usage();
                tracing::info!(prompt_tokens, completion_tokens, total_tokens, "token usage");
                if json {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                } else {
                    println!("{}", report.summary());
                    println!(
                        "Workspace: {} (dataset file: {})",
                        harvester.sandbox().root().display(),
                        harvester.config().controller.dataset_file
                    );
                }
                if report.is_completed() {
                    ExitCode::SUCCESS
                } else {
                    ExitCode::from(2)
                }
            }
        };
        drop(harvester);
        anyhow::Ok(result)
    };

    let (result, ()) = tokio::join!(work, printer);
    result
}
