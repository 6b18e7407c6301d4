//! Hive 命令行宿主
//!
//! 逐行读取 stdin，每行跑一次管线，把 PipelineResult 以 JSON 打印到 stdout；
//! 运行中按 Ctrl+C 取消当前这一轮，空闲时按 Ctrl+C 或输入 exit 退出。

use std::path::PathBuf;

use anyhow::Context;
use hive::pipeline::{ContextSnapshot, RunOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hive::observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = hive::config::load_config(config_path).context("Failed to load config")?;
    let llm = hive::agent::create_llm_from_config(&cfg);
    let pipeline = hive::agent::build_pipeline_with_llm(&cfg, llm.clone());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut last_turn: Option<String> = None;

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input, "exit" | "quit") {
            break;
        }

        let mut context = ContextSnapshot::new()
            .with("time", chrono::Local::now().format("%Y-%m-%d %H:%M %Z").to_string());
        if let Some(prev) = &last_turn {
            context = context.with("previous_turn", prev.clone());
        }

        let token = CancellationToken::new();
        let options = RunOptions::default().with_cancel_token(token.clone());
        let run = pipeline.run(input, &[], Some(&context), options);
        tokio::pin!(run);
        let result = loop {
            tokio::select! {
                result = &mut run => break result,
                _ = tokio::signal::ctrl_c(), if !token.is_cancelled() => {
                    tracing::info!("cancelling current turn");
                    token.cancel();
                }
            }
        };

        last_turn = Some(format!("user: {} / assistant: {}", input, result.display_text()));
        let json = serde_json::to_string_pretty(&result).context("Failed to serialise result")?;
        stdout.write_all(json.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
    }

    let (prompt, completion, total) = llm.token_usage();
    tracing::info!(prompt, completion, total, "token usage");
    Ok(())
}
