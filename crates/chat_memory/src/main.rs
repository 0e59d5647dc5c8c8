use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info};

use chat_memory::config::{Args, Config};
use chat_memory::database::setup_database;
use chat_memory::generator::{Generator, OpenAiBackend};
use chat_memory::history::build_history_store;
use chat_memory::orchestrator::ConversationOrchestrator;
use chat_memory::utils::init_logger;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(&args.log_level)?;

    let config = Config::from_args(&args);
    config.validate()?;

    let connection = setup_database(&config.database).await?;
    let store = build_history_store(
        config.history.storage,
        connection,
        config.history.max_context_messages,
    );
    let backend = OpenAiBackend::new(&config.ai).context("创建生成端客户端失败")?;
    let generator = Generator::new(Arc::new(backend), config.ai.system_prompt.clone());
    let orchestrator = ConversationOrchestrator::new(
        store,
        generator,
        Duration::from_secs(config.history.storage_timeout_seconds),
    );

    info!(
        "chat-memory 已启动: model={}, storage={}, max_context_messages={}",
        config.ai.model, config.history.storage, config.history.max_context_messages
    );

    run_console(&orchestrator, args.user_id).await
}

/// 逐行读取标准输入，`/history`、`/clear`、`/quit` 为内置命令
async fn run_console(orchestrator: &ConversationOrchestrator, user_id: i64) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await.context("读取输入失败")? else {
            break;
        };
        let line = line.trim();

        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/history" => match orchestrator.history(user_id).await {
                Ok(turns) if turns.is_empty() => println!("(暂无历史)"),
                Ok(turns) => {
                    for turn in turns {
                        println!("[{}] {}", turn.role, turn.content);
                    }
                }
                Err(e) => error!("读取历史失败: {}", e),
            },
            "/clear" => match orchestrator.clear(user_id).await {
                Ok(()) => println!("已清空对话历史"),
                Err(e) => error!("清空历史失败: {}", e),
            },
            message => {
                let reply = orchestrator.process_user_message(user_id, message).await;
                println!("{}", reply);
            }
        }
    }

    info!("chat-memory 已退出");
    Ok(())
}
