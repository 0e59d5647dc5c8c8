use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::generator::Generator;
use crate::history::{ChatTurn, HistoryError, HistoryStore};

/// 读写历史失败时返回给用户的提示
pub const STORAGE_FAILURE_REPLY: &str = "⚠️ 对话历史暂时不可用，请稍后重试。";

/// 一轮对话的协调者：读取上下文、调用生成端、原子地写回本轮问答
#[derive(Clone)]
pub struct ConversationOrchestrator {
    store: Arc<dyn HistoryStore>,
    generator: Generator,
    storage_timeout: Duration,
}

impl ConversationOrchestrator {
    pub fn new(store: Arc<dyn HistoryStore>, generator: Generator, storage_timeout: Duration) -> Self {
        Self {
            store,
            generator,
            storage_timeout,
        }
    }

    async fn with_timeout<T>(
        &self,
        fut: impl Future<Output = Result<T, HistoryError>>,
    ) -> Result<T, HistoryError> {
        match tokio::time::timeout(self.storage_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(HistoryError::Timeout(self.storage_timeout)),
        }
    }

    /// 处理一条用户消息并返回回复文本
    ///
    /// 读取历史失败时不会调用生成端；生成失败的提示文本会像正常回复一样写入历史。
    /// 用户消息和回复在同一个事务中写入，不会只留下半轮对话。
    pub async fn process_user_message(&self, user_id: i64, message: &str) -> String {
        let context = match self.with_timeout(self.store.get_history(user_id, None)).await {
            Ok(context) => context,
            Err(e) => {
                error!("读取用户 {} 的对话历史失败: {}", user_id, e);
                return STORAGE_FAILURE_REPLY.to_string();
            }
        };
        debug!("用户 {} 的上下文共 {} 条消息", user_id, context.len());

        let reply = self.generator.generate(&context, message).await;

        let turn = [ChatTurn::user(message), ChatTurn::assistant(reply.as_str())];
        if let Err(e) = self.with_timeout(self.store.append_many(user_id, &turn)).await {
            error!("保存用户 {} 的本轮对话失败: {}", user_id, e);
            return STORAGE_FAILURE_REPLY.to_string();
        }

        reply
    }

    /// 当前窗口内的历史，按时间顺序
    pub async fn history(&self, user_id: i64) -> Result<Vec<ChatTurn>, HistoryError> {
        self.with_timeout(self.store.get_history(user_id, None)).await
    }

    pub async fn clear(&self, user_id: i64) -> Result<(), HistoryError> {
        self.with_timeout(self.store.clear_history(user_id)).await?;
        info!("用户 {} 的对话已重置", user_id);
        Ok(())
    }
}
