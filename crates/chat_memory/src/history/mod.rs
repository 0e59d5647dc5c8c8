mod error;
mod messages;
mod snapshot;

use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};

pub use chat_memory_entity::Role;
pub use error::HistoryError;
pub use messages::MessageHistory;
pub use snapshot::SnapshotHistory;

use crate::config::StorageShape;

/// 一轮对话中的一条发言，只暴露角色和内容
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// 有界、保序的对话历史存储
///
/// 每个用户最多保留 `max_messages()` 条消息，超出时按插入顺序删除最旧的记录。
/// 两种存储形态（规范化的多行消息 / 单行 JSON 快照）对外行为一致。
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// 上下文窗口上限 M
    fn max_messages(&self) -> usize;

    /// 在同一个事务中按顺序追加若干条消息并执行一次裁剪
    async fn append_many(&self, user_id: i64, turns: &[ChatTurn]) -> Result<(), HistoryError>;

    async fn append(&self, user_id: i64, role: Role, content: &str) -> Result<(), HistoryError> {
        self.append_many(user_id, &[ChatTurn::new(role, content)]).await
    }

    /// 按时间顺序返回最近的 `min(limit, M)` 条消息，`None` 表示取 M 条
    async fn get_history(&self, user_id: i64, limit: Option<usize>) -> Result<Vec<ChatTurn>, HistoryError>;

    /// 删除全部消息，但保留用户的对话记录
    async fn clear_history(&self, user_id: i64) -> Result<(), HistoryError>;
}

/// 调用方可以请求更小的窗口，但不会超过上限
pub(crate) fn effective_limit(limit: Option<usize>, max_messages: usize) -> usize {
    limit.map_or(max_messages, |limit| limit.min(max_messages))
}

pub fn build_history_store(
    shape: StorageShape,
    db: DatabaseConnection,
    max_messages: usize,
) -> Arc<dyn HistoryStore> {
    match shape {
        StorageShape::Messages => Arc::new(MessageHistory::new(db, max_messages)),
        StorageShape::Snapshot => Arc::new(SnapshotHistory::new(db, max_messages)),
    }
}
