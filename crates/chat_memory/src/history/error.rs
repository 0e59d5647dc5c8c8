use std::time::Duration;

use sea_orm::DbErr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HistoryError {
    /// 并发创建同一用户的对话时，唯一约束拒绝了后到的插入
    #[error("dialog for user {0} was created concurrently")]
    DuplicateDialog(i64),
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] DbErr),
    #[error("storage operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("snapshot of user {user_id} is not valid json: {source}")]
    CorruptSnapshot {
        user_id: i64,
        #[source]
        source: serde_json::Error,
    },
}
