use async_trait::async_trait;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use tracing::{debug, info};

use super::{effective_limit, ChatTurn, HistoryError, HistoryStore};
use crate::database::begin_write_transaction;
use crate::dialog::{get_or_create_dialog, DialogRepository};
use crate::utils::time_format::now_standard_string;
use chat_memory_entity::message;

/// 规范化存储：每条消息一行，超出上限时删除多余的最旧行
#[derive(Clone)]
pub struct MessageHistory {
    dialogs: DialogRepository,
    max_messages: usize,
}

impl MessageHistory {
    pub fn new(db: DatabaseConnection, max_messages: usize) -> Self {
        Self {
            dialogs: DialogRepository::new(db),
            max_messages: max_messages.max(1),
        }
    }

    fn db(&self) -> &DatabaseConnection {
        self.dialogs.connection()
    }
}

/// 删除超出上限的最旧消息，返回删除条数
///
/// 按 id 升序确定先后。id 随插入单调递增；created_at 可能因时钟回拨乱序，
/// 同一毫秒内也可能有多条，不能作为裁剪依据。
async fn trim_oldest<C: ConnectionTrait>(conn: &C, dialog_id: i32, max_messages: usize) -> Result<u64, DbErr> {
    let count = message::Entity::find()
        .filter(message::Column::DialogId.eq(dialog_id))
        .count(conn)
        .await?;

    let max_messages = max_messages as u64;
    if count <= max_messages {
        return Ok(0);
    }

    let ids: Vec<i32> = message::Entity::find()
        .select_only()
        .column(message::Column::Id)
        .filter(message::Column::DialogId.eq(dialog_id))
        .order_by_asc(message::Column::Id)
        .limit(count - max_messages)
        .into_tuple()
        .all(conn)
        .await?;

    if ids.is_empty() {
        return Ok(0);
    }

    let result = message::Entity::delete_many()
        .filter(message::Column::Id.is_in(ids))
        .exec(conn)
        .await?;

    Ok(result.rows_affected)
}

#[async_trait]
impl HistoryStore for MessageHistory {
    fn max_messages(&self) -> usize {
        self.max_messages
    }

    async fn append_many(&self, user_id: i64, turns: &[ChatTurn]) -> Result<(), HistoryError> {
        if turns.is_empty() {
            return Ok(());
        }

        // 插入与裁剪在同一事务内提交，任何一步失败都整体回滚
        let txn = begin_write_transaction(self.db()).await?;
        let dialog = get_or_create_dialog(&txn, user_id).await?;

        let created_at = now_standard_string();
        let new_messages = turns.iter().map(|turn| message::ActiveModel {
            dialog_id: Set(dialog.id),
            role: Set(turn.role),
            content: Set(turn.content.clone()),
            created_at: Set(created_at.clone()),
            ..Default::default()
        });
        message::Entity::insert_many(new_messages).exec(&txn).await?;

        let trimmed = trim_oldest(&txn, dialog.id, self.max_messages).await?;
        txn.commit().await?;

        debug!(
            "保存对话消息: user_id={}, dialog_id={}, count={}, trimmed={}",
            user_id,
            dialog.id,
            turns.len(),
            trimmed
        );
        Ok(())
    }

    async fn get_history(&self, user_id: i64, limit: Option<usize>) -> Result<Vec<ChatTurn>, HistoryError> {
        let limit = effective_limit(limit, self.max_messages);
        let dialog = self.dialogs.get_or_create_dialog(user_id).await?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        // 先按 id 倒序取最近的 N 条，再翻转为时间顺序
        let mut records = message::Entity::find()
            .filter(message::Column::DialogId.eq(dialog.id))
            .order_by_desc(message::Column::Id)
            .limit(limit as u64)
            .all(self.db())
            .await?;
        records.reverse();

        Ok(records
            .into_iter()
            .map(|record| ChatTurn {
                role: record.role,
                content: record.content,
            })
            .collect())
    }

    async fn clear_history(&self, user_id: i64) -> Result<(), HistoryError> {
        let txn = begin_write_transaction(self.db()).await?;
        let dialog = get_or_create_dialog(&txn, user_id).await?;

        let result = message::Entity::delete_many()
            .filter(message::Column::DialogId.eq(dialog.id))
            .exec(&txn)
            .await?;
        txn.commit().await?;

        info!(
            "已清除用户 {} 的对话历史，删除 {} 条记录",
            user_id, result.rows_affected
        );
        Ok(())
    }
}
