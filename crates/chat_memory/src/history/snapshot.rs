use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set,
};
use tracing::{debug, info, warn};

use super::{effective_limit, ChatTurn, HistoryError, HistoryStore};
use crate::database::begin_write_transaction;
use crate::dialog::is_unique_violation;
use crate::utils::time_format::now_standard_string;
use chat_memory_entity::dialog_snapshot;

/// 反规范化存储：每个用户一行，整段历史序列化为 JSON 数组，裁剪即切片
#[derive(Clone)]
pub struct SnapshotHistory {
    db: DatabaseConnection,
    max_messages: usize,
}

impl SnapshotHistory {
    pub fn new(db: DatabaseConnection, max_messages: usize) -> Self {
        Self {
            db,
            max_messages: max_messages.max(1),
        }
    }
}

async fn find_snapshot<C: ConnectionTrait>(conn: &C, user_id: i64) -> Result<Option<dialog_snapshot::Model>, DbErr> {
    dialog_snapshot::Entity::find()
        .filter(dialog_snapshot::Column::UserId.eq(user_id))
        .one(conn)
        .await
}

async fn get_or_create_snapshot<C: ConnectionTrait>(
    conn: &C,
    user_id: i64,
) -> Result<dialog_snapshot::Model, HistoryError> {
    if let Some(existing) = find_snapshot(conn, user_id).await? {
        return Ok(existing);
    }

    let new_snapshot = dialog_snapshot::ActiveModel {
        user_id: Set(user_id),
        messages: Set("[]".to_string()),
        created_at: Set(now_standard_string()),
        ..Default::default()
    };

    match new_snapshot.insert(conn).await {
        Ok(model) => Ok(model),
        Err(e) if is_unique_violation(&e) => {
            warn!("用户 {} 的对话快照已被并发创建，改为查询", user_id);
            find_snapshot(conn, user_id)
                .await?
                .ok_or(HistoryError::DuplicateDialog(user_id))
        }
        Err(e) => Err(e.into()),
    }
}

fn decode_turns(user_id: i64, raw: &str) -> Result<Vec<ChatTurn>, HistoryError> {
    serde_json::from_str(raw).map_err(|source| HistoryError::CorruptSnapshot { user_id, source })
}

fn encode_turns(user_id: i64, turns: &[ChatTurn]) -> Result<String, HistoryError> {
    serde_json::to_string(turns).map_err(|source| HistoryError::CorruptSnapshot { user_id, source })
}

/// 解析快照，损坏时按空历史处理，下一次写入会覆盖掉损坏内容
fn load_turns(snapshot: &dialog_snapshot::Model) -> Vec<ChatTurn> {
    match decode_turns(snapshot.user_id, &snapshot.messages) {
        Ok(turns) => turns,
        Err(e) => {
            warn!("{}，按空历史处理", e);
            Vec::new()
        }
    }
}

/// 只保留最后 `keep` 条
fn keep_last(mut turns: Vec<ChatTurn>, keep: usize) -> Vec<ChatTurn> {
    let start = turns.len().saturating_sub(keep);
    turns.split_off(start)
}

#[async_trait]
impl HistoryStore for SnapshotHistory {
    fn max_messages(&self) -> usize {
        self.max_messages
    }

    async fn append_many(&self, user_id: i64, turns: &[ChatTurn]) -> Result<(), HistoryError> {
        if turns.is_empty() {
            return Ok(());
        }

        // 读-改-写必须在持有写锁的事务内完成，否则并发追加会互相覆盖
        let txn = begin_write_transaction(&self.db).await?;
        let snapshot = get_or_create_snapshot(&txn, user_id).await?;

        let mut stored = load_turns(&snapshot);
        stored.extend_from_slice(turns);
        let before = stored.len();
        let stored = keep_last(stored, self.max_messages);

        let mut active: dialog_snapshot::ActiveModel = snapshot.into();
        active.messages = Set(encode_turns(user_id, &stored)?);
        active.update(&txn).await?;
        txn.commit().await?;

        debug!(
            "保存对话快照: user_id={}, count={}, trimmed={}",
            user_id,
            stored.len(),
            before - stored.len()
        );
        Ok(())
    }

    async fn get_history(&self, user_id: i64, limit: Option<usize>) -> Result<Vec<ChatTurn>, HistoryError> {
        let limit = effective_limit(limit, self.max_messages);
        let snapshot = get_or_create_snapshot(&self.db, user_id).await?;
        Ok(keep_last(load_turns(&snapshot), limit))
    }

    async fn clear_history(&self, user_id: i64) -> Result<(), HistoryError> {
        let txn = begin_write_transaction(&self.db).await?;
        let snapshot = get_or_create_snapshot(&txn, user_id).await?;
        let removed = load_turns(&snapshot).len();

        let mut active: dialog_snapshot::ActiveModel = snapshot.into();
        active.messages = Set("[]".to_string());
        active.update(&txn).await?;
        txn.commit().await?;

        info!("已清除用户 {} 的对话快照，删除 {} 条记录", user_id, removed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use sea_orm::PaginatorTrait;

    use super::*;
    use crate::database::setup_memory_database;
    use chat_memory_entity::Role;

    async fn overwrite_raw(db: &DatabaseConnection, user_id: i64, raw: &str) {
        let snapshot = get_or_create_snapshot(db, user_id).await.unwrap();
        let mut active: dialog_snapshot::ActiveModel = snapshot.into();
        active.messages = Set(raw.to_string());
        active.update(db).await.unwrap();
    }

    #[test]
    fn test_keep_last() {
        let turns = vec![ChatTurn::user("a"), ChatTurn::user("b"), ChatTurn::user("c")];
        assert_eq!(keep_last(turns.clone(), 2), turns[1..].to_vec());
        assert_eq!(keep_last(turns.clone(), 5), turns);
        assert!(keep_last(turns, 0).is_empty());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert_matches!(
            decode_turns(3, "not json"),
            Err(HistoryError::CorruptSnapshot { user_id: 3, .. })
        );
        assert_matches!(
            decode_turns(3, r#"[{"role":"robot","content":"x"}]"#),
            Err(HistoryError::CorruptSnapshot { .. })
        );
    }

    #[tokio::test]
    async fn test_snapshot_json_layout() {
        let db = setup_memory_database().await;
        let store = SnapshotHistory::new(db.clone(), 10);
        store.append(1, Role::User, "hi").await.unwrap();
        store.append(1, Role::Assistant, "").await.unwrap();

        let snapshot = find_snapshot(&db, 1).await.unwrap().unwrap();
        assert_eq!(
            snapshot.messages,
            r#"[{"role":"user","content":"hi"},{"role":"assistant","content":""}]"#
        );
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_heals_on_append() {
        let db = setup_memory_database().await;
        let store = SnapshotHistory::new(db.clone(), 10);
        overwrite_raw(&db, 2, "{broken").await;

        assert!(store.get_history(2, None).await.unwrap().is_empty());

        store.append(2, Role::User, "fresh").await.unwrap();
        assert_eq!(store.get_history(2, None).await.unwrap(), vec![ChatTurn::user("fresh")]);
    }

    async fn stored_len(db: &DatabaseConnection, user_id: i64) -> usize {
        let snapshot = find_snapshot(db, user_id).await.unwrap().unwrap();
        decode_turns(user_id, &snapshot.messages).unwrap().len()
    }

    #[tokio::test]
    async fn test_stored_json_never_exceeds_cap() {
        let db = setup_memory_database().await;
        let store = SnapshotHistory::new(db.clone(), 3);

        for i in 0..8 {
            store.append(6, Role::User, &format!("m{}", i)).await.unwrap();
            assert_eq!(stored_len(&db, 6).await, (i + 1).min(3));
        }

        let turns = [
            ChatTurn::user("q"),
            ChatTurn::assistant("a"),
            ChatTurn::user("q2"),
            ChatTurn::assistant("a2"),
        ];
        store.append_many(6, &turns).await.unwrap();
        assert_eq!(stored_len(&db, 6).await, 3);
    }

    #[tokio::test]
    async fn test_concurrent_appends_keep_stored_json_within_cap() {
        let db = setup_memory_database().await;
        let store = SnapshotHistory::new(db.clone(), 4);

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move { store.append(8, Role::User, &format!("m{}", i)).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(stored_len(&db, 8).await, 4);
    }

    #[tokio::test]
    async fn test_one_row_per_user() {
        let db = setup_memory_database().await;
        let store = SnapshotHistory::new(db.clone(), 10);

        store.get_history(5, None).await.unwrap();
        store.append(5, Role::User, "x").await.unwrap();
        store.clear_history(5).await.unwrap();
        store.append(5, Role::User, "y").await.unwrap();

        let rows = dialog_snapshot::Entity::find()
            .filter(dialog_snapshot::Column::UserId.eq(5))
            .count(&db)
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }
}
