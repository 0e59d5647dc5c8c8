use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set, SqlErr};
use tracing::{debug, warn};

use crate::history::HistoryError;
use crate::utils::time_format::now_standard_string;
use chat_memory_entity::dialog;

/// 用户对话仓储，负责 user_id 到 dialog 记录的映射
#[derive(Clone)]
pub struct DialogRepository {
    db: DatabaseConnection,
}

impl DialogRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    pub async fn get_or_create_dialog(&self, user_id: i64) -> Result<dialog::Model, HistoryError> {
        get_or_create_dialog(&self.db, user_id).await
    }
}

pub(crate) fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

pub async fn find_dialog<C: ConnectionTrait>(conn: &C, user_id: i64) -> Result<Option<dialog::Model>, DbErr> {
    dialog::Entity::find()
        .filter(dialog::Column::UserId.eq(user_id))
        .one(conn)
        .await
}

async fn insert_dialog<C: ConnectionTrait>(conn: &C, user_id: i64) -> Result<dialog::Model, HistoryError> {
    let new_dialog = dialog::ActiveModel {
        user_id: Set(user_id),
        created_at: Set(now_standard_string()),
        ..Default::default()
    };

    match new_dialog.insert(conn).await {
        Ok(model) => {
            debug!("创建用户对话: user_id={}, dialog_id={}", user_id, model.id);
            Ok(model)
        }
        Err(e) if is_unique_violation(&e) => Err(HistoryError::DuplicateDialog(user_id)),
        Err(e) => Err(e.into()),
    }
}

/// 查询用户对话，不存在则创建
///
/// 查询与插入之间不是原子的，user_id 上的唯一约束负责最终裁决：
/// 插入冲突时说明另一个请求已经创建了对话，改为重新查询。
pub async fn get_or_create_dialog<C: ConnectionTrait>(conn: &C, user_id: i64) -> Result<dialog::Model, HistoryError> {
    if let Some(existing) = find_dialog(conn, user_id).await? {
        return Ok(existing);
    }

    match insert_dialog(conn, user_id).await {
        Err(HistoryError::DuplicateDialog(_)) => {
            warn!("用户 {} 的对话已被并发创建，改为查询", user_id);
            find_dialog(conn, user_id)
                .await?
                .ok_or(HistoryError::DuplicateDialog(user_id))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use sea_orm::{ModelTrait, PaginatorTrait};

    use super::*;
    use crate::database::setup_memory_database;
    use chat_memory_entity::{message, Role};

    async fn dialog_count(db: &DatabaseConnection, user_id: i64) -> u64 {
        dialog::Entity::find()
            .filter(dialog::Column::UserId.eq(user_id))
            .count(db)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let db = setup_memory_database().await;
        let repo = DialogRepository::new(db.clone());

        let first = repo.get_or_create_dialog(1001).await.unwrap();
        let second = repo.get_or_create_dialog(1001).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.user_id, 1001);
        assert_eq!(dialog_count(&db, 1001).await, 1);
    }

    #[tokio::test]
    async fn test_distinct_users_get_distinct_dialogs() {
        let db = setup_memory_database().await;
        let repo = DialogRepository::new(db);

        let a = repo.get_or_create_dialog(1).await.unwrap();
        let b = repo.get_or_create_dialog(2).await.unwrap();
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn test_racing_insert_reports_duplicate() {
        let db = setup_memory_database().await;
        insert_dialog(&db, 77).await.unwrap();

        assert_matches!(insert_dialog(&db, 77).await, Err(HistoryError::DuplicateDialog(77)));
        // 调用方视角：冲突后按查询处理
        let dialog = get_or_create_dialog(&db, 77).await.unwrap();
        assert_eq!(dialog.user_id, 77);
        assert_eq!(dialog_count(&db, 77).await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_get_or_create() {
        let db = setup_memory_database().await;
        let repo = DialogRepository::new(db.clone());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let repo = repo.clone();
                tokio::spawn(async move { repo.get_or_create_dialog(4242).await })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap().id);
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(dialog_count(&db, 4242).await, 1);
    }

    #[tokio::test]
    async fn test_deleting_dialog_cascades_to_messages() {
        let db = setup_memory_database().await;
        let dialog = get_or_create_dialog(&db, 9).await.unwrap();

        message::ActiveModel {
            dialog_id: Set(dialog.id),
            role: Set(Role::User),
            content: Set("hello".to_string()),
            created_at: Set(now_standard_string()),
            ..Default::default()
        }
        .insert(&db)
        .await
        .unwrap();

        dialog.delete(&db).await.unwrap();

        let remaining = message::Entity::find().count(&db).await.unwrap();
        assert_eq!(remaining, 0);
    }
}
