use sea_orm::entity::prelude::*;

/// 整段对话以 JSON 数组形式保存在一行中的存储形态
///
/// `messages` 形如 `[{"role":"user","content":"..."}, ...]`，按时间顺序排列
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "dialog_snapshot")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique, indexed)]
    pub user_id: i64,
    #[sea_orm(column_type = "Text")]
    pub messages: String,
    pub created_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
