use sea_orm::entity::prelude::*;

use super::role::Role;

/// 对话中的单条消息，id 随插入顺序单调递增
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "message")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(indexed)]
    pub dialog_id: i32,
    pub role: Role,
    #[sea_orm(column_type = "Text")]
    pub content: String,
    pub created_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::dialog::Entity",
        from = "Column::DialogId",
        to = "super::dialog::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Dialog,
}

impl Related<super::dialog::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Dialog.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
