use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 反规范化存储形态：整段历史作为 JSON 数组存放在一行里
        manager
            .create_table(
                Table::create()
                    .table(DialogSnapshot::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DialogSnapshot::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(DialogSnapshot::UserId)
                            .big_integer()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(DialogSnapshot::Messages)
                            .text()
                            .not_null()
                            .default("[]"),
                    )
                    .col(ColumnDef::new(DialogSnapshot::CreatedAt).string().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_dialog_snapshot_user_id")
                    .table(DialogSnapshot::Table)
                    .col(DialogSnapshot::UserId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DialogSnapshot::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum DialogSnapshot {
    Table,
    Id,
    UserId,
    Messages,
    CreatedAt,
}
