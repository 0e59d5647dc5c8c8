use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 对话表：每个用户一行，user_id 唯一约束是并发创建时的最终仲裁
        manager
            .create_table(
                Table::create()
                    .table(Dialog::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Dialog::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Dialog::UserId).big_integer().not_null().unique_key())
                    .col(ColumnDef::new(Dialog::CreatedAt).string().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Message::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Message::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Message::DialogId).integer().not_null())
                    .col(ColumnDef::new(Message::Role).string_len(20).not_null())
                    .col(ColumnDef::new(Message::Content).text().not_null())
                    .col(ColumnDef::new(Message::CreatedAt).string().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_message_dialog_id")
                            .from(Message::Table, Message::DialogId)
                            .to(Dialog::Table, Dialog::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::NoAction),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_dialog_user_id")
                    .table(Dialog::Table)
                    .col(Dialog::UserId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_message_dialog_id")
                    .table(Message::Table)
                    .col(Message::DialogId)
                    .to_owned(),
            )
            .await?;

        // 裁剪时按 created_at、id 升序取最旧的消息
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_message_dialog_created")
                    .table(Message::Table)
                    .col(Message::DialogId)
                    .col(Message::CreatedAt)
                    .col(Message::Id)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Message::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Dialog::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Dialog {
    Table,
    Id,
    UserId,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Message {
    Table,
    Id,
    DialogId,
    Role,
    Content,
    CreatedAt,
}
