use sea_orm_migration::prelude::*;

/// 写锁表：事务开始后立即更新这一行，以便尽早拿到 SQLite 写锁
#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(WriteLock::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(WriteLock::Id).integer().not_null().primary_key())
                    .col(ColumnDef::new(WriteLock::Ts).big_integer().not_null().default(0))
                    .to_owned(),
            )
            .await?;

        let db = manager.get_connection();
        db.execute_unprepared("INSERT OR IGNORE INTO _write_lock (id, ts) VALUES (1, 0)")
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(WriteLock::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum WriteLock {
    #[sea_orm(iden = "_write_lock")]
    Table,
    Id,
    Ts,
}
