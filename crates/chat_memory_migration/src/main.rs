use sea_orm_migration::prelude::*;

#[async_std::main]
async fn main() {
    cli::run_cli(chat_memory_migration::Migrator).await;
}
