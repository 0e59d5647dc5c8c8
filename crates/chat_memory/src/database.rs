use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use chat_memory_migration::{Migrator, MigratorTrait};
use sea_orm::sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sea_orm::{ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbErr, SqlxSqliteConnector, TransactionTrait};
use tracing::{debug, info};

use crate::config::DatabaseConfig;

/// 创建 SQLite 连接选项
fn create_sqlite_options(config: &DatabaseConfig) -> Result<SqliteConnectOptions> {
    let options = SqliteConnectOptions::from_str(&config.url)
        .with_context(|| format!("无效的数据库地址: {}", config.url))?
        .create_if_missing(true)
        // message.dialog_id 的级联删除依赖外键开关
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(config.busy_timeout_seconds))
        .pragma("temp_store", "MEMORY");

    if config.is_memory() {
        return Ok(options);
    }

    Ok(options
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .optimize_on_close(true, None)
        .pragma("cache_size", "-16384"))
}

async fn database_connection(config: &DatabaseConfig, options: SqliteConnectOptions) -> Result<DatabaseConnection> {
    let pool_options = if config.is_memory() {
        // 内存库随最后一个连接关闭而消失，因此固定一个永不回收的连接
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(1)
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(3600))
    };

    let pool = pool_options
        .acquire_timeout(Duration::from_secs(config.busy_timeout_seconds))
        .connect_with(options)
        .await
        .with_context(|| format!("连接数据库失败: {}", config.url))?;

    debug!(
        "SQLite 连接池已创建: url={}, max_connections={}",
        config.url,
        pool.options().get_max_connections()
    );

    Ok(SqlxSqliteConnector::from_sqlx_sqlite_pool(pool))
}

async fn migrate_database(options: SqliteConnectOptions) -> Result<()> {
    // 为迁移创建单连接池（避免多连接导致的迁移顺序问题）
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .context("创建迁移连接失败")?;

    let connection = SqlxSqliteConnector::from_sqlx_sqlite_pool(pool.clone());
    Migrator::up(&connection, None).await.context("数据库迁移失败")?;

    // 显式关闭连接池，确保释放所有数据库锁
    pool.close().await;
    debug!("迁移完成，已关闭迁移连接池");

    Ok(())
}

/// 进行数据库迁移并获取数据库连接
pub async fn setup_database(config: &DatabaseConfig) -> Result<DatabaseConnection> {
    let options = create_sqlite_options(config)?;

    let connection = if config.is_memory() {
        // 内存库不能跨连接迁移，只能在工作连接上直接执行
        let connection = database_connection(config, options).await?;
        Migrator::up(&connection, None).await.context("数据库迁移失败")?;
        connection
    } else {
        migrate_database(options.clone()).await?;
        database_connection(config, options).await?
    };

    info!("数据库已就绪: {}", config.url);
    Ok(connection)
}

/// 开始一个事务并立即获取写锁
/// 通过更新锁定表来强制获取写锁，避免 SQLITE_BUSY_SNAPSHOT 问题
pub async fn begin_write_transaction(connection: &DatabaseConnection) -> Result<DatabaseTransaction, DbErr> {
    let txn = connection.begin().await?;

    // 如果其他事务持有锁，这里会等待 busy_timeout
    txn.execute_unprepared("UPDATE _write_lock SET ts = strftime('%s', 'now') WHERE id = 1")
        .await?;

    Ok(txn)
}

/// 测试用的内存数据库，已执行全部迁移
#[cfg(test)]
pub(crate) async fn setup_memory_database() -> DatabaseConnection {
    let config = DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        busy_timeout_seconds: 5,
    };
    setup_database(&config).await.expect("初始化内存数据库失败")
}

/// 测试用的 WAL 文件数据库，drop 时删除数据库文件
#[cfg(test)]
pub(crate) struct TempFileDatabase {
    pub(crate) connection: DatabaseConnection,
    path: std::path::PathBuf,
}

#[cfg(test)]
impl TempFileDatabase {
    pub(crate) async fn new() -> Self {
        let path = std::env::temp_dir().join(format!("chat_memory_{}.sqlite", uuid::Uuid::new_v4()));
        let config = DatabaseConfig {
            url: format!("sqlite://{}", path.display()),
            max_connections: 8,
            busy_timeout_seconds: 30,
        };
        let connection = setup_database(&config).await.expect("初始化文件数据库失败");
        Self { connection, path }
    }
}

#[cfg(test)]
impl Drop for TempFileDatabase {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut file = self.path.clone().into_os_string();
            file.push(suffix);
            let _ = std::fs::remove_file(file);
        }
    }
}
