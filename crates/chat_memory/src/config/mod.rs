use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};

/// 默认系统提示词，由生成端在每次请求时放在最前面
pub const DEFAULT_SYSTEM_PROMPT: &str = "你是一个友好、简洁的聊天助手。请结合之前的对话内容回答用户的问题。";

/// 对话历史的存储形态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StorageShape {
    /// 规范化：dialog 行 + 多条 message 行
    #[default]
    Messages,
    /// 反规范化：每个用户一行，历史以 JSON 数组保存
    Snapshot,
}

impl std::fmt::Display for StorageShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageShape::Messages => write!(f, "messages"),
            StorageShape::Snapshot => write!(f, "snapshot"),
        }
    }
}

/// 命令行与环境变量参数
#[derive(Parser, Debug, Clone)]
#[command(name = "chat-memory", version, about = "带有界上下文窗口的对话助手")]
pub struct Args {
    /// SQLite 连接地址，例如 sqlite://chat_memory.sqlite 或 sqlite::memory:
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://chat_memory.sqlite")]
    pub database_url: String,

    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = 8)]
    pub database_max_connections: u32,

    /// SQLite busy_timeout 以及连接获取超时（秒）
    #[arg(long, env = "DATABASE_BUSY_TIMEOUT", default_value_t = 30)]
    pub database_busy_timeout: u64,

    /// 每个用户最多保留的消息条数
    #[arg(long, env = "MAX_CONTEXT_MESSAGES", default_value_t = 10)]
    pub max_context_messages: usize,

    #[arg(long, env = "HISTORY_STORAGE", value_enum, default_value_t = StorageShape::Messages)]
    pub storage: StorageShape,

    /// 单次存储操作超时（秒）
    #[arg(long, env = "STORAGE_TIMEOUT", default_value_t = 30)]
    pub storage_timeout: u64,

    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub openai_base_url: String,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-4o-mini")]
    pub openai_model: String,

    /// 生成请求超时（秒）
    #[arg(long, env = "OPENAI_TIMEOUT", default_value_t = 60)]
    pub openai_timeout: u64,

    #[arg(long, env = "SYSTEM_PROMPT")]
    pub system_prompt: Option<String>,

    /// 控制台会话使用的用户 ID
    #[arg(long, env = "USER_ID", default_value_t = 1)]
    pub user_id: i64,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub busy_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://chat_memory.sqlite".to_string(),
            max_connections: 8,
            busy_timeout_seconds: 30,
        }
    }
}

impl DatabaseConfig {
    /// 内存数据库只能使用单连接，否则每个连接看到的是不同的库
    pub fn is_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// 上下文窗口上限 M
    pub max_context_messages: usize,
    pub storage: StorageShape,
    pub storage_timeout_seconds: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_context_messages: 10,
            storage: StorageShape::Messages,
            storage_timeout_seconds: 30,
        }
    }
}

/// OpenAI 兼容的 chat/completions 接口配置
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AiConfig {
    /// 例如 https://api.openai.com/v1 或 https://api.deepseek.com/v1
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_seconds: u64,
    pub system_prompt: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            max_tokens: 1024,
            timeout_seconds: 60,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub history: HistoryConfig,
    pub ai: AiConfig,
}

impl Config {
    pub fn from_args(args: &Args) -> Self {
        let ai_defaults = AiConfig::default();
        Self {
            database: DatabaseConfig {
                url: args.database_url.clone(),
                max_connections: args.database_max_connections,
                busy_timeout_seconds: args.database_busy_timeout,
            },
            history: HistoryConfig {
                max_context_messages: args.max_context_messages,
                storage: args.storage,
                storage_timeout_seconds: args.storage_timeout,
            },
            ai: AiConfig {
                base_url: args.openai_base_url.clone(),
                api_key: args.openai_api_key.clone().filter(|key| !key.trim().is_empty()),
                model: args.openai_model.clone(),
                timeout_seconds: args.openai_timeout,
                system_prompt: args
                    .system_prompt
                    .clone()
                    .unwrap_or(ai_defaults.system_prompt.clone()),
                ..ai_defaults
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.history.max_context_messages == 0 {
            bail!("MAX_CONTEXT_MESSAGES 必须为正整数");
        }
        if self.history.storage_timeout_seconds == 0 {
            bail!("存储超时必须大于 0 秒");
        }
        if self.database.max_connections == 0 {
            bail!("数据库连接数必须大于 0");
        }
        if !self.database.url.starts_with("sqlite:") {
            bail!("仅支持 SQLite 数据库地址: {}", self.database.url);
        }
        if self.ai.api_key.is_none() {
            bail!("未找到 OPENAI_API_KEY，请通过环境变量或 --openai-api-key 配置");
        }
        if !self.ai.base_url.starts_with("http://") && !self.ai.base_url.starts_with("https://") {
            bail!("OPENAI_BASE_URL 必须以 http:// 或 https:// 开头: {}", self.ai.base_url);
        }
        Ok(())
    }
}
