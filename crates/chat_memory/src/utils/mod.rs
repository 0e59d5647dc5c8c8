pub mod time_format;

use std::fmt;

use chrono::Local;
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

// 自定义控制台输出层
struct ConsoleLayer;

impl<S> Layer<S> for ConsoleLayer
where
    S: Subscriber + for<'lookup> tracing_subscriber::registry::LookupSpan<'lookup>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let level = event.metadata().level();

        let mut visitor = MessageVisitor::new();
        event.record(&mut visitor);

        let Some(message) = visitor.message else {
            return;
        };

        let timestamp = Local::now().format("%b %d %H:%M:%S");
        let (color_code, level_str) = level_style(level);

        // 时间戳使用灰色（dim），日志级别使用各自的颜色
        eprintln!(
            "\x1b[2m{}\x1b[0m {}{:>5}\x1b[0m {}",
            timestamp, color_code, level_str, message
        );
    }
}

fn level_style(level: &tracing::Level) -> (&'static str, &'static str) {
    match *level {
        tracing::Level::ERROR => ("\x1b[31m", "ERROR"),
        tracing::Level::WARN => ("\x1b[33m", " WARN"),
        tracing::Level::INFO => ("\x1b[32m", " INFO"),
        tracing::Level::DEBUG => ("\x1b[36m", "DEBUG"),
        tracing::Level::TRACE => ("\x1b[35m", "TRACE"),
    }
}

// 用于提取日志消息的访问者
struct MessageVisitor {
    message: Option<String>,
}

impl MessageVisitor {
    fn new() -> Self {
        Self { message: None }
    }
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{:?}", value));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        }
    }
}

/// 初始化日志输出，日志写到 stderr，避免和对话输出混在一起
pub fn init_logger(log_level: &str) -> anyhow::Result<()> {
    let console_layer = ConsoleLayer.with_filter(build_console_filter(log_level));

    tracing_subscriber::registry()
        .with(console_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("初始化日志失败: {}", e))
}

/// 构建控制台日志过滤器，压低 sqlx 慢查询等噪音
fn build_console_filter(base_level: &str) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::builder().parse_lossy(format!(
        "{},\
            sqlx::query=error,\
            sqlx=error,\
            sea_orm::database=error,\
            sea_orm_migration=warn,\
            hyper=warn,\
            reqwest=warn,\
            h2=warn",
        base_level
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_style() {
        assert_eq!(level_style(&tracing::Level::ERROR), ("\x1b[31m", "ERROR"));
        assert_eq!(level_style(&tracing::Level::INFO).1, " INFO");
    }

    #[test]
    fn test_console_filter_keeps_base_level() {
        let filter = build_console_filter("debug");
        let rendered = filter.to_string();
        assert!(rendered.contains("debug"));
        assert!(rendered.contains("sqlx=error"));
    }
}
