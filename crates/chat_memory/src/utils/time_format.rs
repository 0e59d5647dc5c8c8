use chrono::Utc;

/// 消息时间戳格式，毫秒精度，字典序即时间序
pub const STANDARD_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// 当前 UTC 时间的标准字符串，不受夏令时回拨影响
pub fn now_standard_string() -> String {
    Utc::now().format(STANDARD_FORMAT).to_string()
}
