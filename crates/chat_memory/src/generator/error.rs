use thiserror::Error;

pub const RATE_LIMIT_REPLY: &str = "⏳ 请求过于频繁（rate limit），请稍等片刻再试。";
pub const UNAUTHORIZED_REPLY: &str = "🔑 授权失败，请检查 API Key 配置。";
pub const EMPTY_REPLY: &str = "抱歉，我没能生成回复，请再试一次。";
pub const GENERIC_FAILURE_REPLY: &str = "⚠️ 出现错误，请稍后重试。如果问题持续出现，请联系管理员。";

/// 生成端内部错误，不会越过生成边界，最终都会转换成面向用户的提示
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("rate limited by upstream: {0}")]
    RateLimited(String),
    #[error("upstream rejected credentials: {0}")]
    Unauthorized(String),
    #[error("upstream returned an empty reply")]
    EmptyResponse,
    #[error("request failed, status code: {status}, body: {body}")]
    Api { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("api key missing")]
    NotConfigured,
}

impl GenerationError {
    /// 展示给用户（同时写入对话历史）的提示文本
    pub fn fallback_reply(&self) -> &'static str {
        match self {
            GenerationError::RateLimited(_) => RATE_LIMIT_REPLY,
            GenerationError::Unauthorized(_) | GenerationError::NotConfigured => UNAUTHORIZED_REPLY,
            GenerationError::EmptyResponse => EMPTY_REPLY,
            GenerationError::Api { .. } | GenerationError::Transport(_) => GENERIC_FAILURE_REPLY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_replies() {
        assert_eq!(
            GenerationError::RateLimited("slow down".to_string()).fallback_reply(),
            RATE_LIMIT_REPLY
        );
        assert_eq!(GenerationError::NotConfigured.fallback_reply(), UNAUTHORIZED_REPLY);
        assert_eq!(GenerationError::EmptyResponse.fallback_reply(), EMPTY_REPLY);
        assert_eq!(
            GenerationError::Api {
                status: 500,
                body: "oops".to_string()
            }
            .fallback_reply(),
            GENERIC_FAILURE_REPLY
        );
    }

    #[test]
    fn test_fallback_replies_are_distinct_and_non_empty() {
        let replies = [RATE_LIMIT_REPLY, UNAUTHORIZED_REPLY, EMPTY_REPLY, GENERIC_FAILURE_REPLY];
        for (i, a) in replies.iter().enumerate() {
            assert!(!a.is_empty());
            for b in &replies[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
