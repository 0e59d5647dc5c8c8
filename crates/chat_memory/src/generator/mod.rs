mod error;
mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, warn};

pub use error::{
    GenerationError, EMPTY_REPLY, GENERIC_FAILURE_REPLY, RATE_LIMIT_REPLY, UNAUTHORIZED_REPLY,
};
pub use openai::OpenAiBackend;

use crate::history::ChatTurn;

/// 文本生成后端，接收完整的消息序列（含系统提示词）
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(&self, messages: &[ChatTurn]) -> Result<String, GenerationError>;
}

/// 生成边界：拼接系统提示词，并把所有失败转换为用户可读的回复
#[derive(Clone)]
pub struct Generator {
    backend: Arc<dyn ChatBackend>,
    system_prompt: String,
}

impl Generator {
    pub fn new(backend: Arc<dyn ChatBackend>, system_prompt: impl Into<String>) -> Self {
        Self {
            backend,
            system_prompt: system_prompt.into(),
        }
    }

    /// 系统提示词 + 历史上下文 + 本次用户消息
    pub fn build_messages(&self, context: &[ChatTurn], new_message: &str) -> Vec<ChatTurn> {
        let mut messages = Vec::with_capacity(context.len() + 2);
        if !self.system_prompt.is_empty() {
            messages.push(ChatTurn::system(self.system_prompt.as_str()));
        }
        messages.extend_from_slice(context);
        messages.push(ChatTurn::user(new_message));
        messages
    }

    /// 总是返回一段文本；失败时返回对应的提示文本
    pub async fn generate(&self, context: &[ChatTurn], new_message: &str) -> String {
        let messages = self.build_messages(context, new_message);
        match self.backend.complete(&messages).await {
            Ok(reply) => reply,
            Err(e @ GenerationError::EmptyResponse) => {
                warn!("生成端返回了空回复");
                e.fallback_reply().to_string()
            }
            Err(e) => {
                error!("调用生成端失败: {}", e);
                e.fallback_reply().to_string()
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use super::*;

    /// 记录收到的请求并按预设返回结果
    pub(crate) struct StubBackend {
        reply: Box<dyn Fn() -> Result<String, GenerationError> + Send + Sync>,
        pub(crate) calls: Mutex<Vec<Vec<ChatTurn>>>,
    }

    impl StubBackend {
        pub(crate) fn replying(text: &str) -> Arc<Self> {
            let text = text.to_string();
            Arc::new(Self {
                reply: Box::new(move || Ok(text.clone())),
                calls: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn failing(make_error: fn() -> GenerationError) -> Arc<Self> {
            Arc::new(Self {
                reply: Box::new(move || Err(make_error())),
                calls: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ChatBackend for StubBackend {
        async fn complete(&self, messages: &[ChatTurn]) -> Result<String, GenerationError> {
            self.calls.lock().unwrap().push(messages.to_vec());
            (self.reply)()
        }
    }

    #[test]
    fn test_build_messages_order() {
        let generator = Generator::new(StubBackend::replying("x"), "be nice");
        let context = vec![ChatTurn::user("hi"), ChatTurn::assistant("hello")];

        let messages = generator.build_messages(&context, "how are you");
        assert_eq!(
            messages,
            vec![
                ChatTurn::system("be nice"),
                ChatTurn::user("hi"),
                ChatTurn::assistant("hello"),
                ChatTurn::user("how are you"),
            ]
        );
    }

    #[test]
    fn test_empty_system_prompt_is_skipped() {
        let generator = Generator::new(StubBackend::replying("x"), "");
        let messages = generator.build_messages(&[], "hi");
        assert_eq!(messages, vec![ChatTurn::user("hi")]);
    }

    #[tokio::test]
    async fn test_generate_passes_reply_through() {
        let backend = StubBackend::replying("hello");
        let generator = Generator::new(backend.clone(), "sys");

        assert_eq!(generator.generate(&[], "hi").await, "hello");
        assert_eq!(backend.call_count(), 1);
        assert_eq!(backend.calls.lock().unwrap()[0].len(), 2);
    }

    #[tokio::test]
    async fn test_generate_converts_failures() {
        let generator = Generator::new(
            StubBackend::failing(|| GenerationError::RateLimited("429".to_string())),
            "sys",
        );
        assert_eq!(generator.generate(&[], "hi").await, RATE_LIMIT_REPLY);

        let generator = Generator::new(StubBackend::failing(|| GenerationError::EmptyResponse), "sys");
        assert_eq!(generator.generate(&[], "hi").await, EMPTY_REPLY);

        let generator = Generator::new(
            StubBackend::failing(|| GenerationError::Api {
                status: 502,
                body: "bad gateway".to_string(),
            }),
            "sys",
        );
        assert_eq!(generator.generate(&[], "hi").await, GENERIC_FAILURE_REPLY);
    }
}
