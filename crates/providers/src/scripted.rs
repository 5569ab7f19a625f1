//! A provider that answers from a script instead of a network endpoint.
//!
//! Used by tests across the workspace and by `recall chat --offline`.
//! Each call to `complete` takes the next scripted reply. Once the script is
//! exhausted the provider either echoes the last user message or fails,
//! depending on how it was built. Every request is recorded for inspection.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use recall_core::error::ProviderError;
use recall_core::message::{Message, Role};
use recall_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};

type Reply = Result<String, ProviderError>;

pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<ProviderRequest>>,
    echo_when_exhausted: bool,
}

impl ScriptedProvider {
    /// Replies in order, then fails every further call.
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            requests: Mutex::new(Vec::new()),
            echo_when_exhausted: false,
        }
    }

    /// Echo the last user message on every call.
    pub fn echo() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            echo_when_exhausted: true,
        }
    }

    /// Queue another reply.
    pub fn push_reply(&self, reply: impl Into<String>) {
        lock(&self.replies).push_back(Ok(reply.into()));
    }

    /// Queue a failure.
    pub fn push_error(&self, error: ProviderError) {
        lock(&self.replies).push_back(Err(error));
    }

    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        lock(&self.requests).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let last_user = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(Message::text_content)
            .unwrap_or_default();
        let model = request.model.clone();
        lock(&self.requests).push(request);

        let next = lock(&self.replies).pop_front();
        let text = match next {
            Some(reply) => reply?,
            None if self.echo_when_exhausted => last_user,
            None => {
                return Err(ProviderError::InvalidResponse(
                    "scripted provider has no replies left".into(),
                ));
            }
        };

        Ok(ProviderResponse {
            message: Message::assistant(text),
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            model,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(text: &str) -> ProviderRequest {
        ProviderRequest::new("mock-model", vec![Message::system("sys"), Message::user(text)])
    }

    #[tokio::test]
    async fn replies_in_order_then_fails() {
        let provider = ScriptedProvider::new(["one", "two"]);
        let first = provider.complete(request("a")).await.unwrap();
        let second = provider.complete(request("b")).await.unwrap();
        assert_eq!(first.message.text_content(), "one");
        assert_eq!(second.message.text_content(), "two");
        assert!(provider.complete(request("c")).await.is_err());
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn echo_returns_last_user_message() {
        let provider = ScriptedProvider::echo();
        let response = provider.complete(request("ping")).await.unwrap();
        assert_eq!(response.message.text_content(), "ping");
    }

    #[tokio::test]
    async fn queued_error_is_returned() {
        let provider = ScriptedProvider::new(Vec::<String>::new());
        provider.push_error(ProviderError::Timeout("slow".into()));
        let err = provider.complete(request("x")).await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout(_)));
    }

    #[tokio::test]
    async fn records_requests() {
        let provider = ScriptedProvider::new(["ok"]);
        provider.complete(request("hello")).await.unwrap();
        let seen = provider.requests();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].messages[1].text_content(), "hello");
    }
}
