//! Chat-or-tools classification.

use docchat_core::message::Message;
use tracing::{debug, warn};

use crate::generation::GenerationClient;
use crate::prompts;
use crate::state::Route;

/// Decides whether a query needs external information.
pub struct QueryRouter {
    client: GenerationClient,
    window: usize,
}

impl QueryRouter {
    /// `window` is how many recent messages the classifier sees.
    pub fn new(client: GenerationClient, window: usize) -> Self {
        Self { client, window: window.max(1) }
    }

    /// Classify the tail of `messages`. Never fails: a generation error or
    /// an unexpected reply routes to `Chat`.
    pub async fn route(&self, messages: &[Message]) -> Route {
        let start = messages.len().saturating_sub(self.window);
        let recent: Vec<Message> = messages[start..]
            .iter()
            .filter(|m| m.tool_calls.is_empty() && m.tool_call_id.is_none())
            .cloned()
            .collect();

        match self.client.complete(prompts::router_messages(&recent)).await {
            Ok(response) => {
                let route = Self::parse(&response.message.content);
                debug!(reply = %response.message.content.trim(), route = %route, "Router decision");
                route
            }
            Err(e) => {
                warn!(error = %e, "Router call failed, falling back to chat");
                Route::Chat
            }
        }
    }

    /// Exactly `tools` (trimmed, any ASCII case) means tools; everything
    /// else is chat.
    pub fn parse(reply: &str) -> Route {
        if reply.trim().eq_ignore_ascii_case("tools") {
            Route::Tools
        } else {
            Route::Chat
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{Scripted, ScriptedProvider};
    use docchat_core::error::ProviderError;
    use docchat_core::message::Role;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn router(provider: Arc<ScriptedProvider>) -> QueryRouter {
        QueryRouter::new(GenerationClient::new(provider, "chat-model", 0.2), 3)
    }

    #[test]
    fn parse_is_strict() {
        assert_eq!(QueryRouter::parse("tools"), Route::Tools);
        assert_eq!(QueryRouter::parse("  TOOLS \n"), Route::Tools);
        assert_eq!(QueryRouter::parse("chat"), Route::Chat);
        assert_eq!(QueryRouter::parse("tools please"), Route::Chat);
        assert_eq!(QueryRouter::parse(""), Route::Chat);
    }

    proptest! {
        #[test]
        fn parse_clamps_any_reply(reply in any::<String>()) {
            let expected = if reply.trim().eq_ignore_ascii_case("tools") {
                Route::Tools
            } else {
                Route::Chat
            };
            prop_assert_eq!(QueryRouter::parse(&reply), expected);
        }

        #[test]
        fn padded_tools_in_any_case_routes_to_tools(
            left in "[ \t\n]{0,3}",
            right in "[ \t\n]{0,3}",
            upper in proptest::collection::vec(any::<bool>(), 5),
        ) {
            let word: String = "tools"
                .chars()
                .zip(upper)
                .map(|(c, up)| if up { c.to_ascii_uppercase() } else { c })
                .collect();
            prop_assert_eq!(QueryRouter::parse(&format!("{left}{word}{right}")), Route::Tools);
        }
    }

    #[tokio::test]
    async fn routes_to_tools() {
        let provider = Arc::new(ScriptedProvider::replies(["tools"]));
        let messages = vec![Message::human("what's the latest rust release?")];
        assert_eq!(router(provider.clone()).route(&messages).await, Route::Tools);

        let request = &provider.requests()[0];
        assert_eq!(request.messages[0].role, Role::System);
        assert!(request.tools.is_empty());
    }

    #[tokio::test]
    async fn sees_only_the_recent_window() {
        let provider = Arc::new(ScriptedProvider::replies(["chat"]));
        let messages = vec![
            Message::human("one"),
            Message::assistant("two"),
            Message::human("three"),
            Message::assistant("four"),
            Message::human("five"),
        ];
        router(provider.clone()).route(&messages).await;

        let sent = &provider.requests()[0].messages;
        // system prompt + 3 recent
        assert_eq!(sent.len(), 4);
        assert_eq!(sent[1].content, "three");
        assert_eq!(sent[3].content, "five");
    }

    #[tokio::test]
    async fn failure_falls_back_to_chat() {
        let provider = Arc::new(ScriptedProvider::new(vec![Scripted::Fail(ProviderError::Timeout("slow".into()))]));
        let route = router(provider).route(&[Message::human("hi")]).await;
        assert_eq!(route, Route::Chat);
    }

    #[tokio::test]
    async fn garbage_falls_back_to_chat() {
        let provider = Arc::new(ScriptedProvider::replies(["I think we should search"]));
        assert_eq!(router(provider).route(&[Message::human("hi")]).await, Route::Chat);
    }
}
