//! End-of-turn housekeeping: fold the exchange into the summary, then drop
//! everything but the latest question and answer.

use docchat_core::message::{Message, Role};
use tracing::{debug, warn};

use crate::generation::GenerationClient;
use crate::prompts;
use crate::state::ConversationState;

pub struct Pruner {
    client: GenerationClient,
    word_limit: usize,
}

impl Pruner {
    pub fn new(client: GenerationClient, word_limit: usize) -> Self {
        Self { client, word_limit }
    }

    /// Summarize, then prune. Summarization reads the unpruned list.
    pub async fn finalize(&self, state: &mut ConversationState) {
        self.summarize(state).await;
        state.messages = prune_messages(&state.messages);
    }

    /// Best-effort summary update. Skipped when this turn has no
    /// question/answer pair; a failed or empty reply keeps the old summary.
    pub async fn summarize(&self, state: &mut ConversationState) {
        let Some(human_index) = state.last_human_index() else {
            return;
        };
        let human = &state.messages[human_index];
        let Some(answer) = state.messages[human_index + 1..]
            .iter()
            .rev()
            .find(|m| m.is_assistant_text() && !m.content.trim().is_empty())
        else {
            debug!(session_id = %state.session_id, "No answer this turn, summary unchanged");
            return;
        };

        let prompt = prompts::summary_prompt(&state.summary, &human.content, &answer.content, self.word_limit);

        match self.client.complete(vec![Message::human(prompt)]).await {
            Ok(response) => {
                let summary = response.message.content.trim();
                if summary.is_empty() {
                    warn!(session_id = %state.session_id, "Summary model returned nothing, keeping old summary");
                } else {
                    state.summary = summary.to_string();
                }
            }
            Err(e) => {
                warn!(session_id = %state.session_id, error = %e, "Summary update failed, keeping old summary");
            }
        }
    }
}

/// Keep only the latest human message and the latest assistant text
/// message, in their original order. Idempotent.
pub fn prune_messages(messages: &[Message]) -> Vec<Message> {
    let last_human = messages.iter().rposition(|m| m.role == Role::Human);
    let last_answer = messages.iter().rposition(|m| m.is_assistant_text());

    let mut keep: Vec<usize> = last_human.into_iter().chain(last_answer).collect();
    keep.sort_unstable();
    keep.into_iter().map(|i| messages[i].clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{Scripted, ScriptedProvider};
    use docchat_core::error::ProviderError;
    use docchat_core::message::MessageToolCall;
    use docchat_core::session::Session;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn pruner(provider: Arc<ScriptedProvider>) -> Pruner {
        Pruner::new(GenerationClient::new(provider, "summary-model", 0.0), 300)
    }

    fn finished_turn() -> ConversationState {
        let mut session = Session::new("s1", None);
        session.summary = "User is learning Rust.".into();
        session.retained_messages = vec![Message::human("old q"), Message::assistant("old a")];
        let mut state = ConversationState::begin(&session, "What is borrowing?");
        let call = MessageToolCall {
            id: "c1".into(),
            name: "web_search".into(),
            arguments: "{}".into(),
        };
        state.messages.push(Message::assistant_tool_calls("", vec![call]));
        state.messages.push(Message::tool_result("c1", "results"));
        state.messages.push(Message::assistant("Borrowing lends access without moving."));
        state
    }

    #[test]
    fn prune_keeps_latest_pair() {
        let state = finished_turn();
        let pruned = prune_messages(&state.messages);
        assert_eq!(pruned.len(), 2);
        assert_eq!(pruned[0].content, "What is borrowing?");
        assert_eq!(pruned[1].content, "Borrowing lends access without moving.");
        assert_eq!(prune_messages(&pruned), pruned);
    }

    #[test]
    fn prune_without_answer_keeps_human_and_older_answer() {
        let messages = vec![Message::assistant("earlier"), Message::human("q")];
        let pruned = prune_messages(&messages);
        assert_eq!(pruned, messages);
        assert!(prune_messages(&[]).is_empty());
    }

    fn arb_message() -> impl Strategy<Value = Message> {
        (0u8..4, "[a-z ]{0,12}").prop_map(|(kind, content)| match kind {
            0 => Message::human(content),
            1 => Message::assistant(content),
            2 => Message::assistant_tool_calls(
                "",
                vec![MessageToolCall {
                    id: format!("c_{content}"),
                    name: "web_search".into(),
                    arguments: "{}".into(),
                }],
            ),
            _ => Message::tool_result(format!("c_{content}"), content),
        })
    }

    proptest! {
        #[test]
        fn prune_is_idempotent(messages in proptest::collection::vec(arb_message(), 0..12)) {
            let once = prune_messages(&messages);
            prop_assert_eq!(prune_messages(&once), once.clone());
            prop_assert!(once.len() <= 2);
            prop_assert!(once.iter().all(|m| m.role == Role::Human || m.is_assistant_text()));
        }
    }

    #[tokio::test]
    async fn summary_uses_current_pair() {
        let provider = Arc::new(ScriptedProvider::replies(["  User is learning Rust borrowing.  "]));
        let mut state = finished_turn();
        pruner(provider.clone()).finalize(&mut state).await;

        assert_eq!(state.summary, "User is learning Rust borrowing.");
        assert_eq!(state.messages.len(), 2);

        let prompt = &provider.requests()[0].messages[0].content;
        assert!(prompt.contains("Current Summary: User is learning Rust."));
        assert!(prompt.contains("User said: What is borrowing?"));
        assert!(prompt.contains("AI responded: Borrowing lends access without moving."));
    }

    #[tokio::test]
    async fn no_answer_this_turn_skips_summary() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let mut session = Session::new("s1", None);
        session.retained_messages = vec![Message::human("old q"), Message::assistant("old a")];
        let mut state = ConversationState::begin(&session, "new q");

        pruner(provider.clone()).summarize(&mut state).await;
        assert_eq!(provider.call_count(), 0);
        assert!(state.summary.is_empty());
    }

    #[tokio::test]
    async fn failure_keeps_old_summary() {
        let provider = Arc::new(ScriptedProvider::new(vec![Scripted::Fail(ProviderError::Network("down".into()))]));
        let mut state = finished_turn();
        pruner(provider).finalize(&mut state).await;

        assert_eq!(state.summary, "User is learning Rust.");
        assert_eq!(state.messages.len(), 2);
    }
}
