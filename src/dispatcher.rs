//! One request/response cycle between a user and the completion model.
//!
//! A turn runs on a staged copy of the user's history while the history lock
//! is held. The copy replaces the stored history only when the turn yields a
//! reply, so a failed completion or tool call leaves nothing behind.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info};

use crate::completion::{CompletionClient, CompletionError, CompletionReply};
use crate::conversation::{ConversationEntry, ConversationHistory, ConversationStore, UserId};
use crate::tools::{ToolBox, ToolCall, ToolDefinition, ToolError};

/// Instruction appended verbatim to every user message to cap reply length.
pub const DEFAULT_REPLY_SUFFIX: &str = "回答字數限制在1000以內";

/// Default bound on each completion or tool call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that end a turn without a reply.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Nothing to send to the model.
    #[error("message text is empty")]
    EmptyMessage,
    /// Completion API failure.
    #[error("completion failed: {0}")]
    Completion(#[from] CompletionError),
    /// Tool validation or invocation failure.
    #[error("tool call failed: {0}")]
    Tool(#[from] ToolError),
    /// An external call did not finish in time.
    #[error("{stage} timed out after {millis}ms")]
    Timeout {
        /// Which call timed out.
        stage: &'static str,
        /// Configured bound, in milliseconds.
        millis: u64,
    },
    /// The model asked for a second tool call in the same turn.
    #[error("model requested another tool call ({0}) after the tool result")]
    UnexpectedToolCall(String),
    /// Tool result could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience result alias for dispatcher operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Dispatcher settings.
#[derive(Clone, Debug)]
pub struct DispatcherConfig {
    /// Suffix appended to each user message.
    pub reply_suffix: String,
    /// Bound applied to each completion and tool call.
    pub call_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            reply_suffix: DEFAULT_REPLY_SUFFIX.to_string(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

/// Drives a user message through the completion model and records the turn.
pub struct CompletionDispatcher {
    store: Arc<dyn ConversationStore>,
    completion: Arc<dyn CompletionClient>,
    tools: Option<Arc<dyn ToolBox>>,
    config: DispatcherConfig,
}

impl CompletionDispatcher {
    /// Create a dispatcher. Pass `None` for `tools` to disable tool calling.
    #[must_use]
    pub fn new(
        store: Arc<dyn ConversationStore>,
        completion: Arc<dyn CompletionClient>,
        tools: Option<Arc<dyn ToolBox>>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            store,
            completion,
            tools,
            config,
        }
    }

    /// Handle one text message and return the assistant's reply.
    ///
    /// Turns for the same user run one at a time.
    ///
    /// # Errors
    /// Returns an error if the text is empty or any external call fails. The
    /// user's history is unchanged in that case.
    pub async fn handle(&self, user_id: &UserId, text: &str) -> DispatchResult<String> {
        if text.trim().is_empty() {
            return Err(DispatchError::EmptyMessage);
        }

        let shared = self.store.get_or_create(user_id).await;
        let mut history = shared.lock().await;

        let mut staged = history.clone();
        staged.push(ConversationEntry::user(format!(
            "{text}{}",
            self.config.reply_suffix
        )));

        match self.run_turn(&mut staged).await {
            Ok(reply) => {
                *history = staged;
                info!(
                    "Completed turn for user {} ({} entries)",
                    user_id,
                    history.len()
                );
                Ok(reply)
            }
            Err(err) => {
                error!("Turn failed for user {}: {}", user_id, err);
                Err(err)
            }
        }
    }

    async fn run_turn(&self, staged: &mut ConversationHistory) -> DispatchResult<String> {
        let definitions = self
            .tools
            .as_ref()
            .map(|tools| tools.definitions())
            .unwrap_or_default();

        let reply = match self.complete(staged, &definitions, "completion").await? {
            CompletionReply::Message(text) => text,
            CompletionReply::ToolCall(request) => {
                let tools = self
                    .tools
                    .as_ref()
                    .ok_or_else(|| ToolError::UnknownTool(request.name.clone()))?;
                let call = ToolCall::parse(&request)?;
                let name = call.name();
                debug!("Dispatching tool {}", name);

                let result = tokio::time::timeout(self.config.call_timeout, tools.invoke(call))
                    .await
                    .map_err(|_| self.timeout("tool call"))??;
                staged.push(ConversationEntry::tool(name, serde_json::to_string(&result)?));

                match self.complete(staged, &[], "final completion").await? {
                    CompletionReply::Message(text) => text,
                    CompletionReply::ToolCall(again) => {
                        return Err(DispatchError::UnexpectedToolCall(again.name));
                    }
                }
            }
        };

        staged.push(ConversationEntry::assistant(reply.clone()));
        Ok(reply)
    }

    async fn complete(
        &self,
        staged: &ConversationHistory,
        definitions: &[ToolDefinition],
        stage: &'static str,
    ) -> DispatchResult<CompletionReply> {
        let reply = tokio::time::timeout(
            self.config.call_timeout,
            self.completion.complete(staged.entries(), definitions),
        )
        .await
        .map_err(|_| self.timeout(stage))??;
        Ok(reply)
    }

    fn timeout(&self, stage: &'static str) -> DispatchError {
        DispatchError::Timeout {
            stage,
            millis: u64::try_from(self.config.call_timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use crate::completion::{CompletionFuture, CompletionResult};
    use crate::conversation::{InMemoryConversationStore, Role};
    use crate::tools::{
        GET_CURRENT_WEATHER, ToolCallRequest, ToolFuture, ToolResult, weather_definition,
    };

    /// Completion double that replays scripted replies and records requests.
    #[derive(Default)]
    struct ScriptedCompletion {
        replies: Mutex<VecDeque<CompletionResult<CompletionReply>>>,
        requests: Mutex<Vec<(Vec<ConversationEntry>, usize)>>,
    }

    impl ScriptedCompletion {
        fn new(replies: Vec<CompletionResult<CompletionReply>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<(Vec<ConversationEntry>, usize)> {
            self.requests.lock().map(|r| r.clone()).unwrap_or_default()
        }
    }

    impl CompletionClient for ScriptedCompletion {
        fn complete<'a>(
            &'a self,
            messages: &'a [ConversationEntry],
            tools: &'a [ToolDefinition],
        ) -> CompletionFuture<'a, CompletionResult<CompletionReply>> {
            if let Ok(mut requests) = self.requests.lock() {
                requests.push((messages.to_vec(), tools.len()));
            }
            let next = self
                .replies
                .lock()
                .ok()
                .and_then(|mut replies| replies.pop_front())
                .unwrap_or_else(|| {
                    Err(CompletionError::MalformedResponse("script exhausted".to_string()))
                });
            Box::pin(async move { next })
        }
    }

    /// Completion double that never answers.
    struct StalledCompletion;

    impl CompletionClient for StalledCompletion {
        fn complete<'a>(
            &'a self,
            _messages: &'a [ConversationEntry],
            _tools: &'a [ToolDefinition],
        ) -> CompletionFuture<'a, CompletionResult<CompletionReply>> {
            Box::pin(std::future::pending())
        }
    }

    /// Weather double returning a fixed report.
    #[derive(Default)]
    struct FakeWeather {
        calls: Mutex<Vec<ToolCall>>,
        fail: bool,
    }

    impl ToolBox for FakeWeather {
        fn definitions(&self) -> Vec<ToolDefinition> {
            vec![weather_definition()]
        }

        fn invoke(&self, call: ToolCall) -> ToolFuture<'_, ToolResult<serde_json::Value>> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(call.clone());
            }
            let fail = self.fail;
            Box::pin(async move {
                if fail {
                    return Err(ToolError::Status {
                        status: 503,
                        body: "unavailable".to_string(),
                    });
                }
                let ToolCall::GetCurrentWeather(args) = call;
                Ok(serde_json::json!({
                    "location": args.location,
                    "temperature": 18.0,
                    "description": "broken clouds",
                    "units": args.unit.as_str()
                }))
            })
        }
    }

    fn message(text: &str) -> CompletionResult<CompletionReply> {
        Ok(CompletionReply::Message(text.to_string()))
    }

    fn weather_call(location: &str) -> CompletionResult<CompletionReply> {
        Ok(CompletionReply::ToolCall(ToolCallRequest {
            name: GET_CURRENT_WEATHER.to_string(),
            arguments: serde_json::json!({ "location": location }),
        }))
    }

    fn dispatcher(
        completion: Arc<dyn CompletionClient>,
        tools: Option<Arc<dyn ToolBox>>,
    ) -> (CompletionDispatcher, Arc<InMemoryConversationStore>) {
        dispatcher_with_window(completion, tools, 4)
    }

    fn dispatcher_with_window(
        completion: Arc<dyn CompletionClient>,
        tools: Option<Arc<dyn ToolBox>>,
        max_len: usize,
    ) -> (CompletionDispatcher, Arc<InMemoryConversationStore>) {
        let store = Arc::new(InMemoryConversationStore::new("persona", max_len));
        let dispatcher = CompletionDispatcher::new(
            Arc::clone(&store) as Arc<dyn ConversationStore>,
            completion,
            tools,
            DispatcherConfig {
                reply_suffix: " (short)".to_string(),
                call_timeout: Duration::from_millis(200),
            },
        );
        (dispatcher, store)
    }

    fn summary(entries: &[ConversationEntry]) -> Vec<(Role, String)> {
        entries
            .iter()
            .map(|e| (e.role(), e.content().to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_fresh_user_turn_records_three_entries() {
        let completion = ScriptedCompletion::new(vec![message("Hello there")]);
        let (dispatcher, store) = dispatcher(completion.clone(), None);
        let user = UserId::from("U1");

        let reply = dispatcher.handle(&user, "Hi").await.ok();
        assert_eq!(reply.as_deref(), Some("Hello there"));

        let entries = store.snapshot(&user).await.unwrap_or_default();
        assert_eq!(
            summary(&entries),
            vec![
                (Role::System, "persona".to_string()),
                (Role::User, "Hi (short)".to_string()),
                (Role::Assistant, "Hello there".to_string()),
            ]
        );

        let requests = completion.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0.len(), 2);
        assert_eq!(requests[0].1, 0);
    }

    #[tokio::test]
    async fn test_full_window_evicts_oldest_non_system_entry() {
        let completion = ScriptedCompletion::new(vec![message("a1"), message("a2")]);
        let (dispatcher, store) = dispatcher(completion, None);
        let user = UserId::from("U1");

        assert!(dispatcher.handle(&user, "u1").await.is_ok());
        assert!(dispatcher.handle(&user, "u2").await.is_ok());

        let entries = store.snapshot(&user).await.unwrap_or_default();
        assert_eq!(
            summary(&entries),
            vec![
                (Role::System, "persona".to_string()),
                (Role::Assistant, "a1".to_string()),
                (Role::User, "u2 (short)".to_string()),
                (Role::Assistant, "a2".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_window_bound_and_system_entry_hold_over_many_turns() {
        let replies = (0..20).map(|i| message(&format!("a{i}"))).collect();
        let completion = ScriptedCompletion::new(replies);
        let (dispatcher, store) = dispatcher(completion, None);
        let user = UserId::from("U1");

        for i in 0..20 {
            assert!(dispatcher.handle(&user, &format!("u{i}")).await.is_ok());
            let entries = store.snapshot(&user).await.unwrap_or_default();
            assert!(entries.len() <= 4);
            assert_eq!(entries[0].role(), Role::System);
            assert_eq!(entries[0].content(), "persona");
        }
    }

    #[tokio::test]
    async fn test_tool_round_trip_performs_second_completion() {
        let completion = ScriptedCompletion::new(vec![
            weather_call("Tokyo"),
            message("It is 18°C with broken clouds in Tokyo."),
        ]);
        let weather = Arc::new(FakeWeather::default());
        let (dispatcher, store) = dispatcher(completion.clone(), Some(weather.clone()));
        let user = UserId::from("U1");

        let reply = dispatcher
            .handle(&user, "What's the weather in Tokyo?")
            .await
            .unwrap_or_default();
        assert_eq!(reply, "It is 18°C with broken clouds in Tokyo.");
        assert!(!reply.contains('{'));

        let calls = weather.calls.lock().map(|c| c.clone()).unwrap_or_default();
        assert_eq!(calls.len(), 1);
        assert!(matches!(&calls[0], ToolCall::GetCurrentWeather(args) if args.location == "Tokyo"));

        let requests = completion.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].1, 1);
        assert_eq!(requests[1].1, 0);
        let last_sent = requests[1].0.last().map(ConversationEntry::role);
        assert_eq!(last_sent, Some(Role::Tool));

        let entries = store.snapshot(&user).await.unwrap_or_default();
        let roles: Vec<Role> = entries.iter().map(ConversationEntry::role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Tool, Role::Assistant]);
        assert_eq!(entries[2].tool_name(), Some(GET_CURRENT_WEATHER));
        assert!(entries[2].content().contains("broken clouds"));
    }

    #[tokio::test]
    async fn test_tool_turn_from_full_window_keeps_question_in_context() {
        let completion = ScriptedCompletion::new(vec![
            message("a1"),
            weather_call("Tokyo"),
            message("Cloudy in Tokyo."),
        ]);
        let weather = Arc::new(FakeWeather::default());
        let (dispatcher, store) = dispatcher(completion.clone(), Some(weather));
        let user = UserId::from("U1");

        assert!(dispatcher.handle(&user, "u1").await.is_ok());
        assert!(dispatcher.handle(&user, "weather in Tokyo?").await.is_ok());

        let requests = completion.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(
            summary(&requests[2].0),
            vec![
                (Role::System, "persona".to_string()),
                (Role::Assistant, "a1".to_string()),
                (Role::User, "weather in Tokyo? (short)".to_string()),
                (Role::Tool, requests[2].0[3].content().to_string()),
            ]
        );

        let entries = store.snapshot(&user).await.unwrap_or_default();
        let roles: Vec<Role> = entries.iter().map(ConversationEntry::role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Tool, Role::Assistant]);
        assert_eq!(entries[1].content(), "weather in Tokyo? (short)");
    }

    #[tokio::test]
    async fn test_tool_turn_in_smallest_window_keeps_question_in_context() {
        let completion = ScriptedCompletion::new(vec![
            weather_call("Tokyo"),
            message("Cloudy in Tokyo."),
        ]);
        let weather = Arc::new(FakeWeather::default());
        let (dispatcher, store) = dispatcher_with_window(completion.clone(), Some(weather), 2);
        let user = UserId::from("U1");

        let reply = dispatcher.handle(&user, "weather in Tokyo?").await.ok();
        assert_eq!(reply.as_deref(), Some("Cloudy in Tokyo."));

        let requests = completion.requests();
        assert_eq!(requests.len(), 2);
        let roles: Vec<Role> = requests[1].0.iter().map(ConversationEntry::role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Tool]);

        let entries = store.snapshot(&user).await.unwrap_or_default();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].role(), Role::System);
    }

    #[tokio::test]
    async fn test_completion_failure_leaves_history_unchanged() {
        let completion = ScriptedCompletion::new(vec![
            message("first"),
            Err(CompletionError::Status {
                status: 500,
                body: "boom".to_string(),
            }),
        ]);
        let (dispatcher, store) = dispatcher(completion, None);
        let user = UserId::from("U1");

        assert!(dispatcher.handle(&user, "hello").await.is_ok());
        let before = store.snapshot(&user).await;

        let result = dispatcher.handle(&user, "again").await;
        assert!(matches!(result, Err(DispatchError::Completion(_))));
        assert_eq!(store.snapshot(&user).await, before);
    }

    #[tokio::test]
    async fn test_tool_failure_leaves_history_unchanged() {
        let completion = ScriptedCompletion::new(vec![weather_call("Tokyo")]);
        let weather = Arc::new(FakeWeather {
            calls: Mutex::new(Vec::new()),
            fail: true,
        });
        let (dispatcher, store) = dispatcher(completion, Some(weather));
        let user = UserId::from("U1");

        let result = dispatcher.handle(&user, "weather?").await;
        assert!(matches!(result, Err(DispatchError::Tool(ToolError::Status { .. }))));
        assert_eq!(store.snapshot(&user).await.map(|e| e.len()), Some(1));
    }

    #[tokio::test]
    async fn test_tool_call_without_tool_box_is_rejected() {
        let completion = ScriptedCompletion::new(vec![weather_call("Tokyo")]);
        let (dispatcher, _store) = dispatcher(completion, None);

        let result = dispatcher.handle(&UserId::from("U1"), "weather?").await;
        assert!(matches!(result, Err(DispatchError::Tool(ToolError::UnknownTool(_)))));
    }

    #[tokio::test]
    async fn test_second_tool_call_is_rejected() {
        let completion = ScriptedCompletion::new(vec![weather_call("Tokyo"), weather_call("Osaka")]);
        let weather = Arc::new(FakeWeather::default());
        let (dispatcher, store) = dispatcher(completion, Some(weather));
        let user = UserId::from("U1");

        let result = dispatcher.handle(&user, "weather?").await;
        assert!(matches!(result, Err(DispatchError::UnexpectedToolCall(name)) if name == GET_CURRENT_WEATHER));
        assert_eq!(store.snapshot(&user).await.map(|e| e.len()), Some(1));
    }

    #[tokio::test]
    async fn test_stalled_completion_times_out() {
        let (dispatcher, store) = dispatcher(Arc::new(StalledCompletion), None);
        let user = UserId::from("U1");

        let result = dispatcher.handle(&user, "hello").await;
        assert!(matches!(
            result,
            Err(DispatchError::Timeout {
                stage: "completion",
                millis: 200
            })
        ));
        assert_eq!(
            result.map_err(|e| e.to_string()).err().as_deref(),
            Some("completion timed out after 200ms")
        );
        assert_eq!(store.snapshot(&user).await.map(|e| e.len()), Some(1));
    }

    #[tokio::test]
    async fn test_empty_message_is_rejected_before_any_call() {
        let completion = ScriptedCompletion::new(vec![]);
        let (dispatcher, store) = dispatcher(completion.clone(), None);

        let result = dispatcher.handle(&UserId::from("U1"), "   ").await;
        assert!(matches!(result, Err(DispatchError::EmptyMessage)));
        assert!(completion.requests().is_empty());
        assert_eq!(store.user_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_turns_for_one_user_are_serialized() {
        let replies = (0..8).map(|i| message(&format!("a{i}"))).collect();
        let completion = ScriptedCompletion::new(replies);
        let (dispatcher, store) = dispatcher(completion, None);
        let dispatcher = Arc::new(dispatcher);
        let user = UserId::from("U1");

        let mut handles = Vec::new();
        for i in 0..8 {
            let dispatcher = Arc::clone(&dispatcher);
            let user = user.clone();
            handles.push(tokio::spawn(async move {
                dispatcher.handle(&user, &format!("u{i}")).await.is_ok()
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.ok(), Some(true));
        }

        let entries = store.snapshot(&user).await.unwrap_or_default();
        let roles: Vec<Role> = entries.iter().map(ConversationEntry::role).collect();
        assert_eq!(roles, vec![Role::System, Role::Assistant, Role::User, Role::Assistant]);
    }
}
