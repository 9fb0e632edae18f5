//! The chat agent and its invocation pipeline.
//!
//! A [`ChatAgent`] binds a name, default options, a [`ChatClient`], and an
//! optional provider stack. Each run executes the same pipeline:
//!
//! 1. Merge per-run options into the agent defaults.
//! 2. Let the history provider (or the session's local store) produce the
//!    merged message sequence.
//! 3. Fold the [`AiContext`] through every context provider.
//! 4. Issue the chat request.
//! 5. On success, notify history then context providers with the exchange.
//! 6. On failure, notify providers with the error instead.
//! 7. Reconcile the conversation id: a service-assigned id pins the session
//!    to the service-backed discipline; absent an id and any provider, a
//!    default in-memory store is installed so later runs retain context.

use crate::client::{ChatClient, ChatOptions, ChatResponse, ChatResponseUpdate, UsageStats};
use crate::error::{AgentError, Result};
use crate::messages::ChatMessage;
use crate::providers::{validate_state_keys, AiContext, ChatHistoryProvider, ContextProvider};
use crate::session::{AgentSession, ChatMessageStore, InMemoryChatMessageStore};
use futures::StreamExt;
use std::sync::Arc;

/// Result of one agent run.
#[derive(Debug, Clone, Default)]
pub struct AgentRunResponse {
    /// The response messages, author-stamped with the agent's name.
    pub messages: Vec<ChatMessage>,
    /// Token usage, when the provider reported it.
    pub usage: Option<UsageStats>,
}

impl AgentRunResponse {
    /// Concatenated text of the response messages.
    pub fn text(&self) -> String {
        self.messages
            .iter()
            .map(ChatMessage::text)
            .collect::<Vec<_>>()
            .join("")
    }
}

/// An AI agent over a chat client.
pub struct ChatAgent {
    name: String,
    description: Option<String>,
    client: Arc<dyn ChatClient>,
    default_options: ChatOptions,
    history_provider: Option<Arc<dyn ChatHistoryProvider>>,
    context_providers: Vec<Arc<dyn ContextProvider>>,
}

impl ChatAgent {
    /// Start building an agent.
    pub fn builder(name: impl Into<String>, client: Arc<dyn ChatClient>) -> ChatAgentBuilder {
        ChatAgentBuilder {
            name: name.into(),
            description: None,
            client,
            default_options: ChatOptions::default(),
            history_provider: None,
            context_providers: Vec::new(),
        }
    }

    /// The agent's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The agent's description, if any.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// The agent's default chat options.
    pub fn default_options(&self) -> &ChatOptions {
        &self.default_options
    }

    /// Run the agent once against a session.
    pub async fn run(
        &self,
        input: Vec<ChatMessage>,
        session: &mut AgentSession,
        options: Option<&ChatOptions>,
    ) -> Result<AgentRunResponse> {
        let (request_messages, context, options) = self.prepare(input, session, options).await?;

        match self.client.respond(context.messages.clone(), &options).await {
            Ok(response) => {
                self.finish_success(session, &request_messages, response)
                    .await
            }
            Err(error) => {
                self.notify_failure(session, &error).await;
                Err(error)
            }
        }
    }

    /// Run the agent once, forwarding each streamed update to `on_update`
    /// before returning the accumulated response.
    pub async fn run_streaming<F>(
        &self,
        input: Vec<ChatMessage>,
        session: &mut AgentSession,
        options: Option<&ChatOptions>,
        mut on_update: F,
    ) -> Result<AgentRunResponse>
    where
        F: FnMut(&ChatResponseUpdate) + Send,
    {
        let (request_messages, context, options) = self.prepare(input, session, options).await?;

        let mut stream = match self
            .client
            .respond_streaming(context.messages.clone(), &options)
            .await
        {
            Ok(stream) => stream,
            Err(error) => {
                self.notify_failure(session, &error).await;
                return Err(error);
            }
        };

        let mut updates = Vec::new();
        while let Some(update) = stream.next().await {
            match update {
                Ok(update) => {
                    on_update(&update);
                    updates.push(update);
                }
                Err(error) => {
                    self.notify_failure(session, &error).await;
                    return Err(error);
                }
            }
        }

        self.finish_success(session, &request_messages, ChatResponse::from_updates(updates))
            .await
    }

    /// Pipeline steps 1-3: merge options, merge history, fold providers.
    async fn prepare(
        &self,
        input: Vec<ChatMessage>,
        session: &mut AgentSession,
        options: Option<&ChatOptions>,
    ) -> Result<(Vec<ChatMessage>, AiContext, ChatOptions)> {
        let mut options = ChatOptions::merged(&self.default_options, options);
        let request_messages = input.clone();

        let messages = if let Some(history) = &self.history_provider {
            history.provide(session, input).await?
        } else if let Some(store) = session.message_store() {
            let mut merged = store.messages().await?;
            merged.extend(input);
            merged
        } else {
            input
        };

        let mut context = AiContext {
            instructions: options.instructions.clone(),
            messages,
            tools: options.tools.clone(),
        };
        for provider in &self.context_providers {
            context = provider.invoking(session, context).await?;
        }

        options.instructions = context.instructions.clone();
        options.tools = context.tools.clone();
        if let Some(conversation_id) = session.conversation_id() {
            options.conversation_id = Some(conversation_id.to_string());
        }

        Ok((request_messages, context, options))
    }

    /// Pipeline steps 5 and 7 for a successful response.
    async fn finish_success(
        &self,
        session: &mut AgentSession,
        request_messages: &[ChatMessage],
        mut response: ChatResponse,
    ) -> Result<AgentRunResponse> {
        for message in &mut response.messages {
            if message.author_name.is_none() {
                message.author_name = Some(self.name.clone());
            }
        }

        if let Some(history) = &self.history_provider {
            history
                .on_success(session, request_messages, &response.messages)
                .await?;
        } else if let Some(store) = session.message_store() {
            let mut exchange = request_messages.to_vec();
            exchange.extend(response.messages.iter().cloned());
            store.add_messages(exchange).await?;
        }
        for provider in &self.context_providers {
            provider
                .on_success(session, request_messages, &response.messages)
                .await?;
        }

        match &response.conversation_id {
            Some(conversation_id) => {
                if self.history_provider.is_some() {
                    return Err(AgentError::configuration(
                        "service assigned a conversation id while a chat-history provider is active",
                    ));
                }
                session.set_conversation_id(conversation_id.clone())?;
            }
            None => {
                if session.conversation_id().is_none()
                    && session.message_store().is_none()
                    && self.history_provider.is_none()
                {
                    let store = InMemoryChatMessageStore::new();
                    let mut exchange = request_messages.to_vec();
                    exchange.extend(response.messages.iter().cloned());
                    store.add_messages(exchange).await?;
                    session.set_message_store(Arc::new(store))?;
                }
            }
        }

        Ok(AgentRunResponse {
            messages: response.messages,
            usage: response.usage,
        })
    }

    /// Pipeline step 6: notify providers of a failed request.
    async fn notify_failure(&self, session: &mut AgentSession, error: &AgentError) {
        if let Some(history) = &self.history_provider {
            if let Err(notify_error) = history.on_failure(session, error).await {
                tracing::warn!(
                    agent = %self.name,
                    error = %notify_error,
                    "history provider failed while handling a client error"
                );
            }
        }
        for provider in &self.context_providers {
            if let Err(notify_error) = provider.on_failure(session, error).await {
                tracing::warn!(
                    agent = %self.name,
                    state_key = provider.state_key(),
                    error = %notify_error,
                    "context provider failed while handling a client error"
                );
            }
        }
    }
}

impl std::fmt::Debug for ChatAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatAgent")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("context_providers", &self.context_providers.len())
            .field("has_history_provider", &self.history_provider.is_some())
            .finish()
    }
}

/// Builder for [`ChatAgent`]. Provider state-key uniqueness is validated at
/// [`build`](ChatAgentBuilder::build).
pub struct ChatAgentBuilder {
    name: String,
    description: Option<String>,
    client: Arc<dyn ChatClient>,
    default_options: ChatOptions,
    history_provider: Option<Arc<dyn ChatHistoryProvider>>,
    context_providers: Vec<Arc<dyn ContextProvider>>,
}

impl ChatAgentBuilder {
    /// Set the agent description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the agent's default system instructions.
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.default_options.instructions = Some(instructions.into());
        self
    }

    /// Replace the agent's default chat options.
    pub fn default_options(mut self, options: ChatOptions) -> Self {
        self.default_options = options;
        self
    }

    /// Attach the chat-history provider (at most one per agent).
    pub fn history_provider(mut self, provider: Arc<dyn ChatHistoryProvider>) -> Self {
        self.history_provider = Some(provider);
        self
    }

    /// Attach a context provider; order of attachment is invocation order.
    pub fn context_provider(mut self, provider: Arc<dyn ContextProvider>) -> Self {
        self.context_providers.push(provider);
        self
    }

    /// Validate and build the agent.
    pub fn build(self) -> Result<ChatAgent> {
        if self.name.is_empty() {
            return Err(AgentError::configuration("agent name must not be empty"));
        }
        let history_key = self.history_provider.as_ref().map(|p| p.state_key());
        validate_state_keys(
            history_key
                .into_iter()
                .chain(self.context_providers.iter().map(|p| p.state_key())),
        )?;

        Ok(ChatAgent {
            name: self.name,
            description: self.description,
            client: self.client,
            default_options: self.default_options,
            history_provider: self.history_provider,
            context_providers: self.context_providers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::InMemoryHistoryProvider;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Client that echoes the last user text and records the request size.
    struct EchoClient {
        seen_messages: AtomicUsize,
        conversation_id: Option<String>,
    }

    impl EchoClient {
        fn new() -> Self {
            Self {
                seen_messages: AtomicUsize::new(0),
                conversation_id: None,
            }
        }

        fn with_conversation_id(id: &str) -> Self {
            Self {
                seen_messages: AtomicUsize::new(0),
                conversation_id: Some(id.to_string()),
            }
        }
    }

    #[async_trait]
    impl ChatClient for EchoClient {
        async fn respond(
            &self,
            messages: Vec<ChatMessage>,
            _options: &ChatOptions,
        ) -> Result<ChatResponse> {
            self.seen_messages.store(messages.len(), Ordering::SeqCst);
            let last = messages.last().map(ChatMessage::text).unwrap_or_default();
            let mut response = ChatResponse::from_text(format!("echo: {last}"));
            response.conversation_id = self.conversation_id.clone();
            Ok(response)
        }
    }

    #[tokio::test]
    async fn first_run_installs_a_default_store_for_later_context() {
        let client = Arc::new(EchoClient::new());
        let agent = ChatAgent::builder("echo", client.clone()).build().unwrap();
        let mut session = AgentSession::new();

        let response = agent
            .run(vec![ChatMessage::user("one")], &mut session, None)
            .await
            .unwrap();
        assert_eq!(response.text(), "echo: one");
        assert_eq!(response.messages[0].author_name.as_deref(), Some("echo"));
        assert!(session.message_store().is_some());

        agent
            .run(vec![ChatMessage::user("two")], &mut session, None)
            .await
            .unwrap();
        // history (user + reply) + new input
        assert_eq!(client.seen_messages.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn service_assigned_conversation_id_pins_the_session() {
        let agent = ChatAgent::builder("svc", Arc::new(EchoClient::with_conversation_id("conv-9")))
            .build()
            .unwrap();
        let mut session = AgentSession::new();

        agent
            .run(vec![ChatMessage::user("hello")], &mut session, None)
            .await
            .unwrap();
        assert_eq!(session.conversation_id(), Some("conv-9"));
        assert!(session.message_store().is_none());
    }

    #[tokio::test]
    async fn conversation_id_with_history_provider_is_a_hard_error() {
        let agent = ChatAgent::builder("svc", Arc::new(EchoClient::with_conversation_id("conv-9")))
            .history_provider(Arc::new(InMemoryHistoryProvider::new()))
            .build()
            .unwrap();
        let mut session = AgentSession::new();

        let err = agent
            .run(vec![ChatMessage::user("hello")], &mut session, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Configuration(_)));
    }

    #[tokio::test]
    async fn duplicate_provider_state_keys_fail_at_build() {
        struct KeyedProvider(&'static str);

        #[async_trait]
        impl ContextProvider for KeyedProvider {
            fn state_key(&self) -> &str {
                self.0
            }
            async fn invoking(
                &self,
                _session: &mut AgentSession,
                context: AiContext,
            ) -> Result<AiContext> {
                Ok(context)
            }
        }

        let err = ChatAgent::builder("dup", Arc::new(EchoClient::new()))
            .context_provider(Arc::new(KeyedProvider("memory")))
            .context_provider(Arc::new(KeyedProvider("memory")))
            .build()
            .unwrap_err();
        assert!(matches!(err, AgentError::Configuration(_)));
    }

    #[tokio::test]
    async fn context_providers_shape_the_request_and_persist_state() {
        use serde_json::Value;

        struct FactsProvider;

        #[async_trait]
        impl ContextProvider for FactsProvider {
            fn state_key(&self) -> &str {
                "facts"
            }
            async fn invoking(
                &self,
                session: &mut AgentSession,
                mut context: AiContext,
            ) -> Result<AiContext> {
                let count = session
                    .get_state("facts")
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                context.instructions = Some(format!(
                    "{}\nKnown facts: {count}",
                    context.instructions.as_deref().unwrap_or_default()
                ));
                Ok(context)
            }
            async fn on_success(
                &self,
                session: &mut AgentSession,
                _request: &[ChatMessage],
                _response: &[ChatMessage],
            ) -> Result<()> {
                let count = session
                    .get_state("facts")
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                session.set_state("facts", serde_json::json!(count + 1));
                Ok(())
            }
        }

        let agent = ChatAgent::builder("ctx", Arc::new(EchoClient::new()))
            .instructions("Base.")
            .context_provider(Arc::new(FactsProvider))
            .build()
            .unwrap();
        let mut session = AgentSession::new();

        agent
            .run(vec![ChatMessage::user("hi")], &mut session, None)
            .await
            .unwrap();
        assert_eq!(session.get_state("facts").unwrap(), &serde_json::json!(1));
    }

    #[tokio::test]
    async fn failures_notify_providers_and_propagate() {
        struct FailingClient;

        #[async_trait]
        impl ChatClient for FailingClient {
            async fn respond(
                &self,
                _messages: Vec<ChatMessage>,
                _options: &ChatOptions,
            ) -> Result<ChatResponse> {
                Err(AgentError::client("upstream unavailable"))
            }
        }

        struct ObservingProvider(Arc<AtomicBool>);

        #[async_trait]
        impl ContextProvider for ObservingProvider {
            fn state_key(&self) -> &str {
                "observer"
            }
            async fn invoking(
                &self,
                _session: &mut AgentSession,
                context: AiContext,
            ) -> Result<AiContext> {
                Ok(context)
            }
            async fn on_failure(
                &self,
                _session: &mut AgentSession,
                _error: &AgentError,
            ) -> Result<()> {
                self.0.store(true, Ordering::SeqCst);
                Ok(())
            }
        }

        let notified = Arc::new(AtomicBool::new(false));
        let agent = ChatAgent::builder("failing", Arc::new(FailingClient))
            .context_provider(Arc::new(ObservingProvider(notified.clone())))
            .build()
            .unwrap();
        let mut session = AgentSession::new();

        let err = agent
            .run(vec![ChatMessage::user("hi")], &mut session, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Client(_)));
        assert!(notified.load(Ordering::SeqCst));
    }
}
