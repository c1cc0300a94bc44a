//! Agent Loop - the core of the transit assistant.
//!
//! The Agent drives the conversation between the user, the planner (a
//! language model) and the transit tools:
//!
//! ```text
//! User Input
//!     |
//!     v
//! +---------+     +-----+     +------------+
//! | Planner |<--->|Agent|<--->| Dispatcher |
//! +---------+     +-----+     +------------+
//!     |              |
//!     v              v
//! Text Reply    Tool Results
//! ```
//!
//! The loop continues until the planner returns a text response (no tool
//! calls) or the turn budget is spent. Each request owns its transcript
//! and budget; the Agent itself is read-only and shared across requests.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use futures_util::future::join_all;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::{AppConfig, ServicesConfig};
use crate::llm::{self, LlmProvider};
use crate::policy;
use crate::services::google::GoogleDirections;
use crate::services::sncf::SncfClient;
use crate::services::store::SupabaseStore;
use crate::tools::ToolDispatcher;
use crate::types::{ChatRequest, ChatResponse, Message, ToolChoice};

/// Per-request knobs, resolved once from the config.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub model: String,
    pub system_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub max_tool_rounds: u32,
    pub planner_timeout: Option<Duration>,
    pub empty_reply_fallback: String,
    pub budget_exhausted_fallback: String,
}

impl AgentSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            model: config.llm.model.clone(),
            system_prompt: config.agent.system_prompt.clone(),
            max_tokens: config.llm.max_tokens,
            temperature: config.llm.temperature,
            max_tool_rounds: config.agent.max_tool_rounds,
            planner_timeout: config.agent.planner_timeout(),
            empty_reply_fallback: config.agent.empty_reply_fallback.clone(),
            budget_exhausted_fallback: config.agent.budget_exhausted_fallback.clone(),
        }
    }
}

/// Counts planner rounds that produced tool calls.
#[derive(Debug, Clone, Copy)]
pub struct TurnBudget {
    used: u32,
    ceiling: u32,
}

impl TurnBudget {
    /// A ceiling of zero is raised to one so the planner is asked at least once.
    pub fn new(ceiling: u32) -> Self {
        Self {
            used: 0,
            ceiling: ceiling.max(1),
        }
    }

    pub fn consume(&mut self) {
        self.used = self.used.saturating_add(1);
    }

    pub fn is_exhausted(&self) -> bool {
        self.used >= self.ceiling
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }
}

/// How a request ended. None of these is a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The planner produced a text answer.
    Answered,
    /// The planner answered with no text; the fallback was substituted.
    EmptyAnswer,
    /// The planner kept calling tools until the budget ran out.
    BudgetExhausted,
}

#[derive(Debug, Clone)]
pub struct Reply {
    pub text: String,
    pub termination: Termination,
    pub tool_rounds: u32,
    /// Everything sent to or received from the planner, in order.
    pub transcript: Vec<Message>,
}

pub struct Agent {
    llm: Arc<dyn LlmProvider>,
    dispatcher: Arc<ToolDispatcher>,
    settings: AgentSettings,
}

impl Agent {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        dispatcher: Arc<ToolDispatcher>,
        settings: AgentSettings,
    ) -> Self {
        Self {
            llm,
            dispatcher,
            settings,
        }
    }

    /// Wire the configured planner and the HTTP collaborators.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("smartmove/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        let llm = llm::create_provider(config, client.clone())?;

        let services = &config.services;
        let store = SupabaseStore::new(
            services.supabase_url(),
            ServicesConfig::secret(&services.supabase_key_env),
            client.clone(),
        );
        let directions = GoogleDirections::new(
            ServicesConfig::secret(&services.google_maps_key_env),
            services.google_directions_url.clone(),
            client.clone(),
        );
        let rail = SncfClient::new(
            ServicesConfig::secret(&services.sncf_key_env),
            services.sncf_api_base.clone(),
            client,
        );

        let mut dispatcher =
            ToolDispatcher::new(Arc::new(store), Arc::new(directions), Arc::new(rail));
        if let Some(limit) = config.agent.tool_timeout() {
            dispatcher = dispatcher.with_timeout(limit);
        }
        dispatcher.registry().check_consistency()?;

        info!(planner = llm.name(), model = %config.llm.model, tools = dispatcher.registry().len(), "agent ready");
        Ok(Self::new(llm, Arc::new(dispatcher), AgentSettings::from_config(config)))
    }

    pub fn dispatcher(&self) -> &ToolDispatcher {
        &self.dispatcher
    }

    /// Answer one user message given the prior conversation.
    ///
    /// Only planner failures (unreachable, malformed reply, timeout) are
    /// errors. Tool failures are fed back to the planner as content, and
    /// running out of budget ends the request with the fallback text.
    pub async fn process_message(&self, history: &[Message], user_input: &str) -> Result<Reply> {
        let span = info_span!("chat", request_id = %Uuid::new_v4());
        self.run(history, user_input).instrument(span).await
    }

    async fn run(&self, history: &[Message], user_input: &str) -> Result<Reply> {
        let mut transcript = Vec::with_capacity(history.len() + 2);
        transcript.push(Message::system(&self.settings.system_prompt));
        transcript.extend(history.iter().cloned());
        transcript.push(Message::user(user_input));

        let tools = self.dispatcher.definitions();
        let mut budget = TurnBudget::new(self.settings.max_tool_rounds);
        // Only the first planner call may be forced.
        let mut tool_choice = policy::first_turn_choice(user_input);
        info!(history = history.len(), forced = (tool_choice == ToolChoice::Required), "request started");

        while !budget.is_exhausted() {
            let request = ChatRequest {
                model: self.settings.model.clone(),
                messages: transcript.clone(),
                tools: tools.clone(),
                tool_choice,
                max_tokens: self.settings.max_tokens,
                temperature: self.settings.temperature,
            };
            tool_choice = ToolChoice::Auto;

            let response = self.plan(&request).await?;

            if !response.has_tool_calls() {
                let text = response.content.trim();
                let (text, termination) = if text.is_empty() {
                    warn!("planner returned an empty answer");
                    (self.settings.empty_reply_fallback.clone(), Termination::EmptyAnswer)
                } else {
                    (text.to_string(), Termination::Answered)
                };
                transcript.push(Message::assistant(&text));
                info!(tool_rounds = budget.used(), ?termination, "request finished");
                return Ok(Reply {
                    text,
                    termination,
                    tool_rounds: budget.used(),
                    transcript,
                });
            }

            debug!(calls = response.tool_calls.len(), round = budget.used() + 1, "dispatching tool calls");
            transcript.push(Message::assistant_with_tool_calls(
                response.content.clone(),
                response.tool_calls.clone(),
            ));

            // join_all yields results in call order whatever the completion order.
            let results = join_all(
                response
                    .tool_calls
                    .iter()
                    .map(|call| self.dispatcher.dispatch(call)),
            )
            .await;
            for result in &results {
                transcript.push(Message::tool_result(&result.call_id, result.to_content()));
            }

            budget.consume();
        }

        warn!(ceiling = budget.ceiling(), "turn budget exhausted");
        let text = self.settings.budget_exhausted_fallback.clone();
        transcript.push(Message::assistant(&text));
        Ok(Reply {
            text,
            termination: Termination::BudgetExhausted,
            tool_rounds: budget.used(),
            transcript,
        })
    }

    async fn plan(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let name = self.llm.name();
        let call = self.llm.chat_completion(request);
        let response = match self.settings.planner_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| anyhow!("{} did not answer within {:?}", name, limit))?,
            None => call.await,
        };
        response.with_context(|| format!("Planner call to {} failed", name))
    }
}
