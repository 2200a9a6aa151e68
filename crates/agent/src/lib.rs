//! Agent runtime for the Parley CRM assistant.
//!
//! One turn runs as a strict sequence:
//! 1. **Interpretation** (`resolver`) - the language model turns an utterance into an
//!    `Interpretation`, with local fallbacks for unusable replies
//! 2. **Recording** - the turn is written to the exchange recorder, including degraded turns
//! 3. **Dispatch** (`dispatcher`) - an optional action directive is vetted by `guardrails` and run
//!    against the simulated store or the live CRM (`gateway`)
//!
//! The model never reaches the CRM directly. It can only propose a directive, and a failed
//! directive never fails the turn.

pub mod dispatcher;
pub mod gateway;
pub mod guardrails;
pub mod llm;
pub mod openai;
pub mod resolver;
pub mod runtime;

pub use dispatcher::{ActionDispatcher, ActionOutcome, DispatchError};
pub use gateway::{CrmGateway, FrappeGateway, GatewayError, ResourceQuery};
pub use guardrails::{ActionDecision, ActionPolicy};
pub use llm::{LlmClient, ProviderError};
pub use openai::OpenAiClient;
pub use resolver::IntentResolver;
pub use runtime::{AgentRuntime, QueryReply, QueryRequest};
