use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use parley_core::{ConnectionContext, FallbackReason, Interpretation, Resolved};

use crate::llm::{LlmClient, ProviderError};

const URL_PLACEHOLDER: &str = "[URL not configured]";

/// Turns one utterance into an `Interpretation` with a single model call.
#[derive(Clone)]
pub struct IntentResolver {
    llm: Arc<dyn LlmClient>,
}

impl IntentResolver {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub fn model(&self) -> &str {
        self.llm.model()
    }

    /// Provider failures propagate. A reply that is not a JSON object is absorbed here and comes
    /// back as a degraded interpretation.
    pub async fn interpret(
        &self,
        query: &str,
        context: &ConnectionContext,
    ) -> Result<Resolved, ProviderError> {
        let raw = self.llm.complete_json(&system_prompt(&context.api_url), query).await?;
        Ok(parse_reply(&raw))
    }
}

pub fn parse_reply(raw: &str) -> Resolved {
    let detail = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(reply)) => return Resolved::understood(Interpretation::from_reply(&reply)),
        Ok(other) => format!("expected a JSON object, got {}", json_kind(&other)),
        Err(error) => error.to_string(),
    };

    warn!(
        event_name = "resolver.reply.unparseable",
        detail = %detail,
        "model reply could not be interpreted"
    );
    Resolved::degraded(
        Interpretation::unparseable_reply(),
        FallbackReason::UnparseableReply { detail },
    )
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

pub fn system_prompt(api_url: &str) -> String {
    let api_url = if api_url.trim().is_empty() { URL_PLACEHOLDER } else { api_url };

    format!(
        r#"You are a voice assistant for a Frappe CRM system. You help users work with their CRM data through natural language.

The CRM instance is available at: {api_url}

When answering:
1. Work out what the user wants to do
2. Reply conversationally and keep it short
3. Stay focused on CRM information
4. Say clearly when data has to be fetched from or written to the CRM

Reply with a single JSON object containing exactly these fields:
- intent: a short label for the user's intent (for example "get_leads", "create_task", "search_contacts")
- response: your conversational reply to the user
- confidence: a number between 0 and 1 expressing how sure you are about the intent
- metadata: (optional) an object with any extra context for the reply
- action: (optional) an object with:
  - type: the action to run ("fetch_data" or "create_entity")
  - parameters: the parameters for that action ("doctype", plus "filters", "fields", "limit" for reads or "data" for creates)

Example:
{{
  "intent": "get_leads",
  "response": "I found 5 leads created in the last month. The most recent one is from ABC Company.",
  "confidence": 0.92,
  "metadata": {{
    "lead_count": 5,
    "time_period": "last_month"
  }},
  "action": {{
    "type": "fetch_data",
    "parameters": {{
      "doctype": "Lead",
      "filters": [["creation", ">", "2023-05-01"]]
    }}
  }}
}}
"#
    )
}
