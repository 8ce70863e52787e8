//! Intent planner
//!
//! One deterministic completion round-trip that classifies the user's
//! utterance into an intent plus extracted entities. Planning failures
//! never fail the request: any output that does not decode into a plan
//! downgrades to general chat, and the call is not retried.

use crate::gemini::{ChatMessage, Completion};
use crate::models::Plan;
use std::sync::Arc;
use tracing::{debug, warn};

const PLANNER_TEMPERATURE: f32 = 0.0;
const PLANNER_MAX_TOKENS: u32 = 1000;

const PLANNER_INSTRUCTION: &str = "You are a routing agent. Analyze the user's request and output a JSON plan. \
Possible intents are 'stock_analysis', 'market_news', and 'general_chat'. \
The entity type is 'ticker'. Only output the JSON plan. Examples:\n\
User: 'Analyze Tesla (TSLA)' -> {\"intent\": \"stock_analysis\", \"entities\": [{\"type\": \"ticker\", \"value\": \"TSLA\"}]}\n\
User: 'give me the latest market news' -> {\"intent\": \"market_news\", \"entities\": []}\n\
User: 'Hi there' -> {\"intent\": \"general_chat\", \"entities\": []}";

pub struct IntentPlanner {
    completion: Arc<dyn Completion>,
}

impl IntentPlanner {
    pub fn new(completion: Arc<dyn Completion>) -> Self {
        Self { completion }
    }

    /// Classify `user_text` into a routing plan.
    pub async fn plan(&self, user_text: &str) -> Plan {
        let messages = [
            ChatMessage::system(PLANNER_INSTRUCTION),
            ChatMessage::user(user_text),
        ];

        let raw = match self
            .completion
            .generate(&messages, PLANNER_TEMPERATURE, PLANNER_MAX_TOKENS)
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Planner completion failed, falling back to general_chat: {}", e);
                return Plan::general_chat();
            }
        };

        match parse_plan(&raw) {
            Some(plan) => {
                debug!(intent = %plan.intent, entities = plan.entities.len(), "Plan created");
                plan
            }
            None => {
                warn!(raw = %raw, "Planner output did not decode, falling back to general_chat");
                Plan::general_chat()
            }
        }
    }
}

/// Strip an optional markdown ```json fence before parsing.
fn strip_code_fence(raw: &str) -> &str {
    raw.trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

fn parse_plan(raw: &str) -> Option<Plan> {
    serde_json::from_str(strip_code_fence(raw)).ok()
}
