//! Scripted doubles for the completion and market-data seams.
//!
//! Token counting is modeled as whitespace word count so budget arithmetic
//! in tests stays readable.

use crate::error::ChatError;
use crate::gemini::{ChatMessage, Completion, Role};
use crate::market::MarketData;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

/// Completion double replaying scripted replies in order.
pub struct ScriptedCompletion {
    replies: Mutex<VecDeque<crate::Result<String>>>,
    calls: Mutex<Vec<RecordedCall>>,
    counting_available: bool,
}

impl ScriptedCompletion {
    pub fn new(replies: Vec<crate::Result<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
            counting_available: true,
        }
    }

    pub fn replying(replies: &[&str]) -> Self {
        Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
    }

    pub fn without_counting(replies: &[&str]) -> Self {
        let mut double = Self::replying(replies);
        double.counting_available = false;
        double
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Completion for ScriptedCompletion {
    async fn generate(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_output_tokens: u32,
    ) -> crate::Result<String> {
        let join = |role: Role| -> String {
            messages
                .iter()
                .filter(|m| m.role == role)
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("\n\n")
        };

        self.calls.lock().unwrap().push(RecordedCall {
            system: join(Role::System),
            user: join(Role::User),
            temperature,
            max_output_tokens,
        });

        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("completion script exhausted")
    }

    async fn count_tokens(&self, text: &str) -> Option<u32> {
        if !self.counting_available {
            return None;
        }
        Some(text.split_whitespace().count() as u32)
    }
}

/// Market-data double with per-endpoint scripted responses. Endpoints with
/// no scripted response report a data-source error.
#[derive(Default)]
pub struct ScriptedMarket {
    quote: Mutex<VecDeque<crate::Result<Value>>>,
    overview: Mutex<VecDeque<crate::Result<Value>>>,
    ticker_news: Mutex<VecDeque<crate::Result<Value>>>,
    market_news: Mutex<VecDeque<crate::Result<Value>>>,
    calls: Mutex<Vec<&'static str>>,
}

impl ScriptedMarket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quote(self, response: crate::Result<Value>) -> Self {
        self.quote.lock().unwrap().push_back(response);
        self
    }

    pub fn with_overview(self, response: crate::Result<Value>) -> Self {
        self.overview.lock().unwrap().push_back(response);
        self
    }

    pub fn with_ticker_news(self, response: crate::Result<Value>) -> Self {
        self.ticker_news.lock().unwrap().push_back(response);
        self
    }

    pub fn with_market_news(self, response: crate::Result<Value>) -> Self {
        self.market_news.lock().unwrap().push_back(response);
        self
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn pop(&self, endpoint: &'static str, queue: &Mutex<VecDeque<crate::Result<Value>>>) -> crate::Result<Value> {
        self.calls.lock().unwrap().push(endpoint);
        queue.lock().unwrap().pop_front().unwrap_or_else(|| {
            Err(ChatError::DataSourceError(format!(
                "no scripted response for {}",
                endpoint
            )))
        })
    }
}

#[async_trait]
impl MarketData for ScriptedMarket {
    async fn quote(&self, _symbol: &str) -> crate::Result<Value> {
        self.pop("quote", &self.quote)
    }

    async fn overview(&self, _symbol: &str) -> crate::Result<Value> {
        self.pop("overview", &self.overview)
    }

    async fn ticker_news(&self, _symbol: &str, _limit: usize) -> crate::Result<Value> {
        self.pop("ticker_news", &self.ticker_news)
    }

    async fn market_news(&self, _limit: usize) -> crate::Result<Value> {
        self.pop("market_news", &self.market_news)
    }
}
