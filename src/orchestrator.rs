//! Chat orchestrator - the per-request pipeline
//!
//! PLAN → ROUTE → GATHER? → SYNTHESIZE → RESPONSE
//!
//! Each request runs the pipeline once, start to finish; no state survives
//! across requests. Every anticipated failure is converted into fixed
//! user-facing text along the way, so only truly unexpected errors cross
//! this boundary.

use crate::aggregator::DataAggregator;
use crate::gemini::{Completion, BACKEND_NAME};
use crate::market::MarketData;
use crate::models::{ChatRequest, ChatResponse, Intent, Plan};
use crate::planner::IntentPlanner;
use crate::synthesizer::Synthesizer;
use crate::Result;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Returned for a stock intent carrying no usable ticker entity.
pub const NEED_TICKER_REPLY: &str = "I can analyze a stock, but I need a valid ticker symbol.";

/// Returned when the market-news listing cannot be fetched.
pub const NO_MARKET_NEWS_REPLY: &str =
    "Sorry, I couldn't retrieve the latest market news at the moment.";

fn no_stock_data_reply(ticker: &str) -> String {
    format!("Sorry, I couldn't retrieve financial data for {}.", ticker)
}

pub struct ChatOrchestrator {
    planner: IntentPlanner,
    aggregator: DataAggregator,
    synthesizer: Synthesizer,
}

impl ChatOrchestrator {
    pub fn new(completion: Arc<dyn Completion>, market: Arc<dyn MarketData>) -> Self {
        Self {
            planner: IntentPlanner::new(completion.clone()),
            aggregator: DataAggregator::new(market),
            synthesizer: Synthesizer::new(completion),
        }
    }

    /// Run one request through the pipeline to its terminal response.
    pub async fn process(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let request_id = Uuid::new_v4();
        info!(%request_id, "Processing chat request");

        let plan = self.planner.plan(&request.text).await;
        info!(%request_id, intent = %plan.intent, "Plan ready");

        let response = match plan.intent {
            Intent::StockAnalysis => self.stock_analysis(request_id, &plan).await,
            Intent::MarketNews => self.market_news(request_id, &request.text).await,
            Intent::GeneralChat => self.synthesizer.general_chat(&request.text).await,
        };

        Ok(ChatResponse {
            response,
            backend: BACKEND_NAME.to_string(),
        })
    }

    async fn stock_analysis(&self, request_id: Uuid, plan: &Plan) -> String {
        // The aggregator is never invoked without a ticker.
        let Some(ticker) = plan.ticker() else {
            info!(%request_id, "Stock intent without a usable ticker");
            return NEED_TICKER_REPLY.to_string();
        };

        match self.aggregator.stock_payload(ticker).await {
            Some(payload) => self.synthesizer.stock_analysis(ticker, &payload).await,
            None => {
                info!(%request_id, ticker, "Stock aggregation returned no data");
                no_stock_data_reply(ticker)
            }
        }
    }

    async fn market_news(&self, request_id: Uuid, user_text: &str) -> String {
        match self.aggregator.market_news().await {
            Some(articles) => self.synthesizer.news_digest(user_text, &articles).await,
            None => {
                info!(%request_id, "Market news aggregation returned no data");
                NO_MARKET_NEWS_REPLY.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChatError;
    use crate::synthesizer::MAX_TOKENS;
    use crate::test_support::{ScriptedCompletion, ScriptedMarket};
    use serde_json::json;

    const STOCK_PLAN: &str =
        r#"{"intent": "stock_analysis", "entities": [{"type": "ticker", "value": "TSLA"}]}"#;
    const NEWS_PLAN: &str = r#"{"intent": "market_news", "entities": []}"#;
    const CHAT_PLAN: &str = r#"{"intent": "general_chat", "entities": []}"#;

    fn request(text: &str) -> ChatRequest {
        ChatRequest {
            text: text.to_string(),
        }
    }

    fn quote_body() -> serde_json::Value {
        json!({
            "Global Quote": {
                "05. price": "245.3000",
                "10. change percent": "1.2345%",
                "06. volume": "100200300"
            }
        })
    }

    fn overview_body() -> serde_json::Value {
        json!({
            "MarketCapitalization": "780000000000",
            "PERatio": "65.4",
            "EPS": "3.62",
            "52WeekHigh": "299.29",
            "52WeekLow": "138.80"
        })
    }

    fn feed_body(count: usize) -> serde_json::Value {
        let items: Vec<serde_json::Value> = (0..count)
            .map(|i| {
                json!({
                    "title": format!("Headline {}", i + 1),
                    "summary": format!("Summary {}", i + 1),
                    "overall_sentiment_label": "Neutral"
                })
            })
            .collect();
        json!({ "feed": items })
    }

    fn words(tag: &str, n: usize) -> String {
        (0..n)
            .map(|i| format!("{}w{}", tag, i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[tokio::test]
    async fn test_stock_analysis_happy_path() {
        let completion = Arc::new(ScriptedCompletion::replying(&[
            STOCK_PLAN,
            "TSLA trades at 245.30, up 1.2% today.",
        ]));
        let market = Arc::new(
            ScriptedMarket::new()
                .with_quote(Ok(quote_body()))
                .with_overview(Ok(overview_body()))
                .with_ticker_news(Ok(feed_body(5))),
        );
        let orchestrator = ChatOrchestrator::new(completion.clone(), market.clone());

        let result = orchestrator
            .process(&request("Analyze Tesla (TSLA)"))
            .await
            .unwrap();

        assert_eq!(result.response, "TSLA trades at 245.30, up 1.2% today.");
        assert_eq!(result.backend, "gemini");

        // One planning call, one synthesis call with the consolidated
        // payload, three data fetches.
        let calls = completion.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].user.starts_with("Data for TSLA:"));
        assert!(calls[1].user.contains("245.3000"));
        assert!(calls[1].user.contains("Headline 1"));
        assert_eq!(market.call_count(), 3);
    }

    #[tokio::test]
    async fn test_stock_intent_without_ticker_short_circuits() {
        let cases = [
            r#"{"intent": "stock_analysis", "entities": []}"#,
            r#"{"intent": "stock_analysis", "entities": [{"type": "company", "value": "Tesla"}]}"#,
            r#"{"intent": "stock_analysis", "entities": [{"type": "ticker", "value": ""}]}"#,
        ];

        for plan in cases {
            let completion = Arc::new(ScriptedCompletion::replying(&[plan]));
            let market = Arc::new(ScriptedMarket::new());
            let orchestrator = ChatOrchestrator::new(completion.clone(), market.clone());

            let result = orchestrator.process(&request("Analyze it")).await.unwrap();

            assert_eq!(result.response, NEED_TICKER_REPLY, "plan: {}", plan);
            // Planner ran, but neither the aggregator nor the synthesizer.
            assert_eq!(completion.call_count(), 1);
            assert_eq!(market.call_count(), 0);
        }
    }

    #[tokio::test]
    async fn test_stock_gather_failure_maps_to_fixed_text() {
        let completion = Arc::new(ScriptedCompletion::replying(&[STOCK_PLAN]));
        let market = Arc::new(
            ScriptedMarket::new()
                .with_quote(Err(ChatError::DataSourceError("timeout".to_string())))
                .with_overview(Ok(overview_body()))
                .with_ticker_news(Ok(feed_body(3))),
        );
        let orchestrator = ChatOrchestrator::new(completion.clone(), market);

        let result = orchestrator
            .process(&request("Analyze Tesla (TSLA)"))
            .await
            .unwrap();

        assert_eq!(
            result.response,
            "Sorry, I couldn't retrieve financial data for TSLA."
        );
        // No synthesis call after the gather failed.
        assert_eq!(completion.call_count(), 1);
    }

    #[tokio::test]
    async fn test_news_digest_budget_cut_after_third_item() {
        // Five fetched items at 300 measured tokens per summary: items 1-3
        // accumulate to 900, item 4 breaches 1024 and closes the loop.
        let mut replies: Vec<crate::Result<String>> = vec![Ok(NEWS_PLAN.to_string())];
        replies.extend((1..=4).map(|i| Ok(words(&format!("s{}", i), 300))));
        replies.push(Ok("Markets were mixed today.".to_string()));

        let completion = Arc::new(ScriptedCompletion::new(replies));
        let market = Arc::new(ScriptedMarket::new().with_market_news(Ok(feed_body(5))));
        let orchestrator = ChatOrchestrator::new(completion.clone(), market);

        let result = orchestrator
            .process(&request("give me the latest market news"))
            .await
            .unwrap();

        assert_eq!(result.response, "Markets were mixed today.");

        // Planner + 4 item summaries + 1 final re-synthesis.
        let calls = completion.calls();
        assert_eq!(calls.len(), 6);

        let final_call = calls.last().unwrap();
        assert_eq!(final_call.max_output_tokens, MAX_TOKENS * 2);
        assert!(final_call.user.contains("s1w0"));
        assert!(final_call.user.contains("s3w0"));
        assert!(!final_call.user.contains("s4w0"));
    }

    #[tokio::test]
    async fn test_news_gather_failure_maps_to_fixed_text() {
        let completion = Arc::new(ScriptedCompletion::replying(&[NEWS_PLAN]));
        let market = Arc::new(
            ScriptedMarket::new()
                .with_market_news(Err(ChatError::DataSourceError("503".to_string()))),
        );
        let orchestrator = ChatOrchestrator::new(completion.clone(), market);

        let result = orchestrator
            .process(&request("give me the latest market news"))
            .await
            .unwrap();

        assert_eq!(result.response, NO_MARKET_NEWS_REPLY);
        assert_eq!(completion.call_count(), 1);
    }

    #[tokio::test]
    async fn test_general_chat_is_one_call_with_512_ceiling() {
        let completion = Arc::new(ScriptedCompletion::replying(&[CHAT_PLAN, "Hello!"]));
        let market = Arc::new(ScriptedMarket::new());
        let orchestrator = ChatOrchestrator::new(completion.clone(), market.clone());

        let result = orchestrator.process(&request("Hi there")).await.unwrap();

        assert_eq!(result.response, "Hello!");
        assert_eq!(result.backend, "gemini");

        let calls = completion.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].max_output_tokens, 512);
        assert_eq!(market.call_count(), 0);
    }

    #[tokio::test]
    async fn test_planning_failure_takes_general_chat_path() {
        let completion = Arc::new(ScriptedCompletion::replying(&[
            "the backend returned prose instead of a plan",
            "I can help with stocks and market news.",
        ]));
        let market = Arc::new(ScriptedMarket::new());
        let orchestrator = ChatOrchestrator::new(completion, market.clone());

        let result = orchestrator
            .process(&request("What can you do?"))
            .await
            .unwrap();

        assert_eq!(result.response, "I can help with stocks and market news.");
        assert_eq!(market.call_count(), 0);
    }

    #[tokio::test]
    async fn test_identical_inputs_produce_identical_results() {
        let run = || async {
            let completion = Arc::new(ScriptedCompletion::replying(&[
                STOCK_PLAN,
                "TSLA analysis.",
            ]));
            let market = Arc::new(
                ScriptedMarket::new()
                    .with_quote(Ok(quote_body()))
                    .with_overview(Ok(overview_body()))
                    .with_ticker_news(Ok(feed_body(5))),
            );
            ChatOrchestrator::new(completion, market)
                .process(&request("Analyze Tesla (TSLA)"))
                .await
                .unwrap()
        };

        let first = run().await;
        let second = run().await;
        assert_eq!(first, second);
    }
}
