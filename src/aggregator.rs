//! Data aggregator
//!
//! Performs the per-intent fan-out against the market-data source and
//! consolidates provider bodies into a bounded payload. All failures
//! surface as no-data, never as errors crossing into the orchestrator.

use crate::market::MarketData;
use crate::models::{NewsArticle, NewsHeadline, Overview, Quote, StockPayload};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Items requested from the news endpoint per call.
const NEWS_FETCH_LIMIT: usize = 5;
/// Headlines kept in the stock payload.
const PAYLOAD_HEADLINE_CAP: usize = 3;

pub struct DataAggregator {
    market: Arc<dyn MarketData>,
}

impl DataAggregator {
    pub fn new(market: Arc<dyn MarketData>) -> Self {
        Self { market }
    }

    /// Quote, overview and recent news for one ticker, fetched concurrently.
    ///
    /// A transport failure on any branch aborts the whole aggregation to
    /// `None`. A branch that answered with a body lacking the expected keys
    /// only omits its own section; the partial payload stays valid.
    pub async fn stock_payload(&self, ticker: &str) -> Option<StockPayload> {
        let (quote, overview, news) = tokio::join!(
            self.market.quote(ticker),
            self.market.overview(ticker),
            self.market.ticker_news(ticker, NEWS_FETCH_LIMIT),
        );

        let (quote, overview, news) = match (quote, overview, news) {
            (Ok(quote), Ok(overview), Ok(news)) => (quote, overview, news),
            (quote, overview, news) => {
                for err in [quote.err(), overview.err(), news.err()]
                    .into_iter()
                    .flatten()
                {
                    warn!(ticker, "Stock data fetch failed: {}", err);
                }
                return None;
            }
        };

        let payload = StockPayload {
            quote: extract_quote(&quote),
            overview: extract_overview(&overview),
            news: extract_headlines(&news),
        };

        // Three notice bodies in a row leave nothing to synthesize from.
        if payload.is_empty() {
            warn!(ticker, "All stock data sources answered without usable fields");
            return None;
        }

        debug!(
            ticker,
            has_quote = payload.quote.is_some(),
            has_overview = payload.overview.is_some(),
            headlines = payload.news.len(),
            "Stock payload consolidated"
        );

        Some(payload)
    }

    /// Latest financial-markets news listing, in provider order.
    pub async fn market_news(&self) -> Option<Vec<NewsArticle>> {
        let body = match self.market.market_news(NEWS_FETCH_LIMIT).await {
            Ok(body) => body,
            Err(e) => {
                warn!("Market news fetch failed: {}", e);
                return None;
            }
        };

        let feed = body.get("feed").and_then(Value::as_array)?;

        Some(
            feed.iter()
                .map(|item| NewsArticle {
                    title: str_field(item, "title"),
                    summary: str_field(item, "summary"),
                })
                .collect(),
        )
    }
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

fn extract_quote(body: &Value) -> Option<Quote> {
    let quote = body.get("Global Quote")?;
    Some(Quote {
        price: str_field(quote, "05. price"),
        change_percent: str_field(quote, "10. change percent"),
        volume: str_field(quote, "06. volume"),
    })
}

fn extract_overview(body: &Value) -> Option<Overview> {
    let overview = Overview {
        market_cap: str_field(body, "MarketCapitalization"),
        pe_ratio: str_field(body, "PERatio"),
        eps: str_field(body, "EPS"),
        week52_high: str_field(body, "52WeekHigh"),
        week52_low: str_field(body, "52WeekLow"),
    };

    // Notice/error bodies carry none of the expected keys.
    let present = [
        &overview.market_cap,
        &overview.pe_ratio,
        &overview.eps,
        &overview.week52_high,
        &overview.week52_low,
    ]
    .iter()
    .any(|f| f.is_some());

    present.then_some(overview)
}

fn extract_headlines(body: &Value) -> Vec<NewsHeadline> {
    body.get("feed")
        .and_then(Value::as_array)
        .map(|feed| {
            feed.iter()
                .take(PAYLOAD_HEADLINE_CAP)
                .map(|item| NewsHeadline {
                    title: str_field(item, "title"),
                    sentiment: str_field(item, "overall_sentiment_label"),
                })
                .collect()
        })
        .unwrap_or_default()
}
