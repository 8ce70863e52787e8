//! Response synthesizer
//!
//! Turns gathered data into the final reader-facing text. The stock and
//! general-chat paths are single completion round-trips; the market-news
//! path runs an incremental summarization loop under a hard token budget,
//! then re-synthesizes the accumulated summaries into one coherent digest.
//!
//! Completion failures inside any path degrade to a fixed apologetic
//! string; synthesis never fails the request.

use crate::gemini::{ChatMessage, Completion, FAILURE_REPLY};
use crate::models::{NewsArticle, StockPayload};
use std::sync::Arc;
use tracing::{debug, warn};

/// Hard ceiling, in backend tokens, for the accumulated news digest and for
/// single-shot synthesis output.
pub const MAX_TOKENS: u32 = 1024;

/// Output ceiling for the plain-assistant path.
const GENERAL_CHAT_MAX_TOKENS: u32 = 512;

const SYNTH_TEMPERATURE: f32 = 0.5;

/// Appended to every synthesis instruction to keep the output free of
/// meta commentary.
const RESTRICT_INSTRUCTION: &str = "Only provide the answer content. Do not include meta \
    commentary, disclaimers, or statements about tokens or formatting.";

/// Running state of one digest loop.
///
/// Invariant: `token_count` is the backend-measured count of `text`,
/// re-measured after every append. Counts are never summed across appends
/// since the tokenizer is not additive over concatenation.
#[derive(Debug, Default)]
struct NewsDigest {
    text: String,
    token_count: u32,
}

impl NewsDigest {
    fn append(&mut self, summary: &str) {
        if !self.text.is_empty() {
            self.text.push('\n');
        }
        self.text.push_str(summary);
    }
}

pub struct Synthesizer {
    completion: Arc<dyn Completion>,
}

impl Synthesizer {
    pub fn new(completion: Arc<dyn Completion>) -> Self {
        Self { completion }
    }

    /// Single-shot analysis of one consolidated stock payload.
    pub async fn stock_analysis(&self, ticker: &str, payload: &StockPayload) -> String {
        let system = format!(
            "You are a smart stock analyst. Synthesize the following data into a concise \
             analysis for a retail investor. Start the response directly with the analysis. \
             Format response and provide response less than {} tokens. {}",
            MAX_TOKENS, RESTRICT_INSTRUCTION
        );
        let data = serde_json::to_string_pretty(payload).unwrap_or_default();

        let messages = [
            ChatMessage::system(system),
            ChatMessage::user(format!("Data for {}:\n{}", ticker, data)),
        ];
        self.complete(&messages, MAX_TOKENS).await
    }

    /// Incremental news digest over `articles`, in provider order.
    ///
    /// Each item is summarized individually; a candidate summary is appended
    /// only while the measured running total stays within [`MAX_TOKENS`].
    /// The first item that would breach the budget closes the loop, items
    /// after it are never summarized. A final coarser pass then rewrites the
    /// accumulated summaries into a single digest for the reader.
    pub async fn news_digest(&self, user_text: &str, articles: &[NewsArticle]) -> String {
        let mut digest = NewsDigest::default();

        for article in articles {
            let item = serde_json::to_string_pretty(article).unwrap_or_default();
            let messages = [
                ChatMessage::system(format!(
                    "You are a financial news assistant. Summarize the following market news \
                     headlines and summaries into a clear, easy-to-read list for a general \
                     audience. Format response and provide response less than {} tokens. {}",
                    MAX_TOKENS, RESTRICT_INSTRUCTION
                )),
                ChatMessage::user(format!("Market News:\n{}", item)),
            ];

            let candidate = match self
                .completion
                .generate(&messages, SYNTH_TEMPERATURE, MAX_TOKENS)
                .await
            {
                Ok(text) => text,
                Err(e) => {
                    warn!("Item summarization failed, closing digest early: {}", e);
                    break;
                }
            };

            // Counting failures close the loop rather than risk unbounded
            // growth of the accumulated text.
            let Some(candidate_tokens) = self.completion.count_tokens(&candidate).await else {
                warn!("Token counting unavailable, closing digest early");
                break;
            };

            if digest.token_count + candidate_tokens > MAX_TOKENS {
                debug!(
                    accumulated = digest.token_count,
                    candidate = candidate_tokens,
                    "Token budget reached, dropping remaining items"
                );
                break;
            }

            digest.append(&candidate);

            let Some(total) = self.completion.count_tokens(&digest.text).await else {
                warn!("Token counting unavailable, closing digest early");
                break;
            };
            digest.token_count = total;
        }

        debug!(
            tokens = digest.token_count,
            "Digest accumulated, running final synthesis pass"
        );

        let messages = [
            ChatMessage::system(format!(
                "You are a financial news assistant. {} Summarize the following market news \
                 headlines and summaries into a clear, easy-to-read list for a general \
                 audience. Format response and provide response less than {} tokens. {}",
                user_text, MAX_TOKENS, RESTRICT_INSTRUCTION
            )),
            ChatMessage::user(format!("Market News:\n{}", digest.text)),
        ];
        self.complete(&messages, MAX_TOKENS * 2).await
    }

    /// Plain-assistant reply with no data payload.
    pub async fn general_chat(&self, user_text: &str) -> String {
        let system = format!(
            "You are a financial assistant. You can provide a detailed analysis of a stock if \
             given a ticker (e.g., 'analyze TSLA') or provide the latest general market news. \
             For other topics, act as a helpful assistant. Format response and provide response \
             less than {} tokens. {}",
            MAX_TOKENS, RESTRICT_INSTRUCTION
        );

        let messages = [ChatMessage::system(system), ChatMessage::user(user_text)];
        self.complete(&messages, GENERAL_CHAT_MAX_TOKENS).await
    }

    async fn complete(&self, messages: &[ChatMessage], max_output_tokens: u32) -> String {
        match self
            .completion
            .generate(messages, SYNTH_TEMPERATURE, max_output_tokens)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!("Synthesis completion failed: {}", e);
                FAILURE_REPLY.to_string()
            }
        }
    }
}
