use crate::cache::TtlCache;
use crate::config::AssistantConfig;
use crate::error::{FeeError, Result};
use crate::ledger::FeeCategory;
use crate::store::Dataset;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::{debug, warn};

pub const BUSY_ANSWER: &str = "AI is busy right now. Please try again in a moment.";

const FEE_KEYWORDS: [&str; 11] = [
    "fee",
    "fees",
    "pending",
    "due",
    "dues",
    "payment",
    "paid",
    "collection",
    "academic year",
    "semester",
    "balance",
];

// Only these categories feed the "top pending year" signal.
const TOP_YEAR_CATEGORIES: [FeeCategory; 3] = [
    FeeCategory::Tuition,
    FeeCategory::Practical,
    FeeCategory::University,
];

/// Substring match against a fixed keyword list, case-insensitive.
pub fn is_fee_related(question: &str) -> bool {
    let q = question.to_lowercase();
    FEE_KEYWORDS.iter().any(|k| q.contains(k))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FactSheet {
    pub expected: Decimal,
    pub collected: Decimal,
    /// `expected - collected`, unclamped.
    pub pending: Decimal,
    pub top_year: String,
}

/// Institution-wide fee facts. Expects the unscoped dataset.
///
/// The top pending year weighs each schedule's tuition, practical and
/// university fees once, however many payments the schedule has, and
/// subtracts every payment recorded on it.
pub fn compute_fact_sheet(data: &Dataset) -> FactSheet {
    let expected: Decimal = data.schedules.iter().map(|f| f.total_fixed()).sum();
    let collected: Decimal = data.payments.iter().map(|p| p.paid_amount).sum();

    let mut paid_by_schedule: HashMap<&str, Decimal> = HashMap::new();
    for p in &data.payments {
        *paid_by_schedule
            .entry(p.fee_schedule_id.as_str())
            .or_insert(Decimal::ZERO) += p.paid_amount;
    }
    let year_of: HashMap<&str, &str> = data
        .students
        .iter()
        .map(|s| (s.id.as_str(), s.academic_year.as_str()))
        .collect();

    let mut pending_by_year: BTreeMap<&str, Decimal> = BTreeMap::new();
    for f in &data.schedules {
        let Some(year) = year_of.get(f.student_id.as_str()) else {
            continue;
        };
        let core: Decimal = TOP_YEAR_CATEGORIES.iter().map(|c| f.fixed.get(*c)).sum();
        let paid = paid_by_schedule
            .get(f.id.as_str())
            .copied()
            .unwrap_or(Decimal::ZERO);
        *pending_by_year.entry(year).or_insert(Decimal::ZERO) += core - paid;
    }

    // Ties go to the most recent academic year.
    let top_year = pending_by_year
        .iter()
        .max_by(|(ya, a), (yb, b)| a.cmp(b).then_with(|| ya.cmp(yb)))
        .map(|(y, _)| y.to_string())
        .unwrap_or_else(|| "N/A".to_string());

    FactSheet {
        expected,
        collected,
        pending: expected - collected,
        top_year,
    }
}

/// Prompt for the answer generator. Facts are only given in strict mode.
pub fn build_prompt(question: &str, facts: Option<&FactSheet>) -> String {
    match facts {
        Some(f) => format!(
            "You are an assistant for a college fee management system.\n\
             \n\
             Answer ONLY from the facts below. Do not invent numbers or assumptions.\n\
             \n\
             FACTS:\n\
             - Total expected fee: \u{20b9}{}\n\
             - Total collected fee: \u{20b9}{}\n\
             - Total pending fee: \u{20b9}{}\n\
             - Highest pending academic year: {}\n\
             \n\
             Rules:\n\
             - Professional tone\n\
             - 2-3 sentences\n\
             - Explain clearly\n\
             \n\
             User question:\n\
             {}\n\
             \n\
             Answer:\n",
            f.expected, f.collected, f.pending, f.top_year, question
        ),
        None => format!(
            "You are a helpful assistant.\n\
             \n\
             Answer the user's question clearly and simply.\n\
             Do not include any fee numbers unless asked.\n\
             \n\
             User question:\n\
             {}\n\
             \n\
             Answer:\n",
            question
        ),
    }
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion request timed out")]
    Timeout,
    #[error("completion service unavailable: {0}")]
    Unavailable(String),
    #[error("unexpected completion response: {0}")]
    BadResponse(String),
}

impl From<CompletionError> for FeeError {
    fn from(e: CompletionError) -> Self {
        match e {
            CompletionError::Timeout => FeeError::UpstreamTimeout,
            other => FeeError::Upstream(other.to_string()),
        }
    }
}

/// Opaque text-completion backend.
pub trait CompletionService {
    fn complete(&self, prompt: &str) -> std::result::Result<String, CompletionError>;
}

/// Ollama-style `/api/generate` client.
pub struct OllamaClient {
    agent: ureq::Agent,
    endpoint: String,
    model: String,
    temperature: f64,
    max_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaClient {
    pub fn new(cfg: &AssistantConfig) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(cfg.timeout).build(),
            endpoint: cfg.endpoint.clone(),
            model: cfg.model.clone(),
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
        }
    }
}

fn is_timeout(e: &(dyn std::error::Error + 'static)) -> bool {
    e.downcast_ref::<std::io::Error>()
        .map(|io| {
            matches!(
                io.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            )
        })
        .unwrap_or(false)
}

impl CompletionService for OllamaClient {
    fn complete(&self, prompt: &str) -> std::result::Result<String, CompletionError> {
        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": self.temperature,
                "num_predict": self.max_tokens,
            }
        });

        let resp = self
            .agent
            .post(&self.endpoint)
            .send_json(body)
            .map_err(|e| match e {
                ureq::Error::Status(code, _) => {
                    CompletionError::Unavailable(format!("status {code}"))
                }
                ureq::Error::Transport(t) => {
                    if std::error::Error::source(&t).map(is_timeout).unwrap_or(false) {
                        CompletionError::Timeout
                    } else {
                        CompletionError::Unavailable(t.to_string())
                    }
                }
            })?;

        let parsed: GenerateResponse = resp.into_json().map_err(|e| {
            if is_timeout(&e) {
                CompletionError::Timeout
            } else {
                CompletionError::BadResponse(e.to_string())
            }
        })?;
        Ok(parsed.response.trim().to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub answer: String,
    pub fee_related: bool,
    /// Set when the completion service timed out and the fixed reply was used.
    pub fallback: bool,
}

/// Question answering over the fact sheet, with a short-lived fact cache.
pub struct Assistant {
    service: Box<dyn CompletionService>,
    facts: TtlCache<String, FactSheet>,
}

impl Assistant {
    pub fn new(service: Box<dyn CompletionService>, facts: TtlCache<String, FactSheet>) -> Self {
        Self { service, facts }
    }

    pub fn from_config(cfg: &AssistantConfig) -> Self {
        Self::new(
            Box::new(OllamaClient::new(cfg)),
            TtlCache::new(cfg.facts_ttl),
        )
    }

    pub fn forget_facts(&mut self) {
        self.facts.clear();
    }

    /// Cached fact sheet for `key`, recomputed with `load` once expired.
    pub fn fact_sheet(
        &mut self,
        key: &str,
        load: impl FnOnce() -> Result<FactSheet>,
    ) -> Result<(FactSheet, bool)> {
        let (facts, cached) = self.facts.get_or_try_insert_with(key.to_string(), load)?;
        debug!(cached, ttl_secs = self.facts.ttl().as_secs(), "fact sheet");
        Ok((facts, cached))
    }

    /// Answers `question`. The fact sheet is only assembled (and only shown to
    /// the model) when the question is fee related.
    pub fn ask(
        &mut self,
        question: &str,
        key: &str,
        load: impl FnOnce() -> Result<FactSheet>,
    ) -> Result<Answer> {
        let fee_related = is_fee_related(question);
        let facts = if fee_related {
            Some(self.fact_sheet(key, load)?.0)
        } else {
            None
        };
        let prompt = build_prompt(question, facts.as_ref());

        match self.service.complete(&prompt) {
            Ok(answer) => Ok(Answer {
                answer,
                fee_related,
                fallback: false,
            }),
            Err(CompletionError::Timeout) => {
                warn!(fee_related, "completion timed out; using fallback answer");
                Ok(Answer {
                    answer: BUSY_ANSWER.to_string(),
                    fee_related,
                    fallback: true,
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}
