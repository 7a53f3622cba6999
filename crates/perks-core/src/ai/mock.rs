//! Mock backend for testing
//!
//! By default the mock answers like a well-behaved model: it reads the
//! `Label: value` lines that the bank layout rewrites put into the prompt and
//! echoes them back in the reward schema. Tests can instead pin a canned
//! response or make every call fail with a rate-limit or auth error.

use std::sync::{Arc, LazyLock, Mutex};

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::rewards::rewrite::{
    ADJUSTED_LABEL, BANK_HINT_LABEL, CLOSING_LABEL, EARNED_LABEL, OPENING_LABEL, PERIOD_LABEL,
    REDEEMED_LABEL,
};

use super::AIBackend;

static LABEL_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*([A-Za-z /]+):[ \t]*(\S.*?)[ \t]*$").expect("label line regex")
});

/// Failure a mock backend reports on every call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    RateLimited,
    Unauthorized,
}

/// Mock AI backend for testing
#[derive(Clone, Default)]
pub struct MockBackend {
    /// Whether health_check should return true
    pub healthy: bool,
    response: Option<String>,
    failure: Option<MockFailure>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl MockBackend {
    /// Create a new mock backend (healthy by default)
    pub fn new() -> Self {
        Self {
            healthy: true,
            ..Default::default()
        }
    }

    /// Create an unhealthy mock backend
    pub fn unhealthy() -> Self {
        Self::default()
    }

    /// Always answer with `response`
    pub fn with_response(response: impl Into<String>) -> Self {
        Self {
            response: Some(response.into()),
            ..Self::new()
        }
    }

    /// Fail every completion with the given error kind
    pub fn failing(failure: MockFailure) -> Self {
        Self {
            failure: Some(failure),
            ..Self::new()
        }
    }

    pub fn rate_limited() -> Self {
        Self::failing(MockFailure::RateLimited)
    }

    pub fn unauthorized() -> Self {
        Self::failing(MockFailure::Unauthorized)
    }

    /// Every prompt received so far, oldest first
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts().pop()
    }

    fn record(&self, prompt: &str) {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
    }
}

/// Build a reward response from the labelled lines in a prompt
pub(crate) fn echo_labels(prompt: &str) -> String {
    let mut bank: Option<String> = None;
    let mut period: Option<String> = None;
    let mut points = serde_json::Map::new();

    for caps in LABEL_LINE.captures_iter(prompt) {
        let label = caps[1].trim();
        let value = caps[2].trim();

        let key = match label {
            l if l == BANK_HINT_LABEL => {
                bank.get_or_insert_with(|| value.to_string());
                continue;
            }
            l if l == PERIOD_LABEL => {
                period.get_or_insert_with(|| value.to_string());
                continue;
            }
            l if l == OPENING_LABEL => "opening",
            l if l == EARNED_LABEL => "earned",
            l if l == REDEEMED_LABEL => "redeemed",
            l if l == ADJUSTED_LABEL => "adjustedLapsed",
            l if l == CLOSING_LABEL => "closing",
            _ => continue,
        };

        if points.contains_key(key) {
            continue;
        }
        if let Ok(n) = value.replace(',', "").parse::<f64>() {
            points.insert(key.to_string(), json!(n));
        }
    }

    let found = !points.is_empty();
    for key in ["opening", "earned", "redeemed", "adjustedLapsed", "closing"] {
        points.entry(key.to_string()).or_insert(Value::Null);
    }
    points.insert("breakdown".to_string(), Value::Null);

    json!({
        "bankName": bank,
        "statementPeriod": period,
        "rewardPoints": points,
        "confidence": if found { "high" } else { "low" },
        "notes": if found { Value::Null } else { json!("no reward summary found") },
    })
    .to_string()
}

#[async_trait]
impl AIBackend for MockBackend {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.record(prompt);

        match self.failure {
            Some(MockFailure::RateLimited) => {
                return Err(Error::ModelRateLimited("mock rate limit".into()))
            }
            Some(MockFailure::Unauthorized) => {
                return Err(Error::ModelAuth("mock unauthorized".into()))
            }
            None => {}
        }

        Ok(match &self.response {
            Some(response) => response.clone(),
            None => echo_labels(prompt),
        })
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn model(&self) -> &str {
        "mock"
    }

    fn host(&self) -> &str {
        "mock://localhost"
    }
}
