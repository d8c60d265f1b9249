use std::fmt::{Display, Formatter, Result};

use serde::Serialize;

use crate::models::instruction::{MovementType, SendStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PairOutcome {
    Success,
    PartialFailure,
    TotalFailure,
}

impl Display for PairOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            PairOutcome::Success => write!(f, "SUCCESS"),
            PairOutcome::PartialFailure => write!(f, "PARTIAL_FAILURE"),
            PairOutcome::TotalFailure => write!(f, "TOTAL_FAILURE"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegResult {
    pub transaction_id: String,
    pub movement_type: MovementType,
    pub send_status: SendStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LegResult {
    pub fn sent(&self) -> bool {
        self.send_status == SendStatus::Sent
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairDispatchResult {
    pub correlation_key: String,
    pub leg_a: LegResult,
    pub leg_b: LegResult,
}

impl PairDispatchResult {
    pub fn outcome(&self) -> PairOutcome {
        match (self.leg_a.sent(), self.leg_b.sent()) {
            (true, true) => PairOutcome::Success,
            (false, false) => PairOutcome::TotalFailure,
            _ => PairOutcome::PartialFailure,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome() == PairOutcome::Success
    }

    /// Legs that did not reach `SENT`, for a targeted resend.
    pub fn failed_legs(&self) -> Vec<&LegResult> {
        [&self.leg_a, &self.leg_b]
            .into_iter()
            .filter(|leg| !leg.sent())
            .collect()
    }
}
