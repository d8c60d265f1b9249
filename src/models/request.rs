use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::instruction::MovementType;

/// Template parameters, keyed by placeholder name.
pub type MessageParams = HashMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairKind {
    SecuritiesTransfer,
    Pledge,
}

impl PairKind {
    /// Movement types of leg A and leg B.
    pub fn movement_types(&self) -> (MovementType, MovementType) {
        match self {
            PairKind::SecuritiesTransfer => (MovementType::Receive, MovementType::Deliver),
            PairKind::Pledge => (MovementType::Balance, MovementType::Release),
        }
    }

    pub fn transaction_type(&self) -> &'static str {
        match self {
            PairKind::SecuritiesTransfer => "SETTLEMENT",
            PairKind::Pledge => "PLEDGE",
        }
    }

    pub fn default_template(&self) -> &'static str {
        match self {
            PairKind::SecuritiesTransfer => "securities_transfer",
            PairKind::Pledge => "pledge",
        }
    }
}

/// One business request that becomes two linked outbound legs.
///
/// For pledges the seller side is the pledgor and the buyer side the pledgee.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairRequest {
    pub kind: PairKind,
    pub security_id: String,
    pub quantity: Decimal,
    pub seller_account: String,
    pub seller_participant: String,
    pub buyer_account: String,
    pub buyer_participant: String,
    pub trade_date: NaiveDate,
    pub settlement_date: NaiveDate,

    #[serde(default)]
    pub correlation_key: Option<String>,

    #[serde(default)]
    pub transaction_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegParams {
    pub transaction_id: String,
    pub linked_transaction_id: String,
    pub movement_type: MovementType,
    pub params: MessageParams,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairParams {
    pub correlation_key: String,
    pub leg_a: LegParams,
    pub leg_b: LegParams,
}

/// Placeholder names filled in by the message builder.
pub mod param {
    pub const TRANSACTION_TYPE: &str = "TRANSACTION_TYPE";
    pub const TRANSACTION_ID: &str = "TRANSACTION_ID";
    pub const LINKED_TRANSACTION_ID: &str = "LINKED_TRANSACTION_ID";
    pub const CORRELATION_KEY: &str = "CORRELATION_KEY";
    pub const MOVEMENT_TYPE: &str = "MOVEMENT_TYPE";
    pub const CREDIT_DEBIT_INDICATOR: &str = "CREDIT_DEBIT_INDICATOR";
    pub const SECURITY_ID: &str = "SECURITY_ID";
    pub const QUANTITY: &str = "QUANTITY";
    pub const TRADE_DATE: &str = "TRADE_DATE";
    pub const SETTLEMENT_DATE: &str = "SETTLEMENT_DATE";
    pub const ACCOUNT_OWNER: &str = "ACCOUNT_OWNER";
    pub const SAFEKEEPING_ACCOUNT: &str = "SAFEKEEPING_ACCOUNT";
    pub const COUNTERPARTY_PARTICIPANT: &str = "COUNTERPARTY_PARTICIPANT";
    pub const COUNTERPARTY_ACCOUNT: &str = "COUNTERPARTY_ACCOUNT";
}
