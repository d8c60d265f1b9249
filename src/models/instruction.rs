use std::fmt::{Display, Formatter, Result as FmtResult};

use anyhow::{Error, Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PROCESSING_STATUS: &str = "PENDING";

/// Role of one leg within a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    Receive,
    Deliver,
    Balance,
    Release,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Receive => "RECEIVE",
            MovementType::Deliver => "DELIVER",
            MovementType::Balance => "BALANCE",
            MovementType::Release => "RELEASE",
        }
    }

    /// Value written into the `MOVEMENT_TYPE` template placeholder.
    pub fn wire_code(&self) -> &'static str {
        match self {
            MovementType::Receive => "RECE",
            MovementType::Deliver => "DELI",
            MovementType::Balance => "BALANCE",
            MovementType::Release => "RELEASE",
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            MovementType::Receive => MovementType::Deliver,
            MovementType::Deliver => MovementType::Receive,
            MovementType::Balance => MovementType::Release,
            MovementType::Release => MovementType::Balance,
        }
    }

    pub fn parse(value: &str) -> Result<Self, Error> {
        match value {
            "RECEIVE" => Ok(MovementType::Receive),
            "DELIVER" => Ok(MovementType::Deliver),
            "BALANCE" => Ok(MovementType::Balance),
            "RELEASE" => Ok(MovementType::Release),
            other => Err(anyhow!("Unknown movement type '{}'", other)),
        }
    }
}

impl Display for MovementType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SendStatus {
    Pending,
    Sent,
    SendFailed,
}

impl SendStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SendStatus::Pending => "PENDING",
            SendStatus::Sent => "SENT",
            SendStatus::SendFailed => "SEND_FAILED",
        }
    }

    pub fn parse(value: &str) -> Result<Self, Error> {
        match value {
            "PENDING" => Ok(SendStatus::Pending),
            "SENT" => Ok(SendStatus::Sent),
            "SEND_FAILED" => Ok(SendStatus::SendFailed),
            other => Err(anyhow!("Unknown send status '{}'", other)),
        }
    }
}

impl Display for SendStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// Where a leg is sent: a queue on the local broker, or a remote exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Local,
    Remote,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Remote => "remote",
        }
    }

    pub fn parse(value: &str) -> Result<Self, Error> {
        match value {
            "local" => Ok(Environment::Local),
            "remote" => Ok(Environment::Remote),
            other => Err(anyhow!("Unknown environment '{}'", other)),
        }
    }
}

impl Display for Environment {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// One leg of a paired transaction, as persisted by the correlation store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundInstruction {
    pub transaction_id: String,
    pub linked_transaction_id: String,
    pub correlation_key: String,
    pub movement_type: MovementType,
    pub queue_name: String,
    pub environment: Environment,
    pub payload: String,
    pub send_status: SendStatus,
    pub processing_status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,

    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl OutboundInstruction {
    pub fn new(
        transaction_id: String,
        linked_transaction_id: String,
        correlation_key: String,
        movement_type: MovementType,
        queue_name: String,
        environment: Environment,
        payload: String,
    ) -> Self {
        Self {
            transaction_id,
            linked_transaction_id,
            correlation_key,
            movement_type,
            queue_name,
            environment,
            payload,
            send_status: SendStatus::Pending,
            processing_status: DEFAULT_PROCESSING_STATUS.to_string(),
            status_reason: None,
            created_at: Utc::now(),
            sent_at: None,
            processed_at: None,
            last_error: None,
        }
    }

    pub fn is_sent(&self) -> bool {
        self.send_status == SendStatus::Sent
    }
}
