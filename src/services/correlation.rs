use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::models::{
    instruction::{OutboundInstruction, SendStatus},
    status::{CanonicalStatus, StatusRecord},
};

/// Persistent index of outbound instructions by transaction id and correlation key.
#[async_trait]
pub trait InstructionRepository: Send + Sync {
    /// Stores both legs of a pair, or neither.
    ///
    /// Fails if either transaction id or the shared correlation key is
    /// already recorded.
    async fn insert_pair(
        &self,
        leg_a: &OutboundInstruction,
        leg_b: &OutboundInstruction,
    ) -> Result<()>;

    /// Returns `false` when no row has the transaction id.
    async fn update_send_outcome(
        &self,
        transaction_id: &str,
        status: SendStatus,
        sent_at: Option<DateTime<Utc>>,
        error: Option<String>,
    ) -> Result<bool>;

    async fn find_by_transaction_id(&self, transaction_id: &str)
    -> Result<Option<OutboundInstruction>>;

    async fn find_by_correlation_key(&self, correlation_key: &str)
    -> Result<Vec<OutboundInstruction>>;

    /// Returns `false` when no row has the transaction id.
    async fn update_processing_status(
        &self,
        transaction_id: &str,
        processing_status: &str,
        reason: Option<String>,
        processed_at: DateTime<Utc>,
    ) -> Result<bool>;

    async fn health_check(&self) -> Result<()>;
}

/// Result of fanning one status out to the instructions sharing its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ApplyOutcome {
    pub matched: usize,
    pub updated: usize,
}

impl ApplyOutcome {
    pub fn no_match() -> Self {
        Self {
            matched: 0,
            updated: 0,
        }
    }

    pub fn is_unmatched(&self) -> bool {
        self.matched == 0
    }
}

pub struct CorrelationStore {
    repository: Arc<dyn InstructionRepository>,
}

impl CorrelationStore {
    pub fn new(repository: Arc<dyn InstructionRepository>) -> Self {
        Self { repository }
    }

    pub fn repository(&self) -> Arc<dyn InstructionRepository> {
        Arc::clone(&self.repository)
    }

    /// Records two legs that reference each other under one correlation key.
    pub async fn record_pair(
        &self,
        leg_a: &OutboundInstruction,
        leg_b: &OutboundInstruction,
    ) -> Result<()> {
        if leg_a.correlation_key != leg_b.correlation_key {
            bail!(
                "Legs {} and {} have different correlation keys",
                leg_a.transaction_id,
                leg_b.transaction_id
            );
        }
        if leg_a.transaction_id == leg_b.transaction_id
            || leg_a.linked_transaction_id != leg_b.transaction_id
            || leg_b.linked_transaction_id != leg_a.transaction_id
        {
            bail!(
                "Legs {} and {} are not linked to each other",
                leg_a.transaction_id,
                leg_b.transaction_id
            );
        }
        if leg_b.movement_type != leg_a.movement_type.opposite() {
            bail!(
                "Legs of {} must have opposite movement types, got {} and {}",
                leg_a.correlation_key,
                leg_a.movement_type,
                leg_b.movement_type
            );
        }

        self.repository.insert_pair(leg_a, leg_b).await?;

        debug!(
            correlation_key = %leg_a.correlation_key,
            leg_a = %leg_a.transaction_id,
            leg_b = %leg_b.transaction_id,
            "Instruction pair recorded"
        );

        Ok(())
    }

    pub async fn record_send_outcome(
        &self,
        transaction_id: &str,
        status: SendStatus,
        error: Option<String>,
    ) -> Result<()> {
        let sent_at = (status == SendStatus::Sent).then(Utc::now);

        if !self
            .repository
            .update_send_outcome(transaction_id, status, sent_at, error)
            .await?
        {
            warn!(transaction_id, "Send outcome for unknown instruction");
        }

        Ok(())
    }

    pub async fn find(&self, transaction_id: &str) -> Result<Option<OutboundInstruction>> {
        self.repository.find_by_transaction_id(transaction_id).await
    }

    pub async fn find_pair(&self, correlation_key: &str) -> Result<Vec<OutboundInstruction>> {
        self.repository.find_by_correlation_key(correlation_key).await
    }

    /// Writes the status onto every instruction sharing `correlation_key`.
    ///
    /// Each row is updated independently; a failed write is logged and the
    /// remaining rows are still attempted. Zero matches is not an error.
    pub async fn apply_status(
        &self,
        correlation_key: &str,
        status: CanonicalStatus,
        reason: Option<&str>,
    ) -> Result<ApplyOutcome> {
        let instructions = self.repository.find_by_correlation_key(correlation_key).await?;

        if instructions.is_empty() {
            warn!(
                correlation_key,
                status = %status,
                "No dispatched instruction matches status, dropping"
            );
            return Ok(ApplyOutcome::no_match());
        }

        let processed_at = Utc::now();
        let mut updated = 0;

        for instruction in &instructions {
            match self
                .repository
                .update_processing_status(
                    &instruction.transaction_id,
                    status.as_str(),
                    reason.map(str::to_string),
                    processed_at,
                )
                .await
            {
                Ok(true) => updated += 1,
                Ok(false) => warn!(
                    transaction_id = %instruction.transaction_id,
                    "Instruction vanished before status update"
                ),
                Err(e) => error!(
                    transaction_id = %instruction.transaction_id,
                    correlation_key,
                    error = %e,
                    "Failed to apply status to instruction"
                ),
            }
        }

        info!(
            correlation_key,
            status = %status,
            matched = instructions.len(),
            updated,
            "Status applied"
        );

        Ok(ApplyOutcome {
            matched: instructions.len(),
            updated,
        })
    }

    /// Applies a parsed record. A record without a usable key is logged as unmatched.
    pub async fn apply_record(&self, record: &StatusRecord) -> Result<ApplyOutcome> {
        match record.usable_correlation_key() {
            Some(key) => {
                self.apply_status(
                    key,
                    record.canonical_status,
                    record.additional_reason_info.as_deref(),
                )
                .await
            }
            None => {
                warn!(
                    source_queue = %record.source_queue,
                    business_message_id = record.business_message_id.as_deref().unwrap_or(""),
                    status = %record.canonical_status,
                    "Status without correlation key cannot be matched, dropping"
                );
                Ok(ApplyOutcome::no_match())
            }
        }
    }
}
