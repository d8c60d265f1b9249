use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, mapref::entry::Entry};

use crate::{
    models::instruction::{OutboundInstruction, SendStatus},
    services::correlation::InstructionRepository,
};

/// Instruction repository kept in process memory.
///
/// Used when no database is configured, and by the test suite.
#[derive(Default)]
pub struct InMemoryInstructionRepository {
    instructions: DashMap<String, OutboundInstruction>,
    by_correlation_key: DashMap<String, Vec<String>>,
}

impl InMemoryInstructionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    fn insert_row(&self, instruction: &OutboundInstruction) -> Result<()> {
        match self.instructions.entry(instruction.transaction_id.clone()) {
            Entry::Occupied(_) => Err(anyhow!(
                "Instruction {} already recorded",
                instruction.transaction_id
            )),
            Entry::Vacant(slot) => {
                slot.insert(instruction.clone());
                Ok(())
            }
        }
    }
}

#[async_trait]
impl InstructionRepository for InMemoryInstructionRepository {
    async fn insert_pair(
        &self,
        leg_a: &OutboundInstruction,
        leg_b: &OutboundInstruction,
    ) -> Result<()> {
        // The vacant key entry holds its shard lock until both rows are in place.
        let slot = match self.by_correlation_key.entry(leg_a.correlation_key.clone()) {
            Entry::Occupied(_) => {
                return Err(anyhow!(
                    "Correlation key {} already recorded",
                    leg_a.correlation_key
                ));
            }
            Entry::Vacant(slot) => slot,
        };

        self.insert_row(leg_a)?;
        if let Err(e) = self.insert_row(leg_b) {
            self.instructions.remove(&leg_a.transaction_id);
            return Err(e);
        }

        slot.insert(vec![
            leg_a.transaction_id.clone(),
            leg_b.transaction_id.clone(),
        ]);

        Ok(())
    }

    async fn update_send_outcome(
        &self,
        transaction_id: &str,
        status: SendStatus,
        sent_at: Option<DateTime<Utc>>,
        error: Option<String>,
    ) -> Result<bool> {
        let Some(mut instruction) = self.instructions.get_mut(transaction_id) else {
            return Ok(false);
        };

        instruction.send_status = status;
        if sent_at.is_some() {
            instruction.sent_at = sent_at;
        }
        instruction.last_error = error;

        Ok(true)
    }

    async fn find_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> Result<Option<OutboundInstruction>> {
        Ok(self
            .instructions
            .get(transaction_id)
            .map(|entry| entry.value().clone()))
    }

    async fn find_by_correlation_key(
        &self,
        correlation_key: &str,
    ) -> Result<Vec<OutboundInstruction>> {
        let ids = self
            .by_correlation_key
            .get(correlation_key)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();

        let mut found: Vec<OutboundInstruction> = ids
            .iter()
            .filter_map(|id| self.instructions.get(id).map(|entry| entry.value().clone()))
            .collect();
        found.sort_by(|a, b| a.transaction_id.cmp(&b.transaction_id));

        Ok(found)
    }

    async fn update_processing_status(
        &self,
        transaction_id: &str,
        processing_status: &str,
        reason: Option<String>,
        processed_at: DateTime<Utc>,
    ) -> Result<bool> {
        let Some(mut instruction) = self.instructions.get_mut(transaction_id) else {
            return Ok(false);
        };

        instruction.processing_status = processing_status.to_string();
        instruction.status_reason = reason;
        instruction.processed_at = Some(processed_at);

        Ok(true)
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
