use std::sync::Arc;

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::{Client, NoTls, Row};
use tracing::{debug, error, info};

use crate::{
    models::{
        instruction::{Environment, MovementType, OutboundInstruction, SendStatus},
        retry::RetryConfig,
    },
    services::correlation::InstructionRepository,
    utils::retry_with_backoff,
};

const SELECT_COLUMNS: &str = "transaction_id, linked_transaction_id, correlation_key, \
    movement_type, queue_name, environment, payload, send_status, processing_status, \
    status_reason, created_at, sent_at, processed_at, last_error";

pub struct PostgresInstructionRepository {
    client: Arc<Client>,
    retry_config: RetryConfig,
}

impl PostgresInstructionRepository {
    pub async fn connect(database_url: &str, retry_config: RetryConfig) -> Result<Self, Error> {
        info!("Connecting to PostgreSQL database");

        let (client, connection) = tokio_postgres::connect(database_url, NoTls)
            .await
            .map_err(|e| anyhow!("Failed to connect to database: {}", e))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "PostgreSQL connection closed with error");
            }
        });

        info!("PostgreSQL connection established");

        Ok(Self {
            client: Arc::new(client),
            retry_config,
        })
    }

    pub async fn init_schema(&self) -> Result<(), Error> {
        self.client
            .batch_execute(
                r#"
                CREATE TABLE IF NOT EXISTS outbound_instructions (
                    transaction_id TEXT PRIMARY KEY,
                    linked_transaction_id TEXT NOT NULL,
                    correlation_key TEXT NOT NULL,
                    movement_type TEXT NOT NULL,
                    queue_name TEXT NOT NULL,
                    environment TEXT NOT NULL,
                    payload TEXT NOT NULL,
                    send_status TEXT NOT NULL,
                    processing_status TEXT NOT NULL DEFAULT 'PENDING',
                    status_reason TEXT,
                    created_at TIMESTAMPTZ NOT NULL,
                    sent_at TIMESTAMPTZ,
                    processed_at TIMESTAMPTZ,
                    last_error TEXT
                );
                CREATE UNIQUE INDEX IF NOT EXISTS idx_outbound_instructions_correlation_leg
                    ON outbound_instructions(correlation_key, movement_type);
                "#,
            )
            .await
            .map_err(|e| anyhow!("Failed to initialise schema: {}", e))?;

        debug!("Instruction schema ready");

        Ok(())
    }

    fn instruction_from_row(row: &Row) -> Result<OutboundInstruction, Error> {
        let movement_type: String = row.try_get("movement_type")?;
        let environment: String = row.try_get("environment")?;
        let send_status: String = row.try_get("send_status")?;

        Ok(OutboundInstruction {
            transaction_id: row.try_get("transaction_id")?,
            linked_transaction_id: row.try_get("linked_transaction_id")?,
            correlation_key: row.try_get("correlation_key")?,
            movement_type: MovementType::parse(&movement_type)?,
            queue_name: row.try_get("queue_name")?,
            environment: Environment::parse(&environment)?,
            payload: row.try_get("payload")?,
            send_status: SendStatus::parse(&send_status)?,
            processing_status: row.try_get("processing_status")?,
            status_reason: row.try_get("status_reason")?,
            created_at: row.try_get("created_at")?,
            sent_at: row.try_get("sent_at")?,
            processed_at: row.try_get("processed_at")?,
            last_error: row.try_get("last_error")?,
        })
    }
}

#[async_trait]
impl InstructionRepository for PostgresInstructionRepository {
    async fn insert_pair(
        &self,
        leg_a: &OutboundInstruction,
        leg_b: &OutboundInstruction,
    ) -> Result<()> {
        let existing = self
            .client
            .query_opt(
                "SELECT transaction_id FROM outbound_instructions \
                 WHERE correlation_key = $1 LIMIT 1",
                &[&leg_a.correlation_key],
            )
            .await
            .map_err(|e| anyhow!("Correlation lookup failed: {}", e))?;

        if let Some(row) = existing {
            let transaction_id: String = row.try_get("transaction_id")?;
            return Err(anyhow!(
                "Correlation key {} already recorded for {}",
                leg_a.correlation_key,
                transaction_id
            ));
        }

        let (a_movement, a_environment, a_send_status) = (
            leg_a.movement_type.as_str(),
            leg_a.environment.as_str(),
            leg_a.send_status.as_str(),
        );
        let (b_movement, b_environment, b_send_status) = (
            leg_b.movement_type.as_str(),
            leg_b.environment.as_str(),
            leg_b.send_status.as_str(),
        );

        // One statement, so both rows commit together or not at all.
        self.client
            .execute(
                r#"
                INSERT INTO outbound_instructions (
                    transaction_id,
                    linked_transaction_id,
                    correlation_key,
                    movement_type,
                    queue_name,
                    environment,
                    payload,
                    send_status,
                    processing_status,
                    status_reason,
                    created_at,
                    sent_at,
                    processed_at,
                    last_error
                )
                VALUES
                    ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14),
                    ($15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28)
                "#,
                &[
                    &leg_a.transaction_id,
                    &leg_a.linked_transaction_id,
                    &leg_a.correlation_key,
                    &a_movement,
                    &leg_a.queue_name,
                    &a_environment,
                    &leg_a.payload,
                    &a_send_status,
                    &leg_a.processing_status,
                    &leg_a.status_reason,
                    &leg_a.created_at,
                    &leg_a.sent_at,
                    &leg_a.processed_at,
                    &leg_a.last_error,
                    &leg_b.transaction_id,
                    &leg_b.linked_transaction_id,
                    &leg_b.correlation_key,
                    &b_movement,
                    &leg_b.queue_name,
                    &b_environment,
                    &leg_b.payload,
                    &b_send_status,
                    &leg_b.processing_status,
                    &leg_b.status_reason,
                    &leg_b.created_at,
                    &leg_b.sent_at,
                    &leg_b.processed_at,
                    &leg_b.last_error,
                ],
            )
            .await
            .map_err(|e| {
                error!(
                    error = %e,
                    correlation_key = %leg_a.correlation_key,
                    leg_a = %leg_a.transaction_id,
                    leg_b = %leg_b.transaction_id,
                    "Failed to insert instruction pair"
                );
                anyhow!("Database write failed: {}", e)
            })?;

        Ok(())
    }

    async fn update_send_outcome(
        &self,
        transaction_id: &str,
        status: SendStatus,
        sent_at: Option<DateTime<Utc>>,
        error: Option<String>,
    ) -> Result<bool> {
        let rows = retry_with_backoff(&self.retry_config, "update_send_outcome", || {
            let client = Arc::clone(&self.client);
            let error = error.clone();

            async move {
                client
                    .execute(
                        "UPDATE outbound_instructions \
                         SET send_status = $1, sent_at = COALESCE($2, sent_at), last_error = $3 \
                         WHERE transaction_id = $4",
                        &[&status.as_str(), &sent_at, &error, &transaction_id],
                    )
                    .await
                    .map_err(|e| e.to_string())
            }
        })
        .await
        .map_err(|e| anyhow!("update_send_outcome failed: {}", e))?;

        Ok(rows > 0)
    }

    async fn find_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> Result<Option<OutboundInstruction>> {
        let query = format!(
            "SELECT {} FROM outbound_instructions WHERE transaction_id = $1",
            SELECT_COLUMNS
        );

        let row = self
            .client
            .query_opt(query.as_str(), &[&transaction_id])
            .await
            .map_err(|e| anyhow!("Instruction lookup failed: {}", e))?;

        row.as_ref().map(Self::instruction_from_row).transpose()
    }

    async fn find_by_correlation_key(
        &self,
        correlation_key: &str,
    ) -> Result<Vec<OutboundInstruction>> {
        let query = format!(
            "SELECT {} FROM outbound_instructions WHERE correlation_key = $1 \
             ORDER BY transaction_id",
            SELECT_COLUMNS
        );

        let rows = self
            .client
            .query(query.as_str(), &[&correlation_key])
            .await
            .map_err(|e| anyhow!("Correlation lookup failed: {}", e))?;

        rows.iter().map(Self::instruction_from_row).collect()
    }

    async fn update_processing_status(
        &self,
        transaction_id: &str,
        processing_status: &str,
        reason: Option<String>,
        processed_at: DateTime<Utc>,
    ) -> Result<bool> {
        let rows = retry_with_backoff(&self.retry_config, "update_processing_status", || {
            let client = Arc::clone(&self.client);
            let reason = reason.clone();

            async move {
                client
                    .execute(
                        "UPDATE outbound_instructions \
                         SET processing_status = $1, status_reason = $2, processed_at = $3 \
                         WHERE transaction_id = $4",
                        &[&processing_status, &reason, &processed_at, &transaction_id],
                    )
                    .await
                    .map_err(|e| e.to_string())
            }
        })
        .await
        .map_err(|e| anyhow!("update_processing_status failed: {}", e))?;

        debug!(
            transaction_id,
            processing_status,
            rows,
            "Processing status written"
        );

        Ok(rows > 0)
    }

    async fn health_check(&self) -> Result<()> {
        self.client
            .query_one("SELECT 1", &[])
            .await
            .map_err(|e| anyhow!("Database health check failed: {}", e))?;

        Ok(())
    }
}
