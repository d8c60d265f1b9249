use std::sync::Arc;

use anyhow::{Error, Result, anyhow};
use futures_util::future::join;
use tracing::{error, info, warn};

use crate::{
    clients::{
        gateway::{QueueGateway, remote_address},
        template::TemplateLibrary,
    },
    models::{
        dispatch::{LegResult, PairDispatchResult, PairOutcome},
        instruction::{Environment, OutboundInstruction, SendStatus},
        request::{LegParams, PairParams},
    },
    services::{correlation::CorrelationStore, template_engine},
};

pub struct OutboundDispatcher {
    gateway: Arc<dyn QueueGateway>,
    store: Arc<CorrelationStore>,
    templates: Arc<TemplateLibrary>,
    remote_exchange: Option<String>,
}

impl OutboundDispatcher {
    pub fn new(
        gateway: Arc<dyn QueueGateway>,
        store: Arc<CorrelationStore>,
        templates: Arc<TemplateLibrary>,
        remote_exchange: Option<String>,
    ) -> Self {
        Self {
            gateway,
            store,
            templates,
            remote_exchange,
        }
    }

    /// Renders, records and sends both legs of a pair.
    ///
    /// Both rows are recorded as `PENDING` before either send starts. The two
    /// sends run independently; a failure on one never skips the other.
    /// Only errors that prevent any send are returned as `Err`: a missing
    /// template, a correlation key or transaction id already in use, a
    /// failed insert, or a remote address that is not configured.
    pub async fn dispatch_pair(
        &self,
        template_name: &str,
        queue_name: &str,
        environment: Environment,
        pair: &PairParams,
    ) -> Result<PairDispatchResult, Error> {
        let target = self.target(queue_name, environment)?;
        let template = self.templates.fetch_template(template_name).await?;

        let instruction_a = self.instruction(&template, queue_name, environment, pair, &pair.leg_a);
        let instruction_b = self.instruction(&template, queue_name, environment, pair, &pair.leg_b);

        self.store.record_pair(&instruction_a, &instruction_b).await?;

        let (leg_a, leg_b) = join(
            self.send_leg(&instruction_a, environment, &target),
            self.send_leg(&instruction_b, environment, &target),
        )
        .await;

        let result = PairDispatchResult {
            correlation_key: pair.correlation_key.clone(),
            leg_a,
            leg_b,
        };

        match result.outcome() {
            PairOutcome::Success => info!(
                correlation_key = %result.correlation_key,
                queue = queue_name,
                environment = %environment,
                "Pair dispatched"
            ),
            PairOutcome::PartialFailure => warn!(
                correlation_key = %result.correlation_key,
                queue = queue_name,
                leg_a_sent = result.leg_a.sent(),
                leg_b_sent = result.leg_b.sent(),
                "Pair partially dispatched"
            ),
            PairOutcome::TotalFailure => error!(
                correlation_key = %result.correlation_key,
                queue = queue_name,
                "Pair dispatch failed on both legs"
            ),
        }

        Ok(result)
    }

    /// Sends the stored payload of one leg again.
    pub async fn resend_leg(&self, transaction_id: &str) -> Result<LegResult, Error> {
        let instruction = self
            .store
            .find(transaction_id)
            .await?
            .ok_or_else(|| anyhow!("No instruction with transaction id {}", transaction_id))?;

        if instruction.is_sent() {
            warn!(transaction_id, "Resending a leg that was already sent");
        }

        let target = self.target(&instruction.queue_name, instruction.environment)?;
        let result = self
            .send_leg(&instruction, instruction.environment, &target)
            .await;

        info!(
            transaction_id,
            correlation_key = %instruction.correlation_key,
            send_status = %result.send_status,
            "Leg resent"
        );

        Ok(result)
    }

    fn target(&self, queue_name: &str, environment: Environment) -> Result<String, Error> {
        match environment {
            Environment::Local => Ok(queue_name.to_string()),
            Environment::Remote => self
                .remote_exchange
                .as_deref()
                .map(|exchange| remote_address(exchange, queue_name))
                .ok_or_else(|| anyhow!("Remote environment requested but no remote address configured")),
        }
    }

    fn instruction(
        &self,
        template: &str,
        queue_name: &str,
        environment: Environment,
        pair: &PairParams,
        leg: &LegParams,
    ) -> OutboundInstruction {
        OutboundInstruction::new(
            leg.transaction_id.clone(),
            leg.linked_transaction_id.clone(),
            pair.correlation_key.clone(),
            leg.movement_type,
            queue_name.to_string(),
            environment,
            template_engine::render(template, &leg.params),
        )
    }

    async fn send_leg(
        &self,
        instruction: &OutboundInstruction,
        environment: Environment,
        target: &str,
    ) -> LegResult {
        let sent = match environment {
            Environment::Local => self.gateway.send_local(target, &instruction.payload).await,
            Environment::Remote => self.gateway.send_remote(target, &instruction.payload).await,
        };

        let (send_status, error) = match sent {
            Ok(true) => (SendStatus::Sent, None),
            Ok(false) => (
                SendStatus::SendFailed,
                Some(format!("Transport refused message for {}", target)),
            ),
            Err(e) => (SendStatus::SendFailed, Some(e.to_string())),
        };

        if let Some(error) = &error {
            warn!(
                transaction_id = %instruction.transaction_id,
                movement_type = %instruction.movement_type,
                target,
                error = %error,
                "Leg send failed"
            );
        }

        if let Err(e) = self
            .store
            .record_send_outcome(&instruction.transaction_id, send_status, error.clone())
            .await
        {
            error!(
                transaction_id = %instruction.transaction_id,
                error = %e,
                "Failed to record send outcome"
            );
        }

        LegResult {
            transaction_id: instruction.transaction_id.clone(),
            movement_type: instruction.movement_type,
            send_status,
            error,
        }
    }
}
