use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties,
    options::{BasicGetOptions, BasicPublishOptions, ConfirmSelectOptions, QueueDeclareOptions},
    publisher_confirm::Confirmation,
    types::FieldTable,
};
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};

use crate::{clients::gateway::QueueGateway, config::Config};

const RECEIVE_POLL_STEP: Duration = Duration::from_millis(50);

pub struct RabbitMqGateway {
    connection: Connection,
    channel: Channel,
}

impl RabbitMqGateway {
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        info!("Connecting to RabbitMQ");

        let connection = Connection::connect(&config.rabbitmq_url, ConnectionProperties::default())
            .await
            .map_err(|e| anyhow!("Failed to connect to RabbitMQ: {}", e))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| anyhow!("RabbitMQ channel creation failed: {}", e))?;

        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| anyhow!("Failed to enable publisher confirms: {}", e))?;

        let gateway = Self {
            connection,
            channel,
        };

        gateway.declare_queue(&config.outbound_queue_name).await?;
        for queue in config.status_queue_configs() {
            gateway.declare_queue(&queue.name).await?;
        }

        info!("RabbitMQ gateway ready");

        Ok(gateway)
    }

    async fn declare_queue(&self, queue_name: &str) -> Result<(), Error> {
        self.channel
            .queue_declare(
                queue_name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to declare queue {}: {}", queue_name, e))?;

        debug!(queue = queue_name, "Queue declared");

        Ok(())
    }

    async fn publish(&self, exchange: &str, routing_key: &str, body: &str) -> Result<bool, Error> {
        let confirm = self
            .channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                body.as_bytes(),
                BasicProperties::default().with_delivery_mode(2),
            )
            .await
            .map_err(|e| anyhow!("Failed to publish to {}: {}", routing_key, e))?
            .await
            .map_err(|e| anyhow!("Publisher confirm failed for {}: {}", routing_key, e))?;

        if matches!(confirm, Confirmation::Nack(_)) {
            warn!(exchange, routing_key, "Broker rejected message");
            return Ok(false);
        }

        Ok(true)
    }
}

#[async_trait]
impl QueueGateway for RabbitMqGateway {
    async fn send_local(&self, queue_name: &str, body: &str) -> Result<bool> {
        self.publish("", queue_name, body).await
    }

    async fn send_remote(&self, remote_address: &str, body: &str) -> Result<bool> {
        let (exchange, routing_key) = remote_address
            .split_once('/')
            .ok_or_else(|| anyhow!("Malformed remote address '{}'", remote_address))?;

        self.publish(exchange, routing_key, body).await
    }

    async fn receive(&self, queue_name: &str, wait: Duration) -> Result<Option<String>> {
        let deadline = Instant::now() + wait;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());

            let message = timeout(
                remaining.max(RECEIVE_POLL_STEP),
                self.channel
                    .basic_get(queue_name, BasicGetOptions { no_ack: true }),
            )
            .await
            .map_err(|_| anyhow!("Receive from {} timed out", queue_name))?
            .map_err(|e| anyhow!("Failed to read from {}: {}", queue_name, e))?;

            if let Some(message) = message {
                let body = String::from_utf8(message.delivery.data)
                    .map_err(|e| anyhow!("Message on {} is not UTF-8: {}", queue_name, e))?;
                return Ok(Some(body));
            }

            if remaining.is_zero() {
                return Ok(None);
            }

            sleep(remaining.min(RECEIVE_POLL_STEP)).await;
        }
    }

    async fn is_healthy(&self) -> bool {
        self.connection.status().connected() && self.channel.status().connected()
    }
}
