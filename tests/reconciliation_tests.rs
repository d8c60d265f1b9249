mod common;

use std::sync::Arc;

use anyhow::Result;
use rust_decimal::Decimal;
use settlement_service::{
    config::{PollerConfig, StatusQueueConfig},
    models::{
        dispatch::PairOutcome,
        instruction::{Environment, MovementType, SendStatus},
    },
    services::{
        message_builder::MessageBuilder,
        poller::{QueueStateRegistry, StatusPoller, TickOutcome},
    },
};

use common::{OUTBOUND_QUEUE, harness, pledge_request, status_document, transfer_request};

const STATUS_QUEUE: &str = "csd.status";

/// Test: Dispatch, then MATCHED and SETTLED statuses land on both legs in order
#[tokio::test]
async fn test_transfer_lifecycle() -> Result<()> {
    let h = harness().await;
    let registry = Arc::new(QueueStateRegistry::new(&[StatusQueueConfig {
        name: STATUS_QUEUE.to_string(),
        enabled: true,
    }]));
    let poller = StatusPoller::new(
        h.gateway.clone(),
        Arc::clone(&h.store),
        registry,
        PollerConfig::default(),
    );

    let mut request = transfer_request();
    request.quantity = Decimal::from(10);
    let pair = MessageBuilder::new().build_pair(&request)?;
    let key = pair.correlation_key.clone();

    let result = h
        .dispatcher
        .dispatch_pair("transfer", OUTBOUND_QUEUE, Environment::Local, &pair)
        .await?;
    assert_eq!(result.outcome(), PairOutcome::Success);

    let legs = h.store.find_pair(&key).await?;
    assert_eq!(legs.len(), 2);
    let (a, b) = (&legs[0], &legs[1]);
    assert_eq!(a.movement_type, MovementType::Receive);
    assert_eq!(b.movement_type, a.movement_type.opposite());
    assert_eq!(a.linked_transaction_id, b.transaction_id);
    assert_eq!(b.linked_transaction_id, a.transaction_id);
    assert!(a.payload.contains("<Qty>10</Qty>"));

    h.gateway
        .push_status(STATUS_QUEUE, &status_document(&key, "0201", None));
    h.gateway
        .push_status(STATUS_QUEUE, &status_document(&key, "0202", Some("Settled")));

    assert_eq!(
        poller.tick(STATUS_QUEUE).await,
        TickOutcome::Applied { updated: 2 }
    );
    for leg in h.store.find_pair(&key).await? {
        assert_eq!(leg.processing_status, "MATCHED");
    }

    assert_eq!(
        poller.tick(STATUS_QUEUE).await,
        TickOutcome::Applied { updated: 2 }
    );

    let legs = h.store.find_pair(&key).await?;
    assert_eq!(legs.len(), 2);
    for leg in legs {
        assert_eq!(leg.send_status, SendStatus::Sent);
        assert_eq!(leg.processing_status, "SETTLED");
        assert_eq!(leg.status_reason.as_deref(), Some("Settled"));
    }

    Ok(())
}

/// Test: Statuses for a partially sent pledge still update both recorded legs
#[tokio::test]
async fn test_partial_pledge_still_reconciled() -> Result<()> {
    let h = harness().await;
    let registry = Arc::new(QueueStateRegistry::new(&[StatusQueueConfig {
        name: STATUS_QUEUE.to_string(),
        enabled: true,
    }]));
    let poller = StatusPoller::new(
        h.gateway.clone(),
        Arc::clone(&h.store),
        registry,
        PollerConfig::default(),
    );

    let mut request = pledge_request();
    request.correlation_key = Some("8PLEDGE01".to_string());
    request.transaction_id = Some("240305090000001".to_string());
    let pair = MessageBuilder::new().build_pair(&request)?;

    h.gateway
        .refuse_bodies_containing("<TxId>240305090000001B</TxId>");

    let result = h
        .dispatcher
        .dispatch_pair("transfer", OUTBOUND_QUEUE, Environment::Local, &pair)
        .await?;
    assert_eq!(result.outcome(), PairOutcome::PartialFailure);

    h.gateway
        .push_status(STATUS_QUEUE, &status_document("8PLEDGE01", "0206", Some("Leg missing")));

    assert_eq!(
        poller.tick(STATUS_QUEUE).await,
        TickOutcome::Applied { updated: 2 }
    );

    let b = h.store.find("240305090000001B").await?.expect("leg B recorded");
    assert_eq!(b.send_status, SendStatus::SendFailed);
    assert_eq!(b.processing_status, "REJECTED");

    Ok(())
}
