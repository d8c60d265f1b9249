#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use settlement_service::{
    clients::{gateway::QueueGateway, memory::InMemoryInstructionRepository, template::TemplateLibrary},
    models::request::{PairKind, PairRequest},
    services::{correlation::CorrelationStore, dispatcher::OutboundDispatcher},
};

pub const OUTBOUND_QUEUE: &str = "settlement.outbound";
pub const REMOTE_EXCHANGE: &str = "csd.exchange";

pub const TRANSFER_TEMPLATE: &str = r#"<Document xmlns="urn:iso:std:iso:20022:tech:xsd:sese.023.001.09">
    <SctiesSttlmTxInstr>
        <TxId>{{TRANSACTION_ID}}</TxId>
        <LkdTxId>{{LINKED_TRANSACTION_ID}}</LkdTxId>
        <CmonId>{{CORRELATION_KEY}}</CmonId>
        <SctiesMvmntTp>{{MOVEMENT_TYPE}}</SctiesMvmntTp>
        <FinInstrmId>{{SECURITY_ID}}</FinInstrmId>
        <Qty>{{QUANTITY}}</Qty>
        <AcctOwnr>{{ACCOUNT_OWNER}}</AcctOwnr>
        <SfkpgAcct>{{SAFEKEEPING_ACCOUNT}}</SfkpgAcct>
    </SctiesSttlmTxInstr>
</Document>"#;

/// What the fake transport does with one send.
#[derive(Debug, Clone)]
pub enum SendBehaviour {
    Accept,
    Refuse,
    Fail(String),
}

/// Scripted in-process transport.
///
/// Sends are recorded and accepted unless a behaviour is set for the target.
/// Receives pop scripted results per queue and return `Ok(None)` once a
/// queue's script is exhausted.
#[derive(Default)]
pub struct FakeGateway {
    sent: Mutex<Vec<SentMessage>>,
    send_behaviour: Mutex<HashMap<String, SendBehaviour>>,
    refuse_bodies_containing: Mutex<HashSet<String>>,
    inbound: Mutex<HashMap<String, VecDeque<Result<Option<String>, String>>>>,
    receive_calls: Mutex<HashMap<String, usize>>,
    healthy: Mutex<bool>,
    sends: AtomicUsize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub target: String,
    pub remote: bool,
    pub body: String,
}

impl FakeGateway {
    pub fn new() -> Self {
        let gateway = Self::default();
        *gateway.healthy.lock().unwrap() = true;
        gateway
    }

    pub fn set_send_behaviour(&self, target: &str, behaviour: SendBehaviour) {
        self.send_behaviour
            .lock()
            .unwrap()
            .insert(target.to_string(), behaviour);
    }

    /// Refuses any send whose body contains `fragment`, whatever the target.
    pub fn refuse_bodies_containing(&self, fragment: &str) {
        self.refuse_bodies_containing
            .lock()
            .unwrap()
            .insert(fragment.to_string());
    }

    pub fn clear_send_behaviour(&self) {
        self.send_behaviour.lock().unwrap().clear();
        self.refuse_bodies_containing.lock().unwrap().clear();
    }

    pub fn push_status(&self, queue_name: &str, body: &str) {
        self.push_receive(queue_name, Ok(Some(body.to_string())));
    }

    pub fn push_receive_error(&self, queue_name: &str, message: &str) {
        self.push_receive(queue_name, Err(message.to_string()));
    }

    pub fn push_receive(&self, queue_name: &str, result: Result<Option<String>, String>) {
        self.inbound
            .lock()
            .unwrap()
            .entry(queue_name.to_string())
            .or_default()
            .push_back(result);
    }

    pub fn set_healthy(&self, healthy: bool) {
        *self.healthy.lock().unwrap() = healthy;
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn send_count(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    pub fn receive_calls(&self, queue_name: &str) -> usize {
        self.receive_calls
            .lock()
            .unwrap()
            .get(queue_name)
            .copied()
            .unwrap_or(0)
    }

    fn send(&self, target: &str, remote: bool, body: &str) -> Result<bool> {
        self.sends.fetch_add(1, Ordering::SeqCst);

        let refused_by_body = self
            .refuse_bodies_containing
            .lock()
            .unwrap()
            .iter()
            .any(|fragment| body.contains(fragment.as_str()));

        let behaviour = if refused_by_body {
            SendBehaviour::Refuse
        } else {
            self.send_behaviour
                .lock()
                .unwrap()
                .get(target)
                .cloned()
                .unwrap_or(SendBehaviour::Accept)
        };

        match behaviour {
            SendBehaviour::Accept => {
                self.sent.lock().unwrap().push(SentMessage {
                    target: target.to_string(),
                    remote,
                    body: body.to_string(),
                });
                Ok(true)
            }
            SendBehaviour::Refuse => Ok(false),
            SendBehaviour::Fail(message) => Err(anyhow!(message)),
        }
    }
}

#[async_trait]
impl QueueGateway for FakeGateway {
    async fn send_local(&self, queue_name: &str, body: &str) -> Result<bool> {
        self.send(queue_name, false, body)
    }

    async fn send_remote(&self, remote_address: &str, body: &str) -> Result<bool> {
        self.send(remote_address, true, body)
    }

    async fn receive(&self, queue_name: &str, _timeout: Duration) -> Result<Option<String>> {
        *self
            .receive_calls
            .lock()
            .unwrap()
            .entry(queue_name.to_string())
            .or_default() += 1;

        let next = self
            .inbound
            .lock()
            .unwrap()
            .get_mut(queue_name)
            .and_then(VecDeque::pop_front);

        match next {
            Some(Ok(body)) => Ok(body),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok(None),
        }
    }

    async fn is_healthy(&self) -> bool {
        *self.healthy.lock().unwrap()
    }
}

pub struct Harness {
    pub gateway: Arc<FakeGateway>,
    pub repository: Arc<InMemoryInstructionRepository>,
    pub store: Arc<CorrelationStore>,
    pub templates: Arc<TemplateLibrary>,
    pub dispatcher: OutboundDispatcher,
}

/// Dispatcher wired to a fake transport, an in-memory repository and a
/// `transfer` template registered in memory.
pub async fn harness() -> Harness {
    let gateway = Arc::new(FakeGateway::new());
    let repository = Arc::new(InMemoryInstructionRepository::new());
    let store = Arc::new(CorrelationStore::new(repository.clone()));
    let templates = Arc::new(TemplateLibrary::new("templates"));
    templates
        .insert("transfer", TRANSFER_TEMPLATE.to_string())
        .await;

    let dispatcher = OutboundDispatcher::new(
        gateway.clone(),
        Arc::clone(&store),
        Arc::clone(&templates),
        Some(REMOTE_EXCHANGE.to_string()),
    );

    Harness {
        gateway,
        repository,
        store,
        templates,
        dispatcher,
    }
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

pub fn transfer_request() -> PairRequest {
    PairRequest {
        kind: PairKind::SecuritiesTransfer,
        security_id: "KRA0000000001".to_string(),
        quantity: Decimal::new(1500, 0),
        seller_account: "SELL-ACC-001".to_string(),
        seller_participant: "PART001".to_string(),
        buyer_account: "BUY-ACC-002".to_string(),
        buyer_participant: "PART002".to_string(),
        trade_date: date(2024, 3, 4),
        settlement_date: date(2024, 3, 6),
        correlation_key: None,
        transaction_id: None,
    }
}

pub fn pledge_request() -> PairRequest {
    PairRequest {
        kind: PairKind::Pledge,
        ..transfer_request()
    }
}

/// Minimal status document in the namespaced vendor form.
pub fn status_document(correlation_key: &str, code: &str, reason: Option<&str>) -> String {
    let reason = reason
        .map(|reason| format!("<AddtlRsnInf>{}</AddtlRsnInf>", reason))
        .unwrap_or_default();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<BizMsgEnvlp xmlns:head="urn:iso:std:iso:20022:tech:xsd:head.001.001.02" xmlns:doc="urn:iso:std:iso:20022:tech:xsd:sese.024.001.10">
    <head:AppHdr>
        <head:BizMsgIdr>MSG-{key}</head:BizMsgIdr>
    </head:AppHdr>
    <doc:Document>
        <doc:SctiesSttlmTxStsAdvc>
            <doc:TxId>
                <doc:AcctOwnrTxId>{key}A</doc:AcctOwnrTxId>
                <doc:CmonId>{key}</doc:CmonId>
            </doc:TxId>
            <doc:PrcgSts>
                <doc:Prtry>
                    <doc:Id>{code}</doc:Id>
                    <doc:Issr>CSD</doc:Issr>
                </doc:Prtry>
                {reason}
            </doc:PrcgSts>
        </doc:SctiesSttlmTxStsAdvc>
    </doc:Document>
</BizMsgEnvlp>"#,
        key = correlation_key,
        code = code,
        reason = reason.replace("AddtlRsnInf", "doc:AddtlRsnInf"),
    )
}
