use anyhow::{Error, Result};
use chrono::Utc;
use rand::Rng;
use tracing::debug;

use crate::models::{
    instruction::MovementType,
    request::{LegParams, MessageParams, PairParams, PairRequest, param},
    validation::validate_pair_request,
};

pub const CORRELATION_KEY_LEN: usize = 9;

/// Transaction ids are capped at 16 characters; one is used by the leg suffix.
pub const TRANSACTION_ID_MAX_LEN: usize = 16;
pub const TRANSACTION_BASE_MAX_LEN: usize = TRANSACTION_ID_MAX_LEN - 1;

pub const LEG_A_SUFFIX: char = 'A';
pub const LEG_B_SUFFIX: char = 'B';

const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const BASE36_DIGITS: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Millisecond clock in base 36; eight digits last until 2059.
const TIMESTAMP_LEN: usize = 8;
const TRANSACTION_SUFFIX_LEN: usize = TRANSACTION_BASE_MAX_LEN - TIMESTAMP_LEN;

/// Builds the two linked parameter sets for one business request.
///
/// Only the correlation key and the transaction base are random, and both
/// can be fixed through the request, which makes the output reproducible.
#[derive(Debug, Clone, Default)]
pub struct MessageBuilder;

impl MessageBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build_pair(&self, request: &PairRequest) -> Result<PairParams, Error> {
        validate_pair_request(request)?;

        let correlation_key = request
            .correlation_key
            .clone()
            .unwrap_or_else(generate_correlation_key);

        let base = match request.transaction_id.as_deref().map(str::trim) {
            Some(supplied) if !supplied.is_empty() => transaction_base(supplied),
            _ => generate_transaction_base(),
        };

        let id_a = format!("{}{}", base, LEG_A_SUFFIX);
        let id_b = format!("{}{}", base, LEG_B_SUFFIX);
        let (movement_a, movement_b) = request.kind.movement_types();

        let common = common_params(request, &correlation_key);

        let leg_a = LegParams {
            params: leg_params(&common, request, &id_a, &id_b, movement_a),
            transaction_id: id_a.clone(),
            linked_transaction_id: id_b.clone(),
            movement_type: movement_a,
        };

        let leg_b = LegParams {
            params: leg_params(&common, request, &id_b, &id_a, movement_b),
            transaction_id: id_b,
            linked_transaction_id: id_a,
            movement_type: movement_b,
        };

        debug!(
            correlation_key = %correlation_key,
            leg_a = %leg_a.transaction_id,
            leg_b = %leg_b.transaction_id,
            kind = request.kind.transaction_type(),
            "Pair parameters built"
        );

        Ok(PairParams {
            correlation_key,
            leg_a,
            leg_b,
        })
    }
}

fn common_params(request: &PairRequest, correlation_key: &str) -> MessageParams {
    MessageParams::from([
        (
            param::TRANSACTION_TYPE.to_string(),
            request.kind.transaction_type().to_string(),
        ),
        (param::CORRELATION_KEY.to_string(), correlation_key.to_string()),
        (param::SECURITY_ID.to_string(), request.security_id.clone()),
        (param::QUANTITY.to_string(), request.quantity.normalize().to_string()),
        (
            param::TRADE_DATE.to_string(),
            request.trade_date.format("%Y-%m-%d").to_string(),
        ),
        (
            param::SETTLEMENT_DATE.to_string(),
            request.settlement_date.format("%Y-%m-%d").to_string(),
        ),
    ])
}

fn leg_params(
    common: &MessageParams,
    request: &PairRequest,
    transaction_id: &str,
    linked_transaction_id: &str,
    movement_type: MovementType,
) -> MessageParams {
    let mut params = common.clone();

    // The receiving leg debits the seller's account; the delivering leg credits the buyer's.
    let (indicator, owner, account, counterparty, counterparty_account) = match movement_type {
        MovementType::Receive | MovementType::Balance => (
            "DBIT",
            &request.seller_participant,
            &request.seller_account,
            &request.buyer_participant,
            &request.buyer_account,
        ),
        MovementType::Deliver | MovementType::Release => (
            "CRDT",
            &request.buyer_participant,
            &request.buyer_account,
            &request.seller_participant,
            &request.seller_account,
        ),
    };

    params.insert(param::TRANSACTION_ID.to_string(), transaction_id.to_string());
    params.insert(
        param::LINKED_TRANSACTION_ID.to_string(),
        linked_transaction_id.to_string(),
    );
    params.insert(
        param::MOVEMENT_TYPE.to_string(),
        movement_type.wire_code().to_string(),
    );
    params.insert(param::CREDIT_DEBIT_INDICATOR.to_string(), indicator.to_string());
    params.insert(param::ACCOUNT_OWNER.to_string(), owner.clone());
    params.insert(param::SAFEKEEPING_ACCOUNT.to_string(), account.clone());
    params.insert(param::COUNTERPARTY_PARTICIPANT.to_string(), counterparty.clone());
    params.insert(
        param::COUNTERPARTY_ACCOUNT.to_string(),
        counterparty_account.clone(),
    );

    params
}

/// One leading digit followed by eight upper-case alphanumerics.
pub fn generate_correlation_key() -> String {
    let mut rng = rand::rng();
    let mut key = String::with_capacity(CORRELATION_KEY_LEN);

    key.push(char::from(b'0' + rng.random_range(0..10u8)));
    for _ in 1..CORRELATION_KEY_LEN {
        key.push(char::from(ALPHANUMERIC[rng.random_range(0..ALPHANUMERIC.len())]));
    }

    key
}

/// Millisecond timestamp plus seven random alphanumerics, fifteen characters in all.
///
/// Bases from different milliseconds sort in creation order.
pub fn generate_transaction_base() -> String {
    let millis = u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default();
    let mut rng = rand::rng();

    let mut base = base36(millis, TIMESTAMP_LEN);
    for _ in 0..TRANSACTION_SUFFIX_LEN {
        base.push(char::from(ALPHANUMERIC[rng.random_range(0..ALPHANUMERIC.len())]));
    }

    base
}

fn base36(mut value: u64, width: usize) -> String {
    let mut digits = vec![b'0'; width];
    for digit in digits.iter_mut().rev() {
        *digit = BASE36_DIGITS[(value % 36) as usize];
        value /= 36;
    }

    digits.into_iter().map(char::from).collect()
}

/// Caller-supplied ids keep their first characters up to the base length.
pub fn transaction_base(supplied: &str) -> String {
    supplied.chars().take(TRANSACTION_BASE_MAX_LEN).collect()
}
