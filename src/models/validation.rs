use anyhow::{Result, anyhow};
use rust_decimal::Decimal;

use crate::models::request::PairRequest;

pub const MAX_CORRELATION_KEY_LEN: usize = 35;

pub fn validate_security_id(security_id: &str) -> Result<()> {
    if security_id.is_empty() {
        return Err(anyhow!("Security identifier cannot be empty"));
    }

    if security_id.len() > 35 {
        return Err(anyhow!("Security identifier too long (maximum 35 characters)"));
    }

    if !security_id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(anyhow!("Security identifier contains invalid characters"));
    }

    Ok(())
}

pub fn validate_correlation_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(anyhow!("Correlation key cannot be empty"));
    }

    if key.len() > MAX_CORRELATION_KEY_LEN {
        return Err(anyhow!(
            "Correlation key too long (maximum {} characters)",
            MAX_CORRELATION_KEY_LEN
        ));
    }

    if !key.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(anyhow!("Correlation key contains invalid characters"));
    }

    Ok(())
}

pub fn validate_pair_request(request: &PairRequest) -> Result<()> {
    validate_security_id(&request.security_id)?;

    if request.quantity <= Decimal::ZERO {
        return Err(anyhow!("Quantity must be positive, got {}", request.quantity));
    }

    if request.settlement_date < request.trade_date {
        return Err(anyhow!(
            "Settlement date {} precedes trade date {}",
            request.settlement_date,
            request.trade_date
        ));
    }

    for (field, value) in [
        ("seller_account", &request.seller_account),
        ("seller_participant", &request.seller_participant),
        ("buyer_account", &request.buyer_account),
        ("buyer_participant", &request.buyer_participant),
    ] {
        if value.trim().is_empty() {
            return Err(anyhow!("Missing {}", field));
        }
    }

    if let Some(key) = &request.correlation_key {
        validate_correlation_key(key)?;
    }

    Ok(())
}
