//! Code generation and stored code metadata.

use super::RedeemError;
use compact_str::CompactString;
use numrent_sdk::objects::{AmountSpec, RedeemScope};
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::collections::HashMap;

/// Symbols used in codes: no `I`, `O`, `0` or `1`.
pub const CODE_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

pub fn generate_code(length: usize) -> CompactString {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| char::from(CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())]))
        .collect()
}

/// Canonical form of user-typed code input.
pub fn normalize_code(input: &str) -> CompactString {
    input.trim().to_uppercase().into()
}

/// Pick the credited amount once. Ranges resolve uniformly at cent precision.
pub fn resolve_amount(spec: &AmountSpec) -> Result<Decimal, RedeemError> {
    match spec {
        AmountSpec::Fixed { amount } => {
            if *amount <= Decimal::ZERO {
                return Err(RedeemError::InvalidRequest(
                    "amount must be positive".to_owned(),
                ));
            }
            Ok(*amount)
        }
        AmountSpec::Range { min, max } => {
            let hundred = Decimal::ONE_HUNDRED;
            let low = (*min * hundred).ceil().to_i64();
            let high = (*max * hundred).floor().to_i64();
            match (low, high) {
                (Some(low), Some(high)) if low > 0 && low <= high => {
                    let cents = rand::rng().random_range(low..=high);
                    Ok(Decimal::new(cents, 2))
                }
                _ => Err(RedeemError::InvalidRequest(format!(
                    "invalid amount range {min}..{max}"
                ))),
            }
        }
    }
}

const FIELD_AMOUNT: &str = "amount";
const FIELD_SCOPE: &str = "eligible";
const FIELD_MAX_USES: &str = "max_uses";
pub(super) const FIELD_REDEMPTIONS: &str = "redemptions";
pub(super) const FIELD_ACTIVE: &str = "active";
const FIELD_CREATED_AT: &str = "created_at";
const FIELD_EXPIRES_AT: &str = "expires_at";

/// Metadata stored in the `redeem:code:{CODE}` hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeRecord {
    pub amount: Decimal,
    pub scope: RedeemScope,
    pub max_uses: u32,
    pub redemptions: u32,
    pub active: bool,
    pub created_at: i64,
    pub expires_at: i64,
}

impl CodeRecord {
    pub fn to_fields(&self) -> Result<Vec<(&'static str, String)>, RedeemError> {
        Ok(vec![
            (FIELD_AMOUNT, self.amount.to_string()),
            (FIELD_SCOPE, serde_json::to_string(&self.scope)?),
            (FIELD_MAX_USES, self.max_uses.to_string()),
            (FIELD_REDEMPTIONS, self.redemptions.to_string()),
            (FIELD_ACTIVE, if self.active { "1" } else { "0" }.to_owned()),
            (FIELD_CREATED_AT, self.created_at.to_string()),
            (FIELD_EXPIRES_AT, self.expires_at.to_string()),
        ])
    }

    /// Parse a stored hash. An empty hash means the code does not exist.
    pub fn from_fields(
        code: &str,
        fields: &HashMap<String, String>,
    ) -> Result<Option<Self>, RedeemError> {
        if fields.is_empty() {
            return Ok(None);
        }

        let corrupt = |reason: String| RedeemError::Corrupt {
            code: code.to_owned(),
            reason,
        };
        let field = |name: &str| {
            fields
                .get(name)
                .map(String::as_str)
                .ok_or_else(|| corrupt(format!("missing field {name}")))
        };

        Ok(Some(Self {
            amount: field(FIELD_AMOUNT)?
                .parse()
                .map_err(|e| corrupt(format!("amount: {e}")))?,
            scope: serde_json::from_str(field(FIELD_SCOPE)?)
                .map_err(|e| corrupt(format!("eligible: {e}")))?,
            max_uses: field(FIELD_MAX_USES)?
                .parse()
                .map_err(|e| corrupt(format!("max_uses: {e}")))?,
            redemptions: match fields.get(FIELD_REDEMPTIONS) {
                None => 0,
                Some(raw) => raw
                    .parse()
                    .map_err(|e| corrupt(format!("redemptions: {e}")))?,
            },
            active: field(FIELD_ACTIVE)? == "1",
            created_at: field(FIELD_CREATED_AT)?
                .parse()
                .map_err(|e| corrupt(format!("created_at: {e}")))?,
            expires_at: field(FIELD_EXPIRES_AT)?
                .parse()
                .map_err(|e| corrupt(format!("expires_at: {e}")))?,
        }))
    }
}
