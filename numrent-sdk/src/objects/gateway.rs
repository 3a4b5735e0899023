//! Settlement gateway response body.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Raw status response returned by the settlement gateway.
///
/// Only `STATUS` is required; the other fields are informational.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementResponse {
    #[serde(rename = "STATUS")]
    pub status: String,
    #[serde(rename = "TXNAMOUNT", default)]
    pub txn_amount: Option<String>,
    #[serde(rename = "ORDERID", default)]
    pub order_id: Option<String>,
}

/// Interpreted settlement status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementStatus {
    Success,
    Failure,
    Pending,
}

impl SettlementResponse {
    pub const SUCCESS: &str = "TXN_SUCCESS";
    pub const FAILURE: &str = "TXN_FAILURE";

    /// Map the raw `STATUS` field. Anything unrecognised is still pending.
    pub fn settlement_status(&self) -> SettlementStatus {
        match self.status.as_str() {
            Self::SUCCESS => SettlementStatus::Success,
            Self::FAILURE => SettlementStatus::Failure,
            _ => SettlementStatus::Pending,
        }
    }

    /// The settled amount, if the gateway reported a parseable one.
    pub fn settled_amount(&self) -> Option<Decimal> {
        self.txn_amount.as_deref().and_then(|s| s.trim().parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_status_mapping() {
        let parse = |json: &str| serde_json::from_str::<SettlementResponse>(json).unwrap();

        let ok = parse(r#"{"STATUS":"TXN_SUCCESS","TXNAMOUNT":"25.00","ORDERID":"d-1"}"#);
        assert_eq!(ok.settlement_status(), SettlementStatus::Success);
        assert_eq!(ok.settled_amount(), Some(dec!(25.00)));

        let failed = parse(r#"{"STATUS":"TXN_FAILURE"}"#);
        assert_eq!(failed.settlement_status(), SettlementStatus::Failure);
        assert_eq!(failed.settled_amount(), None);

        let pending = parse(r#"{"STATUS":"PENDING","TXNAMOUNT":"n/a"}"#);
        assert_eq!(pending.settlement_status(), SettlementStatus::Pending);
        assert_eq!(pending.settled_amount(), None);
    }

    #[test]
    fn test_missing_status_is_an_error() {
        assert!(serde_json::from_str::<SettlementResponse>(r#"{"ORDERID":"x"}"#).is_err());
    }
}
