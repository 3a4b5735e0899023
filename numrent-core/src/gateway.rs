//! Settlement gateway client.
//!
//! The gateway reports the external status of a deposit. Its answers are
//! advisory in one direction only: a success or failure report is acted on,
//! while every kind of error (timeout, 5xx, malformed body) is reported to the
//! caller, which treats it as "still pending".

use crate::config::GatewayConfig;
use async_trait::async_trait;
use numrent_sdk::objects::{SettlementResponse, SettlementStatus};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur while querying the gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// HTTP request error (including timeouts)
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("gateway returned status {status}")]
    Status { status: u16 },

    /// Response body could not be parsed
    #[error("gateway response parsing error: {0}")]
    Parse(String),
}

/// Interpreted gateway answer for one deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayVerdict {
    Pending,
    Succeeded { reported_amount: Option<Decimal> },
    Failed,
}

impl From<&SettlementResponse> for GatewayVerdict {
    fn from(response: &SettlementResponse) -> Self {
        match response.settlement_status() {
            SettlementStatus::Success => GatewayVerdict::Succeeded {
                reported_amount: response.settled_amount(),
            },
            SettlementStatus::Failure => GatewayVerdict::Failed,
            SettlementStatus::Pending => GatewayVerdict::Pending,
        }
    }
}

/// Trait for settlement status lookups.
#[async_trait]
pub trait SettlementGateway: Send + Sync {
    async fn check(&self, deposit_id: &str) -> Result<GatewayVerdict, GatewayError>;
}

/// HTTP implementation: `GET <url>?id=<deposit_id>&key=<api_key>`.
pub struct HttpSettlementGateway {
    url: url::Url,
    api_key: String,
    http_client: reqwest::Client,
}

impl HttpSettlementGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        Ok(Self {
            url: config.url.clone(),
            api_key: config.api_key.clone(),
            http_client: reqwest::Client::builder()
                .timeout(config.timeout)
                .build()?,
        })
    }
}

#[async_trait]
impl SettlementGateway for HttpSettlementGateway {
    async fn check(&self, deposit_id: &str) -> Result<GatewayVerdict, GatewayError> {
        let response = self
            .http_client
            .get(self.url.clone())
            .query(&[("id", deposit_id), ("key", self.api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        let parsed: SettlementResponse =
            serde_json::from_str(&body).map_err(|e| GatewayError::Parse(e.to_string()))?;

        debug!(
            deposit_id = deposit_id,
            status = %parsed.status,
            order_id = ?parsed.order_id,
            "Settlement gateway answered"
        );

        Ok(GatewayVerdict::from(&parsed))
    }
}
