pub mod gateway;
pub mod notify;
pub mod redeem;

pub use gateway::{SettlementResponse, SettlementStatus};
pub use notify::{
    AlertPayload, DepositPayload, DepositState, OrderState, OrderUpdatePayload, Severity,
    UserMetricsPayload,
};
pub use redeem::{
    AmountSpec, CodeStats, CreateCodeRequest, CreateCodeResponse, RedeemRejection,
    RedeemRequest, RedeemResponse, RedeemScope, RedemptionLogEntry,
};
