//! Wire objects shared between numrent services and their collaborators.
//!
//! Everything in here is plain serde data: notification payloads accepted by
//! the dispatcher, redeem-code requests and responses, and the settlement
//! gateway's response body.

pub mod objects;
