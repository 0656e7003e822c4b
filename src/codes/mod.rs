//! Single-use redeemable codes
//!
//! A code flips from unused to used at most once, and the flip commits in the
//! same unit as the ledger credit it pays for.

pub mod error;
pub mod model;
pub mod service;

pub use error::{RedeemError, Result};
pub use model::RedeemableCode;
pub use service::{CodeRedemption, CodeSettings, GeneratedCodes, Redemption};
