//! Ratebank Common Types
//!
//! Shared types used across ratebank: validated currency codes, the currency
//! metadata registry, and minor-unit money amounts.

pub mod currency;
pub mod money;
pub mod error;

pub use currency::*;
pub use money::*;
pub use error::*;
