//! Common utilities and shared functionality
//!
//! Identifiers, money rounding, clocks and reference generation used
//! across the lottoline service.

pub mod clock;
pub mod money;
pub mod reference;
pub mod types;
