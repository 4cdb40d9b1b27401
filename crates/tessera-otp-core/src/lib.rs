//! `tessera-otp-core` — RFC 6238 TOTP engine for TESSERA.
//!
//! This crate is the audit target: zero storage, zero network, zero async.
//! Everything here is a pure function over a secret and a timestamp.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod error;
pub mod secret;

pub mod totp;

pub mod provisioning;

pub use error::OtpError;
pub use provisioning::{base32_encode, build_provisioning_uri};
pub use secret::{TotpSecret, DEFAULT_SECRET_LEN};
pub use totp::{
    derive_code, is_well_formed_code, verify_code, CODE_DIGITS, DRIFT_WINDOW, PERIOD_SECONDS,
};
