//! Persisted per-user enrollment state.
//!
//! The secret travels in its RFC 4648 Base32 form (no padding) — the same
//! representation handed to authenticator apps — and is decoded back to raw
//! bytes at each use. `Debug` masks it.

use data_encoding::BASE32_NOPAD;
use serde::{Deserialize, Serialize};
use std::fmt;
use tessera_otp_core::TotpSecret;
use zeroize::Zeroize;

use crate::error::EnrollError;

/// Two-factor enrollment state stored against one user record.
///
/// Lifecycle: `Disabled --setup--> Pending --verify--> Enabled --reset-->
/// Disabled`. `Enabled` implies a non-empty secret; `Disabled` retains none.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EnrollmentState {
    /// No secret stored; login does not require a code.
    #[default]
    Disabled,
    /// Secret generated and stored, awaiting the user's first valid code.
    Pending {
        /// Base32-encoded shared secret.
        secret: String,
    },
    /// Secret confirmed; login requires a valid code.
    Enabled {
        /// Base32-encoded shared secret.
        secret: String,
    },
}

impl EnrollmentState {
    /// Whether login must present a code.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled { .. })
    }

    /// Whether setup has run but not yet been confirmed.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }

    /// Whether a (possibly unconfirmed) secret is retained.
    #[must_use]
    pub fn has_secret(&self) -> bool {
        match self {
            Self::Disabled => false,
            Self::Pending { secret } | Self::Enabled { secret } => !secret.is_empty(),
        }
    }

    /// Decode the stored Base32 secret back into key material.
    ///
    /// # Errors
    ///
    /// Returns [`EnrollError::InconsistentState`] when no secret is stored
    /// or the stored value does not decode — a record in this condition is
    /// diagnosably broken, not silently repairable.
    pub(crate) fn decode_secret(&self) -> Result<TotpSecret, EnrollError> {
        let secret_b32 = match self {
            Self::Disabled => {
                return Err(EnrollError::InconsistentState(
                    "no secret stored in disabled state".to_owned(),
                ))
            }
            Self::Pending { secret } | Self::Enabled { secret } => secret,
        };
        let mut bytes = BASE32_NOPAD.decode(secret_b32.as_bytes()).map_err(|e| {
            EnrollError::InconsistentState(format!("stored secret is not valid base32: {e}"))
        })?;
        let key = TotpSecret::from_bytes(&bytes);
        bytes.zeroize();
        Ok(key)
    }
}

impl fmt::Debug for EnrollmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => f.write_str("Disabled"),
            Self::Pending { .. } => f.write_str("Pending { secret: *** }"),
            Self::Enabled { .. } => f.write_str("Enabled { secret: *** }"),
        }
    }
}
