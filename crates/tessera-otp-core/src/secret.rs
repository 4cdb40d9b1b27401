//! Secret key material for TOTP enrollment.
//!
//! Wraps the raw shared secret in [`secrecy::SecretSlice`] so that it is
//! zeroized on drop and masked in `Debug` output. The raw bytes leave the
//! wrapper only through an explicit [`TotpSecret::expose`] call.

use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretSlice};
use std::fmt;
use zeroize::Zeroize;

use crate::error::OtpError;

/// Default secret length in bytes (128 bits).
pub const DEFAULT_SECRET_LEN: usize = 16;

/// Shared TOTP secret owned by exactly one user record.
///
/// Never logged, never echoed in plaintext outside of explicit
/// setup-display flows (Base32 encoding for provisioning).
pub struct TotpSecret {
    inner: SecretSlice<u8>,
}

impl TotpSecret {
    /// Generate a fresh secret of [`DEFAULT_SECRET_LEN`] bytes from the
    /// operating-system CSPRNG.
    ///
    /// # Errors
    ///
    /// Returns [`OtpError::Rng`] if the CSPRNG fails. This is fatal: there
    /// is no fallback randomness source.
    pub fn generate() -> Result<Self, OtpError> {
        Self::generate_with_len(DEFAULT_SECRET_LEN)
    }

    /// Generate a fresh secret of `len` bytes from the OS CSPRNG.
    ///
    /// # Errors
    ///
    /// Returns [`OtpError::Otp`] if `len` is zero, [`OtpError::Rng`] if the
    /// CSPRNG fails.
    pub fn generate_with_len(len: usize) -> Result<Self, OtpError> {
        if len == 0 {
            return Err(OtpError::Otp("secret length must be > 0".to_owned()));
        }
        let mut bytes = vec![0u8; len];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| OtpError::Rng(format!("CSPRNG fill failed: {e}")))?;
        let secret = Self::from_bytes(&bytes);
        bytes.zeroize();
        Ok(secret)
    }

    /// Wrap existing secret bytes (e.g. decoded from persistent storage).
    ///
    /// The data is copied; the caller should zeroize the source afterwards.
    #[must_use]
    pub fn from_bytes(data: &[u8]) -> Self {
        Self {
            inner: data.to_vec().into(),
        }
    }

    /// Expose the underlying bytes. Use sparingly — only at the point a
    /// cryptographic operation needs the raw key.
    #[must_use]
    pub fn expose(&self) -> &[u8] {
        self.inner.expose_secret()
    }

    /// Returns the number of bytes in the secret.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.expose_secret().len()
    }

    /// Returns `true` if the secret holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for TotpSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TotpSecret(***)")
    }
}
