//! Enrollment orchestration — setup, confirm, login check, reset, status.
//!
//! Each operation reads the user's persisted state, decides, and writes
//! back. Mutating operations hold a per-user lock across the whole
//! read-decide-write sequence so that concurrent calls for the same user
//! cannot interleave and strand a half-replaced secret.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tessera_otp_core::{
    base32_encode, build_provisioning_uri, derive_code, is_well_formed_code, verify_code,
    TotpSecret, DEFAULT_SECRET_LEN, DRIFT_WINDOW,
};

use crate::clock::Clock;
use crate::error::EnrollError;
use crate::state::EnrollmentState;
use crate::store::UserStore;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tunables for the enrollment machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EnrollmentConfig {
    /// Issuer name embedded in provisioning URIs and authenticator labels.
    pub issuer: String,
    /// Verification tolerance in time steps (1 ⇒ ±30 s of clock drift).
    pub drift_window: u32,
    /// Generated secret length in bytes.
    pub secret_len: usize,
    /// Return the currently valid code in [`SetupOutcome`].
    ///
    /// Echoes a valid code back before the user has proven possession of
    /// the authenticator — a deliberate weakening of the protocol,
    /// acceptable only for teaching and onboarding demos. Off by default.
    pub emit_preview_code: bool,
}

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self {
            issuer: "TESSERA".to_owned(),
            drift_window: DRIFT_WINDOW,
            secret_len: DEFAULT_SECRET_LEN,
            emit_preview_code: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Operation results
// ---------------------------------------------------------------------------

/// Everything the setup flow hands back for display to the enrolling user.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupOutcome {
    /// Base32 manual-entry key.
    pub secret_base32: String,
    /// `otpauth://` URI for QR rendering or direct import.
    pub provisioning_uri: String,
    /// Currently valid code, present only when
    /// [`EnrollmentConfig::emit_preview_code`] is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_code: Option<String>,
    /// Whether an existing secret was cleared before re-provisioning.
    pub replaced_existing: bool,
}

impl fmt::Debug for SetupOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The outcome carries the secret in two encodings; keep it out of
        // debug logs entirely.
        f.write_str("SetupOutcome(***)")
    }
}

/// Read-only snapshot of a user's enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    /// Login currently requires a code.
    pub enabled: bool,
    /// Setup has run but the first code has not been confirmed.
    pub pending: bool,
    /// A secret (confirmed or not) is retained in the store.
    pub has_secret: bool,
}

// ---------------------------------------------------------------------------
// The state machine
// ---------------------------------------------------------------------------

/// Per-user TOTP enrollment state machine.
///
/// Stateless between calls apart from the injected store; safe to share
/// across threads behind an `Arc`.
pub struct Enrollment<S, C> {
    store: S,
    clock: C,
    config: EnrollmentConfig,
    // Registry of per-user mutation locks, populated lazily. Entries are
    // never evicted; growth is bounded by the user population.
    user_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<S: UserStore, C: Clock> Enrollment<S, C> {
    /// Build a machine over the given store, clock and configuration.
    pub fn new(store: S, clock: C, config: EnrollmentConfig) -> Self {
        Self {
            store,
            clock,
            config,
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    /// The active configuration.
    pub const fn config(&self) -> &EnrollmentConfig {
        &self.config
    }

    /// Provision a fresh secret for `user_id` and park it as `Pending`.
    ///
    /// When the user is already `Enabled`, fails with
    /// [`EnrollError::AlreadyEnabled`] unless `force` is set. A forced call
    /// first persists an explicit `Disabled` record (the old secret is gone
    /// even if the subsequent write fails), then provisions anew. A plain
    /// call on a `Pending` user simply replaces the unconfirmed secret.
    ///
    /// # Errors
    ///
    /// [`EnrollError::AlreadyEnabled`], [`EnrollError::Store`], or a fatal
    /// [`EnrollError::Otp`] if the CSPRNG fails.
    pub fn setup(&self, user_id: &str, force: bool) -> Result<SetupOutcome, EnrollError> {
        let lock = self.user_lock(user_id)?;
        let _guard = lock
            .lock()
            .map_err(|e| EnrollError::Store(format!("user lock poisoned: {e}")))?;

        let current = self.store.load(user_id)?;
        let mut replaced_existing = false;
        match &current {
            EnrollmentState::Enabled { .. } if !force => return Err(EnrollError::AlreadyEnabled),
            EnrollmentState::Enabled { .. } | EnrollmentState::Pending { .. } if force => {
                // Explicit reset step before re-provisioning.
                self.store.save(user_id, &EnrollmentState::Disabled)?;
                replaced_existing = true;
            }
            _ => {}
        }

        let secret = TotpSecret::generate_with_len(self.config.secret_len)?;
        let secret_base32 = base32_encode(&secret);
        self.store.save(
            user_id,
            &EnrollmentState::Pending {
                secret: secret_base32.clone(),
            },
        )?;

        let provisioning_uri = build_provisioning_uri(&secret, user_id, &self.config.issuer);
        let preview_code = if self.config.emit_preview_code {
            Some(derive_code(&secret, self.clock.now())?)
        } else {
            None
        };

        tracing::info!(user = user_id, replaced_existing, "two-factor setup pending");

        Ok(SetupOutcome {
            secret_base32,
            provisioning_uri,
            preview_code,
            replaced_existing,
        })
    }

    /// Confirm a pending secret with its first valid code and enable 2FA.
    ///
    /// On any failure the stored state is left untouched — at most one
    /// pending secret exists per user at all times.
    ///
    /// # Errors
    ///
    /// [`EnrollError::MalformedCode`] when `code` is not 6 ASCII digits,
    /// [`EnrollError::AlreadyEnabled`] when 2FA is already on,
    /// [`EnrollError::NoPendingSecret`] when there is nothing to confirm,
    /// [`EnrollError::InconsistentState`] when the stored secret does not
    /// decode, [`EnrollError::InvalidCode`] when verification fails,
    /// [`EnrollError::Store`] on store failure.
    pub fn verify_and_enable(&self, user_id: &str, code: &str) -> Result<(), EnrollError> {
        if !is_well_formed_code(code) {
            return Err(EnrollError::MalformedCode);
        }

        let lock = self.user_lock(user_id)?;
        let _guard = lock
            .lock()
            .map_err(|e| EnrollError::Store(format!("user lock poisoned: {e}")))?;

        let current = self.store.load(user_id)?;
        let secret_base32 = match &current {
            EnrollmentState::Enabled { .. } => return Err(EnrollError::AlreadyEnabled),
            EnrollmentState::Disabled => return Err(EnrollError::NoPendingSecret),
            EnrollmentState::Pending { secret } if secret.is_empty() => {
                return Err(EnrollError::NoPendingSecret)
            }
            EnrollmentState::Pending { secret } => secret.clone(),
        };

        let key = current.decode_secret()?;
        if !verify_code(code, &key, self.clock.now(), self.config.drift_window)? {
            return Err(EnrollError::InvalidCode);
        }

        self.store.save(
            user_id,
            &EnrollmentState::Enabled {
                secret: secret_base32,
            },
        )?;
        tracing::info!(user = user_id, "two-factor enabled");
        Ok(())
    }

    /// Check a login code for a fully enrolled user. Never mutates state.
    ///
    /// # Errors
    ///
    /// [`EnrollError::MalformedCode`] when `code` is not 6 ASCII digits,
    /// [`EnrollError::NotEnabled`] unless the user is `Enabled`,
    /// [`EnrollError::InconsistentState`] when the enabled record has no
    /// usable secret, [`EnrollError::InvalidCode`] when verification fails,
    /// [`EnrollError::Store`] on store failure.
    pub fn verify_for_login(&self, user_id: &str, code: &str) -> Result<(), EnrollError> {
        if !is_well_formed_code(code) {
            return Err(EnrollError::MalformedCode);
        }

        // Read-only: a single record load needs no per-user lock.
        let current = self.store.load(user_id)?;
        match &current {
            EnrollmentState::Enabled { secret } if secret.is_empty() => {
                tracing::warn!(user = user_id, "enabled record has an empty secret");
                Err(EnrollError::InconsistentState(
                    "two-factor enabled but no secret stored".to_owned(),
                ))
            }
            EnrollmentState::Enabled { .. } => {
                let key = current.decode_secret()?;
                if verify_code(code, &key, self.clock.now(), self.config.drift_window)? {
                    Ok(())
                } else {
                    Err(EnrollError::InvalidCode)
                }
            }
            _ => Err(EnrollError::NotEnabled),
        }
    }

    /// Clear the secret and disable 2FA, whatever the prior state.
    ///
    /// Idempotent; always persists exactly one `Disabled` record.
    ///
    /// # Errors
    ///
    /// [`EnrollError::Store`] on store failure.
    pub fn reset(&self, user_id: &str) -> Result<(), EnrollError> {
        let lock = self.user_lock(user_id)?;
        let _guard = lock
            .lock()
            .map_err(|e| EnrollError::Store(format!("user lock poisoned: {e}")))?;

        self.store.save(user_id, &EnrollmentState::Disabled)?;
        tracing::info!(user = user_id, "two-factor reset");
        Ok(())
    }

    /// Report the user's enrollment status. Read-only.
    ///
    /// # Errors
    ///
    /// [`EnrollError::Store`] on store failure.
    pub fn status(&self, user_id: &str) -> Result<StatusReport, EnrollError> {
        let current = self.store.load(user_id)?;
        Ok(StatusReport {
            enabled: current.is_enabled(),
            pending: current.is_pending(),
            has_secret: current.has_secret(),
        })
    }

    /// Fetch (or lazily create) the mutation lock for `user_id`.
    fn user_lock(&self, user_id: &str) -> Result<Arc<Mutex<()>>, EnrollError> {
        let mut locks = self
            .user_locks
            .lock()
            .map_err(|e| EnrollError::Store(format!("lock registry poisoned: {e}")))?;
        Ok(Arc::clone(locks.entry(user_id.to_owned()).or_default()))
    }
}
