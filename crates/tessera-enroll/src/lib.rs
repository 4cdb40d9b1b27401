//! `tessera-enroll` — per-user TOTP enrollment lifecycle for TESSERA.
//!
//! Sequences `tessera-otp-core` calls against a user's persisted enrollment
//! state: `Disabled → Pending → Enabled`, with forced re-setup and reset.
//! Persistence and wall-clock time are injected ([`UserStore`], [`Clock`]);
//! nothing in this crate owns global state.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod clock;
pub mod enrollment;
pub mod error;
pub mod state;
pub mod store;

pub use clock::{Clock, FixedClock, SystemClock};
pub use enrollment::{Enrollment, EnrollmentConfig, SetupOutcome, StatusReport};
pub use error::EnrollError;
pub use state::EnrollmentState;
pub use store::{MemoryStore, UserStore};
