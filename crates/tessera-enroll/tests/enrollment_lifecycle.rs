#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

//! Integration tests for the enrollment state machine.
//!
//! Exercise the full lifecycle against `MemoryStore` and `FixedClock`:
//! setup → confirm → login → reset, the failure paths that must not mutate
//! state, and the per-user locking under concurrent forced setups.

use std::sync::Arc;
use std::thread;

use data_encoding::BASE32_NOPAD;
use tessera_enroll::{
    EnrollError, Enrollment, EnrollmentConfig, EnrollmentState, FixedClock, MemoryStore,
    SetupOutcome, UserStore,
};
use tessera_otp_core::{derive_code, TotpSecret};

const NOW: u64 = 1_700_000_000;

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

fn machine(now: u64) -> Enrollment<MemoryStore, FixedClock> {
    Enrollment::new(
        MemoryStore::new(),
        FixedClock(now),
        EnrollmentConfig::default(),
    )
}

fn demo_machine(now: u64) -> Enrollment<MemoryStore, FixedClock> {
    let config = EnrollmentConfig {
        emit_preview_code: true,
        ..EnrollmentConfig::default()
    };
    Enrollment::new(MemoryStore::new(), FixedClock(now), config)
}

/// Derive the code an authenticator app would show for this setup at `time`.
fn app_code(outcome: &SetupOutcome, time: u64) -> String {
    let bytes = BASE32_NOPAD
        .decode(outcome.secret_base32.as_bytes())
        .expect("setup returns valid base32");
    derive_code(&TotpSecret::from_bytes(&bytes), time).expect("derivation")
}

// ---------------------------------------------------------------------------
// Happy path
// ---------------------------------------------------------------------------

#[test]
fn full_lifecycle() {
    let machine = machine(NOW);

    // Fresh user: disabled, no secret.
    let status = machine.status("john").unwrap();
    assert!(!status.enabled && !status.pending && !status.has_secret);

    // Setup parks a pending secret.
    let outcome = machine.setup("john", false).unwrap();
    assert!(!outcome.replaced_existing);
    assert_eq!(outcome.secret_base32.len(), 26); // ceil(8*16/5)
    assert!(outcome.provisioning_uri.starts_with("otpauth://totp/TESSERA%3Ajohn?"));
    assert!(outcome.preview_code.is_none(), "preview is demo-only");
    let status = machine.status("john").unwrap();
    assert!(!status.enabled && status.pending && status.has_secret);

    // Login is not yet gated.
    assert!(matches!(
        machine.verify_for_login("john", "123456"),
        Err(EnrollError::NotEnabled)
    ));

    // Confirm with the app's code.
    machine
        .verify_and_enable("john", &app_code(&outcome, NOW))
        .unwrap();
    let status = machine.status("john").unwrap();
    assert!(status.enabled && !status.pending && status.has_secret);

    // Login now verifies.
    machine
        .verify_for_login("john", &app_code(&outcome, NOW))
        .unwrap();

    // Reset returns to a clean disabled record.
    machine.reset("john").unwrap();
    let status = machine.status("john").unwrap();
    assert!(!status.enabled && !status.pending && !status.has_secret);
}

#[test]
fn preview_code_confirms_in_demo_mode() {
    let machine = demo_machine(NOW);
    let outcome = machine.setup("john", false).unwrap();
    let preview = outcome.preview_code.clone().expect("demo mode emits a preview");
    assert_eq!(preview.len(), 6);
    assert_eq!(preview, app_code(&outcome, NOW));

    machine.verify_and_enable("john", &preview).unwrap();
    assert!(machine.status("john").unwrap().enabled);
}

// ---------------------------------------------------------------------------
// Setup gating and forced re-setup
// ---------------------------------------------------------------------------

#[test]
fn setup_on_enabled_requires_force() {
    let machine = machine(NOW);
    let first = machine.setup("john", false).unwrap();
    machine
        .verify_and_enable("john", &app_code(&first, NOW))
        .unwrap();

    assert!(matches!(
        machine.setup("john", false),
        Err(EnrollError::AlreadyEnabled)
    ));
    // The failed attempt must not have touched the enrollment.
    assert!(machine.status("john").unwrap().enabled);

    let second = machine.setup("john", true).unwrap();
    assert!(second.replaced_existing);
    assert_ne!(second.secret_base32, first.secret_base32);
    let status = machine.status("john").unwrap();
    assert!(!status.enabled && status.pending);
}

#[test]
fn forced_setup_discards_old_secret() {
    let machine = machine(NOW);
    let first = machine.setup("john", false).unwrap();
    let second = machine.setup("john", true).unwrap();

    // The first secret is gone; its code cannot confirm anything.
    let stale = app_code(&first, NOW);
    let fresh = app_code(&second, NOW);
    if stale != fresh {
        assert!(matches!(
            machine.verify_and_enable("john", &stale),
            Err(EnrollError::InvalidCode)
        ));
    }
    machine.verify_and_enable("john", &fresh).unwrap();
}

#[test]
fn plain_setup_on_pending_replaces_secret() {
    let machine = machine(NOW);
    let first = machine.setup("john", false).unwrap();
    let second = machine.setup("john", false).unwrap();
    assert!(!second.replaced_existing, "no explicit reset step without force");
    assert_ne!(second.secret_base32, first.secret_base32);
    machine
        .verify_and_enable("john", &app_code(&second, NOW))
        .unwrap();
}

// ---------------------------------------------------------------------------
// Confirmation failure paths — state must never move
// ---------------------------------------------------------------------------

#[test]
fn wrong_code_leaves_pending_state_untouched() {
    let machine = machine(NOW);
    let outcome = machine.setup("john", false).unwrap();

    let good = app_code(&outcome, NOW);
    let bad = if good == "000000" { "000001" } else { "000000" };
    assert!(matches!(
        machine.verify_and_enable("john", bad),
        Err(EnrollError::InvalidCode)
    ));

    // Still pending; the same secret still confirms.
    assert!(machine.status("john").unwrap().pending);
    machine.verify_and_enable("john", &good).unwrap();
}

#[test]
fn verify_and_enable_without_setup() {
    let machine = machine(NOW);
    assert!(matches!(
        machine.verify_and_enable("john", "123456"),
        Err(EnrollError::NoPendingSecret)
    ));
}

#[test]
fn verify_and_enable_when_already_enabled() {
    let machine = machine(NOW);
    let outcome = machine.setup("john", false).unwrap();
    let code = app_code(&outcome, NOW);
    machine.verify_and_enable("john", &code).unwrap();
    assert!(matches!(
        machine.verify_and_enable("john", &code),
        Err(EnrollError::AlreadyEnabled)
    ));
}

#[test]
fn malformed_codes_rejected_before_verification() {
    let machine = machine(NOW);
    machine.setup("john", false).unwrap();
    for bad in ["", "12345", "1234567", "12345a", "12 456"] {
        assert!(
            matches!(
                machine.verify_and_enable("john", bad),
                Err(EnrollError::MalformedCode)
            ),
            "{bad:?} should be malformed"
        );
        assert!(
            matches!(
                machine.verify_for_login("john", bad),
                Err(EnrollError::MalformedCode)
            ),
            "{bad:?} should be malformed"
        );
    }
}

// ---------------------------------------------------------------------------
// Login checks
// ---------------------------------------------------------------------------

#[test]
fn login_requires_enabled_state() {
    let machine = machine(NOW);
    assert!(matches!(
        machine.verify_for_login("john", "123456"),
        Err(EnrollError::NotEnabled)
    ));
    machine.setup("john", false).unwrap();
    assert!(matches!(
        machine.verify_for_login("john", "123456"),
        Err(EnrollError::NotEnabled)
    ));
}

#[test]
fn login_tolerates_one_step_of_drift() {
    let machine = machine(NOW);
    let outcome = machine.setup("john", false).unwrap();
    machine
        .verify_and_enable("john", &app_code(&outcome, NOW))
        .unwrap();

    // A code from the previous step still passes...
    machine
        .verify_for_login("john", &app_code(&outcome, NOW - 30))
        .unwrap();
    // ...one from two steps back does not.
    let stale = app_code(&outcome, NOW - 60);
    if stale != app_code(&outcome, NOW - 30)
        && stale != app_code(&outcome, NOW)
        && stale != app_code(&outcome, NOW + 30)
    {
        assert!(matches!(
            machine.verify_for_login("john", &stale),
            Err(EnrollError::InvalidCode)
        ));
    }
}

#[test]
fn login_never_mutates_state() {
    let machine = machine(NOW);
    let outcome = machine.setup("john", false).unwrap();
    machine
        .verify_and_enable("john", &app_code(&outcome, NOW))
        .unwrap();

    assert!(matches!(
        machine.verify_for_login("john", "000000"),
        Err(EnrollError::InvalidCode) | Err(EnrollError::MalformedCode)
    ));
    assert!(machine.status("john").unwrap().enabled);
    machine
        .verify_for_login("john", &app_code(&outcome, NOW))
        .unwrap();
}

// ---------------------------------------------------------------------------
// Inconsistent stored state is surfaced, not repaired
// ---------------------------------------------------------------------------

#[test]
fn enabled_with_empty_secret_is_inconsistent() {
    let store = MemoryStore::new();
    store
        .save(
            "john",
            &EnrollmentState::Enabled {
                secret: String::new(),
            },
        )
        .unwrap();
    let machine = Enrollment::new(store, FixedClock(NOW), EnrollmentConfig::default());

    assert!(matches!(
        machine.verify_for_login("john", "123456"),
        Err(EnrollError::InconsistentState(_))
    ));
    // Surfaced, not silently repaired: the record is still enabled.
    assert!(machine.status("john").unwrap().enabled);
}

#[test]
fn undecodable_stored_secret_is_inconsistent() {
    let store = MemoryStore::new();
    store
        .save(
            "john",
            &EnrollmentState::Enabled {
                secret: "not-valid-base32!!!".to_owned(),
            },
        )
        .unwrap();
    let machine = Enrollment::new(store, FixedClock(NOW), EnrollmentConfig::default());
    assert!(matches!(
        machine.verify_for_login("john", "123456"),
        Err(EnrollError::InconsistentState(_))
    ));
}

#[test]
fn pending_with_empty_secret_reports_no_pending_secret() {
    let store = MemoryStore::new();
    store
        .save(
            "john",
            &EnrollmentState::Pending {
                secret: String::new(),
            },
        )
        .unwrap();
    let machine = Enrollment::new(store, FixedClock(NOW), EnrollmentConfig::default());
    assert!(matches!(
        machine.verify_and_enable("john", "123456"),
        Err(EnrollError::NoPendingSecret)
    ));
}

// ---------------------------------------------------------------------------
// Reset
// ---------------------------------------------------------------------------

#[test]
fn reset_is_idempotent() {
    let machine = machine(NOW);
    machine.reset("john").unwrap();
    machine.reset("john").unwrap();
    let status = machine.status("john").unwrap();
    assert!(!status.enabled && !status.pending && !status.has_secret);
}

#[test]
fn reset_from_any_state() {
    let machine = machine(NOW);

    machine.setup("john", false).unwrap();
    machine.reset("john").unwrap();
    assert!(!machine.status("john").unwrap().has_secret);

    let outcome = machine.setup("john", false).unwrap();
    machine
        .verify_and_enable("john", &app_code(&outcome, NOW))
        .unwrap();
    machine.reset("john").unwrap();
    assert!(!machine.status("john").unwrap().has_secret);
}

// ---------------------------------------------------------------------------
// Concurrency: per-user locking keeps records coherent
// ---------------------------------------------------------------------------

#[test]
fn concurrent_forced_setups_leave_one_coherent_record() {
    let machine = Arc::new(machine(NOW));
    let outcomes: Vec<SetupOutcome> = {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let machine = Arc::clone(&machine);
                thread::spawn(move || machine.setup("john", true).unwrap())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    };

    // Exactly one pending record survives, decodable and confirmable.
    let status = machine.status("john").unwrap();
    assert!(status.pending && status.has_secret);

    let mut enabled = 0;
    for outcome in &outcomes {
        match machine.verify_and_enable("john", &app_code(outcome, NOW)) {
            Ok(()) => enabled += 1,
            Err(EnrollError::InvalidCode | EnrollError::AlreadyEnabled) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(enabled, 1, "exactly one setup outcome matches the stored secret");
    assert!(machine.status("john").unwrap().enabled);
}

#[test]
fn users_are_isolated() {
    let machine = machine(NOW);
    let john = machine.setup("john", false).unwrap();
    let admin = machine.setup("admin", false).unwrap();
    assert_ne!(john.secret_base32, admin.secret_base32);

    machine
        .verify_and_enable("john", &app_code(&john, NOW))
        .unwrap();
    assert!(machine.status("john").unwrap().enabled);
    assert!(machine.status("admin").unwrap().pending);

    machine.reset("john").unwrap();
    assert!(machine.status("admin").unwrap().pending, "reset is per-user");
}
