//! Secret provisioning for authenticator apps.
//!
//! Two hand-off formats: the Base32 manual-entry key and the
//! `otpauth://totp/...` key URI (Google Authenticator key-URI format).
//! QR rendering of the URI is the consumer's concern; this module only
//! produces the canonical string.

use data_encoding::BASE32_NOPAD;

use crate::secret::TotpSecret;
use crate::totp::{CODE_DIGITS, PERIOD_SECONDS};

/// Encode a secret as RFC 4648 Base32 (`A-Z2-7`), without padding.
///
/// The byte sequence is consumed 5 bits at a time; the final group is
/// padded with zero bits, and no `=` characters are emitted. Output length
/// is `ceil(8 * len / 5)`.
#[must_use]
pub fn base32_encode(secret: &TotpSecret) -> String {
    BASE32_NOPAD.encode(secret.expose())
}

/// Build the `otpauth://` provisioning URI for an enrolled account.
///
/// Label is `issuer:account_label`, percent-encoded as one path segment.
/// Query parameters: `secret` (Base32), `issuer`, `algorithm=SHA1`,
/// `digits=6`, `period=30`.
#[must_use]
pub fn build_provisioning_uri(secret: &TotpSecret, account_label: &str, issuer: &str) -> String {
    let label = percent_encode(&format!("{issuer}:{account_label}"));
    let secret_b32 = base32_encode(secret);
    let issuer_q = percent_encode(issuer);
    format!(
        "otpauth://totp/{label}?secret={secret_b32}&issuer={issuer_q}\
         &algorithm=SHA1&digits={CODE_DIGITS}&period={PERIOD_SECONDS}"
    )
}

/// Percent-encode a string for use in an `otpauth://` URI.
///
/// RFC 3986 unreserved characters (`A-Z a-z 0-9 - _ . ~`) pass through;
/// every other byte of the UTF-8 encoding becomes `%XX` with uppercase
/// hex. Spaces encode as `%20`, not `+`.
fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(char::from(byte));
            }
            _ => {
                out.push_str(&format!("%{byte:02X}"));
            }
        }
    }
    out
}
