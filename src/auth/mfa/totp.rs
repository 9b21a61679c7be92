//! RFC 6238 helpers: enrollment material and code checks.

use anyhow::{anyhow, Result};
use totp_rs::{Algorithm, Secret, TOTP};

const DIGITS: usize = 6;
const STEP_SECONDS: u64 = 30;
/// Accepted drift in steps on either side of now.
pub const DEFAULT_SKEW: u8 = 2;

/// Secret and provisioning data shown to the user once.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TotpEnrollment {
    pub secret: String,
    pub otpauth_url: String,
    /// `data:image/png;base64,...`
    pub qr_code: String,
}

/// # Errors
/// Returns an error if the account name is rejected or the QR code cannot be rendered.
pub fn generate(issuer: &str, account: &str) -> Result<TotpEnrollment> {
    let secret_bytes = Secret::generate_secret()
        .to_bytes()
        .map_err(|e| anyhow!("Secret gen error: {e}"))?;

    let totp = TOTP::new(
        Algorithm::SHA1,
        DIGITS,
        DEFAULT_SKEW,
        STEP_SECONDS,
        secret_bytes,
        Some(issuer.to_string()),
        account.to_string(),
    )
    .map_err(|e| anyhow!("TOTP init error: {e}"))?;

    let qr = totp
        .get_qr_base64()
        .map_err(|e| anyhow!("QR gen error: {e}"))?;

    Ok(TotpEnrollment {
        secret: totp.get_secret_base32(),
        otpauth_url: totp.get_url(),
        qr_code: format!("data:image/png;base64,{qr}"),
    })
}

fn build(secret_base32: &str, skew: u8) -> Option<TOTP> {
    let bytes = Secret::Encoded(secret_base32.trim().to_uppercase())
        .to_bytes()
        .ok()?;
    // label and issuer play no part in checking a code
    Some(TOTP::new_unchecked(
        Algorithm::SHA1,
        DIGITS,
        skew,
        STEP_SECONDS,
        bytes,
        None,
        "user".to_string(),
    ))
}

/// Check `code` against a base32 secret at the current time.
#[must_use]
pub fn verify(secret_base32: &str, code: &str, skew: u8) -> bool {
    build(secret_base32, skew).is_some_and(|totp| totp.check_current(code).unwrap_or(false))
}

/// Check `code` at an explicit unix time.
#[must_use]
pub fn verify_at(secret_base32: &str, code: &str, skew: u8, unix_seconds: u64) -> bool {
    build(secret_base32, skew).is_some_and(|totp| totp.check(code, unix_seconds))
}

/// Code for `secret_base32` at `unix_seconds`.
#[must_use]
pub fn code_at(secret_base32: &str, unix_seconds: u64) -> Option<String> {
    build(secret_base32, 0).map(|totp| totp.generate(unix_seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "JBSWY3DPEHPK3PXPJBSWY3DPEHPK3PXP";

    #[test]
    fn enrollment_material_is_consistent() -> Result<()> {
        let enrollment = generate("JIMS", "a@x.com")?;
        assert!(enrollment.otpauth_url.starts_with("otpauth://totp/"));
        assert!(enrollment.otpauth_url.contains("issuer=JIMS"));
        assert!(enrollment.otpauth_url.contains(&enrollment.secret));
        assert!(enrollment.qr_code.starts_with("data:image/png;base64,"));
        Ok(())
    }

    #[test]
    fn drift_of_two_steps_is_accepted() {
        let now: u64 = 1_700_000_000;
        for offset in [-60i64, -30, 0, 30, 60] {
            let at = now.checked_add_signed(offset).unwrap_or_default();
            let code = code_at(SECRET, at).unwrap_or_default();
            assert!(verify_at(SECRET, &code, DEFAULT_SKEW, now), "offset {offset}");
        }
    }

    #[test]
    fn drift_beyond_window_is_rejected() {
        let now = 1_700_000_010;
        let code = code_at(SECRET, now + 120).unwrap_or_default();
        assert!(!verify_at(SECRET, &code, DEFAULT_SKEW, now));
    }

    #[test]
    fn bad_secret_never_verifies() {
        assert!(!verify("not base32 !!", "123456", DEFAULT_SKEW));
    }
}
