use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use totp_rs::{Algorithm, Secret, TOTP};

const DIGITS: usize = 6;
const STEP_SECONDS: u64 = 30;

#[derive(Debug, Error)]
pub enum OtpError {
    #[error("one-time-code secret is not valid base32")]
    InvalidSecret,
    #[error("system clock error: {0}")]
    Clock(#[from] std::time::SystemTimeError),
}

pub trait OneTimeCodeGenerator: Send + Sync {
    fn generate(&self, secret: &SecretString) -> Result<String, OtpError>;
}

/// RFC 6238 authenticator-app codes: HMAC-SHA1, 30 second step, 6 digits.
#[derive(Debug, Clone, Copy, Default)]
pub struct TotpGenerator;

impl TotpGenerator {
    fn totp(secret: &SecretString) -> Result<TOTP, OtpError> {
        let normalized: String = secret
            .expose_secret()
            .chars()
            .filter(|ch| !ch.is_whitespace() && *ch != '=')
            .map(|ch| ch.to_ascii_uppercase())
            .collect();
        let bytes = Secret::Encoded(normalized)
            .to_bytes()
            .map_err(|_| OtpError::InvalidSecret)?;
        Ok(TOTP::new_unchecked(
            Algorithm::SHA1,
            DIGITS,
            1,
            STEP_SECONDS,
            bytes,
        ))
    }

    pub fn generate_at(&self, secret: &SecretString, unix_seconds: u64) -> Result<String, OtpError> {
        Ok(Self::totp(secret)?.generate(unix_seconds))
    }
}

impl OneTimeCodeGenerator for TotpGenerator {
    fn generate(&self, secret: &SecretString) -> Result<String, OtpError> {
        Ok(Self::totp(secret)?.generate_current()?)
    }
}
