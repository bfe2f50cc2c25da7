use crate::{Result, constants::PASSCODE_LENGTH, error::Error};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use subtle::ConstantTimeEq;

/// How an access attempt was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMethod {
    Passcode,
    Fingerprint,
    Face,
}

impl AccessMethod {
    /// Stable string form used by the access log.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMethod::Passcode => "passcode",
            AccessMethod::Fingerprint => "fingerprint",
            AccessMethod::Face => "face",
        }
    }
}

impl fmt::Display for AccessMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of a completed verification attempt.
///
/// `Blocked` means the verification never ran because the feature toggle
/// was off; it is distinct from `Denied` (the credential did not match).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessOutcome {
    Granted,
    Denied,
    Blocked,
}

impl AccessOutcome {
    /// Stable string form used by the access log.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessOutcome::Granted => "granted",
            AccessOutcome::Denied => "denied",
            AccessOutcome::Blocked => "blocked",
        }
    }
}

impl fmt::Display for AccessOutcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One completed verification attempt, recorded exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessAttempt {
    pub method: AccessMethod,
    pub outcome: AccessOutcome,

    /// Display form of the entered code, when the method carries one.
    pub masked_code: Option<String>,

    /// Hash of the entered code, when the method carries one.
    pub code_hash: Option<String>,

    /// Match confidence, when the method produces one (face distance).
    pub confidence: Option<f64>,
}

impl AccessAttempt {
    /// Create an attempt record with no code or confidence attached.
    #[must_use]
    pub fn new(method: AccessMethod, outcome: AccessOutcome) -> Self {
        Self {
            method,
            outcome,
            masked_code: None,
            code_hash: None,
            confidence: None,
        }
    }

    /// Attach the entered code's display form and hash.
    #[must_use]
    pub fn with_code(mut self, masked: impl Into<String>, hash: impl Into<String>) -> Self {
        self.masked_code = Some(masked.into());
        self.code_hash = Some(hash.into());
        self
    }

    /// Attach a confidence value.
    ///
    /// Non-finite values (NaN, infinity) are dropped rather than stored;
    /// the log column must stay orderable.
    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.is_finite().then_some(confidence);
        self
    }
}

/// A keypad passcode (exactly 4 digits).
///
/// # Security
/// This type implements constant-time comparison to prevent timing attacks
/// when comparing codes during verification.
///
/// # Examples
///
/// ```
/// use latchkey_core::Passcode;
///
/// let code = Passcode::new("1234").unwrap();
/// assert_eq!(code.as_str(), "1234");
///
/// assert!(Passcode::new("12a4").is_err());
/// assert!(Passcode::new("12345").is_err());
/// ```
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct Passcode(String);

impl Passcode {
    /// Create a new passcode with validation.
    ///
    /// The code is trimmed before validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidPasscode` if the code is not exactly
    /// `PASSCODE_LENGTH` ASCII digits.
    pub fn new(code: &str) -> Result<Self> {
        let code = code.trim();
        if code.len() != PASSCODE_LENGTH || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidPasscode(format!(
                "Passcode must be exactly {PASSCODE_LENGTH} digits"
            )));
        }
        Ok(Passcode(code.to_string()))
    }

    /// Get the passcode as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Display form shown to the operator.
    ///
    /// Kept equal to the plain code so guest codes can be read back from
    /// the management surface, as the product requires.
    #[must_use]
    pub fn masked(&self) -> String {
        self.0.clone()
    }

    /// Constant-time comparison against an arbitrary entered string.
    #[must_use]
    pub fn matches(&self, candidate: &str) -> bool {
        constant_time_eq(&self.0, candidate.trim())
    }
}

impl fmt::Display for Passcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Passcode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Passcode::new(s)
    }
}

/// Constant-time comparison implementation for Passcode
impl PartialEq for Passcode {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

impl std::hash::Hash for Passcode {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

/// Compare two code strings in constant time.
///
/// Strings of different lengths compare unequal immediately; within one
/// length the comparison leaks nothing about where they differ.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.len() == b.len() && bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}

/// A stored credential as the verification pipeline sees it.
///
/// The store owns the row; the core only reads these fields and asks the
/// store to flip `used` on a one-time credential's first successful match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub id: i64,

    /// Display form of the code.
    pub masked: String,

    pub is_main: bool,
    pub is_one_time: bool,
    pub used: bool,

    /// Guests expire; the main credential has no validity window.
    pub valid_until: Option<DateTime<Utc>>,
}

impl Credential {
    /// Seconds of validity remaining at `now`, floored at zero.
    ///
    /// Returns `None` for credentials without a validity window.
    #[must_use]
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> Option<i64> {
        self.valid_until
            .map(|until| (until - now).num_seconds().max(0))
    }
}

/// Snapshot of the runtime settings the core consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub passcode_enabled: bool,
    pub face_enabled: bool,
    pub fingerprint_enabled: bool,
    pub hold_time_secs: u64,
}

impl Default for Settings {
    /// Safe defaults: features enabled, 5 second hold.
    ///
    /// Used verbatim when the settings source cannot answer, so a dead
    /// settings table degrades to normal operation instead of a locked door.
    fn default() -> Self {
        Self {
            passcode_enabled: true,
            face_enabled: true,
            fingerprint_enabled: true,
            hold_time_secs: crate::constants::DEFAULT_HOLD_TIME_SECS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1234")]
    #[case("0000")]
    #[case(" 9876 ")] // trimmed
    fn test_passcode_valid(#[case] input: &str) {
        let code = Passcode::new(input).unwrap();
        assert_eq!(code.as_str(), input.trim());
    }

    #[rstest]
    #[case("123")] // too short
    #[case("12345")] // too long
    #[case("12a4")] // non-digit
    #[case("")] // empty
    fn test_passcode_invalid(#[case] input: &str) {
        assert!(Passcode::new(input).is_err());
    }

    #[test]
    fn test_passcode_constant_time_matches() {
        let code = Passcode::new("1234").unwrap();
        assert!(code.matches("1234"));
        assert!(code.matches(" 1234 "));
        assert!(!code.matches("1235"));
        assert!(!code.matches("123"));
    }

    #[test]
    fn test_constant_time_eq_lengths() {
        assert!(constant_time_eq("1234", "1234"));
        assert!(!constant_time_eq("1234", "12345"));
        assert!(!constant_time_eq("", "0"));
    }

    #[test]
    fn test_attempt_confidence_sanitized() {
        let attempt = AccessAttempt::new(AccessMethod::Face, AccessOutcome::Granted)
            .with_confidence(f64::NAN);
        assert_eq!(attempt.confidence, None);

        let attempt = AccessAttempt::new(AccessMethod::Face, AccessOutcome::Granted)
            .with_confidence(f64::INFINITY);
        assert_eq!(attempt.confidence, None);

        let attempt =
            AccessAttempt::new(AccessMethod::Face, AccessOutcome::Granted).with_confidence(0.42);
        assert_eq!(attempt.confidence, Some(0.42));
    }

    #[test]
    fn test_credential_remaining_secs() {
        let now = Utc::now();
        let cred = Credential {
            id: 1,
            masked: "1234".into(),
            is_main: false,
            is_one_time: false,
            used: false,
            valid_until: Some(now + chrono::Duration::seconds(90)),
        };
        let remain = cred.remaining_secs(now).unwrap();
        assert!((89..=90).contains(&remain));

        let expired = Credential {
            valid_until: Some(now - chrono::Duration::seconds(5)),
            ..cred.clone()
        };
        assert_eq!(expired.remaining_secs(now), Some(0));

        let main = Credential {
            valid_until: None,
            is_main: true,
            ..cred
        };
        assert_eq!(main.remaining_secs(now), None);
    }

    #[test]
    fn test_method_and_outcome_strings() {
        assert_eq!(AccessMethod::Passcode.to_string(), "passcode");
        assert_eq!(AccessMethod::Fingerprint.to_string(), "fingerprint");
        assert_eq!(AccessMethod::Face.to_string(), "face");
        assert_eq!(AccessOutcome::Granted.to_string(), "granted");
        assert_eq!(AccessOutcome::Denied.to_string(), "denied");
        assert_eq!(AccessOutcome::Blocked.to_string(), "blocked");
    }
}
