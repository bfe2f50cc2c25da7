//! Reply predicates for the synchronous provisioning operations.
//!
//! Provisioning replies are matched by case-insensitive prefix; a trailing
//! `:<n>` field carries the sensor slot id where one applies. Timeouts are
//! configuration and live with the caller, not here.

/// Which request/response operation a reply is being matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningOp {
    Enroll,
    Delete,
    Library,
}

impl ProvisioningOp {
    /// Case-insensitive prefix signalling success for this operation.
    #[must_use]
    pub fn success_prefix(&self) -> &'static str {
        match self {
            ProvisioningOp::Enroll => "inform enroll complete, id:",
            ProvisioningOp::Delete => "inform delete success",
            ProvisioningOp::Library => "inform library first empty slot:",
        }
    }

    /// Case-insensitive prefix signalling failure for this operation.
    #[must_use]
    pub fn failure_prefix(&self) -> &'static str {
        match self {
            ProvisioningOp::Enroll => "error enroll",
            ProvisioningOp::Delete => "error delete",
            ProvisioningOp::Library => "error library",
        }
    }

    /// Test one line against this operation's predicates.
    ///
    /// Returns `None` when the line is unrelated (it stays in the stream for
    /// other listeners). A success reply also carries the trailing numeric
    /// field when the operation produces one.
    #[must_use]
    pub fn classify(&self, line: &str) -> Option<ReplyMatch> {
        let lower = line.trim().to_ascii_lowercase();
        if lower.starts_with(self.success_prefix()) {
            return Some(ReplyMatch {
                ok: true,
                value: trailing_number(line),
                message: line.trim().to_string(),
            });
        }
        if lower.starts_with(self.failure_prefix()) {
            return Some(ReplyMatch {
                ok: false,
                value: None,
                message: line.trim().to_string(),
            });
        }
        None
    }
}

/// Outcome of matching a reply line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyMatch {
    pub ok: bool,

    /// Trailing numeric field (enrolled slot id, first empty slot).
    pub value: Option<u32>,

    /// The matched line verbatim.
    pub message: String,
}

/// Parse the number after the last `:` of a reply line.
fn trailing_number(line: &str) -> Option<u32> {
    line.rsplit(':').next()?.trim().parse().ok()
}
