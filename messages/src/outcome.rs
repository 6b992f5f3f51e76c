use std::fmt;

/// Why a message was refused, and how much the sender should be penalized.
///
/// `dos == 0` means the message was dropped without blaming the peer
/// (stale anchor, duplicate, our own view lagging behind).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rejection {
    pub reason: String,
    pub dos: u32,
}

impl Rejection {
    pub fn new(reason: impl Into<String>, dos: u32) -> Self {
        Self {
            reason: reason.into(),
            dos,
        }
    }

    /// Rejected without a misbehavior score.
    pub fn silent(reason: impl Into<String>) -> Self {
        Self::new(reason, 0)
    }

    pub fn is_misbehavior(&self) -> bool {
        self.dos > 0
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dos > 0 {
            write!(f, "{} (dos {})", self.reason, self.dos)
        } else {
            f.write_str(&self.reason)
        }
    }
}

impl std::error::Error for Rejection {}
