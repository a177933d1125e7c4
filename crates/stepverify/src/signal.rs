//! Signals observed from a producer.
//!
//! A subscription yields any number of [`Signal::Next`] values followed by at
//! most one terminal signal ([`Signal::Error`] or [`Signal::Complete`]).
//! Every signal is stamped with the time it was emitted: virtual time when the
//! run is driven by a [`VirtualClock`](crate::VirtualClock), elapsed wall-clock
//! time since subscription otherwise.

use std::borrow::Cow;
use std::fmt::{self, Debug};
use std::time::Duration;

/// Error carried by a terminal [`Signal::Error`].
///
/// `kind` classifies the failure and is what `expect_error` matches on;
/// `detail` is free-form and is what `expect_error_message` matches on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerError {
    kind: Cow<'static, str>,
    detail: String,
}

impl ProducerError {
    /// Creates an error with an explicit kind.
    pub fn new(kind: impl Into<Cow<'static, str>>, detail: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            detail: detail.into(),
        }
    }

    /// Wraps a Rust error, using its type name as the kind.
    pub fn of<E: std::error::Error + 'static>(err: &E) -> Self {
        Self {
            kind: Cow::Borrowed(kind_of::<E>()),
            detail: err.to_string(),
        }
    }

    /// The failure classification.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The free-form message.
    pub fn detail(&self) -> &str {
        &self.detail
    }

    /// Returns true if this error was built by [`ProducerError::of`] from an `E`.
    pub fn is<E: 'static>(&self) -> bool {
        self.kind == kind_of::<E>()
    }
}

impl fmt::Display for ProducerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.detail.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}: {}", self.kind, self.detail)
        }
    }
}

impl std::error::Error for ProducerError {}

/// Kind string used for errors of type `E`.
pub fn kind_of<E: ?Sized + 'static>() -> &'static str {
    std::any::type_name::<E>()
}

/// One event observed from a producer.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal<T> {
    Next(T),
    Error(ProducerError),
    Complete,
}

impl<T> Signal<T> {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Signal::Next(_))
    }
}

impl<T: Debug> Signal<T> {
    pub fn describe(&self) -> String {
        match self {
            Signal::Next(value) => format!("Next({value:?})"),
            Signal::Error(err) => format!("Error({err})"),
            Signal::Complete => "Complete".to_string(),
        }
    }
}

/// A signal together with its emission time.
#[derive(Debug, Clone, PartialEq)]
pub struct Timed<T> {
    pub signal: Signal<T>,
    pub at: Duration,
}

impl<T: Debug> Timed<T> {
    pub fn describe(&self) -> String {
        format!("{} at {:?}", self.signal.describe(), self.at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("get out of here")]
    struct GetOutOfHere;

    #[test]
    fn terminal_classification() {
        assert!(!Signal::Next(1).is_terminal());
        assert!(Signal::<i32>::Complete.is_terminal());
        assert!(Signal::<i32>::Error(ProducerError::new("IllegalState", "")).is_terminal());
    }

    #[test]
    fn error_kind_from_type() {
        let err = ProducerError::of(&GetOutOfHere);
        assert!(err.is::<GetOutOfHere>());
        assert!(!err.is::<std::io::Error>());
        assert_eq!(err.detail(), "get out of here");
        assert!(err.kind().ends_with("GetOutOfHere"));
    }

    #[test]
    fn describe_includes_payload_and_time() {
        let timed = Timed {
            signal: Signal::Next("foo"),
            at: Duration::from_secs(2),
        };
        assert_eq!(timed.describe(), "Next(\"foo\") at 2s");

        let timed: Timed<&str> = Timed {
            signal: Signal::Error(ProducerError::new("Runtime", "boom")),
            at: Duration::ZERO,
        };
        assert_eq!(timed.describe(), "Error(Runtime: boom) at 0ns");
    }

    #[test]
    fn display_omits_empty_detail() {
        assert_eq!(ProducerError::new("Runtime", "").to_string(), "Runtime");
    }
}
