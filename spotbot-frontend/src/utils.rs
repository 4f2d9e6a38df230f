use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Why a single send to the sink did not go through
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("connection timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited, retry after {}s", .0.as_secs())]
    RateLimited(Duration),

    #[error("message markup rejected: {0}")]
    BadMarkup(String),

    #[error("message rejected ({status}): {description}")]
    Rejected { status: u16, description: String },

    #[error("sink server error ({status}): {description}")]
    Server { status: u16, description: String },

    #[error("unexpected sink error: {0}")]
    Unexpected(String),
}

/// What the delivery loop should do after a failed send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Back off exponentially and try again
    Retry,
    /// Wait exactly this long, then try again
    Wait(Duration),
    /// Permanent failure
    GiveUp,
}

impl SinkError {
    pub fn disposition(&self) -> Disposition {
        match self {
            SinkError::Timeout(_)
            | SinkError::Connect(_)
            | SinkError::Network(_)
            | SinkError::Rejected { .. }
            | SinkError::Server { .. }
            | SinkError::Unexpected(_) => Disposition::Retry,
            SinkError::RateLimited(wait) => Disposition::Wait(*wait),
            SinkError::BadMarkup(_) => Disposition::GiveUp,
        }
    }

    /// Network-class failures (as opposed to anything else that is retried)
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            SinkError::Timeout(_) | SinkError::Connect(_) | SinkError::Network(_)
        )
    }

    pub fn from_transport(e: reqwest::Error) -> Self {
        let e = e.without_url();
        if e.is_timeout() {
            SinkError::Timeout(e.to_string())
        } else if e.is_connect() {
            SinkError::Connect(e.to_string())
        } else {
            SinkError::Network(e.to_string())
        }
    }
}

/// The single outbound destination notifications are delivered to
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Destination description for log lines
    fn target(&self) -> String;

    /// One send attempt, markup passed through verbatim
    async fn send(&self, text: &str) -> Result<(), SinkError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disposition() {
        assert_eq!(SinkError::Timeout("t".into()).disposition(), Disposition::Retry);
        assert_eq!(SinkError::Unexpected("?".into()).disposition(), Disposition::Retry);
        assert_eq!(
            SinkError::RateLimited(Duration::from_secs(7)).disposition(),
            Disposition::Wait(Duration::from_secs(7))
        );
        assert_eq!(SinkError::BadMarkup("b".into()).disposition(), Disposition::GiveUp);
        assert_eq!(
            SinkError::Rejected { status: 403, description: "Forbidden".into() }.disposition(),
            Disposition::Retry
        );
        assert!(SinkError::Connect("c".into()).is_network());
        assert!(!SinkError::Unexpected("?".into()).is_network());
    }

    #[test]
    fn test_rate_limited_message() {
        let e = SinkError::RateLimited(Duration::from_secs(7));
        assert_eq!(e.to_string(), "rate limited, retry after 7s");
    }
}
