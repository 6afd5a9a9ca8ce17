//! Error classification shared by the API and the upstream AI client.
//!
//! Every kind carries whether a retry can help and a user-facing message in
//! the product locale; handlers log the technical error and return the
//! localized one.

use std::time::Duration;

use axum::http::StatusCode;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Network,
    Validation,
    Authentication,
    Authorization,
    NotFound,
    Conflict,
    RateLimit,
    Server,
    Unknown,
}

impl ErrorKind {
    /// Classify from an HTTP status; `None` means the request never got a
    /// response (DNS, connect, timeout).
    pub fn from_status(status: Option<StatusCode>) -> Self {
        let Some(status) = status else {
            return ErrorKind::Network;
        };
        match status {
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => ErrorKind::Validation,
            StatusCode::UNAUTHORIZED => ErrorKind::Authentication,
            StatusCode::FORBIDDEN => ErrorKind::Authorization,
            StatusCode::NOT_FOUND => ErrorKind::NotFound,
            StatusCode::CONFLICT => ErrorKind::Conflict,
            StatusCode::TOO_MANY_REQUESTS => ErrorKind::RateLimit,
            s if s.is_server_error() => ErrorKind::Server,
            _ => ErrorKind::Unknown,
        }
    }

    pub fn retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::Network | ErrorKind::RateLimit | ErrorKind::Server
        )
    }

    pub fn user_message(self) -> &'static str {
        match self {
            ErrorKind::Network => "Zkontrolujte připojení k internetu a zkuste to znovu.",
            ErrorKind::Validation => "Odeslaná data nejsou platná.",
            ErrorKind::Authentication => "Přihlášení vypršelo. Přihlaste se prosím znovu.",
            ErrorKind::Authorization => "K této akci nemáte oprávnění.",
            ErrorKind::NotFound => "Požadovaný záznam nebyl nalezen.",
            ErrorKind::Conflict => "Záznam již existuje nebo byl mezitím změněn.",
            ErrorKind::RateLimit => "Příliš mnoho požadavků. Zkuste to za chvíli.",
            ErrorKind::Server => "Služba je dočasně nedostupná. Zkuste to později.",
            ErrorKind::Unknown => "Došlo k neočekávané chybě.",
        }
    }
}

/// Fixed exponential backoff: 1 s, 2 s, 4 s by default.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after a failed attempt (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }

    /// Whether another attempt should be made after `attempt` failed with `kind`.
    pub fn should_retry(&self, attempt: u32, kind: ErrorKind) -> bool {
        kind.retryable() && attempt + 1 < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_map_to_expected_kinds() {
        assert_eq!(ErrorKind::from_status(None), ErrorKind::Network);
        assert_eq!(
            ErrorKind::from_status(Some(StatusCode::BAD_REQUEST)),
            ErrorKind::Validation
        );
        assert_eq!(
            ErrorKind::from_status(Some(StatusCode::UNPROCESSABLE_ENTITY)),
            ErrorKind::Validation
        );
        assert_eq!(
            ErrorKind::from_status(Some(StatusCode::UNAUTHORIZED)),
            ErrorKind::Authentication
        );
        assert_eq!(
            ErrorKind::from_status(Some(StatusCode::FORBIDDEN)),
            ErrorKind::Authorization
        );
        assert_eq!(
            ErrorKind::from_status(Some(StatusCode::NOT_FOUND)),
            ErrorKind::NotFound
        );
        assert_eq!(
            ErrorKind::from_status(Some(StatusCode::CONFLICT)),
            ErrorKind::Conflict
        );
        assert_eq!(
            ErrorKind::from_status(Some(StatusCode::TOO_MANY_REQUESTS)),
            ErrorKind::RateLimit
        );
        assert_eq!(
            ErrorKind::from_status(Some(StatusCode::BAD_GATEWAY)),
            ErrorKind::Server
        );
        assert_eq!(
            ErrorKind::from_status(Some(StatusCode::IM_A_TEAPOT)),
            ErrorKind::Unknown
        );
    }

    #[test]
    fn only_transient_kinds_are_retryable() {
        for kind in [ErrorKind::Network, ErrorKind::RateLimit, ErrorKind::Server] {
            assert!(kind.retryable(), "{kind:?} should be retryable");
        }
        for kind in [
            ErrorKind::Validation,
            ErrorKind::Authentication,
            ErrorKind::Authorization,
            ErrorKind::NotFound,
            ErrorKind::Conflict,
            ErrorKind::Unknown,
        ] {
            assert!(!kind.retryable(), "{kind:?} should not be retryable");
        }
    }

    #[test]
    fn backoff_is_one_two_four_seconds() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
    }

    #[test]
    fn retries_stop_at_max_attempts_and_skip_permanent_errors() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(0, ErrorKind::Server));
        assert!(policy.should_retry(1, ErrorKind::Network));
        assert!(!policy.should_retry(2, ErrorKind::Server));
        assert!(!policy.should_retry(0, ErrorKind::Validation));
    }
}
