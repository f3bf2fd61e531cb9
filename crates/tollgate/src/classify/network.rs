// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::error::Error;
use std::io;
use std::time::Duration;

/// Backoff hint for generic transport failures.
pub(crate) const NETWORK_RETRY_AFTER: Duration = Duration::from_secs(5);

/// Backoff hint for TLS handshake and certificate failures.
pub(crate) const TLS_RETRY_AFTER: Duration = Duration::from_secs(10);

const TLS_SIGNATURES: &[&str] = &["ssl", "tls", "certificate"];

const NETWORK_SIGNATURES: &[&str] = &[
    "etimedout",
    "econnreset",
    "econnrefused",
    "ehostunreach",
    "dns",
    "failed to lookup address",
    "name or service not known",
    "timed out",
    "timeout",
    "deadline has elapsed",
    "connection reset",
    "connection refused",
    "connection closed",
    "connection aborted",
];

/// Which family of transport failure an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NetworkFailure {
    Transport,
    Tls,
}

impl NetworkFailure {
    pub(crate) const fn retry_after(self) -> Duration {
        match self {
            Self::Transport => NETWORK_RETRY_AFTER,
            Self::Tls => TLS_RETRY_AFTER,
        }
    }

    pub(crate) const fn label(self) -> &'static str {
        match self {
            Self::Transport => "network error",
            Self::Tls => "tls error",
        }
    }
}

/// Walks the `source()` chain of an error looking for a transport failure.
///
/// The first error in the chain that matches decides the result. TLS signatures win over the
/// generic ones within a single message.
pub(crate) fn detect(error: &(dyn Error + 'static)) -> Option<NetworkFailure> {
    let mut current = Some(error);

    while let Some(error) = current {
        if let Some(io_error) = error.downcast_ref::<io::Error>()
            && is_network_kind(io_error.kind())
        {
            return Some(NetworkFailure::Transport);
        }

        if let Some(failure) = detect_message(&error.to_string()) {
            return Some(failure);
        }

        current = error.source();
    }

    None
}

/// Matches a free-form error message against the transport signatures.
///
/// Signatures match whole words only, so `tls` is found in `tls handshake eof` and
/// `SSL_ERROR_SYSCALL` but not inside a longer word.
pub(crate) fn detect_message(message: &str) -> Option<NetworkFailure> {
    let message = message.to_ascii_lowercase();
    let words: Vec<&str> = message.split(|c: char| !c.is_ascii_alphanumeric()).filter(|word| !word.is_empty()).collect();

    if TLS_SIGNATURES.iter().any(|signature| contains_phrase(&words, signature)) {
        return Some(NetworkFailure::Tls);
    }

    NETWORK_SIGNATURES
        .iter()
        .any(|signature| contains_phrase(&words, signature))
        .then_some(NetworkFailure::Transport)
}

fn contains_phrase(words: &[&str], phrase: &str) -> bool {
    let phrase: Vec<&str> = phrase.split(' ').collect();
    words.windows(phrase.len()).any(|window| window == phrase.as_slice())
}

const fn is_network_kind(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::TimedOut
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::HostUnreachable
            | io::ErrorKind::NetworkUnreachable
    )
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::fmt;

    use super::*;

    #[derive(Debug)]
    struct Wrapper(io::Error);

    impl fmt::Display for Wrapper {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("request failed")
        }
    }

    impl Error for Wrapper {
        fn source(&self) -> Option<&(dyn Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn io_kind_detected() {
        let error = io::Error::from(io::ErrorKind::ConnectionReset);

        assert_eq!(detect(&error), Some(NetworkFailure::Transport));
    }

    #[test]
    fn source_chain_is_walked() {
        let error = Wrapper(io::Error::from(io::ErrorKind::TimedOut));

        assert_eq!(detect(&error), Some(NetworkFailure::Transport));
    }

    #[test]
    fn tls_wins_over_generic() {
        assert_eq!(detect_message("SSL handshake timed out"), Some(NetworkFailure::Tls));
        assert_eq!(detect_message("invalid peer certificate"), Some(NetworkFailure::Tls));
    }

    #[test]
    fn errno_names_detected() {
        assert_eq!(detect_message("connect ECONNREFUSED 127.0.0.1:443"), Some(NetworkFailure::Transport));
        assert_eq!(detect_message("deadline has elapsed"), Some(NetworkFailure::Transport));
    }

    #[test]
    fn signatures_inside_longer_words_are_ignored() {
        assert_eq!(detect_message("settlsment batch rejected"), None);
        assert_eq!(detect_message("field classlist is invalid"), None);
        assert_eq!(detect_message("uncertificated account"), None);
        assert_eq!(detect_message("SSL_ERROR_SYSCALL"), Some(NetworkFailure::Tls));
        assert_eq!(detect_message("tls: handshake failure"), Some(NetworkFailure::Tls));
    }

    #[test]
    fn unrelated_message_not_detected() {
        let error = io::Error::new(io::ErrorKind::InvalidData, "unexpected end of json");

        assert_eq!(detect(&error), None);
    }

    #[test]
    fn retry_after_per_family() {
        assert_eq!(NetworkFailure::Transport.retry_after(), Duration::from_secs(5));
        assert_eq!(NetworkFailure::Tls.retry_after(), Duration::from_secs(10));
    }
}
