//! Error types for speed measurements.
//!
//! Transport failures are the only errors a measurement session can end
//! with; everything else here exists so callers get a clear message, a
//! suggestion, and an exit code.

use std::error::Error;
use std::fmt;

/// Exit codes for the command-line caller.
pub mod exit_codes {
    /// Successful execution.
    pub const SUCCESS: i32 = 0;
    /// Network error (connection failed, DNS, TLS, etc.).
    pub const NETWORK_ERROR: i32 = 1;
    /// The endpoint answered with a non-success status.
    pub const STATUS_ERROR: i32 = 2;
    /// Configuration error (invalid arguments).
    pub const CONFIG_ERROR: i32 = 3;
    /// Unknown/unexpected error.
    pub const UNKNOWN_ERROR: i32 = 99;
}

/// Categories of errors that can occur during a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request failed on the network path.
    Transport,
    /// DNS resolution failures.
    Dns,
    /// TLS/SSL handshake failures.
    Tls,
    /// The endpoint returned a non-2xx status.
    Status,
    /// Invalid configuration or arguments.
    Config,
    /// The upload payload could not be produced.
    Payload,
    /// Unknown or unexpected errors.
    Unknown,
}

impl ErrorKind {
    /// Get the exit code for this error kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorKind::Transport => exit_codes::NETWORK_ERROR,
            ErrorKind::Dns => exit_codes::NETWORK_ERROR,
            ErrorKind::Tls => exit_codes::NETWORK_ERROR,
            ErrorKind::Status => exit_codes::STATUS_ERROR,
            ErrorKind::Config => exit_codes::CONFIG_ERROR,
            ErrorKind::Payload => exit_codes::UNKNOWN_ERROR,
            ErrorKind::Unknown => exit_codes::UNKNOWN_ERROR,
        }
    }

    /// Get a user-friendly description of this error kind.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorKind::Transport => "Transport error",
            ErrorKind::Dns => "DNS resolution error",
            ErrorKind::Tls => "TLS/SSL error",
            ErrorKind::Status => "Endpoint error",
            ErrorKind::Config => "Configuration error",
            ErrorKind::Payload => "Payload error",
            ErrorKind::Unknown => "Unknown error",
        }
    }

    /// Whether this kind belongs to the transport family, i.e. the request
    /// itself failed.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ErrorKind::Transport
                | ErrorKind::Dns
                | ErrorKind::Tls
                | ErrorKind::Status
        )
    }

    fn suggestion(&self) -> Option<&'static str> {
        match self {
            ErrorKind::Transport => {
                Some("Check your internet connection and try again.")
            }
            ErrorKind::Dns => Some(
                "Check your DNS settings or try using a different DNS server.",
            ),
            ErrorKind::Tls => Some(
                "There may be a certificate issue. Check your system time.",
            ),
            ErrorKind::Status => Some(
                "The measurement endpoint rejected the request. Check the URL.",
            ),
            _ => None,
        }
    }
}

/// A user-friendly error type for speed measurement operations.
#[derive(Debug)]
pub struct SpeedTestError {
    /// The kind of error.
    pub kind: ErrorKind,
    /// User-friendly error message.
    pub message: String,
    /// Optional suggestion for how to resolve the error.
    pub suggestion: Option<String>,
    /// The underlying error, if any.
    pub source: Option<Box<dyn Error + Send + Sync>>,
}

impl SpeedTestError {
    /// Create a new SpeedTestError.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), suggestion: None, source: None }
    }

    /// Add a suggestion for how to resolve the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add the underlying error source.
    pub fn with_source(
        mut self,
        source: impl Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the exit code for this error.
    pub fn exit_code(&self) -> i32 {
        self.kind.exit_code()
    }

    /// Whether the underlying request failed.
    pub fn is_transport(&self) -> bool {
        self.kind.is_transport()
    }

    /// Create a generic transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        let kind = ErrorKind::Transport;
        let error = Self::new(kind, message);
        match kind.suggestion() {
            Some(suggestion) => error.with_suggestion(suggestion),
            None => error,
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    /// Create a payload generation error.
    pub fn payload(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Payload, message)
    }

    /// Wrap the cause reported by a transport, classifying it and attaching
    /// the matching suggestion.
    pub fn from_transport(
        cause: Box<dyn Error + Send + Sync>,
        context: &str,
    ) -> Self {
        let mut kind = classify_error(cause.as_ref());
        if !kind.is_transport() {
            kind = ErrorKind::Transport;
        }

        let mut error =
            SpeedTestError::new(kind, format!("{}: {}", context, cause));
        error.source = Some(cause);

        match kind.suggestion() {
            Some(suggestion) => error.with_suggestion(suggestion),
            None => error,
        }
    }
}

impl fmt::Display for SpeedTestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.description(), self.message)?;

        if let Some(ref suggestion) = self.suggestion {
            write!(f, "\n  Suggestion: {}", suggestion)?;
        }

        Ok(())
    }
}

impl Error for SpeedTestError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn Error + 'static))
    }
}

/// Classify an error into an ErrorKind.
///
/// HTTP clients report the specific cause (DNS, TLS) several layers down
/// the `source()` chain, so every link is inspected. A specific kind found
/// anywhere wins over a generic transport match.
pub fn classify_error(error: &(dyn Error + 'static)) -> ErrorKind {
    let mut fallback = ErrorKind::Unknown;
    let mut link = Some(error);

    while let Some(current) = link {
        match classify_link(current) {
            ErrorKind::Unknown => {}
            ErrorKind::Transport => fallback = ErrorKind::Transport,
            kind => return kind,
        }
        link = current.source();
    }

    fallback
}

fn classify_link(error: &(dyn Error + 'static)) -> ErrorKind {
    // reqwest messages embed the URL; trust its flags instead of the text.
    if let Some(error) = error.downcast_ref::<reqwest::Error>() {
        return if error.is_status() {
            ErrorKind::Status
        } else {
            ErrorKind::Transport
        };
    }

    let error_str = error.to_string().to_lowercase();

    if error_str.contains("dns")
        || error_str.contains("resolve")
        || error_str.contains("lookup address")
        || error_str.contains("no such host")
    {
        return ErrorKind::Dns;
    }

    if error_str.contains("tls")
        || error_str.contains("ssl")
        || error_str.contains("certificate")
        || error_str.contains("handshake")
    {
        return ErrorKind::Tls;
    }

    if error_str.contains("status client error")
        || error_str.contains("status server error")
        || error_str.contains("status: 4")
        || error_str.contains("status: 5")
    {
        return ErrorKind::Status;
    }

    if error_str.contains("connection refused")
        || error_str.contains("connection reset")
        || error_str.contains("connection closed")
        || error_str.contains("network unreachable")
        || error_str.contains("host unreachable")
        || error_str.contains("no route")
        || error_str.contains("broken pipe")
        || error_str.contains("timed out")
        || error_str.contains("error sending request")
    {
        return ErrorKind::Transport;
    }

    ErrorKind::Unknown
}

/// Format an error for user display.
pub fn format_error_for_display(error: &SpeedTestError) -> String {
    let mut output = format!("Error: {}", error.message);

    if let Some(ref suggestion) = error.suggestion {
        output.push_str(&format!("\n\nSuggestion: {}", suggestion));
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::scripted::LayeredError;

    #[test]
    fn test_error_kind_exit_codes() {
        assert_eq!(ErrorKind::Transport.exit_code(), exit_codes::NETWORK_ERROR);
        assert_eq!(ErrorKind::Dns.exit_code(), exit_codes::NETWORK_ERROR);
        assert_eq!(ErrorKind::Status.exit_code(), exit_codes::STATUS_ERROR);
        assert_eq!(ErrorKind::Config.exit_code(), exit_codes::CONFIG_ERROR);
        assert_eq!(ErrorKind::Unknown.exit_code(), exit_codes::UNKNOWN_ERROR);
    }

    #[test]
    fn test_transport_family() {
        assert!(ErrorKind::Transport.is_transport());
        assert!(ErrorKind::Dns.is_transport());
        assert!(ErrorKind::Tls.is_transport());
        assert!(ErrorKind::Status.is_transport());
        assert!(!ErrorKind::Config.is_transport());
        assert!(!ErrorKind::Payload.is_transport());
    }

    #[test]
    fn test_speed_test_error_display() {
        let error = SpeedTestError::transport("Failed to connect to server");

        let display = format!("{}", error);
        assert!(display.contains("Transport error"));
        assert!(display.contains("Failed to connect"));
        assert!(display.contains("Suggestion"));
    }

    #[test]
    fn test_classify_error_dns() {
        let error =
            std::io::Error::other("DNS resolution failed: no such host");
        assert_eq!(classify_error(&error), ErrorKind::Dns);
    }

    #[test]
    fn test_classify_error_walks_source_chain() {
        let error = LayeredError::chain(&[
            "error sending request for url (http://speed.invalid/down)",
            "client error (Connect)",
            "dns error",
            "failed to lookup address information: Name or service not known",
        ]);
        assert_eq!(classify_error(&error), ErrorKind::Dns);

        let error = LayeredError::chain(&[
            "error sending request for url (https://speed.example.com/)",
            "client error (Connect)",
            "invalid peer certificate: UnknownIssuer",
        ]);
        assert_eq!(classify_error(&error), ErrorKind::Tls);
    }

    #[test]
    fn test_classify_error_generic_chain_is_transport() {
        let error = LayeredError::chain(&[
            "error sending request for url (http://127.0.0.1:9/)",
            "client error (Connect)",
            "tcp connect error",
        ]);
        assert_eq!(classify_error(&error), ErrorKind::Transport);
    }

    #[test]
    fn test_from_transport_classifies_nested_dns_cause() {
        let cause: Box<dyn Error + Send + Sync> = Box::new(
            LayeredError::chain(&["error sending request", "dns error"]),
        );

        let error = SpeedTestError::from_transport(cause, "download");
        assert_eq!(error.kind, ErrorKind::Dns);
        assert!(error.suggestion.unwrap().contains("DNS"));
    }

    #[test]
    fn test_classify_error_status() {
        let error = std::io::Error::other(
            "HTTP status server error (503 Service Unavailable)",
        );
        assert_eq!(classify_error(&error), ErrorKind::Status);
    }

    #[test]
    fn test_classify_error_network() {
        let error = std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        );
        assert_eq!(classify_error(&error), ErrorKind::Transport);
    }

    #[test]
    fn test_classify_error_unknown() {
        let error = std::io::Error::other("some random error");
        assert_eq!(classify_error(&error), ErrorKind::Unknown);
    }

    #[test]
    fn test_from_transport_keeps_source_and_context() {
        let cause: Box<dyn Error + Send + Sync> = Box::new(
            std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            ),
        );

        let error = SpeedTestError::from_transport(cause, "download");

        assert_eq!(error.kind, ErrorKind::Transport);
        assert!(error.message.starts_with("download: "));
        assert!(error.suggestion.is_some());
        assert!(Error::source(&error).is_some());
    }

    #[test]
    fn test_from_transport_unclassified_is_still_transport() {
        let cause: Box<dyn Error + Send + Sync> =
            Box::new(std::io::Error::other("mystery"));

        let error = SpeedTestError::from_transport(cause, "ping");
        assert!(error.is_transport());
    }

    #[test]
    fn test_format_error_for_display() {
        let error = SpeedTestError::config("window size must be positive")
            .with_suggestion("Pass --window 1 or more.");
        let output = format_error_for_display(&error);
        assert!(output.starts_with("Error: window size"));
        assert!(output.contains("Suggestion: Pass --window"));
    }
}
