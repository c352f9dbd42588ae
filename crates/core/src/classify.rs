//! Backend failure classification
//!
//! The HTTP backend surfaces collection corruption as generic transport
//! errors, so classification is done on the error text (and the HTTP status
//! when one is available) rather than on error types. The signature lists are
//! backend-version specific and not exhaustive; this module is the only place
//! that knows them.

/// Classification of a backend failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Collection is unusable until reset
    Corruption,
    /// Transport failure; reconnect with backoff, no reset
    Connectivity,
    /// Anything else; propagated unchanged
    Other,
}

/// Default corruption signatures (lowercase substrings)
pub const CORRUPTION_SIGNATURES: &[&str] = &[
    "convert attribute",
    "attribute conversion",
    "failed to convert",
    "internal server error",
    "[corruption]",
    "corrupt",
];

/// Default connectivity signatures (lowercase substrings)
pub const CONNECTIVITY_SIGNATURES: &[&str] = &[
    "connection refused",
    "connection reset",
    "connection closed",
    "closed channel",
    "channel closed",
    "broken pipe",
    "error sending request",
    "timed out",
    "not connected",
];

// Prefixes after which a three-digit 5xx status counts as a server failure.
const STATUS_MARKERS: &[&str] = &[
    "http ",
    "http/1.1 ",
    "http/2 ",
    "status ",
    "status: ",
    "status=",
    "status code ",
    "status code: ",
];

/// Substring signatures used to classify failures
///
/// Construct with [`SignatureSet::default`] and extend with
/// [`SignatureSet::with_corruption_signature`] when a backend version
/// reports corruption with a new message.
#[derive(Debug, Clone)]
pub struct SignatureSet {
    corruption: Vec<String>,
    connectivity: Vec<String>,
}

impl Default for SignatureSet {
    fn default() -> Self {
        Self {
            corruption: CORRUPTION_SIGNATURES.iter().map(|s| s.to_string()).collect(),
            connectivity: CONNECTIVITY_SIGNATURES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl SignatureSet {
    /// Add a corruption signature (matched case-insensitively)
    pub fn with_corruption_signature(mut self, pattern: impl AsRef<str>) -> Self {
        let pattern = pattern.as_ref().trim().to_lowercase();
        if !pattern.is_empty() && !self.corruption.contains(&pattern) {
            self.corruption.push(pattern);
        }
        self
    }

    /// Add several corruption signatures at once
    pub fn with_corruption_signatures<I, S>(self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        patterns
            .into_iter()
            .fold(self, |set, p| set.with_corruption_signature(p))
    }

    /// Classify a failure message and optional HTTP status.
    ///
    /// Corruption takes precedence over connectivity.
    pub fn classify(&self, message: &str, status: Option<u16>) -> FailureClass {
        if status.is_some_and(|s| (500..600).contains(&s)) {
            return FailureClass::Corruption;
        }

        let lower = message.to_lowercase();
        if has_5xx_marker(&lower) || self.corruption.iter().any(|p| lower.contains(p.as_str())) {
            return FailureClass::Corruption;
        }
        if self.connectivity.iter().any(|p| lower.contains(p.as_str())) {
            return FailureClass::Connectivity;
        }
        FailureClass::Other
    }
}

/// Classify with the default signature set
pub fn classify_failure(message: &str, status: Option<u16>) -> FailureClass {
    SignatureSet::default().classify(message, status)
}

fn has_5xx_marker(lower: &str) -> bool {
    STATUS_MARKERS.iter().any(|marker| {
        lower
            .match_indices(marker)
            .any(|(idx, m)| is_5xx_prefix(&lower[idx + m.len()..]))
    })
}

fn is_5xx_prefix(rest: &str) -> bool {
    let bytes = rest.as_bytes();
    bytes.len() >= 3
        && bytes[0] == b'5'
        && bytes[1].is_ascii_digit()
        && bytes[2].is_ascii_digit()
        && bytes.get(3).map_or(true, |b| !b.is_ascii_digit())
}
