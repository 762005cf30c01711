//! Common identifier types.

use rkyv::{Archive, Deserialize, Serialize};

/// Correlation ID for matching dispatch events to execution results.
///
/// Uses ULID format (128-bit, lexicographically sortable, monotonic).
#[derive(Archive, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[rkyv(compare(PartialEq))]
pub struct CorrelationId(pub [u8; 16]);

impl CorrelationId {
    /// Creates a new correlation ID from the current timestamp.
    #[must_use]
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_bytes())
    }

    /// Creates a correlation ID from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes of this correlation ID.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", ulid::Ulid::from_bytes(self.0))
    }
}

/// Opaque string uniquely naming a function or node in the system.
///
/// URNs are minted by the scheduler and function controllers; nothing in
/// this plane parses their structure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Urn(String);

impl Urn {
    /// Creates a URN from any string-like value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the URN as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the URN is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for Urn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Urn {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Urn {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl AsRef<str> for Urn {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correlation_id_roundtrip() {
        let id = CorrelationId::new();
        let bytes = id.as_bytes();
        let restored = CorrelationId::from_bytes(*bytes);
        assert_eq!(id, restored);
    }

    #[test]
    fn correlation_id_display() {
        let id = CorrelationId::new();
        // ULID is 26 characters
        assert_eq!(id.to_string().len(), 26);
    }

    #[test]
    fn urn_display_and_conversion() {
        let urn = Urn::new("sigma:function:greet");
        assert_eq!(urn.to_string(), "sigma:function:greet");
        assert_eq!(Urn::from("sigma:function:greet"), urn);
        assert!(!urn.is_empty());
    }
}
