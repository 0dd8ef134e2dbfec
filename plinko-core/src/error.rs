//! Error kinds for the PIR core.
//!
//! Errors never carry the target index, hint contents, or key material;
//! only public parameters (domain bounds, expected counts) appear in the
//! payloads.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PirError>;

#[derive(Debug, Error)]
pub enum PirError {
    /// An argument fell outside its declared interval, e.g. an iPRF input
    /// at or above the domain size.
    #[error("{what} outside its declared interval [0, {bound})")]
    Domain { what: &'static str, bound: u64 },

    /// No unused hint covers the requested index. The caller decides
    /// whether to regenerate backups or fall back to a non-private path.
    #[error("no unused hint covers the requested index")]
    OutOfHints,

    /// The snapshot stream ended before delivering every entry. Partial
    /// hints are discarded before this is returned.
    #[error("snapshot stream ended after {seen} of {expected} entries")]
    StreamTruncated { seen: u64, expected: u64 },

    /// The master secret has the wrong length.
    #[error("master secret must be exactly {expected} bytes, got {got}")]
    KeyDerivation { expected: usize, got: usize },

    /// A structured query failed validation. Nothing is computed for a
    /// rejected query.
    #[error("malformed structured query: {reason}")]
    QueryMalformed { reason: &'static str },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_has_no_payload_beyond_public_bounds() {
        let err = PirError::Domain {
            what: "iPRF input",
            bound: 100,
        };
        assert_eq!(
            err.to_string(),
            "iPRF input outside its declared interval [0, 100)"
        );
        assert_eq!(
            PirError::OutOfHints.to_string(),
            "no unused hint covers the requested index"
        );
    }
}
