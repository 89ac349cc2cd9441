// Error types for padding-oracle recovery.
//
// `OracleError` is what an oracle implementation reports when it cannot
// answer a query. `RecoveryError` is what the recovery engine reports to its
// callers; it distinguishes rejected input from oracle misbehaviour so callers
// can decide between fixing the input, retrying, or resuming from a
// checkpoint.

use thiserror::Error;

/// A query the oracle could not answer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    /// The query never completed (timeout, connection refused, ...).
    #[error("oracle transport failed: {0}")]
    Transport(String),

    /// The oracle answered with something that is neither "valid" nor
    /// "invalid" padding.
    #[error("unexpected oracle response: status {status}")]
    UnexpectedResponse {
        /// Status code returned by the oracle.
        status: u16,
    },

    /// The oracle refused the candidate itself, so repeating it cannot help.
    #[error("oracle rejected a candidate of {len} bytes")]
    InvalidCandidate {
        /// Length of the rejected candidate.
        len: usize,
    },
}

impl OracleError {
    /// Whether repeating the same query may succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, OracleError::InvalidCandidate { .. })
    }
}

/// Failure to recover plaintext from a ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecoveryError {
    /// The input was rejected before any oracle query was made.
    #[error("malformed input: {reason}")]
    MalformedInput {
        /// What was wrong with the input.
        reason: String,
    },

    /// No trial byte produced valid padding at this padding length.
    #[error("oracle inconsistency: no trial byte gave valid padding at padding length {pad_len}")]
    OracleInconsistency {
        /// Padding length being searched when the trial space ran out.
        pad_len: usize,
    },

    /// Every trial byte that satisfied the oracle at padding length 1 failed
    /// verification, so the genuine `0x01` padding could not be told apart
    /// from an accidental longer padding.
    #[error("ambiguous padding: candidates {candidates:?} all failed verification")]
    AmbiguousPadding {
        /// Trial bytes that produced valid padding but failed verification.
        candidates: Vec<u8>,
    },

    /// A query kept failing after the retry policy was exhausted.
    #[error("oracle failed after {attempts} attempts")]
    OracleTransientFailure {
        /// Number of attempts made for the failing query.
        attempts: u32,
        /// Error from the final attempt.
        #[source]
        source: OracleError,
    },

    /// A checkpoint handed back to the recoverer does not describe a state
    /// the recoverer could have produced.
    #[error("invalid checkpoint: {reason}")]
    InvalidCheckpoint {
        /// Why the checkpoint was rejected.
        reason: String,
    },

    /// A block of a multi-block recovery failed.
    #[error("recovery of block {index} failed")]
    BlockFailed {
        /// Plaintext block index.
        index: usize,
        #[source]
        source: Box<RecoveryError>,
    },

    /// Recovery was cancelled between two oracle queries.
    #[error("recovery cancelled")]
    Cancelled,
}

impl RecoveryError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        RecoveryError::MalformedInput {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_checkpoint(reason: impl Into<String>) -> Self {
        RecoveryError::InvalidCheckpoint {
            reason: reason.into(),
        }
    }
}
