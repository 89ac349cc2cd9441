// Resumable per-block search state.
//
// Oracle queries can be slow and a remote oracle can go away halfway
// through a block. Everything needed to carry on is the pair of recovered
// bytes and the forged suffix derived from them, so that pair is the
// checkpoint: hand it back to `BlockRecoverer::resume` and the search
// continues at the next padding length without repeating answered queries.

use crate::RecoveryError;

use serde::{Deserialize, Serialize};

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryState {
    /// Plaintext bytes found so far, last byte of the block first.
    pub recovered: Vec<u8>,
    /// Forged suffix that makes the next padding length's suffix decrypt to
    /// the padding value.
    pub adjustment: Vec<u8>,
}

impl RecoveryState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_pad_len(&self) -> usize {
        self.recovered.len() + 1
    }

    pub fn is_complete(&self, block_size: usize) -> bool {
        self.recovered.len() >= block_size
    }

    /// The recovered bytes in block order. Only the tail of the block is
    /// known until the state is complete.
    pub fn plaintext_block(&self) -> Vec<u8> {
        self.recovered.iter().rev().copied().collect()
    }

    pub fn to_json(&self) -> Result<String, RecoveryError> {
        serde_json::to_string(self).map_err(|e| RecoveryError::invalid_checkpoint(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, RecoveryError> {
        serde_json::from_str(json).map_err(|e| RecoveryError::invalid_checkpoint(e.to_string()))
    }

    pub(crate) fn record(&mut self, byte: u8, adjustment: Vec<u8>) {
        self.recovered.push(byte);
        self.adjustment = adjustment;
    }

    /// Checks that the state could have been produced while recovering the
    /// block that follows `prev`.
    ///
    /// The forged suffix is fully determined by the recovered bytes: with
    /// `k` bytes known, every suffix byte `x` at position `p` must satisfy
    /// `P[p] ⊕ prev[p] ⊕ x = k + 1`.
    pub fn validate(&self, prev: &[u8]) -> Result<(), RecoveryError> {
        let block_size = prev.len();
        let k = self.recovered.len();
        if k > block_size {
            return Err(RecoveryError::invalid_checkpoint(format!(
                "{k} bytes recovered from a {block_size}-byte block"
            )));
        }
        if self.adjustment.len() != k {
            return Err(RecoveryError::invalid_checkpoint(format!(
                "{} adjustment bytes for {k} recovered bytes",
                self.adjustment.len()
            )));
        }

        let target = (k + 1) as u8;
        let plaintext = self.plaintext_block();
        let prev_suffix = &prev[block_size - k..];
        let consistent = plaintext
            .iter()
            .zip(prev_suffix)
            .zip(&self.adjustment)
            .all(|((p, c), x)| p ^ c ^ x == target);
        if !consistent {
            return Err(RecoveryError::invalid_checkpoint(
                "adjustment bytes do not match the recovered bytes",
            ));
        }
        Ok(())
    }
}

/// Cooperative cancellation shared between a caller and running recoveries.
///
/// Recoverers check the flag before every oracle query. A checkpoint is only
/// updated after a confirmed hit, so a cancelled block can be resumed.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
