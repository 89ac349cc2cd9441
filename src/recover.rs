// Recovery of a whole ciphertext, one adjacent block pair at a time.
//
// The ciphertext is `IV || C_1 || ... || C_n`. Plaintext block `i` only
// depends on the pair `(C_i, C_{i+1})` (with `C_0` the IV), so blocks are
// recovered independently of each other, optionally on the rayon pool. A
// failing block does not stop the others: the result is either complete or
// partial, and a partial result carries a resumable checkpoint for every
// failed block.

use crate::{
    pkcs7, BlockRecoverer, Cancellation, PaddingOracle, RecoveryConfig, RecoveryError,
    RecoveryState,
};

use rayon::prelude::*;
use tracing::{debug, info, info_span, warn};

use std::collections::BTreeMap;

/// Plaintext blocks the caller already knows, keyed by plaintext block index
/// (0 is the block right after the IV). Known blocks cost no oracle queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownBlocks(BTreeMap<usize, Vec<u8>>);

impl KnownBlocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Splits a known plaintext prefix into blocks 0, 1, ... A trailing
    /// partial block is ignored.
    pub fn from_prefix(plaintext: &[u8], block_size: usize) -> Self {
        Self(
            plaintext
                .chunks_exact(block_size)
                .map(<[u8]>::to_vec)
                .enumerate()
                .collect(),
        )
    }

    pub fn insert(&mut self, index: usize, block: Vec<u8>) -> &mut Self {
        self.0.insert(index, block);
        self
    }

    pub fn get(&self, index: usize) -> Option<&[u8]> {
        self.0.get(&index).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn check(&self, block_size: usize, n_blocks: usize) -> Result<(), RecoveryError> {
        for (&index, block) in &self.0 {
            if index >= n_blocks {
                return Err(RecoveryError::malformed(format!(
                    "known block {index} is past the last of {n_blocks} blocks"
                )));
            }
            if block.len() != block_size {
                return Err(RecoveryError::malformed(format!(
                    "known block {index} is {} bytes, expected {block_size}",
                    block.len()
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockFailure {
    /// Plaintext block index.
    pub index: usize,
    pub error: RecoveryError,
    /// Where to resume this block from.
    pub checkpoint: RecoveryState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recovered {
    /// Every block was recovered. Padding is left in place.
    Complete(Vec<u8>),
    /// Some blocks failed. `blocks` has one entry per plaintext block.
    Partial {
        blocks: Vec<Option<Vec<u8>>>,
        failures: Vec<BlockFailure>,
    },
}

impl Recovered {
    pub fn is_complete(&self) -> bool {
        matches!(self, Recovered::Complete(_))
    }

    /// The full plaintext, or the first failed block as
    /// [`RecoveryError::BlockFailed`].
    pub fn into_plaintext(self) -> Result<Vec<u8>, RecoveryError> {
        match self {
            Recovered::Complete(plaintext) => Ok(plaintext),
            Recovered::Partial { blocks, failures } => {
                if let Some(failure) = failures.into_iter().min_by_key(|f| f.index) {
                    return Err(failure.into());
                }
                blocks
                    .into_iter()
                    .enumerate()
                    .map(|(index, block)| {
                        block.ok_or_else(|| {
                            RecoveryError::malformed(format!("block {index} was not recovered"))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map(|blocks| blocks.concat())
            }
        }
    }
}

impl From<BlockFailure> for RecoveryError {
    fn from(failure: BlockFailure) -> Self {
        RecoveryError::BlockFailed {
            index: failure.index,
            source: Box::new(failure.error),
        }
    }
}

/// Recovers the plaintext of `IV || C_1 || ... || C_n`.
///
/// Returns `Err` only when the input is rejected, before any oracle query.
pub fn recover<O: PaddingOracle + ?Sized>(
    ciphertext: &[u8],
    oracle: &O,
    known: &KnownBlocks,
    config: &RecoveryConfig,
) -> Result<Recovered, RecoveryError> {
    recover_with_cancellation(ciphertext, oracle, known, config, &Cancellation::new())
}

/// Like [`recover`], but stops querying once `cancellation` fires. Blocks
/// that were not finished fail with [`RecoveryError::Cancelled`].
pub fn recover_with_cancellation<O: PaddingOracle + ?Sized>(
    ciphertext: &[u8],
    oracle: &O,
    known: &KnownBlocks,
    config: &RecoveryConfig,
    cancellation: &Cancellation,
) -> Result<Recovered, RecoveryError> {
    config.validate()?;
    let block_size = config.block_size;
    if ciphertext.len() % block_size != 0 || ciphertext.len() < 2 * block_size {
        return Err(RecoveryError::malformed(format!(
            "ciphertext of {} bytes is not an IV followed by at least one {block_size}-byte block",
            ciphertext.len()
        )));
    }
    let blocks: Vec<&[u8]> = ciphertext.chunks(block_size).collect();
    let n_blocks = blocks.len() - 1;
    known.check(block_size, n_blocks)?;

    info!(
        blocks = n_blocks,
        known = known.len(),
        parallel = config.parallel,
        "recovering ciphertext"
    );

    let recover_block = |index: usize| -> Result<Vec<u8>, BlockFailure> {
        if let Some(block) = known.get(index) {
            debug!(index, "using known block");
            return Ok(block.to_vec());
        }
        let _span = info_span!("block", index).entered();
        let mut state = RecoveryState::new();
        let result = BlockRecoverer::new(oracle, config)
            .with_cancellation(cancellation.clone())
            .resume(blocks[index], blocks[index + 1], &mut state);
        match result {
            Ok(block) => Ok(block),
            Err(error) => {
                warn!(index, %error, recovered = state.recovered.len(), "block recovery failed");
                Err(BlockFailure {
                    index,
                    error,
                    checkpoint: state,
                })
            }
        }
    };

    let results: Vec<Result<Vec<u8>, BlockFailure>> = if config.parallel {
        (0..n_blocks).into_par_iter().map(recover_block).collect()
    } else {
        (0..n_blocks).map(recover_block).collect()
    };

    let mut blocks = Vec::with_capacity(n_blocks);
    let mut failures = Vec::new();
    for result in results {
        match result {
            Ok(block) => blocks.push(Some(block)),
            Err(failure) => {
                blocks.push(None);
                failures.push(failure);
            }
        }
    }

    if failures.is_empty() {
        Ok(Recovered::Complete(blocks.into_iter().flatten().flatten().collect()))
    } else {
        Ok(Recovered::Partial { blocks, failures })
    }
}

/// Recovers the plaintext and strips its PKCS#7 padding.
pub fn recover_unpadded<O: PaddingOracle + ?Sized>(
    ciphertext: &[u8],
    oracle: &O,
    known: &KnownBlocks,
    config: &RecoveryConfig,
) -> Result<Vec<u8>, RecoveryError> {
    let mut plaintext = recover(ciphertext, oracle, known, config)?.into_plaintext()?;
    pkcs7::unpad(&mut plaintext, config.block_size as u8)
        .map_err(|e| RecoveryError::malformed(format!("recovered plaintext: {e}")))?;
    Ok(plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{
        cipher::{encrypt_aes_128_cbc, random_bytes, random_bytes_with_seed},
        FnOracle, LocalOracle, OracleError, RetryPolicy,
    };

    use proptest::prelude::*;
    use rstest::rstest;

    use std::{
        collections::HashSet,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex,
        },
    };

    const B: usize = 16;

    fn encrypt(plaintext: &[u8]) -> (LocalOracle, Vec<u8>) {
        let key = random_bytes::<16>();
        let iv = random_bytes::<16>();
        let ciphertext = encrypt_aes_128_cbc(plaintext, &key, &iv);
        (LocalOracle::new(key), [iv.to_vec(), ciphertext].concat())
    }

    fn config() -> RecoveryConfig {
        RecoveryConfig::default().with_retry(RetryPolicy::none())
    }

    #[test]
    fn recovers_alphabet_from_two_target_blocks() {
        let plaintext = b"abcdefghijklmnopqrstuvwxyz";
        let (oracle, ciphertext) = encrypt(plaintext);
        let targets = Mutex::new(HashSet::new());
        let recording = FnOracle::new(|candidate: &[u8]| {
            targets.lock().unwrap().insert(candidate[B..].to_vec());
            oracle.query(candidate)
        });

        let recovered = recover(&ciphertext, &recording, &KnownBlocks::new(), &config()).unwrap();

        let mut expected = plaintext.to_vec();
        expected.extend_from_slice(&[0x06; 6]);
        assert_eq!(recovered, Recovered::Complete(expected));
        assert_eq!(targets.lock().unwrap().len(), 2);

        let unpadded =
            recover_unpadded(&ciphertext, &oracle, &KnownBlocks::new(), &config()).unwrap();
        assert_eq!(unpadded, plaintext);
    }

    #[rstest]
    #[case(0)]
    #[case(15)]
    #[case(16)]
    #[case(17)]
    #[case(47)]
    fn rejects_malformed_ciphertext_before_querying(#[case] len: usize) {
        let oracle = FnOracle::new(|_: &[u8]| -> Result<bool, OracleError> {
            panic!("no query should be made")
        });

        let result = recover(&vec![0u8; len], &oracle, &KnownBlocks::new(), &config());

        assert!(matches!(result, Err(RecoveryError::MalformedInput { .. })));
    }

    #[rstest]
    #[case(2, vec![0u8; B])]
    #[case(0, vec![0u8; B - 1])]
    fn rejects_unusable_known_blocks(#[case] index: usize, #[case] block: Vec<u8>) {
        let (oracle, ciphertext) = encrypt(b"two blocks of plaintext here");
        let mut known = KnownBlocks::new();
        known.insert(index, block);

        let result = recover(&ciphertext, &oracle, &known, &config());

        assert!(matches!(result, Err(RecoveryError::MalformedInput { .. })));
    }

    #[test]
    fn known_blocks_skip_oracle_queries() {
        let plaintext = b"YELLOW SUBMARINE is the known part";
        let (oracle, ciphertext) = encrypt(plaintext);
        let targets = Mutex::new(HashSet::new());
        let recording = FnOracle::new(|candidate: &[u8]| {
            targets.lock().unwrap().insert(candidate[B..].to_vec());
            oracle.query(candidate)
        });
        let known = KnownBlocks::from_prefix(&plaintext[..20], B);

        let recovered = recover_unpadded(&ciphertext, &recording, &known, &config()).unwrap();

        assert_eq!(known.len(), 1);
        assert_eq!(recovered, plaintext);
        let targets = targets.lock().unwrap();
        assert_eq!(targets.len(), 2);
        assert!(!targets.contains(&ciphertext[B..2 * B]));
    }

    #[test]
    fn blocks_do_not_depend_on_the_rest_of_the_ciphertext() {
        let plaintext = [b'A'; 4 * B];
        let (oracle, ciphertext) = encrypt(&plaintext);
        let mut garbled = ciphertext.clone();
        garbled[B..2 * B].copy_from_slice(&random_bytes_with_seed::<16>(5));

        let original = recover(&ciphertext, &oracle, &KnownBlocks::new(), &config())
            .unwrap()
            .into_plaintext()
            .unwrap();
        let tampered = recover(&garbled, &oracle, &KnownBlocks::new(), &config())
            .unwrap()
            .into_plaintext()
            .unwrap();

        assert_ne!(original[B..2 * B], tampered[B..2 * B]);
        assert_eq!(original[2 * B..], tampered[2 * B..]);
    }

    #[test]
    fn parallel_recovery_matches_sequential_recovery() {
        let plaintext = b"Parallel recovery of independent block pairs gives the same answer.";
        let (oracle, ciphertext) = encrypt(plaintext);

        let sequential = recover(&ciphertext, &oracle, &KnownBlocks::new(), &config()).unwrap();
        let parallel = recover(
            &ciphertext,
            &oracle,
            &KnownBlocks::new(),
            &config().with_parallel(true),
        )
        .unwrap();

        assert!(sequential.is_complete());
        assert_eq!(sequential, parallel);
    }

    #[rstest]
    #[case(false)]
    #[case(true)]
    fn failing_block_is_reported_with_the_others_recovered(#[case] parallel: bool) {
        let plaintext = [b'z'; 3 * B];
        let (oracle, ciphertext) = encrypt(&plaintext);
        let broken_target = ciphertext[2 * B..3 * B].to_vec();
        let flaky = FnOracle::new(|candidate: &[u8]| {
            if candidate[B..] == broken_target[..] {
                return Err(OracleError::Transport("connection refused".to_string()));
            }
            oracle.query(candidate)
        });

        let recovered = recover(
            &ciphertext,
            &flaky,
            &KnownBlocks::new(),
            &config().with_parallel(parallel),
        )
        .unwrap();

        let Recovered::Partial { blocks, failures } = recovered else {
            panic!("expected a partial recovery");
        };
        assert_eq!(blocks.len(), 4);
        assert_eq!(blocks[0].as_deref(), Some(&plaintext[..B]));
        assert_eq!(blocks[1], None);
        assert_eq!(blocks[3].as_deref(), Some(&[0x10u8; B][..]));
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].index, 1);
        assert_eq!(failures[0].checkpoint, RecoveryState::new());
        assert!(matches!(
            failures[0].error,
            RecoveryError::OracleTransientFailure { attempts: 1, .. }
        ));
    }

    #[test]
    fn failed_block_resumes_from_its_checkpoint() {
        let plaintext = b"resume me from where I stopped";
        let (oracle, ciphertext) = encrypt(plaintext);
        // Runs out partway through the first block.
        let budget = AtomicUsize::new(1500);
        let rationed = FnOracle::new(|candidate: &[u8]| {
            if budget.fetch_sub(1, Ordering::SeqCst) == 0 {
                budget.store(0, Ordering::SeqCst);
                return Err(OracleError::Transport("quota exceeded".to_string()));
            }
            oracle.query(candidate)
        });

        let recovered = recover(&ciphertext, &rationed, &KnownBlocks::new(), &config()).unwrap();
        let Recovered::Partial { blocks, failures } = recovered else {
            panic!("expected a partial recovery");
        };
        let mut known = KnownBlocks::new();
        for (index, block) in blocks.into_iter().enumerate() {
            if let Some(block) = block {
                known.insert(index, block);
            }
        }
        for mut failure in failures {
            let index = failure.index;
            let block = BlockRecoverer::new(&oracle, &config())
                .resume(
                    &ciphertext[index * B..(index + 1) * B],
                    &ciphertext[(index + 1) * B..(index + 2) * B],
                    &mut failure.checkpoint,
                )
                .unwrap();
            known.insert(index, block);
        }

        let resumed = recover_unpadded(&ciphertext, &oracle, &known, &config()).unwrap();

        assert_eq!(resumed, plaintext);
    }

    #[test]
    fn unpadded_recovery_names_the_failing_block() {
        let (oracle, ciphertext) = encrypt(&[b'q'; 2 * B]);
        let broken_target = ciphertext[3 * B..].to_vec();
        let flaky = FnOracle::new(|candidate: &[u8]| {
            if candidate[B..] == broken_target[..] {
                return Ok(false);
            }
            oracle.query(candidate)
        });

        let result = recover_unpadded(&ciphertext, &flaky, &KnownBlocks::new(), &config());

        assert_eq!(
            result,
            Err(RecoveryError::BlockFailed {
                index: 2,
                source: Box::new(RecoveryError::OracleInconsistency { pad_len: 1 }),
            })
        );
    }

    #[rstest]
    #[case(vec![Some(vec![1u8; B]), Some(vec![2u8; B])], Ok([[1u8; B], [2u8; B]].concat()))]
    #[case(
        vec![Some(vec![1u8; B]), None],
        Err(RecoveryError::malformed("block 1 was not recovered"))
    )]
    fn partial_result_without_failures_converts_to_plaintext(
        #[case] blocks: Vec<Option<Vec<u8>>>,
        #[case] expected: Result<Vec<u8>, RecoveryError>,
    ) {
        let recovered = Recovered::Partial {
            blocks,
            failures: Vec::new(),
        };

        assert_eq!(recovered.into_plaintext(), expected);
    }

    #[test]
    fn cancelled_recovery_fails_every_unfinished_block() {
        let (oracle, ciphertext) = encrypt(b"never going to be recovered, sorry");
        let cancellation = Cancellation::new();
        cancellation.cancel();
        let mut known = KnownBlocks::new();
        known.insert(1, vec![b'?'; B]);

        let recovered =
            recover_with_cancellation(&ciphertext, &oracle, &known, &config(), &cancellation)
                .unwrap();

        let Recovered::Partial { blocks, failures } = recovered else {
            panic!("expected a partial recovery");
        };
        assert_eq!(blocks[1].as_deref(), Some(&[b'?'; B][..]));
        let failed: Vec<usize> = failures.iter().map(|f| f.index).collect();
        assert_eq!(failed, [0, 2]);
        assert!(failures.iter().all(|f| f.error == RecoveryError::Cancelled));
    }

    #[rstest]
    #[case(vec![0u8; 3 * B])]
    #[case(vec![0xFFu8; 3 * B])]
    #[case(vec![0x01u8; B - 1])]
    #[case(Vec::new())]
    fn recovers_edge_case_plaintexts(#[case] plaintext: Vec<u8>) {
        let (oracle, ciphertext) = encrypt(&plaintext);

        let recovered =
            recover_unpadded(&ciphertext, &oracle, &KnownBlocks::new(), &config()).unwrap();

        assert_eq!(recovered, plaintext);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn recovers_any_plaintext(plaintext in prop::collection::vec(any::<u8>(), 0..10 * B)) {
            let (oracle, ciphertext) = encrypt(&plaintext);

            let recovered = recover_unpadded(
                &ciphertext,
                &oracle,
                &KnownBlocks::new(),
                &config().with_parallel(true),
            )
            .unwrap();

            prop_assert_eq!(recovered, plaintext);
        }
    }
}
