// The boundary between the recovery engine and whatever can tell valid
// padding from invalid padding.
//
// The engine always asks about exactly two blocks, `forged || target`. The
// forged block acts as the IV of the single-block decryption, so an oracle
// answers whether `D(target) ⊕ forged` ends in valid PKCS#7 padding.
// Oracles whose decryption context needs the real IV in front can be wrapped
// in `IvPrefixed`.

use crate::{
    cipher::{decrypt_aes_128_cbc_raw, AES_BLOCK_SIZE},
    pkcs7, OracleError,
};

use std::sync::Arc;

/// Answers whether a candidate ciphertext decrypts to validly padded data.
///
/// Implementations must not retain state that changes the answer between
/// queries. `Sync` is required so that independent blocks can be recovered
/// from several threads against the same oracle.
pub trait PaddingOracle: Sync {
    fn query(&self, candidate: &[u8]) -> Result<bool, OracleError>;
}

/// Turns any closure into an oracle.
pub struct FnOracle<F>(F);

impl<F> FnOracle<F>
where
    F: Fn(&[u8]) -> Result<bool, OracleError> + Sync,
{
    pub fn new(query: F) -> Self {
        Self(query)
    }
}

impl<F> PaddingOracle for FnOracle<F>
where
    F: Fn(&[u8]) -> Result<bool, OracleError> + Sync,
{
    fn query(&self, candidate: &[u8]) -> Result<bool, OracleError> {
        (self.0)(candidate)
    }
}

impl<O: PaddingOracle + ?Sized> PaddingOracle for &O {
    fn query(&self, candidate: &[u8]) -> Result<bool, OracleError> {
        (**self).query(candidate)
    }
}

impl<O: PaddingOracle + ?Sized + Send> PaddingOracle for Arc<O> {
    fn query(&self, candidate: &[u8]) -> Result<bool, OracleError> {
        (**self).query(candidate)
    }
}

/// An oracle backed by a local AES-128-CBC key.
///
/// The first block of every candidate is used as the IV.
#[derive(Debug, Clone)]
pub struct LocalOracle {
    key: [u8; 16],
}

impl LocalOracle {
    pub fn new(key: [u8; 16]) -> Self {
        Self { key }
    }

    pub fn padding_valid(&self, iv: &[u8; 16], ciphertext: &[u8]) -> bool {
        match decrypt_aes_128_cbc_raw(ciphertext, &self.key, iv) {
            Ok(plaintext) => pkcs7::is_valid(&plaintext, AES_BLOCK_SIZE as u8),
            Err(_) => false,
        }
    }
}

impl PaddingOracle for LocalOracle {
    fn query(&self, candidate: &[u8]) -> Result<bool, OracleError> {
        if candidate.len() < 2 * AES_BLOCK_SIZE || candidate.len() % AES_BLOCK_SIZE != 0 {
            return Err(OracleError::InvalidCandidate {
                len: candidate.len(),
            });
        }
        let (iv, ciphertext) = candidate.split_at(AES_BLOCK_SIZE);
        let iv: [u8; 16] = iv
            .try_into()
            .map_err(|_| OracleError::InvalidCandidate {
                len: candidate.len(),
            })?;
        Ok(self.padding_valid(&iv, ciphertext))
    }
}

/// Prepends a fixed IV to every candidate, for oracles that expect
/// `IV || prev || target`.
///
/// Padding validity only depends on the final block, so the answer is the
/// same as for `prev || target` with `prev` acting as the IV.
#[derive(Debug, Clone)]
pub struct IvPrefixed<O> {
    iv: Vec<u8>,
    inner: O,
}

impl<O: PaddingOracle> IvPrefixed<O> {
    pub fn new(iv: &[u8], inner: O) -> Self {
        Self {
            iv: iv.to_vec(),
            inner,
        }
    }
}

impl<O: PaddingOracle> PaddingOracle for IvPrefixed<O> {
    fn query(&self, candidate: &[u8]) -> Result<bool, OracleError> {
        let prefixed = [self.iv.as_slice(), candidate].concat();
        self.inner.query(&prefixed)
    }
}
