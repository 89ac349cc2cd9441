// AES-128 in CBC mode.
//
// Only used to build oracles and test fixtures: the recovery engine never
// touches the key. Chaining is done by hand around the raw block cipher:
//
//                  C_i = E(P_i ⊕ C_{i-1}),    P_i = D(C_i) ⊕ C_{i-1},
//
// with C_0 being the IV.
use crate::pkcs7;

use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128, Block};
use rand::{rngs::StdRng, Rng, SeedableRng};
use thiserror::Error;

pub const AES_BLOCK_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("ciphertext length {0} is not a multiple of the block size")]
pub struct BlockLengthError(pub usize);

/// Pads `plaintext` with PKCS#7 and encrypts it. The IV is not included in
/// the output.
pub fn encrypt_aes_128_cbc(plaintext: &[u8], key: &[u8; 16], iv: &[u8; 16]) -> Vec<u8> {
    let cipher = Aes128::new(key.into());
    let padded = pkcs7::pad(plaintext, AES_BLOCK_SIZE as u8);
    let mut ciphertext = Vec::with_capacity(padded.len());

    let mut last_block = *iv;
    for plaintext_block in padded.chunks(AES_BLOCK_SIZE) {
        let mut block = Block::clone_from_slice(plaintext_block);
        block
            .iter_mut()
            .zip(last_block)
            .for_each(|(b, prev)| *b ^= prev);
        cipher.encrypt_block(&mut block);
        last_block.copy_from_slice(&block);
        ciphertext.extend_from_slice(&block);
    }
    ciphertext
}

/// Decrypts without touching the padding.
pub fn decrypt_aes_128_cbc_raw(
    ciphertext: &[u8],
    key: &[u8; 16],
    iv: &[u8; 16],
) -> Result<Vec<u8>, BlockLengthError> {
    if ciphertext.len() % AES_BLOCK_SIZE != 0 {
        return Err(BlockLengthError(ciphertext.len()));
    }
    let cipher = Aes128::new(key.into());
    let mut plaintext = Vec::with_capacity(ciphertext.len());

    let mut last_block = *iv;
    for ciphertext_block in ciphertext.chunks(AES_BLOCK_SIZE) {
        let mut block = Block::clone_from_slice(ciphertext_block);
        cipher.decrypt_block(&mut block);
        plaintext.extend(block.iter().zip(last_block).map(|(b, prev)| b ^ prev));
        last_block.copy_from_slice(ciphertext_block);
    }
    Ok(plaintext)
}

pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::thread_rng().fill(&mut bytes[..]);
    bytes
}

pub fn random_bytes_with_seed<const N: usize>(seed: u64) -> [u8; N] {
    let mut bytes = [0u8; N];
    StdRng::seed_from_u64(seed).fill(&mut bytes[..]);
    bytes
}
