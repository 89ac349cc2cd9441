// PKCS#7 padding.
//
// A message is padded with k bytes of value k, where 1 <= k <= block size, so
// that its length becomes a multiple of the block size. A message whose length
// is already a multiple gets a whole block of padding.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid pkcs7 padding")]
pub struct InvalidPadding;

pub fn pad(bytes: &[u8], block_size: u8) -> Vec<u8> {
    let n_pad = block_size - (bytes.len() % block_size as usize) as u8;
    let mut out = Vec::with_capacity(bytes.len() + n_pad as usize);
    out.extend_from_slice(bytes);
    (0..n_pad).for_each(|_| out.push(n_pad));
    out
}

pub fn unpad(bytes: &mut Vec<u8>, block_size: u8) -> Result<(), InvalidPadding> {
    let n_pad = padding_len(bytes, block_size).ok_or(InvalidPadding)?;
    bytes.truncate(bytes.len() - n_pad as usize);
    Ok(())
}

/// The check a padding oracle performs on decrypted data.
pub fn is_valid(bytes: &[u8], block_size: u8) -> bool {
    padding_len(bytes, block_size).is_some()
}

fn padding_len(bytes: &[u8], block_size: u8) -> Option<u8> {
    let &n_pad = bytes.last()?;
    if n_pad == 0 || n_pad > block_size || n_pad as usize > bytes.len() {
        return None;
    }
    let padded = &bytes[(bytes.len() - n_pad as usize)..];
    padded.iter().all(|&b| b == n_pad).then_some(n_pad)
}
