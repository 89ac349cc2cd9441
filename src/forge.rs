// Forged predecessor blocks.
//
// Put a block X that we control in front of a target block C and ask the
// oracle about X|C. The oracle decrypts
//
//                     P' = D(C) ⊕ X.
//
// The real plaintext is P = D(C) ⊕ C_prev, so P = P' ⊕ C_prev ⊕ X and no key is
// involved. To learn byte i = B - padLen of P we fix the bytes after i so
// that P' ends in padLen - 1 bytes of value padLen, then vary X[i] until the
// oracle accepts: at that point P'[i] = padLen and
//
//                 P[i] = padLen ⊕ C_prev[i] ⊕ X[i].
//
// Bytes before i are filler. They only need to stay fixed while X[i] varies.
use crate::RecoveryError;

/// Lays out `filler[..B - pad_len] || trial_byte || adjustment`.
pub fn build_candidate(
    filler: &[u8],
    pad_len: usize,
    trial_byte: u8,
    adjustment: &[u8],
) -> Result<Vec<u8>, RecoveryError> {
    let block_size = filler.len();
    if pad_len == 0 || pad_len > block_size {
        return Err(RecoveryError::invalid_checkpoint(format!(
            "padding length {pad_len} is outside 1..={block_size}"
        )));
    }
    if adjustment.len() != pad_len - 1 {
        return Err(RecoveryError::invalid_checkpoint(format!(
            "{} adjustment bytes given for padding length {pad_len}",
            adjustment.len()
        )));
    }

    let mut forged = Vec::with_capacity(block_size);
    forged.extend_from_slice(&filler[..block_size - pad_len]);
    forged.push(trial_byte);
    forged.extend_from_slice(adjustment);
    Ok(forged)
}

/// Re-targets the forged suffix from padding value `pad_len` to `pad_len + 1`.
pub fn next_adjustment(forged_suffix: &[u8], pad_len: usize) -> Vec<u8> {
    let shift = (pad_len as u8) ^ ((pad_len + 1) as u8);
    forged_suffix.iter().map(|b| b ^ shift).collect()
}

pub fn recovered_byte(pad_len: usize, prev_byte: u8, trial_byte: u8) -> u8 {
    pad_len as u8 ^ prev_byte ^ trial_byte
}
