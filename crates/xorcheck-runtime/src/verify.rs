//! Host-side check of the device output.

use crate::error::{Result, RuntimeError};

/// Host reference for one element: non-zero bytes are true.
pub fn xor_reference(a: u8, b: u8) -> bool {
    (a != 0) ^ (b != 0)
}

/// Checks `c[i] == a[i] XOR b[i]` for every `i`, stopping at the first mismatch.
///
/// # Errors
/// [`RuntimeError::ResultMismatch`] with the first failing index, or
/// [`RuntimeError::InvalidConfig`] if the slices differ in length.
pub fn verify_xor(a: &[u8], b: &[u8], c: &[u8]) -> Result<()> {
    if a.len() != b.len() || a.len() != c.len() {
        return Err(RuntimeError::InvalidConfig(format!(
            "cannot verify slices of lengths {}, {} and {}",
            a.len(),
            b.len(),
            c.len()
        )));
    }

    match a
        .iter()
        .zip(b)
        .zip(c)
        .position(|((&a, &b), &c)| (c != 0) != xor_reference(a, b))
    {
        Some(index) => Err(RuntimeError::ResultMismatch {
            index,
            expected: xor_reference(a[index], b[index]),
            actual: c[index],
        }),
        None => Ok(()),
    }
}
