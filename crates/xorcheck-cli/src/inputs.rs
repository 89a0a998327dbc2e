//! Host-side input generation.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Two boolean arrays of `n` elements, one byte each, `0` or `1`.
///
/// `seed` makes the arrays reproducible; `None` draws from system entropy.
pub fn generate_inputs(n: usize, seed: Option<u64>) -> (Vec<u8>, Vec<u8>) {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_seed(rand::random()),
    };

    let mut a = vec![0u8; n];
    let mut b = vec![0u8; n];
    rng.fill(&mut a[..]);
    rng.fill(&mut b[..]);
    for byte in a.iter_mut().chain(b.iter_mut()) {
        *byte &= 1;
    }
    (a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inputs_are_boolean() {
        let (a, b) = generate_inputs(4096, Some(7));
        assert_eq!(a.len(), 4096);
        assert_eq!(b.len(), 4096);
        assert!(a.iter().chain(&b).all(|&x| x <= 1));
        // Both values should show up in 4096 draws
        assert!(a.contains(&0) && a.contains(&1));
    }

    #[test]
    fn test_same_seed_same_inputs() {
        assert_eq!(generate_inputs(1000, Some(42)), generate_inputs(1000, Some(42)));
        assert_ne!(generate_inputs(1000, Some(1)).0, generate_inputs(1000, Some(2)).0);
    }

    #[test]
    fn test_empty() {
        let (a, b) = generate_inputs(0, None);
        assert!(a.is_empty() && b.is_empty());
    }
}
