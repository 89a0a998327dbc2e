//! Shared fixtures for the runtime integration tests.

#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use xorcheck_runtime::RunConfig;

/// Kernel source with the `xor` entry point the emulated driver recognizes.
pub const XOR_CL: &str = r#"
__kernel void xor(__global const uchar* a,
                  __global const uchar* b,
                  __global uchar* c,
                  const unsigned int n)
{
    const size_t gid = get_global_id(0);
    if (gid < n) {
        c[gid] = (a[gid] != 0) ^ (b[gid] != 0);
    }
}
"#;

/// Reproducible boolean inputs of length `n`.
pub fn seeded_inputs(n: usize, seed: u64) -> (Vec<u8>, Vec<u8>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let a = (0..n).map(|_| u8::from(rng.random_bool(0.5))).collect();
    let b = (0..n).map(|_| u8::from(rng.random_bool(0.5))).collect();
    (a, b)
}

/// A configuration small enough to run quickly on the emulated driver.
pub fn small_config(n: usize) -> RunConfig {
    RunConfig {
        problem_size: n,
        local_size: 128,
        dispatch_iterations: 20,
        readback_iterations: 20,
        ..RunConfig::default()
    }
}

/// Records build logs handed to the log sink.
#[derive(Debug, Default)]
pub struct LogCapture {
    pub logs: Vec<String>,
}

impl LogCapture {
    pub fn sink(&mut self) -> impl FnMut(&str) + '_ {
        move |log: &str| self.logs.push(log.to_string())
    }
}
