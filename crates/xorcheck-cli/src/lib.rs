//! xorcheck CLI library - input generation, kernel loading and report output.

pub mod inputs;
pub mod report;
pub mod source;
