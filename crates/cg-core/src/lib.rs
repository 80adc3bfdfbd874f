//! Binary-side plumbing for the `cmdgate` CLI: configuration, the
//! interactive approval prompt, and command execution. The evaluation
//! pipeline itself lives in `cg-gate`; persistence in `cg-store`.

pub mod approval;
pub mod config;
pub mod executor;
