//! cg-gate: command-authorization pipeline for autonomous shell agents.
//!
//! Every command an agent proposes passes through [`Gate::evaluate`] before
//! execution: tokenize, unwrap shell wrappers, extract side effects,
//! classify risk, match user rules, fuse into one allow/prompt/deny
//! decision. The pipeline is synchronous, side-effect-free, and total —
//! adversarial input degrades to a conservative decision, never a panic.

pub mod classify;
pub mod effects;
pub mod gate;
pub mod rules;
pub mod tokenize;
pub mod workspace;
pub mod wrapper;

pub use classify::{classify, RiskTier};
pub use effects::{extract_effects, SideEffects};
pub use gate::{Decision, Gate, GateResult, Severity, Violation};
pub use rules::{Rule, RuleAction, RuleScope};
pub use tokenize::tokenize;
pub use workspace::{is_within_workspace, NetworkPolicy, WorkspaceEnv};
pub use wrapper::{detect_wrapper, WrapperAnalysis, WrapperType};
