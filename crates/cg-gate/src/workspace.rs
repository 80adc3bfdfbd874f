//! Workspace containment and the environment the gate evaluates under.
//!
//! Path containment is lexical and component-wise. Naive string-prefix
//! comparison is bypassable (`/work` vs `/workspace-evil`, or traversal
//! segments that share a prefix), so it is never used here.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Network policy for the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkPolicy {
    /// No network access without a prompt.
    Off,
    /// Only domains on the allowlist proceed without a prompt.
    #[default]
    Allowlist,
    /// Network access does not by itself require a prompt.
    On,
}

/// The environment-level configuration the gate consumes: workspace root,
/// trust, and network policy. Produced by the config layer, read-only here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceEnv {
    pub root: PathBuf,
    /// Untrusted workspaces force a prompt for anything above tier 0.
    pub trusted: bool,
    pub network: NetworkPolicy,
    pub allowed_domains: Vec<String>,
    /// When false, even tier-0 commands go to the human unless a rule
    /// covers them.
    pub auto_approve_read_only: bool,
}

impl WorkspaceEnv {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            trusted: true,
            network: NetworkPolicy::Allowlist,
            allowed_domains: Vec::new(),
            auto_approve_read_only: true,
        }
    }

    /// True if the domain (or a parent domain) is on the allowlist.
    pub fn domain_allowed(&self, domain: &str) -> bool {
        self.allowed_domains.iter().any(|allowed| {
            domain == allowed || domain.ends_with(&format!(".{allowed}"))
        })
    }
}

/// Lexically normalize a path: fold `.` away, pop a component for each `..`.
///
/// Returns `None` when `..` would ascend above the start of the path — for
/// an absolute path that means escaping the root, for a relative path it
/// means escaping whatever it is joined to.
fn normalize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            other => out.push(other),
        }
    }
    Some(out)
}

/// Decide whether a candidate write path stays inside the workspace root.
///
/// Relative candidates are resolved against `cwd` (itself expected to be
/// inside the root). The check is purely lexical — no filesystem access —
/// so evaluation stays side-effect-free.
pub fn is_within_workspace(candidate: &str, cwd: &Path, root: &Path) -> bool {
    let candidate = Path::new(candidate);

    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        cwd.join(candidate)
    };

    let Some(normalized) = normalize(&joined) else {
        return false;
    };
    let Some(root) = normalize(root) else {
        return false;
    };

    // Component-wise prefix, not string prefix.
    normalized.starts_with(&root)
}
