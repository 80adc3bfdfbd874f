use std::path::PathBuf;

use cg_gate::workspace::{NetworkPolicy, WorkspaceEnv};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub workspace: WorkspaceConfig,
    pub network: NetworkConfig,
    pub rules: RulesConfig,
    pub audit: AuditConfig,
    pub approval: ApprovalConfig,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Workspace root for containment checks. Defaults to the current
    /// directory at startup.
    pub root: Option<String>,
    /// Untrusted workspaces prompt for anything that is not read-only.
    pub trusted: bool,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: None,
            trusted: true,
        }
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// "off", "allowlist", or "on".
    pub policy: NetworkPolicy,
    /// Domains that never trigger a network prompt under "allowlist".
    /// Matching includes subdomains.
    pub allowed_domains: Vec<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            policy: NetworkPolicy::Allowlist,
            allowed_domains: vec![
                "github.com".to_string(),
                "crates.io".to_string(),
                "registry.npmjs.org".to_string(),
                "pypi.org".to_string(),
            ],
        }
    }
}

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct RulesConfig {
    /// Custom rule file path. Defaults to ~/.local/share/cmdgate/rules.jsonl.
    pub path: Option<String>,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuditConfig {
    /// Enable audit logging.
    pub enabled: bool,
    /// Custom audit log path. Defaults to ~/.local/share/cmdgate/audit.jsonl.
    pub path: Option<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApprovalConfig {
    /// Auto-approve read-only commands without prompting.
    pub auto_approve_read_only: bool,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            auto_approve_read_only: true,
        }
    }
}

impl Config {
    pub fn load_or_default() -> Self {
        let path = config_path();
        match std::fs::read_to_string(&path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                eprintln!("warning: failed to parse {}: {e}", path.display());
                Config::default()
            }),
            Err(_) => Config::default(),
        }
    }

    /// Build the environment the gate evaluates under.
    pub fn workspace_env(&self) -> WorkspaceEnv {
        let root = self
            .workspace
            .root
            .clone()
            .map(PathBuf::from)
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        WorkspaceEnv {
            root,
            trusted: self.workspace.trusted,
            network: self.network.policy,
            allowed_domains: self.network.allowed_domains.clone(),
            auto_approve_read_only: self.approval.auto_approve_read_only,
        }
    }

    pub fn resolve_rules_path(&self) -> PathBuf {
        match self.rules.path {
            Some(ref custom) => PathBuf::from(custom),
            None => data_dir().join("rules.jsonl"),
        }
    }

    pub fn resolve_audit_path(&self) -> PathBuf {
        match self.audit.path {
            Some(ref custom) => PathBuf::from(custom),
            None => data_dir().join("audit.jsonl"),
        }
    }
}

fn data_dir() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".local").join("share")
        });
    base.join("cmdgate")
}

fn config_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("cmdgate").join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.workspace.root, None);
        assert!(cfg.workspace.trusted);
        assert_eq!(cfg.network.policy, NetworkPolicy::Allowlist);
        assert!(cfg.audit.enabled);
        assert!(cfg.approval.auto_approve_read_only);
    }

    #[test]
    fn parse_toml() {
        let toml_str = r#"
[workspace]
root = "/srv/project"
trusted = false

[network]
policy = "off"
allowed_domains = ["internal.example.com"]

[audit]
enabled = false
path = "/tmp/audit.jsonl"
"#;
        let cfg: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.workspace.root.as_deref(), Some("/srv/project"));
        assert!(!cfg.workspace.trusted);
        assert_eq!(cfg.network.policy, NetworkPolicy::Off);
        assert_eq!(cfg.network.allowed_domains, vec!["internal.example.com"]);
        assert!(!cfg.audit.enabled);
        assert_eq!(cfg.resolve_audit_path(), PathBuf::from("/tmp/audit.jsonl"));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: Config = toml::from_str("[workspace]\ntrusted = false\n").unwrap();
        assert!(!cfg.workspace.trusted);
        assert_eq!(cfg.network.policy, NetworkPolicy::Allowlist);
        assert!(cfg.approval.auto_approve_read_only);
    }

    #[test]
    fn workspace_env_carries_trust_and_domains() {
        let cfg: Config = toml::from_str(
            "[workspace]\nroot = \"/work\"\ntrusted = false\n[network]\nallowed_domains = [\"github.com\"]\n",
        )
        .unwrap();
        let env = cfg.workspace_env();
        assert_eq!(env.root, PathBuf::from("/work"));
        assert!(!env.trusted);
        assert!(env.domain_allowed("api.github.com"));
    }

    #[test]
    fn workspace_env_carries_auto_approval() {
        let cfg: Config =
            toml::from_str("[approval]\nauto_approve_read_only = false\n").unwrap();
        assert!(!cfg.workspace_env().auto_approve_read_only);
    }
}
