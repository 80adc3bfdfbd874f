//! User-authored allow/forbid/prompt rules and prefix matching.
//!
//! Rules are deliberately coarse-grained: a pattern matches the leading
//! tokens of a command (typically program + subcommand), not the full
//! argument list, so a rule stays robust to argument reordering. When
//! several rules match, the most restrictive action wins.

use serde::{Deserialize, Serialize};

/// What a matching rule tells the gate to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    Allow,
    Forbid,
    Prompt,
}

impl RuleAction {
    /// Restrictiveness rank: forbid outranks prompt outranks allow.
    pub(crate) fn rank(&self) -> u8 {
        match self {
            RuleAction::Forbid => 2,
            RuleAction::Prompt => 1,
            RuleAction::Allow => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleAction::Allow => "allow",
            RuleAction::Forbid => "forbid",
            RuleAction::Prompt => "prompt",
        }
    }
}

/// Whether a rule survives process restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleScope {
    Persistent,
    Session,
}

/// A user-authored rule: token-prefix pattern plus an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: u64,
    pub pattern: Vec<String>,
    pub action: RuleAction,
    pub description: String,
    pub scope: RuleScope,
}

impl Rule {
    /// True if this rule's pattern is a prefix of the given token list.
    pub fn matches(&self, tokens: &[String]) -> bool {
        !self.pattern.is_empty()
            && self.pattern.len() <= tokens.len()
            && self.pattern.iter().zip(tokens).all(|(p, t)| p == t)
    }
}

/// Find the most restrictive rule matching the token list.
///
/// Both pools (session and persistent) are eligible with identical
/// semantics; the caller passes them concatenated in one slice.
pub fn most_restrictive_match<'a>(tokens: &[String], rules: &'a [Rule]) -> Option<&'a Rule> {
    rules
        .iter()
        .filter(|r| r.matches(tokens))
        .max_by_key(|r| r.action.rank())
}

/// Derive the default rule pattern for a command: program plus first
/// non-flag subcommand. This is what "always allow/forbid/prompt" choices
/// create.
pub fn default_pattern(tokens: &[String]) -> Vec<String> {
    let mut pattern = Vec::new();
    if let Some(first) = tokens.first() {
        pattern.push(first.clone());
        if let Some(sub) = tokens.iter().skip(1).find(|t| !t.starts_with('-')) {
            pattern.push(sub.clone());
        }
    }
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenize::tokenize;

    fn rule(id: u64, pattern: &[&str], action: RuleAction) -> Rule {
        Rule {
            id,
            pattern: pattern.iter().map(|s| s.to_string()).collect(),
            action,
            description: String::new(),
            scope: RuleScope::Persistent,
        }
    }

    // --- Matching ---

    #[test]
    fn prefix_match() {
        let r = rule(1, &["npm", "install"], RuleAction::Allow);
        assert!(r.matches(&tokenize("npm install lodash")));
        assert!(r.matches(&tokenize("npm install")));
        assert!(!r.matches(&tokenize("npm test")));
        assert!(!r.matches(&tokenize("npm")));
    }

    #[test]
    fn single_token_pattern_matches_any_args() {
        let r = rule(1, &["ls"], RuleAction::Allow);
        assert!(r.matches(&tokenize("ls -la /tmp")));
        assert!(!r.matches(&tokenize("lsof")));
    }

    #[test]
    fn empty_pattern_never_matches() {
        let r = rule(1, &[], RuleAction::Forbid);
        assert!(!r.matches(&tokenize("ls")));
        assert!(!r.matches(&[]));
    }

    // --- Restrictiveness ---

    #[test]
    fn forbid_outranks_prompt_outranks_allow() {
        let rules = vec![
            rule(1, &["git", "push"], RuleAction::Allow),
            rule(2, &["git"], RuleAction::Prompt),
            rule(3, &["git", "push"], RuleAction::Forbid),
        ];
        let m = most_restrictive_match(&tokenize("git push origin"), &rules).unwrap();
        assert_eq!(m.id, 3);

        let m = most_restrictive_match(&tokenize("git status"), &rules).unwrap();
        assert_eq!(m.action, RuleAction::Prompt);
    }

    #[test]
    fn no_match_returns_none() {
        let rules = vec![rule(1, &["npm"], RuleAction::Allow)];
        assert!(most_restrictive_match(&tokenize("cargo build"), &rules).is_none());
    }

    // --- Default pattern ---

    #[test]
    fn default_pattern_program_and_subcommand() {
        assert_eq!(
            default_pattern(&tokenize("npm install lodash")),
            vec!["npm", "install"]
        );
        assert_eq!(
            default_pattern(&tokenize("git commit -m x")),
            vec!["git", "commit"]
        );
    }

    #[test]
    fn default_pattern_skips_flags() {
        assert_eq!(
            default_pattern(&tokenize("cargo --quiet build")),
            vec!["cargo", "build"]
        );
    }

    #[test]
    fn default_pattern_bare_program() {
        assert_eq!(default_pattern(&tokenize("make -j8")), vec!["make"]);
        assert!(default_pattern(&[]).is_empty());
    }

    // --- Serde round trip (rules are persisted as JSONL) ---

    #[test]
    fn rule_serializes_stably() {
        let r = rule(7, &["npm", "install"], RuleAction::Forbid);
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains("\"forbid\""));
        let back: Rule = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }
}
