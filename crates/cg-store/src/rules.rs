//! Persisted and session-scoped rule pools.
//!
//! Persistent rules live in a JSONL file, one rule per line: read at load,
//! appended on creation, rewritten only by an explicit remove. Session
//! rules live in memory and are discarded at process end. Mutation is
//! atomic with respect to concurrent evaluations: a rule added while
//! approving command N is visible to the evaluation of command N+1.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::RwLock;

use cg_gate::rules::{Rule, RuleAction, RuleScope};

use crate::StoreError;

/// Shared rule store. Wrap in an `Arc` to share between the evaluation
/// path and the approval path.
pub struct RuleStore {
    /// `None` for a memory-only store (tests, `--no-persist`).
    path: Option<PathBuf>,
    persistent: RwLock<Vec<Rule>>,
    session: RwLock<Vec<Rule>>,
}

impl RuleStore {
    /// Load the persistent pool from the JSONL file, creating parent
    /// directories so the first append succeeds.
    pub fn load(path: PathBuf) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut rules = Vec::new();
        if path.exists() {
            let content = fs::read_to_string(&path)?;
            for (i, line) in content.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let rule: Rule = serde_json::from_str(line)
                    .map_err(|source| StoreError::Malformed { line: i + 1, source })?;
                rules.push(rule);
            }
        }

        Ok(Self {
            path: Some(path),
            persistent: RwLock::new(rules),
            session: RwLock::new(Vec::new()),
        })
    }

    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            persistent: RwLock::new(Vec::new()),
            session: RwLock::new(Vec::new()),
        }
    }

    /// Snapshot of every eligible rule: persistent then session. The gate
    /// evaluates against this frozen copy.
    pub fn snapshot(&self) -> Vec<Rule> {
        let mut all = self.persistent.read().map(|g| g.clone()).unwrap_or_default();
        if let Ok(session) = self.session.read() {
            all.extend(session.iter().cloned());
        }
        all
    }

    /// Create a rule from a user choice. Persistent rules are appended to
    /// the JSONL file before the call returns.
    pub fn add(
        &self,
        pattern: Vec<String>,
        action: RuleAction,
        description: String,
        scope: RuleScope,
    ) -> Result<Rule, StoreError> {
        let rule = Rule {
            id: self.next_id(),
            pattern,
            action,
            description,
            scope,
        };

        match scope {
            RuleScope::Session => {
                if let Ok(mut session) = self.session.write() {
                    session.push(rule.clone());
                }
            }
            RuleScope::Persistent => {
                self.append_to_file(&rule)?;
                if let Ok(mut persistent) = self.persistent.write() {
                    persistent.push(rule.clone());
                }
            }
        }

        Ok(rule)
    }

    /// Remove a rule by id from either pool. Removing a persistent rule
    /// rewrites the file — the only time the file is rewritten.
    pub fn remove(&self, id: u64) -> Result<Rule, StoreError> {
        if let Ok(mut session) = self.session.write() {
            if let Some(idx) = session.iter().position(|r| r.id == id) {
                return Ok(session.remove(idx));
            }
        }

        let removed = {
            let mut persistent = self
                .persistent
                .write()
                .map_err(|_| StoreError::UnknownRule(id))?;
            let idx = persistent
                .iter()
                .position(|r| r.id == id)
                .ok_or(StoreError::UnknownRule(id))?;
            let removed = persistent.remove(idx);
            self.rewrite_file(&persistent)?;
            removed
        };

        Ok(removed)
    }

    /// Drop all session rules (session teardown).
    pub fn clear_session(&self) {
        if let Ok(mut session) = self.session.write() {
            session.clear();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    fn next_id(&self) -> u64 {
        let max_p = self
            .persistent
            .read()
            .map(|g| g.iter().map(|r| r.id).max().unwrap_or(0))
            .unwrap_or(0);
        let max_s = self
            .session
            .read()
            .map(|g| g.iter().map(|r| r.id).max().unwrap_or(0))
            .unwrap_or(0);
        max_p.max(max_s) + 1
    }

    fn append_to_file(&self, rule: &Rule) -> Result<(), StoreError> {
        let Some(ref path) = self.path else {
            return Ok(());
        };
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let line = serde_json::to_string(rule).map_err(|source| StoreError::Malformed {
            line: 0,
            source,
        })?;
        writeln!(file, "{line}")?;
        file.flush()?;
        Ok(())
    }

    fn rewrite_file(&self, rules: &[Rule]) -> Result<(), StoreError> {
        let Some(ref path) = self.path else {
            return Ok(());
        };
        let mut out = String::new();
        for rule in rules {
            let line = serde_json::to_string(rule).map_err(|source| StoreError::Malformed {
                line: 0,
                source,
            })?;
            out.push_str(&line);
            out.push('\n');
        }
        fs::write(path, out)?;
        Ok(())
    }
}
