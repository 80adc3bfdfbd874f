//! Interactive approval prompt and the rule side effects of each answer.
//!
//! The keystroke loop only collects a [`PromptChoice`]; turning a choice
//! into a proceed/deny outcome plus an optional new rule is a pure
//! function so it can be tested without a terminal.

use std::io::{self, Write};
use std::time::Duration;

use cg_gate::gate::GateResult;
use cg_gate::rules::{RuleAction, RuleScope};
use crossterm::event::{self, Event, KeyCode, KeyModifiers};
use crossterm::terminal;

/// One answer to an approval prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptChoice {
    /// Run this one command, remember nothing.
    ApproveOnce,
    /// Run it and allow the pattern for the rest of the session.
    ApproveForSession,
    /// Run it and persist an allow rule for the pattern.
    AlwaysAllow,
    /// Run it and persist a prompt rule so it always asks.
    AlwaysPrompt,
    /// Do not run it and persist a forbid rule for the pattern.
    AlwaysForbid,
    /// Do not run it, remember nothing.
    Deny,
}

impl PromptChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptChoice::ApproveOnce => "approve_once",
            PromptChoice::ApproveForSession => "approve_for_session",
            PromptChoice::AlwaysAllow => "always_allow",
            PromptChoice::AlwaysPrompt => "always_prompt",
            PromptChoice::AlwaysForbid => "always_forbid",
            PromptChoice::Deny => "deny",
        }
    }
}

/// What a choice means: whether the command proceeds, and the rule to
/// record, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptOutcome {
    pub proceed: bool,
    pub rule: Option<(RuleAction, RuleScope)>,
}

/// Map a choice to its outcome. The caller attaches the pattern.
pub fn choice_outcome(choice: PromptChoice) -> PromptOutcome {
    match choice {
        PromptChoice::ApproveOnce => PromptOutcome {
            proceed: true,
            rule: None,
        },
        PromptChoice::ApproveForSession => PromptOutcome {
            proceed: true,
            rule: Some((RuleAction::Allow, RuleScope::Session)),
        },
        PromptChoice::AlwaysAllow => PromptOutcome {
            proceed: true,
            rule: Some((RuleAction::Allow, RuleScope::Persistent)),
        },
        PromptChoice::AlwaysPrompt => PromptOutcome {
            proceed: true,
            rule: Some((RuleAction::Prompt, RuleScope::Persistent)),
        },
        PromptChoice::AlwaysForbid => PromptOutcome {
            proceed: false,
            rule: Some((RuleAction::Forbid, RuleScope::Persistent)),
        },
        PromptChoice::Deny => PromptOutcome {
            proceed: false,
            rule: None,
        },
    }
}

struct RawModeGuard {
    was_raw: bool,
}

impl RawModeGuard {
    fn new() -> io::Result<Self> {
        let was_raw = terminal::is_raw_mode_enabled()?;
        if !was_raw {
            terminal::enable_raw_mode()?;
        }
        Ok(Self { was_raw })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if !self.was_raw {
            let _ = terminal::disable_raw_mode();
        }
    }
}

/// Show the command, why it prompted, and the keystroke menu, then block
/// until the user answers. Ctrl-C and Esc deny.
pub fn prompt_user(command: &str, result: &GateResult) -> io::Result<PromptChoice> {
    let mut stderr = io::stderr();
    writeln!(stderr)?;
    writeln!(stderr, "  command: {command}")?;
    writeln!(stderr, "  tier:    {}", result.tier)?;
    writeln!(stderr, "  reason:  {}", result.reason)?;
    for violation in &result.violations {
        writeln!(stderr, "  note:    {}", violation.message)?;
    }
    writeln!(stderr)?;
    writeln!(
        stderr,
        "  [y] once  [s] session  [a] always allow  [p] always prompt  [f] always forbid  [n] deny"
    )?;
    write!(stderr, "  > ")?;
    stderr.flush()?;

    let _guard = RawModeGuard::new()?;
    loop {
        if !event::poll(Duration::from_millis(200))? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return finish(PromptChoice::Deny);
        }
        let choice = match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => PromptChoice::ApproveOnce,
            KeyCode::Char('s') | KeyCode::Char('S') => PromptChoice::ApproveForSession,
            KeyCode::Char('a') | KeyCode::Char('A') => PromptChoice::AlwaysAllow,
            KeyCode::Char('p') | KeyCode::Char('P') => PromptChoice::AlwaysPrompt,
            KeyCode::Char('f') | KeyCode::Char('F') => PromptChoice::AlwaysForbid,
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => PromptChoice::Deny,
            _ => continue,
        };
        return finish(choice);
    }
}

fn finish(choice: PromptChoice) -> io::Result<PromptChoice> {
    let mut stderr = io::stderr();
    writeln!(stderr, "{}", choice.as_str())?;
    Ok(choice)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approve_once_creates_no_rule() {
        let outcome = choice_outcome(PromptChoice::ApproveOnce);
        assert!(outcome.proceed);
        assert!(outcome.rule.is_none());
    }

    #[test]
    fn session_approval_is_session_scoped() {
        let outcome = choice_outcome(PromptChoice::ApproveForSession);
        assert!(outcome.proceed);
        assert_eq!(outcome.rule, Some((RuleAction::Allow, RuleScope::Session)));
    }

    #[test]
    fn always_allow_persists() {
        let outcome = choice_outcome(PromptChoice::AlwaysAllow);
        assert!(outcome.proceed);
        assert_eq!(outcome.rule, Some((RuleAction::Allow, RuleScope::Persistent)));
    }

    #[test]
    fn always_prompt_proceeds_but_pins_prompting() {
        let outcome = choice_outcome(PromptChoice::AlwaysPrompt);
        assert!(outcome.proceed);
        assert_eq!(outcome.rule, Some((RuleAction::Prompt, RuleScope::Persistent)));
    }

    #[test]
    fn always_forbid_blocks_and_persists() {
        let outcome = choice_outcome(PromptChoice::AlwaysForbid);
        assert!(!outcome.proceed);
        assert_eq!(outcome.rule, Some((RuleAction::Forbid, RuleScope::Persistent)));
    }

    #[test]
    fn deny_blocks_without_a_rule() {
        let outcome = choice_outcome(PromptChoice::Deny);
        assert!(!outcome.proceed);
        assert!(outcome.rule.is_none());
    }
}
