//! Risk classification for parsed commands.
//!
//! Assigns one of four ordered tiers: read-only, workspace-write,
//! system/package operation, dangerous. Hard-deny patterns win over
//! everything; shell wrappers are unwrapped and their sub-commands
//! classified recursively with the maximum tier taken; anything unrecognized
//! defaults to the system tier. Unknown is never safe.

use crate::effects::extract_effects;
use crate::tokenize::{program_basename, split_segments, tokenize};
use crate::wrapper::detect_wrapper;

/// Maximum wrapper-in-wrapper nesting before classification gives up and
/// returns the dangerous tier.
pub const MAX_WRAPPER_DEPTH: usize = 4;

/// Risk tier for a command, ordered from least to most restrictive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RiskTier {
    ReadOnly,
    WorkspaceWrite,
    System,
    Dangerous,
}

impl RiskTier {
    /// Human-readable label for the approval prompt.
    pub fn label(&self) -> &'static str {
        match self {
            RiskTier::ReadOnly => "read-only",
            RiskTier::WorkspaceWrite => "workspace-write",
            RiskTier::System => "system",
            RiskTier::Dangerous => "DANGEROUS",
        }
    }

    /// Machine-readable string for audit records.
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::ReadOnly => "read_only",
            RiskTier::WorkspaceWrite => "workspace_write",
            RiskTier::System => "system",
            RiskTier::Dangerous => "dangerous",
        }
    }
}

/// A hard-deny finding. Non-negotiable: the gate denies regardless of rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardDeny {
    pub category: &'static str,
    pub message: String,
}

/// Static hard-deny patterns, substring-matched against the lowercased
/// command. Kept as a flat table so the list can be audited and tested in
/// isolation from the fusion logic.
const DENY_PATTERNS: &[(&str, &str, &str)] = &[
    // (needle, category, message)
    ("rm -rf /", "fs_destruction", "recursive deletion of the filesystem root"),
    ("rm -rf /*", "fs_destruction", "recursive deletion of the filesystem root"),
    ("rm -rf ~", "fs_destruction", "recursive deletion of the home directory"),
    ("rm -rf .", "fs_destruction", "recursive deletion of the working tree"),
    ("rm -fr /", "fs_destruction", "recursive deletion of the filesystem root"),
    ("mkfs", "fs_destruction", "filesystem formatting"),
    ("wipefs", "fs_destruction", "filesystem signature wiping"),
    ("> /dev/sda", "device_write", "raw write to a block device"),
    ("chmod -r 777 /", "fs_destruction", "recursive permission change on /"),
    ("chmod 000 /", "fs_destruction", "permission lockout on /"),
    // Remote code execution
    ("eval \"$(curl", "remote_exec", "evaluating a downloaded script"),
    ("eval \"$(wget", "remote_exec", "evaluating a downloaded script"),
    ("eval $(curl", "remote_exec", "evaluating a downloaded script"),
    ("eval $(wget", "remote_exec", "evaluating a downloaded script"),
    ("source <(curl", "remote_exec", "sourcing a downloaded script"),
    ("source <(wget", "remote_exec", "sourcing a downloaded script"),
    // Reverse shells
    ("/dev/tcp/", "reverse_shell", "bash network redirection"),
    ("/dev/udp/", "reverse_shell", "bash network redirection"),
    ("nc -e", "reverse_shell", "netcat with command execution"),
    ("ncat -e", "reverse_shell", "netcat with command execution"),
    ("nc -c", "reverse_shell", "netcat with command execution"),
    ("socat exec:", "reverse_shell", "socat command bridge"),
    // Data exfiltration
    ("curl --upload-file", "exfiltration", "file upload to a remote host"),
    ("curl -t ", "exfiltration", "file upload to a remote host"),
    ("wget --post-file", "exfiltration", "file upload to a remote host"),
    // Credential theft
    ("cat ~/.ssh/", "credential_access", "reading SSH private keys"),
    ("cat $home/.ssh/", "credential_access", "reading SSH private keys"),
    ("cat ~/.aws/", "credential_access", "reading AWS credentials"),
    ("cat $home/.aws/", "credential_access", "reading AWS credentials"),
    ("cat ~/.gnupg/", "credential_access", "reading GPG keys"),
    ("cp ~/.ssh", "credential_access", "copying SSH keys"),
    ("cp -r ~/.ssh", "credential_access", "copying SSH keys"),
    ("cat /etc/shadow", "credential_access", "reading the shadow password file"),
    // History / evidence tampering
    ("history -c", "evidence_tampering", "clearing shell history"),
    ("shred ~/.bash_history", "evidence_tampering", "destroying shell history"),
    ("> ~/.bash_history", "evidence_tampering", "truncating shell history"),
    ("> ~/.zsh_history", "evidence_tampering", "truncating shell history"),
    ("unset histfile", "evidence_tampering", "disabling shell history"),
    // System files
    ("> /etc/passwd", "system_file", "truncating /etc/passwd"),
    ("> /etc/shadow", "system_file", "truncating /etc/shadow"),
    ("> /etc/hosts", "system_file", "truncating /etc/hosts"),
    // Persistence / fork bombs
    ("crontab -r", "persistence", "deleting all cron jobs"),
    (":(){ :|:& };:", "fork_bomb", "fork bomb"),
];

const PRIVILEGE_ESCALATION: &[&str] = &["sudo", "su", "doas", "pkexec", "gksudo", "kdesudo"];

const DOWNLOADERS: &[&str] = &["curl", "wget", "http", "fetch"];
const SHELL_INTERPRETERS: &[&str] = &["sh", "bash", "zsh", "dash", "ksh", "fish", "python", "python3", "perl", "ruby", "node"];

const SENSITIVE_DIRS: &[&str] = &["~/.ssh", "~/.aws", "~/.gnupg", "$home/.ssh", "$home/.aws", "$home/.gnupg"];

/// Check a raw command against the hard-deny patterns and structural checks.
///
/// Order is fixed: the static table first, then the checks that need more
/// than a substring (device writes, download-into-shell, fork-bomb
/// variants, sensitive-directory archiving).
pub fn hard_deny(raw: &str) -> Option<HardDeny> {
    let lower = raw.trim().to_lowercase();
    if lower.is_empty() {
        return None;
    }

    for (needle, category, message) in DENY_PATTERNS {
        if lower.contains(needle) {
            return Some(HardDeny {
                category,
                message: (*message).to_string(),
            });
        }
    }

    // Privilege escalation by program name.
    let tokens = tokenize(&lower);
    let stripped = strip_command_prefixes(&tokens);
    if let Some(first) = stripped.first() {
        if PRIVILEGE_ESCALATION.contains(&program_basename(first)) {
            return Some(HardDeny {
                category: "privilege_escalation",
                message: format!("privilege escalation via {}", program_basename(first)),
            });
        }
        if program_basename(first).starts_with("mkfs") {
            return Some(HardDeny {
                category: "fs_destruction",
                message: "filesystem formatting".to_string(),
            });
        }
    }

    // dd writing to a block device.
    if stripped.first().map(|t| program_basename(t)) == Some("dd")
        && stripped.iter().any(|t| t.starts_with("of=/dev/"))
    {
        return Some(HardDeny {
            category: "device_write",
            message: "dd writing to a raw device".to_string(),
        });
    }

    // Download piped into a shell interpreter.
    if download_piped_to_shell(&lower) {
        return Some(HardDeny {
            category: "remote_exec",
            message: "network download piped into a shell interpreter".to_string(),
        });
    }

    // Fork bomb variants beyond the canonical form.
    if lower.contains(":|:") && lower.contains("};") {
        return Some(HardDeny {
            category: "fork_bomb",
            message: "fork bomb".to_string(),
        });
    }

    // Encoding or archiving sensitive credential directories.
    if lower.contains("base64") && SENSITIVE_DIRS.iter().any(|d| lower.contains(d)) {
        return Some(HardDeny {
            category: "exfiltration",
            message: "encoding credential files".to_string(),
        });
    }
    if (lower.starts_with("tar ") || lower.starts_with("zip ") || lower.starts_with("rsync "))
        && SENSITIVE_DIRS.iter().any(|d| lower.contains(d))
    {
        return Some(HardDeny {
            category: "credential_access",
            message: "archiving credential directories".to_string(),
        });
    }

    // POSTing local files with curl/wget.
    if (lower.contains("curl") || lower.contains("wget"))
        && (lower.contains("-d @") || lower.contains("--data @") || lower.contains("--data-binary @"))
    {
        return Some(HardDeny {
            category: "exfiltration",
            message: "posting local file contents to a remote host".to_string(),
        });
    }

    None
}

/// A downloader segment immediately piped into a shell interpreter.
fn download_piped_to_shell(lower: &str) -> bool {
    let segments = split_segments(lower);
    for window in segments.windows(2) {
        let left = tokenize(window[0]);
        let right = tokenize(window[1]);
        let left_prog = strip_command_prefixes(&left)
            .first()
            .map(|t| program_basename(t).to_string());
        let right_prog = strip_command_prefixes(&right)
            .first()
            .map(|t| program_basename(t).to_string());
        if let (Some(l), Some(r)) = (left_prog, right_prog) {
            if DOWNLOADERS.contains(&l.as_str()) && SHELL_INTERPRETERS.contains(&r.as_str()) {
                return true;
            }
        }
    }
    false
}

/// Skip benign prefix wrappers (`env`, `nice`, `time`, ...) plus any
/// `VAR=VALUE` assignments, returning the slice from the real program on.
pub fn strip_command_prefixes(tokens: &[String]) -> &[String] {
    const SKIP: &[&str] = &["env", "nice", "time", "command", "builtin", "nohup"];
    let mut start = 0;
    while start < tokens.len() {
        let tok = &tokens[start];
        if tok.contains('=') && !tok.starts_with('-') && !tok.starts_with('=') {
            start += 1;
            continue;
        }
        if SKIP.contains(&program_basename(tok)) {
            start += 1;
            continue;
        }
        break;
    }
    &tokens[start..]
}

// --- Tier tables ---

const READ_ONLY_PROGRAMS: &[&str] = &[
    "ls", "dir", "tree", "exa", "eza", "lsd", "cat", "bat", "less", "more", "head", "tail", "wc",
    "file", "stat", "du", "df", "find", "locate", "which", "whereis", "type", "hash", "grep",
    "rg", "ag", "ack", "fgrep", "egrep", "diff", "cmp", "comm", "sort", "uniq", "cut", "tr",
    "awk", "sed", "jq", "yq", "echo", "printf", "date", "cal", "uptime", "uname", "hostname",
    "whoami", "id", "groups", "printenv", "pwd", "realpath", "basename", "dirname", "md5sum",
    "sha256sum", "shasum", "xxd", "od", "hexdump", "strings", "readlink", "test", "true",
    "false", "man", "info", "help", "ps", "cd",
];

const WRITE_PROGRAMS: &[&str] = &[
    "mkdir", "touch", "cp", "mv", "ln", "rename", "tee", "patch", "truncate",
];

const SYSTEM_PROGRAMS: &[&str] = &[
    // Package managers
    "npm", "npx", "yarn", "pnpm", "bun", "pip", "pip3", "cargo", "gem", "go", "apt", "apt-get",
    "dnf", "yum", "pacman", "brew", "apk",
    // Compilers and build tools
    "make", "cmake", "ninja", "meson", "gcc", "g++", "cc", "c++", "clang", "clang++", "rustc",
    "javac", "tsc",
    // Containers
    "docker", "podman", "kubectl",
    // Permission-changing utilities
    "chmod", "chown", "chgrp",
    // Irreversible deletion
    "rm", "rmdir", "shred", "unlink",
    // Network tools
    "curl", "wget", "ssh", "scp", "sftp", "rsync", "nc", "ncat", "telnet", "ftp", "ping", "dig",
    "nslookup",
    // Service/system control
    "systemctl", "service", "mount", "umount", "install",
];

const GIT_READ_SUBCOMMANDS: &[&str] = &[
    "status", "log", "diff", "show", "blame", "shortlog", "describe", "rev-parse", "ls-files",
];

const GIT_WRITE_SUBCOMMANDS: &[&str] = &[
    "add", "commit", "merge", "rebase", "cherry-pick", "stash", "checkout", "switch", "branch",
    "tag", "init", "am", "apply", "restore", "mv", "rm",
];

/// Classify a raw command string, unwrapping shell wrappers recursively.
pub fn classify(raw: &str) -> RiskTier {
    classify_depth(raw, MAX_WRAPPER_DEPTH)
}

fn classify_depth(raw: &str, depth: usize) -> RiskTier {
    // Pathological nesting: fail closed.
    if depth == 0 {
        return RiskTier::Dangerous;
    }

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return RiskTier::ReadOnly;
    }

    if hard_deny(trimmed).is_some() {
        return RiskTier::Dangerous;
    }

    let tokens = tokenize(trimmed);
    let stripped = strip_command_prefixes(&tokens);

    if let Some(analysis) = detect_wrapper(stripped) {
        if analysis.is_complex {
            return RiskTier::Dangerous;
        }
        return analysis
            .sub_commands
            .iter()
            .map(|sub| classify_depth(sub, depth - 1))
            .max()
            .unwrap_or(RiskTier::Dangerous);
    }

    // Compound command at this level: every segment counts, max wins.
    let segments = split_segments(trimmed);
    if segments.len() > 1 {
        return segments
            .iter()
            .map(|seg| classify_depth(seg, depth - 1))
            .max()
            .unwrap_or(RiskTier::ReadOnly);
    }

    classify_single(stripped, trimmed)
}

/// Table lookup for a single, unwrapped, un-chained command.
fn classify_single(tokens: &[String], raw: &str) -> RiskTier {
    let Some(first) = tokens.first() else {
        return RiskTier::ReadOnly;
    };
    let program = program_basename(first);

    if program == "git" {
        return classify_git(tokens);
    }

    if SYSTEM_PROGRAMS.contains(&program) {
        return RiskTier::System;
    }

    if READ_ONLY_PROGRAMS.contains(&program) {
        // Mutating flag exceptions to the read-only table.
        if program == "find"
            && tokens
                .iter()
                .any(|a| a == "-exec" || a == "-execdir" || a == "-delete")
        {
            return RiskTier::System;
        }
        if program == "sed" && tokens.iter().any(|a| a == "-i" || a.starts_with("-i.")) {
            return RiskTier::WorkspaceWrite;
        }
        // A read-only program with an output redirect writes a file.
        let effects = extract_effects(tokens, raw);
        if effects.has_writes() {
            return RiskTier::WorkspaceWrite;
        }
        return RiskTier::ReadOnly;
    }

    if WRITE_PROGRAMS.contains(&program) {
        return RiskTier::WorkspaceWrite;
    }

    // Unknown is moderately risky, never safe.
    RiskTier::System
}

fn classify_git(tokens: &[String]) -> RiskTier {
    let sub = tokens
        .iter()
        .skip(1)
        .find(|t| !t.starts_with('-'))
        .map(|s| s.as_str());

    // `git -c x=y ...` is caught separately as a dangerous flag; the tier
    // here follows the subcommand.
    match sub {
        Some(s) if GIT_READ_SUBCOMMANDS.contains(&s) => {
            if tokens.iter().any(|t| t == "--force" || t == "-f") {
                RiskTier::System
            } else {
                RiskTier::ReadOnly
            }
        }
        Some(s) if GIT_WRITE_SUBCOMMANDS.contains(&s) => {
            if tokens.iter().any(|t| t == "--force" || t == "-f") {
                RiskTier::System
            } else {
                RiskTier::WorkspaceWrite
            }
        }
        // Network operations and destructive subcommands (push, pull,
        // fetch, clone, remote, reset, clean) plus anything unrecognized.
        _ => RiskTier::System,
    }
}

/// Known-dangerous flag combinations that deserve a human look even when the
/// base command is otherwise routine. Returned as messages for the gate to
/// surface as promptable violations.
pub fn dangerous_flags(raw: &str) -> Vec<String> {
    let mut findings = Vec::new();

    for seg in split_segments(raw) {
        let tokens = tokenize(seg.trim());
        let stripped = strip_command_prefixes(&tokens);
        let Some(first) = stripped.first() else {
            continue;
        };
        let program = program_basename(first);

        for arg in &stripped[1..] {
            let a = arg.as_str();
            match program {
                "git" => {
                    if a == "-c" {
                        findings.push("git -c can override security settings".to_string());
                    }
                }
                "tar" => {
                    if a == "--checkpoint-action" || a.starts_with("--checkpoint-action=") {
                        findings.push(
                            "tar --checkpoint-action can execute arbitrary commands".to_string(),
                        );
                    }
                }
                "curl" => {
                    if a == "-F" || a == "--form" {
                        findings.push("curl -F/--form can exfiltrate files".to_string());
                    }
                }
                "find" => {
                    if a == "-exec" || a == "-execdir" || a == "-delete" {
                        findings.push(format!(
                            "find {a} can execute arbitrary commands or delete files"
                        ));
                    }
                }
                "rsync" => {
                    if a == "-e" || a == "--rsh" {
                        findings.push("rsync -e/--rsh can execute arbitrary commands".to_string());
                    }
                }
                _ => {}
            }
        }

        if program == "xargs" {
            findings.push("xargs executes arbitrary commands".to_string());
        }
    }

    findings
}
