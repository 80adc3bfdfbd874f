//! Shell-wrapper detection and embedded-script extraction.
//!
//! A wrapper is a command whose sole purpose is to hand a script to another
//! interpreter: `bash -c '...'`, `cmd /c ...`, `powershell -Command ...`.
//! The gate cannot statically reason about arbitrary shell semantics, so any
//! script it cannot safely decompose is marked complex and treated as
//! maximally risky by the classifier. Fail closed, never fail open.

use base64::Engine;

use crate::tokenize::program_basename;

/// Maximum number of sub-commands a script may split into before the whole
/// script is declared complex.
pub const MAX_SUBCOMMANDS: usize = 8;

/// Which interpreter family a wrapper hands its script to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapperType {
    Posix,
    WindowsCmd,
    PowerShell,
}

impl WrapperType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WrapperType::Posix => "posix_shell",
            WrapperType::WindowsCmd => "cmd",
            WrapperType::PowerShell => "powershell",
        }
    }
}

/// Result of wrapper analysis on a token list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapperAnalysis {
    pub wrapper_type: WrapperType,
    /// The embedded script, when one could be extracted.
    pub embedded_script: Option<String>,
    /// Sub-commands the script splits into. Empty when complex.
    pub sub_commands: Vec<String>,
    /// Complex scripts cannot be safely decomposed.
    pub is_complex: bool,
}

const POSIX_SHELLS: &[&str] = &["sh", "bash", "zsh", "dash", "ksh", "fish"];
const POWERSHELLS: &[&str] = &["powershell", "powershell.exe", "pwsh", "pwsh.exe"];

const CONTROL_KEYWORDS: &[&str] = &[
    "if", "then", "else", "elif", "fi", "while", "until", "for", "do", "done", "case", "esac",
    "function", "select",
];

/// Detect whether a token list is a shell-wrapper invocation.
///
/// Returns `None` for ordinary commands. For wrappers, extracts the embedded
/// script using the interpreter's flag conventions and classifies it as
/// complex or splittable. An interactive invocation (no script flag) is
/// always complex.
pub fn detect_wrapper(tokens: &[String]) -> Option<WrapperAnalysis> {
    let first = tokens.first()?;
    let program = program_basename(first);

    if POSIX_SHELLS.contains(&program) {
        return Some(analyze_posix(tokens));
    }
    if program.eq_ignore_ascii_case("cmd") || program.eq_ignore_ascii_case("cmd.exe") {
        return Some(analyze_cmd(tokens));
    }
    if POWERSHELLS.iter().any(|p| program.eq_ignore_ascii_case(p)) {
        return Some(analyze_powershell(tokens));
    }

    None
}

fn analyze_posix(tokens: &[String]) -> WrapperAnalysis {
    // Accept `-c` standalone or folded into a short-flag cluster (`-lc`).
    let script_idx = tokens.iter().enumerate().skip(1).find_map(|(i, t)| {
        let is_c_flag = t == "-c"
            || (t.starts_with('-')
                && !t.starts_with("--")
                && t.len() > 1
                && t[1..].chars().all(|c| c.is_ascii_alphabetic())
                && t.contains('c'));
        if is_c_flag {
            Some(i + 1)
        } else {
            None
        }
    });

    match script_idx.and_then(|i| tokens.get(i)) {
        Some(script) => from_script(WrapperType::Posix, script.clone()),
        // No -c flag: interactive shell or a script file — not decomposable.
        None => complex(WrapperType::Posix, None),
    }
}

fn analyze_cmd(tokens: &[String]) -> WrapperAnalysis {
    let mut flag = None;
    for (i, t) in tokens.iter().enumerate().skip(1) {
        if t.eq_ignore_ascii_case("/c") || t.eq_ignore_ascii_case("/k") {
            flag = Some((i, t.eq_ignore_ascii_case("/k")));
            break;
        }
    }

    match flag {
        Some((i, keeps_shell)) => {
            let script = tokens[i + 1..].join(" ");
            if script.is_empty() {
                return complex(WrapperType::WindowsCmd, None);
            }
            if keeps_shell {
                // /k leaves the interpreter resident after the script.
                return complex(WrapperType::WindowsCmd, Some(script));
            }
            from_script(WrapperType::WindowsCmd, script)
        }
        None => complex(WrapperType::WindowsCmd, None),
    }
}

fn analyze_powershell(tokens: &[String]) -> WrapperAnalysis {
    for (i, t) in tokens.iter().enumerate().skip(1) {
        let lower = t.to_ascii_lowercase();
        match lower.as_str() {
            "-command" | "-c" => {
                let script = tokens[i + 1..].join(" ");
                if script.is_empty() {
                    return complex(WrapperType::PowerShell, None);
                }
                return from_script(WrapperType::PowerShell, script);
            }
            "-encodedcommand" | "-enc" | "-ec" | "-e" => {
                let decoded = tokens.get(i + 1).and_then(|b64| decode_utf16le_base64(b64));
                return match decoded {
                    Some(script) => from_script(WrapperType::PowerShell, script),
                    // Payload we cannot read is a payload we cannot vet.
                    None => complex(WrapperType::PowerShell, None),
                };
            }
            _ => {}
        }
    }
    complex(WrapperType::PowerShell, None)
}

/// Build the analysis for an extracted script: classify complexity, then
/// split into sub-commands when safe.
fn from_script(wrapper_type: WrapperType, script: String) -> WrapperAnalysis {
    if script_is_complex(&script) {
        return complex(wrapper_type, Some(script));
    }

    let subs = split_script(&script);
    if subs.is_empty() || subs.len() > MAX_SUBCOMMANDS {
        return complex(wrapper_type, Some(script));
    }

    WrapperAnalysis {
        wrapper_type,
        embedded_script: Some(script),
        sub_commands: subs,
        is_complex: false,
    }
}

fn complex(wrapper_type: WrapperType, script: Option<String>) -> WrapperAnalysis {
    WrapperAnalysis {
        wrapper_type,
        embedded_script: script,
        sub_commands: Vec::new(),
        is_complex: true,
    }
}

/// Heuristic complexity test for an embedded script.
///
/// Anything with control flow, substitution, `eval`-family indirection,
/// heredocs, backgrounding, `||`, or more than one `&&` is complex.
pub fn script_is_complex(script: &str) -> bool {
    if script.contains("$(") || script.contains('`') {
        return true;
    }
    if script.contains("<(") || script.contains(">(") {
        return true;
    }
    if script.contains("<<") {
        return true;
    }
    if script.contains("||") {
        return true;
    }
    if script.matches("&&").count() > 1 {
        return true;
    }

    // A lone `&` (backgrounding) after fd-duplication forms and `&&` are
    // removed means we cannot track the process.
    let stripped = script.replace("&&", "").replace(">&", "").replace("&>", "");
    if stripped.contains('&') {
        return true;
    }

    for word in script.split(|c: char| c.is_whitespace() || c == ';') {
        if CONTROL_KEYWORDS.contains(&word) {
            return true;
        }
        if matches!(word, "eval" | "exec" | "source" | ".") {
            return true;
        }
    }

    false
}

/// Split a non-complex script on `;` and `&&` (quote-aware), keeping
/// pipelines intact within a single sub-command.
fn split_script(script: &str) -> Vec<String> {
    let mut subs = Vec::new();
    let mut start = 0;
    let mut in_single = false;
    let mut in_double = false;
    let mut chars = script.char_indices().peekable();

    while let Some((i, ch)) = chars.next() {
        if ch == '\'' && !in_double {
            in_single = !in_single;
        } else if ch == '"' && !in_single {
            in_double = !in_double;
        } else if !in_single && !in_double {
            match ch {
                ';' => {
                    subs.push(script[start..i].to_string());
                    start = chars.peek().map(|(i, _)| *i).unwrap_or(script.len());
                }
                '&' if chars.peek().map(|(_, c)| *c) == Some('&') => {
                    subs.push(script[start..i].to_string());
                    chars.next();
                    start = chars.peek().map(|(i, _)| *i).unwrap_or(script.len());
                }
                _ => {}
            }
        }
    }

    let last = script[start..].trim();
    if !last.is_empty() {
        subs.push(last.to_string());
    }

    subs.iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Decode a PowerShell `-EncodedCommand` payload: base64 over UTF-16LE.
fn decode_utf16le_base64(payload: &str) -> Option<String> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .ok()?;
    if bytes.len() % 2 != 0 {
        return None;
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    String::from_utf16(&units).ok()
}
