//! Argv tokenizer for raw command strings.
//!
//! Splits a command line into tokens, honoring single quotes, double quotes,
//! and backslash escapes. Total and deterministic: malformed input never
//! panics, and an unterminated quote degrades to "rest of string is one
//! token". Every other stage of the gate consumes this token list, so it
//! must produce the same output for the same input every time.

/// Tokenize a raw command string into an argv-style token list.
///
/// Whitespace separates tokens; quoted spans are kept as single tokens with
/// the quotes stripped; a backslash outside single quotes escapes the next
/// character. Empty input yields an empty list.
pub fn tokenize(cmd: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_single = false;
    let mut in_double = false;
    let mut escape_next = false;
    let mut pending = false;

    for ch in cmd.chars() {
        if escape_next {
            current.push(ch);
            pending = true;
            escape_next = false;
            continue;
        }

        if ch == '\\' && !in_single {
            escape_next = true;
            pending = true;
            continue;
        }

        if ch == '\'' && !in_double {
            in_single = !in_single;
            pending = true;
            continue;
        }

        if ch == '"' && !in_single {
            in_double = !in_double;
            pending = true;
            continue;
        }

        if ch.is_whitespace() && !in_single && !in_double {
            if pending {
                tokens.push(std::mem::take(&mut current));
                pending = false;
            }
            continue;
        }

        current.push(ch);
        pending = true;
    }

    // Unterminated quote or trailing escape: whatever accumulated is the
    // final token. Conservative but total.
    if pending {
        tokens.push(current);
    }

    tokens
}

/// Extract the basename from a program path (`/usr/bin/ls` -> `ls`).
/// Strips a leading dash (login-shell convention) so `-bash` matches `bash`.
pub fn program_basename(path: &str) -> &str {
    let base = path.rsplit(['/', '\\']).next().unwrap_or(path);
    base.strip_prefix('-').unwrap_or(base)
}

/// Split a compound command on `|`, `&&`, `||`, `;` outside quotes.
///
/// Used by the classifier to analyze each pipeline segment independently and
/// to spot downloader-into-shell patterns across adjacent segments.
pub fn split_segments(cmd: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut in_single = false;
    let mut in_double = false;
    let mut chars = cmd.char_indices().peekable();

    while let Some((i, ch)) = chars.next() {
        if ch == '\'' && !in_double {
            in_single = !in_single;
        } else if ch == '"' && !in_single {
            in_double = !in_double;
        } else if !in_single && !in_double {
            match ch {
                '|' => {
                    segments.push(&cmd[start..i]);
                    if chars.peek().map(|(_, c)| *c) == Some('|') {
                        chars.next();
                    }
                    start = chars.peek().map(|(i, _)| *i).unwrap_or(cmd.len());
                }
                '&' => {
                    if chars.peek().map(|(_, c)| *c) == Some('&') {
                        segments.push(&cmd[start..i]);
                        chars.next();
                        start = chars.peek().map(|(i, _)| *i).unwrap_or(cmd.len());
                    }
                }
                ';' => {
                    segments.push(&cmd[start..i]);
                    start = chars.peek().map(|(i, _)| *i).unwrap_or(cmd.len());
                }
                _ => {}
            }
        }
    }

    let last = &cmd[start..];
    if !last.trim().is_empty() {
        segments.push(last);
    }

    segments.retain(|s| !s.trim().is_empty());
    segments
}
