//! Side-effect extraction: write paths, network domains, ports.
//!
//! Extraction is a superset, never a subset, of the command's actual
//! effects. A false positive costs an extra prompt; a false negative is a
//! policy hole. When a target cannot be seen directly (a package install
//! with no URL), the well-known default domain is assumed.

use serde::Serialize;

use crate::tokenize::program_basename;

/// Whether a path is read or written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOp {
    Read,
    Write,
}

/// A filesystem path the command touches, with the token position it was
/// found at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathEffect {
    pub path: String,
    pub op: FileOp,
    pub position: usize,
}

/// Everything the extractor could see the command doing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SideEffects {
    pub paths: Vec<PathEffect>,
    pub domains: Vec<String>,
    pub ports: Vec<u16>,
}

impl SideEffects {
    /// Fold another command's effects into this one (wrapper sub-commands).
    pub fn merge(&mut self, other: SideEffects) {
        for p in other.paths {
            if !self.paths.contains(&p) {
                self.paths.push(p);
            }
        }
        for d in other.domains {
            if !self.domains.contains(&d) {
                self.domains.push(d);
            }
        }
        for p in other.ports {
            if !self.ports.contains(&p) {
                self.ports.push(p);
            }
        }
    }

    /// True if any extracted path is written.
    pub fn has_writes(&self) -> bool {
        self.paths.iter().any(|p| p.op == FileOp::Write)
    }

    pub fn write_paths(&self) -> impl Iterator<Item = &PathEffect> {
        self.paths.iter().filter(|p| p.op == FileOp::Write)
    }
}

/// Default domains implied by package-manager invocations that fetch from a
/// registry without naming it. Data to be reviewed, not logic: keep this
/// table flat and auditable.
const IMPLIED_DOMAINS: &[(&str, &str, &str)] = &[
    ("npm", "install", "registry.npmjs.org"),
    ("npm", "ci", "registry.npmjs.org"),
    ("npm", "update", "registry.npmjs.org"),
    ("npx", "", "registry.npmjs.org"),
    ("yarn", "install", "registry.npmjs.org"),
    ("yarn", "add", "registry.npmjs.org"),
    ("pnpm", "install", "registry.npmjs.org"),
    ("pnpm", "add", "registry.npmjs.org"),
    ("pip", "install", "pypi.org"),
    ("pip3", "install", "pypi.org"),
    ("cargo", "install", "crates.io"),
    ("cargo", "add", "crates.io"),
    ("cargo", "publish", "crates.io"),
    ("gem", "install", "rubygems.org"),
    ("go", "get", "proxy.golang.org"),
    ("go", "install", "proxy.golang.org"),
    ("apt", "install", "deb.debian.org"),
    ("apt-get", "install", "deb.debian.org"),
    ("brew", "install", "formulae.brew.sh"),
    ("git", "clone", "github.com"),
    ("git", "fetch", "github.com"),
    ("git", "pull", "github.com"),
    ("git", "push", "github.com"),
];

/// Extract side effects from a tokenized command plus its raw form.
pub fn extract_effects(tokens: &[String], raw: &str) -> SideEffects {
    let mut effects = SideEffects::default();

    extract_redirect_paths(tokens, &mut effects);
    extract_idiom_paths(tokens, &mut effects);
    extract_url_domains(raw, &mut effects);
    extract_implied_domains(tokens, &mut effects);
    extract_ports(tokens, &mut effects);

    effects
}

/// Output-redirection targets: `> f`, `>> f`, `2> f`, with or without
/// whitespace around the operator. Fd-duplication forms (`2>&1`, `>&2`) are
/// not file writes. `< f` marks a read.
fn extract_redirect_paths(tokens: &[String], effects: &mut SideEffects) {
    let mut i = 0;
    while i < tokens.len() {
        let tok = &tokens[i];

        if let Some(gt) = tok.find('>') {
            let prefix = &tok[..gt];
            // Only a bare fd number (or nothing) may precede the operator;
            // `2>&1` in the middle of a word is not a redirect we act on.
            let fd_prefix = prefix.is_empty() || prefix.chars().all(|c| c.is_ascii_digit());
            let mut rest = &tok[gt + 1..];
            if rest.starts_with('>') {
                rest = &rest[1..];
            }
            if fd_prefix && !rest.starts_with('&') {
                if !rest.is_empty() {
                    push_path(effects, rest, FileOp::Write, i);
                } else if let Some(target) = tokens.get(i + 1) {
                    if !target.starts_with('&') {
                        push_path(effects, target, FileOp::Write, i + 1);
                        i += 1;
                    }
                }
            }
        } else if let Some(lt) = tok.find('<') {
            let rest = &tok[lt + 1..];
            if !rest.is_empty() {
                push_path(effects, rest, FileOp::Read, i);
            } else if tok == "<" {
                if let Some(target) = tokens.get(i + 1) {
                    push_path(effects, target, FileOp::Read, i + 1);
                    i += 1;
                }
            }
        }

        i += 1;
    }
}

/// File-producing command idioms: the obvious cases where the program name
/// alone tells us a path is written.
fn extract_idiom_paths(tokens: &[String], effects: &mut SideEffects) {
    let Some(first) = tokens.first() else {
        return;
    };
    let program = program_basename(first);
    let args: Vec<(usize, &String)> = tokens
        .iter()
        .enumerate()
        .skip(1)
        .filter(|(_, t)| !t.starts_with('-') && !t.contains('>') && !t.contains('<'))
        .collect();

    match program {
        "touch" | "mkdir" | "tee" => {
            for (i, arg) in &args {
                push_path(effects, arg, FileOp::Write, *i);
            }
        }
        "cp" | "mv" => {
            // Destination is the last positional argument.
            if args.len() >= 2 {
                let (i, dest) = args[args.len() - 1];
                push_path(effects, dest, FileOp::Write, i);
            }
        }
        "sed" => {
            // First positional argument is the sed script, the rest are files.
            if tokens.iter().any(|t| t == "-i" || t.starts_with("-i.")) {
                for (i, arg) in args.iter().skip(1) {
                    push_path(effects, arg, FileOp::Write, *i);
                }
            }
        }
        "curl" => {
            for (i, t) in tokens.iter().enumerate() {
                if (t == "-o" || t == "--output") && i + 1 < tokens.len() {
                    push_path(effects, &tokens[i + 1], FileOp::Write, i + 1);
                }
            }
        }
        "wget" => {
            for (i, t) in tokens.iter().enumerate() {
                if t == "-O" && i + 1 < tokens.len() {
                    push_path(effects, &tokens[i + 1], FileOp::Write, i + 1);
                }
            }
        }
        "dd" => {
            for (i, t) in tokens.iter().enumerate() {
                if let Some(target) = t.strip_prefix("of=") {
                    push_path(effects, target, FileOp::Write, i);
                }
            }
        }
        _ => {}
    }
}

fn push_path(effects: &mut SideEffects, path: &str, op: FileOp, position: usize) {
    if path.is_empty() {
        return;
    }
    let effect = PathEffect {
        path: path.to_string(),
        op,
        position,
    };
    if !effects.paths.contains(&effect) {
        effects.paths.push(effect);
    }
}

/// URL-shaped substrings: `scheme://host[:port]/...`. Host goes to domains,
/// an explicit `:port` to ports.
fn extract_url_domains(raw: &str, effects: &mut SideEffects) {
    let mut rest = raw;
    while let Some(idx) = rest.find("://") {
        let after = &rest[idx + 3..];
        let end = after
            .find(|c: char| {
                !(c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == ':' || c == '@')
            })
            .unwrap_or(after.len());
        let mut hostport = &after[..end];
        // user@host form: keep the host side.
        if let Some(at) = hostport.rfind('@') {
            hostport = &hostport[at + 1..];
        }

        let (host, port) = match hostport.split_once(':') {
            Some((h, p)) => (h, p.parse::<u16>().ok()),
            None => (hostport, None),
        };

        if !host.is_empty() && host.contains('.') {
            let host = host.to_ascii_lowercase();
            if !effects.domains.contains(&host) {
                effects.domains.push(host);
            }
        }
        if let Some(p) = port {
            if !effects.ports.contains(&p) {
                effects.ports.push(p);
            }
        }

        rest = &after[end..];
    }
}

/// When a package manager fetches without a visible URL, assume the
/// well-known registry domain. Only fires when no explicit domain was seen.
fn extract_implied_domains(tokens: &[String], effects: &mut SideEffects) {
    if !effects.domains.is_empty() {
        return;
    }
    let mut words = tokens
        .iter()
        .enumerate()
        .filter(|(i, t)| *i == 0 || !t.starts_with('-'))
        .map(|(_, t)| t);
    let Some(program) = words.next() else {
        return;
    };
    let program = program_basename(program);
    let subcommand = words.next().map(|s| s.as_str()).unwrap_or("");

    for (prog, sub, domain) in IMPLIED_DOMAINS {
        if *prog == program && (sub.is_empty() || *sub == subcommand) {
            let domain = domain.to_string();
            if !effects.domains.contains(&domain) {
                effects.domains.push(domain);
            }
            return;
        }
    }
}

/// Explicit port flags and `PORT=`-style assignment prefixes.
fn extract_ports(tokens: &[String], effects: &mut SideEffects) {
    let mut push = |p: u16, effects: &mut SideEffects| {
        if !effects.ports.contains(&p) {
            effects.ports.push(p);
        }
    };

    for (i, tok) in tokens.iter().enumerate() {
        if tok == "-p" || tok == "--port" {
            if let Some(p) = tokens.get(i + 1).and_then(|t| t.parse::<u16>().ok()) {
                push(p, effects);
            }
        } else if let Some(v) = tok.strip_prefix("--port=") {
            if let Ok(p) = v.parse::<u16>() {
                push(p, effects);
            }
        } else if let Some(eq) = tok.find("PORT=") {
            // FOO_PORT=8080 env-assignment prefixes included.
            let prefix_ok = tok[..eq].chars().all(|c| c.is_ascii_uppercase() || c == '_');
            if prefix_ok {
                if let Ok(p) = tok[eq + 5..].parse::<u16>() {
                    push(p, effects);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenize::tokenize;

    fn extract(cmd: &str) -> SideEffects {
        extract_effects(&tokenize(cmd), cmd)
    }

    fn write_paths(e: &SideEffects) -> Vec<&str> {
        e.write_paths().map(|p| p.path.as_str()).collect()
    }

    // --- Redirects ---

    #[test]
    fn redirect_with_spaces() {
        let e = extract("echo hi > out.txt");
        assert_eq!(write_paths(&e), vec!["out.txt"]);
    }

    #[test]
    fn redirect_append() {
        let e = extract("echo hi >> log.txt");
        assert_eq!(write_paths(&e), vec!["log.txt"]);
    }

    #[test]
    fn redirect_without_spaces() {
        let e = extract("echo hi >out.txt");
        assert_eq!(write_paths(&e), vec!["out.txt"]);
    }

    #[test]
    fn stderr_redirect_is_a_write() {
        let e = extract("make 2> errors.log");
        assert_eq!(write_paths(&e), vec!["errors.log"]);
    }

    #[test]
    fn fd_duplication_is_not_a_write() {
        let e = extract("make test 2>&1");
        assert!(write_paths(&e).is_empty());

        let e = extract("echo hi >&2");
        assert!(write_paths(&e).is_empty());
    }

    #[test]
    fn input_redirect_is_a_read() {
        let e = extract("sort < data.txt");
        assert_eq!(e.paths.len(), 1);
        assert_eq!(e.paths[0].op, FileOp::Read);
        assert_eq!(e.paths[0].path, "data.txt");
    }

    #[test]
    fn redirect_position_hint_points_at_target() {
        let e = extract("echo hi > out.txt");
        assert_eq!(e.paths[0].position, 3);
    }

    // --- Idioms ---

    #[test]
    fn touch_and_mkdir_targets() {
        assert_eq!(write_paths(&extract("touch a.txt b.txt")), vec!["a.txt", "b.txt"]);
        assert_eq!(write_paths(&extract("mkdir -p build/out")), vec!["build/out"]);
    }

    #[test]
    fn cp_destination_only() {
        let e = extract("cp src.txt dst.txt");
        assert_eq!(write_paths(&e), vec!["dst.txt"]);
    }

    #[test]
    fn tee_targets() {
        assert_eq!(write_paths(&extract("tee -a notes.txt")), vec!["notes.txt"]);
    }

    #[test]
    fn sed_in_place() {
        assert_eq!(write_paths(&extract("sed -i s/a/b/ file.rs")), vec!["file.rs"]);
        assert!(write_paths(&extract("sed s/a/b/ file.rs")).is_empty());
    }

    #[test]
    fn curl_output_flag() {
        let e = extract("curl -o dl.tar.gz https://example.com/x.tar.gz");
        assert_eq!(write_paths(&e), vec!["dl.tar.gz"]);
    }

    #[test]
    fn dd_of_target() {
        assert_eq!(write_paths(&extract("dd if=a of=b.img")), vec!["b.img"]);
    }

    // --- Domains ---

    #[test]
    fn url_domain_extracted() {
        let e = extract("curl https://example.com/path");
        assert_eq!(e.domains, vec!["example.com"]);
    }

    #[test]
    fn url_domain_lowercased() {
        let e = extract("curl https://Example.COM/x");
        assert_eq!(e.domains, vec!["example.com"]);
    }

    #[test]
    fn multiple_urls() {
        let e = extract("curl https://a.example.com https://b.example.com");
        assert_eq!(e.domains, vec!["a.example.com", "b.example.com"]);
    }

    #[test]
    fn url_with_port() {
        let e = extract("curl http://localhost.localdomain:8080/api");
        assert_eq!(e.domains, vec!["localhost.localdomain"]);
        assert_eq!(e.ports, vec![8080]);
    }

    #[test]
    fn ssh_style_user_at_host_url() {
        let e = extract("git clone ssh://git@github.com/o/r.git");
        assert_eq!(e.domains, vec!["github.com"]);
    }

    // --- Implied domains ---

    #[test]
    fn npm_install_implies_registry() {
        let e = extract("npm install lodash");
        assert_eq!(e.domains, vec!["registry.npmjs.org"]);
    }

    #[test]
    fn pip_install_implies_pypi() {
        assert_eq!(extract("pip install requests").domains, vec!["pypi.org"]);
    }

    #[test]
    fn cargo_install_implies_crates_io() {
        assert_eq!(extract("cargo install ripgrep").domains, vec!["crates.io"]);
    }

    #[test]
    fn git_clone_without_url_implies_github() {
        assert_eq!(extract("git clone o/r").domains, vec!["github.com"]);
    }

    #[test]
    fn explicit_url_suppresses_implied_domain() {
        let e = extract("git clone https://gitlab.example.com/o/r.git");
        assert_eq!(e.domains, vec!["gitlab.example.com"]);
    }

    #[test]
    fn npm_test_implies_nothing() {
        assert!(extract("npm test").domains.is_empty());
    }

    #[test]
    fn cargo_build_implies_nothing() {
        assert!(extract("cargo build").domains.is_empty());
    }

    // --- Ports ---

    #[test]
    fn port_flag() {
        assert_eq!(extract("serve -p 3000").ports, vec![3000]);
        assert_eq!(extract("serve --port 9090").ports, vec![9090]);
        assert_eq!(extract("serve --port=4000").ports, vec![4000]);
    }

    #[test]
    fn port_env_assignment() {
        assert_eq!(extract("PORT=8080 node server.js").ports, vec![8080]);
        assert_eq!(extract("HTTP_PORT=8081 ./run").ports, vec![8081]);
    }

    #[test]
    fn non_numeric_port_ignored() {
        assert!(extract("serve -p abc").ports.is_empty());
    }

    // --- Merge ---

    #[test]
    fn merge_deduplicates() {
        let mut a = extract("echo x > f.txt");
        a.merge(extract("echo y > f.txt"));
        a.merge(extract("curl https://example.com"));
        assert_eq!(write_paths(&a).len(), 1);
        assert_eq!(a.domains, vec!["example.com"]);
    }

    #[test]
    fn empty_command_has_no_effects() {
        let e = extract("");
        assert_eq!(e, SideEffects::default());
    }
}
