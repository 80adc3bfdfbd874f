use std::path::Path;
use std::process::ExitCode;

use cg_core::approval::{self, PromptChoice};
use cg_core::config::Config;
use cg_core::executor;
use cg_gate::classify::strip_command_prefixes;
use cg_gate::gate::{Decision, Gate, GateResult};
use cg_gate::rules::default_pattern;
use cg_gate::tokenize::tokenize;
use cg_store::{export_jsonl, export_table, AuditLog, AuditReader, RuleStore};

fn print_help() {
    println!("cmdgate — authorization gate for agent-proposed shell commands");
    println!();
    println!("Usage:");
    println!("  cmdgate eval \"<command>\"     Evaluate a command, print the decision as JSON");
    println!("  cmdgate run \"<command>\"      Evaluate, prompt if needed, then execute");
    println!("  cmdgate rules list            List persisted and session rules");
    println!("  cmdgate rules remove <id>     Delete a rule by id");
    println!("  cmdgate audit                 Print the audit log");
    println!("  cmdgate audit clear           Truncate the audit log");
    println!();
    println!("Options:");
    println!("  --session <id>    Limit audit output to one session");
    println!("  --format <fmt>    Audit output format: table (default) or json");
    println!("  --version         Print version");
    println!("  --help            Print this help");
    println!();
    println!("Exit codes for eval: 0 allow, 1 prompt, 2 deny.");
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.is_empty() || args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return ExitCode::SUCCESS;
    }

    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("cmdgate {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    let config = Config::load_or_default();

    match args[0].as_str() {
        "eval" => {
            let Some(command) = args.get(1) else {
                eprintln!("eval: missing command");
                return ExitCode::from(64);
            };
            cmd_eval(&config, command)
        }
        "run" => {
            let Some(command) = args.get(1) else {
                eprintln!("run: missing command");
                return ExitCode::from(64);
            };
            cmd_run(&config, command)
        }
        "rules" => cmd_rules(&config, &args[1..]),
        "audit" => cmd_audit(&config, &args[1..]),
        other => {
            eprintln!("unknown subcommand: {other}");
            print_help();
            ExitCode::from(64)
        }
    }
}

fn open_store(config: &Config) -> Option<RuleStore> {
    match RuleStore::load(config.resolve_rules_path()) {
        Ok(store) => Some(store),
        Err(e) => {
            eprintln!("error: failed to load rules: {e}");
            None
        }
    }
}

fn open_audit(config: &Config) -> AuditLog {
    if !config.audit.enabled {
        return AuditLog::noop();
    }
    match AuditLog::new(&config.resolve_audit_path()) {
        Ok(log) => log,
        Err(e) => {
            eprintln!("warning: audit log unavailable: {e}");
            AuditLog::noop()
        }
    }
}

fn evaluate(config: &Config, store: &RuleStore, command: &str) -> GateResult {
    let gate = Gate::new(config.workspace_env());
    let cwd = std::env::current_dir().ok();
    gate.evaluate(command, cwd.as_deref(), &store.snapshot())
}

fn cmd_eval(config: &Config, command: &str) -> ExitCode {
    let Some(store) = open_store(config) else {
        return ExitCode::from(74);
    };
    let mut audit = open_audit(config);

    let result = evaluate(config, &store, command);
    audit.log_evaluation(command, &result);

    match serde_json::to_string_pretty(&result) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(74);
        }
    }

    match result.decision {
        Decision::Allow => ExitCode::SUCCESS,
        Decision::Prompt => ExitCode::from(1),
        Decision::Deny => ExitCode::from(2),
    }
}

fn cmd_run(config: &Config, command: &str) -> ExitCode {
    let Some(store) = open_store(config) else {
        return ExitCode::from(74);
    };
    let mut audit = open_audit(config);

    let result = evaluate(config, &store, command);
    audit.log_evaluation(command, &result);

    let proceed = match result.decision {
        Decision::Allow => true,
        Decision::Deny => {
            eprintln!("denied: {}", result.reason);
            false
        }
        Decision::Prompt => {
            audit.log_prompt(command, &result.reason);
            let choice = match approval::prompt_user(command, &result) {
                Ok(choice) => choice,
                Err(e) => {
                    eprintln!("error: prompt failed: {e}");
                    PromptChoice::Deny
                }
            };
            let outcome = approval::choice_outcome(choice);
            audit.log_human_decision(command, choice.as_str(), outcome.proceed);

            if let Some((action, scope)) = outcome.rule {
                let tokens = tokenize(command);
                let pattern = default_pattern(strip_command_prefixes(&tokens));
                if pattern.is_empty() {
                    eprintln!("warning: no rule pattern for this command, nothing saved");
                } else {
                    let description = format!("{} {}", choice.as_str(), pattern.join(" "));
                    match store.add(pattern, action, description, scope) {
                        Ok(rule) => audit.log_rule_created(&rule),
                        Err(e) => eprintln!("error: failed to save rule: {e}"),
                    }
                }
            }

            if !outcome.proceed {
                eprintln!("denied: {}", choice.as_str());
            }
            outcome.proceed
        }
    };

    if !proceed {
        return ExitCode::from(2);
    }

    let cwd = std::env::current_dir().unwrap_or_else(|_| config.workspace_env().root.clone());
    let report = match run_command(command, &cwd) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("error: failed to run command: {e}");
            return ExitCode::from(74);
        }
    };

    audit.log_executed(command, report.exit_code, &report.output, report.duration_ms);
    print!("{}", report.output);

    match report.exit_code {
        Some(code) => ExitCode::from(code.clamp(0, 255) as u8),
        None => ExitCode::from(74),
    }
}

fn run_command(command: &str, cwd: &Path) -> std::io::Result<executor::ExecutionReport> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(executor::run(command, cwd))
}

fn cmd_rules(config: &Config, args: &[String]) -> ExitCode {
    let Some(store) = open_store(config) else {
        return ExitCode::from(74);
    };

    match args.first().map(String::as_str) {
        Some("list") | None => {
            let rules = store.snapshot();
            if rules.is_empty() {
                println!("no rules");
                return ExitCode::SUCCESS;
            }
            for rule in rules {
                println!(
                    "{:>4}  {:<7}  {:<10}  {}",
                    rule.id,
                    rule.action.as_str(),
                    format!("{:?}", rule.scope).to_lowercase(),
                    rule.pattern.join(" "),
                );
            }
            ExitCode::SUCCESS
        }
        Some("remove") => {
            let Some(id) = args.get(1).and_then(|s| s.parse::<u64>().ok()) else {
                eprintln!("rules remove: expected a numeric rule id");
                return ExitCode::from(64);
            };
            match store.remove(id) {
                Ok(rule) => {
                    let mut audit = open_audit(config);
                    audit.log_rule_deleted(rule.id);
                    println!("removed rule {id}");
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("error: {e}");
                    ExitCode::from(1)
                }
            }
        }
        Some(other) => {
            eprintln!("unknown rules subcommand: {other}");
            ExitCode::from(64)
        }
    }
}

fn cmd_audit(config: &Config, args: &[String]) -> ExitCode {
    let path = config.resolve_audit_path();

    if args.first().map(String::as_str) == Some("clear") {
        return match AuditLog::clear(&path) {
            Ok(()) => {
                println!("audit log cleared");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("error: {e}");
                ExitCode::from(74)
            }
        };
    }

    let mut session: Option<&str> = None;
    let mut format = "table";
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--session" => {
                let Some(value) = args.get(i + 1) else {
                    eprintln!("--session requires a value");
                    return ExitCode::from(64);
                };
                session = Some(value);
                i += 2;
            }
            "--format" => {
                let Some(value) = args.get(i + 1) else {
                    eprintln!("--format requires a value");
                    return ExitCode::from(64);
                };
                format = value;
                i += 2;
            }
            other => {
                eprintln!("unknown audit option: {other}");
                return ExitCode::from(64);
            }
        }
    }

    let reader = AuditReader::new(path);
    let events = match session {
        Some(s) => reader.by_session(s),
        None => reader.replay(),
    };
    let events = match events {
        Ok(events) => events,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(74);
        }
    };

    match format {
        "json" => print!("{}", export_jsonl(&events)),
        "table" => print!("{}", export_table(&events)),
        other => {
            eprintln!("unknown format: {other} (expected table or json)");
            return ExitCode::from(64);
        }
    }
    ExitCode::SUCCESS
}
