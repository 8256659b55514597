//! stream-regex command line
//!
//! Runs one rule management command against a JSON settings file.

use std::path::PathBuf;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use stream_regex::{Command, JsonFileSettingsStore, RuleService, COMMANDS};

/// CLI configuration
struct Config {
    /// Settings file holding the rule list
    settings: PathBuf,
    /// Command name followed by its `key=value` arguments
    command: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            settings: PathBuf::from("./stream-regex.json"),
            command: Vec::new(),
        }
    }
}

fn print_help() {
    println!("stream-regex - manage stream regex automation rules");
    println!();
    println!("USAGE:");
    println!("    stream-regex [OPTIONS] <COMMAND> [key=value...]");
    println!();
    println!("OPTIONS:");
    println!("    -s, --settings <FILE>     Settings file [default: ./stream-regex.json]");
    println!("    -h, --help                Print help information");
    println!();
    println!("COMMANDS:");
    for spec in COMMANDS {
        print!("    {}", spec.usage());
    }
}

fn parse_args() -> Config {
    let args: Vec<String> = std::env::args().collect();
    let mut config = Config::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--settings" | "-s" => {
                if i + 1 < args.len() {
                    config.settings = PathBuf::from(&args[i + 1]);
                    i += 2;
                } else {
                    eprintln!("error: --settings requires a value");
                    std::process::exit(1);
                }
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {
                config.command = args[i..].to_vec();
                break;
            }
        }
    }

    config
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = parse_args();
    if config.command.is_empty() {
        print_help();
        std::process::exit(1);
    }

    let command = match Command::from_tokens(config.command.as_slice()) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    let store = Arc::new(JsonFileSettingsStore::new(config.settings.clone()));
    // Nothing to debounce in a one-shot process; flush below writes immediately.
    let rules = match RuleService::open(store, std::time::Duration::from_secs(60)) {
        Ok(rules) => rules,
        Err(e) => {
            eprintln!("error: failed to open {}: {e}", config.settings.display());
            std::process::exit(1);
        }
    };

    let output = command.execute(&rules).and_then(|out| rules.flush().map(|()| out));
    match output {
        Ok(out) => println!("{out}"),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}
