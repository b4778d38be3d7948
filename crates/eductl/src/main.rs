//! Edu Control - CLI for the EduAI progress core
//!
//! Prints one JSON document per invocation on stdout. Failures print
//! `{"error": {"kind", "code", "message"}}` and exit non-zero.

use clap::Parser;
use edu_common::logging::init_tracing;
use edu_common::EduConfig;
use eductl::cli::Cli;
use eductl::commands;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logging goes to stderr; a broken config is reported by the command
    let filter = EduConfig::load(cli.config.as_deref())
        .map(|c| c.logging.filter)
        .unwrap_or_else(|_| "warn".to_string());
    init_tracing(&filter);

    match commands::run(&cli) {
        Ok(value) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            let (body, exit) = commands::error_response(&err);
            match serde_json::to_string_pretty(&body) {
                Ok(text) => println!("{}", text),
                Err(_) => println!("{{\"error\":{{\"message\":{:?}}}}}", err.to_string()),
            }
            ExitCode::from(exit)
        }
    }
}
