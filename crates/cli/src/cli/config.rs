//! `agentrt config validate|show`.

use agentrt_domain::config::{Config, ConfigSeverity};

/// Print every validation issue and return whether the config is usable
/// (no `Error`-severity issues).
pub fn validate(config: &Config, path: &str) -> bool {
    println!("config: {path}");
    let issues = config.validate();
    if issues.is_empty() {
        println!("no issues found");
        return true;
    }
    let mut error_count = 0;
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => println!("  [warn]  {}: {}", issue.field, issue.message),
            ConfigSeverity::Error => {
                println!("  [error] {}: {}", issue.field, issue.message);
                error_count += 1;
            }
        }
    }
    error_count == 0
}

pub fn show(config: &Config) {
    match toml::to_string_pretty(config) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("failed to serialize config: {e}"),
    }
}
