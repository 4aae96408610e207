//! `agentrt doctor` — diagnostic checks over config and workspace state,
//! printed as a checklist with a pass/fail summary.

use agentrt_domain::config::{Config, ConfigSeverity};

pub async fn run(config: &Config, config_path: &str) -> anyhow::Result<bool> {
    println!("agentrt doctor");
    println!("==============\n");

    let mut all_passed = true;

    check_config_file(config_path, &mut all_passed);
    check_config_validation(config, &mut all_passed);
    check_llm_providers(config, &mut all_passed);
    check_workspace(&mut all_passed);

    println!();
    if all_passed {
        println!("All checks passed.");
    } else {
        println!("Some checks failed. Review the output above.");
    }

    Ok(all_passed)
}

fn check_config_file(config_path: &str, all_passed: &mut bool) {
    let exists = std::path::Path::new(config_path).exists();
    print_check(
        "Config file exists",
        true,
        if exists { config_path.to_owned() } else { format!("{config_path} not found (using defaults)") },
    );
    let _ = all_passed;
}

fn check_config_validation(config: &Config, all_passed: &mut bool) {
    let issues = config.validate();
    let error_count = issues.iter().filter(|e| e.severity == ConfigSeverity::Error).count();
    if issues.is_empty() {
        print_check("Config validation", true, "no issues".into());
    } else {
        print_check("Config validation", error_count == 0, format!("{} issue(s) ({error_count} error(s))", issues.len()));
        for issue in &issues {
            println!("      {issue}");
        }
        if error_count > 0 {
            *all_passed = false;
        }
    }
}

fn check_llm_providers(config: &Config, all_passed: &mut bool) {
    let count = config.llm.providers.len();
    let ok = count > 0;
    print_check("LLM providers configured", ok, if ok { format!("{count} provider(s)") } else { "none configured".into() });
    if !ok {
        *all_passed = false;
    }
}

fn check_workspace(all_passed: &mut bool) {
    let path = std::env::current_dir().unwrap_or_default();
    let probe = path.join(".agentrt_doctor_probe");
    let writable = std::fs::write(&probe, b"probe").is_ok();
    let _ = std::fs::remove_file(&probe);
    print_check("Workspace directory", writable, if writable { format!("{} (writable)", path.display()) } else { format!("{} (not writable)", path.display()) });
    if !writable {
        *all_passed = false;
    }
}

fn print_check(name: &str, passed: bool, detail: String) {
    let status = if passed { "PASS" } else { "FAIL" };
    println!("  [{status}] {name}: {detail}");
}
