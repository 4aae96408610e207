//! Device resolution.

use agentrt_domain::config::RemoteConfig;
use agentrt_domain::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDevice {
    pub name: String,
    /// `user@host`, ready to hand to `ssh`/`rsync`.
    pub ssh_target: String,
}

/// Resolve a single `execute_remote` target: a configured device name, or a
/// literal `user@host`/bare host passed straight through.
pub fn resolve_one(remote: &RemoteConfig, target: &str) -> ResolvedDevice {
    match remote.devices.get(target) {
        Some(ssh_target) => ResolvedDevice { name: target.to_string(), ssh_target: ssh_target.clone() },
        None => ResolvedDevice { name: target.to_string(), ssh_target: target.to_string() },
    }
}

/// Resolve an `execute_parallel` target set: an explicit array of names, a
/// configured group name, or the literal `"all"` (every configured device).
pub fn resolve_many(remote: &RemoteConfig, targets: &[String]) -> Result<Vec<ResolvedDevice>> {
    if targets.len() == 1 {
        if targets[0] == "all" {
            if remote.devices.is_empty() {
                return Err(Error::InvalidInput("no devices configured for target 'all'".to_string()));
            }
            let mut names: Vec<&String> = remote.devices.keys().collect();
            names.sort();
            return Ok(names.into_iter().map(|n| resolve_one(remote, n)).collect());
        }
        if let Some(members) = remote.groups.get(&targets[0]) {
            return Ok(members.iter().map(|m| resolve_one(remote, m)).collect());
        }
    }
    Ok(targets.iter().map(|t| resolve_one(remote, t)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn cfg() -> RemoteConfig {
        let mut devices = HashMap::new();
        devices.insert("mac-mini".to_string(), "alice@192.168.1.10".to_string());
        devices.insert("pi".to_string(), "pi@192.168.1.20".to_string());
        let mut groups = HashMap::new();
        groups.insert("lab".to_string(), vec!["mac-mini".to_string(), "pi".to_string()]);
        RemoteConfig { devices, groups, ..Default::default() }
    }

    #[test]
    fn resolve_one_falls_back_to_literal_target() {
        let d = resolve_one(&cfg(), "someone@elsewhere");
        assert_eq!(d.ssh_target, "someone@elsewhere");
    }

    #[test]
    fn resolve_one_maps_configured_name() {
        let d = resolve_one(&cfg(), "pi");
        assert_eq!(d.ssh_target, "pi@192.168.1.20");
    }

    #[test]
    fn resolve_many_all_is_sorted_by_name() {
        let devices = resolve_many(&cfg(), &["all".to_string()]).unwrap();
        assert_eq!(devices.iter().map(|d| d.name.as_str()).collect::<Vec<_>>(), vec!["mac-mini", "pi"]);
    }

    #[test]
    fn resolve_many_expands_group() {
        let devices = resolve_many(&cfg(), &["lab".to_string()]).unwrap();
        assert_eq!(devices.len(), 2);
    }

    #[test]
    fn resolve_many_passes_through_explicit_array() {
        let devices = resolve_many(&cfg(), &["pi".to_string(), "someone@elsewhere".to_string()]).unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[1].ssh_target, "someone@elsewhere");
    }
}
