//! Aggregated health check reporting.
//!
//! The overall daemon status is the worst status among all enabled modules:
//! all `Healthy` -> `Healthy`; any `Degraded`, none `Unhealthy` -> `Degraded`;
//! any `Unhealthy` -> `Unhealthy`.

use serde::Serialize;

use netsentry_core::pipeline::HealthStatus;

#[derive(Debug, Clone, Serialize)]
pub struct DaemonHealth {
    pub status: HealthStatus,
    pub uptime_secs: u64,
    pub modules: Vec<ModuleHealth>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleHealth {
    pub name: String,
    pub enabled: bool,
    pub status: HealthStatus,
}

/// Returns the worst status found: `Unhealthy` > `Degraded` > `Healthy`.
/// Only considers enabled modules.
pub fn aggregate_status(modules: &[ModuleHealth]) -> HealthStatus {
    let enabled_modules = modules.iter().filter(|m| m.enabled);

    let mut worst = HealthStatus::Healthy;
    let mut reasons = Vec::new();

    for module in enabled_modules {
        match &module.status {
            HealthStatus::Healthy => {}
            HealthStatus::Degraded(reason) => {
                if !worst.is_unhealthy() {
                    reasons.push(format!("{}: {}", module.name, reason));
                    worst = HealthStatus::Degraded(String::new());
                }
            }
            HealthStatus::Unhealthy(reason) => {
                reasons.push(format!("{}: {}", module.name, reason));
                worst = HealthStatus::Unhealthy(String::new());
            }
        }
    }

    match worst {
        HealthStatus::Healthy => HealthStatus::Healthy,
        HealthStatus::Degraded(_) => HealthStatus::Degraded(reasons.join("; ")),
        HealthStatus::Unhealthy(_) => HealthStatus::Unhealthy(reasons.join("; ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(name: &str, enabled: bool, status: HealthStatus) -> ModuleHealth {
        ModuleHealth { name: name.to_owned(), enabled, status }
    }

    #[test]
    fn all_healthy_is_healthy() {
        let modules = vec![
            module("capture", true, HealthStatus::Healthy),
            module("ddos", true, HealthStatus::Healthy),
        ];
        assert!(aggregate_status(&modules).is_healthy());
    }

    #[test]
    fn one_unhealthy_dominates_degraded() {
        let modules = vec![
            module("capture", true, HealthStatus::Degraded("slow".to_owned())),
            module("ddos", true, HealthStatus::Unhealthy("crashed".to_owned())),
        ];
        assert!(aggregate_status(&modules).is_unhealthy());
    }

    #[test]
    fn disabled_modules_are_ignored() {
        let modules = vec![module("ddos", false, HealthStatus::Unhealthy("crashed".to_owned()))];
        assert!(aggregate_status(&modules).is_healthy());
    }
}
