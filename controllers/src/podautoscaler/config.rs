//! CLI surface (clap, as `rkubectl` uses elsewhere in this workspace)
//! layered over a config-file/env source (the `config` + `lazy_static`
//! pattern every controller binary in this workspace uses). CLI flags
//! always win over file/env configuration.

use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Vertical resource autoscaler", long_about = None)]
pub struct Cli {
    /// Path to a kubeconfig file; absent means in-cluster.
    #[clap(long)]
    pub kubeconfig: Option<String>,

    /// How often to take a cluster factor snapshot and feed it to policies.
    #[clap(long)]
    pub poll_period: Option<u64>,

    /// How often to read current resources and (maybe) patch them.
    #[clap(long)]
    pub update_period: Option<u64>,

    /// Bind address for the introspection HTTP server; omit to disable it.
    #[clap(long)]
    pub listen_api: Option<String>,

    /// Never write to the target; log what would have been patched.
    #[clap(long)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AutoScalerConfig {
    pub api_server_url: String,
    pub poll_period_secs: u64,
    pub update_period_secs: u64,
    pub listen_api: Option<String>,
    pub dry_run: bool,
}

impl Default for AutoScalerConfig {
    fn default() -> Self {
        AutoScalerConfig {
            api_server_url: "http://127.0.0.1:8080/".to_string(),
            poll_period_secs: 30,
            update_period_secs: 30,
            listen_api: None,
            dry_run: false,
        }
    }
}

impl AutoScalerConfig {
    /// Merge CLI flags onto a file/env-sourced config; flags always win.
    pub fn merge_cli(mut self, cli: &Cli) -> Self {
        if let Some(period) = cli.poll_period {
            self.poll_period_secs = period;
        }
        if let Some(period) = cli.update_period {
            self.update_period_secs = period;
        }
        if cli.listen_api.is_some() {
            self.listen_api = cli.listen_api.clone();
        }
        if cli.dry_run {
            self.dry_run = true;
        }
        self
    }

    pub fn poll_period(&self) -> Duration {
        Duration::from_secs(self.poll_period_secs)
    }

    pub fn update_period(&self) -> Duration {
        Duration::from_secs(self.update_period_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flags_override_file_defaults() {
        let base = AutoScalerConfig::default();
        let cli = Cli {
            kubeconfig: None,
            poll_period: Some(5),
            update_period: None,
            listen_api: Some("0.0.0.0:9000".to_string()),
            dry_run: true,
        };
        let merged = base.merge_cli(&cli);
        assert_eq!(merged.poll_period_secs, 5);
        assert_eq!(merged.update_period_secs, 30);
        assert_eq!(merged.listen_api.as_deref(), Some("0.0.0.0:9000"));
        assert!(merged.dry_run);
    }
}
