// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use capi_client::SupervisorConfig;
use capi_common::DEFAULT_ENDPOINT;
use clap_derive::Parser;
use figment::{
    Figment,
    providers::{Format, Json, Serialized, Yaml},
};
use serde_derive::{Deserialize, Serialize};

#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(name = "capi-host")]
#[command(about = "Chat bot host for the Battle.net chat API")]
#[command(version)]
pub struct Args {
    /// YAML or JSON config file (by extension). Its values override CLI args.
    #[arg(long)]
    pub config_file: Option<String>,

    #[arg(long, help = "Enable debug logging", default_value = "false")]
    pub debug: bool,

    #[arg(
        long,
        help = "Seconds of silence before a connection is pinged; twice this forces a reconnect",
        default_value = "10"
    )]
    pub keep_alive_secs: u64,

    #[arg(
        long,
        help = "How often connections are checked, in milliseconds",
        default_value = "1000"
    )]
    pub sweep_period_ms: u64,

    /// Only settable from the config file.
    #[arg(skip)]
    #[serde(default)]
    pub instances: BTreeMap<String, InstanceConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceConfig {
    pub api_key: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Prefix for commands typed in chat. Console commands always use `/`.
    #[serde(default = "default_trigger")]
    pub trigger: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// JSON permission snapshot, read at startup and written on shutdown.
    #[serde(default)]
    pub database_file: Option<PathBuf>,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_trigger() -> String {
    "!".to_string()
}

fn default_enabled() -> bool {
    true
}

impl Args {
    /// Layer the config file, if any, over the parsed command line.
    pub fn resolve(self) -> Result<Self, figment::Error> {
        let config_file = self.config_file.clone();
        let mut args_figment = Figment::new().merge(Serialized::defaults(self));
        if let Some(config_file) = config_file {
            let path = Path::new(&config_file);
            args_figment = match path.extension().and_then(|e| e.to_str()) {
                Some("json") => args_figment.merge(Json::file(path)),
                _ => args_figment.merge(Yaml::file(path)),
            };
        }
        args_figment.extract()
    }

    #[must_use]
    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            keep_alive: Duration::from_secs(self.keep_alive_secs),
            sweep_period: Duration::from_millis(self.sweep_period_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn config_file(suffix: &str, body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_cli_defaults() {
        let args = Args::parse_from(["capi-host"]).resolve().unwrap();
        assert!(!args.debug);
        assert_eq!(args.keep_alive_secs, 10);
        assert_eq!(args.sweep_period_ms, 1000);
        assert!(args.instances.is_empty());
        let supervisor = args.supervisor_config();
        assert_eq!(supervisor.keep_alive, Duration::from_secs(10));
        assert_eq!(supervisor.sweep_period, Duration::from_secs(1));
    }

    #[test]
    fn test_yaml_file_overrides_cli() {
        let file = config_file(
            ".yaml",
            "keep_alive_secs: 30\ninstances:\n  main:\n    api_key: abc123\n    trigger: \"?\"\n  spare:\n    api_key: def456\n    enabled: false\n    database_file: /tmp/spare.json\n",
        );
        let path = file.path().to_str().unwrap();
        let args = Args::parse_from(["capi-host", "--keep-alive-secs", "5", "--config-file", path])
            .resolve()
            .unwrap();
        assert_eq!(args.keep_alive_secs, 30);
        assert_eq!(
            args.instances.get("main"),
            Some(&InstanceConfig {
                api_key: "abc123".to_string(),
                endpoint: DEFAULT_ENDPOINT.to_string(),
                trigger: "?".to_string(),
                enabled: true,
                database_file: None,
            })
        );
        let spare = &args.instances["spare"];
        assert!(!spare.enabled);
        assert_eq!(spare.database_file, Some(PathBuf::from("/tmp/spare.json")));
    }

    #[test]
    fn test_json_file() {
        let file = config_file(
            ".json",
            r#"{"debug": true, "instances": {"main": {"api_key": "abc123", "endpoint": "wss://localhost/chat"}}}"#,
        );
        let path = file.path().to_str().unwrap();
        let args = Args::parse_from(["capi-host", "--config-file", path])
            .resolve()
            .unwrap();
        assert!(args.debug);
        assert_eq!(args.instances["main"].endpoint, "wss://localhost/chat");
        assert_eq!(args.instances["main"].trigger, "!");
    }

    #[test]
    fn test_instance_needs_api_key() {
        let file = config_file(".yaml", "instances:\n  main:\n    trigger: \"!\"\n");
        let path = file.path().to_str().unwrap();
        assert!(
            Args::parse_from(["capi-host", "--config-file", path])
                .resolve()
                .is_err()
        );
    }
}
