use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::warn;

pub const DEFAULT_PORT: u16 = 3847;
pub const ENV_PREFIX: &str = "TELEMETRY_";
pub const DATA_DIR_ENV: &str = "TELEMETRY_DATA_DIR";

const DATA_DIR_NAME: &str = "agent-telemetry";
const DATABASE_FILE_NAME: &str = "telemetry.sqlite";

/// Every option that can be set from the config file or the environment,
/// as camelCase dotted paths.
pub const OPTION_KEYS: &[&str] = &[
    "databasePath",
    "archiveDir",
    "aggregationIntervalMs",
    "archiveAfterDays",
    "deleteArchivesAfterDays",
    "transcript.useFsWatch",
    "transcript.projectsDir",
    "transcript.fallbackPollIntervalMs",
    "plans.activeDir",
    "plans.completeDir",
    "plans.watchManifest",
    "collector.flushIntervalMs",
    "collector.maxBufferSize",
    "stream.heartbeatMs",
    "rateLimit.maxRequests",
    "rateLimit.windowMs",
    "port",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptConfig {
    pub use_fs_watch: bool,
    pub projects_dir: PathBuf,
    pub fallback_poll_interval: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlansConfig {
    pub active_dir: PathBuf,
    pub complete_dir: PathBuf,
    pub watch_manifest: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorConfig {
    pub flush_interval: Duration,
    pub max_buffer_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    pub heartbeat: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub home_dir: PathBuf,
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
    pub archive_dir: PathBuf,
    pub aggregation_interval: Duration,
    pub archive_after_days: u32,
    pub delete_archives_after_days: u32,
    pub transcript: TranscriptConfig,
    pub plans: PlansConfig,
    pub collector: CollectorConfig,
    pub stream: StreamConfig,
    pub rate_limit: RateLimitConfig,
    pub port: u16,
}

impl TelemetryConfig {
    pub fn defaults(home_dir: &Path, data_dir: PathBuf) -> Self {
        Self {
            home_dir: home_dir.to_path_buf(),
            database_path: data_dir.join(DATABASE_FILE_NAME),
            archive_dir: data_dir.join("archive"),
            data_dir,
            aggregation_interval: Duration::from_millis(60_000),
            archive_after_days: 30,
            delete_archives_after_days: 90,
            transcript: TranscriptConfig {
                use_fs_watch: true,
                projects_dir: home_dir.join(".claude").join("projects"),
                fallback_poll_interval: Duration::from_millis(5_000),
            },
            plans: PlansConfig {
                active_dir: PathBuf::from("dev/active"),
                complete_dir: PathBuf::from("dev/complete"),
                watch_manifest: true,
            },
            collector: CollectorConfig {
                flush_interval: Duration::from_millis(1_000),
                max_buffer_size: 100,
            },
            stream: StreamConfig {
                heartbeat: Duration::from_millis(15_000),
            },
            rate_limit: RateLimitConfig {
                max_requests: 10,
                window: Duration::from_millis(60_000),
            },
            port: DEFAULT_PORT,
        }
    }

    /// Defaults, then the config file, then `TELEMETRY_*` variables read
    /// through `lookup`. Never fails; bad values are logged and skipped.
    pub fn load<F>(file: Option<&toml::Table>, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let home_dir = home_dir(&lookup);
        let data_dir = resolve_data_dir(&lookup, &home_dir);
        let mut config = Self::defaults(&home_dir, data_dir);
        if let Some(table) = file {
            config.apply_toml(table);
        }
        config.apply_env(lookup);
        config
    }

    pub fn exports_dir(&self) -> PathBuf {
        self.data_dir.join("exports")
    }

    pub fn plan_roots(&self) -> Vec<PathBuf> {
        vec![self.plans.active_dir.clone(), self.plans.complete_dir.clone()]
    }

    pub fn apply_toml(&mut self, table: &toml::Table) {
        for key in OPTION_KEYS {
            if let Some(raw) = toml_option(table, key) {
                self.apply_value(key, &raw, "config file");
            }
        }
    }

    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for key in OPTION_KEYS {
            if let Some(raw) = lookup(&env_var_name(key)) {
                self.apply_value(key, &raw, "environment");
            }
        }
    }

    fn apply_value(&mut self, key: &str, raw: &str, source: &'static str) {
        if let Err(reason) = self.set(key, raw) {
            warn!(
                option = key,
                value = raw,
                source,
                reason = %reason,
                "ignoring invalid configuration value"
            );
        }
    }

    /// Sets one option from its textual form, leaving the current value in
    /// place when `raw` does not parse.
    pub fn set(&mut self, key: &str, raw: &str) -> Result<(), String> {
        let raw = raw.trim();
        match key {
            "databasePath" => self.database_path = parse_path(raw, &self.home_dir)?,
            "archiveDir" => self.archive_dir = parse_path(raw, &self.home_dir)?,
            "aggregationIntervalMs" => self.aggregation_interval = parse_millis(raw)?,
            "archiveAfterDays" => self.archive_after_days = parse_days(raw)?,
            "deleteArchivesAfterDays" => self.delete_archives_after_days = parse_days(raw)?,
            "transcript.useFsWatch" => self.transcript.use_fs_watch = parse_bool(raw)?,
            "transcript.projectsDir" => {
                self.transcript.projects_dir = parse_path(raw, &self.home_dir)?
            }
            "transcript.fallbackPollIntervalMs" => {
                self.transcript.fallback_poll_interval = parse_millis(raw)?
            }
            "plans.activeDir" => self.plans.active_dir = parse_path(raw, &self.home_dir)?,
            "plans.completeDir" => self.plans.complete_dir = parse_path(raw, &self.home_dir)?,
            "plans.watchManifest" => self.plans.watch_manifest = parse_bool(raw)?,
            "collector.flushIntervalMs" => self.collector.flush_interval = parse_millis(raw)?,
            "collector.maxBufferSize" => {
                self.collector.max_buffer_size = parse_positive(raw)? as usize
            }
            "stream.heartbeatMs" => self.stream.heartbeat = parse_millis(raw)?,
            "rateLimit.maxRequests" => self.rate_limit.max_requests = parse_positive(raw)?,
            "rateLimit.windowMs" => self.rate_limit.window = parse_millis(raw)?,
            "port" => {
                self.port = raw
                    .parse::<u16>()
                    .map_err(|_| format!("{raw} is not a port number"))?
            }
            other => return Err(format!("unknown option {other}")),
        }
        Ok(())
    }
}

/// `rateLimit.maxRequests` becomes `TELEMETRY_RATE_LIMIT_MAX_REQUESTS`.
pub fn env_var_name(key: &str) -> String {
    let mut name = String::from(ENV_PREFIX);
    for (index, part) in key.split('.').enumerate() {
        if index > 0 {
            name.push('_');
        }
        for ch in part.chars() {
            if ch.is_ascii_uppercase() {
                name.push('_');
            }
            name.push(ch.to_ascii_uppercase());
        }
    }
    name
}

pub fn expand_home(raw: &str, home_dir: &Path) -> PathBuf {
    if raw == "~" {
        return home_dir.to_path_buf();
    }
    match raw.strip_prefix("~/") {
        Some(rest) => home_dir.join(rest),
        None => PathBuf::from(raw),
    }
}

fn home_dir<F>(lookup: &F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    lookup("HOME")
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// `$TELEMETRY_DATA_DIR`, else `$XDG_DATA_HOME/agent-telemetry`, else
/// `~/.local/share/agent-telemetry`.
pub fn resolve_data_dir<F>(lookup: &F, home_dir: &Path) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
    if let Some(dir) = non_empty(DATA_DIR_ENV) {
        return expand_home(dir.trim(), home_dir);
    }
    if let Some(xdg) = non_empty("XDG_DATA_HOME") {
        return expand_home(xdg.trim(), home_dir).join(DATA_DIR_NAME);
    }
    home_dir.join(".local").join("share").join(DATA_DIR_NAME)
}

fn toml_option(table: &toml::Table, key: &str) -> Option<String> {
    let mut parts = key.split('.');
    let mut value = table.get(parts.next()?)?;
    for part in parts {
        value = value.as_table()?.get(part)?;
    }
    Some(match value {
        toml::Value::String(text) => text.clone(),
        toml::Value::Integer(number) => number.to_string(),
        toml::Value::Float(number) => number.to_string(),
        toml::Value::Boolean(flag) => flag.to_string(),
        other => other.to_string(),
    })
}

fn parse_bool(raw: &str) -> Result<bool, String> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(format!("{raw} is not a boolean")),
    }
}

fn parse_positive(raw: &str) -> Result<u32, String> {
    match raw.parse::<u32>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(format!("{raw} is not a positive integer")),
    }
}

fn parse_days(raw: &str) -> Result<u32, String> {
    parse_positive(raw)
}

fn parse_millis(raw: &str) -> Result<Duration, String> {
    match raw.parse::<u64>() {
        Ok(value) if value > 0 => Ok(Duration::from_millis(value)),
        _ => Err(format!("{raw} is not a positive number of milliseconds")),
    }
}

fn parse_path(raw: &str, home_dir: &Path) -> Result<PathBuf, String> {
    if raw.is_empty() {
        return Err("path must not be empty".to_string());
    }
    if raw.contains('\0') {
        return Err("path contains a null byte".to_string());
    }
    Ok(expand_home(raw, home_dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn env_names_are_upper_snake_case() {
        assert_eq!(env_var_name("databasePath"), "TELEMETRY_DATABASE_PATH");
        assert_eq!(
            env_var_name("transcript.useFsWatch"),
            "TELEMETRY_TRANSCRIPT_USE_FS_WATCH"
        );
        assert_eq!(
            env_var_name("rateLimit.maxRequests"),
            "TELEMETRY_RATE_LIMIT_MAX_REQUESTS"
        );
        assert_eq!(env_var_name("port"), "TELEMETRY_PORT");
    }

    #[test]
    fn defaults_hang_off_the_data_dir() {
        let config = TelemetryConfig::load(None, env(&[("HOME", "/home/dev")]));
        let data_dir = PathBuf::from("/home/dev/.local/share/agent-telemetry");
        assert_eq!(config.data_dir, data_dir);
        assert_eq!(config.database_path, data_dir.join("telemetry.sqlite"));
        assert_eq!(config.archive_dir, data_dir.join("archive"));
        assert_eq!(
            config.transcript.projects_dir,
            PathBuf::from("/home/dev/.claude/projects")
        );
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.collector.max_buffer_size, 100);
        assert!(config.transcript.use_fs_watch);
    }

    #[test]
    fn data_dir_prefers_explicit_then_xdg() {
        let home = Path::new("/home/dev");
        let explicit = env(&[("TELEMETRY_DATA_DIR", "~/tel"), ("XDG_DATA_HOME", "/xdg")]);
        assert_eq!(resolve_data_dir(&explicit, home), PathBuf::from("/home/dev/tel"));
        let xdg = env(&[("XDG_DATA_HOME", "/xdg")]);
        assert_eq!(
            resolve_data_dir(&xdg, home),
            PathBuf::from("/xdg/agent-telemetry")
        );
    }

    #[test]
    fn environment_overrides_file() {
        let table: toml::Table = toml::from_str(
            r#"
            port = 4000
            archiveAfterDays = 7

            [transcript]
            useFsWatch = false
            fallbackPollIntervalMs = 250

            [rateLimit]
            maxRequests = 3
            "#,
        )
        .expect("toml");
        let config = TelemetryConfig::load(
            Some(&table),
            env(&[
                ("HOME", "/home/dev"),
                ("TELEMETRY_PORT", "4100"),
                ("TELEMETRY_TRANSCRIPT_USE_FS_WATCH", "yes"),
            ]),
        );
        assert_eq!(config.port, 4100);
        assert_eq!(config.archive_after_days, 7);
        assert!(config.transcript.use_fs_watch);
        assert_eq!(
            config.transcript.fallback_poll_interval,
            Duration::from_millis(250)
        );
        assert_eq!(config.rate_limit.max_requests, 3);
    }

    #[test]
    fn invalid_values_keep_the_previous_layer() {
        let table: toml::Table = toml::from_str(
            r#"
            aggregationIntervalMs = 5000
            collector = { maxBufferSize = 0 }
            "#,
        )
        .expect("toml");
        let config = TelemetryConfig::load(
            Some(&table),
            env(&[
                ("HOME", "/home/dev"),
                ("TELEMETRY_AGGREGATION_INTERVAL_MS", "soon"),
                ("TELEMETRY_PLANS_WATCH_MANIFEST", "maybe"),
                ("TELEMETRY_PORT", "70000"),
                ("TELEMETRY_DATABASE_PATH", "   "),
            ]),
        );
        assert_eq!(config.aggregation_interval, Duration::from_millis(5000));
        assert_eq!(config.collector.max_buffer_size, 100);
        assert!(config.plans.watch_manifest);
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.database_path.ends_with("telemetry.sqlite"));
    }

    #[test]
    fn paths_expand_the_home_prefix() {
        let mut config = TelemetryConfig::defaults(Path::new("/home/dev"), PathBuf::from("/d"));
        config.set("plans.activeDir", "~/plans/active").expect("set");
        assert_eq!(config.plans.active_dir, PathBuf::from("/home/dev/plans/active"));
        config.set("archiveDir", "/var/archive").expect("set");
        assert_eq!(config.archive_dir, PathBuf::from("/var/archive"));
        assert!(config.set("unknown.key", "1").is_err());
    }
}
