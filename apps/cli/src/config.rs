use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use telemetry_app::DEFAULT_PORT;
use tracing::warn;

const CONFIG_DIR_NAME: &str = "agent-telemetry";
const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    pub port: u16,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self { port: DEFAULT_PORT }
    }
}

#[derive(Debug, Clone)]
pub struct ConfigLoad {
    /// `None` when the file could not be read or parsed.
    pub table: Option<toml::Table>,
    pub file: PathBuf,
    pub created: bool,
}

/// Reads `config.toml`, writing the default one first if it is missing.
/// A file that exists but does not parse is logged and ignored so startup
/// continues on defaults and environment values.
pub fn load_or_create(dir: &Path) -> Result<ConfigLoad, String> {
    fs::create_dir_all(dir)
        .map_err(|err| format!("create config dir {}: {}", dir.display(), err))?;
    let file = dir.join(CONFIG_FILE_NAME);

    if file.exists() {
        let table = match fs::read_to_string(&file) {
            Ok(contents) => match contents.parse::<toml::Table>() {
                Ok(table) => Some(table),
                Err(err) => {
                    warn!(path = %file.display(), error = %err, "ignoring unparseable config file");
                    None
                }
            },
            Err(err) => {
                warn!(path = %file.display(), error = %err, "ignoring unreadable config file");
                None
            }
        };
        return Ok(ConfigLoad {
            table,
            file,
            created: false,
        });
    }

    let config = CliConfig::default();
    let contents =
        toml::to_string_pretty(&config).map_err(|err| format!("serialize config: {}", err))?;
    fs::write(&file, &contents)
        .map_err(|err| format!("write config {}: {}", file.display(), err))?;
    let table = contents
        .parse::<toml::Table>()
        .map_err(|err| format!("parse default config: {}", err))?;

    Ok(ConfigLoad {
        table: Some(table),
        file,
        created: true,
    })
}

/// `$XDG_CONFIG_HOME/agent-telemetry`, else `~/.config/agent-telemetry`.
pub fn config_dir<F>(lookup: F) -> Result<PathBuf, String>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
    if let Some(xdg) = non_empty("XDG_CONFIG_HOME") {
        return Ok(PathBuf::from(xdg).join(CONFIG_DIR_NAME));
    }
    let home = non_empty("HOME").ok_or_else(|| "resolve HOME: not set".to_string())?;
    Ok(PathBuf::from(home).join(".config").join(CONFIG_DIR_NAME))
}
