use std::fs;

use crate::config::TelemetryConfig;
use crate::error::Result;

pub fn ensure_data_dirs(config: &TelemetryConfig) -> Result<()> {
    fs::create_dir_all(&config.data_dir)?;
    if let Some(parent) = config.database_path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}
