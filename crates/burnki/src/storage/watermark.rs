//! Watermark persisted in the Burnki settings file

use anyhow::{Context, Result, bail};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use super::WatermarkStore;
use crate::config::{CONFIG_FILE, Settings};
use crate::models::Watermark;

/// Settings key holding the watermark
const WATERMARK_KEY: &str = "last_sync_timestamp";

/// Stores the watermark as `last_sync_timestamp` in the settings file
///
/// Only that key is rewritten; every other key in the file is preserved
/// as-is, including ones Burnki doesn't know about.
pub struct ConfigWatermarkStore {
    path: PathBuf,
}

impl ConfigWatermarkStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store backed by the default settings file
    pub fn default_location() -> Result<Self> {
        let path = Settings::default_config_path()
            .with_context(|| format!("Could not determine location of {}", CONFIG_FILE))?;
        Ok(Self::new(path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_object(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        match config::load_json_file::<Value>(&self.path)? {
            Value::Object(map) => Ok(map),
            _ => bail!(
                "Settings file {} is not a JSON object",
                self.path.display()
            ),
        }
    }
}

impl WatermarkStore for ConfigWatermarkStore {
    fn load_watermark(&self) -> Result<Watermark> {
        let settings = self.read_object()?;
        match settings.get(WATERMARK_KEY) {
            None | Some(Value::Null) => Ok(Watermark::empty()),
            Some(Value::String(value)) => Watermark::parse(value)
                .with_context(|| format!("Invalid {} '{}'", WATERMARK_KEY, value)),
            Some(other) => bail!("Invalid {}: expected a string, got {}", WATERMARK_KEY, other),
        }
    }

    fn save_watermark(&self, watermark: Watermark) -> Result<()> {
        let mut settings = self.read_object()?;
        settings.insert(
            WATERMARK_KEY.to_string(),
            Value::String(watermark.to_api_string()),
        );
        config::save_json_file(&self.path, &Value::Object(settings))
    }
}
