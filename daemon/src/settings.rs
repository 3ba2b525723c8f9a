use anyhow::{Context, Result};
use log::error;
use serde::{Deserialize, Serialize};
use std::fs::{create_dir_all, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct SettingsHandle {
    path: PathBuf,
    settings: Arc<RwLock<Settings>>,
}

impl SettingsHandle {
    pub async fn load(path: PathBuf) -> Result<SettingsHandle> {
        let settings = Settings::read(&path)?;
        let handle = SettingsHandle {
            path,
            settings: Arc::new(RwLock::new(settings)),
        };
        handle.save().await;
        Ok(handle)
    }

    pub async fn save(&self) {
        let settings = self.settings.read().await;
        if let Err(e) = settings.write(&self.path) {
            error!(
                "Couldn't save settings to {}: {}",
                self.path.to_string_lossy(),
                e
            );
        }
    }

    pub async fn get_polling_delay(&self) -> u64 {
        self.settings.read().await.polling_delay_ms
    }

    pub async fn get_preferred_serial(&self) -> Option<String> {
        self.settings.read().await.preferred_serial.clone()
    }

    pub async fn set_preferred_serial(&self, serial: Option<String>) {
        self.settings.write().await.preferred_serial = serial;
    }

    pub async fn get_event_buffer(&self) -> usize {
        self.settings.read().await.event_buffer
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    polling_delay_ms: u64,
    preferred_serial: Option<String>,
    event_buffer: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            polling_delay_ms: 20,
            preferred_serial: None,
            event_buffer: 1024,
        }
    }
}

impl Settings {
    pub fn read(path: &Path) -> Result<Settings> {
        match File::open(path) {
            Ok(reader) => serde_json::from_reader(reader).context(format!(
                "Could not parse daemon settings file at {}",
                path.to_string_lossy()
            )),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(Settings::default()),
            Err(error) => Err(error).context(format!(
                "Could not open daemon settings file for reading at {}",
                path.to_string_lossy()
            )),
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if let Err(e) = create_dir_all(parent) {
                if e.kind() != ErrorKind::AlreadyExists {
                    return Err(e).context(format!(
                        "Could not create settings directory at {}",
                        parent.to_string_lossy()
                    ))?;
                }
            }
        }
        let writer = File::create(path).context(format!(
            "Could not open daemon settings file for writing at {}",
            path.to_string_lossy()
        ))?;
        serde_json::to_writer_pretty(writer, self).context(format!(
            "Could not write to daemon settings file at {}",
            path.to_string_lossy()
        ))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("hubtool-settings-{}-{}", std::process::id(), name))
            .join("settings.json")
    }

    #[test]
    fn missing_file_gives_defaults() {
        let settings = Settings::read(&scratch("missing")).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.polling_delay_ms, 20);
        assert_eq!(settings.event_buffer, 1024);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let settings: Settings = serde_json::from_str(r#"{ "polling_delay_ms": 250 }"#).unwrap();
        assert_eq!(settings.polling_delay_ms, 250);
        assert_eq!(settings.preferred_serial, None);
        assert_eq!(settings.event_buffer, 1024);
    }

    #[tokio::test]
    async fn preferred_serial_survives_a_reload() {
        let path = scratch("reload");
        let handle = SettingsHandle::load(path.clone()).await.unwrap();
        handle
            .set_preferred_serial(Some(String::from("0x0000BEEF")))
            .await;
        handle.save().await;

        let reloaded = SettingsHandle::load(path.clone()).await.unwrap();
        assert_eq!(
            reloaded.get_preferred_serial().await.as_deref(),
            Some("0x0000BEEF")
        );
        assert_eq!(reloaded.get_polling_delay().await, 20);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
