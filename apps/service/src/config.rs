use std::{env, fmt, fs, io, path};

use pinger::SiteConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read {}: {source}", .path.display())]
    ReadFailed { path: path::PathBuf, source: io::Error },
    #[error("failed to write {}: {source}", .path.display())]
    WriteFailed { path: path::PathBuf, source: io::Error },
    #[error("failed to parse {}: {source}", .path.display())]
    ParseFailed { path: path::PathBuf, source: toml::de::Error },
    #[error("failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("no config path available: set XDG_CONFIG_HOME or HOME, or pass --config")]
    ConfigPathUnavailable,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub schedule: ScheduleConfig,
    pub site: SiteConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// libsql database file holding incident history and the snapshot cache.
    pub path: path::PathBuf,
    pub max_connections: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "pinger.db".into(), max_connections: 4 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Seconds between cycles in `watch` mode.
    pub interval_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/pinger/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, Error> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(Error::ConfigPathUnavailable);
    };

    Ok(path.join("pinger/config.toml"))
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_title_2 = write_title_indented(2);
        let write_1 = write_indented(1);
        let write_2 = write_indented(2);

        let site = &self.site;

        writeln!(f, "Current Internal Configuration State:")?;
        write_title_1(f, "Database")?;
        write_1(f, "Path", &self.database.path.display())?;
        write_1(f, "Max Connections", &self.database.max_connections)?;
        write_title_1(f, "Schedule")?;
        write_1(f, "Interval (s)", &self.schedule.interval_secs)?;
        write_title_1(f, "Site")?;
        write_1(f, "Identifier", &site.site)?;
        write_1(f, "Timeout (s)", &site.timeout_secs)?;
        write_1(f, "Notifications", &site.notifications_enabled)?;
        write_1(f, "Delivery Policy", &format!("{:?}", site.delivery_policy))?;

        write_title_2(f, "Targets")?;
        if site.targets.is_empty() {
            write_2(f, "(none)", &"add [[site.targets]] entries")?;
        }
        for target in &site.targets {
            write_2(f, &target.name, &target.kind)?;
        }

        write_title_2(f, "Subscribers")?;
        for subscriber in &site.subscribers {
            write_2(f, &subscriber.destination, &subscriber.transport)?;
        }

        if let Some(smtp) = &site.smtp {
            write_title_2(f, "SMTP")?;
            write_2(f, "Relay", &format!("{}:{}", smtp.host, smtp.port))?;
            write_2(f, "From", &smtp.return_email)?;
            write_2(f, "Login", &smtp.user.as_deref().unwrap_or("(none)"))?;
        }

        if let Some(twilio) = &site.twilio {
            write_title_2(f, "Twilio")?;
            write_2(f, "Account", &twilio.account_sid)?;
            write_2(f, "Messaging Service", &twilio.messaging_service_sid)?;
        }

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/pinger/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, Error> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|source| Error::ReadFailed { path: config_path.clone(), source })?;
            toml::from_str(raw_string.as_str())
                .map_err(|source| Error::ParseFailed { path: config_path, source })
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            tracing::info!(path = %config_path.display(), "Wrote default configuration");
            Ok(config)
        }
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), Error> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| Error::WriteFailed { path: parent.to_path_buf(), source })?;
        }

        fs::write(path, config_str)
            .map_err(|source| Error::WriteFailed { path: path.to_path_buf(), source })
    }
}
