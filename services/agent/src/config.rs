//! Sectioned, writable agent configuration.
//!
//! The config file is a TOML document of sections holding string values
//! only. Option names end with a type suffix (`_int`, `_bool`, `_float`,
//! `_file`, `_ip`, `_port`) and the typed getters coerce accordingly, so
//! the file stays the single place where typing is decided.
//!
//! The store is writable: first-boot secret generation and the
//! `PATCH /system/config` endpoint both persist changes back to the file.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use thiserror::Error;
use tracing::warn;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to write config file '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config file '{path}' contains parsing errors: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("missing option '{section}.{option}' in the configuration")]
    Missing { section: String, option: String },

    #[error("invalid value '{value}' for option '{section}.{option}' (expected {expected})")]
    InvalidValue {
        section: String,
        option: String,
        value: String,
        expected: &'static str,
    },
}

/// A config value after type-suffix coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    File(PathBuf),
    Ip(IpAddr),
    Port(u16),
}

/// Coerce a raw string by the option name's type suffix.
pub fn retype_value(option: &str, value: &str) -> Result<TypedValue, &'static str> {
    let suffix = option.rsplit('_').next().unwrap_or("");
    match suffix {
        "bool" => Ok(TypedValue::Bool(matches!(
            value.to_lowercase().as_str(),
            "true" | "1" | "t" | "y" | "yes" | "yeah"
        ))),
        "int" => value
            .parse::<i64>()
            .map(TypedValue::Int)
            .map_err(|_| "integer"),
        "float" => value
            .parse::<f64>()
            .map(TypedValue::Float)
            .map_err(|_| "float"),
        "file" => Ok(TypedValue::File(PathBuf::from(value))),
        "ip" => value.parse::<IpAddr>().map(TypedValue::Ip).map_err(|_| "ip address"),
        "port" => match value.parse::<u16>() {
            Ok(port) if port >= 1 => Ok(TypedValue::Port(port)),
            _ => Err("port (1-65535)"),
        },
        _ => Ok(TypedValue::Str(value.to_string())),
    }
}

/// In-memory view of the config file, shared across a task.
pub struct ConfigStore {
    path: PathBuf,
    table: RwLock<toml::Table>,
}

impl ConfigStore {
    /// Load the config file. A missing file starts empty and is created on
    /// the first write, so a fresh persistent directory bootstraps itself.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let table = if path.is_file() {
            let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            content.parse::<toml::Table>().map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?
        } else {
            warn!(path = %path.display(), "Config file does not exist yet, starting empty");
            toml::Table::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            table: RwLock::new(table),
        })
    }

    /// Raw string value of an option, if present.
    pub fn get(&self, section: &str, option: &str) -> Option<String> {
        let table = self.table.read().expect("config lock");
        table
            .get(section)
            .and_then(toml::Value::as_table)
            .and_then(|t| t.get(option))
            .and_then(toml::Value::as_str)
            .map(|s| s.to_string())
    }

    pub fn exists(&self, section: &str, option: &str) -> bool {
        self.get(section, option).is_some()
    }

    /// Raw string value of an option that must be present.
    pub fn require(&self, section: &str, option: &str) -> ConfigResult<String> {
        self.get(section, option).ok_or_else(|| ConfigError::Missing {
            section: section.to_string(),
            option: option.to_string(),
        })
    }

    fn retyped(&self, section: &str, option: &str) -> ConfigResult<TypedValue> {
        let value = self.require(section, option)?;
        retype_value(option, &value).map_err(|expected| ConfigError::InvalidValue {
            section: section.to_string(),
            option: option.to_string(),
            value,
            expected,
        })
    }

    fn type_mismatch(&self, section: &str, option: &str, expected: &'static str) -> ConfigError {
        ConfigError::InvalidValue {
            section: section.to_string(),
            option: option.to_string(),
            value: self.get(section, option).unwrap_or_default(),
            expected,
        }
    }

    pub fn int(&self, section: &str, option: &str) -> ConfigResult<i64> {
        match self.retyped(section, option)? {
            TypedValue::Int(v) => Ok(v),
            _ => Err(self.type_mismatch(section, option, "integer")),
        }
    }

    pub fn float(&self, section: &str, option: &str) -> ConfigResult<f64> {
        match self.retyped(section, option)? {
            TypedValue::Float(v) => Ok(v),
            _ => Err(self.type_mismatch(section, option, "float")),
        }
    }

    pub fn boolean(&self, section: &str, option: &str) -> ConfigResult<bool> {
        match self.retyped(section, option)? {
            TypedValue::Bool(v) => Ok(v),
            _ => Err(self.type_mismatch(section, option, "bool")),
        }
    }

    pub fn file(&self, section: &str, option: &str) -> ConfigResult<PathBuf> {
        match self.retyped(section, option)? {
            TypedValue::File(v) => Ok(v),
            _ => Err(self.type_mismatch(section, option, "file path")),
        }
    }

    pub fn ip(&self, section: &str, option: &str) -> ConfigResult<IpAddr> {
        match self.retyped(section, option)? {
            TypedValue::Ip(v) => Ok(v),
            _ => Err(self.type_mismatch(section, option, "ip address")),
        }
    }

    pub fn port(&self, section: &str, option: &str) -> ConfigResult<u16> {
        match self.retyped(section, option)? {
            TypedValue::Port(v) => Ok(v),
            _ => Err(self.type_mismatch(section, option, "port (1-65535)")),
        }
    }

    fn collect_section(section_table: &toml::Table) -> BTreeMap<String, String> {
        let mut options = BTreeMap::new();
        for (name, value) in section_table {
            if let Some(s) = value.as_str() {
                options.insert(name.clone(), s.to_string());
            }
        }
        options
    }

    /// All options of one section.
    pub fn section_options(&self, section: &str) -> BTreeMap<String, String> {
        let table = self.table.read().expect("config lock");
        table
            .get(section)
            .and_then(toml::Value::as_table)
            .map(Self::collect_section)
            .unwrap_or_default()
    }

    /// All options of all sections.
    pub fn all_options(&self) -> BTreeMap<String, BTreeMap<String, String>> {
        let table = self.table.read().expect("config lock");
        let mut sections = BTreeMap::new();
        for (section, value) in table.iter() {
            if let Some(section_table) = value.as_table() {
                sections.insert(section.clone(), Self::collect_section(section_table));
            }
        }
        sections
    }

    /// Set one option and persist the file.
    pub fn set(&self, section: &str, option: &str, value: &str) -> ConfigResult<()> {
        {
            let mut table = self.table.write().expect("config lock");
            let section_table = table
                .entry(section.to_string())
                .or_insert_with(|| toml::Value::Table(toml::Table::new()));
            if let Some(section_table) = section_table.as_table_mut() {
                section_table.insert(option.to_string(), toml::Value::String(value.to_string()));
            }
        }
        self.save()
    }

    /// Apply many options at once. Returns `"added"` or `"updated"` per
    /// option, mirroring what the config endpoints report.
    pub fn set_many(
        &self,
        options: &BTreeMap<String, BTreeMap<String, String>>,
    ) -> ConfigResult<BTreeMap<String, BTreeMap<String, String>>> {
        let mut changes = BTreeMap::new();
        {
            let mut table = self.table.write().expect("config lock");
            for (section, section_options) in options {
                let section_changes: &mut BTreeMap<String, String> =
                    changes.entry(section.clone()).or_default();
                let section_table = table
                    .entry(section.clone())
                    .or_insert_with(|| toml::Value::Table(toml::Table::new()));
                let Some(section_table) = section_table.as_table_mut() else {
                    continue;
                };
                for (option, value) in section_options {
                    let verdict = if section_table.contains_key(option) {
                        "updated"
                    } else {
                        "added"
                    };
                    section_changes.insert(option.clone(), verdict.to_string());
                    section_table.insert(option.clone(), toml::Value::String(value.clone()));
                }
            }
        }
        self.save()?;
        Ok(changes)
    }

    fn save(&self) -> ConfigResult<()> {
        let rendered = {
            let table = self.table.read().expect("config lock");
            toml::to_string_pretty(&*table).map_err(|e| ConfigError::Parse {
                path: self.path.clone(),
                message: e.to_string(),
            })?
        };
        std::fs::write(&self.path, rendered).map_err(|source| ConfigError::Write {
            path: self.path.clone(),
            source,
        })
    }
}
