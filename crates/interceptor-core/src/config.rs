use std::{
    collections::HashMap,
    fmt::Display,
    str::FromStr,
};

use thiserror::Error;

/// Key/value configuration of a single section.
#[derive(Debug, Clone, Default)]
pub struct SectionConfig {
    inner: HashMap<String, String>,
}

#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("field {field} is required")]
    RequiredValue { field: String },
    #[error("{value} is not a valid value for field {field}: {err}")]
    InvalidValue {
        field: String,
        value: String,
        err: String,
    },
}

impl SectionConfig {
    /// Inserts a new configuration value.
    pub fn insert(&mut self, key: String, value: String) -> Option<String> {
        self.inner.insert(key, value)
    }

    /// Returns a typed configuration value.
    pub fn required<T>(&self, config_name: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        <T as FromStr>::Err: Display,
    {
        match self.inner.get(config_name) {
            None => Err(ConfigError::RequiredValue {
                field: config_name.to_string(),
            }),
            Some(value) => parse(value, config_name),
        }
    }

    /// Returns an optional typed configuration value.
    pub fn optional<T>(&self, config_name: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        <T as FromStr>::Err: Display,
    {
        self.inner
            .get(config_name)
            .map(|value| parse(value, config_name))
            .transpose()
    }

    /// Returns a typed configuration value, or `default` if the field is missing.
    pub fn with_default<T>(&self, config_name: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        <T as FromStr>::Err: Display,
    {
        Ok(self.optional(config_name)?.unwrap_or(default))
    }

    /// Return a comma separed list of values. Return empty vector if field is missing.
    pub fn get_list<T>(&self, config_name: &str) -> Result<Vec<T>, ConfigError>
    where
        T: FromStr,
        <T as FromStr>::Err: Display,
    {
        self.inner
            .get(config_name)
            .iter()
            .flat_map(|config| config.split(','))
            .filter(|item| !item.trim().is_empty())
            .map(|item| parse(item.trim(), config_name))
            .collect()
    }

    /// Like [`SectionConfig::get_list`], returning `default` if the field is missing.
    pub fn get_list_with_default<T>(
        &self,
        config_name: &str,
        default: Vec<T>,
    ) -> Result<Vec<T>, ConfigError>
    where
        T: FromStr,
        <T as FromStr>::Err: Display,
    {
        if self.inner.contains_key(config_name) {
            self.get_list(config_name)
        } else {
            Ok(default)
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SectionConfig {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            inner: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

fn parse<T>(value: &str, config_name: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    <T as FromStr>::Err: Display,
{
    T::from_str(value.trim()).map_err(|err| ConfigError::InvalidValue {
        field: config_name.to_string(),
        value: value.to_string(),
        err: err.to_string(),
    })
}

/// Size of the operation table and the ids reserved by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Valid operation ids are `1..max_operations`
    pub max_operations: usize,
    /// Operation serving the administrative protocol. It can never be intercepted.
    pub admin_operation: usize,
    /// Operation notifying process termination.
    pub exit_operation: usize,
}

/// Default table size, enough for every syscall of the supported platforms.
pub const DEFAULT_MAX_OPERATIONS: usize = 512;
pub const DEFAULT_ADMIN_OPERATION: usize = 0;
/// `exit_group` on x86_64
pub const DEFAULT_EXIT_OPERATION: usize = 231;

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_operations: DEFAULT_MAX_OPERATIONS,
            admin_operation: DEFAULT_ADMIN_OPERATION,
            exit_operation: DEFAULT_EXIT_OPERATION,
        }
    }
}

impl TryFrom<&SectionConfig> for RegistryConfig {
    type Error = ConfigError;

    fn try_from(config: &SectionConfig) -> Result<Self, Self::Error> {
        let max_operations = config.with_default("max_operations", DEFAULT_MAX_OPERATIONS)?;
        let admin_operation = config.with_default("admin_operation", DEFAULT_ADMIN_OPERATION)?;
        let exit_operation = config.with_default("exit_operation", DEFAULT_EXIT_OPERATION)?;

        for (field, value) in [
            ("admin_operation", admin_operation),
            ("exit_operation", exit_operation),
        ] {
            if value >= max_operations {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: value.to_string(),
                    err: format!("must be lower than max_operations ({max_operations})"),
                });
            }
        }
        if admin_operation == exit_operation {
            return Err(ConfigError::InvalidValue {
                field: "exit_operation".to_string(),
                value: exit_operation.to_string(),
                err: "must differ from admin_operation".to_string(),
            });
        }

        Ok(Self {
            max_operations,
            admin_operation,
            exit_operation,
        })
    }
}
