use std::{
    collections::HashMap,
    fs::File,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use interceptor_core::SectionConfig;

const DEFAULT_CONFIG_FILE: &str = "/var/lib/interceptor/interceptor.ini";

/// Daemon configuration, one [`SectionConfig`] per `INI` section.
#[derive(Debug, Clone, Default)]
pub struct InterceptorConfig {
    config_file: Option<PathBuf>,
    sections: HashMap<String, SectionConfig>,
}

impl InterceptorConfig {
    /// Load the default file, creating an empty one if missing.
    pub fn new() -> Result<Self> {
        let config_file = PathBuf::from(DEFAULT_CONFIG_FILE);
        if !config_file.exists() {
            if let Some(prefix) = config_file.parent() {
                std::fs::create_dir_all(prefix)
                    .with_context(|| format!("Error creating {prefix:?}"))?;
            }
            File::create(&config_file)
                .with_context(|| format!("Error creating {config_file:?}"))?;
        }
        Self::from_config_file(config_file)
    }

    /// Load a custom file, which must exist.
    pub fn with_custom_file(config_file: &str) -> Result<Self> {
        let config_file = PathBuf::from(config_file);
        if !config_file.exists() {
            bail!("Configuration file {} not found", config_file.display());
        }
        Self::from_config_file(config_file)
    }

    fn from_config_file(config_file: PathBuf) -> Result<Self> {
        let conf = ini::Ini::load_from_file(&config_file)
            .with_context(|| format!("Error loading configuration from {config_file:?}"))?;
        Ok(Self {
            config_file: Some(config_file),
            sections: collect_sections(&conf),
        })
    }

    /// Parse configuration from `INI` text.
    pub fn from_ini_str(text: &str) -> Result<Self> {
        let conf = ini::Ini::load_from_str(text).context("Error parsing configuration")?;
        Ok(Self {
            config_file: None,
            sections: collect_sections(&conf),
        })
    }

    /// File the configuration was loaded from.
    pub fn config_file(&self) -> Option<&Path> {
        self.config_file.as_deref()
    }

    /// Configuration of a section. Missing sections are empty.
    pub fn get_section(&self, section: &str) -> SectionConfig {
        self.sections.get(section).cloned().unwrap_or_default()
    }
}

fn collect_sections(conf: &ini::Ini) -> HashMap<String, SectionConfig> {
    let mut sections: HashMap<String, SectionConfig> = HashMap::new();
    for (section, prop) in conf {
        if let Some(section) = section {
            let config = sections.entry(section.to_string()).or_default();
            for (key, value) in prop.iter() {
                log::debug!("{}.{}={}", section, key, value);
                config.insert(key.to_string(), value.to_string());
            }
        }
    }
    sections
}
