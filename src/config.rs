use crate::errors::ConfigError;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    io::{Read, Write},
    path::{Path, PathBuf},
    time::Duration,
};

static EXAMPLE_CONFIG: &str = include_str!("templates/provbench.toml");

// ******** ******** ********
// **    CONFIGURATION     **
// ******** ******** ********
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    pub sweep: SweepConfig,
    #[serde(default)]
    pub bind_mount: BindMountConfig,
    #[serde(default)]
    pub file_copy: FileCopyConfig,
    #[serde(default)]
    pub pvc: PvcConfig,
}

impl Config {
    pub fn try_from_path(path: &Path) -> anyhow::Result<Config> {
        let mut config_str = String::new();
        fs::File::open(path)?.read_to_string(&mut config_str)?;
        Config::try_from_str(&config_str)
    }

    pub fn try_from_str(conf_str: &str) -> anyhow::Result<Config> {
        toml::from_str::<Config>(conf_str).map_err(|e| anyhow::anyhow!("TOML parsing error: {}", e))
    }

    pub fn write_example_to_file(path: &Path) -> anyhow::Result<File> {
        let mut file = File::create_new(path)?;
        File::write_all(&mut file, EXAMPLE_CONFIG.as_bytes())?;
        Ok(file)
    }
}

#[derive(Debug, Deserialize, PartialEq, Serialize, Clone)]
pub struct SweepConfig {
    /// Workload magnitudes to test, in the order they should run.
    pub sizes: Vec<u32>,
    #[serde(default = "default_repetitions")]
    pub repetitions: u32,
    #[serde(default = "default_readiness_timeout_secs")]
    pub readiness_timeout_secs: u64,
}

fn default_repetitions() -> u32 {
    5
}

fn default_readiness_timeout_secs() -> u64 {
    300
}

/// Upper bound on the readiness budget. The config field is an open
/// u64 and an absurd value would overflow deadline arithmetic; one day
/// is already far beyond any useful provisioning wait.
const MAX_READINESS_TIMEOUT_SECS: u64 = 86_400;

impl SweepConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sizes.is_empty() {
            return Err(ConfigError::EmptySizes);
        }
        if self.sizes.iter().any(|size| *size == 0) {
            return Err(ConfigError::ZeroSize);
        }
        if self.repetitions == 0 {
            return Err(ConfigError::ZeroRepetitions);
        }
        Ok(())
    }

    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.readiness_timeout_secs.min(MAX_READINESS_TIMEOUT_SECS))
    }
}

#[derive(Debug, Deserialize, PartialEq, Serialize, Clone)]
#[serde(default)]
pub struct BindMountConfig {
    pub base_dir: PathBuf,
}

impl Default for BindMountConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("/tmp/provbench/mounts"),
        }
    }
}

#[derive(Debug, Deserialize, PartialEq, Serialize, Clone)]
#[serde(default)]
pub struct FileCopyConfig {
    pub base_dir: PathBuf,
}

impl Default for FileCopyConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("/tmp/provbench/copies"),
        }
    }
}

#[derive(Debug, Deserialize, PartialEq, Serialize, Clone)]
#[serde(default)]
pub struct PvcConfig {
    pub namespace: String,
    pub capacity: String,
    pub host_path_root: PathBuf,
    pub kubectl_bin: String,
}

impl Default for PvcConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            capacity: "1Mi".to_string(),
            host_path_root: PathBuf::from("/tmp/provbench/volumes"),
            kubectl_bin: "kubectl".to_string(),
        }
    }
}

/// Writes an example config into the current directory.
pub fn init_config() -> anyhow::Result<()> {
    match Config::write_example_to_file(Path::new("./provbench.toml")) {
        Ok(_) => {
            println!("{}", "provbench.toml created!".green());
            Ok(())
        }
        Err(err) => {
            println!("{}\n{}", "Error creating config.".red(), err);
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn can_load_config_file() -> anyhow::Result<()> {
        let cfg = Config::try_from_path(Path::new("./fixtures/provbench.success.toml"))?;
        assert_eq!(cfg.sweep.sizes, vec![10, 50, 100]);
        assert_eq!(cfg.sweep.repetitions, 3);
        assert_eq!(cfg.sweep.readiness_timeout(), Duration::from_secs(120));
        assert_eq!(cfg.pvc.namespace, "bench");
        Ok(())
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() -> anyhow::Result<()> {
        let cfg = Config::try_from_str(
            r#"
            [sweep]
            sizes = [1]
            "#,
        )?;
        assert_eq!(cfg.sweep.repetitions, 5);
        assert_eq!(cfg.sweep.readiness_timeout_secs, 300);
        assert_eq!(cfg.bind_mount, BindMountConfig::default());
        assert_eq!(cfg.pvc.capacity, "1Mi");
        Ok(())
    }

    #[test]
    fn absurd_readiness_timeouts_are_clamped() -> anyhow::Result<()> {
        let cfg = Config::try_from_str(
            r#"
            [sweep]
            sizes = [1]
            readiness_timeout_secs = 9000000000000
            "#,
        )?;
        assert_eq!(
            cfg.sweep.readiness_timeout(),
            Duration::from_secs(MAX_READINESS_TIMEOUT_SECS)
        );
        Ok(())
    }

    #[test]
    fn empty_sizes_are_rejected() -> anyhow::Result<()> {
        let cfg = Config::try_from_str(
            r#"
            [sweep]
            sizes = []
            "#,
        )?;
        assert_eq!(cfg.sweep.validate(), Err(ConfigError::EmptySizes));
        Ok(())
    }

    #[test]
    fn zero_sizes_are_rejected() -> anyhow::Result<()> {
        let cfg = Config::try_from_str(
            r#"
            [sweep]
            sizes = [10, 0]
            "#,
        )?;
        assert_eq!(cfg.sweep.validate(), Err(ConfigError::ZeroSize));
        Ok(())
    }

    #[test]
    fn zero_repetitions_are_rejected() -> anyhow::Result<()> {
        let cfg = Config::try_from_str(
            r#"
            [sweep]
            sizes = [10]
            repetitions = 0
            "#,
        )?;
        assert_eq!(cfg.sweep.validate(), Err(ConfigError::ZeroRepetitions));
        Ok(())
    }
}
