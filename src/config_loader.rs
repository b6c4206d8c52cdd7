use crate::config::Config;
use color_eyre::eyre::{Context, Result};
use log::info;
use std::fs::{self, File};
use std::path::Path;

/// Load, parse and validate configuration from a YAML file
pub fn load_config(config_path: &Path) -> Result<Config> {
    info!("Loading configuration from: {:?}", config_path);

    let file = File::open(config_path)
        .with_context(|| format!("Failed to open config file {}", config_path.display()))?;

    let config: Config = serde_yaml::from_reader(file)
        .with_context(|| format!("Failed to parse config file {}", config_path.display()))?;

    config
        .validate()
        .with_context(|| format!("Invalid configuration in {}", config_path.display()))?;

    Ok(config)
}

/// Load the given file, or fall back to the built-in reference experiment
pub fn load_or_reference(config_path: Option<&Path>) -> Result<Config> {
    match config_path {
        Some(path) => load_config(path),
        None => {
            info!("No configuration file given, using the reference experiment");
            let config = Config::reference().wrap_err("Failed to build reference configuration")?;
            config.validate()?;
            Ok(config)
        }
    }
}

/// Write a configuration as YAML
pub fn write_config(config: &Config, output_path: &Path) -> Result<()> {
    let yaml = serde_yaml::to_string(config).context("Failed to serialize configuration")?;
    fs::write(output_path, yaml)
        .with_context(|| format!("Failed to write configuration to {}", output_path.display()))?;
    info!("Configuration written to {}", output_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_minimal_config() {
        let yaml = r#"
general:
  duration: 30s
  time_scale: 0.01
topology:
  attachment_points:
    - { id: h1, address: 10.0.0.1, service: bulk }
    - { id: h2, address: 10.0.0.2, service: periodic }
  aggregation_points:
    - { id: s1 }
  links:
    - { a: h1, b: s1, capacity: 100mbit, latency: 1ms }
    - { a: h2, b: s1, capacity: 10mbit }
policies:
  - { service: bulk, guaranteed: 8mbit, ceiling: 100mbit, priority: 1 }
  - { service: periodic, guaranteed: 1mbit, ceiling: 5mbit, priority: 2 }
workloads:
  units:
    - { name: web, service: bulk, source: h1, destination: h2 }
  cross_pairs:
    - { name: back, source: h2, destination: h1 }
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", yaml).unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.general.duration.as_secs(), 30);
        assert_eq!(config.topology.uplink("h2").unwrap().capacity, 10_000_000);
        assert_eq!(config.assignments().len(), 2);
        assert_eq!(config.address_space.to_string(), "10.0.0.0/16");
    }

    #[test]
    fn test_invalid_reference_is_reported() {
        let yaml = r#"
topology:
  attachment_points:
    - { id: h1, address: 10.0.0.1 }
  aggregation_points:
    - { id: s1 }
  links:
    - { a: h1, b: s1, capacity: 100mbit }
policies:
  - { service: bulk, guaranteed: 8mbit, ceiling: 100mbit, priority: 1 }
workloads:
  units:
    - { name: web, service: bulk, source: h1, destination: h7 }
"#;
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", yaml).unwrap();

        let err = load_config(temp_file.path()).unwrap_err();
        assert!(format!("{:?}", err).contains("h7"));
    }

    #[test]
    fn test_written_reference_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("experiment.yaml");
        let reference = load_or_reference(None).unwrap();
        write_config(&reference, &path).unwrap();
        assert_eq!(load_config(&path).unwrap(), reference);
    }
}
