//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Compute a SHA256 hash of the configuration, logged with each run.
    pub fn hash(&self) -> String {
        let yaml = serde_yaml::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(yaml.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Collections to process, optionally restricted to one.
    pub fn collections(&self, only: Option<&str>) -> Vec<String> {
        match only {
            Some(name) => vec![name.to_string()],
            None => self.source.collections.clone(),
        }
    }
}

impl MigrationConfig {
    pub fn state_dir(&self) -> PathBuf {
        PathBuf::from(&self.state_dir)
    }

    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(&self.output_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
source:
  uri: mongodb://localhost:27017
  database: shop
  collections: [users, orders]
target:
  type: mysql
  host: db.local
  database: shop_sql
  user: app
  password: "p@ss:word"
migration:
  batch_size: 200
"#;

    #[test]
    fn test_from_yaml_applies_defaults() {
        let config = Config::from_yaml(YAML).unwrap();
        assert_eq!(config.migration.batch_size, 200);
        assert_eq!(config.migration.key_field, "_id");
        assert_eq!(config.migration.sample_size, 1000);
        assert_eq!(config.migration.validation_sample_size, 100);
        assert_eq!(config.migration.id_length, 64);
        assert!(config.migration.sync_upsert);
        assert!(!config.migration.drop_existing);
        assert_eq!(config.target.ssl_mode, "prefer");
    }

    #[test]
    fn test_from_yaml_rejects_invalid() {
        let yaml = YAML.replace("type: mysql", "type: oracle");
        assert!(Config::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, YAML).unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.source.collections, vec!["users", "orders"]);
    }

    #[test]
    fn test_hash_is_stable_and_sensitive() {
        let a = Config::from_yaml(YAML).unwrap();
        let b = Config::from_yaml(YAML).unwrap();
        assert_eq!(a.hash(), b.hash());
        let c = Config::from_yaml(&YAML.replace("batch_size: 200", "batch_size: 300")).unwrap();
        assert_ne!(a.hash(), c.hash());
    }

    #[test]
    fn test_collections_filter() {
        let config = Config::from_yaml(YAML).unwrap();
        assert_eq!(config.collections(None).len(), 2);
        assert_eq!(config.collections(Some("users")), vec!["users"]);
    }
}
