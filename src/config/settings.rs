/*
* Settings for the disk manager.
*
* Layers, lowest priority first:
*   1. hardcoded defaults
*   2. <config dir>/default.{toml,json,yaml}   (optional)
*   3. <config dir>/local.{toml,json,yaml}     (optional)
*   4. DISKMGR_* environment variables, `__` between nesting levels,
*      e.g. DISKMGR_PLACEMENT__HEADROOM_MB=2048
*
* Cluster and datastore discovery happens elsewhere; the `datacenter`
* section carries the inventory snapshot that placement works from.
*/

use config::{Config, Environment, File};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::errors::ConfigError;
use crate::placement::{CapacitySelector, RandomDraw, SeededDraw, WeightedDraw, DISK_HEADROOM_MB};
use crate::resources::{Cluster, Datacenter, Datastore, ManagedRef};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub placement: PlacementSettings,
    pub datacenter: DatacenterSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementSettings {
    pub headroom_mb: u64,
    /// Seeds the weighted draw for reproducible placement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatacenterSettings {
    pub name: String,
    pub reference: String,
    pub disk_path: String,
    pub persistent_pattern: String,
    #[serde(default)]
    pub clusters: Vec<ClusterSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSettings {
    pub name: String,
    #[serde(default)]
    pub datastores: Vec<DatastoreSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatastoreSettings {
    pub name: String,
    pub reference: String,
    pub free_space_mb: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity_mb: Option<u64>,
}

impl DatastoreSettings {
    fn to_datastore(&self) -> Datastore {
        let datastore =
            Datastore::new(&self.name, ManagedRef::new(&self.reference), self.free_space_mb);
        match self.capacity_mb {
            Some(capacity_mb) => datastore.with_capacity(capacity_mb),
            None => datastore,
        }
    }
}

impl Settings {
    pub fn load(config_dir: &Path) -> Result<Self, ConfigError> {
        info!("Loading configuration from path: {}", config_dir.display());

        let config = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("placement.headroom_mb", DISK_HEADROOM_MB)?
            .set_default("datacenter.name", "datacenter")?
            .set_default("datacenter.reference", "datacenter")?
            .set_default("datacenter.disk_path", "disks")?
            .set_default("datacenter.persistent_pattern", ".*")?
            .add_source(File::from(config_dir.join("default")).required(false))
            .add_source(File::from(config_dir.join("local")).required(false))
            .add_source(
                Environment::with_prefix("DISKMGR")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Writes these settings as `<config_dir>/default.json`.
    pub fn write_default(&self, config_dir: &Path) -> Result<PathBuf, ConfigError> {
        std::fs::create_dir_all(config_dir)?;
        let path = config_dir.join("default.json");
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }

    /// Builds the datacenter inventory, keeping only datastores that match
    /// `persistent_pattern`.
    pub fn build_datacenter(&self) -> Result<Datacenter, ConfigError> {
        let dc = &self.datacenter;
        let pattern =
            Regex::new(&dc.persistent_pattern).map_err(|source| ConfigError::InvalidPattern {
                pattern: dc.persistent_pattern.clone(),
                source,
            })?;

        let draw: Arc<dyn WeightedDraw> = match self.placement.seed {
            Some(seed) => Arc::new(SeededDraw::new(seed)),
            None => Arc::new(RandomDraw),
        };
        let selector = CapacitySelector::with_draw(self.placement.headroom_mb, draw);
        let mut datacenter =
            Datacenter::new(&dc.name, ManagedRef::new(&dc.reference), &dc.disk_path, selector);

        for cluster in &dc.clusters {
            let mut seen = HashSet::new();
            for datastore in &cluster.datastores {
                if !seen.insert(datastore.name.as_str()) {
                    return Err(ConfigError::DuplicateDatastore {
                        cluster: cluster.name.clone(),
                        datastore: datastore.name.clone(),
                    });
                }
            }

            let built = Cluster::with_persistent_pattern(
                &cluster.name,
                &dc.name,
                cluster.datastores.iter().map(DatastoreSettings::to_datastore),
                &pattern,
            );
            if datacenter.add_cluster(built).is_some() {
                return Err(ConfigError::DuplicateCluster(cluster.name.clone()));
            }
        }

        Ok(datacenter)
    }
}

pub fn generate_default_config() -> Settings {
    let datastore =
        |name: &str, reference: &str, free_space_mb: u64, capacity_mb: u64| DatastoreSettings {
            name: name.to_string(),
            reference: reference.to_string(),
            free_space_mb,
            capacity_mb: Some(capacity_mb),
        };

    Settings {
        logging: LoggingSettings {
            level: "info".to_string(),
        },
        placement: PlacementSettings {
            headroom_mb: DISK_HEADROOM_MB,
            seed: None,
        },
        datacenter: DatacenterSettings {
            name: "datacenter-1".to_string(),
            reference: "datacenter-2".to_string(),
            disk_path: "persistent-disks".to_string(),
            persistent_pattern: "^persistent-".to_string(),
            clusters: vec![
                ClusterSettings {
                    name: "cluster-a".to_string(),
                    datastores: vec![
                        datastore("persistent-ds-1", "datastore-11", 200 * 1024, 500 * 1024),
                        datastore("persistent-shared", "datastore-12", 800 * 1024, 1024 * 1024),
                        datastore("ephemeral-ds-1", "datastore-13", 300 * 1024, 500 * 1024),
                    ],
                },
                ClusterSettings {
                    name: "cluster-b".to_string(),
                    datastores: vec![
                        datastore("persistent-ds-2", "datastore-21", 50 * 1024, 500 * 1024),
                        datastore("persistent-shared", "datastore-12", 800 * 1024, 1024 * 1024),
                    ],
                },
            ],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_builds_datacenter() {
        let datacenter = generate_default_config().build_datacenter().unwrap();

        assert_eq!(datacenter.name(), "datacenter-1");
        assert_eq!(datacenter.reference().as_str(), "datacenter-2");
        assert_eq!(datacenter.disk_path(), "persistent-disks");
        assert_eq!(datacenter.selector().headroom_mb(), DISK_HEADROOM_MB);

        let names: Vec<String> = datacenter.persistent_datastores().into_keys().collect();
        assert_eq!(names, vec!["persistent-ds-1", "persistent-ds-2", "persistent-shared"]);

        let cluster = datacenter.cluster("cluster-a").unwrap();
        assert!(cluster.persistent_datastore("ephemeral-ds-1").is_none());
        assert_eq!(
            cluster.persistent_datastore("persistent-ds-1").and_then(|ds| ds.capacity_mb),
            Some(500 * 1024)
        );
    }

    #[test]
    fn test_invalid_pattern() {
        let mut settings = generate_default_config();
        settings.datacenter.persistent_pattern = "([".to_string();
        assert!(matches!(
            settings.build_datacenter(),
            Err(ConfigError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_duplicate_cluster_and_datastore() {
        let mut settings = generate_default_config();
        let first = settings.datacenter.clusters[0].clone();
        settings.datacenter.clusters.push(first);
        assert!(matches!(
            settings.build_datacenter(),
            Err(ConfigError::DuplicateCluster(name)) if name == "cluster-a"
        ));

        let mut settings = generate_default_config();
        let duplicate = settings.datacenter.clusters[1].datastores[0].clone();
        settings.datacenter.clusters[1].datastores.push(duplicate);
        assert!(matches!(
            settings.build_datacenter(),
            Err(ConfigError::DuplicateDatastore { .. })
        ));
    }

    #[test]
    fn test_write_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = generate_default_config();
        settings.placement.seed = Some(42);
        let written = settings.write_default(dir.path()).unwrap();
        assert!(written.ends_with("default.json"));

        let loaded = Settings::load(dir.path()).unwrap();
        assert_eq!(loaded.placement.seed, Some(42));
        assert_eq!(loaded.datacenter.clusters.len(), 2);
        assert_eq!(loaded.datacenter.clusters[0].datastores[2].name, "ephemeral-ds-1");
    }

    #[test]
    fn test_defaults_without_files() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Settings::load(dir.path()).unwrap();
        assert_eq!(loaded.placement.headroom_mb, DISK_HEADROOM_MB);
        assert_eq!(loaded.datacenter.disk_path, "disks");
        assert!(loaded.datacenter.clusters.is_empty());
    }

    #[test]
    fn test_environment_overrides_files() {
        let dir = tempfile::tempdir().unwrap();
        generate_default_config().write_default(dir.path()).unwrap();

        // Keys no other test reads back, since the environment is process-wide.
        std::env::set_var("DISKMGR_LOGGING__LEVEL", "trace");
        std::env::set_var("DISKMGR_DATACENTER__PERSISTENT_PATTERN", "^shared-");
        let loaded = Settings::load(dir.path());
        std::env::remove_var("DISKMGR_LOGGING__LEVEL");
        std::env::remove_var("DISKMGR_DATACENTER__PERSISTENT_PATTERN");

        let loaded = loaded.unwrap();
        assert_eq!(loaded.logging.level, "trace");
        assert_eq!(loaded.datacenter.persistent_pattern, "^shared-");
        assert_eq!(loaded.datacenter.name, "datacenter-1");
    }
}
