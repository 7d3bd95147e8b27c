/*
* Command line front end.
*
* vsphere-disk-manager
* ├── init        writes a sample settings file
* ├── datastores  lists persistent datastores and what they can still take
* ├── pick        runs the capacity selector once
* └── simulate    drives the disk provider against the in-memory hypervisor
*/

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::client::InMemoryClient;
use crate::config::{generate_default_config, Settings};
use crate::disk_provider::DiskProvider;
use crate::resources::{Cluster, Datacenter};

#[derive(Parser)]
#[command(name = "vsphere-disk-manager")]
#[command(about = "Persistent disk placement for vSphere datacenters", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding default/local settings files
    #[arg(short, long, value_name = "CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a sample settings file
    Init {
        #[arg(short, long)]
        force: bool,
    },
    /// List persistent datastores
    Datastores {
        #[arg(long)]
        json: bool,
    },
    /// Pick a datastore for a disk
    Pick {
        #[arg(short, long)]
        size: u64,
        /// Restrict the choice to one cluster
        #[arg(short, long)]
        cluster: Option<String>,
    },
    /// Create disks against a simulated hypervisor, optionally moving them
    /// into a cluster afterwards
    Simulate {
        #[arg(short, long)]
        size: u64,
        #[arg(short = 'n', long, default_value_t = 1)]
        count: u32,
        #[arg(short, long)]
        cluster: Option<String>,
        /// Datastores the cluster's hosts can reach; defaults to all of the
        /// cluster's persistent datastores
        #[arg(short, long)]
        accessible: Vec<String>,
    },
}

impl Cli {
    pub fn config_dir(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(|| {
            PathBuf::from(std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config".to_string()))
        })
    }
}

pub async fn run(cli: Cli, settings: Settings) -> Result<()> {
    let config_dir = cli.config_dir();
    match cli.command {
        Commands::Init { force } => init(config_dir, force),
        Commands::Datastores { json } => {
            let datacenter = settings.build_datacenter()?;
            list_datastores(&datacenter, json)
        }
        Commands::Pick { size, cluster } => {
            let datacenter = settings.build_datacenter()?;
            pick(&datacenter, size, cluster.as_deref())
        }
        Commands::Simulate {
            size,
            count,
            cluster,
            accessible,
        } => {
            let datacenter = Arc::new(settings.build_datacenter()?);
            simulate(datacenter, size, count, cluster.as_deref(), accessible).await
        }
    }
}

fn init(config_dir: PathBuf, force: bool) -> Result<()> {
    let target = config_dir.join("default.json");
    if target.exists() && !force {
        return Err(anyhow!(
            "{} already exists, pass --force to overwrite",
            target.display()
        ));
    }

    let written = generate_default_config()
        .write_default(&config_dir)
        .with_context(|| format!("writing settings to {}", config_dir.display()))?;
    println!("{} {}", "Wrote".green(), written.display());
    Ok(())
}

fn find_cluster<'a>(datacenter: &'a Datacenter, name: &str) -> Result<&'a Cluster> {
    datacenter
        .cluster(name)
        .ok_or_else(|| anyhow!("Cluster '{}' not found in {}", name, datacenter))
}

fn list_datastores(datacenter: &Datacenter, json: bool) -> Result<()> {
    let datastores = datacenter.persistent_datastores();
    if json {
        let values: Vec<_> = datastores.values().collect();
        println!("{}", serde_json::to_string_pretty(&values)?);
        return Ok(());
    }

    let headroom_mb = datacenter.selector().headroom_mb();
    println!("{}", format!("Persistent datastores in {}", datacenter).bold());
    for datastore in datastores.values() {
        let surplus = match datastore.surplus_mb(headroom_mb) {
            Some(surplus) => format!("{}MB placeable", surplus).green(),
            None => "inside headroom".red(),
        };
        let used = datastore
            .used_space_mb()
            .map(|used| format!(", used {}MB", used))
            .unwrap_or_default();
        println!(
            "  {} ({}) free {}MB{}, {}",
            datastore.name.cyan(),
            datastore.reference,
            datastore.free_space_mb,
            used,
            surplus
        );
    }
    Ok(())
}

fn pick(datacenter: &Datacenter, size_mb: u64, cluster: Option<&str>) -> Result<()> {
    let picked = match cluster {
        Some(name) => {
            let cluster = find_cluster(datacenter, name)?;
            datacenter.pick_persistent_datastore_in_cluster(cluster, size_mb)
        }
        None => datacenter.pick_persistent_datastore(size_mb),
    };

    match picked {
        Some(datastore) => {
            println!("{} {}", "Picked".green(), datastore.name.cyan());
            Ok(())
        }
        None => Err(anyhow!("No persistent datastore can fit {}MB", size_mb)),
    }
}

async fn simulate(
    datacenter: Arc<Datacenter>,
    size_mb: u64,
    count: u32,
    cluster: Option<&str>,
    accessible: Vec<String>,
) -> Result<()> {
    let datastores = datacenter.persistent_datastores();
    let client = Arc::new(InMemoryClient::with_datastores(datastores.values()));
    let provider = DiskProvider::new(datacenter.clone(), datacenter.disk_path(), client.clone());

    let mut created = Vec::new();
    for _ in 0..count {
        match provider.create(size_mb).await {
            Ok(disk) => {
                println!("{} {} -> {}", "Created".green(), disk.cid, disk.path);
                created.push(disk);
            }
            Err(err) => println!("{} [{}] {}", "Failed".red(), err.kind(), err),
        }
    }

    if let Some(name) = cluster {
        let cluster = find_cluster(&datacenter, name)?;
        let accessible = if accessible.is_empty() {
            cluster.persistent_datastores().keys().cloned().collect()
        } else {
            accessible
        };
        info!(
            cluster = cluster.name(),
            datacenter = cluster.datacenter_name(),
            accessible = ?accessible,
            "Moving disks into cluster"
        );

        for disk in &created {
            match provider
                .find_and_move(
                    &disk.cid,
                    cluster,
                    cluster.datacenter_name(),
                    accessible.as_slice(),
                )
                .await
            {
                Ok(moved) if moved.path == disk.path => println!(
                    "{} {} already on {}",
                    "Kept".yellow(),
                    moved.cid,
                    moved.datastore.name
                ),
                Ok(moved) => println!("{} {} -> {}", "Moved".green(), moved.cid, moved.path),
                Err(err) => println!("{} [{}] {}", "Failed".red(), err.kind(), err),
            }
        }
    }

    println!("{} remote calls issued", client.journal().await.len());
    Ok(())
}
