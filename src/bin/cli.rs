//! CLI for PD lookups

use clap::{Parser, Subcommand};
use minipd::common::parse_duration;
use minipd::proto::metapb;
use minipd::{IsolationLevel, PdClient, PdConfig};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "minipd")]
#[command(about = "Placement driver client CLI")]
#[command(version)]
struct Cli {
    /// PD seed addresses (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pd: Vec<String>,

    /// TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Per-call deadline (e.g. 500ms, 2s)
    #[arg(long)]
    timeout: Option<String>,

    /// PEM CA bundle; enables TLS to PD
    #[arg(long)]
    ca_cert: Option<PathBuf>,

    /// Isolation level attached to regions (si, rc)
    #[arg(long)]
    isolation: Option<IsolationLevel>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Allocate timestamps
    Tso {
        /// Number of timestamps
        #[arg(long, default_value = "1")]
        count: usize,
    },

    /// Resolve a region
    Region {
        /// Raw key (UTF-8)
        #[arg(long, conflicts_with = "id")]
        key: Option<String>,

        /// Region id
        #[arg(long)]
        id: Option<u64>,
    },

    /// Resolve a store
    Store {
        /// Store id
        id: u64,
    },

    /// Show cluster membership
    Members,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = PdConfig::load(cli.config.as_deref())?;
    if !cli.pd.is_empty() {
        config.pd_addrs = cli.pd.clone();
    }
    if let Some(timeout) = &cli.timeout {
        config.timeout_ms = u64::try_from(parse_duration(timeout)?.as_millis())
            .map_err(|_| anyhow::anyhow!("timeout out of range: {}", timeout))?;
    }
    if let Some(ca_cert) = &cli.ca_cert {
        config.tls_ca_path = Some(ca_cert.clone());
    }
    if let Some(level) = cli.isolation {
        config.isolation_level = level;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let client = PdClient::connect(config).await?;

    match cli.command {
        Commands::Tso { count } => {
            for _ in 0..count {
                let Some(ts) = client.get_timestamp().await? else {
                    anyhow::bail!("timestamp wait interrupted");
                };
                if cli.json {
                    println!(
                        "{}",
                        json!({
                            "physical": ts.physical(),
                            "logical": ts.logical(),
                            "version": ts.version(),
                        })
                    );
                } else {
                    println!("{} (version {})", ts, ts.version());
                }
            }
        }

        Commands::Region { key, id } => {
            let region = match (key, id) {
                (Some(key), _) => client.get_region_by_key(key.as_bytes()).await?,
                (None, Some(id)) => client.get_region_by_id(id).await?,
                (None, None) => anyhow::bail!("either --key or --id is required"),
            };
            if cli.json {
                let meta = region.meta();
                let peers: Vec<_> = meta.peers.iter().map(peer_json).collect();
                println!(
                    "{}",
                    json!({
                        "id": meta.id,
                        "start_key": hex::encode(&meta.start_key),
                        "end_key": hex::encode(&meta.end_key),
                        "peers": peers,
                        "leader": region.leader().map(peer_json),
                        "isolation_level": region.isolation_level(),
                    })
                );
            } else {
                println!("Region {}", region.id());
                println!("  Start key: {}", hex::encode(&region.meta().start_key));
                println!("  End key: {}", hex::encode(&region.meta().end_key));
                println!("  Peers: {}", region.meta().peers.len());
                match region.leader() {
                    Some(leader) => {
                        println!("  Leader: peer {} on store {}", leader.id, leader.store_id)
                    }
                    None => println!("  Leader: unknown"),
                }
                println!("  Isolation: {}", region.isolation_level());
            }
        }

        Commands::Store { id } => {
            let store = client.get_store(id).await?;
            if cli.json {
                let labels: BTreeMap<_, _> = store
                    .labels
                    .iter()
                    .map(|l| (l.key.as_str(), l.value.as_str()))
                    .collect();
                println!(
                    "{}",
                    json!({
                        "id": store.id,
                        "address": store.address,
                        "state": format!("{:?}", store.state()),
                        "labels": labels,
                    })
                );
            } else {
                println!("Store {}", store.id);
                println!("  Address: {}", store.address);
                println!("  State: {:?}", store.state());
                for label in &store.labels {
                    println!("  Label: {}={}", label.key, label.value);
                }
            }
        }

        Commands::Members => {
            let Some(members) = client.get_members().await else {
                anyhow::bail!("no PD member reachable");
            };
            let leader = members.leader.as_ref().map(|m| m.name.clone());
            if cli.json {
                let list: Vec<_> = members
                    .members
                    .iter()
                    .map(|m| {
                        json!({
                            "name": m.name,
                            "member_id": m.member_id,
                            "client_urls": m.client_urls,
                        })
                    })
                    .collect();
                println!(
                    "{}",
                    json!({
                        "cluster_id": client.cluster_id(),
                        "leader": leader,
                        "members": list,
                    })
                );
            } else {
                println!("Cluster {}", client.cluster_id());
                for member in &members.members {
                    let marker = if Some(&member.name) == leader.as_ref() {
                        "*"
                    } else {
                        " "
                    };
                    println!(
                        "{} {} ({})",
                        marker,
                        member.name,
                        member.client_urls.join(", ")
                    );
                }
            }
        }
    }

    client.close();
    Ok(())
}

fn peer_json(peer: &metapb::Peer) -> serde_json::Value {
    json!({"id": peer.id, "store_id": peer.store_id})
}
