//! # Node process entry point
//!
//! Wires together the five cooperating components described in the
//! system overview: loads the on-disk snapshot, runs startup
//! reconciliation, then starts the accept loop, persistence loop, and
//! liveness loop as independent threads.

use clap::Parser;
use shard_node::config::Config;
use shard_node::server::NodeState;
use shard_node::store::Store;
use shard_node::{liveness, persistence, reconcile, server};
use std::io::BufRead;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

/// A node in the sharded key-value cluster.
///
/// With no `--port`, the process reads one line from standard input and
/// parses it as its listen port, matching the process surface described
/// for this system: `host` is always the loopback address.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Listen port. If omitted, read one line from stdin and parse it.
    #[arg(long)]
    port: Option<u16>,

    /// Directory for the per-node snapshot file. Defaults to the
    /// current directory.
    #[arg(long)]
    data_dir: Option<std::path::PathBuf>,

    /// Comma-separated `host:port` list overriding the default
    /// three-node loopback cluster (5000/5001/5002).
    #[arg(long, value_delimiter = ',')]
    nodes: Option<Vec<String>>,
}

fn read_port_from_stdin() -> anyhow::Result<u16> {
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().parse()?)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let port = match args.port {
        Some(port) => port,
        None => read_port_from_stdin()?,
    };
    let self_id = format!("127.0.0.1:{port}").parse()?;

    let nodes = match args.nodes {
        Some(list) => list
            .into_iter()
            .map(|s| s.parse())
            .collect::<Result<Vec<_>, _>>()?,
        None => Config::default_nodes(),
    };

    let config = Config {
        self_id,
        nodes,
        data_dir: args
            .data_dir
            .unwrap_or_else(|| std::path::PathBuf::from(".")),
        persistence_period: Duration::from_secs(5),
        liveness_period: Duration::from_secs(10),
        peer_timeout: Duration::from_secs(3),
    };

    log::info!(
        "starting node {} (cluster: {:?})",
        config.self_id,
        config.nodes
    );

    let (primary, replica) = persistence::load(&config.snapshot_path());
    let store = Store::from_maps(primary, replica);
    let node = Arc::new(NodeState::new(config, store));

    log::info!("running startup reconciliation");
    reconcile::run(&node);

    let listener = TcpListener::bind(node.config.self_id.addr())?;
    log::info!("listening on {}", node.config.self_id);

    std::thread::spawn({
        let store = node.store.clone();
        let path = node.config.snapshot_path();
        let period = node.config.persistence_period;
        move || persistence::run(store, path, period)
    });

    std::thread::spawn({
        let liveness = node.liveness.clone();
        let nodes = node.config.nodes.clone();
        let period = node.config.liveness_period;
        let peer_timeout = node.config.peer_timeout;
        move || liveness::run(liveness, nodes, period, peer_timeout)
    });

    server::run(node, listener);
    Ok(())
}
