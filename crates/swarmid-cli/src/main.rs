//! # swarmid: coordinator-free unique 64-bit id generation
//!
//! Boots one id-issuing node, coordinates with its peers over IP multicast,
//! and prints the requested number of identifiers to stdout as lowercase
//! hexadecimal, one per line. Diagnostics go to stderr (tune with
//! `RUST_LOG`).
//!
//! ```bash
//! # node 123, one million ids (the default count)
//! swarmid 123
//!
//! # node 7, ten ids, chatty
//! RUST_LOG=debug swarmid 7 10
//! ```
//!
//! Every live node on the group must use a distinct node id (0..=1023); a
//! second node claiming an id that is already live is refused. The node
//! keeps a small state file (`NNNN.state`) in `--state-dir` so a restart
//! never reissues a timestamp it already used.
//!
//! Exit codes: 0 on success, 1 on an argument error, 2 when the node fails
//! to initialize or stops issuing ids.

use std::io::{self, Write};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::bail;
use clap::error::ErrorKind as ClapErrorKind;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use swarmid::{IdNode, NodeConfig, MAX_NODES};

#[derive(Parser, Debug)]
#[command(
    name = "swarmid",
    version,
    about = "Generate unique 64-bit ids, coordinated over IP multicast"
)]
struct CliArgs {
    /// Node identifier (0..=1023), unique among live peers on the group.
    node_id: u16,

    /// Number of identifiers to print.
    #[arg(default_value_t = 1_000_000)]
    id_count: u64,

    /// IPv4 multicast group used for peer coordination.
    ///
    /// Environment variable: `SWARMID_GROUP`
    #[arg(long, env = "SWARMID_GROUP", default_value_t = NodeConfig::DEFAULT_GROUP)]
    group: Ipv4Addr,

    /// UDP port of the multicast group.
    ///
    /// Environment variable: `SWARMID_PORT`
    #[arg(long, env = "SWARMID_PORT", default_value_t = NodeConfig::DEFAULT_PORT)]
    port: u16,

    /// Multicast TTL: how many hops announcements may be routed.
    ///
    /// Environment variable: `SWARMID_TTL`
    #[arg(long, env = "SWARMID_TTL", default_value_t = NodeConfig::DEFAULT_TTL)]
    ttl: u32,

    /// How long to listen for peer replies before issuing ids, in
    /// milliseconds.
    ///
    /// Environment variable: `SWARMID_LISTEN_MS`
    #[arg(long, env = "SWARMID_LISTEN_MS", default_value_t = NodeConfig::DEFAULT_LISTEN_WINDOW_MS)]
    listen_ms: u64,

    /// Directory holding the per-node state files.
    ///
    /// Environment variable: `SWARMID_STATE_DIR`
    #[arg(long, env = "SWARMID_STATE_DIR", default_value = ".")]
    state_dir: PathBuf,
}

struct RunConfig {
    node_id: u16,
    id_count: u64,
    node: NodeConfig,
}

impl TryFrom<CliArgs> for RunConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.node_id >= MAX_NODES {
            bail!(
                "node id {} out of range (0..={})",
                args.node_id,
                MAX_NODES - 1
            );
        }
        if !args.group.is_multicast() {
            bail!("{} is not an IPv4 multicast group", args.group);
        }

        Ok(Self {
            node_id: args.node_id,
            id_count: args.id_count,
            node: NodeConfig {
                group: args.group,
                port: args.port,
                ttl: args.ttl,
                listen_window_ms: args.listen_ms,
                state_dir: args.state_dir,
            },
        })
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(io::stderr)
        .init();

    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(err)
            if matches!(
                err.kind(),
                ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayVersion
            ) =>
        {
            let _ = err.print();
            return ExitCode::SUCCESS;
        }
        Err(err) => {
            let _ = err.print();
            return ExitCode::from(1);
        }
    };
    let config = match RunConfig::try_from(args) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("{err}");
            return ExitCode::from(1);
        }
    };

    let mut node = match IdNode::initialize(config.node_id, &config.node) {
        Ok(node) => node,
        Err(err) => {
            tracing::error!("failed to initialize node {}: {err}", config.node_id);
            return ExitCode::from(2);
        }
    };

    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    for _ in 0..config.id_count {
        let id = match node.next_id() {
            Ok(id) => id,
            Err(err) => {
                tracing::error!("node {} stopped issuing ids: {err}", config.node_id);
                return ExitCode::from(2);
            }
        };
        if let Err(err) = writeln!(out, "{id:x}") {
            tracing::error!("failed to write id: {err}");
            return ExitCode::from(2);
        }
    }
    if let Err(err) = out.flush() {
        tracing::error!("failed to flush ids: {err}");
        return ExitCode::from(2);
    }

    ExitCode::SUCCESS
}
