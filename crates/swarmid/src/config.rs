use std::net::Ipv4Addr;
use std::path::PathBuf;

/// Runtime configuration for one id-issuing node.
///
/// All peers of a coordination group must agree on `group` and `port`; the
/// remaining options are per-node tuning.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// IPv4 multicast group the peers coordinate on.
    pub group: Ipv4Addr,
    /// UDP port of the multicast group.
    pub port: u16,
    /// Multicast TTL: how many hops announcements may be routed.
    pub ttl: u32,
    /// How long a starting node listens for peer replies before it begins
    /// issuing identifiers, in milliseconds. Tests shorten this.
    pub listen_window_ms: u64,
    /// Directory holding the per-node state files.
    pub state_dir: PathBuf,
}

impl NodeConfig {
    pub const DEFAULT_GROUP: Ipv4Addr = Ipv4Addr::new(239, 0, 0, 152);
    // hex for "id"
    pub const DEFAULT_PORT: u16 = 26980;
    pub const DEFAULT_TTL: u32 = 3;
    pub const DEFAULT_LISTEN_WINDOW_MS: u64 = 3000;
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            group: Self::DEFAULT_GROUP,
            port: Self::DEFAULT_PORT,
            ttl: Self::DEFAULT_TTL,
            listen_window_ms: Self::DEFAULT_LISTEN_WINDOW_MS,
            state_dir: PathBuf::from("."),
        }
    }
}
