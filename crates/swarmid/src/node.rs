//! The coordinator: one id-issuing node of a multicast group.
//!
//! A node owns its state store and transport and runs a three-message
//! protocol with its peers: `"UP"` announcements carry a node's latest
//! state, `"RQ"` asks the group for its stored view of a node id, and
//! `"HW"` answers with a high-water timestamp hint. The protocol lets a
//! restarting node resume past everything it (or a peer on its behalf)
//! ever issued, and lets a duplicate node id be detected and refused.

use core::cmp::Ordering;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::clock::{SystemClock, TimeSource};
use crate::config::NodeConfig;
use crate::error::{Error, Result};
use crate::id::{SwarmId, MAX_NODES};
use crate::net::MulticastTransport;
use crate::state::{Mode, NodeState, STATE_WIRE_SIZE};
use crate::store::StateStore;

/// Receive bound for one poll of the listen window.
const LISTEN_POLL: Duration = Duration::from_millis(100);

/// Attempts to push the clock past the high-water mark before giving up.
const ADVANCE_ATTEMPTS: u32 = 11;

/// Backoff between advancement attempts.
const ADVANCE_BACKOFF: Duration = Duration::from_micros(100);

/// A unique-identifier generator that coordinates with peers over IP
/// multicast.
///
/// Single-threaded cooperative: all network traffic is handled inside
/// [`join_group`](Self::join_group) and at the top of
/// [`next_id`](Self::next_id); there is no background task.
///
/// ```no_run
/// use swarmid::{IdNode, NodeConfig};
///
/// let config = NodeConfig::default();
/// let mut node = IdNode::initialize(123, &config)?;
/// let id = node.next_id()?;
/// println!("{id:x}");
/// # Ok::<(), swarmid::Error>(())
/// ```
#[derive(Debug)]
pub struct IdNode<C = SystemClock>
where
    C: TimeSource,
{
    node_id: u16,
    /// High-water mark: the largest timestamp this node will issue with.
    min_time_ms: u64,
    /// Offset from the monotonic clock to the high-water timeline, captured
    /// whenever the high-water mark moves.
    delta_ms: i64,
    counter: u16,
    state: NodeState,
    store: StateStore,
    transport: MulticastTransport,
    clock: C,
    listen_window_ms: u64,
    initialized: bool,
    has_collision: bool,
}

impl IdNode<SystemClock> {
    /// Opens the node's local resources: validates the id, opens the state
    /// store and the transport, asks the group for its view of this id and
    /// seeds the high-water mark from disk.
    ///
    /// The node cannot issue identifiers yet; call
    /// [`join_group`](Self::join_group) next, or use
    /// [`initialize`](Self::initialize) for both steps.
    pub fn open(node_id: u16, config: &NodeConfig) -> Result<Self> {
        Self::open_with_clock(node_id, config, SystemClock::new())
    }

    /// Fully prepares a node: [`open`](Self::open) followed by
    /// [`join_group`](Self::join_group).
    pub fn initialize(node_id: u16, config: &NodeConfig) -> Result<Self> {
        let mut node = Self::open(node_id, config)?;
        node.join_group()?;
        Ok(node)
    }
}

impl<C> IdNode<C>
where
    C: TimeSource,
{
    /// [`open`](Self::open) with a caller-provided time source. Intended for
    /// tests that need a deterministic clock.
    pub fn open_with_clock(node_id: u16, config: &NodeConfig, clock: C) -> Result<Self> {
        if node_id >= MAX_NODES {
            return Err(Error::NodeIdRange(node_id));
        }

        let mut store = StateStore::open(state_path(config, node_id), usize::from(MAX_NODES))?;
        let mut state = store.read(node_id)?;
        state.id = node_id;
        if state.timestamp == 0 {
            // first run for this id: establish the record
            store.write(node_id, &state)?;
        }

        let transport = MulticastTransport::open(config)?;
        state.set_addr(transport.local_addr());
        state.set_mode(Mode::Request);

        let mut node = Self {
            node_id,
            min_time_ms: 0,
            delta_ms: 0,
            counter: 0,
            state,
            store,
            transport,
            clock,
            listen_window_ms: config.listen_window_ms,
            initialized: false,
            has_collision: false,
        };

        if let Err(err) = node.transport.send(&node.state.to_bytes()) {
            warn!(node_id, "failed to send startup state request: {err}");
        }
        // resume from whatever the store remembered (possibly nothing)
        node.adjust(node.state.timestamp)?;

        Ok(node)
    }

    /// Listens for peer replies for the configured window, then adopts the
    /// window end as the high-water floor and announces the node as live.
    ///
    /// Fails with [`Error::Collision`] if a peer already owns this node id.
    pub fn join_group(&mut self) -> Result<()> {
        let end = self.clock.wall_ms() + self.listen_window_ms;
        while self.clock.wall_ms() < end {
            self.poll_group(LISTEN_POLL);
            if self.has_collision {
                return Err(Error::Collision(self.node_id));
            }
        }

        // wall time is the floor: a fresh store must not reissue timestamps
        // the previous life of this id may have used
        if end > self.min_time_ms {
            self.adjust(end)?;
        }
        self.initialized = true;

        self.state.set_mode(Mode::Up);
        if let Err(err) = self.transport.send(&self.state.to_bytes()) {
            warn!(node_id = self.node_id, "failed to announce group membership: {err}");
        }
        Ok(())
    }

    /// Issues one fresh identifier.
    ///
    /// Drains pending group traffic first (without blocking), then composes
    /// the id from the current high-water mark and counter, advancing the
    /// mark when the counter is exhausted.
    pub fn next_id(&mut self) -> Result<SwarmId> {
        while self.poll_group(Duration::ZERO) {}

        if self.has_collision {
            return Err(Error::Collision(self.node_id));
        }
        if !self.initialized {
            return Err(Error::NotReady);
        }

        if u64::from(self.counter) >= SwarmId::COUNTER_MASK || self.min_time_ms == 0 {
            self.advance()?;
        }

        let id = SwarmId::from_parts(self.min_time_ms, self.counter, self.node_id);
        self.counter += 1;
        Ok(id)
    }

    /// True once a peer with the same node id has been detected. Terminal.
    pub fn has_collision(&self) -> bool {
        self.has_collision
    }

    /// True iff the node has joined the group and holds its id alone.
    pub fn is_valid(&self) -> bool {
        self.initialized && !self.has_collision
    }

    pub fn node_id(&self) -> u16 {
        self.node_id
    }

    /// The current high-water mark in milliseconds.
    pub fn min_timestamp(&self) -> u64 {
        self.min_time_ms
    }

    /// Waits up to `max_wait` for one group datagram and dispatches it.
    /// Returns false when nothing was received (or the node is poisoned).
    fn poll_group(&mut self, max_wait: Duration) -> bool {
        if self.has_collision {
            return false;
        }
        let (payload, src) = match self.transport.recv(max_wait) {
            Ok(Some(message)) => message,
            Ok(None) => return false,
            Err(err) => {
                warn!(node_id = self.node_id, "group receive failed: {err}");
                return false;
            }
        };
        if payload.len() != STATE_WIRE_SIZE {
            debug!(len = payload.len(), %src, "ignoring foreign datagram");
            return true;
        }
        let mut raw = [0u8; STATE_WIRE_SIZE];
        raw.copy_from_slice(&payload);
        self.handle_message(NodeState::from_bytes(&raw), src);
        true
    }

    fn handle_message(&mut self, msg: NodeState, src: SocketAddr) {
        match msg.mode() {
            Some(Mode::Up) => self.handle_announce(msg, src),
            Some(Mode::Request) => self.handle_request(msg),
            Some(Mode::HighWater) => self.handle_high_water(msg),
            None => debug!(%src, "ignoring datagram with unknown mode"),
        }
    }

    /// A peer announced its state. Our own id from a different source port
    /// means two live nodes claim the same id; the protocol rule is that the
    /// announcement wins and the listener steps down.
    fn handle_announce(&mut self, msg: NodeState, src: SocketAddr) {
        if msg.id == self.node_id {
            if src.port() != self.transport.local_addr().port() {
                error!(
                    node_id = self.node_id,
                    peer = %src,
                    "node id collision detected; this node stops issuing ids"
                );
                self.has_collision = true;
            }
            return;
        }

        // UDP may reorder announcements: keep the freshest view
        match self.store.read(msg.id) {
            Ok(existing) if existing.timestamp > msg.timestamp => {
                debug!(peer = msg.id, "ignoring stale announcement");
            }
            _ => {
                if let Err(err) = self.store.write(msg.id, &msg) {
                    warn!(peer = msg.id, "failed to persist peer state: {err}");
                }
            }
        }
    }

    /// A peer asked for our stored view of a node id. Entries that were
    /// never initialized carry no information and are not forwarded.
    fn handle_request(&mut self, msg: NodeState) {
        let mut entry = match self.store.read(msg.id) {
            Ok(entry) => entry,
            Err(err) => {
                debug!(peer = msg.id, "no stored state for request: {err}");
                return;
            }
        };
        if entry.timestamp == 0 {
            return;
        }

        if self.initialized && msg.id == self.node_id {
            // that id is taken, by us
            entry.set_mode(Mode::Up);
        } else {
            entry.set_mode(Mode::HighWater);
        }
        if let Err(err) = self.transport.send(&entry.to_bytes()) {
            warn!(peer = msg.id, "failed to answer state request: {err}");
        }
    }

    fn handle_high_water(&mut self, msg: NodeState) {
        if msg.id != self.node_id || msg.timestamp <= self.min_time_ms {
            return;
        }
        debug!(
            node_id = self.node_id,
            timestamp = msg.timestamp,
            "adopting peer-reported high-water mark"
        );
        if let Err(err) = self.adjust(msg.timestamp) {
            warn!(node_id = self.node_id, "failed to persist high-water mark: {err}");
        }
    }

    /// Moves the high-water mark to `timestamp`, re-anchors the monotonic
    /// delta, and writes the own record through to the store.
    fn adjust(&mut self, timestamp: u64) -> Result<()> {
        self.min_time_ms = timestamp;
        self.delta_ms = timestamp as i64 - self.clock.mono_ms() as i64;
        self.counter = 0;
        self.state.timestamp = timestamp;
        self.store.write(self.node_id, &self.state)
    }

    /// The issuance timeline: monotonic milliseconds re-anchored to the
    /// high-water mark. Immune to wall-clock jumps.
    fn now_ms(&self) -> u64 {
        (self.clock.mono_ms() as i64 + self.delta_ms).max(0) as u64
    }

    /// Pushes the high-water mark to the next millisecond, persisting and
    /// announcing the new value. When the clock has not yet passed the mark
    /// (counter exhaustion faster than 1 ms, or a monotonic source still
    /// behind an adopted mark) the attempt is retried with a short backoff.
    fn advance(&mut self) -> Result<()> {
        for _ in 0..ADVANCE_ATTEMPTS {
            let now = self.now_ms();
            match now.cmp(&self.min_time_ms) {
                Ordering::Greater => {
                    self.min_time_ms = now;
                    self.counter = 0;
                    self.state.timestamp = now;
                    self.store.write(self.node_id, &self.state)?;
                    self.state.set_mode(Mode::Up);
                    if let Err(err) = self.transport.send(&self.state.to_bytes()) {
                        warn!(node_id = self.node_id, "failed to announce new high-water mark: {err}");
                    }
                    return Ok(());
                }
                Ordering::Equal => {
                    debug!(node_id = self.node_id, "issuance outpaced the clock; backing off");
                }
                Ordering::Less => {
                    warn!(
                        node_id = self.node_id,
                        now,
                        floor = self.min_time_ms,
                        "monotonic reading still below the high-water mark"
                    );
                }
            }
            thread::sleep(ADVANCE_BACKOFF);
        }
        Err(Error::RateLimited)
    }
}

fn state_path(config: &NodeConfig, node_id: u16) -> PathBuf {
    config.state_dir.join(format!("{node_id:04}.state"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::collections::HashSet;
    use std::rc::Rc;

    const TEST_LISTEN_MS: u64 = 500;

    struct TestDir {
        path: PathBuf,
    }

    impl TestDir {
        fn new(tag: &str) -> Self {
            let path =
                std::env::temp_dir().join(format!("swarmid-node-{tag}-{}", std::process::id()));
            let _ = std::fs::remove_dir_all(&path);
            std::fs::create_dir_all(&path).expect("create test dir");
            Self { path }
        }
    }

    impl Drop for TestDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.path);
        }
    }

    fn test_config(dir: &TestDir, port: u16) -> NodeConfig {
        NodeConfig {
            port,
            listen_window_ms: TEST_LISTEN_MS,
            state_dir: dir.path.clone(),
            ..NodeConfig::default()
        }
    }

    #[derive(Clone)]
    struct MockClock {
        wall: Rc<Cell<u64>>,
        mono: Rc<Cell<u64>>,
    }

    impl MockClock {
        fn new(wall: u64, mono: u64) -> Self {
            Self {
                wall: Rc::new(Cell::new(wall)),
                mono: Rc::new(Cell::new(mono)),
            }
        }
    }

    impl TimeSource for MockClock {
        fn wall_ms(&self) -> u64 {
            self.wall.get()
        }

        fn mono_ms(&self) -> u64 {
            self.mono.get()
        }
    }

    #[test]
    fn single_node_ids_are_unique_and_increasing() {
        let dir = TestDir::new("single");
        let config = test_config(&dir, 27101);
        let mut node = IdNode::initialize(123, &config).expect("initialize node");

        let mut seen = HashSet::new();
        let mut last = 0u64;
        for _ in 0..50_000 {
            let id = node.next_id().expect("generate id");
            assert_eq!(id.node_id(), 123);
            let raw = id.to_u64();
            assert!(raw > last, "ids must be strictly increasing");
            assert!(seen.insert(raw), "duplicate id {raw:#x}");
            last = raw;
        }
    }

    #[test]
    fn two_peers_issue_disjoint_ids() {
        let dir = TestDir::new("peers");
        let config = test_config(&dir, 27102);
        let mut a = IdNode::initialize(123, &config).expect("initialize node 123");
        let mut b = IdNode::initialize(234, &config).expect("initialize node 234");

        let mut seen = HashSet::new();
        for i in 0..40_000u32 {
            let node = if i % 2 == 0 { &mut a } else { &mut b };
            let id = node.next_id().expect("generate id").to_u64();
            assert!(seen.insert(id), "duplicate id {id:#x} across peers");
        }
    }

    #[test]
    fn duplicate_node_id_poisons_the_later_arrival() {
        // distinct state dirs: a store file belongs to exactly one node
        let dir_a = TestDir::new("collide-a");
        let dir_b = TestDir::new("collide-b");
        let port = 27103;

        // both multicast listeners must be up before either announces
        let mut a = IdNode::open(123, &test_config(&dir_a, port)).expect("open first node");
        let mut b = IdNode::open(123, &test_config(&dir_b, port)).expect("open second node");

        let joined_a = a.join_group();
        let joined_b = b.join_group();
        assert!(
            joined_a.is_ok() != joined_b.is_ok(),
            "exactly one node may keep the id"
        );
        assert!(a.is_valid() != b.is_valid());

        let mut seen = HashSet::new();
        let mut issued = 0u32;
        for i in 0..2_000u32 {
            let node = if i % 2 == 0 { &mut a } else { &mut b };
            if let Ok(id) = node.next_id() {
                assert!(seen.insert(id.to_u64()), "duplicate id across colliding peers");
                issued += 1;
            }
        }
        assert!(issued >= 1_000, "the surviving node must keep issuing");
    }

    #[test]
    fn stored_high_water_survives_restart() {
        let dir = TestDir::new("disk-hw");
        let config = test_config(&dir, 27104);
        {
            let _node = IdNode::initialize(123, &config).expect("establish state file");
        }

        let future_ts = SystemClock::new().wall_ms() + 5_000;
        {
            let mut store = StateStore::open(state_path(&config, 123), usize::from(MAX_NODES))
                .expect("reopen store");
            let mut record = store.read(123).expect("own record");
            assert_eq!(record.id, 123);
            assert!(record.timestamp > 0);
            record.timestamp = future_ts;
            store.write(123, &record).expect("doctor record");
        }

        let node = IdNode::open(123, &config).expect("reopen node");
        assert!(node.min_timestamp() >= future_ts);
    }

    #[test]
    fn peer_reported_high_water_is_adopted() {
        let dir_a = TestDir::new("peer-hw-a");
        let dir_b = TestDir::new("peer-hw-b");
        let port = 27105;
        let config_a = test_config(&dir_a, port);
        let config_b = test_config(&dir_b, port);

        // first lives: cross-populate the stores via announcements
        {
            let mut a = IdNode::initialize(123, &config_a).expect("initialize node 123");
            let mut b = IdNode::initialize(234, &config_b).expect("initialize node 234");
            for i in 0..2_000u32 {
                let node = if i % 2 == 0 { &mut a } else { &mut b };
                node.next_id().expect("generate id");
            }
        }

        // doctor node 123's view of peer 234 into the future
        let future_ts = SystemClock::new().wall_ms() + 5_000;
        {
            let mut store = StateStore::open(state_path(&config_a, 123), usize::from(MAX_NODES))
                .expect("open store of node 123");
            let mut record = store.read(234).expect("peer record");
            assert_eq!(record.id, 234);
            assert!(record.timestamp > 0);
            record.timestamp = future_ts;
            store.write(234, &record).expect("doctor record");
        }

        let mut a = IdNode::initialize(123, &config_a).expect("restart node 123");
        let mut b = IdNode::initialize(234, &config_b).expect("restart node 234");

        // node 123 answers node 234's startup request with the doctored
        // timestamp; one id request on each side moves the chatter along
        a.next_id().expect("id from node 123");
        b.next_id().expect("id from node 234");

        assert!(b.min_timestamp() >= future_ts);
    }

    #[test]
    fn ids_unavailable_before_joining_the_group() {
        let dir = TestDir::new("not-ready");
        let mut node = IdNode::open(123, &test_config(&dir, 27106)).expect("open node");
        assert!(!node.is_valid());
        assert!(matches!(node.next_id(), Err(Error::NotReady)));
    }

    #[test]
    fn node_id_out_of_range_is_rejected() {
        let dir = TestDir::new("bad-id");
        assert!(matches!(
            IdNode::open(1024, &test_config(&dir, 27107)),
            Err(Error::NodeIdRange(1024))
        ));
    }

    #[test]
    fn frozen_clock_rate_limits_advancement() {
        let dir = TestDir::new("frozen");
        let clock = MockClock::new(10_000, 400);
        let mut node =
            IdNode::open_with_clock(123, &test_config(&dir, 27108), clock).expect("open node");
        // the monotonic source never moves past the seeded mark
        assert!(matches!(node.advance(), Err(Error::RateLimited)));
    }

    #[test]
    fn advancing_clock_moves_the_high_water_mark() {
        let dir = TestDir::new("advance");
        let clock = MockClock::new(10_000, 400);
        let mut node = IdNode::open_with_clock(123, &test_config(&dir, 27109), clock.clone())
            .expect("open node");

        clock.mono.set(405);
        node.advance().expect("advance past the mark");
        assert_eq!(node.min_timestamp(), 5);
        assert_eq!(node.counter, 0);
        // written through to the store
        assert_eq!(node.store.read(123).expect("own record").timestamp, 5);
    }

    #[test]
    fn adjust_re_anchors_the_monotonic_delta() {
        let dir = TestDir::new("adjust");
        let clock = MockClock::new(10_000, 400);
        let mut node = IdNode::open_with_clock(123, &test_config(&dir, 27110), clock.clone())
            .expect("open node");

        node.adjust(50_000).expect("adopt high-water mark");
        assert_eq!(node.min_timestamp(), 50_000);
        assert_eq!(node.now_ms(), 50_000);

        clock.mono.set(410);
        assert_eq!(node.now_ms(), 50_010);
    }
}
