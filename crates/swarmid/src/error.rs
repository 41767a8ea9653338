pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the id-generation core.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The configured node identifier does not fit the 10-bit id field.
    #[error("node id {0} exceeds the 10-bit limit")]
    NodeIdRange(u16),

    /// A record index beyond the fixed store capacity.
    #[error("record index {index} out of range (capacity {capacity})")]
    RecordIndex { index: u16, capacity: usize },

    /// State-store open, read, or write failure.
    #[error("state store I/O failed: {0}")]
    Store(#[source] std::io::Error),

    /// Socket open, bind, group-join, send, or receive failure.
    #[error("transport failed: {0}")]
    Transport(#[source] std::io::Error),

    /// Another live node announced the same node id. Terminal: the node
    /// refuses to issue identifiers from this point on.
    #[error("node id {0} is claimed by another live peer")]
    Collision(u16),

    /// The node has not completed its group join.
    #[error("node is not initialized")]
    NotReady,

    /// The clock could not be pushed past the high-water mark even after
    /// backing off. A later call may succeed.
    #[error("could not advance past the high-water mark; retry later")]
    RateLimited,
}
