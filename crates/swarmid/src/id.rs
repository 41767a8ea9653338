use core::fmt;

/// Number of distinct node identifiers a coordination group can hold.
pub const MAX_NODES: u16 = 1 << SwarmId::NODE_ID_BITS;

/// A 64-bit identifier unique across every node of a coordination group.
///
/// - 44 bits high-water timestamp (milliseconds)
/// - 10 bits per-millisecond counter
/// - 10 bits node id
///
/// ```text
/// | timestamp (44) | counter (10) | node_id (10) |
/// ```
///
/// Identifiers from a single node sort strictly by issuance order; ties
/// across nodes in the same millisecond are broken by node id.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SwarmId {
    id: u64,
}

impl SwarmId {
    pub const TIMESTAMP_BITS: u32 = 44;
    pub const COUNTER_BITS: u32 = 10;
    pub const NODE_ID_BITS: u32 = 10;

    /// Bitmask for the 44-bit millisecond timestamp field (bits 20..=63).
    pub const TIMESTAMP_MASK: u64 = (1 << Self::TIMESTAMP_BITS) - 1;

    /// Bitmask for the 10-bit counter field (bits 10..=19).
    pub const COUNTER_MASK: u64 = (1 << Self::COUNTER_BITS) - 1;

    /// Bitmask for the 10-bit node id field (bits 0..=9).
    pub const NODE_ID_MASK: u64 = (1 << Self::NODE_ID_BITS) - 1;

    pub const TIMESTAMP_SHIFT: u32 = Self::COUNTER_BITS + Self::NODE_ID_BITS;
    pub const COUNTER_SHIFT: u32 = Self::NODE_ID_BITS;

    /// Packs the three fields into an identifier.
    ///
    /// The timestamp is truncated to its 44-bit field.
    ///
    /// # Panics
    ///
    /// Panics if `counter` or `node_id` does not fit its 10-bit field. Both
    /// are programmer errors: the issuing node enforces the ranges before
    /// composing an identifier.
    pub const fn from_parts(timestamp: u64, counter: u16, node_id: u16) -> Self {
        assert!(
            counter as u64 <= Self::COUNTER_MASK,
            "counter exceeds its 10-bit field"
        );
        assert!(
            node_id as u64 <= Self::NODE_ID_MASK,
            "node id exceeds its 10-bit field"
        );
        let timestamp = (timestamp & Self::TIMESTAMP_MASK) << Self::TIMESTAMP_SHIFT;
        let counter = (counter as u64) << Self::COUNTER_SHIFT;
        Self {
            id: timestamp | counter | node_id as u64,
        }
    }

    /// Extracts the millisecond timestamp.
    pub const fn timestamp(&self) -> u64 {
        (self.id >> Self::TIMESTAMP_SHIFT) & Self::TIMESTAMP_MASK
    }

    /// Extracts the per-millisecond counter.
    pub const fn counter(&self) -> u16 {
        ((self.id >> Self::COUNTER_SHIFT) & Self::COUNTER_MASK) as u16
    }

    /// Extracts the issuing node's id.
    pub const fn node_id(&self) -> u16 {
        (self.id & Self::NODE_ID_MASK) as u16
    }

    /// Returns the raw packed value.
    pub const fn to_u64(&self) -> u64 {
        self.id
    }

    /// Reinterprets a raw packed value.
    pub const fn from_u64(raw: u64) -> Self {
        Self { id: raw }
    }
}

impl fmt::Display for SwarmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl fmt::LowerHex for SwarmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.id, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_and_unpacks_all_fields() {
        let id = SwarmId::from_parts(SwarmId::TIMESTAMP_MASK, 1023, 1023);
        assert_eq!(id.timestamp(), SwarmId::TIMESTAMP_MASK);
        assert_eq!(id.counter(), 1023);
        assert_eq!(id.node_id(), 1023);
        assert_eq!(SwarmId::from_u64(id.to_u64()), id);
    }

    #[test]
    fn packing_matches_the_wire_formula() {
        // (timestamp << 20) | (counter << 10) | node_id
        let id = SwarmId::from_parts(1_234_567, 123, 234);
        assert_eq!(id.to_u64(), 0x12D_6871_ECEA);
        assert_eq!(id, SwarmId::from_parts(1_234_567, 123, 234));
    }

    #[test]
    fn ids_order_by_timestamp_then_counter() {
        let id = SwarmId::from_parts(1_234_567, 123, 234);
        assert_ne!(id, SwarmId::from_parts(1_234_567, 123, 235));
        assert!(id < SwarmId::from_parts(1_234_567, 124, 234));
        assert!(id < SwarmId::from_parts(1_234_568, 123, 234));
    }

    #[test]
    fn counter_boundaries_preserve_order() {
        let id1 = SwarmId::from_parts(1_234_567, 1022, 123);
        let id2 = SwarmId::from_parts(1_234_567, 1023, 123);
        assert!(id1 < id2);
        assert!(id1 > SwarmId::from_parts(1_234_567, 0, 123));
    }

    #[test]
    fn node_id_boundaries_preserve_order() {
        let id1 = SwarmId::from_parts(1_234_567, 123, 1022);
        let id2 = SwarmId::from_parts(1_234_567, 123, 1023);
        assert!(id1 < id2);
        assert!(id1 > SwarmId::from_parts(1_234_567, 123, 0));
    }

    #[test]
    #[should_panic(expected = "counter exceeds its 10-bit field")]
    fn counter_overflow_panics() {
        SwarmId::from_parts(1, 1024, 1);
    }

    #[test]
    #[should_panic(expected = "node id exceeds its 10-bit field")]
    fn node_id_overflow_panics() {
        SwarmId::from_parts(1, 1, 1024);
    }

    #[test]
    fn hex_rendering_matches_raw_value() {
        let id = SwarmId::from_parts(1_234_567, 123, 234);
        assert_eq!(format!("{id:x}"), format!("{:x}", id.to_u64()));
        assert_eq!(format!("{id}"), format!("{}", id.to_u64()));
    }
}
