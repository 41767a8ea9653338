use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// The two time readings the coordinator needs.
///
/// `wall_ms` may jump forward or backward (NTP steps, manual changes);
/// `mono_ms` never decreases but has an arbitrary origin. The node anchors
/// issuance on the monotonic reading plus a delta captured whenever the
/// high-water mark moves, so identifiers stay monotonic across wall-clock
/// jumps.
///
/// Tests can substitute a mock source; production code uses [`SystemClock`].
pub trait TimeSource {
    /// Current wall-clock time in milliseconds since the Unix epoch.
    fn wall_ms(&self) -> u64;

    /// Monotonic milliseconds from an arbitrary origin.
    fn mono_ms(&self) -> u64;
}

/// System-backed time source.
///
/// The monotonic reading is measured from clock construction, which is fine
/// for the delta discipline: only differences of `mono_ms` readings ever
/// matter.
#[derive(Copy, Clone, Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemClock {
    fn wall_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before Unix epoch")
            .as_millis() as u64
    }

    fn mono_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;

    #[test]
    fn monotonic_reading_never_decreases() {
        let clock = SystemClock::new();
        let first = clock.mono_ms();
        std::thread::sleep(Duration::from_millis(5));
        let second = clock.mono_ms();
        assert!(second >= first + 4);
    }

    #[test]
    fn wall_reading_is_past_2020() {
        let clock = SystemClock::new();
        assert!(clock.wall_ms() > 1_577_836_800_000);
    }
}
