use std::time::Duration;

/// Reference window: a peer that stays silent for this long is dropped.
pub const DEFAULT_PONG_WAIT: Duration = Duration::from_secs(10);

/// Ping/pong timing for one connection.
///
/// The read side waits at most `pong_wait` for the next pong before giving up
/// on the peer; the write side pings every `ping_interval()`, which is 9/10 of
/// that window so a probe always goes out before the deadline can expire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Liveness {
    pub pong_wait: Duration,
}

impl Liveness {
    pub fn new(pong_wait: Duration) -> Self {
        Self { pong_wait }
    }

    pub fn from_millis(pong_wait_ms: u64) -> Self {
        Self::new(Duration::from_millis(pong_wait_ms))
    }

    pub fn ping_interval(&self) -> Duration {
        self.pong_wait * 9 / 10
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new(DEFAULT_PONG_WAIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_timings() {
        let l = Liveness::default();
        assert_eq!(l.pong_wait, Duration::from_secs(10));
        assert_eq!(l.ping_interval(), Duration::from_secs(9));
    }

    #[test]
    fn ping_interval_is_shorter_than_pong_wait() {
        for ms in [10, 100, 1_000, 45_000] {
            let l = Liveness::from_millis(ms);
            assert!(l.ping_interval() < l.pong_wait, "{ms}ms");
        }
    }

    #[test]
    fn compressed_timings_for_tests() {
        let l = Liveness::from_millis(200);
        assert_eq!(l.ping_interval(), Duration::from_millis(180));
    }
}
