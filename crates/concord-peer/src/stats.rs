use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct Stats {
    sent: AtomicU64,
    send_fail: AtomicU64,
    recv: AtomicU64,
    recv_fail: AtomicU64,
}

impl Stats {
    pub fn inc_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_send_fail(&self) {
        self.send_fail.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_recv(&self) {
        self.recv.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_recv_fail(&self) {
        self.recv_fail.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            sent: self.sent.load(Ordering::Relaxed),
            send_fail: self.send_fail.load(Ordering::Relaxed),
            recv: self.recv.load(Ordering::Relaxed),
            recv_fail: self.recv_fail.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, PartialEq)]
pub struct StatsSnapshot {
    pub sent: u64,
    #[serde(rename = "sendFail")]
    pub send_fail: u64,
    pub recv: u64,
    #[serde(rename = "recvFail")]
    pub recv_fail: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let stats = Stats::default();
        assert_eq!(stats.snapshot(), StatsSnapshot { sent: 0, send_fail: 0, recv: 0, recv_fail: 0 });
    }

    #[test]
    fn counters_increment_independently() {
        let stats = Stats::default();
        stats.inc_sent();
        stats.inc_sent();
        stats.inc_recv_fail();
        let snap = stats.snapshot();
        assert_eq!(snap.sent, 2);
        assert_eq!(snap.recv_fail, 1);
        assert_eq!(snap.send_fail, 0);
    }
}
