//! Latest telemetry per wand
//!
//! Snapshots are replaced, never deleted: a wand that reconnects from the same
//! address finds its previous snapshot still in place.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::net::SocketAddr;

use crate::protocol::frame::{Quaternion, Telemetry};
use crate::protocol::sequence::{is_stale, INITIAL_SEQ};

/// Most recent state reported by one wand
#[derive(Debug, Clone, Serialize)]
pub struct TelemetrySnapshot {
    pub address: SocketAddr,
    pub plugged_in: bool,
    pub charged: bool,
    pub battery_volts: f32,
    pub button: bool,
    pub quaternion: Quaternion,
    /// Highest accepted UDP sequence number
    pub seq_num: u8,
    /// Frames applied to this snapshot
    pub frames: u64,
    /// UDP datagrams rejected as stale
    pub stale_dropped: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

impl TelemetrySnapshot {
    pub fn new(address: SocketAddr) -> Self {
        Self {
            address,
            plugged_in: false,
            charged: false,
            battery_volts: 0.0,
            button: false,
            quaternion: Quaternion::default(),
            seq_num: INITIAL_SEQ,
            frames: 0,
            stale_dropped: 0,
            updated_at: None,
        }
    }

    fn apply(&mut self, telemetry: &Telemetry) {
        self.plugged_in = telemetry.plugged_in;
        self.charged = telemetry.charged;
        self.battery_volts = telemetry.battery_volts;
        self.button = telemetry.button;
        self.quaternion = telemetry.quaternion;
        self.frames += 1;
        self.updated_at = Some(Utc::now());
    }

    pub fn telemetry(&self) -> Telemetry {
        Telemetry {
            plugged_in: self.plugged_in,
            charged: self.charged,
            battery_volts: self.battery_volts,
            button: self.button,
            quaternion: self.quaternion,
        }
    }
}

/// Outcome of offering a sequenced frame to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceVerdict {
    Accepted,
    Stale,
}

/// Concurrent map of wand address to latest snapshot
#[derive(Default)]
pub struct TelemetryStore {
    snapshots: DashMap<SocketAddr, TelemetrySnapshot>,
}

impl TelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure a snapshot exists for `addr`, keeping any previous one
    pub fn ensure(&self, addr: SocketAddr) {
        self.snapshots
            .entry(addr)
            .or_insert_with(|| TelemetrySnapshot::new(addr));
    }

    /// Apply telemetry from an unsequenced (TCP) frame
    pub fn update(&self, addr: SocketAddr, telemetry: &Telemetry) {
        self.snapshots
            .entry(addr)
            .or_insert_with(|| TelemetrySnapshot::new(addr))
            .apply(telemetry);
    }

    /// Apply telemetry from a sequenced (UDP) frame unless it is stale.
    /// A stale frame leaves the snapshot, including `seq_num`, untouched apart
    /// from the drop counter.
    pub fn update_sequenced(&self, addr: SocketAddr, seq_num: u8, telemetry: &Telemetry) -> SequenceVerdict {
        let mut entry = self
            .snapshots
            .entry(addr)
            .or_insert_with(|| TelemetrySnapshot::new(addr));
        let snapshot = entry.value_mut();

        if is_stale(seq_num, snapshot.seq_num) {
            snapshot.stale_dropped += 1;
            return SequenceVerdict::Stale;
        }
        snapshot.seq_num = seq_num;
        snapshot.apply(telemetry);
        SequenceVerdict::Accepted
    }

    pub fn get(&self, addr: &SocketAddr) -> Option<TelemetrySnapshot> {
        self.snapshots.get(addr).map(|s| s.value().clone())
    }

    /// All snapshots, ordered by address
    pub fn all(&self) -> Vec<TelemetrySnapshot> {
        let mut all: Vec<_> = self.snapshots.iter().map(|s| s.value().clone()).collect();
        all.sort_by_key(|s| s.address);
        all
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "10.0.0.7:40000".parse().unwrap()
    }

    fn telemetry(button: bool) -> Telemetry {
        Telemetry {
            button,
            battery_volts: 3.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_update_replaces_snapshot() {
        let store = TelemetryStore::new();
        store.update(addr(), &telemetry(true));
        store.update(addr(), &telemetry(false));

        let snapshot = store.get(&addr()).unwrap();
        assert!(!snapshot.button);
        assert_eq!(snapshot.frames, 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_ensure_keeps_previous_snapshot() {
        let store = TelemetryStore::new();
        store.update(addr(), &telemetry(true));
        store.ensure(addr());
        assert!(store.get(&addr()).unwrap().button);
    }

    #[test]
    fn test_stale_datagrams_leave_snapshot_untouched() {
        let store = TelemetryStore::new();
        assert_eq!(store.update_sequenced(addr(), 10, &telemetry(false)), SequenceVerdict::Accepted);

        for seq in 1..=10u8 {
            assert_eq!(store.update_sequenced(addr(), seq, &telemetry(true)), SequenceVerdict::Stale);
        }
        let snapshot = store.get(&addr()).unwrap();
        assert_eq!(snapshot.seq_num, 10);
        assert!(!snapshot.button);
        assert_eq!(snapshot.stale_dropped, 10);

        assert_eq!(store.update_sequenced(addr(), 11, &telemetry(true)), SequenceVerdict::Accepted);
        let snapshot = store.get(&addr()).unwrap();
        assert_eq!(snapshot.seq_num, 11);
        assert!(snapshot.button);
    }

    #[test]
    fn test_sequence_wraps_forward() {
        let store = TelemetryStore::new();
        store.update_sequenced(addr(), 255, &telemetry(false));
        // 255 is the initial value, so the first 255 is a duplicate
        assert_eq!(store.get(&addr()).unwrap().frames, 0);

        assert_eq!(store.update_sequenced(addr(), 0, &telemetry(true)), SequenceVerdict::Accepted);
        assert_eq!(store.get(&addr()).unwrap().seq_num, 0);
    }

    #[test]
    fn test_large_jump_back_is_accepted() {
        let store = TelemetryStore::new();
        store.update_sequenced(addr(), 10, &telemetry(false));

        assert_eq!(store.update_sequenced(addr(), 250, &telemetry(true)), SequenceVerdict::Accepted);
        let snapshot = store.get(&addr()).unwrap();
        assert_eq!(snapshot.seq_num, 250);
        assert!(snapshot.button);
        assert_eq!(snapshot.stale_dropped, 0);
    }
}
