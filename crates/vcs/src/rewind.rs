//! Rewind: periodic snapshots plus deterministic forward replay.
//!
//! A snapshot is simply a clone of the whole [`Console`] - every chip
//! state derives `Clone`, so a snapshot is exact by construction. The
//! ring keeps one snapshot every N frames (default every frame) up to a
//! bounded depth; going backward means restoring the nearest snapshot
//! not later than the target and re-running forward with the recorded
//! input stream, which the driver owns.

use serde::{Deserialize, Serialize};
use vcs_core::types::Coordinates;

use crate::driver::Console;

/// Default number of snapshots retained.
const DEFAULT_DEPTH: usize = 240;

/// One rewind point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub at: Coordinates,
    pub console: Console,
}

/// Ring of periodic snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rewind {
    snapshots: Vec<Snapshot>,
    /// Frames between snapshots.
    interval: u32,
    depth: usize,
    frames_seen: u32,
}

impl Default for Rewind {
    fn default() -> Self {
        Self::new()
    }
}

impl Rewind {
    pub fn new() -> Self {
        Self {
            snapshots: Vec::new(),
            interval: 1,
            depth: DEFAULT_DEPTH,
            frames_seen: 0,
        }
    }

    pub fn set_interval(&mut self, frames: u32) {
        self.interval = frames.max(1);
    }

    pub fn set_depth(&mut self, depth: usize) {
        self.depth = depth.max(1);
        while self.snapshots.len() > self.depth {
            self.snapshots.remove(0);
        }
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Called by the driver when the television cuts a frame.
    pub fn observe_frame(&mut self, console: &Console) {
        let due = self.frames_seen % self.interval == 0;
        self.frames_seen = self.frames_seen.wrapping_add(1);
        if !due {
            return;
        }
        self.snapshots.push(Snapshot {
            at: console.coordinates(),
            console: console.clone(),
        });
        if self.snapshots.len() > self.depth {
            self.snapshots.remove(0);
        }
    }

    /// The most recent snapshot at or before `target`.
    pub fn nearest_not_later(&self, target: Coordinates) -> Option<&Snapshot> {
        self.snapshots.iter().rev().find(|s| s.at <= target)
    }

    /// Earliest coordinates reachable by rewinding.
    pub fn horizon(&self) -> Option<Coordinates> {
        self.snapshots.first().map(|s| s.at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn console_at(frame: u32) -> Console {
        // fabricate coordinates by ticking an empty console forward
        let mut console = Console::new();
        while console.coordinates().frame < frame {
            console.tick();
        }
        console
    }

    #[test]
    fn test_snapshot_every_frame_by_default() {
        let mut rewind = Rewind::new();
        let console = Console::new();
        for _ in 0..5 {
            rewind.observe_frame(&console);
        }
        assert_eq!(rewind.len(), 5);
    }

    #[test]
    fn test_interval_skips_frames() {
        let mut rewind = Rewind::new();
        rewind.set_interval(3);
        let console = Console::new();
        for _ in 0..9 {
            rewind.observe_frame(&console);
        }
        assert_eq!(rewind.len(), 3);
    }

    #[test]
    fn test_depth_bounds_the_ring() {
        let mut rewind = Rewind::new();
        rewind.set_depth(4);
        let console = Console::new();
        for _ in 0..10 {
            rewind.observe_frame(&console);
        }
        assert_eq!(rewind.len(), 4);
    }

    #[test]
    fn test_nearest_not_later_picks_correctly() {
        let mut rewind = Rewind::new();
        for frame in [1u32, 3, 5] {
            rewind.observe_frame(&console_at(frame));
        }
        let pick = rewind
            .nearest_not_later(Coordinates::new(4, 0, 0))
            .expect("snapshot");
        assert_eq!(pick.at.frame, 3);
        // before the first snapshot there is nothing to restore
        assert!(rewind.nearest_not_later(Coordinates::new(0, 0, 0)).is_none());
    }

    #[test]
    fn test_snapshot_restores_bitwise_equal_state() {
        let console = console_at(1);
        let mut rewind = Rewind::new();
        rewind.observe_frame(&console);
        let snap = rewind
            .nearest_not_later(console.coordinates())
            .expect("snapshot");
        assert_eq!(snap.console.coordinates(), console.coordinates());
        assert_eq!(snap.console.cpu.pc, console.cpu.pc);
        assert_eq!(
            snap.console.save_state().to_string(),
            console.save_state().to_string()
        );
    }
}
