//! Cycle-accurate Atari 2600 (VCS) emulation core.
//!
//! The machine has no frame buffer: the CPU races the electron beam,
//! reprogramming the TIA every scanline, so the whole emulator is built
//! around a single master clock that steps the chips in their exact
//! hardware ratio - three color clocks per CPU cycle, 228 per scanline,
//! one audio sample every 114. The [`driver::Driver`] owns everything
//! and exposes deterministic stepping; the [`television::Television`]
//! turns the TIA signal into frames and samples for whatever frontend
//! sits on top.

#![allow(clippy::upper_case_acronyms)]

pub mod bus;
pub mod cartridge;
pub mod driver;
pub mod input;
pub mod palette;
pub mod replay;
pub mod rewind;
pub mod riot;
pub mod television;
pub mod tia;
pub mod tracker;

use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;

pub use cartridge::{Cartridge, CartridgeError, MapperKind};
pub use driver::{Console, Driver, LoopControl, TickReport};
pub use input::{InputEvent, InputQueue};
pub use palette::TvSpec;
pub use vcs_core::types::{Coordinates, Frame, Signal};

/// Errors surfaced by the emulation core. Runtime conditions carry the
/// coordinates and PC where they occurred; sentinels (`Stopped`,
/// `EndOfInput`) are clean exits, not failures.
#[derive(Debug, Error)]
pub enum VcsError {
    #[error("cartridge error: {0}")]
    Cartridge(#[from] CartridgeError),
    #[error("no cartridge loaded")]
    NoCartridge,
    #[error("save state rejected: wrong system or version")]
    BadState,
    #[error("state serialization error: {0}")]
    State(#[from] serde_json::Error),
    #[error("no snapshot covers the requested coordinates")]
    NoSnapshot,
    #[error("stop requested")]
    Stopped,
    #[error("end of recorded input")]
    EndOfInput,
    #[error("replay thread panicked")]
    ReplayPanicked,
}

/// A driver behind a coarse critical section.
///
/// The core itself is single-threaded; presentation, audio and
/// inspection threads synchronize on this one lock, so a reader can
/// never observe state from the middle of a color clock.
#[derive(Clone)]
pub struct SharedConsole {
    inner: Arc<Mutex<Driver>>,
}

impl Default for SharedConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedConsole {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Driver::new())),
        }
    }

    pub fn from_driver(driver: Driver) -> Self {
        Self {
            inner: Arc::new(Mutex::new(driver)),
        }
    }

    /// Enter the critical section.
    pub fn lock(&self) -> MutexGuard<'_, Driver> {
        self.inner.lock().expect("core critical section poisoned")
    }

    /// Run one frame inside the critical section.
    pub fn step_frame(&self) {
        self.lock().step_frame();
    }
}
