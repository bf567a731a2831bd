//! Replay: a second, independent console re-running a recorded session.
//!
//! Replay never shares state with the live machine. It builds its own
//! [`Console`] from the same ROM, runs on its own thread, and receives
//! the coordinates to advance to as messages; the only thing the two
//! cores have in common is the audio sink the replay feeds. Input comes
//! from the recorded stream; once it runs dry the replay ends cleanly
//! with the end-of-input sentinel.

use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread::{self, JoinHandle};

use vcs_core::types::Coordinates;

use crate::cartridge::MapperKind;
use crate::driver::Console;
use crate::input::InputEvent;
use crate::VcsError;

/// Advance `console` to `target`, applying recorded events at scanline
/// boundaries and forwarding mixed audio to the sink per frame.
fn advance_to(
    console: &mut Console,
    target: Coordinates,
    recording: &[(Coordinates, InputEvent)],
    next_event: &mut usize,
    audio_sink: &Sender<Vec<u8>>,
) {
    while console.coordinates() < target {
        let report = console.tick();
        if report.new_scanline {
            let at = console.coordinates();
            let mut rewired = false;
            while *next_event < recording.len() && recording[*next_event].0 <= at {
                console.input.apply_event(recording[*next_event].1);
                *next_event += 1;
                rewired = true;
            }
            if rewired {
                let input = console.input.clone();
                input.wire(&mut console.bus.riot, &mut console.bus.tia);
            }
        }
        if report.new_frame {
            let _ = audio_sink.send(console.tv.take_audio());
        }
    }
}

/// Run a whole recording from power-on and return the final console.
/// The end-of-input sentinel is the clean exit: the replay stops at the
/// last recorded coordinates.
pub fn replay_recording(
    rom: Vec<u8>,
    kind: Option<MapperKind>,
    recording: &[(Coordinates, InputEvent)],
    audio_sink: &Sender<Vec<u8>>,
) -> Result<Console, VcsError> {
    let mut console = Console::new();
    console.insert_cartridge(rom, kind)?;
    let end = match recording.last() {
        Some((at, _)) => *at,
        None => return Err(VcsError::EndOfInput),
    };
    let mut next_event = 0;
    advance_to(&mut console, end, recording, &mut next_event, audio_sink);
    Ok(console)
}

/// Handle to a replay running on its own scheduler thread.
pub struct Replay {
    targets: Sender<Coordinates>,
    handle: JoinHandle<Result<(), VcsError>>,
}

impl Replay {
    /// Start a replay core. Coordinates sent through [`Replay::seek`]
    /// are processed in order; dropping the handle ends the thread.
    pub fn spawn(
        rom: Vec<u8>,
        kind: Option<MapperKind>,
        recording: Vec<(Coordinates, InputEvent)>,
        audio_sink: Sender<Vec<u8>>,
    ) -> Result<Self, VcsError> {
        // build the console up-front so cartridge errors surface here
        let mut console = Console::new();
        console.insert_cartridge(rom, kind)?;

        let (targets, target_rx): (Sender<Coordinates>, Receiver<Coordinates>) = channel();
        let handle = thread::spawn(move || {
            let mut next_event = 0;
            while let Ok(target) = target_rx.recv() {
                advance_to(
                    &mut console,
                    target,
                    &recording,
                    &mut next_event,
                    &audio_sink,
                );
            }
            Ok(())
        });
        Ok(Self { targets, handle })
    }

    /// Ask the replay to advance to the given coordinates.
    pub fn seek(&self, to: Coordinates) {
        let _ = self.targets.send(to);
    }

    /// Close the coordinate stream and wait for the thread.
    pub fn finish(self) -> Result<(), VcsError> {
        drop(self.targets);
        match self.handle.join() {
            Ok(result) => result,
            Err(_) => Err(VcsError::ReplayPanicked),
        }
    }
}
