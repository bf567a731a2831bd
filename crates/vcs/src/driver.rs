//! The master clock driver.
//!
//! Everything in the machine is owned here and advanced one color clock
//! at a time: the CPU is offered a bus cycle every third color clock
//! (subject to the RDY line), the RIOT and cartridge step per machine
//! cycle, the TIA renders its pixel, and the television consumes it.
//! The CPU runs *before* the TIA renders the clock's pixel, so a write
//! landing on this clock is visible in this clock's pixel, as on real
//! hardware.
//!
//! [`Console`] is the pure state machine - everything in it clones and
//! serializes, which is what makes rewind snapshots exact. [`Driver`]
//! wraps a console with the non-snapshot harness: the input queue, the
//! instruction trace subscribers, fault collection and the rewind ring.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use vcs_core::cpu_6507::{Cpu6507, CpuFault, StepResult, Trace};
use vcs_core::log;
use vcs_core::logging::{LogCategory, LogLevel};
use vcs_core::types::Coordinates;

use crate::bus::VcsBus;
use crate::cartridge::{BankState, Cartridge, MapperKind};
use crate::input::{InputEvent, InputPort, InputQueue, InputState};
use crate::palette::TvSpec;
use crate::rewind::Rewind;
use crate::television::{FrameInfo, Television};
use crate::tracker::Tracker;
use crate::VcsError;

/// What a single color clock accomplished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// A CPU instruction completed on this clock.
    pub instruction_done: bool,
    /// The scanline counter advanced.
    pub new_scanline: bool,
    /// The television cut a frame.
    pub new_frame: bool,
}

/// Decision returned by a run loop's stop condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    Running,
    Ending,
}

/// A surfaced runtime condition with its location in emulated time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreFault {
    pub at: Coordinates,
    pub fault: CpuFault,
}

/// Per-instruction trace event for debugger subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceEvent {
    pub at: Coordinates,
    pub trace: Trace,
}

/// The complete, deterministic state of the machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Console {
    pub cpu: Cpu6507,
    pub bus: VcsBus,
    pub tv: Television,
    pub tracker: Tracker,
    pub input: InputState,
    /// Master color clock since power-on.
    color_clock: u64,
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

impl Console {
    pub fn new() -> Self {
        Self {
            cpu: Cpu6507::new(),
            bus: VcsBus::new(),
            tv: Television::new(TvSpec::Ntsc),
            tracker: Tracker::new(),
            input: InputState::new(),
            color_clock: 0,
        }
    }

    /// Mount a cartridge and cold-start the machine.
    pub fn insert_cartridge(&mut self, rom: Vec<u8>, kind: Option<MapperKind>) -> Result<(), VcsError> {
        let cartridge = Cartridge::new(rom, kind)?;
        log!(
            LogCategory::Cartridge,
            LogLevel::Info,
            "cartridge mounted: {:?}, {} bytes",
            cartridge.kind(),
            cartridge.rom_size()
        );
        self.bus.insert_cartridge(cartridge);
        self.reset();
        Ok(())
    }

    /// Cold start: chips to power-on state, CPU through the reset
    /// vector, input wiring re-applied.
    pub fn reset(&mut self) {
        self.bus.reset();
        self.tv.reset();
        self.cpu = Cpu6507::new();
        self.cpu.reset(&mut self.bus);
        self.color_clock = 0;
        let input = self.input.clone();
        input.wire(&mut self.bus.riot, &mut self.bus.tia);
    }

    pub fn coordinates(&self) -> Coordinates {
        self.tv.coordinates()
    }

    pub fn color_clock(&self) -> u64 {
        self.color_clock
    }

    /// Total CPU bus cycles executed and cycles lost to RDY stalls.
    pub fn cpu_cycles(&self) -> (u64, u64) {
        (self.cpu.cycles, self.cpu.stalled_cycles)
    }

    pub fn frame_info(&self) -> FrameInfo {
        self.tv.frame_info()
    }

    pub fn bank(&self) -> Option<BankState> {
        self.bus.cartridge.as_ref().map(|c| c.bank())
    }

    /// Side-effect-free read of any bus address.
    pub fn peek(&self, addr: u16) -> u8 {
        self.bus.peek(addr)
    }

    /// Advance the machine one color clock.
    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();

        if self.color_clock % 3 == 0 {
            if self.cpu.step(&mut self.bus) == StepResult::Done {
                report.instruction_done = true;
            }
            self.bus.riot.step_machine_cycle();
            if let Some(cart) = &mut self.bus.cartridge {
                cart.step_machine_cycle();
            }
            if let Some(channel) = self.bus.tia.take_audio_write() {
                let at = self.tv.coordinates();
                let spec = self.tv.spec();
                let (audc, audf, audv) = if channel == 0 {
                    let a = &self.bus.tia.audio0;
                    (a.audc, a.audf, a.audv)
                } else {
                    let a = &self.bus.tia.audio1;
                    (a.audc, a.audf, a.audv)
                };
                self.tracker.record(spec, at, channel, audc, audf, audv);
            }
        }

        let signal = self.bus.tia.step_clock();
        self.tv.consume(signal);
        self.color_clock += 1;

        report.new_frame = self.tv.take_frame_ready();
        report.new_scanline = self.tv.coordinates().clock == 0;
        report
    }

    /// Export the complete state as a JSON document.
    pub fn save_state(&self) -> Value {
        serde_json::json!({
            "version": 1,
            "system": "vcs",
            "state": self,
        })
    }

    /// Restore a state exported by [`Console::save_state`].
    pub fn load_state(&mut self, v: &Value) -> Result<(), VcsError> {
        let version = v["version"].as_u64().unwrap_or(0);
        let system = v["system"].as_str().unwrap_or("");
        if version != 1 || system != "vcs" {
            return Err(VcsError::BadState);
        }
        *self = serde_json::from_value(v["state"].clone())?;
        Ok(())
    }
}

/// Console plus harness: input queue, traces, faults, rewind.
pub struct Driver {
    pub console: Console,
    input_queue: InputQueue,
    input_port: InputPort,
    input_recording: Vec<(Coordinates, InputEvent)>,
    trace_sinks: Vec<Box<dyn FnMut(TraceEvent) + Send>>,
    faults: Vec<CoreFault>,
    rewind: Rewind,
}

impl Default for Driver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver {
    pub fn new() -> Self {
        let (input_queue, input_port) = InputPort::new();
        Self {
            console: Console::new(),
            input_queue,
            input_port,
            input_recording: Vec::new(),
            trace_sinks: Vec::new(),
            faults: Vec::new(),
            rewind: Rewind::new(),
        }
    }

    /// Handle for frontends to post controller input; clone freely.
    pub fn input_queue(&self) -> InputQueue {
        self.input_queue.clone()
    }

    /// Subscribe to per-instruction trace events.
    pub fn subscribe_trace(&mut self, sink: Box<dyn FnMut(TraceEvent) + Send>) {
        self.trace_sinks.push(sink);
    }

    /// Drain surfaced faults (unknown opcodes, PC wraps, bus strictness).
    pub fn take_faults(&mut self) -> Vec<CoreFault> {
        std::mem::take(&mut self.faults)
    }

    /// The recorded input stream (coordinates at which events applied).
    pub fn input_recording(&self) -> &[(Coordinates, InputEvent)] {
        &self.input_recording
    }

    /// Snapshot interval in frames (default 1).
    pub fn set_rewind_interval(&mut self, frames: u32) {
        self.rewind.set_interval(frames);
    }

    /// Advance one color clock, servicing the harness.
    pub fn tick(&mut self) -> TickReport {
        let report = self.console.tick();

        if report.instruction_done {
            if let Some(fault) = self.console.cpu.take_fault() {
                let at = self.console.coordinates();
                log!(
                    LogCategory::Cpu,
                    LogLevel::Warn,
                    "cpu fault at {at}: {:02X} {:?}",
                    fault.opcode,
                    fault.kind
                );
                self.faults.push(CoreFault { at, fault });
            }
            if !self.trace_sinks.is_empty() {
                let event = TraceEvent {
                    at: self.console.coordinates(),
                    trace: self.console.cpu.last_trace(),
                };
                for sink in &mut self.trace_sinks {
                    sink(event);
                }
            }
        }

        if report.new_scanline {
            let at = self.console.coordinates();
            if self
                .input_port
                .drain(&mut self.console.input, at, &mut self.input_recording)
            {
                let input = self.console.input.clone();
                input.wire(&mut self.console.bus.riot, &mut self.console.bus.tia);
            }
        }

        if report.new_frame {
            self.rewind.observe_frame(&self.console);
        }

        report
    }

    /// Run to the next CPU instruction boundary.
    pub fn step_instruction(&mut self) {
        loop {
            if self.tick().instruction_done {
                return;
            }
        }
    }

    /// Run to the start of the next scanline.
    pub fn step_scanline(&mut self) {
        loop {
            if self.tick().new_scanline {
                return;
            }
        }
    }

    /// Run until the television cuts a frame.
    pub fn step_frame(&mut self) {
        loop {
            if self.tick().new_frame {
                return;
            }
        }
    }

    /// Run frames until the stop condition says [`LoopControl::Ending`];
    /// the in-progress frame always completes.
    pub fn run_until<F>(&mut self, mut stop: F) -> Result<(), VcsError>
    where
        F: FnMut(&Console) -> LoopControl,
    {
        loop {
            self.step_frame();
            if stop(&self.console) == LoopControl::Ending {
                return Err(VcsError::Stopped);
            }
        }
    }

    /// Rewind (or fast-forward) to exact coordinates by restoring the
    /// nearest snapshot and deterministically replaying forward with
    /// the recorded input stream.
    pub fn seek(&mut self, target: Coordinates) -> Result<(), VcsError> {
        let snapshot = self
            .rewind
            .nearest_not_later(target)
            .ok_or(VcsError::NoSnapshot)?;
        let mut console = snapshot.console.clone();
        let recording = self.input_recording.clone();
        let mut next_event = recording.partition_point(|(at, _)| *at <= snapshot.at);

        while console.coordinates() < target {
            let report = console.tick();
            if report.new_scanline {
                let at = console.coordinates();
                let mut rewired = false;
                while next_event < recording.len() && recording[next_event].0 <= at {
                    console.input.apply_event(recording[next_event].1);
                    next_event += 1;
                    rewired = true;
                }
                if rewired {
                    let input = console.input.clone();
                    input.wire(&mut console.bus.riot, &mut console.bus.tia);
                }
            }
        }
        log!(
            LogCategory::Driver,
            LogLevel::Info,
            "seek complete at {}",
            console.coordinates()
        );
        self.console = console;
        Ok(())
    }
}
