//! Controller ports and console switches.
//!
//! The core never sees real hardware, only line states: port A carries
//! the joystick/keypad/paddle-button lines, port B the console
//! switches, and the TIA input ports carry buttons and the paddle
//! capacitors. Frontends push [`InputEvent`]s through a drop-never MPSC
//! queue; the driver drains it at scanline boundaries and rewires the
//! chips. The applied events are also recorded with their coordinates
//! so a rewind can replay them deterministically.

use std::sync::mpsc::{channel, Receiver, Sender};

use serde::{Deserialize, Serialize};
use vcs_core::types::Coordinates;

use crate::riot::Riot;
use crate::tia::Tia;

/// Controller port selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Port {
    Left,
    Right,
}

/// Joystick line state; `true` means pressed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Joystick {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
    pub fire: bool,
}

/// Console switches; difficulty `true` means the Pro (A) position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Switches {
    pub reset: bool,
    pub select: bool,
    pub color: bool,
    pub left_difficulty_pro: bool,
    pub right_difficulty_pro: bool,
}

impl Default for Switches {
    fn default() -> Self {
        Self {
            reset: false,
            select: false,
            color: true,
            left_difficulty_pro: false,
            right_difficulty_pro: false,
        }
    }
}

/// What is plugged into a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerKind {
    Joystick,
    Paddles,
    Keypad,
}

/// One frontend input change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputEvent {
    Plug(Port, ControllerKind),
    Joystick(Port, Joystick),
    /// Paddle index 0-3 and its resistance (0 = fully turned).
    Paddle(usize, u8),
    PaddleFire(usize, bool),
    /// Key 0-11 (row-major 4x3), or `None` for release.
    Keypad(Port, Option<u8>),
    Switches(Switches),
}

/// Current state of everything plugged into the console.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputState {
    kind: [ControllerKind; 2],
    joystick: [Joystick; 2],
    paddle_resistance: [u8; 4],
    paddle_fire: [bool; 4],
    keypad: [Option<u8>; 2],
    pub switches: Switches,
}

impl Default for InputState {
    fn default() -> Self {
        Self::new()
    }
}

impl InputState {
    pub fn new() -> Self {
        Self {
            kind: [ControllerKind::Joystick; 2],
            joystick: [Joystick::default(); 2],
            paddle_resistance: [0x80; 4],
            paddle_fire: [false; 4],
            keypad: [None; 2],
            switches: Switches::default(),
        }
    }

    pub fn apply_event(&mut self, event: InputEvent) {
        match event {
            InputEvent::Plug(port, kind) => self.kind[port as usize] = kind,
            InputEvent::Joystick(port, stick) => self.joystick[port as usize] = stick,
            InputEvent::Paddle(index, resistance) => {
                self.paddle_resistance[index & 3] = resistance;
            }
            InputEvent::PaddleFire(index, pressed) => self.paddle_fire[index & 3] = pressed,
            InputEvent::Keypad(port, key) => self.keypad[port as usize] = key,
            InputEvent::Switches(switches) => self.switches = switches,
        }
    }

    /// Joystick nibble for one port, active low, in SWCHA layout
    /// (bit 3 right, bit 2 left, bit 1 down, bit 0 up).
    fn stick_nibble(stick: Joystick) -> u8 {
        let mut nibble = 0x0F;
        if stick.up {
            nibble &= !0x01;
        }
        if stick.down {
            nibble &= !0x02;
        }
        if stick.left {
            nibble &= !0x04;
        }
        if stick.right {
            nibble &= !0x08;
        }
        nibble
    }

    /// Rewire the chips from the current state. Keypads couple port A
    /// output back into the TIA inputs, so this runs after every drain
    /// (the driver calls it at scanline boundaries).
    pub fn wire(&self, riot: &mut Riot, tia: &mut Tia) {
        // port A: joystick directions or paddle buttons or keypad rows
        let mut port_a = 0xFFu8;
        for (slot, port) in [Port::Left, Port::Right].iter().enumerate() {
            let shift = if *port == Port::Left { 4 } else { 0 };
            match self.kind[slot] {
                ControllerKind::Joystick => {
                    port_a &= !(0x0F << shift);
                    port_a |= Self::stick_nibble(self.joystick[slot]) << shift;
                }
                ControllerKind::Paddles => {
                    // paddle fire buttons ground the direction lines
                    let pair = slot * 2;
                    if self.paddle_fire[pair] {
                        port_a &= !(0x04 << shift);
                    }
                    if self.paddle_fire[pair + 1] {
                        port_a &= !(0x08 << shift);
                    }
                }
                ControllerKind::Keypad => {}
            }
        }
        riot.set_port_a_lines(port_a);

        // port B: console switches, active low
        let mut port_b = 0xFFu8;
        if self.switches.reset {
            port_b &= !0x01;
        }
        if self.switches.select {
            port_b &= !0x02;
        }
        if !self.switches.color {
            port_b &= !0x08;
        }
        if !self.switches.left_difficulty_pro {
            port_b &= !0x40;
        }
        if !self.switches.right_difficulty_pro {
            port_b &= !0x80;
        }
        riot.set_port_b_lines(port_b);

        // TIA inputs per port
        for (slot, port) in [Port::Left, Port::Right].iter().enumerate() {
            let button = if *port == Port::Left { 0 } else { 1 };
            match self.kind[slot] {
                ControllerKind::Joystick => {
                    tia.set_button(button, !self.joystick[slot].fire);
                    tia.set_paddle(slot * 2, 0xFF);
                    tia.set_paddle(slot * 2 + 1, 0xFF);
                }
                ControllerKind::Paddles => {
                    tia.set_button(button, true);
                    tia.set_paddle(slot * 2, self.paddle_resistance[slot * 2]);
                    tia.set_paddle(slot * 2 + 1, self.paddle_resistance[slot * 2 + 1]);
                }
                ControllerKind::Keypad => {
                    self.wire_keypad(slot, riot, tia, button);
                }
            }
        }
    }

    /// Keypad matrix: SWCHA drives the four row lines (high nibble for
    /// the left port), the three column lines come back on INPT0/1/4
    /// (left) or INPT2/3/5 (right). A column reads low when its key's
    /// row line is driven low.
    fn wire_keypad(&self, slot: usize, riot: &mut Riot, tia: &mut Tia, button: usize) {
        let rows = if slot == 0 {
            riot.peek(0x00) >> 4
        } else {
            riot.peek(0x00) & 0x0F
        };
        let mut columns = [true; 3];
        if let Some(key) = self.keypad[slot] {
            let row = (key / 3) as u8;
            let col = (key % 3) as usize;
            if rows & (0x08 >> row) == 0 {
                columns[col] = false;
            }
        }
        tia.set_inpt03_line(slot * 2, columns[0]);
        tia.set_inpt03_line(slot * 2 + 1, columns[1]);
        tia.set_button(button, columns[2]);
    }
}

/// Sender half of the input queue; clone freely across threads.
#[derive(Debug, Clone)]
pub struct InputQueue {
    tx: Sender<InputEvent>,
}

impl InputQueue {
    /// Post an event; never blocks, never drops while the console
    /// lives.
    pub fn post(&self, event: InputEvent) {
        let _ = self.tx.send(event);
    }
}

/// Console-side receiver; drained at scanline boundaries.
#[derive(Debug)]
pub struct InputPort {
    rx: Receiver<InputEvent>,
}

impl InputPort {
    pub fn new() -> (InputQueue, InputPort) {
        let (tx, rx) = channel();
        (InputQueue { tx }, InputPort { rx })
    }

    /// Drain pending events into the state, recording each with the
    /// coordinates it took effect at.
    pub fn drain(
        &mut self,
        state: &mut InputState,
        at: Coordinates,
        recording: &mut Vec<(Coordinates, InputEvent)>,
    ) -> bool {
        let mut any = false;
        while let Ok(event) = self.rx.try_recv() {
            state.apply_event(event);
            recording.push((at, event));
            any = true;
        }
        any
    }
}
