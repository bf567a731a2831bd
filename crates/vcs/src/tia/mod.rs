//! TIA (Television Interface Adapter) - the VCS video and audio chip.
//!
//! There is no framebuffer anywhere in this machine. The TIA generates
//! one pixel per color clock straight from its register file, so every
//! register write lands on the exact color clock of the CPU's write
//! cycle and can change the picture mid-scanline. The horizontal counter
//! runs 0..227; counts 0..67 are horizontal blanking (with HSYNC at
//! 16..31), counts 68..227 are the 160 visible pixels.
//!
//! A write to WSYNC drops the RDY line until the counter next wraps to
//! zero, which is how games align code with the beam. HMOVE pushes all
//! five movable objects 8 pixels right via an extended blank and then
//! returns each up to 15 pixels left through the comb, one tick every
//! four color clocks, for a net movement of -HM.

mod audio;
mod sprite;

pub use audio::AudioChannel;
pub use sprite::{Ball, Missile, Player, Sprites};

use serde::{Deserialize, Serialize};
use vcs_core::types::Signal;

/// Horizontal blanking covers counts 0..67.
pub const HBLANK_CLOCKS: u16 = 68;
/// Color clocks per scanline.
pub const CLOCKS_PER_SCANLINE: u16 = 228;

/// The fifteen two-object collision latches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collisions {
    pub m0_p0: bool,
    pub m0_p1: bool,
    pub m1_p0: bool,
    pub m1_p1: bool,
    pub p0_pf: bool,
    pub p0_bl: bool,
    pub p1_pf: bool,
    pub p1_bl: bool,
    pub m0_pf: bool,
    pub m0_bl: bool,
    pub m1_pf: bool,
    pub m1_bl: bool,
    pub bl_pf: bool,
    pub p0_p1: bool,
    pub m0_m1: bool,
}

impl Collisions {
    fn update(&mut self, p0: bool, p1: bool, m0: bool, m1: bool, bl: bool, pf: bool) {
        self.m0_p0 |= m0 && p0;
        self.m0_p1 |= m0 && p1;
        self.m1_p0 |= m1 && p0;
        self.m1_p1 |= m1 && p1;
        self.p0_pf |= p0 && pf;
        self.p0_bl |= p0 && bl;
        self.p1_pf |= p1 && pf;
        self.p1_bl |= p1 && bl;
        self.m0_pf |= m0 && pf;
        self.m0_bl |= m0 && bl;
        self.m1_pf |= m1 && pf;
        self.m1_bl |= m1 && bl;
        self.bl_pf |= bl && pf;
        self.p0_p1 |= p0 && p1;
        self.m0_m1 |= m0 && m1;
    }

    fn clear(&mut self) {
        *self = Self::default();
    }

    /// Read one of the eight CXxxxx registers (bits 7-6 only).
    fn register(&self, index: u8) -> u8 {
        let (b7, b6) = match index {
            0x0 => (self.m0_p1, self.m0_p0),
            0x1 => (self.m1_p0, self.m1_p1),
            0x2 => (self.p0_pf, self.p0_bl),
            0x3 => (self.p1_pf, self.p1_bl),
            0x4 => (self.m0_pf, self.m0_bl),
            0x5 => (self.m1_pf, self.m1_bl),
            0x6 => (self.bl_pf, false),
            _ => (self.p0_p1, self.m0_m1),
        };
        (if b7 { 0x80 } else { 0 }) | (if b6 { 0x40 } else { 0 })
    }
}

/// TIA chip state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tia {
    /// Horizontal counter, 0..227.
    hclock: u16,
    /// Scanline counter since reset, for inspection only.
    scanline: u16,

    vsync: bool,
    /// Raw VBLANK register: bit 1 blank, bit 6 input latches, bit 7
    /// paddle dump.
    vblank: u8,

    // 7-bit palette indices (COLUxx >> 1)
    colup0: u8,
    colup1: u8,
    colupf: u8,
    colubk: u8,

    ctrlpf: u8,
    pf0: u8,
    pf1: u8,
    pf2: u8,

    pub sprites: Sprites,
    pub collisions: Collisions,

    pub audio0: AudioChannel,
    pub audio1: AudioChannel,

    /// RDY is held low while set; released when the counter wraps.
    wsync: bool,
    /// HMOVE during blanking extends HBLANK by 8 clocks this line.
    late_hblank: bool,

    /// Channel index of the most recent AUDC/AUDF/AUDV write, for the
    /// audio tracker.
    audio_write: Option<u8>,

    /// Paddle capacitor charge in color clocks.
    paddle_charge: [u32; 4],
    /// Paddle resistance 0..255 from the controller port.
    paddle_resistance: [u8; 4],
    /// Keypad columns drive INPT0-3 digitally, bypassing the capacitor.
    inpt03_digital: [Option<bool>; 4],
    /// INPT4/INPT5 button lines (true = high = not pressed).
    inpt45_lines: [bool; 2],
    /// Latched INPT4/INPT5 values when VBLANK bit 6 is set.
    inpt45_latch: [bool; 2],
}

impl Default for Tia {
    fn default() -> Self {
        Self::new()
    }
}

impl Tia {
    pub fn new() -> Self {
        Self {
            hclock: 0,
            scanline: 0,
            vsync: false,
            vblank: 0,
            colup0: 0,
            colup1: 0,
            colupf: 0,
            colubk: 0,
            ctrlpf: 0,
            pf0: 0,
            pf1: 0,
            pf2: 0,
            sprites: Sprites::default(),
            collisions: Collisions::default(),
            audio0: AudioChannel::new(),
            audio1: AudioChannel::new(),
            wsync: false,
            late_hblank: false,
            audio_write: None,
            paddle_charge: [0; 4],
            paddle_resistance: [0xFF; 4],
            inpt03_digital: [None; 4],
            inpt45_lines: [true; 2],
            inpt45_latch: [true; 2],
        }
    }

    pub fn reset(&mut self) {
        let resistance = self.paddle_resistance;
        let lines = self.inpt45_lines;
        *self = Self::new();
        self.paddle_resistance = resistance;
        self.inpt45_lines = lines;
    }

    /// State of the RDY line: false while a WSYNC stall is pending.
    pub fn rdy(&self) -> bool {
        !self.wsync
    }

    pub fn hclock(&self) -> u16 {
        self.hclock
    }

    pub fn scanline(&self) -> u16 {
        self.scanline
    }

    pub fn in_vblank(&self) -> bool {
        self.vblank & 0x02 != 0 || self.vsync
    }

    /// Channel touched by the latest audio register write, if any.
    pub fn take_audio_write(&mut self) -> Option<u8> {
        self.audio_write.take()
    }

    /// Drive a paddle's resistance (0 = minimum, charges instantly).
    pub fn set_paddle(&mut self, which: usize, resistance: u8) {
        self.paddle_resistance[which & 3] = resistance;
        self.inpt03_digital[which & 3] = None;
    }

    /// Drive INPT0-3 as a digital keypad column line.
    pub fn set_inpt03_line(&mut self, which: usize, level: bool) {
        self.inpt03_digital[which & 3] = Some(level);
    }

    /// Drive the INPT4/INPT5 button lines (false = pressed).
    pub fn set_button(&mut self, which: usize, high: bool) {
        self.inpt45_lines[which & 1] = high;
        if !high {
            // latched mode remembers any low level
            self.inpt45_latch[which & 1] = false;
        }
    }

    fn hblank_len(&self) -> u16 {
        if self.late_hblank {
            HBLANK_CLOCKS + 8
        } else {
            HBLANK_CLOCKS
        }
    }

    /// Visible pixel under the beam, when outside blanking.
    fn visible_x(&self) -> Option<u8> {
        if self.hclock >= self.hblank_len() {
            Some((self.hclock - HBLANK_CLOCKS) as u8)
        } else {
            None
        }
    }

    fn playfield_bit(&self, i: u8) -> bool {
        if i < 4 {
            self.pf0 & (0x10 << i) != 0
        } else if i < 12 {
            self.pf1 & (0x80 >> (i - 4)) != 0
        } else {
            self.pf2 & (0x01 << (i - 12)) != 0
        }
    }

    fn playfield_pixel(&self, x: u8) -> bool {
        let idx = x / 4; // 0..39
        let bit = if idx < 20 {
            idx
        } else if self.ctrlpf & 0x01 != 0 {
            39 - idx
        } else {
            idx - 20
        };
        self.playfield_bit(bit)
    }

    /// Advance one color clock and emit the signal for it.
    pub fn step_clock(&mut self) -> Signal {
        // comb delivery: one motion tick every fourth clock
        if self.sprites.hmove_active() && self.hclock % 4 == 0 {
            self.sprites.hmove_step();
        }

        let hblank = self.hclock < self.hblank_len();
        let blanked = hblank || self.in_vblank();

        let mut color = 0u8;
        if !blanked {
            let x = (self.hclock - HBLANK_CLOCKS) as u8;
            color = self.render_pixel(x);
        }

        // the two audio-clock phases of the line
        let audio = if self.hclock == 0 || self.hclock == 28 {
            Some((self.audio0.clock(), self.audio1.clock()))
        } else {
            None
        };

        // paddle capacitors charge unless dumped
        if self.vblank & 0x80 == 0 {
            for charge in &mut self.paddle_charge {
                *charge = charge.saturating_add(1);
            }
        }

        let signal = Signal {
            color,
            vsync: self.vsync,
            vblank: self.in_vblank(),
            hsync: (16..32).contains(&self.hclock),
            hblank,
            audio,
        };

        self.hclock += 1;
        if self.hclock == CLOCKS_PER_SCANLINE {
            self.new_scanline();
        }

        signal
    }

    fn new_scanline(&mut self) {
        self.hclock = 0;
        self.scanline = self.scanline.wrapping_add(1);
        self.late_hblank = false;
        self.wsync = false; // RDY releases as the counter wraps
    }

    fn render_pixel(&mut self, x: u8) -> u8 {
        let pf = self.playfield_pixel(x);
        let bl = self.sprites.ball.pixel(x);
        let p0 = self.sprites.player0.pixel(x);
        let p1 = self.sprites.player1.pixel(x);
        let m0 = self.sprites.missile0.pixel(x);
        let m1 = self.sprites.missile1.pixel(x);

        self.collisions.update(p0, p1, m0, m1, bl, pf);

        let score = self.ctrlpf & 0x02 != 0;
        let priority = self.ctrlpf & 0x04 != 0;
        let pf_color = if score {
            if x < 80 {
                self.colup0
            } else {
                self.colup1
            }
        } else {
            self.colupf
        };

        if priority {
            if bl {
                self.colupf
            } else if pf {
                pf_color
            } else if p0 || m0 {
                self.colup0
            } else if p1 || m1 {
                self.colup1
            } else {
                self.colubk
            }
        } else if p0 || m0 {
            self.colup0
        } else if p1 || m1 {
            self.colup1
        } else if bl {
            self.colupf
        } else if pf {
            pf_color
        } else {
            self.colubk
        }
    }

    /// Read a TIA register (collisions and input ports). Only bits 7-6
    /// are driven; the bus merges in the floating lines.
    pub fn read(&self, addr: u8) -> u8 {
        self.peek(addr)
    }

    /// Side-effect-free read; TIA reads have no side effects.
    pub fn peek(&self, addr: u8) -> u8 {
        match addr & 0x0F {
            r @ 0x0..=0x7 => self.collisions.register(r),
            r @ 0x8..=0xB => {
                // INPT0-3: paddle capacitor state or keypad column
                let which = (r - 0x8) as usize;
                if let Some(level) = self.inpt03_digital[which] {
                    if level {
                        0x80
                    } else {
                        0
                    }
                } else if self.vblank & 0x80 != 0 {
                    0
                } else {
                    let threshold =
                        self.paddle_resistance[which] as u32 * CLOCKS_PER_SCANLINE as u32;
                    if self.paddle_charge[which] >= threshold {
                        0x80
                    } else {
                        0
                    }
                }
            }
            r => {
                // INPT4/INPT5: buttons, optionally latched
                let which = (r - 0xC) as usize & 1;
                let level = if self.vblank & 0x40 != 0 {
                    self.inpt45_latch[which]
                } else {
                    self.inpt45_lines[which]
                };
                if level {
                    0x80
                } else {
                    0
                }
            }
        }
    }

    /// Write a TIA register. Strobes act on the color clock of the
    /// CPU's write cycle.
    pub fn write(&mut self, addr: u8, val: u8) {
        match addr & 0x3F {
            0x00 => self.vsync = val & 0x02 != 0,
            0x01 => {
                let was_dumping = self.vblank & 0x80 != 0;
                self.vblank = val;
                if val & 0x40 != 0 {
                    // enabling the latches resets them high
                    self.inpt45_latch = [true; 2];
                }
                if val & 0x80 != 0 {
                    self.paddle_charge = [0; 4];
                } else if was_dumping {
                    self.paddle_charge = [0; 4];
                }
            }
            0x02 => self.wsync = true,
            0x03 => {
                // RSYNC: restart the line
                self.hclock = 0;
                self.wsync = false;
            }
            0x04 => {
                self.sprites.player0.nusiz = val;
                self.sprites.missile0.nusiz = val;
            }
            0x05 => {
                self.sprites.player1.nusiz = val;
                self.sprites.missile1.nusiz = val;
            }
            0x06 => self.colup0 = val >> 1,
            0x07 => self.colup1 = val >> 1,
            0x08 => self.colupf = val >> 1,
            0x09 => self.colubk = val >> 1,
            0x0A => {
                self.ctrlpf = val;
                self.sprites.ball.size = (val >> 4) & 0x03;
            }
            0x0B => self.sprites.player0.reflect = val & 0x08 != 0,
            0x0C => self.sprites.player1.reflect = val & 0x08 != 0,
            0x0D => self.pf0 = val,
            0x0E => self.pf1 = val,
            0x0F => self.pf2 = val,
            0x10 => {
                let x = self.visible_x();
                self.sprites.player0.reset_position(x);
            }
            0x11 => {
                let x = self.visible_x();
                self.sprites.player1.reset_position(x);
            }
            0x12 => {
                let x = self.visible_x();
                self.sprites.missile0.reset_position(x);
            }
            0x13 => {
                let x = self.visible_x();
                self.sprites.missile1.reset_position(x);
            }
            0x14 => {
                let x = self.visible_x();
                self.sprites.ball.reset_position(x);
            }
            0x15 => {
                self.audio0.set_audc(val);
                self.audio_write = Some(0);
            }
            0x16 => {
                self.audio1.set_audc(val);
                self.audio_write = Some(1);
            }
            0x17 => {
                self.audio0.set_audf(val);
                self.audio_write = Some(0);
            }
            0x18 => {
                self.audio1.set_audf(val);
                self.audio_write = Some(1);
            }
            0x19 => {
                self.audio0.set_audv(val);
                self.audio_write = Some(0);
            }
            0x1A => {
                self.audio1.set_audv(val);
                self.audio_write = Some(1);
            }
            0x1B => {
                self.sprites.player0.grp_new = val;
                // writing GRP0 latches player 1's delayed copy
                self.sprites.player1.grp_old = self.sprites.player1.grp_new;
            }
            0x1C => {
                self.sprites.player1.grp_new = val;
                self.sprites.player0.grp_old = self.sprites.player0.grp_new;
                self.sprites.ball.enabled_old = self.sprites.ball.enabled_new;
            }
            0x1D => self.sprites.missile0.enabled = val & 0x02 != 0,
            0x1E => self.sprites.missile1.enabled = val & 0x02 != 0,
            0x1F => self.sprites.ball.enabled_new = val & 0x02 != 0,
            0x20 => self.sprites.player0.motion.set(val),
            0x21 => self.sprites.player1.motion.set(val),
            0x22 => self.sprites.missile0.motion.set(val),
            0x23 => self.sprites.missile1.motion.set(val),
            0x24 => self.sprites.ball.motion.set(val),
            0x25 => self.sprites.player0.vdel = val & 0x01 != 0,
            0x26 => self.sprites.player1.vdel = val & 0x01 != 0,
            0x27 => self.sprites.ball.vdel = val & 0x01 != 0,
            0x28 => {
                let lock = val & 0x02 != 0;
                if !lock && self.sprites.missile0.locked {
                    self.sprites.unlock_missile(0);
                } else {
                    self.sprites.missile0.locked = lock;
                }
            }
            0x29 => {
                let lock = val & 0x02 != 0;
                if !lock && self.sprites.missile1.locked {
                    self.sprites.unlock_missile(1);
                } else {
                    self.sprites.missile1.locked = lock;
                }
            }
            0x2A => {
                // HMOVE: extended blank only applies when strobed
                // during blanking, as on hardware
                self.sprites.start_hmove();
                if self.hclock < HBLANK_CLOCKS {
                    self.late_hblank = true;
                }
            }
            0x2B => self.sprites.clear_motion(),
            0x2C => self.collisions.clear(),
            _ => {}
        }
    }
}
