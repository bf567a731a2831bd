//! TIA movable objects: players, missiles and the ball.
//!
//! Objects are modelled by their horizontal position (0..159, in visible
//! pixels) plus a pending-motion counter fed by the HMOVE comb. NUSIZ
//! gives players and missiles one to three copies at fixed spacings and
//! selects widths; the tables below are the position-counter decodes of
//! the real chip expressed as pixel offsets.

use serde::{Deserialize, Serialize};

/// Copy offsets for each NUSIZ player/missile mode (low three bits).
/// Modes 5 and 7 are the double and quad size modes with a single copy.
const COPY_OFFSETS: [&[u8]; 8] = [
    &[0],
    &[0, 16],
    &[0, 32],
    &[0, 16, 32],
    &[0, 64],
    &[0],
    &[0, 32, 64],
    &[0],
];

/// Player width multiplier for each NUSIZ mode.
fn player_scale(nusiz: u8) -> u8 {
    match nusiz & 0x07 {
        5 => 2,
        7 => 4,
        _ => 1,
    }
}

fn wrap_back(pos: u8) -> u8 {
    if pos == 0 {
        159
    } else {
        pos - 1
    }
}

/// Shared horizontal-motion state: latched HM nibble plus the extra
/// clocks still owed by an in-flight HMOVE comb.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Motion {
    /// Signed -8..+7 from the HM register's high nibble.
    pub hm: i8,
    /// Leftward ticks remaining in the current comb.
    pending: u8,
}

impl Motion {
    pub fn set(&mut self, val: u8) {
        self.hm = (val as i8) >> 4;
    }

    pub fn clear(&mut self) {
        self.hm = 0;
    }

    /// Arm the comb: every object is first pushed 8 pixels right by the
    /// extended blank, then receives hm+8 leftward ticks (0..15), for a
    /// net movement of -hm pixels.
    fn arm(&mut self) -> u8 {
        self.pending = (self.hm as i16 + 8) as u8;
        self.pending
    }

    fn take_tick(&mut self) -> bool {
        if self.pending > 0 {
            self.pending -= 1;
            true
        } else {
            false
        }
    }
}

/// A player sprite: 8-bit graphics register with old/new copies for
/// vertical delay, reflection, and NUSIZ sizing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub pos: u8,
    pub motion: Motion,
    pub grp_new: u8,
    pub grp_old: u8,
    pub vdel: bool,
    pub reflect: bool,
    pub nusiz: u8,
}

impl Player {
    /// RESP strobe. During horizontal blanking the counter parks the
    /// sprite at pixel 3; on a visible clock it lands 5 pixels to the
    /// right of the beam.
    pub fn reset_position(&mut self, visible_x: Option<u8>) {
        self.pos = match visible_x {
            Some(x) => (x + 5) % 160,
            None => 3,
        };
    }

    fn grp(&self) -> u8 {
        if self.vdel {
            self.grp_old
        } else {
            self.grp_new
        }
    }

    /// Is this sprite's pixel lit at visible coordinate `x`?
    pub fn pixel(&self, x: u8) -> bool {
        let grp = self.grp();
        if grp == 0 {
            return false;
        }
        let scale = player_scale(self.nusiz);
        let width = 8 * scale as u16;
        for &offset in COPY_OFFSETS[(self.nusiz & 0x07) as usize] {
            let d = (x as u16 + 320 - self.pos as u16 - offset as u16) % 160;
            if d < width {
                let idx = (d / scale as u16) as u8;
                let bit = if self.reflect { idx } else { 7 - idx };
                if grp & (1 << bit) != 0 {
                    return true;
                }
            }
        }
        false
    }

    /// Pixel offset of the player's center, where a RESMP'd missile
    /// reappears.
    pub fn center_offset(&self) -> u8 {
        4 * player_scale(self.nusiz)
    }
}

/// A missile: one enable bit, width from NUSIZ bits 4-5, copies follow
/// the owning player's NUSIZ mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Missile {
    pub pos: u8,
    pub motion: Motion,
    pub enabled: bool,
    /// RESMP: while set the missile hides and tracks its player.
    pub locked: bool,
    pub nusiz: u8,
}

impl Missile {
    pub fn reset_position(&mut self, visible_x: Option<u8>) {
        self.pos = match visible_x {
            Some(x) => (x + 4) % 160,
            None => 2,
        };
    }

    pub fn width(&self) -> u8 {
        1 << ((self.nusiz >> 4) & 0x03)
    }

    pub fn pixel(&self, x: u8) -> bool {
        if !self.enabled || self.locked {
            return false;
        }
        let width = self.width() as u16;
        for &offset in COPY_OFFSETS[(self.nusiz & 0x07) as usize] {
            let d = (x as u16 + 320 - self.pos as u16 - offset as u16) % 160;
            if d < width {
                return true;
            }
        }
        false
    }
}

/// The ball: enable with vertical delay, width from CTRLPF bits 4-5.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ball {
    pub pos: u8,
    pub motion: Motion,
    pub enabled_new: bool,
    pub enabled_old: bool,
    pub vdel: bool,
    /// CTRLPF bits 4-5.
    pub size: u8,
}

impl Ball {
    pub fn reset_position(&mut self, visible_x: Option<u8>) {
        self.pos = match visible_x {
            Some(x) => (x + 4) % 160,
            None => 2,
        };
    }

    fn enabled(&self) -> bool {
        if self.vdel {
            self.enabled_old
        } else {
            self.enabled_new
        }
    }

    pub fn width(&self) -> u8 {
        1 << (self.size & 0x03)
    }

    pub fn pixel(&self, x: u8) -> bool {
        if !self.enabled() {
            return false;
        }
        let d = (x as u16 + 320 - self.pos as u16) % 160;
        d < self.width() as u16
    }
}

/// All five movable objects plus the shared comb machinery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sprites {
    pub player0: Player,
    pub player1: Player,
    pub missile0: Missile,
    pub missile1: Missile,
    pub ball: Ball,
    /// Comb steps left to deliver (one per four color clocks).
    ripple: u8,
}

impl Sprites {
    /// HMOVE strobe: push everything 8 right, then owe each object its
    /// hm+8 leftward ticks over the comb window.
    pub fn start_hmove(&mut self) {
        for pos in [
            &mut self.player0.pos,
            &mut self.player1.pos,
            &mut self.missile0.pos,
            &mut self.missile1.pos,
            &mut self.ball.pos,
        ] {
            *pos = (*pos + 8) % 160;
        }
        self.player0.motion.arm();
        self.player1.motion.arm();
        self.missile0.motion.arm();
        self.missile1.motion.arm();
        self.ball.motion.arm();
        self.ripple = 15;
    }

    pub fn hmove_active(&self) -> bool {
        self.ripple > 0
    }

    /// One comb step: every object still owing ticks moves one pixel
    /// left. Called every fourth color clock while the comb ripples.
    pub fn hmove_step(&mut self) {
        if self.ripple == 0 {
            return;
        }
        self.ripple -= 1;
        if self.player0.motion.take_tick() {
            self.player0.pos = wrap_back(self.player0.pos);
        }
        if self.player1.motion.take_tick() {
            self.player1.pos = wrap_back(self.player1.pos);
        }
        if self.missile0.motion.take_tick() {
            self.missile0.pos = wrap_back(self.missile0.pos);
        }
        if self.missile1.motion.take_tick() {
            self.missile1.pos = wrap_back(self.missile1.pos);
        }
        if self.ball.motion.take_tick() {
            self.ball.pos = wrap_back(self.ball.pos);
        }
    }

    pub fn clear_motion(&mut self) {
        self.player0.motion.clear();
        self.player1.motion.clear();
        self.missile0.motion.clear();
        self.missile1.motion.clear();
        self.ball.motion.clear();
    }

    /// RESMP release: park the missile on its player's center.
    pub fn unlock_missile(&mut self, which: usize) {
        let (missile, player) = if which == 0 {
            (&mut self.missile0, &self.player0)
        } else {
            (&mut self.missile1, &self.player1)
        };
        missile.pos = (player.pos + player.center_offset()) % 160;
        missile.locked = false;
    }
}
