//! DPC+ - the Harmony-cartridge successor to DPC.
//!
//! A 32K image: 3K ARM driver, six 4K program banks, 4K of display
//! data and 1K of frequency data. Eight data fetchers (now counting
//! upward through the display area) and eight fractional fetchers run
//! beside an ARM7TDMI whose functions the 6507 invokes through the
//! CALLFN register. The ARM is metered: every 6507 machine cycle
//! deposits a fixed cycle budget and the core only advances while the
//! budget lasts, so a called function's effects appear no earlier than
//! the cycles paid for them.
//!
//! Register map (offset within $1000-$107F):
//!
//! ```text
//! reads            $00-$03 random  $04-$07 music amplitude
//!                  $08-$0F display data (counter increments)
//!                  $10-$17 display data masked by flag
//!                  $18-$1F flag  $20-$27 fractional data
//! writes           $40-$47 top    $48-$4F bottom
//!                  $50-$57 counter low   $58-$5F counter high
//!                  $60-$67 fractional pointer low
//!                  $68-$6F fractional increment
//!                  $70-$77 function call (CALLFN on fetcher 0)
//! banking          $1FF6-$1FFB select program banks 0-5
//! ```

use serde::{Deserialize, Serialize};

use super::thumb::{ThumbCore, ThumbMemory};
use super::{CartridgeError, MapperKind};

const DRIVER_SIZE: usize = 3072;
const PROGRAM_BASE: usize = DRIVER_SIZE;
const DISPLAY_BASE: usize = 27648;
const DISPLAY_SIZE: usize = 4096;
const ARM_RAM_SIZE: usize = 8192;
const RAM_BASE: u32 = 0x4000_0000;

/// ARM cycles granted per 6507 machine cycle (70 MHz part / 1.19 MHz).
const ARM_CYCLES_PER_MACHINE_CYCLE: i64 = 59;

const MUSIC_AMPLITUDES: [u8; 8] = [0x00, 0x04, 0x05, 0x09, 0x06, 0x0A, 0x0B, 0x0F];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DpcPlus {
    memory: ThumbMemory,
    core: ThumbCore,
    bank: usize,
    tops: [u8; 8],
    bottoms: [u8; 8],
    counters: [u16; 8],
    flags: [bool; 8],
    fractional_pointers: [u32; 8],
    fractional_increments: [u8; 8],
    music_mode: [bool; 3],
    random: u32,
    /// Unspent ARM cycles; only positive balances execute.
    arm_budget: i64,
}

impl DpcPlus {
    pub fn new(rom: Vec<u8>) -> Result<Self, CartridgeError> {
        if rom.len() != 32768 {
            return Err(CartridgeError::SizeMismatch {
                kind: MapperKind::DpcPlus,
                size: rom.len(),
            });
        }
        let mut memory = ThumbMemory::new(rom, ARM_RAM_SIZE);
        // the boot loader copies the driver into RAM before any call
        for i in 0..DRIVER_SIZE {
            let byte = memory.rom[i];
            memory.write8(RAM_BASE + i as u32, byte);
        }
        Ok(Self {
            memory,
            core: ThumbCore::new(),
            bank: 5,
            tops: [0; 8],
            bottoms: [0; 8],
            counters: [0; 8],
            flags: [false; 8],
            fractional_pointers: [0; 8],
            fractional_increments: [0; 8],
            music_mode: [false; 3],
            random: 0x2B43_5044,
            arm_budget: 0,
        })
    }

    fn update_flag(&mut self, i: usize) {
        let low = (self.counters[i] & 0xFF) as u8;
        if low == self.tops[i] {
            self.flags[i] = true;
        } else if low == self.bottoms[i] {
            self.flags[i] = false;
        }
    }

    fn display_byte(&self, offset: usize) -> u8 {
        self.memory.rom[DISPLAY_BASE + (offset & (DISPLAY_SIZE - 1))]
    }

    fn clock_random(&mut self) {
        let r = self.random;
        self.random = (r << 1) | (((r >> 10) ^ (r >> 31)) & 1);
    }

    fn music_value(&self) -> u8 {
        let mut index = 0;
        for voice in 0..3 {
            if self.music_mode[voice] && self.flags[5 + voice] {
                index |= 1 << voice;
            }
        }
        MUSIC_AMPLITUDES[index]
    }

    fn switch(&mut self, addr: u16) {
        match addr & 0x0FFF {
            a @ 0x0FF6..=0x0FFB => self.bank = (a - 0x0FF6) as usize,
            _ => {}
        }
    }

    pub fn peek(&self, addr: u16) -> u8 {
        let offset = (addr & 0x0FFF) as usize;
        if offset < 0x40 {
            let i = offset & 0x07;
            return match (offset >> 3) & 0x07 {
                0 => {
                    if i < 4 {
                        (self.random >> (i * 8)) as u8
                    } else {
                        self.music_value()
                    }
                }
                1 => self.display_byte(self.counters[i] as usize),
                2 => {
                    if self.flags[i] {
                        self.display_byte(self.counters[i] as usize)
                    } else {
                        0
                    }
                }
                3 => {
                    if self.flags[i] {
                        0xFF
                    } else {
                        0
                    }
                }
                4 => self.display_byte((self.fractional_pointers[i] >> 12) as usize),
                _ => 0,
            };
        }
        self.memory.rom[PROGRAM_BASE + self.bank * 4096 + offset]
    }

    pub fn read(&mut self, addr: u16) -> u8 {
        self.switch(addr);
        let offset = (addr & 0x0FFF) as usize;
        let value = self.peek(addr);
        if offset < 0x40 {
            let i = offset & 0x07;
            match (offset >> 3) & 0x07 {
                0 if i < 4 => self.clock_random(),
                1 | 2 => {
                    self.counters[i] = self.counters[i].wrapping_add(1) & 0x0FFF;
                    self.update_flag(i);
                }
                4 => {
                    self.fractional_pointers[i] = (self.fractional_pointers[i]
                        + self.fractional_increments[i] as u32)
                        & 0x00FF_FFFF;
                }
                _ => {}
            }
        }
        value
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        self.switch(addr);
        let offset = (addr & 0x0FFF) as usize;
        if !(0x40..0x80).contains(&offset) {
            return;
        }
        let i = offset & 0x07;
        match (offset >> 3) & 0x07 {
            0 => {
                self.tops[i] = val;
                self.flags[i] = false;
                self.update_flag(i);
            }
            1 => {
                self.bottoms[i] = val;
                self.update_flag(i);
            }
            2 => {
                self.counters[i] = (self.counters[i] & 0x0F00) | val as u16;
                self.update_flag(i);
            }
            3 => {
                self.counters[i] = ((val as u16 & 0x0F) << 8) | (self.counters[i] & 0xFF);
                if i >= 5 {
                    self.music_mode[i - 5] = val & 0x10 != 0;
                }
                self.update_flag(i);
            }
            4 => {
                self.fractional_pointers[i] =
                    (self.fractional_pointers[i] & 0x00FF_F000) | ((val as u32) << 4);
            }
            5 => self.fractional_increments[i] = val,
            6 => {
                if i == 0 && (val == 0xFE || val == 0xFF) {
                    // CALLFN: enter the driver through its RAM vector
                    let entry = self.memory.read32(RAM_BASE + 4);
                    self.core.call(entry | 1, RAM_BASE + ARM_RAM_SIZE as u32);
                }
            }
            _ => {}
        }
    }

    /// Deposit the machine cycle's ARM budget and run what it pays for.
    pub fn step_machine_cycle(&mut self) {
        if !self.core.running() {
            self.arm_budget = 0;
            return;
        }
        self.arm_budget += ARM_CYCLES_PER_MACHINE_CYCLE;
        while self.core.running() && self.arm_budget > 0 {
            self.arm_budget -= self.core.step(&mut self.memory) as i64;
        }
    }

    /// The coprocessor is still paying off a CALLFN.
    pub fn coprocessor_busy(&self) -> bool {
        self.core.running()
    }

    pub fn bank_state(&self) -> (usize, String) {
        (self.bank, format!("bank {} of 6", self.bank))
    }

    pub fn rom_size(&self) -> usize {
        self.memory.rom.len()
    }
}
