//! CDF / CDFJ - datastream cartridges with an ARM coprocessor.
//!
//! A 32K image: 2K ARM driver followed by seven 4K program banks. The
//! defining trick is *fast fetch*: with SETMODE enabled, an `LDA #n`
//! whose immediate is a datastream number returns the next byte of that
//! stream instead of the literal, letting the 6507 pump graphics with
//! two-cycle instructions. Stream pointers are 20.12 fixed-point values
//! living in ARM RAM, advanced by per-stream increments; stream 32 is
//! the write stream fed through DSWRITE/DSPTR.
//!
//! Registers (cartridge window writes):
//!
//! ```text
//! $1FF0  DSWRITE   push a byte through the write stream
//! $1FF1  DSPTR     shift a byte into the write stream pointer
//! $1FF2  SETMODE   bit 0 enables fast fetch
//! $1FF3  CALLFN    invoke the ARM driver (budgeted)
//! $1FF5-$1FFB      select program banks 0-6
//! ```
//!
//! The amplitude stream (fast fetch 0x22) returns the byte the driver
//! leaves at the fixed RAM mailbox, which is how CDF music reaches the
//! TIA volume register.

use serde::{Deserialize, Serialize};

use super::thumb::{ThumbCore, ThumbMemory};
use super::{CartridgeError, MapperKind};

const DRIVER_SIZE: usize = 2048;
const ARM_RAM_SIZE: usize = 8192;
const RAM_BASE: u32 = 0x4000_0000;

/// Datastream pointer table in ARM RAM (33 x 32-bit, stream 32 writes).
const STREAM_POINTER_BASE: u32 = RAM_BASE + 0x0600;
/// Per-stream 8-bit increments follow the pointers.
const STREAM_INCREMENT_BASE: u32 = RAM_BASE + 0x0690;
/// Driver-maintained audio amplitude mailbox.
const AMPLITUDE_ADDR: u32 = RAM_BASE + 0x06E0;

const STREAM_COUNT: u8 = 0x23;
const AMPLITUDE_STREAM: u8 = 0x22;
const WRITE_STREAM: u8 = 0x20;

const ARM_CYCLES_PER_MACHINE_CYCLE: i64 = 59;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cdf {
    kind: MapperKind,
    memory: ThumbMemory,
    core: ThumbCore,
    bank: usize,
    fast_fetch: bool,
    /// Last byte handed to the CPU; 0xA9 arms immediate interception.
    last_fetch: u8,
    arm_budget: i64,
}

impl Cdf {
    pub fn new(rom: Vec<u8>, kind: MapperKind) -> Result<Self, CartridgeError> {
        if rom.len() != 32768 {
            return Err(CartridgeError::SizeMismatch {
                kind,
                size: rom.len(),
            });
        }
        let mut memory = ThumbMemory::new(rom, ARM_RAM_SIZE);
        for i in 0..DRIVER_SIZE {
            let byte = memory.rom[i];
            memory.write8(RAM_BASE + i as u32, byte);
        }
        Ok(Self {
            kind,
            memory,
            core: ThumbCore::new(),
            bank: 6,
            fast_fetch: false,
            last_fetch: 0,
            arm_budget: 0,
        })
    }

    fn stream_pointer(&self, stream: u8) -> u32 {
        self.memory
            .read32(STREAM_POINTER_BASE + stream as u32 * 4)
    }

    fn set_stream_pointer(&mut self, stream: u8, value: u32) {
        self.memory
            .write32(STREAM_POINTER_BASE + stream as u32 * 4, value);
    }

    fn stream_increment(&self, stream: u8) -> u8 {
        self.memory.read8(STREAM_INCREMENT_BASE + stream as u32)
    }

    /// Pull the next byte from a datastream and advance its pointer.
    /// Increments are 4.4 fixed point: 0x10 steps one byte per read.
    fn stream_read(&mut self, stream: u8) -> u8 {
        let pointer = self.stream_pointer(stream);
        let value = self.memory.read8(RAM_BASE + (pointer >> 12 & 0x1FFF));
        let increment = self.stream_increment(stream) as u32;
        self.set_stream_pointer(stream, pointer.wrapping_add(increment << 8));
        value
    }

    fn stream_write(&mut self, val: u8) {
        let pointer = self.stream_pointer(WRITE_STREAM);
        self.memory.write8(RAM_BASE + (pointer >> 12 & 0x1FFF), val);
        self.set_stream_pointer(WRITE_STREAM, pointer.wrapping_add(0x1000));
    }

    fn switch(&mut self, addr: u16) {
        match addr & 0x0FFF {
            a @ 0x0FF5..=0x0FFB => self.bank = (a - 0x0FF5) as usize,
            _ => {}
        }
    }

    fn rom_byte(&self, addr: u16) -> u8 {
        self.memory.rom[DRIVER_SIZE + self.bank * 4096 + (addr & 0x0FFF) as usize]
    }

    pub fn peek(&self, addr: u16) -> u8 {
        self.rom_byte(addr)
    }

    pub fn read(&mut self, addr: u16) -> u8 {
        self.switch(addr);
        let mut value = self.rom_byte(addr);
        // fast fetch: the operand of an in-flight LDA # names a stream
        if self.fast_fetch && self.last_fetch == 0xA9 && value < STREAM_COUNT {
            value = if value == AMPLITUDE_STREAM {
                self.memory.read8(AMPLITUDE_ADDR)
            } else {
                self.stream_read(value)
            };
            self.last_fetch = 0;
        } else {
            self.last_fetch = value;
        }
        value
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        self.switch(addr);
        match addr & 0x0FFF {
            0x0FF0 => self.stream_write(val),
            0x0FF1 => {
                // shift the byte address in MSB-first
                let bytes = self.stream_pointer(WRITE_STREAM) >> 12;
                self.set_stream_pointer(WRITE_STREAM, ((bytes << 8) | val as u32) << 12);
            }
            0x0FF2 => self.fast_fetch = val & 0x01 != 0,
            0x0FF3 => {
                let entry = self.memory.read32(RAM_BASE + 4);
                self.core.call(entry | 1, RAM_BASE + ARM_RAM_SIZE as u32);
            }
            _ => {}
        }
    }

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

    pub fn coprocessor_busy(&self) -> bool {
        self.core.running()
    }

    pub fn bank_state(&self) -> (usize, String) {
        let label = if self.kind == MapperKind::Cdfj {
            "CDFJ"
        } else {
            "CDF"
        };
        (self.bank, format!("{label} bank {} of 7", self.bank))
    }

    pub fn rom_size(&self) -> usize {
        self.memory.rom.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> Vec<u8> {
        let mut rom = vec![0u8; 32768];
        for bank in 0..7 {
            rom[DRIVER_SIZE + bank * 4096] = 0x70 + bank as u8;
        }
        rom
    }

    fn cart() -> Cdf {
        Cdf::new(image(), MapperKind::Cdf).unwrap()
    }

    #[test]
    fn test_banking_defaults_to_last() {
        let mut c = cart();
        assert_eq!(c.read(0x1000), 0x76);
        c.write(0x1FF5, 0);
        assert_eq!(c.read(0x1000), 0x70);
    }

    #[test]
    fn test_fast_fetch_intercepts_lda_immediate() {
        // stream 3 points at RAM 0x1000 with an increment of one byte;
        // the image carries LDA #$03 at bank 0 offset 0x100
        let mut rom = image();
        rom[DRIVER_SIZE + 0x100] = 0xA9;
        rom[DRIVER_SIZE + 0x101] = 0x03;
        let mut c = Cdf::new(rom, MapperKind::Cdf).unwrap();
        c.memory.write8(RAM_BASE + 0x1000, 0xAB);
        c.memory.write8(RAM_BASE + 0x1001, 0xCD);
        c.set_stream_pointer(3, 0x1000 << 12);
        c.memory.write8(STREAM_INCREMENT_BASE + 3, 0x10);
        c.write(0x1FF5, 0); // bank 0
        c.write(0x1FF2, 1); // fast fetch on

        assert_eq!(c.read(0x1100), 0xA9);
        assert_eq!(c.read(0x1101), 0xAB); // stream data, not the literal
        // pointer advanced to the next byte
        assert_eq!(c.read(0x1100), 0xA9);
        assert_eq!(c.read(0x1101), 0xCD);
    }

    #[test]
    fn test_fast_fetch_off_returns_literal() {
        let mut rom = image();
        rom[DRIVER_SIZE + 0x100] = 0xA9;
        rom[DRIVER_SIZE + 0x101] = 0x03;
        let mut c = Cdf::new(rom, MapperKind::Cdf).unwrap();
        c.write(0x1FF5, 0);
        assert_eq!(c.read(0x1100), 0xA9);
        assert_eq!(c.read(0x1101), 0x03);
    }

    #[test]
    fn test_write_stream() {
        let mut c = cart();
        // aim the write stream at RAM 0x1200
        c.write(0x1FF1, 0x12);
        c.write(0x1FF1, 0x00);
        c.write(0x1FF0, 0x5A);
        c.write(0x1FF0, 0xA5);
        assert_eq!(c.memory.read8(RAM_BASE + 0x1200), 0x5A);
        assert_eq!(c.memory.read8(RAM_BASE + 0x1201), 0xA5);
    }

    #[test]
    fn test_amplitude_mailbox() {
        let mut rom = image();
        rom[DRIVER_SIZE + 0x100] = 0xA9;
        rom[DRIVER_SIZE + 0x101] = AMPLITUDE_STREAM;
        let mut c = Cdf::new(rom, MapperKind::Cdf).unwrap();
        c.memory.write8(AMPLITUDE_ADDR, 0x0B);
        c.write(0x1FF5, 0);
        c.write(0x1FF2, 1);
        assert_eq!(c.read(0x1100), 0xA9);
        assert_eq!(c.read(0x1101), 0x0B);
    }

    #[test]
    fn test_callfn_budgeted_execution() {
        // driver: movs r0, #0x17; str r0, [r1]; bx lr
        let mut rom = image();
        let code: [u16; 3] = [0x2017, 0x6008, 0x4770];
        for (k, w) in code.iter().enumerate() {
            rom[0x40 + k * 2] = *w as u8;
            rom[0x40 + k * 2 + 1] = (*w >> 8) as u8;
        }
        let entry = RAM_BASE + 0x40;
        rom[4..8].copy_from_slice(&entry.to_le_bytes());
        let mut c = Cdf::new(rom, MapperKind::Cdf).unwrap();
        c.core.regs[1] = RAM_BASE + 0x300;
        c.write(0x1FF3, 0);
        assert!(c.coprocessor_busy());
        c.step_machine_cycle();
        assert!(!c.coprocessor_busy());
        assert_eq!(c.memory.read8(RAM_BASE + 0x300), 0x17);
    }
}
