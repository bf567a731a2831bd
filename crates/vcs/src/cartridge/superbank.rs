//! Superbank (SB): up to 256K of plain 4K banks.
//!
//! The hot-spots live at $0800-$087F in unmapped TIA-mirror space; any
//! access there selects the corresponding 4K bank.

use serde::{Deserialize, Serialize};

use super::{CartridgeError, MapperKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Superbank {
    rom: Vec<u8>,
    bank: usize,
}

impl Superbank {
    pub fn new(rom: Vec<u8>) -> Result<Self, CartridgeError> {
        if rom.len() % 4096 != 0 || rom.len() < 8192 || rom.len() > 256 * 1024 {
            return Err(CartridgeError::SizeMismatch {
                kind: MapperKind::Sb,
                size: rom.len(),
            });
        }
        Ok(Self { rom, bank: 0 })
    }

    fn bank_count(&self) -> usize {
        self.rom.len() / 4096
    }

    pub fn peek(&self, addr: u16) -> u8 {
        self.rom[self.bank * 4096 + (addr & 0x0FFF) as usize]
    }

    pub fn write(&mut self, _addr: u16, _val: u8) {}

    pub fn snoop(&mut self, addr: u16) {
        let addr = addr & 0x1FFF;
        if (0x0800..=0x087F).contains(&addr) {
            self.bank = (addr & 0x7F) as usize % self.bank_count();
        }
    }

    pub fn bank_state(&self) -> (usize, String) {
        (self.bank, format!("bank {} of {}", self.bank, self.bank_count()))
    }

    pub fn rom_size(&self) -> usize {
        self.rom.len()
    }
}
