//! Tigervision 3F and the 3E extension.
//!
//! The lower 2K of the window is switchable; the upper 2K is fixed to
//! the last bank of the image. The bank register lives at TIA address
//! $3F - the cartridge watches the bus for writes there (the TIA gets
//! the write too, which is why Tigervision games look the way they do).
//! 3E adds RAM banks selected by writes to $3E: a selected RAM bank
//! reads at $1000-$13FF and writes at $1400-$17FF.

use serde::{Deserialize, Serialize};

use super::{CartridgeError, MapperKind};

const RAM_BANKS: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tigervision {
    rom: Vec<u8>,
    kind: MapperKind,
    bank: usize,
    /// 3E only: selected 1K RAM bank, displacing the ROM bank.
    ram_bank: Option<usize>,
    ram: Vec<u8>,
}

impl Tigervision {
    pub fn new(rom: Vec<u8>, kind: MapperKind) -> Result<Self, CartridgeError> {
        if rom.len() % 2048 != 0 || rom.is_empty() || rom.len() > 512 * 1024 {
            return Err(CartridgeError::SizeMismatch {
                kind,
                size: rom.len(),
            });
        }
        let ram = if kind == MapperKind::ThreeE {
            vec![0; RAM_BANKS * 1024]
        } else {
            Vec::new()
        };
        Ok(Self {
            rom,
            kind,
            bank: 0,
            ram_bank: None,
            ram,
        })
    }

    fn bank_count(&self) -> usize {
        self.rom.len() / 2048
    }

    pub fn peek(&self, addr: u16) -> u8 {
        let addr = (addr & 0x0FFF) as usize;
        if addr >= 0x0800 {
            // fixed upper half: last 2K of the image
            return self.rom[self.rom.len() - 2048 + (addr & 0x07FF)];
        }
        if let Some(bank) = self.ram_bank {
            return self.ram[bank * 1024 + (addr & 0x03FF)];
        }
        self.rom[self.bank * 2048 + addr]
    }

    pub fn read(&mut self, addr: u16) -> u8 {
        self.peek(addr)
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        let addr = (addr & 0x0FFF) as usize;
        if let Some(bank) = self.ram_bank {
            if (0x0400..0x0800).contains(&addr) {
                self.ram[bank * 1024 + (addr & 0x03FF)] = val;
            }
        }
    }

    pub fn snoop(&mut self, addr: u16, val: u8, is_write: bool) {
        if !is_write {
            return;
        }
        match (self.kind, addr & 0x1FFF) {
            (MapperKind::ThreeF, a) if a <= 0x003F => {
                self.bank = val as usize % self.bank_count();
            }
            (MapperKind::ThreeE, 0x003F) => {
                self.bank = val as usize % self.bank_count();
                self.ram_bank = None;
            }
            (MapperKind::ThreeE, 0x003E) => {
                self.ram_bank = Some(val as usize % RAM_BANKS);
            }
            _ => {}
        }
    }

    pub fn bank_state(&self) -> (usize, String) {
        match self.ram_bank {
            Some(bank) => (bank, format!("ram bank {bank}")),
            None => (self.bank, format!("bank {} of {}", self.bank, self.bank_count())),
        }
    }

    pub fn rom_size(&self) -> usize {
        self.rom.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rom(banks: usize) -> Vec<u8> {
        let mut rom = vec![0u8; banks * 2048];
        for (i, chunk) in rom.chunks_mut(2048).enumerate() {
            chunk[0] = 0x30 + i as u8;
        }
        rom
    }

    #[test]
    fn test_write_to_3f_switches_lower_bank() {
        let mut cart = Tigervision::new(rom(4), MapperKind::ThreeF).unwrap();
        assert_eq!(cart.read(0x1000), 0x30);
        cart.snoop(0x003F, 2, true);
        assert_eq!(cart.read(0x1000), 0x32);
        // reads of the hot-spot do nothing
        cart.snoop(0x003F, 1, false);
        assert_eq!(cart.read(0x1000), 0x32);
    }

    #[test]
    fn test_upper_half_fixed_to_last_bank() {
        let mut cart = Tigervision::new(rom(4), MapperKind::ThreeF).unwrap();
        assert_eq!(cart.read(0x1800), 0x33);
        cart.snoop(0x003F, 1, true);
        assert_eq!(cart.read(0x1800), 0x33);
    }

    #[test]
    fn test_3e_ram_banks() {
        let mut cart = Tigervision::new(rom(4), MapperKind::ThreeE).unwrap();
        cart.snoop(0x003E, 3, true);
        cart.write(0x1400, 0x99); // write window
        assert_eq!(cart.read(0x1000), 0x99); // read window
        // selecting a ROM bank displaces the RAM again
        cart.snoop(0x003F, 0, true);
        assert_eq!(cart.read(0x1000), 0x30);
    }

    #[test]
    fn test_large_images() {
        let cart = Tigervision::new(rom(256), MapperKind::ThreeF).unwrap();
        assert_eq!(cart.rom_size(), 512 * 1024);
    }
}
