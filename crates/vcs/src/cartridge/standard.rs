//! Unbanked cartridges: 2K, 4K and the CommaVid 2K+RAM board.

use serde::{Deserialize, Serialize};

use super::{CartridgeError, MapperKind};

/// 2K and 4K ROMs plus CommaVid (2K ROM at $1800 with 1K RAM below).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Standard {
    rom: Vec<u8>,
    kind: MapperKind,
    /// CommaVid RAM; read $1000-$13FF, write $1400-$17FF.
    ram: Vec<u8>,
}

impl Standard {
    pub fn new(rom: Vec<u8>, kind: MapperKind) -> Result<Self, CartridgeError> {
        let expected = match kind {
            MapperKind::TwoK | MapperKind::Cv => 2048,
            _ => 4096,
        };
        if rom.len() != expected {
            return Err(CartridgeError::SizeMismatch {
                kind,
                size: rom.len(),
            });
        }
        let ram = if kind == MapperKind::Cv {
            vec![0; 1024]
        } else {
            Vec::new()
        };
        Ok(Self { rom, kind, ram })
    }

    pub fn peek(&self, addr: u16) -> u8 {
        let addr = addr & 0x0FFF;
        match self.kind {
            MapperKind::TwoK => self.rom[(addr & 0x07FF) as usize],
            MapperKind::Cv => match addr {
                0x0000..=0x03FF => self.ram[addr as usize],
                0x0400..=0x07FF => self.ram[(addr & 0x03FF) as usize],
                _ => self.rom[(addr & 0x07FF) as usize],
            },
            _ => self.rom[addr as usize],
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        if self.kind == MapperKind::Cv {
            let addr = addr & 0x0FFF;
            if (0x0400..=0x07FF).contains(&addr) {
                self.ram[(addr & 0x03FF) as usize] = val;
            }
        }
    }

    pub fn bank_state(&self) -> (usize, String) {
        (0, "fixed".to_string())
    }

    pub fn rom_size(&self) -> usize {
        self.rom.len()
    }
}
