//! Parker Brothers E0: 8K as eight 1K slices, three switchable segments.
//!
//! The window is divided into four 1K segments. The first three can each
//! show any slice; the fourth is fixed to slice 7 (which also contains
//! the hot-spots and the vectors).

use serde::{Deserialize, Serialize};

use super::{CartridgeError, MapperKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct E0 {
    rom: Vec<u8>,
    /// Slice shown in each of the three switchable segments.
    segments: [usize; 3],
}

impl E0 {
    pub fn new(rom: Vec<u8>) -> Result<Self, CartridgeError> {
        if rom.len() != 8192 {
            return Err(CartridgeError::SizeMismatch {
                kind: MapperKind::E0,
                size: rom.len(),
            });
        }
        Ok(Self {
            rom,
            segments: [4, 5, 6],
        })
    }

    fn switch(&mut self, addr: u16) {
        match addr & 0x0FFF {
            a @ 0x0FE0..=0x0FE7 => self.segments[0] = (a - 0x0FE0) as usize,
            a @ 0x0FE8..=0x0FEF => self.segments[1] = (a - 0x0FE8) as usize,
            a @ 0x0FF0..=0x0FF7 => self.segments[2] = (a - 0x0FF0) as usize,
            _ => {}
        }
    }

    pub fn peek(&self, addr: u16) -> u8 {
        let addr = (addr & 0x0FFF) as usize;
        let segment = addr >> 10;
        let slice = if segment == 3 {
            7
        } else {
            self.segments[segment]
        };
        self.rom[slice * 1024 + (addr & 0x03FF)]
    }

    pub fn read(&mut self, addr: u16) -> u8 {
        self.switch(addr);
        self.peek(addr)
    }

    pub fn write(&mut self, addr: u16, _val: u8) {
        self.switch(addr);
    }

    pub fn bank_state(&self) -> (usize, String) {
        (
            self.segments[0],
            format!(
                "slices {}/{}/{}/7",
                self.segments[0], self.segments[1], self.segments[2]
            ),
        )
    }

    pub fn rom_size(&self) -> usize {
        self.rom.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rom() -> Vec<u8> {
        let mut rom = vec![0u8; 8192];
        for (i, chunk) in rom.chunks_mut(1024).enumerate() {
            chunk[0] = i as u8;
        }
        rom
    }

    #[test]
    fn test_fourth_segment_fixed_to_last_slice() {
        let cart = E0::new(rom()).unwrap();
        assert_eq!(cart.peek(0x1C00), 7);
    }

    #[test]
    fn test_segment_switching() {
        let mut cart = E0::new(rom()).unwrap();
        cart.read(0x1FE3); // segment 0 <- slice 3
        assert_eq!(cart.peek(0x1000), 3);
        cart.read(0x1FEA); // segment 1 <- slice 2
        assert_eq!(cart.peek(0x1400), 2);
        cart.read(0x1FF1); // segment 2 <- slice 1
        assert_eq!(cart.peek(0x1800), 1);
    }

    #[test]
    fn test_writes_switch_too() {
        let mut cart = E0::new(rom()).unwrap();
        cart.write(0x1FE0, 0xFF);
        assert_eq!(cart.peek(0x1000), 0);
    }
}
