//! The 6507 address bus.
//!
//! The 6507 exposes thirteen address lines; TIA and RIOT decode only a
//! few of them, which produces the console's famous mirror maze:
//!
//! ```text
//! A12 = 1            cartridge window ($1000-$1FFF)
//! A12 = 0, A7 = 0    TIA  (A5..A0; reads decode A3..A0 only)
//! A12 = 0, A7 = 1, A9 = 0   RIOT RAM (A6..A0)
//! A12 = 0, A7 = 1, A9 = 1   RIOT IO and timer
//! ```
//!
//! The data bus floats: TIA read registers drive only bits 7-6, so the
//! remaining bits carry whatever byte was last transferred. The bus
//! keeps that byte and merges it into partially-driven reads, and every
//! access is also offered to the cartridge, whose more exotic mappers
//! (FE, 3F/3E, UA, SB) watch addresses outside their own window.

use serde::{Deserialize, Serialize};
use vcs_core::cpu_6507::Bus6507;

use crate::cartridge::Cartridge;
use crate::riot::Riot;
use crate::tia::Tia;

/// Diagnostic raised in strict mode for suspicious traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusFault {
    pub addr: u16,
    pub is_write: bool,
}

/// Address decoding between CPU, TIA, RIOT and cartridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VcsBus {
    pub tia: Tia,
    pub riot: Riot,
    pub cartridge: Option<Cartridge>,
    /// Last byte transferred on the data bus.
    last_value: u8,
    /// Strict mode surfaces unmapped traffic instead of absorbing it.
    pub strict: bool,
    fault: Option<BusFault>,
}

impl Default for VcsBus {
    fn default() -> Self {
        Self::new()
    }
}

impl VcsBus {
    pub fn new() -> Self {
        Self {
            tia: Tia::new(),
            riot: Riot::new(),
            cartridge: None,
            last_value: 0,
            strict: false,
            fault: None,
        }
    }

    pub fn insert_cartridge(&mut self, cartridge: Cartridge) {
        self.cartridge = Some(cartridge);
    }

    pub fn reset(&mut self) {
        self.tia.reset();
        self.riot.reset();
        self.last_value = 0;
        self.fault = None;
    }

    pub fn last_bus_value(&self) -> u8 {
        self.last_value
    }

    /// Pending strict-mode diagnostic, if any.
    pub fn take_fault(&mut self) -> Option<BusFault> {
        self.fault.take()
    }

    fn flag(&mut self, addr: u16, is_write: bool) {
        if self.strict && self.fault.is_none() {
            self.fault = Some(BusFault { addr, is_write });
        }
    }

    /// Side-effect-free read of any address, for the inspection API.
    pub fn peek(&self, addr: u16) -> u8 {
        let addr = addr & 0x1FFF;
        if addr & 0x1000 != 0 {
            return match &self.cartridge {
                Some(cart) => cart.peek(addr),
                None => self.last_value,
            };
        }
        if addr & 0x0080 != 0 {
            if addr & 0x0200 != 0 {
                self.riot.peek(addr)
            } else {
                self.riot.ram_read(addr)
            }
        } else {
            (self.tia.peek((addr & 0x0F) as u8) & 0xC0) | (self.last_value & 0x3F)
        }
    }
}

impl Bus6507 for VcsBus {
    fn read(&mut self, addr: u16) -> u8 {
        let addr = addr & 0x1FFF;
        let value = if addr & 0x1000 != 0 {
            match &mut self.cartridge {
                Some(cart) => cart.read(addr),
                None => {
                    self.flag(addr, false);
                    self.last_value
                }
            }
        } else {
            let value = if addr & 0x0080 != 0 {
                if addr & 0x0200 != 0 {
                    self.riot.read(addr)
                } else {
                    self.riot.ram_read(addr)
                }
            } else {
                // TIA drives bits 7-6; the rest floats
                (self.tia.read((addr & 0x0F) as u8) & 0xC0) | (self.last_value & 0x3F)
            };
            if let Some(cart) = &mut self.cartridge {
                cart.snoop(addr, value, false);
            }
            value
        };
        self.last_value = value;
        value
    }

    fn write(&mut self, addr: u16, val: u8) {
        let addr = addr & 0x1FFF;
        self.last_value = val;
        if addr & 0x1000 != 0 {
            match &mut self.cartridge {
                Some(cart) => cart.write(addr, val),
                None => self.flag(addr, true),
            }
            return;
        }
        if addr & 0x0080 != 0 {
            if addr & 0x0200 != 0 {
                self.riot.write(addr, val);
            } else {
                self.riot.ram_write(addr, val);
            }
        } else {
            let reg = (addr & 0x3F) as u8;
            if reg > 0x2C {
                self.flag(addr, true);
            }
            self.tia.write(reg, val);
        }
        if let Some(cart) = &mut self.cartridge {
            cart.snoop(addr, val, true);
        }
    }

    fn rdy(&self) -> bool {
        self.tia.rdy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::MapperKind;

    #[test]
    fn test_riot_ram_and_stack_mirror() {
        let mut bus = VcsBus::new();
        bus.write(0x0080, 0x12);
        assert_eq!(bus.read(0x0080), 0x12);
        // the stack page mirrors the same 128 bytes
        bus.write(0x01FF, 0x34);
        assert_eq!(bus.read(0x00FF), 0x34);
    }

    #[test]
    fn test_riot_io_decode() {
        let mut bus = VcsBus::new();
        bus.write(0x0296, 10); // TIM64T
        assert_eq!(bus.read(0x0284), 10); // INTIM
    }

    #[test]
    fn test_tia_write_decode() {
        let mut bus = VcsBus::new();
        bus.write(0x0002, 0); // WSYNC
        assert!(!bus.rdy());
    }

    #[test]
    fn test_tia_read_merges_floating_bus() {
        let mut bus = VcsBus::new();
        // park a value on the bus
        bus.write(0x0080, 0x15);
        // collision registers are clear: bits 7-6 zero, rest floats
        assert_eq!(bus.read(0x0000), 0x15 & 0x3F);
    }

    #[test]
    fn test_thirteen_bit_folding() {
        let mut bus = VcsBus::new();
        bus.write(0x0080, 0x42);
        assert_eq!(bus.read(0x2080), 0x42);
        assert_eq!(bus.read(0xE080), 0x42);
    }

    #[test]
    fn test_cartridge_window_without_cartridge_floats() {
        let mut bus = VcsBus::new();
        bus.write(0x0080, 0x7E);
        assert_eq!(bus.read(0x1000), 0x7E);
    }

    #[test]
    fn test_strict_mode_flags_unmapped() {
        let mut bus = VcsBus::new();
        bus.strict = true;
        bus.read(0x1000);
        let fault = bus.take_fault().expect("fault");
        assert_eq!(fault.addr, 0x1000);
        assert!(!fault.is_write);
        assert_eq!(bus.take_fault(), None);
    }

    #[test]
    fn test_cartridge_routing() {
        let mut bus = VcsBus::new();
        let mut rom = vec![0u8; 4096];
        rom[0] = 0x42;
        bus.insert_cartridge(Cartridge::new(rom, None).unwrap());
        assert_eq!(bus.read(0x1000), 0x42);
        assert_eq!(bus.read(0xF000), 0x42);
    }

    #[test]
    fn test_snoop_reaches_tigervision_hotspot() {
        let mut bus = VcsBus::new();
        let mut rom = vec![0u8; 8192];
        for (i, chunk) in rom.chunks_mut(2048).enumerate() {
            chunk[0] = 0x30 + i as u8;
        }
        bus.insert_cartridge(Cartridge::new(rom, Some(MapperKind::ThreeF)).unwrap());
        assert_eq!(bus.read(0x1000), 0x30);
        // a write to TIA address $3F also reaches the mapper
        bus.write(0x003F, 0x02);
        assert_eq!(bus.read(0x1000), 0x32);
    }

    #[test]
    fn test_peek_has_no_side_effects() {
        let mut bus = VcsBus::new();
        bus.write(0x0296, 2); // TIM64T
        for _ in 0..(2 * 64 + 1) {
            bus.riot.step_machine_cycle();
        }
        assert!(bus.riot.timer_underflowed());
        // peek of INTIM must not clear the underflow latch
        bus.peek(0x0284);
        assert!(bus.riot.timer_underflowed());
        // a real read does
        bus.read(0x0284);
        assert!(!bus.riot.timer_underflowed());
    }
}
