//! Cartridge bus and bankswitching mappers.
//!
//! A cartridge larger than the 4K window at $1000-$1FFF presents itself
//! through a bankswitch scheme: accessing (or writing) scheme-specific
//! hot-spot addresses swaps what the window shows. Some schemes watch
//! addresses *outside* the cartridge window (FE monitors the stack, 3F
//! and UA watch TIA/RIOT-space addresses), so the console bus forwards
//! every access to [`Cartridge::snoop`].
//!
//! Each scheme is a variant of the [`Mapper`] enum and is dispatched by
//! exhaustive match; the driver only ever sees the capability set
//! (`peek`/`read`/`write`/`snoop`/`step_machine_cycle`).

mod banked;
mod cdf;
mod dpc;
mod dpcplus;
mod e0;
mod e7;
mod standard;
mod superbank;
pub mod thumb;
mod tigervision;

pub use banked::{Banked, Fe};
pub use cdf::Cdf;
pub use dpc::Dpc;
pub use dpcplus::DpcPlus;
pub use e0::E0;
pub use e7::E7;
pub use standard::Standard;
pub use superbank::Superbank;
pub use tigervision::Tigervision;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CartridgeError {
    #[error("unsupported ROM size: {0} bytes")]
    InvalidSize(usize),
    #[error("ROM size {size} bytes does not fit mapper {kind:?}")]
    SizeMismatch { kind: MapperKind, size: usize },
}

/// Bankswitch scheme tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MapperKind {
    TwoK,
    FourK,
    /// CommaVid: 2K ROM + 1K RAM
    Cv,
    F8,
    F6,
    F4,
    F8Sc,
    F6Sc,
    F4Sc,
    /// Activision FE: stack-monitoring 8K
    Fe,
    /// Parker Brothers 8K: three switchable 1K slices
    E0,
    /// M-Network 16K: 2K slices plus RAM
    E7,
    /// Tigervision: 2K banks selected by writes to $3F
    ThreeF,
    /// Tigervision with RAM banks selected by writes to $3E
    ThreeE,
    /// UA Limited: $0220/$0240 hot-spots
    Ua,
    /// CBS RAM Plus 12K + 256B RAM
    Fa,
    /// FA2 24K/28K + 256B RAM
    Fa2,
    /// Pitfall II display/music coprocessor
    Dpc,
    /// Harmony DPC+ with ARM coprocessor
    DpcPlus,
    Cdf,
    Cdfj,
    /// Superbank: 4K banks selected at $0800
    Sb,
}

/// Human-readable bank state for inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankState {
    pub kind: MapperKind,
    pub bank: usize,
    pub detail: String,
}

fn find_signature(rom: &[u8], signature: &[u8]) -> bool {
    rom.windows(signature.len()).any(|w| w == signature)
}

fn count_signature(rom: &[u8], signature: &[u8]) -> usize {
    rom.windows(signature.len()).filter(|w| *w == signature).count()
}

/// Tigervision ROMs store the bank number with `STA $3F`.
fn probably_3f(rom: &[u8]) -> bool {
    count_signature(rom, &[0x85, 0x3F]) >= 2
}

fn probably_3e(rom: &[u8]) -> bool {
    probably_3f(rom) && count_signature(rom, &[0x85, 0x3E]) >= 1
}

/// Parker Brothers hot-spot accesses: LDA/STA $1FEx absolute.
fn probably_e0(rom: &[u8]) -> bool {
    for hi in [0x1F, 0xFF] {
        for lo in [0xE0, 0xE8, 0xF0] {
            if find_signature(rom, &[0xAD, lo, hi]) || find_signature(rom, &[0x8D, lo, hi]) {
                return true;
            }
        }
    }
    false
}

/// M-Network slice selects: LDA $1FE0-$1FE7 absolute.
fn probably_e7(rom: &[u8]) -> bool {
    for lo in 0xE0..=0xE7u8 {
        if find_signature(rom, &[0xAD, lo, 0x1F]) || find_signature(rom, &[0xAD, lo, 0xFF]) {
            return true;
        }
    }
    false
}

/// UA Limited switches with accesses to $0220/$0240.
fn probably_ua(rom: &[u8]) -> bool {
    find_signature(rom, &[0x8D, 0x40, 0x02]) || find_signature(rom, &[0xAD, 0x40, 0x02])
}

/// The FE scheme leaves no hot-spot reads in the image; Activision's
/// 8K builds share this JSR prologue.
fn probably_fe(rom: &[u8]) -> bool {
    find_signature(rom, &[0x20, 0x00, 0xD0, 0xC6, 0xC5])
}

/// Superchip images pad the RAM window; every bank starts with the
/// same 128 bytes.
fn probably_superchip(rom: &[u8]) -> bool {
    let banks = rom.len() / 4096;
    if banks < 2 {
        return false;
    }
    let first = &rom[0..128];
    (1..banks).all(|b| &rom[b * 4096..b * 4096 + 128] == first)
}

/// Infer the mapper from size and content signatures. The sizes in the
/// basic table (2K/4K/8K/16K/32K) fall through to the classic Atari
/// schemes when no signature matches.
pub fn detect(rom: &[u8]) -> Result<MapperKind, CartridgeError> {
    Ok(match rom.len() {
        2048 => MapperKind::TwoK,
        4096 => MapperKind::FourK,
        8192 => {
            if probably_3f(rom) {
                MapperKind::ThreeF
            } else if probably_e0(rom) {
                MapperKind::E0
            } else if probably_ua(rom) {
                MapperKind::Ua
            } else if probably_fe(rom) {
                MapperKind::Fe
            } else if probably_superchip(rom) {
                MapperKind::F8Sc
            } else {
                MapperKind::F8
            }
        }
        10240..=10495 => MapperKind::Dpc,
        12288 => MapperKind::Fa,
        16384 => {
            if probably_e7(rom) {
                MapperKind::E7
            } else if probably_superchip(rom) {
                MapperKind::F6Sc
            } else {
                MapperKind::F6
            }
        }
        24576 | 28672 => MapperKind::Fa2,
        32768 => {
            if find_signature(rom, b"DPC+") {
                MapperKind::DpcPlus
            } else if find_signature(rom, b"CDFJ") {
                MapperKind::Cdfj
            } else if find_signature(rom, b"CDF") {
                MapperKind::Cdf
            } else if probably_3f(rom) {
                MapperKind::ThreeF
            } else if probably_superchip(rom) {
                MapperKind::F4Sc
            } else {
                MapperKind::F4
            }
        }
        65536 | 131072 | 262144 | 524288 => {
            if probably_3e(rom) {
                MapperKind::ThreeE
            } else if probably_3f(rom) {
                MapperKind::ThreeF
            } else {
                MapperKind::Sb
            }
        }
        other => return Err(CartridgeError::InvalidSize(other)),
    })
}

/// Unified mapper enum; one variant per scheme family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Mapper {
    Standard(Standard),
    Banked(Banked),
    Fe(Fe),
    E0(E0),
    E7(E7),
    Tigervision(Tigervision),
    Superbank(Superbank),
    Dpc(Dpc),
    DpcPlus(DpcPlus),
    Cdf(Cdf),
}

/// A mounted cartridge: mapper plus its tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cartridge {
    kind: MapperKind,
    mapper: Mapper,
}

impl Cartridge {
    /// Build a cartridge from raw bytes. `kind` overrides detection
    /// (the `.map`/`.type` companion convention lives in the ingest
    /// layer; it hands us the resolved tag).
    pub fn new(rom: Vec<u8>, kind: Option<MapperKind>) -> Result<Self, CartridgeError> {
        let kind = match kind {
            Some(k) => k,
            None => detect(&rom)?,
        };
        let mapper = match kind {
            MapperKind::TwoK | MapperKind::FourK | MapperKind::Cv => {
                Mapper::Standard(Standard::new(rom, kind)?)
            }
            MapperKind::F8
            | MapperKind::F6
            | MapperKind::F4
            | MapperKind::F8Sc
            | MapperKind::F6Sc
            | MapperKind::F4Sc
            | MapperKind::Fa
            | MapperKind::Fa2
            | MapperKind::Ua => Mapper::Banked(Banked::new(rom, kind)?),
            MapperKind::Fe => Mapper::Fe(Fe::new(rom)?),
            MapperKind::E0 => Mapper::E0(E0::new(rom)?),
            MapperKind::E7 => Mapper::E7(E7::new(rom)?),
            MapperKind::ThreeF | MapperKind::ThreeE => {
                Mapper::Tigervision(Tigervision::new(rom, kind)?)
            }
            MapperKind::Sb => Mapper::Superbank(Superbank::new(rom)?),
            MapperKind::Dpc => Mapper::Dpc(Dpc::new(rom)?),
            MapperKind::DpcPlus => Mapper::DpcPlus(DpcPlus::new(rom)?),
            MapperKind::Cdf | MapperKind::Cdfj => Mapper::Cdf(Cdf::new(rom, kind)?),
        };
        Ok(Self { kind, mapper })
    }

    pub fn kind(&self) -> MapperKind {
        self.kind
    }

    /// Debug read: never triggers a bankswitch.
    pub fn peek(&self, addr: u16) -> u8 {
        match &self.mapper {
            Mapper::Standard(m) => m.peek(addr),
            Mapper::Banked(m) => m.peek(addr),
            Mapper::Fe(m) => m.peek(addr),
            Mapper::E0(m) => m.peek(addr),
            Mapper::E7(m) => m.peek(addr),
            Mapper::Tigervision(m) => m.peek(addr),
            Mapper::Superbank(m) => m.peek(addr),
            Mapper::Dpc(m) => m.peek(addr),
            Mapper::DpcPlus(m) => m.peek(addr),
            Mapper::Cdf(m) => m.peek(addr),
        }
    }

    /// CPU read from the cartridge window; may bankswitch.
    pub fn read(&mut self, addr: u16) -> u8 {
        match &mut self.mapper {
            Mapper::Standard(m) => m.peek(addr),
            Mapper::Banked(m) => m.read(addr),
            Mapper::Fe(m) => m.read(addr),
            Mapper::E0(m) => m.read(addr),
            Mapper::E7(m) => m.read(addr),
            Mapper::Tigervision(m) => m.read(addr),
            Mapper::Superbank(m) => m.peek(addr),
            Mapper::Dpc(m) => m.read(addr),
            Mapper::DpcPlus(m) => m.read(addr),
            Mapper::Cdf(m) => m.read(addr),
        }
    }

    /// CPU write into the cartridge window; hot-spots and mapper RAM.
    pub fn write(&mut self, addr: u16, val: u8) {
        match &mut self.mapper {
            Mapper::Standard(m) => m.write(addr, val),
            Mapper::Banked(m) => m.write(addr, val),
            Mapper::Fe(m) => m.write(addr, val),
            Mapper::E0(m) => m.write(addr, val),
            Mapper::E7(m) => m.write(addr, val),
            Mapper::Tigervision(m) => m.write(addr, val),
            Mapper::Superbank(m) => m.write(addr, val),
            Mapper::Dpc(m) => m.write(addr, val),
            Mapper::DpcPlus(m) => m.write(addr, val),
            Mapper::Cdf(m) => m.write(addr, val),
        }
    }

    /// Observe a bus access outside the cartridge window. FE, 3F/3E,
    /// UA and SB switch banks from here.
    pub fn snoop(&mut self, addr: u16, val: u8, is_write: bool) {
        match &mut self.mapper {
            Mapper::Banked(m) => m.snoop(addr),
            Mapper::Fe(m) => m.snoop(addr, val),
            Mapper::Tigervision(m) => m.snoop(addr, val, is_write),
            Mapper::Superbank(m) => m.snoop(addr),
            _ => {}
        }
    }

    /// One 6507 machine cycle, for mappers with onboard processors.
    pub fn step_machine_cycle(&mut self) {
        match &mut self.mapper {
            Mapper::Dpc(m) => m.step_machine_cycle(),
            Mapper::DpcPlus(m) => m.step_machine_cycle(),
            Mapper::Cdf(m) => m.step_machine_cycle(),
            _ => {}
        }
    }

    /// Current bank state for the inspection API.
    pub fn bank(&self) -> BankState {
        let (bank, detail) = match &self.mapper {
            Mapper::Standard(m) => m.bank_state(),
            Mapper::Banked(m) => m.bank_state(),
            Mapper::Fe(m) => m.bank_state(),
            Mapper::E0(m) => m.bank_state(),
            Mapper::E7(m) => m.bank_state(),
            Mapper::Tigervision(m) => m.bank_state(),
            Mapper::Superbank(m) => m.bank_state(),
            Mapper::Dpc(m) => m.bank_state(),
            Mapper::DpcPlus(m) => m.bank_state(),
            Mapper::Cdf(m) => m.bank_state(),
        };
        BankState {
            kind: self.kind,
            bank,
            detail,
        }
    }

    pub fn rom_size(&self) -> usize {
        match &self.mapper {
            Mapper::Standard(m) => m.rom_size(),
            Mapper::Banked(m) => m.rom_size(),
            Mapper::Fe(m) => m.rom_size(),
            Mapper::E0(m) => m.rom_size(),
            Mapper::E7(m) => m.rom_size(),
            Mapper::Tigervision(m) => m.rom_size(),
            Mapper::Superbank(m) => m.rom_size(),
            Mapper::Dpc(m) => m.rom_size(),
            Mapper::DpcPlus(m) => m.rom_size(),
            Mapper::Cdf(m) => m.rom_size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_basic_sizes() {
        assert_eq!(detect(&vec![0; 2048]).unwrap(), MapperKind::TwoK);
        assert_eq!(detect(&vec![0; 4096]).unwrap(), MapperKind::FourK);
        assert_eq!(detect(&vec![0; 12288]).unwrap(), MapperKind::Fa);
    }

    #[test]
    fn test_detect_superchip_vs_plain() {
        // all-zero banks share their first 128 bytes, reading as SC
        assert_eq!(detect(&vec![0; 8192]).unwrap(), MapperKind::F8Sc);

        let mut rom = vec![0u8; 8192];
        rom[0] = 1;
        rom[4096] = 2;
        assert_eq!(detect(&rom).unwrap(), MapperKind::F8);

        let mut rom = vec![0u8; 16384];
        for (i, chunk) in rom.chunks_mut(4096).enumerate() {
            chunk[0] = i as u8;
        }
        assert_eq!(detect(&rom).unwrap(), MapperKind::F6);

        let mut rom = vec![0u8; 32768];
        for (i, chunk) in rom.chunks_mut(4096).enumerate() {
            chunk[0] = i as u8;
        }
        assert_eq!(detect(&rom).unwrap(), MapperKind::F4);
    }

    #[test]
    fn test_detect_tigervision_signature() {
        let mut rom = vec![0u8; 8192];
        rom[0] = 1; // defeat the superchip heuristic
        rom[100] = 0x85;
        rom[101] = 0x3F;
        rom[500] = 0x85;
        rom[501] = 0x3F;
        assert_eq!(detect(&rom).unwrap(), MapperKind::ThreeF);
    }

    #[test]
    fn test_detect_arm_signatures() {
        let mut rom = vec![0u8; 32768];
        rom[0] = 1;
        rom[32..36].copy_from_slice(b"DPC+");
        assert_eq!(detect(&rom).unwrap(), MapperKind::DpcPlus);

        let mut rom = vec![0u8; 32768];
        rom[0] = 1;
        rom[32..36].copy_from_slice(b"CDFJ");
        assert_eq!(detect(&rom).unwrap(), MapperKind::Cdfj);
    }

    #[test]
    fn test_detect_dpc_size() {
        assert_eq!(detect(&vec![0; 10240]).unwrap(), MapperKind::Dpc);
    }

    #[test]
    fn test_detect_rejects_odd_sizes() {
        assert!(detect(&vec![0; 1000]).is_err());
        assert!(detect(&vec![0; 5000]).is_err());
    }

    #[test]
    fn test_explicit_kind_overrides_detection() {
        let cart = Cartridge::new(vec![0; 2048], Some(MapperKind::Cv)).unwrap();
        assert_eq!(cart.kind(), MapperKind::Cv);
    }

    #[test]
    fn test_bank_state_reports_kind() {
        let cart = Cartridge::new(vec![0; 8192], None).unwrap();
        let state = cart.bank();
        assert_eq!(state.kind, MapperKind::F8Sc);
        assert_eq!(state.bank, 0);
    }
}
