//! MOS 6507 CPU core, stepped one bus cycle at a time.
//!
//! The 6507 is a 6502 with a 13-bit address bus and no IRQ/NMI pins. On
//! this machine the CPU races the electron beam, so the core is stepped
//! per *bus cycle* rather than per instruction: every call to
//! [`Cpu6507::step`] performs exactly one read or write on the bus (every
//! 6502 cycle touches the bus, dummy cycles included). This makes WSYNC
//! stalls, HMOVE timing and mapper hot-spot accesses land on the same
//! color clock they would on real silicon.
//!
//! Read-modify-write instructions emit their intermediate dummy write;
//! indexed addressing emits the documented dummy reads. The RDY line is
//! sampled on read cycles only - a write cycle completes even while RDY
//! is low.

use serde::{Deserialize, Serialize};

/// Bus interface for the 6507.
///
/// The console implements this to route accesses to TIA, RIOT and the
/// cartridge. Reads take `&mut self` because reading has side effects on
/// this machine (collision latch reads, timer flag clears, bankswitch
/// hot-spots, floating bus updates).
pub trait Bus6507 {
    /// Read a byte from the bus.
    fn read(&mut self, addr: u16) -> u8;

    /// Write a byte to the bus.
    fn write(&mut self, addr: u16, val: u8);

    /// State of the RDY line; `false` halts the CPU on its next read cycle.
    fn rdy(&self) -> bool {
        true
    }
}

// Status register bits. Bit 5 is hard-wired to 1; bit 4 (B) only exists
// on the pushed copy.
pub const FLAG_C: u8 = 0x01;
pub const FLAG_Z: u8 = 0x02;
pub const FLAG_I: u8 = 0x04;
pub const FLAG_D: u8 = 0x08;
pub const FLAG_B: u8 = 0x10;
pub const FLAG_U: u8 = 0x20;
pub const FLAG_V: u8 = 0x40;
pub const FLAG_N: u8 = 0x80;

/// Result of advancing the CPU by one color-clock-aligned bus cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    /// A bus cycle was performed; the instruction is still in flight.
    Busy,
    /// The RDY line held the CPU; no bus access happened.
    Stalled,
    /// A bus cycle was performed and it completed the instruction.
    Done,
}

/// Non-fatal conditions surfaced to the inspection sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultKind {
    /// An opcode from the JAM/KIL family; executed as a two-cycle NOP.
    UnimplementedOpcode,
    /// PC incremented past 0xFFFF and wrapped to 0x0000.
    ProgramCounterWrap,
}

/// A fault record: what happened, where.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuFault {
    pub pc: u16,
    pub opcode: u8,
    pub kind: FaultKind,
}

/// Trace record for the most recently completed instruction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trace {
    /// Address the opcode was fetched from.
    pub pc: u16,
    pub opcode: u8,
    /// Effective address, when the instruction computed one.
    pub ea: u16,
    /// Operand byte read or written, when there was one.
    pub operand: u8,
}

/// Addressing modes of the 6502/6507.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Imp,
    Acc,
    Imm,
    Zp,
    ZpX,
    ZpY,
    Abs,
    AbsX,
    AbsY,
    IndX,
    IndY,
    Ind,
    Rel,
}

/// Operations, documented and undocumented-but-stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    // read class
    Lda,
    Ldx,
    Ldy,
    Adc,
    Sbc,
    And,
    Ora,
    Eor,
    Cmp,
    Cpx,
    Cpy,
    Bit,
    Lax,
    NopRead,
    Anc,
    Alr,
    Arr,
    Axs,
    Ane,
    Lxa,
    Las,
    // write class
    Sta,
    Stx,
    Sty,
    Sax,
    Sha,
    Shx,
    Shy,
    Tas,
    // read-modify-write class
    Asl,
    Lsr,
    Rol,
    Ror,
    Inc,
    Dec,
    Slo,
    Sre,
    Rla,
    Rra,
    Dcp,
    Isc,
    // implied
    Tax,
    Tay,
    Txa,
    Tya,
    Txs,
    Tsx,
    Inx,
    Iny,
    Dex,
    Dey,
    Clc,
    Sec,
    Cli,
    Sei,
    Clv,
    Cld,
    Sed,
    Nop,
    // control flow and stack
    Jmp,
    Jsr,
    Rts,
    Rti,
    Brk,
    Pha,
    Php,
    Pla,
    Plp,
    Branch,
    // JAM/KIL family; degraded to a two-cycle NOP with a fault
    Jam,
}

/// Bus-access classes; selects the micro-sequence within a mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Class {
    Read,
    Write,
    Rmw,
    Other,
}

fn classify(op: Op) -> Class {
    use Op::*;
    match op {
        Lda | Ldx | Ldy | Adc | Sbc | And | Ora | Eor | Cmp | Cpx | Cpy | Bit | Lax | NopRead
        | Anc | Alr | Arr | Axs | Ane | Lxa | Las => Class::Read,
        Sta | Stx | Sty | Sax | Sha | Shx | Shy | Tas => Class::Write,
        Asl | Lsr | Rol | Ror | Inc | Dec | Slo | Sre | Rla | Rra | Dcp | Isc => Class::Rmw,
        _ => Class::Other,
    }
}

fn decode(opcode: u8) -> (Op, Mode) {
    use Mode::*;
    use Op::*;
    match opcode {
        0x00 => (Brk, Imp),
        0x08 => (Php, Imp),
        0x28 => (Plp, Imp),
        0x48 => (Pha, Imp),
        0x68 => (Pla, Imp),
        0x20 => (Jsr, Abs),
        0x40 => (Rti, Imp),
        0x60 => (Rts, Imp),
        0x4C => (Jmp, Abs),
        0x6C => (Jmp, Ind),
        0x10 | 0x30 | 0x50 | 0x70 | 0x90 | 0xB0 | 0xD0 | 0xF0 => (Branch, Rel),

        0xA9 => (Lda, Imm),
        0xA5 => (Lda, Zp),
        0xB5 => (Lda, ZpX),
        0xAD => (Lda, Abs),
        0xBD => (Lda, AbsX),
        0xB9 => (Lda, AbsY),
        0xA1 => (Lda, IndX),
        0xB1 => (Lda, IndY),
        0xA2 => (Ldx, Imm),
        0xA6 => (Ldx, Zp),
        0xB6 => (Ldx, ZpY),
        0xAE => (Ldx, Abs),
        0xBE => (Ldx, AbsY),
        0xA0 => (Ldy, Imm),
        0xA4 => (Ldy, Zp),
        0xB4 => (Ldy, ZpX),
        0xAC => (Ldy, Abs),
        0xBC => (Ldy, AbsX),

        0x85 => (Sta, Zp),
        0x95 => (Sta, ZpX),
        0x8D => (Sta, Abs),
        0x9D => (Sta, AbsX),
        0x99 => (Sta, AbsY),
        0x81 => (Sta, IndX),
        0x91 => (Sta, IndY),
        0x86 => (Stx, Zp),
        0x96 => (Stx, ZpY),
        0x8E => (Stx, Abs),
        0x84 => (Sty, Zp),
        0x94 => (Sty, ZpX),
        0x8C => (Sty, Abs),

        0x69 => (Adc, Imm),
        0x65 => (Adc, Zp),
        0x75 => (Adc, ZpX),
        0x6D => (Adc, Abs),
        0x7D => (Adc, AbsX),
        0x79 => (Adc, AbsY),
        0x61 => (Adc, IndX),
        0x71 => (Adc, IndY),
        0xE9 | 0xEB => (Sbc, Imm),
        0xE5 => (Sbc, Zp),
        0xF5 => (Sbc, ZpX),
        0xED => (Sbc, Abs),
        0xFD => (Sbc, AbsX),
        0xF9 => (Sbc, AbsY),
        0xE1 => (Sbc, IndX),
        0xF1 => (Sbc, IndY),

        0x29 => (And, Imm),
        0x25 => (And, Zp),
        0x35 => (And, ZpX),
        0x2D => (And, Abs),
        0x3D => (And, AbsX),
        0x39 => (And, AbsY),
        0x21 => (And, IndX),
        0x31 => (And, IndY),
        0x09 => (Ora, Imm),
        0x05 => (Ora, Zp),
        0x15 => (Ora, ZpX),
        0x0D => (Ora, Abs),
        0x1D => (Ora, AbsX),
        0x19 => (Ora, AbsY),
        0x01 => (Ora, IndX),
        0x11 => (Ora, IndY),
        0x49 => (Eor, Imm),
        0x45 => (Eor, Zp),
        0x55 => (Eor, ZpX),
        0x4D => (Eor, Abs),
        0x5D => (Eor, AbsX),
        0x59 => (Eor, AbsY),
        0x41 => (Eor, IndX),
        0x51 => (Eor, IndY),

        0xC9 => (Cmp, Imm),
        0xC5 => (Cmp, Zp),
        0xD5 => (Cmp, ZpX),
        0xCD => (Cmp, Abs),
        0xDD => (Cmp, AbsX),
        0xD9 => (Cmp, AbsY),
        0xC1 => (Cmp, IndX),
        0xD1 => (Cmp, IndY),
        0xE0 => (Cpx, Imm),
        0xE4 => (Cpx, Zp),
        0xEC => (Cpx, Abs),
        0xC0 => (Cpy, Imm),
        0xC4 => (Cpy, Zp),
        0xCC => (Cpy, Abs),
        0x24 => (Bit, Zp),
        0x2C => (Bit, Abs),

        0x0A => (Asl, Acc),
        0x06 => (Asl, Zp),
        0x16 => (Asl, ZpX),
        0x0E => (Asl, Abs),
        0x1E => (Asl, AbsX),
        0x4A => (Lsr, Acc),
        0x46 => (Lsr, Zp),
        0x56 => (Lsr, ZpX),
        0x4E => (Lsr, Abs),
        0x5E => (Lsr, AbsX),
        0x2A => (Rol, Acc),
        0x26 => (Rol, Zp),
        0x36 => (Rol, ZpX),
        0x2E => (Rol, Abs),
        0x3E => (Rol, AbsX),
        0x6A => (Ror, Acc),
        0x66 => (Ror, Zp),
        0x76 => (Ror, ZpX),
        0x6E => (Ror, Abs),
        0x7E => (Ror, AbsX),
        0xE6 => (Inc, Zp),
        0xF6 => (Inc, ZpX),
        0xEE => (Inc, Abs),
        0xFE => (Inc, AbsX),
        0xC6 => (Dec, Zp),
        0xD6 => (Dec, ZpX),
        0xCE => (Dec, Abs),
        0xDE => (Dec, AbsX),

        0xAA => (Tax, Imp),
        0xA8 => (Tay, Imp),
        0x8A => (Txa, Imp),
        0x98 => (Tya, Imp),
        0x9A => (Txs, Imp),
        0xBA => (Tsx, Imp),
        0xE8 => (Inx, Imp),
        0xC8 => (Iny, Imp),
        0xCA => (Dex, Imp),
        0x88 => (Dey, Imp),
        0x18 => (Clc, Imp),
        0x38 => (Sec, Imp),
        0x58 => (Cli, Imp),
        0x78 => (Sei, Imp),
        0xB8 => (Clv, Imp),
        0xD8 => (Cld, Imp),
        0xF8 => (Sed, Imp),
        0xEA => (Nop, Imp),

        // undocumented, stable
        0xA7 => (Lax, Zp),
        0xB7 => (Lax, ZpY),
        0xAF => (Lax, Abs),
        0xBF => (Lax, AbsY),
        0xA3 => (Lax, IndX),
        0xB3 => (Lax, IndY),
        0x87 => (Sax, Zp),
        0x97 => (Sax, ZpY),
        0x8F => (Sax, Abs),
        0x83 => (Sax, IndX),
        0xC7 => (Dcp, Zp),
        0xD7 => (Dcp, ZpX),
        0xCF => (Dcp, Abs),
        0xDF => (Dcp, AbsX),
        0xDB => (Dcp, AbsY),
        0xC3 => (Dcp, IndX),
        0xD3 => (Dcp, IndY),
        0xE7 => (Isc, Zp),
        0xF7 => (Isc, ZpX),
        0xEF => (Isc, Abs),
        0xFF => (Isc, AbsX),
        0xFB => (Isc, AbsY),
        0xE3 => (Isc, IndX),
        0xF3 => (Isc, IndY),
        0x07 => (Slo, Zp),
        0x17 => (Slo, ZpX),
        0x0F => (Slo, Abs),
        0x1F => (Slo, AbsX),
        0x1B => (Slo, AbsY),
        0x03 => (Slo, IndX),
        0x13 => (Slo, IndY),
        0x27 => (Rla, Zp),
        0x37 => (Rla, ZpX),
        0x2F => (Rla, Abs),
        0x3F => (Rla, AbsX),
        0x3B => (Rla, AbsY),
        0x23 => (Rla, IndX),
        0x33 => (Rla, IndY),
        0x47 => (Sre, Zp),
        0x57 => (Sre, ZpX),
        0x4F => (Sre, Abs),
        0x5F => (Sre, AbsX),
        0x5B => (Sre, AbsY),
        0x43 => (Sre, IndX),
        0x53 => (Sre, IndY),
        0x67 => (Rra, Zp),
        0x77 => (Rra, ZpX),
        0x6F => (Rra, Abs),
        0x7F => (Rra, AbsX),
        0x7B => (Rra, AbsY),
        0x63 => (Rra, IndX),
        0x73 => (Rra, IndY),
        0x0B | 0x2B => (Anc, Imm),
        0x4B => (Alr, Imm),
        0x6B => (Arr, Imm),
        0xCB => (Axs, Imm),

        // undocumented, unstable; deterministic choice documented in DESIGN.md
        0x8B => (Ane, Imm),
        0xAB => (Lxa, Imm),
        0x9F => (Sha, AbsY),
        0x93 => (Sha, IndY),
        0x9E => (Shx, AbsY),
        0x9C => (Shy, AbsX),
        0x9B => (Tas, AbsY),
        0xBB => (Las, AbsY),

        // NOP variants
        0x1A | 0x3A | 0x5A | 0x7A | 0xDA | 0xFA => (Nop, Imp),
        0x80 | 0x82 | 0x89 | 0xC2 | 0xE2 => (NopRead, Imm),
        0x04 | 0x44 | 0x64 => (NopRead, Zp),
        0x14 | 0x34 | 0x54 | 0x74 | 0xD4 | 0xF4 => (NopRead, ZpX),
        0x0C => (NopRead, Abs),
        0x1C | 0x3C | 0x5C | 0x7C | 0xDC | 0xFC => (NopRead, AbsX),

        // JAM/KIL
        0x02 | 0x12 | 0x22 | 0x32 | 0x42 | 0x52 | 0x62 | 0x72 | 0x92 | 0xB2 | 0xD2 | 0xF2 => {
            (Jam, Imp)
        }
    }
}

/// MOS 6507 CPU state and per-cycle execution engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cpu6507 {
    /// Accumulator register
    pub a: u8,
    /// X index register
    pub x: u8,
    /// Y index register
    pub y: u8,
    /// Stack pointer (points to 0x0100 + sp; RAM mirror on the VCS)
    pub sp: u8,
    /// Status register (NV-BDIZC, bit 5 wired high)
    pub status: u8,
    /// Program counter
    pub pc: u16,
    /// Total bus cycles executed (stalled cycles excluded)
    pub cycles: u64,
    /// Cycles the RDY line held the CPU
    pub stalled_cycles: u64,

    // in-flight instruction state
    opcode: u8,
    cycle: u8,
    ea: u16,
    base: u16,
    ptr: u8,
    operand: u8,
    crossed: bool,
    branch_target: u16,

    trace: Trace,
    fault: Option<CpuFault>,
}

impl Default for Cpu6507 {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu6507 {
    pub fn new() -> Self {
        Self {
            a: 0,
            x: 0,
            y: 0,
            sp: 0xFD,
            status: FLAG_U | FLAG_I,
            pc: 0,
            cycles: 0,
            stalled_cycles: 0,
            opcode: 0,
            cycle: 0,
            ea: 0,
            base: 0,
            ptr: 0,
            operand: 0,
            crossed: false,
            branch_target: 0,
            trace: Trace::default(),
            fault: None,
        }
    }

    /// Reset: load the vector at $FFFC, set I, clear D, drop S by 3
    /// without touching RAM. Registers are otherwise preserved, as on
    /// real silicon.
    pub fn reset<B: Bus6507>(&mut self, bus: &mut B) {
        let lo = bus.read(0xFFFC) as u16;
        let hi = bus.read(0xFFFD) as u16;
        self.pc = (hi << 8) | lo;
        self.sp = self.sp.wrapping_sub(3);
        self.status |= FLAG_I | FLAG_U;
        self.status &= !FLAG_D;
        self.cycle = 0;
        self.cycles = self.cycles.wrapping_add(7);
    }

    /// True when no instruction is in flight.
    pub fn at_instruction_boundary(&self) -> bool {
        self.cycle == 0
    }

    /// Trace record of the most recently completed instruction.
    pub fn last_trace(&self) -> Trace {
        self.trace
    }

    /// Take the pending fault, if any. Faults are non-fatal; execution
    /// has already continued past them.
    pub fn take_fault(&mut self) -> Option<CpuFault> {
        self.fault.take()
    }

    fn set_zn(&mut self, v: u8) {
        if v == 0 {
            self.status |= FLAG_Z;
        } else {
            self.status &= !FLAG_Z;
        }
        if v & 0x80 != 0 {
            self.status |= FLAG_N;
        } else {
            self.status &= !FLAG_N;
        }
    }

    fn set_flag(&mut self, flag: u8, on: bool) {
        if on {
            self.status |= flag;
        } else {
            self.status &= !flag;
        }
    }

    fn flag(&self, flag: u8) -> bool {
        self.status & flag != 0
    }

    fn fetch_pc<B: Bus6507>(&mut self, bus: &mut B) -> u8 {
        let v = bus.read(self.pc);
        let (next, wrapped) = self.pc.overflowing_add(1);
        if wrapped {
            self.fault = Some(CpuFault {
                pc: self.pc,
                opcode: self.opcode,
                kind: FaultKind::ProgramCounterWrap,
            });
        }
        self.pc = next;
        v
    }

    fn push<B: Bus6507>(&mut self, bus: &mut B, v: u8) {
        bus.write(0x0100 | self.sp as u16, v);
        self.sp = self.sp.wrapping_sub(1);
    }

    fn pop<B: Bus6507>(&mut self, bus: &mut B) -> u8 {
        self.sp = self.sp.wrapping_add(1);
        bus.read(0x0100 | self.sp as u16)
    }

    /// Whether the *next* bus cycle of the in-flight instruction is a
    /// write. RDY only halts read cycles.
    fn upcoming_is_write(&self) -> bool {
        if self.cycle == 0 {
            return false; // opcode fetch
        }
        let (op, mode) = decode(self.opcode);
        let class = classify(op);
        match (mode, class) {
            (Mode::Zp, Class::Write) => self.cycle == 2,
            (Mode::Zp, Class::Rmw) => self.cycle >= 3,
            (Mode::ZpX | Mode::ZpY, Class::Write) => self.cycle == 3,
            (Mode::ZpX | Mode::ZpY, Class::Rmw) => self.cycle >= 4,
            (Mode::Abs, Class::Write) => self.cycle == 3,
            (Mode::Abs, Class::Rmw) => self.cycle >= 4,
            (Mode::AbsX | Mode::AbsY, Class::Write) => self.cycle == 4,
            (Mode::AbsX | Mode::AbsY, Class::Rmw) => self.cycle >= 5,
            (Mode::IndX | Mode::IndY, Class::Write) => self.cycle == 5,
            (Mode::IndX | Mode::IndY, Class::Rmw) => self.cycle >= 6,
            _ => match op {
                Op::Pha | Op::Php => self.cycle == 2,
                Op::Jsr => self.cycle == 3 || self.cycle == 4,
                Op::Brk => (2..=4).contains(&self.cycle),
                _ => false,
            },
        }
    }

    fn finish(&mut self) -> StepResult {
        self.trace.ea = self.ea;
        self.trace.operand = self.operand;
        self.cycle = 0;
        StepResult::Done
    }

    /// Advance exactly one bus cycle.
    pub fn step<B: Bus6507>(&mut self, bus: &mut B) -> StepResult {
        if !self.upcoming_is_write() && !bus.rdy() {
            self.stalled_cycles += 1;
            return StepResult::Stalled;
        }
        self.cycles += 1;

        if self.cycle == 0 {
            self.trace = Trace {
                pc: self.pc,
                ..Trace::default()
            };
            self.opcode = self.fetch_pc(bus);
            self.trace.opcode = self.opcode;
            self.ea = 0;
            self.base = 0;
            self.ptr = 0;
            self.operand = 0;
            self.crossed = false;
            self.cycle = 1;
            return StepResult::Busy;
        }

        let (op, mode) = decode(self.opcode);

        // Control-flow and stack instructions have bespoke sequences.
        match op {
            Op::Branch => return self.step_branch(bus),
            Op::Jmp => return self.step_jmp(bus, mode),
            Op::Jsr => return self.step_jsr(bus),
            Op::Rts => return self.step_rts(bus),
            Op::Rti => return self.step_rti(bus),
            Op::Brk => return self.step_brk(bus),
            Op::Pha | Op::Php => return self.step_push(bus, op),
            Op::Pla | Op::Plp => return self.step_pop(bus, op),
            _ => {}
        }

        match mode {
            Mode::Imp | Mode::Acc => {
                let _ = bus.read(self.pc); // dummy fetch of the next byte
                self.exec_implied(op);
                self.finish()
            }
            Mode::Imm => {
                let v = self.fetch_pc(bus);
                self.operand = v;
                self.exec_read(op, v);
                self.finish()
            }
            Mode::Zp => self.step_zp(bus, op),
            Mode::ZpX => self.step_zp_indexed(bus, op, self.x),
            Mode::ZpY => self.step_zp_indexed(bus, op, self.y),
            Mode::Abs => self.step_abs(bus, op),
            Mode::AbsX => self.step_abs_indexed(bus, op, self.x),
            Mode::AbsY => self.step_abs_indexed(bus, op, self.y),
            Mode::IndX => self.step_ind_x(bus, op),
            Mode::IndY => self.step_ind_y(bus, op),
            Mode::Ind | Mode::Rel => unreachable!("handled above"),
        }
    }

    fn step_zp<B: Bus6507>(&mut self, bus: &mut B, op: Op) -> StepResult {
        match (self.cycle, classify(op)) {
            (1, _) => {
                self.ea = self.fetch_pc(bus) as u16;
                self.cycle = 2;
                StepResult::Busy
            }
            (2, Class::Read) => {
                let v = bus.read(self.ea);
                self.operand = v;
                self.exec_read(op, v);
                self.finish()
            }
            (2, Class::Write) => {
                let v = self.store_value(op);
                self.operand = v;
                bus.write(self.ea, v);
                self.finish()
            }
            (2, Class::Rmw) => {
                self.operand = bus.read(self.ea);
                self.cycle = 3;
                StepResult::Busy
            }
            (3, Class::Rmw) => {
                // dummy write of the unmodified byte; observable
                bus.write(self.ea, self.operand);
                self.cycle = 4;
                StepResult::Busy
            }
            (4, Class::Rmw) => {
                let result = self.exec_rmw(op, self.operand);
                bus.write(self.ea, result);
                self.finish()
            }
            _ => unreachable!("zp cycle overflow"),
        }
    }

    fn step_zp_indexed<B: Bus6507>(&mut self, bus: &mut B, op: Op, index: u8) -> StepResult {
        match (self.cycle, classify(op)) {
            (1, _) => {
                self.ptr = self.fetch_pc(bus);
                self.cycle = 2;
                StepResult::Busy
            }
            (2, _) => {
                let _ = bus.read(self.ptr as u16); // dummy read of unindexed address
                self.ea = self.ptr.wrapping_add(index) as u16;
                self.cycle = 3;
                StepResult::Busy
            }
            (3, Class::Read) => {
                let v = bus.read(self.ea);
                self.operand = v;
                self.exec_read(op, v);
                self.finish()
            }
            (3, Class::Write) => {
                let v = self.store_value(op);
                self.operand = v;
                bus.write(self.ea, v);
                self.finish()
            }
            (3, Class::Rmw) => {
                self.operand = bus.read(self.ea);
                self.cycle = 4;
                StepResult::Busy
            }
            (4, Class::Rmw) => {
                bus.write(self.ea, self.operand);
                self.cycle = 5;
                StepResult::Busy
            }
            (5, Class::Rmw) => {
                let result = self.exec_rmw(op, self.operand);
                bus.write(self.ea, result);
                self.finish()
            }
            _ => unreachable!("zp indexed cycle overflow"),
        }
    }

    fn step_abs<B: Bus6507>(&mut self, bus: &mut B, op: Op) -> StepResult {
        match (self.cycle, classify(op)) {
            (1, _) => {
                self.ea = self.fetch_pc(bus) as u16;
                self.cycle = 2;
                StepResult::Busy
            }
            (2, _) => {
                self.ea |= (self.fetch_pc(bus) as u16) << 8;
                self.cycle = 3;
                StepResult::Busy
            }
            (3, Class::Read) => {
                let v = bus.read(self.ea);
                self.operand = v;
                self.exec_read(op, v);
                self.finish()
            }
            (3, Class::Write) => {
                let v = self.store_value(op);
                self.operand = v;
                bus.write(self.ea, v);
                self.finish()
            }
            (3, Class::Rmw) => {
                self.operand = bus.read(self.ea);
                self.cycle = 4;
                StepResult::Busy
            }
            (4, Class::Rmw) => {
                bus.write(self.ea, self.operand);
                self.cycle = 5;
                StepResult::Busy
            }
            (5, Class::Rmw) => {
                let result = self.exec_rmw(op, self.operand);
                bus.write(self.ea, result);
                self.finish()
            }
            _ => unreachable!("abs cycle overflow"),
        }
    }

    fn step_abs_indexed<B: Bus6507>(&mut self, bus: &mut B, op: Op, index: u8) -> StepResult {
        match (self.cycle, classify(op)) {
            (1, _) => {
                self.base = self.fetch_pc(bus) as u16;
                self.cycle = 2;
                StepResult::Busy
            }
            (2, _) => {
                self.base |= (self.fetch_pc(bus) as u16) << 8;
                self.ea = self.base.wrapping_add(index as u16);
                self.crossed = self.ea & 0xFF00 != self.base & 0xFF00;
                self.cycle = 3;
                StepResult::Busy
            }
            (3, Class::Read) => {
                // read from the partially-added address; a page cross
                // makes this a dummy read followed by the fixed one
                let partial = (self.base & 0xFF00) | (self.ea & 0x00FF);
                let v = bus.read(partial);
                if self.crossed {
                    self.cycle = 4;
                    StepResult::Busy
                } else {
                    self.operand = v;
                    self.exec_read(op, v);
                    self.finish()
                }
            }
            (4, Class::Read) => {
                let v = bus.read(self.ea);
                self.operand = v;
                self.exec_read(op, v);
                self.finish()
            }
            (3, Class::Write) => {
                let partial = (self.base & 0xFF00) | (self.ea & 0x00FF);
                let _ = bus.read(partial);
                self.cycle = 4;
                StepResult::Busy
            }
            (4, Class::Write) => {
                let v = self.store_value(op);
                self.operand = v;
                bus.write(self.ea, v);
                self.finish()
            }
            (3, Class::Rmw) => {
                let partial = (self.base & 0xFF00) | (self.ea & 0x00FF);
                let _ = bus.read(partial);
                self.cycle = 4;
                StepResult::Busy
            }
            (4, Class::Rmw) => {
                self.operand = bus.read(self.ea);
                self.cycle = 5;
                StepResult::Busy
            }
            (5, Class::Rmw) => {
                bus.write(self.ea, self.operand);
                self.cycle = 6;
                StepResult::Busy
            }
            (6, Class::Rmw) => {
                let result = self.exec_rmw(op, self.operand);
                bus.write(self.ea, result);
                self.finish()
            }
            _ => unreachable!("abs indexed cycle overflow"),
        }
    }

    fn step_ind_x<B: Bus6507>(&mut self, bus: &mut B, op: Op) -> StepResult {
        match (self.cycle, classify(op)) {
            (1, _) => {
                self.ptr = self.fetch_pc(bus);
                self.cycle = 2;
                StepResult::Busy
            }
            (2, _) => {
                let _ = bus.read(self.ptr as u16); // dummy read while X is added
                self.cycle = 3;
                StepResult::Busy
            }
            (3, _) => {
                self.ea = bus.read(self.ptr.wrapping_add(self.x) as u16) as u16;
                self.cycle = 4;
                StepResult::Busy
            }
            (4, _) => {
                let hi = bus.read(self.ptr.wrapping_add(self.x).wrapping_add(1) as u16);
                self.ea |= (hi as u16) << 8;
                self.cycle = 5;
                StepResult::Busy
            }
            (5, Class::Read) => {
                let v = bus.read(self.ea);
                self.operand = v;
                self.exec_read(op, v);
                self.finish()
            }
            (5, Class::Write) => {
                let v = self.store_value(op);
                self.operand = v;
                bus.write(self.ea, v);
                self.finish()
            }
            (5, Class::Rmw) => {
                self.operand = bus.read(self.ea);
                self.cycle = 6;
                StepResult::Busy
            }
            (6, Class::Rmw) => {
                bus.write(self.ea, self.operand);
                self.cycle = 7;
                StepResult::Busy
            }
            (7, Class::Rmw) => {
                let result = self.exec_rmw(op, self.operand);
                bus.write(self.ea, result);
                self.finish()
            }
            _ => unreachable!("(ind,X) cycle overflow"),
        }
    }

    fn step_ind_y<B: Bus6507>(&mut self, bus: &mut B, op: Op) -> StepResult {
        match (self.cycle, classify(op)) {
            (1, _) => {
                self.ptr = self.fetch_pc(bus);
                self.cycle = 2;
                StepResult::Busy
            }
            (2, _) => {
                self.base = bus.read(self.ptr as u16) as u16;
                self.cycle = 3;
                StepResult::Busy
            }
            (3, _) => {
                let hi = bus.read(self.ptr.wrapping_add(1) as u16);
                self.base |= (hi as u16) << 8;
                self.ea = self.base.wrapping_add(self.y as u16);
                self.crossed = self.ea & 0xFF00 != self.base & 0xFF00;
                self.cycle = 4;
                StepResult::Busy
            }
            (4, Class::Read) => {
                let partial = (self.base & 0xFF00) | (self.ea & 0x00FF);
                let v = bus.read(partial);
                if self.crossed {
                    self.cycle = 5;
                    StepResult::Busy
                } else {
                    self.operand = v;
                    self.exec_read(op, v);
                    self.finish()
                }
            }
            (5, Class::Read) => {
                let v = bus.read(self.ea);
                self.operand = v;
                self.exec_read(op, v);
                self.finish()
            }
            (4, Class::Write) => {
                let partial = (self.base & 0xFF00) | (self.ea & 0x00FF);
                let _ = bus.read(partial);
                self.cycle = 5;
                StepResult::Busy
            }
            (5, Class::Write) => {
                let v = self.store_value(op);
                self.operand = v;
                bus.write(self.ea, v);
                self.finish()
            }
            (4, Class::Rmw) => {
                let partial = (self.base & 0xFF00) | (self.ea & 0x00FF);
                let _ = bus.read(partial);
                self.cycle = 5;
                StepResult::Busy
            }
            (5, Class::Rmw) => {
                self.operand = bus.read(self.ea);
                self.cycle = 6;
                StepResult::Busy
            }
            (6, Class::Rmw) => {
                bus.write(self.ea, self.operand);
                self.cycle = 7;
                StepResult::Busy
            }
            (7, Class::Rmw) => {
                let result = self.exec_rmw(op, self.operand);
                bus.write(self.ea, result);
                self.finish()
            }
            _ => unreachable!("(ind),Y cycle overflow"),
        }
    }

    fn branch_taken(&self) -> bool {
        let flag = match self.opcode >> 6 {
            0 => FLAG_N,
            1 => FLAG_V,
            2 => FLAG_C,
            _ => FLAG_Z,
        };
        let expect = self.opcode & 0x20 != 0;
        self.flag(flag) == expect
    }

    fn step_branch<B: Bus6507>(&mut self, bus: &mut B) -> StepResult {
        match self.cycle {
            1 => {
                self.operand = self.fetch_pc(bus);
                if self.branch_taken() {
                    self.cycle = 2;
                    StepResult::Busy
                } else {
                    self.finish()
                }
            }
            2 => {
                let _ = bus.read(self.pc); // dummy fetch of next opcode
                let offset = self.operand as i8 as i16;
                self.branch_target = self.pc.wrapping_add(offset as u16);
                if self.branch_target & 0xFF00 == self.pc & 0xFF00 {
                    self.pc = self.branch_target;
                    self.finish()
                } else {
                    // PCL is fixed up first; the wrong-page fetch is observable
                    self.pc = (self.pc & 0xFF00) | (self.branch_target & 0x00FF);
                    self.cycle = 3;
                    StepResult::Busy
                }
            }
            3 => {
                let _ = bus.read(self.pc);
                self.pc = self.branch_target;
                self.finish()
            }
            _ => unreachable!("branch cycle overflow"),
        }
    }

    fn step_jmp<B: Bus6507>(&mut self, bus: &mut B, mode: Mode) -> StepResult {
        match (self.cycle, mode) {
            (1, _) => {
                self.ea = self.fetch_pc(bus) as u16;
                self.cycle = 2;
                StepResult::Busy
            }
            (2, Mode::Abs) => {
                let hi = bus.read(self.pc);
                self.ea |= (hi as u16) << 8;
                self.pc = self.ea;
                self.finish()
            }
            (2, Mode::Ind) => {
                self.ea |= (self.fetch_pc(bus) as u16) << 8;
                self.cycle = 3;
                StepResult::Busy
            }
            (3, Mode::Ind) => {
                self.base = bus.read(self.ea) as u16;
                self.cycle = 4;
                StepResult::Busy
            }
            (4, Mode::Ind) => {
                // 6502 page-wrap bug: the high byte is fetched without
                // carrying into the page
                let hi_addr = (self.ea & 0xFF00) | (self.ea.wrapping_add(1) & 0x00FF);
                let hi = bus.read(hi_addr);
                self.pc = ((hi as u16) << 8) | self.base;
                self.finish()
            }
            _ => unreachable!("jmp cycle overflow"),
        }
    }

    fn step_jsr<B: Bus6507>(&mut self, bus: &mut B) -> StepResult {
        match self.cycle {
            1 => {
                self.operand = self.fetch_pc(bus);
                self.cycle = 2;
                StepResult::Busy
            }
            2 => {
                let _ = bus.read(0x0100 | self.sp as u16); // internal stack peek
                self.cycle = 3;
                StepResult::Busy
            }
            3 => {
                self.push(bus, (self.pc >> 8) as u8);
                self.cycle = 4;
                StepResult::Busy
            }
            4 => {
                self.push(bus, (self.pc & 0xFF) as u8);
                self.cycle = 5;
                StepResult::Busy
            }
            5 => {
                let hi = bus.read(self.pc);
                self.ea = ((hi as u16) << 8) | self.operand as u16;
                self.pc = self.ea;
                self.finish()
            }
            _ => unreachable!("jsr cycle overflow"),
        }
    }

    fn step_rts<B: Bus6507>(&mut self, bus: &mut B) -> StepResult {
        match self.cycle {
            1 => {
                let _ = bus.read(self.pc);
                self.cycle = 2;
                StepResult::Busy
            }
            2 => {
                let _ = bus.read(0x0100 | self.sp as u16);
                self.cycle = 3;
                StepResult::Busy
            }
            3 => {
                self.base = self.pop(bus) as u16;
                self.cycle = 4;
                StepResult::Busy
            }
            4 => {
                let hi = self.pop(bus);
                self.pc = ((hi as u16) << 8) | self.base;
                self.cycle = 5;
                StepResult::Busy
            }
            5 => {
                let _ = bus.read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                self.finish()
            }
            _ => unreachable!("rts cycle overflow"),
        }
    }

    fn step_rti<B: Bus6507>(&mut self, bus: &mut B) -> StepResult {
        match self.cycle {
            1 => {
                let _ = bus.read(self.pc);
                self.cycle = 2;
                StepResult::Busy
            }
            2 => {
                let _ = bus.read(0x0100 | self.sp as u16);
                self.cycle = 3;
                StepResult::Busy
            }
            3 => {
                let s = self.pop(bus);
                self.status = (s | FLAG_U) & !FLAG_B;
                self.cycle = 4;
                StepResult::Busy
            }
            4 => {
                self.base = self.pop(bus) as u16;
                self.cycle = 5;
                StepResult::Busy
            }
            5 => {
                let hi = self.pop(bus);
                self.pc = ((hi as u16) << 8) | self.base;
                self.finish()
            }
            _ => unreachable!("rti cycle overflow"),
        }
    }

    fn step_brk<B: Bus6507>(&mut self, bus: &mut B) -> StepResult {
        match self.cycle {
            1 => {
                // BRK has a padding byte
                let _ = self.fetch_pc(bus);
                self.cycle = 2;
                StepResult::Busy
            }
            2 => {
                self.push(bus, (self.pc >> 8) as u8);
                self.cycle = 3;
                StepResult::Busy
            }
            3 => {
                self.push(bus, (self.pc & 0xFF) as u8);
                self.cycle = 4;
                StepResult::Busy
            }
            4 => {
                self.push(bus, self.status | FLAG_B | FLAG_U);
                self.status |= FLAG_I;
                self.cycle = 5;
                StepResult::Busy
            }
            5 => {
                self.base = bus.read(0xFFFE) as u16;
                self.cycle = 6;
                StepResult::Busy
            }
            6 => {
                let hi = bus.read(0xFFFF);
                self.pc = ((hi as u16) << 8) | self.base;
                self.finish()
            }
            _ => unreachable!("brk cycle overflow"),
        }
    }

    fn step_push<B: Bus6507>(&mut self, bus: &mut B, op: Op) -> StepResult {
        match self.cycle {
            1 => {
                let _ = bus.read(self.pc);
                self.cycle = 2;
                StepResult::Busy
            }
            2 => {
                let v = match op {
                    Op::Pha => self.a,
                    _ => self.status | FLAG_B | FLAG_U, // PHP pushes with B set
                };
                self.push(bus, v);
                self.finish()
            }
            _ => unreachable!("push cycle overflow"),
        }
    }

    fn step_pop<B: Bus6507>(&mut self, bus: &mut B, op: Op) -> StepResult {
        match self.cycle {
            1 => {
                let _ = bus.read(self.pc);
                self.cycle = 2;
                StepResult::Busy
            }
            2 => {
                let _ = bus.read(0x0100 | self.sp as u16);
                self.cycle = 3;
                StepResult::Busy
            }
            3 => {
                let v = self.pop(bus);
                match op {
                    Op::Pla => {
                        self.a = v;
                        self.set_zn(v);
                    }
                    _ => self.status = (v | FLAG_U) & !FLAG_B, // PLP
                }
                self.finish()
            }
            _ => unreachable!("pop cycle overflow"),
        }
    }

    fn exec_implied(&mut self, op: Op) {
        use Op::*;
        match op {
            Tax => {
                self.x = self.a;
                self.set_zn(self.x);
            }
            Tay => {
                self.y = self.a;
                self.set_zn(self.y);
            }
            Txa => {
                self.a = self.x;
                self.set_zn(self.a);
            }
            Tya => {
                self.a = self.y;
                self.set_zn(self.a);
            }
            Txs => self.sp = self.x,
            Tsx => {
                self.x = self.sp;
                self.set_zn(self.x);
            }
            Inx => {
                self.x = self.x.wrapping_add(1);
                self.set_zn(self.x);
            }
            Iny => {
                self.y = self.y.wrapping_add(1);
                self.set_zn(self.y);
            }
            Dex => {
                self.x = self.x.wrapping_sub(1);
                self.set_zn(self.x);
            }
            Dey => {
                self.y = self.y.wrapping_sub(1);
                self.set_zn(self.y);
            }
            Clc => self.set_flag(FLAG_C, false),
            Sec => self.set_flag(FLAG_C, true),
            Cli => self.set_flag(FLAG_I, false),
            Sei => self.set_flag(FLAG_I, true),
            Clv => self.set_flag(FLAG_V, false),
            Cld => self.set_flag(FLAG_D, false),
            Sed => self.set_flag(FLAG_D, true),
            Nop => {}
            Asl | Lsr | Rol | Ror => {
                let v = self.a;
                self.a = self.exec_rmw(op, v);
            }
            Jam => {
                self.fault = Some(CpuFault {
                    pc: self.trace.pc,
                    opcode: self.opcode,
                    kind: FaultKind::UnimplementedOpcode,
                });
            }
            _ => unreachable!("not an implied operation"),
        }
    }

    fn exec_read(&mut self, op: Op, v: u8) {
        use Op::*;
        match op {
            Lda => {
                self.a = v;
                self.set_zn(v);
            }
            Ldx => {
                self.x = v;
                self.set_zn(v);
            }
            Ldy => {
                self.y = v;
                self.set_zn(v);
            }
            Lax => {
                self.a = v;
                self.x = v;
                self.set_zn(v);
            }
            Adc => self.adc(v),
            Sbc => self.sbc(v),
            And => {
                self.a &= v;
                self.set_zn(self.a);
            }
            Ora => {
                self.a |= v;
                self.set_zn(self.a);
            }
            Eor => {
                self.a ^= v;
                self.set_zn(self.a);
            }
            Cmp => self.compare(self.a, v),
            Cpx => self.compare(self.x, v),
            Cpy => self.compare(self.y, v),
            Bit => {
                self.set_flag(FLAG_Z, self.a & v == 0);
                self.set_flag(FLAG_V, v & 0x40 != 0);
                self.set_flag(FLAG_N, v & 0x80 != 0);
            }
            NopRead => {}
            Anc => {
                self.a &= v;
                self.set_zn(self.a);
                self.set_flag(FLAG_C, self.a & 0x80 != 0);
            }
            Alr => {
                self.a &= v;
                self.set_flag(FLAG_C, self.a & 0x01 != 0);
                self.a >>= 1;
                self.set_zn(self.a);
            }
            Arr => {
                // AND, then ROR; C from bit 6, V from bit 6 xor bit 5
                let and = self.a & v;
                let carry_in = if self.flag(FLAG_C) { 0x80 } else { 0 };
                self.a = (and >> 1) | carry_in;
                self.set_zn(self.a);
                self.set_flag(FLAG_C, self.a & 0x40 != 0);
                self.set_flag(FLAG_V, ((self.a >> 6) ^ (self.a >> 5)) & 1 != 0);
            }
            Axs => {
                let lhs = self.a & self.x;
                self.set_flag(FLAG_C, lhs >= v);
                self.x = lhs.wrapping_sub(v);
                self.set_zn(self.x);
            }
            Ane => {
                // magic constant $EE; see DESIGN.md
                self.a = (self.a | 0xEE) & self.x & v;
                self.set_zn(self.a);
            }
            Lxa => {
                let r = (self.a | 0xEE) & v;
                self.a = r;
                self.x = r;
                self.set_zn(r);
            }
            Las => {
                let r = self.sp & v;
                self.a = r;
                self.x = r;
                self.sp = r;
                self.set_zn(r);
            }
            _ => unreachable!("not a read operation"),
        }
    }

    fn store_value(&mut self, op: Op) -> u8 {
        use Op::*;
        let hi_plus_1 = ((self.ea >> 8) as u8).wrapping_add(1);
        match op {
            Sta => self.a,
            Stx => self.x,
            Sty => self.y,
            Sax => self.a & self.x,
            Sha => self.a & self.x & hi_plus_1,
            Shx => self.x & hi_plus_1,
            Shy => self.y & hi_plus_1,
            Tas => {
                self.sp = self.a & self.x;
                self.sp & hi_plus_1
            }
            _ => unreachable!("not a store operation"),
        }
    }

    fn exec_rmw(&mut self, op: Op, v: u8) -> u8 {
        use Op::*;
        match op {
            Asl => {
                self.set_flag(FLAG_C, v & 0x80 != 0);
                let r = v << 1;
                self.set_zn(r);
                r
            }
            Lsr => {
                self.set_flag(FLAG_C, v & 0x01 != 0);
                let r = v >> 1;
                self.set_zn(r);
                r
            }
            Rol => {
                let carry_in = if self.flag(FLAG_C) { 1 } else { 0 };
                self.set_flag(FLAG_C, v & 0x80 != 0);
                let r = (v << 1) | carry_in;
                self.set_zn(r);
                r
            }
            Ror => {
                let carry_in = if self.flag(FLAG_C) { 0x80 } else { 0 };
                self.set_flag(FLAG_C, v & 0x01 != 0);
                let r = (v >> 1) | carry_in;
                self.set_zn(r);
                r
            }
            Inc => {
                let r = v.wrapping_add(1);
                self.set_zn(r);
                r
            }
            Dec => {
                let r = v.wrapping_sub(1);
                self.set_zn(r);
                r
            }
            Slo => {
                self.set_flag(FLAG_C, v & 0x80 != 0);
                let r = v << 1;
                self.a |= r;
                self.set_zn(self.a);
                r
            }
            Sre => {
                self.set_flag(FLAG_C, v & 0x01 != 0);
                let r = v >> 1;
                self.a ^= r;
                self.set_zn(self.a);
                r
            }
            Rla => {
                let carry_in = if self.flag(FLAG_C) { 1 } else { 0 };
                self.set_flag(FLAG_C, v & 0x80 != 0);
                let r = (v << 1) | carry_in;
                self.a &= r;
                self.set_zn(self.a);
                r
            }
            Rra => {
                let carry_in = if self.flag(FLAG_C) { 0x80 } else { 0 };
                self.set_flag(FLAG_C, v & 0x01 != 0);
                let r = (v >> 1) | carry_in;
                self.adc(r);
                r
            }
            Dcp => {
                let r = v.wrapping_sub(1);
                self.compare(self.a, r);
                r
            }
            Isc => {
                let r = v.wrapping_add(1);
                self.sbc(r);
                r
            }
            _ => unreachable!("not a read-modify-write operation"),
        }
    }

    fn compare(&mut self, reg: u8, v: u8) {
        self.set_flag(FLAG_C, reg >= v);
        self.set_zn(reg.wrapping_sub(v));
    }

    fn adc(&mut self, m: u8) {
        let c_in = if self.flag(FLAG_C) { 1u16 } else { 0 };
        let a = self.a;
        if self.flag(FLAG_D) {
            // NMOS decimal mode: Z from the binary sum, N/V from the
            // intermediate result, C from the decimal carry
            let bin = a as u16 + m as u16 + c_in;
            self.set_flag(FLAG_Z, bin & 0xFF == 0);
            let mut al = (a & 0x0F) as u16 + (m & 0x0F) as u16 + c_in;
            if al > 9 {
                al += 6;
            }
            let mut ah = (a >> 4) as u16 + (m >> 4) as u16 + if al > 0x0F { 1 } else { 0 };
            self.set_flag(FLAG_N, ah & 0x08 != 0);
            let inter = ((ah << 4) & 0xFF) as u8;
            self.set_flag(FLAG_V, (!(a ^ m) & (a ^ inter) & 0x80) != 0);
            if ah > 9 {
                ah += 6;
            }
            self.set_flag(FLAG_C, ah > 0x0F);
            self.a = (((ah & 0x0F) << 4) | (al & 0x0F)) as u8;
        } else {
            let sum = a as u16 + m as u16 + c_in;
            let r = sum as u8;
            self.set_flag(FLAG_C, sum > 0xFF);
            self.set_flag(FLAG_V, (!(a ^ m) & (a ^ r) & 0x80) != 0);
            self.a = r;
            self.set_zn(r);
        }
    }

    fn sbc(&mut self, m: u8) {
        let borrow = if self.flag(FLAG_C) { 0i16 } else { 1 };
        let a = self.a;
        let bin = a as i16 - m as i16 - borrow;
        let r = bin as u8;
        // N/V/Z/C always come from the binary result, decimal or not
        self.set_flag(FLAG_C, bin >= 0);
        self.set_flag(FLAG_V, ((a ^ m) & (a ^ r) & 0x80) != 0);
        if self.flag(FLAG_D) {
            let mut al = (a & 0x0F) as i16 - (m & 0x0F) as i16 - borrow;
            let mut ah = (a >> 4) as i16 - (m >> 4) as i16;
            if al < 0 {
                al -= 6;
                ah -= 1;
            }
            if ah < 0 {
                ah -= 6;
            }
            self.a = ((((ah as u8) & 0x0F) << 4) | ((al as u8) & 0x0F)) as u8;
            self.set_flag(FLAG_Z, r == 0);
            self.set_flag(FLAG_N, r & 0x80 != 0);
        } else {
            self.a = r;
            self.set_zn(r);
        }
    }
}

/// Flat 64K memory for tests and CPU validation runs.
#[derive(Debug, Clone)]
pub struct FlatMemory {
    pub data: Vec<u8>,
    pub rdy: bool,
}

impl FlatMemory {
    pub fn new() -> Self {
        Self {
            data: vec![0; 0x10000],
            rdy: true,
        }
    }

    /// Load a program and point the reset vector at it.
    pub fn load_program(&mut self, offset: u16, program: &[u8]) {
        let off = offset as usize;
        self.data[off..off + program.len()].copy_from_slice(program);
        self.data[0xFFFC] = (offset & 0xFF) as u8;
        self.data[0xFFFD] = (offset >> 8) as u8;
    }
}

impl Default for FlatMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus6507 for FlatMemory {
    fn read(&mut self, addr: u16) -> u8 {
        self.data[addr as usize]
    }

    fn write(&mut self, addr: u16, val: u8) {
        self.data[addr as usize] = val;
    }

    fn rdy(&self) -> bool {
        self.rdy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_one(cpu: &mut Cpu6507, mem: &mut FlatMemory) -> u32 {
        let mut cycles = 0;
        loop {
            cycles += 1;
            if cpu.step(mem) == StepResult::Done {
                return cycles;
            }
        }
    }

    fn cpu_with(program: &[u8]) -> (Cpu6507, FlatMemory) {
        let mut mem = FlatMemory::new();
        mem.load_program(0xF000, program);
        let mut cpu = Cpu6507::new();
        cpu.reset(&mut mem);
        (cpu, mem)
    }

    #[test]
    fn lda_immediate_sets_a_and_flags() {
        let (mut cpu, mut mem) = cpu_with(&[0xA9, 0x05]);
        assert_eq!(run_one(&mut cpu, &mut mem), 2);
        assert_eq!(cpu.a, 5);
        assert_eq!(cpu.status & FLAG_Z, 0);
    }

    #[test]
    fn lda_zero_sets_zero_flag() {
        let (mut cpu, mut mem) = cpu_with(&[0xA9, 0x00]);
        run_one(&mut cpu, &mut mem);
        assert_eq!(cpu.a, 0);
        assert_eq!(cpu.status & FLAG_Z, FLAG_Z);
    }

    #[test]
    fn test_sta_zero_page_cycle_count() {
        let (mut cpu, mut mem) = cpu_with(&[0xA9, 0x42, 0x85, 0x80]);
        run_one(&mut cpu, &mut mem);
        assert_eq!(run_one(&mut cpu, &mut mem), 3);
        assert_eq!(mem.data[0x80], 0x42);
    }

    #[test]
    fn test_absolute_x_page_cross_costs_extra_cycle() {
        // LDA $F0FF,X with X=1 crosses a page
        let (mut cpu, mut mem) = cpu_with(&[0xA2, 0x01, 0xBD, 0xFF, 0xF0]);
        mem.data[0xF100] = 0x99;
        run_one(&mut cpu, &mut mem); // LDX
        assert_eq!(run_one(&mut cpu, &mut mem), 5);
        assert_eq!(cpu.a, 0x99);

        // without crossing it is 4
        let (mut cpu, mut mem) = cpu_with(&[0xA2, 0x01, 0xBD, 0x00, 0xF0]);
        mem.data[0xF001] = 0x55;
        run_one(&mut cpu, &mut mem);
        assert_eq!(run_one(&mut cpu, &mut mem), 4);
        assert_eq!(cpu.a, 0x55);
    }

    #[test]
    fn test_rmw_emits_dummy_write() {
        // INC $80: the intermediate write of the unmodified value must
        // hit the bus before the final write
        #[derive(Default)]
        struct Recorder {
            mem: Vec<u8>,
            writes: Vec<(u16, u8)>,
        }
        impl Bus6507 for Recorder {
            fn read(&mut self, addr: u16) -> u8 {
                self.mem[addr as usize]
            }
            fn write(&mut self, addr: u16, val: u8) {
                self.writes.push((addr, val));
                self.mem[addr as usize] = val;
            }
        }
        let mut bus = Recorder {
            mem: vec![0; 0x10000],
            writes: vec![],
        };
        bus.mem[0xF000] = 0xE6; // INC zp
        bus.mem[0xF001] = 0x80;
        bus.mem[0x0080] = 0x41;
        bus.mem[0xFFFC] = 0x00;
        bus.mem[0xFFFD] = 0xF0;

        let mut cpu = Cpu6507::new();
        cpu.reset(&mut bus);
        while cpu.step(&mut bus) != StepResult::Done {}
        assert_eq!(bus.writes, vec![(0x0080, 0x41), (0x0080, 0x42)]);
    }

    #[test]
    fn test_rdy_stalls_read_cycles_only() {
        // STA $0280 (4 cycles, last is a write) with RDY low from the start:
        // nothing happens because the opcode fetch is a read
        let (mut cpu, mut mem) = cpu_with(&[0x8D, 0x80, 0x02]);
        mem.rdy = false;
        assert_eq!(cpu.step(&mut mem), StepResult::Stalled);
        assert_eq!(cpu.stalled_cycles, 1);

        mem.rdy = true;
        assert_eq!(cpu.step(&mut mem), StepResult::Busy); // opcode
        assert_eq!(cpu.step(&mut mem), StepResult::Busy); // lo
        assert_eq!(cpu.step(&mut mem), StepResult::Busy); // hi
        mem.rdy = false;
        // final cycle is a write; RDY must not hold it
        assert_eq!(cpu.step(&mut mem), StepResult::Done);
    }

    #[test]
    fn adc_carry_and_overflow() {
        let (mut cpu, mut mem) = cpu_with(&[0x69, 0x01]);
        cpu.a = 0xFF;
        cpu.status |= FLAG_C;
        run_one(&mut cpu, &mut mem);
        assert_eq!(cpu.a, 0x01);
        assert_eq!(cpu.status & FLAG_C, FLAG_C);

        let (mut cpu, mut mem) = cpu_with(&[0x69, 0x50]);
        cpu.a = 0x50;
        cpu.status &= !FLAG_C;
        run_one(&mut cpu, &mut mem);
        assert_eq!(cpu.a, 0xA0);
        assert_eq!(cpu.status & FLAG_V, FLAG_V);
    }

    #[test]
    fn test_adc_decimal_mode() {
        // 0x58 + 0x46 + carry = 0x05 carry out in BCD
        let (mut cpu, mut mem) = cpu_with(&[0x69, 0x46]);
        cpu.a = 0x58;
        cpu.status |= FLAG_D | FLAG_C;
        run_one(&mut cpu, &mut mem);
        assert_eq!(cpu.a, 0x05);
        assert_eq!(cpu.status & FLAG_C, FLAG_C);

        // 0x12 + 0x34 = 0x46, no carry
        let (mut cpu, mut mem) = cpu_with(&[0x69, 0x34]);
        cpu.a = 0x12;
        cpu.status |= FLAG_D;
        cpu.status &= !FLAG_C;
        run_one(&mut cpu, &mut mem);
        assert_eq!(cpu.a, 0x46);
        assert_eq!(cpu.status & FLAG_C, 0);
    }

    #[test]
    fn test_sbc_decimal_mode() {
        // 0x46 - 0x12 = 0x34 in BCD
        let (mut cpu, mut mem) = cpu_with(&[0xE9, 0x12]);
        cpu.a = 0x46;
        cpu.status |= FLAG_D | FLAG_C;
        run_one(&mut cpu, &mut mem);
        assert_eq!(cpu.a, 0x34);
        assert_eq!(cpu.status & FLAG_C, FLAG_C);

        // 0x12 - 0x21 borrows
        let (mut cpu, mut mem) = cpu_with(&[0xE9, 0x21]);
        cpu.a = 0x12;
        cpu.status |= FLAG_D | FLAG_C;
        run_one(&mut cpu, &mut mem);
        assert_eq!(cpu.a, 0x91);
        assert_eq!(cpu.status & FLAG_C, 0);
    }

    #[test]
    fn test_branch_cycle_counts() {
        // not taken: 2 cycles
        let (mut cpu, mut mem) = cpu_with(&[0xD0, 0x10]); // BNE with Z set
        cpu.status |= FLAG_Z;
        assert_eq!(run_one(&mut cpu, &mut mem), 2);

        // taken, same page: 3 cycles
        let (mut cpu, mut mem) = cpu_with(&[0xD0, 0x10]);
        cpu.status &= !FLAG_Z;
        assert_eq!(run_one(&mut cpu, &mut mem), 3);
        assert_eq!(cpu.pc, 0xF012);

        // taken, page cross: 4 cycles
        let (mut cpu, mut mem) = cpu_with(&[0xD0, 0x80]);
        cpu.status &= !FLAG_Z;
        assert_eq!(run_one(&mut cpu, &mut mem), 4);
        assert_eq!(cpu.pc, 0xEF82);
    }

    #[test]
    fn test_jsr_rts_round_trip() {
        let (mut cpu, mut mem) = cpu_with(&[0x20, 0x10, 0xF0]); // JSR $F010
        mem.data[0xF010] = 0x60; // RTS
        assert_eq!(run_one(&mut cpu, &mut mem), 6);
        assert_eq!(cpu.pc, 0xF010);
        assert_eq!(run_one(&mut cpu, &mut mem), 6);
        assert_eq!(cpu.pc, 0xF003);
    }

    #[test]
    fn test_jmp_indirect_page_bug() {
        let (mut cpu, mut mem) = cpu_with(&[0x6C, 0xFF, 0x10]); // JMP ($10FF)
        mem.data[0x10FF] = 0x34;
        mem.data[0x1100] = 0x12; // would be the correct high byte
        mem.data[0x1000] = 0x56; // the bug reads here instead
        assert_eq!(run_one(&mut cpu, &mut mem), 5);
        assert_eq!(cpu.pc, 0x5634);
    }

    #[test]
    fn test_php_sets_b_and_bit5() {
        let (mut cpu, mut mem) = cpu_with(&[0x08]); // PHP
        cpu.status = FLAG_U | FLAG_C;
        run_one(&mut cpu, &mut mem);
        let pushed = mem.data[0x0100 | (cpu.sp.wrapping_add(1)) as usize];
        assert_eq!(pushed & FLAG_B, FLAG_B);
        assert_eq!(pushed & FLAG_U, FLAG_U);
        assert_eq!(pushed & FLAG_C, FLAG_C);
    }

    #[test]
    fn test_brk_pushes_and_vectors() {
        let (mut cpu, mut mem) = cpu_with(&[0x00]); // BRK
        mem.data[0xFFFE] = 0x00;
        mem.data[0xFFFF] = 0x12;
        let sp_before = cpu.sp;
        assert_eq!(run_one(&mut cpu, &mut mem), 7);
        assert_eq!(cpu.pc, 0x1200);
        assert_eq!(cpu.sp, sp_before.wrapping_sub(3));
        // pushed PC is the BRK address + 2
        let pcl = mem.data[0x0100 | sp_before.wrapping_sub(1) as usize];
        let pch = mem.data[0x0100 | sp_before as usize];
        assert_eq!(((pch as u16) << 8) | pcl as u16, 0xF002);
        let p = mem.data[0x0100 | sp_before.wrapping_sub(2) as usize];
        assert_eq!(p & FLAG_B, FLAG_B);
        assert_eq!(cpu.status & FLAG_I, FLAG_I);
    }

    #[test]
    fn test_lax_and_sax() {
        let (mut cpu, mut mem) = cpu_with(&[0xA7, 0x80, 0x87, 0x81]); // LAX zp / SAX zp
        mem.data[0x80] = 0x3C;
        run_one(&mut cpu, &mut mem);
        assert_eq!(cpu.a, 0x3C);
        assert_eq!(cpu.x, 0x3C);
        cpu.a = 0xF0;
        run_one(&mut cpu, &mut mem);
        assert_eq!(mem.data[0x81], 0xF0 & 0x3C);
    }

    #[test]
    fn test_dcp_behaves_as_dec_plus_cmp() {
        let (mut cpu, mut mem) = cpu_with(&[0xC7, 0x80]); // DCP zp
        mem.data[0x80] = 0x11;
        cpu.a = 0x10;
        assert_eq!(run_one(&mut cpu, &mut mem), 5);
        assert_eq!(mem.data[0x80], 0x10);
        assert_eq!(cpu.status & FLAG_Z, FLAG_Z);
        assert_eq!(cpu.status & FLAG_C, FLAG_C);
    }

    #[test]
    fn test_jam_opcode_degrades_to_nop_with_fault() {
        let (mut cpu, mut mem) = cpu_with(&[0x02, 0xA9, 0x07]);
        assert_eq!(run_one(&mut cpu, &mut mem), 2);
        let fault = cpu.take_fault().expect("fault expected");
        assert_eq!(fault.kind, FaultKind::UnimplementedOpcode);
        assert_eq!(fault.opcode, 0x02);
        assert_eq!(fault.pc, 0xF000);
        // execution continues
        run_one(&mut cpu, &mut mem);
        assert_eq!(cpu.a, 0x07);
    }

    #[test]
    fn test_total_cycle_accounting() {
        let (mut cpu, mut mem) = cpu_with(&[0xA9, 0x01, 0x85, 0x80, 0xEA]);
        let before = cpu.cycles;
        run_one(&mut cpu, &mut mem);
        run_one(&mut cpu, &mut mem);
        run_one(&mut cpu, &mut mem);
        assert_eq!(cpu.cycles - before, 2 + 3 + 2);
    }

    #[test]
    fn test_trace_records_pc_and_ea() {
        let (mut cpu, mut mem) = cpu_with(&[0x8D, 0x34, 0x02]); // STA $0234
        cpu.a = 0x5A;
        run_one(&mut cpu, &mut mem);
        let t = cpu.last_trace();
        assert_eq!(t.pc, 0xF000);
        assert_eq!(t.opcode, 0x8D);
        assert_eq!(t.ea, 0x0234);
        assert_eq!(t.operand, 0x5A);
    }
}
