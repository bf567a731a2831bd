//! RIOT (6532) - RAM, I/O ports and interval timer.
//!
//! The RIOT provides the console's only read/write memory (128 bytes),
//! the two controller/switch ports, and the programmable interval timer
//! games use to pace their kernels.
//!
//! # Timer
//!
//! Writing TIM1T/TIM8T/TIM64T/T1024T loads the counter, selects the
//! prescaler (1, 8, 64 or 1024 machine cycles per decrement), resets the
//! sub-counter and clears the underflow latch. The counter decrements
//! once per prescaler interval until it reaches zero; from then on it
//! decrements every machine cycle regardless of the prescaler, and the
//! 0 -> 0xFF wrap sets the underflow latch. Reading INTIM returns the
//! counter and clears the underflow latch; reading INSTAT returns the
//! underflow latch in bit 7 and the PA7 edge latch in bit 6 and clears
//! only the edge latch.
//!
//! # Ports
//!
//! Port A carries the joystick lines (active low), port B the console
//! switches. Reads merge the external line state with the data register
//! through the direction register: input bits come from the lines,
//! output bits from the register.
//!
//! # Register map (offsets within the IO window)
//!
//! ```text
//! $280  SWCHA    port A data
//! $281  SWACNT   port A direction
//! $282  SWCHB    port B data
//! $283  SWBCNT   port B direction
//! $284  INTIM    timer value (read); PA7 edge control (write)
//! $285  INSTAT   timer/PA7 status (read); PA7 edge control (write)
//! $294  TIM1T    load timer, /1
//! $295  TIM8T    load timer, /8
//! $296  TIM64T   load timer, /64
//! $297  T1024T   load timer, /1024
//! ```

use serde::{Deserialize, Serialize};

mod serde_ram {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(arr: &[u8; 128], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        arr.as_slice().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 128], D::Error>
    where
        D: Deserializer<'de>,
    {
        let vec = Vec::<u8>::deserialize(deserializer)?;
        let mut arr = [0u8; 128];
        arr.copy_from_slice(&vec);
        Ok(arr)
    }
}

/// RIOT chip state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Riot {
    /// 128 bytes of RAM
    #[serde(with = "serde_ram")]
    ram: [u8; 128],

    /// Timer value
    timer: u8,
    /// Prescaler interval: 1, 8, 64 or 1024 machine cycles
    prescaler: u16,
    /// Machine cycles until the next prescaled decrement
    sub_counter: u16,
    /// Timer has reached zero; decrements every cycle until reloaded
    expired: bool,
    /// Latched on the 0 -> 0xFF wrap; cleared by INTIM reads and loads
    underflow: bool,

    /// Port A data register (joysticks)
    swcha: u8,
    /// Port A direction register (0 = input, 1 = output)
    swacnt: u8,
    /// Port B data register (console switches)
    swchb: u8,
    /// Port B direction register
    swbcnt: u8,
    /// External line state on port A, driven by the controllers
    port_a_lines: u8,
    /// External line state on port B, driven by the switches
    port_b_lines: u8,

    /// PA7 edge latch, cleared by INSTAT reads
    pa7_edge: bool,
    /// Edge select: false = negative edge, true = positive edge
    pa7_positive: bool,
    /// Previous PA7 level for edge detection
    pa7_last: bool,
}

impl Default for Riot {
    fn default() -> Self {
        Self::new()
    }
}

impl Riot {
    pub fn new() -> Self {
        Self {
            ram: [0; 128],
            timer: 0,
            prescaler: 1024,
            sub_counter: 1024,
            expired: false,
            underflow: false,
            swcha: 0xFF,
            swacnt: 0,
            swchb: 0xFF,
            swbcnt: 0,
            port_a_lines: 0xFF, // nothing pressed (active low)
            port_b_lines: 0xFF,
            pa7_edge: false,
            pa7_positive: false,
            pa7_last: true,
        }
    }

    /// Reset to power-on state.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Merged port A value: input bits from the lines, output bits from
    /// the data register.
    fn port_a(&self) -> u8 {
        (self.port_a_lines & !self.swacnt) | (self.swcha & self.swacnt)
    }

    fn port_b(&self) -> u8 {
        (self.port_b_lines & !self.swbcnt) | (self.swchb & self.swbcnt)
    }

    /// Read with hardware side effects.
    pub fn read(&mut self, offset: u16) -> u8 {
        match offset & 0x07 {
            0x00 => self.port_a(),
            0x01 => self.swacnt,
            0x02 => self.port_b(),
            0x03 => self.swbcnt,
            0x04 | 0x06 => {
                // INTIM; reading clears the underflow latch
                self.underflow = false;
                self.timer
            }
            _ => {
                // INSTAT; bit 7 timer, bit 6 PA7 edge; clears the edge latch
                let v = (if self.underflow { 0x80 } else { 0 }) | (if self.pa7_edge { 0x40 } else { 0 });
                self.pa7_edge = false;
                v
            }
        }
    }

    /// Side-effect free read for debuggers.
    pub fn peek(&self, offset: u16) -> u8 {
        match offset & 0x07 {
            0x00 => self.port_a(),
            0x01 => self.swacnt,
            0x02 => self.port_b(),
            0x03 => self.swbcnt,
            0x04 | 0x06 => self.timer,
            _ => {
                (if self.underflow { 0x80 } else { 0 }) | (if self.pa7_edge { 0x40 } else { 0 })
            }
        }
    }

    pub fn write(&mut self, offset: u16, val: u8) {
        match offset & 0x1F {
            0x00 => self.swcha = val,
            0x01 => self.swacnt = val,
            0x02 => self.swchb = val,
            0x03 => self.swbcnt = val,
            // PA7 edge control; A0 selects the polarity
            0x04..=0x07 => self.pa7_positive = offset & 1 != 0,
            0x14 => self.load_timer(val, 1),
            0x15 => self.load_timer(val, 8),
            0x16 => self.load_timer(val, 64),
            0x17 => self.load_timer(val, 1024),
            _ => {}
        }
    }

    fn load_timer(&mut self, val: u8, prescaler: u16) {
        self.timer = val;
        self.prescaler = prescaler;
        self.sub_counter = prescaler;
        self.expired = val == 0;
        self.underflow = false;
    }

    /// Advance one machine cycle (three color clocks).
    pub fn step_machine_cycle(&mut self) {
        if self.expired {
            self.timer = self.timer.wrapping_sub(1);
            if self.timer == 0xFF {
                self.underflow = true;
            }
        } else {
            self.sub_counter -= 1;
            if self.sub_counter == 0 {
                self.sub_counter = self.prescaler;
                self.timer = self.timer.wrapping_sub(1);
                if self.timer == 0 {
                    self.expired = true;
                }
            }
        }

        // PA7 edge detection
        let pa7 = self.port_a() & 0x80 != 0;
        let edge = if self.pa7_positive {
            !self.pa7_last && pa7
        } else {
            self.pa7_last && !pa7
        };
        if edge {
            self.pa7_edge = true;
        }
        self.pa7_last = pa7;
    }

    /// RAM access (the bus has already decoded the RAM window).
    pub fn ram_read(&self, offset: u16) -> u8 {
        self.ram[(offset & 0x7F) as usize]
    }

    pub fn ram_write(&mut self, offset: u16, val: u8) {
        self.ram[(offset & 0x7F) as usize] = val;
    }

    /// Drive the external port A lines (controllers). Active low.
    pub fn set_port_a_lines(&mut self, lines: u8) {
        self.port_a_lines = lines;
    }

    /// Drive the external port B lines (console switches). Active low.
    pub fn set_port_b_lines(&mut self, lines: u8) {
        self.port_b_lines = lines;
    }

    pub fn port_b_lines(&self) -> u8 {
        self.port_b_lines
    }

    /// Current timer value without side effects.
    pub fn timer_value(&self) -> u8 {
        self.timer
    }

    pub fn timer_underflowed(&self) -> bool {
        self.underflow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(riot: &mut Riot, cycles: u32) {
        for _ in 0..cycles {
            riot.step_machine_cycle();
        }
    }

    #[test]
    fn test_ram_read_write() {
        let mut riot = Riot::new();
        riot.ram_write(0x00, 0x42);
        assert_eq!(riot.ram_read(0x00), 0x42);
        // mirrors fold into 128 bytes
        riot.ram_write(0xFF, 0x24);
        assert_eq!(riot.ram_read(0x7F), 0x24);
    }

    #[test]
    fn test_timer_prescaler_1() {
        let mut riot = Riot::new();
        riot.write(0x14, 10); // TIM1T
        assert_eq!(riot.peek(0x04), 10);
        step(&mut riot, 1);
        assert_eq!(riot.peek(0x04), 9);
        step(&mut riot, 9);
        assert_eq!(riot.peek(0x04), 0);
        assert!(!riot.timer_underflowed());
        step(&mut riot, 1);
        assert_eq!(riot.peek(0x04), 0xFF);
        assert!(riot.timer_underflowed());
    }

    #[test]
    fn test_timer_wrap_tim64t() {
        let mut riot = Riot::new();
        riot.write(0x16, 0x28); // TIM64T, 40 intervals
        step(&mut riot, 40 * 64);
        assert_eq!(riot.read(0x04), 0x00);
        assert_eq!(riot.peek(0x05) & 0x80, 0x00);
        step(&mut riot, 1);
        assert_eq!(riot.peek(0x05) & 0x80, 0x80);
        assert_eq!(riot.read(0x04), 0xFF);
        // the INTIM read above cleared the underflow latch
        assert_eq!(riot.peek(0x05) & 0x80, 0x00);
    }

    #[test]
    fn test_timer_free_runs_after_zero() {
        let mut riot = Riot::new();
        riot.write(0x15, 2); // TIM8T
        step(&mut riot, 16);
        assert_eq!(riot.peek(0x04), 0);
        // per-cycle from here on, prescaler ignored
        step(&mut riot, 3);
        assert_eq!(riot.peek(0x04), 0xFD);
    }

    #[test]
    fn test_new_interval_clears_underflow_and_restores_prescaler() {
        let mut riot = Riot::new();
        riot.write(0x14, 1);
        step(&mut riot, 2);
        assert!(riot.timer_underflowed());
        riot.write(0x16, 5); // TIM64T
        assert!(!riot.timer_underflowed());
        step(&mut riot, 63);
        assert_eq!(riot.peek(0x04), 5);
        step(&mut riot, 1);
        assert_eq!(riot.peek(0x04), 4);
    }

    #[test]
    fn test_instat_reads_clear_pa7_edge_only() {
        let mut riot = Riot::new();
        riot.write(0x14, 1);
        step(&mut riot, 2); // timer underflow latched
        // negative edge on PA7 (default polarity)
        riot.set_port_a_lines(0x7F);
        step(&mut riot, 1);
        let status = riot.read(0x05);
        assert_eq!(status & 0xC0, 0xC0);
        // edge latch cleared, timer latch preserved
        assert_eq!(riot.read(0x05) & 0xC0, 0x80);
    }

    #[test]
    fn test_pa7_positive_edge_select() {
        let mut riot = Riot::new();
        // offset 0x05 has A0 set, selecting the positive edge
        riot.write(0x05, 0);
        riot.set_port_a_lines(0x7F);
        riot.step_machine_cycle();
        assert_eq!(riot.peek(0x05) & 0x40, 0); // falling edge ignored
        riot.set_port_a_lines(0xFF);
        riot.step_machine_cycle();
        assert_eq!(riot.peek(0x05) & 0x40, 0x40);
    }

    #[test]
    fn test_port_directions() {
        let mut riot = Riot::new();
        // all input: reads reflect the lines
        riot.set_port_a_lines(0xAA);
        assert_eq!(riot.read(0x00), 0xAA);
        // switch low nibble to output
        riot.write(0x01, 0x0F);
        riot.write(0x00, 0x05);
        assert_eq!(riot.read(0x00), 0xA5);
    }

    #[test]
    fn test_console_switches_on_port_b() {
        let mut riot = Riot::new();
        assert_eq!(riot.read(0x02), 0xFF);
        riot.set_port_b_lines(0xFE); // reset pressed
        assert_eq!(riot.read(0x02) & 0x01, 0x00);
    }

    #[test]
    fn test_reset() {
        let mut riot = Riot::new();
        riot.ram_write(0x00, 0x42);
        riot.write(0x14, 10);
        riot.reset();
        assert_eq!(riot.ram_read(0x00), 0x00);
        assert_eq!(riot.peek(0x04), 0x00);
    }
}
