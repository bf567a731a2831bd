//! TIA audio: two channels of polynomial-counter noise and tone.
//!
//! Each channel owns a frequency divider (AUDF+1 audio clocks per
//! generator step) and a generator network selected by AUDC. The
//! generator is built from the 4/5/9-bit LFSRs in `vcs_core` plus the
//! divide-by-31 and divide-by-3 counters of the real chip, so every
//! AUDC value produces its documented waveform period:
//!
//! ```text
//! AUDC  generator              period (generator steps)
//! 0,B   constant               -
//! 1     4-bit poly             15
//! 2     div31 -> 4-bit poly    465
//! 3     5-bit poly -> 4-bit    465
//! 4,5   pure tone              2
//! 6,A   div31 pure             31
//! 7,9   5-bit poly             31
//! 8     9-bit poly             511
//! C,D   div6 pure              6
//! E     div93 pure             93
//! F     5-bit poly / 3         93
//! ```

use serde::{Deserialize, Serialize};
use vcs_core::polynomial::{Poly4, Poly5, Poly9};

/// One TIA audio channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioChannel {
    /// Waveform select (0..15)
    pub audc: u8,
    /// Frequency divider (0..31)
    pub audf: u8,
    /// Volume (0..15)
    pub audv: u8,

    freq_counter: u8,
    poly4: Poly4,
    poly5: Poly5,
    poly9: Poly9,
    /// Divide-by-31 phase counter; high for the first 13 of 31 steps.
    div31: u8,
    /// Divide-by-3 counter for the C/D/E/F modes.
    div3: u8,
    output: bool,
}

impl Default for AudioChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioChannel {
    pub fn new() -> Self {
        Self {
            audc: 0,
            audf: 0,
            audv: 0,
            freq_counter: 0,
            poly4: Poly4::new(),
            poly5: Poly5::new(),
            poly9: Poly9::new(),
            div31: 0,
            div3: 0,
            output: false,
        }
    }

    pub fn set_audc(&mut self, val: u8) {
        self.audc = val & 0x0F;
    }

    pub fn set_audf(&mut self, val: u8) {
        self.audf = val & 0x1F;
    }

    pub fn set_audv(&mut self, val: u8) {
        self.audv = val & 0x0F;
    }

    /// One audio clock (two per scanline). Returns the 4-bit sample.
    pub fn clock(&mut self) -> u8 {
        self.freq_counter += 1;
        if self.freq_counter > self.audf {
            self.freq_counter = 0;
            self.advance();
        }
        if self.output {
            self.audv
        } else {
            0
        }
    }

    /// Current sample without advancing.
    pub fn sample(&self) -> u8 {
        if self.output {
            self.audv
        } else {
            0
        }
    }

    fn div31_step(&mut self) -> bool {
        self.div31 = (self.div31 + 1) % 31;
        self.div31 == 0
    }

    fn advance(&mut self) {
        match self.audc {
            0x0 | 0xB => self.output = true,
            0x1 => self.output = self.poly4.clock(),
            0x2 => {
                // 4-bit poly clocked through the divide-by-31
                if self.div31_step() {
                    self.output = self.poly4.clock();
                }
            }
            0x3 => {
                // 5-bit poly output gates the 4-bit poly clock
                if self.poly5.clock() {
                    self.output = self.poly4.clock();
                }
            }
            0x4 | 0x5 => self.output = !self.output,
            0x6 | 0xA => {
                // 13 high, 18 low out of every 31 steps
                self.div31_step();
                self.output = self.div31 < 13;
            }
            0x7 | 0x9 => self.output = self.poly5.clock(),
            0x8 => self.output = self.poly9.clock(),
            0xC | 0xD => {
                self.div3 += 1;
                if self.div3 == 3 {
                    self.div3 = 0;
                    self.output = !self.output;
                }
            }
            0xE => {
                // div31 pattern thinned by 3: high 13 of every 93 steps
                if self.div31_step() {
                    self.div3 = (self.div3 + 1) % 3;
                }
                self.output = self.div3 == 0 && self.div31 < 13;
            }
            _ => {
                // 0xF: 5-bit poly clocked every third step
                self.div3 += 1;
                if self.div3 == 3 {
                    self.div3 = 0;
                    self.output = self.poly5.clock();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn waveform_period(audc: u8) -> usize {
        let mut ch = AudioChannel::new();
        ch.set_audc(audc);
        ch.set_audf(0);
        ch.set_audv(15);
        // settle, then measure the repeat distance of the output stream
        let mut samples = Vec::new();
        for _ in 0..4096 {
            samples.push(ch.clock());
        }
        let tail = &samples[2048..];
        'candidate: for period in 1..1024 {
            for i in 0..1024 {
                if tail[i] != tail[i + period] {
                    continue 'candidate;
                }
            }
            return period;
        }
        panic!("no period found for AUDC {audc:X}");
    }

    #[test]
    fn test_pure_tone_divisor() {
        assert_eq!(waveform_period(0x4), 2);
        assert_eq!(waveform_period(0x5), 2);
    }

    #[test]
    fn test_div6_tone_divisor() {
        assert_eq!(waveform_period(0xC), 6);
        assert_eq!(waveform_period(0xD), 6);
    }

    #[test]
    fn test_poly4_divisor() {
        assert_eq!(waveform_period(0x1), 15);
    }

    #[test]
    fn test_poly5_divisor() {
        assert_eq!(waveform_period(0x7), 31);
        assert_eq!(waveform_period(0x9), 31);
    }

    #[test]
    fn test_div31_divisor() {
        assert_eq!(waveform_period(0x6), 31);
        assert_eq!(waveform_period(0xA), 31);
    }

    #[test]
    fn test_div93_divisor() {
        assert_eq!(waveform_period(0xE), 93);
        assert_eq!(waveform_period(0xF), 93);
    }

    #[test]
    fn test_constant_modes_hold_level() {
        let mut ch = AudioChannel::new();
        ch.set_audc(0x0);
        ch.set_audv(9);
        ch.clock();
        for _ in 0..64 {
            assert_eq!(ch.clock(), 9);
        }
    }

    #[test]
    fn test_audf_divides_the_generator() {
        // AUDF=1 halves the generator rate: a pure tone toggles every
        // second audio clock instead of every clock
        let mut ch = AudioChannel::new();
        ch.set_audc(0x4);
        ch.set_audf(1);
        ch.set_audv(15);
        let samples: Vec<u8> = (0..8).map(|_| ch.clock()).collect();
        assert_eq!(samples.chunks(2).filter(|c| c[0] != c[1]).count(), 4);
    }

    #[test]
    fn test_volume_scales_output() {
        let mut ch = AudioChannel::new();
        ch.set_audc(0x4);
        ch.set_audv(0);
        for _ in 0..16 {
            assert_eq!(ch.clock(), 0);
        }
        ch.set_audv(7);
        let heard: Vec<u8> = (0..8).map(|_| ch.clock()).collect();
        assert!(heard.contains(&7));
    }

    #[test]
    fn test_noise_mode_is_not_short_periodic() {
        // AUDC 8 is the 9-bit poly; its period must exceed 100 steps
        let mut ch = AudioChannel::new();
        ch.set_audc(0x8);
        ch.set_audf(0);
        ch.set_audv(15);
        let samples: Vec<u8> = (0..512).map(|_| ch.clock()).collect();
        for period in 1..100 {
            let matches = (0..256).all(|i| samples[i] == samples[i + period]);
            assert!(!matches, "unexpected short period {period}");
        }
    }
}
