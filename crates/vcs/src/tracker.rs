//! Audio tracker: a musician's view of the TIA sound registers.
//!
//! Every AUDC/AUDF/AUDV write is recorded with its coordinates and
//! translated into tracker terms: the distortion name of the selected
//! waveform, the nearest musical note for tonal distortions, and a
//! piano key number. The history holds the newest 1024 entries and
//! suppresses writes that leave a channel's registers unchanged.
//!
//! Note math: a tonal AUDC value divides the audio clock (master/114)
//! by its waveform period and by AUDF+1. Piano keys number the white
//! keys from A0 = 1 upward; a sharp takes the negative of the natural
//! below it (A#0 = -1, C#1 = -3), and 0 means no key.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use vcs_core::types::Coordinates;

use crate::palette::TvSpec;

/// Capacity of the history; eviction is oldest-first.
pub const HISTORY_CAP: usize = 1024;

/// Lowest note the tracker names; anything under A0 reads as Low.
const A0_HZ: f64 = 27.5;

/// Waveform period in generator steps for each AUDC value, or None for
/// the untuned (noise/silent) settings.
const DIVISORS: [Option<u32>; 16] = [
    None,      // 0 silent
    Some(15),  // 1 4-bit poly
    None,      // 2 div31 poly4, noise
    Some(465), // 3 poly5/poly4
    Some(2),   // 4 pure
    Some(2),   // 5 pure
    Some(31),  // 6 div31 pure
    Some(31),  // 7 5-bit poly
    None,      // 8 9-bit poly, noise
    Some(31),  // 9 5-bit poly
    Some(31),  // A div31 pure
    None,      // B silent
    Some(6),   // C div6 pure
    Some(6),   // D div6 pure
    Some(93),  // E div93 pure
    Some(93),  // F poly5 div3
];

/// Human name for each AUDC distortion.
pub fn distortion_name(audc: u8) -> &'static str {
    match audc & 0x0F {
        0x0 | 0xB => "Silent",
        0x1 => "Buzzy",
        0x2 => "Rumble",
        0x3 => "Flangy",
        0x4 | 0x5 => "Pure",
        0x6 | 0xA => "Pure Low",
        0x7 | 0x9 => "Reedy",
        0x8 => "Noise",
        0xC | 0xD => "Pure Buzzy",
        0xE => "Low Pure",
        _ => "Low Buzzy",
    }
}

/// Tracker verdict for one channel setting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MusicalNote {
    /// A nameable pitch, e.g. "C4".
    Note { name: String, piano_key: i32 },
    /// Tuned below A0.
    Low,
    /// An untuned distortion.
    Noise,
    /// Channel is silent (AUDC 0/B or zero volume).
    Silence,
}

impl MusicalNote {
    /// The notation used in tracker displays: the note name, or one of
    /// the sentinels "*" (noise), "-" (silence), "L" (sub-audible).
    pub fn notation(&self) -> &str {
        match self {
            MusicalNote::Note { name, .. } => name,
            MusicalNote::Low => "L",
            MusicalNote::Noise => "*",
            MusicalNote::Silence => "-",
        }
    }

    /// Piano key number; 0 when there is no key.
    pub fn piano_key(&self) -> i32 {
        match self {
            MusicalNote::Note { piano_key, .. } => *piano_key,
            _ => 0,
        }
    }

    pub fn is_musical(&self) -> bool {
        matches!(self, MusicalNote::Note { .. } | MusicalNote::Low)
    }
}

/// Names of the twelve semitones starting at A.
const SEMITONE_NAMES: [&str; 12] = [
    "A", "A#", "B", "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#",
];

/// White-key index within an octave for each natural semitone.
fn natural_index(semitone_in_octave: u32) -> Option<u32> {
    match semitone_in_octave {
        0 => Some(0),  // A
        2 => Some(1),  // B
        3 => Some(2),  // C
        5 => Some(3),  // D
        7 => Some(4),  // E
        8 => Some(5),  // F
        10 => Some(6), // G
        _ => None,
    }
}

/// Piano key for a semitone counted up from A0.
fn piano_key_for_semitone(semitone: u32) -> i32 {
    let octave = semitone / 12;
    let within = semitone % 12;
    match natural_index(within) {
        Some(idx) => (octave * 7 + idx + 1) as i32,
        // sharps take the negative of the natural just below
        None => -piano_key_for_semitone(semitone - 1),
    }
}

fn note_for_semitone(semitone: u32) -> MusicalNote {
    let name_idx = (semitone % 12) as usize;
    // octave numbers increment at C, three semitones above A
    let octave = (semitone + 9) / 12;
    MusicalNote::Note {
        name: format!("{}{}", SEMITONE_NAMES[name_idx], octave),
        piano_key: piano_key_for_semitone(semitone),
    }
}

/// Map a channel setting to its tracker note under the given
/// specification.
pub fn musical_note(spec: TvSpec, audc: u8, audf: u8, audv: u8) -> MusicalNote {
    let audc = audc & 0x0F;
    if audv & 0x0F == 0 {
        return MusicalNote::Silence;
    }
    let divisor = match DIVISORS[audc as usize] {
        Some(d) if d > 0 => d,
        Some(_) | None => {
            return if audc == 0x0 || audc == 0xB {
                MusicalNote::Silence
            } else {
                MusicalNote::Noise
            };
        }
    };
    let rate = spec.audio_rate() as f64;
    let freq = rate / (divisor as f64 * (audf as f64 + 1.0));
    if freq < A0_HZ {
        return MusicalNote::Low;
    }
    let semitone = (12.0 * (freq / A0_HZ).log2()).round() as u32;
    note_for_semitone(semitone)
}

/// Full (AUDC, AUDF) -> note table for one specification.
pub fn note_table(spec: TvSpec) -> Vec<Vec<MusicalNote>> {
    (0..16u8)
        .map(|audc| {
            (0..32u8)
                .map(|audf| musical_note(spec, audc, audf, 0x0F))
                .collect()
        })
        .collect()
}

/// Direction the channel's volume moved relative to its previous entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolumeDirection {
    Level,
    Up,
    Down,
}

/// One recorded channel change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub at: Coordinates,
    pub channel: u8,
    pub audc: u8,
    pub audf: u8,
    pub audv: u8,
    pub distortion: String,
    pub note: MusicalNote,
    pub volume: VolumeDirection,
}

/// Rolling history of audio register activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tracker {
    entries: VecDeque<HistoryEntry>,
}

impl Tracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn last_for_channel(&self, channel: u8) -> Option<&HistoryEntry> {
        self.entries.iter().rev().find(|e| e.channel == channel)
    }

    /// Record a register write. Writes that leave the channel's
    /// registers as they were are suppressed.
    pub fn record(
        &mut self,
        spec: TvSpec,
        at: Coordinates,
        channel: u8,
        audc: u8,
        audf: u8,
        audv: u8,
    ) {
        let previous = self.last_for_channel(channel);
        if let Some(prev) = previous {
            if prev.audc == audc && prev.audf == audf && prev.audv == audv {
                return;
            }
        }
        let volume = match previous {
            Some(prev) if audv > prev.audv => VolumeDirection::Up,
            Some(prev) if audv < prev.audv => VolumeDirection::Down,
            _ => VolumeDirection::Level,
        };
        self.entries.push_back(HistoryEntry {
            at,
            channel,
            audc,
            audf,
            audv,
            distortion: distortion_name(audc).to_string(),
            note: musical_note(spec, audc, audf, audv),
            volume,
        });
        while self.entries.len() > HISTORY_CAP {
            self.entries.pop_front();
        }
    }
}
