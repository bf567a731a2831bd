//! Color palettes for the three television specifications.
//!
//! The TIA emits a 7-bit color index (the high seven bits of the COLUxx
//! registers). NTSC arranges these as 16 hues by 8 luminances; PAL keeps
//! the same luminance ramp but folds several hue rows to grey and walks
//! the phase circle differently. SECAM ignores hue entirely and derives
//! one of eight fixed colors from luminance alone.

use serde::{Deserialize, Serialize};

/// Television specification, detected from the frame's scanline count or
/// forced by the frontend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TvSpec {
    Ntsc,
    Pal,
    Secam,
}

impl TvSpec {
    /// Nominal total scanlines per frame for this specification.
    pub fn scanlines(self) -> u16 {
        match self {
            TvSpec::Ntsc => 262,
            TvSpec::Pal | TvSpec::Secam => 312,
        }
    }

    /// First and one-past-last visible scanline by convention.
    pub fn visible_scanlines(self) -> (u16, u16) {
        match self {
            TvSpec::Ntsc => (40, 232),
            TvSpec::Pal | TvSpec::Secam => (48, 296),
        }
    }

    /// Audio sample rate in Hz (master clock / 114).
    pub fn audio_rate(self) -> u32 {
        match self {
            TvSpec::Ntsc => 31440,
            TvSpec::Pal | TvSpec::Secam => 31200,
        }
    }

    /// Look up a 7-bit color index as 0x00RRGGBB.
    pub fn color(self, index: u8) -> u32 {
        let index = (index & 0x7F) as usize;
        match self {
            TvSpec::Ntsc => NTSC_PALETTE[index],
            TvSpec::Pal => PAL_PALETTE[index],
            // SECAM: luminance selects one of eight fixed colors
            TvSpec::Secam => SECAM_PALETTE[index & 0x07],
        }
    }
}

pub static NTSC_PALETTE: [u32; 128] = [
    0x1F1F1F, 0x3B3B3B, 0x575757, 0x747474,
    0x909090, 0xADADAD, 0xC9C9C9, 0xE6E6E6,
    0x450087, 0x6113A3, 0x7D30C0, 0x9A4CDC,
    0xB669F9, 0xD385FF, 0xEFA1FF, 0xFFBEFF,
    0x5A0061, 0x76107D, 0x922C9A, 0xAF49B6,
    0xCB65D3, 0xE882EF, 0xFF9EFF, 0xFFBBFF,
    0x64002F, 0x80154B, 0x9D3168, 0xB94D84,
    0xD56AA1, 0xF286BD, 0xFFA3DA, 0xFFBFF6,
    0x610400, 0x7E2016, 0x9A3D33, 0xB7594F,
    0xD3756C, 0xEF9288, 0xFFAEA5, 0xFFCBC1,
    0x531400, 0x6F3100, 0x8B4D05, 0xA86921,
    0xC4863D, 0xE1A25A, 0xFDBF76, 0xFFDB93,
    0x3A2700, 0x574300, 0x735F00, 0x907C02,
    0xAC981E, 0xC8B53B, 0xE5D157, 0xFFED73,
    0x1D3800, 0x3A5400, 0x567000, 0x728D00,
    0x8FA914, 0xABC630, 0xC8E24D, 0xE4FE69,
    0x004400, 0x1D6000, 0x397D00, 0x559904,
    0x72B620, 0x8ED23D, 0xABEE59, 0xC7FF76,
    0x004900, 0x056600, 0x228208, 0x3E9F25,
    0x5ABB41, 0x77D75E, 0x93F47A, 0xB0FF97,
    0x004700, 0x00641B, 0x148038, 0x309C54,
    0x4DB971, 0x69D58D, 0x86F2AA, 0xA2FFC6,
    0x003D34, 0x005A51, 0x13766D, 0x2F9389,
    0x4CAFA6, 0x68CBC2, 0x84E8DF, 0xA1FFFB,
    0x002E65, 0x024A82, 0x1E679E, 0x3A83BB,
    0x57A0D7, 0x73BCF3, 0x90D9FF, 0xACF5FF,
    0x001C8A, 0x1738A6, 0x3455C2, 0x5071DF,
    0x6D8EFB, 0x89AAFF, 0xA6C6FF, 0xC2E3FF,
    0x170A9A, 0x3427B7, 0x5043D3, 0x6D5FF0,
    0x897CFF, 0xA598FF, 0xC2B5FF, 0xDED1FF,
    0x350094, 0x5119B1, 0x6E35CD, 0x8A51EA,
    0xA76EFF, 0xC38AFF, 0xE0A7FF, 0xFCC3FF,
];

pub static PAL_PALETTE: [u32; 128] = [
    0x1F1F1F, 0x3B3B3B, 0x575757, 0x747474,
    0x909090, 0xADADAD, 0xC9C9C9, 0xE6E6E6,
    0x1F1F1F, 0x3B3B3B, 0x575757, 0x747474,
    0x909090, 0xADADAD, 0xC9C9C9, 0xE6E6E6,
    0x5B0C00, 0x772800, 0x944519, 0xB06136,
    0xCD7E52, 0xE99A6E, 0xFFB68B, 0xFFD3A7,
    0x5B005D, 0x771079, 0x942D96, 0xB049B2,
    0xCD65CE, 0xE982EB, 0xFF9EFF, 0xFFBBFF,
    0x64002C, 0x801548, 0x9D3264, 0xB94E81,
    0xD66A9D, 0xF287BA, 0xFFA3D6, 0xFFC0F2,
    0x640012, 0x801A2E, 0x9D374A, 0xB95367,
    0xD66F83, 0xF28CA0, 0xFFA8BC, 0xFFC5D9,
    0x520072, 0x6F108E, 0x8B2DAB, 0xA849C7,
    0xC466E3, 0xE182FF, 0xFD9EFF, 0xFFBBFF,
    0x521400, 0x6F3100, 0x8B4D04, 0xA86A21,
    0xC4863D, 0xE1A259, 0xFDBF76, 0xFFDB92,
    0x2D0098, 0x4A1CB5, 0x6638D1, 0x8255ED,
    0x9F71FF, 0xBB8EFF, 0xD8AAFF, 0xF4C6FF,
    0x2D2F00, 0x4A4B00, 0x666800, 0x828400,
    0x9FA117, 0xBBBD33, 0xD8D94F, 0xF4F66C,
    0x021790, 0x1F33AD, 0x3B50C9, 0x576CE5,
    0x7489FF, 0x90A5FF, 0xADC1FF, 0xC9DEFF,
    0x024300, 0x1F6000, 0x3B7C00, 0x579802,
    0x74B51F, 0x90D13B, 0xADEE57, 0xC9FF74,
    0x00315D, 0x004E79, 0x1B6A96, 0x3787B2,
    0x54A3CE, 0x70BFEB, 0x8DDCFF, 0xA9F8FF,
    0x004900, 0x006600, 0x1B8219, 0x379F36,
    0x54BB52, 0x70D86E, 0x8DF48B, 0xA9FFA7,
    0x1F1F1F, 0x3B3B3B, 0x575757, 0x747474,
    0x909090, 0xADADAD, 0xC9C9C9, 0xE6E6E6,
    0x1F1F1F, 0x3B3B3B, 0x575757, 0x747474,
    0x909090, 0xADADAD, 0xC9C9C9, 0xE6E6E6,
];

/// SECAM's eight fixed colors, selected by luminance.
pub static SECAM_PALETTE: [u32; 8] = [
    0x000000, 0x2121FF, 0xF03C79, 0xFF50FF,
    0x7FFF00, 0x7FFFFF, 0xFFFF3F, 0xFFFFFF,
];
