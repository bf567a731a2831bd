//! Chip-level emulation primitives shared by the VCS console crate.

pub mod cpu_6507;
pub mod logging;
pub mod polynomial;

pub mod types {
    use serde::{Deserialize, Serialize};

    /// A moment in emulated time.
    ///
    /// Ordering is lexicographic: frame, then scanline, then color clock.
    #[derive(
        Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
    )]
    pub struct Coordinates {
        pub frame: u32,
        pub scanline: u16,
        pub clock: u16,
    }

    impl Coordinates {
        pub fn new(frame: u32, scanline: u16, clock: u16) -> Self {
            Self {
                frame,
                scanline,
                clock,
            }
        }
    }

    impl std::fmt::Display for Coordinates {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(
                f,
                "frame {} scanline {} clock {}",
                self.frame, self.scanline, self.clock
            )
        }
    }

    /// One color clock's worth of TIA output.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Signal {
        /// Palette index (0..127).
        pub color: u8,
        pub vsync: bool,
        pub vblank: bool,
        pub hsync: bool,
        pub hblank: bool,
        /// Channel 0 and 1 samples, present on the two audio-clock
        /// phases of each scanline.
        pub audio: Option<(u8, u8)>,
    }

    /// A completed video frame handed to the presentation layer.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Frame {
        pub width: u32,
        pub height: u32,
        /// 0x00RRGGBB pixels, row-major.
        pub pixels: Vec<u32>,
    }

    impl Frame {
        pub fn new(width: u32, height: u32) -> Self {
            Self {
                width,
                height,
                pixels: vec![0; (width * height) as usize],
            }
        }
    }

    /// 8-bit unsigned audio sample; 128 is silence after center-shifting.
    pub type AudioSample = u8;
}
