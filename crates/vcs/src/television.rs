//! Television: turns the TIA's per-color-clock signal into frames.
//!
//! The console has no notion of a frame; the TIA just emits scanlines
//! forever and the game is responsible for sending VSYNC at the right
//! moment. This consumer watches for "VSYNC held for at least three
//! scanlines, then released" and cuts a frame there, counting scanlines
//! to decide whether it is looking at an NTSC or PAL picture. The count
//! wobbles while a game boots (and in some games, forever); the frame
//! info carries a stability flag so the frontend can react.
//!
//! Pixels land in an index buffer as they arrive; on frame completion
//! the visible window is palette-resolved into a committed [`Frame`]
//! that presentation reads while the next frame accumulates, so readers
//! never observe a half-drawn picture. Audio samples are mixed to 8-bit
//! unsigned as they arrive and drained by the mixer.

use serde::{Deserialize, Serialize};
use vcs_core::types::{Coordinates, Frame, Signal};

use crate::palette::TvSpec;

/// Frames taller than this are cut regardless of VSYNC so a silent ROM
/// cannot grow the buffer without bound.
const MAX_SCANLINES: u16 = 320;
/// Consecutive same-height frames before the picture counts as stable.
const STABLE_FRAMES: u8 = 6;

/// What the television knows about the current picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameInfo {
    pub spec: TvSpec,
    /// Scanlines in the most recently completed frame.
    pub total_scanlines: u16,
    /// Scanline at which VSYNC was seen.
    pub vsync_scanline: u16,
    pub visible_top: u16,
    pub visible_bottom: u16,
    /// False while the scanline count is still jittering.
    pub stable: bool,
}

impl FrameInfo {
    fn new(spec: TvSpec) -> Self {
        let (top, bottom) = spec.visible_scanlines();
        Self {
            spec,
            total_scanlines: spec.scanlines(),
            vsync_scanline: 0,
            visible_top: top,
            visible_bottom: bottom,
            stable: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Television {
    spec: TvSpec,
    /// Re-detect the specification from frame heights.
    auto_spec: bool,

    clock: u16,
    scanline: u16,
    frame: u32,

    prev_hsync: bool,
    prev_vsync: bool,
    /// Scanline boundaries crossed while VSYNC has been held.
    vsync_scanlines: u16,
    vsync_start: u16,

    /// Color indices for the accumulating frame.
    index_buffer: Vec<u8>,
    /// Committed picture, swapped in whole on frame completion.
    committed: Frame,
    info: FrameInfo,
    stable_streak: u8,
    frame_ready: bool,

    /// Mixed samples awaiting the audio consumer.
    audio: Vec<u8>,
    /// Center-shifted mixing (silence at 128) versus raw (silence at 0).
    pub center_audio: bool,
}

impl Television {
    pub fn new(spec: TvSpec) -> Self {
        Self {
            spec,
            auto_spec: true,
            clock: 0,
            scanline: 0,
            frame: 0,
            prev_hsync: false,
            prev_vsync: false,
            vsync_scanlines: 0,
            vsync_start: 0,
            index_buffer: vec![0; 160 * MAX_SCANLINES as usize],
            committed: Frame::new(160, 0),
            info: FrameInfo::new(spec),
            stable_streak: 0,
            frame_ready: false,
            audio: Vec::new(),
            center_audio: true,
        }
    }

    /// Pin the specification instead of auto-detecting it.
    pub fn force_spec(&mut self, spec: TvSpec) {
        self.spec = spec;
        self.auto_spec = false;
        self.info = FrameInfo::new(spec);
    }

    pub fn spec(&self) -> TvSpec {
        self.spec
    }

    pub fn reset(&mut self) {
        let spec = self.spec;
        let auto = self.auto_spec;
        let center = self.center_audio;
        *self = Self::new(spec);
        self.auto_spec = auto;
        self.center_audio = center;
    }

    /// Position of the beam in emulated time.
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.frame, self.scanline, self.clock)
    }

    pub fn frame_info(&self) -> FrameInfo {
        self.info
    }

    /// The committed picture; never the one being drawn.
    pub fn frame(&self) -> &Frame {
        &self.committed
    }

    /// True once per completed frame.
    pub fn take_frame_ready(&mut self) -> bool {
        std::mem::take(&mut self.frame_ready)
    }

    /// Drain mixed audio samples.
    pub fn take_audio(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.audio)
    }

    /// Consume one color clock of TIA output. Every signal is consumed
    /// exactly once.
    pub fn consume(&mut self, signal: Signal) {
        if let Some((a, b)) = signal.audio {
            self.audio.push(self.mix(a, b));
        }

        // HSYNC leads the counter by a fixed offset; resync on its edge
        if signal.hsync && !self.prev_hsync {
            self.clock = 16;
        }
        self.prev_hsync = signal.hsync;

        if !signal.vblank && !signal.hblank && self.clock >= 68 && self.scanline < MAX_SCANLINES {
            let x = (self.clock - 68) as usize;
            self.index_buffer[self.scanline as usize * 160 + x] = signal.color;
        }

        if signal.vsync && !self.prev_vsync {
            self.vsync_scanlines = 0;
            self.vsync_start = self.scanline;
        }
        if !signal.vsync && self.prev_vsync && self.vsync_scanlines >= 3 {
            self.complete_frame();
        }
        self.prev_vsync = signal.vsync;

        self.clock += 1;
        if self.clock >= 228 {
            self.clock = 0;
            self.scanline += 1;
            if signal.vsync {
                self.vsync_scanlines += 1;
            }
            if self.scanline >= MAX_SCANLINES {
                // no VSYNC in sight; cut an unsynchronized frame
                self.complete_frame();
            }
        }
    }

    fn mix(&self, a: u8, b: u8) -> u8 {
        let sum = (a + b) as u16; // 0..30
        if self.center_audio {
            128 + (sum * 127 / 30) as u8
        } else {
            (sum * 255 / 30) as u8
        }
    }

    fn complete_frame(&mut self) {
        let total = self.scanline.max(1);

        if self.auto_spec {
            let detected = if total >= 287 {
                TvSpec::Pal
            } else {
                TvSpec::Ntsc
            };
            if detected != self.spec {
                self.spec = detected;
            }
        }

        let streak = if total == self.info.total_scanlines {
            self.stable_streak.saturating_add(1)
        } else {
            0
        };

        let (top, bottom) = self.spec.visible_scanlines();
        let top = top.min(total);
        let bottom = bottom.min(total);
        let height = (bottom - top) as u32;
        let mut frame = Frame::new(160, height);
        for (row, line) in (top..bottom).enumerate() {
            for x in 0..160usize {
                let index = self.index_buffer[line as usize * 160 + x];
                frame.pixels[row * 160 + x] = self.spec.color(index);
            }
        }
        self.committed = frame;

        self.info = FrameInfo {
            spec: self.spec,
            total_scanlines: total,
            vsync_scanline: self.vsync_start,
            visible_top: top,
            visible_bottom: bottom,
            stable: streak >= STABLE_FRAMES,
        };
        self.stable_streak = streak;

        self.index_buffer.iter_mut().for_each(|p| *p = 0);
        self.frame = self.frame.wrapping_add(1);
        self.scanline = 0;
        self.frame_ready = true;
    }
}
