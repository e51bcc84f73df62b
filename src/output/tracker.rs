// Input change tracking
// Detects mid-stream changes to the decoder's output properties and stages
// a reconfiguration instead of applying it immediately. Buffer recreation
// happens at detection time (fail fast); everything else (display profile,
// viewport, embedding) is applied by the render cycle at the start of the
// next frame.

use crate::buffers::{BufferError, FrameBufferPool};
use crate::format::FormatNegotiator;
use crate::frame::CodecId;
use crate::geom::Size;

/// Decoder output properties the tracker compares
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputProps {
    pub codec: CodecId,
    pub video_dim: Size,
    pub display_dim: Size,
    pub aspect: f32,
    pub reference_frames: usize,
}

impl InputProps {
    pub fn none() -> Self {
        Self {
            codec: CodecId::None,
            video_dim: Size::default(),
            display_dim: Size::default(),
            aspect: 0.0,
            reference_frames: 2,
        }
    }
}

/// Staged record of a detected input change, consumed at the start of the
/// next render cycle. At most one exists; a second detection merges into it.
#[derive(Debug, Clone, Copy)]
pub struct PendingReconfiguration {
    pub codec: CodecId,
    pub video_dim: Size,
    pub display_dim: Size,
    pub aspect: f32,
    pub reference_frames: usize,
}

/// Result of an input-change detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOutcome {
    /// Only the aspect ratio differs; applied lazily at display time,
    /// no buffer recreation
    AspectOnly,
    /// A full reconfiguration was staged (buffers already recreated)
    Staged,
}

/// Two-state tracker: Idle (no pending record) or PendingChange
#[derive(Debug)]
pub struct InputChangeTracker {
    current: InputProps,
    pending: Option<PendingReconfiguration>,
    frame_rate_pending: bool,
}

impl Default for InputChangeTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl InputChangeTracker {
    pub fn new() -> Self {
        Self {
            current: InputProps::none(),
            pending: None,
            frame_rate_pending: false,
        }
    }

    pub fn current(&self) -> &InputProps {
        &self.current
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Set the active configuration directly (initial stream setup)
    pub fn reset(&mut self, props: InputProps) {
        self.current = props;
        self.pending = None;
        self.frame_rate_pending = false;
    }

    /// Compare newly reported properties against the active configuration
    /// (or the staged one, if a change is already pending).
    ///
    /// Codec, display dimension or reference-frame differences stage a
    /// reconfiguration and recreate the buffer pool for the new properties
    /// right away; if that allocation fails the error propagates and nothing
    /// is staged. Aspect-only differences report `AspectOnly` so the caller
    /// can skip recreation entirely.
    pub fn input_changed(
        &mut self,
        new: InputProps,
        force: bool,
        pool: &FrameBufferPool,
        negotiator: &FormatNegotiator,
    ) -> Result<ChangeOutcome, BufferError> {
        // Two detections without an intervening render cycle compare
        // against the staged record, not the active configuration
        let base = match &self.pending {
            Some(p) => InputProps {
                codec: p.codec,
                video_dim: p.video_dim,
                display_dim: p.display_dim,
                aspect: p.aspect,
                reference_frames: p.reference_frames,
            },
            None => self.current,
        };

        log::info!(
            "Video changed: {}x{} '{}' (aspect {} refs {}) -> {}x{} '{}' (aspect {} refs {})",
            base.display_dim.width,
            base.display_dim.height,
            base.codec,
            base.aspect,
            base.reference_frames,
            new.display_dim.width,
            new.display_dim.height,
            new.codec,
            new.aspect,
            new.reference_frames,
        );

        let codec_changed = new.codec != base.codec;
        let res_changed = new.display_dim != base.display_dim;
        let refs_changed = new.reference_frames != base.reference_frames;

        if !(codec_changed || res_changed || refs_changed || force) {
            return Ok(ChangeOutcome::AspectOnly);
        }

        let policy = negotiator.select(new.codec, new.reference_frames);
        pool.discard_and_recreate(&policy, new.video_dim)?;

        self.pending = Some(PendingReconfiguration {
            codec: new.codec,
            video_dim: new.video_dim,
            display_dim: new.display_dim,
            aspect: new.aspect,
            reference_frames: new.reference_frames,
        });
        Ok(ChangeOutcome::Staged)
    }

    /// Consume the staged record and promote it to the active configuration.
    /// The caller applies display-profile and viewport updates afterwards.
    pub fn take_pending(&mut self) -> Option<PendingReconfiguration> {
        let pending = self.pending.take()?;
        self.current = InputProps {
            codec: pending.codec,
            video_dim: pending.video_dim,
            display_dim: pending.display_dim,
            aspect: pending.aspect,
            reference_frames: pending.reference_frames,
        };
        self.frame_rate_pending = false;
        Some(pending)
    }

    /// Apply an aspect-only change (no recreation, no staging)
    pub fn update_aspect(&mut self, aspect: f32) {
        self.current.aspect = aspect;
        if let Some(pending) = self.pending.as_mut() {
            pending.aspect = aspect;
        }
    }

    /// Flag a frame-rate-only change needing a display-mode adjustment
    pub fn set_frame_rate_pending(&mut self) {
        self.frame_rate_pending = true;
    }

    pub fn take_frame_rate_pending(&mut self) -> bool {
        std::mem::take(&mut self.frame_rate_pending)
    }
}
