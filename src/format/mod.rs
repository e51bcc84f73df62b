// Buffer format negotiation
// Maps a codec identifier to the pixel format and queue sizing policy the
// frame buffer pool should use. Table-driven: one row per codec family,
// unknown codecs fall back to the generic software row.

use crate::frame::{CodecId, FrameFormat, HardwareFamily};

/// Queue sizing derived for a codec/hardware combination
///
/// Headrooms are minimum counts reserved for each logical queue;
/// `ref_slack` is extra capacity for codecs whose decoded-picture-buffer
/// requirement scales with the stream's reference-frame count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferPolicy {
    pub format: FrameFormat,
    pub min_free: usize,
    pub min_pause: usize,
    pub min_used: usize,
    pub ref_slack: usize,
}

impl BufferPolicy {
    /// Total number of frame slots the pool allocates for this policy
    /// (headrooms, reference slack, plus one displayed frame)
    pub fn total_buffers(&self) -> usize {
        self.min_free + self.min_pause + self.min_used + self.ref_slack + 1
    }
}

/// Deterministic codec → buffer policy mapping
///
/// VAAPI and VDPAU have bounded decoded-picture-buffer sizes, so their
/// policies grow with the reported reference-frame count. Everything
/// unrecognised gets the generic software policy with a larger pause
/// headroom to absorb software-path jitter.
#[derive(Debug, Default)]
pub struct FormatNegotiator;

impl FormatNegotiator {
    pub fn new() -> Self {
        Self
    }

    pub fn select(&self, codec: CodecId, reference_frames: usize) -> BufferPolicy {
        use HardwareFamily::*;

        let row = |format, min_free, min_pause, min_used, ref_slack| BufferPolicy {
            format,
            min_free,
            min_pause,
            min_used,
            ref_slack,
        };

        match codec {
            CodecId::Copyback => row(FrameFormat::Yv12, 1, 4, 2, 0),
            CodecId::Hardware(MediaCodec) => row(FrameFormat::Device(MediaCodec), 1, 2, 2, 0),
            CodecId::Hardware(Vaapi) => {
                row(FrameFormat::Device(Vaapi), 2, 1, 4, reference_frames)
            }
            CodecId::Hardware(VideoToolbox) => row(FrameFormat::Device(VideoToolbox), 1, 4, 2, 0),
            CodecId::Hardware(Vdpau) => {
                row(FrameFormat::Device(Vdpau), 2, 1, 4, reference_frames)
            }
            CodecId::Hardware(Nvdec) => row(FrameFormat::Device(Nvdec), 2, 1, 4, 0),
            CodecId::Hardware(Mmal) => row(FrameFormat::Device(Mmal), 2, 1, 4, 0),
            CodecId::Hardware(DrmPrime) => row(FrameFormat::Device(DrmPrime), 2, 1, 4, 0),
            // Software and anything unknown: generous software defaults
            CodecId::Software | CodecId::None => {
                row(FrameFormat::Yv12, 1, 8, 4, reference_frames)
            }
        }
    }
}
