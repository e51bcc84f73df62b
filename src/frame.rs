// Decoded video frame types
// A frame is owned by exactly one buffer queue (or checked out by the
// decode/render thread) at any time; moving it between queues moves the value.

use crate::geom::Size;
use std::fmt;

/// Hardware acceleration families the output pipeline understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HardwareFamily {
    Vaapi,
    Vdpau,
    Nvdec,
    VideoToolbox,
    MediaCodec,
    Mmal,
    DrmPrime,
}

/// Codec identifier as reported by the decoder layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecId {
    /// No stream yet (initial state only)
    None,
    /// Pure software decode (e.g. software H.264)
    Software,
    /// Hardware decode with frames copied back to system memory
    Copyback,
    /// Hardware decode with frames left on the device
    Hardware(HardwareFamily),
}

impl CodecId {
    /// Name used when updating the display profile input
    pub fn name(&self) -> &'static str {
        match self {
            CodecId::None => "none",
            CodecId::Software => "software",
            CodecId::Copyback => "copyback",
            CodecId::Hardware(HardwareFamily::Vaapi) => "vaapi",
            CodecId::Hardware(HardwareFamily::Vdpau) => "vdpau",
            CodecId::Hardware(HardwareFamily::Nvdec) => "nvdec",
            CodecId::Hardware(HardwareFamily::VideoToolbox) => "videotoolbox",
            CodecId::Hardware(HardwareFamily::MediaCodec) => "mediacodec",
            CodecId::Hardware(HardwareFamily::Mmal) => "mmal",
            CodecId::Hardware(HardwareFamily::DrmPrime) => "drmprime",
        }
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Pixel format of a frame buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    /// Planar YUV 4:2:0 in system memory
    Yv12,
    /// Opaque device frame for the given acceleration family
    Device(HardwareFamily),
}

impl FrameFormat {
    pub fn is_hardware(&self) -> bool {
        matches!(self, FrameFormat::Device(_))
    }

    /// Byte size of a software buffer for the given dimensions, None for
    /// device formats (their storage lives behind the interop handle)
    pub fn buffer_size(&self, size: Size) -> Option<usize> {
        match self {
            FrameFormat::Yv12 => {
                let pixels = size.width as usize * size.height as usize;
                Some(pixels + pixels / 2)
            }
            FrameFormat::Device(_) => None,
        }
    }
}

/// Scan type of the current frame/stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanType {
    Progressive,
    Interlaced,
}

impl ScanType {
    pub fn is_interlaced(&self) -> bool {
        matches!(self, ScanType::Interlaced)
    }
}

/// Opaque handle giving the renderer access to a hardware decoder's native
/// picture surface without copying. Dropping the handle releases the surface.
pub trait HardwareInterop: Send {
    /// Stable identifier of the underlying surface, for logging
    fn surface_id(&self) -> u64;
}

/// A decoded picture unit
///
/// Pixel storage is owned by the frame: a `Vec<u8>` for software formats, an
/// interop handle for device formats. Decode-time attributes are plain public
/// fields; the producer fills them while it has the frame checked out of the
/// pool, so no synchronisation is needed on the fields themselves.
pub struct VideoFrame {
    id: usize,
    generation: u64,
    format: FrameFormat,
    /// Presentation timecode in milliseconds
    pub timecode: i64,
    /// Display timecode reported back when this frame becomes the pause frame
    pub disp_timecode: i64,
    /// Sequence number assigned by the decoder
    pub frame_number: u64,
    pub top_field_first: bool,
    pub interlaced_reversed: bool,
    pub already_deinterlaced: bool,
    /// Placeholder frame with no picture payload (blank/transition frames)
    pub dummy: bool,
    /// Stream rotation in degrees, applied by the renderer
    pub rotation: i32,
    data: Vec<u8>,
    interop: Option<Box<dyn HardwareInterop>>,
}

impl VideoFrame {
    pub(crate) fn new(id: usize, generation: u64, format: FrameFormat, data: Vec<u8>) -> Self {
        Self {
            id,
            generation,
            format,
            timecode: 0,
            disp_timecode: 0,
            frame_number: 0,
            top_field_first: true,
            interlaced_reversed: false,
            already_deinterlaced: false,
            dummy: false,
            rotation: 0,
            data,
            interop: None,
        }
    }

    /// Pool-assigned identity, stable for the lifetime of the pool
    pub fn id(&self) -> usize {
        self.id
    }

    /// Pool generation this frame was allocated in; bumped on every
    /// buffer recreation
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn format(&self) -> FrameFormat {
        self.format
    }

    pub fn is_hardware(&self) -> bool {
        self.format.is_hardware()
    }

    /// True if the frame carries real picture data the renderer can upload
    pub fn is_real(&self) -> bool {
        !self.dummy && !self.is_hardware()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Attach the device surface produced by a hardware decoder
    pub fn set_interop(&mut self, interop: Box<dyn HardwareInterop>) {
        self.interop = Some(interop);
    }

    pub fn interop(&self) -> Option<&dyn HardwareInterop> {
        self.interop.as_deref()
    }

    /// Detach and release the device surface, if any
    pub(crate) fn take_interop(&mut self) -> Option<Box<dyn HardwareInterop>> {
        self.interop.take()
    }

    /// Reset per-picture attributes before the frame is reused by the decoder
    pub(crate) fn clear(&mut self) {
        self.timecode = 0;
        self.disp_timecode = 0;
        self.frame_number = 0;
        self.top_field_first = true;
        self.interlaced_reversed = false;
        self.already_deinterlaced = false;
        self.dummy = false;
        self.rotation = 0;
        self.interop = None;
    }
}

impl fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoFrame")
            .field("id", &self.id)
            .field("format", &self.format)
            .field("frame_number", &self.frame_number)
            .field("timecode", &self.timecode)
            .field("dummy", &self.dummy)
            .field("interop", &self.interop.as_ref().map(|i| i.surface_id()))
            .finish()
    }
}
