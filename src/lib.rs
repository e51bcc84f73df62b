//! GPU video output pipeline
//!
//! Manages decoded-frame buffers, negotiates buffer formats against codec
//! and hardware capabilities, stages mid-stream input changes without
//! dropping frames, and drives the per-frame render cycle
//! (prepare → deinterlace → render → present) with an optional OSD layer
//! and audio visualiser overlay.
//!
//! Decoding, painting, display-mode switching and the deinterlacing filter
//! itself are external collaborators reached through the traits in
//! [`render`]; they are injected at construction (see
//! [`output::OutputBackend`]).
//!
//! Threading: a single render thread drives [`output::VideoOutputGpu`];
//! the decode thread shares only the [`buffers::FrameBufferPool`] handle.

pub mod buffers;
pub mod format;
pub mod frame;
pub mod geom;
pub mod output;
pub mod render;
pub mod visual;

pub use buffers::{BufferError, FrameBufferPool, QueueId};
pub use format::{BufferPolicy, FormatNegotiator};
pub use frame::{CodecId, FrameFormat, HardwareFamily, HardwareInterop, ScanType, VideoFrame};
pub use geom::{Rect, Size};
pub use output::tracker::{ChangeOutcome, InputChangeTracker, InputProps, PendingReconfiguration};
pub use output::{OutputBackend, OutputError, VideoOutputGpu};
pub use visual::{register_visualiser, Visualiser, VisualiserOverlay};
