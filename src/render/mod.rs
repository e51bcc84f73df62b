// Collaborator contracts for the output pipeline
// The pipeline does not decode, paint or switch display modes itself; it
// drives these interfaces, which are injected into the output at
// construction time.

use crate::frame::{FrameFormat, ScanType, VideoFrame};
use crate::geom::{Rect, Size};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Renderer init failed: {0}")]
    Init(String),
    #[error("Frame render failed: {0}")]
    Render(String),
}

/// Hardware render context (GL/Vulkan device abstraction)
///
/// Owned by the output component for its whole lifetime; all calls originate
/// from the render thread.
pub trait RenderContext: Send {
    fn set_viewport(&mut self, rect: Rect);
    /// Whether the context can display frames of the given format directly
    fn supports_format(&self, format: FrameFormat) -> bool;
    /// Context type name used to filter the visualiser registry
    fn context_type(&self) -> &str;
}

/// Per-frame video renderer sitting on top of the render context
///
/// Holds the uploaded textures for software frames, which is why software
/// frames can be released immediately after display (see the pause-frame
/// policy in the output module).
pub trait VideoRenderer: Send {
    /// Renderer is usable (its pipeline/shaders are built)
    fn is_valid(&self) -> bool;
    /// Select the renderer implementation preferred by the display profile
    fn set_profile(&mut self, profile: &str);
    /// Rotation applied to subsequent frames, in degrees
    fn set_rotation(&mut self, degrees: i32);
    /// Upload/convert a software frame ahead of rendering
    fn prepare_frame(&mut self, frame: &VideoFrame, scan: ScanType) -> Result<(), RenderError>;
    /// Draw the frame into the current viewport
    fn render_frame(
        &mut self,
        frame: &VideoFrame,
        top_field_first: bool,
        scan: ScanType,
    ) -> Result<(), RenderError>;
    /// Drop cached frame-format state after an input change
    fn reset_frame_format(&mut self);
    /// Drop reference textures (GPU deinterlacer history) after a seek
    fn reset_textures(&mut self);
    /// Signal end-of-frame (swap/flush)
    fn end_frame(&mut self);
}

/// GPU painter used for host UI, OSD and visualiser drawing
pub trait OverlayPainter {
    fn draw_rect_begin(&mut self, bounds: Rect);
    fn draw_rect_end(&mut self);
}

/// On-screen-display layer; the output only issues draw calls
pub trait OsdLayer {
    fn draw(&mut self, painter: &mut dyn OverlayPainter, bounds: Size);
}

/// Host UI drawn under the video when embedding into a larger interface
pub trait HostUi {
    fn draw(&mut self, painter: &mut dyn OverlayPainter);
}

/// Physical display: aspect/resolution queries and mode switching
pub trait DisplayManager: Send {
    /// Display aspect ratio; `of_window` requests the windowed-mode value
    fn aspect_ratio(&self, of_window: bool) -> f64;
    fn resolution(&self) -> Size;
    /// True when the setup switches display modes to match video
    fn using_video_modes(&self) -> bool;
    /// Switch to a mode suited to the given video size and rate
    fn switch_to_video(&mut self, size: Size, rate: f64) -> bool;
}

/// Per-input display profile store (preferred renderer and output rate)
pub trait DisplayProfile: Send {
    fn output_rate(&self) -> f32;
    fn set_output_rate(&mut self, rate: f32);
    /// Record the current input so profile rules can be re-evaluated
    fn set_input(&mut self, size: Size, rate: f32, codec_name: &str);
    fn video_renderer(&self) -> String;
    /// Visualiser enabled automatically for audio-only playback, if any
    fn preferred_visualiser(&self) -> Option<String>;
}

/// Software deinterlacing filter applied before texture upload
pub trait Deinterlacer: Send {
    /// `force` re-filters a frame even if it was already processed
    fn filter(&mut self, frame: &mut VideoFrame, scan: ScanType, force: bool);
}

/// Audio side of playback, queried for visualiser capability
pub trait AudioSource {
    fn has_audio(&self) -> bool;
    /// Samples available for analysis (spectrum visualisers need this)
    fn supports_visualisation(&self) -> bool;
}
