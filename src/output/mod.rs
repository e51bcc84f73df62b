// GPU video output
// Drives the per-frame render cycle (apply pending input change, prepare,
// render, overlay, OSD, end) and owns the frame-buffer lifecycle around it.
// All methods are called from the single render thread; the buffer pool is
// the only state shared with the decode thread.

pub mod tracker;

use crate::buffers::{BufferError, FrameBufferPool, QueueId};
use crate::format::FormatNegotiator;
use crate::frame::{CodecId, ScanType, VideoFrame};
use crate::geom::{Rect, Size};
use crate::render::{
    AudioSource, Deinterlacer, DisplayManager, DisplayProfile, HostUi, OsdLayer, OverlayPainter,
    RenderContext, VideoRenderer,
};
use crate::visual::VisualiserOverlay;
use std::sync::Arc;
use thiserror::Error;
use tracker::{ChangeOutcome, InputChangeTracker, InputProps};

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Output init failed: {0}")]
    Init(String),
    #[error("Reconfiguration failed: {0}")]
    Reconfiguration(String),
    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),
}

/// Collaborators injected into the output at construction
pub struct OutputBackend {
    pub render: Box<dyn RenderContext>,
    pub video: Box<dyn VideoRenderer>,
    pub display: Box<dyn DisplayManager>,
    pub profile: Box<dyn DisplayProfile>,
    pub deinterlacer: Box<dyn Deinterlacer>,
}

/// GPU-accelerated video output pipeline
///
/// Owns the decoded-frame buffer pool, negotiates buffer formats per codec,
/// stages input changes, and sequences each presented frame. The pool handle
/// is shared with the decode thread; everything else is render-thread only.
pub struct VideoOutputGpu {
    buffers: Arc<FrameBufferPool>,
    negotiator: FormatNegotiator,
    tracker: InputChangeTracker,
    render: Box<dyn RenderContext>,
    video: Box<dyn VideoRenderer>,
    display: Box<dyn DisplayManager>,
    profile: Box<dyn DisplayProfile>,
    deinterlacer: Box<dyn Deinterlacer>,
    visual: VisualiserOverlay,
    host_ui: Option<Box<dyn HostUi>>,

    window_rect: Rect,
    display_aspect: f64,
    embed_rect: Option<Rect>,
    embed_hidden: bool,
    frames_played: u64,
}

impl VideoOutputGpu {
    pub fn new(backend: OutputBackend) -> Self {
        Self {
            buffers: Arc::new(FrameBufferPool::new()),
            negotiator: FormatNegotiator::new(),
            tracker: InputChangeTracker::new(),
            render: backend.render,
            video: backend.video,
            display: backend.display,
            profile: backend.profile,
            deinterlacer: backend.deinterlacer,
            visual: VisualiserOverlay::new(),
            host_ui: None,
            window_rect: Rect::default(),
            display_aspect: 16.0 / 9.0,
            embed_rect: None,
            embed_hidden: false,
            frames_played: 0,
        }
    }

    /// Host UI drawn under the video when embedding
    pub fn set_host_ui(&mut self, host_ui: Box<dyn HostUi>) {
        self.host_ui = Some(host_ui);
    }

    /// Shared pool handle for the decode thread
    pub fn buffers(&self) -> Arc<FrameBufferPool> {
        self.buffers.clone()
    }

    pub fn frames_played(&self) -> u64 {
        self.frames_played
    }

    pub fn current_codec(&self) -> CodecId {
        self.tracker.current().codec
    }

    /// Initialise (or re-initialise) the output for a stream
    pub fn init(
        &mut self,
        video_dim: Size,
        display_dim: Size,
        aspect: f32,
        window_rect: Rect,
        codec: CodecId,
    ) -> Result<(), OutputError> {
        self.window_rect = window_rect;

        let reference_frames = self.tracker.current().reference_frames;
        self.tracker.reset(InputProps {
            codec,
            video_dim,
            display_dim,
            aspect,
            reference_frames,
        });

        // Re-evaluate profile preferences after a stream change
        self.video.set_profile(&self.profile.video_renderer());

        // Switch the display mode if this setup tracks video modes
        if self.display.using_video_modes() && !self.is_embedding() {
            self.resize_for_video(Some(video_dim));
        }
        self.init_display_measurements();

        self.create_buffers(codec, video_dim)?;

        if codec == CodecId::None {
            // No stream yet; just size the viewport to the window
            self.render
                .set_viewport(Rect::from_size(self.window_rect.size()));
            return Ok(());
        }

        if self.video.is_valid() {
            self.video.reset_frame_format();
        }
        Ok(())
    }

    fn create_buffers(&mut self, codec: CodecId, dims: Size) -> Result<(), OutputError> {
        if self.buffers.is_created() {
            return Ok(());
        }
        let policy = self
            .negotiator
            .select(codec, self.tracker.current().reference_frames);
        if !self.render.supports_format(policy.format) {
            return Err(OutputError::Init(format!(
                "Render context cannot display {:?} frames",
                policy.format
            )));
        }
        self.buffers.create(&policy, dims)?;
        Ok(())
    }

    pub fn destroy_buffers(&mut self) {
        self.discard_frames(true, true);
        self.buffers.destroy();
    }

    /// Discard queued frames. `flushed` means the decoder is resetting its
    /// hardware context, so pause frames must be released first.
    pub fn discard_frames(&mut self, keyframe: bool, flushed: bool) {
        if flushed {
            log::info!(
                "Discarding frames (keyframe {}): {}",
                keyframe,
                self.buffers.status()
            );
            self.buffers.discard_pause_frames();
        }
        let mut release = Vec::new();
        {
            let mut lock = self.buffers.begin_lock(QueueId::Used);
            for queue in [QueueId::Used, QueueId::Pause, QueueId::Displayed] {
                while let Some(frame) = lock.dequeue(queue) {
                    release.push(frame);
                }
            }
        }
        for frame in release {
            self.buffers.release_frame(frame);
        }
    }

    /// Return a frame the renderer has finished with.
    ///
    /// Software frames go straight back to the free queue; the renderer
    /// holds its own uploaded copy for any pause redraw. Hardware frames are
    /// the renderer's only access to the picture, so the most recent one is
    /// retained in the pause queue and any previous occupant is evicted.
    pub fn done_displaying_frame(&mut self, frame: VideoFrame) {
        let retain = frame.is_hardware();
        let mut release = Vec::new();

        {
            let mut lock = self.buffers.begin_lock(QueueId::Pause);
            while let Some(paused) = lock.dequeue(QueueId::Pause) {
                if paused.id() == frame.id() {
                    // Already the retained frame; should not happen with
                    // owned frames, drop into release for safety
                    log::warn!("Frame {} released twice", paused.id());
                }
                release.push(paused);
            }
            if retain {
                lock.enqueue(QueueId::Pause, frame);
            } else {
                release.push(frame);
            }
        }

        for frame in release {
            self.buffers.release_frame(frame);
        }
    }

    /// Report a changed decoder output configuration.
    ///
    /// Aspect-only changes are absorbed here; anything else stages a pending
    /// reconfiguration (recreating buffers immediately) that the next render
    /// cycle applies. Returns whether the change was aspect-only.
    pub fn input_changed(
        &mut self,
        video_dim: Size,
        display_dim: Size,
        aspect: f32,
        codec: CodecId,
        reference_frames: usize,
        force: bool,
    ) -> Result<bool, OutputError> {
        let outcome = self.tracker.input_changed(
            InputProps {
                codec,
                video_dim,
                display_dim,
                aspect,
                reference_frames,
            },
            force,
            &self.buffers,
            &self.negotiator,
        )?;

        match outcome {
            ChangeOutcome::AspectOnly => {
                self.tracker.update_aspect(aspect);
                Ok(true)
            }
            ChangeOutcome::Staged => Ok(false),
        }
    }

    /// Stage a frame-rate-only change when the profile's output rate moves
    pub fn set_video_frame_rate(&mut self, rate: f32) {
        let current = self.profile.output_rate();
        if (current - rate).abs() < 0.001 {
            return;
        }
        log::info!("Video frame rate changed: {} -> {}", current, rate);
        self.profile.set_output_rate(rate);
        self.tracker.set_frame_rate_pending();
    }

    /// Apply any staged reconfiguration. Called at the start of each render
    /// cycle, before any frame is touched.
    pub fn process_input_change(&mut self) -> Result<(), OutputError> {
        if let Some(pending) = self.tracker.take_pending() {
            // Keep embedding across program changes
            let was_embedding = self.embed_rect;
            let was_hidden = self.embed_hidden;
            if was_embedding.is_some() {
                self.stop_embedding();
            }

            self.profile
                .set_input(pending.display_dim, 0.0, pending.codec.name());

            let result = self.init(
                pending.video_dim,
                pending.display_dim,
                pending.aspect,
                self.window_rect,
                pending.codec,
            );

            if let Some(rect) = was_embedding {
                if result.is_ok() {
                    self.embed_in_rect(rect, was_hidden);
                }
            }

            result.map_err(|e| OutputError::Reconfiguration(e.to_string()))?;
        } else if self.tracker.take_frame_rate_pending() {
            // Refresh-rate-only change: adjust the display mode, keep buffers
            self.resize_for_video(None);
        }
        Ok(())
    }

    /// Prepare a frame for rendering: apply any pending reconfiguration,
    /// then software deinterlace and renderer texture upload. Hardware and
    /// dummy frames carry no uploadable picture data and skip the latter.
    pub fn prepare_frame(
        &mut self,
        frame: Option<&mut VideoFrame>,
        scan: ScanType,
    ) -> Result<(), OutputError> {
        self.process_input_change()?;

        if let Some(frame) = frame {
            self.video.set_rotation(frame.rotation);
            if !frame.is_real() {
                return Ok(());
            }
            self.deinterlacer.filter(frame, scan, false);
            if let Err(e) = self.video.prepare_frame(frame, scan) {
                log::warn!("Prepare failed: {}", e);
            }
        }
        Ok(())
    }

    /// Draw one frame: host UI when embedded, the video (or the retained
    /// hardware pause frame when no frame is supplied), the visualiser and
    /// finally the OSD.
    pub fn render_frame(
        &mut self,
        frame: Option<&VideoFrame>,
        scan: ScanType,
        osd: Option<&mut dyn OsdLayer>,
        painter: Option<&mut dyn OverlayPainter>,
    ) {
        let mut dummy = false;
        let mut top_field_first = true;
        if let Some(frame) = frame {
            self.frames_played = frame.frame_number + 1;
            top_field_first = if frame.interlaced_reversed {
                !frame.top_field_first
            } else {
                frame.top_field_first
            };
            dummy = frame.dummy;
        }

        let embedding = self.is_embedding();
        let osd_bounds = Rect::from_size(self.window_rect.size());

        let mut painter = painter;

        // Host UI first when the video is embedded in a larger interface
        if embedding {
            if let (Some(painter), Some(host_ui)) = (painter.as_deref_mut(), self.host_ui.as_mut())
            {
                host_ui.draw(painter);
            }
        }

        // Video. Dummy streams still need the viewport tracking window
        // resizes (e.g. LiveTV transition frames).
        if dummy {
            self.render.set_viewport(self.window_rect);
        } else if let Some(frame) = frame {
            if let Err(e) = self.video.render_frame(frame, top_field_first, scan) {
                log::warn!("Render failed: {}", e);
            }
        } else {
            // No frame supplied; fall back to the retained hardware pause
            // frame so pause/freeze keeps showing the last picture
            let lock = self.buffers.begin_lock(QueueId::Pause);
            if let Some(frame) = lock.tail(QueueId::Pause) {
                let tff = if frame.interlaced_reversed {
                    !frame.top_field_first
                } else {
                    frame.top_field_first
                };
                if let Err(e) = self.video.render_frame(frame, tff, scan) {
                    log::warn!("Render failed: {}", e);
                }
            }
        }

        // Visualiser overlay, unless output is an embedded hidden surface
        if !(embedding && self.embed_hidden) {
            if let Some(painter) = painter.as_deref_mut() {
                self.visual.draw(osd_bounds, painter);
            }
        }

        // OSD is drawn by the host UI itself when embedding
        if !embedding {
            if let (Some(osd), Some(painter)) = (osd, painter) {
                osd.draw(painter, osd_bounds.size());
            }
        }
    }

    /// Refresh the pause path from the head of the used queue, reporting its
    /// display timecode. Hardware frames move through the done-displaying
    /// retention; software frames are re-filtered and re-uploaded in place.
    pub fn update_pause_frame(&mut self, scan: ScanType) -> Option<i64> {
        let mut release = None;
        let mut timecode = None;
        {
            let mut lock = self.buffers.begin_lock(QueueId::Used);
            let hardware = matches!(lock.head(QueueId::Used), Some(f) if f.is_hardware());
            if hardware {
                if let Some(frame) = lock.dequeue(QueueId::Used) {
                    timecode = Some(frame.disp_timecode);
                    release = Some(frame);
                }
            } else if let Some(frame) = lock.head_mut(QueueId::Used) {
                let scan = if scan.is_interlaced() && !frame.already_deinterlaced {
                    ScanType::Interlaced
                } else {
                    ScanType::Progressive
                };
                self.deinterlacer.filter(frame, scan, true);
                if let Err(e) = self.video.prepare_frame(frame, scan) {
                    log::warn!("Pause frame prepare failed: {}", e);
                }
                timecode = Some(frame.disp_timecode);
            } else {
                log::warn!("Could not update pause frame");
            }
        }

        if let Some(frame) = release {
            self.done_displaying_frame(frame);
        }
        timecode
    }

    /// Signal end-of-frame to the renderer
    pub fn end_frame(&mut self) {
        self.video.end_frame();
    }

    /// Drop renderer reference textures and all queued frames after a seek
    pub fn clear_after_seek(&mut self) {
        if self.video.is_valid() {
            self.video.reset_textures();
        }
        self.discard_frames(false, false);
    }

    // ---- display geometry ----

    pub fn window_resized(&mut self, size: Size) {
        self.window_rect.width = size.width;
        self.window_rect.height = size.height;
        self.init_display_measurements();
    }

    pub fn window_rect(&self) -> Rect {
        self.window_rect
    }

    pub fn display_aspect(&self) -> f64 {
        self.display_aspect
    }

    /// Recompute the display aspect ratio, correcting for windowed playback
    /// where video-mode overrides do not apply
    pub fn init_display_measurements(&mut self) {
        let mut aspect = self.display.aspect_ratio(false);
        let window = self.window_rect.size();
        let screen = self.display.resolution();

        if !window.is_empty() && !screen.is_empty() && window != screen {
            aspect = self.display.aspect_ratio(true) * (1.0 / screen.aspect()) * window.aspect();
            log::info!("Window aspect ratio: {}", aspect);
        } else {
            log::info!("Display aspect ratio: {}", aspect);
        }
        self.display_aspect = aspect;
    }

    /// Switch the display to a mode matched to the video, reading back the
    /// new aspect and resolution. No-op when modes are not in use.
    pub fn resize_for_video(&mut self, size: Option<Size>) {
        if !self.display.using_video_modes() {
            return;
        }
        let size = match size {
            Some(s) if !s.is_empty() => s,
            _ => {
                let s = self.tracker.current().display_dim;
                if s.is_empty() {
                    return;
                }
                s
            }
        };

        let rate = self.profile.output_rate() as f64;
        if self.display.switch_to_video(size, rate) {
            let aspect = self.display.aspect_ratio(false);
            log::info!("Switched display mode for {}x{}: aspect {}", size.width, size.height, aspect);
            self.display_aspect = aspect;
            let resolution = self.display.resolution();
            self.window_rect.width = resolution.width;
            self.window_rect.height = resolution.height;
        }
    }

    // ---- embedding ----

    pub fn embed_in_rect(&mut self, rect: Rect, hidden: bool) {
        self.embed_rect = Some(rect);
        self.embed_hidden = hidden;
        self.visual.set_embedding(true, rect);
    }

    pub fn stop_embedding(&mut self) {
        self.embed_rect = None;
        self.embed_hidden = false;
        self.visual.set_embedding(false, Rect::default());
    }

    pub fn is_embedding(&self) -> bool {
        self.embed_rect.is_some()
    }

    pub fn embedding_rect(&self) -> Option<Rect> {
        self.embed_rect
    }

    // ---- visualiser ----

    /// Enable (or disable, when `enable` is false) the named visualiser.
    /// Returns whether a visualiser is active afterwards.
    pub fn enable_visualisation(
        &mut self,
        audio: &dyn AudioSource,
        enable: bool,
        name: &str,
    ) -> bool {
        if !enable {
            self.visual.disable();
            return false;
        }
        self.visual.enable(name, audio, &*self.render)
    }

    /// Enable the profile-preferred visualiser for audio-only playback
    pub fn auto_visualise(&mut self, audio: &dyn AudioSource, have_video: bool) {
        let preferred = self.profile.preferred_visualiser();
        self.visual
            .auto_enable(have_video, preferred.as_deref(), audio, &*self.render);
    }

    pub fn visualiser_name(&self) -> Option<String> {
        self.visual.name()
    }

    pub fn can_visualise(&self, audio: &dyn AudioSource) -> bool {
        crate::visual::can_visualise(audio, &*self.render)
    }

    pub fn visualiser_list(&self) -> Vec<String> {
        crate::visual::visualiser_list(&*self.render)
    }
}

impl Drop for VideoOutputGpu {
    fn drop(&mut self) {
        self.visual.disable();
        self.destroy_buffers();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FrameFormat, HardwareFamily, HardwareInterop};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    type Log = Arc<Mutex<Vec<String>>>;

    struct TestContext {
        viewports: Arc<Mutex<Vec<Rect>>>,
    }

    impl RenderContext for TestContext {
        fn set_viewport(&mut self, rect: Rect) {
            self.viewports.lock().push(rect);
        }
        fn supports_format(&self, _format: FrameFormat) -> bool {
            true
        }
        fn context_type(&self) -> &str {
            "test"
        }
    }

    struct TestVideo {
        log: Log,
    }

    impl VideoRenderer for TestVideo {
        fn is_valid(&self) -> bool {
            true
        }
        fn set_profile(&mut self, profile: &str) {
            self.log.lock().push(format!("profile {}", profile));
        }
        fn set_rotation(&mut self, degrees: i32) {
            self.log.lock().push(format!("rotation {}", degrees));
        }
        fn prepare_frame(
            &mut self,
            frame: &VideoFrame,
            _scan: ScanType,
        ) -> Result<(), crate::render::RenderError> {
            self.log.lock().push(format!("prepare {}", frame.id()));
            Ok(())
        }
        fn render_frame(
            &mut self,
            frame: &VideoFrame,
            _top_field_first: bool,
            _scan: ScanType,
        ) -> Result<(), crate::render::RenderError> {
            self.log.lock().push(format!("render {}", frame.id()));
            Ok(())
        }
        fn reset_frame_format(&mut self) {
            self.log.lock().push("reset_format".into());
        }
        fn reset_textures(&mut self) {
            self.log.lock().push("reset_textures".into());
        }
        fn end_frame(&mut self) {
            self.log.lock().push("end".into());
        }
    }

    struct TestDisplay {
        video_modes: bool,
        switches: Arc<Mutex<Vec<(Size, f64)>>>,
    }

    impl DisplayManager for TestDisplay {
        fn aspect_ratio(&self, _of_window: bool) -> f64 {
            16.0 / 9.0
        }
        fn resolution(&self) -> Size {
            Size::new(1920, 1080)
        }
        fn using_video_modes(&self) -> bool {
            self.video_modes
        }
        fn switch_to_video(&mut self, size: Size, rate: f64) -> bool {
            self.switches.lock().push((size, rate));
            true
        }
    }

    struct TestProfile {
        rate: Arc<Mutex<f32>>,
        inputs: Log,
    }

    impl DisplayProfile for TestProfile {
        fn output_rate(&self) -> f32 {
            *self.rate.lock()
        }
        fn set_output_rate(&mut self, rate: f32) {
            *self.rate.lock() = rate;
        }
        fn set_input(&mut self, size: Size, _rate: f32, codec_name: &str) {
            self.inputs
                .lock()
                .push(format!("{}x{} {}", size.width, size.height, codec_name));
        }
        fn video_renderer(&self) -> String {
            "test-renderer".into()
        }
        fn preferred_visualiser(&self) -> Option<String> {
            None
        }
    }

    struct TestDeinterlacer {
        log: Log,
    }

    impl Deinterlacer for TestDeinterlacer {
        fn filter(&mut self, frame: &mut VideoFrame, _scan: ScanType, force: bool) {
            self.log.lock().push(format!("filter {} {}", frame.id(), force));
        }
    }

    struct TestInterop {
        id: u64,
        released: Arc<AtomicBool>,
    }

    impl HardwareInterop for TestInterop {
        fn surface_id(&self) -> u64 {
            self.id
        }
    }

    impl Drop for TestInterop {
        fn drop(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    struct Harness {
        output: VideoOutputGpu,
        video_log: Log,
        deint_log: Log,
        profile_inputs: Log,
        rate: Arc<Mutex<f32>>,
        viewports: Arc<Mutex<Vec<Rect>>>,
        switches: Arc<Mutex<Vec<(Size, f64)>>>,
    }

    fn harness(video_modes: bool) -> Harness {
        let video_log: Log = Default::default();
        let deint_log: Log = Default::default();
        let profile_inputs: Log = Default::default();
        let rate = Arc::new(Mutex::new(50.0f32));
        let viewports: Arc<Mutex<Vec<Rect>>> = Default::default();
        let switches: Arc<Mutex<Vec<(Size, f64)>>> = Default::default();

        let output = VideoOutputGpu::new(OutputBackend {
            render: Box::new(TestContext {
                viewports: viewports.clone(),
            }),
            video: Box::new(TestVideo {
                log: video_log.clone(),
            }),
            display: Box::new(TestDisplay {
                video_modes,
                switches: switches.clone(),
            }),
            profile: Box::new(TestProfile {
                rate: rate.clone(),
                inputs: profile_inputs.clone(),
            }),
            deinterlacer: Box::new(TestDeinterlacer {
                log: deint_log.clone(),
            }),
        });

        Harness {
            output,
            video_log,
            deint_log,
            profile_inputs,
            rate,
            viewports,
            switches,
        }
    }

    fn init_software(h: &mut Harness) {
        h.output
            .init(
                Size::new(1280, 720),
                Size::new(1280, 720),
                1.777,
                Rect::from_size(Size::new(1280, 720)),
                CodecId::Software,
            )
            .unwrap();
    }

    fn init_vaapi(h: &mut Harness) {
        h.output
            .init(
                Size::new(1280, 720),
                Size::new(1280, 720),
                1.777,
                Rect::from_size(Size::new(1280, 720)),
                CodecId::Hardware(HardwareFamily::Vaapi),
            )
            .unwrap();
    }

    fn checkout_hardware_frame(
        h: &Harness,
        surface: u64,
        released: &Arc<AtomicBool>,
    ) -> VideoFrame {
        let pool = h.output.buffers();
        let mut frame = pool.dequeue(QueueId::Free).unwrap();
        frame.set_interop(Box::new(TestInterop {
            id: surface,
            released: released.clone(),
        }));
        frame
    }

    #[test]
    fn test_software_frame_released_immediately() {
        let mut h = harness(false);
        init_software(&mut h);
        let pool = h.output.buffers();
        let full = pool.size(QueueId::Free);

        let frame = pool.dequeue(QueueId::Free).unwrap();
        h.output.done_displaying_frame(frame);

        assert_eq!(pool.size(QueueId::Pause), 0);
        assert_eq!(pool.size(QueueId::Free), full);
    }

    #[test]
    fn test_hardware_frame_retained_then_evicted() {
        let mut h = harness(false);
        init_vaapi(&mut h);
        let pool = h.output.buffers();

        let released_a = Arc::new(AtomicBool::new(false));
        let released_b = Arc::new(AtomicBool::new(false));

        let a = checkout_hardware_frame(&h, 1, &released_a);
        let a_id = a.id();
        h.output.done_displaying_frame(a);
        assert_eq!(pool.size(QueueId::Pause), 1);
        assert!(!released_a.load(Ordering::SeqCst));

        let b = checkout_hardware_frame(&h, 2, &released_b);
        let b_id = b.id();
        h.output.done_displaying_frame(b);

        // Exactly the new frame sits in the pause queue; the previous
        // occupant was evicted and its surface released
        assert_eq!(pool.size(QueueId::Pause), 1);
        assert!(pool.contains(QueueId::Pause, b_id));
        assert!(pool.contains(QueueId::Free, a_id));
        assert!(released_a.load(Ordering::SeqCst));
        assert!(!released_b.load(Ordering::SeqCst));
    }

    #[test]
    fn test_render_substitutes_pause_tail_when_no_frame() {
        let mut h = harness(false);
        init_vaapi(&mut h);

        let released = Arc::new(AtomicBool::new(false));
        let frame = checkout_hardware_frame(&h, 7, &released);
        let id = frame.id();
        h.output.done_displaying_frame(frame);

        h.output.render_frame(None, ScanType::Progressive, None, None);
        assert!(h.video_log.lock().contains(&format!("render {}", id)));
    }

    #[test]
    fn test_dummy_frame_updates_viewport_without_rendering() {
        let mut h = harness(false);
        init_software(&mut h);
        let pool = h.output.buffers();

        let mut frame = pool.dequeue(QueueId::Free).unwrap();
        frame.dummy = true;
        h.viewports.lock().clear();
        h.video_log.lock().clear();

        assert!(h
            .output
            .prepare_frame(Some(&mut frame), ScanType::Progressive)
            .is_ok());
        h.output
            .render_frame(Some(&frame), ScanType::Progressive, None, None);

        assert_eq!(h.viewports.lock().len(), 1);
        assert!(h.video_log.lock().iter().all(|e| !e.starts_with("render")));
        assert!(h.deint_log.lock().is_empty());
        pool.release_frame(frame);
    }

    #[test]
    fn test_prepare_filters_and_uploads_real_frames() {
        let mut h = harness(false);
        init_software(&mut h);
        let pool = h.output.buffers();

        let mut frame = pool.dequeue(QueueId::Free).unwrap();
        let id = frame.id();
        h.output
            .prepare_frame(Some(&mut frame), ScanType::Interlaced)
            .unwrap();

        assert!(h.deint_log.lock().contains(&format!("filter {} false", id)));
        assert!(h.video_log.lock().contains(&format!("prepare {}", id)));
        pool.release_frame(frame);
    }

    #[test]
    fn test_codec_switch_scenario_recreates_and_keeps_embedding() {
        let mut h = harness(false);
        init_software(&mut h);
        let pool = h.output.buffers();
        h.output.embed_in_rect(Rect::new(10, 10, 320, 180), false);

        let aspect_only = h
            .output
            .input_changed(
                Size::new(1920, 1080),
                Size::new(1920, 1080),
                1.777,
                CodecId::Hardware(HardwareFamily::Vaapi),
                4,
                false,
            )
            .unwrap();
        assert!(!aspect_only);
        assert_eq!(
            pool.format(),
            Some(FrameFormat::Device(HardwareFamily::Vaapi))
        );
        // 2 free + 1 pause + 4 used + 4 reference slack + 1 displayed
        assert_eq!(pool.capacity(), 12);

        h.output.process_input_change().unwrap();
        assert_eq!(
            h.output.current_codec(),
            CodecId::Hardware(HardwareFamily::Vaapi)
        );
        assert!(h.output.is_embedding());
        assert_eq!(
            h.output.embedding_rect(),
            Some(Rect::new(10, 10, 320, 180))
        );
        assert!(h
            .profile_inputs
            .lock()
            .contains(&"1920x1080 vaapi".to_string()));
    }

    #[test]
    fn test_aspect_only_change_no_recreation() {
        let mut h = harness(false);
        init_software(&mut h);
        let pool = h.output.buffers();
        let capacity = pool.capacity();

        let aspect_only = h
            .output
            .input_changed(
                Size::new(1280, 720),
                Size::new(1280, 720),
                2.35,
                CodecId::Software,
                2,
                false,
            )
            .unwrap();
        assert!(aspect_only);
        assert_eq!(pool.capacity(), capacity);
        assert_eq!(pool.size(QueueId::Free), capacity);
    }

    #[test]
    fn test_frame_rate_only_change_adjusts_mode_without_buffers() {
        let mut h = harness(true);
        init_software(&mut h);
        let pool = h.output.buffers();
        let capacity = pool.capacity();
        h.switches.lock().clear();

        h.output.set_video_frame_rate(59.94);
        assert_eq!(*h.rate.lock(), 59.94);

        h.output.process_input_change().unwrap();
        let switches = h.switches.lock();
        assert_eq!(switches.len(), 1);
        assert!((switches[0].1 - 59.94).abs() < 0.01);
        drop(switches);
        assert_eq!(pool.capacity(), capacity);

        // Flag is one-shot
        h.switches.lock().clear();
        h.output.process_input_change().unwrap();
        assert!(h.switches.lock().is_empty());
    }

    #[test]
    fn test_update_pause_frame_software_refilters_in_place() {
        let mut h = harness(false);
        init_software(&mut h);
        let pool = h.output.buffers();

        let mut frame = pool.dequeue(QueueId::Free).unwrap();
        let id = frame.id();
        frame.disp_timecode = 1234;
        pool.enqueue(QueueId::Used, frame);

        let timecode = h.output.update_pause_frame(ScanType::Interlaced);
        assert_eq!(timecode, Some(1234));
        assert!(h.deint_log.lock().contains(&format!("filter {} true", id)));
        // Software frame stays in the used queue
        assert!(pool.contains(QueueId::Used, id));
    }

    #[test]
    fn test_update_pause_frame_hardware_moves_to_pause() {
        let mut h = harness(false);
        init_vaapi(&mut h);
        let pool = h.output.buffers();

        let released = Arc::new(AtomicBool::new(false));
        let mut frame = checkout_hardware_frame(&h, 3, &released);
        let id = frame.id();
        frame.disp_timecode = 99;
        pool.enqueue(QueueId::Used, frame);

        let timecode = h.output.update_pause_frame(ScanType::Progressive);
        assert_eq!(timecode, Some(99));
        assert!(pool.contains(QueueId::Pause, id));
        assert!(!pool.contains(QueueId::Used, id));
        assert!(!released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_clear_after_seek_resets_textures_and_queues() {
        let mut h = harness(false);
        init_vaapi(&mut h);
        let pool = h.output.buffers();
        let capacity = pool.capacity();

        let released = Arc::new(AtomicBool::new(false));
        let frame = checkout_hardware_frame(&h, 5, &released);
        h.output.done_displaying_frame(frame);
        let frame = pool.dequeue(QueueId::Free).unwrap();
        pool.enqueue(QueueId::Used, frame);

        h.output.clear_after_seek();
        assert!(h.video_log.lock().contains(&"reset_textures".to_string()));
        assert_eq!(pool.size(QueueId::Pause), 0);
        assert_eq!(pool.size(QueueId::Used), 0);
        assert_eq!(pool.size(QueueId::Free), capacity);
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_end_frame_signals_renderer() {
        let mut h = harness(false);
        init_software(&mut h);
        h.output.end_frame();
        assert!(h.video_log.lock().contains(&"end".to_string()));
    }

    struct SoftwareOnlyContext;

    impl RenderContext for SoftwareOnlyContext {
        fn set_viewport(&mut self, _rect: Rect) {}
        fn supports_format(&self, format: FrameFormat) -> bool {
            !format.is_hardware()
        }
        fn context_type(&self) -> &str {
            "test"
        }
    }

    #[test]
    fn test_init_fails_when_context_rejects_buffer_format() {
        let mut output = VideoOutputGpu::new(OutputBackend {
            render: Box::new(SoftwareOnlyContext),
            video: Box::new(TestVideo {
                log: Default::default(),
            }),
            display: Box::new(TestDisplay {
                video_modes: false,
                switches: Default::default(),
            }),
            profile: Box::new(TestProfile {
                rate: Arc::new(Mutex::new(50.0)),
                inputs: Default::default(),
            }),
            deinterlacer: Box::new(TestDeinterlacer {
                log: Default::default(),
            }),
        });

        let err = output.init(
            Size::new(1280, 720),
            Size::new(1280, 720),
            1.777,
            Rect::from_size(Size::new(1280, 720)),
            CodecId::Hardware(HardwareFamily::Vaapi),
        );
        assert!(matches!(err, Err(OutputError::Init(_))));
        assert!(!output.buffers().is_created());

        // Software formats pass the same gate
        output
            .init(
                Size::new(1280, 720),
                Size::new(1280, 720),
                1.777,
                Rect::from_size(Size::new(1280, 720)),
                CodecId::Software,
            )
            .unwrap();
        assert!(output.buffers().is_created());
    }
}
