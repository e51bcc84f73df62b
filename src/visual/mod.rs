// Audio visualiser overlay
// Optional secondary renderer drawn into the frame during audio-only
// playback. Concrete visualisers register themselves by name; creation is
// capability-checked against the audio source and render context.

use crate::geom::Rect;
use crate::render::{AudioSource, OverlayPainter, RenderContext};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// A named visualiser instance
pub trait Visualiser {
    fn name(&self) -> &str;
    fn draw(&mut self, bounds: Rect, painter: &mut dyn OverlayPainter);
}

/// Constructor for a registered visualiser; returns None when the render
/// context cannot support it
pub type VisualiserCtor =
    fn(audio: &dyn AudioSource, render: &dyn RenderContext) -> Option<Box<dyn Visualiser>>;

struct Registration {
    ctor: VisualiserCtor,
    /// Context types this visualiser can draw with; empty means any
    context_types: Vec<String>,
}

/// Global registry of visualiser constructors
static REGISTRY: once_cell::sync::Lazy<RwLock<BTreeMap<String, Registration>>> =
    once_cell::sync::Lazy::new(|| RwLock::new(BTreeMap::new()));

/// Register a visualiser constructor under a unique name.
/// `context_types` limits it to matching render contexts; empty allows all.
pub fn register_visualiser(name: &str, context_types: &[&str], ctor: VisualiserCtor) {
    let mut registry = REGISTRY.write();
    if registry
        .insert(
            name.to_string(),
            Registration {
                ctor,
                context_types: context_types.iter().map(|s| s.to_string()).collect(),
            },
        )
        .is_some()
    {
        log::warn!("Visualiser '{}' re-registered", name);
    }
}

/// Names of visualisers usable with the given render context
pub fn visualiser_list(render: &dyn RenderContext) -> Vec<String> {
    REGISTRY
        .read()
        .iter()
        .filter(|(_, reg)| {
            reg.context_types.is_empty()
                || reg.context_types.iter().any(|t| t == render.context_type())
        })
        .map(|(name, _)| name.clone())
        .collect()
}

/// Whether any visualiser could run with this audio source and context
pub fn can_visualise(audio: &dyn AudioSource, render: &dyn RenderContext) -> bool {
    audio.has_audio() && audio.supports_visualisation() && !visualiser_list(render).is_empty()
}

fn create_visualiser(
    name: &str,
    audio: &dyn AudioSource,
    render: &dyn RenderContext,
) -> Option<Box<dyn Visualiser>> {
    let registry = REGISTRY.read();
    let reg = registry.get(name)?;
    if !reg.context_types.is_empty()
        && !reg.context_types.iter().any(|t| t == render.context_type())
    {
        log::warn!(
            "Visualiser '{}' does not support context '{}'",
            name,
            render.context_type()
        );
        return None;
    }
    (reg.ctor)(audio, render)
}

/// Holds the active visualiser, if any, plus its embedding state.
/// Never retains a stale instance after a disable or failed enable.
#[derive(Default)]
pub struct VisualiserOverlay {
    visual: Option<Box<dyn Visualiser>>,
    embed_rect: Option<Rect>,
    embedding: bool,
}

impl VisualiserOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace any current visualiser with a newly constructed one.
    /// Returns false (with no instance held) when construction fails.
    pub fn enable(
        &mut self,
        name: &str,
        audio: &dyn AudioSource,
        render: &dyn RenderContext,
    ) -> bool {
        self.disable();
        match create_visualiser(name, audio, render) {
            Some(visual) => {
                log::info!("Visualiser '{}' enabled", name);
                self.visual = Some(visual);
                true
            }
            None => {
                log::warn!("Failed to create visualiser '{}'", name);
                false
            }
        }
    }

    pub fn disable(&mut self) {
        if self.visual.take().is_some() {
            log::info!("Visualiser disabled");
        }
    }

    /// Enable the profile-preferred visualiser for audio-only playback.
    /// No-op when video is present, one is already running, or none would work.
    pub fn auto_enable(
        &mut self,
        have_video: bool,
        preferred: Option<&str>,
        audio: &dyn AudioSource,
        render: &dyn RenderContext,
    ) {
        if have_video || self.is_active() {
            return;
        }
        if !can_visualise(audio, render) {
            return;
        }
        if let Some(name) = preferred {
            self.enable(name, audio, render);
        }
    }

    pub fn is_active(&self) -> bool {
        self.visual.is_some()
    }

    pub fn name(&self) -> Option<String> {
        self.visual.as_ref().map(|v| v.name().to_string())
    }

    pub fn set_embedding(&mut self, embedding: bool, rect: Rect) {
        self.embedding = embedding;
        self.embed_rect = if embedding { Some(rect) } else { None };
    }

    /// Draw into the embed rect when embedding, else into `bounds`.
    /// No-op when absent or when embedding with an empty rect.
    pub fn draw(&mut self, bounds: Rect, painter: &mut dyn OverlayPainter) {
        let Some(visual) = self.visual.as_mut() else {
            return;
        };
        let target = match self.embed_rect {
            Some(rect) if self.embedding => {
                if rect.is_empty() {
                    return;
                }
                rect
            }
            _ => bounds,
        };
        visual.draw(target, painter);
    }
}
