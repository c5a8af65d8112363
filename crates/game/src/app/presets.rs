use engine::{
    Actor, ActorFactory, ActorStatus, ActorUpdateError, FrameTime, ScriptError, ScriptHost,
    SpawnContext, Vec2, Viewport,
};
use rand::Rng;
use serde::Deserialize;
use tracing::debug;

/// Where a preset actor enters the stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum Entry {
    /// At the spawn position chosen by the factory.
    #[default]
    Spawn,
    /// Just below the bottom edge, rising.
    Bottom,
    /// At the left or right edge, facing inward.
    Side,
}

/// Declarative definition of one actor kind, loaded from
/// `actors/<kind>/<kind>.json`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct PresetSpec {
    /// Reference display width in pixels before depth scaling.
    pub(crate) width: f32,
    #[serde(default = "default_min_scale")]
    pub(crate) min_scale: f32,
    #[serde(default = "default_max_scale")]
    pub(crate) max_scale: f32,
    /// Pixels per second; x is mirrored for actors entering from the right.
    #[serde(default)]
    pub(crate) velocity: [f32; 2],
    #[serde(default)]
    pub(crate) entry: Entry,
    #[serde(default)]
    pub(crate) destroy_offset: Option<f32>,
    /// Lifetime in milliseconds; unlimited when absent.
    #[serde(default)]
    pub(crate) lifetime_ms: Option<f64>,
}

fn default_min_scale() -> f32 {
    0.4
}

fn default_max_scale() -> f32 {
    1.0
}

impl PresetSpec {
    pub(crate) fn parse(kind: &str, source: &str) -> Result<Self, ScriptError> {
        let mut deserializer = serde_json::Deserializer::from_str(source);
        let spec: Self = match serde_path_to_error::deserialize(&mut deserializer) {
            Ok(spec) => spec,
            Err(error) => {
                let path = error.path().to_string();
                let source = error.into_inner();
                return if path.is_empty() || path == "." {
                    Err(ScriptError::Parse {
                        kind: kind.to_string(),
                        source,
                    })
                } else {
                    Err(ScriptError::Invalid {
                        kind: kind.to_string(),
                        reason: format!("at {path}: {source}"),
                    })
                };
            }
        };
        spec.validate(kind)?;
        Ok(spec)
    }

    fn validate(&self, kind: &str) -> Result<(), ScriptError> {
        let invalid = |reason: String| ScriptError::Invalid {
            kind: kind.to_string(),
            reason,
        };
        if !(self.width.is_finite() && self.width > 0.0) {
            return Err(invalid(format!("width must be positive, got {}", self.width)));
        }
        if !(self.min_scale > 0.0 && self.min_scale <= self.max_scale) {
            return Err(invalid(format!(
                "scale range {}..{} is empty or not positive",
                self.min_scale, self.max_scale
            )));
        }
        if !self.velocity.iter().all(|component| component.is_finite()) {
            return Err(invalid("velocity must be finite".to_string()));
        }
        if let Some(offset) = self.destroy_offset {
            if !(offset.is_finite() && offset >= 0.0) {
                return Err(invalid(format!("destroy_offset must not be negative, got {offset}")));
            }
        }
        Ok(())
    }
}

/// Generic drifting sprite driven by a [`PresetSpec`].
#[derive(Debug, Clone)]
pub(crate) struct PresetActor {
    position: Vec2,
    velocity: Vec2,
    size: (f32, f32),
    destroy_offset: Option<f32>,
    expires_at_ms: Option<f64>,
    lifetime_ms: Option<f64>,
}

impl PresetActor {
    pub(crate) fn spawn(spec: &PresetSpec, context: &mut SpawnContext<'_>) -> Self {
        let depth: f32 = context.rng.gen();
        let scale = spec.min_scale + (spec.max_scale - spec.min_scale) * depth;
        let width = spec.width * scale;
        let aspect = if context.texture.width == 0 {
            1.0
        } else {
            context.texture.height as f32 / context.texture.width as f32
        };
        let height = width * aspect;

        let mut velocity = Vec2::new(spec.velocity[0], spec.velocity[1]);
        let position = match spec.entry {
            Entry::Spawn => context.position,
            Entry::Bottom => Vec2::new(context.position.x, context.viewport.height + height / 2.0),
            Entry::Side => {
                let from_left = context.rng.gen_bool(0.5);
                let y = context.viewport.height * context.rng.gen_range(0.1f32..0.9);
                if from_left {
                    Vec2::new(0.0, y)
                } else {
                    velocity.x = -velocity.x;
                    Vec2::new(context.viewport.width, y)
                }
            }
        };

        Self {
            position,
            velocity,
            size: (width, height),
            destroy_offset: spec.destroy_offset,
            expires_at_ms: None,
            lifetime_ms: spec.lifetime_ms,
        }
    }
}

impl Actor for PresetActor {
    fn position(&self) -> Vec2 {
        self.position
    }

    fn set_position(&mut self, position: Vec2) {
        self.position = position;
    }

    fn display_size(&self) -> (f32, f32) {
        self.size
    }

    fn update(
        &mut self,
        frame: &FrameTime,
        _viewport: &Viewport,
    ) -> Result<ActorStatus, ActorUpdateError> {
        if !frame.delta_ms.is_finite() {
            return Err(ActorUpdateError::new(format!(
                "non-finite frame delta {}",
                frame.delta_ms
            )));
        }
        if let Some(lifetime) = self.lifetime_ms {
            let expires_at = *self.expires_at_ms.get_or_insert(frame.now_ms + lifetime);
            if frame.now_ms >= expires_at {
                return Ok(ActorStatus::Expired);
            }
        }
        let seconds = (frame.delta_ms / 1000.0) as f32;
        self.position.x += self.velocity.x * seconds;
        self.position.y += self.velocity.y * seconds;
        Ok(ActorStatus::Alive)
    }

    fn destroy_offset(&self) -> Option<f32> {
        self.destroy_offset
    }
}

/// Evaluates preset files by registering a [`PresetActor`] constructor.
#[derive(Debug, Default)]
pub(crate) struct PresetScriptHost;

impl ScriptHost for PresetScriptHost {
    fn evaluate(
        &mut self,
        kind: &str,
        source: &str,
        factory: &mut ActorFactory,
    ) -> Result<(), ScriptError> {
        let spec = PresetSpec::parse(kind, source)?;
        debug!(kind, width = spec.width, entry = ?spec.entry, "preset_loaded");
        factory.register(
            kind,
            Box::new(move |context: &mut SpawnContext<'_>| -> Box<dyn Actor> {
                Box::new(PresetActor::spawn(&spec, context))
            }),
        );
        Ok(())
    }
}
