use std::collections::HashMap;
use std::fmt;

use rand::rngs::SmallRng;
use rand::Rng;
use thiserror::Error;
use tracing::debug;

use crate::assets::Texture;
use crate::geometry::{diagonal, Vec2, Viewport};
use crate::loader::ResourceLoader;
use crate::population::ReplayQueue;
use crate::selector::{uniform_index, ActorSpec};

/// Share of each viewport axis kept free on either side of random spawns.
pub const SPAWN_MARGIN_FRACTION: f32 = 0.2;
pub const SPAWN_SPAN_FRACTION: f32 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(pub u64);

#[derive(Debug, Default)]
pub struct ActorIdAllocator {
    next: u64,
}

impl ActorIdAllocator {
    pub fn allocate(&mut self) -> ActorId {
        let id = ActorId(self.next);
        self.next = self.next.saturating_add(1);
        id
    }
}

/// Animation clock reading for one frame, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameTime {
    pub now_ms: f64,
    pub delta_ms: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorStatus {
    Alive,
    /// The actor finished on its own (for example a balloon that popped).
    Expired,
}

#[derive(Debug, Error)]
#[error("actor update failed: {reason}")]
pub struct ActorUpdateError {
    pub reason: String,
}

impl ActorUpdateError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Behavior of one spawned sprite. Species code implements this.
pub trait Actor {
    fn position(&self) -> Vec2;
    fn set_position(&mut self, position: Vec2);
    fn display_size(&self) -> (f32, f32);
    fn update(
        &mut self,
        frame: &FrameTime,
        viewport: &Viewport,
    ) -> Result<ActorStatus, ActorUpdateError>;

    /// Distance past the viewport edge at which the actor is reaped.
    fn destroy_offset(&self) -> Option<f32> {
        None
    }

    fn set_opacity(&mut self, _opacity: f32) {}
}

pub struct SpawnContext<'a> {
    pub spec: &'a ActorSpec,
    pub position: Vec2,
    pub texture: &'a Texture,
    pub viewport: Viewport,
    pub rng: &'a mut SmallRng,
}

pub trait ActorConstructor {
    fn construct(&self, context: &mut SpawnContext<'_>) -> Box<dyn Actor>;
}

impl<F> ActorConstructor for F
where
    F: Fn(&mut SpawnContext<'_>) -> Box<dyn Actor>,
{
    fn construct(&self, context: &mut SpawnContext<'_>) -> Box<dyn Actor> {
        self(context)
    }
}

#[derive(Default)]
pub struct KindRegistry {
    constructors: HashMap<String, Box<dyn ActorConstructor>>,
}

impl KindRegistry {
    pub fn register(&mut self, kind: impl Into<String>, constructor: Box<dyn ActorConstructor>) {
        let kind = kind.into();
        debug!(kind = %kind, "actor_kind_registered");
        self.constructors.insert(kind, constructor);
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.constructors.contains_key(kind)
    }

    pub fn get(&self, kind: &str) -> Option<&dyn ActorConstructor> {
        self.constructors.get(kind).map(Box::as_ref)
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }
}

impl fmt::Debug for KindRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&String> = self.constructors.keys().collect();
        kinds.sort();
        f.debug_struct("KindRegistry").field("kinds", &kinds).finish()
    }
}

/// A created actor together with the bookkeeping the population needs.
pub struct LiveActor {
    id: ActorId,
    spec: ActorSpec,
    destroy_offset: f32,
    fresh_scan: bool,
    body: Box<dyn Actor>,
}

impl LiveActor {
    pub fn id(&self) -> ActorId {
        self.id
    }

    pub fn spec(&self) -> &ActorSpec {
        &self.spec
    }

    pub fn kind(&self) -> &str {
        &self.spec.kind
    }

    pub fn flavor(&self) -> &str {
        &self.spec.flavor
    }

    pub fn destroy_offset(&self) -> f32 {
        self.destroy_offset
    }

    pub fn is_fresh_scan(&self) -> bool {
        self.fresh_scan
    }

    pub fn position(&self) -> Vec2 {
        self.body.position()
    }

    pub fn body(&self) -> &dyn Actor {
        self.body.as_ref()
    }

    pub fn body_mut(&mut self) -> &mut dyn Actor {
        self.body.as_mut()
    }

    pub(crate) fn update(
        &mut self,
        frame: &FrameTime,
        viewport: &Viewport,
    ) -> Result<ActorStatus, ActorUpdateError> {
        self.body.update(frame, viewport)
    }

    pub(crate) fn is_off_screen(&self, viewport: &Viewport) -> bool {
        viewport.is_beyond(self.body.position(), self.destroy_offset)
    }
}

impl fmt::Debug for LiveActor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveActor")
            .field("id", &self.id)
            .field("spec", &self.spec)
            .field("position", &self.body.position())
            .field("destroy_offset", &self.destroy_offset)
            .field("fresh_scan", &self.fresh_scan)
            .finish()
    }
}

pub type OnCreated = Box<dyn FnOnce(&mut LiveActor)>;

#[derive(Default)]
pub struct SpawnParameters {
    /// Explicit spawn point; random within the central region when absent.
    pub position: Option<Vec2>,
    pub fresh_scan: bool,
    pub on_created: Option<OnCreated>,
}

impl SpawnParameters {
    pub fn fresh_scan() -> Self {
        Self {
            fresh_scan: true,
            ..Self::default()
        }
    }

    pub fn at(position: Vec2) -> Self {
        Self {
            position: Some(position),
            ..Self::default()
        }
    }

    pub fn with_on_created(mut self, on_created: impl FnOnce(&mut LiveActor) + 'static) -> Self {
        self.on_created = Some(Box::new(on_created));
        self
    }
}

impl fmt::Debug for SpawnParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpawnParameters")
            .field("position", &self.position)
            .field("fresh_scan", &self.fresh_scan)
            .field("on_created", &self.on_created.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CreateError {
    #[error("actor kind {kind:?} has no registered constructor")]
    UnregisteredKind { kind: String },
    #[error("texture for {spec} is not loaded")]
    TextureMissing { spec: ActorSpec },
    #[error("no recently created actors in category {category:?}")]
    EmptyReplayQueue { category: String },
}

pub fn default_spawn_position<R: Rng + ?Sized>(viewport: &Viewport, rng: &mut R) -> Vec2 {
    let x = viewport.width * (rng.gen::<f32>() * SPAWN_SPAN_FRACTION + SPAWN_MARGIN_FRACTION);
    let y = viewport.height * (rng.gen::<f32>() * SPAWN_SPAN_FRACTION + SPAWN_MARGIN_FRACTION);
    Vec2::new(x, y)
}

#[derive(Debug, Default)]
pub struct ActorFactory {
    registry: KindRegistry,
    ids: ActorIdAllocator,
}

impl ActorFactory {
    pub fn register(&mut self, kind: impl Into<String>, constructor: Box<dyn ActorConstructor>) {
        self.registry.register(kind, constructor);
    }

    pub fn is_registered(&self, kind: &str) -> bool {
        self.registry.contains(kind)
    }

    pub fn registry(&self) -> &KindRegistry {
        &self.registry
    }

    /// Builds an actor for a loaded pair. The caller decides whether to insert it.
    pub fn create(
        &mut self,
        spec: &ActorSpec,
        texture: &Texture,
        parameters: SpawnParameters,
        viewport: Viewport,
        rng: &mut SmallRng,
    ) -> Result<LiveActor, CreateError> {
        let constructor =
            self.registry
                .get(&spec.kind)
                .ok_or_else(|| CreateError::UnregisteredKind {
                    kind: spec.kind.clone(),
                })?;
        let position = match parameters.position {
            Some(position) => position,
            None => default_spawn_position(&viewport, rng),
        };
        let mut context = SpawnContext {
            spec,
            position,
            texture,
            viewport,
            rng,
        };
        let body = constructor.construct(&mut context);
        let destroy_offset = body.destroy_offset().unwrap_or_else(|| {
            let (width, height) = body.display_size();
            diagonal(width, height)
        });

        let mut actor = LiveActor {
            id: self.ids.allocate(),
            spec: spec.clone(),
            destroy_offset,
            fresh_scan: parameters.fresh_scan,
            body,
        };
        if let Some(on_created) = parameters.on_created {
            on_created(&mut actor);
        }
        Ok(actor)
    }

    /// Recreates one of the recently created actors of a category.
    ///
    /// Entries in the queue were spawned before, so their resources are loaded
    /// and no join is needed.
    pub fn create_from_recent<T>(
        &mut self,
        category: &str,
        recent: Option<&ReplayQueue>,
        loader: &ResourceLoader<T>,
        parameters: SpawnParameters,
        viewport: Viewport,
        rng: &mut SmallRng,
    ) -> Result<LiveActor, CreateError> {
        let empty = || CreateError::EmptyReplayQueue {
            category: category.to_string(),
        };
        let recent = recent.ok_or_else(empty)?;
        let index = uniform_index(recent.len(), rng).ok_or_else(empty)?;
        let spec = recent.get(index).cloned().ok_or_else(empty)?;
        let texture = loader
            .texture(&spec)
            .cloned()
            .ok_or_else(|| CreateError::TextureMissing { spec: spec.clone() })?;
        self.create(&spec, &texture, parameters, viewport, rng)
    }
}
