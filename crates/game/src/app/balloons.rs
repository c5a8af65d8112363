use engine::{
    Actor, ActorRuntime, ActorSpec, ActorStatus, ActorUpdateError, DestroyContext, FrameTime,
    SpawnContext, SpawnOrder, SpawnParameters, Texture, Vec2, Viewport,
};
use rand::rngs::SmallRng;
use rand::Rng;
use tracing::{debug, info};

pub(crate) const SCENE_NAME: &str = "balloons";
pub(crate) const CLOUD_KIND: &str = "Cloud";
pub(crate) const CLOUD_FLAVORS: [&str; 3] = ["1", "2", "3"];
pub(crate) const CLOUD_TARGET: usize = 20;

const CLOUD_WIDTH: f32 = 400.0;
const CLOUD_MIN_SCALE: f32 = 0.2;
const CLOUD_MAX_SCALE: f32 = 0.8;
const CLOUD_TEXTURE_SIZE: (u32, u32) = (400, 240);
const MAX_WIND_FORCE: f32 = 0.1;
/// Horizontal pixels per second for a unit wind force.
const WIND_SPEED: f32 = 120.0;
const FADE_IN_PER_UPDATE: f32 = 0.01;

/// Slow background cloud that fades in and drifts with the wind.
#[derive(Debug, Clone)]
pub(crate) struct Cloud {
    position: Vec2,
    velocity_x: f32,
    size: (f32, f32),
    opacity: f32,
}

impl Cloud {
    fn spawn(context: &mut SpawnContext<'_>) -> Self {
        let viewport = context.viewport;
        let depth: f32 = context.rng.gen();
        let scale = CLOUD_MIN_SCALE + (CLOUD_MAX_SCALE - CLOUD_MIN_SCALE) * depth;
        let width = CLOUD_WIDTH * scale;
        let height = if context.texture.width == 0 {
            width
        } else {
            width * context.texture.height as f32 / context.texture.width as f32
        };

        let force = context.rng.gen_range(-MAX_WIND_FORCE..=MAX_WIND_FORCE);
        let mut x = context.rng.gen::<f32>() * viewport.width / 2.0;
        if force <= 0.0 {
            x += viewport.width / 2.0;
        }
        let y = context.rng.gen::<f32>() * viewport.height;

        Self {
            position: Vec2::new(x, y),
            velocity_x: force * WIND_SPEED,
            size: (width, height),
            opacity: 0.0,
        }
    }
}

impl Actor for Cloud {
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
        self.opacity = (self.opacity + FADE_IN_PER_UPDATE).min(1.0);
        self.position.x += self.velocity_x * (frame.delta_ms / 1000.0) as f32;
        Ok(ActorStatus::Alive)
    }

    fn destroy_offset(&self) -> Option<f32> {
        Some(self.size.0 / 2.0)
    }

    fn set_opacity(&mut self, opacity: f32) {
        self.opacity = opacity.clamp(0.0, 1.0);
    }
}

fn random_cloud_flavor(rng: &mut SmallRng) -> &'static str {
    CLOUD_FLAVORS[rng.gen_range(0..CLOUD_FLAVORS.len())]
}

/// Registers the cloud kind with its built-in textures and keeps the
/// population topped up whenever a cloud drifts away.
pub(crate) fn install(runtime: &mut ActorRuntime, mut rng: SmallRng) {
    runtime.register_actor(
        CLOUD_KIND,
        Box::new(|context: &mut SpawnContext<'_>| -> Box<dyn Actor> {
            Box::new(Cloud::spawn(context))
        }),
    );
    for flavor in CLOUD_FLAVORS {
        let spec = ActorSpec::new(CLOUD_KIND, flavor);
        let texture = Texture::for_spec(&spec, CLOUD_TEXTURE_SIZE.0, CLOUD_TEXTURE_SIZE.1);
        runtime.register_texture(spec, texture);
    }

    runtime.on_destroy(
        Box::new(move |context: &mut DestroyContext<'_>| {
            if context.count(CLOUD_KIND) < CLOUD_TARGET {
                let flavor = random_cloud_flavor(&mut rng);
                debug!(flavor, "cloud_replacement_requested");
                context.request_spawn(SpawnOrder::of(CLOUD_KIND, flavor));
            }
        }),
        Some(CLOUD_KIND),
    );
    info!(target_count = CLOUD_TARGET, "cloud_layer_installed");
}

/// Fills the sky up to the target count. `immediate` clouds are fully opaque
/// and spread over the whole width, for start-up and resizes.
pub(crate) fn spawn_clouds(
    runtime: &mut ActorRuntime,
    rng: &mut SmallRng,
    immediate: bool,
) -> usize {
    let needed = CLOUD_TARGET.saturating_sub(runtime.count(CLOUD_KIND));
    let width = runtime.stage().viewport.width;
    for _ in 0..needed {
        let flavor = random_cloud_flavor(rng);
        let mut parameters = SpawnParameters::default();
        if immediate {
            let x = rng.gen::<f32>() * width;
            parameters = parameters.with_on_created(move |cloud| {
                let y = cloud.position().y;
                let body = cloud.body_mut();
                body.set_opacity(1.0);
                body.set_position(Vec2::new(x, y));
            });
        }
        runtime.spawn(Some(CLOUD_KIND), Some(flavor), parameters);
    }
    needed
}
