use rand::rngs::SmallRng;
use rand::SeedableRng;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::assets::{AssetRequest, AssetSource, Texture};
use crate::catalog::{CatalogUpdate, ConfigCatalog};
use crate::commands::{CommandEnvelope, CommandOutcome, CommandReplayGuard};
use crate::config::RuntimeConfig;
use crate::factory::{
    ActorConstructor, ActorFactory, ActorId, CreateError, FrameTime, SpawnParameters,
};
use crate::geometry::{StageState, Viewport};
use crate::loader::ResourceLoader;
use crate::population::{
    ActorPopulation, DestroyCallback, DestroySubscription, PopulationStats,
};
use crate::scheduler::SpawnScheduler;
use crate::selector::{pick_next, uniform_index, ActorSpec, TriedSet, SAMPLE_FLAVOR};

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("script for {kind} could not be parsed: {source}")]
    Parse {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("script for {kind} is invalid: {reason}")]
    Invalid { kind: String, reason: String },
    #[error("script for {kind} did not register a constructor")]
    NotRegistered { kind: String },
}

/// Turns a loaded kind definition into a registered constructor.
pub trait ScriptHost {
    fn evaluate(
        &mut self,
        kind: &str,
        source: &str,
        factory: &mut ActorFactory,
    ) -> Result<(), ScriptError>;
}

/// The explicitly owned context behind the actor lifecycle: catalogs, tried
/// set, loader, factory, population, scheduler and command guard.
pub struct ActorRuntime {
    catalog: ConfigCatalog,
    tried: TriedSet,
    loader: ResourceLoader<SpawnParameters>,
    factory: ActorFactory,
    population: ActorPopulation,
    scheduler: SpawnScheduler,
    commands: CommandReplayGuard,
    assets: Box<dyn AssetSource>,
    scripts: Box<dyn ScriptHost>,
    rng: SmallRng,
    stage: StageState,
    now_ms: f64,
}

impl ActorRuntime {
    pub fn new(
        config: &RuntimeConfig,
        assets: Box<dyn AssetSource>,
        scripts: Box<dyn ScriptHost>,
    ) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        Self {
            catalog: ConfigCatalog::new(config.full_catalog_every),
            tried: TriedSet::default(),
            loader: ResourceLoader::new(),
            factory: ActorFactory::default(),
            population: ActorPopulation::new(config.replay_queue_capacity),
            scheduler: SpawnScheduler::new(config.actor_reload_period_ms, config.spawn_period_ms),
            commands: CommandReplayGuard::new(config.scene.clone(), config.command_options()),
            assets,
            scripts,
            rng,
            stage: StageState {
                viewport: config.viewport,
                ..StageState::default()
            },
            now_ms: 0.0,
        }
    }

    /// Registers a kind implemented in code. Its script counts as loaded.
    pub fn register_actor(&mut self, kind: &str, constructor: Box<dyn ActorConstructor>) {
        self.factory.register(kind, constructor);
        self.loader.mark_script_ready(kind);
    }

    /// Provides a texture that ships with the host, so the image is never fetched.
    pub fn register_texture(&mut self, spec: ActorSpec, texture: Texture) {
        self.loader.mark_image_ready(&spec, texture);
    }

    /// Requests an actor. Without a kind the next pair is picked from the
    /// catalogs; without a flavor one of the kind's catalog flavors is used.
    /// Returns the pair that was requested, or `None` when nothing could be
    /// picked.
    pub fn spawn(
        &mut self,
        kind: Option<&str>,
        flavor: Option<&str>,
        parameters: SpawnParameters,
    ) -> Option<ActorSpec> {
        let spec = match (kind, flavor) {
            (Some(kind), Some(flavor)) => ActorSpec::new(kind, flavor),
            (Some(kind), None) => ActorSpec::new(kind, self.flavor_for(kind)),
            (None, _) => match pick_next(&self.catalog, &self.tried, &mut self.rng) {
                Some(spec) => spec,
                None => {
                    debug!("spawn_skipped_no_candidate");
                    return None;
                }
            },
        };
        self.request_spawn(spec.clone(), parameters);
        Some(spec)
    }

    /// Creates and adds one of the recently created actors of `category` right away.
    pub fn spawn_from_recent(
        &mut self,
        category: &str,
        parameters: SpawnParameters,
    ) -> Result<ActorId, CreateError> {
        let actor = self.factory.create_from_recent(
            category,
            self.population.replay_queue(category),
            &self.loader,
            parameters,
            self.stage.viewport,
            &mut self.rng,
        )?;
        info!(kind = %actor.kind(), flavor = %actor.flavor(), "actor_recreated");
        Ok(self.population.add(actor))
    }

    pub fn count(&self, kind: &str) -> usize {
        self.population.count(kind)
    }

    pub fn on_destroy(
        &mut self,
        callback: DestroyCallback,
        kind_filter: Option<&str>,
    ) -> DestroySubscription {
        self.population.on_destroy(callback, kind_filter)
    }

    pub fn remove(&mut self, id: ActorId) -> bool {
        self.population.remove(id)
    }

    /// Feeds one backend envelope through the replay guard and spawns the
    /// scanned actor if the outcome asks for it. The remaining effects are
    /// returned for the host to apply.
    pub fn process_command(
        &mut self,
        envelope: &CommandEnvelope,
        replay: bool,
    ) -> Option<CommandOutcome> {
        let outcome = self.commands.process(envelope, replay)?;
        if let Some(spawn) = &outcome.spawn {
            let parameters = SpawnParameters {
                fresh_scan: spawn.fresh_scan,
                ..SpawnParameters::default()
            };
            self.request_spawn(spawn.spec.clone(), parameters);
        }
        Some(outcome)
    }

    /// Forces or attempts a catalog reload outside the regular cadence.
    pub fn refresh_catalog(&mut self, force: bool) {
        for version in self.catalog.refresh(force, self.stage.loading_blocked) {
            self.assets.request(AssetRequest::Catalog(version));
        }
    }

    /// Runs one frame of the lifecycle.
    pub fn update(&mut self, now_ms: f64, delta_ms: f64) {
        self.now_ms = now_ms;
        self.drain_completions();

        for request in self.loader.release_deferred(self.stage.loading_blocked) {
            self.assets.request(request);
        }

        let work = self.scheduler.tick(now_ms, self.stage.visible);
        if work.refresh_catalog {
            self.refresh_catalog(false);
        }
        if work.spawn {
            self.spawn(None, None, SpawnParameters::default());
        }

        self.instantiate_ready();

        let frame = FrameTime { now_ms, delta_ms };
        self.population.update(&frame, &self.stage.viewport);

        for order in self.population.take_spawn_orders() {
            self.spawn(order.kind.as_deref(), order.flavor.as_deref(), order.parameters);
        }
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.stage.viewport = viewport;
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.stage.visible = visible;
    }

    pub fn set_loading_blocked(&mut self, blocked: bool) {
        self.stage.loading_blocked = blocked;
    }

    pub fn stage(&self) -> &StageState {
        &self.stage
    }

    pub fn stats(&self) -> PopulationStats {
        self.population.stats()
    }

    pub fn population(&self) -> &ActorPopulation {
        &self.population
    }

    pub fn catalog(&self) -> &ConfigCatalog {
        &self.catalog
    }

    pub fn tried(&self) -> &TriedSet {
        &self.tried
    }

    pub fn loader(&self) -> &ResourceLoader<SpawnParameters> {
        &self.loader
    }

    pub fn scheduler(&self) -> &SpawnScheduler {
        &self.scheduler
    }

    pub fn last_fully_processed_command(&self) -> Option<&str> {
        self.commands.last_fully_processed()
    }

    fn request_spawn(&mut self, spec: ActorSpec, parameters: SpawnParameters) {
        self.tried.mark_tried(&spec.kind, &spec.flavor);
        if let Some(request) = self.loader.ensure_script(&spec.kind) {
            self.assets.request(request);
        }
        if let Some(request) = self
            .loader
            .ensure_image(&spec, self.stage.loading_blocked)
        {
            self.assets.request(request);
        }
        debug!(kind = %spec.kind, flavor = %spec.flavor, "spawn_requested");
        self.loader.when_both_ready(spec, parameters);
    }

    fn flavor_for(&mut self, kind: &str) -> String {
        let flavors = self
            .catalog
            .latest()
            .and_then(|snapshot| snapshot.flavors(kind))
            .filter(|flavors| !flavors.is_empty())
            .or_else(|| self.catalog.full().and_then(|snapshot| snapshot.flavors(kind)))
            .unwrap_or(&[]);
        uniform_index(flavors.len(), &mut self.rng)
            .map(|index| flavors[index].clone())
            .unwrap_or_else(|| SAMPLE_FLAVOR.to_string())
    }

    fn drain_completions(&mut self) {
        for completion in self.assets.poll_completed() {
            match completion.request.clone() {
                AssetRequest::Catalog(version) => {
                    let (_, fetched) = completion.into_text();
                    let update = self.catalog.apply_fetched(version, fetched.as_deref());
                    if update == CatalogUpdate::BecameReady {
                        self.scheduler.arm_first_spawn(self.now_ms);
                    }
                }
                AssetRequest::Script { kind } => {
                    let (_, fetched) = completion.into_text();
                    let outcome = match fetched {
                        Ok(source) => self.evaluate_script(&kind, &source),
                        Err(error) => Err(error.to_string()),
                    };
                    self.loader.script_completed(&kind, outcome);
                }
                AssetRequest::Image(spec) => {
                    let (_, fetched) = completion.into_texture();
                    self.loader.image_completed(&spec, fetched);
                }
            }
        }
    }

    fn evaluate_script(&mut self, kind: &str, source: &str) -> Result<(), String> {
        self.scripts
            .evaluate(kind, source, &mut self.factory)
            .and_then(|()| {
                if self.factory.is_registered(kind) {
                    Ok(())
                } else {
                    Err(ScriptError::NotRegistered {
                        kind: kind.to_string(),
                    })
                }
            })
            .map_err(|error| error.to_string())
    }

    fn instantiate_ready(&mut self) {
        for (spec, parameters) in self.loader.drain_ready() {
            let Some(texture) = self.loader.texture(&spec).cloned() else {
                warn!(kind = %spec.kind, flavor = %spec.flavor, "ready_join_without_texture");
                continue;
            };
            match self.factory.create(
                &spec,
                &texture,
                parameters,
                self.stage.viewport,
                &mut self.rng,
            ) {
                Ok(actor) => {
                    info!(
                        kind = %spec.kind,
                        flavor = %spec.flavor,
                        fresh_scan = actor.is_fresh_scan(),
                        "actor_created"
                    );
                    self.population.add(actor);
                }
                Err(error) => warn!(error = %error, "actor_create_failed"),
            }
        }
    }
}
