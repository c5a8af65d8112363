use std::collections::{HashMap, VecDeque};
use std::fmt;

use tracing::{debug, warn};

use crate::factory::{ActorId, ActorStatus, FrameTime, LiveActor, SpawnParameters};
use crate::geometry::Viewport;
use crate::selector::ActorSpec;

pub const DEFAULT_REPLAY_QUEUE_CAPACITY: usize = 11;

/// Most recently created pairs of one category, oldest first.
///
/// Pushing into a full queue drops the oldest entry first, so the queue never
/// holds more than `capacity` entries.
#[derive(Debug, Clone)]
pub struct ReplayQueue {
    entries: VecDeque<ActorSpec>,
    capacity: usize,
}

impl ReplayQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, spec: ActorSpec) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(spec);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get(&self, index: usize) -> Option<&ActorSpec> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActorSpec> {
        self.entries.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    OffScreen,
    Expired,
    UpdateFailed,
    Removed,
}

/// A spawn asked for by a collaborator; the runtime runs it after the frame.
#[derive(Debug, Default)]
pub struct SpawnOrder {
    pub kind: Option<String>,
    pub flavor: Option<String>,
    pub parameters: SpawnParameters,
}

impl SpawnOrder {
    pub fn automatic() -> Self {
        Self::default()
    }

    pub fn of(kind: impl Into<String>, flavor: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            flavor: Some(flavor.into()),
            parameters: SpawnParameters::default(),
        }
    }

    pub fn with_parameters(mut self, parameters: SpawnParameters) -> Self {
        self.parameters = parameters;
        self
    }
}

pub struct DestroyContext<'a> {
    actor: &'a LiveActor,
    reason: RemovalReason,
    counts: &'a HashMap<String, usize>,
    spawns: &'a mut Vec<SpawnOrder>,
}

impl DestroyContext<'_> {
    pub fn actor(&self) -> &LiveActor {
        self.actor
    }

    pub fn reason(&self) -> RemovalReason {
        self.reason
    }

    /// Live actors of `kind`, not counting the one being destroyed.
    pub fn count(&self, kind: &str) -> usize {
        self.counts.get(kind).copied().unwrap_or(0)
    }

    pub fn request_spawn(&mut self, order: SpawnOrder) {
        self.spawns.push(order);
    }
}

pub type DestroyCallback = Box<dyn FnMut(&mut DestroyContext<'_>)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DestroySubscription(u64);

struct DestroyListener {
    subscription: DestroySubscription,
    kind_filter: Option<String>,
    callback: DestroyCallback,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PopulationStats {
    pub created: u64,
    pub active: usize,
    pub evicted: u64,
    pub failed: u64,
}

impl PopulationStats {
    pub fn info_line(&self) -> String {
        format!(
            "actorManager: created: {}, active: {}",
            self.created, self.active
        )
    }
}

/// Owns every live actor and decides when each one goes away.
pub struct ActorPopulation {
    actors: Vec<LiveActor>,
    counts: HashMap<String, usize>,
    replay_queues: HashMap<String, ReplayQueue>,
    replay_capacity: usize,
    listeners: Vec<DestroyListener>,
    next_subscription: u64,
    spawn_orders: Vec<SpawnOrder>,
    stats: PopulationStats,
}

impl Default for ActorPopulation {
    fn default() -> Self {
        Self::new(DEFAULT_REPLAY_QUEUE_CAPACITY)
    }
}

impl ActorPopulation {
    pub fn new(replay_capacity: usize) -> Self {
        Self {
            actors: Vec::new(),
            counts: HashMap::new(),
            replay_queues: HashMap::new(),
            replay_capacity,
            listeners: Vec::new(),
            next_subscription: 0,
            spawn_orders: Vec::new(),
            stats: PopulationStats::default(),
        }
    }

    pub fn add(&mut self, actor: LiveActor) -> ActorId {
        let id = actor.id();
        let spec = actor.spec().clone();
        *self.counts.entry(spec.kind.clone()).or_insert(0) += 1;
        let replay_capacity = self.replay_capacity;
        self.replay_queues
            .entry(spec.kind.clone())
            .or_insert_with(|| ReplayQueue::with_capacity(replay_capacity))
            .push(spec);
        self.actors.push(actor);
        self.stats.created = self.stats.created.saturating_add(1);
        id
    }

    /// Advances every actor, then reaps the ones that left the screen,
    /// expired, or failed. Removals are applied after the full pass so an
    /// actor finishing itself cannot disturb iteration.
    pub fn update(&mut self, frame: &FrameTime, viewport: &Viewport) {
        let mut departures = Vec::new();
        for actor in &mut self.actors {
            match actor.update(frame, viewport) {
                Ok(ActorStatus::Alive) => {
                    if actor.is_off_screen(viewport) {
                        departures.push((actor.id(), RemovalReason::OffScreen));
                    }
                }
                Ok(ActorStatus::Expired) => departures.push((actor.id(), RemovalReason::Expired)),
                Err(error) => {
                    warn!(
                        actor_id = actor.id().0,
                        kind = %actor.kind(),
                        flavor = %actor.flavor(),
                        error = %error,
                        "actor_update_failed"
                    );
                    departures.push((actor.id(), RemovalReason::UpdateFailed));
                }
            }
        }

        for (id, reason) in departures {
            self.release(id, reason);
        }
    }

    /// Removes an actor outside the off-screen check. Returns false if unknown.
    pub fn remove(&mut self, id: ActorId) -> bool {
        self.release(id, RemovalReason::Removed)
    }

    pub fn on_destroy(
        &mut self,
        callback: DestroyCallback,
        kind_filter: Option<&str>,
    ) -> DestroySubscription {
        let subscription = DestroySubscription(self.next_subscription);
        self.next_subscription = self.next_subscription.saturating_add(1);
        self.listeners.push(DestroyListener {
            subscription,
            kind_filter: kind_filter.map(ToString::to_string),
            callback,
        });
        subscription
    }

    pub fn unsubscribe(&mut self, subscription: DestroySubscription) -> bool {
        let before = self.listeners.len();
        self.listeners
            .retain(|listener| listener.subscription != subscription);
        self.listeners.len() != before
    }

    pub fn count(&self, kind: &str) -> usize {
        self.counts.get(kind).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LiveActor> {
        self.actors.iter()
    }

    pub fn get(&self, id: ActorId) -> Option<&LiveActor> {
        self.actors.iter().find(|actor| actor.id() == id)
    }

    pub fn get_mut(&mut self, id: ActorId) -> Option<&mut LiveActor> {
        self.actors.iter_mut().find(|actor| actor.id() == id)
    }

    pub fn replay_queue(&self, category: &str) -> Option<&ReplayQueue> {
        self.replay_queues.get(category)
    }

    /// Spawns requested by destroy listeners since the last call.
    pub fn take_spawn_orders(&mut self) -> Vec<SpawnOrder> {
        std::mem::take(&mut self.spawn_orders)
    }

    pub fn stats(&self) -> PopulationStats {
        PopulationStats {
            active: self.actors.len(),
            ..self.stats
        }
    }

    fn release(&mut self, id: ActorId, reason: RemovalReason) -> bool {
        let Some(index) = self.actors.iter().position(|actor| actor.id() == id) else {
            return false;
        };
        let actor = self.actors.remove(index);
        if let Some(count) = self.counts.get_mut(actor.kind()) {
            *count = count.saturating_sub(1);
        }
        match reason {
            RemovalReason::OffScreen | RemovalReason::Expired => {
                self.stats.evicted = self.stats.evicted.saturating_add(1)
            }
            RemovalReason::UpdateFailed => self.stats.failed = self.stats.failed.saturating_add(1),
            RemovalReason::Removed => {}
        }
        debug!(
            actor_id = id.0,
            kind = %actor.kind(),
            flavor = %actor.flavor(),
            reason = ?reason,
            "actor_destroyed"
        );

        for listener in &mut self.listeners {
            let matches = listener
                .kind_filter
                .as_deref()
                .map_or(true, |kind| kind == actor.kind());
            if !matches {
                continue;
            }
            let mut context = DestroyContext {
                actor: &actor,
                reason,
                counts: &self.counts,
                spawns: &mut self.spawn_orders,
            };
            (listener.callback)(&mut context);
        }
        true
    }
}

impl fmt::Debug for ActorPopulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorPopulation")
            .field("actors", &self.actors)
            .field("counts", &self.counts)
            .field("listeners", &self.listeners.len())
            .field("stats", &self.stats)
            .finish()
    }
}
