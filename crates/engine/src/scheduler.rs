use tracing::debug;

/// What the frame should do about catalogs and automatic spawns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduledWork {
    pub refresh_catalog: bool,
    pub spawn: bool,
}

/// Two deadlines on the animation clock: catalog reloads and automatic spawns.
///
/// Automatic spawning stays disarmed until the catalogs are ready for the
/// first time.
#[derive(Debug, Clone)]
pub struct SpawnScheduler {
    reload_period_ms: f64,
    spawn_period_ms: f64,
    next_config_fetch: f64,
    next_spawn: f64,
}

impl SpawnScheduler {
    pub fn new(reload_period_ms: f64, spawn_period_ms: f64) -> Self {
        Self {
            reload_period_ms: reload_period_ms.max(0.0),
            spawn_period_ms: spawn_period_ms.max(0.0),
            next_config_fetch: 0.0,
            next_spawn: f64::INFINITY,
        }
    }

    pub fn next_config_fetch(&self) -> f64 {
        self.next_config_fetch
    }

    pub fn next_spawn(&self) -> f64 {
        self.next_spawn
    }

    pub fn is_spawn_armed(&self) -> bool {
        self.next_spawn.is_finite()
    }

    /// Called once the catalogs first become available: spawn right away.
    pub fn arm_first_spawn(&mut self, now_ms: f64) {
        self.next_spawn = now_ms;
        debug!(now_ms, "auto_spawn_armed");
    }

    /// Hidden pages still tick but never spawn, otherwise actors would pile up
    /// in background tabs where nothing moves off screen.
    pub fn tick(&mut self, now_ms: f64, visible: bool) -> ScheduledWork {
        let mut work = ScheduledWork::default();
        if now_ms >= self.next_config_fetch {
            work.refresh_catalog = true;
            self.next_config_fetch = now_ms + self.reload_period_ms;
        }
        if now_ms >= self.next_spawn {
            work.spawn = visible;
            self.next_spawn = now_ms + self.spawn_period_ms;
        }
        work
    }
}
