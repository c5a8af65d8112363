use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use engine::{ActorRuntime, Navigation, SpawnParameters, Toggle, Viewport};
use rand::rngs::SmallRng;
use tracing::{debug, info, warn};

use super::balloons;
use super::bootstrap::AppWiring;
use super::feed::FeedMessage;

#[derive(Debug, Clone)]
pub(crate) struct LoopConfig {
    pub(crate) target_tps: u32,
    pub(crate) max_frame_delta: Duration,
    pub(crate) max_ticks_per_frame: u32,
    pub(crate) stats_log_interval: Duration,
    /// Stop after this long; runs until killed when absent.
    pub(crate) run_for: Option<Duration>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            target_tps: 60,
            max_frame_delta: Duration::from_millis(250),
            max_ticks_per_frame: 5,
            stats_log_interval: Duration::from_secs(1),
            run_for: None,
        }
    }
}

/// Host-side state that outlives single feed messages.
#[derive(Debug, Default)]
struct HostState {
    developer_information: bool,
    frame_counter: bool,
}

pub(crate) fn run(app: AppWiring) -> ExitCode {
    let AppWiring {
        loop_config: config,
        mut runtime,
        feed,
        mut clouds,
    } = app;

    let target_tps = config.target_tps.max(1);
    let max_frame_delta =
        normalize_non_zero_duration(config.max_frame_delta, Duration::from_millis(250));
    let max_ticks_per_frame = config.max_ticks_per_frame.max(1);
    let stats_log_interval =
        normalize_non_zero_duration(config.stats_log_interval, Duration::from_secs(1));
    let fixed_dt = Duration::from_secs_f64(1.0 / target_tps as f64);
    let fixed_dt_ms = fixed_dt.as_secs_f64() * 1000.0;
    info!(
        target_tps,
        max_frame_delta_ms = max_frame_delta.as_millis() as u64,
        max_ticks_per_frame,
        stats_log_interval_ms = stats_log_interval.as_millis() as u64,
        run_for_ms = config.run_for.map(|limit| limit.as_millis() as u64),
        "loop_config"
    );

    let mut host = HostState::default();
    let started = Instant::now();
    let mut last_frame = started;
    let mut next_stats_log = started + stats_log_interval;
    let mut accumulator = Duration::ZERO;
    let mut sim_ms = 0.0f64;

    loop {
        let now = Instant::now();
        if config
            .run_for
            .is_some_and(|limit| now.saturating_duration_since(started) >= limit)
        {
            info!(reason = "run_time_elapsed", "shutdown_requested");
            break;
        }
        let raw_frame_dt = now.saturating_duration_since(last_frame);
        last_frame = now;
        accumulator = accumulator.saturating_add(clamp_frame_delta(raw_frame_dt, max_frame_delta));

        for message in feed.drain() {
            apply_message(&mut runtime, clouds.as_mut(), &mut host, message);
        }

        let step_plan = plan_sim_steps(accumulator, fixed_dt, max_ticks_per_frame);
        for _ in 0..step_plan.ticks_to_run {
            sim_ms += fixed_dt_ms;
            runtime.update(sim_ms, fixed_dt_ms);
        }
        accumulator = step_plan.remaining_accumulator;

        if step_plan.dropped_backlog > Duration::ZERO {
            warn!(
                dropped_backlog_ms = step_plan.dropped_backlog.as_millis() as u64,
                max_ticks_per_frame, "sim_clamp_triggered"
            );
        }

        if now >= next_stats_log {
            next_stats_log = now + stats_log_interval;
            let stats = runtime.stats();
            info!(
                created = stats.created,
                active = stats.active,
                evicted = stats.evicted,
                failed = stats.failed,
                sim_ms = sim_ms as u64,
                "{}",
                stats.info_line()
            );
        }

        thread::sleep(fixed_dt.saturating_sub(now.elapsed()));
    }

    info!(active = runtime.stats().active, "shutdown");
    ExitCode::SUCCESS
}

fn apply_message(
    runtime: &mut ActorRuntime,
    clouds: Option<&mut SmallRng>,
    host: &mut HostState,
    message: FeedMessage,
) {
    match message {
        FeedMessage::Command { envelope, replay } => {
            let Some(outcome) = runtime.process_command(&envelope, replay) else {
                debug!(uuid = envelope.uuid(), "command_skipped");
                return;
            };
            if !outcome.message.is_empty() {
                info!(ok = outcome.ok, message = outcome.message.as_str(), "command_message");
            }
            if let Some(spawn) = &outcome.spawn {
                info!(
                    kind = spawn.spec.kind.as_str(),
                    flavor = spawn.spec.flavor.as_str(),
                    fresh_scan = spawn.fresh_scan,
                    "scanned_actor_requested"
                );
            }
            if let Some(Navigation::SwitchScene { scene }) = &outcome.navigation {
                info!(scene = scene.as_str(), "scene_switch_requested");
            }
            if outcome.dismiss_page_hint {
                debug!("page_hint_dismissed");
            }
            match outcome.toggle {
                Some(Toggle::FrameCounter) => {
                    host.frame_counter = !host.frame_counter;
                    info!(visible = host.frame_counter, "frame_counter_toggled");
                }
                Some(Toggle::DeveloperInformation) => {
                    host.developer_information = !host.developer_information;
                    info!(
                        visible = host.developer_information,
                        "developer_information_toggled"
                    );
                    if host.developer_information {
                        info!(
                            tried = runtime.tried().len(),
                            last_command = runtime.last_fully_processed_command(),
                            "{}",
                            runtime.stats().info_line()
                        );
                    }
                }
                None => {}
            }
            if outcome.reload_required {
                info!("content_reload_requested");
                runtime.refresh_catalog(true);
            }
        }
        FeedMessage::Viewport { width, height } => {
            runtime.set_viewport(Viewport::new(width, height));
            info!(width, height, "viewport_changed");
            if let Some(rng) = clouds {
                balloons::spawn_clouds(runtime, rng, true);
            }
        }
        FeedMessage::Visibility { visible } => {
            runtime.set_visible(visible);
            info!(visible, "visibility_changed");
        }
        FeedMessage::Loading { blocked } => {
            runtime.set_loading_blocked(blocked);
            info!(blocked, "loading_block_changed");
        }
        FeedMessage::Spawn { kind, flavor } => {
            let requested =
                runtime.spawn(kind.as_deref(), flavor.as_deref(), SpawnParameters::default());
            match requested {
                Some(spec) => info!(
                    kind = spec.kind.as_str(),
                    flavor = spec.flavor.as_str(),
                    "manual_spawn_requested"
                ),
                None => warn!("manual_spawn_without_candidate"),
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct StepPlan {
    ticks_to_run: u32,
    remaining_accumulator: Duration,
    dropped_backlog: Duration,
}

fn plan_sim_steps(
    mut accumulator: Duration,
    fixed_dt: Duration,
    max_ticks_per_frame: u32,
) -> StepPlan {
    let mut ticks_to_run = 0u32;

    while accumulator >= fixed_dt && ticks_to_run < max_ticks_per_frame {
        accumulator = accumulator.saturating_sub(fixed_dt);
        ticks_to_run = ticks_to_run.saturating_add(1);
    }

    let dropped_backlog = if accumulator >= fixed_dt {
        std::mem::take(&mut accumulator)
    } else {
        Duration::ZERO
    };
    StepPlan {
        ticks_to_run,
        remaining_accumulator: accumulator,
        dropped_backlog,
    }
}

fn clamp_frame_delta(frame_dt: Duration, max_frame_delta: Duration) -> Duration {
    frame_dt.min(max_frame_delta)
}

fn normalize_non_zero_duration(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}
