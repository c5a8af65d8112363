use tracing::{debug, info, warn};

use crate::selector::ActorSpec;

use super::envelope::{fill_template, CommandEnvelope, CommandKind};
use super::window::{RecentCommandWindow, DEFAULT_RECENT_COMMAND_CAPACITY};

const DYNAMIC_CONTENT: &str = "DynamicContent";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOptions {
    pub recent_capacity: usize,
    /// Prefix every message with `<method> ok` / `<method> failed`, not only
    /// otherwise empty ones.
    pub prefix_messages_with_method: bool,
    /// Scanning an actor of another scene navigates there.
    pub follow_scanned_actor_scene: bool,
    pub dismiss_hint_after_scan: bool,
}

impl Default for CommandOptions {
    fn default() -> Self {
        Self {
            recent_capacity: DEFAULT_RECENT_COMMAND_CAPACITY,
            prefix_messages_with_method: false,
            follow_scanned_actor_scene: true,
            dismiss_hint_after_scan: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpawn {
    pub spec: ActorSpec,
    pub fresh_scan: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    SwitchScene { scene: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    FrameCounter,
    DeveloperInformation,
}

/// Effects the host should apply for one processed envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutcome {
    pub ok: bool,
    pub message: String,
    pub spawn: Option<CommandSpawn>,
    pub navigation: Option<Navigation>,
    pub dismiss_page_hint: bool,
    pub toggle: Option<Toggle>,
    pub reload_required: bool,
    pub last_fully_processed: Option<String>,
}

/// Drops duplicate deliveries and turns fresh or replayed envelopes into
/// [`CommandOutcome`]s.
#[derive(Debug, Clone)]
pub struct CommandReplayGuard {
    scene: String,
    options: CommandOptions,
    recent: RecentCommandWindow,
    last_fully_processed: Option<String>,
}

impl CommandReplayGuard {
    pub fn new(scene: impl Into<String>, options: CommandOptions) -> Self {
        Self {
            scene: scene.into(),
            recent: RecentCommandWindow::with_capacity(options.recent_capacity),
            options,
            last_fully_processed: None,
        }
    }

    pub fn scene(&self) -> &str {
        &self.scene
    }

    pub fn last_fully_processed(&self) -> Option<&str> {
        self.last_fully_processed.as_deref()
    }

    pub fn is_new(&self, identifier: Option<&str>) -> bool {
        self.recent.is_new(identifier)
    }

    pub fn mark_seen(&mut self, identifier: Option<&str>) {
        self.recent.record(identifier);
    }

    /// Returns `None` when a non-replayed envelope was already seen.
    pub fn process(&mut self, envelope: &CommandEnvelope, replay: bool) -> Option<CommandOutcome> {
        let uuid = envelope.uuid();
        if !replay && !self.recent.is_new(uuid) {
            debug!(uuid = uuid.unwrap_or(""), "command_duplicate_dropped");
            return None;
        }
        self.recent.record(uuid);

        let mut outcome = CommandOutcome {
            ok: envelope.is_ok,
            ..CommandOutcome::default()
        };
        let message = match envelope.kind() {
            Some(CommandKind::Debug) => self.handle_debug(envelope, replay, &mut outcome),
            Some(CommandKind::Reset) => self.handle_reset(envelope, replay, &mut outcome),
            Some(CommandKind::SwitchScene) => {
                self.handle_switch_scene(envelope, replay, &mut outcome)
            }
            Some(CommandKind::System) => self.handle_system(envelope),
            Some(CommandKind::Actor { scene }) => {
                self.handle_actor(envelope, &scene, replay, &mut outcome)
            }
            None => Some(String::new()),
        };
        outcome.message = self.compose_message(envelope, message);

        if let Some(uuid) = uuid {
            self.last_fully_processed = Some(uuid.to_string());
        }
        outcome.last_fully_processed = self.last_fully_processed.clone();
        info!(
            command = envelope.command.as_deref().unwrap_or(""),
            uuid = uuid.unwrap_or(""),
            replay,
            ok = outcome.ok,
            "command_processed"
        );
        Some(outcome)
    }

    fn handle_debug(
        &self,
        envelope: &CommandEnvelope,
        replay: bool,
        outcome: &mut CommandOutcome,
    ) -> Option<String> {
        let (toggle, subject) = match envelope.parameter(0) {
            Some("ok") | Some("fail") => return None,
            Some("toggleFps") => (Toggle::FrameCounter, "frames-per-second counter"),
            Some("toggleDevInfo") => (Toggle::DeveloperInformation, "developer information"),
            _ => return Some("Unknown debug command received".to_string()),
        };
        if !envelope.is_ok {
            return Some(format!("Toggling {subject} failed"));
        }
        if !replay {
            outcome.toggle = Some(toggle);
        }
        Some(format!("Toggled {subject}"))
    }

    fn handle_reset(
        &self,
        envelope: &CommandEnvelope,
        replay: bool,
        outcome: &mut CommandOutcome,
    ) -> Option<String> {
        let reset_scene = envelope.parameter(1).unwrap_or("");
        let parameters = [("scene_name", reset_scene)];
        if envelope.is_ok
            && envelope.parameters.len() == 2
            && envelope.parameter(0) == Some(DYNAMIC_CONTENT)
        {
            if (reset_scene.is_empty() || reset_scene == self.scene) && !replay {
                outcome.reload_required = true;
            }
            if reset_scene.is_empty() {
                return Some("All scenes got reset".to_string());
            }
            return Some(fill_template("Scene \"{scene_name}\" got reset", &parameters));
        }
        if reset_scene.is_empty() {
            Some("Resetting all scenes failed".to_string())
        } else {
            Some(fill_template(
                "Resetting scene \"{scene_name}\" failed",
                &parameters,
            ))
        }
    }

    fn handle_switch_scene(
        &self,
        envelope: &CommandEnvelope,
        replay: bool,
        outcome: &mut CommandOutcome,
    ) -> Option<String> {
        let target = envelope.parameter(0).unwrap_or("");
        let parameters = [("scene_name", target)];
        if envelope.is_ok {
            if !replay && !target.is_empty() {
                outcome.navigation = Some(Navigation::SwitchScene {
                    scene: target.to_string(),
                });
            }
            Some(fill_template("Switching to scene {scene_name}", &parameters))
        } else {
            Some(fill_template("Cannot switch to scene {scene_name}", &parameters))
        }
    }

    fn handle_system(&self, envelope: &CommandEnvelope) -> Option<String> {
        match (envelope.is_ok, envelope.parameter(0)) {
            (true, Some("poweroff")) => Some("Shutdown initiated".to_string()),
            (false, Some("poweroff")) => Some("Shutdown initiation failed".to_string()),
            _ => Some("Unknown system command received".to_string()),
        }
    }

    fn handle_actor(
        &self,
        envelope: &CommandEnvelope,
        command_scene: &str,
        replay: bool,
        outcome: &mut CommandOutcome,
    ) -> Option<String> {
        let actor_name = envelope.parameter(0).unwrap_or("");
        let same_scene = command_scene == self.scene;
        let template = if envelope.is_ok {
            if !replay && self.options.dismiss_hint_after_scan {
                outcome.dismiss_page_hint = true;
            }
            if same_scene {
                match envelope.flavor() {
                    Some(flavor) if !actor_name.is_empty() => {
                        outcome.spawn = Some(CommandSpawn {
                            spec: ActorSpec::new(actor_name, flavor),
                            fresh_scan: !replay,
                        });
                    }
                    _ => warn!(
                        actor = actor_name,
                        "actor_command_missing_kind_or_flavor"
                    ),
                }
            } else if !replay && self.options.follow_scanned_actor_scene {
                outcome.navigation = Some(Navigation::SwitchScene {
                    scene: command_scene.to_string(),
                });
            }
            Some("Added new {actor_name}")
        } else if envelope.error_message.is_some() || envelope.error_template.is_some() {
            None
        } else {
            Some("Failed to scan new actor drawing for {actor_name}")
        };

        template.map(|template| {
            let mut template = template.to_string();
            if !same_scene {
                template.push_str(" for scene {scene_name}");
            }
            fill_template(
                &template,
                &[("actor_name", actor_name), ("scene_name", command_scene)],
            )
        })
    }

    fn compose_message(&self, envelope: &CommandEnvelope, message: Option<String>) -> String {
        let mut message = message.unwrap_or_default();
        if let Some(error) = envelope.error_text() {
            if !message.is_empty() {
                message.push_str(": ");
            }
            message.push_str(&error);
        }
        if let Some(method) = envelope.method.as_deref().filter(|method| !method.is_empty()) {
            if self.options.prefix_messages_with_method || message.is_empty() {
                let status = if envelope.is_ok { "ok" } else { "failed" };
                let mut prefixed = format!("{method} {status}");
                if !message.is_empty() {
                    prefixed.push_str(": ");
                    prefixed.push_str(&message);
                }
                message = prefixed;
            }
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(json: &str) -> CommandEnvelope {
        serde_json::from_str(json).expect("envelope")
    }

    fn scanned_bird(uuid: &str) -> CommandEnvelope {
        envelope(&format!(
            r#"{{"is_ok": true, "command": "balloons", "parameters": ["Bird"],
                "uuid": "{uuid}", "payload": {{"flavor": "f1"}}}}"#
        ))
    }

    fn guard() -> CommandReplayGuard {
        CommandReplayGuard::new("balloons", CommandOptions::default())
    }

    #[test]
    fn duplicate_delivery_spawns_once() {
        let mut guard = guard();
        let first = guard.process(&scanned_bird("u-1"), false).expect("first");
        let spawn = first.spawn.expect("spawn");
        assert_eq!(spawn.spec, ActorSpec::new("Bird", "f1"));
        assert!(spawn.fresh_scan);
        assert!(first.dismiss_page_hint);
        assert_eq!(first.message, "Added new Bird");
        assert!(guard.process(&scanned_bird("u-1"), false).is_none());
    }

    #[test]
    fn replay_spawns_again_without_side_effects() {
        let mut guard = guard();
        guard.process(&scanned_bird("u-1"), false).expect("first");
        let replayed = guard.process(&scanned_bird("u-1"), true).expect("replay");
        let spawn = replayed.spawn.expect("spawn");
        assert!(!spawn.fresh_scan);
        assert!(!replayed.dismiss_page_hint);
        assert_eq!(replayed.navigation, None);
    }

    #[test]
    fn replayed_debug_toggle_keeps_message_without_toggling() {
        let mut guard = guard();
        let fps = envelope(
            r#"{"is_ok": true, "command": "debug", "parameters": ["toggleFps"], "uuid": "d-1"}"#,
        );
        let first = guard.process(&fps, false).expect("first");
        assert_eq!(first.toggle, Some(Toggle::FrameCounter));
        assert_eq!(first.message, "Toggled frames-per-second counter");

        let replayed = guard.process(&fps, true).expect("replay");
        assert_eq!(replayed.toggle, None);
        assert_eq!(replayed.message, "Toggled frames-per-second counter");
    }

    #[test]
    fn failed_toggles_and_status_pings_report_like_backend() {
        let mut guard = guard();
        let failed = envelope(
            r#"{"is_ok": false, "command": "debug", "parameters": ["toggleDevInfo"]}"#,
        );
        let outcome = guard.process(&failed, false).expect("failed toggle");
        assert_eq!(outcome.toggle, None);
        assert_eq!(outcome.message, "Toggling developer information failed");

        let ping = envelope(r#"{"is_ok": false, "command": "debug", "parameters": ["fail"]}"#);
        assert_eq!(guard.process(&ping, false).expect("ping").message, "");

        let unknown = envelope(r#"{"is_ok": true, "command": "debug", "parameters": ["jump"]}"#);
        assert_eq!(
            guard.process(&unknown, false).expect("unknown").message,
            "Unknown debug command received"
        );
    }

    #[test]
    fn system_and_reset_messages() {
        let mut guard = guard();
        let poweroff = envelope(r#"{"is_ok": true, "command": "system", "parameters": ["poweroff"]}"#);
        assert_eq!(guard.process(&poweroff, false).expect("on").message, "Shutdown initiated");
        let refused = envelope(r#"{"command": "system", "parameters": ["poweroff"]}"#);
        assert_eq!(
            guard.process(&refused, false).expect("off").message,
            "Shutdown initiation failed"
        );

        let all = envelope(
            r#"{"is_ok": true, "command": "reset", "parameters": ["DynamicContent", ""]}"#,
        );
        let outcome = guard.process(&all, false).expect("all");
        assert_eq!(outcome.message, "All scenes got reset");
        assert!(outcome.reload_required);
        let one = envelope(
            r#"{"is_ok": true, "command": "reset", "parameters": ["DynamicContent", "space"]}"#,
        );
        assert_eq!(
            guard.process(&one, false).expect("one").message,
            r#"Scene "space" got reset"#
        );
        let failed = envelope(r#"{"command": "reset", "parameters": ["DynamicContent", "space"]}"#);
        assert_eq!(
            guard.process(&failed, false).expect("failed").message,
            r#"Resetting scene "space" failed"#
        );
    }

    #[test]
    fn scan_for_other_scene_dismisses_hint_unless_replayed() {
        let mut guard = guard();
        let scanned = envelope(
            r#"{"is_ok": true, "command": "space", "parameters": ["Rocket"],
                "uuid": "u-7", "payload": {"flavor": "f1"}}"#,
        );
        assert!(guard.process(&scanned, false).expect("fresh").dismiss_page_hint);
        assert!(!guard.process(&scanned, true).expect("replay").dismiss_page_hint);
    }

    #[test]
    fn actor_of_other_scene_navigates_unless_replayed() {
        let mut guard = guard();
        let scanned = envelope(
            r#"{"is_ok": true, "command": "space", "parameters": ["Rocket"],
                "uuid": "u-2", "payload": {"flavor": "f1"}}"#,
        );
        let outcome = guard.process(&scanned, false).expect("outcome");
        assert_eq!(outcome.spawn, None);
        assert_eq!(
            outcome.navigation,
            Some(Navigation::SwitchScene {
                scene: "space".to_string()
            })
        );
        assert_eq!(outcome.message, "Added new Rocket for scene space");

        let replayed = guard.process(&scanned, true).expect("replay");
        assert_eq!(replayed.navigation, None);
    }

    #[test]
    fn failed_scan_uses_error_template() {
        let mut guard = guard();
        let failed = envelope(
            r#"{"is_ok": false, "command": "balloons", "parameters": ["Bird"],
                "uuid": "u-3", "error_template": "Could not find {what}",
                "error_parameters": {"what": "the marker"}}"#,
        );
        let outcome = guard.process(&failed, false).expect("outcome");
        assert!(!outcome.ok);
        assert_eq!(outcome.spawn, None);
        assert_eq!(outcome.message, "Could not find the marker");

        let bare = envelope(r#"{"command": "balloons", "parameters": ["Bird"], "uuid": "u-4"}"#);
        let outcome = guard.process(&bare, false).expect("outcome");
        assert_eq!(outcome.message, "Failed to scan new actor drawing for Bird");
    }

    #[test]
    fn method_prefix_fills_empty_messages() {
        let mut guard = guard();
        let ok = envelope(
            r#"{"is_ok": true, "command": "debug", "parameters": ["ok"],
                "uuid": "u-5", "method": "scan"}"#,
        );
        assert_eq!(guard.process(&ok, false).expect("outcome").message, "scan ok");

        let mut prefixing = CommandReplayGuard::new(
            "balloons",
            CommandOptions {
                prefix_messages_with_method: true,
                ..CommandOptions::default()
            },
        );
        let scanned = envelope(
            r#"{"is_ok": true, "command": "balloons", "parameters": ["Bird"],
                "uuid": "u-6", "method": "scan", "payload": {"flavor": "f"}}"#,
        );
        assert_eq!(
            prefixing.process(&scanned, false).expect("outcome").message,
            "scan ok: Added new Bird"
        );
    }

    #[test]
    fn reserved_commands_map_to_effects() {
        let mut guard = guard();
        let fps = envelope(r#"{"is_ok": true, "command": "debug", "parameters": ["toggleFps"]}"#);
        assert_eq!(
            guard.process(&fps, false).expect("fps").toggle,
            Some(Toggle::FrameCounter)
        );

        let switch = envelope(
            r#"{"is_ok": true, "command": "switchScene", "parameters": ["space"], "uuid": "s"}"#,
        );
        let outcome = guard.process(&switch, false).expect("switch");
        assert_eq!(outcome.message, "Switching to scene space");
        assert!(outcome.navigation.is_some());
        assert!(guard.process(&switch, true).expect("replay").navigation.is_none());

        let reset = envelope(
            r#"{"is_ok": true, "command": "reset", "parameters": ["DynamicContent", "balloons"]}"#,
        );
        assert!(guard.process(&reset, false).expect("reset").reload_required);
        assert!(!guard.process(&reset, true).expect("reset").reload_required);
        let other = envelope(
            r#"{"is_ok": true, "command": "reset", "parameters": ["DynamicContent", "space"]}"#,
        );
        assert!(!guard.process(&other, false).expect("reset").reload_required);
    }

    #[test]
    fn envelopes_without_uuid_are_never_deduplicated() {
        let mut guard = guard();
        let anonymous = envelope(
            r#"{"is_ok": true, "command": "balloons", "parameters": ["Bird"],
                "payload": {"flavor": "f"}}"#,
        );
        assert!(guard.process(&anonymous, false).is_some());
        assert!(guard.process(&anonymous, false).is_some());
        assert_eq!(guard.last_fully_processed(), None);
    }

    #[test]
    fn last_fully_processed_follows_latest_uuid() {
        let mut guard = guard();
        guard.process(&scanned_bird("u-1"), false);
        let outcome = guard.process(&scanned_bird("u-2"), false).expect("outcome");
        assert_eq!(outcome.last_fully_processed.as_deref(), Some("u-2"));
        assert_eq!(guard.last_fully_processed(), Some("u-2"));
    }
}
