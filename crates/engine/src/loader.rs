use std::collections::{HashMap, VecDeque};
use std::fmt::Display;

use tracing::{debug, warn};

use crate::assets::{AssetRequest, Texture};
use crate::selector::ActorSpec;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScriptState {
    #[default]
    NotRequested,
    Loading,
    Ready,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ImageState {
    #[default]
    NotRequested,
    /// Requested while loading was blocked; issued by `release_deferred`.
    Deferred,
    Loading,
    Ready(Texture),
}

/// Tracks script readiness per kind and image readiness per (kind, flavor),
/// releasing each registered join exactly once when both hold.
#[derive(Debug)]
pub struct ResourceLoader<T> {
    scripts: HashMap<String, ScriptState>,
    images: HashMap<ActorSpec, ImageState>,
    deferred: VecDeque<ActorSpec>,
    joins: HashMap<ActorSpec, Vec<T>>,
    ready: Vec<(ActorSpec, T)>,
}

impl<T> Default for ResourceLoader<T> {
    fn default() -> Self {
        Self {
            scripts: HashMap::new(),
            images: HashMap::new(),
            deferred: VecDeque::new(),
            joins: HashMap::new(),
            ready: Vec::new(),
        }
    }
}

impl<T> ResourceLoader<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_state(&self, kind: &str) -> ScriptState {
        self.scripts.get(kind).copied().unwrap_or_default()
    }

    pub fn image_state(&self, spec: &ActorSpec) -> ImageState {
        self.images.get(spec).cloned().unwrap_or_default()
    }

    pub fn texture(&self, spec: &ActorSpec) -> Option<&Texture> {
        match self.images.get(spec) {
            Some(ImageState::Ready(texture)) => Some(texture),
            _ => None,
        }
    }

    pub fn is_ready(&self, spec: &ActorSpec) -> bool {
        self.script_state(&spec.kind) == ScriptState::Ready && self.texture(spec).is_some()
    }

    pub fn pending_join_count(&self) -> usize {
        self.joins.values().map(Vec::len).sum()
    }

    /// Returns the request to issue, or `None` if the script was already asked for.
    pub fn ensure_script(&mut self, kind: &str) -> Option<AssetRequest> {
        let state = self.scripts.entry(kind.to_string()).or_default();
        if *state != ScriptState::NotRequested {
            return None;
        }
        *state = ScriptState::Loading;
        Some(AssetRequest::Script {
            kind: kind.to_string(),
        })
    }

    /// Marks a kind usable without loading anything, for kinds registered in code.
    pub fn mark_script_ready(&mut self, kind: &str) {
        self.scripts.insert(kind.to_string(), ScriptState::Ready);
        self.fire_kind(kind);
    }

    /// Installs a texture that ships with the host instead of being loaded.
    pub fn mark_image_ready(&mut self, spec: &ActorSpec, texture: Texture) {
        self.images.insert(spec.clone(), ImageState::Ready(texture));
        self.fire_if_both_ready(spec);
    }

    pub fn ensure_image(&mut self, spec: &ActorSpec, loading_blocked: bool) -> Option<AssetRequest> {
        let state = self.images.entry(spec.clone()).or_default();
        if *state != ImageState::NotRequested {
            return None;
        }
        if loading_blocked {
            *state = ImageState::Deferred;
            self.deferred.push_back(spec.clone());
            debug!(kind = %spec.kind, flavor = %spec.flavor, "image_request_deferred");
            return None;
        }
        *state = ImageState::Loading;
        Some(AssetRequest::Image(spec.clone()))
    }

    /// Issues every image request parked while loading was blocked.
    pub fn release_deferred(&mut self, loading_blocked: bool) -> Vec<AssetRequest> {
        if loading_blocked || self.deferred.is_empty() {
            return Vec::new();
        }
        let mut requests = Vec::with_capacity(self.deferred.len());
        while let Some(spec) = self.deferred.pop_front() {
            if let Some(state) = self.images.get_mut(&spec) {
                if *state == ImageState::Deferred {
                    *state = ImageState::Loading;
                    requests.push(AssetRequest::Image(spec));
                }
            }
        }
        requests
    }

    pub fn when_both_ready(&mut self, spec: ActorSpec, payload: T) {
        self.joins.entry(spec.clone()).or_default().push(payload);
        self.fire_if_both_ready(&spec);
    }

    pub fn script_completed<E: Display>(&mut self, kind: &str, outcome: Result<(), E>) {
        let state = self.scripts.entry(kind.to_string()).or_default();
        if *state != ScriptState::Loading {
            debug!(kind, state = ?*state, "stale_script_completion_ignored");
            return;
        }
        match outcome {
            Ok(()) => {
                *state = ScriptState::Ready;
                self.fire_kind(kind);
            }
            Err(error) => {
                *state = ScriptState::NotRequested;
                let before = self.pending_join_count();
                self.joins.retain(|spec, _| spec.kind != kind);
                let dropped_joins = before - self.pending_join_count();
                warn!(kind, error = %error, dropped_joins, "script_load_failed");
            }
        }
    }

    pub fn image_completed<E: Display>(&mut self, spec: &ActorSpec, outcome: Result<Texture, E>) {
        let Some(state) = self.images.get_mut(spec) else {
            debug!(kind = %spec.kind, flavor = %spec.flavor, "unrequested_image_completion_ignored");
            return;
        };
        if *state != ImageState::Loading {
            debug!(kind = %spec.kind, flavor = %spec.flavor, "stale_image_completion_ignored");
            return;
        }
        match outcome {
            Ok(texture) => {
                *state = ImageState::Ready(texture);
                self.fire_if_both_ready(spec);
            }
            Err(error) => {
                *state = ImageState::NotRequested;
                let dropped_joins = self.joins.remove(spec).map_or(0, |joins| joins.len());
                warn!(
                    kind = %spec.kind,
                    flavor = %spec.flavor,
                    error = %error,
                    dropped_joins,
                    "image_load_failed"
                );
            }
        }
    }

    /// Takes every join released since the last call, in release order.
    pub fn drain_ready(&mut self) -> Vec<(ActorSpec, T)> {
        std::mem::take(&mut self.ready)
    }

    fn fire_kind(&mut self, kind: &str) {
        let waiting: Vec<ActorSpec> = self
            .joins
            .keys()
            .filter(|spec| spec.kind == kind)
            .cloned()
            .collect();
        for spec in waiting {
            self.fire_if_both_ready(&spec);
        }
    }

    fn fire_if_both_ready(&mut self, spec: &ActorSpec) {
        if !self.is_ready(spec) {
            return;
        }
        if let Some(payloads) = self.joins.remove(spec) {
            self.ready
                .extend(payloads.into_iter().map(|payload| (spec.clone(), payload)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(kind: &str, flavor: &str) -> ActorSpec {
        ActorSpec::new(kind, flavor)
    }

    fn texture(kind: &str, flavor: &str) -> Texture {
        Texture::for_spec(&spec(kind, flavor), 10, 20)
    }

    fn ready_ok() -> Result<(), String> {
        Ok(())
    }

    fn image_ok(kind: &str, flavor: &str) -> Result<Texture, String> {
        Ok(texture(kind, flavor))
    }

    #[test]
    fn ensure_script_requests_once() {
        let mut loader = ResourceLoader::<u32>::new();
        let issued: Vec<_> = (0..5).filter_map(|_| loader.ensure_script("Bird")).collect();
        assert_eq!(
            issued,
            vec![AssetRequest::Script {
                kind: "Bird".to_string()
            }]
        );
        loader.script_completed("Bird", ready_ok());
        assert_eq!(loader.ensure_script("Bird"), None);
    }

    #[test]
    fn join_fires_when_script_lands_after_image() {
        let mut loader = ResourceLoader::new();
        let red = spec("Bird", "red");
        loader.ensure_script("Bird");
        loader.ensure_image(&red, false);
        loader.when_both_ready(red.clone(), 1);

        loader.image_completed(&red, image_ok("Bird", "red"));
        assert!(loader.drain_ready().is_empty());
        loader.script_completed("Bird", ready_ok());
        assert_eq!(loader.drain_ready(), vec![(red, 1)]);
    }

    #[test]
    fn join_fires_when_image_lands_after_script() {
        let mut loader = ResourceLoader::new();
        let red = spec("Bird", "red");
        loader.ensure_script("Bird");
        loader.ensure_image(&red, false);
        loader.when_both_ready(red.clone(), 1);

        loader.script_completed("Bird", ready_ok());
        assert!(loader.drain_ready().is_empty());
        loader.image_completed(&red, image_ok("Bird", "red"));
        assert_eq!(loader.drain_ready(), vec![(red, 1)]);
    }

    #[test]
    fn join_on_already_ready_pair_fires_exactly_once() {
        let mut loader = ResourceLoader::new();
        let red = spec("Bird", "red");
        loader.ensure_script("Bird");
        loader.ensure_image(&red, false);
        loader.script_completed("Bird", ready_ok());
        loader.image_completed(&red, image_ok("Bird", "red"));

        loader.when_both_ready(red.clone(), 7);
        assert_eq!(loader.drain_ready(), vec![(red.clone(), 7)]);
        assert!(loader.drain_ready().is_empty());

        loader.image_completed(&red, image_ok("Bird", "red"));
        loader.script_completed("Bird", ready_ok());
        assert!(loader.drain_ready().is_empty());
    }

    #[test]
    fn flavors_of_loaded_kind_fire_independently() {
        let mut loader = ResourceLoader::new();
        let red = spec("Bird", "red");
        let blue = spec("Bird", "blue");
        loader.ensure_script("Bird");
        loader.script_completed("Bird", ready_ok());
        assert_eq!(loader.ensure_script("Bird"), None);

        loader.ensure_image(&red, false);
        loader.ensure_image(&blue, false);
        loader.when_both_ready(red.clone(), 1);
        loader.when_both_ready(blue.clone(), 2);

        loader.image_completed(&blue, image_ok("Bird", "blue"));
        assert_eq!(loader.drain_ready(), vec![(blue, 2)]);
        loader.image_completed(&red, image_ok("Bird", "red"));
        assert_eq!(loader.drain_ready(), vec![(red, 1)]);
    }

    #[test]
    fn every_join_for_a_pair_is_released() {
        let mut loader = ResourceLoader::new();
        let red = spec("Bird", "red");
        loader.ensure_script("Bird");
        loader.ensure_image(&red, false);
        loader.when_both_ready(red.clone(), 1);
        loader.when_both_ready(red.clone(), 2);
        assert_eq!(loader.pending_join_count(), 2);
        loader.script_completed("Bird", ready_ok());
        loader.image_completed(&red, image_ok("Bird", "red"));
        assert_eq!(loader.drain_ready(), vec![(red.clone(), 1), (red, 2)]);
        assert_eq!(loader.pending_join_count(), 0);
    }

    #[test]
    fn blocked_image_request_is_deferred_and_released_once() {
        let mut loader = ResourceLoader::<u32>::new();
        let red = spec("Bird", "red");
        assert_eq!(loader.ensure_image(&red, true), None);
        assert_eq!(loader.image_state(&red), ImageState::Deferred);
        assert_eq!(loader.ensure_image(&red, true), None);
        assert!(loader.release_deferred(true).is_empty());

        assert_eq!(
            loader.release_deferred(false),
            vec![AssetRequest::Image(red.clone())]
        );
        assert!(loader.release_deferred(false).is_empty());
        assert_eq!(loader.image_state(&red), ImageState::Loading);
    }

    #[test]
    fn failed_loads_drop_joins_and_can_be_retried() {
        let mut loader = ResourceLoader::new();
        let red = spec("Bird", "red");
        let blue = spec("Bird", "blue");
        loader.ensure_script("Bird");
        loader.ensure_image(&red, false);
        loader.ensure_image(&blue, false);
        loader.when_both_ready(red.clone(), 1);
        loader.when_both_ready(blue.clone(), 2);

        loader.image_completed(&red, Err::<Texture, _>("timeout"));
        assert_eq!(loader.image_state(&red), ImageState::NotRequested);
        assert_eq!(loader.pending_join_count(), 1);

        loader.script_completed("Bird", Err::<(), _>("404"));
        assert_eq!(loader.script_state("Bird"), ScriptState::NotRequested);
        assert_eq!(loader.pending_join_count(), 0);

        assert!(loader.ensure_script("Bird").is_some());
        assert!(loader.ensure_image(&red, false).is_some());
        loader.when_both_ready(red.clone(), 3);
        loader.script_completed("Bird", ready_ok());
        loader.image_completed(&red, image_ok("Bird", "red"));
        loader.image_completed(&blue, image_ok("Bird", "blue"));
        assert_eq!(loader.drain_ready(), vec![(red, 3)]);
    }

    #[test]
    fn repeated_image_failures_do_not_pile_up_joins() {
        let mut loader = ResourceLoader::new();
        let red = spec("Bird", "red");
        loader.mark_script_ready("Bird");
        for attempt in 0..4 {
            assert!(loader.ensure_image(&red, false).is_some());
            loader.when_both_ready(red.clone(), attempt);
            loader.image_completed(&red, Err::<Texture, _>("404"));
            assert_eq!(loader.pending_join_count(), 0);
        }
        assert!(loader.ensure_image(&red, false).is_some());
        loader.when_both_ready(red.clone(), 4);
        loader.image_completed(&red, image_ok("Bird", "red"));
        assert_eq!(loader.drain_ready(), vec![(red, 4)]);
    }

    #[test]
    fn unrequested_completions_are_ignored() {
        let mut loader = ResourceLoader::<u32>::new();
        let red = spec("Bird", "red");
        loader.image_completed(&red, image_ok("Bird", "red"));
        loader.script_completed("Bird", ready_ok());
        assert_eq!(loader.image_state(&red), ImageState::NotRequested);
        assert_eq!(loader.script_state("Bird"), ScriptState::NotRequested);
    }

    #[test]
    fn native_kind_needs_only_the_image() {
        let mut loader = ResourceLoader::new();
        let cloud = spec("Cloud", "1");
        loader.mark_script_ready("Cloud");
        assert_eq!(loader.ensure_script("Cloud"), None);
        loader.ensure_image(&cloud, false);
        loader.when_both_ready(cloud.clone(), 3);
        loader.image_completed(&cloud, image_ok("Cloud", "1"));
        assert_eq!(loader.drain_ready(), vec![(cloud, 3)]);
    }

    #[test]
    fn built_in_texture_releases_waiting_join() {
        let mut loader = ResourceLoader::new();
        let cloud = spec("Cloud", "2");
        loader.when_both_ready(cloud.clone(), 9);
        loader.mark_script_ready("Cloud");
        assert!(loader.drain_ready().is_empty());
        loader.mark_image_ready(&cloud, texture("Cloud", "2"));
        assert_eq!(loader.drain_ready(), vec![(cloud.clone(), 9)]);
        assert_eq!(loader.ensure_image(&cloud, false), None);
    }
}
