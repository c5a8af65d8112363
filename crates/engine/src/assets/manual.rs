use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use super::{AssetCompletion, AssetError, AssetPayload, AssetRequest, AssetSource, Texture};

#[derive(Debug, Default)]
struct ManualState {
    issued: Vec<AssetRequest>,
    ready: VecDeque<AssetCompletion>,
}

/// In-memory source whose completions are delivered by hand.
///
/// Clones share state, so a test can keep one handle while the runtime owns
/// another and complete loads in whatever order a scenario needs.
#[derive(Debug, Clone, Default)]
pub struct ManualAssetSource {
    state: Rc<RefCell<ManualState>>,
}

impl ManualAssetSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issued(&self) -> Vec<AssetRequest> {
        self.state.borrow().issued.clone()
    }

    pub fn issued_count(&self, request: &AssetRequest) -> usize {
        self.state
            .borrow()
            .issued
            .iter()
            .filter(|issued| *issued == request)
            .count()
    }

    pub fn complete(&self, request: AssetRequest, result: Result<AssetPayload, AssetError>) {
        self.state
            .borrow_mut()
            .ready
            .push_back(AssetCompletion { request, result });
    }

    pub fn complete_text(&self, request: AssetRequest, text: impl Into<String>) {
        self.complete(request, Ok(AssetPayload::Text(text.into())));
    }

    pub fn complete_texture(&self, request: AssetRequest, texture: Texture) {
        self.complete(request, Ok(AssetPayload::Texture(texture)));
    }

    pub fn fail(&self, request: AssetRequest, reason: impl Into<String>) {
        self.complete(request, Err(AssetError::Unavailable(reason.into())));
    }
}

impl AssetSource for ManualAssetSource {
    fn request(&mut self, request: AssetRequest) {
        self.state.borrow_mut().issued.push(request);
    }

    fn poll_completed(&mut self) -> Vec<AssetCompletion> {
        self.state.borrow_mut().ready.drain(..).collect()
    }
}
