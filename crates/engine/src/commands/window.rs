pub const DEFAULT_RECENT_COMMAND_CAPACITY: usize = 10;

/// Fixed-size ring of the most recently seen command identifiers.
///
/// Used for membership only. Recording into a full window overwrites the
/// oldest identifier.
#[derive(Debug, Clone)]
pub struct RecentCommandWindow {
    slots: Vec<Option<String>>,
    next: usize,
}

impl Default for RecentCommandWindow {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_RECENT_COMMAND_CAPACITY)
    }
}

impl RecentCommandWindow {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity.max(1)],
            next: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.slots
            .iter()
            .any(|slot| slot.as_deref() == Some(identifier))
    }

    /// Identifiers that are missing or blank are always treated as new.
    pub fn is_new(&self, identifier: Option<&str>) -> bool {
        match identifier {
            None | Some("") => true,
            Some(identifier) => !self.contains(identifier),
        }
    }

    /// Returns true if the identifier was recorded. Blank and already present
    /// identifiers are not recorded again.
    pub fn record(&mut self, identifier: Option<&str>) -> bool {
        let identifier = match identifier {
            None | Some("") => return false,
            Some(identifier) => identifier,
        };
        if self.contains(identifier) {
            return false;
        }
        self.slots[self.next] = Some(identifier.to_string());
        self.next = (self.next + 1) % self.slots.len();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_forgets_oldest_after_capacity() {
        let mut window = RecentCommandWindow::default();
        let ids: Vec<String> = (0..15).map(|idx| format!("uuid-{idx}")).collect();
        for id in &ids {
            assert!(window.record(Some(id)));
        }
        assert_eq!(window.len(), 10);
        for id in &ids[..5] {
            assert!(window.is_new(Some(id)), "id={id}");
        }
        for id in &ids[5..] {
            assert!(!window.is_new(Some(id)), "id={id}");
        }
    }

    #[test]
    fn duplicates_do_not_push_out_older_entries() {
        let mut window = RecentCommandWindow::with_capacity(2);
        assert!(window.record(Some("a")));
        assert!(window.record(Some("b")));
        assert!(!window.record(Some("b")));
        assert!(!window.is_new(Some("a")));
        assert!(window.record(Some("c")));
        assert!(window.is_new(Some("a")));
        assert!(!window.is_new(Some("b")));
    }

    #[test]
    fn blank_identifiers_are_always_new_and_never_stored() {
        let mut window = RecentCommandWindow::default();
        assert!(window.is_new(None));
        assert!(window.is_new(Some("")));
        assert!(!window.record(None));
        assert!(!window.record(Some("")));
        assert!(window.is_empty());
    }
}
