use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const LATEST_CATALOG_FILE: &str = "actors-latest.json";
pub const FULL_CATALOG_FILE: &str = "actors.json";
pub const DEFAULT_FULL_CATALOG_EVERY: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogVersion {
    Latest,
    Full,
}

impl CatalogVersion {
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Latest => LATEST_CATALOG_FILE,
            Self::Full => FULL_CATALOG_FILE,
        }
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("malformed {file}: {source}")]
    Malformed {
        file: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Kinds and their flavors, in the order the server listed them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CatalogSnapshot {
    #[serde(deserialize_with = "ordered_kinds")]
    actors: Vec<(String, Vec<String>)>,
}

impl CatalogSnapshot {
    pub fn from_pairs<K, F, I>(kinds: I) -> Self
    where
        K: Into<String>,
        F: Into<String>,
        I: IntoIterator<Item = (K, Vec<F>)>,
    {
        Self {
            actors: kinds
                .into_iter()
                .map(|(kind, flavors)| {
                    (kind.into(), flavors.into_iter().map(Into::into).collect())
                })
                .collect(),
        }
    }

    pub fn parse(version: CatalogVersion, text: &str) -> Result<Self, CatalogError> {
        serde_json::from_str(text).map_err(|source| CatalogError::Malformed {
            file: version.file_name(),
            source,
        })
    }

    pub fn kinds(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.actors
            .iter()
            .map(|(kind, flavors)| (kind.as_str(), flavors.as_slice()))
    }

    pub fn flavors(&self, kind: &str) -> Option<&[String]> {
        self.actors
            .iter()
            .find(|(name, _)| name == kind)
            .map(|(_, flavors)| flavors.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.actors.iter().all(|(_, flavors)| flavors.is_empty())
    }
}

fn ordered_kinds<'de, D>(deserializer: D) -> Result<Vec<(String, Vec<String>)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct KindsVisitor;

    impl<'de> Visitor<'de> for KindsVisitor {
        type Value = Vec<(String, Vec<String>)>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a map from actor kind to a list of flavors")
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut kinds: Vec<(String, Vec<String>)> =
                Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((kind, flavors)) = map.next_entry::<String, Vec<String>>()? {
                match kinds.iter_mut().find(|entry| entry.0 == kind) {
                    Some(entry) => entry.1 = flavors,
                    None => kinds.push((kind, flavors)),
                }
            }
            Ok(kinds)
        }
    }

    deserializer.deserialize_map(KindsVisitor)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogUpdate {
    Replaced,
    /// Both catalogs are present for the first time. Reported at most once.
    BecameReady,
    Rejected,
}

/// The two independently refreshed catalogs.
#[derive(Debug)]
pub struct ConfigCatalog {
    latest: Option<CatalogSnapshot>,
    full: Option<CatalogSnapshot>,
    fetches: u32,
    full_every: u32,
    ready_reported: bool,
}

impl Default for ConfigCatalog {
    fn default() -> Self {
        Self::new(DEFAULT_FULL_CATALOG_EVERY)
    }
}

impl ConfigCatalog {
    pub fn new(full_every: u32) -> Self {
        Self {
            latest: None,
            full: None,
            fetches: 0,
            full_every: full_every.max(1),
            ready_reported: false,
        }
    }

    /// Returns the catalogs that should be fetched now.
    ///
    /// Skipped reloads while loading is blocked still advance the call counter,
    /// so the full catalog cadence counts calls rather than fetches.
    pub fn refresh(&mut self, force: bool, loading_blocked: bool) -> Vec<CatalogVersion> {
        let call = self.fetches;
        self.fetches = self.fetches.wrapping_add(1);
        if loading_blocked && !force {
            debug!(call, "catalog_refresh_skipped_loading_blocked");
            return Vec::new();
        }

        let mut versions = vec![CatalogVersion::Latest];
        if call % self.full_every == 0 {
            versions.push(CatalogVersion::Full);
        }
        versions
    }

    pub fn apply_fetched<E: fmt::Display>(
        &mut self,
        version: CatalogVersion,
        fetched: Result<&str, E>,
    ) -> CatalogUpdate {
        let text = match fetched {
            Ok(text) => text,
            Err(error) => {
                warn!(file = version.file_name(), error = %error, "catalog_fetch_failed");
                return CatalogUpdate::Rejected;
            }
        };
        let snapshot = match CatalogSnapshot::parse(version, text) {
            Ok(snapshot) => snapshot,
            Err(error) => {
                warn!(error = %error, "catalog_rejected");
                return CatalogUpdate::Rejected;
            }
        };

        let was_ready = self.is_ready();
        match version {
            CatalogVersion::Latest => self.latest = Some(snapshot),
            CatalogVersion::Full => self.full = Some(snapshot),
        }

        if !was_ready && self.is_ready() && !self.ready_reported {
            self.ready_reported = true;
            info!("catalog_ready");
            return CatalogUpdate::BecameReady;
        }
        CatalogUpdate::Replaced
    }

    pub fn is_ready(&self) -> bool {
        self.latest.is_some() && self.full.is_some()
    }

    pub fn latest(&self) -> Option<&CatalogSnapshot> {
        self.latest.as_ref()
    }

    pub fn full(&self) -> Option<&CatalogSnapshot> {
        self.full.as_ref()
    }

    pub fn get(&self, version: CatalogVersion) -> Option<&CatalogSnapshot> {
        match version {
            CatalogVersion::Latest => self.latest(),
            CatalogVersion::Full => self.full(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BIRDS: &str = r#"{"actors": {"Bird": ["red", "blue"], "Cat": ["sample"]}}"#;

    fn ok(text: &str) -> Result<&str, String> {
        Ok(text)
    }

    #[test]
    fn parse_keeps_server_order() {
        let snapshot = CatalogSnapshot::parse(
            CatalogVersion::Latest,
            r#"{"actors": {"Zebra": ["a"], "Ant": ["b", "c"]}}"#,
        )
        .expect("parse");
        let kinds: Vec<&str> = snapshot.kinds().map(|(kind, _)| kind).collect();
        assert_eq!(kinds, vec!["Zebra", "Ant"]);
        assert_eq!(
            snapshot.flavors("Ant"),
            Some(&["b".to_string(), "c".to_string()][..])
        );
    }

    #[test]
    fn refresh_fetches_full_every_tenth_call() {
        let mut catalog = ConfigCatalog::default();
        let calls: Vec<Vec<CatalogVersion>> =
            (0..21).map(|_| catalog.refresh(false, false)).collect();
        for (idx, versions) in calls.iter().enumerate() {
            let expects_full = idx % 10 == 0;
            assert_eq!(versions.contains(&CatalogVersion::Full), expects_full, "call={idx}");
            assert!(versions.contains(&CatalogVersion::Latest), "call={idx}");
        }
    }

    #[test]
    fn blocked_refresh_is_noop_unless_forced_but_counts() {
        let mut catalog = ConfigCatalog::default();
        assert!(catalog.refresh(false, true).is_empty());
        let forced = catalog.refresh(true, true);
        assert_eq!(forced, vec![CatalogVersion::Latest]);
    }

    #[test]
    fn ready_fires_once_when_both_present() {
        let mut catalog = ConfigCatalog::default();
        assert_eq!(
            catalog.apply_fetched(CatalogVersion::Latest, ok(BIRDS)),
            CatalogUpdate::Replaced
        );
        assert!(!catalog.is_ready());
        assert_eq!(
            catalog.apply_fetched(CatalogVersion::Full, ok(BIRDS)),
            CatalogUpdate::BecameReady
        );
        assert_eq!(
            catalog.apply_fetched(CatalogVersion::Full, ok(BIRDS)),
            CatalogUpdate::Replaced
        );
        assert_eq!(
            catalog.apply_fetched(CatalogVersion::Latest, ok(BIRDS)),
            CatalogUpdate::Replaced
        );
    }

    #[test]
    fn failed_or_malformed_fetch_leaves_snapshot_untouched() {
        let mut catalog = ConfigCatalog::default();
        catalog.apply_fetched(CatalogVersion::Latest, ok(BIRDS));
        let before = catalog.latest().cloned();

        let failed: Result<&str, String> = Err("connection reset".to_string());
        assert_eq!(
            catalog.apply_fetched(CatalogVersion::Latest, failed),
            CatalogUpdate::Rejected
        );
        assert_eq!(
            catalog.apply_fetched(CatalogVersion::Latest, ok("{\"actors\": [1, 2")),
            CatalogUpdate::Rejected
        );
        assert_eq!(catalog.latest().cloned(), before);
        assert!(catalog.full().is_none());
    }
}
