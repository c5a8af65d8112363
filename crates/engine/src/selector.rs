use std::collections::{HashMap, HashSet};
use std::fmt;

use rand::Rng;

use crate::catalog::{CatalogSnapshot, CatalogVersion, ConfigCatalog};

/// Placeholder flavor shipped with every kind. Never counts as a real scan.
pub const SAMPLE_FLAVOR: &str = "sample";

/// Chance of drawing from the full catalog instead of the latest one.
pub const FULL_CATALOG_PICK_PROBABILITY: f64 = 0.3;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActorSpec {
    pub kind: String,
    pub flavor: String,
}

impl ActorSpec {
    pub fn new(kind: impl Into<String>, flavor: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            flavor: flavor.into(),
        }
    }

    pub fn is_sample(&self) -> bool {
        self.flavor == SAMPLE_FLAVOR
    }
}

impl fmt::Display for ActorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.kind, self.flavor)
    }
}

/// Flavors already offered during this session. Only ever grows.
#[derive(Debug, Default, Clone)]
pub struct TriedSet {
    tried: HashMap<String, HashSet<String>>,
}

impl TriedSet {
    pub fn mark_tried(&mut self, kind: &str, flavor: &str) {
        if flavor == SAMPLE_FLAVOR {
            return;
        }
        self.tried
            .entry(kind.to_string())
            .or_default()
            .insert(flavor.to_string());
    }

    pub fn contains(&self, kind: &str, flavor: &str) -> bool {
        self.tried
            .get(kind)
            .is_some_and(|flavors| flavors.contains(flavor))
    }

    pub fn len(&self) -> usize {
        self.tried.values().map(HashSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CandidatePools {
    pub samples: Vec<ActorSpec>,
    pub all_proper: Vec<ActorSpec>,
    pub untried_proper: Vec<ActorSpec>,
    pub untried_firsts_proper: Vec<ActorSpec>,
}

impl CandidatePools {
    pub fn partition(snapshot: Option<&CatalogSnapshot>, tried: &TriedSet) -> Self {
        let mut pools = Self::default();
        let Some(snapshot) = snapshot else {
            return pools;
        };

        for (kind, flavors) in snapshot.kinds() {
            for (position, flavor) in flavors.iter().enumerate() {
                let spec = ActorSpec::new(kind, flavor.as_str());
                if spec.is_sample() {
                    pools.samples.push(spec);
                    continue;
                }
                if !tried.contains(kind, flavor) {
                    if position == 0 {
                        pools.untried_firsts_proper.push(spec.clone());
                    }
                    pools.untried_proper.push(spec.clone());
                }
                pools.all_proper.push(spec);
            }
        }
        pools
    }

    /// First non-empty pool in priority order.
    pub fn candidates(&self, force_untried: bool) -> &[ActorSpec] {
        let untried: &[ActorSpec] = if force_untried {
            &self.untried_proper
        } else {
            &[]
        };
        [
            self.untried_firsts_proper.as_slice(),
            untried,
            self.all_proper.as_slice(),
            self.samples.as_slice(),
        ]
        .into_iter()
        .find(|pool| !pool.is_empty())
        .unwrap_or(&[])
    }
}

pub fn pick_from<R: Rng + ?Sized>(
    snapshot: Option<&CatalogSnapshot>,
    tried: &TriedSet,
    force_untried: bool,
    rng: &mut R,
) -> Option<ActorSpec> {
    let pools = CandidatePools::partition(snapshot, tried);
    let candidates = pools.candidates(force_untried);
    uniform_index(candidates.len(), rng).map(|index| candidates[index].clone())
}

/// Picks the next automatic spawn, biased toward freshly scanned content.
pub fn pick_next<R: Rng + ?Sized>(
    catalog: &ConfigCatalog,
    tried: &TriedSet,
    rng: &mut R,
) -> Option<ActorSpec> {
    let (version, force_untried) = if rng.gen::<f64>() < FULL_CATALOG_PICK_PROBABILITY {
        (CatalogVersion::Full, false)
    } else {
        (CatalogVersion::Latest, true)
    };
    pick_from(catalog.get(version), tried, force_untried, rng)
}

/// `floor(U(0,1) * len)`, clamped so a roll at the upper edge stays in range.
pub(crate) fn uniform_index<R: Rng + ?Sized>(len: usize, rng: &mut R) -> Option<usize> {
    if len == 0 {
        return None;
    }
    let roll: f64 = rng.gen();
    let index = (roll * len as f64).floor() as usize;
    Some(index.min(len - 1))
}

#[cfg(test)]
mod tests {
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    use super::*;

    fn birds_and_cat() -> CatalogSnapshot {
        CatalogSnapshot::from_pairs(vec![
            ("Bird", vec!["red", "blue"]),
            ("Cat", vec!["sample"]),
        ])
    }

    #[test]
    fn untried_firsts_win_on_fresh_session() {
        let snapshot = birds_and_cat();
        let tried = TriedSet::default();
        let pools = CandidatePools::partition(Some(&snapshot), &tried);
        assert_eq!(pools.untried_firsts_proper, vec![ActorSpec::new("Bird", "red")]);
        for seed in 0..32 {
            let mut rng = SmallRng::seed_from_u64(seed);
            assert_eq!(
                pick_from(Some(&snapshot), &tried, true, &mut rng),
                Some(ActorSpec::new("Bird", "red"))
            );
        }
    }

    #[test]
    fn fully_tried_catalog_falls_back_to_all_proper() {
        let snapshot = birds_and_cat();
        let mut tried = TriedSet::default();
        tried.mark_tried("Bird", "red");
        tried.mark_tried("Bird", "blue");
        let pools = CandidatePools::partition(Some(&snapshot), &tried);
        assert!(pools.untried_firsts_proper.is_empty());
        assert!(pools.untried_proper.is_empty());
        assert_eq!(
            pools.candidates(true),
            &[ActorSpec::new("Bird", "red"), ActorSpec::new("Bird", "blue")]
        );
        for seed in 0..64 {
            let mut rng = SmallRng::seed_from_u64(seed);
            let picked = pick_from(Some(&snapshot), &tried, true, &mut rng).expect("pick");
            assert_eq!(picked.kind, "Bird");
            assert!(!picked.is_sample());
        }
    }

    #[test]
    fn untried_non_first_only_used_when_forced() {
        let snapshot = birds_and_cat();
        let mut tried = TriedSet::default();
        tried.mark_tried("Bird", "red");
        let pools = CandidatePools::partition(Some(&snapshot), &tried);
        assert_eq!(pools.candidates(true), &[ActorSpec::new("Bird", "blue")]);
        assert_eq!(pools.candidates(false).len(), 2);
    }

    #[test]
    fn samples_are_last_resort_and_never_tried() {
        let snapshot = CatalogSnapshot::from_pairs(vec![("Cat", vec!["sample"])]);
        let mut tried = TriedSet::default();
        tried.mark_tried("Cat", SAMPLE_FLAVOR);
        assert!(tried.is_empty());

        let pools = CandidatePools::partition(Some(&snapshot), &tried);
        assert!(pools.all_proper.is_empty());
        assert!(pools.untried_proper.is_empty());
        assert!(pools.untried_firsts_proper.is_empty());
        let mut rng = SmallRng::seed_from_u64(7);
        assert_eq!(
            pick_from(Some(&snapshot), &tried, true, &mut rng),
            Some(ActorSpec::new("Cat", "sample"))
        );
    }

    #[test]
    fn absent_or_empty_catalog_yields_no_candidate() {
        let tried = TriedSet::default();
        let mut rng = SmallRng::seed_from_u64(1);
        assert_eq!(pick_from(None, &tried, true, &mut rng), None);
        let empty = CatalogSnapshot::from_pairs(vec![("Bird", Vec::<String>::new())]);
        assert_eq!(pick_from(Some(&empty), &tried, false, &mut rng), None);

        let catalog = ConfigCatalog::default();
        assert_eq!(pick_next(&catalog, &tried, &mut rng), None);
    }

    #[test]
    fn pick_next_reaches_both_catalogs() {
        let mut catalog = ConfigCatalog::default();
        catalog.apply_fetched::<String>(CatalogVersion::Latest, Ok(r#"{"actors": {"New": ["a"]}}"#));
        catalog.apply_fetched::<String>(CatalogVersion::Full, Ok(r#"{"actors": {"Old": ["b"]}}"#));
        let tried = TriedSet::default();
        let mut rng = SmallRng::seed_from_u64(42);
        let mut seen_new = 0;
        let mut seen_old = 0;
        for _ in 0..400 {
            match pick_next(&catalog, &tried, &mut rng).expect("pick").kind.as_str() {
                "New" => seen_new += 1,
                "Old" => seen_old += 1,
                other => panic!("unexpected kind {other}"),
            }
        }
        assert!(seen_new > seen_old, "new={seen_new} old={seen_old}");
        assert!(seen_old > 40, "old={seen_old}");
    }

    #[test]
    fn uniform_index_stays_in_range() {
        let mut rng = SmallRng::seed_from_u64(3);
        assert_eq!(uniform_index(0, &mut rng), None);
        for _ in 0..1000 {
            let index = uniform_index(3, &mut rng).expect("index");
            assert!(index < 3);
        }
    }
}
