use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::resources::Datastore;

/// Space every datastore keeps in reserve; never handed out to disks.
pub const DISK_HEADROOM_MB: u64 = 1024;

/// Picks one entry out of a list of weighted candidates.
///
/// Implementations return an index into `weighted`, or `None` when the list
/// is empty. Tests swap in a deterministic draw to inspect the exact
/// candidates and weights the selector produced.
pub trait WeightedDraw: Send + Sync {
    fn draw(&self, weighted: &[(&Datastore, u64)]) -> Option<usize>;
}

/// Weighted draw backed by the thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomDraw;

impl WeightedDraw for RandomDraw {
    fn draw(&self, weighted: &[(&Datastore, u64)]) -> Option<usize> {
        sample(weighted, &mut rand::thread_rng())
    }
}

/// Weighted draw from a seeded RNG, reproducible across runs.
pub struct SeededDraw {
    rng: Mutex<StdRng>,
}

impl SeededDraw {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl WeightedDraw for SeededDraw {
    fn draw(&self, weighted: &[(&Datastore, u64)]) -> Option<usize> {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        sample(weighted, &mut *rng)
    }
}

fn sample<R: Rng + ?Sized>(weighted: &[(&Datastore, u64)], rng: &mut R) -> Option<usize> {
    if weighted.is_empty() {
        return None;
    }
    match WeightedIndex::new(weighted.iter().map(|(_, weight)| *weight)) {
        Ok(index) => Some(index.sample(rng)),
        // Every candidate sits exactly on its headroom: nothing to weigh by.
        Err(_) => Some(rng.gen_range(0..weighted.len())),
    }
}

/// Capacity-weighted datastore selection.
///
/// A datastore is eligible for `required_mb` when
/// `free_space_mb - headroom_mb >= required_mb`, and eligible datastores are
/// weighted by that surplus. The selector only reads the snapshot it is
/// given; nothing is reserved, so two concurrent placements can land on the
/// same datastore.
#[derive(Clone)]
pub struct CapacitySelector {
    headroom_mb: u64,
    draw: Arc<dyn WeightedDraw>,
}

impl CapacitySelector {
    pub fn new(headroom_mb: u64) -> Self {
        Self::with_draw(headroom_mb, Arc::new(RandomDraw))
    }

    pub fn with_draw(headroom_mb: u64, draw: Arc<dyn WeightedDraw>) -> Self {
        Self { headroom_mb, draw }
    }

    pub fn headroom_mb(&self) -> u64 {
        self.headroom_mb
    }

    /// Eligible candidates paired with their surplus, in input order.
    pub fn weighted_candidates<'a, I>(
        &self,
        candidates: I,
        required_mb: u64,
    ) -> Vec<(&'a Datastore, u64)>
    where
        I: IntoIterator<Item = &'a Datastore>,
    {
        candidates
            .into_iter()
            .filter_map(|datastore| {
                datastore
                    .surplus_mb(self.headroom_mb)
                    .filter(|surplus| *surplus >= required_mb)
                    .map(|surplus| (datastore, surplus))
            })
            .collect()
    }

    /// Returns `None` when no candidate can fit `required_mb`.
    pub fn pick<'a, I>(&self, candidates: I, required_mb: u64) -> Option<&'a Datastore>
    where
        I: IntoIterator<Item = &'a Datastore>,
    {
        let weighted = self.weighted_candidates(candidates, required_mb);
        if weighted.is_empty() {
            warn!(
                required_mb,
                headroom_mb = self.headroom_mb,
                "No datastore can fit the requested size"
            );
            return None;
        }

        let index = self.draw.draw(&weighted)?;
        let Some((datastore, weight)) = weighted.get(index) else {
            warn!(
                index,
                candidates = weighted.len(),
                "Weighted draw returned an index outside the candidate list"
            );
            return None;
        };
        debug!(
            datastore = %datastore.name,
            weight,
            candidates = weighted.len(),
            required_mb,
            "Picked datastore"
        );
        Some(*datastore)
    }
}

impl Default for CapacitySelector {
    fn default() -> Self {
        Self::new(DISK_HEADROOM_MB)
    }
}

impl fmt::Debug for CapacitySelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapacitySelector")
            .field("headroom_mb", &self.headroom_mb)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::ManagedRef;
    use std::collections::HashMap;

    struct RecordingDraw {
        seen: Mutex<Vec<(String, u64)>>,
        pick: usize,
    }

    impl RecordingDraw {
        fn new(pick: usize) -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
                pick,
            }
        }
    }

    impl WeightedDraw for RecordingDraw {
        fn draw(&self, weighted: &[(&Datastore, u64)]) -> Option<usize> {
            let mut seen = self.seen.lock().unwrap();
            seen.extend(weighted.iter().map(|(ds, w)| (ds.name.clone(), *w)));
            Some(self.pick)
        }
    }

    fn datastore(name: &str, free_space_mb: u64) -> Datastore {
        Datastore::new(name, ManagedRef::new(format!("{}-ref", name)), free_space_mb)
    }

    #[test]
    fn test_weights_are_surplus_over_headroom() {
        let candidates = vec![
            datastore("ds1", 1024 + DISK_HEADROOM_MB),
            datastore("ds2", 2048 + DISK_HEADROOM_MB),
            datastore("ds3", 512 + DISK_HEADROOM_MB),
        ];
        let draw = Arc::new(RecordingDraw::new(1));
        let selector = CapacitySelector::with_draw(DISK_HEADROOM_MB, draw.clone());

        let picked = selector.pick(&candidates, 1024).unwrap();
        assert_eq!(picked.name, "ds2");

        let seen = draw.seen.lock().unwrap().clone();
        assert_eq!(seen, vec![("ds1".to_string(), 1024), ("ds2".to_string(), 2048)]);
    }

    #[test]
    fn test_exhausted_when_nothing_fits() {
        let candidates = vec![datastore("ds1", 100), datastore("ds2", DISK_HEADROOM_MB + 10)];
        let draw = Arc::new(RecordingDraw::new(0));
        let selector = CapacitySelector::with_draw(DISK_HEADROOM_MB, draw.clone());

        assert!(selector.pick(&candidates, 11).is_none());
        assert!(draw.seen.lock().unwrap().is_empty());
        assert!(selector.pick(std::iter::empty::<&Datastore>(), 1).is_none());
    }

    #[test]
    fn test_exact_fit_is_eligible() {
        let candidates = vec![datastore("ds1", DISK_HEADROOM_MB + 64)];
        let selector = CapacitySelector::new(DISK_HEADROOM_MB);
        assert_eq!(selector.pick(&candidates, 64).map(|d| d.name.as_str()), Some("ds1"));
        assert!(selector.pick(&candidates, 65).is_none());
    }

    #[test]
    fn test_out_of_range_draw_is_treated_as_exhausted() {
        let candidates = vec![datastore("ds1", DISK_HEADROOM_MB + 64)];
        let draw = Arc::new(RecordingDraw::new(5));
        let selector = CapacitySelector::with_draw(DISK_HEADROOM_MB, draw.clone());
        assert!(selector.pick(&candidates, 1).is_none());
        // The draw was consulted; the miss comes from its index, not capacity.
        assert_eq!(draw.seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_random_draw_never_offers_ineligible_datastores() {
        let candidates = vec![
            datastore("small", 100 + DISK_HEADROOM_MB),
            datastore("medium", 1000 + DISK_HEADROOM_MB),
            datastore("large", 3000 + DISK_HEADROOM_MB),
        ];
        let selector = CapacitySelector::with_draw(DISK_HEADROOM_MB, Arc::new(SeededDraw::new(7)));

        let mut counts: HashMap<String, u32> = HashMap::new();
        for _ in 0..4000 {
            let picked = selector.pick(&candidates, 500).unwrap();
            *counts.entry(picked.name.clone()).or_default() += 1;
        }

        assert!(!counts.contains_key("small"));
        // Expected split is 1000:3000.
        let medium = counts["medium"] as f64;
        let large = counts["large"] as f64;
        let ratio = large / medium;
        assert!(ratio > 2.5 && ratio < 3.5, "unexpected ratio {}", ratio);
    }

    #[test]
    fn test_zero_weights_still_pick() {
        let candidates = vec![
            datastore("ds1", DISK_HEADROOM_MB),
            datastore("ds2", DISK_HEADROOM_MB),
        ];
        let selector = CapacitySelector::with_draw(DISK_HEADROOM_MB, Arc::new(SeededDraw::new(1)));
        assert!(selector.pick(&candidates, 0).is_some());
    }
}
