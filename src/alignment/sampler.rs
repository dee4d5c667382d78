//! Position-stratified down-sampling of dense regions.
//!
//! Uniform sampling over a skewed read distribution starves sparse parts of
//! the interval. The sampler instead splits the span of start positions into
//! equal-width strata and takes a fixed quota from every occupied stratum.
//! An overfull selection is trimmed from the fullest strata first, a short
//! one is topped up from the leftover pool, and the result is shuffled.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::alignment::types::Read;

/// Default number of strata.
pub const DEFAULT_STRATA: usize = 100;

/// Anything with a reference coordinate the sampler can stratify on.
pub trait Positioned {
    /// Coordinate used for stratification.
    fn position(&self) -> u64;
}

impl Positioned for Read {
    fn position(&self) -> u64 {
        self.start
    }
}

impl Positioned for u64 {
    fn position(&self) -> u64 {
        *self
    }
}

/// Stratified sampler.
#[derive(Debug, Clone, Copy)]
pub struct RegionSampler {
    strata: usize,
}

impl Default for RegionSampler {
    fn default() -> Self {
        Self::new(DEFAULT_STRATA)
    }
}

impl RegionSampler {
    /// Sampler with `strata` equal-width strata (at least one).
    pub fn new(strata: usize) -> Self {
        Self {
            strata: strata.max(1),
        }
    }

    /// Number of strata.
    pub fn strata(&self) -> usize {
        self.strata
    }

    /// Stratum index of `position` for the span `[min_pos, max_pos]`.
    ///
    /// Positions past the last boundary are clamped into the last stratum.
    pub fn stratum_of(&self, position: u64, min_pos: u64, max_pos: u64) -> usize {
        let span = max_pos.saturating_sub(min_pos);
        if span == 0 {
            return 0;
        }
        let width = span as f64 / self.strata as f64;
        let index = (position.saturating_sub(min_pos) as f64 / width) as usize;
        index.min(self.strata - 1)
    }

    /// Reduce `items` to at most `target_size` while keeping every occupied
    /// stratum represented.
    ///
    /// Inputs no larger than `target_size` are returned unchanged.
    pub fn sample<T, R>(&self, items: Vec<T>, target_size: usize, rng: &mut R) -> Vec<T>
    where
        T: Positioned,
        R: Rng + ?Sized,
    {
        if items.len() <= target_size {
            return items;
        }
        if target_size == 0 {
            return Vec::new();
        }

        let (min_pos, max_pos) = items
            .iter()
            .map(Positioned::position)
            .fold((u64::MAX, u64::MIN), |(lo, hi), pos| (lo.min(pos), hi.max(pos)));

        let mut buckets: Vec<Vec<usize>> = vec![Vec::new(); self.strata];
        for (idx, item) in items.iter().enumerate() {
            buckets[self.stratum_of(item.position(), min_pos, max_pos)].push(idx);
        }

        let quota = target_size.div_ceil(self.strata);
        let mut groups: Vec<Vec<usize>> = buckets
            .iter_mut()
            .filter(|bucket| !bucket.is_empty())
            .map(|bucket| {
                let take = quota.min(bucket.len());
                partial_shuffle(bucket, take, rng);
                bucket[..take].to_vec()
            })
            .collect();
        trim_largest_first(&mut groups, target_size, rng);

        let mut picks: Vec<usize> = groups.concat();
        if picks.len() < target_size {
            let mut selected = vec![false; items.len()];
            for &idx in &picks {
                selected[idx] = true;
            }
            let mut pool: Vec<usize> = (0..items.len()).filter(|&idx| !selected[idx]).collect();
            let take = (target_size - picks.len()).min(pool.len());
            partial_shuffle(&mut pool, take, rng);
            picks.extend_from_slice(&pool[..take]);
        }

        picks.shuffle(rng);

        let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
        picks
            .into_iter()
            .filter_map(|idx| slots[idx].take())
            .collect()
    }
}

/// Drop picks one at a time from the fullest stratum until at most `target`
/// remain. A stratum only empties once every other stratum is down to one
/// pick, which requires `target` below the number of occupied strata.
fn trim_largest_first<R: Rng + ?Sized>(groups: &mut [Vec<usize>], target: usize, rng: &mut R) {
    let mut total: usize = groups.iter().map(Vec::len).sum();
    if total <= target {
        return;
    }

    // Random visiting order so ties do not always hit the same strata.
    let mut order: Vec<usize> = (0..groups.len()).collect();
    order.shuffle(rng);
    while total > target {
        let Some(&fullest) = order.iter().max_by_key(|&&group| groups[group].len()) else {
            break;
        };
        // Each group is already a random subset, so dropping its tail stays uniform.
        groups[fullest].pop();
        total -= 1;
    }
}

/// Fisher–Yates restricted to the first `count` slots: afterwards
/// `items[..count]` is a uniform random subset of `items`.
fn partial_shuffle<T, R: Rng + ?Sized>(items: &mut [T], count: usize, rng: &mut R) {
    let len = items.len();
    for i in 0..count.min(len) {
        let j = rng.random_range(i..len);
        items.swap(i, j);
    }
}
