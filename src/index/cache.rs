//! Breakpoint cache for time → sample index searches
//!
//! Each cache remembers samples it has already located as `(time, index)`
//! breakpoints. A new query is first bracketed by the nearest breakpoints
//! on either side of it, and the binary search over stored times only runs
//! inside that bracket.
//!
//! Stored times are append-only, so a breakpoint never goes stale: it stays
//! true when the clock grows. The cache is reset wholesale once it reaches
//! its capacity.

use crate::index::Bias;
use crate::storage::error::StoreResult;

/// Sorted breakpoints for one clock and one search direction
#[derive(Debug, Clone)]
pub struct IndexCache {
    bias: Bias,
    /// `(time(index), index)`, ascending by index
    breakpoints: Vec<(f64, i64)>,
    capacity: usize,
    probes: u64,
}

impl IndexCache {
    pub fn new(bias: Bias, capacity: usize) -> Self {
        Self {
            bias,
            breakpoints: Vec::new(),
            capacity: capacity.max(1),
            probes: 0,
        }
    }

    pub fn bias(&self) -> Bias {
        self.bias
    }

    pub fn len(&self) -> usize {
        self.breakpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }

    /// Stored times read by searches so far
    pub fn probes(&self) -> u64 {
        self.probes
    }

    pub fn clear(&mut self) {
        self.breakpoints.clear();
    }

    /// Resolve `t` against `size` stored times read through `time_at`.
    ///
    /// Floor bias returns the largest `n` with `time(n) <= t`, or -1.
    /// Ceiling bias returns the smallest `n` with `time(n) >= t`, or `size`.
    pub fn find<F>(&mut self, t: f64, size: u64, mut time_at: F) -> StoreResult<i64>
    where
        F: FnMut(u64) -> StoreResult<f64>,
    {
        let size = size as i64;
        let (mut lo, mut hi) = self.bracket(t, size);

        // Invariant: lo is -1 or on the "before" side, hi is size or on the
        // "after" side.
        while hi - lo > 1 {
            let mid = lo + (hi - lo) / 2;
            let time = time_at(mid as u64)?;
            self.probes += 1;
            let before = match self.bias {
                Bias::Floor => time <= t,
                Bias::Ceiling => time < t,
            };
            if before {
                lo = mid;
            } else {
                hi = mid;
            }
        }

        let found = match self.bias {
            Bias::Floor => lo,
            Bias::Ceiling => hi,
        };
        if found >= 0 && found < size {
            let time = time_at(found as u64)?;
            self.remember(time, found);
        }
        Ok(found)
    }

    /// Tightest known `(lo, hi)` around the answer for `t`
    fn bracket(&self, t: f64, size: i64) -> (i64, i64) {
        let split = match self.bias {
            Bias::Floor => self.breakpoints.partition_point(|&(time, _)| time <= t),
            Bias::Ceiling => self.breakpoints.partition_point(|&(time, _)| time < t),
        };
        let lo = if split > 0 {
            self.breakpoints[split - 1].1
        } else {
            -1
        };
        let hi = self
            .breakpoints
            .get(split)
            .map(|&(_, index)| index)
            .filter(|&index| index < size)
            .unwrap_or(size);
        (lo.min(hi), hi)
    }

    fn remember(&mut self, time: f64, index: i64) {
        match self.breakpoints.binary_search_by_key(&index, |&(_, i)| i) {
            Ok(_) => {}
            Err(pos) => {
                if self.breakpoints.len() >= self.capacity {
                    tracing::trace!("Index cache full at {} breakpoints, resetting", self.capacity);
                    self.breakpoints.clear();
                    self.breakpoints.push((time, index));
                } else {
                    self.breakpoints.insert(pos, (time, index));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn floor_scan(times: &[f64], t: f64) -> i64 {
        times.iter().rposition(|&x| x <= t).map_or(-1, |n| n as i64)
    }

    fn ceiling_scan(times: &[f64], t: f64) -> i64 {
        times
            .iter()
            .position(|&x| x >= t)
            .map_or(times.len() as i64, |n| n as i64)
    }

    fn lookup(cache: &mut IndexCache, times: &[f64], t: f64) -> i64 {
        cache
            .find(t, times.len() as u64, |n| Ok(times[n as usize]))
            .unwrap()
    }

    fn jittered(n: usize) -> Vec<f64> {
        let mut t = 0.0;
        (0..n)
            .map(|i| {
                t += 0.001 + ((i * 7919) % 13) as f64 * 0.0005;
                t
            })
            .collect()
    }

    #[test]
    fn test_matches_linear_scan() {
        let times = jittered(500);
        let mut floor = IndexCache::new(Bias::Floor, 64);
        let mut ceiling = IndexCache::new(Bias::Ceiling, 64);

        let mut t = -0.05;
        while t < times[times.len() - 1] + 0.05 {
            assert_eq!(lookup(&mut floor, &times, t), floor_scan(&times, t), "floor at {}", t);
            assert_eq!(
                lookup(&mut ceiling, &times, t),
                ceiling_scan(&times, t),
                "ceiling at {}",
                t
            );
            t += 0.00037;
        }
    }

    #[test]
    fn test_query_order_does_not_matter() {
        let times = jittered(300);
        let queries: Vec<f64> = (0..400).map(|i| ((i * 104729) % 1000) as f64 * 0.002 - 0.1).collect();

        for bias in [Bias::Floor, Bias::Ceiling] {
            let mut cached = IndexCache::new(bias, 32);
            for &t in &queries {
                let mut fresh = IndexCache::new(bias, 32);
                assert_eq!(lookup(&mut cached, &times, t), lookup(&mut fresh, &times, t));
            }
        }
    }

    #[test]
    fn test_exact_and_repeated_times() {
        let times = [0.0, 0.5, 0.5, 0.5, 1.0];
        let mut floor = IndexCache::new(Bias::Floor, 8);
        let mut ceiling = IndexCache::new(Bias::Ceiling, 8);

        for _ in 0..2 {
            assert_eq!(lookup(&mut floor, &times, 0.5), 3);
            assert_eq!(lookup(&mut ceiling, &times, 0.5), 1);
            assert_eq!(lookup(&mut floor, &times, -1.0), -1);
            assert_eq!(lookup(&mut ceiling, &times, 2.0), 5);
            assert_eq!(lookup(&mut floor, &times, 1.0), 4);
            assert_eq!(lookup(&mut ceiling, &times, 0.0), 0);
        }
    }

    #[test]
    fn test_nearby_queries_probe_less() {
        let times: Vec<f64> = (0..1 << 16).map(|i| i as f64 * 0.004).collect();
        let mut cache = IndexCache::new(Bias::Floor, 1024);

        lookup(&mut cache, &times, 100.0);
        let first = cache.probes();
        lookup(&mut cache, &times, 100.1);
        let primed = cache.probes();
        assert_eq!(lookup(&mut cache, &times, 100.05), 25012);
        let nearby = cache.probes() - primed;

        assert!(nearby * 2 < first, "nearby {} against first {}", nearby, first);
    }

    #[test]
    fn test_capacity_resets_cache() {
        let times: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let mut cache = IndexCache::new(Bias::Ceiling, 4);
        for t in 0..10 {
            lookup(&mut cache, &times, t as f64 * 9.5);
            assert!(cache.len() <= 4);
        }
        assert_eq!(lookup(&mut cache, &times, 42.5), 43);
    }

    #[test]
    fn test_growing_clock_keeps_breakpoints_valid() {
        let mut times: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let mut cache = IndexCache::new(Bias::Ceiling, 16);
        assert_eq!(lookup(&mut cache, &times, 20.0), 10);

        times.extend((10..30).map(|i| i as f64));
        assert_eq!(lookup(&mut cache, &times, 20.0), 20);
        assert_eq!(lookup(&mut cache, &times, 4.5), 5);
    }
}
