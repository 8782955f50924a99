//! Size-proportional shard selection via Vose's alias method.
//!
//! The eviction loop wants to draw a shard with probability proportional to
//! its population, many times per call, without walking the shard array per
//! draw. The alias method gives O(1) draws after an O(B) table build; the
//! table is rebuilt once per `evict()` call, not per draw, which amortizes
//! the build across up to `candidates × items_to_prune` samples.

/// Classification tolerance: a scaled probability within `EPSILON` of 1 is
/// treated as exact.
const EPSILON: f64 = 1e-7;

/// Vose alias table over shard populations.
pub(crate) struct AliasTable {
    /// Scaled acceptance probability per column.
    prob: Vec<f64>,
    /// Fallback column when the acceptance test fails. Initialized to the
    /// identity so float residue left by the pairing loop self-aliases
    /// instead of pointing nowhere.
    alias: Vec<usize>,
}

impl AliasTable {
    /// Builds the table in O(B) for the given shard populations.
    ///
    /// An all-empty population set (possible transiently when racing inserts
    /// keep `size` above budget while shards drain) yields a uniform table;
    /// the draws then land on empty shards and produce no candidates, which
    /// the eviction loop tolerates.
    pub(crate) fn build(populations: &[usize]) -> Self {
        let n = populations.len();
        let total: usize = populations.iter().sum();
        let mut alias: Vec<usize> = (0..n).collect();
        if total == 0 {
            return AliasTable {
                prob: vec![1.0; n],
                alias,
            };
        }

        let mut prob: Vec<f64> = populations
            .iter()
            .map(|&p| n as f64 * p as f64 / total as f64)
            .collect();

        let mut overfull: Vec<usize> = Vec::new();
        let mut underfull: Vec<usize> = Vec::new();
        for (i, &u) in prob.iter().enumerate() {
            if u - 1.0 > EPSILON {
                overfull.push(i);
            } else if u < 1.0 - EPSILON {
                underfull.push(i);
            }
        }

        // Pair one overfull column with one underfull column at a time; the
        // donor keeps whatever mass the acceptance test leaves behind.
        loop {
            let Some(j) = underfull.pop() else { break };
            let Some(&i) = overfull.last() else { break };
            alias[j] = i;
            prob[i] += prob[j] - 1.0;
            if prob[i] - 1.0 <= EPSILON {
                overfull.pop();
                if prob[i] < 1.0 - EPSILON {
                    underfull.push(i);
                }
            }
        }

        AliasTable { prob, alias }
    }

    /// Draws a shard index from `x ∈ [0, 1)`.
    ///
    /// One uniform drives both the column choice and the acceptance test:
    /// `i = min(⌊B·x⌋, B−1)`, `y = B·x − i`, returning `i` when
    /// `y < prob[i]` and `alias[i]` otherwise. The `min` clamp keeps an
    /// `x` rounding up to 1.0 in bounds.
    #[inline]
    pub(crate) fn sample(&self, x: f64) -> usize {
        let n = self.prob.len();
        let scaled = n as f64 * x;
        let i = (scaled as usize).min(n - 1);
        let y = scaled - i as f64;
        if y < self.prob[i] {
            i
        } else {
            self.alias[i]
        }
    }
}
