//! Token usage accounting.

use serde::{Deserialize, Serialize};

use crate::model::ModelCost;

/// Token usage for one assistant response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    /// Prompt tokens billed at the input rate.
    pub input: u64,
    /// Generated tokens.
    pub output: u64,
    /// Prompt tokens served from the provider cache.
    pub cache_read: u64,
    /// Prompt tokens written to the provider cache.
    pub cache_write: u64,
    /// Total tokens as reported by the provider.
    pub total: u64,
    /// Dollar cost computed from the model's pricing.
    pub cost: f64,
}

impl Usage {
    /// Merge a second snapshot into this one by taking the field-wise max.
    ///
    /// Providers may report usage in multiple frames for the same response;
    /// each frame is a cumulative snapshot, so max-merging keeps the most
    /// complete one. The contract assumes cumulative reporting and is
    /// undefined for providers that send disjoint additive deltas.
    pub fn merge_max(&mut self, other: &Usage) {
        self.input = self.input.max(other.input);
        self.output = self.output.max(other.output);
        self.cache_read = self.cache_read.max(other.cache_read);
        self.cache_write = self.cache_write.max(other.cache_write);
        self.total = self.total.max(other.total);
        self.cost = self.cost.max(other.cost);
    }

    /// Recompute [`Usage::total`] and [`Usage::cost`] from the token counts
    /// and the model's per-million pricing.
    pub fn finalize(&mut self, cost: &ModelCost) {
        if self.total == 0 {
            self.total = self.input + self.output + self.cache_read + self.cache_write;
        }
        self.cost = (self.input as f64 * cost.input
            + self.output as f64 * cost.output
            + self.cache_read as f64 * cost.cache_read
            + self.cache_write as f64 * cost.cache_write)
            / 1_000_000.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_takes_field_wise_max() {
        let mut a = Usage {
            input: 100,
            output: 5,
            cache_read: 40,
            cache_write: 0,
            total: 145,
            cost: 0.0,
        };
        let b = Usage {
            input: 100,
            output: 50,
            cache_read: 0,
            cache_write: 10,
            total: 160,
            cost: 0.0,
        };
        a.merge_max(&b);
        assert_eq!(a.input, 100);
        assert_eq!(a.output, 50);
        assert_eq!(a.cache_read, 40);
        assert_eq!(a.cache_write, 10);
        assert_eq!(a.total, 160);
    }

    #[test]
    fn finalize_computes_cost_per_million() {
        let mut usage = Usage {
            input: 1_000_000,
            output: 500_000,
            ..Default::default()
        };
        let cost = ModelCost {
            input: 3.0,
            output: 15.0,
            cache_read: 0.3,
            cache_write: 3.75,
        };
        usage.finalize(&cost);
        assert_eq!(usage.total, 1_500_000);
        assert!((usage.cost - 10.5).abs() < 1e-9);
    }
}
