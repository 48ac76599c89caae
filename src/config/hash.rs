//! Fingerprints for parameter sets and plans.
//!
//! A parameter fingerprint identifies the input of one invocation in logs.
//! An action fingerprint summarizes a plan as its address-to-action map, so
//! two plans of the same target can be compared for drift.

use sha2::{Digest, Sha256};

use crate::params::ParameterSet;
use crate::plan::PlanGraph;

/// Hasher for computing fingerprints.
#[derive(Debug, Default)]
pub struct ConfigHasher;

impl ConfigHasher {
    /// Creates a new hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes a hash of a parameter set.
    ///
    /// Parameters are rendered as JSON with sorted keys, so the hash does
    /// not depend on construction order.
    #[must_use]
    pub fn hash_parameters(&self, params: &ParameterSet) -> String {
        let mut hasher = Sha256::new();
        hasher.update(params.to_json().to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Computes a hash of every address and its action kind.
    ///
    /// Attribute values are ignored: two plans with the same actions for
    /// the same addresses hash equal.
    #[must_use]
    pub fn hash_actions(&self, graph: &PlanGraph) -> String {
        let mut hasher = Sha256::new();
        for (address, action) in graph.actions() {
            hasher.update(address.as_bytes());
            hasher.update([0u8]);
            hasher.update(action.as_str().as_bytes());
            hasher.update([0u8]);
        }
        hex::encode(hasher.finalize())
    }

    /// Computes a short hash (first 8 characters) for display purposes.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(8).collect()
    }
}
