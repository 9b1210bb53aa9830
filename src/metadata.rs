//! Metadata section: a compact JSON map between header and block index.
//!
//! The encoding is UTF-8 JSON without insignificant whitespace. The key set
//! is bounded and closed: readers reject unknown keys instead of silently
//! ignoring them, so future versions can gate new keys cleanly. The
//! histogram uses a sorted map, which keeps serialization byte-stable run
//! to run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::analyzer::{AnalysisReport, ContentClass};
use crate::error::TzpError;
use crate::index::BlockEntry;
use crate::strategy::Profile;

/// The container's self-description: the analysis report that drove the
/// plan, the profile in force, and the per-block algorithm histogram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Metadata {
    pub entropy:           f64,
    pub pattern_density:   f64,
    pub repetition_factor: f64,
    pub content_class:     ContentClass,
    pub compressibility:   f64,
    pub sample_size:       u64,
    pub profile:           Profile,
    /// Block count per algorithm name (see `Algorithm::name`).
    pub algorithms:        BTreeMap<String, u32>,
}

impl Metadata {
    /// Build the metadata map from the analysis and the finished index.
    pub fn new(report: &AnalysisReport, profile: Profile, entries: &[BlockEntry]) -> Self {
        let mut algorithms: BTreeMap<String, u32> = BTreeMap::new();
        for entry in entries {
            if let Some(algorithm) = entry.decoded_algorithm() {
                *algorithms.entry(algorithm.name().to_owned()).or_insert(0) += 1;
            }
        }
        Self {
            entropy:           report.entropy,
            pattern_density:   report.pattern_density,
            repetition_factor: report.repetition_factor,
            content_class:     report.content_class,
            compressibility:   report.compressibility,
            sample_size:       report.sample_size,
            profile,
            algorithms,
        }
    }

    /// Serialize as compact JSON.
    pub fn to_bytes(&self) -> Result<Vec<u8>, TzpError> {
        serde_json::to_vec(self).map_err(|e| TzpError::CorruptMetadata(e.to_string()))
    }

    /// Parse the metadata section, rejecting unknown keys.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TzpError> {
        serde_json::from_slice(bytes).map_err(|e| TzpError::CorruptMetadata(e.to_string()))
    }
}
