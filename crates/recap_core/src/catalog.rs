//! Static lookup of the backend's processing phases.
//!
//! Each known phase owns a fixed slice `[base, base + weight)` of the overall
//! timeline. Aliases used by different backends share a slice.

use crate::progress::{clamp_fraction, StageKey};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageInfo {
    pub key: &'static str,
    pub label: &'static str,
    pub icon: &'static str,
    pub base: f64,
    pub weight: f64,
}

impl StageInfo {
    /// Overall fraction for `sub` progress (`0..=1`) within this phase.
    pub fn overall(&self, sub: f64) -> f64 {
        clamp_fraction(self.base + clamp_fraction(sub) * self.weight)
    }
}

pub const UPLOAD_STAGE: &str = "upload";

const STAGES: &[StageInfo] = &[
    StageInfo { key: UPLOAD_STAGE, label: "Uploading archive", icon: "⬆️", base: 0.00, weight: 0.10 },
    StageInfo { key: "starting", label: "Starting analysis", icon: "🚀", base: 0.10, weight: 0.02 },
    StageInfo { key: "extracting", label: "Extracting archive", icon: "📦", base: 0.12, weight: 0.03 },
    StageInfo { key: "extract", label: "Extracting archive", icon: "📦", base: 0.12, weight: 0.03 },
    StageInfo { key: "loading", label: "Reading your film log", icon: "📄", base: 0.15, weight: 0.03 },
    StageInfo { key: "processing", label: "Collecting unique films", icon: "🎞️", base: 0.18, weight: 0.02 },
    StageInfo { key: "tmdb_matching", label: "Matching films", icon: "🔎", base: 0.20, weight: 0.25 },
    StageInfo { key: "tmdb_metadata", label: "Gathering film metadata", icon: "🎬", base: 0.45, weight: 0.45 },
    StageInfo { key: "enrich", label: "Gathering film metadata", icon: "🎬", base: 0.45, weight: 0.45 },
    StageInfo { key: "analyzing", label: "Crunching statistics", icon: "📊", base: 0.90, weight: 0.10 },
    StageInfo { key: "aggregate", label: "Crunching statistics", icon: "📊", base: 0.90, weight: 0.10 },
];

pub fn lookup(key: &StageKey) -> Option<&'static StageInfo> {
    STAGES.iter().find(|info| info.key == key.as_str())
}

/// Display label for a stage, falling back to the raw sub-message.
pub fn label_for(key: &StageKey, fallback: &str) -> String {
    match lookup(key) {
        Some(info) => info.label.to_string(),
        None if !fallback.trim().is_empty() => fallback.trim().to_string(),
        None => key.as_str().to_string(),
    }
}

pub fn icon_for(key: &StageKey) -> &'static str {
    lookup(key).map_or("", |info| info.icon)
}
