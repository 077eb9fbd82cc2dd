use std::fmt;

use serde_json::Value;

/// Canonical identifier of a backend processing phase.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StageKey(String);

impl StageKey {
    pub const UNKNOWN: &'static str = "unknown";

    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into().trim().to_ascii_lowercase();
        if key.is_empty() {
            Self::unknown()
        } else {
            Self(key)
        }
    }

    pub fn unknown() -> Self {
        Self(Self::UNKNOWN.to_string())
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == Self::UNKNOWN
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StageKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// How an update ends the job, if it does.
#[derive(Debug, Clone, PartialEq)]
pub enum Terminal {
    Success { result: Option<Value> },
    Failure { detail: String },
}

/// One normalized observation of job state.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub stage_key: StageKey,
    pub label: String,
    pub icon: &'static str,
    /// Always within `[0, 1]`.
    pub fraction_complete: f64,
    pub terminal: Option<Terminal>,
}

impl ProgressUpdate {
    pub fn in_progress(
        stage_key: StageKey,
        label: impl Into<String>,
        icon: &'static str,
        fraction: f64,
    ) -> Self {
        Self {
            stage_key,
            label: label.into(),
            icon,
            fraction_complete: clamp_fraction(fraction),
            terminal: None,
        }
    }

    /// Fallback for text that matches no known convention.
    pub fn unrecognized(raw: &str) -> Self {
        Self::in_progress(StageKey::unknown(), raw, "", 0.0)
    }

    pub fn success(label: impl Into<String>, result: Option<Value>) -> Self {
        Self {
            stage_key: StageKey::new("complete"),
            label: label.into(),
            icon: "",
            fraction_complete: 1.0,
            terminal: Some(Terminal::Success { result }),
        }
    }

    pub fn failure(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        Self {
            stage_key: StageKey::new("error"),
            label: detail.clone(),
            icon: "",
            fraction_complete: 0.0,
            terminal: Some(Terminal::Failure { detail }),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal.is_some()
    }

    pub fn error_detail(&self) -> Option<&str> {
        match &self.terminal {
            Some(Terminal::Failure { detail }) => Some(detail),
            _ => None,
        }
    }
}

pub(crate) fn clamp_fraction(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// `current / total`, clamped; `None` when `total` is zero.
pub(crate) fn ratio(current: u64, total: u64) -> Option<f64> {
    if total == 0 {
        None
    } else {
        Some(clamp_fraction(current as f64 / total as f64))
    }
}
