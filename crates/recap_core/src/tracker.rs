use crate::progress::{ProgressUpdate, StageKey, Terminal};

/// What the tracker did with an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Applied,
    /// Accepted, but the fraction was lower than already recorded.
    Clamped,
    /// Tracker is frozen after a terminal update.
    Ignored,
}

/// Folds a stream of updates into monotonic, display-ready state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StageTracker {
    current_stage: Option<StageKey>,
    completed_stages: Vec<StageKey>,
    overall_fraction: f64,
    label: String,
    icon: &'static str,
    frozen: bool,
}

impl StageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, update: &ProgressUpdate) -> Applied {
        if self.frozen {
            return Applied::Ignored;
        }

        match &update.terminal {
            Some(Terminal::Success { .. }) => {
                self.overall_fraction = 1.0;
                if let Some(current) = self.current_stage.take() {
                    self.record_completed(current);
                }
                self.label = update.label.clone();
                self.icon = update.icon;
                self.frozen = true;
                return Applied::Applied;
            }
            Some(Terminal::Failure { .. }) => {
                self.frozen = true;
                return Applied::Applied;
            }
            None => {}
        }

        if !update.stage_key.is_unknown() && !self.has_seen(&update.stage_key) {
            if let Some(previous) = self.current_stage.replace(update.stage_key.clone()) {
                self.record_completed(previous);
            }
        }
        if self.current_stage.is_none() || self.current_stage.as_ref() == Some(&update.stage_key)
            || update.stage_key.is_unknown()
        {
            self.label = update.label.clone();
            self.icon = update.icon;
        }

        if update.fraction_complete < self.overall_fraction {
            Applied::Clamped
        } else {
            self.overall_fraction = update.fraction_complete;
            Applied::Applied
        }
    }

    pub fn current_stage(&self) -> Option<&StageKey> {
        self.current_stage.as_ref()
    }

    pub fn completed_stages(&self) -> &[StageKey] {
        &self.completed_stages
    }

    pub fn overall_fraction(&self) -> f64 {
        self.overall_fraction
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn icon(&self) -> &'static str {
        self.icon
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    fn has_seen(&self, key: &StageKey) -> bool {
        self.current_stage.as_ref() == Some(key) || self.completed_stages.contains(key)
    }

    fn record_completed(&mut self, key: StageKey) {
        if !self.completed_stages.contains(&key) {
            self.completed_stages.push(key);
        }
    }
}
