use std::fmt;

/// Fingerprint pair for one observation of a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprints {
    pub file_hash: String,
    pub html_hash: String,
}

/// Comparison point for a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Baseline {
    /// Never verified successfully.
    NoBaseline,
    Established(Fingerprints),
}

/// Classification of one run against the stored baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    InitialCapture,
    Unchanged,
    FileChanged,
    SpecChanged,
    BothChanged,
}

impl Outcome {
    pub fn file_changed(self) -> bool {
        matches!(self, Self::FileChanged | Self::BothChanged)
    }

    pub fn spec_changed(self) -> bool {
        matches!(self, Self::SpecChanged | Self::BothChanged)
    }

    /// Whether artifacts must be (re)written for this run.
    pub fn needs_persist(self) -> bool {
        !matches!(self, Self::Unchanged)
    }

    pub fn narrative(self) -> String {
        match self {
            Self::InitialCapture => "Initial state captured for the first time.".to_string(),
            Self::Unchanged => "No changes detected.".to_string(),
            _ => {
                let mut changes = Vec::new();
                if self.file_changed() {
                    changes.push("The datasheet file changed.");
                }
                if self.spec_changed() {
                    changes.push("The specifications section changed.");
                }
                format!("Changes detected: {}", changes.join(", "))
            }
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InitialCapture => "initial",
            Self::Unchanged => "unchanged",
            Self::FileChanged => "file-changed",
            Self::SpecChanged => "spec-changed",
            Self::BothChanged => "both-changed",
        };
        f.write_str(s)
    }
}

/// File and spec hashes are compared independently; a baseline-less run
/// never reports a change.
pub fn classify(baseline: &Baseline, current: &Fingerprints) -> Outcome {
    let stored = match baseline {
        Baseline::NoBaseline => return Outcome::InitialCapture,
        Baseline::Established(stored) => stored,
    };
    let file = stored.file_hash != current.file_hash;
    let spec = stored.html_hash != current.html_hash;
    match (file, spec) {
        (false, false) => Outcome::Unchanged,
        (true, false) => Outcome::FileChanged,
        (false, true) => Outcome::SpecChanged,
        (true, true) => Outcome::BothChanged,
    }
}
