//! Step identifiers and state-store bucket keys.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Highest performance step number.
pub const LAST_PERFORMANCE_STEP: u8 = 5;

/// Logical stage a step belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Participation,
    Performance,
}

/// One triggerable unit of pipeline work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StepId {
    /// Registration vs participation summary.
    Participation,
    /// Performance chain step `0..=5`.
    Performance(u8),
}

impl StepId {
    /// Every step in the order a full run executes them.
    pub const ALL: [StepId; 7] = [
        StepId::Participation,
        StepId::Performance(0),
        StepId::Performance(1),
        StepId::Performance(2),
        StepId::Performance(3),
        StepId::Performance(4),
        StepId::Performance(5),
    ];

    /// Parse `participation-0`, `performance-3`, `performance/step3` or `performance.step3`.
    pub fn parse(input: &str) -> Result<Self> {
        let s = input.trim().to_ascii_lowercase();
        let (stage, number) = s
            .split_once(['-', '/', '.'])
            .ok_or_else(|| Error::validation(format!("Unknown pipeline step: {}", input)))?;
        let number = number.strip_prefix("step").unwrap_or(number);
        let n: u8 = number
            .parse()
            .map_err(|_| Error::validation(format!("Unknown pipeline step: {}", input)))?;

        match stage {
            "participation" if n == 0 => Ok(Self::Participation),
            "performance" if n <= LAST_PERFORMANCE_STEP => Ok(Self::Performance(n)),
            _ => Err(Error::validation(format!("Unknown pipeline step: {}", input))),
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            Self::Participation => Stage::Participation,
            Self::Performance(_) => Stage::Performance,
        }
    }

    /// Step number within its stage.
    pub fn number(&self) -> u8 {
        match self {
            Self::Participation => 0,
            Self::Performance(n) => *n,
        }
    }

    /// Key in the flag store, e.g. `performance.step3`.
    pub fn flag_key(&self) -> String {
        format!("{}.step{}", self.stage(), self.number())
    }

    /// File stem of the durable snapshot export.
    pub fn snapshot_name(&self) -> &'static str {
        match self {
            Self::Participation => "participation_summary",
            Self::Performance(0) => "step0_formatted",
            Self::Performance(1) => "step1_performance",
            Self::Performance(2) => "step2_lo",
            Self::Performance(3) => "step3_difficulty",
            Self::Performance(4) => "step4_clustered",
            Self::Performance(_) => "step5_uploadable",
        }
    }

    /// The step that runs immediately before this one in a full run.
    pub fn previous(&self) -> Option<StepId> {
        let pos = Self::ALL.iter().position(|s| s == self)?;
        pos.checked_sub(1).map(|p| Self::ALL[p])
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.stage(), self.number())
    }
}

impl std::str::FromStr for StepId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for StepId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StepId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Key of one bucket in the pipeline state store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BucketKey {
    /// Workbooks loaded straight from the data directory.
    Raw,
    Step(StepId),
}

impl BucketKey {
    /// Every bucket the store always carries.
    pub fn all() -> impl Iterator<Item = BucketKey> {
        std::iter::once(BucketKey::Raw).chain(StepId::ALL.into_iter().map(BucketKey::Step))
    }
}

impl From<StepId> for BucketKey {
    fn from(step: StepId) -> Self {
        BucketKey::Step(step)
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw => f.write_str("raw"),
            Self::Step(step) => write!(f, "{}", step),
        }
    }
}
