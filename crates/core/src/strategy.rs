//! Strategy — structured, non-prose instructions guiding one reply.
//!
//! Produced by the planner, consumed once by the generator, then discarded.
//! The planner never emits user-facing text; everything here is machine
//! instructions.

use serde::{Deserialize, Serialize};

/// The guidance approach for one turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Encourage,
    Teach,
    Challenge,
    Reflect,
    #[default]
    Support,
    Celebrate,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Encourage => write!(f, "encourage"),
            Self::Teach => write!(f, "teach"),
            Self::Challenge => write!(f, "challenge"),
            Self::Reflect => write!(f, "reflect"),
            Self::Support => write!(f, "support"),
            Self::Celebrate => write!(f, "celebrate"),
        }
    }
}

/// Emotional register of the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Warm,
    Gentle,
    Direct,
    Curious,
    Affirming,
    Supportive,
}

impl std::fmt::Display for Tone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Warm => write!(f, "warm"),
            Self::Gentle => write!(f, "gentle"),
            Self::Direct => write!(f, "direct"),
            Self::Curious => write!(f, "curious"),
            Self::Affirming => write!(f, "affirming"),
            Self::Supportive => write!(f, "supportive"),
        }
    }
}

/// How long the reply may be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    Brief,
    #[default]
    Normal,
    Detailed,
}

impl Verbosity {
    /// Hard cap on reply line count. Enforced by the generator at its
    /// boundary — not negotiable by model output.
    pub const fn max_lines(self) -> usize {
        match self {
            Self::Brief => 4,
            Self::Normal => 6,
            Self::Detailed => 8,
        }
    }
}

impl std::fmt::Display for Verbosity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Brief => write!(f, "brief"),
            Self::Normal => write!(f, "normal"),
            Self::Detailed => write!(f, "detailed"),
        }
    }
}

/// How fast to move through material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pacing {
    Slow,
    #[default]
    Normal,
    Fast,
}

impl std::fmt::Display for Pacing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Slow => write!(f, "slow"),
            Self::Normal => write!(f, "normal"),
            Self::Fast => write!(f, "fast"),
        }
    }
}

/// The full strategy for one turn.
///
/// `Default` is the safe fallback used when the planner's gateway call
/// fails or returns unparseable output: support / warm / normal / normal /
/// no question.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Strategy {
    #[serde(default)]
    pub strategy: StrategyKind,

    #[serde(default)]
    pub tone: Tone,

    #[serde(default)]
    pub verbosity: Verbosity,

    #[serde(default)]
    pub pacing: Pacing,

    #[serde(default)]
    pub should_ask_question: bool,
}
