//! Quality plans and their resolution profiles.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Capture and output frame rate shared by every plan.
pub const FRAME_RATE: u32 = 30;

/// Quality plan tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    #[default]
    Free,
    Premium,
}

impl Plan {
    /// Get the plan name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Premium => "premium",
        }
    }

    /// Resolution profile rendered for this plan.
    pub fn resolution(&self) -> ResolutionProfile {
        ResolutionProfile::for_plan(*self)
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Plan {
    type Err = ModelError;

    /// Parse from string (case-insensitive). Unknown tiers are rejected
    /// rather than silently mapped to `free`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "free" => Ok(Plan::Free),
            "premium" => Ok(Plan::Premium),
            _ => Err(ModelError::UnknownPlan(s.to_string())),
        }
    }
}

/// Fixed output dimensions for a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct ResolutionProfile {
    pub width: u32,
    pub height: u32,
}

impl ResolutionProfile {
    /// Vertical 720p.
    pub const FREE: Self = Self {
        width: 720,
        height: 1280,
    };

    /// Vertical 1080p.
    pub const PREMIUM: Self = Self {
        width: 1080,
        height: 1920,
    };

    pub fn for_plan(plan: Plan) -> Self {
        match plan {
            Plan::Free => Self::FREE,
            Plan::Premium => Self::PREMIUM,
        }
    }
}

impl fmt::Display for ResolutionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
