//! Outreach-frequency pipeline stages.

use crate::error::{ModelError, ModelResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The outreach tier a remote contact sits in.
///
/// Contacts imported from the device start in [`PipelineStage::New`]. Tier
/// names the engine does not know are kept verbatim as `Custom`, so a new
/// server-side tier never breaks a listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PipelineStage {
    /// Freshly imported, not yet triaged.
    #[default]
    New,
    /// Every week.
    Weekly,
    /// Every two weeks.
    BiWeekly,
    /// Every month.
    Monthly,
    /// Every three months.
    Quarterly,
    /// Once a year.
    Annually,
    /// A tier defined by the server.
    Custom(String),
}

impl PipelineStage {
    /// Returns the wire name of the stage.
    pub fn as_str(&self) -> &str {
        match self {
            PipelineStage::New => "New",
            PipelineStage::Weekly => "Weekly",
            PipelineStage::BiWeekly => "Bi-Weekly",
            PipelineStage::Monthly => "Monthly",
            PipelineStage::Quarterly => "Quarterly",
            PipelineStage::Annually => "Annually",
            PipelineStage::Custom(name) => name,
        }
    }

    /// Nominal number of days between touchpoints for this tier.
    pub fn target_interval_days(&self) -> u32 {
        match self {
            PipelineStage::Weekly => 7,
            PipelineStage::BiWeekly => 14,
            PipelineStage::Quarterly => 90,
            PipelineStage::Annually => 365,
            PipelineStage::New | PipelineStage::Monthly | PipelineStage::Custom(_) => 30,
        }
    }

    fn from_name(name: &str) -> Self {
        match name {
            "New" => PipelineStage::New,
            "Weekly" => PipelineStage::Weekly,
            "Bi-Weekly" => PipelineStage::BiWeekly,
            "Monthly" => PipelineStage::Monthly,
            "Quarterly" => PipelineStage::Quarterly,
            "Annually" => PipelineStage::Annually,
            other => PipelineStage::Custom(other.to_string()),
        }
    }
}

impl FromStr for PipelineStage {
    type Err = ModelError;

    fn from_str(s: &str) -> ModelResult<Self> {
        let name = s.trim();
        if name.is_empty() {
            return Err(ModelError::EmptyStage);
        }
        Ok(Self::from_name(name))
    }
}

impl From<String> for PipelineStage {
    fn from(name: String) -> Self {
        Self::from_name(name.trim())
    }
}

impl From<PipelineStage> for String {
    fn from(stage: PipelineStage) -> Self {
        match stage {
            PipelineStage::Custom(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_new() {
        assert_eq!(PipelineStage::default(), PipelineStage::New);
    }

    #[test]
    fn parse_known_and_custom() {
        assert_eq!("Bi-Weekly".parse::<PipelineStage>().unwrap(), PipelineStage::BiWeekly);
        assert_eq!(
            "Every Leap Year".parse::<PipelineStage>().unwrap(),
            PipelineStage::Custom("Every Leap Year".into())
        );
        assert_eq!("  ".parse::<PipelineStage>(), Err(ModelError::EmptyStage));
    }

    #[test]
    fn interval_days() {
        assert_eq!(PipelineStage::Weekly.target_interval_days(), 7);
        assert_eq!(PipelineStage::Annually.target_interval_days(), 365);
        assert_eq!(PipelineStage::New.target_interval_days(), 30);
    }

    #[test]
    fn serde_uses_tier_names() {
        let json = serde_json::to_string(&PipelineStage::BiWeekly).unwrap();
        assert_eq!(json, "\"Bi-Weekly\"");

        let stage: PipelineStage = serde_json::from_str("\"Quarterly\"").unwrap();
        assert_eq!(stage, PipelineStage::Quarterly);

        let stage: PipelineStage = serde_json::from_str("\"Someday\"").unwrap();
        assert_eq!(stage, PipelineStage::Custom("Someday".into()));
    }
}
