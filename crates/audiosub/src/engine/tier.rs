use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Model size tiers, ordered from lightest to heaviest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Tiny,
    Base,
    Small,
    Medium,
    Large,
}

impl ModelTier {
    pub const ALL: [ModelTier; 5] = [
        ModelTier::Tiny,
        ModelTier::Base,
        ModelTier::Small,
        ModelTier::Medium,
        ModelTier::Large,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ModelTier::Tiny => "tiny",
            ModelTier::Base => "base",
            ModelTier::Small => "small",
            ModelTier::Medium => "medium",
            ModelTier::Large => "large",
        }
    }

    /// The next lighter tier, or `None` for the lightest.
    pub fn lighter(self) -> Option<ModelTier> {
        match self {
            ModelTier::Tiny => None,
            ModelTier::Base => Some(ModelTier::Tiny),
            ModelTier::Small => Some(ModelTier::Base),
            ModelTier::Medium => Some(ModelTier::Small),
            ModelTier::Large => Some(ModelTier::Medium),
        }
    }

    /// This tier followed by every lighter one, heaviest first.
    pub fn cascade(self) -> Vec<ModelTier> {
        std::iter::successors(Some(self), |t| t.lighter()).collect()
    }

    /// File name of the ggml weights for this tier.
    pub fn model_file_name(self) -> String {
        format!("ggml-{}.bin", self.as_str())
    }
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelTier {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        ModelTier::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or(ConfigError::UnknownTier(normalized))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_lightest_first() {
        assert!(ModelTier::Tiny < ModelTier::Base);
        assert!(ModelTier::Medium < ModelTier::Large);
        assert_eq!(ModelTier::ALL.iter().min(), Some(&ModelTier::Tiny));
    }

    #[test]
    fn test_cascade_walks_to_tiny() {
        assert_eq!(
            ModelTier::Small.cascade(),
            vec![ModelTier::Small, ModelTier::Base, ModelTier::Tiny]
        );
        assert_eq!(ModelTier::Tiny.cascade(), vec![ModelTier::Tiny]);
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!("Medium".parse::<ModelTier>().unwrap(), ModelTier::Medium);
        assert_eq!(ModelTier::Large.to_string(), "large");
        assert!("huge".parse::<ModelTier>().is_err());
    }

    #[test]
    fn test_model_file_name() {
        assert_eq!(ModelTier::Base.model_file_name(), "ggml-base.bin");
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&ModelTier::Small).unwrap();
        assert_eq!(json, "\"small\"");
        let tier: ModelTier = serde_json::from_str("\"tiny\"").unwrap();
        assert_eq!(tier, ModelTier::Tiny);
    }
}
