//! Classification semantics applied when decoding logits.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::config::ConfigurationError;

/// How label slots compete for an example.
///
/// `SingleLabel` normalises scores across slots with a softmax and keeps the
/// winner. `MultiLabel` scores every slot independently with a sigmoid and
/// keeps those above the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClassificationMode {
    SingleLabel,
    MultiLabel,
}

impl ClassificationMode {
    /// Canonical string tag, as used in artifact file names.
    ///
    /// # Examples
    ///
    /// ```
    /// use gliclass_onnx::ClassificationMode;
    ///
    /// assert_eq!(ClassificationMode::MultiLabel.as_str(), "multi-label");
    /// ```
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SingleLabel => "single-label",
            Self::MultiLabel => "multi-label",
        }
    }
}

impl fmt::Display for ClassificationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClassificationMode {
    type Err = ConfigurationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "single-label" => Ok(Self::SingleLabel),
            "multi-label" => Ok(Self::MultiLabel),
            other => Err(ConfigurationError::UnknownMode(other.to_owned())),
        }
    }
}
