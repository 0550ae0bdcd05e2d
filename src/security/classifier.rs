//! Data sensitivity classification
//!
//! Turns a scrub result into a coarse routing decision.

use serde::{Deserialize, Serialize};

use super::pii_scrubber::{scrub_pii, Category, RedactionResult};

/// Routing class, ordered from least to most restrictive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Classification {
    Safe,
    Internal,
    Sensitive,
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Classification::Safe => write!(f, "SAFE"),
            Classification::Internal => write!(f, "INTERNAL"),
            Classification::Sensitive => write!(f, "SENSITIVE"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataClassification {
    pub classification: Classification,
    pub reason: String,
}

/// Classify an existing scrub result.
///
/// Precedence: PCI/PHI, then SECRETS, then any redaction, then SAFE.
pub fn classify_redaction(result: &RedactionResult) -> DataClassification {
    if result.has_category(Category::Pci) || result.has_category(Category::Phi) {
        return DataClassification {
            classification: Classification::Sensitive,
            reason: "Contains PCI or PHI data - route to on-prem/private processing only".into(),
        };
    }

    if result.has_category(Category::Secrets) {
        return DataClassification {
            classification: Classification::Sensitive,
            reason: "Contains credentials or secrets".into(),
        };
    }

    if result.redaction_count > 0 {
        return DataClassification {
            classification: Classification::Internal,
            reason: format!(
                "Contains {} data - scrubbed before sending",
                result.category_names().join(", ")
            ),
        };
    }

    DataClassification {
        classification: Classification::Safe,
        reason: "No sensitive data detected".into(),
    }
}

/// Scrub `text` and classify the outcome.
pub fn classify_data(text: &str) -> DataClassification {
    classify_redaction(&scrub_pii(text))
}
