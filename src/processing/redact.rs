//! Redaction of owner names that look like private individuals.

use serde::{Deserialize, Serialize};

use crate::types::Value;

/// Keeps owner names that look like organisations and replaces everything else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerRedaction {
    /// Name suffixes marking an organisation, matched after a space (`"ACME LLC"`).
    #[serde(default = "default_suffixes")]
    pub suffixes: Vec<String>,
    /// Exact organisation names without a telling suffix (e.g. `"COUNTY OF ALBEMARLE"`).
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default = "default_placeholder")]
    pub placeholder: String,
}

fn default_suffixes() -> Vec<String> {
    ["LLC", "LTD", "INC", "CORPORATION", "FOUNDATION"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_placeholder() -> String {
    "?".to_string()
}

impl Default for OwnerRedaction {
    fn default() -> Self {
        Self {
            suffixes: default_suffixes(),
            names: Vec::new(),
            placeholder: default_placeholder(),
        }
    }
}

impl OwnerRedaction {
    pub fn is_probable_business(&self, owner: &str) -> bool {
        let owner = owner.trim();
        self.names.iter().any(|n| n == owner)
            || self.suffixes.iter().any(|s| {
                owner
                    .strip_suffix(s.as_str())
                    .is_some_and(|rest| rest.ends_with(' '))
            })
    }

    pub fn apply(&self, value: Value) -> Value {
        match value.to_text() {
            Some(owner) if self.is_probable_business(&owner) => Value::Utf8(owner),
            Some(_) => Value::Utf8(self.placeholder.clone()),
            None => value,
        }
    }
}
