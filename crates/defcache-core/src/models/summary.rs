use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplayProperties {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(rename = "hasIcon", default)]
    pub has_icon: Option<bool>,
}

/// The parts of a definition a grid cell shows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DefinitionSummary {
    pub hash: Option<i64>,
    pub display: DisplayProperties,
}

impl DefinitionSummary {
    pub fn from_value(definition: &Value) -> Self {
        let display = definition
            .get("displayProperties")
            .and_then(|v| serde_json::from_value::<DisplayProperties>(v.clone()).ok())
            .unwrap_or_default();

        Self {
            hash: super::StoredDefinition::key_of(definition),
            display,
        }
    }

    /// Display name, falling back to the hash for unnamed definitions
    pub fn title(&self) -> String {
        match (&self.display.name, self.hash) {
            (Some(name), _) if !name.is_empty() => name.clone(),
            (_, Some(hash)) => format!("#{}", hash),
            _ => "(unnamed)".to_string(),
        }
    }

    /// Absolute icon URL, if the definition has one
    pub fn icon_url(&self, origin: &str) -> Option<String> {
        self.display
            .icon
            .as_deref()
            .filter(|icon| !icon.is_empty())
            .map(|icon| format!("{}{}", origin.trim_end_matches('/'), icon))
    }
}
