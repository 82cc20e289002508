//! Table catalog: which definition tables exist and where to fetch them.
//!
//! The catalog order is significant. It fixes the order tables appear in
//! the grid, and therefore how a global grid index maps onto tables.

use serde::{Deserialize, Serialize};

/// Manifest content version the built-in catalog paths point at.
pub const CONTENT_VERSION: &str = "88e2ca87-7551-4503-a5b5-2527c4531503";

/// Manifest locale the built-in catalog paths point at.
pub const CONTENT_LOCALE: &str = "en";

/// Tables shipped in the built-in catalog, in display order.
const DEFAULT_TABLES: &[&str] = &[
    "DestinyPlaceDefinition",
    "DestinyActivityTypeDefinition",
    "DestinyClassDefinition",
    "DestinyGenderDefinition",
    "DestinyInventoryBucketDefinition",
    "DestinyRaceDefinition",
    "DestinyTalentGridDefinition",
    "DestinySandboxPerkDefinition",
    "DestinyStatGroupDefinition",
    "DestinyProgressionMappingDefinition",
    "DestinyFactionDefinition",
    "DestinyVendorGroupDefinition",
    "DestinyItemCategoryDefinition",
    "DestinyDamageTypeDefinition",
    "DestinyActivityModeDefinition",
    "DestinyMedalTierDefinition",
    "DestinyAchievementDefinition",
    "DestinyActivityGraphDefinition",
    "DestinyActivityInteractableDefinition",
    "DestinyBondDefinition",
    "DestinyCharacterCustomizationCategoryDefinition",
    "DestinyCharacterCustomizationOptionDefinition",
    "DestinyCollectibleDefinition",
    "DestinyDestinationDefinition",
    "DestinyEntitlementOfferDefinition",
    "DestinyEquipmentSlotDefinition",
    "DestinyEventCardDefinition",
    "DestinyStatDefinition",
    "DestinyInventoryItemDefinition",
    "DestinyItemTierTypeDefinition",
    "DestinyLoadoutColorDefinition",
    "DestinyLoadoutIconDefinition",
    "DestinyLoadoutNameDefinition",
    "DestinyLocationDefinition",
    "DestinyLoreDefinition",
    "DestinyMaterialRequirementSetDefinition",
    "DestinyMetricDefinition",
    "DestinyObjectiveDefinition",
    "DestinyPlatformBucketMappingDefinition",
    "DestinyPlugSetDefinition",
    "DestinyPowerCapDefinition",
    "DestinyPresentationNodeDefinition",
    "DestinyProgressionDefinition",
    "DestinyProgressionLevelRequirementDefinition",
    "DestinyRecordDefinition",
    "DestinyRewardAdjusterPointerDefinition",
    "DestinyRewardAdjusterProgressionMapDefinition",
    "DestinyRewardItemListDefinition",
    "DestinySackRewardItemListDefinition",
    "DestinySandboxPatternDefinition",
    "DestinySeasonDefinition",
    "DestinySeasonPassDefinition",
    "DestinySocialCommendationDefinition",
    "DestinySocketCategoryDefinition",
    "DestinySocketTypeDefinition",
    "DestinyTraitDefinition",
    "DestinyVendorDefinition",
    "DestinyMilestoneDefinition",
    "DestinyActivityModifierDefinition",
    "DestinyReportReasonCategoryDefinition",
    "DestinyArtifactDefinition",
    "DestinyBreakerTypeDefinition",
    "DestinyChecklistDefinition",
    "DestinyEnergyTypeDefinition",
    "DestinySocialCommendationNodeDefinition",
    "DestinyGuardianRankDefinition",
    "DestinyGuardianRankConstantsDefinition",
    "DestinyLoadoutConstantsDefinition",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub table_name: String,
    /// Path on the content origin, starting with `/`
    pub path: String,
}

impl CatalogEntry {
    pub fn new(table_name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            path: path.into(),
        }
    }

    /// Short label for the table, e.g. `InventoryItem` for
    /// `DestinyInventoryItemDefinition`
    pub fn pretty_name(&self) -> &str {
        pretty_table_name(&self.table_name).unwrap_or(&self.table_name)
    }
}

/// Ordered list of tables to populate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::for_version(CONTENT_LOCALE, CONTENT_VERSION)
    }
}

impl Catalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    /// Built-in table list pointed at a specific locale and content version
    pub fn for_version(locale: &str, version: &str) -> Self {
        let entries = DEFAULT_TABLES
            .iter()
            .map(|name| CatalogEntry::new(*name, table_path(locale, name, version)))
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, table_name: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.table_name == table_name)
    }
}

/// Content path for one table document
pub fn table_path(locale: &str, table_name: &str, version: &str) -> String {
    format!(
        "/common/destiny2_content/json/{}/{}-{}.json",
        locale, table_name, version
    )
}

/// Name between `Destiny` and `Definition`, where the part in between is a
/// run of word characters (`[A-Za-z0-9_]`). When the first `Destiny` in the
/// name doesn't lead to a match, later ones are tried. Returns None when no
/// occurrence matches.
pub fn pretty_table_name(table_name: &str) -> Option<&str> {
    const PREFIX: &str = "Destiny";
    const SUFFIX: &str = "Definition";

    table_name.match_indices(PREFIX).find_map(|(start, _)| {
        let rest = &table_name[start + PREFIX.len()..];
        let word_len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        let word = &rest[..word_len];
        // Greedy: the last `Definition` in the word run wins
        match word.rfind(SUFFIX) {
            Some(end) if end > 0 => Some(&word[..end]),
            _ => None,
        }
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog_order_and_paths() {
        let catalog = Catalog::default();
        assert_eq!(catalog.len(), DEFAULT_TABLES.len());

        let first = &catalog.entries()[0];
        assert_eq!(first.table_name, "DestinyPlaceDefinition");
        assert_eq!(
            first.path,
            "/common/destiny2_content/json/en/DestinyPlaceDefinition-88e2ca87-7551-4503-a5b5-2527c4531503.json"
        );
        assert_eq!(
            catalog.entries().last().unwrap().table_name,
            "DestinyLoadoutConstantsDefinition"
        );
    }

    #[test]
    fn test_default_catalog_has_unique_names() {
        let catalog = Catalog::default();
        let mut names: Vec<&str> = catalog.entries().iter().map(|e| e.table_name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), catalog.len());
    }

    #[test]
    fn test_pretty_table_name() {
        assert_eq!(pretty_table_name("DestinyInventoryItemDefinition"), Some("InventoryItem"));
        assert_eq!(pretty_table_name("DestinyDefinition"), None);
        assert_eq!(pretty_table_name("Items"), None);
        assert_eq!(pretty_table_name("DestinyFoo-Definition"), None);
    }

    #[test]
    fn test_pretty_table_name_tries_later_prefix() {
        assert_eq!(pretty_table_name("Destiny-DestinyRaceDefinition"), Some("Race"));
        assert_eq!(pretty_table_name("DestinyDefinition DestinyClassDefinition"), Some("Class"));
        assert_eq!(pretty_table_name("xDestinyStatDefinitions"), Some("Stat"));

        let entry = CatalogEntry::new("Items", "/items.json");
        assert_eq!(entry.pretty_name(), "Items");
    }

    #[test]
    fn test_catalog_serializes_as_list() {
        let catalog = Catalog::new(vec![CatalogEntry::new("A", "/a.json")]);
        let json = serde_json::to_string(&catalog).unwrap();
        assert_eq!(json, r#"[{"table_name":"A","path":"/a.json"}]"#);

        let parsed: Catalog = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, catalog);
        assert!(parsed.get("A").is_some());
        assert!(parsed.get("B").is_none());
    }
}
