//! Rule categories

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

pub const CATEGORY_EXAMPLES: &str = "examples";
pub const CATEGORY_OPERATIONS: &str = "operations";
pub const CATEGORY_INFO: &str = "info";
pub const CATEGORY_DESCRIPTIONS: &str = "descriptions";
pub const CATEGORY_SCHEMAS: &str = "schemas";
pub const CATEGORY_SECURITY: &str = "security";
pub const CATEGORY_TAGS: &str = "tags";
pub const CATEGORY_VALIDATION: &str = "validation";
pub const CATEGORY_OWASP: &str = "owasp";
pub const CATEGORY_ALL: &str = "all";

/// Report order of the built-in categories
pub const ORDERED_CATEGORIES: [&str; 9] = [
    CATEGORY_INFO,
    CATEGORY_OPERATIONS,
    CATEGORY_TAGS,
    CATEGORY_SCHEMAS,
    CATEGORY_VALIDATION,
    CATEGORY_DESCRIPTIONS,
    CATEGORY_SECURITY,
    CATEGORY_EXAMPLES,
    CATEGORY_OWASP,
];

/// A coarse grouping of rules
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RuleCategory {
    pub id: String,
    pub name: String,
    pub description: String,
}

impl RuleCategory {
    pub fn new(id: &str, name: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
        }
    }

    /// A built-in category by id. `information` is accepted for `info`.
    pub fn builtin(id: &str) -> Option<Self> {
        let category = match id.to_lowercase().as_str() {
            CATEGORY_EXAMPLES => Self::new(
                CATEGORY_EXAMPLES,
                "Examples",
                "Examples help consumers understand how API calls should look. They are really important for automated tooling for mocking and testing.",
            ),
            CATEGORY_OPERATIONS => Self::new(
                CATEGORY_OPERATIONS,
                "Operations",
                "Operations are the core of the contract, they define paths and HTTP methods. These rules check operations have been well constructed, looks for operationId, parameter, schema and return types in depth.",
            ),
            CATEGORY_INFO | "information" => Self::new(
                CATEGORY_INFO,
                "Contract Information",
                "The info object contains licencing, contact, authorship details and more. Checks to confirm required details have been completed.",
            ),
            CATEGORY_DESCRIPTIONS => Self::new(
                CATEGORY_DESCRIPTIONS,
                "Descriptions",
                "Documentation is really important, in OpenAPI, just about everything can and should have a description. This set of rules checks for absent descriptions, poor quality descriptions (copy/paste), or short descriptions.",
            ),
            CATEGORY_SCHEMAS => Self::new(
                CATEGORY_SCHEMAS,
                "Schemas",
                "Schemas are how request bodies and response payloads are defined. They define the data going in and the data flowing out of an operation. These rules check for structural validity, checking types, checking required fields and validating correct use of structures.",
            ),
            CATEGORY_SECURITY => Self::new(
                CATEGORY_SECURITY,
                "Security",
                "Security plays a central role in RESTful APIs. These rules make sure that the correct definitions have been used and put in the right places.",
            ),
            CATEGORY_TAGS => Self::new(
                CATEGORY_TAGS,
                "Tags",
                "Tags are used as meta-data for operations. They are mainly used by tooling as a taxonomy mechanism to build navigation, search and more. Tags are important as they help consumers navigate the contract when using documentation, testing, code generation or analysis tools.",
            ),
            CATEGORY_VALIDATION => Self::new(
                CATEGORY_VALIDATION,
                "Validation",
                "Validation rules make sure that certain characters or patterns have not been used that may cause issues when rendering in different types of applications.",
            ),
            CATEGORY_OWASP => Self::new(
                CATEGORY_OWASP,
                "OWASP",
                "The OWASP API Security Top 10 rules. Checks for authentication, rate limiting, resource limits and error handling that keep an API hard to abuse.",
            ),
            CATEGORY_ALL => Self::new(CATEGORY_ALL, "All Categories", "All the categories, for those who like a party."),
            _ => return None,
        };
        Some(category)
    }
}

impl fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CategoryRepr {
    Id(String),
    Full {
        id: String,
        #[serde(default)]
        name: String,
        #[serde(default)]
        description: String,
    },
}

impl<'de> Deserialize<'de> for RuleCategory {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match CategoryRepr::deserialize(deserializer)? {
            CategoryRepr::Id(id) => {
                RuleCategory::builtin(&id).unwrap_or_else(|| RuleCategory::new(&id, &id, ""))
            }
            CategoryRepr::Full {
                id,
                name,
                description,
            } => match RuleCategory::builtin(&id) {
                Some(builtin) if name.is_empty() => builtin,
                _ => RuleCategory {
                    name: if name.is_empty() { id.clone() } else { name },
                    id,
                    description,
                },
            },
        })
    }
}

/// Categories known to an execution. Starts with the built-ins; rule sets
/// may register their own.
#[derive(Debug, Clone)]
pub struct RuleCategoryRegistry {
    categories: IndexMap<String, RuleCategory>,
}

impl Default for RuleCategoryRegistry {
    fn default() -> Self {
        let mut categories = IndexMap::new();
        for id in ORDERED_CATEGORIES.iter().chain(std::iter::once(&CATEGORY_ALL)) {
            if let Some(category) = RuleCategory::builtin(id) {
                categories.insert(category.id.clone(), category);
            }
        }
        Self { categories }
    }
}

impl RuleCategoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&RuleCategory> {
        self.categories
            .get(id)
            .or_else(|| self.categories.get(RuleCategory::builtin(id)?.id.as_str()))
    }

    pub fn register(&mut self, category: RuleCategory) {
        self.categories.insert(category.id.clone(), category);
    }

    /// Categories in report order, without the `all` sentinel
    pub fn ordered(&self) -> Vec<&RuleCategory> {
        self.categories
            .values()
            .filter(|c| c.id != CATEGORY_ALL)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup() {
        let info = RuleCategory::builtin("information").unwrap();
        assert_eq!(info.id, CATEGORY_INFO);
        assert_eq!(info.name, "Contract Information");
        assert_eq!(RuleCategory::builtin("all").unwrap().name, "All Categories");
        assert!(RuleCategory::builtin("nope").is_none());
    }

    #[test]
    fn test_deserialize_from_id_or_map() {
        let c: RuleCategory = serde_json::from_str("\"schemas\"").unwrap();
        assert_eq!(c.name, "Schemas");

        let c: RuleCategory =
            serde_json::from_str(r#"{"id":"custom","name":"Custom","description":"mine"}"#).unwrap();
        assert_eq!(c.id, "custom");
        assert_eq!(c.name, "Custom");

        let c: RuleCategory = serde_json::from_str("\"house-style\"").unwrap();
        assert_eq!(c.name, "house-style");
    }

    #[test]
    fn test_registry_order() {
        let mut registry = RuleCategoryRegistry::new();
        let ids: Vec<&str> = registry.ordered().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ORDERED_CATEGORIES.to_vec());

        registry.register(RuleCategory::new("custom", "Custom", ""));
        assert!(registry.get("custom").is_some());
        assert_eq!(registry.get("info").unwrap().id, CATEGORY_INFO);
        assert_eq!(registry.ordered().len(), 10);
    }
}
