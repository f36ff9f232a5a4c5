//! Named rule sets with scenes.
//!
//! A validation declaration may point at a rule set by name instead of
//! carrying its rules inline. A rule set holds the full rule map, a field ->
//! label map, and scenes: named subsets of fields, each entry either a bare
//! field name (rule looked up in `rules`) or an explicit `field: rule` pair.

use crate::error::{Error, Result};
use crate::parser::Manifest;
use indexmap::IndexMap;
use log::{debug, warn};
use serde::Deserialize;

/// Named rule set as declared in a manifest
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RuleSetDefinition {
    pub name: String,
    #[serde(default)]
    pub rules: IndexMap<String, String>,
    /// Field labels
    #[serde(default)]
    pub fields: IndexMap<String, String>,
    #[serde(default)]
    pub scenes: IndexMap<String, Vec<SceneEntry>>,
}

/// One entry of a scene
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SceneEntry {
    /// Field whose rule comes from the rule set's `rules`
    Field(String),
    /// Field with its own rule
    Rules(IndexMap<String, String>),
}

/// Resolves a rule set name and optional scene to a concrete rule map.
pub trait RuleSetResolver {
    /// # Errors
    ///
    /// [`Error::UnresolvedRuleSet`] when the rule set or the scene is unknown.
    fn resolve(&self, rule_set: &str, scene: Option<&str>) -> Result<IndexMap<String, String>>;
}

impl RuleSetDefinition {
    /// Rule map for `scene`, or for the whole set when no scene is given.
    ///
    /// Keys carry the field label as `field|label` unless they already have one.
    pub fn rules_for(&self, scene: Option<&str>) -> Result<IndexMap<String, String>> {
        let entries: Vec<(String, String)> = match scene {
            None => self
                .rules
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            Some(scene) => {
                let scene_entries =
                    self.scenes
                        .get(scene)
                        .ok_or_else(|| Error::UnresolvedRuleSet {
                            rule_set: self.name.clone(),
                            scene: Some(scene.to_string()),
                        })?;
                scene_entries
                    .iter()
                    .flat_map(|entry| self.expand(entry))
                    .collect()
            }
        };

        Ok(entries
            .into_iter()
            .map(|(key, rule)| (self.labelled(key), rule))
            .collect())
    }

    fn expand(&self, entry: &SceneEntry) -> Vec<(String, String)> {
        match entry {
            SceneEntry::Field(field) => {
                // rule keys may carry a label, `address.city|城市`
                let found = self.rules.iter().find(|(key, _)| {
                    key.split_once('|').map_or(key.as_str(), |(name, _)| name) == field
                });
                match found {
                    Some((key, rule)) => vec![(key.clone(), rule.clone())],
                    None => {
                        debug!("Rule set {} has no rule for {}", self.name, field);
                        vec![(field.clone(), String::new())]
                    }
                }
            }
            SceneEntry::Rules(rules) => rules
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    fn labelled(&self, key: String) -> String {
        if key.contains('|') {
            return key;
        }
        match self.fields.get(&key) {
            Some(label) => format!("{}|{}", key, label),
            None => key,
        }
    }
}

/// Rule sets collected across all manifests, by name.
#[derive(Debug, Default)]
pub struct RuleSetIndex {
    rule_sets: IndexMap<String, RuleSetDefinition>,
}

impl RuleSetIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_manifests(manifests: &[Manifest]) -> Self {
        let mut index = Self::new();
        for manifest in manifests {
            for rule_set in &manifest.rule_sets {
                index.insert(rule_set.clone());
            }
        }
        debug!("Indexed {} rule sets", index.len());
        index
    }

    pub fn insert(&mut self, rule_set: RuleSetDefinition) {
        if self.rule_sets.contains_key(&rule_set.name) {
            warn!("Rule set {} declared more than once, keeping the first", rule_set.name);
            return;
        }
        self.rule_sets.insert(rule_set.name.clone(), rule_set);
    }

    pub fn get(&self, name: &str) -> Option<&RuleSetDefinition> {
        self.rule_sets.get(name)
    }

    pub fn len(&self) -> usize {
        self.rule_sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rule_sets.is_empty()
    }
}

impl RuleSetResolver for RuleSetIndex {
    fn resolve(&self, rule_set: &str, scene: Option<&str>) -> Result<IndexMap<String, String>> {
        let definition = self.get(rule_set).ok_or_else(|| Error::UnresolvedRuleSet {
            rule_set: rule_set.to_string(),
            scene: scene.map(str::to_string),
        })?;
        definition.rules_for(scene)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_rules() -> RuleSetDefinition {
        serde_yaml::from_str(
            r#"
name: UserValidate
rules:
  username: required|string|min:3
  email: required|email
  age: integer
fields:
  username: 用户名
  email: 邮箱
scenes:
  create:
    - username
    - email
    - nickname|昵称: string|max:50
  update:
    - age
    - missing
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_scene_resolves_bare_fields_and_pairs() {
        let rules = user_rules().rules_for(Some("create")).unwrap();
        let entries: Vec<(&str, &str)> = rules.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        assert_eq!(
            entries,
            vec![
                ("username|用户名", "required|string|min:3"),
                ("email|邮箱", "required|email"),
                ("nickname|昵称", "string|max:50"),
            ]
        );
    }

    #[test]
    fn test_missing_rule_yields_empty_value() {
        let rules = user_rules().rules_for(Some("update")).unwrap();
        assert_eq!(rules.get("age").map(String::as_str), Some("integer"));
        assert_eq!(rules.get("missing").map(String::as_str), Some(""));
    }

    #[test]
    fn test_bare_field_matches_labelled_rule_key() {
        let definition: RuleSetDefinition = serde_yaml::from_str(
            r#"
name: OrderValidate
rules:
  "address.city|城市": string
scenes:
  ship: [address.city]
"#,
        )
        .unwrap();
        let rules = definition.rules_for(Some("ship")).unwrap();
        assert_eq!(rules.get("address.city|城市").map(String::as_str), Some("string"));
    }

    #[test]
    fn test_no_scene_uses_all_rules() {
        let rules = user_rules().rules_for(None).unwrap();
        assert_eq!(rules.len(), 3);
        assert!(rules.contains_key("username|用户名"));
    }

    #[test]
    fn test_unknown_scene_is_unresolved() {
        let err = user_rules().rules_for(Some("delete")).unwrap_err();
        assert!(matches!(
            err,
            Error::UnresolvedRuleSet { rule_set, scene: Some(scene) }
                if rule_set == "UserValidate" && scene == "delete"
        ));
    }

    #[test]
    fn test_index_resolves_by_name() {
        let mut index = RuleSetIndex::new();
        index.insert(user_rules());
        assert_eq!(index.resolve("UserValidate", Some("create")).unwrap().len(), 3);
        assert!(matches!(
            index.resolve("OrderValidate", None),
            Err(Error::UnresolvedRuleSet { .. })
        ));
    }
}
