//! Versioned normalization rule tables.
//!
//! Rules are plain data (TOML) so they can be reviewed, versioned and tested
//! independently of the pipeline. They are parsed and validated once, then
//! compiled into a [`crate::normalize::Normalizer`].

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::Deserialize;

use crate::error::ReceiptError;
use crate::model::Category;

const BUILTIN_RULES: &str = include_str!("../rules/default.toml");

// ---------------------------------------------------------------------------
// Rule set
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RuleSet {
    pub version: u32,
    #[serde(default)]
    pub brands: Vec<String>,
    #[serde(default)]
    pub descriptors: Vec<String>,
    #[serde(default)]
    pub size_units: Vec<String>,
    #[serde(default)]
    pub size_words: Vec<String>,
    #[serde(default)]
    pub abbreviations: BTreeMap<String, String>,
    #[serde(default)]
    pub categories: Vec<CategoryRule>,
}

/// Keywords that place a canonical name in `category`.
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryRule {
    pub category: Category,
    pub keywords: Vec<String>,
}

impl RuleSet {
    /// The rule table compiled into the binary.
    pub fn builtin() -> Result<Self, ReceiptError> {
        Self::from_toml(BUILTIN_RULES)
    }

    pub fn from_toml(input: &str) -> Result<Self, ReceiptError> {
        let rules: RuleSet =
            toml::from_str(input).map_err(|e| ReceiptError::RulesParse(e.to_string()))?;
        rules.validate()?;
        Ok(rules)
    }

    /// Load from `path`, or fall back to the built-in table.
    pub fn load(path: Option<&Path>) -> Result<Self, ReceiptError> {
        match path {
            Some(p) => {
                let text = std::fs::read_to_string(p).map_err(|e| {
                    ReceiptError::RulesParse(format!("cannot read {}: {e}", p.display()))
                })?;
                Self::from_toml(&text)
            }
            None => Self::builtin(),
        }
    }

    pub fn validate(&self) -> Result<(), ReceiptError> {
        if self.version == 0 {
            return Err(ReceiptError::RulesValidation("version must be >= 1".into()));
        }

        check_entries("brands", &self.brands)?;
        check_entries("descriptors", &self.descriptors)?;
        check_entries("size_units", &self.size_units)?;
        check_entries("size_words", &self.size_words)?;

        for unit in &self.size_units {
            if !unit.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(ReceiptError::RulesValidation(format!(
                    "size unit '{unit}' must be alphabetic"
                )));
            }
        }

        // An expansion that is itself a key would never settle.
        let keys: HashSet<String> = self.abbreviations.keys().map(|k| k.to_lowercase()).collect();
        for (key, value) in &self.abbreviations {
            if tokenize(key).len() != 1 {
                return Err(ReceiptError::RulesValidation(format!(
                    "abbreviation '{key}' must be a single token"
                )));
            }
            let expanded = tokenize(value);
            if expanded.len() != 1 || !expanded[0].chars().all(|c| c.is_alphabetic()) {
                return Err(ReceiptError::RulesValidation(format!(
                    "abbreviation '{key}' must expand to a single word, got '{value}'"
                )));
            }
            if keys.contains(&expanded[0]) {
                return Err(ReceiptError::RulesValidation(format!(
                    "abbreviation '{key}' expands to '{value}', which is itself an abbreviation"
                )));
            }
        }

        for rule in &self.categories {
            if rule.keywords.is_empty() {
                return Err(ReceiptError::RulesValidation(format!(
                    "category '{}' has no keywords",
                    rule.category
                )));
            }
            check_entries(&format!("categories.{}", rule.category), &rule.keywords)?;
        }

        Ok(())
    }
}

fn check_entries(table: &str, entries: &[String]) -> Result<(), ReceiptError> {
    for entry in entries {
        if tokenize(entry).is_empty() {
            return Err(ReceiptError::RulesValidation(format!(
                "{table}: entry '{entry}' is empty after tokenizing"
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

/// Case-fold, drop apostrophes, split on whitespace and list punctuation, and
/// trim punctuation from token edges. Shared by rules and the pipeline so both
/// sides see identical tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    let folded: String = text
        .to_lowercase()
        .chars()
        .filter(|c| *c != '\'' && *c != '\u{2019}')
        .map(|c| match c {
            ',' | ';' | '/' | '(' | ')' | '[' | ']' | '{' | '}' | '|' => ' ',
            other => other,
        })
        .collect();

    folded
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric() && c != '%'))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_rules_validate() {
        let rules = RuleSet::builtin().unwrap();
        assert!(rules.version >= 1);
        assert!(rules.brands.iter().any(|b| b == "ee"));
        assert_eq!(rules.abbreviations.get("chkn").map(String::as_str), Some("chicken"));
        assert_eq!(rules.categories[0].category, Category::Produce);
    }

    #[test]
    fn tokenize_trims_edges_and_apostrophes() {
        assert_eq!(tokenize("  Trader Joe's  "), vec!["trader", "joes"]);
        assert_eq!(tokenize("MILK, 2% (1GAL)"), vec!["milk", "2%", "1gal"]);
        assert_eq!(tokenize("bone-in thighs..."), vec!["bone-in", "thighs"]);
        assert!(tokenize(" -- ").is_empty());
    }

    #[test]
    fn rejects_chained_abbreviation() {
        let toml = r#"
version = 1
[abbreviations]
chkn = "chk"
chk = "chicken"
"#;
        let err = RuleSet::from_toml(toml).unwrap_err();
        assert!(matches!(err, ReceiptError::RulesValidation(_)));
    }

    #[test]
    fn rejects_multi_word_expansion() {
        let toml = r#"
version = 1
[abbreviations]
pb = "peanut butter"
"#;
        assert!(RuleSet::from_toml(toml).is_err());
    }

    #[test]
    fn rejects_unknown_category() {
        let toml = r#"
version = 1
[[categories]]
category = "hardware"
keywords = ["nail"]
"#;
        let err = RuleSet::from_toml(toml).unwrap_err();
        assert!(matches!(err, ReceiptError::RulesParse(_)));
    }

    #[test]
    fn rejects_version_zero() {
        assert!(RuleSet::from_toml("version = 0").is_err());
    }
}
