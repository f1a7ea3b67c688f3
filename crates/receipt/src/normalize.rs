//! Receipt text -> canonical item name + category guess.
//!
//! Stages, in order: fold/trim, strip brand tokens, expand abbreviations,
//! strip size and descriptor tokens, collapse whitespace, infer category.
//! Every comparison is against whole tokens; "ee" never matches inside
//! "cheese". The stages are repeated until the token list stops changing, so
//! normalizing a canonical name returns it unchanged.

use std::collections::{HashMap, HashSet};

use crate::model::{Category, NormalizedName};
use crate::rules::{tokenize, RuleSet};

pub struct Normalizer {
    version: u32,
    /// Brand token runs, longest first.
    brands: Vec<Vec<String>>,
    abbreviations: HashMap<String, String>,
    size_units: HashSet<String>,
    size_words: HashSet<String>,
    descriptors: HashSet<String>,
    /// Multi-token keywords in table order, tested before `word_rules`.
    phrase_rules: Vec<(Vec<String>, Category)>,
    word_rules: Vec<(String, Category)>,
}

impl Normalizer {
    pub fn new(rules: &RuleSet) -> Self {
        let mut brands: Vec<Vec<String>> = rules
            .brands
            .iter()
            .map(|b| tokenize(b))
            .filter(|t| !t.is_empty())
            .collect();
        brands.sort_by(|a, b| b.len().cmp(&a.len()));
        brands.dedup();

        let abbreviations = rules
            .abbreviations
            .iter()
            .map(|(k, v)| (k.to_lowercase(), v.to_lowercase()))
            .collect();

        let token_set = |words: &[String]| -> HashSet<String> {
            words.iter().flat_map(|w| tokenize(w)).collect()
        };

        let mut phrase_rules = Vec::new();
        let mut word_rules = Vec::new();
        for rule in &rules.categories {
            for keyword in &rule.keywords {
                let tokens = tokenize(keyword);
                match tokens.len() {
                    0 => {}
                    1 => word_rules.push((tokens[0].clone(), rule.category)),
                    _ => phrase_rules.push((tokens, rule.category)),
                }
            }
        }

        Self {
            version: rules.version,
            brands,
            abbreviations,
            size_units: token_set(&rules.size_units),
            size_words: token_set(&rules.size_words),
            descriptors: token_set(&rules.descriptors),
            phrase_rules,
            word_rules,
        }
    }

    /// Version of the rule table this normalizer was built from.
    pub fn rules_version(&self) -> u32 {
        self.version
    }

    pub fn normalize(&self, raw_name: &str) -> NormalizedName {
        let canonical_name = self.canonical_name(raw_name);
        let category_guess = self.infer_category(&canonical_name);
        NormalizedName {
            canonical_name,
            category_guess,
        }
    }

    /// Canonical form of `raw_name`. If every token is stripped, the folded
    /// input is kept instead so the line still has an identity.
    pub fn canonical_name(&self, raw_name: &str) -> String {
        let folded = tokenize(raw_name);
        let mut tokens = folded.clone();

        // Each changing pass removes a token or expands an abbreviation key
        // into a non-key, so this settles well inside the bound.
        for _ in 0..=(2 * folded.len() + 1) {
            let next = self.pass(&tokens);
            if next == tokens {
                break;
            }
            tokens = next;
        }

        if tokens.is_empty() {
            folded.join(" ")
        } else {
            tokens.join(" ")
        }
    }

    /// First matching keyword wins: multi-word keywords before single words,
    /// table order within each tier.
    pub fn infer_category(&self, canonical_name: &str) -> Category {
        let tokens = tokenize(canonical_name);

        for (phrase, category) in &self.phrase_rules {
            if tokens
                .windows(phrase.len())
                .any(|w| w.iter().zip(phrase).all(|(t, k)| word_matches(t, k)))
            {
                return *category;
            }
        }

        for (keyword, category) in &self.word_rules {
            if tokens.iter().any(|t| word_matches(t, keyword)) {
                return *category;
            }
        }

        Category::Other
    }

    fn pass(&self, tokens: &[String]) -> Vec<String> {
        let tokens = self.strip_brands(tokens);
        let tokens = self.expand_abbreviations(tokens);
        self.strip_sizes(tokens)
    }

    fn strip_brands(&self, tokens: &[String]) -> Vec<String> {
        let mut out = Vec::with_capacity(tokens.len());
        let mut i = 0;
        'outer: while i < tokens.len() {
            for brand in &self.brands {
                let end = i + brand.len();
                if end <= tokens.len() && tokens[i..end] == brand[..] {
                    i = end;
                    continue 'outer;
                }
            }
            out.push(tokens[i].clone());
            i += 1;
        }
        out
    }

    fn expand_abbreviations(&self, tokens: Vec<String>) -> Vec<String> {
        tokens
            .into_iter()
            .map(|t| self.abbreviations.get(&t).cloned().unwrap_or(t))
            .collect()
    }

    fn strip_sizes(&self, tokens: Vec<String>) -> Vec<String> {
        let mut out = Vec::with_capacity(tokens.len());
        let mut iter = tokens.into_iter().peekable();
        while let Some(token) = iter.next() {
            if is_number(&token) {
                // "<number> <unit>" pair: drop the unit too.
                if iter.peek().is_some_and(|next| self.size_units.contains(next)) {
                    iter.next();
                }
                continue;
            }
            if is_percentage(&token)
                || self.is_number_with_unit(&token)
                || self.size_words.contains(&token)
                || self.descriptors.contains(&token)
            {
                continue;
            }
            out.push(token);
        }
        out
    }

    /// "1gal", "12oz", "2.5lb", "12-pack", "6x"
    fn is_number_with_unit(&self, token: &str) -> bool {
        let split = token
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(token.len());
        let (number, unit) = token.split_at(split);
        if !is_number(number) {
            return false;
        }
        let unit = unit.trim_start_matches('-');
        unit == "x" || self.size_units.contains(unit)
    }
}

fn is_number(token: &str) -> bool {
    !token.is_empty()
        && token.chars().any(|c| c.is_ascii_digit())
        && token.chars().all(|c| c.is_ascii_digit() || c == '.')
}

fn is_percentage(token: &str) -> bool {
    token
        .strip_suffix('%')
        .is_some_and(|n| n.is_empty() || is_number(n))
}

/// Token equals the keyword or a simple plural of it.
fn word_matches(token: &str, keyword: &str) -> bool {
    if token == keyword {
        return true;
    }
    if let Some(stem) = token.strip_suffix('s') {
        if stem == keyword {
            return true;
        }
        if let Some(stem) = stem.strip_suffix('e') {
            if stem == keyword {
                return true;
            }
        }
    }
    if let (Some(stem), Some(kw_stem)) = (token.strip_suffix("ies"), keyword.strip_suffix('y')) {
        return stem == kw_stem;
    }
    false
}
