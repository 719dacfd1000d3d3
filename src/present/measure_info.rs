//! Measure-info registry: display labels, categories and statements
//!
//! measure_info.json holds two kinds of entries:
//! 1. Direct entries keyed by a concrete variable name
//! 2. Template entries (e.g. `race_{variant.name}{category.name}`) that stand
//!    for every combination of their `variants` and `categories` keys
//!
//! Templates are expanded once when the registry is built. Template names are
//! also compiled into anchored patterns so a name that no expansion produced
//! can still be traced back to its entry.

use crate::lookup::error::Result;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

/// Key of the shared references block, never a measure
const REFERENCES_KEY: &str = "_references";

/// Category for anything without one
pub const DEFAULT_CATEGORY: &str = "Other";

/// Variant key that may also expand to nothing
const BLANK_VARIANT: &str = "blank";

/// Category key that may also expand to nothing
const ALL_CATEGORY: &str = "all";

/// Fields tried, in order, for the text substituted into a label
const LABEL_SOURCES: [&str; 4] = ["short_name", "default", "description", "long_name"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedVariable {
    pub name: String,
    pub label: String,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabeledVariable {
    pub name: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryGroup {
    pub category: String,
    pub variables: Vec<LabeledVariable>,
}

#[derive(Debug, Clone)]
struct Resolved {
    label: String,
    category: String,
}

#[derive(Debug, Clone)]
struct TemplatePattern {
    pattern: Regex,
    template: String,
}

#[derive(Debug, Clone, Default)]
pub struct MeasureRegistry {
    entries: Map<String, Value>,
    resolved: HashMap<String, Resolved>,
    patterns: Vec<TemplatePattern>,
}

impl MeasureRegistry {
    /// Build from the measure-info object; anything that is not an object yields an empty registry
    pub fn from_value(value: &Value) -> Result<Self> {
        let entries = value.as_object().cloned().unwrap_or_default();
        let placeholder = Regex::new(r"\{[^}]+\}")?;
        let whitespace = Regex::new(r"\s+")?;

        let mut resolved = HashMap::new();
        let mut patterns = Vec::new();

        for (name, info) in &entries {
            if name == REFERENCES_KEY {
                continue;
            }
            let Some(entry) = info.as_object() else {
                continue;
            };
            let has_category = entry.contains_key("category");
            let has_short_name = entry.contains_key("short_name");
            if !has_category && !has_short_name {
                continue;
            }

            let category = non_empty(entry.get("category"))
                .unwrap_or(DEFAULT_CATEGORY)
                .to_string();
            let short_name = non_empty(entry.get("short_name")).unwrap_or(name).to_string();

            if !name.contains('{') {
                resolved.insert(
                    name.clone(),
                    Resolved {
                        label: short_name,
                        category,
                    },
                );
                continue;
            }

            if has_short_name {
                patterns.push(TemplatePattern {
                    pattern: template_pattern(name, &placeholder)?,
                    template: name.clone(),
                });
            }

            let variants = keyed_objects(entry.get("variants"));
            let categories = keyed_objects(entry.get("categories"));
            if variants.is_empty() && categories.is_empty() {
                continue;
            }

            let variant_options = optional_keys(variants);
            let category_options = optional_keys(categories);

            for variant in variant_options.iter().copied() {
                for cat in category_options.iter().copied() {
                    let label = resolve_label(
                        &short_name,
                        variant.and_then(|(_, meta)| meta),
                        cat.and_then(|(_, meta)| meta),
                        &placeholder,
                        &whitespace,
                    );
                    for expanded in
                        expand_names(name, variant.map(|(k, _)| k), cat.map(|(k, _)| k))
                    {
                        resolved.insert(
                            expanded,
                            Resolved {
                                label: label.clone(),
                                category: category.clone(),
                            },
                        );
                    }
                }
            }
        }

        tracing::debug!(
            "Measure registry: {} entries, {} resolved names, {} template patterns",
            entries.len(),
            resolved.len(),
            patterns.len()
        );

        Ok(MeasureRegistry {
            entries,
            resolved,
            patterns,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty() && self.patterns.is_empty()
    }

    /// Raw measure entry for a variable: direct entry first, then the first matching template
    pub fn find(&self, name: &str) -> Option<&Map<String, Value>> {
        if let Some(direct) = self.entries.get(name).and_then(Value::as_object) {
            if direct.contains_key("short_name") {
                return Some(direct);
            }
        }
        self.patterns
            .iter()
            .find(|p| p.pattern.is_match(name))
            .and_then(|p| self.entries.get(&p.template))
            .and_then(Value::as_object)
    }

    /// Label and category for each name, in input order
    pub fn resolve_variables<I, S>(&self, names: I) -> Vec<ResolvedVariable>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .map(|name| {
                let name = name.as_ref();
                match self.resolved.get(name) {
                    Some(r) => ResolvedVariable {
                        name: name.to_string(),
                        label: r.label.clone(),
                        category: r.category.clone(),
                    },
                    None => ResolvedVariable {
                        name: name.to_string(),
                        label: fallback_label(name),
                        category: DEFAULT_CATEGORY.to_string(),
                    },
                }
            })
            .collect()
    }

    /// Region statement with `{features.name}` and `{value}` filled in
    pub fn statement(
        &self,
        name: &str,
        region_name: &str,
        value: Option<f64>,
        digits: usize,
    ) -> Option<String> {
        let template = non_empty(self.find(name)?.get("statement"))?;
        let value = match value {
            Some(v) => format!("{:.*}", digits, v),
            None => "NA".to_string(),
        };
        Some(
            template
                .replacen("{features.name}", region_name, 1)
                .replacen("{value}", &value, 1),
        )
    }
}

/// Group by category (sorted), labels sorted within each group
pub fn group_by_category(variables: &[ResolvedVariable]) -> Vec<CategoryGroup> {
    let mut groups: BTreeMap<&str, Vec<LabeledVariable>> = BTreeMap::new();
    for v in variables {
        groups.entry(&v.category).or_default().push(LabeledVariable {
            name: v.name.clone(),
            label: v.label.clone(),
        });
    }
    groups
        .into_iter()
        .map(|(category, mut variables)| {
            variables.sort_by(|a, b| a.label.cmp(&b.label));
            CategoryGroup {
                category: category.to_string(),
                variables,
            }
        })
        .collect()
}

fn non_empty(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}

type KeyedMeta<'a> = (&'a str, Option<&'a Map<String, Value>>);

fn keyed_objects(value: Option<&Value>) -> Vec<KeyedMeta<'_>> {
    value
        .and_then(Value::as_object)
        .map(|map| map.iter().map(|(k, v)| (k.as_str(), v.as_object())).collect())
        .unwrap_or_default()
}

/// A side with no keys still contributes one pass with nothing substituted
fn optional_keys(keys: Vec<KeyedMeta<'_>>) -> Vec<Option<KeyedMeta<'_>>> {
    if keys.is_empty() {
        vec![None]
    } else {
        keys.into_iter().map(Some).collect()
    }
}

/// Anchored pattern for a template name, one or more characters per placeholder
fn template_pattern(template: &str, placeholder: &Regex) -> Result<Regex> {
    let mut pattern = String::from("^");
    let mut last = 0;
    for m in placeholder.find_iter(template) {
        pattern.push_str(&regex::escape(&template[last..m.start()]));
        pattern.push_str("(.+)");
        last = m.end();
    }
    pattern.push_str(&regex::escape(&template[last..]));
    pattern.push('$');
    Ok(Regex::new(&pattern)?)
}

/// Every concrete name a template yields for one variant/category pair
fn expand_names(template: &str, variant: Option<&str>, category: Option<&str>) -> Vec<String> {
    let variant_options: Vec<&str> = match variant {
        None => vec![""],
        Some(BLANK_VARIANT) => vec!["", BLANK_VARIANT],
        Some(key) => vec![key],
    };
    let category_options: Vec<&str> = match category {
        None => vec![""],
        Some(ALL_CATEGORY) => vec!["", ALL_CATEGORY],
        Some(key) => vec![key],
    };

    let mut names = Vec::with_capacity(variant_options.len() * category_options.len());
    for v in &variant_options {
        for c in &category_options {
            names.push(
                template
                    .replace("{variant.name}", v)
                    .replace("{variant}", v)
                    .replace("{category.name}", c)
                    .replace("{category}", c),
            );
        }
    }
    names
}

fn label_source(meta: Option<&Map<String, Value>>) -> &str {
    meta.and_then(|m| LABEL_SOURCES.iter().find_map(|key| non_empty(m.get(*key))))
        .unwrap_or("")
}

fn resolve_label(
    template: &str,
    variant: Option<&Map<String, Value>>,
    category: Option<&Map<String, Value>>,
    placeholder: &Regex,
    whitespace: &Regex,
) -> String {
    let variant_text = label_source(variant);
    let category_text = label_source(category);
    let label = template
        .replace("{variant.name}", variant_text)
        .replace("{variant}", variant_text)
        .replace("{category.name}", category_text)
        .replace("{category}", category_text);
    let label = placeholder.replace_all(&label, "");
    let label = whitespace.replace_all(&label, " ");
    let label = label.trim();
    if label.is_empty() {
        template.to_string()
    } else {
        label.to_string()
    }
}

/// `median_read_pass_rate` → `Median Read Pass Rate`
pub fn fallback_label(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut prev_word = false;
    for ch in name.chars() {
        let ch = if ch == '_' { ' ' } else { ch };
        let is_word = ch.is_alphanumeric();
        if is_word && !prev_word {
            out.extend(ch.to_uppercase());
        } else {
            out.push(ch);
        }
        prev_word = is_word;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> MeasureRegistry {
        MeasureRegistry::from_value(&json!({
            "_references": { "acs": { "title": "ACS" } },
            "disconnectedYouth": {
                "category": "Education",
                "short_name": "Disconnected youth",
                "statement": "In {features.name}, {value}% of youth are disconnected."
            },
            "race_{variant.name}{category.name}": {
                "category": "Demographics",
                "short_name": "{variant} population {category}",
                "statement": "{features.name}: {value}",
                "variants": {
                    "afr_amer_alone_percent": { "default": "African American" },
                    "white_alone_percent": { "short_name": "White" }
                },
                "categories": {
                    "_direct": { "description": "(direct)" }
                }
            },
            "population{variant}{category.name}": {
                "category": "Demographics",
                "short_name": "Total population",
                "variants": { "blank": {} },
                "categories": { "all": {}, "_direct": {} }
            },
            "{variant.name}_read_pass_rate": {
                "short_name": "{variant} reading pass rate",
                "variants": { "median": { "long_name": "Median" } }
            },
            "not_a_measure": 4,
            "no_fields": { "long_name": "Ignored" }
        }))
        .unwrap()
    }

    #[test]
    fn test_direct_and_template_labels() {
        let reg = sample();
        let names = [
            "disconnectedYouth",
            "race_afr_amer_alone_percent_direct",
            "race_white_alone_percent_direct",
            "median_read_pass_rate",
        ];
        let resolved = reg.resolve_variables(names);
        assert_eq!(resolved[0].label, "Disconnected youth");
        assert_eq!(resolved[0].category, "Education");
        assert_eq!(resolved[1].label, "African American population (direct)");
        assert_eq!(resolved[1].category, "Demographics");
        assert_eq!(resolved[2].label, "White population (direct)");
        assert_eq!(resolved[3].label, "Median reading pass rate");
        assert_eq!(resolved[3].category, "Other");
    }

    #[test]
    fn test_blank_and_all_keys_expand_both_ways() {
        let reg = sample();
        let resolved = reg.resolve_variables([
            "population",
            "populationblank",
            "populationall",
            "population_direct",
            "populationblank_direct",
        ]);
        assert!(resolved.iter().all(|r| r.label == "Total population"));
    }

    #[test]
    fn test_unknown_names_fall_back() {
        let reg = sample();
        let resolved = reg.resolve_variables(["no_fields", "median_household_income"]);
        assert_eq!(resolved[0].label, "No Fields");
        assert_eq!(resolved[1].label, "Median Household Income");
        assert_eq!(resolved[1].category, "Other");
        assert_eq!(fallback_label("rate_2x"), "Rate 2x");
    }

    #[test]
    fn test_find_through_template_pattern() {
        let reg = sample();
        assert!(reg.find("disconnectedYouth").is_some());
        let entry = reg.find("race_asian_alone_percent_total").unwrap();
        assert_eq!(entry["category"], "Demographics");
        assert!(reg.find("race_").is_none());
        assert!(reg.find("_references").is_none());
        assert!(reg.find("no_fields").is_none());
    }

    #[test]
    fn test_statement() {
        let reg = sample();
        assert_eq!(
            reg.statement("disconnectedYouth", "Accomack", Some(12.345), 1),
            Some("In Accomack, 12.3% of youth are disconnected.".to_string())
        );
        assert_eq!(
            reg.statement("race_white_alone_percent_direct", "51001", None, 2),
            Some("51001: NA".to_string())
        );
        assert_eq!(reg.statement("population", "X", Some(1.0), 0), None);
    }

    #[test]
    fn test_group_by_category() {
        let reg = sample();
        let resolved = reg.resolve_variables([
            "race_white_alone_percent_direct",
            "zeta",
            "disconnectedYouth",
            "race_afr_amer_alone_percent_direct",
        ]);
        let groups = group_by_category(&resolved);
        let categories: Vec<&str> = groups.iter().map(|g| g.category.as_str()).collect();
        assert_eq!(categories, vec!["Demographics", "Education", "Other"]);
        assert_eq!(
            groups[0].variables[0].name,
            "race_afr_amer_alone_percent_direct"
        );
    }

    #[test]
    fn test_non_object_is_empty() {
        let reg = MeasureRegistry::from_value(&json!([1, 2])).unwrap();
        assert!(reg.find("anything").is_none());
        assert!(reg.is_empty());
    }
}
