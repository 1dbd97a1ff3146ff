// src/config.rs

//! Configuration options for a packaging run
//!
//! Everything the engine knows about a project arrives as a flat map of
//! upper-case keys to string values. The [`OptionSource`] trait is the only
//! surface the registry, policy resolver and planner read from; the
//! [`OptionMap`] type is the concrete store loaded from a TOML file and
//! command-line overrides.
//!
//! # File format
//!
//! ```toml
//! PACKAGE_NAME = "demo"
//! PACKAGE_VERSION = "1.2.0"
//! COMPONENTS_ALL = ["lib", "app", "docs"]
//!
//! [COMPONENT.APP]
//! DEPENDS = ["lib"]
//! GROUP = "runtime"
//! ```
//!
//! Nested tables are flattened by joining keys with `_`, so the table above
//! defines `COMPONENT_APP_DEPENDS` and `COMPONENT_APP_GROUP`. Booleans become
//! `ON`/`OFF` and arrays become `;`-separated lists.

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::path::Path;

/// Separator used by list-valued options
pub const LIST_SEPARATOR: char = ';';

/// Read-only view over configuration options
pub trait OptionSource {
    /// Get the raw value of an option, if it is defined
    fn get_option(&self, key: &str) -> Option<&str>;

    /// Is the option defined at all (even as an empty or false value)?
    fn is_set(&self, key: &str) -> bool {
        self.get_option(key).is_some()
    }

    /// Is the option defined with a true value?
    fn is_on(&self, key: &str) -> bool {
        self.get_option(key).is_some_and(is_on_value)
    }

    /// Is the option defined with a false value?
    ///
    /// Undefined options are neither on nor off.
    fn is_off(&self, key: &str) -> bool {
        self.get_option(key).is_some_and(is_off_value)
    }

    /// Is the option undefined or defined as the empty string?
    fn is_empty(&self, key: &str) -> bool {
        self.get_option(key).is_none_or(str::is_empty)
    }

    /// Split a list value into its elements
    fn expand_list(&self, raw: &str) -> Vec<String> {
        expand_list(raw)
    }

    /// Get an option only when it holds a non-empty value
    fn non_empty_option(&self, key: &str) -> Option<&str> {
        self.get_option(key).filter(|v| !v.is_empty())
    }

    /// Get a list option, expanded
    fn list_option(&self, key: &str) -> Vec<String> {
        self.get_option(key)
            .map(|raw| self.expand_list(raw))
            .unwrap_or_default()
    }
}

/// Is this a true value?
///
/// `1`, `ON`, `YES`, `TRUE`, `Y` (any case) and non-zero integers are true.
pub fn is_on_value(value: &str) -> bool {
    let upper = value.trim().to_ascii_uppercase();
    match upper.as_str() {
        "1" | "ON" | "YES" | "TRUE" | "Y" => true,
        _ => upper.parse::<i64>().is_ok_and(|n| n != 0),
    }
}

/// Is this a false value?
///
/// The empty string, `0`, `OFF`, `NO`, `FALSE`, `N`, `IGNORE`, `NOTFOUND`
/// and anything ending in `-NOTFOUND` are false.
pub fn is_off_value(value: &str) -> bool {
    let upper = value.trim().to_ascii_uppercase();
    matches!(
        upper.as_str(),
        "" | "0" | "OFF" | "NO" | "FALSE" | "N" | "IGNORE" | "NOTFOUND"
    ) || upper.ends_with("-NOTFOUND")
}

/// Split a `;`-separated list, trimming elements and dropping empty ones
pub fn expand_list(raw: &str) -> Vec<String> {
    raw.split(LIST_SEPARATOR)
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Join list elements into a single option value
pub fn join_list<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items
        .into_iter()
        .map(|s| s.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(";")
}

/// Concrete option store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionMap {
    options: BTreeMap<String, String>,
}

impl OptionMap {
    /// Create an empty option map
    pub fn new() -> Self {
        Self::default()
    }

    /// Load options from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!(
                "failed to read configuration file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse options from a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let table: toml::Table = content.parse()?;
        let mut map = Self::new();
        for (key, value) in &table {
            map.flatten_value(&key.to_ascii_uppercase(), value)?;
        }
        Ok(map)
    }

    fn flatten_value(&mut self, key: &str, value: &toml::Value) -> Result<()> {
        match value {
            toml::Value::Table(table) => {
                for (child, child_value) in table {
                    let child_key = format!("{}_{}", key, child.to_ascii_uppercase());
                    self.flatten_value(&child_key, child_value)?;
                }
            }
            toml::Value::Array(items) => {
                let mut rendered = Vec::with_capacity(items.len());
                for item in items {
                    rendered.push(render_scalar(key, item)?);
                }
                self.set_option(key, join_list(rendered));
            }
            scalar => {
                let rendered = render_scalar(key, scalar)?;
                self.set_option(key, rendered);
            }
        }
        Ok(())
    }

    /// Parse a `KEY=VALUE` override
    pub fn apply_override(&mut self, assignment: &str) -> Result<()> {
        let (key, value) = assignment.split_once('=').ok_or_else(|| {
            Error::config(format!(
                "invalid option override '{}': expected KEY=VALUE",
                assignment
            ))
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::config(format!(
                "invalid option override '{}': empty key",
                assignment
            )));
        }
        self.set_option(key, value);
        Ok(())
    }

    /// Set an option, replacing any previous value
    pub fn set_option(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.options.insert(key.into(), value.into());
    }

    /// Set an option only if it is not already defined
    pub fn set_option_if_not_set(&mut self, key: &str, value: impl Into<String>) {
        if !self.options.contains_key(key) {
            self.options.insert(key.to_string(), value.into());
        }
    }

    /// Remove an option
    pub fn remove_option(&mut self, key: &str) -> Option<String> {
        self.options.remove(key)
    }

    /// Iterate over all options in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.options.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl OptionSource for OptionMap {
    fn get_option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for OptionMap {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.set_option(k, v);
        }
        map
    }
}

fn render_scalar(key: &str, value: &toml::Value) -> Result<String> {
    match value {
        toml::Value::String(s) => Ok(s.clone()),
        toml::Value::Integer(i) => Ok(i.to_string()),
        toml::Value::Float(f) => Ok(f.to_string()),
        toml::Value::Boolean(b) => Ok(if *b { "ON" } else { "OFF" }.to_string()),
        toml::Value::Datetime(dt) => Ok(dt.to_string()),
        toml::Value::Array(_) | toml::Value::Table(_) => Err(Error::config(format!(
            "option {} may only contain scalar list elements",
            key
        ))),
    }
}

/// Upper-case a record name for use inside an option key
pub fn key_name(name: &str) -> String {
    name.to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        for v in ["1", "ON", "on", "Yes", "TRUE", "y", "42", "-1"] {
            assert!(is_on_value(v), "{} should be on", v);
        }
        for v in ["", "0", "OFF", "no", "False", "N", "IGNORE", "NOTFOUND", "ZLIB-NOTFOUND"] {
            assert!(is_off_value(v), "{} should be off", v);
            assert!(!is_on_value(v), "{} should not be on", v);
        }
        // Neither on nor off
        assert!(!is_on_value("maybe"));
        assert!(!is_off_value("maybe"));
    }

    #[test]
    fn test_expand_list() {
        assert_eq!(expand_list("a;b; c ;;d"), vec!["a", "b", "c", "d"]);
        assert!(expand_list("").is_empty());
        assert!(expand_list(";;").is_empty());
    }

    #[test]
    fn test_option_source_defaults() {
        let map: OptionMap = [("A", "ON"), ("B", ""), ("C", "OFF")].into_iter().collect();
        assert!(map.is_on("A"));
        assert!(!map.is_on("MISSING"));
        assert!(!map.is_off("MISSING"));
        assert!(map.is_off("B"));
        assert!(map.is_off("C"));
        assert!(map.is_empty("B"));
        assert!(map.is_empty("MISSING"));
        assert!(!map.is_empty("A"));
        assert!(map.is_set("B"));
        assert_eq!(map.non_empty_option("B"), None);
    }

    #[test]
    fn test_from_toml_flattens_tables() {
        let content = r#"
package_name = "demo"
COMPONENTS_ALL = ["lib", "app"]
MONOLITHIC_INSTALL = false

[COMPONENT.app]
DEPENDS = ["lib"]
REQUIRED = true
PRIORITY = 3
"#;
        let map = OptionMap::from_toml_str(content).unwrap();
        assert_eq!(map.get_option("PACKAGE_NAME"), Some("demo"));
        assert_eq!(map.get_option("COMPONENTS_ALL"), Some("lib;app"));
        assert_eq!(map.get_option("MONOLITHIC_INSTALL"), Some("OFF"));
        assert_eq!(map.get_option("COMPONENT_APP_DEPENDS"), Some("lib"));
        assert!(map.is_on("COMPONENT_APP_REQUIRED"));
        assert_eq!(map.get_option("COMPONENT_APP_PRIORITY"), Some("3"));
        assert_eq!(map.list_option("COMPONENTS_ALL"), vec!["lib", "app"]);
    }

    #[test]
    fn test_from_toml_rejects_nested_arrays() {
        let err = OptionMap::from_toml_str("LIST = [[1, 2]]").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let err = OptionMap::from_toml_str("= nope").unwrap_err();
        assert!(matches!(err, Error::TomlParse(_)));
    }

    #[test]
    fn test_apply_override() {
        let mut map = OptionMap::new();
        map.apply_override("PACKAGE_VERSION=2.0").unwrap();
        map.apply_override("EMPTY=").unwrap();
        assert_eq!(map.get_option("PACKAGE_VERSION"), Some("2.0"));
        assert_eq!(map.get_option("EMPTY"), Some(""));
        assert!(map.apply_override("NOEQUALS").is_err());
        assert!(map.apply_override("=value").is_err());
    }

    #[test]
    fn test_set_option_if_not_set() {
        let mut map = OptionMap::new();
        map.set_option("A", "1");
        map.set_option_if_not_set("A", "2");
        map.set_option_if_not_set("B", "3");
        assert_eq!(map.get_option("A"), Some("1"));
        assert_eq!(map.get_option("B"), Some("3"));
    }
}
