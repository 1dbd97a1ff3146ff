// src/components/dependence.rs

//! Textual cross-package dependencies
//!
//! Backends that can depend on packages outside the current build accept
//! dependency specs such as `zlib`, `zlib-1.2` or `zlib->=1.2.3`. These are
//! parsed into [`DependenceSpec`] values. A spec that does not fit any of
//! the accepted shapes is kept as an opaque name; parsing never fails.
//!
//! Specs compare and order by name only, so a sorted set holds at most one
//! constraint per package name.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;
use std::hash::{Hash, Hasher};
use strum_macros::{Display, EnumIter};

const OPERATOR_CHARS: [char; 3] = ['<', '>', '='];

/// Version comparison attached to a dependency spec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumIter)]
pub enum CompareOp {
    #[default]
    #[strum(serialize = "")]
    None,
    #[strum(serialize = "=")]
    Equal,
    #[strum(serialize = "<")]
    Less,
    #[strum(serialize = "<=")]
    LessOrEqual,
    #[strum(serialize = ">")]
    Greater,
    #[strum(serialize = ">=")]
    GreaterOrEqual,
}

impl CompareOp {
    /// Split a leading operator off `s`, preferring two-character operators
    fn strip(s: &str) -> Option<(Self, &str)> {
        if let Some(rest) = s.strip_prefix("<=") {
            Some((Self::LessOrEqual, rest))
        } else if let Some(rest) = s.strip_prefix(">=") {
            Some((Self::GreaterOrEqual, rest))
        } else if let Some(rest) = s.strip_prefix('<') {
            Some((Self::Less, rest))
        } else if let Some(rest) = s.strip_prefix('>') {
            Some((Self::Greater, rest))
        } else if let Some(rest) = s.strip_prefix('=') {
            Some((Self::Equal, rest))
        } else {
            None
        }
    }
}

/// A parsed dependency on another package
#[derive(Debug, Clone, Default)]
pub struct DependenceSpec {
    pub name: String,
    pub compare: CompareOp,
    pub value: String,
}

impl DependenceSpec {
    /// A dependency on a package name without a version constraint
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Parse a dependency spec
    ///
    /// Accepted shapes:
    /// - `name`
    /// - `name-value` (version without comparison)
    /// - `name<op>value` and `name-<op>value`
    ///
    /// Anything else becomes an opaque spec whose name is the whole input.
    pub fn parse(input: &str) -> Self {
        Self::parse_structured(input).unwrap_or_else(|| Self::named(input))
    }

    fn parse_structured(input: &str) -> Option<Self> {
        let Some(op_pos) = input.find(OPERATOR_CHARS) else {
            return match input.split_once('-') {
                Some((name, value)) if !name.is_empty() && !value.is_empty() => Some(Self {
                    name: name.to_string(),
                    compare: CompareOp::None,
                    value: value.to_string(),
                }),
                Some(_) => None,
                None => Some(Self::named(input)),
            };
        };

        let (head, tail) = input.split_at(op_pos);
        let name = head.strip_suffix('-').unwrap_or(head);
        // The operator must follow the name itself or the first dash
        if name.is_empty() || name.contains('-') {
            return None;
        }

        let (compare, value) = CompareOp::strip(tail)?;
        if value.is_empty() || value.contains(OPERATOR_CHARS) {
            return None;
        }

        Some(Self {
            name: name.to_string(),
            compare,
            value: value.to_string(),
        })
    }

    /// Does the spec carry a version constraint?
    pub fn has_constraint(&self) -> bool {
        self.compare != CompareOp::None
    }
}

impl fmt::Display for DependenceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_constraint() {
            write!(f, "{}-{}{}", self.name, self.compare, self.value)
        } else if !self.value.is_empty() {
            write!(f, "{}-{}", self.name, self.value)
        } else {
            write!(f, "{}", self.name)
        }
    }
}

impl PartialEq for DependenceSpec {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for DependenceSpec {}

impl Hash for DependenceSpec {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl PartialOrd for DependenceSpec {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DependenceSpec {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}

/// Packages referenced by name that are not produced by this run
///
/// Shared by every unit planned in one run. The first spec registered for a
/// name is kept; later registrations of the same name return it unchanged.
#[derive(Debug, Default)]
pub struct ResolutionContext {
    dependent_packages: BTreeMap<String, DependenceSpec>,
}

impl ResolutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a spec under its name, returning the spec now on record
    pub fn register(&mut self, spec: DependenceSpec) -> &DependenceSpec {
        match self.dependent_packages.entry(spec.name.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(spec),
        }
    }

    pub fn get(&self, name: &str) -> Option<&DependenceSpec> {
        self.dependent_packages.get(name)
    }

    /// Registered specs in name order
    pub fn iter(&self) -> impl Iterator<Item = &DependenceSpec> {
        self.dependent_packages.values()
    }

    pub fn len(&self) -> usize {
        self.dependent_packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependent_packages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use strum::IntoEnumIterator;

    #[test]
    fn test_parse_plain_name() {
        let spec = DependenceSpec::parse("zlib");
        assert_eq!(spec.name, "zlib");
        assert_eq!(spec.compare, CompareOp::None);
        assert!(spec.value.is_empty());
        assert_eq!(spec.to_string(), "zlib");
    }

    #[test]
    fn test_parse_legacy_version() {
        let spec = DependenceSpec::parse("zlib-1.2");
        assert_eq!(spec.name, "zlib");
        assert_eq!(spec.compare, CompareOp::None);
        assert_eq!(spec.value, "1.2");
        assert_eq!(spec.to_string(), "zlib-1.2");
    }

    #[test]
    fn test_parse_operators() {
        let cases = [
            ("zlib>=1.2.3", CompareOp::GreaterOrEqual),
            ("zlib<=1.2.3", CompareOp::LessOrEqual),
            ("zlib<1.2.3", CompareOp::Less),
            ("zlib>1.2.3", CompareOp::Greater),
            ("zlib=1.2.3", CompareOp::Equal),
            ("zlib->=1.2.3", CompareOp::GreaterOrEqual),
        ];
        for (input, op) in cases {
            let spec = DependenceSpec::parse(input);
            assert_eq!(spec.name, "zlib", "{}", input);
            assert_eq!(spec.compare, op, "{}", input);
            assert_eq!(spec.value, "1.2.3", "{}", input);
        }
    }

    #[test]
    fn test_round_trip_with_dash_operator() {
        for op in CompareOp::iter().filter(|op| *op != CompareOp::None) {
            let text = format!("qtbase-{}5.15", op);
            assert_eq!(DependenceSpec::parse(&text).to_string(), text);
        }
        assert_eq!(DependenceSpec::parse("qtbase").to_string(), "qtbase");
    }

    #[test]
    fn test_malformed_degrades_to_opaque_name() {
        for input in [">=1.2.3", "zlib>=", "zlib-1.2>=3", "zlib>=1>=2", "zlib-", "-1.0", "a-b-c>1"] {
            let spec = DependenceSpec::parse(input);
            assert_eq!(spec.name, input);
            assert_eq!(spec.compare, CompareOp::None);
            assert_eq!(spec.to_string(), input);
        }
    }

    #[test]
    fn test_ordering_ignores_constraint() {
        let a = DependenceSpec::parse("zlib>=1.0");
        let b = DependenceSpec::parse("zlib<2.0");
        assert_eq!(a, b);

        let set: BTreeSet<DependenceSpec> = [
            DependenceSpec::parse("zlib>=1.0"),
            DependenceSpec::parse("bzip2"),
            DependenceSpec::parse("zlib<2.0"),
        ]
        .into_iter()
        .collect();
        let rendered: Vec<String> = set.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["bzip2", "zlib->=1.0"]);
    }

    #[test]
    fn test_first_registration_wins() {
        let mut ctx = ResolutionContext::new();
        ctx.register(DependenceSpec::parse("openssl>=1.1"));
        let kept = ctx.register(DependenceSpec::parse("openssl<3.0")).clone();
        assert_eq!(kept.compare, CompareOp::GreaterOrEqual);
        assert_eq!(kept.value, "1.1");
        assert_eq!(ctx.len(), 1);
        assert_eq!(ctx.get("openssl").map(|s| s.value.as_str()), Some("1.1"));
    }
}
