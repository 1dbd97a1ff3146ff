// src/grouping.rs

//! Grouping policy resolution
//!
//! Decides how components map to output packages. The method is chosen from
//! three presence flags and one enumerated option, evaluated in a fixed
//! order where each one that is present overwrites the previous choice:
//!
//! 1. `COMPONENTS_ALL_IN_ONE_PACKAGE` → [`ComponentPackageMethod::OnePackage`]
//! 2. `COMPONENTS_IGNORE_GROUPS` → [`ComponentPackageMethod::OnePackagePerComponent`]
//! 3. `COMPONENTS_ONE_PACKAGE_PER_GROUP` → [`ComponentPackageMethod::OnePackagePerGroup`]
//! 4. `COMPONENTS_GROUPING` = `ALL_COMPONENTS_IN_ONE` | `IGNORE` | `ONE_PER_GROUP`
//!
//! The flags count as given when they are defined at all, whatever their
//! value. When nothing is given the backend default applies. A per-group
//! method with no groups but some components is demoted, so a plan never
//! ends up without units.

use crate::components::ComponentRegistry;
use crate::config::OptionSource;
use strum_macros::{Display, EnumString};
use tracing::{debug, warn};

/// How components are partitioned into packages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ComponentPackageMethod {
    /// Every component in a single package
    OnePackage,
    /// One package per component, groups ignored
    OnePackagePerComponent,
    /// One package per top-level group plus one per ungrouped component
    OnePackagePerGroup,
}

/// Outcome of policy resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupingDecision {
    /// Method the planner should use
    pub method: ComponentPackageMethod,
    /// Method asked for by configuration, if any
    pub requested: Option<ComponentPackageMethod>,
    /// Whether a per-group method was replaced because no groups exist
    pub demoted: bool,
}

/// Resolve the grouping method for one run
pub fn resolve_grouping(
    options: &dyn OptionSource,
    registry: &ComponentRegistry,
    backend_default: ComponentPackageMethod,
) -> GroupingDecision {
    let requested = requested_method(options);
    let mut method = requested.unwrap_or(backend_default);
    let mut demoted = false;

    if method == ComponentPackageMethod::OnePackagePerGroup
        && !registry.has_groups()
        && registry.has_components()
    {
        let fallback = if backend_default == ComponentPackageMethod::OnePackage {
            ComponentPackageMethod::OnePackage
        } else {
            ComponentPackageMethod::OnePackagePerComponent
        };
        warn!(
            "Grouping method {} requested but no component groups are defined; using {}",
            method, fallback
        );
        method = fallback;
        demoted = true;
    }

    debug!("Component package method: {}", method);
    GroupingDecision {
        method,
        requested,
        demoted,
    }
}

/// Method requested by configuration, last one given wins
fn requested_method(options: &dyn OptionSource) -> Option<ComponentPackageMethod> {
    let mut method = None;

    if options.is_set("COMPONENTS_ALL_IN_ONE_PACKAGE") {
        method = Some(ComponentPackageMethod::OnePackage);
    }
    if options.is_set("COMPONENTS_IGNORE_GROUPS") {
        method = Some(ComponentPackageMethod::OnePackagePerComponent);
    }
    if options.is_set("COMPONENTS_ONE_PACKAGE_PER_GROUP") {
        method = Some(ComponentPackageMethod::OnePackagePerGroup);
    }

    if let Some(grouping) = options.non_empty_option("COMPONENTS_GROUPING") {
        match grouping {
            "ALL_COMPONENTS_IN_ONE" => method = Some(ComponentPackageMethod::OnePackage),
            "IGNORE" => method = Some(ComponentPackageMethod::OnePackagePerComponent),
            "ONE_PER_GROUP" => method = Some(ComponentPackageMethod::OnePackagePerGroup),
            other => warn!(
                "COMPONENTS_GROUPING is set to an invalid value '{}'; \
                 expected ALL_COMPONENTS_IN_ONE, IGNORE or ONE_PER_GROUP",
                other
            ),
        }
    }

    method
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OptionMap;

    fn registry_with(options: &OptionMap, components: &[&str]) -> ComponentRegistry {
        let mut registry = ComponentRegistry::new();
        for name in components {
            registry.get_or_create_component(options, "demo", name);
        }
        registry
    }

    #[test]
    fn test_backend_default_when_unspecified() {
        let opts: OptionMap = [("COMPONENT_A_GROUP", "g")].into_iter().collect();
        let registry = registry_with(&opts, &["a"]);
        let decision = resolve_grouping(&opts, &registry, ComponentPackageMethod::OnePackagePerGroup);
        assert_eq!(decision.method, ComponentPackageMethod::OnePackagePerGroup);
        assert_eq!(decision.requested, None);
        assert!(!decision.demoted);
    }

    #[test]
    fn test_flags_are_presence_checks() {
        let opts: OptionMap = [("COMPONENTS_ALL_IN_ONE_PACKAGE", "OFF")].into_iter().collect();
        let registry = registry_with(&opts, &["a"]);
        let decision = resolve_grouping(&opts, &registry, ComponentPackageMethod::OnePackagePerComponent);
        assert_eq!(decision.method, ComponentPackageMethod::OnePackage);
    }

    #[test]
    fn test_later_flag_overrides_earlier() {
        let opts: OptionMap = [
            ("COMPONENTS_ALL_IN_ONE_PACKAGE", "ON"),
            ("COMPONENTS_IGNORE_GROUPS", "ON"),
        ]
        .into_iter()
        .collect();
        let registry = registry_with(&opts, &["a"]);
        let decision = resolve_grouping(&opts, &registry, ComponentPackageMethod::OnePackage);
        assert_eq!(decision.method, ComponentPackageMethod::OnePackagePerComponent);
    }

    #[test]
    fn test_grouping_string_overrides_flags() {
        let opts: OptionMap = [
            ("COMPONENTS_ONE_PACKAGE_PER_GROUP", "ON"),
            ("COMPONENTS_GROUPING", "ALL_COMPONENTS_IN_ONE"),
            ("COMPONENT_A_GROUP", "g"),
        ]
        .into_iter()
        .collect();
        let registry = registry_with(&opts, &["a"]);
        let decision = resolve_grouping(&opts, &registry, ComponentPackageMethod::OnePackagePerGroup);
        assert_eq!(decision.method, ComponentPackageMethod::OnePackage);
        assert_eq!(decision.requested, Some(ComponentPackageMethod::OnePackage));
    }

    #[test]
    fn test_invalid_grouping_string_keeps_method() {
        let opts: OptionMap = [
            ("COMPONENTS_IGNORE_GROUPS", "ON"),
            ("COMPONENTS_GROUPING", "BY_COLOR"),
        ]
        .into_iter()
        .collect();
        let registry = registry_with(&opts, &["a"]);
        let decision = resolve_grouping(&opts, &registry, ComponentPackageMethod::OnePackage);
        assert_eq!(decision.method, ComponentPackageMethod::OnePackagePerComponent);
    }

    #[test]
    fn test_per_group_demotion() {
        let opts = OptionMap::new();
        let registry = registry_with(&opts, &["a", "b"]);

        let decision = resolve_grouping(&opts, &registry, ComponentPackageMethod::OnePackagePerGroup);
        assert_eq!(decision.method, ComponentPackageMethod::OnePackagePerComponent);
        assert!(decision.demoted);

        let requested: OptionMap = [("COMPONENTS_GROUPING", "ONE_PER_GROUP")].into_iter().collect();
        let decision = resolve_grouping(&requested, &registry, ComponentPackageMethod::OnePackage);
        assert_eq!(decision.method, ComponentPackageMethod::OnePackage);
        assert!(decision.demoted);
    }

    #[test]
    fn test_no_demotion_without_components() {
        let opts = OptionMap::new();
        let registry = ComponentRegistry::new();
        let decision = resolve_grouping(&opts, &registry, ComponentPackageMethod::OnePackagePerGroup);
        assert_eq!(decision.method, ComponentPackageMethod::OnePackagePerGroup);
        assert!(!decision.demoted);
    }

    #[test]
    fn test_method_names() {
        assert_eq!(ComponentPackageMethod::OnePackagePerGroup.to_string(), "ONE_PACKAGE_PER_GROUP");
        assert_eq!(
            "ONE_PACKAGE".parse::<ComponentPackageMethod>().unwrap(),
            ComponentPackageMethod::OnePackage
        );
    }
}
