// src/components/mod.rs

//! Component model for component-aware packaging
//!
//! A project is described as a set of named components. Components may be
//! collected into (possibly nested) groups and offered in installation types,
//! and may depend on each other. The [`ComponentRegistry`] owns every record
//! and hands out typed ids; relationships between records are ids, never
//! references.
//!
//! # Usage
//!
//! ```ignore
//! use compack::components::ComponentRegistry;
//! use compack::config::OptionMap;
//!
//! let options = OptionMap::from_toml_str(r#"
//! COMPONENTS_ALL = ["lib", "app"]
//! COMPONENT_APP_DEPENDS = "lib"
//! "#)?;
//! let mut registry = ComponentRegistry::new();
//! registry.populate(&options, "demo");
//! let app = registry.component_id("app").unwrap();
//! assert_eq!(registry.dependency_closure(app).len(), 1);
//! ```
//!
//! Dependencies on packages outside the project are written as text and
//! parsed into [`DependenceSpec`] values.

mod dependence;
mod registry;

pub use dependence::{CompareOp, DependenceSpec, ResolutionContext};
pub use registry::{
    Component, ComponentGroup, ComponentId, ComponentRegistry, GroupId, InstallTypeId,
    InstallationType,
};
