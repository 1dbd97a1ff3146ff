// src/lib.rs

//! Compack packaging engine
//!
//! Turns a staged install tree into distributable packages, splitting it
//! along component boundaries when the project declares components.
//!
//! # Architecture
//!
//! - Registry: components, groups and installation types read from options
//! - Grouping: chooses how components are partitioned into packages
//! - Planner: packaging units, output names and cross-unit dependencies
//! - Generators: archive, descriptor and installer backends driven by one
//!   state machine
//! - Tools: external packaging programs, with captured output logs

pub mod checksum;
pub mod components;
pub mod config;
pub mod diagnostics;
mod error;
pub mod generator;
pub mod grouping;
pub mod planner;
pub mod staging;
pub mod tool;

pub use checksum::ChecksumAlgorithm;
pub use components::{
    CompareOp, Component, ComponentGroup, ComponentId, ComponentRegistry, DependenceSpec, GroupId,
    InstallationType, ResolutionContext,
};
pub use config::{OptionMap, OptionSource};
pub use error::{Error, ErrorKind, Result};
pub use generator::{
    Generator, GeneratorKind, PackageLayout, PackagingBackend, PackagingReport, PlanPreview,
    RunState,
};
pub use grouping::{ComponentPackageMethod, GroupingDecision};
pub use planner::{PackagingPlan, PackagingUnit, UnitKind};
pub use staging::InstallTree;
