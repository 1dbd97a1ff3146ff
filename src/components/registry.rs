// src/components/registry.rs

//! Component, group and installation type registry
//!
//! Records are created lazily the first time their name is referenced and
//! are populated from configuration at that moment. Each record lives in an
//! arena and is addressed by a typed id; cross references (group membership,
//! parent groups, dependencies) are ids into the same arena.

use crate::config::{OptionSource, key_name};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

/// Identifies a component in a [`ComponentRegistry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(usize);

/// Identifies a component group in a [`ComponentRegistry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(usize);

/// Identifies an installation type in a [`ComponentRegistry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstallTypeId(usize);

/// One named installable unit
#[derive(Debug, Clone, Default)]
pub struct Component {
    pub name: String,
    /// Project the component was first referenced from
    pub project: String,
    pub display_name: String,
    pub description: String,
    pub is_required: bool,
    pub is_hidden: bool,
    pub is_disabled_by_default: bool,
    /// Installed on demand from a separate archive
    pub is_downloaded: bool,
    pub archive_file: Option<String>,
    pub plist: Option<String>,
    /// Installed files, relative to the component's staging directory
    pub files: Vec<String>,
    /// Installed directories, relative to the component's staging directory
    pub directories: Vec<String>,
    pub group: Option<GroupId>,
    pub dependencies: Vec<ComponentId>,
    pub reverse_dependencies: Vec<ComponentId>,
    pub installation_types: Vec<InstallTypeId>,
}

/// Named container of components and subgroups
#[derive(Debug, Clone, Default)]
pub struct ComponentGroup {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub is_bold: bool,
    pub is_expanded_by_default: bool,
    pub components: Vec<ComponentId>,
    pub parent_group: Option<GroupId>,
    pub subgroups: Vec<GroupId>,
}

impl ComponentGroup {
    /// A group without components or subgroups
    pub fn is_empty(&self) -> bool {
        self.components.is_empty() && self.subgroups.is_empty()
    }
}

/// Install profile selectable at install time
#[derive(Debug, Clone, Default)]
pub struct InstallationType {
    pub name: String,
    pub display_name: String,
    /// 1-based position in discovery order
    pub index: usize,
}

/// Owner of every component, group and installation type in a run
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    components: Vec<Component>,
    groups: Vec<ComponentGroup>,
    install_types: Vec<InstallationType>,
    component_index: BTreeMap<String, ComponentId>,
    group_index: BTreeMap<String, GroupId>,
    install_type_index: BTreeMap<String, InstallTypeId>,
}

impl ComponentRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate the registry from the discovery lists
    ///
    /// Installation types named in `ALL_INSTALL_TYPES` are created first so
    /// their indices follow the order of that list; components named in
    /// `COMPONENTS_ALL` are created next, pulling in their groups,
    /// installation types and dependencies.
    pub fn populate(&mut self, options: &dyn OptionSource, project: &str) {
        for install_type in options.list_option("ALL_INSTALL_TYPES") {
            self.get_or_create_installation_type(options, project, &install_type);
        }
        for component in options.list_option("COMPONENTS_ALL") {
            self.get_or_create_component(options, project, &component);
        }
        debug!(
            "Registry populated: {} components, {} groups, {} installation types",
            self.components.len(),
            self.groups.len(),
            self.install_types.len()
        );
    }

    /// Get a component by name, creating it from configuration if needed
    pub fn get_or_create_component(
        &mut self,
        options: &dyn OptionSource,
        project: &str,
        name: &str,
    ) -> ComponentId {
        if let Some(&id) = self.component_index.get(name) {
            return id;
        }

        let prefix = format!("COMPONENT_{}", key_name(name));
        let id = ComponentId(self.components.len());
        let component = Component {
            name: name.to_string(),
            project: project.to_string(),
            display_name: options
                .non_empty_option(&format!("{}_DISPLAY_NAME", prefix))
                .unwrap_or(name)
                .to_string(),
            description: options
                .non_empty_option(&format!("{}_DESCRIPTION", prefix))
                .unwrap_or_default()
                .to_string(),
            is_required: options.is_on(&format!("{}_REQUIRED", prefix)),
            is_hidden: options.is_on(&format!("{}_HIDDEN", prefix)),
            is_disabled_by_default: options.is_on(&format!("{}_DISABLED", prefix)),
            is_downloaded: options.is_on(&format!("{}_DOWNLOADED", prefix))
                || options.is_on("DOWNLOAD_ALL"),
            archive_file: options
                .non_empty_option(&format!("{}_ARCHIVE_FILE", prefix))
                .map(str::to_string),
            plist: options
                .non_empty_option(&format!("{}_PLIST", prefix))
                .map(str::to_string),
            ..Default::default()
        };

        // Register before following references so cycles terminate here
        self.components.push(component);
        self.component_index.insert(name.to_string(), id);

        if let Some(group_name) = options.non_empty_option(&format!("{}_GROUP", prefix)) {
            let group = self.get_or_create_component_group(options, project, group_name);
            self.components[id.0].group = Some(group);
            self.groups[group.0].components.push(id);
        }

        if let Some(raw) = options.non_empty_option(&format!("{}_INSTALL_TYPES", prefix)) {
            for install_type in options.expand_list(raw) {
                let type_id = self.get_or_create_installation_type(options, project, &install_type);
                let types = &mut self.components[id.0].installation_types;
                if !types.contains(&type_id) {
                    types.push(type_id);
                }
            }
        }

        if let Some(raw) = options.non_empty_option(&format!("{}_DEPENDS", prefix)) {
            for dependency in options.expand_list(raw) {
                let dep_id = self.get_or_create_component(options, project, &dependency);
                self.add_dependency(id, dep_id);
            }
        }

        id
    }

    /// Get a component group by name, creating it from configuration if needed
    pub fn get_or_create_component_group(
        &mut self,
        options: &dyn OptionSource,
        project: &str,
        name: &str,
    ) -> GroupId {
        if let Some(&id) = self.group_index.get(name) {
            return id;
        }

        let prefix = format!("COMPONENT_GROUP_{}", key_name(name));
        let id = GroupId(self.groups.len());
        let group = ComponentGroup {
            name: name.to_string(),
            display_name: options
                .non_empty_option(&format!("{}_DISPLAY_NAME", prefix))
                .unwrap_or(name)
                .to_string(),
            description: options
                .non_empty_option(&format!("{}_DESCRIPTION", prefix))
                .unwrap_or_default()
                .to_string(),
            is_bold: options.is_on(&format!("{}_BOLD_TITLE", prefix)),
            is_expanded_by_default: options.is_on(&format!("{}_EXPANDED", prefix)),
            ..Default::default()
        };

        self.groups.push(group);
        self.group_index.insert(name.to_string(), id);

        if let Some(parent_name) = options.non_empty_option(&format!("{}_PARENT_GROUP", prefix)) {
            let parent = self.get_or_create_component_group(options, project, parent_name);
            if parent == id || self.is_group_ancestor(id, parent) {
                warn!(
                    "Component group '{}' cannot have parent '{}': the group tree would contain a cycle",
                    name, parent_name
                );
            } else {
                self.groups[id.0].parent_group = Some(parent);
                self.groups[parent.0].subgroups.push(id);
            }
        }

        id
    }

    /// Get an installation type by name, creating it from configuration if needed
    pub fn get_or_create_installation_type(
        &mut self,
        options: &dyn OptionSource,
        _project: &str,
        name: &str,
    ) -> InstallTypeId {
        if let Some(&id) = self.install_type_index.get(name) {
            return id;
        }

        let prefix = format!("INSTALL_TYPE_{}", key_name(name));
        let id = InstallTypeId(self.install_types.len());
        self.install_types.push(InstallationType {
            name: name.to_string(),
            display_name: options
                .non_empty_option(&format!("{}_DISPLAY_NAME", prefix))
                .unwrap_or(name)
                .to_string(),
            index: self.install_types.len() + 1,
        });
        self.install_type_index.insert(name.to_string(), id);
        id
    }

    /// Record that `from` depends on `to`, keeping the reverse edge in sync
    fn add_dependency(&mut self, from: ComponentId, to: ComponentId) {
        if self.components[from.0].dependencies.contains(&to) {
            return;
        }
        self.components[from.0].dependencies.push(to);
        self.components[to.0].reverse_dependencies.push(from);
    }

    /// Is `candidate` an ancestor of (or equal to) `group`?
    fn is_group_ancestor(&self, candidate: GroupId, group: GroupId) -> bool {
        let mut current = Some(group);
        while let Some(id) = current {
            if id == candidate {
                return true;
            }
            current = self.groups[id.0].parent_group;
        }
        false
    }

    pub fn component(&self, id: ComponentId) -> &Component {
        &self.components[id.0]
    }

    pub fn component_mut(&mut self, id: ComponentId) -> &mut Component {
        &mut self.components[id.0]
    }

    pub fn group(&self, id: GroupId) -> &ComponentGroup {
        &self.groups[id.0]
    }

    pub fn installation_type(&self, id: InstallTypeId) -> &InstallationType {
        &self.install_types[id.0]
    }

    pub fn component_id(&self, name: &str) -> Option<ComponentId> {
        self.component_index.get(name).copied()
    }

    pub fn group_id(&self, name: &str) -> Option<GroupId> {
        self.group_index.get(name).copied()
    }

    pub fn installation_type_id(&self, name: &str) -> Option<InstallTypeId> {
        self.install_type_index.get(name).copied()
    }

    /// Component ids in name order
    pub fn component_ids(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.component_index.values().copied()
    }

    /// Group ids in name order
    pub fn group_ids(&self) -> impl Iterator<Item = GroupId> + '_ {
        self.group_index.values().copied()
    }

    /// Installation types in index order
    pub fn installation_types(&self) -> &[InstallationType] {
        &self.install_types
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn has_components(&self) -> bool {
        !self.components.is_empty()
    }

    pub fn has_groups(&self) -> bool {
        !self.groups.is_empty()
    }

    /// Groups without a parent, in name order
    pub fn top_level_groups(&self) -> Vec<GroupId> {
        self.group_ids()
            .filter(|id| self.groups[id.0].parent_group.is_none())
            .collect()
    }

    /// Components that belong to no group, in name order
    pub fn orphan_components(&self) -> Vec<ComponentId> {
        self.component_ids()
            .filter(|id| self.components[id.0].group.is_none())
            .collect()
    }

    /// Components of a group and all of its subgroups
    ///
    /// The group's own components come first, followed by each subgroup's
    /// components in subgroup order.
    pub fn group_components_recursive(&self, group: GroupId) -> Vec<ComponentId> {
        let mut result = Vec::new();
        let mut visited = HashSet::new();
        self.collect_group_components(group, &mut visited, &mut result);
        result
    }

    fn collect_group_components(
        &self,
        group: GroupId,
        visited: &mut HashSet<GroupId>,
        result: &mut Vec<ComponentId>,
    ) {
        if !visited.insert(group) {
            return;
        }
        let record = &self.groups[group.0];
        result.extend(record.components.iter().copied());
        for &subgroup in &record.subgroups {
            self.collect_group_components(subgroup, visited, result);
        }
    }

    /// Outermost ancestor of a group
    pub fn top_level_ancestor(&self, group: GroupId) -> GroupId {
        let mut current = group;
        while let Some(parent) = self.groups[current.0].parent_group {
            current = parent;
        }
        current
    }

    /// Everything `start` depends on, directly or transitively
    ///
    /// Depth-first preorder; `start` itself is not included even when a
    /// cycle leads back to it.
    pub fn dependency_closure(&self, start: ComponentId) -> Vec<ComponentId> {
        self.closure(start, |c| &c.dependencies)
    }

    /// Everything that depends on `start`, directly or transitively
    pub fn reverse_dependency_closure(&self, start: ComponentId) -> Vec<ComponentId> {
        self.closure(start, |c| &c.reverse_dependencies)
    }

    fn closure<F>(&self, start: ComponentId, edges: F) -> Vec<ComponentId>
    where
        F: Fn(&Component) -> &Vec<ComponentId>,
    {
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        visited.insert(start);
        let mut stack: Vec<ComponentId> = edges(&self.components[start.0])
            .iter()
            .rev()
            .copied()
            .collect();
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            order.push(id);
            stack.extend(edges(&self.components[id.0]).iter().rev().copied());
        }
        order
    }
}
