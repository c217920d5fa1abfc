// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph data structure containing nodes and connections.
//!
//! The graph exclusively owns its nodes and is the only mutation path for
//! them. Nodes reference each other (and parameters their owner) through
//! [`NodeId`] keys into the graph's arena.

use crate::collector::{GenerationMode, PreviewProperty, PropertyCollector, ShaderProperty};
use crate::connection::{Connection, ConnectionId};
use crate::definition::{DefinitionError, NodeTypeDescriptor};
use crate::diagnostics::DiagnosticSink;
use crate::node::{Node, NodeId, NodeKind};
use crate::port::{PortDirection, SlotId, StageCapability};
use crate::reconcile::Reconciliation;
use crate::requirements::{conflicting_stages, first_restricted_stage};
use crate::subgraph::{AssetId, AssetResolver};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// How far-reaching a modification was
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ModificationScope {
    /// A stored value changed
    Node,
    /// Graph-level settings changed
    Graph,
    /// Nodes, slots or edges changed; generated code must be rebuilt
    Topological,
}

/// A shader node graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShaderGraph {
    /// Graph name
    pub name: String,
    /// Nodes in the graph
    nodes: IndexMap<NodeId, Node>,
    /// Connections between nodes
    connections: IndexMap<ConnectionId, Connection>,
    /// Node whose inputs are the graph's results
    output_node: Option<NodeId>,
    #[serde(skip)]
    dirty: Option<ModificationScope>,
}

impl ShaderGraph {
    /// Create a new empty graph
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: IndexMap::new(),
            connections: IndexMap::new(),
            output_node: None,
            dirty: None,
        }
    }

    /// Add a node to the graph
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = node.id;
        self.nodes.insert(id, node);
        self.mark_dirty(ModificationScope::Topological);
        id
    }

    /// Remove a node and its connections
    pub fn remove_node(&mut self, node_id: NodeId) -> Option<Node> {
        self.connections.retain(|_, c| !c.involves_node(node_id));
        if self.output_node == Some(node_id) {
            self.output_node = None;
        }
        let removed = self.nodes.shift_remove(&node_id);
        if removed.is_some() {
            self.mark_dirty(ModificationScope::Topological);
        }
        removed
    }

    /// Get a node by ID
    pub fn node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    /// Get a mutable node by ID; marks the graph dirty at node scope
    pub fn node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        let node = self.nodes.get_mut(&node_id)?;
        self.dirty = self.dirty.max(Some(ModificationScope::Node));
        Some(node)
    }

    /// Get all nodes
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Get all node IDs
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// Get the number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Choose the node whose inputs are the graph's results
    pub fn set_output_node(&mut self, node_id: Option<NodeId>) {
        self.output_node = node_id.filter(|id| self.nodes.contains_key(id));
        self.mark_dirty(ModificationScope::Topological);
    }

    /// The output node ID, if any
    pub fn output_node_id(&self) -> Option<NodeId> {
        self.output_node
    }

    /// The output node, if any
    pub fn output_node(&self) -> Option<&Node> {
        self.output_node.and_then(|id| self.nodes.get(&id))
    }

    /// Most far-reaching modification since the last [`Self::clear_dirty`]
    pub fn dirty_scope(&self) -> Option<ModificationScope> {
        self.dirty
    }

    /// Record a modification
    pub fn mark_dirty(&mut self, scope: ModificationScope) {
        if self.dirty < Some(scope) {
            tracing::debug!("Graph '{}' dirtied: {:?}", self.name, scope);
        }
        self.dirty = self.dirty.max(Some(scope));
    }

    /// Reset the dirty state, returning what it was
    pub fn clear_dirty(&mut self) -> Option<ModificationScope> {
        self.dirty.take()
    }

    /// Add a connection from an output slot to an input slot
    pub fn connect(
        &mut self,
        from_node: NodeId,
        from_slot: SlotId,
        to_node: NodeId,
        to_slot: SlotId,
    ) -> Result<ConnectionId, ConnectionError> {
        if from_node == to_node {
            return Err(ConnectionError::SelfLoop);
        }

        let source_node = self.nodes.get(&from_node)
            .ok_or(ConnectionError::NodeNotFound(from_node))?;
        let target_node = self.nodes.get(&to_node)
            .ok_or(ConnectionError::NodeNotFound(to_node))?;

        let source_slot = source_node.slot(from_slot)
            .ok_or(ConnectionError::SlotNotFound { node: from_node, slot: from_slot })?;
        let target_slot = target_node.slot(to_slot)
            .ok_or(ConnectionError::SlotNotFound { node: to_node, slot: to_slot })?;

        if source_slot.direction != PortDirection::Output || target_slot.direction != PortDirection::Input {
            return Err(ConnectionError::DirectionMismatch);
        }
        if !source_slot.can_connect(target_slot) {
            return Err(ConnectionError::IncompatibleSlots);
        }

        // An input takes at most one edge
        if self.connection_to(to_node, to_slot).is_some() {
            return Err(ConnectionError::SlotAlreadyConnected { node: to_node, slot: to_slot });
        }

        if self.reaches(to_node, from_node) {
            return Err(ConnectionError::WouldCreateCycle);
        }

        let connection = Connection::new(from_node, from_slot, to_node, to_slot);
        let id = connection.id;
        self.connections.insert(id, connection);
        self.mark_dirty(ModificationScope::Topological);
        Ok(id)
    }

    /// Remove a connection
    pub fn disconnect(&mut self, connection_id: ConnectionId) -> Option<Connection> {
        let removed = self.connections.shift_remove(&connection_id);
        if removed.is_some() {
            self.mark_dirty(ModificationScope::Topological);
        }
        removed
    }

    /// Get a connection by ID
    pub fn connection(&self, connection_id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&connection_id)
    }

    /// Get all connections
    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    /// The edge feeding an input slot, if any
    pub fn connection_to(&self, node_id: NodeId, slot_id: SlotId) -> Option<&Connection> {
        self.connections
            .values()
            .find(|c| c.to_node == node_id && c.to_slot == slot_id)
    }

    /// Edges leaving an output slot
    pub fn connections_from(&self, node_id: NodeId, slot_id: SlotId) -> impl Iterator<Item = &Connection> {
        self.connections
            .values()
            .filter(move |c| c.from_node == node_id && c.from_slot == slot_id)
    }

    /// Get connections involving a node
    pub fn connections_for_node(&self, node_id: NodeId) -> impl Iterator<Item = &Connection> {
        self.connections.values().filter(move |c| c.involves_node(node_id))
    }

    /// Whether a slot has any edge
    pub fn is_connected(&self, node_id: NodeId, slot_id: SlotId) -> bool {
        self.connections.values().any(|c| c.involves_slot(node_id, slot_id))
    }

    /// Get the number of connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Whether `target` is downstream of (or equal to) `start`
    fn reaches(&self, start: NodeId, target: NodeId) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![start];
        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            stack.extend(
                self.connections
                    .values()
                    .filter(|c| c.from_node == current)
                    .map(|c| c.to_node),
            );
        }
        false
    }

    /// Get nodes in topological order, dependencies first
    pub fn topological_order(&self) -> Result<Vec<NodeId>, CycleError> {
        let mut visited = HashSet::new();
        let mut temp_mark = HashSet::new();
        let mut order = Vec::new();

        for node_id in self.nodes.keys() {
            if !visited.contains(node_id) {
                self.visit(*node_id, &mut visited, &mut temp_mark, &mut order)?;
            }
        }

        Ok(order)
    }

    fn visit(
        &self,
        node_id: NodeId,
        visited: &mut HashSet<NodeId>,
        temp_mark: &mut HashSet<NodeId>,
        order: &mut Vec<NodeId>,
    ) -> Result<(), CycleError> {
        if temp_mark.contains(&node_id) {
            return Err(CycleError);
        }
        if visited.contains(&node_id) {
            return Ok(());
        }

        temp_mark.insert(node_id);

        // Visit all nodes that this node depends on
        for connection in self.connections_for_node(node_id) {
            if connection.to_node == node_id {
                self.visit(connection.from_node, visited, temp_mark, order)?;
            }
        }

        temp_mark.remove(&node_id);
        visited.insert(node_id);
        order.push(node_id);

        Ok(())
    }

    /// Nodes contributing to the output, dependencies first.
    ///
    /// Without an output node every node is active.
    pub fn active_node_ids(&self) -> Vec<NodeId> {
        let order = self.topological_order().unwrap_or_else(|_| {
            tracing::warn!("Graph '{}' contains a cycle; using insertion order", self.name);
            self.node_ids().collect()
        });

        let Some(output) = self.output_node else {
            return order;
        };

        let mut upstream = HashSet::new();
        let mut stack = vec![output];
        while let Some(current) = stack.pop() {
            if upstream.insert(current) {
                stack.extend(
                    self.connections
                        .values()
                        .filter(|c| c.to_node == current)
                        .map(|c| c.from_node),
                );
            }
        }

        order.into_iter().filter(|id| upstream.contains(id)).collect()
    }

    /// Active nodes, dependencies first
    pub fn active_nodes(&self) -> Vec<&Node> {
        self.active_node_ids()
            .into_iter()
            .filter_map(|id| self.nodes.get(&id))
            .collect()
    }

    fn drop_stale_connections(&mut self, node_id: NodeId, reconciliation: &Reconciliation) {
        let removed: HashSet<SlotId> = reconciliation.removed_slot_ids().collect();
        if removed.is_empty() {
            return;
        }
        self.connections.retain(|_, c| {
            !removed
                .iter()
                .any(|slot| c.involves_slot(node_id, *slot))
        });
    }

    /// Re-apply a (changed) type definition to a node.
    ///
    /// Retained slot and parameter ids keep their values and edges; removed
    /// ones are dropped together with their edges.
    pub fn redefine_node(
        &mut self,
        node_id: NodeId,
        descriptor: &NodeTypeDescriptor,
    ) -> Result<Reconciliation, GraphError> {
        descriptor.validate()?;
        let node = self.nodes.get_mut(&node_id).ok_or(GraphError::NodeNotFound(node_id))?;
        let reconciliation = node.apply_descriptor(descriptor);
        self.drop_stale_connections(node_id, &reconciliation);
        self.mark_dirty(ModificationScope::Topological);
        Ok(reconciliation)
    }

    /// Point a sub-graph node at another asset (or at nothing).
    ///
    /// A changed reference re-derives the node's slots from the new asset
    /// and dirties the graph topologically. Returns whether it changed.
    pub fn set_sub_graph(
        &mut self,
        node_id: NodeId,
        asset: Option<AssetId>,
        resolver: &dyn AssetResolver,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<bool, GraphError> {
        let node = self.nodes.get_mut(&node_id).ok_or(GraphError::NodeNotFound(node_id))?;
        let NodeKind::SubGraph(reference) = &mut node.kind else {
            return Err(GraphError::NotASubGraph(node_id));
        };
        if !reference.set_asset(asset) {
            return Ok(false);
        }

        self.refresh_sub_graph_slots(node_id, resolver, sink)?;
        Ok(true)
    }

    /// Re-derive a sub-graph node's slots from its referenced asset.
    ///
    /// An unresolved reference leaves the node without slots and reports
    /// nothing.
    pub fn refresh_sub_graph_slots(
        &mut self,
        node_id: NodeId,
        resolver: &dyn AssetResolver,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<Reconciliation, GraphError> {
        let node = self.nodes.get_mut(&node_id).ok_or(GraphError::NodeNotFound(node_id))?;
        let asset = match &node.kind {
            NodeKind::SubGraph(reference) => reference.resolve(resolver),
            _ => return Err(GraphError::NotASubGraph(node_id)),
        };

        let reconciliation = match &asset {
            Some(asset) => node.replace_entries(asset.call_site_slots(), Vec::new(), false),
            None => node.replace_entries(Vec::new(), Vec::new(), true),
        };
        if asset.is_some() {
            for stale in &reconciliation.removed {
                sink.warning(Some(node_id), stale.to_string());
            }
        }

        self.drop_stale_connections(node_id, &reconciliation);
        self.mark_dirty(ModificationScope::Topological);
        Ok(reconciliation)
    }

    /// Refresh the slots of every sub-graph node (after loading)
    pub fn refresh_all_sub_graphs(&mut self, resolver: &dyn AssetResolver, sink: &mut dyn DiagnosticSink) {
        let ids: Vec<NodeId> = self
            .nodes
            .values()
            .filter(|n| matches!(n.kind, NodeKind::SubGraph(_)))
            .map(|n| n.id)
            .collect();
        for id in ids {
            // Ids come from the arena, so the node exists and is a sub-graph
            if let Err(e) = self.refresh_sub_graph_slots(id, resolver, sink) {
                tracing::error!("Failed to refresh sub-graph node: {e}");
            }
        }
    }

    /// Check every node without modifying anything; returns nodes in error.
    ///
    /// `visiting` holds the assets currently being validated up the call
    /// chain, so self-referencing sub-graphs are reported instead of
    /// recursed into.
    pub fn check_nodes(
        &self,
        resolver: &dyn AssetResolver,
        visiting: &mut Vec<AssetId>,
        sink: &mut dyn DiagnosticSink,
    ) -> Vec<NodeId> {
        let mut failing = Vec::new();

        for node in self.nodes.values() {
            match &node.kind {
                NodeKind::Function if node.function.is_none() => {
                    sink.error(
                        Some(node.id),
                        DefinitionError::MissingBinding { node: node.name.clone() }.to_string(),
                    );
                    failing.push(node.id);
                }
                NodeKind::SubGraph(reference) => {
                    let Some(asset) = reference.resolve(resolver) else {
                        continue;
                    };
                    if visiting.contains(&asset.id) {
                        sink.error(Some(node.id), format!("Sub Graph '{}' references itself", asset.name));
                        failing.push(node.id);
                        continue;
                    }

                    let error_count = asset.validate(resolver, visiting);
                    if error_count > 0 {
                        let plural = if error_count > 1 { "s" } else { "" };
                        sink.error(
                            Some(node.id),
                            format!("Sub Graph contains {error_count} node{plural} with errors"),
                        );
                        failing.push(node.id);
                    }
                }
                _ => {}
            }
        }

        failing
    }

    /// Validate the graph and settle the stage capability of sub-graph nodes
    pub fn validate(&mut self, resolver: &dyn AssetResolver, sink: &mut dyn DiagnosticSink) -> ValidationReport {
        let nodes_with_errors = self.check_nodes(resolver, &mut Vec::new(), sink);

        let sub_graph_nodes: Vec<NodeId> = self
            .nodes
            .values()
            .filter(|n| matches!(n.kind, NodeKind::SubGraph(_)))
            .map(|n| n.id)
            .collect();
        for node_id in sub_graph_nodes {
            self.validate_shader_stage(node_id, resolver, sink);
        }

        ValidationReport { nodes_with_errors }
    }

    /// Stage of a slot as seen through its incoming edge
    fn traced_stage(&self, node_id: NodeId, slot_id: SlotId, own: StageCapability) -> StageCapability {
        if own != StageCapability::All {
            return own;
        }
        self.connection_to(node_id, slot_id)
            .and_then(|c| self.nodes.get(&c.from_node)?.slot(c.from_slot))
            .map_or(own, |source| source.stage_capability)
    }

    fn validate_shader_stage(&mut self, node_id: NodeId, resolver: &dyn AssetResolver, sink: &mut dyn DiagnosticSink) {
        let Some(node) = self.nodes.get(&node_id) else {
            return;
        };
        let output_stage = node
            .sub_graph()
            .and_then(|reference| reference.resolve(resolver))
            .map(|asset| asset.effective_stage());

        let stages: Vec<StageCapability> = node
            .slots()
            .iter()
            .map(|slot| {
                let own = output_stage.unwrap_or(slot.stage_capability);
                if slot.is_input() {
                    self.traced_stage(node_id, slot.id, own)
                } else {
                    own
                }
            })
            .collect();

        // First restricted stage wins; a disagreeing slot is only reported
        if let Some((kept, dropped)) = conflicting_stages(stages.iter().copied()) {
            tracing::warn!("Sub-graph node {:?} mixes {kept:?} and {dropped:?} stages", node_id.0);
            sink.warning(
                Some(node_id),
                format!("Slots require both {kept:?} and {dropped:?} stages; using {kept:?}"),
            );
        }
        let effective = first_restricted_stage(stages);

        if let Some(node) = self.nodes.get_mut(&node_id) {
            for slot in node.slots_mut() {
                slot.stage_capability = effective;
            }
        }
    }

    /// Add material properties for unconnected inputs and parameters.
    ///
    /// In preview mode every unconnected input and every parameter becomes
    /// a property. Final generation inlines values as constants, so only
    /// unconnected textures and samplers are collected.
    ///
    /// Referenced sub-graph bodies are always final code; their unconnected
    /// textures and samplers are collected too, since the generated functions
    /// read them as globals.
    pub fn collect_shader_properties(
        &self,
        collector: &mut PropertyCollector,
        mode: GenerationMode,
        resolver: &dyn AssetResolver,
    ) {
        self.collect_shader_properties_guarded(collector, mode, resolver, &mut Vec::new());
    }

    fn collect_shader_properties_guarded(
        &self,
        collector: &mut PropertyCollector,
        mode: GenerationMode,
        resolver: &dyn AssetResolver,
        visiting: &mut Vec<AssetId>,
    ) {
        for node in self.nodes.values() {
            if matches!(node.kind, NodeKind::SubGraphOutput | NodeKind::Property(_)) {
                continue;
            }
            for slot in node.input_slots() {
                if self.is_connected(node.id, slot.id) {
                    continue;
                }
                if !mode.is_preview() && slot.value_type.has_literal() {
                    continue;
                }
                collector.add(ShaderProperty {
                    reference_name: node.slot_variable_name(slot.id),
                    display_name: slot.name.clone(),
                    value: slot.value.clone(),
                });
            }

            if mode.is_preview() {
                for parameter in node.parameters() {
                    collector.add(ShaderProperty {
                        reference_name: node.parameter_variable_name(parameter.id),
                        display_name: parameter.name.clone(),
                        value: parameter.value.clone(),
                    });
                }
            }

            let Some(asset) = node.sub_graph().and_then(|r| r.resolve(resolver)) else {
                continue;
            };
            if visiting.contains(&asset.id) {
                continue;
            }
            visiting.push(asset.id);
            asset
                .graph
                .collect_shader_properties_guarded(collector, GenerationMode::ForReals, resolver, visiting);
            visiting.pop();
        }
    }

    /// Sub-graph assets this graph depends on, directly or through other
    /// sub-graphs, in discovery order.
    ///
    /// Unresolved references contribute nothing.
    pub fn source_asset_dependencies(&self, resolver: &dyn AssetResolver) -> IndexSet<AssetId> {
        let mut dependencies = IndexSet::new();
        self.collect_asset_dependencies(resolver, &mut dependencies);
        dependencies
    }

    fn collect_asset_dependencies(&self, resolver: &dyn AssetResolver, dependencies: &mut IndexSet<AssetId>) {
        for node in self.nodes.values() {
            let Some(asset) = node.sub_graph().and_then(|r| r.resolve(resolver)) else {
                continue;
            };
            // Already seen assets are not walked again, which also stops cycles
            if dependencies.insert(asset.id) {
                asset.graph.collect_asset_dependencies(resolver, dependencies);
            }
        }
    }

    /// Add the graph-level inputs of every referenced sub-graph.
    ///
    /// Unresolved references contribute nothing.
    pub fn collect_graph_inputs(
        &self,
        collector: &mut PropertyCollector,
        mode: GenerationMode,
        resolver: &dyn AssetResolver,
    ) {
        self.collect_graph_inputs_guarded(collector, mode, resolver, &mut Vec::new());
    }

    pub(crate) fn collect_graph_inputs_guarded(
        &self,
        collector: &mut PropertyCollector,
        mode: GenerationMode,
        resolver: &dyn AssetResolver,
        visiting: &mut Vec<AssetId>,
    ) {
        for node in self.nodes.values() {
            let Some(asset) = node.sub_graph().and_then(|r| r.resolve(resolver)) else {
                continue;
            };
            if visiting.contains(&asset.id) {
                continue;
            }
            visiting.push(asset.id);
            for input in &asset.inputs {
                collector.add(input.to_shader_property());
            }
            asset.graph.collect_graph_inputs_guarded(collector, mode, resolver, visiting);
            visiting.pop();
        }
    }

    /// Preview values for unconnected inputs and parameters, including
    /// those exposed by referenced sub-graphs
    pub fn preview_properties(&self, resolver: &dyn AssetResolver) -> Vec<PreviewProperty> {
        let mut properties = Vec::new();
        for node in self.nodes.values() {
            if matches!(node.kind, NodeKind::SubGraphOutput | NodeKind::Property(_)) {
                continue;
            }
            properties.extend(
                node.input_slots()
                    .filter(|slot| !self.is_connected(node.id, slot.id))
                    .map(|slot| PreviewProperty {
                        name: node.slot_variable_name(slot.id),
                        value: slot.value.clone(),
                    }),
            );
            properties.extend(node.parameters().iter().map(|parameter| PreviewProperty {
                name: node.parameter_variable_name(parameter.id),
                value: parameter.value.clone(),
            }));

            if let Some(asset) = node.sub_graph().and_then(|r| r.resolve(resolver)) {
                properties.extend(asset.preview_properties());
            }
        }
        properties
    }

    /// Serialize the graph to RON
    pub fn to_ron(&self) -> Result<String, GraphError> {
        Ok(ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?)
    }

    /// Deserialize a graph from RON
    pub fn from_ron(source: &str) -> Result<Self, GraphError> {
        Ok(ron::from_str(source)?)
    }
}

impl Default for ShaderGraph {
    fn default() -> Self {
        Self::new("Untitled")
    }
}

/// Outcome of [`ShaderGraph::validate`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Nodes that reported an error
    pub nodes_with_errors: Vec<NodeId>,
}

impl ValidationReport {
    /// Whether no node is in error
    pub fn is_valid(&self) -> bool {
        self.nodes_with_errors.is_empty()
    }
}

/// Error when creating a connection
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// Node not found
    #[error("Node not found: {0:?}")]
    NodeNotFound(NodeId),

    /// Slot not found
    #[error("Slot {slot} not found on node {node:?}")]
    SlotNotFound {
        /// Node searched
        node: NodeId,
        /// Missing slot
        slot: SlotId,
    },

    /// Edges run from an output slot to an input slot
    #[error("Connections must run from an output slot to an input slot")]
    DirectionMismatch,

    /// Incompatible slot types
    #[error("Incompatible slot types")]
    IncompatibleSlots,

    /// Input already has an edge
    #[error("Slot {slot} of node {node:?} is already connected")]
    SlotAlreadyConnected {
        /// Target node
        node: NodeId,
        /// Target slot
        slot: SlotId,
    },

    /// Self-loop not allowed
    #[error("Self-loop not allowed")]
    SelfLoop,

    /// The edge would close a cycle
    #[error("Connection would create a cycle")]
    WouldCreateCycle,
}

/// Error when graph contains a cycle
#[derive(Debug, thiserror::Error)]
#[error("Graph contains a cycle")]
pub struct CycleError;

/// Error from graph-level operations
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// Node not found
    #[error("Node not found: {0:?}")]
    NodeNotFound(NodeId),

    /// Operation needs a sub-graph node
    #[error("Node {0:?} is not a sub-graph node")]
    NotASubGraph(NodeId),

    /// Invalid type definition
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    /// Invalid connection
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// RON serialization failed
    #[error("Serialization error: {0}")]
    Serialize(#[from] ron::Error),

    /// RON deserialization failed
    #[error("Deserialization error: {0}")]
    Deserialize(#[from] ron::error::SpannedError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{HlslFunctionDescriptor, HlslSourceRef};
    use crate::diagnostics::Diagnostics;
    use crate::port::{ConcreteValueType, ShaderValue};
    use crate::subgraph::{GraphInput, NoAssets, SubGraphAsset, SubGraphLibrary, SubGraphRef};

    fn multiply_type() -> NodeTypeDescriptor {
        NodeTypeDescriptor::new("Math/Basic", "Multiply")
            .with_input(0, "A", ShaderValue::Vector1(0.5))
            .with_input(1, "B", ShaderValue::Vector1(0.5))
            .with_output(2, "Out", ConcreteValueType::Vector1)
            .with_function(HlslFunctionDescriptor {
                source: HlslSourceRef::new("Math_Basic.hlsl"),
                name: "Unity_Multiply".to_string(),
                arguments: vec![SlotId(0), SlotId(1)],
                return_value: Some(SlotId(2)),
            })
    }

    fn multiply() -> Node {
        Node::from_descriptor(&multiply_type())
    }

    #[test]
    fn test_connect_rules() {
        let mut graph = ShaderGraph::new("Test");
        let a = graph.add_node(multiply());
        let b = graph.add_node(multiply());

        assert!(matches!(
            graph.connect(a, SlotId(2), a, SlotId(0)),
            Err(ConnectionError::SelfLoop)
        ));
        assert!(matches!(
            graph.connect(a, SlotId(0), b, SlotId(1)),
            Err(ConnectionError::DirectionMismatch)
        ));
        assert!(matches!(
            graph.connect(a, SlotId(9), b, SlotId(1)),
            Err(ConnectionError::SlotNotFound { .. })
        ));

        graph.connect(a, SlotId(2), b, SlotId(0)).unwrap();
        assert!(matches!(
            graph.connect(a, SlotId(2), b, SlotId(0)),
            Err(ConnectionError::SlotAlreadyConnected { .. })
        ));
        // Outputs fan out
        graph.connect(a, SlotId(2), b, SlotId(1)).unwrap();
        assert_eq!(graph.connections_from(a, SlotId(2)).count(), 2);

        assert!(matches!(
            graph.connect(b, SlotId(2), a, SlotId(0)),
            Err(ConnectionError::WouldCreateCycle)
        ));
    }

    #[test]
    fn test_topological_order_dependencies_first() {
        let mut graph = ShaderGraph::new("Test");
        let c = graph.add_node(multiply());
        let b = graph.add_node(multiply());
        let a = graph.add_node(multiply());
        graph.connect(a, SlotId(2), b, SlotId(0)).unwrap();
        graph.connect(b, SlotId(2), c, SlotId(0)).unwrap();

        let order = graph.topological_order().unwrap();
        let position = |id| order.iter().position(|n| *n == id).unwrap();
        assert!(position(a) < position(b));
        assert!(position(b) < position(c));
    }

    #[test]
    fn test_active_nodes_follow_output() {
        let mut graph = ShaderGraph::new("Test");
        let used = graph.add_node(multiply());
        let unused = graph.add_node(multiply());
        let output = graph.add_node(multiply());
        graph.connect(used, SlotId(2), output, SlotId(0)).unwrap();

        assert_eq!(graph.active_node_ids().len(), 3);

        graph.set_output_node(Some(output));
        let active = graph.active_node_ids();
        assert_eq!(active, vec![used, output]);
        assert!(!active.contains(&unused));
    }

    #[test]
    fn test_redefine_drops_stale_edges() {
        let mut graph = ShaderGraph::new("Test");
        let source = graph.add_node(multiply());
        let target = graph.add_node(multiply());
        graph.connect(source, SlotId(2), target, SlotId(0)).unwrap();
        graph.connect(source, SlotId(2), target, SlotId(1)).unwrap();
        graph.clear_dirty();

        let reduced = NodeTypeDescriptor::new("Math/Basic", "Multiply")
            .with_input(0, "A", ShaderValue::Vector1(0.5))
            .with_output(2, "Out", ConcreteValueType::Vector1);
        let result = graph.redefine_node(target, &reduced).unwrap();

        assert_eq!(result.removed_slot_ids().collect::<Vec<_>>(), vec![SlotId(1)]);
        assert_eq!(graph.connection_count(), 1);
        assert!(graph.connection_to(target, SlotId(0)).is_some());
        assert_eq!(graph.dirty_scope(), Some(ModificationScope::Topological));
    }

    #[test]
    fn test_redefine_rejects_duplicate_ids() {
        let mut graph = ShaderGraph::new("Test");
        let node = graph.add_node(multiply());
        let bad = multiply_type().with_input(2, "C", ShaderValue::Vector1(0.0));
        assert!(matches!(
            graph.redefine_node(node, &bad),
            Err(GraphError::Definition(DefinitionError::DuplicateId { .. }))
        ));
        assert_eq!(graph.node(node).unwrap().slots().len(), 3);
    }

    fn tint_asset() -> SubGraphAsset {
        let mut asset = SubGraphAsset::new("Tint");
        asset.add_input(GraphInput::new("Color", ShaderValue::Vector4([1.0; 4])));
        asset.add_output(1, "Out", ConcreteValueType::Vector4);
        asset
    }

    #[test]
    fn test_set_sub_graph_rederives_slots() {
        let mut library = SubGraphLibrary::new();
        let tint = library.insert(tint_asset());
        let mut other = tint_asset();
        other.add_output(2, "Alpha", ConcreteValueType::Vector1);
        let other = library.insert(other);

        let mut graph = ShaderGraph::new("Test");
        let node = graph.add_node(Node::new("Sub Graph", NodeKind::SubGraph(SubGraphRef::default())));
        let mut sink = Diagnostics::new();

        assert!(graph.set_sub_graph(node, Some(tint.id), &library, &mut sink).unwrap());
        assert_eq!(graph.node(node).unwrap().slots().len(), 2);
        graph.clear_dirty();

        // Same asset again is a no-op
        assert!(!graph.set_sub_graph(node, Some(tint.id), &library, &mut sink).unwrap());
        assert_eq!(graph.dirty_scope(), None);

        assert!(graph.set_sub_graph(node, Some(other.id), &library, &mut sink).unwrap());
        // Different asset, different input property id
        assert_eq!(graph.node(node).unwrap().slots().len(), 3);
        assert_eq!(graph.dirty_scope(), Some(ModificationScope::Topological));
        assert_eq!(sink.warnings().count(), 1);

        // Clearing the reference removes all slots silently
        let mut quiet = Diagnostics::new();
        graph.set_sub_graph(node, None, &library, &mut quiet).unwrap();
        assert!(graph.node(node).unwrap().slots().is_empty());
        assert!(quiet.is_empty());
    }

    #[test]
    fn test_set_sub_graph_requires_sub_graph_node() {
        let mut graph = ShaderGraph::new("Test");
        let node = graph.add_node(multiply());
        assert!(matches!(
            graph.set_sub_graph(node, None, &NoAssets, &mut Diagnostics::new()),
            Err(GraphError::NotASubGraph(_))
        ));
    }

    #[test]
    fn test_validation_aggregates_child_errors() {
        let unbound = NodeTypeDescriptor::new("Math", "Unbound")
            .with_output(0, "Out", ConcreteValueType::Vector1);

        let mut broken = tint_asset();
        broken.graph.add_node(Node::from_descriptor(&unbound));
        broken.graph.add_node(Node::from_descriptor(&unbound));
        let mut library = SubGraphLibrary::new();
        let broken = library.insert(broken);

        let mut graph = ShaderGraph::new("Test");
        let call = graph.add_node(Node::new(
            "Sub Graph",
            NodeKind::SubGraph(SubGraphRef::new(Some(broken.id))),
        ));
        let healthy = graph.add_node(multiply());

        let mut sink = Diagnostics::new();
        let report = graph.validate(&library, &mut sink);

        assert_eq!(report.nodes_with_errors, vec![call]);
        let errors: Vec<_> = sink.errors().collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "Sub Graph contains 2 nodes with errors");
        assert!(!sink.node_has_error(healthy));
    }

    #[test]
    fn test_stage_validation_first_restricted_wins() {
        let mut vertex_only = NodeTypeDescriptor::new("Input", "Vertex Id")
            .with_output(0, "Out", ConcreteValueType::Vector1)
            .with_function(HlslFunctionDescriptor {
                source: HlslSourceRef::new("Input.hlsl"),
                name: "VertexId".to_string(),
                arguments: Vec::new(),
                return_value: Some(SlotId(0)),
            });
        vertex_only.outputs[0].stage = StageCapability::Vertex;

        let mut asset = tint_asset();
        let vertex_id = asset.graph.add_node(Node::from_descriptor(&vertex_only));
        let output = asset.graph.output_node_id().unwrap();
        asset.graph.add_node(multiply());
        asset.graph.connect(vertex_id, SlotId(0), output, SlotId(1)).unwrap();
        let mut library = SubGraphLibrary::new();
        let asset = library.insert(asset);

        let mut graph = ShaderGraph::new("Test");
        let call = graph.add_node(Node::new("Sub Graph", NodeKind::SubGraph(SubGraphRef::default())));
        let mut sink = Diagnostics::new();
        graph.set_sub_graph(call, Some(asset.id), &library, &mut sink).unwrap();
        graph.validate(&library, &mut sink);

        let node = graph.node(call).unwrap();
        assert!(node.slots().iter().all(|s| s.stage_capability == StageCapability::Vertex));
    }

    #[test]
    fn test_collect_shader_properties_modes() {
        let mut graph = ShaderGraph::new("Test");
        let a = graph.add_node(multiply());
        let b = graph.add_node(multiply());
        graph.connect(a, SlotId(2), b, SlotId(0)).unwrap();

        let mut preview = PropertyCollector::new();
        graph.collect_shader_properties(&mut preview, GenerationMode::Preview, &NoAssets);
        // a.A, a.B, b.B
        assert_eq!(preview.len(), 3);
        let b_node = graph.node(b).unwrap();
        assert!(preview.get(&b_node.slot_variable_name(SlotId(1))).is_some());
        assert!(preview.get(&b_node.slot_variable_name(SlotId(0))).is_none());

        let mut final_pass = PropertyCollector::new();
        graph.collect_shader_properties(&mut final_pass, GenerationMode::ForReals, &NoAssets);
        assert!(final_pass.is_empty());
    }

    #[test]
    fn test_ron_round_trip() {
        let mut graph = ShaderGraph::new("Saved");
        let a = graph.add_node(multiply());
        let b = graph.add_node(multiply());
        graph.connect(a, SlotId(2), b, SlotId(1)).unwrap();
        graph.set_output_node(Some(b));

        let ron = graph.to_ron().unwrap();
        let loaded = ShaderGraph::from_ron(&ron).unwrap();
        assert_eq!(loaded.name, "Saved");
        assert_eq!(loaded.node_count(), 2);
        assert_eq!(loaded.connection_count(), 1);
        assert_eq!(loaded.output_node_id(), Some(b));
        assert_eq!(loaded.dirty_scope(), None);
    }

    #[test]
    fn test_remove_node_drops_edges() {
        let mut graph = ShaderGraph::new("Test");
        let a = graph.add_node(multiply());
        let b = graph.add_node(multiply());
        let c = graph.add_node(multiply());
        let d = graph.add_node(multiply());
        graph.connect(a, SlotId(2), b, SlotId(0)).unwrap();
        graph.connect(b, SlotId(2), c, SlotId(0)).unwrap();
        graph.set_output_node(Some(c));
        graph.clear_dirty();

        let removed = graph.remove_node(b).unwrap();
        assert_eq!(removed.id, b);
        assert_eq!(graph.connection_count(), 0);
        assert!(!graph.is_connected(a, SlotId(2)));
        assert!(!graph.is_connected(c, SlotId(0)));
        assert_eq!(graph.dirty_scope(), Some(ModificationScope::Topological));
        assert_eq!(graph.active_node_ids(), vec![c]);

        graph.clear_dirty();
        assert!(graph.remove_node(b).is_none());
        assert_eq!(graph.dirty_scope(), None);

        // Removing the output node falls back to every node being active
        graph.remove_node(c).unwrap();
        assert_eq!(graph.output_node_id(), None);
        assert_eq!(graph.active_node_ids(), vec![a, d]);
    }

    #[test]
    fn test_disconnect() {
        let mut graph = ShaderGraph::new("Test");
        let a = graph.add_node(multiply());
        let b = graph.add_node(multiply());
        let edge = graph.connect(a, SlotId(2), b, SlotId(1)).unwrap();
        assert!(graph.is_connected(a, SlotId(2)));
        assert!(graph.is_connected(b, SlotId(1)));
        graph.clear_dirty();

        let removed = graph.disconnect(edge).unwrap();
        assert_eq!((removed.from_node, removed.to_slot), (a, SlotId(1)));
        assert!(!graph.is_connected(b, SlotId(1)));
        assert!(graph.connection(edge).is_none());
        assert_eq!(graph.dirty_scope(), Some(ModificationScope::Topological));

        graph.clear_dirty();
        assert!(graph.disconnect(edge).is_none());
        assert_eq!(graph.dirty_scope(), None);

        // The freed input accepts an edge again
        graph.connect(a, SlotId(2), b, SlotId(1)).unwrap();
    }

    fn calling(asset: AssetId) -> Node {
        Node::new("Sub Graph", NodeKind::SubGraph(SubGraphRef::new(Some(asset))))
    }

    #[test]
    fn test_source_asset_dependencies_are_transitive() {
        let inner = tint_asset();
        let mut outer = tint_asset();
        outer.graph.add_node(calling(inner.id));
        let mut looping = tint_asset();
        looping.graph.add_node(calling(looping.id));

        let mut library = SubGraphLibrary::new();
        let inner = library.insert(inner);
        let outer = library.insert(outer);
        let looping = library.insert(looping);

        let mut graph = ShaderGraph::new("Test");
        graph.add_node(calling(outer.id));
        graph.add_node(calling(inner.id));
        graph.add_node(calling(looping.id));
        graph.add_node(calling(AssetId::new()));
        graph.add_node(multiply());

        let dependencies: Vec<_> = graph.source_asset_dependencies(&library).into_iter().collect();
        assert_eq!(dependencies, vec![outer.id, inner.id, looping.id]);
        assert!(ShaderGraph::new("Empty").source_asset_dependencies(&library).is_empty());
        assert!(graph.source_asset_dependencies(&NoAssets).is_empty());
    }

    #[test]
    fn test_source_asset_dependencies_mutual_recursion() {
        let mut first = tint_asset();
        let mut second = tint_asset();
        first.graph.add_node(calling(second.id));
        second.graph.add_node(calling(first.id));

        let mut library = SubGraphLibrary::new();
        let first = library.insert(first);
        let second = library.insert(second);

        let mut graph = ShaderGraph::new("Test");
        graph.add_node(calling(first.id));

        let dependencies: Vec<_> = graph.source_asset_dependencies(&library).into_iter().collect();
        assert_eq!(dependencies, vec![first.id, second.id]);
    }
}
