// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node definitions for the shader graph.

use crate::codegen::hlsl_safe_name;
use crate::definition::{HlslFunctionDescriptor, NodeTypeDescriptor};
use crate::parameter::Parameter;
use crate::port::{ShaderValue, Slot, SlotId};
use crate::reconcile::{reconcile, Reconciliation};
use crate::requirements::DeclaredRequirement;
use crate::subgraph::{PropertyId, SubGraphRef};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Create a new random node ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// What a node does during code generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NodeKind {
    /// Calls the HLSL function bound by its type
    Function,
    /// Calls a generated function for a referenced sub-graph
    SubGraph(SubGraphRef),
    /// Reads one of the enclosing sub-graph's inputs
    Property(PropertyId),
    /// Its input slots are the outputs of the enclosing sub-graph
    SubGraphOutput,
}

/// A node instance in the graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique instance ID
    pub id: NodeId,
    /// Display name
    pub name: String,
    /// Name of the type the node was defined from
    pub type_name: String,
    /// What the node does
    pub kind: NodeKind,
    /// Function binding copied from the type definition
    pub function: Option<HlslFunctionDescriptor>,
    /// Requirements copied from the type definition
    pub requirements: Vec<DeclaredRequirement>,
    slots: Vec<Slot>,
    parameters: Vec<Parameter>,
}

impl Node {
    /// Create a node with no slots
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        let name = name.into();
        Self {
            id: NodeId::new(),
            type_name: name.clone(),
            name,
            kind,
            function: None,
            requirements: Vec::new(),
            slots: Vec::new(),
            parameters: Vec::new(),
        }
    }

    /// Create a function node from a type definition
    pub fn from_descriptor(descriptor: &NodeTypeDescriptor) -> Self {
        let mut node = Self::new(descriptor.name.clone(), NodeKind::Function);
        node.function = descriptor.function.clone();
        node.requirements = descriptor.requirements.clone();
        node.slots = descriptor.desired_slots();
        node.parameters = descriptor.desired_parameters(node.id);
        node
    }

    /// Create an output node for a sub-graph body
    pub fn sub_graph_output(slots: Vec<Slot>) -> Self {
        let mut node = Self::new("Sub Graph Outputs", NodeKind::SubGraphOutput);
        node.slots = slots;
        node
    }

    /// Rebuild slots and parameters from a (re)definition.
    ///
    /// Slots and parameters whose ids survive keep their stored values.
    pub fn apply_descriptor(&mut self, descriptor: &NodeTypeDescriptor) -> Reconciliation {
        self.type_name = descriptor.name.clone();
        self.function = descriptor.function.clone();
        self.requirements = descriptor.requirements.clone();
        self.replace_entries(descriptor.desired_slots(), descriptor.desired_parameters(self.id), false)
    }

    /// Reconcile against a desired set of slots and parameters
    pub fn replace_entries(
        &mut self,
        desired_slots: Vec<Slot>,
        desired_parameters: Vec<Parameter>,
        suppress_warnings: bool,
    ) -> Reconciliation {
        let result = reconcile(
            &self.slots,
            &self.parameters,
            desired_slots,
            desired_parameters,
            suppress_warnings,
        );
        self.slots = result.slots.clone();
        self.parameters = result.parameters.clone();
        result
    }

    /// Add a slot, replacing any slot with the same id in place
    pub fn add_slot(&mut self, slot: Slot) {
        match self.slots.iter_mut().find(|s| s.id == slot.id) {
            Some(existing) => *existing = slot,
            None => self.slots.push(slot),
        }
    }

    /// All slots, inputs first
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Mutable access to every slot
    pub fn slots_mut(&mut self) -> impl Iterator<Item = &mut Slot> {
        self.slots.iter_mut()
    }

    /// Input slots in declaration order
    pub fn input_slots(&self) -> impl Iterator<Item = &Slot> {
        self.slots.iter().filter(|s| s.is_input())
    }

    /// Output slots in declaration order
    pub fn output_slots(&self) -> impl Iterator<Item = &Slot> {
        self.slots.iter().filter(|s| s.is_output())
    }

    /// Get a slot by ID
    pub fn slot(&self, id: SlotId) -> Option<&Slot> {
        self.slots.iter().find(|s| s.id == id)
    }

    /// Get a mutable slot by ID
    pub fn slot_mut(&mut self, id: SlotId) -> Option<&mut Slot> {
        self.slots.iter_mut().find(|s| s.id == id)
    }

    /// All parameters
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Get a parameter by ID
    pub fn parameter(&self, id: SlotId) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.id == id)
    }

    /// Stored value for an id, looking at parameters before slots
    pub fn value(&self, id: SlotId) -> Option<&ShaderValue> {
        self.parameter(id)
            .map(|p| &p.value)
            .or_else(|| self.slot(id).map(|s| &s.value))
    }

    /// Set the stored value of a parameter or slot.
    ///
    /// Returns `false` when the id is unknown or the value type differs.
    pub fn set_value(&mut self, id: SlotId, value: ShaderValue) -> bool {
        if let Some(parameter) = self.parameters.iter_mut().find(|p| p.id == id) {
            if parameter.value_type != value.value_type() {
                return false;
            }
            parameter.value = value;
            return true;
        }
        match self.slot_mut(id) {
            Some(slot) if slot.value_type == value.value_type() => {
                slot.value = value;
                true
            }
            _ => false,
        }
    }

    /// Referenced sub-graph, for sub-graph call nodes
    pub fn sub_graph(&self) -> Option<&SubGraphRef> {
        match &self.kind {
            NodeKind::SubGraph(reference) => Some(reference),
            _ => None,
        }
    }

    /// Identifier prefix for variables generated for this node
    pub fn variable_name(&self) -> String {
        format!("{}_{}", hlsl_safe_name(&self.name), self.id.0.simple())
    }

    /// Variable holding the value of a slot
    pub fn slot_variable_name(&self, id: SlotId) -> String {
        let output_name = self
            .slot(id)
            .map(|s| hlsl_safe_name(&s.shader_output_name))
            .unwrap_or_default();
        format!("_{}_{}_{}", self.variable_name(), output_name, id)
    }

    /// Variable holding the value of a parameter
    pub fn parameter_variable_name(&self, id: SlotId) -> String {
        let name = self
            .parameter(id)
            .map(|p| hlsl_safe_name(&p.name))
            .unwrap_or_default();
        format!("_{}_{}_{}", self.variable_name(), name, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::ConcreteValueType;

    fn descriptor() -> NodeTypeDescriptor {
        NodeTypeDescriptor::new("Math/Basic", "Multiply")
            .with_input(0, "A", ShaderValue::Vector1(0.5))
            .with_input(1, "B", ShaderValue::Vector1(0.5))
            .with_output(2, "Out", ConcreteValueType::Vector1)
            .with_parameter(3, "Scale", ShaderValue::Vector1(1.0))
    }

    #[test]
    fn test_from_descriptor() {
        let node = Node::from_descriptor(&descriptor());
        assert_eq!(node.input_slots().count(), 2);
        assert_eq!(node.output_slots().count(), 1);
        assert_eq!(node.parameters().len(), 1);
        assert_eq!(node.parameters()[0].owner, node.id);
    }

    #[test]
    fn test_value_lookup_prefers_parameters() {
        let mut node = Node::from_descriptor(&descriptor());
        assert_eq!(node.value(SlotId(3)), Some(&ShaderValue::Vector1(1.0)));
        assert!(node.set_value(SlotId(0), ShaderValue::Vector1(4.0)));
        assert!(!node.set_value(SlotId(0), ShaderValue::Vector2([0.0; 2])));
        assert!(!node.set_value(SlotId(42), ShaderValue::Vector1(0.0)));
        assert_eq!(node.value(SlotId(0)), Some(&ShaderValue::Vector1(4.0)));
    }

    #[test]
    fn test_slot_variable_names() {
        let node = Node::from_descriptor(&descriptor());
        let name = node.slot_variable_name(SlotId(2));
        assert!(name.starts_with("_Multiply_"));
        assert!(name.ends_with("_Out_2"));
        assert_ne!(name, node.slot_variable_name(SlotId(0)));
    }

    #[test]
    fn test_apply_descriptor_keeps_values() {
        let mut node = Node::from_descriptor(&descriptor());
        node.set_value(SlotId(0), ShaderValue::Vector1(7.0));

        let reduced = NodeTypeDescriptor::new("Math/Basic", "Multiply")
            .with_input(0, "A", ShaderValue::Vector1(0.5))
            .with_output(2, "Out", ConcreteValueType::Vector1);
        let result = node.apply_descriptor(&reduced);

        assert_eq!(node.slots().len(), 2);
        assert_eq!(node.value(SlotId(0)), Some(&ShaderValue::Vector1(7.0)));
        assert!(node.parameters().is_empty());
        assert_eq!(result.removed.len(), 2);
    }
}
