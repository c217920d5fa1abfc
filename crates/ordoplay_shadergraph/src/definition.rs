// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node type definitions and the registry that materializes them.
//!
//! A [`NodeTypeDescriptor`] lists the ports and parameters of a node type
//! together with an optional HLSL function binding. All ids of one
//! descriptor live in a single id space.

use crate::node::{Node, NodeId};
use crate::parameter::Parameter;
use crate::port::{ConcreteValueType, ShaderValue, Slot, SlotId, StageCapability};
use crate::requirements::{DeclaredRequirement, Requirement};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Input port or parameter description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputDescriptor {
    /// Stable id
    pub id: SlotId,
    /// Display name
    pub name: String,
    /// Default value, also fixes the value type
    pub default: ShaderValue,
    /// Stage restriction
    pub stage: StageCapability,
}

/// Output port description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputDescriptor {
    /// Stable id
    pub id: SlotId,
    /// Display name
    pub name: String,
    /// Produced value type
    pub value_type: ConcreteValueType,
    /// Stage restriction
    pub stage: StageCapability,
}

/// Reference to an HLSL source file providing node functions
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HlslSourceRef(pub String);

impl HlslSourceRef {
    /// Create a source reference from a path
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// The referenced path
    pub fn path(&self) -> &str {
        &self.0
    }
}

/// Binding of a node type to an HLSL function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HlslFunctionDescriptor {
    /// File declaring the function
    pub source: HlslSourceRef,
    /// Function name, without the precision suffix
    pub name: String,
    /// Ports passed as arguments, in order
    pub arguments: Vec<SlotId>,
    /// Output port receiving the result as the trailing `out` argument
    pub return_value: Option<SlotId>,
}

/// Full description of a node type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeTypeDescriptor {
    /// Menu path, e.g. `Math/Basic`
    pub path: String,
    /// Type name, unique within a registry
    pub name: String,
    /// Input ports
    pub inputs: Vec<InputDescriptor>,
    /// Output ports
    pub outputs: Vec<OutputDescriptor>,
    /// Node-local parameters
    pub parameters: Vec<InputDescriptor>,
    /// Requirements instances of this type place on the surface inputs
    pub requirements: Vec<DeclaredRequirement>,
    /// Function binding, if already attached
    pub function: Option<HlslFunctionDescriptor>,
}

impl NodeTypeDescriptor {
    /// Start a descriptor with no ports
    pub fn new(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            parameters: Vec::new(),
            requirements: Vec::new(),
            function: None,
        }
    }

    /// Add an input port
    pub fn with_input(mut self, id: u32, name: impl Into<String>, default: ShaderValue) -> Self {
        self.inputs.push(InputDescriptor {
            id: SlotId(id),
            name: name.into(),
            default,
            stage: StageCapability::All,
        });
        self
    }

    /// Add an output port
    pub fn with_output(
        mut self,
        id: u32,
        name: impl Into<String>,
        value_type: ConcreteValueType,
    ) -> Self {
        self.outputs.push(OutputDescriptor {
            id: SlotId(id),
            name: name.into(),
            value_type,
            stage: StageCapability::All,
        });
        self
    }

    /// Add a parameter
    pub fn with_parameter(mut self, id: u32, name: impl Into<String>, default: ShaderValue) -> Self {
        self.parameters.push(InputDescriptor {
            id: SlotId(id),
            name: name.into(),
            default,
            stage: StageCapability::All,
        });
        self
    }

    /// Declare a requirement valid in every stage
    pub fn with_requirement(self, requirement: Requirement) -> Self {
        self.with_stage_requirement(requirement, StageCapability::All)
    }

    /// Declare a requirement for one stage
    pub fn with_stage_requirement(mut self, requirement: Requirement, stage: StageCapability) -> Self {
        self.requirements.push(DeclaredRequirement { requirement, stage });
        self
    }

    /// Attach a function binding
    pub fn with_function(mut self, function: HlslFunctionDescriptor) -> Self {
        self.function = Some(function);
        self
    }

    /// Ids of all ports and parameters, in declaration order
    pub fn ids(&self) -> impl Iterator<Item = SlotId> + '_ {
        self.inputs
            .iter()
            .map(|i| i.id)
            .chain(self.outputs.iter().map(|o| o.id))
            .chain(self.parameters.iter().map(|p| p.id))
    }

    /// The id set used to compare redefinitions
    pub fn id_set(&self) -> BTreeSet<SlotId> {
        self.ids().collect()
    }

    /// Reject descriptors reusing an id or binding unknown ports
    pub fn validate(&self) -> Result<(), DefinitionError> {
        let mut seen = BTreeSet::new();
        for id in self.ids() {
            if !seen.insert(id) {
                return Err(DefinitionError::DuplicateId {
                    type_name: self.name.clone(),
                    id,
                });
            }
        }

        if let Some(function) = &self.function {
            self.check_binding(function)?;
        }
        Ok(())
    }

    fn check_binding(&self, function: &HlslFunctionDescriptor) -> Result<(), DefinitionError> {
        let is_port = |id: &SlotId| {
            self.inputs.iter().any(|i| i.id == *id) || self.outputs.iter().any(|o| o.id == *id)
        };
        let unknown = function
            .arguments
            .iter()
            .chain(function.return_value.iter())
            .find(|id| !is_port(id));

        match unknown {
            Some(id) => Err(DefinitionError::UnknownPort {
                function: function.name.clone(),
                id: *id,
            }),
            None => Ok(()),
        }
    }

    /// Slots an instance of this type should carry
    pub fn desired_slots(&self) -> Vec<Slot> {
        let inputs = self
            .inputs
            .iter()
            .map(|i| Slot::input(i.id, i.name.clone(), i.default.clone()).with_stage(i.stage));
        let outputs = self
            .outputs
            .iter()
            .map(|o| Slot::output(o.id, o.name.clone(), o.value_type).with_stage(o.stage));
        inputs.chain(outputs).collect()
    }

    /// Parameters an instance of this type should carry
    pub fn desired_parameters(&self, owner: NodeId) -> Vec<Parameter> {
        self.parameters
            .iter()
            .map(|p| Parameter::new(p.id, p.name.clone(), p.default.clone(), owner))
            .collect()
    }
}

/// Handle to a type registered in a [`NodeTypeRegistry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeHandle(usize);

#[derive(Debug, Clone)]
struct RegisteredType {
    descriptor: NodeTypeDescriptor,
    revision: u32,
}

/// Registry of node types
#[derive(Debug, Clone, Default)]
pub struct NodeTypeRegistry {
    /// Registered types by name
    types: IndexMap<String, RegisteredType>,
}

impl NodeTypeRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Define (or redefine) a node type.
    ///
    /// Redefining a type with an unchanged id set is a no-op returning the
    /// existing handle. A changed id set replaces the stored descriptor and
    /// bumps the type's revision; the handle stays the same.
    pub fn define_type(&mut self, descriptor: NodeTypeDescriptor) -> Result<TypeHandle, DefinitionError> {
        descriptor.validate()?;

        if let Some((index, _, existing)) = self.types.get_full_mut(&descriptor.name) {
            if existing.descriptor.id_set() == descriptor.id_set() {
                tracing::debug!("Node type '{}' unchanged", descriptor.name);
                return Ok(TypeHandle(index));
            }
            tracing::debug!(
                "Node type '{}' redefined (revision {})",
                descriptor.name,
                existing.revision + 1
            );
            existing.descriptor = descriptor;
            existing.revision += 1;
            return Ok(TypeHandle(index));
        }

        let (index, _) = self.types.insert_full(
            descriptor.name.clone(),
            RegisteredType {
                descriptor,
                revision: 0,
            },
        );
        Ok(TypeHandle(index))
    }

    /// Attach (or replace) the function binding of a type
    pub fn set_function(
        &mut self,
        handle: TypeHandle,
        function: HlslFunctionDescriptor,
    ) -> Result<(), DefinitionError> {
        let (_, registered) = self
            .types
            .get_index_mut(handle.0)
            .ok_or(DefinitionError::UnknownType(handle))?;
        registered.descriptor.check_binding(&function)?;
        registered.descriptor.function = Some(function);
        Ok(())
    }

    /// Get a node type by handle
    pub fn get(&self, handle: TypeHandle) -> Option<&NodeTypeDescriptor> {
        self.types.get_index(handle.0).map(|(_, t)| &t.descriptor)
    }

    /// Look up a handle by type name
    pub fn handle(&self, name: &str) -> Option<TypeHandle> {
        self.types.get_index_of(name).map(TypeHandle)
    }

    /// Number of id-set changes a type went through
    pub fn revision(&self, handle: TypeHandle) -> Option<u32> {
        self.types.get_index(handle.0).map(|(_, t)| t.revision)
    }

    /// Get all registered types
    pub fn types(&self) -> impl Iterator<Item = &NodeTypeDescriptor> {
        self.types.values().map(|t| &t.descriptor)
    }

    /// Get types whose menu path starts with `prefix`
    pub fn types_in_path<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a NodeTypeDescriptor> {
        self.types().filter(move |t| t.path.starts_with(prefix))
    }

    /// Create a node instance of a type
    pub fn instantiate(&self, handle: TypeHandle) -> Result<Node, DefinitionError> {
        self.get(handle)
            .map(Node::from_descriptor)
            .ok_or(DefinitionError::UnknownType(handle))
    }
}

/// Error raised by node type definitions
#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    /// Two ports or parameters of one descriptor share an id
    #[error("Node type '{type_name}' declares id {id} more than once")]
    DuplicateId {
        /// Offending type
        type_name: String,
        /// Repeated id
        id: SlotId,
    },

    /// A function binding names an id that is not a port of the type
    #[error("Function '{function}' binds unknown port {id}")]
    UnknownPort {
        /// Bound function
        function: String,
        /// Unknown id
        id: SlotId,
    },

    /// Handle does not belong to this registry
    #[error("Unknown node type: {0:?}")]
    UnknownType(TypeHandle),

    /// Code generation was requested before a function binding exists
    #[error("Node '{node}' has no function binding")]
    MissingBinding {
        /// Node name
        node: String,
    },
}
