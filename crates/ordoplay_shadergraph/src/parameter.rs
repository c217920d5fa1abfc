// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node-local parameters.
//!
//! Parameters share the slot id space of their node but are never connected
//! by edges. The owner is stored as a [`NodeId`] key into the owning graph.

use crate::node::NodeId;
use crate::port::{ConcreteValueType, ShaderValue, SlotId};
use serde::{Deserialize, Serialize};

/// A named value local to one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Stable parameter ID
    pub id: SlotId,
    /// Display name
    pub name: String,
    /// Concrete value type
    pub value_type: ConcreteValueType,
    /// Current value
    pub value: ShaderValue,
    /// Node owning this parameter
    pub owner: NodeId,
}

impl Parameter {
    /// Create a new parameter owned by `owner`
    pub fn new(id: SlotId, name: impl Into<String>, value: ShaderValue, owner: NodeId) -> Self {
        Self {
            id,
            name: name.into(),
            value_type: value.value_type(),
            value,
            owner,
        }
    }

    /// Copy the stored value from a previous instance of this parameter
    pub fn copy_values_from(&mut self, previous: &Parameter) {
        if previous.value.value_type() == self.value_type {
            self.value = previous.value.clone();
        }
    }
}
