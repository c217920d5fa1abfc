// SPDX-License-Identifier: MIT OR Apache-2.0
//! Built-in node types.
//!
//! Each type binds to a function in one of the HLSL node libraries. Ids are
//! part of the saved format: never renumber them, only add new ones.

use crate::definition::{
    DefinitionError, HlslFunctionDescriptor, HlslSourceRef, NodeTypeDescriptor, NodeTypeRegistry,
};
use crate::port::{ConcreteValueType, ShaderValue, SlotId};
use crate::requirements::{NeededCoordinateSpace, Requirement, UvChannel};

const MATH_BASIC: &str = "Math_Basic.hlsl";
const GEOMETRY: &str = "Geometry.hlsl";
const TEXTURE: &str = "Texture.hlsl";

fn binding(source: &str, name: &str, arguments: &[u32], return_value: u32) -> HlslFunctionDescriptor {
    HlslFunctionDescriptor {
        source: HlslSourceRef::new(source),
        name: name.to_string(),
        arguments: arguments.iter().copied().map(SlotId).collect(),
        return_value: Some(SlotId(return_value)),
    }
}

/// Descriptors of every built-in node type
pub fn builtin_types() -> Vec<NodeTypeDescriptor> {
    vec![
        // ====================================================================
        // Math
        // ====================================================================
        NodeTypeDescriptor::new("Math/Basic", "Multiply")
            .with_input(0, "A", ShaderValue::Vector1(0.5))
            .with_input(1, "B", ShaderValue::Vector1(0.5))
            .with_output(2, "Out", ConcreteValueType::Vector1)
            .with_function(binding(MATH_BASIC, "Unity_Multiply", &[0, 1], 2)),
        NodeTypeDescriptor::new("Math/Basic", "Add")
            .with_input(0, "A", ShaderValue::Vector1(0.0))
            .with_input(1, "B", ShaderValue::Vector1(1.0))
            .with_output(2, "Out", ConcreteValueType::Vector1)
            .with_function(binding(MATH_BASIC, "Unity_Add", &[0, 1], 2)),
        NodeTypeDescriptor::new("Math/Basic", "Subtract")
            .with_input(0, "A", ShaderValue::Vector1(1.0))
            .with_input(1, "B", ShaderValue::Vector1(1.0))
            .with_output(2, "Out", ConcreteValueType::Vector1)
            .with_function(binding(MATH_BASIC, "Unity_Subtract", &[0, 1], 2)),
        NodeTypeDescriptor::new("Math/Interpolation", "Lerp")
            .with_input(0, "A", ShaderValue::Vector4([0.0; 4]))
            .with_input(1, "B", ShaderValue::Vector4([1.0; 4]))
            .with_input(2, "T", ShaderValue::Vector4([0.0; 4]))
            .with_output(3, "Out", ConcreteValueType::Vector4)
            .with_function(binding(MATH_BASIC, "Unity_Lerp", &[0, 1, 2], 3)),
        // ====================================================================
        // Input - Geometry
        // ====================================================================
        NodeTypeDescriptor::new("Input/Geometry", "Normal Vector")
            .with_output(0, "Out", ConcreteValueType::Vector3)
            .with_requirement(Requirement::Normal(NeededCoordinateSpace::WORLD))
            .with_function(binding(GEOMETRY, "Unity_NormalVector_World", &[], 0)),
        NodeTypeDescriptor::new("Input/Geometry", "Tangent Vector")
            .with_output(0, "Out", ConcreteValueType::Vector3)
            .with_requirement(Requirement::Tangent(NeededCoordinateSpace::WORLD))
            .with_function(binding(GEOMETRY, "Unity_TangentVector_World", &[], 0)),
        NodeTypeDescriptor::new("Input/Geometry", "Position")
            .with_output(0, "Out", ConcreteValueType::Vector3)
            .with_requirement(Requirement::Position(NeededCoordinateSpace::WORLD))
            .with_function(binding(GEOMETRY, "Unity_Position_World", &[], 0)),
        NodeTypeDescriptor::new("Input/Geometry", "View Direction")
            .with_output(0, "Out", ConcreteValueType::Vector3)
            .with_requirement(Requirement::ViewDirection(NeededCoordinateSpace::WORLD))
            .with_function(binding(GEOMETRY, "Unity_ViewDirection_World", &[], 0)),
        NodeTypeDescriptor::new("Input/Geometry", "Screen Position")
            .with_output(0, "Out", ConcreteValueType::Vector4)
            .with_requirement(Requirement::ScreenPosition)
            .with_function(binding(GEOMETRY, "Unity_ScreenPosition", &[], 0)),
        NodeTypeDescriptor::new("Input/Geometry", "Vertex Color")
            .with_output(0, "Out", ConcreteValueType::Vector4)
            .with_requirement(Requirement::VertexColor)
            .with_function(binding(GEOMETRY, "Unity_VertexColor", &[], 0)),
        NodeTypeDescriptor::new("Input/Geometry", "UV")
            .with_output(0, "Out", ConcreteValueType::Vector4)
            .with_requirement(Requirement::MeshUv(UvChannel::Uv0))
            .with_function(binding(GEOMETRY, "Unity_UV0", &[], 0)),
        NodeTypeDescriptor::new("Input/Basic", "Time")
            .with_output(0, "Time", ConcreteValueType::Vector1)
            .with_requirement(Requirement::Time)
            .with_function(binding(GEOMETRY, "Unity_Time", &[], 0)),
        // ====================================================================
        // Input - Texture
        // ====================================================================
        NodeTypeDescriptor::new("Input/Texture", "Sample Texture 2D")
            .with_input(0, "Texture", ShaderValue::Texture2D(None))
            .with_input(1, "UV", ShaderValue::Vector2([0.0; 2]))
            .with_output(2, "RGBA", ConcreteValueType::Vector4)
            .with_requirement(Requirement::MeshUv(UvChannel::Uv0))
            .with_function(binding(TEXTURE, "Unity_SampleTexture2D", &[0, 1], 2)),
    ]
}

/// Define every built-in type in `registry`
pub fn register_builtin_types(registry: &mut NodeTypeRegistry) -> Result<(), DefinitionError> {
    for descriptor in builtin_types() {
        registry.define_type(descriptor)?;
    }
    Ok(())
}

/// Create a registry holding the built-in types
pub fn create_builtin_registry() -> Result<NodeTypeRegistry, DefinitionError> {
    let mut registry = NodeTypeRegistry::new();
    register_builtin_types(&mut registry)?;
    Ok(registry)
}
