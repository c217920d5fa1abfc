// SPDX-License-Identifier: MIT OR Apache-2.0
//! Slot (port) definitions for node inputs/outputs.
//!
//! A slot id is assigned by the node type definition and never by position,
//! so stored values and edges survive a redefinition of the owning node.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a slot or parameter, unique within one node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SlotId(pub u32);

impl SlotId {
    /// Derive a stable slot id from a UUID (used for sub-graph inputs).
    ///
    /// The same UUID always folds to the same id.
    pub fn from_uuid(uuid: Uuid) -> Self {
        let (hi, lo) = uuid.as_u64_pair();
        let folded = hi ^ lo;
        Self(((folded >> 32) as u32) ^ (folded as u32))
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Port direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortDirection {
    /// Input port
    Input,
    /// Output port
    Output,
}

/// Shader stage(s) a value is valid in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StageCapability {
    /// Vertex stage only
    Vertex,
    /// Fragment stage only
    Fragment,
    /// Any stage
    #[default]
    All,
}

impl StageCapability {
    /// Whether a value restricted to `self` may be used in `other`.
    pub fn is_compatible_with(self, other: StageCapability) -> bool {
        self == Self::All || other == Self::All || self == other
    }
}

/// Floating point precision used when naming shader types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Precision {
    /// 32-bit floats
    #[default]
    Float,
    /// 16-bit floats
    Half,
}

impl Precision {
    /// HLSL scalar keyword for this precision
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Float => "float",
            Self::Half => "half",
        }
    }
}

/// Concrete value type carried by a slot or parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConcreteValueType {
    /// Scalar
    Vector1,
    /// 2 component vector
    Vector2,
    /// 3 component vector
    Vector3,
    /// 4 component vector
    Vector4,
    /// Boolean
    Boolean,
    /// 2x2 matrix
    Matrix2,
    /// 3x3 matrix
    Matrix3,
    /// 4x4 matrix
    Matrix4,
    /// 2D texture
    Texture2D,
    /// 2D texture array
    Texture2DArray,
    /// 3D texture
    Texture3D,
    /// Cubemap
    Cubemap,
    /// Sampler state
    SamplerState,
}

impl ConcreteValueType {
    /// HLSL type name at the given precision
    pub fn shader_type(self, precision: Precision) -> String {
        let p = precision.keyword();
        match self {
            Self::Vector1 => p.to_string(),
            Self::Vector2 => format!("{p}2"),
            Self::Vector3 => format!("{p}3"),
            Self::Vector4 => format!("{p}4"),
            Self::Boolean => "bool".to_string(),
            Self::Matrix2 => format!("{p}2x2"),
            Self::Matrix3 => format!("{p}3x3"),
            Self::Matrix4 => format!("{p}4x4"),
            Self::Texture2D => "Texture2D".to_string(),
            Self::Texture2DArray => "Texture2DArray".to_string(),
            Self::Texture3D => "Texture3D".to_string(),
            Self::Cubemap => "TextureCube".to_string(),
            Self::SamplerState => "SamplerState".to_string(),
        }
    }

    /// Whether this is one of the texture types
    pub fn is_texture(self) -> bool {
        matches!(
            self,
            Self::Texture2D | Self::Texture2DArray | Self::Texture3D | Self::Cubemap
        )
    }

    /// Number of vector components, 0 for non-vector types
    pub fn components(self) -> u32 {
        match self {
            Self::Vector1 | Self::Boolean => 1,
            Self::Vector2 => 2,
            Self::Vector3 => 3,
            Self::Vector4 => 4,
            _ => 0,
        }
    }

    /// Whether values of this type can be written as an HLSL literal
    pub fn has_literal(self) -> bool {
        !self.is_texture() && self != Self::SamplerState
    }

    /// Macro used to pass a texture and its sampler at a call site
    pub fn texture_param_macro(self) -> Option<&'static str> {
        match self {
            Self::Texture2D => Some("TEXTURE2D_PARAM"),
            Self::Texture2DArray => Some("TEXTURE2D_ARRAY_PARAM"),
            Self::Texture3D => Some("TEXTURE3D_PARAM"),
            Self::Cubemap => Some("TEXTURECUBE_PARAM"),
            _ => None,
        }
    }

    /// Macro used to declare a texture and its sampler in a function signature
    pub fn texture_args_macro(self) -> Option<&'static str> {
        match self {
            Self::Texture2D => Some("TEXTURE2D_ARGS"),
            Self::Texture2DArray => Some("TEXTURE2D_ARRAY_ARGS"),
            Self::Texture3D => Some("TEXTURE3D_ARGS"),
            Self::Cubemap => Some("TEXTURECUBE_ARGS"),
            _ => None,
        }
    }

    /// Check if a value of this type can flow into a slot of `other`
    pub fn can_connect_to(self, other: ConcreteValueType) -> bool {
        if self == other {
            return true;
        }

        match (self, other) {
            // Vectors truncate and promote freely
            (a, b) if a.components() > 0 && b.components() > 0 => true,
            // Matrices truncate
            (Self::Matrix4, Self::Matrix3 | Self::Matrix2) | (Self::Matrix3, Self::Matrix2) => true,
            _ => false,
        }
    }
}

/// Value stored in a slot or parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ShaderValue {
    /// Scalar
    Vector1(f32),
    /// 2D vector
    Vector2([f32; 2]),
    /// 3D vector
    Vector3([f32; 3]),
    /// 4D vector
    Vector4([f32; 4]),
    /// Boolean
    Boolean(bool),
    /// 2x2 matrix, row major
    Matrix2([[f32; 2]; 2]),
    /// 3x3 matrix, row major
    Matrix3([[f32; 3]; 3]),
    /// 4x4 matrix, row major
    Matrix4([[f32; 4]; 4]),
    /// 2D texture asset path
    Texture2D(Option<String>),
    /// 2D texture array asset path
    Texture2DArray(Option<String>),
    /// 3D texture asset path
    Texture3D(Option<String>),
    /// Cubemap asset path
    Cubemap(Option<String>),
    /// Sampler state
    SamplerState,
}

impl ShaderValue {
    /// Default value for a value type
    pub fn default_for(value_type: ConcreteValueType) -> Self {
        match value_type {
            ConcreteValueType::Vector1 => Self::Vector1(0.0),
            ConcreteValueType::Vector2 => Self::Vector2([0.0; 2]),
            ConcreteValueType::Vector3 => Self::Vector3([0.0; 3]),
            ConcreteValueType::Vector4 => Self::Vector4([0.0; 4]),
            ConcreteValueType::Boolean => Self::Boolean(false),
            ConcreteValueType::Matrix2 => Self::Matrix2([[1.0, 0.0], [0.0, 1.0]]),
            ConcreteValueType::Matrix3 => {
                Self::Matrix3([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]])
            }
            ConcreteValueType::Matrix4 => Self::Matrix4([
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ]),
            ConcreteValueType::Texture2D => Self::Texture2D(None),
            ConcreteValueType::Texture2DArray => Self::Texture2DArray(None),
            ConcreteValueType::Texture3D => Self::Texture3D(None),
            ConcreteValueType::Cubemap => Self::Cubemap(None),
            ConcreteValueType::SamplerState => Self::SamplerState,
        }
    }

    /// Get the value type for this value
    pub fn value_type(&self) -> ConcreteValueType {
        match self {
            Self::Vector1(_) => ConcreteValueType::Vector1,
            Self::Vector2(_) => ConcreteValueType::Vector2,
            Self::Vector3(_) => ConcreteValueType::Vector3,
            Self::Vector4(_) => ConcreteValueType::Vector4,
            Self::Boolean(_) => ConcreteValueType::Boolean,
            Self::Matrix2(_) => ConcreteValueType::Matrix2,
            Self::Matrix3(_) => ConcreteValueType::Matrix3,
            Self::Matrix4(_) => ConcreteValueType::Matrix4,
            Self::Texture2D(_) => ConcreteValueType::Texture2D,
            Self::Texture2DArray(_) => ConcreteValueType::Texture2DArray,
            Self::Texture3D(_) => ConcreteValueType::Texture3D,
            Self::Cubemap(_) => ConcreteValueType::Cubemap,
            Self::SamplerState => ConcreteValueType::SamplerState,
        }
    }

    /// HLSL literal for this value, `None` for resources that cannot be inlined
    pub fn to_hlsl(&self, precision: Precision) -> Option<String> {
        let ty = self.value_type().shader_type(precision);
        let literal = match self {
            Self::Vector1(v) => float_literal(*v),
            Self::Vector2(v) => format!("{ty}({})", join_floats(v)),
            Self::Vector3(v) => format!("{ty}({})", join_floats(v)),
            Self::Vector4(v) => format!("{ty}({})", join_floats(v)),
            Self::Boolean(b) => b.to_string(),
            Self::Matrix2(m) => format!("{ty}({})", join_floats(m.iter().flatten())),
            Self::Matrix3(m) => format!("{ty}({})", join_floats(m.iter().flatten())),
            Self::Matrix4(m) => format!("{ty}({})", join_floats(m.iter().flatten())),
            Self::Texture2D(_)
            | Self::Texture2DArray(_)
            | Self::Texture3D(_)
            | Self::Cubemap(_)
            | Self::SamplerState => return None,
        };
        Some(literal)
    }
}

fn float_literal(value: f32) -> String {
    // Debug formatting always keeps a decimal point ("1.0", not "1")
    format!("{value:?}")
}

fn join_floats<'a>(values: impl IntoIterator<Item = &'a f32>) -> String {
    values
        .into_iter()
        .map(|v| float_literal(*v))
        .collect::<Vec<_>>()
        .join(", ")
}

/// A slot on a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    /// Stable slot ID
    pub id: SlotId,
    /// Display name
    pub name: String,
    /// Name used when generating shader identifiers
    pub shader_output_name: String,
    /// Slot direction
    pub direction: PortDirection,
    /// Concrete value type
    pub value_type: ConcreteValueType,
    /// Stored default value (used when an input has no incoming edge)
    pub value: ShaderValue,
    /// Stage(s) this slot is valid in
    pub stage_capability: StageCapability,
}

impl Slot {
    /// Create a new input slot whose type follows its default value
    pub fn input(id: SlotId, name: impl Into<String>, value: ShaderValue) -> Self {
        let name = name.into();
        Self {
            id,
            shader_output_name: name.clone(),
            name,
            direction: PortDirection::Input,
            value_type: value.value_type(),
            value,
            stage_capability: StageCapability::All,
        }
    }

    /// Create a new output slot
    pub fn output(id: SlotId, name: impl Into<String>, value_type: ConcreteValueType) -> Self {
        let name = name.into();
        Self {
            id,
            shader_output_name: name.clone(),
            name,
            direction: PortDirection::Output,
            value_type,
            value: ShaderValue::default_for(value_type),
            stage_capability: StageCapability::All,
        }
    }

    /// Set the shader output name
    pub fn with_shader_output_name(mut self, name: impl Into<String>) -> Self {
        self.shader_output_name = name.into();
        self
    }

    /// Restrict the slot to a stage
    pub fn with_stage(mut self, stage: StageCapability) -> Self {
        self.stage_capability = stage;
        self
    }

    /// Whether this is an input slot
    pub fn is_input(&self) -> bool {
        self.direction == PortDirection::Input
    }

    /// Whether this is an output slot
    pub fn is_output(&self) -> bool {
        self.direction == PortDirection::Output
    }

    /// Copy the stored value from a previous instance of this slot.
    ///
    /// The value is only taken when it still fits the slot's value type.
    pub fn copy_values_from(&mut self, previous: &Slot) {
        if previous.value.value_type() == self.value_type {
            self.value = previous.value.clone();
        }
    }

    /// Check if a connection to another slot is valid
    pub fn can_connect(&self, other: &Slot) -> bool {
        // Must be opposite directions
        if self.direction == other.direction {
            return false;
        }

        let (output, input) = if self.is_output() { (self, other) } else { (other, self) };
        output.value_type.can_connect_to(input.value_type)
    }
}
