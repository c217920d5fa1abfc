// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shader property collection.

use crate::port::{ConcreteValueType, Precision, ShaderValue};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// How code is being generated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GenerationMode {
    /// Editor preview: unconnected inputs read material properties
    Preview,
    /// Final shader: unconnected inputs become local constants
    #[default]
    ForReals,
}

impl GenerationMode {
    /// Whether this is preview generation
    pub fn is_preview(self) -> bool {
        self == Self::Preview
    }
}

/// A property exposed by generated shader code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShaderProperty {
    /// Identifier in generated code
    pub reference_name: String,
    /// Display name
    pub display_name: String,
    /// Default value
    pub value: ShaderValue,
}

impl ShaderProperty {
    /// Uniform declaration for this property
    pub fn declaration(&self, precision: Precision) -> String {
        let name = &self.reference_name;
        match self.value.value_type() {
            ConcreteValueType::Texture2D => format!("TEXTURE2D({name}); SAMPLER(sampler{name});"),
            ConcreteValueType::Texture2DArray => {
                format!("TEXTURE2D_ARRAY({name}); SAMPLER(sampler{name});")
            }
            ConcreteValueType::Texture3D => format!("TEXTURE3D({name}); SAMPLER(sampler{name});"),
            ConcreteValueType::Cubemap => format!("TEXTURECUBE({name}); SAMPLER(sampler{name});"),
            ConcreteValueType::SamplerState => format!("SAMPLER({name});"),
            other => format!("{} {name};", other.shader_type(precision)),
        }
    }
}

/// Collects properties across a graph and its sub-graphs
#[derive(Debug, Clone, Default)]
pub struct PropertyCollector {
    properties: IndexMap<String, ShaderProperty>,
}

impl PropertyCollector {
    /// Create an empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a property; the first property with a given reference name wins.
    ///
    /// Returns `false` if the name was already collected.
    pub fn add(&mut self, property: ShaderProperty) -> bool {
        if self.properties.contains_key(&property.reference_name) {
            return false;
        }
        self.properties.insert(property.reference_name.clone(), property);
        true
    }

    /// Collected properties in insertion order
    pub fn properties(&self) -> impl Iterator<Item = &ShaderProperty> {
        self.properties.values()
    }

    /// Look up a property by reference name
    pub fn get(&self, reference_name: &str) -> Option<&ShaderProperty> {
        self.properties.get(reference_name)
    }

    /// Number of collected properties
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Whether nothing was collected
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Consume the collector
    pub fn into_properties(self) -> Vec<ShaderProperty> {
        self.properties.into_values().collect()
    }
}

/// Value shown in an editor preview material
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewProperty {
    /// Property name in the preview shader
    pub name: String,
    /// Current value
    pub value: ShaderValue,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn property(name: &str, value: ShaderValue) -> ShaderProperty {
        ShaderProperty {
            reference_name: name.to_string(),
            display_name: name.to_string(),
            value,
        }
    }

    #[test]
    fn test_first_property_wins() {
        let mut collector = PropertyCollector::new();
        assert!(collector.add(property("Scale", ShaderValue::Vector1(1.0))));
        assert!(!collector.add(property("Scale", ShaderValue::Vector1(2.0))));
        assert_eq!(collector.len(), 1);
        assert_eq!(collector.get("Scale").unwrap().value, ShaderValue::Vector1(1.0));
    }

    #[test]
    fn test_declarations() {
        let scalar = property("Scale", ShaderValue::Vector1(1.0));
        assert_eq!(scalar.declaration(Precision::Half), "half Scale;");

        let texture = property("MainTex", ShaderValue::Texture2D(None));
        assert_eq!(
            texture.declaration(Precision::Float),
            "TEXTURE2D(MainTex); SAMPLER(samplerMainTex);"
        );
    }
}
