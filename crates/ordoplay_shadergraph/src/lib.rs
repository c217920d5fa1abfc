// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shader graph compilation core for `OrdoPlay` Editor.
//!
//! Turns a graph of typed nodes into HLSL source:
//! - Node type definitions with stable slot ids
//! - Slot/parameter reconciliation when a type is redefined
//! - Requirement and stage propagation through sub-graphs
//! - Function emission with one generated function per sub-graph
//!
//! ## Architecture
//!
//! A [`ShaderGraph`] owns its [`Node`]s and [`Connection`]s. Node types live
//! in a [`NodeTypeRegistry`]; sub-graph assets are looked up through an
//! [`AssetResolver`]. Code generation is a pure pass over a graph that
//! registers functions in a [`codegen::FunctionRegistry`].

pub mod port;
pub mod parameter;
pub mod definition;
pub mod reconcile;
pub mod requirements;
pub mod node;
pub mod connection;
pub mod subgraph;
pub mod collector;
pub mod diagnostics;
pub mod graph;
pub mod codegen;
pub mod library;

pub use port::{ConcreteValueType, PortDirection, Precision, ShaderValue, Slot, SlotId, StageCapability};
pub use parameter::Parameter;
pub use definition::{DefinitionError, HlslFunctionDescriptor, NodeTypeDescriptor, NodeTypeRegistry, TypeHandle};
pub use reconcile::{Reconciliation, StaleIdentifierRemoved};
pub use requirements::{NeededCoordinateSpace, Requirement, RequirementKind, ShaderGraphRequirements};
pub use node::{Node, NodeId, NodeKind};
pub use connection::{Connection, ConnectionId};
pub use subgraph::{AssetId, AssetResolver, GraphInput, NoAssets, SubGraphAsset, SubGraphLibrary, SubGraphRef};
pub use collector::{GenerationMode, PropertyCollector, ShaderProperty};
pub use diagnostics::{Diagnostic, DiagnosticSink, Diagnostics, Severity};
pub use graph::{GraphError, ModificationScope, ShaderGraph};
pub use codegen::{generate_shader, CodegenError, GeneratedShader, GraphContext};
