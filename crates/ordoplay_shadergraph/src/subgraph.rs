// SPDX-License-Identifier: MIT OR Apache-2.0
//! Sub-graph assets and the references nodes hold to them.
//!
//! A sub-graph is a full [`ShaderGraph`] with declared inputs and an output
//! node, invoked from a parent graph as a generated function. Nodes persist
//! only the asset id; resolution goes through an [`AssetResolver`] and is
//! cached per reference until the reference is reassigned.

use crate::collector::{GenerationMode, PreviewProperty, PropertyCollector, ShaderProperty};
use crate::diagnostics::Diagnostics;
use crate::graph::{GraphError, ShaderGraph};
use crate::node::{Node, NodeId, NodeKind};
use crate::port::{ConcreteValueType, ShaderValue, Slot, SlotId, StageCapability};
use crate::requirements::nodes_effective_stage;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;
use std::fmt;
use std::rc::Rc;
use uuid::Uuid;

/// Persistent unique id of a sub-graph asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetId(pub Uuid);

impl AssetId {
    /// Create a new random asset ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AssetId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Unique id of a sub-graph input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropertyId(pub Uuid);

impl PropertyId {
    /// Create a new random property ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PropertyId {
    fn default() -> Self {
        Self::new()
    }
}

/// An input declared by a sub-graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphInput {
    /// Unique id
    pub id: PropertyId,
    /// Display name
    pub display_name: String,
    /// Identifier used in generated code
    pub reference_name: String,
    /// Default value, also fixes the type
    pub value: ShaderValue,
}

impl GraphInput {
    /// Create an input with a generated reference name
    pub fn new(display_name: impl Into<String>, value: ShaderValue) -> Self {
        let id = PropertyId::new();
        Self {
            reference_name: format!("{:?}_{}", value.value_type(), id.0.simple()),
            id,
            display_name: display_name.into(),
            value,
        }
    }

    /// Slot id used for this input on call-site nodes
    pub fn slot_id(&self) -> SlotId {
        SlotId::from_uuid(self.id.0)
    }

    /// Value type of the input
    pub fn value_type(&self) -> ConcreteValueType {
        self.value.value_type()
    }

    /// Property exposing this input on a material
    pub fn to_shader_property(&self) -> ShaderProperty {
        ShaderProperty {
            reference_name: self.reference_name.clone(),
            display_name: self.display_name.clone(),
            value: self.value.clone(),
        }
    }
}

/// A reusable graph invoked as a function from a parent graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubGraphAsset {
    /// Persistent id
    pub id: AssetId,
    /// Asset name
    pub name: String,
    /// Declared inputs, in declaration order
    pub inputs: Vec<GraphInput>,
    /// Body graph; its output node defines the outputs
    pub graph: ShaderGraph,
}

impl SubGraphAsset {
    /// Create an asset with an empty output node
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let mut graph = ShaderGraph::new(name.clone());
        let output = graph.add_node(Node::sub_graph_output(Vec::new()));
        graph.set_output_node(Some(output));
        Self {
            id: AssetId::new(),
            name,
            inputs: Vec::new(),
            graph,
        }
    }

    /// Declare an input and add a node reading it to the body.
    ///
    /// Returns the id of the property node.
    pub fn add_input(&mut self, input: GraphInput) -> NodeId {
        let mut node = Node::new(input.display_name.clone(), NodeKind::Property(input.id));
        node.add_slot(
            Slot::output(SlotId(0), input.display_name.clone(), input.value_type())
                .with_shader_output_name("Out"),
        );
        self.inputs.push(input);
        self.graph.add_node(node)
    }

    /// Declare an output. Returns `false` if there is no output node.
    pub fn add_output(&mut self, id: u32, name: impl Into<String>, value_type: ConcreteValueType) -> bool {
        let Some(output) = self.graph.output_node_id() else {
            return false;
        };
        let name = name.into();
        let value = ShaderValue::default_for(value_type);
        match self.graph.node_mut(output) {
            Some(node) => {
                node.add_slot(Slot::input(SlotId(id), name, value));
                true
            }
            None => false,
        }
    }

    /// Look up an input by id
    pub fn input(&self, id: PropertyId) -> Option<&GraphInput> {
        self.inputs.iter().find(|i| i.id == id)
    }

    /// The body's output node
    pub fn output_node(&self) -> Option<&Node> {
        self.graph.output_node()
    }

    /// Output slots of the sub-graph (the output node's inputs)
    pub fn outputs(&self) -> Vec<&Slot> {
        self.output_node()
            .map(|node| node.input_slots().collect())
            .unwrap_or_default()
    }

    /// Effective stage of the whole body (first non-`All` slot wins)
    pub fn effective_stage(&self) -> StageCapability {
        nodes_effective_stage(self.graph.active_nodes())
    }

    /// Slots a node calling this sub-graph should carry
    pub fn call_site_slots(&self) -> Vec<Slot> {
        let inputs = self.inputs.iter().map(|input| {
            Slot::input(input.slot_id(), input.display_name.clone(), input.value.clone())
                .with_shader_output_name(input.reference_name.clone())
        });

        let stage = self.effective_stage();
        let outputs = self.outputs().into_iter().map(|slot| {
            Slot::output(slot.id, slot.name.clone(), slot.value_type)
                .with_shader_output_name(slot.shader_output_name.clone())
                .with_stage(stage)
        });

        inputs.chain(outputs).collect()
    }

    /// Validate the body and count its nodes with errors
    pub fn validate(&self, resolver: &dyn AssetResolver, visiting: &mut Vec<AssetId>) -> usize {
        visiting.push(self.id);
        let failing = self.graph.check_nodes(resolver, visiting, &mut Diagnostics::new());
        visiting.pop();
        failing.len()
    }

    /// Add the declared inputs, and those of nested sub-graphs, to `collector`
    pub fn collect_graph_inputs(
        &self,
        collector: &mut PropertyCollector,
        mode: GenerationMode,
        resolver: &dyn AssetResolver,
    ) {
        for input in &self.inputs {
            collector.add(input.to_shader_property());
        }
        let mut visiting = vec![self.id];
        self.graph.collect_graph_inputs_guarded(collector, mode, resolver, &mut visiting);
    }

    /// Preview values of the declared inputs
    pub fn preview_properties(&self) -> Vec<PreviewProperty> {
        self.inputs
            .iter()
            .map(|input| PreviewProperty {
                name: input.reference_name.clone(),
                value: input.value.clone(),
            })
            .collect()
    }

    /// Serialize the asset to RON
    pub fn to_ron(&self) -> Result<String, GraphError> {
        Ok(ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?)
    }

    /// Deserialize an asset from RON
    pub fn from_ron(source: &str) -> Result<Self, GraphError> {
        Ok(ron::from_str(source)?)
    }
}

/// Resolves persisted asset ids to loaded sub-graph assets
pub trait AssetResolver {
    /// Look up an asset, `None` if it is unknown
    fn resolve(&self, id: AssetId) -> Option<Rc<SubGraphAsset>>;
}

/// Resolver that knows no assets
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAssets;

impl AssetResolver for NoAssets {
    fn resolve(&self, _id: AssetId) -> Option<Rc<SubGraphAsset>> {
        None
    }
}

/// In-memory set of loaded sub-graph assets
#[derive(Debug, Clone, Default)]
pub struct SubGraphLibrary {
    assets: IndexMap<AssetId, Rc<SubGraphAsset>>,
}

impl SubGraphLibrary {
    /// Create an empty library
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) an asset
    pub fn insert(&mut self, asset: SubGraphAsset) -> Rc<SubGraphAsset> {
        let asset = Rc::new(asset);
        self.assets.insert(asset.id, Rc::clone(&asset));
        asset
    }

    /// Parse a RON asset and add it
    pub fn insert_ron(&mut self, source: &str) -> Result<Rc<SubGraphAsset>, GraphError> {
        Ok(self.insert(SubGraphAsset::from_ron(source)?))
    }

    /// Remove an asset
    pub fn remove(&mut self, id: AssetId) -> Option<Rc<SubGraphAsset>> {
        self.assets.shift_remove(&id)
    }

    /// Get an asset by id
    pub fn get(&self, id: AssetId) -> Option<&Rc<SubGraphAsset>> {
        self.assets.get(&id)
    }

    /// All loaded assets
    pub fn assets(&self) -> impl Iterator<Item = &Rc<SubGraphAsset>> {
        self.assets.values()
    }

    /// Number of loaded assets
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    /// Whether the library is empty
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

impl AssetResolver for SubGraphLibrary {
    fn resolve(&self, id: AssetId) -> Option<Rc<SubGraphAsset>> {
        self.assets.get(&id).cloned()
    }
}

/// A node's handle to a sub-graph asset.
///
/// Only the id is persisted. The resolved asset is cached on first use and
/// the cache is dropped whenever the reference is reassigned. The cache is a
/// [`OnceCell`], so graphs and assets stay on the thread that compiles them;
/// assets are shared through [`Rc`] for the same reason.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubGraphRef {
    asset: Option<AssetId>,
    #[serde(skip)]
    resolved: OnceCell<Option<Rc<SubGraphAsset>>>,
}

impl SubGraphRef {
    /// Reference an asset (or nothing)
    pub fn new(asset: Option<AssetId>) -> Self {
        Self {
            asset,
            resolved: OnceCell::new(),
        }
    }

    /// The persisted asset id
    pub fn asset_id(&self) -> Option<AssetId> {
        self.asset
    }

    /// Point at another asset. Returns `true` if the id changed.
    pub fn set_asset(&mut self, asset: Option<AssetId>) -> bool {
        if self.asset == asset {
            return false;
        }
        self.asset = asset;
        self.resolved = OnceCell::new();
        true
    }

    /// Drop the cached resolution so the next lookup hits the resolver again
    pub fn invalidate(&mut self) {
        self.resolved = OnceCell::new();
    }

    /// Resolve the asset, caching the answer (including a miss)
    pub fn resolve(&self, resolver: &dyn AssetResolver) -> Option<Rc<SubGraphAsset>> {
        self.resolved
            .get_or_init(|| self.asset.and_then(|id| resolver.resolve(id)))
            .clone()
    }

    /// Whether a resolution is cached
    pub fn is_cached(&self) -> bool {
        self.resolved.get().is_some()
    }
}
