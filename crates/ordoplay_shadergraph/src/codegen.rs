// SPDX-License-Identifier: MIT OR Apache-2.0
//! HLSL code generation.
//!
//! Function nodes become calls to library functions; sub-graph nodes become
//! calls to functions generated from the referenced asset. Generated and
//! library functions are registered once per name in a [`FunctionRegistry`].

use crate::collector::{GenerationMode, PropertyCollector, ShaderProperty};
use crate::definition::DefinitionError;
use crate::graph::ShaderGraph;
use crate::node::{Node, NodeKind};
use crate::port::{Precision, Slot, StageCapability};
use crate::requirements::ShaderGraphRequirements;
use crate::subgraph::{AssetId, AssetResolver, GraphInput, SubGraphAsset};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Turn an arbitrary name into a valid HLSL identifier
pub fn hlsl_safe_name(name: &str) -> String {
    let mut safe: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if safe.is_empty() || safe.starts_with(|c: char| c.is_ascii_digit()) {
        safe.insert(0, '_');
    }
    safe
}

/// Settings shared by every function generated for one shader
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphContext {
    /// Name of the surface input struct passed as `IN`
    pub graph_input_struct_name: String,
    /// Floating point precision
    pub precision: Precision,
}

impl Default for GraphContext {
    fn default() -> Self {
        Self {
            graph_input_struct_name: "SurfaceDescriptionInputs".to_string(),
            precision: Precision::Float,
        }
    }
}

/// Indented line buffer
#[derive(Debug, Clone, Default)]
pub struct ShaderGenerator {
    lines: Vec<String>,
    indent: usize,
}

impl ShaderGenerator {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a line at the current indentation
    pub fn add_line(&mut self, line: impl AsRef<str>) {
        self.lines.push(format!("{}{}", "    ".repeat(self.indent), line.as_ref()));
    }

    /// Increase indentation
    pub fn indent(&mut self) {
        self.indent += 1;
    }

    /// Decrease indentation
    pub fn deindent(&mut self) {
        self.indent = self.indent.saturating_sub(1);
    }

    /// Whether nothing was written
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Written lines
    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

impl fmt::Display for ShaderGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

/// Functions and includes needed by generated code, each registered once
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    functions: IndexMap<String, String>,
    includes: IndexSet<String>,
}

impl FunctionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function unless one with this name exists.
    ///
    /// `build` only runs for the first registration. Returns whether it ran.
    pub fn provide_function(&mut self, name: &str, build: impl FnOnce(&mut ShaderGenerator)) -> bool {
        if self.functions.contains_key(name) {
            return false;
        }
        let mut generator = ShaderGenerator::new();
        build(&mut generator);
        tracing::debug!("Registered function {name}");
        self.functions.insert(name.to_string(), generator.to_string());
        true
    }

    /// Record an HLSL file the generated code depends on
    pub fn provide_include(&mut self, path: &str) -> bool {
        self.includes.insert(path.to_string())
    }

    /// Whether a function is registered
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Registered functions as (name, source), in registration order
    pub fn functions(&self) -> impl Iterator<Item = (&str, &str)> {
        self.functions.iter().map(|(name, body)| (name.as_str(), body.as_str()))
    }

    /// Recorded includes, in registration order
    pub fn includes(&self) -> impl Iterator<Item = &str> {
        self.includes.iter().map(String::as_str)
    }

    /// Number of registered functions
    pub fn function_count(&self) -> usize {
        self.functions.len()
    }
}

/// Code emitted for one node
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CallStatement {
    /// Local declarations preceding the call
    pub declarations: Vec<String>,
    /// The call itself
    pub call: String,
}

impl CallStatement {
    /// Write declarations and call
    pub fn write_to(&self, generator: &mut ShaderGenerator) {
        for declaration in &self.declarations {
            generator.add_line(declaration);
        }
        generator.add_line(&self.call);
    }
}

/// The graph being emitted, plus the inputs of the enclosing sub-graph
#[derive(Debug, Clone, Copy)]
pub struct EmitScope<'a> {
    /// Graph whose nodes are emitted
    pub graph: &'a ShaderGraph,
    /// Inputs readable through property nodes
    pub inputs: &'a [GraphInput],
}

impl<'a> EmitScope<'a> {
    /// Scope of a top-level graph
    pub fn new(graph: &'a ShaderGraph) -> Self {
        Self { graph, inputs: &[] }
    }

    /// Scope of a sub-graph body
    pub fn sub_graph(asset: &'a SubGraphAsset) -> Self {
        Self {
            graph: &asset.graph,
            inputs: &asset.inputs,
        }
    }

    /// Variable carrying the value that reaches an input slot.
    ///
    /// Edges read the upstream variable (or the sub-graph input a property
    /// node stands for); unconnected slots read their own variable.
    fn incoming_variable(&self, node: &Node, slot: &Slot) -> String {
        let Some(connection) = self.graph.connection_to(node.id, slot.id) else {
            return slot_variable(node, slot);
        };
        let Some(source) = self.graph.node(connection.from_node) else {
            return slot_variable(node, slot);
        };
        if let NodeKind::Property(property) = &source.kind {
            if let Some(input) = self.inputs.iter().find(|i| i.id == *property) {
                return input.reference_name.clone();
            }
        }
        source.slot_variable_name(connection.from_slot)
    }

    /// Argument passing an input slot, one per slot
    fn input_argument(&self, node: &Node, slot: &Slot) -> String {
        let variable = self.incoming_variable(node, slot);
        match slot.value_type.texture_param_macro() {
            Some(param) => format!("{param}({variable}, sampler{variable})"),
            None => variable,
        }
    }

    /// Constant declaration for an unconnected input in final generation
    fn local_constant(&self, node: &Node, slot: &Slot, ctx: &GraphContext, mode: GenerationMode) -> Option<String> {
        if mode.is_preview() || self.graph.connection_to(node.id, slot.id).is_some() {
            return None;
        }
        let literal = slot.value.to_hlsl(ctx.precision)?;
        Some(format!(
            "{} {} = {literal};",
            slot.value_type.shader_type(ctx.precision),
            slot_variable(node, slot)
        ))
    }
}

fn slot_variable(node: &Node, slot: &Slot) -> String {
    format!(
        "_{}_{}_{}",
        node.variable_name(),
        hlsl_safe_name(&slot.shader_output_name),
        slot.id
    )
}

fn output_declaration(node: &Node, slot: &Slot, precision: Precision) -> String {
    format!("{} {};", slot.value_type.shader_type(precision), slot_variable(node, slot))
}

/// Name of the function generated for a sub-graph in a context
pub fn sub_graph_function_name(asset: &SubGraphAsset, ctx: &GraphContext) -> String {
    format!(
        "sg_{}_{}_{}",
        hlsl_safe_name(&asset.name),
        ctx.graph_input_struct_name,
        asset.id
    )
}

/// Emit the call for a function node and record its include
pub fn emit_function_call(
    node: &Node,
    scope: &EmitScope<'_>,
    ctx: &GraphContext,
    mode: GenerationMode,
    registry: &mut FunctionRegistry,
) -> Result<CallStatement, CodegenError> {
    let function = node
        .function
        .as_ref()
        .ok_or_else(|| DefinitionError::MissingBinding { node: node.name.clone() })?;
    registry.provide_include(function.source.path());

    let mut statement = CallStatement::default();
    let mut arguments = Vec::new();
    for id in function.arguments.iter().chain(function.return_value.iter()) {
        let Some(slot) = node.slot(*id) else {
            continue;
        };
        if slot.is_input() {
            statement.declarations.extend(scope.local_constant(node, slot, ctx, mode));
            arguments.push(scope.input_argument(node, slot));
        } else {
            arguments.push(slot_variable(node, slot));
        }
    }
    statement.declarations.extend(
        node.output_slots()
            .map(|slot| output_declaration(node, slot, ctx.precision)),
    );

    statement.call = format!(
        "{}_{}({});",
        function.name,
        ctx.precision.keyword(),
        arguments.join(", ")
    );
    Ok(statement)
}

/// Emit the call for a sub-graph node.
///
/// Returns `None` when the reference does not resolve.
pub fn emit_sub_graph_call(
    node: &Node,
    scope: &EmitScope<'_>,
    ctx: &GraphContext,
    mode: GenerationMode,
    resolver: &dyn AssetResolver,
) -> Option<CallStatement> {
    let asset = node.sub_graph()?.resolve(resolver)?;

    let mut statement = CallStatement::default();
    let mut arguments = Vec::new();
    for input in &asset.inputs {
        let slot = node.slot(input.slot_id()).cloned().unwrap_or_else(|| {
            tracing::warn!("Node '{}' has no slot for input '{}'", node.name, input.display_name);
            Slot::input(input.slot_id(), input.display_name.clone(), input.value.clone())
                .with_shader_output_name(input.reference_name.clone())
        });
        statement.declarations.extend(scope.local_constant(node, &slot, ctx, mode));
        arguments.push(scope.input_argument(node, &slot));
    }

    arguments.push("IN".to_string());
    for output in asset.outputs() {
        let slot = node.slot(output.id).unwrap_or(output);
        statement.declarations.push(output_declaration(node, slot, ctx.precision));
        arguments.push(slot_variable(node, slot));
    }

    statement.call = format!("{}({});", sub_graph_function_name(&asset, ctx), arguments.join(", "));
    Some(statement)
}

/// Register the function a sub-graph node calls, nested sub-graphs first.
///
/// Unresolved references register nothing.
pub fn generate_node_function(
    node: &Node,
    ctx: &GraphContext,
    registry: &mut FunctionRegistry,
    resolver: &dyn AssetResolver,
) -> Result<(), CodegenError> {
    let Some(asset) = node.sub_graph().and_then(|r| r.resolve(resolver)) else {
        return Ok(());
    };
    generate_sub_graph_function(&asset, ctx, registry, resolver, &mut Vec::new())
}

fn generate_sub_graph_function(
    asset: &SubGraphAsset,
    ctx: &GraphContext,
    registry: &mut FunctionRegistry,
    resolver: &dyn AssetResolver,
    visiting: &mut Vec<AssetId>,
) -> Result<(), CodegenError> {
    if visiting.contains(&asset.id) {
        return Err(CodegenError::RecursiveSubGraph(asset.id));
    }
    let name = sub_graph_function_name(asset, ctx);
    if registry.contains(&name) {
        return Ok(());
    }

    visiting.push(asset.id);
    let result = write_sub_graph_function(asset, &name, ctx, registry, resolver, visiting);
    visiting.pop();
    result
}

fn write_sub_graph_function(
    asset: &SubGraphAsset,
    name: &str,
    ctx: &GraphContext,
    registry: &mut FunctionRegistry,
    resolver: &dyn AssetResolver,
    visiting: &mut Vec<AssetId>,
) -> Result<(), CodegenError> {
    let scope = EmitScope::sub_graph(asset);
    let active = asset.graph.active_nodes();

    for node in &active {
        if let Some(nested) = node.sub_graph().and_then(|r| r.resolve(resolver)) {
            generate_sub_graph_function(&nested, ctx, registry, resolver, visiting)?;
        }
    }

    // Sub-graph bodies are always final code
    let mut body = ShaderGenerator::new();
    for node in &active {
        if let Some(statement) = emit_body_node(node, &scope, ctx, GenerationMode::ForReals, registry, resolver)? {
            statement.write_to(&mut body);
        }
    }

    let mut parameters: Vec<String> = asset
        .inputs
        .iter()
        .map(|input| {
            let reference = &input.reference_name;
            match input.value_type().texture_args_macro() {
                Some(args) => format!("{args}({reference}, sampler{reference})"),
                None => format!("{} {reference}", input.value_type().shader_type(ctx.precision)),
            }
        })
        .collect();
    parameters.push(format!("{} IN", ctx.graph_input_struct_name));

    let mut assignments = Vec::new();
    if let Some(output_node) = asset.output_node() {
        for slot in output_node.input_slots() {
            let out_name = format!("{}_{}", hlsl_safe_name(&slot.shader_output_name), slot.id);
            parameters.push(format!("out {} {out_name}", slot.value_type.shader_type(ctx.precision)));
            if let Some(value) = output_value(&scope, output_node, slot, ctx) {
                assignments.push(format!("{out_name} = {value};"));
            }
        }
    }

    registry.provide_function(name, |s| {
        s.add_line(format!("void {name}({})", parameters.join(", ")));
        s.add_line("{");
        s.indent();
        for line in body.lines() {
            s.add_line(line);
        }
        for assignment in &assignments {
            s.add_line(assignment);
        }
        s.deindent();
        s.add_line("}");
    });
    Ok(())
}

/// Value assigned to a sub-graph output
fn output_value(scope: &EmitScope<'_>, output_node: &Node, slot: &Slot, ctx: &GraphContext) -> Option<String> {
    if scope.graph.connection_to(output_node.id, slot.id).is_some() {
        return Some(scope.incoming_variable(output_node, slot));
    }
    slot.value.to_hlsl(ctx.precision)
}

fn emit_body_node(
    node: &Node,
    scope: &EmitScope<'_>,
    ctx: &GraphContext,
    mode: GenerationMode,
    registry: &mut FunctionRegistry,
    resolver: &dyn AssetResolver,
) -> Result<Option<CallStatement>, CodegenError> {
    match &node.kind {
        NodeKind::Function => emit_function_call(node, scope, ctx, mode, registry).map(Some),
        NodeKind::SubGraph(_) => Ok(emit_sub_graph_call(node, scope, ctx, mode, resolver)),
        NodeKind::Property(_) | NodeKind::SubGraphOutput => Ok(None),
    }
}

/// Emit the code for one node of a top-level graph, registering whatever
/// functions it needs
pub fn emit_node(
    node: &Node,
    scope: &EmitScope<'_>,
    ctx: &GraphContext,
    mode: GenerationMode,
    registry: &mut FunctionRegistry,
    resolver: &dyn AssetResolver,
) -> Result<Option<CallStatement>, CodegenError> {
    if matches!(node.kind, NodeKind::SubGraph(_)) {
        generate_node_function(node, ctx, registry, resolver)?;
    }
    emit_body_node(node, scope, ctx, mode, registry, resolver)
}

/// Complete output of a generation pass
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GeneratedShader {
    /// HLSL files to include
    pub includes: Vec<String>,
    /// Surface input struct declaration
    pub input_struct: String,
    /// Generated functions, callees first
    pub functions: Vec<String>,
    /// Body statements for the graph's active nodes
    pub body: String,
    /// Properties the code reads
    pub properties: Vec<ShaderProperty>,
    /// Precision the code was generated with
    pub precision: Precision,
}

impl fmt::Display for GeneratedShader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for property in &self.properties {
            writeln!(f, "{}", property.declaration(self.precision))?;
        }
        if !self.properties.is_empty() {
            writeln!(f)?;
        }
        for include in &self.includes {
            writeln!(f, "#include \"{include}\"")?;
        }
        if !self.includes.is_empty() {
            writeln!(f)?;
        }
        writeln!(f, "{}", self.input_struct)?;
        for function in &self.functions {
            writeln!(f)?;
            write!(f, "{function}")?;
        }
        writeln!(f)?;
        write!(f, "{}", self.body)
    }
}

fn input_struct(requirements: &ShaderGraphRequirements, ctx: &GraphContext) -> String {
    let mut generator = ShaderGenerator::new();
    generator.add_line(format!("struct {}", ctx.graph_input_struct_name));
    generator.add_line("{");
    generator.indent();
    for field in requirements.input_fields() {
        generator.add_line(field);
    }
    generator.deindent();
    generator.add_line("};");
    generator.to_string()
}

/// Generate the code for a whole graph
pub fn generate_shader(
    graph: &ShaderGraph,
    ctx: &GraphContext,
    mode: GenerationMode,
    resolver: &dyn AssetResolver,
) -> Result<GeneratedShader, CodegenError> {
    let mut registry = FunctionRegistry::new();
    let scope = EmitScope::new(graph);
    let active = graph.active_nodes();

    let mut body = ShaderGenerator::new();
    for node in &active {
        if let Some(statement) = emit_node(node, &scope, ctx, mode, &mut registry, resolver)? {
            statement.write_to(&mut body);
        }
    }

    let mut collector = PropertyCollector::new();
    graph.collect_shader_properties(&mut collector, mode, resolver);
    if mode.is_preview() {
        graph.collect_graph_inputs(&mut collector, mode, resolver);
    }

    let requirements = ShaderGraphRequirements::from_nodes(&active, StageCapability::Fragment, resolver);
    tracing::debug!(
        "Generated {} function(s) for graph '{}'",
        registry.function_count(),
        graph.name
    );

    Ok(GeneratedShader {
        includes: registry.includes().map(str::to_string).collect(),
        input_struct: input_struct(&requirements, ctx),
        functions: registry.functions().map(|(_, source)| source.to_string()).collect(),
        body: body.to_string(),
        properties: collector.into_properties(),
        precision: ctx.precision,
    })
}

/// Error during code generation
#[derive(Debug, thiserror::Error)]
pub enum CodegenError {
    /// A node cannot be emitted
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    /// A sub-graph calls itself, directly or through other sub-graphs
    #[error("Sub-graph {0} references itself")]
    RecursiveSubGraph(AssetId),
}
