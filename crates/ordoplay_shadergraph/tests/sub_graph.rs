// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end generation through sub-graphs.

use ordoplay_shadergraph::library::create_builtin_registry;
use ordoplay_shadergraph::{
    codegen::sub_graph_function_name, generate_shader, AssetId, CodegenError, ConcreteValueType, Diagnostics, GenerationMode, GraphContext,
    GraphInput, Node, NodeKind, NodeTypeRegistry, PropertyCollector, ShaderGraph, ShaderValue, SlotId,
    SubGraphAsset, SubGraphLibrary, SubGraphRef,
};

fn instantiate(registry: &NodeTypeRegistry, name: &str) -> Node {
    registry.instantiate(registry.handle(name).unwrap()).unwrap()
}

fn sub_graph_node() -> Node {
    Node::new("Tint", NodeKind::SubGraph(SubGraphRef::default()))
}

/// `Out = lerp(Color, 1, normalWS)`
fn tint_asset(registry: &NodeTypeRegistry) -> SubGraphAsset {
    let mut asset = SubGraphAsset::new("Tint");
    let color = asset.add_input(GraphInput::new("Color", ShaderValue::Vector4([1.0, 0.0, 0.0, 1.0])));
    asset.add_output(1, "Out", ConcreteValueType::Vector4);

    let lerp = asset.graph.add_node(instantiate(registry, "Lerp"));
    let normal = asset.graph.add_node(instantiate(registry, "Normal Vector"));
    let output = asset.graph.output_node_id().unwrap();
    asset.graph.connect(color, SlotId(0), lerp, SlotId(0)).unwrap();
    asset.graph.connect(normal, SlotId(0), lerp, SlotId(2)).unwrap();
    asset.graph.connect(lerp, SlotId(3), output, SlotId(1)).unwrap();
    asset
}

#[test]
fn test_generate_through_sub_graph() {
    let registry = create_builtin_registry().unwrap();
    let mut library = SubGraphLibrary::new();
    let asset = library.insert(tint_asset(&registry));

    let mut graph = ShaderGraph::new("Parent");
    let call = graph.add_node(sub_graph_node());
    let mut diagnostics = Diagnostics::new();
    graph.set_sub_graph(call, Some(asset.id), &library, &mut diagnostics).unwrap();
    graph.set_output_node(Some(call));

    let report = graph.validate(&library, &mut diagnostics);
    assert!(report.is_valid());
    assert!(!diagnostics.has_errors());

    let ctx = GraphContext::default();
    let shader = generate_shader(&graph, &ctx, GenerationMode::ForReals, &library).unwrap();

    assert_eq!(shader.functions.len(), 1);
    let function_name = sub_graph_function_name(&asset, &ctx);
    assert!(shader.functions[0].starts_with(&format!("void {function_name}(")));
    assert!(shader.body.contains(&format!("{function_name}(")));
    assert!(shader.body.contains(", IN, "));
    // Body nodes emit dependencies first
    assert_eq!(shader.includes, vec!["Geometry.hlsl", "Math_Basic.hlsl"]);
    // Requirements of the nested graph reach the input struct
    assert!(shader.input_struct.contains("float3 WorldSpaceNormal;"));
    assert!(shader.properties.is_empty());
}

#[test]
fn test_save_load_regenerates_identically() {
    let registry = create_builtin_registry().unwrap();
    let mut library = SubGraphLibrary::new();
    let asset = library.insert(tint_asset(&registry));

    let mut graph = ShaderGraph::new("Parent");
    let call = graph.add_node(sub_graph_node());
    graph
        .set_sub_graph(call, Some(asset.id), &library, &mut Diagnostics::new())
        .unwrap();
    let ctx = GraphContext::default();
    let before = generate_shader(&graph, &ctx, GenerationMode::ForReals, &library).unwrap();

    let mut reloaded_library = SubGraphLibrary::new();
    reloaded_library.insert_ron(&asset.to_ron().unwrap()).unwrap();
    let mut reloaded = ShaderGraph::from_ron(&graph.to_ron().unwrap()).unwrap();
    reloaded.refresh_all_sub_graphs(&reloaded_library, &mut Diagnostics::new());
    let after = generate_shader(&reloaded, &ctx, GenerationMode::ForReals, &reloaded_library).unwrap();

    assert_eq!(before.to_string(), after.to_string());
}

#[test]
fn test_unresolved_reference_is_inert() {
    let mut graph = ShaderGraph::new("Parent");
    let call = graph.add_node(sub_graph_node());
    let library = SubGraphLibrary::new();
    let mut diagnostics = Diagnostics::new();
    graph
        .set_sub_graph(call, Some(AssetId::new()), &library, &mut diagnostics)
        .unwrap();
    assert!(diagnostics.is_empty());
    assert!(graph.node(call).unwrap().slots().is_empty());

    let shader = generate_shader(&graph, &GraphContext::default(), GenerationMode::Preview, &library).unwrap();
    assert!(shader.functions.is_empty());
    assert!(shader.body.is_empty());

    let mut collector = PropertyCollector::new();
    graph.collect_graph_inputs(&mut collector, GenerationMode::Preview, &library);
    assert!(collector.is_empty());
    assert!(graph.validate(&library, &mut diagnostics).is_valid());
}

#[test]
fn test_preview_collects_sub_graph_inputs() {
    let registry = create_builtin_registry().unwrap();
    let mut library = SubGraphLibrary::new();
    let asset = library.insert(tint_asset(&registry));

    let mut graph = ShaderGraph::new("Parent");
    let call = graph.add_node(sub_graph_node());
    graph
        .set_sub_graph(call, Some(asset.id), &library, &mut Diagnostics::new())
        .unwrap();

    let mut collector = PropertyCollector::new();
    graph.collect_graph_inputs(&mut collector, GenerationMode::Preview, &library);
    assert_eq!(collector.len(), 1);
    assert!(collector.get(&asset.inputs[0].reference_name).is_some());

    let preview = graph.preview_properties(&library);
    assert!(preview.iter().any(|p| p.name == asset.inputs[0].reference_name));
}

#[test]
fn test_mutually_recursive_sub_graphs() {
    let mut first = SubGraphAsset::new("First");
    let mut second = SubGraphAsset::new("Second");
    first.graph.set_output_node(None);
    second.graph.set_output_node(None);
    first
        .graph
        .add_node(Node::new("Second", NodeKind::SubGraph(SubGraphRef::new(Some(second.id)))));
    second
        .graph
        .add_node(Node::new("First", NodeKind::SubGraph(SubGraphRef::new(Some(first.id)))));
    let first_id = first.id;

    let mut library = SubGraphLibrary::new();
    library.insert(first);
    library.insert(second);

    let mut graph = ShaderGraph::new("Parent");
    graph.add_node(Node::new("First", NodeKind::SubGraph(SubGraphRef::new(Some(first_id)))));

    let result = generate_shader(&graph, &GraphContext::default(), GenerationMode::ForReals, &library);
    assert!(matches!(result, Err(CodegenError::RecursiveSubGraph(id)) if id == first_id));

    let mut diagnostics = Diagnostics::new();
    let report = graph.validate(&library, &mut diagnostics);
    assert_eq!(report.nodes_with_errors.len(), 1);
    assert!(diagnostics
        .errors()
        .any(|d| d.message == "Sub Graph contains 1 node with errors"));
}

/// `Out = sample(Texture, uv)` with the texture left unconnected
fn sampler_asset(registry: &NodeTypeRegistry) -> (SubGraphAsset, String) {
    let mut asset = SubGraphAsset::new("Sampler");
    asset.add_output(1, "Out", ConcreteValueType::Vector4);
    let sample = asset.graph.add_node(instantiate(registry, "Sample Texture 2D"));
    let output = asset.graph.output_node_id().unwrap();
    asset.graph.connect(sample, SlotId(2), output, SlotId(1)).unwrap();
    let texture = asset.graph.node(sample).unwrap().slot_variable_name(SlotId(0));
    (asset, texture)
}

#[test]
fn test_sub_graph_body_textures_are_declared() {
    let registry = create_builtin_registry().unwrap();
    let (asset, texture) = sampler_asset(&registry);
    let mut library = SubGraphLibrary::new();
    let asset = library.insert(asset);

    let mut graph = ShaderGraph::new("Parent");
    let call = graph.add_node(sub_graph_node());
    graph
        .set_sub_graph(call, Some(asset.id), &library, &mut Diagnostics::new())
        .unwrap();
    graph.set_output_node(Some(call));

    for mode in [GenerationMode::ForReals, GenerationMode::Preview] {
        let shader = generate_shader(&graph, &GraphContext::default(), mode, &library).unwrap();
        assert_eq!(shader.functions.len(), 1);
        assert!(shader.functions[0].contains(&format!("TEXTURE2D_PARAM({texture}, sampler{texture})")));

        let declared = shader.properties.iter().filter(|p| p.reference_name == texture).count();
        assert_eq!(declared, 1, "{mode:?}");
        assert!(shader
            .to_string()
            .contains(&format!("TEXTURE2D({texture}); SAMPLER(sampler{texture});")));
    }
}
