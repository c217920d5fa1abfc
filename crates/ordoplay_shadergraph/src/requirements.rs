// SPDX-License-Identifier: MIT OR Apache-2.0
//! Requirement propagation.
//!
//! Nodes declare which surface inputs (normal, tangent, UVs, time, ...) they
//! need. These queries aggregate the declarations of a node set, descending
//! into referenced sub-graphs. Every query is pure and can be repeated during
//! validation without accumulating state.

use crate::node::{Node, NodeKind};
use crate::port::{Slot, StageCapability};
use crate::subgraph::{AssetId, AssetResolver};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Set of coordinate spaces a computation needs a basis in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct NeededCoordinateSpace(u8);

impl NeededCoordinateSpace {
    /// No space needed
    pub const NONE: Self = Self(0);
    /// Object space
    pub const OBJECT: Self = Self(1 << 0);
    /// View space
    pub const VIEW: Self = Self(1 << 1);
    /// World space
    pub const WORLD: Self = Self(1 << 2);
    /// Tangent space
    pub const TANGENT: Self = Self(1 << 3);

    const NAMED: [(Self, &'static str); 4] = [
        (Self::OBJECT, "Object"),
        (Self::VIEW, "View"),
        (Self::WORLD, "World"),
        (Self::TANGENT, "Tangent"),
    ];

    /// Whether no space is needed
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether every space in `other` is also in `self`
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Names of the contained spaces, in a fixed order
    pub fn space_names(self) -> impl Iterator<Item = &'static str> {
        Self::NAMED
            .into_iter()
            .filter(move |(space, _)| self.contains(*space))
            .map(|(_, name)| name)
    }
}

impl BitOr for NeededCoordinateSpace {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for NeededCoordinateSpace {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Mesh UV channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum UvChannel {
    /// First UV set
    Uv0,
    /// Second UV set
    Uv1,
    /// Third UV set
    Uv2,
    /// Fourth UV set
    Uv3,
}

impl UvChannel {
    /// All channels in order
    pub const ALL: [UvChannel; 4] = [Self::Uv0, Self::Uv1, Self::Uv2, Self::Uv3];

    /// Interpolator field name
    pub fn field_name(self) -> &'static str {
        match self {
            Self::Uv0 => "uv0",
            Self::Uv1 => "uv1",
            Self::Uv2 => "uv2",
            Self::Uv3 => "uv3",
        }
    }
}

/// The closed set of requirement kinds that can be queried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequirementKind {
    /// Surface normal
    Normal,
    /// Surface tangent
    Tangent,
    /// Surface bitangent
    Bitangent,
    /// View direction
    ViewDirection,
    /// Position
    Position,
    /// Screen position
    ScreenPosition,
    /// Time parameters
    Time,
    /// Vertex color
    VertexColor,
    /// A mesh UV channel
    MeshUv(UvChannel),
}

impl RequirementKind {
    /// Coordinate-space kinds, in the order they are aggregated
    pub const SPACES: [RequirementKind; 5] = [
        Self::Normal,
        Self::Tangent,
        Self::Bitangent,
        Self::ViewDirection,
        Self::Position,
    ];

    /// Whether this kind aggregates coordinate spaces (as opposed to a flag)
    pub fn is_coordinate_space(self) -> bool {
        Self::SPACES.contains(&self)
    }

    /// Value contributed by a node that does not declare this kind
    pub fn neutral(self) -> RequirementValue {
        if self.is_coordinate_space() {
            RequirementValue::Space(NeededCoordinateSpace::NONE)
        } else {
            RequirementValue::Flag(false)
        }
    }
}

/// A requirement a node type declares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Requirement {
    /// Needs the normal in the given spaces
    Normal(NeededCoordinateSpace),
    /// Needs the tangent in the given spaces
    Tangent(NeededCoordinateSpace),
    /// Needs the bitangent in the given spaces
    Bitangent(NeededCoordinateSpace),
    /// Needs the view direction in the given spaces
    ViewDirection(NeededCoordinateSpace),
    /// Needs the position in the given spaces
    Position(NeededCoordinateSpace),
    /// Needs the screen position
    ScreenPosition,
    /// Needs time parameters
    Time,
    /// Needs the vertex color
    VertexColor,
    /// Needs a UV channel
    MeshUv(UvChannel),
}

impl Requirement {
    /// Kind this requirement answers
    pub fn kind(self) -> RequirementKind {
        match self {
            Self::Normal(_) => RequirementKind::Normal,
            Self::Tangent(_) => RequirementKind::Tangent,
            Self::Bitangent(_) => RequirementKind::Bitangent,
            Self::ViewDirection(_) => RequirementKind::ViewDirection,
            Self::Position(_) => RequirementKind::Position,
            Self::ScreenPosition => RequirementKind::ScreenPosition,
            Self::Time => RequirementKind::Time,
            Self::VertexColor => RequirementKind::VertexColor,
            Self::MeshUv(channel) => RequirementKind::MeshUv(channel),
        }
    }

    /// Value contributed when this requirement applies
    pub fn value(self) -> RequirementValue {
        match self {
            Self::Normal(space)
            | Self::Tangent(space)
            | Self::Bitangent(space)
            | Self::ViewDirection(space)
            | Self::Position(space) => RequirementValue::Space(space),
            Self::ScreenPosition | Self::Time | Self::VertexColor | Self::MeshUv(_) => {
                RequirementValue::Flag(true)
            }
        }
    }
}

/// A requirement together with the stage it applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeclaredRequirement {
    /// What is required
    pub requirement: Requirement,
    /// Stage(s) in which it is required
    pub stage: StageCapability,
}

impl DeclaredRequirement {
    /// Whether this declaration answers a query for `kind` in `stage`
    pub fn applies_to(&self, kind: RequirementKind, stage: StageCapability) -> bool {
        self.requirement.kind() == kind && self.stage.is_compatible_with(stage)
    }
}

/// Result of a requirement query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequirementValue {
    /// Aggregated coordinate spaces
    Space(NeededCoordinateSpace),
    /// Whether any node requires the flag
    Flag(bool),
}

impl RequirementValue {
    /// Combine two values of the same kind (bitwise OR / logical OR)
    pub fn combine(self, other: Self) -> Self {
        match (self, other) {
            (Self::Space(a), Self::Space(b)) => Self::Space(a | b),
            (Self::Flag(a), Self::Flag(b)) => Self::Flag(a || b),
            // Kinds never mix within one query; keep the accumulated value
            (lhs, _) => lhs,
        }
    }

    /// The coordinate spaces, `NONE` for flags
    pub fn space(self) -> NeededCoordinateSpace {
        match self {
            Self::Space(space) => space,
            Self::Flag(_) => NeededCoordinateSpace::NONE,
        }
    }

    /// Whether anything is required
    pub fn is_required(self) -> bool {
        match self {
            Self::Space(space) => !space.is_empty(),
            Self::Flag(flag) => flag,
        }
    }
}

/// Aggregate `kind` over `nodes` for `stage`.
///
/// Coordinate-space kinds OR together the spaces of every contributing node;
/// flag kinds are true if any node reports true. Sub-graph call nodes
/// contribute the aggregate of the referenced graph's active nodes, and
/// unresolved references contribute the neutral value.
pub fn compute_requirements<'a>(
    nodes: impl IntoIterator<Item = &'a Node>,
    kind: RequirementKind,
    stage: StageCapability,
    resolver: &dyn AssetResolver,
) -> RequirementValue {
    aggregate(nodes, kind, stage, resolver, &mut Vec::new())
}

fn aggregate<'a>(
    nodes: impl IntoIterator<Item = &'a Node>,
    kind: RequirementKind,
    stage: StageCapability,
    resolver: &dyn AssetResolver,
    visiting: &mut Vec<AssetId>,
) -> RequirementValue {
    let mut value = kind.neutral();
    for node in nodes {
        value = value.combine(node_requirement(node, kind, stage, resolver, visiting));
        if value == RequirementValue::Flag(true) {
            break;
        }
    }
    value
}

fn node_requirement(
    node: &Node,
    kind: RequirementKind,
    stage: StageCapability,
    resolver: &dyn AssetResolver,
    visiting: &mut Vec<AssetId>,
) -> RequirementValue {
    let NodeKind::SubGraph(reference) = &node.kind else {
        return node
            .requirements
            .iter()
            .filter(|declared| declared.applies_to(kind, stage))
            .fold(kind.neutral(), |acc, declared| acc.combine(declared.requirement.value()));
    };

    let Some(asset) = reference.resolve(resolver) else {
        return kind.neutral();
    };
    if visiting.contains(&asset.id) {
        tracing::warn!("Sub-graph '{}' references itself; ignoring its requirements", asset.name);
        return kind.neutral();
    }

    visiting.push(asset.id);
    let value = aggregate(asset.graph.active_nodes(), kind, stage, resolver, visiting);
    visiting.pop();
    value
}

/// First non-`All` stage in scan order, or `All` when there is none
pub fn first_restricted_stage(stages: impl IntoIterator<Item = StageCapability>) -> StageCapability {
    stages
        .into_iter()
        .find(|stage| *stage != StageCapability::All)
        .unwrap_or(StageCapability::All)
}

/// First pair of disagreeing non-`All` stages, if any.
///
/// [`first_restricted_stage`] keeps whichever restricted stage it meets
/// first; this lets validation report the stages it silently overrules.
pub fn conflicting_stages(
    stages: impl IntoIterator<Item = StageCapability>,
) -> Option<(StageCapability, StageCapability)> {
    let mut restricted = stages.into_iter().filter(|stage| *stage != StageCapability::All);
    let first = restricted.next()?;
    restricted.find(|stage| *stage != first).map(|other| (first, other))
}

/// Effective stage of a set of slots: the first non-`All` capability in scan
/// order, or `All` when every slot accepts any stage.
pub fn effective_stage<'a>(slots: impl IntoIterator<Item = &'a Slot>) -> StageCapability {
    first_restricted_stage(slots.into_iter().map(|slot| slot.stage_capability))
}

/// Effective stage across every slot of every node
pub fn nodes_effective_stage<'a>(nodes: impl IntoIterator<Item = &'a Node>) -> StageCapability {
    effective_stage(nodes.into_iter().flat_map(|node| node.slots()))
}

/// Disagreeing restricted stages among `slots`, see [`conflicting_stages`]
pub fn stage_conflict<'a>(
    slots: impl IntoIterator<Item = &'a Slot>,
) -> Option<(StageCapability, StageCapability)> {
    conflicting_stages(slots.into_iter().map(|slot| slot.stage_capability))
}

/// Every requirement of a node set, gathered in one pass per kind
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShaderGraphRequirements {
    /// Normal spaces
    pub normal: NeededCoordinateSpace,
    /// Tangent spaces
    pub tangent: NeededCoordinateSpace,
    /// Bitangent spaces
    pub bitangent: NeededCoordinateSpace,
    /// View direction spaces
    pub view_direction: NeededCoordinateSpace,
    /// Position spaces
    pub position: NeededCoordinateSpace,
    /// Screen position needed
    pub screen_position: bool,
    /// Time needed
    pub time: bool,
    /// Vertex color needed
    pub vertex_color: bool,
    /// UV channels needed, in channel order
    pub mesh_uvs: Vec<UvChannel>,
}

impl ShaderGraphRequirements {
    /// Gather every requirement kind over `nodes` for `stage`
    pub fn from_nodes(nodes: &[&Node], stage: StageCapability, resolver: &dyn AssetResolver) -> Self {
        let query = |kind| compute_requirements(nodes.iter().copied(), kind, stage, resolver);
        Self {
            normal: query(RequirementKind::Normal).space(),
            tangent: query(RequirementKind::Tangent).space(),
            bitangent: query(RequirementKind::Bitangent).space(),
            view_direction: query(RequirementKind::ViewDirection).space(),
            position: query(RequirementKind::Position).space(),
            screen_position: query(RequirementKind::ScreenPosition).is_required(),
            time: query(RequirementKind::Time).is_required(),
            vertex_color: query(RequirementKind::VertexColor).is_required(),
            mesh_uvs: UvChannel::ALL
                .into_iter()
                .filter(|channel| query(RequirementKind::MeshUv(*channel)).is_required())
                .collect(),
        }
    }

    /// Fields of the surface input struct these requirements call for
    pub fn input_fields(&self) -> Vec<String> {
        let mut fields = Vec::new();
        let spaces = [
            (self.normal, "Normal"),
            (self.tangent, "Tangent"),
            (self.bitangent, "BiTangent"),
            (self.view_direction, "ViewDirection"),
            (self.position, "Position"),
        ];
        for (needed, suffix) in spaces {
            fields.extend(needed.space_names().map(|space| format!("float3 {space}Space{suffix};")));
        }
        if self.screen_position {
            fields.push("float4 ScreenPosition;".to_string());
        }
        fields.extend(self.mesh_uvs.iter().map(|uv| format!("float4 {};", uv.field_name())));
        if self.vertex_color {
            fields.push("float4 VertexColor;".to_string());
        }
        if self.time {
            fields.push("float3 TimeParameters;".to_string());
        }
        fields
    }
}

impl fmt::Display for NeededCoordinateSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("None");
        }
        let names: Vec<_> = self.space_names().collect();
        f.write_str(&names.join(" | "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::NodeTypeDescriptor;
    use crate::port::{ConcreteValueType, SlotId};
    use crate::subgraph::NoAssets;

    fn node_requiring(requirements: &[(Requirement, StageCapability)]) -> Node {
        let descriptor = requirements.iter().fold(
            NodeTypeDescriptor::new("Input", "Requirer").with_output(0, "Out", ConcreteValueType::Vector3),
            |d, (r, s)| d.with_stage_requirement(*r, *s),
        );
        Node::from_descriptor(&descriptor)
    }

    #[test]
    fn test_space_aggregation_is_or() {
        let a = node_requiring(&[(Requirement::Normal(NeededCoordinateSpace::WORLD), StageCapability::All)]);
        let b = node_requiring(&[(Requirement::Normal(NeededCoordinateSpace::TANGENT), StageCapability::All)]);
        let c = node_requiring(&[]);

        let value = compute_requirements([&a, &b, &c], RequirementKind::Normal, StageCapability::Fragment, &NoAssets);
        assert_eq!(
            value,
            RequirementValue::Space(NeededCoordinateSpace::WORLD | NeededCoordinateSpace::TANGENT)
        );
    }

    #[test]
    fn test_aggregation_commutative() {
        let nodes = [
            node_requiring(&[(Requirement::Position(NeededCoordinateSpace::OBJECT), StageCapability::All)]),
            node_requiring(&[(Requirement::Position(NeededCoordinateSpace::VIEW), StageCapability::Vertex)]),
            node_requiring(&[(Requirement::Position(NeededCoordinateSpace::WORLD), StageCapability::All)]),
        ];
        let forward = compute_requirements(nodes.iter(), RequirementKind::Position, StageCapability::All, &NoAssets);
        let backward = compute_requirements(nodes.iter().rev(), RequirementKind::Position, StageCapability::All, &NoAssets);
        let shuffled = compute_requirements(
            [&nodes[1], &nodes[2], &nodes[0]],
            RequirementKind::Position,
            StageCapability::All,
            &NoAssets,
        );
        assert_eq!(forward, backward);
        assert_eq!(forward, shuffled);
    }

    #[test]
    fn test_stage_filtering() {
        let vertex_only = node_requiring(&[(Requirement::Time, StageCapability::Vertex)]);
        let nodes = [&vertex_only];
        assert_eq!(
            compute_requirements(nodes, RequirementKind::Time, StageCapability::Fragment, &NoAssets),
            RequirementValue::Flag(false)
        );
        assert_eq!(
            compute_requirements(nodes, RequirementKind::Time, StageCapability::Vertex, &NoAssets),
            RequirementValue::Flag(true)
        );
    }

    #[test]
    fn test_absent_kind_is_neutral() {
        let node = node_requiring(&[(Requirement::VertexColor, StageCapability::All)]);
        assert_eq!(
            compute_requirements([&node], RequirementKind::Tangent, StageCapability::All, &NoAssets),
            RequirementValue::Space(NeededCoordinateSpace::NONE)
        );
        assert_eq!(
            compute_requirements([&node], RequirementKind::MeshUv(UvChannel::Uv1), StageCapability::All, &NoAssets),
            RequirementValue::Flag(false)
        );
    }

    #[test]
    fn test_effective_stage_first_match() {
        let slots = [
            Slot::output(SlotId(0), "A", ConcreteValueType::Vector1),
            Slot::output(SlotId(1), "B", ConcreteValueType::Vector1).with_stage(StageCapability::Fragment),
            Slot::output(SlotId(2), "C", ConcreteValueType::Vector1).with_stage(StageCapability::Vertex),
        ];
        assert_eq!(effective_stage(&slots), StageCapability::Fragment);
        assert_eq!(
            stage_conflict(&slots),
            Some((StageCapability::Fragment, StageCapability::Vertex))
        );
        assert_eq!(effective_stage(&slots[..1]), StageCapability::All);
        assert_eq!(stage_conflict(&slots[..2]), None);
    }

    #[test]
    fn test_graph_requirements_and_fields() {
        let a = node_requiring(&[
            (Requirement::Normal(NeededCoordinateSpace::WORLD), StageCapability::All),
            (Requirement::MeshUv(UvChannel::Uv0), StageCapability::All),
        ]);
        let b = node_requiring(&[(Requirement::Time, StageCapability::All)]);

        let requirements = ShaderGraphRequirements::from_nodes(&[&a, &b], StageCapability::Fragment, &NoAssets);
        assert_eq!(requirements.normal, NeededCoordinateSpace::WORLD);
        assert!(requirements.time);
        assert!(!requirements.screen_position);
        assert_eq!(requirements.mesh_uvs, vec![UvChannel::Uv0]);
        assert_eq!(
            requirements.input_fields(),
            vec!["float3 WorldSpaceNormal;", "float4 uv0;", "float3 TimeParameters;"]
        );
    }
}
