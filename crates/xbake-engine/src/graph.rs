//! Derived-channel shading graphs.
//!
//! The renderer cannot bake curvature, world-space normals or object
//! position directly. Each of them is synthesized by a small shading graph
//! whose output color is written verbatim by a flat diffuse-color pass.
//!
//! Graph shapes are fixed per channel. The two vector channels are
//! parametrized by an [`AxisAssignment`]; the per-axis choice is a data
//! lookup, not a branch per axis pair:
//!
//! ```text
//! Geometry ─▶ SeparateXyz ─┬─▶ [OneMinus if −axis] ─▶ [MapRange −1..1 → 0..1] ─▶ R (right)
//!                          ├─▶ ...                                           ─▶ G (forward)
//!                          └─▶ ...                                           ─▶ B (up)
//!                                                         CombineXyz ─▶ ShaderlessOutput
//! ```
//!
//! Nodes are stored in creation order and may only link to earlier nodes,
//! so the node list is always a valid evaluation order.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use xbake_spec::{AxisAssignment, DerivedChannel, SignedAxis};

/// Half-width padding of the curvature input window.
pub const CURVATURE_EPSILON: f64 = 0.001;

/// Per-pixel surface attribute read by a geometry node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryAttribute {
    /// Local convexity, scalar around 0.5.
    Pointiness,
    /// Unit surface normal.
    Normal,
    /// Surface position.
    Position,
}

/// Reference to one output socket of an earlier node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Link {
    pub node: usize,
    #[serde(default)]
    pub output: usize,
}

/// A graph node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    /// Reads a surface attribute. Output 0 is the attribute.
    Geometry { attribute: GeometryAttribute },
    /// Splits a vector. Outputs 0, 1, 2 are X, Y, Z.
    SeparateXyz { input: Link },
    /// `1 − input`.
    OneMinus { input: Link },
    /// Linear remap of `[from_min, from_max]` onto `[to_min, to_max]`.
    MapRange {
        input: Link,
        from_min: f64,
        from_max: f64,
        to_min: f64,
        to_max: f64,
        clamp: bool,
    },
    /// Builds a vector from three scalars.
    CombineXyz { x: Link, y: Link, z: Link },
    /// Writes a color unshaded. Must be the last node.
    ShaderlessOutput { color: Link },
}

impl NodeKind {
    fn inputs(&self) -> Vec<Link> {
        match self {
            NodeKind::Geometry { .. } => Vec::new(),
            NodeKind::SeparateXyz { input }
            | NodeKind::OneMinus { input }
            | NodeKind::MapRange { input, .. } => vec![*input],
            NodeKind::CombineXyz { x, y, z } => vec![*x, *y, *z],
            NodeKind::ShaderlessOutput { color } => vec![*color],
        }
    }

    fn output_count(&self) -> usize {
        match self {
            NodeKind::SeparateXyz { .. } => 3,
            NodeKind::ShaderlessOutput { .. } => 0,
            _ => 1,
        }
    }
}

/// Structural problems in a graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("node {node} links to node {target}, which is not an earlier node")]
    ForwardLink { node: usize, target: usize },

    #[error("node {node} links to output {output} of node {target}, which has {available}")]
    MissingOutput {
        node: usize,
        target: usize,
        output: usize,
        available: usize,
    },

    #[error("graph must end in exactly one shaderless output node")]
    MissingOutputNode,
}

/// Per-pixel inputs for CPU evaluation of a graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometrySample {
    pub pointiness: f64,
    pub normal: [f64; 3],
    pub position: [f64; 3],
}

impl Default for GeometrySample {
    fn default() -> Self {
        Self {
            pointiness: 0.5,
            normal: [0.0, 0.0, 1.0],
            position: [0.0; 3],
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Value {
    Scalar(f64),
    Vector([f64; 3]),
}

impl Value {
    fn output(&self, index: usize) -> f64 {
        match self {
            Value::Scalar(v) => *v,
            Value::Vector(v) => v[index.min(2)],
        }
    }

    fn vector(&self) -> [f64; 3] {
        match self {
            Value::Scalar(v) => [*v; 3],
            Value::Vector(v) => *v,
        }
    }
}

/// A temporary shading graph for one derived channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedChannelGraph {
    pub channel: DerivedChannel,
    pub nodes: Vec<NodeKind>,
}

impl DerivedChannelGraph {
    /// Curvature: pointiness remapped by contrast, broadcast to RGB.
    pub fn curvature(contrast: f64) -> Self {
        let (from_min, from_max) = curvature_window(contrast);
        let mut b = GraphBuilder::new();
        let geometry = b.add(NodeKind::Geometry {
            attribute: GeometryAttribute::Pointiness,
        });
        let remapped = b.add(NodeKind::MapRange {
            input: geometry,
            from_min,
            from_max,
            to_min: 0.0,
            to_max: 1.0,
            clamp: true,
        });
        let rgb = b.add(NodeKind::CombineXyz {
            x: remapped,
            y: remapped,
            z: remapped,
        });
        b.finish(DerivedChannel::Curvature, rgb)
    }

    /// World-space normal: sign-corrected components remapped from
    /// `[−1, 1]` to `[0, 1]`, in right/forward/up channel order.
    pub fn world_space_normal(axes: &AxisAssignment) -> Self {
        vector_graph(
            DerivedChannel::WorldSpaceNormal,
            GeometryAttribute::Normal,
            axes,
            true,
        )
    }

    /// Position: sign-corrected components of the unit-cube position, in
    /// right/forward/up channel order. No remap.
    pub fn position(axes: &AxisAssignment) -> Self {
        vector_graph(
            DerivedChannel::Position,
            GeometryAttribute::Position,
            axes,
            false,
        )
    }

    /// Builds the graph for a channel.
    pub fn for_channel(channel: DerivedChannel, contrast: f64, axes: &AxisAssignment) -> Self {
        match channel {
            DerivedChannel::Curvature => Self::curvature(contrast),
            DerivedChannel::WorldSpaceNormal => Self::world_space_normal(axes),
            DerivedChannel::Position => Self::position(axes),
        }
    }

    /// Checks that every link points to an existing output of an earlier
    /// node and that the graph ends in its only output node.
    pub fn validate(&self) -> Result<(), GraphError> {
        for (index, node) in self.nodes.iter().enumerate() {
            for link in node.inputs() {
                if link.node >= index {
                    return Err(GraphError::ForwardLink {
                        node: index,
                        target: link.node,
                    });
                }
                let available = self.nodes[link.node].output_count();
                if link.output >= available {
                    return Err(GraphError::MissingOutput {
                        node: index,
                        target: link.node,
                        output: link.output,
                        available,
                    });
                }
            }
        }

        let outputs = self
            .nodes
            .iter()
            .filter(|n| matches!(n, NodeKind::ShaderlessOutput { .. }))
            .count();
        match self.nodes.last() {
            Some(NodeKind::ShaderlessOutput { .. }) if outputs == 1 => Ok(()),
            _ => Err(GraphError::MissingOutputNode),
        }
    }

    /// Evaluates the graph for one pixel, returning the output RGB.
    pub fn evaluate(&self, sample: &GeometrySample) -> Result<[f64; 3], GraphError> {
        self.validate()?;

        let mut values: Vec<Value> = Vec::with_capacity(self.nodes.len());
        let mut color = [0.0; 3];
        for node in &self.nodes {
            let get = |link: &Link| values[link.node].output(link.output);
            let value = match node {
                NodeKind::Geometry { attribute } => match attribute {
                    GeometryAttribute::Pointiness => Value::Scalar(sample.pointiness),
                    GeometryAttribute::Normal => Value::Vector(sample.normal),
                    GeometryAttribute::Position => Value::Vector(sample.position),
                },
                NodeKind::SeparateXyz { input } => {
                    Value::Vector(values[input.node].vector())
                }
                NodeKind::OneMinus { input } => Value::Scalar(1.0 - get(input)),
                NodeKind::MapRange {
                    input,
                    from_min,
                    from_max,
                    to_min,
                    to_max,
                    clamp,
                } => Value::Scalar(map_range(
                    get(input),
                    *from_min,
                    *from_max,
                    *to_min,
                    *to_max,
                    *clamp,
                )),
                NodeKind::CombineXyz { x, y, z } => Value::Vector([get(x), get(y), get(z)]),
                NodeKind::ShaderlessOutput { color: input } => {
                    color = values[input.node].vector();
                    Value::Vector(color)
                }
            };
            values.push(value);
        }
        Ok(color)
    }
}

/// Input window `[0.5 − w, 0.5 + w]` with `w = (1 − contrast) / 2 + ε`.
pub fn curvature_window(contrast: f64) -> (f64, f64) {
    let half = (1.0 - contrast) / 2.0 + CURVATURE_EPSILON;
    (0.5 - half, 0.5 + half)
}

fn map_range(value: f64, from_min: f64, from_max: f64, to_min: f64, to_max: f64, clamp: bool) -> f64 {
    let span = from_max - from_min;
    if span.abs() < f64::EPSILON {
        return to_min;
    }
    let mapped = to_min + (value - from_min) / span * (to_max - to_min);
    if clamp {
        mapped.clamp(to_min.min(to_max), to_min.max(to_max))
    } else {
        mapped
    }
}

fn vector_graph(
    channel: DerivedChannel,
    attribute: GeometryAttribute,
    axes: &AxisAssignment,
    remap: bool,
) -> DerivedChannelGraph {
    let mut b = GraphBuilder::new();
    let geometry = b.add(NodeKind::Geometry { attribute });
    let split = b.add(NodeKind::SeparateXyz { input: geometry });

    let [r, g, bl] = axes.channels().map(|axis| b.select_axis(split, axis, remap));

    let rgb = b.add(NodeKind::CombineXyz { x: r, y: g, z: bl });
    b.finish(channel, rgb)
}

/// Appends nodes in order, handing out links only to existing nodes.
struct GraphBuilder {
    nodes: Vec<NodeKind>,
}

impl GraphBuilder {
    fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    fn add(&mut self, node: NodeKind) -> Link {
        self.nodes.push(node);
        Link {
            node: self.nodes.len() - 1,
            output: 0,
        }
    }

    fn select_axis(&mut self, split: Link, axis: SignedAxis, remap: bool) -> Link {
        let mut link = Link {
            node: split.node,
            output: axis.component().index(),
        };
        if axis.is_negative() {
            link = self.add(NodeKind::OneMinus { input: link });
        }
        if remap {
            link = self.add(NodeKind::MapRange {
                input: link,
                from_min: -1.0,
                from_max: 1.0,
                to_min: 0.0,
                to_max: 1.0,
                clamp: true,
            });
        }
        link
    }

    fn finish(mut self, channel: DerivedChannel, color: Link) -> DerivedChannelGraph {
        self.add(NodeKind::ShaderlessOutput { color });
        DerivedChannelGraph {
            channel,
            nodes: self.nodes,
        }
    }
}
