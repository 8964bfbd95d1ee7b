//! Declarative description of a graph model, the input of the
//! [`ModelCompiler`](crate::compiler::ModelCompiler).

use std::path::Path;

use anyhow::Context;
use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::{
    graph::{check_adjacency, FeatureWidths, GraphState},
    parameters::WeightLayout,
    GnnError, Result,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum Architecture {
    /// Full message passing: edge, node and global updates wired by aggregations.
    #[default]
    #[display("graph_network")]
    GraphNetwork,
    /// Each entity type is updated from its own features only.
    #[display("graph_independent")]
    GraphIndependent,
}

/// Recognised update function kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum UpdateKind {
    #[display("mlp")]
    Mlp,
}

impl UpdateKind {
    pub fn from_tag(tag: &str) -> Result<Self> {
        match tag {
            "mlp" => Ok(UpdateKind::Mlp),
            other => Err(GnnError::UnsupportedFunction(format!(
                "update function '{other}' is not supported"
            ))),
        }
    }
}

fn default_activation() -> String {
    "relu".to_string()
}

fn default_aggregate() -> String {
    "sum".to_string()
}

/// Description of one per-entity update function.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDescription {
    /// Function kind tag, e.g. `"mlp"`.
    pub kind: String,
    /// Module name the trained tensors of this function are keyed under.
    pub module: String,
    /// Output width of every layer, in order.
    #[serde(default)]
    pub layer_sizes: Vec<usize>,
    #[serde(default = "default_activation")]
    pub activation: String,
    #[serde(default)]
    pub activate_final: bool,
    #[serde(default)]
    pub weight_layout: WeightLayout,
}

impl UpdateDescription {
    pub fn mlp<S: Into<String>>(module: S, layer_sizes: &[usize]) -> Self {
        Self {
            kind: UpdateKind::Mlp.to_string(),
            module: module.into(),
            layer_sizes: layer_sizes.to_vec(),
            activation: default_activation(),
            activate_final: false,
            weight_layout: WeightLayout::default(),
        }
    }

    pub fn with_activation<S: Into<String>>(mut self, activation: S) -> Self {
        self.activation = activation.into();
        self
    }

    pub fn with_activate_final(mut self, activate_final: bool) -> Self {
        self.activate_final = activate_final;
        self
    }

    pub fn with_weight_layout(mut self, layout: WeightLayout) -> Self {
        self.weight_layout = layout;
        self
    }

    /// Width of the rows this function produces, `None` if no layer is declared.
    pub fn output_width(&self) -> Option<usize> {
        self.layer_sizes.last().copied()
    }
}

/// Description of one aggregation, identified by its reducer tag (`"sum"`, `"mean"`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateDescription {
    pub kind: String,
}

impl AggregateDescription {
    pub fn new<S: Into<String>>(kind: S) -> Self {
        Self { kind: kind.into() }
    }
}

impl Default for AggregateDescription {
    fn default() -> Self {
        Self::new(default_aggregate())
    }
}

/// Feature blocks concatenated into the edge update input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum EdgeInput {
    #[display("edges")]
    Edges,
    #[display("senders")]
    Senders,
    #[display("receivers")]
    Receivers,
    #[display("globals")]
    Globals,
}

/// Feature blocks concatenated into the node update input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum NodeInput {
    #[display("nodes")]
    Nodes,
    #[display("received_edges")]
    ReceivedEdges,
    #[display("globals")]
    Globals,
}

/// Feature blocks concatenated into the global update input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum GlobalInput {
    #[display("globals")]
    Globals,
    #[display("nodes")]
    Nodes,
    #[display("edges")]
    Edges,
}

/// Which feature blocks feed each update function of a graph network, in
/// concatenation order. It mirrors the wiring of the trained architecture.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputComposition {
    pub edge: Vec<EdgeInput>,
    pub node: Vec<NodeInput>,
    pub global: Vec<GlobalInput>,
}

impl Default for InputComposition {
    fn default() -> Self {
        Self {
            edge: vec![
                EdgeInput::Edges,
                EdgeInput::Senders,
                EdgeInput::Receivers,
                EdgeInput::Globals,
            ],
            node: vec![NodeInput::Nodes, NodeInput::ReceivedEdges, NodeInput::Globals],
            global: vec![GlobalInput::Globals, GlobalInput::Nodes, GlobalInput::Edges],
        }
    }
}

impl InputComposition {
    /// Every update only sees the features of its own entity type.
    pub fn own_features() -> Self {
        Self {
            edge: vec![EdgeInput::Edges],
            node: vec![NodeInput::Nodes],
            global: vec![GlobalInput::Globals],
        }
    }

    pub fn edge_width(&self, widths: FeatureWidths) -> usize {
        self.edge
            .iter()
            .map(|input| match input {
                EdgeInput::Edges => widths.edges,
                EdgeInput::Senders | EdgeInput::Receivers => widths.nodes,
                EdgeInput::Globals => widths.globals,
            })
            .sum()
    }

    /// `edge_out` is the width produced by the edge update.
    pub fn node_width(&self, widths: FeatureWidths, edge_out: usize) -> usize {
        self.node
            .iter()
            .map(|input| match input {
                NodeInput::Nodes => widths.nodes,
                NodeInput::ReceivedEdges => edge_out,
                NodeInput::Globals => widths.globals,
            })
            .sum()
    }

    pub fn global_width(&self, widths: FeatureWidths, node_out: usize, edge_out: usize) -> usize {
        self.global
            .iter()
            .map(|input| match input {
                GlobalInput::Globals => widths.globals,
                GlobalInput::Nodes => node_out,
                GlobalInput::Edges => edge_out,
            })
            .sum()
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.edge.is_empty() || self.node.is_empty() || self.global.is_empty() {
            return Err(GnnError::Shape(
                "every update function needs at least one input block".to_string(),
            ));
        }
        Ok(())
    }
}

/// Everything needed to compile a graph model: topology, feature widths, update
/// and aggregate functions and how their inputs are wired.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphDescription {
    /// Identifier of the model, conventionally the output filename.
    pub name: String,
    #[serde(default)]
    pub architecture: Architecture,
    pub num_nodes: usize,
    /// `(sender, receiver)` pairs.
    #[serde(default)]
    pub edges: Vec<(usize, usize)>,
    pub node_features: usize,
    pub edge_features: usize,
    pub global_features: usize,
    pub edge_update: UpdateDescription,
    pub node_update: UpdateDescription,
    pub global_update: UpdateDescription,
    #[serde(default)]
    pub edge_node_aggregate: AggregateDescription,
    #[serde(default)]
    pub node_global_aggregate: AggregateDescription,
    #[serde(default)]
    pub edge_global_aggregate: AggregateDescription,
    #[serde(default)]
    pub inputs: InputComposition,
}

impl GraphDescription {
    /// A description using sum aggregations and the default input composition.
    /// `updates` are the edge, node and global update functions, in that order.
    pub fn new<S: Into<String>>(
        name: S,
        architecture: Architecture,
        num_nodes: usize,
        edges: Vec<(usize, usize)>,
        widths: FeatureWidths,
        updates: [UpdateDescription; 3],
    ) -> Self {
        let [edge_update, node_update, global_update] = updates;
        Self {
            name: name.into(),
            architecture,
            num_nodes,
            edges,
            node_features: widths.nodes,
            edge_features: widths.edges,
            global_features: widths.globals,
            edge_update,
            node_update,
            global_update,
            edge_node_aggregate: AggregateDescription::default(),
            node_global_aggregate: AggregateDescription::default(),
            edge_global_aggregate: AggregateDescription::default(),
            inputs: InputComposition::default(),
        }
    }

    /// Sets the edge -> node, node -> global and edge -> global reducers.
    pub fn with_aggregates(
        mut self,
        edge_node: &str,
        node_global: &str,
        edge_global: &str,
    ) -> Self {
        self.edge_node_aggregate = AggregateDescription::new(edge_node);
        self.node_global_aggregate = AggregateDescription::new(node_global);
        self.edge_global_aggregate = AggregateDescription::new(edge_global);
        self
    }

    pub fn with_inputs(mut self, inputs: InputComposition) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("opening model description {}", path.display()))?;
        serde_json::from_reader(std::io::BufReader::new(file))
            .with_context(|| format!("decoding model description {}", path.display()))
    }

    pub fn input_widths(&self) -> FeatureWidths {
        FeatureWidths::new(self.node_features, self.edge_features, self.global_features)
    }

    /// Input width of the edge, node and global update functions. Undeclared
    /// output widths count as zero.
    pub fn update_input_widths(&self) -> [usize; 3] {
        let widths = self.input_widths();
        match self.architecture {
            Architecture::GraphIndependent => [widths.edges, widths.nodes, widths.globals],
            Architecture::GraphNetwork => {
                let edge_out = self.edge_update.output_width().unwrap_or_default();
                let node_out = self.node_update.output_width().unwrap_or_default();
                [
                    self.inputs.edge_width(widths),
                    self.inputs.node_width(widths, edge_out),
                    self.inputs.global_width(widths, node_out, edge_out),
                ]
            }
        }
    }

    /// Feature widths produced by the model.
    pub fn output_widths(&self) -> FeatureWidths {
        FeatureWidths::new(
            self.node_update.output_width().unwrap_or_default(),
            self.edge_update.output_width().unwrap_or_default(),
            self.global_update.output_width().unwrap_or_default(),
        )
    }

    pub fn updates(&self) -> [&UpdateDescription; 3] {
        [&self.edge_update, &self.node_update, &self.global_update]
    }

    pub fn senders(&self) -> Vec<usize> {
        self.edges.iter().map(|(s, _)| *s).collect()
    }

    pub fn receivers(&self) -> Vec<usize> {
        self.edges.iter().map(|(_, r)| *r).collect()
    }

    pub fn check_adjacency(&self) -> Result<()> {
        check_adjacency(self.num_nodes, &self.senders(), &self.receivers())
    }

    /// A zero-filled state with this description's topology and input widths.
    pub fn empty_state(&self) -> Result<GraphState> {
        GraphState::zeros(self.num_nodes, &self.edges, self.input_widths())
    }

    /// Name of the generated artifact: `name` without its file extension, made
    /// into a valid identifier.
    pub fn artifact_name(&self) -> String {
        artifact_name(&self.name)
    }
}

// Strict and reserved keywords of every edition.
const KEYWORDS: &[&str] = &[
    "Self", "abstract", "as", "async", "await", "become", "box", "break", "const", "continue",
    "crate", "do", "dyn", "else", "enum", "extern", "false", "final", "fn", "for", "gen", "if",
    "impl", "in", "let", "loop", "macro", "match", "mod", "move", "mut", "override", "priv",
    "pub", "ref", "return", "self", "static", "struct", "super", "trait", "true", "try", "type",
    "typeof", "unsafe", "unsized", "use", "virtual", "where", "while", "yield",
];

pub(crate) fn artifact_name(name: &str) -> String {
    let stem = match name.rfind('.') {
        Some(pos) if pos > 0 => &name[..pos],
        _ => name,
    };
    let mut ident: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if ident.is_empty() || ident.chars().all(|c| c == '_') {
        ident = "model".to_string();
    }
    if ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert(0, '_');
    }
    if KEYWORDS.contains(&ident.as_str()) {
        ident.push('_');
    }
    ident
}
