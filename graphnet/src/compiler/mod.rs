//! Turns a [`GraphDescription`] and trained parameters into an executable block
//! and its generated code.

pub(crate) mod codegen;

use tracing::{debug, info, warn};

use crate::{
    functions::{Activation, AggregateFunction, FunctionTarget, Mlp, UpdateFunction},
    graph::{FeatureWidths, GraphState},
    model::{
        description::artifact_name, Architecture, GraphBlock, GraphDescription,
        GraphIndependentBlock, GraphNetworkBlock, Infer, UpdateDescription, UpdateKind,
    },
    parameters::ParameterMap,
    GnnError, Result,
};

pub use codegen::GeneratedCode;

/// One-shot compiler from description to [`CompiledModel`].
///
/// ```ignore
/// let model = ModelCompiler::new(description, params)
///     .with_name("core")
///     .compile()?;
/// model.infer(&mut state);
/// ```
#[derive(Clone, Debug)]
pub struct ModelCompiler {
    description: GraphDescription,
    params: ParameterMap,
    emit_artifact: bool,
    name: Option<String>,
}

/// Output of the compiler: the in-memory block and, unless disabled, the
/// generated code doing the same computation.
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledModel {
    name: String,
    block: GraphBlock,
    artifact: Option<GeneratedCode>,
}

impl CompiledModel {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn block(&self) -> &GraphBlock {
        &self.block
    }

    pub fn artifact(&self) -> Option<&GeneratedCode> {
        self.artifact.as_ref()
    }

    pub fn into_block(self) -> GraphBlock {
        self.block
    }
}

impl Infer for CompiledModel {
    fn infer(&self, state: &mut GraphState) {
        self.block.infer(state)
    }

    fn input_widths(&self) -> FeatureWidths {
        self.block.input_widths()
    }

    fn output_widths(&self) -> FeatureWidths {
        self.block.output_widths()
    }

    fn describe(&self) -> String {
        self.block.describe()
    }
}

/// Tags of one update function, parsed before any parameter is bound.
struct ParsedUpdate<'a> {
    description: &'a UpdateDescription,
    kind: UpdateKind,
    activation: Activation,
}

impl<'a> ParsedUpdate<'a> {
    fn parse(description: &'a UpdateDescription) -> Result<Self> {
        let kind = UpdateKind::from_tag(&description.kind)?;
        let activation = Activation::from_tag(&description.activation)?;
        if description.layer_sizes.is_empty() {
            return Err(GnnError::Shape(format!(
                "update function '{}' declares no layer",
                description.module
            )));
        }
        if let Some(i) = description.layer_sizes.iter().position(|&size| size == 0) {
            return Err(GnnError::Shape(format!(
                "layer {i} of update function '{}' has zero width",
                description.module
            )));
        }
        Ok(Self {
            description,
            kind,
            activation,
        })
    }

    fn bind(&self, input_width: usize, params: &mut ParameterMap) -> Result<UpdateFunction> {
        match self.kind {
            UpdateKind::Mlp => Ok(UpdateFunction::Mlp(Mlp::from_parameters(
                &self.description.module,
                input_width,
                &self.description.layer_sizes,
                self.description.weight_layout,
                self.activation,
                self.description.activate_final,
                params,
            )?)),
        }
    }
}

impl ModelCompiler {
    pub fn new(description: GraphDescription, params: ParameterMap) -> Self {
        Self {
            description,
            params,
            emit_artifact: true,
            name: None,
        }
    }

    /// Whether to render the generated code, on by default.
    pub fn with_artifact(mut self, emit: bool) -> Self {
        self.emit_artifact = emit;
        self
    }

    /// Overrides the description name for the block and its artifact.
    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Validates the description, binds every update function to its parameters and
    /// assembles the block. Nothing is built unless every check passes.
    pub fn compile(self) -> Result<CompiledModel> {
        let ModelCompiler {
            description,
            mut params,
            emit_artifact,
            name,
        } = self;
        let name = artifact_name(name.as_deref().unwrap_or(&description.name));
        info!(
            model = %name,
            architecture = %description.architecture,
            nodes = description.num_nodes,
            edges = description.edges.len(),
            parameters = params.len(),
            "compiling graph model"
        );

        let widths = description.input_widths();
        if widths.nodes == 0 || widths.edges == 0 || widths.globals == 0 {
            return Err(GnnError::Shape(format!(
                "feature widths must be positive, got {widths}"
            )));
        }
        description.check_adjacency()?;

        let [edge, node, global] = description.updates().map(ParsedUpdate::parse);
        let (edge, node, global) = (edge?, node?, global?);
        let aggregates = [
            AggregateFunction::from_tag(&description.edge_node_aggregate.kind)?,
            AggregateFunction::from_tag(&description.node_global_aggregate.kind)?,
            AggregateFunction::from_tag(&description.edge_global_aggregate.kind)?,
        ];
        if description.architecture == Architecture::GraphNetwork {
            description.inputs.check()?;
        }

        let [edge_in, node_in, global_in] = description.update_input_widths();
        let updates = [
            edge.bind(edge_in, &mut params)?,
            node.bind(node_in, &mut params)?,
            global.bind(global_in, &mut params)?,
        ];
        let targets = [FunctionTarget::Edges, FunctionTarget::Nodes, FunctionTarget::Globals];
        for (target, update) in targets.iter().zip(&updates) {
            debug!(model = %name, entity = %target, function = %update, "bound update function");
        }
        for unused in params.names() {
            warn!(model = %name, parameter = unused, "parameter not used by any update function");
        }

        let block = match description.architecture {
            Architecture::GraphNetwork => GraphBlock::Network(GraphNetworkBlock::new(
                name.clone(),
                updates,
                aggregates,
                description.inputs.clone(),
                widths,
            )),
            Architecture::GraphIndependent => {
                GraphBlock::Independent(GraphIndependentBlock::new(name.clone(), updates))
            }
        };
        let artifact = emit_artifact.then(|| match &block {
            GraphBlock::Network(network) => codegen::render_network(
                &name,
                network,
                description.num_nodes,
                &description.senders(),
                &description.receivers(),
            ),
            GraphBlock::Independent(independent) => {
                codegen::render_independent(&name, independent)
            }
        });
        info!(
            model = %name,
            output = %block.output_widths(),
            artifact = artifact.is_some(),
            "graph model compiled"
        );
        Ok(CompiledModel {
            name,
            block,
            artifact,
        })
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::testing::{identity_mlp_parameters, random_graph, random_parameters};

    fn network(name: &str) -> GraphDescription {
        GraphDescription::new(
            name,
            Architecture::GraphNetwork,
            4,
            vec![(0, 1), (1, 2), (2, 3), (3, 0), (0, 2)],
            FeatureWidths::new(3, 2, 1),
            [
                UpdateDescription::mlp("edge_model", &[5, 2]),
                UpdateDescription::mlp("node_model", &[5, 3]),
                UpdateDescription::mlp("global_model", &[5, 1]),
            ],
        )
    }

    #[test]
    fn test_compile_network_widths() {
        let description = network("core");
        let params = random_parameters(&description, 7);
        let model = ModelCompiler::new(description, params).compile().unwrap();
        assert_eq!(model.name(), "core");
        assert_eq!(model.input_widths(), FeatureWidths::new(3, 2, 1));
        assert_eq!(model.output_widths(), FeatureWidths::new(3, 2, 1));
        assert_eq!(model.block().architecture(), Architecture::GraphNetwork);
        match model.block() {
            GraphBlock::Network(block) => {
                // edges + sender + receiver + globals
                assert_eq!(block.edge_update().input_width(), 2 + 3 + 3 + 1);
                // nodes + received edges + globals
                assert_eq!(block.node_update().input_width(), 3 + 2 + 1);
                // globals + node summary + edge summary
                assert_eq!(block.global_update().input_width(), 1 + 3 + 2);
            }
            other => panic!("unexpected block {other}"),
        }
    }

    #[rstest]
    #[case::edge_node(Architecture::GraphNetwork, ["max", "sum", "sum"])]
    #[case::node_global(Architecture::GraphNetwork, ["sum", "min", "sum"])]
    #[case::edge_global(Architecture::GraphNetwork, ["sum", "sum", "prod"])]
    #[case::independent(Architecture::GraphIndependent, ["sum", "max", "sum"])]
    fn test_unknown_aggregator_is_rejected(
        #[case] architecture: Architecture,
        #[case] tags: [&str; 3],
    ) {
        let description = GraphDescription {
            architecture,
            ..network("core")
        }
        .with_aggregates(tags[0], tags[1], tags[2]);
        let params = random_parameters(&description, 7);
        let err = ModelCompiler::new(description, params).compile().unwrap_err();
        assert!(matches!(err, GnnError::UnsupportedFunction(_)));
    }

    #[rstest]
    #[case::kind(UpdateDescription {
        kind: "gru".to_string(),
        ..UpdateDescription::mlp("edge_model", &[5, 2])
    })]
    #[case::activation(UpdateDescription::mlp("edge_model", &[5, 2]).with_activation("tanh"))]
    fn test_unknown_update_is_rejected(#[case] edge_update: UpdateDescription) {
        let description = GraphDescription {
            edge_update,
            ..network("core")
        };
        let params = random_parameters(&network("core"), 7);
        let err = ModelCompiler::new(description, params).compile().unwrap_err();
        assert!(matches!(err, GnnError::UnsupportedFunction(_)));
    }

    #[test]
    fn test_missing_and_mis_shaped_parameters() {
        let description = network("core");
        let mut params = random_parameters(&description, 7);
        params.take("node_model.linear_1.bias", 3).unwrap();
        let err = ModelCompiler::new(description.clone(), params)
            .compile()
            .unwrap_err();
        assert!(matches!(err, GnnError::ParameterMismatch(_)));

        let mut params = random_parameters(&description, 7);
        params.insert("global_model.linear_0.weight", vec![0.0; 3]);
        let err = ModelCompiler::new(description, params).compile().unwrap_err();
        assert!(matches!(err, GnnError::ParameterMismatch(_)));
    }

    #[test]
    fn test_invalid_topology_and_widths() {
        let description = GraphDescription {
            edges: vec![(0, 4)],
            ..network("core")
        };
        let params = random_parameters(&description, 7);
        assert!(matches!(
            ModelCompiler::new(description, params).compile(),
            Err(GnnError::Adjacency(_))
        ));

        let description = GraphDescription {
            global_features: 0,
            ..network("core")
        };
        let params = random_parameters(&description, 7);
        assert!(matches!(
            ModelCompiler::new(description, params).compile(),
            Err(GnnError::Shape(_))
        ));
    }

    #[test]
    fn test_extra_parameters_are_tolerated() {
        let description = network("core");
        let mut params = random_parameters(&description, 7);
        params.insert("unused.linear_0.weight", vec![1.0]);
        assert!(ModelCompiler::new(description, params).compile().is_ok());
    }

    #[test]
    fn test_independent_with_name_and_without_artifact() {
        let widths = FeatureWidths::new(2, 2, 2);
        let description = GraphDescription::new(
            "encoder",
            Architecture::GraphIndependent,
            3,
            vec![(0, 1)],
            widths,
            [
                UpdateDescription::mlp("edge_model", &[2]),
                UpdateDescription::mlp("node_model", &[2]),
                UpdateDescription::mlp("global_model", &[2]),
            ],
        );
        let mut params = ParameterMap::new();
        for module in ["edge_model", "node_model", "global_model"] {
            params.extend(identity_mlp_parameters(module, 2, 1));
        }
        let model = ModelCompiler::new(description, params)
            .with_name("renamed.h")
            .with_artifact(false)
            .compile()
            .unwrap();
        assert_eq!(model.name(), "renamed");
        assert!(model.artifact().is_none());

        let input = random_graph(3, 1, widths, 4);
        let mut state = input.copy();
        model.try_infer(&mut state).unwrap();
        assert_eq!(state, input);
    }
}
