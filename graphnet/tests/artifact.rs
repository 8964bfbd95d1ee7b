use std::{fs, path::Path};

use graphnet::{
    extract_parameters, testing::random_graph_on, Element, GraphDescription, GraphDict,
    GraphStack, GraphState, Infer, ModelCompiler, ParameterMap, StateDict,
};

const DESCRIPTION: &str = r#"{
    "name": "encoder.hxx",
    "architecture": "graph_independent",
    "num_nodes": 3,
    "edges": [[0, 1], [1, 2]],
    "node_features": 2,
    "edge_features": 1,
    "global_features": 1,
    "edge_update": {"kind": "mlp", "module": "edge_model", "layer_sizes": [2]},
    "node_update": {"kind": "mlp", "module": "node_model", "layer_sizes": [2], "weight_layout": "out_in"},
    "global_update": {"kind": "mlp", "module": "global_model", "layer_sizes": [2], "activation": "sigmoid", "activate_final": true}
}"#;

/// Stand-in for a trained model exposing its tensors by name.
struct TrainedEncoder;

impl StateDict for TrainedEncoder {
    fn named_parameters(&self) -> Vec<(String, Vec<Element>)> {
        [
            ("edge_model.linear_0.weight", vec![1.0, -1.0]),
            ("edge_model.linear_0.bias", vec![0.0, 0.5]),
            // [out, in]
            ("node_model.linear_0.weight", vec![1.0, 2.0, 3.0, 4.0]),
            ("node_model.linear_0.bias", vec![0.0, 0.0]),
            ("global_model.linear_0.weight", vec![0.0, 0.0]),
            ("global_model.linear_0.bias", vec![0.0, 0.0]),
        ]
        .into_iter()
        .map(|(name, values)| (name.to_string(), values))
        .collect()
    }
}

#[test]
fn json_description_compiles_and_writes_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let description_path = dir.path().join("encoder.json");
    let params_path = dir.path().join("params.json");
    fs::write(&description_path, DESCRIPTION).unwrap();
    fs::write(
        &params_path,
        serde_json::to_string(&extract_parameters(&TrainedEncoder)).unwrap(),
    )
    .unwrap();

    let description = GraphDescription::from_json_file(&description_path).unwrap();
    let params = ParameterMap::from_json_file(&params_path).unwrap();
    let model = ModelCompiler::new(description.clone(), params)
        .compile()
        .unwrap();
    assert_eq!(model.name(), "encoder");

    let path = model
        .artifact()
        .unwrap()
        .write_to(dir.path().join("generated"))
        .unwrap();
    assert!(path.ends_with("generated/encoder.rs"));
    let source = fs::read_to_string(&path).unwrap();
    assert!(source.contains("pub fn infer"));

    let mut state = random_graph_on(3, &description.edges, description.input_widths(), 1);
    let nodes_before = state.nodes().clone();
    model.infer(&mut state);
    // x·Wᵀ with W = [[1, 2], [3, 4]]
    for (before, after) in nodes_before.iter_rows().zip(state.nodes().iter_rows()) {
        let expected = [before[0] + 2.0 * before[1], 3.0 * before[0] + 4.0 * before[1]];
        for (e, a) in expected.iter().zip(after) {
            assert!((e - a).abs() < 1e-6);
        }
    }
    // sigmoid(0) on both global features
    assert_eq!(state.globals().flatten(), &[0.5, 0.5]);
}

#[test]
fn missing_files_report_their_path() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.json");
    let err = GraphDescription::from_json_file(&missing).unwrap_err();
    assert!(format!("{err:#}").contains("absent.json"));
    assert!(ParameterMap::from_json_file(&missing).is_err());
}

#[test]
fn stack_artifact_is_written_as_one_file() {
    let description: GraphDescription = serde_json::from_str(DESCRIPTION).unwrap();
    let first = ModelCompiler::new(description.clone(), extract_parameters(&TrainedEncoder))
        .compile()
        .unwrap();

    // second block consumes the (2, 2, 2) output of the first
    let second_description = GraphDescription {
        name: "refine".to_string(),
        edge_features: 2,
        global_features: 2,
        ..description
    };
    let mut params = extract_parameters(&TrainedEncoder);
    params.insert("edge_model.linear_0.weight", vec![1.0, 0.0, 0.0, 1.0]);
    params.insert("global_model.linear_0.weight", vec![0.0; 4]);
    let second = ModelCompiler::new(second_description, params)
        .compile()
        .unwrap();

    let stack = GraphStack::new("encoder_stack")
        .with_model(first)
        .unwrap()
        .with_model(second)
        .unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = stack.artifact().unwrap().write_to(dir.path()).unwrap();
    assert_eq!(path.file_name().unwrap(), "encoder_stack.rs");
    let source = fs::read_to_string(path).unwrap();
    assert!(source.contains("pub mod encoder"));
    assert!(source.contains("pub mod refine"));
}

#[test]
fn identity_demo_reproduces_its_graph() {
    let demo = Path::new(env!("CARGO_MANIFEST_DIR")).join("../demos/identity");
    let description = GraphDescription::from_json_file(demo.join("description.json")).unwrap();
    let params = ParameterMap::from_json_file(demo.join("params.json")).unwrap();
    let graph = fs::File::open(demo.join("graph.json")).unwrap();
    let input = GraphState::try_from(GraphDict::from_reader(graph).unwrap()).unwrap();

    let model = ModelCompiler::new(description, params).compile().unwrap();
    assert_eq!(model.name(), "identity_core");
    let mut state = input.copy();
    model.try_infer(&mut state).unwrap();
    assert_eq!(state, input);
}
