//! Builds the generated artifacts with `rustc` and checks that they compute what
//! the in-memory blocks compute.

use std::{fmt::Write as _, fs, process::Command};

use graphnet::{
    model::UpdateDescription,
    testing::{random_graph_on, random_parameters},
    Architecture, CompiledModel, Element, FeatureWidths, GeneratedCode, GraphDescription,
    GraphStack, GraphState, Infer, ModelCompiler, WeightLayout,
};

const NUM_NODES: usize = 4;
// node 3 receives nothing
const EDGES: [(usize, usize); 5] = [(0, 1), (1, 2), (2, 1), (3, 0), (0, 2)];

/// `rustc` from the `RUSTC` variable or the path, `None` when neither runs.
fn rustc() -> Option<String> {
    let rustc = std::env::var("RUSTC").unwrap_or_else(|_| "rustc".to_string());
    let available = Command::new(&rustc)
        .arg("--version")
        .output()
        .is_ok_and(|output| output.status.success());
    available.then_some(rustc)
}

fn literal(values: &[Element]) -> String {
    values.iter().fold(String::new(), |mut out, v| {
        write!(out, "f32::from_bits({}u32), ", v.to_bits()).unwrap();
        out
    })
}

/// Compiles `artifact` behind a `main` feeding it `input` and returns the node,
/// edge and global buffers it prints.
fn run_artifact(rustc: &str, artifact: &GeneratedCode, input: &GraphState) -> [Vec<Element>; 3] {
    let dir = tempfile::tempdir().unwrap();
    let module = artifact.write_to(dir.path()).unwrap();
    let main = format!(
        r#"#[path = {module:?}]
mod model;

fn main() {{
    let mut nodes: Vec<f32> = vec![{nodes}];
    let mut edges: Vec<f32> = vec![{edges}];
    let mut globals: Vec<f32> = vec![{globals}];
    model::infer(&mut nodes, &mut edges, &mut globals);
    for buffer in [&nodes, &edges, &globals] {{
        let bits: Vec<String> = buffer.iter().map(|v| v.to_bits().to_string()).collect();
        println!("{{}}", bits.join(" "));
    }}
}}
"#,
        nodes = literal(input.nodes().flatten()),
        edges = literal(input.edges().flatten()),
        globals = literal(input.globals().flatten()),
    );
    let main_path = dir.path().join("main.rs");
    fs::write(&main_path, main).unwrap();
    let binary = dir.path().join("harness");

    let build = Command::new(rustc)
        .args(["--edition", "2021", "-O", "--crate-name", "harness", "-o"])
        .arg(&binary)
        .arg(&main_path)
        .output()
        .unwrap();
    assert!(
        build.status.success(),
        "generated code does not compile:\n{}",
        String::from_utf8_lossy(&build.stderr)
    );

    let run = Command::new(&binary).output().unwrap();
    assert!(run.status.success());
    let stdout = String::from_utf8(run.stdout).unwrap();
    let buffers: Vec<Vec<Element>> = stdout
        .lines()
        .map(|line| {
            line.split_whitespace()
                .map(|bits| Element::from_bits(bits.parse().unwrap()))
                .collect()
        })
        .collect();
    buffers.try_into().unwrap()
}

fn assert_matches(label: &str, generated: &[Element], expected: &[Element]) {
    assert_eq!(generated.len(), expected.len(), "{label}: length");
    for (i, (g, e)) in generated.iter().zip(expected).enumerate() {
        assert!(
            (g - e).abs() <= 1e-6 * (1.0 + e.abs()),
            "{label}[{i}]: generated {g}, in memory {e}"
        );
    }
}

fn assert_artifact_agrees<M: Infer>(
    rustc: &str,
    model: &M,
    artifact: &GeneratedCode,
    seed: u64,
) {
    let input = random_graph_on(NUM_NODES, &EDGES, model.input_widths(), seed);
    let mut expected = input.copy();
    model.infer(&mut expected);

    let [nodes, edges, globals] = run_artifact(rustc, artifact, &input);
    assert_matches("nodes", &nodes, expected.nodes().flatten());
    assert_matches("edges", &edges, expected.edges().flatten());
    assert_matches("globals", &globals, expected.globals().flatten());
}

fn compile(description: GraphDescription, seed: u64) -> CompiledModel {
    let params = random_parameters(&description, seed);
    ModelCompiler::new(description, params).compile().unwrap()
}

fn core() -> CompiledModel {
    let description = GraphDescription::new(
        "core",
        Architecture::GraphNetwork,
        NUM_NODES,
        EDGES.to_vec(),
        FeatureWidths::new(3, 2, 2),
        [
            UpdateDescription::mlp("edge_model", &[8, 2]),
            UpdateDescription::mlp("node_model", &[8, 3]).with_activation("sigmoid"),
            UpdateDescription::mlp("global_model", &[8, 2]).with_activate_final(true),
        ],
    )
    .with_aggregates("mean", "sum", "mean");
    compile(description, 21)
}

fn decoder(input: FeatureWidths) -> CompiledModel {
    let description = GraphDescription::new(
        "decoder",
        Architecture::GraphIndependent,
        NUM_NODES,
        EDGES.to_vec(),
        input,
        [
            UpdateDescription::mlp("edge_model", &[4, 1]),
            UpdateDescription::mlp("node_model", &[4, 1]).with_weight_layout(WeightLayout::OutIn),
            UpdateDescription::mlp("global_model", &[1])
                .with_activation("sigmoid")
                .with_activate_final(true),
        ],
    );
    compile(description, 34)
}

#[test]
fn network_artifact_matches_block() {
    let Some(rustc) = rustc() else { return };
    let model = core();
    assert_artifact_agrees(&rustc, &model, model.artifact().unwrap(), 1);
}

#[test]
fn independent_artifact_matches_block() {
    let Some(rustc) = rustc() else { return };
    let model = decoder(FeatureWidths::new(3, 2, 2));
    assert_artifact_agrees(&rustc, &model, model.artifact().unwrap(), 2);
}

#[test]
fn stack_artifact_matches_stack() {
    let Some(rustc) = rustc() else { return };
    let core = core();
    let decoder = decoder(core.output_widths());
    let stack = GraphStack::new("core_stack")
        .with_model(core.clone())
        .unwrap()
        .with_model(core)
        .unwrap()
        .with_model(decoder)
        .unwrap();
    assert_artifact_agrees(&rustc, &stack, &stack.artifact().unwrap(), 3);
}

