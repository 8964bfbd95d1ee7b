//! Seeded fixtures shared by unit tests, integration tests and benches.

use itertools::Itertools;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    graph::{FeatureWidths, GraphState},
    model::GraphDescription,
    parameters::{layer_slot_names, ParameterMap},
    tensor::TensorBuffer,
    Element,
};

fn random_values(rng: &mut StdRng, n: usize, low: Element, high: Element) -> Vec<Element> {
    (0..n).map(|_| rng.gen_range(low..high)).collect_vec()
}

/// A graph with random features in `[0, 1)` and random adjacency. The same seed
/// always gives the same graph.
pub fn random_graph(
    num_nodes: usize,
    num_edges: usize,
    widths: FeatureWidths,
    seed: u64,
) -> GraphState {
    let mut rng = StdRng::seed_from_u64(seed);
    let edge_list = (0..num_edges)
        .map(|_| (rng.gen_range(0..num_nodes), rng.gen_range(0..num_nodes)))
        .collect_vec();
    graph_with_topology(num_nodes, &edge_list, widths, &mut rng)
}

/// A graph with random features in `[0, 1)` on the given topology.
pub fn random_graph_on(
    num_nodes: usize,
    edge_list: &[(usize, usize)],
    widths: FeatureWidths,
    seed: u64,
) -> GraphState {
    let mut rng = StdRng::seed_from_u64(seed);
    graph_with_topology(num_nodes, edge_list, widths, &mut rng)
}

fn graph_with_topology(
    num_nodes: usize,
    edge_list: &[(usize, usize)],
    widths: FeatureWidths,
    rng: &mut StdRng,
) -> GraphState {
    let nodes = random_values(rng, num_nodes * widths.nodes, 0.0, 1.0);
    let edges = random_values(rng, edge_list.len() * widths.edges, 0.0, 1.0);
    let globals = random_values(rng, widths.globals, 0.0, 1.0);
    GraphState::from_edge_list(
        TensorBuffer::from_flat_unchecked(nodes, num_nodes, widths.nodes),
        TensorBuffer::from_flat_unchecked(edges, edge_list.len(), widths.edges),
        TensorBuffer::from_flat_unchecked(globals, 1, widths.globals),
        edge_list,
    )
    .expect("random topology is within range")
}

/// Identity weights and zero biases for `num_layers` square layers of `width`.
pub fn identity_mlp_parameters(module: &str, width: usize, num_layers: usize) -> ParameterMap {
    let identity = (0..width * width)
        .map(|i| if i % (width + 1) == 0 { 1.0 } else { 0.0 })
        .collect_vec();
    layer_slot_names(module, num_layers)
        .into_iter()
        .flat_map(|(weight, bias)| [(weight, identity.clone()), (bias, vec![0.0; width])])
        .collect()
}

/// Random weights and biases in `[-1, 1)` for an MLP of `module`.
pub fn random_mlp_parameters(
    module: &str,
    input_width: usize,
    layer_sizes: &[usize],
    seed: u64,
) -> ParameterMap {
    let mut rng = StdRng::seed_from_u64(seed);
    std::iter::once(input_width)
        .chain(layer_sizes.iter().copied())
        .tuple_windows()
        .zip(layer_slot_names(module, layer_sizes.len()))
        .flat_map(|((input, output), (weight, bias))| {
            [
                (weight, random_values(&mut rng, input * output, -1.0, 1.0)),
                (bias, random_values(&mut rng, output, -1.0, 1.0)),
            ]
        })
        .collect()
}

/// Random parameters for every update function of `description`.
pub fn random_parameters(description: &GraphDescription, seed: u64) -> ParameterMap {
    description
        .updates()
        .into_iter()
        .zip(description.update_input_widths())
        .enumerate()
        .flat_map(|(i, (update, input_width))| {
            random_mlp_parameters(
                &update.module,
                input_width,
                &update.layer_sizes,
                seed.wrapping_add(i as u64),
            )
            .into_iter()
        })
        .collect()
}
