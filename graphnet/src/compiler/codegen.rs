//! Renders compiled blocks into standalone Rust source.
//!
//! The generated module has no dependency: weights, biases and adjacency are
//! embedded as constants next to a handful of plain loops, and the single entry
//! point `infer(node_data, edge_data, global_data)` rewrites the three flat
//! row-major feature buffers in place.

use std::path::{Path, PathBuf};

use anyhow::Context;
use proc_macro2::{Ident, TokenStream};
use quote::{format_ident, quote};
use tracing::info;

use crate::{
    functions::{Activation, AggregateFunction, Mlp, UpdateFunction},
    model::{EdgeInput, GlobalInput, GraphIndependentBlock, GraphNetworkBlock, Infer, NodeInput},
};

/// A named, self-contained inference module.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneratedCode {
    name: String,
    source: String,
}

impl GeneratedCode {
    fn from_tokens(name: &str, tokens: TokenStream) -> Self {
        Self {
            name: name.to_string(),
            source: tokens.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn file_name(&self) -> String {
        format!("{}.rs", self.name)
    }

    /// Writes the source to `<dir>/<name>.rs`, creating `dir` if needed.
    pub fn write_to<P: AsRef<Path>>(&self, dir: P) -> anyhow::Result<PathBuf> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating output directory {}", dir.display()))?;
        let path = dir.join(self.file_name());
        std::fs::write(&path, &self.source)
            .with_context(|| format!("writing generated code to {}", path.display()))?;
        info!(artifact = %self.name, path = %path.display(), "generated code written");
        Ok(path)
    }
}

fn header(name: &str, summary: &str) -> TokenStream {
    let doc = format!(
        " Inference code for `{name}` ({summary}), generated by graphnet {}. Do not edit.",
        env!("CARGO_PKG_VERSION")
    );
    quote! {
        #![doc = #doc]
        #![allow(dead_code, unused_mut, unused_variables, clippy::all)]
    }
}

fn runtime() -> TokenStream {
    quote! {
        fn dense(input: &[f32], rows: usize, input_width: usize, output_width: usize, weight: &[f32], bias: &[f32]) -> Vec<f32> {
            let mut out = Vec::with_capacity(rows * output_width);
            for r in 0..rows {
                let mut y = bias.to_vec();
                for (i, x) in input[r * input_width..(r + 1) * input_width].iter().enumerate() {
                    for (o, yo) in y.iter_mut().enumerate() {
                        *yo += x * weight[i * output_width + o];
                    }
                }
                out.extend_from_slice(&y);
            }
            out
        }

        fn relu(values: &mut [f32]) {
            for v in values.iter_mut() {
                if v.is_sign_negative() {
                    *v = 0.0;
                }
            }
        }

        fn sigmoid(values: &mut [f32]) {
            for v in values.iter_mut() {
                *v = 1.0 / (1.0 + (-*v).exp());
            }
        }

        fn gather(data: &[f32], width: usize, index: &[usize]) -> Vec<f32> {
            let mut out = Vec::with_capacity(index.len() * width);
            for &i in index {
                out.extend_from_slice(&data[i * width..(i + 1) * width]);
            }
            out
        }

        fn concat(parts: &[(&[f32], usize)], rows: usize) -> Vec<f32> {
            let mut out = Vec::new();
            for r in 0..rows {
                for (data, width) in parts {
                    out.extend_from_slice(&data[r * width..(r + 1) * width]);
                }
            }
            out
        }

        fn segment_reduce(data: &[f32], width: usize, index: &[usize], segments: usize, mean: bool) -> Vec<f32> {
            let mut out = vec![0.0f32; segments * width];
            let mut counts = vec![0usize; segments];
            for (k, &j) in index.iter().enumerate() {
                counts[j] += 1;
                for c in 0..width {
                    out[j * width + c] += data[k * width + c];
                }
            }
            if mean {
                for (j, &count) in counts.iter().enumerate() {
                    if count > 0 {
                        for c in 0..width {
                            out[j * width + c] /= count as f32;
                        }
                    }
                }
            }
            out
        }
    }
}

fn render_activation(activation: Activation) -> TokenStream {
    match activation {
        Activation::Identity => quote! {},
        Activation::Relu => quote! { relu(&mut h); },
        Activation::Sigmoid => quote! { sigmoid(&mut h); },
    }
}

fn render_mlp(fn_ident: &Ident, mlp: &Mlp) -> TokenStream {
    let prefix = fn_ident.to_string().to_uppercase();
    let (consts, steps): (Vec<_>, Vec<_>) = mlp
        .layers()
        .iter()
        .enumerate()
        .map(|(i, layer)| {
            let w = format_ident!("{}_W{}", prefix, i);
            let b = format_ident!("{}_B{}", prefix, i);
            let weight = layer.weight();
            let bias = layer.bias();
            let (w_len, b_len) = (weight.len(), bias.len());
            let (input, output) = (layer.input_width(), layer.output_width());
            let activation = if mlp.activates_after(i) {
                render_activation(mlp.activation())
            } else {
                quote! {}
            };
            (
                quote! {
                    const #w: [f32; #w_len] = [#(#weight),*];
                    const #b: [f32; #b_len] = [#(#bias),*];
                },
                quote! {
                    let mut h = dense(&h, rows, #input, #output, &#w, &#b);
                    #activation
                },
            )
        })
        .unzip();
    quote! {
        #(#consts)*

        fn #fn_ident(input: &[f32], rows: usize) -> Vec<f32> {
            let h = input.to_vec();
            #(#steps)*
            h
        }
    }
}

fn render_update(fn_name: &str, function: &UpdateFunction) -> TokenStream {
    let fn_ident = format_ident!("{}", fn_name);
    match function {
        UpdateFunction::Mlp(mlp) => render_mlp(&fn_ident, mlp),
    }
}

fn is_mean(aggregate: AggregateFunction) -> bool {
    matches!(aggregate, AggregateFunction::Mean)
}

pub(crate) fn render_network(
    name: &str,
    block: &GraphNetworkBlock,
    num_nodes: usize,
    senders: &[usize],
    receivers: &[usize],
) -> GeneratedCode {
    let widths = block.input_widths();
    let (node_w, edge_w, global_w) = (widths.nodes, widths.edges, widths.globals);
    let edge_out = block.edge_update().output_width();
    let node_out = block.node_update().output_width();
    let num_edges = senders.len();

    let edge_parts = block.inputs().edge.iter().map(|input| match input {
        EdgeInput::Edges => quote! { (&edge_data[..], #edge_w) },
        EdgeInput::Senders => quote! { (&gather(&node_data[..], #node_w, &SENDERS)[..], #node_w) },
        EdgeInput::Receivers => {
            quote! { (&gather(&node_data[..], #node_w, &RECEIVERS)[..], #node_w) }
        }
        EdgeInput::Globals => {
            quote! { (&gather(&global_data[..], #global_w, &[0usize; NUM_EDGES])[..], #global_w) }
        }
    });
    let node_parts = block.inputs().node.iter().map(|input| match input {
        NodeInput::Nodes => quote! { (&node_data[..], #node_w) },
        NodeInput::ReceivedEdges => quote! { (&received[..], #edge_out) },
        NodeInput::Globals => {
            quote! { (&gather(&global_data[..], #global_w, &[0usize; NUM_NODES])[..], #global_w) }
        }
    });
    let global_parts = block.inputs().global.iter().map(|input| match input {
        GlobalInput::Globals => quote! { (&global_data[..], #global_w) },
        GlobalInput::Nodes => quote! { (&node_summary[..], #node_out) },
        GlobalInput::Edges => quote! { (&edge_summary[..], #edge_out) },
    });

    let edge_node_mean = is_mean(block.edge_node_aggregate());
    let node_global_mean = is_mean(block.node_global_aggregate());
    let edge_global_mean = is_mean(block.edge_global_aggregate());

    let header = header(name, "graph network");
    let runtime = runtime();
    let edge_update = render_update("edge_update", block.edge_update());
    let node_update = render_update("node_update", block.node_update());
    let global_update = render_update("global_update", block.global_update());

    let tokens = quote! {
        #header

        pub const NUM_NODES: usize = #num_nodes;
        pub const NUM_EDGES: usize = #num_edges;
        pub const SENDERS: [usize; NUM_EDGES] = [#(#senders),*];
        pub const RECEIVERS: [usize; NUM_EDGES] = [#(#receivers),*];

        /// Runs one message passing round on row-major node, edge and global buffers.
        pub fn infer(node_data: &mut Vec<f32>, edge_data: &mut Vec<f32>, global_data: &mut Vec<f32>) {
            let edge_input = concat(&[#(#edge_parts),*], NUM_EDGES);
            *edge_data = edge_update(&edge_input, NUM_EDGES);

            let received = segment_reduce(&edge_data[..], #edge_out, &RECEIVERS, NUM_NODES, #edge_node_mean);
            let node_input = concat(&[#(#node_parts),*], NUM_NODES);
            *node_data = node_update(&node_input, NUM_NODES);

            let node_summary = segment_reduce(&node_data[..], #node_out, &[0usize; NUM_NODES], 1, #node_global_mean);
            let edge_summary = segment_reduce(&edge_data[..], #edge_out, &[0usize; NUM_EDGES], 1, #edge_global_mean);
            let global_input = concat(&[#(#global_parts),*], 1);
            *global_data = global_update(&global_input, 1);
        }

        #edge_update
        #node_update
        #global_update
        #runtime
    };
    GeneratedCode::from_tokens(name, tokens)
}

pub(crate) fn render_independent(name: &str, block: &GraphIndependentBlock) -> GeneratedCode {
    let widths = block.input_widths();
    let (node_w, edge_w, global_w) = (widths.nodes, widths.edges, widths.globals);
    let header = header(name, "graph independent");
    let runtime = runtime();
    let edge_update = render_update("edge_update", block.edge_update());
    let node_update = render_update("node_update", block.node_update());
    let global_update = render_update("global_update", block.global_update());

    let tokens = quote! {
        #header

        /// Updates node, edge and global rows independently of each other.
        pub fn infer(node_data: &mut Vec<f32>, edge_data: &mut Vec<f32>, global_data: &mut Vec<f32>) {
            let edges = edge_data.len() / #edge_w;
            *edge_data = edge_update(&edge_data[..], edges);
            let nodes = node_data.len() / #node_w;
            *node_data = node_update(&node_data[..], nodes);
            let globals = global_data.len() / #global_w;
            *global_data = global_update(&global_data[..], globals);
        }

        #edge_update
        #node_update
        #global_update
        #runtime
    };
    GeneratedCode::from_tokens(name, tokens)
}

/// Inlines every member as a module and chains their `infer` in order.
pub(crate) fn render_stack(name: &str, members: &[&GeneratedCode]) -> GeneratedCode {
    let mut modules: Vec<String> = Vec::with_capacity(members.len());
    for (i, member) in members.iter().enumerate() {
        let module = if modules.iter().any(|m| m == member.name()) {
            format!("{}_{i}", member.name())
        } else {
            member.name().to_string()
        };
        modules.push(module);
    }
    let idents = modules.iter().map(|m| format_ident!("{}", m));
    let header = header(name, "stack");
    let tokens = quote! {
        #header

        /// Runs every member model in order.
        pub fn infer(node_data: &mut Vec<f32>, edge_data: &mut Vec<f32>, global_data: &mut Vec<f32>) {
            #(self::#idents::infer(node_data, edge_data, global_data);)*
        }
    };
    let mut source = tokens.to_string();
    for (module, member) in modules.iter().zip(members) {
        source.push_str(&format!("\n\npub mod {module} {{\n{}\n}}\n", member.source()));
    }
    GeneratedCode {
        name: name.to_string(),
        source,
    }
}
