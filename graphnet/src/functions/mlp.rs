//! Multilayer perceptron update function.

use itertools::Itertools;
use tracing::trace;

use crate::{
    parameters::{layer_slot_names, ParameterMap, WeightLayout},
    tensor::TensorBuffer,
    Element, GnnError, Result,
};

use super::activation::Activation;

/// Affine layer `y = x·W + b`, `W` stored `[input_width, output_width]` row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct Dense {
    weight: Vec<Element>,
    bias: Vec<Element>,
    input_width: usize,
    output_width: usize,
}

impl Dense {
    pub fn new(
        weight: Vec<Element>,
        bias: Vec<Element>,
        input_width: usize,
        output_width: usize,
    ) -> Result<Self> {
        if weight.len() != input_width * output_width {
            return Err(GnnError::ParameterMismatch(format!(
                "Dense weight has {} values, expected {input_width}x{output_width}",
                weight.len()
            )));
        }
        if bias.len() != output_width {
            return Err(GnnError::ParameterMismatch(format!(
                "Dense bias has {} values, expected {output_width}",
                bias.len()
            )));
        }
        Ok(Self {
            weight,
            bias,
            input_width,
            output_width,
        })
    }

    pub fn input_width(&self) -> usize {
        self.input_width
    }

    pub fn output_width(&self) -> usize {
        self.output_width
    }

    pub fn weight(&self) -> &[Element] {
        &self.weight
    }

    pub fn bias(&self) -> &[Element] {
        &self.bias
    }

    /// Evaluates the layer on a single row.
    pub fn apply_row(&self, x: &[Element], out: &mut [Element]) {
        debug_assert_eq!(x.len(), self.input_width);
        out.copy_from_slice(&self.bias);
        for (xi, w_row) in x.iter().zip(self.weight.chunks_exact(self.output_width.max(1))) {
            for (o, w) in out.iter_mut().zip(w_row) {
                *o += xi * w;
            }
        }
    }
}

/// Sequence of dense layers with an activation after every hidden layer, and after
/// the last one when `activate_final` is set.
#[derive(Clone, Debug, PartialEq)]
pub struct Mlp {
    layers: Vec<Dense>,
    activation: Activation,
    activate_final: bool,
}

impl Mlp {
    pub fn new(layers: Vec<Dense>, activation: Activation, activate_final: bool) -> Result<Self> {
        if layers.is_empty() {
            return Err(GnnError::ParameterMismatch(
                "an MLP needs at least one layer".to_string(),
            ));
        }
        if let Some((i, (a, b))) = layers
            .iter()
            .tuple_windows()
            .enumerate()
            .find(|(_, (a, b))| a.output_width != b.input_width)
        {
            return Err(GnnError::Shape(format!(
                "MLP layer {i} outputs {} features but layer {} expects {}",
                a.output_width,
                i + 1,
                b.input_width
            )));
        }
        Ok(Self {
            layers,
            activation,
            activate_final,
        })
    }

    /// Binds the layers of the MLP declared under `module` from `params`. Bound
    /// tensors are removed from the map.
    pub fn from_parameters(
        module: &str,
        input_width: usize,
        layer_sizes: &[usize],
        layout: WeightLayout,
        activation: Activation,
        activate_final: bool,
        params: &mut ParameterMap,
    ) -> Result<Self> {
        let widths = std::iter::once(input_width).chain(layer_sizes.iter().copied());
        let layers = widths
            .tuple_windows()
            .zip(layer_slot_names(module, layer_sizes.len()))
            .map(|((input, output), (weight_name, bias_name))| {
                let weight = params.take(&weight_name, input * output)?;
                let bias = params.take(&bias_name, output)?;
                trace!(module, weight = %weight_name, input, output, "binding dense layer");
                Dense::new(layout.to_in_out(weight, input, output), bias, input, output)
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(layers, activation, activate_final)
    }

    pub fn layers(&self) -> &[Dense] {
        &self.layers
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn activate_final(&self) -> bool {
        self.activate_final
    }

    pub fn input_width(&self) -> usize {
        self.layers[0].input_width
    }

    pub fn output_width(&self) -> usize {
        self.layers[self.layers.len() - 1].output_width
    }

    /// Whether the activation runs after layer `index`.
    pub fn activates_after(&self, index: usize) -> bool {
        index + 1 < self.layers.len() || self.activate_final
    }

    pub fn forward_row(&self, x: &[Element]) -> Vec<Element> {
        let mut current = x.to_vec();
        for (i, layer) in self.layers.iter().enumerate() {
            let mut next = vec![0.0; layer.output_width];
            layer.apply_row(&current, &mut next);
            if self.activates_after(i) {
                self.activation.apply_in_place(&mut next);
            }
            current = next;
        }
        current
    }

    /// Applies the MLP to every row of `input` independently.
    pub fn apply(&self, input: &TensorBuffer) -> TensorBuffer {
        input.map_rows(self.output_width(), |row, out| {
            out.copy_from_slice(&self.forward_row(row))
        })
    }

    pub fn describe(&self) -> String {
        let sizes = std::iter::once(self.input_width())
            .chain(self.layers.iter().map(Dense::output_width))
            .join(" -> ");
        format!(
            "MLP [{sizes}] activation: {}{}",
            self.activation,
            if self.activate_final { " (final)" } else { "" }
        )
    }
}
