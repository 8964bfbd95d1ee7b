use itertools::Itertools;
use tracing::debug_span;

use crate::{
    compiler::{codegen, CompiledModel, GeneratedCode},
    graph::{FeatureWidths, GraphState},
    GnnError, Result,
};

use super::{description::artifact_name, Infer};

/// Compiled models run one after the other, each consuming the output of the
/// previous one.
#[derive(Clone, Debug, Default)]
pub struct GraphStack {
    name: String,
    models: Vec<CompiledModel>,
}

impl GraphStack {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            models: Vec::new(),
        }
    }

    /// Appends `model`, whose input widths must match the output of the current last model.
    pub fn push(&mut self, model: CompiledModel) -> Result<()> {
        if let Some(last) = self.models.last() {
            if last.output_widths() != model.input_widths() {
                return Err(GnnError::Shape(format!(
                    "model '{}' outputs {} but '{}' expects {}",
                    last.name(),
                    last.output_widths(),
                    model.name(),
                    model.input_widths()
                )));
            }
        }
        self.models.push(model);
        Ok(())
    }

    pub fn with_model(mut self, model: CompiledModel) -> Result<Self> {
        self.push(model)?;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn models(&self) -> &[CompiledModel] {
        &self.models
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// A single artifact whose `infer` chains the artifacts of every member, or
    /// `None` if the stack is empty or a member was compiled without artifact.
    pub fn artifact(&self) -> Option<GeneratedCode> {
        if self.models.is_empty() {
            return None;
        }
        let members = self
            .models
            .iter()
            .map(CompiledModel::artifact)
            .collect::<Option<Vec<_>>>()?;
        Some(codegen::render_stack(&artifact_name(&self.name), &members))
    }
}

impl Infer for GraphStack {
    fn infer(&self, state: &mut GraphState) {
        let _span =
            debug_span!("graph_stack", name = %self.name, models = self.models.len()).entered();
        for model in &self.models {
            model.infer(state);
        }
    }

    fn input_widths(&self) -> FeatureWidths {
        self.models
            .first()
            .map(Infer::input_widths)
            .unwrap_or_default()
    }

    fn output_widths(&self) -> FeatureWidths {
        self.models
            .last()
            .map(Infer::output_widths)
            .unwrap_or_default()
    }

    fn describe(&self) -> String {
        format!(
            "Stack {} [{}]",
            self.name,
            self.models.iter().map(CompiledModel::name).join(" -> ")
        )
    }
}
