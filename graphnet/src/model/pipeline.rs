use tracing::{debug, debug_span};

use crate::{
    graph::{FeatureWidths, GraphState},
    GnnError, Result,
};

use super::Infer;

type Model = Box<dyn Infer + Send + Sync>;

/// Encode, process `steps` times, decode.
///
/// The encoder output is kept as `latent0`. Every step feeds the concatenation of
/// `latent0` and the current latent graph to the core, decodes the core output and
/// optionally transforms it, collecting one output per step.
pub struct EncodeProcessDecode {
    encoder: Model,
    core: Model,
    decoder: Model,
    output_transform: Option<Model>,
}

fn check_widths(what: &str, expected: FeatureWidths, actual: FeatureWidths) -> Result<()> {
    if expected != actual {
        return Err(GnnError::Shape(format!(
            "{what} expects {expected} but is fed {actual}"
        )));
    }
    Ok(())
}

impl EncodeProcessDecode {
    /// The core must consume two encoder outputs side by side and produce one, the
    /// decoder must consume the core output.
    pub fn new<E, C, D>(encoder: E, core: C, decoder: D) -> Result<Self>
    where
        E: Infer + Send + Sync + 'static,
        C: Infer + Send + Sync + 'static,
        D: Infer + Send + Sync + 'static,
    {
        let latent = encoder.output_widths();
        check_widths("core", core.input_widths(), latent + latent)?;
        check_widths("core output", latent, core.output_widths())?;
        check_widths("decoder", decoder.input_widths(), core.output_widths())?;
        Ok(Self {
            encoder: Box::new(encoder),
            core: Box::new(core),
            decoder: Box::new(decoder),
            output_transform: None,
        })
    }

    pub fn with_output_transform<T>(mut self, transform: T) -> Result<Self>
    where
        T: Infer + Send + Sync + 'static,
    {
        check_widths(
            "output transform",
            transform.input_widths(),
            self.decoder.output_widths(),
        )?;
        self.output_transform = Some(Box::new(transform));
        Ok(self)
    }

    pub fn input_widths(&self) -> FeatureWidths {
        self.encoder.input_widths()
    }

    pub fn output_widths(&self) -> FeatureWidths {
        self.output_transform
            .as_ref()
            .unwrap_or(&self.decoder)
            .output_widths()
    }

    /// Runs the loop on a copy of `input` and returns one decoded graph per step.
    pub fn run(&self, input: &GraphState, steps: usize) -> Result<Vec<GraphState>> {
        let _span = debug_span!("encode_process_decode", steps).entered();
        let mut latent = input.copy();
        self.encoder.try_infer(&mut latent)?;
        let latent0 = latent.copy();

        let mut outputs = Vec::with_capacity(steps);
        for step in 0..steps {
            let mut core_state = latent0.concatenate(&latent)?;
            self.core.infer(&mut core_state);
            latent = core_state;

            let mut decoded = latent.copy();
            self.decoder.infer(&mut decoded);
            if let Some(transform) = &self.output_transform {
                transform.infer(&mut decoded);
            }
            debug!(step, widths = %decoded.widths(), "processing step decoded");
            outputs.push(decoded);
        }
        Ok(outputs)
    }
}

impl std::fmt::Debug for EncodeProcessDecode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodeProcessDecode")
            .field("encoder", &self.encoder.describe())
            .field("core", &self.core.describe())
            .field("decoder", &self.decoder.describe())
            .field(
                "output_transform",
                &self.output_transform.as_ref().map(|t| t.describe()),
            )
            .finish()
    }
}
