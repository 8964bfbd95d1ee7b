use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::{Element, GnnError, Result};

#[derive(Clone, Debug, Serialize, Deserialize, Copy, PartialEq, Eq, Display)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    #[display("identity")]
    Identity,
    #[display("relu")]
    Relu,
    #[display("sigmoid")]
    Sigmoid,
}

impl Activation {
    /// Parses the activation tag used in model descriptions.
    pub fn from_tag(tag: &str) -> Result<Self> {
        match tag {
            "identity" | "linear" => Ok(Activation::Identity),
            "relu" => Ok(Activation::Relu),
            "sigmoid" => Ok(Activation::Sigmoid),
            other => Err(GnnError::UnsupportedFunction(format!(
                "activation '{other}' is not supported"
            ))),
        }
    }

    pub fn apply_in_place(&self, values: &mut [Element]) {
        match self {
            Activation::Identity => {}
            Activation::Relu => values.iter_mut().for_each(|v| *v = Relu::apply(*v)),
            Activation::Sigmoid => values.iter_mut().for_each(|v| *v = Sigmoid::apply(*v)),
        }
    }
}

#[derive(Clone, Debug, Copy)]
pub struct Relu;

impl Relu {
    #[inline(always)]
    pub fn apply(e: Element) -> Element {
        if e.is_sign_negative() { 0.0 } else { e }
    }
}

#[derive(Clone, Debug, Copy)]
pub struct Sigmoid;

impl Sigmoid {
    #[inline(always)]
    pub fn apply(e: Element) -> Element {
        1.0 / (1.0 + (-e).exp())
    }
}
