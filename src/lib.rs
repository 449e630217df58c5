// Two-sided probabilistic latent semantic analysis (PLSA)

#![doc = include_str!("../README.md")]

mod error;
mod plsa;

pub use error::{PlsaError, Result};
pub use plsa::Plsa;

#[cfg(test)]
mod plsa_tests;
