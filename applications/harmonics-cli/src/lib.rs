//! Harmonics command-line front end
//!
//! [`args`] turns command-line flags into a pitch function and effect chain;
//! [`output`] drains a finished stream into a WAV file or raw PCM sink.

pub mod args;
pub mod output;

pub use args::{Cli, Commands, RenderArgs};
