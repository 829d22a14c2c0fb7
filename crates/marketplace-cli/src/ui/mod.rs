//! Terminal output helpers.

mod output;
mod prompts;

pub use output::*;
pub use prompts::*;
