//! Model extraction: surface syntax in, resolved [`ContractModel`] out.

pub mod ast;
pub mod model;
mod resolve;

pub use model::*;
pub use resolve::extract;
