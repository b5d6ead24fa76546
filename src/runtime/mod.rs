//! Runtime system
//!
//! Animation contexts, their script threads, the cooperative scheduler that
//! interleaves them, and the seams to script evaluation and the external
//! solver.

pub mod backend;
pub mod context;
pub mod errors;
pub mod eval;
pub mod scheduler;
pub mod scope;
pub mod value;
