//! The intermediate representation: a flat, indexable opcode list built
//! from the token stream (`builder`) and its node shape (`node`).

pub mod builder;
pub mod node;

pub use builder::build;
pub use node::{Op, Program};
