//! Instruction decode and execution, split the way the rest of this crate
//! splits classification from state mutation: [`decode`] turns an opcode
//! word into an [`decode::Insn`], [`exec`] drives it against a [`crate::core::Core`].

pub mod decode;
pub mod exec;
