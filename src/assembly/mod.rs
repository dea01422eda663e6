//! CIL instruction model.
//!
//! Method bodies in a [`crate::Module`] are lists of [`Instruction`]s. This module defines
//! the opcode table ([`OpCode`]), operands and the per-instruction stack and flow
//! information that the rewriter relies on.
//!
//! # Key Components
//!
//! - [`OpCode`] - Opcode table with mnemonics, encodings and fixed stack effects
//! - [`Instruction`] - An opcode with its [`Operand`]
//! - [`StackBehavior`] - Pops, pushes and net stack effect
//! - [`FlowType`] - Control flow classification

mod instruction;
mod opcodes;

pub use instruction::{FlowType, Immediate, Instruction, Operand, StackBehavior};
pub use opcodes::OpCode;
