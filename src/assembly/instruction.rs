//! CIL instructions as held in a method body.
//!
//! Unlike a byte-level disassembly, an [`Instruction`] here is position independent:
//! branch targets ([`Operand::Target`], [`Operand::Switch`]) are indices into the owning
//! instruction list. Inserting instructions therefore only requires remapping those
//! indices (see [`Instruction::remap_targets`]), never re-encoding offsets.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    assembly::OpCode,
    metadata::{token::Token, userstring::UserString},
};

/// Immediate values embedded in an instruction.
///
/// ```rust
/// use dotstub::assembly::Immediate;
///
/// let as_u64: u64 = Immediate::UInt8(42).into();
/// assert_eq!(as_u64, 42);
/// assert_eq!(Immediate::Int8(-3).as_i32(), Some(-3));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Immediate {
    /// Signed 8-bit immediate value
    Int8(i8),
    /// Unsigned 8-bit immediate value
    UInt8(u8),
    /// Signed 16-bit immediate value
    Int16(i16),
    /// Unsigned 16-bit immediate value
    UInt16(u16),
    /// Signed 32-bit immediate value
    Int32(i32),
    /// Unsigned 32-bit immediate value
    UInt32(u32),
    /// Signed 64-bit immediate value
    Int64(i64),
    /// Unsigned 64-bit immediate value
    UInt64(u64),
    /// 32-bit floating point immediate value
    Float32(f32),
    /// 64-bit floating point immediate value
    Float64(f64),
}

impl Immediate {
    /// The value as `i32`, if it is an integer that fits
    #[must_use]
    pub fn as_i32(&self) -> Option<i32> {
        match *self {
            Immediate::Int8(value) => Some(i32::from(value)),
            Immediate::UInt8(value) => Some(i32::from(value)),
            Immediate::Int16(value) => Some(i32::from(value)),
            Immediate::UInt16(value) => Some(i32::from(value)),
            Immediate::Int32(value) => Some(value),
            Immediate::UInt32(value) => i32::try_from(value).ok(),
            Immediate::Int64(value) => i32::try_from(value).ok(),
            Immediate::UInt64(value) => i32::try_from(value).ok(),
            Immediate::Float32(_) | Immediate::Float64(_) => None,
        }
    }
}

impl From<Immediate> for u64 {
    fn from(val: Immediate) -> Self {
        match val {
            // Signed values keep their bit pattern
            #[allow(clippy::cast_sign_loss)]
            Immediate::Int8(value) => value as u64,
            Immediate::UInt8(value) => u64::from(value),
            #[allow(clippy::cast_sign_loss)]
            Immediate::Int16(value) => value as u64,
            Immediate::UInt16(value) => u64::from(value),
            #[allow(clippy::cast_sign_loss)]
            Immediate::Int32(value) => value as u64,
            Immediate::UInt32(value) => u64::from(value),
            #[allow(clippy::cast_sign_loss)]
            Immediate::Int64(value) => value as u64,
            Immediate::UInt64(value) => value,
            Immediate::Float32(value) => u64::from(value.to_bits()),
            Immediate::Float64(value) => value.to_bits(),
        }
    }
}

/// The operand of an instruction.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Operand {
    /// No operand present
    #[default]
    None,
    /// Immediate value (constant embedded in instruction)
    Immediate(Immediate),
    /// String literal of an `ldstr`, as raw UTF-16
    String(UserString),
    /// Metadata token reference
    Token(Token),
    /// Local variable index
    Local(u16),
    /// Method argument index
    Argument(u16),
    /// Branch target, as an index into the instruction list
    Target(usize),
    /// Switch table, as indices into the instruction list
    Switch(Vec<usize>),
}

impl Operand {
    /// Returns a formatted string representation of the operand, `None` for [`Operand::None`]
    ///
    /// ```rust
    /// use dotstub::assembly::{Immediate, Operand};
    /// use dotstub::metadata::token::Token;
    ///
    /// assert_eq!(Operand::None.as_string(), None);
    /// assert_eq!(Operand::Immediate(Immediate::Int32(42)).as_string(), Some("42".to_string()));
    /// assert_eq!(Operand::Target(3).as_string(), Some("IL_0003".to_string()));
    /// assert_eq!(Operand::Token(Token::new(0x06000001)).as_string(), Some("0x06000001".to_string()));
    /// assert_eq!(Operand::Local(5).as_string(), Some("V_5".to_string()));
    /// ```
    #[must_use]
    pub fn as_string(&self) -> Option<String> {
        match self {
            Operand::None => None,
            Operand::Immediate(imm) => Some(match imm {
                Immediate::Float32(value) => value.to_string(),
                Immediate::Float64(value) => value.to_string(),
                other => other.as_i32().map_or_else(|| format!("{other:?}"), |v| v.to_string()),
            }),
            Operand::String(value) => Some(format!("{value:?}")),
            Operand::Token(t) => Some(format!("0x{:08x}", t.value())),
            Operand::Local(l) => Some(format!("V_{l}")),
            Operand::Argument(a) => Some(format!("A_{a}")),
            Operand::Target(t) => Some(format!("IL_{t:04}")),
            Operand::Switch(targets) => Some(format!("switch({})", targets.len())),
        }
    }
}

/// How an instruction affects control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    /// Normal execution continues to next instruction
    Sequential,
    /// Conditional branch to another location
    ConditionalBranch,
    /// Always branches to another location (unconditional jump)
    UnconditionalBranch,
    /// Call to another method
    Call,
    /// Returns from current method
    Return,
    /// Multi-way branch (switch statement)
    Switch,
    /// Exception throwing
    Throw,
    /// End of finally block
    EndFinally,
    /// Leave protected region (try/catch/finally)
    Leave,
}

/// Stack effect of an instruction.
///
/// ```rust
/// use dotstub::assembly::StackBehavior;
///
/// // 'add' pops 2 values and pushes 1
/// let add_behavior = StackBehavior { pops: 2, pushes: 1, net_effect: -1 };
/// assert_eq!(add_behavior.net_effect, -1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackBehavior {
    /// Number of items popped from stack
    pub pops: u8,
    /// Number of items pushed to stack
    pub pushes: u8,
    /// Net effect on stack depth (pushes - pops)
    pub net_effect: i8,
}

impl StackBehavior {
    /// Builds a behavior from pop and push counts
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn new(pops: u8, pushes: u8) -> Self {
        StackBehavior {
            pops,
            pushes,
            net_effect: pushes as i8 - pops as i8,
        }
    }
}

/// A single CIL instruction.
///
/// # Examples
///
/// ```rust
/// use dotstub::assembly::{Instruction, OpCode};
///
/// let load = Instruction::ldstr("Hi");
/// assert!(load.as_string_operand().is_some_and(|s| s == "Hi"));
///
/// // ldc.i4 picks the shortest encoding
/// assert_eq!(Instruction::ldc_i4(3).opcode, OpCode::LdcI4_3);
/// assert_eq!(Instruction::ldc_i4(100).opcode, OpCode::LdcI4S);
/// assert_eq!(Instruction::ldc_i4(1000).opcode, OpCode::LdcI4);
/// assert_eq!(Instruction::ldc_i4(1000).int_constant(), Some(1000));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    /// The opcode
    pub opcode: OpCode,
    /// The operand, [`Operand::None`] for opcodes without one
    #[serde(default, skip_serializing_if = "Operand::is_none")]
    pub operand: Operand,
}

impl Operand {
    /// Returns true for [`Operand::None`]
    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Operand::None)
    }
}

impl Instruction {
    /// Creates an instruction from an opcode and an operand
    #[must_use]
    pub fn new(opcode: OpCode, operand: Operand) -> Self {
        Instruction { opcode, operand }
    }

    /// Creates an instruction without an operand
    #[must_use]
    pub fn simple(opcode: OpCode) -> Self {
        Instruction {
            opcode,
            operand: Operand::None,
        }
    }

    /// `ldstr` with the given literal
    #[must_use]
    pub fn ldstr(value: impl Into<UserString>) -> Self {
        Instruction::new(OpCode::Ldstr, Operand::String(value.into()))
    }

    /// `call` to the given method
    #[must_use]
    pub fn call(method: Token) -> Self {
        Instruction::new(OpCode::Call, Operand::Token(method))
    }

    /// `newobj` with the given constructor
    #[must_use]
    pub fn newobj(ctor: Token) -> Self {
        Instruction::new(OpCode::Newobj, Operand::Token(ctor))
    }

    /// Loads an `int32` constant with the shortest encoding.
    ///
    /// - `ldc.i4.m1` through `ldc.i4.8` for -1..=8 (1 byte)
    /// - `ldc.i4.s` for -128..=127 (2 bytes)
    /// - `ldc.i4` otherwise (5 bytes)
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn ldc_i4(value: i32) -> Self {
        match value {
            -1 => Instruction::simple(OpCode::LdcI4M1),
            0 => Instruction::simple(OpCode::LdcI4_0),
            1 => Instruction::simple(OpCode::LdcI4_1),
            2 => Instruction::simple(OpCode::LdcI4_2),
            3 => Instruction::simple(OpCode::LdcI4_3),
            4 => Instruction::simple(OpCode::LdcI4_4),
            5 => Instruction::simple(OpCode::LdcI4_5),
            6 => Instruction::simple(OpCode::LdcI4_6),
            7 => Instruction::simple(OpCode::LdcI4_7),
            8 => Instruction::simple(OpCode::LdcI4_8),
            x if (-128..=127).contains(&x) => Instruction::new(
                OpCode::LdcI4S,
                Operand::Immediate(Immediate::Int8(x as i8)),
            ),
            x => Instruction::new(OpCode::LdcI4, Operand::Immediate(Immediate::Int32(x))),
        }
    }

    /// The literal of an `ldstr`, `None` for any other instruction
    #[must_use]
    pub fn as_string_operand(&self) -> Option<&UserString> {
        match (&self.opcode, &self.operand) {
            (OpCode::Ldstr, Operand::String(value)) => Some(value),
            _ => None,
        }
    }

    /// The value pushed by any `ldc.i4` form, `None` for any other instruction
    #[must_use]
    pub fn int_constant(&self) -> Option<i32> {
        match self.opcode {
            OpCode::LdcI4M1 => Some(-1),
            OpCode::LdcI4_0 => Some(0),
            OpCode::LdcI4_1 => Some(1),
            OpCode::LdcI4_2 => Some(2),
            OpCode::LdcI4_3 => Some(3),
            OpCode::LdcI4_4 => Some(4),
            OpCode::LdcI4_5 => Some(5),
            OpCode::LdcI4_6 => Some(6),
            OpCode::LdcI4_7 => Some(7),
            OpCode::LdcI4_8 => Some(8),
            OpCode::LdcI4S | OpCode::LdcI4 => match &self.operand {
                Operand::Immediate(imm) => imm.as_i32(),
                _ => None,
            },
            _ => None,
        }
    }

    /// The metadata token operand, if any
    #[must_use]
    pub fn token(&self) -> Option<Token> {
        match self.operand {
            Operand::Token(token) => Some(token),
            _ => None,
        }
    }

    /// How this instruction affects control flow
    #[must_use]
    pub fn flow_type(&self) -> FlowType {
        self.opcode.flow_type()
    }

    /// Returns true for conditional, unconditional and switch branches as well as `leave`
    #[must_use]
    pub fn is_branch(&self) -> bool {
        matches!(
            self.flow_type(),
            FlowType::ConditionalBranch
                | FlowType::UnconditionalBranch
                | FlowType::Switch
                | FlowType::Leave
        )
    }

    /// Instruction indices this instruction may transfer control to
    #[must_use]
    pub fn branch_targets(&self) -> Vec<usize> {
        match &self.operand {
            Operand::Target(target) => vec![*target],
            Operand::Switch(targets) => targets.clone(),
            _ => Vec::new(),
        }
    }

    /// Rewrites every branch target through `map`
    pub fn remap_targets(&mut self, map: impl Fn(usize) -> usize) {
        match &mut self.operand {
            Operand::Target(target) => *target = map(*target),
            Operand::Switch(targets) => {
                for target in targets.iter_mut() {
                    *target = map(*target);
                }
            }
            _ => {}
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operand.as_string() {
            Some(operand) => write!(f, "{} {}", self.opcode, operand),
            None => write!(f, "{}", self.opcode),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ldc_i4_encodings() {
        for value in -1..=8 {
            let instr = Instruction::ldc_i4(value);
            assert!(instr.operand.is_none());
            assert_eq!(instr.int_constant(), Some(value));
        }

        let short = Instruction::ldc_i4(-128);
        assert_eq!(short.opcode, OpCode::LdcI4S);
        assert_eq!(short.int_constant(), Some(-128));

        let long = Instruction::ldc_i4(128);
        assert_eq!(long.opcode, OpCode::LdcI4);
        assert_eq!(long.int_constant(), Some(128));
    }

    #[test]
    fn string_operand_only_for_ldstr() {
        assert!(Instruction::ldstr("a\0b")
            .as_string_operand()
            .is_some_and(|s| s == "a\0b"));
        let odd = Instruction::new(OpCode::Nop, Operand::String("x".into()));
        assert_eq!(odd.as_string_operand(), None);
    }

    #[test]
    fn remap_branch_and_switch() {
        let mut br = Instruction::new(OpCode::Br, Operand::Target(5));
        br.remap_targets(|i| i + 2);
        assert_eq!(br.branch_targets(), vec![7]);

        let mut switch = Instruction::new(OpCode::Switch, Operand::Switch(vec![1, 4, 9]));
        switch.remap_targets(|i| if i > 3 { i + 2 } else { i });
        assert_eq!(switch.branch_targets(), vec![1, 6, 11]);
        assert!(switch.is_branch());

        let mut ret = Instruction::simple(OpCode::Ret);
        ret.remap_targets(|i| i + 1);
        assert!(ret.branch_targets().is_empty());
    }

    #[test]
    fn display() {
        assert_eq!(Instruction::ldstr("Hi").to_string(), "ldstr \"Hi\"");
        assert_eq!(Instruction::simple(OpCode::Ret).to_string(), "ret");
        assert_eq!(
            Instruction::call(Token::new(0x06000003)).to_string(),
            "call 0x06000003"
        );
    }

    #[test]
    fn display_lone_surrogate() {
        let load = Instruction::ldstr(UserString::from_units(vec![0xD800]));
        assert_eq!(load.to_string(), "ldstr [55296]");
    }

    #[test]
    fn serde_shape() {
        let json = serde_json::to_string(&Instruction::ldstr("Hi")).unwrap();
        assert_eq!(json, r#"{"opcode":"ldstr","operand":{"String":"Hi"}}"#);

        let ret: Instruction = serde_json::from_str(r#"{"opcode":"ret"}"#).unwrap();
        assert_eq!(ret, Instruction::simple(OpCode::Ret));

        assert!(serde_json::from_str::<Instruction>(r#"{"opcode":"ldfoo"}"#).is_err());

        let lone: Instruction =
            serde_json::from_str(r#"{"opcode":"ldstr","operand":{"String":"\udc00!"}}"#).unwrap();
        assert_eq!(
            lone.as_string_operand().map(UserString::units),
            Some(&[0xDC00, u16::from(b'!')][..])
        );
        assert_eq!(
            serde_json::to_string(&lone).unwrap(),
            r#"{"opcode":"ldstr","operand":{"String":[56320,33]}}"#
        );
    }
}
