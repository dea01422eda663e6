//! CIL opcodes (ECMA-335 III).
//!
//! [`OpCode`] covers the instruction set the module graph carries. Each opcode knows its
//! mnemonic (via `strum`), its raw encoding and, where it does not depend on a callee
//! signature, its stack behavior.

use serde::{Deserialize, Serialize};
use strum::{EnumIter, EnumString, IntoStaticStr};

use crate::assembly::instruction::{FlowType, StackBehavior};

/// A CIL opcode.
///
/// Serialized by mnemonic, e.g. `"ldc.i4.s"`.
///
/// ```rust
/// use dotstub::assembly::OpCode;
///
/// let op: OpCode = "ldstr".parse().unwrap();
/// assert_eq!(op, OpCode::Ldstr);
/// assert_eq!(op.mnemonic(), "ldstr");
/// assert_eq!(op.encoding(), (0, 0x72));
/// ```
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    IntoStaticStr,
    EnumIter,
    strum::Display,
    Serialize,
    Deserialize,
)]
#[serde(try_from = "String", into = "String")]
#[allow(missing_docs)]
pub enum OpCode {
    #[strum(serialize = "nop")]
    Nop,
    #[strum(serialize = "break")]
    Break,
    #[strum(serialize = "ldarg.0")]
    Ldarg0,
    #[strum(serialize = "ldarg.1")]
    Ldarg1,
    #[strum(serialize = "ldarg.2")]
    Ldarg2,
    #[strum(serialize = "ldarg.3")]
    Ldarg3,
    #[strum(serialize = "ldloc.0")]
    Ldloc0,
    #[strum(serialize = "ldloc.1")]
    Ldloc1,
    #[strum(serialize = "ldloc.2")]
    Ldloc2,
    #[strum(serialize = "ldloc.3")]
    Ldloc3,
    #[strum(serialize = "stloc.0")]
    Stloc0,
    #[strum(serialize = "stloc.1")]
    Stloc1,
    #[strum(serialize = "stloc.2")]
    Stloc2,
    #[strum(serialize = "stloc.3")]
    Stloc3,
    #[strum(serialize = "ldarg.s")]
    LdargS,
    #[strum(serialize = "ldarga.s")]
    LdargaS,
    #[strum(serialize = "starg.s")]
    StargS,
    #[strum(serialize = "ldloc.s")]
    LdlocS,
    #[strum(serialize = "ldloca.s")]
    LdlocaS,
    #[strum(serialize = "stloc.s")]
    StlocS,
    #[strum(serialize = "ldnull")]
    Ldnull,
    #[strum(serialize = "ldc.i4.m1")]
    LdcI4M1,
    #[strum(serialize = "ldc.i4.0")]
    LdcI4_0,
    #[strum(serialize = "ldc.i4.1")]
    LdcI4_1,
    #[strum(serialize = "ldc.i4.2")]
    LdcI4_2,
    #[strum(serialize = "ldc.i4.3")]
    LdcI4_3,
    #[strum(serialize = "ldc.i4.4")]
    LdcI4_4,
    #[strum(serialize = "ldc.i4.5")]
    LdcI4_5,
    #[strum(serialize = "ldc.i4.6")]
    LdcI4_6,
    #[strum(serialize = "ldc.i4.7")]
    LdcI4_7,
    #[strum(serialize = "ldc.i4.8")]
    LdcI4_8,
    #[strum(serialize = "ldc.i4.s")]
    LdcI4S,
    #[strum(serialize = "ldc.i4")]
    LdcI4,
    #[strum(serialize = "ldc.i8")]
    LdcI8,
    #[strum(serialize = "ldc.r4")]
    LdcR4,
    #[strum(serialize = "ldc.r8")]
    LdcR8,
    #[strum(serialize = "dup")]
    Dup,
    #[strum(serialize = "pop")]
    Pop,
    #[strum(serialize = "call")]
    Call,
    #[strum(serialize = "ret")]
    Ret,
    #[strum(serialize = "br.s")]
    BrS,
    #[strum(serialize = "brfalse.s")]
    BrfalseS,
    #[strum(serialize = "brtrue.s")]
    BrtrueS,
    #[strum(serialize = "beq.s")]
    BeqS,
    #[strum(serialize = "bne.un.s")]
    BneUnS,
    #[strum(serialize = "br")]
    Br,
    #[strum(serialize = "brfalse")]
    Brfalse,
    #[strum(serialize = "brtrue")]
    Brtrue,
    #[strum(serialize = "beq")]
    Beq,
    #[strum(serialize = "bne.un")]
    BneUn,
    #[strum(serialize = "switch")]
    Switch,
    #[strum(serialize = "add")]
    Add,
    #[strum(serialize = "sub")]
    Sub,
    #[strum(serialize = "mul")]
    Mul,
    #[strum(serialize = "div")]
    Div,
    #[strum(serialize = "rem")]
    Rem,
    #[strum(serialize = "and")]
    And,
    #[strum(serialize = "or")]
    Or,
    #[strum(serialize = "xor")]
    Xor,
    #[strum(serialize = "shl")]
    Shl,
    #[strum(serialize = "shr")]
    Shr,
    #[strum(serialize = "neg")]
    Neg,
    #[strum(serialize = "not")]
    Not,
    #[strum(serialize = "conv.i4")]
    ConvI4,
    #[strum(serialize = "conv.i8")]
    ConvI8,
    #[strum(serialize = "callvirt")]
    Callvirt,
    #[strum(serialize = "ldstr")]
    Ldstr,
    #[strum(serialize = "newobj")]
    Newobj,
    #[strum(serialize = "castclass")]
    Castclass,
    #[strum(serialize = "isinst")]
    Isinst,
    #[strum(serialize = "throw")]
    Throw,
    #[strum(serialize = "ldfld")]
    Ldfld,
    #[strum(serialize = "stfld")]
    Stfld,
    #[strum(serialize = "ldsfld")]
    Ldsfld,
    #[strum(serialize = "stsfld")]
    Stsfld,
    #[strum(serialize = "box")]
    Box,
    #[strum(serialize = "unbox.any")]
    UnboxAny,
    #[strum(serialize = "newarr")]
    Newarr,
    #[strum(serialize = "ldlen")]
    Ldlen,
    #[strum(serialize = "ldelem.ref")]
    LdelemRef,
    #[strum(serialize = "stelem.ref")]
    StelemRef,
    #[strum(serialize = "endfinally")]
    Endfinally,
    #[strum(serialize = "leave")]
    Leave,
    #[strum(serialize = "leave.s")]
    LeaveS,
    #[strum(serialize = "ceq")]
    Ceq,
    #[strum(serialize = "cgt")]
    Cgt,
    #[strum(serialize = "clt")]
    Clt,
    #[strum(serialize = "ldftn")]
    Ldftn,
    #[strum(serialize = "ldarg")]
    Ldarg,
    #[strum(serialize = "ldloc")]
    Ldloc,
    #[strum(serialize = "stloc")]
    Stloc,
    #[strum(serialize = "ldtoken")]
    Ldtoken,
    #[strum(serialize = "rethrow")]
    Rethrow,
}

const fn fixed(pops: u8, pushes: u8) -> Option<StackBehavior> {
    #[allow(clippy::cast_possible_wrap)]
    Some(StackBehavior {
        pops,
        pushes,
        net_effect: pushes as i8 - pops as i8,
    })
}

impl OpCode {
    /// The textual mnemonic
    #[must_use]
    pub fn mnemonic(self) -> &'static str {
        self.into()
    }

    /// Raw encoding as `(prefix, opcode)`; `prefix` is `0xFE` for two-byte opcodes, else 0
    #[must_use]
    pub fn encoding(self) -> (u8, u8) {
        match self {
            OpCode::Nop => (0, 0x00),
            OpCode::Break => (0, 0x01),
            OpCode::Ldarg0 => (0, 0x02),
            OpCode::Ldarg1 => (0, 0x03),
            OpCode::Ldarg2 => (0, 0x04),
            OpCode::Ldarg3 => (0, 0x05),
            OpCode::Ldloc0 => (0, 0x06),
            OpCode::Ldloc1 => (0, 0x07),
            OpCode::Ldloc2 => (0, 0x08),
            OpCode::Ldloc3 => (0, 0x09),
            OpCode::Stloc0 => (0, 0x0A),
            OpCode::Stloc1 => (0, 0x0B),
            OpCode::Stloc2 => (0, 0x0C),
            OpCode::Stloc3 => (0, 0x0D),
            OpCode::LdargS => (0, 0x0E),
            OpCode::LdargaS => (0, 0x0F),
            OpCode::StargS => (0, 0x10),
            OpCode::LdlocS => (0, 0x11),
            OpCode::LdlocaS => (0, 0x12),
            OpCode::StlocS => (0, 0x13),
            OpCode::Ldnull => (0, 0x14),
            OpCode::LdcI4M1 => (0, 0x15),
            OpCode::LdcI4_0 => (0, 0x16),
            OpCode::LdcI4_1 => (0, 0x17),
            OpCode::LdcI4_2 => (0, 0x18),
            OpCode::LdcI4_3 => (0, 0x19),
            OpCode::LdcI4_4 => (0, 0x1A),
            OpCode::LdcI4_5 => (0, 0x1B),
            OpCode::LdcI4_6 => (0, 0x1C),
            OpCode::LdcI4_7 => (0, 0x1D),
            OpCode::LdcI4_8 => (0, 0x1E),
            OpCode::LdcI4S => (0, 0x1F),
            OpCode::LdcI4 => (0, 0x20),
            OpCode::LdcI8 => (0, 0x21),
            OpCode::LdcR4 => (0, 0x22),
            OpCode::LdcR8 => (0, 0x23),
            OpCode::Dup => (0, 0x25),
            OpCode::Pop => (0, 0x26),
            OpCode::Call => (0, 0x28),
            OpCode::Ret => (0, 0x2A),
            OpCode::BrS => (0, 0x2B),
            OpCode::BrfalseS => (0, 0x2C),
            OpCode::BrtrueS => (0, 0x2D),
            OpCode::BeqS => (0, 0x2E),
            OpCode::BneUnS => (0, 0x33),
            OpCode::Br => (0, 0x38),
            OpCode::Brfalse => (0, 0x39),
            OpCode::Brtrue => (0, 0x3A),
            OpCode::Beq => (0, 0x3B),
            OpCode::BneUn => (0, 0x40),
            OpCode::Switch => (0, 0x45),
            OpCode::Add => (0, 0x58),
            OpCode::Sub => (0, 0x59),
            OpCode::Mul => (0, 0x5A),
            OpCode::Div => (0, 0x5B),
            OpCode::Rem => (0, 0x5D),
            OpCode::And => (0, 0x5F),
            OpCode::Or => (0, 0x60),
            OpCode::Xor => (0, 0x61),
            OpCode::Shl => (0, 0x62),
            OpCode::Shr => (0, 0x63),
            OpCode::Neg => (0, 0x65),
            OpCode::Not => (0, 0x66),
            OpCode::ConvI4 => (0, 0x69),
            OpCode::ConvI8 => (0, 0x6A),
            OpCode::Callvirt => (0, 0x6F),
            OpCode::Ldstr => (0, 0x72),
            OpCode::Newobj => (0, 0x73),
            OpCode::Castclass => (0, 0x74),
            OpCode::Isinst => (0, 0x75),
            OpCode::Throw => (0, 0x7A),
            OpCode::Ldfld => (0, 0x7B),
            OpCode::Stfld => (0, 0x7D),
            OpCode::Ldsfld => (0, 0x7E),
            OpCode::Stsfld => (0, 0x80),
            OpCode::Box => (0, 0x8C),
            OpCode::Newarr => (0, 0x8D),
            OpCode::Ldlen => (0, 0x8E),
            OpCode::LdelemRef => (0, 0x9A),
            OpCode::StelemRef => (0, 0xA2),
            OpCode::UnboxAny => (0, 0xA5),
            OpCode::Ldtoken => (0, 0xD0),
            OpCode::Endfinally => (0, 0xDC),
            OpCode::Leave => (0, 0xDD),
            OpCode::LeaveS => (0, 0xDE),
            OpCode::Ceq => (0xFE, 0x01),
            OpCode::Cgt => (0xFE, 0x02),
            OpCode::Clt => (0xFE, 0x04),
            OpCode::Ldftn => (0xFE, 0x06),
            OpCode::Ldarg => (0xFE, 0x09),
            OpCode::Ldloc => (0xFE, 0x0C),
            OpCode::Stloc => (0xFE, 0x0E),
            OpCode::Rethrow => (0xFE, 0x1A),
        }
    }

    /// How the opcode affects control flow
    #[must_use]
    pub fn flow_type(self) -> FlowType {
        match self {
            OpCode::Call | OpCode::Callvirt | OpCode::Newobj => FlowType::Call,
            OpCode::Ret => FlowType::Return,
            OpCode::BrS | OpCode::Br => FlowType::UnconditionalBranch,
            OpCode::BrfalseS
            | OpCode::BrtrueS
            | OpCode::BeqS
            | OpCode::BneUnS
            | OpCode::Brfalse
            | OpCode::Brtrue
            | OpCode::Beq
            | OpCode::BneUn => FlowType::ConditionalBranch,
            OpCode::Switch => FlowType::Switch,
            OpCode::Throw | OpCode::Rethrow => FlowType::Throw,
            OpCode::Endfinally => FlowType::EndFinally,
            OpCode::Leave | OpCode::LeaveS => FlowType::Leave,
            _ => FlowType::Sequential,
        }
    }

    /// Stack behavior if it is fixed by the opcode alone.
    ///
    /// Returns `None` for `call`, `callvirt`, `newobj` and `ret`, whose effect depends on a
    /// method signature; see [`crate::Module::stack_behavior`].
    #[must_use]
    pub fn stack_behavior(self) -> Option<StackBehavior> {
        match self {
            OpCode::Call | OpCode::Callvirt | OpCode::Newobj | OpCode::Ret => None,
            OpCode::Nop
            | OpCode::Break
            | OpCode::BrS
            | OpCode::Br
            | OpCode::Endfinally
            | OpCode::Leave
            | OpCode::LeaveS
            | OpCode::Rethrow => fixed(0, 0),
            OpCode::Ldarg0
            | OpCode::Ldarg1
            | OpCode::Ldarg2
            | OpCode::Ldarg3
            | OpCode::Ldloc0
            | OpCode::Ldloc1
            | OpCode::Ldloc2
            | OpCode::Ldloc3
            | OpCode::LdargS
            | OpCode::LdargaS
            | OpCode::LdlocS
            | OpCode::LdlocaS
            | OpCode::Ldnull
            | OpCode::LdcI4M1
            | OpCode::LdcI4_0
            | OpCode::LdcI4_1
            | OpCode::LdcI4_2
            | OpCode::LdcI4_3
            | OpCode::LdcI4_4
            | OpCode::LdcI4_5
            | OpCode::LdcI4_6
            | OpCode::LdcI4_7
            | OpCode::LdcI4_8
            | OpCode::LdcI4S
            | OpCode::LdcI4
            | OpCode::LdcI8
            | OpCode::LdcR4
            | OpCode::LdcR8
            | OpCode::Ldstr
            | OpCode::Ldsfld
            | OpCode::Ldftn
            | OpCode::Ldarg
            | OpCode::Ldloc
            | OpCode::Ldtoken => fixed(0, 1),
            OpCode::Stloc0
            | OpCode::Stloc1
            | OpCode::Stloc2
            | OpCode::Stloc3
            | OpCode::StargS
            | OpCode::StlocS
            | OpCode::Stloc
            | OpCode::Pop
            | OpCode::BrfalseS
            | OpCode::BrtrueS
            | OpCode::Brfalse
            | OpCode::Brtrue
            | OpCode::Switch
            | OpCode::Throw
            | OpCode::Stsfld => fixed(1, 0),
            OpCode::Dup => fixed(1, 2),
            OpCode::BeqS | OpCode::BneUnS | OpCode::Beq | OpCode::BneUn => fixed(2, 0),
            OpCode::Add
            | OpCode::Sub
            | OpCode::Mul
            | OpCode::Div
            | OpCode::Rem
            | OpCode::And
            | OpCode::Or
            | OpCode::Xor
            | OpCode::Shl
            | OpCode::Shr
            | OpCode::Ceq
            | OpCode::Cgt
            | OpCode::Clt
            | OpCode::LdelemRef => fixed(2, 1),
            OpCode::Neg
            | OpCode::Not
            | OpCode::ConvI4
            | OpCode::ConvI8
            | OpCode::Castclass
            | OpCode::Isinst
            | OpCode::Ldfld
            | OpCode::Box
            | OpCode::UnboxAny
            | OpCode::Newarr
            | OpCode::Ldlen => fixed(1, 1),
            OpCode::Stfld => fixed(2, 0),
            OpCode::StelemRef => fixed(3, 0),
        }
    }
}

impl TryFrom<String> for OpCode {
    type Error = strum::ParseError;

    fn try_from(mnemonic: String) -> Result<Self, Self::Error> {
        mnemonic.parse()
    }
}

impl From<OpCode> for String {
    fn from(opcode: OpCode) -> Self {
        opcode.mnemonic().to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn mnemonics_roundtrip() {
        for opcode in OpCode::iter() {
            let parsed: OpCode = opcode.mnemonic().parse().unwrap();
            assert_eq!(parsed, opcode);
            assert_eq!(opcode.to_string(), opcode.mnemonic());
        }
    }

    #[test]
    fn encodings_are_unique() {
        let mut seen = HashSet::new();
        for opcode in OpCode::iter() {
            assert!(seen.insert(opcode.encoding()), "{opcode} encoded twice");
        }
    }

    #[test]
    fn stack_behavior_for_string_sites() {
        let ldstr = OpCode::Ldstr.stack_behavior().unwrap();
        assert_eq!((ldstr.pops, ldstr.pushes, ldstr.net_effect), (0, 1, 1));

        let ldc = OpCode::LdcI4_3.stack_behavior().unwrap();
        assert_eq!(ldc.net_effect, 1);

        assert!(OpCode::Call.stack_behavior().is_none());
        assert!(OpCode::Newobj.stack_behavior().is_none());
    }

    #[test]
    fn unknown_mnemonic_is_rejected() {
        assert!("ldstr.s".parse::<OpCode>().is_err());
        assert!(OpCode::try_from("bogus".to_string()).is_err());
    }
}
