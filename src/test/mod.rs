//! Shared helpers for unit tests: module builders and a tiny x86/x64 interpreter for stubs.

use std::collections::HashMap;

use iced_x86::{Decoder, DecoderOptions, Mnemonic, OpKind, Register};

use crate::{
    assembly::Instruction,
    metadata::{
        header::{ImageHeader, MachineType, PeKind},
        method::{CilBody, MethodBody, MethodDef},
        signatures::{SignatureMethod, TypeSignature},
        typesystem::TypeDef,
        userstring::UserString,
    },
    transform::{trampoline::code_len, Architecture},
    Module,
};

/// Builds modules method by method, creating types on first use.
pub struct ModuleBuilder {
    module: Module,
}

impl ModuleBuilder {
    pub fn new(name: &str) -> Self {
        ModuleBuilder {
            module: Module::new(name, ImageHeader::default()),
        }
    }

    pub fn machine(mut self, machine: MachineType) -> Self {
        self.module.header.machine = machine;
        self.module.header.pe_kind = match machine {
            MachineType::I386 => PeKind::Pe32,
            _ => PeKind::Pe32Plus,
        };
        self
    }

    /// Adds a public static `void ()` method to `type_name` (`Namespace.Name`)
    pub fn method(self, type_name: &str, name: &str, instructions: Vec<Instruction>) -> Self {
        self.body(type_name, name, CilBody::new(instructions))
    }

    pub fn body(mut self, type_name: &str, name: &str, body: CilBody) -> Self {
        let (namespace, short) = type_name.rsplit_once('.').unwrap_or(("", type_name));
        let index = match self
            .module
            .types()
            .iter()
            .position(|t| t.namespace == namespace && t.name == short)
        {
            Some(index) => index,
            None => self.module.add_type(TypeDef::new(namespace, short, 0x0010_0001)),
        };

        let method = MethodDef::new(
            name,
            0x0096,
            0,
            SignatureMethod::static_method(TypeSignature::Void, vec![]),
            MethodBody::Cil(body),
        );
        self.module.add_method(index, method).unwrap();
        self
    }

    pub fn build(self) -> Module {
        self.module
    }
}

const RETURN_SENTINEL: u64 = 0xDEAD_BEEF;

/// Executes a stub loaded at `base` and returns the value it leaves in `eax` / `rax`.
///
/// Only the handful of instructions stubs consist of are supported; anything else panics.
pub fn run_stub(arch: Architecture, stub: &[u8], base: u64) -> u64 {
    let (bitness, result, mask) = match arch {
        Architecture::X86 => (32, Register::EAX, 0xFFFF_FFFF_u64),
        Architecture::X64 => (64, Register::RAX, u64::MAX),
    };

    let mut stack = vec![RETURN_SENTINEL];
    let mut registers: HashMap<Register, u64> = HashMap::new();
    let mut decoder = Decoder::with_ip(bitness, stub, base, DecoderOptions::NONE);

    for _ in 0..32 {
        let instr = decoder.decode();
        assert!(!instr.is_invalid(), "invalid instruction at {:#x}", instr.ip());
        assert!(
            instr.ip() - base < code_len(arch) as u64,
            "executing payload at {:#x}",
            instr.ip()
        );

        let mut jump = None;
        match instr.mnemonic() {
            Mnemonic::Push => {
                let value = registers.get(&instr.op0_register()).copied().unwrap_or(0);
                stack.push(value);
            }
            Mnemonic::Pop => {
                let value = stack.pop().expect("stack underflow");
                registers.insert(instr.op0_register(), value);
            }
            Mnemonic::Mov => {
                let value = registers.get(&instr.op1_register()).copied().unwrap_or(0);
                registers.insert(instr.op0_register(), value);
            }
            Mnemonic::Add => {
                assert_ne!(instr.op1_kind(), OpKind::Register);
                let value = registers.get(&instr.op0_register()).copied().unwrap_or(0);
                let sum = value.wrapping_add(instr.immediate(1)) & mask;
                registers.insert(instr.op0_register(), sum);
            }
            Mnemonic::Lea => {
                assert!(instr.is_ip_rel_memory_operand());
                registers.insert(instr.op0_register(), instr.ip_rel_memory_address());
            }
            Mnemonic::Call => {
                stack.push(instr.next_ip());
                jump = Some(instr.near_branch_target());
            }
            Mnemonic::Ret => {
                let target = stack.pop().expect("stack underflow");
                if target == RETURN_SENTINEL {
                    assert!(stack.is_empty(), "unbalanced stack on return");
                    return registers.get(&result).copied().unwrap_or(0);
                }
                jump = Some(target);
            }
            other => panic!("unsupported instruction {other:?} in stub"),
        }

        if let Some(target) = jump {
            decoder.set_ip(target);
            decoder
                .set_position(usize::try_from(target - base).unwrap())
                .unwrap();
        }
    }

    panic!("stub did not return");
}

/// Runs the stub and rebuilds the string the way the runtime constructor would.
///
/// `count` is the explicit character count, `None` to read up to the terminator. Narrow
/// payloads are widened byte by byte, like `string::.ctor(sbyte*)` does for ASCII.
pub fn materialize(
    arch: Architecture,
    stub: &[u8],
    wide: bool,
    count: Option<usize>,
) -> UserString {
    let base = 0x0040_1000;
    let address = run_stub(arch, stub, base);
    let data = &stub[usize::try_from(address - base).unwrap()..];

    if wide {
        let units: Vec<u16> = data
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        let len = count.unwrap_or_else(|| units.iter().position(|u| *u == 0).unwrap());
        UserString::from_units(units[..len].to_vec())
    } else {
        let len = count.unwrap_or_else(|| data.iter().position(|b| *b == 0).unwrap());
        UserString::from_units(data[..len].iter().map(|b| u16::from(*b)).collect())
    }
}
