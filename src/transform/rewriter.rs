//! Rewriting of string loads inside CIL method bodies.
//!
//! Every non-empty `ldstr "s"` becomes a call to a native stub followed by a string
//! constructor that consumes the returned pointer:
//!
//! ```text
//! ldstr "Hi"        =>  call     sbyte* <stub>()
//!                       newobj   instance void string::.ctor(sbyte*)
//!
//! ldstr "a\0b"      =>  call     sbyte* <stub>()
//!                       ldc.i4.0
//!                       ldc.i4.3
//!                       newobj   instance void string::.ctor(sbyte*, int32, int32)
//! ```
//!
//! Each replacement pushes exactly one string, like the `ldstr` it replaces.
//!
//! A method is processed in two passes. The scan reads the body and records one
//! [`PlannedEdit`] per site; nothing is modified, so a malformed instruction aborts before
//! the body is touched. The apply pass splices replacements in descending position order,
//! then remaps branch targets and exception handler boundaries of the original instructions
//! to their new positions.

use std::collections::HashMap;

use log::{debug, warn};

use crate::{
    assembly::{Instruction, OpCode, Operand},
    metadata::{
        module::{MethodLocation, Module},
        signatures::{SignatureMethod, TypeSignature},
        token::Token,
        typesystem::MemberRef,
        userstring::UserString,
    },
    transform::{
        cache::{DedupCache, DedupKey},
        encoding::{character_count, encode_payload, select, EncodingPlan},
        stub,
        trampoline::{synthesize, Architecture},
    },
    Error, Result,
};

/// Declaring type of the reconstruction constructors
const STRING_CLASS: &str = "System.String";

/// One `ldstr` scheduled for replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedEdit {
    /// Position of the `ldstr` in the original body
    pub index: usize,
    /// The literal
    pub content: UserString,
    /// How it will be encoded
    pub plan: EncodingPlan,
}

/// Site counters accumulated over all rewritten methods.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteStats {
    /// Sites replaced by a stub call
    pub externalized: usize,
    /// Empty literals left in place
    pub empty_skipped: usize,
    /// Non-ASCII literals left in place under the narrow-only policy
    pub unencodable_skipped: usize,
}

/// The `System.String` constructor matching `plan`.
///
/// - terminated, narrow: `.ctor(sbyte*)`
/// - terminated, wide: `.ctor(char*)`
/// - explicit length: the same pointer followed by `(int32 startIndex, int32 length)`
#[must_use]
pub fn string_ctor(plan: EncodingPlan) -> MemberRef {
    let element = if plan.wide {
        TypeSignature::Char
    } else {
        TypeSignature::I1
    };

    let mut params = vec![TypeSignature::ptr(element)];
    if plan.explicit_length {
        params.push(TypeSignature::I4);
        params.push(TypeSignature::I4);
    }

    MemberRef::new(
        STRING_CLASS,
        ".ctor",
        SignatureMethod::instance(TypeSignature::Void, params),
    )
}

/// Replaces string loads with stub calls, one method at a time.
///
/// A `Rewriter` lives for exactly one transform run: its [`DedupCache`] guarantees that
/// identical literals across all methods share a stub.
pub struct Rewriter {
    arch: Architecture,
    narrow_only: bool,
    cache: DedupCache,
    ctors: HashMap<(bool, bool), Token>,
    stats: RewriteStats,
}

impl Rewriter {
    /// A rewriter emitting stubs for `arch`.
    ///
    /// With `narrow_only`, literals that would need a wide payload are left untouched.
    #[must_use]
    pub fn new(arch: Architecture, narrow_only: bool) -> Self {
        Rewriter {
            arch,
            narrow_only,
            cache: DedupCache::new(),
            ctors: HashMap::new(),
            stats: RewriteStats::default(),
        }
    }

    /// Site counters so far
    #[must_use]
    pub fn stats(&self) -> RewriteStats {
        self.stats
    }

    /// The dedup cache of this run
    #[must_use]
    pub fn cache(&self) -> &DedupCache {
        &self.cache
    }

    /// Finds the string loads to replace in the method at `location`.
    ///
    /// Empty literals, and wide literals under the narrow-only policy, are skipped and
    /// counted.
    ///
    /// # Errors
    /// Returns [`Error::MalformedInstruction`] for an `ldstr` whose operand is not a string.
    pub fn scan(&mut self, module: &Module, location: MethodLocation) -> Result<Vec<PlannedEdit>> {
        let Some(method) = module.method_at(location) else {
            return Err(malformed_error!("No method at {:?}", location));
        };
        let Some(body) = method.cil_body() else {
            return Ok(Vec::new());
        };

        let mut edits = Vec::new();
        for (index, instruction) in body.instructions.iter().enumerate() {
            if instruction.opcode != OpCode::Ldstr {
                continue;
            }

            let content = match &instruction.operand {
                Operand::String(content) => content,
                other => {
                    return Err(Error::MalformedInstruction {
                        method: method.token,
                        index,
                        message: format!("expected a string operand, found {other:?}"),
                    })
                }
            };

            if content.is_empty() {
                debug!("Skipping empty literal in {} at {}", method.name, index);
                self.stats.empty_skipped += 1;
                continue;
            }

            let plan = select(content);
            if plan.wide && self.narrow_only {
                warn!(
                    "Cannot encode {:?} in {} at {} as a narrow string, leaving it in place",
                    content, method.name, index
                );
                self.stats.unencodable_skipped += 1;
                continue;
            }

            edits.push(PlannedEdit {
                index,
                content: content.clone(),
                plan,
            });
        }

        Ok(edits)
    }

    /// Scans and rewrites the method at `location`. Returns the number of replaced sites.
    ///
    /// # Errors
    /// Returns [`Error::MalformedInstruction`] from the scan, or [`Error::Malformed`] if a
    /// replacement would not leave exactly one value on the stack.
    pub fn rewrite_method(&mut self, module: &mut Module, location: MethodLocation) -> Result<usize> {
        let edits = self.scan(module, location)?;
        if edits.is_empty() {
            return Ok(0);
        }

        let mut replacements = Vec::with_capacity(edits.len());
        for edit in &edits {
            replacements.push(self.replacement(module, edit)?);
        }

        let Some(method) = module.method_at_mut(location) else {
            return Err(malformed_error!("No method at {:?}", location));
        };
        let token = method.token;
        let Some(body) = method.cil_body_mut() else {
            return Err(malformed_error!("Method {} lost its body", token));
        };

        // descending, so lower splice positions stay valid
        for (edit, replacement) in edits.iter().zip(replacements).rev() {
            body.instructions.splice(edit.index..=edit.index, replacement);
        }

        // (site, instructions added there)
        let growth: Vec<(usize, usize)> = edits
            .iter()
            .map(|edit| (edit.index, replacement_len(edit.plan) - 1))
            .collect();
        let remap = |old: usize| -> usize {
            old + growth
                .iter()
                .filter(|(site, _)| *site < old)
                .map(|(_, extra)| extra)
                .sum::<usize>()
        };

        for instruction in &mut body.instructions {
            instruction.remap_targets(remap);
        }
        for handler in &mut body.exception_handlers {
            handler.remap(remap);
        }

        if edits.iter().any(|edit| edit.plan.explicit_length) {
            body.max_stack = body.max_stack.saturating_add(2);
        }

        self.stats.externalized += edits.len();
        debug!("Rewrote {} string loads in {}", edits.len(), token);
        Ok(edits.len())
    }

    /// Builds the instruction sequence replacing one site, creating its stub on first use
    fn replacement(&mut self, module: &mut Module, edit: &PlannedEdit) -> Result<Vec<Instruction>> {
        let arch = self.arch;
        let stub_token = self
            .cache
            .get_or_create(DedupKey::new(&edit.content, edit.plan), || {
                let payload = encode_payload(&edit.content, edit.plan);
                let token = stub::register(module, synthesize(arch, &payload), edit.plan)?;
                debug!(
                    "Created stub {} for {:?} ({}, {} payload bytes)",
                    token,
                    edit.content,
                    edit.plan,
                    payload.len()
                );
                Ok(token)
            })?;

        let ctor = *self
            .ctors
            .entry((edit.plan.wide, edit.plan.explicit_length))
            .or_insert_with(|| module.import_member(string_ctor(edit.plan)));

        let mut sequence = vec![Instruction::call(stub_token)];
        if edit.plan.explicit_length {
            let count = character_count(&edit.content, edit.plan);
            let Ok(count) = i32::try_from(count) else {
                return Err(malformed_error!("Literal of {} characters is too long", count));
            };
            sequence.push(Instruction::ldc_i4(0));
            sequence.push(Instruction::ldc_i4(count));
        }
        sequence.push(Instruction::newobj(ctor));

        if net_stack_effect(module, &sequence) != Some(1) {
            return Err(malformed_error!(
                "Replacement for {:?} does not push exactly one value",
                edit.content
            ));
        }

        Ok(sequence)
    }
}

/// Number of instructions replacing a site encoded with `plan`
#[must_use]
pub fn replacement_len(plan: EncodingPlan) -> usize {
    if plan.explicit_length {
        4
    } else {
        2
    }
}

/// Net stack effect of `sequence`, `None` if any instruction's effect is unknown
#[must_use]
pub fn net_stack_effect(module: &Module, sequence: &[Instruction]) -> Option<i32> {
    sequence.iter().try_fold(0_i32, |depth, instruction| {
        module
            .stack_behavior(instruction)
            .map(|behavior| depth + i32::from(behavior.net_effect))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::method::{CilBody, ExceptionHandler, MethodBody, MethodDef},
        test::{materialize, ModuleBuilder},
    };

    fn body(module: &Module, location: MethodLocation) -> &CilBody {
        module.method_at(location).unwrap().cil_body().unwrap()
    }

    #[test]
    fn terminated_narrow_site() {
        let mut module = ModuleBuilder::new("a.exe")
            .method(
                "App.Program",
                "Main",
                vec![Instruction::ldstr("Hi"), Instruction::simple(OpCode::Pop)],
            )
            .build();
        let mut rewriter = Rewriter::new(Architecture::X86, false);

        assert_eq!(rewriter.rewrite_method(&mut module, (0, 0)).unwrap(), 1);

        let instructions = &body(&module, (0, 0)).instructions;
        assert_eq!(instructions.len(), 3);
        assert_eq!(instructions[0].opcode, OpCode::Call);
        assert_eq!(instructions[1].opcode, OpCode::Newobj);
        assert_eq!(instructions[2].opcode, OpCode::Pop);

        let ctor = module.member_ref(instructions[1].token().unwrap()).unwrap();
        assert_eq!(ctor.signature.to_string(), "instance void (sbyte*)");

        let stub = module.method(instructions[0].token().unwrap()).unwrap();
        let code = &stub.native_body().unwrap().code;
        assert_eq!(materialize(Architecture::X86, code, false, None), "Hi");
        assert_eq!(body(&module, (0, 0)).max_stack, 8);
    }

    #[test]
    fn explicit_length_site() {
        let mut module = ModuleBuilder::new("a.exe")
            .method("App.Program", "Main", vec![Instruction::ldstr("a\0b")])
            .build();
        let mut rewriter = Rewriter::new(Architecture::X64, false);
        rewriter.rewrite_method(&mut module, (0, 0)).unwrap();

        let body = body(&module, (0, 0));
        let instructions = &body.instructions;
        assert_eq!(instructions.len(), 4);
        assert_eq!(instructions[0].opcode, OpCode::Call);
        assert_eq!(instructions[1].int_constant(), Some(0));
        assert_eq!(instructions[2].int_constant(), Some(3));
        assert_eq!(instructions[3].opcode, OpCode::Newobj);
        assert_eq!(body.max_stack, 10);

        let ctor = module.member_ref(instructions[3].token().unwrap()).unwrap();
        assert_eq!(
            ctor.signature.to_string(),
            "instance void (sbyte*, int, int)"
        );

        let stub = module.method(instructions[0].token().unwrap()).unwrap();
        let code = &stub.native_body().unwrap().code;
        assert_eq!(materialize(Architecture::X64, code, false, Some(3)), "a\0b");
    }

    #[test]
    fn wide_site_round_trips() {
        let literal = "Gr\u{fc}\u{df}e \u{1F600}";
        let mut module = ModuleBuilder::new("a.exe")
            .method("App.Program", "Main", vec![Instruction::ldstr(literal)])
            .build();
        let mut rewriter = Rewriter::new(Architecture::X86, false);
        rewriter.rewrite_method(&mut module, (0, 0)).unwrap();

        let instructions = &body(&module, (0, 0)).instructions;
        let ctor = module.member_ref(instructions[1].token().unwrap()).unwrap();
        assert_eq!(ctor.signature.to_string(), "instance void (char*)");

        let stub = module.method(instructions[0].token().unwrap()).unwrap();
        assert_eq!(stub.signature.to_string(), "char* ()");
        let code = &stub.native_body().unwrap().code;
        assert_eq!(materialize(Architecture::X86, code, true, None), literal);
    }

    #[test]
    fn lone_surrogate_site_round_trips() {
        let literal = UserString::from_units(vec![0xD800, u16::from(b'x')]);
        let mut module = ModuleBuilder::new("a.exe")
            .method(
                "App.Program",
                "Main",
                vec![Instruction::ldstr("ok"), Instruction::ldstr(literal.clone())],
            )
            .build();
        let mut rewriter = Rewriter::new(Architecture::X64, false);
        assert_eq!(rewriter.rewrite_method(&mut module, (0, 0)).unwrap(), 2);

        let instructions = &body(&module, (0, 0)).instructions;
        let ctor = module.member_ref(instructions[3].token().unwrap()).unwrap();
        assert_eq!(ctor.signature.to_string(), "instance void (char*)");

        let stub = module.method(instructions[2].token().unwrap()).unwrap();
        let code = &stub.native_body().unwrap().code;
        assert_eq!(materialize(Architecture::X64, code, true, None), literal);
    }

    #[test]
    fn malformed_ldstr_aborts_before_mutation() {
        let mut module = ModuleBuilder::new("a.exe")
            .method(
                "App.Program",
                "Main",
                vec![
                    Instruction::ldstr("ok"),
                    Instruction::new(OpCode::Ldstr, Operand::Token(Token::new(0x70000001))),
                ],
            )
            .build();
        let before = module.clone();
        let mut rewriter = Rewriter::new(Architecture::X86, false);

        match rewriter.rewrite_method(&mut module, (0, 0)) {
            Err(Error::MalformedInstruction { method, index, .. }) => {
                assert_eq!(method, Token::new(0x06000001));
                assert_eq!(index, 1);
            }
            other => panic!("Expected MalformedInstruction, got {other:?}"),
        }
        assert_eq!(module, before);
    }

    #[test]
    fn empty_and_narrow_only_skips() {
        let mut module = ModuleBuilder::new("a.exe")
            .method(
                "App.Program",
                "Main",
                vec![
                    Instruction::ldstr(""),
                    Instruction::ldstr("\u{e9}t\u{e9}"),
                    Instruction::ldstr("ok"),
                ],
            )
            .build();
        let mut rewriter = Rewriter::new(Architecture::X86, true);
        assert_eq!(rewriter.rewrite_method(&mut module, (0, 0)).unwrap(), 1);

        let instructions = &body(&module, (0, 0)).instructions;
        assert!(instructions[0]
            .as_string_operand()
            .is_some_and(UserString::is_empty));
        assert!(instructions[1]
            .as_string_operand()
            .is_some_and(|s| s == "\u{e9}t\u{e9}"));
        assert_eq!(instructions[2].opcode, OpCode::Call);

        let stats = rewriter.stats();
        assert_eq!(stats.externalized, 1);
        assert_eq!(stats.empty_skipped, 1);
        assert_eq!(stats.unencodable_skipped, 1);
    }

    #[test]
    fn branch_targets_follow_their_instructions() {
        // 0: ldstr "a"      -> 0..=1
        // 1: brtrue.s 4     -> 2
        // 2: ldstr "b\0"    -> 3..=6
        // 3: pop            -> 7
        // 4: br 2           -> 8
        // 5: ret            -> 9
        let mut module = ModuleBuilder::new("a.exe")
            .method(
                "App.Program",
                "Main",
                vec![
                    Instruction::ldstr("a"),
                    Instruction::new(OpCode::BrtrueS, Operand::Target(4)),
                    Instruction::ldstr("b\0"),
                    Instruction::simple(OpCode::Pop),
                    Instruction::new(OpCode::Br, Operand::Target(2)),
                    Instruction::simple(OpCode::Ret),
                ],
            )
            .build();
        let mut rewriter = Rewriter::new(Architecture::X64, false);
        rewriter.rewrite_method(&mut module, (0, 0)).unwrap();

        let instructions = &body(&module, (0, 0)).instructions;
        let opcodes: Vec<OpCode> = instructions.iter().map(|i| i.opcode).collect();
        assert_eq!(
            opcodes,
            vec![
                OpCode::Call,
                OpCode::Newobj,
                OpCode::BrtrueS,
                OpCode::Call,
                OpCode::LdcI4_0,
                OpCode::LdcI4_2,
                OpCode::Newobj,
                OpCode::Pop,
                OpCode::Br,
                OpCode::Ret,
            ]
        );
        assert_eq!(instructions[2].branch_targets(), vec![8]);
        // a branch to a rewritten site lands on its stub call
        assert_eq!(instructions[8].branch_targets(), vec![3]);
        assert!(module.validate().is_ok());
    }

    #[test]
    fn exception_handlers_are_remapped() {
        let mut cil = CilBody::new(vec![
            Instruction::ldstr("try"),
            Instruction::simple(OpCode::Pop),
            Instruction::new(OpCode::LeaveS, Operand::Target(5)),
            Instruction::ldstr("catch"),
            Instruction::simple(OpCode::Pop),
            Instruction::simple(OpCode::Ret),
        ]);
        cil.exception_handlers.push(ExceptionHandler {
            flags: 0,
            try_start: 0,
            try_end: 3,
            handler_start: 3,
            handler_end: 5,
            filter_start: None,
            class_token: Some(Token::new(0x01000001)),
        });
        let mut module = ModuleBuilder::new("a.exe")
            .body("App.Program", "Main", cil)
            .build();

        Rewriter::new(Architecture::X86, false)
            .rewrite_method(&mut module, (0, 0))
            .unwrap();

        let body = body(&module, (0, 0));
        let handler = &body.exception_handlers[0];
        assert_eq!(handler.try_start, 0);
        assert_eq!(handler.try_end, 4);
        assert_eq!(handler.handler_start, 4);
        assert_eq!(handler.handler_end, 7);
        assert_eq!(body.instructions[3].branch_targets(), vec![7]);
        assert_eq!(body.instructions[7].opcode, OpCode::Ret);
    }

    #[test]
    fn non_cil_methods_are_ignored() {
        let mut module = ModuleBuilder::new("a.exe").build();
        let holder = module.module_type_index();
        module
            .add_method(
                holder,
                MethodDef::new(
                    "Extern",
                    0x2016,
                    0,
                    SignatureMethod::default(),
                    MethodBody::None,
                ),
            )
            .unwrap();

        let mut rewriter = Rewriter::new(Architecture::X86, false);
        assert_eq!(rewriter.rewrite_method(&mut module, (holder, 0)).unwrap(), 0);
    }

    #[test]
    fn replacements_push_one_value() {
        let mut module = ModuleBuilder::new("a.exe").build();
        let mut rewriter = Rewriter::new(Architecture::X86, false);
        for content in ["x", "\u{e9}", "x\0", "\u{e9}\0"] {
            let content = UserString::from(content);
            let edit = PlannedEdit {
                index: 0,
                plan: select(&content),
                content,
            };
            let sequence = rewriter.replacement(&mut module, &edit).unwrap();
            assert_eq!(sequence.len(), replacement_len(edit.plan));
            assert_eq!(net_stack_effect(&module, &sequence), Some(1));
        }
        // one import per constructor shape
        assert_eq!(module.member_refs().len(), 4);
    }
}
