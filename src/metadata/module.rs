//! The in-memory module graph.
//!
//! [`Module`] is what a [`crate::ModuleStore`] produces and consumes: the image header, the
//! defined types with their methods and the list of imported member references. The
//! externalization pass borrows it mutably for exactly one run.
//!
//! Tokens are allocated by the module itself ([`Module::add_type`], [`Module::add_method`],
//! [`Module::import_member`]) so that new rows never collide with rows loaded from the
//! input.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{
    assembly::{Instruction, OpCode, Operand, StackBehavior},
    metadata::{
        header::ImageHeader,
        method::MethodDef,
        signatures::SignatureMethod,
        token::{Token, TABLE_MEMBERREF, TABLE_METHODDEF, TABLE_TYPEDEF},
        typesystem::{MemberRef, TypeDef, MODULE_TYPE_NAME},
    },
    Error, Result,
};

/// Position of a method inside the graph: `(type index, method index)`.
pub type MethodLocation = (usize, usize);

/// A loaded .NET module.
///
/// # Examples
///
/// ```rust
/// use dotstub::metadata::{header::ImageHeader, typesystem::TypeDef};
/// use dotstub::Module;
///
/// let mut module = Module::new("demo.exe", ImageHeader::default());
/// let program = module.add_type(TypeDef::new("Demo", "Program", 0));
/// assert_eq!(module.types()[program].token.value(), 0x02000001);
///
/// let holder = module.module_type_index();
/// assert_eq!(module.types()[holder].name, "<Module>");
/// # Ok::<(), dotstub::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    name: String,
    /// Image header fields the transform adjusts
    #[serde(default)]
    pub header: ImageHeader,
    #[serde(default)]
    types: Vec<TypeDef>,
    #[serde(default)]
    member_refs: Vec<MemberRef>,
}

impl Module {
    /// Creates an empty module
    #[must_use]
    pub fn new(name: &str, header: ImageHeader) -> Self {
        Module {
            name: name.to_string(),
            header,
            types: Vec::new(),
            member_refs: Vec::new(),
        }
    }

    /// Module name, usually the file name of the image
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All defined types
    #[must_use]
    pub fn types(&self) -> &[TypeDef] {
        &self.types
    }

    /// All imported member references
    #[must_use]
    pub fn member_refs(&self) -> &[MemberRef] {
        &self.member_refs
    }

    /// Total number of defined methods
    #[must_use]
    pub fn method_count(&self) -> usize {
        self.types.iter().map(|t| t.methods.len()).sum()
    }

    /// Appends a type, assigning it the next free `TypeDef` token. Returns its index.
    pub fn add_type(&mut self, mut typedef: TypeDef) -> usize {
        let row = self.types.iter().map(|t| t.token.row()).max().unwrap_or(0) + 1;
        typedef.token = Token::from_parts(TABLE_TYPEDEF, row);
        self.types.push(typedef);
        self.types.len() - 1
    }

    /// Index of the `<Module>` type, appending it first if the module has none.
    ///
    /// Existing type indices are never shifted by this call.
    pub fn module_type_index(&mut self) -> usize {
        match self.types.iter().position(TypeDef::is_module_type) {
            Some(index) => index,
            None => self.add_type(TypeDef::new("", MODULE_TYPE_NAME, 0)),
        }
    }

    /// Appends a method to the type at `type_index` and assigns it the next free
    /// `MethodDef` token.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if `type_index` is out of range.
    pub fn add_method(&mut self, type_index: usize, mut method: MethodDef) -> Result<Token> {
        let row = self
            .types
            .iter()
            .flat_map(|t| t.methods.iter())
            .map(|m| m.token.row())
            .max()
            .unwrap_or(0)
            + 1;
        let token = Token::from_parts(TABLE_METHODDEF, row);

        let Some(typedef) = self.types.get_mut(type_index) else {
            return Err(malformed_error!("Type index {} out of range", type_index));
        };
        method.token = token;
        typedef.methods.push(method);
        Ok(token)
    }

    /// Positions of every method, in declaration order
    #[must_use]
    pub fn method_locations(&self) -> Vec<MethodLocation> {
        self.types
            .iter()
            .enumerate()
            .flat_map(|(t, typedef)| (0..typedef.methods.len()).map(move |m| (t, m)))
            .collect()
    }

    /// The method at `location`
    #[must_use]
    pub fn method_at(&self, location: MethodLocation) -> Option<&MethodDef> {
        self.types.get(location.0)?.methods.get(location.1)
    }

    /// The method at `location`, for modification
    pub fn method_at_mut(&mut self, location: MethodLocation) -> Option<&mut MethodDef> {
        self.types.get_mut(location.0)?.methods.get_mut(location.1)
    }

    /// Looks up a method definition by token
    #[must_use]
    pub fn method(&self, token: Token) -> Option<&MethodDef> {
        self.types
            .iter()
            .flat_map(|t| t.methods.iter())
            .find(|m| m.token == token)
    }

    /// Looks up a member reference by token
    #[must_use]
    pub fn member_ref(&self, token: Token) -> Option<&MemberRef> {
        self.member_refs.iter().find(|m| m.token == token)
    }

    /// Imports a member reference.
    ///
    /// Returns the token of an identical reference if the module already has one, otherwise
    /// appends `member` with the next free `MemberRef` token.
    pub fn import_member(&mut self, mut member: MemberRef) -> Token {
        if let Some(existing) = self.member_refs.iter().find(|m| m.same_member(&member)) {
            return existing.token;
        }

        let row = self
            .member_refs
            .iter()
            .map(|m| m.token.row())
            .max()
            .unwrap_or(0)
            + 1;
        member.token = Token::from_parts(TABLE_MEMBERREF, row);
        let token = member.token;
        self.member_refs.push(member);
        token
    }

    /// Signature of the method a `call`/`newobj` token refers to
    #[must_use]
    pub fn call_signature(&self, token: Token) -> Option<&SignatureMethod> {
        if token.is_method_def() {
            self.method(token).map(|m| &m.signature)
        } else if token.is_member_ref() {
            self.member_ref(token).map(|m| &m.signature)
        } else {
            None
        }
    }

    /// Stack effect of `instruction`, resolving `call`, `callvirt` and `newobj` through the
    /// callee's signature.
    ///
    /// Returns `None` for `ret` (depends on the enclosing method) and for call tokens that do
    /// not resolve.
    #[must_use]
    pub fn stack_behavior(&self, instruction: &Instruction) -> Option<StackBehavior> {
        if let Some(fixed) = instruction.opcode.stack_behavior() {
            return Some(fixed);
        }

        let signature = self.call_signature(instruction.token()?)?;
        let (pops, pushes) = match instruction.opcode {
            OpCode::Call | OpCode::Callvirt => (signature.stack_pops(), signature.stack_pushes()),
            // the new object takes the place of `this`
            OpCode::Newobj => (signature.params.len(), 1),
            _ => return None,
        };

        Some(StackBehavior::new(
            u8::try_from(pops).ok()?,
            u8::try_from(pushes).ok()?,
        ))
    }

    /// Checks the structural invariants the transform relies on.
    ///
    /// - tokens are unique and belong to the right table
    /// - branch targets point inside their method body
    /// - exception handler boundaries lie inside their method body
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] describing the first violation found.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();

        for typedef in &self.types {
            if typedef.token.table() != TABLE_TYPEDEF || !seen.insert(typedef.token) {
                return Err(malformed_error!(
                    "Invalid or duplicate type token {} on {}",
                    typedef.token,
                    typedef.fullname()
                ));
            }

            for method in &typedef.methods {
                if !method.token.is_method_def() || !seen.insert(method.token) {
                    return Err(malformed_error!(
                        "Invalid or duplicate method token {} on {}::{}",
                        method.token,
                        typedef.fullname(),
                        method.name
                    ));
                }

                if let Some(body) = method.cil_body() {
                    let len = body.instructions.len();
                    for (index, instruction) in body.instructions.iter().enumerate() {
                        if let Some(target) =
                            instruction.branch_targets().into_iter().find(|t| *t >= len)
                        {
                            return Err(malformed_error!(
                                "Branch at {} in {} targets {} past the end of the body ({})",
                                index,
                                method.token,
                                target,
                                len
                            ));
                        }
                        if matches!(instruction.operand, Operand::Target(_))
                            && !instruction.is_branch()
                        {
                            return Err(malformed_error!(
                                "{} at {} in {} carries a branch target",
                                instruction.opcode,
                                index,
                                method.token
                            ));
                        }
                    }

                    for handler in &body.exception_handlers {
                        let bounds = [
                            handler.try_start,
                            handler.try_end,
                            handler.handler_start,
                            handler.handler_end,
                        ];
                        if bounds.iter().chain(handler.filter_start.iter()).any(|b| *b > len)
                            || handler.try_start > handler.try_end
                            || handler.handler_start > handler.handler_end
                        {
                            return Err(malformed_error!(
                                "Exception handler out of range in {}",
                                method.token
                            ));
                        }
                    }
                }
            }
        }

        for member in &self.member_refs {
            if !member.token.is_member_ref() || !seen.insert(member.token) {
                return Err(malformed_error!(
                    "Invalid or duplicate member reference token {} on {}::{}",
                    member.token,
                    member.class,
                    member.name
                ));
            }
        }

        Ok(())
    }

    /// Errors with [`Error::MethodNotFound`] unless `token` names a method of this module
    ///
    /// # Errors
    /// Returns [`Error::MethodNotFound`] for unknown tokens.
    pub fn require_method(&self, token: Token) -> Result<&MethodDef> {
        self.method(token).ok_or(Error::MethodNotFound(token))
    }
}
