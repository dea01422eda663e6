//! Whole-module and file-level orchestration of the externalization pass.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use log::{debug, info};
use serde::Serialize;

use crate::{
    file::ModuleStore,
    metadata::{
        header::{CorFlags, ImageHeader, MachineType, PeKind},
        module::Module,
    },
    transform::{rewriter::Rewriter, trampoline::Architecture},
    Error, Result,
};

/// Knobs of a transform run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformOptions {
    /// Leave literals that need a UTF-16 payload in place instead of externalizing them
    pub narrow_only: bool,
}

/// Counters describing one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransformReport {
    /// Methods with a CIL body that were scanned
    pub methods_scanned: usize,
    /// Methods in which at least one literal was replaced
    pub methods_rewritten: usize,
    /// `ldstr` sites replaced by a stub call
    pub strings_externalized: usize,
    /// Distinct stubs added to the module
    pub stubs_created: usize,
    /// Empty literals left in place
    pub empty_skipped: usize,
    /// Literals left in place because they could not be encoded narrowly
    pub unencodable_skipped: usize,
}

impl fmt::Display for TransformReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} strings in {}/{} methods moved into {} stubs ({} empty, {} unencodable skipped)",
            self.strings_externalized,
            self.methods_rewritten,
            self.methods_scanned,
            self.stubs_created,
            self.empty_skipped,
            self.unencodable_skipped
        )
    }
}

/// Result of [`process_file`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileOutcome {
    /// What the run did
    pub report: TransformReport,
    /// Where the transformed module was written
    pub output: PathBuf,
}

/// Makes the header truthful for an image carrying native stubs and picks their
/// architecture.
///
/// `ILONLY` is always cleared. An I386 image stays 32-bit and gains `32BITREQUIRED`; every
/// other machine becomes an AMD64 `PE32+` image.
pub fn adjust_header(header: &mut ImageHeader) -> Architecture {
    header.cor_flags.remove(CorFlags::ILONLY);

    if header.machine == MachineType::I386 {
        header.pe_kind = PeKind::Pe32;
        header.cor_flags.insert(CorFlags::BIT32_REQUIRED);
        Architecture::X86
    } else {
        header.pe_kind = PeKind::Pe32Plus;
        header.machine = MachineType::Amd64;
        Architecture::X64
    }
}

/// Runs the externalization pass over a whole module.
///
/// # Examples
///
/// ```rust
/// use dotstub::prelude::*;
/// use dotstub::assembly::{Instruction, OpCode};
/// use dotstub::metadata::{
///     header::ImageHeader,
///     method::{CilBody, MethodBody, MethodDef},
///     signatures::{SignatureMethod, TypeSignature},
///     typesystem::TypeDef,
/// };
///
/// let mut module = Module::new("demo.exe", ImageHeader::default());
/// let program = module.add_type(TypeDef::new("Demo", "Program", 0));
/// module.add_method(program, MethodDef::new(
///     "Main",
///     0x0016,
///     0,
///     SignatureMethod::static_method(TypeSignature::Void, vec![]),
///     MethodBody::Cil(CilBody::new(vec![
///         Instruction::ldstr("Hi"),
///         Instruction::simple(OpCode::Pop),
///         Instruction::simple(OpCode::Ret),
///     ])),
/// ))?;
///
/// let report = StringExternalizer::new(TransformOptions::default()).run(&mut module)?;
/// assert_eq!(report.strings_externalized, 1);
/// assert_eq!(report.stubs_created, 1);
/// assert!(!module.header.is_il_only());
/// # Ok::<(), dotstub::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct StringExternalizer {
    options: TransformOptions,
}

impl StringExternalizer {
    /// A pass configured with `options`
    #[must_use]
    pub fn new(options: TransformOptions) -> Self {
        StringExternalizer { options }
    }

    /// Adjusts the header, then rewrites every method that existed before the run.
    ///
    /// Stubs created along the way are native and never scanned.
    ///
    /// # Errors
    /// Returns the first error of the rewriter, typically [`Error::MalformedInstruction`].
    /// The module is left partially transformed in that case and must be discarded.
    pub fn run(&self, module: &mut Module) -> Result<TransformReport> {
        let arch = adjust_header(&mut module.header);
        info!(
            "Externalizing strings of {} for {} ({})",
            module.name(),
            arch,
            module.header.machine
        );

        let mut rewriter = Rewriter::new(arch, self.options.narrow_only);
        let mut report = TransformReport::default();

        for location in module.method_locations() {
            if !module.method_at(location).is_some_and(|m| m.is_cil()) {
                continue;
            }

            report.methods_scanned += 1;
            if rewriter.rewrite_method(module, location)? > 0 {
                report.methods_rewritten += 1;
            }
        }

        let stats = rewriter.stats();
        report.strings_externalized = stats.externalized;
        report.empty_skipped = stats.empty_skipped;
        report.unencodable_skipped = stats.unencodable_skipped;
        report.stubs_created = rewriter.cache().len();

        debug!(
            "Dedup cache: {} hits, {} misses",
            rewriter.cache().hits(),
            rewriter.cache().misses()
        );
        info!("Done: {report}");
        Ok(report)
    }
}

/// Where the transformed copy of `input` is written: `<input>_strings<ext>`.
///
/// ```rust
/// use dotstub::output_path;
/// use std::path::{Path, PathBuf};
///
/// assert_eq!(output_path(Path::new("app.exe")), PathBuf::from("app.exe_strings.exe"));
/// assert_eq!(output_path(Path::new("bin/tool")), PathBuf::from("bin/tool_strings"));
/// ```
#[must_use]
pub fn output_path(input: &Path) -> PathBuf {
    let mut name = input.file_name().unwrap_or_default().to_os_string();
    name.push("_strings");
    if let Some(ext) = input.extension() {
        name.push(".");
        name.push(ext);
    }
    input.with_file_name(name)
}

/// Loads `input` through `store`, transforms it and writes the result next to it.
///
/// The input is never modified. Nothing is written unless the transform succeeds.
///
/// # Errors
/// Returns [`Error::InputNotFound`] if `input` is not an existing file, and otherwise any
/// error of the store or the transform.
pub fn process_file<S: ModuleStore + ?Sized>(
    input: &Path,
    store: &S,
    options: &TransformOptions,
) -> Result<FileOutcome> {
    if !input.is_file() {
        return Err(Error::InputNotFound(input.to_path_buf()));
    }

    info!("Loading {}", input.display());
    let mut module = store.load(input)?;

    let report = StringExternalizer::new(options.clone()).run(&mut module)?;

    let output = output_path(input);
    info!("Writing {}", output.display());
    store.write(&module, &output)?;

    Ok(FileOutcome { report, output })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{Instruction, OpCode},
        test::{materialize, ModuleBuilder},
    };

    #[test]
    fn header_for_i386() {
        let mut header = ImageHeader::default();
        assert_eq!(adjust_header(&mut header), Architecture::X86);
        assert_eq!(header.pe_kind, PeKind::Pe32);
        assert_eq!(header.machine, MachineType::I386);
        assert!(!header.cor_flags.contains(CorFlags::ILONLY));
        assert!(header.cor_flags.contains(CorFlags::BIT32_REQUIRED));
    }

    #[test]
    fn header_for_other_machines() {
        for machine in [MachineType::Amd64, MachineType::Arm64, MachineType::Other(0x1C0)] {
            let mut header = ImageHeader {
                machine,
                pe_kind: PeKind::Pe32,
                cor_flags: CorFlags::ILONLY | CorFlags::BIT32_PREFERRED,
            };
            assert_eq!(adjust_header(&mut header), Architecture::X64);
            assert_eq!(header.pe_kind, PeKind::Pe32Plus);
            assert_eq!(header.machine, MachineType::Amd64);
            assert_eq!(header.cor_flags, CorFlags::BIT32_PREFERRED);
        }
    }

    #[test]
    fn output_paths() {
        assert_eq!(
            output_path(Path::new("app.exe")),
            PathBuf::from("app.exe_strings.exe")
        );
        assert_eq!(
            output_path(Path::new("/tmp/lib.dll")),
            PathBuf::from("/tmp/lib.dll_strings.dll")
        );
        assert_eq!(output_path(Path::new("tool")), PathBuf::from("tool_strings"));
    }

    #[test]
    fn shared_literal_across_methods() {
        let mut module = ModuleBuilder::new("a.exe")
            .method("App.Program", "A", vec![Instruction::ldstr("shared")])
            .method("App.Program", "B", vec![Instruction::ldstr("shared")])
            .method("App.Other", "C", vec![Instruction::ldstr("other")])
            .build();

        let report = StringExternalizer::default().run(&mut module).unwrap();

        assert_eq!(report.methods_scanned, 3);
        assert_eq!(report.methods_rewritten, 3);
        assert_eq!(report.strings_externalized, 3);
        assert_eq!(report.stubs_created, 2);

        let a = module.method_at((0, 0)).unwrap().cil_body().unwrap();
        let b = module.method_at((0, 1)).unwrap().cil_body().unwrap();
        assert_eq!(a.instructions[0], b.instructions[0]);

        let holder = module.types().iter().position(|t| t.is_module_type()).unwrap();
        assert_eq!(module.types()[holder].methods.len(), 2);
    }

    #[test]
    fn stubs_are_never_rescanned() {
        let mut module = ModuleBuilder::new("a.exe")
            .method("App.Program", "Main", vec![Instruction::ldstr("x")])
            .build();
        let externalizer = StringExternalizer::default();

        externalizer.run(&mut module).unwrap();
        let methods = module.method_count();

        // a second run finds no ldstr left and creates nothing
        let second = externalizer.run(&mut module).unwrap();
        assert_eq!(second.strings_externalized, 0);
        assert_eq!(second.methods_scanned, 1);
        assert_eq!(module.method_count(), methods);
    }

    #[test]
    fn empty_literal_is_not_externalized() {
        let mut module = ModuleBuilder::new("a.exe")
            .method("App.Program", "Main", vec![Instruction::ldstr("")])
            .build();
        let report = StringExternalizer::default().run(&mut module).unwrap();

        assert_eq!(report.empty_skipped, 1);
        assert_eq!(report.stubs_created, 0);
        assert_eq!(report.methods_rewritten, 0);
        let body = module.method_at((0, 0)).unwrap().cil_body().unwrap();
        assert_eq!(body.instructions, vec![Instruction::ldstr("")]);
    }

    #[test]
    fn amd64_module_gets_x64_stubs() {
        let mut module = ModuleBuilder::new("a.exe")
            .machine(MachineType::Amd64)
            .method(
                "App.Program",
                "Main",
                vec![Instruction::ldstr("64"), Instruction::simple(OpCode::Ret)],
            )
            .build();
        StringExternalizer::default().run(&mut module).unwrap();

        let body = module.method_at((0, 0)).unwrap().cil_body().unwrap();
        let stub = module.method(body.instructions[0].token().unwrap()).unwrap();
        let code = &stub.native_body().unwrap().code;
        assert_eq!(code[..3], [0x48, 0x8D, 0x05]);
        assert_eq!(materialize(Architecture::X64, code, false, None), "64");
    }

    #[test]
    fn narrow_only_report() {
        let mut module = ModuleBuilder::new("a.exe")
            .method(
                "App.Program",
                "Main",
                vec![Instruction::ldstr("\u{4f60}\u{597d}"), Instruction::ldstr("hi")],
            )
            .build();
        let report = StringExternalizer::new(TransformOptions { narrow_only: true })
            .run(&mut module)
            .unwrap();

        assert_eq!(report.unencodable_skipped, 1);
        assert_eq!(report.strings_externalized, 1);
        assert_eq!(
            report.to_string(),
            "1 strings in 1/1 methods moved into 1 stubs (0 empty, 1 unencodable skipped)"
        );
    }
}
