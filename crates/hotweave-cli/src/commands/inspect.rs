//! `hotweave inspect`: Display a module's header, references and types.

use crate::output::StyledOutput;
use anyhow::Context;
use hotweave_bytecode::module::flags;
use hotweave_bytecode::{contract, MethodDef, Module, TypeDef};
use std::path::Path;

pub fn execute(path: &Path, type_name: Option<&str>, out: &mut StyledOutput) -> anyhow::Result<()> {
    let module = Module::load(path).with_context(|| format!("failed to load {}", path.display()))?;

    match type_name {
        Some(name) => {
            let id = module
                .find_type(name)
                .with_context(|| format!("type {} not found in {}", name, module.name()))?;
            print_type_detail(out, module.type_def(id));
        }
        None => {
            print_header(out, &module);
            for ty in &module.types {
                print_type_summary(out, ty);
            }
        }
    }
    Ok(())
}

fn print_header(out: &mut StyledOutput, module: &Module) {
    out.bold(&format!("Module {}", module.name()));
    out.newline();
    out.row("version", &module.version.to_string());
    out.row("flags", &flag_names(module.flags));
    out.row("sha256", &hex::encode(module.checksum));
    if !module.references.is_empty() {
        out.row("references", &module.references.join(", "));
    }
    out.row("types", &module.types.len().to_string());
    out.newline();
}

fn flag_names(bits: u32) -> String {
    let mut names = Vec::new();
    if bits & flags::WOVEN != 0 {
        names.push("woven");
    }
    if bits & flags::HAS_DEBUG_INFO != 0 {
        names.push("debug-info");
    }
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}

fn print_type_summary(out: &mut StyledOutput, ty: &TypeDef) {
    out.info(&ty.name);
    if let Some(base) = &ty.base {
        out.dim(&format!(" : {}", base));
    }
    if ty.implements(contract::INSTANCE_CLASS_INTERFACE) {
        out.success(" [replaceable]");
    }
    out.newline();
    for method in &ty.methods {
        out.plain(&format!("    {}", method.key()));
        out.dim(&method_tags(method));
        out.newline();
    }
}

fn print_type_detail(out: &mut StyledOutput, ty: &TypeDef) {
    print_type_summary(out, ty);
    out.newline();

    for field in &ty.fields {
        out.dim("  field ");
        out.plain(&format!("{}: {}", field.name, field.field_type));
        out.newline();
    }

    for method in &ty.methods {
        out.newline();
        out.bold(&format!("  {} {}", method.return_type, method.key()));
        out.dim(&method_tags(method));
        out.newline();
        for (local, local_type) in method.body.locals.iter().enumerate() {
            out.dim(&format!("    .local {} {}", local, local_type));
            out.newline();
        }
        for (offset, instruction) in method.body.instructions.iter().enumerate() {
            out.dim(&format!("    {:04}  ", offset));
            out.plain(&instruction.to_string());
            out.newline();
        }
    }
}

fn method_tags(method: &MethodDef) -> String {
    let mut tags = Vec::new();
    if method.is_static() {
        tags.push("static");
    }
    if method.is_virtual() {
        tags.push("virtual");
    }
    if method.is_abstract() {
        tags.push("abstract");
    }
    if method.name.starts_with(contract::BASE_CALL_PREFIX) {
        tags.push("shim");
    }
    if tags.is_empty() {
        String::new()
    } else {
        format!("  [{}]", tags.join(" "))
    }
}
