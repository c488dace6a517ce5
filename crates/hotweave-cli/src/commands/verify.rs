//! `hotweave verify`: Check a module's checksums and method bodies.

use crate::output::StyledOutput;
use anyhow::Context;
use hotweave_bytecode::{verify_module, Module};
use std::path::Path;

pub fn execute(path: &Path, out: &mut StyledOutput) -> anyhow::Result<()> {
    // Decoding checks the CRC32 and SHA-256 of the payload
    let module = Module::load(path).with_context(|| format!("failed to load {}", path.display()))?;
    if let Err(reason) = module.validate() {
        anyhow::bail!("{} is malformed: {}", path.display(), reason);
    }
    verify_module(&module).with_context(|| format!("{} failed verification", path.display()))?;

    let methods: usize = module.types.iter().map(|t| t.methods.len()).sum();
    out.status(
        "Verified",
        &format!(
            "{} ({} types, {} methods)",
            path.display(),
            module.types.len(),
            methods
        ),
    );
    if !module.is_woven() {
        out.note("module has not been woven");
    }
    Ok(())
}
