//! Weaving pipeline
//!
//! Load → order → per type: capability, methods, overrides → verify → write.

use crate::capability::{ensure_capability, Capability};
use crate::config::{WeaveOptions, WeavePolicy};
use crate::error::{WeaveError, WeaveResult};
use crate::ordering::{method_skip_reason, ordered_types, type_skip_reason, SkipReason};
use crate::overrides::{find_base_method, overridable_methods};
use crate::resolver::ModuleResolver;
use crate::weave::{base_call_shim, override_method, weave_method, Dispatch};
use hotweave_bytecode::module::{field_flags, flags};
use hotweave_bytecode::{
    contract, verify_module, DebugSymbols, FieldDef, FieldRef, MethodDef, MethodRef, Module,
    TypeId,
};
use std::io::Write;
use std::path::Path;
use tracing::{debug, info, warn};

/// Something the weaver left untouched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    /// Declaring type
    pub type_name: String,
    /// Method key, `None` when the whole type was skipped
    pub method: Option<String>,
    /// Why
    pub reason: SkipReason,
}

/// Summary of one weave
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeaveReport {
    /// Types that went through the weaver
    pub types_woven: usize,
    /// Method bodies rewritten (synthesized overrides included)
    pub methods_woven: usize,
    /// Overrides added for inherited virtual methods
    pub overrides_synthesized: usize,
    /// `HotReloadingBase_` shims added
    pub shims_emitted: usize,
    /// Excluded types and methods
    pub skipped: Vec<SkippedEntry>,
}

impl WeaveReport {
    fn skip(&mut self, type_name: &str, method: Option<String>, reason: SkipReason) {
        debug!(
            "Skipping {}{}: {}",
            type_name,
            method.as_deref().map(|m| format!("::{}", m)).unwrap_or_default(),
            reason
        );
        self.skipped.push(SkippedEntry {
            type_name: type_name.to_string(),
            method,
            reason,
        });
    }
}

/// The build task
#[derive(Debug, Clone, Default)]
pub struct Weaver {
    options: WeaveOptions,
    policy: WeavePolicy,
}

impl Weaver {
    /// Create a weaver
    pub fn new(options: WeaveOptions, policy: WeavePolicy) -> Self {
        Self { options, policy }
    }

    /// Build-task options
    pub fn options(&self) -> &WeaveOptions {
        &self.options
    }

    /// Exclusion rules
    pub fn policy(&self) -> &WeavePolicy {
        &self.policy
    }

    /// Weave `project_dir/assembly` into the configured output (in place by default)
    pub fn execute(&self) -> WeaveResult<WeaveReport> {
        let input = self.options.input_path();
        let output = self.options.output_path();
        self.inject(&input, &output)
    }

    /// Weave the module at `input` and write it to `output`
    ///
    /// Nothing is written unless weaving and verification succeed. Equal
    /// paths weave in place.
    pub fn inject(&self, input: &Path, output: &Path) -> WeaveResult<WeaveReport> {
        info!("Loading {}", input.display());
        let mut module = Module::load(input)?;
        if module.is_woven() {
            return Err(WeaveError::AlreadyWoven(input.display().to_string()));
        }

        let symbols_path = DebugSymbols::path_for(input);
        let mut symbols = if symbols_path.is_file() {
            Some(DebugSymbols::read_from(&symbols_path)?)
        } else {
            None
        };

        let resolver = ModuleResolver::from_references(&self.options.references, input);
        let report = self.weave_module(&mut module, &resolver, symbols.as_mut())?;

        let write_symbols = self.options.write_symbols();
        if write_symbols {
            module.flags |= flags::HAS_DEBUG_INFO;
        }
        write_atomically(output, &module.encode())?;
        if write_symbols {
            let symbols = symbols.unwrap_or_default();
            write_atomically(&DebugSymbols::path_for(output), &symbols.encode())?;
        }
        info!(
            "Wove {} types, {} methods into {}",
            report.types_woven,
            report.methods_woven,
            output.display()
        );
        Ok(report)
    }

    /// Weave an in-memory module
    ///
    /// Sequence points in `symbols` are remapped to the woven bodies.
    pub fn weave_module(
        &self,
        module: &mut Module,
        resolver: &ModuleResolver,
        mut symbols: Option<&mut DebugSymbols>,
    ) -> WeaveResult<WeaveReport> {
        if module.is_woven() {
            return Err(WeaveError::AlreadyWoven(module.name().to_string()));
        }

        let mut report = WeaveReport::default();
        for id in ordered_types(module) {
            let ty = module.type_def(id);
            if let Some(reason) = type_skip_reason(&self.policy, ty) {
                let name = ty.name.clone();
                report.skip(&name, None, reason);
                continue;
            }
            self.weave_type(module, id, resolver, symbols.as_deref_mut(), &mut report)?;
        }

        module.flags |= flags::WOVEN;
        module.add_reference(contract::RUNTIME_MODULE);
        verify_module(module)?;
        Ok(report)
    }

    fn weave_type(
        &self,
        module: &mut Module,
        id: TypeId,
        resolver: &ModuleResolver,
        mut symbols: Option<&mut DebugSymbols>,
        report: &mut WeaveReport,
    ) -> WeaveResult<()> {
        let original_count = module.type_def(id).methods.len();
        let declaring = module.type_def(id).as_type_ref();
        info!("Weaving Type: {}", declaring);

        let capability = ensure_capability(module, id, resolver)?;
        let instance_dispatch = match &capability {
            Capability::Instance { accessor } => Some(Dispatch::Instance {
                accessor: accessor.clone(),
            }),
            Capability::Unavailable => None,
        };

        let mut ctor_field: Option<FieldRef> = None;
        for index in 0..original_count {
            let method = &module.type_def(id).methods[index];
            let key = method.key();
            if let Some(reason) = method_skip_reason(&self.policy, method) {
                report.skip(&declaring.full_name, Some(key), reason);
                continue;
            }

            let dispatch = if method.is_static() {
                Dispatch::Static
            } else if let Some(dispatch) = &instance_dispatch {
                dispatch.clone()
            } else {
                warn!(
                    "Not weaving {}::{}: abstract type without {}",
                    declaring,
                    key,
                    contract::INSTANCE_CLASS_INTERFACE
                );
                report.skip(&declaring.full_name, Some(key), SkipReason::NoCapability);
                continue;
            };

            let is_constructor = method.is_constructor();
            let wants_shim = method.is_virtual() && !method.has_optional_params();
            if is_constructor && ctor_field.is_none() {
                ctor_field = Some(ensure_ctor_field(module, id));
            }

            debug!("\tWeaving Method {}", key);
            let method = &mut module.type_def_mut(id).methods[index];
            let field = if is_constructor { ctor_field.as_ref() } else { None };
            let positions = weave_method(method, &declaring, &dispatch, field)?;
            if let Some(symbols) = symbols.as_deref_mut() {
                symbols.remap(&declaring.full_name, &key, &positions);
            }
            report.methods_woven += 1;

            if wants_shim {
                let signature = module.type_def(id).methods[index].clone();
                let base = find_base_method(module, module.type_def(id), &signature, resolver)?;
                if let Some(base) = base {
                    self.add_shim(module, id, &signature, base, report)?;
                }
            }
        }

        if let Some(dispatch) = &instance_dispatch {
            let ty = module.type_def(id);
            if self.options.allow_override && !ty.is_abstract() && !ty.is_sealed() {
                self.synthesize_overrides(module, id, resolver, dispatch, report)?;
            }
        }

        report.types_woven += 1;
        Ok(())
    }

    fn synthesize_overrides(
        &self,
        module: &mut Module,
        id: TypeId,
        resolver: &ModuleResolver,
        dispatch: &Dispatch,
        report: &mut WeaveReport,
    ) -> WeaveResult<()> {
        let declaring = module.type_def(id).as_type_ref();
        let candidates = overridable_methods(module, module.type_def(id), resolver, &self.policy)?;

        for record in candidates {
            let ty = module.type_def(id);
            if ty.methods.iter().any(|m| m.signature_eq(&record.method)) {
                continue;
            }
            let key = record.method.key();
            if record.method.has_by_ref_params() {
                report.skip(&declaring.full_name, Some(key), SkipReason::ByRefParameter);
                continue;
            }
            if record.method.is_abstract() {
                report.skip(&declaring.full_name, Some(key), SkipReason::AbstractBase);
                continue;
            }

            debug!("\tSynthesizing override {}", key);
            let mut synthesized = override_method(&record.method, record.base.clone())?;
            weave_method(&mut synthesized, &declaring, dispatch, None)?;
            module.type_def_mut(id).methods.push(synthesized);
            report.overrides_synthesized += 1;
            report.methods_woven += 1;

            if !record.method.has_optional_params() {
                self.add_shim(module, id, &record.method, record.base, report)?;
            }
        }
        Ok(())
    }

    fn add_shim(
        &self,
        module: &mut Module,
        id: TypeId,
        signature: &MethodDef,
        base: MethodRef,
        report: &mut WeaveReport,
    ) -> WeaveResult<()> {
        let shim = base_call_shim(signature, base)?;
        let ty = module.type_def_mut(id);
        if ty.methods.iter().any(|m| m.same_params(&shim)) {
            return Ok(());
        }
        debug!("\tAdding base call {}", shim.key());
        ty.methods.push(shim);
        report.shims_emitted += 1;
        Ok(())
    }
}

/// Per-type list receiving captured constructor arguments
fn ensure_ctor_field(module: &mut Module, id: TypeId) -> FieldRef {
    let ty = module.type_def_mut(id);
    if let Some(existing) = ty.find_field(contract::CTOR_PARAMETERS_FIELD) {
        return ty.field_ref(existing);
    }
    let field = FieldDef {
        name: contract::CTOR_PARAMETERS_FIELD.to_string(),
        field_type: contract::array_list(),
        attributes: field_flags::PUBLIC,
    };
    let field_ref = ty.field_ref(&field);
    ty.fields.push(field);
    field_ref
}

/// Write through a temporary file in the destination directory, then rename
fn write_atomically(path: &Path, bytes: &[u8]) -> WeaveResult<()> {
    let io_error = |source| WeaveError::Io {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(io_error)?;
    file.write_all(bytes).map_err(io_error)?;
    file.as_file().sync_all().map_err(io_error)?;
    file.persist(path).map_err(|e| io_error(e.error))?;
    Ok(())
}
