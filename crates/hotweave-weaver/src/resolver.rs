//! Type resolution across module boundaries
//!
//! Base types of woven classes frequently live outside the module being
//! woven: in the core library, in the runtime contract, or in a referenced
//! module next to the input. The resolver finds their definitions so the
//! weaver can walk complete inheritance chains.

use hotweave_bytecode::{contract, corlib, Module, ModuleError, TypeDef, TypeId};
use rustc_hash::{FxHashMap, FxHashSet};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use thiserror::Error;
use tracing::{debug, warn};

/// Resolution errors
#[derive(Debug, Error)]
pub enum ResolveError {
    /// No module defines the type
    #[error("Type {name} not found (searched {} directories)", searched.len())]
    TypeNotFound {
        /// Full type name
        name: String,
        /// Directories searched for referenced modules
        searched: Vec<PathBuf>,
    },

    /// A referenced module exists but could not be loaded
    #[error("Failed to load referenced module {path}: {source}")]
    Module {
        /// Module file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: ModuleError,
    },

    /// Inheritance chain loops back on itself
    #[error("Inheritance cycle through {0}")]
    Cycle(String),
}

/// A resolved type definition
#[derive(Debug, Clone)]
pub enum TypeHandle {
    /// Defined in the module being woven
    Local(TypeId),
    /// Defined in the core library or a referenced module
    External(Rc<TypeDef>),
}

impl TypeHandle {
    /// Borrow the definition
    pub fn def<'a>(&'a self, module: &'a Module) -> &'a TypeDef {
        match self {
            TypeHandle::Local(id) => module.type_def(*id),
            TypeHandle::External(def) => def,
        }
    }

    /// Id within the woven module, if local
    pub fn local_id(&self) -> Option<TypeId> {
        match self {
            TypeHandle::Local(id) => Some(*id),
            TypeHandle::External(_) => None,
        }
    }
}

/// Resolves type names against the woven module and its references
#[derive(Debug)]
pub struct ModuleResolver {
    search_dirs: Vec<PathBuf>,
    builtin: FxHashMap<String, Rc<TypeDef>>,
    external: RefCell<FxHashMap<String, Rc<TypeDef>>>,
    loaded: RefCell<FxHashSet<String>>,
}

impl ModuleResolver {
    /// Create a resolver searching `search_dirs` for referenced modules
    pub fn new(search_dirs: Vec<PathBuf>) -> Self {
        let mut builtin = FxHashMap::default();
        for module in [corlib::module(), contract::module()] {
            for ty in module.types {
                builtin.insert(ty.name.clone(), Rc::new(ty));
            }
        }
        Self {
            search_dirs,
            builtin,
            external: RefCell::new(FxHashMap::default()),
            loaded: RefCell::new(FxHashSet::default()),
        }
    }

    /// Create a resolver from a semicolon-delimited reference list plus the
    /// directory of the input module
    pub fn from_references(references: &str, input: &Path) -> Self {
        let mut dirs = search_directories(references);
        if let Some(parent) = input.parent() {
            let parent = parent.to_path_buf();
            if !dirs.contains(&parent) {
                dirs.push(parent);
            }
        }
        Self::new(dirs)
    }

    /// Directories searched for referenced modules
    pub fn search_dirs(&self) -> &[PathBuf] {
        &self.search_dirs
    }

    /// Register an already-loaded module as a reference source
    pub fn add_module(&self, module: Module) {
        self.loaded.borrow_mut().insert(module.name().to_string());
        let mut external = self.external.borrow_mut();
        for ty in module.types {
            external.entry(ty.name.clone()).or_insert_with(|| Rc::new(ty));
        }
    }

    /// Resolve a type by full name
    pub fn resolve(&self, module: &Module, name: &str) -> Result<TypeHandle, ResolveError> {
        if let Some(id) = module.find_type(name) {
            return Ok(TypeHandle::Local(id));
        }
        if let Some(def) = self.builtin.get(name) {
            return Ok(TypeHandle::External(Rc::clone(def)));
        }
        self.load_references(module)?;
        if let Some(def) = self.external.borrow().get(name) {
            return Ok(TypeHandle::External(Rc::clone(def)));
        }
        Err(ResolveError::TypeNotFound {
            name: name.to_string(),
            searched: self.search_dirs.clone(),
        })
    }

    /// Base type of `ty`, if it has one
    pub fn base_of(&self, module: &Module, ty: &TypeDef) -> Result<Option<TypeHandle>, ResolveError> {
        match &ty.base {
            Some(base) => self.resolve(module, &base.full_name).map(Some),
            None => Ok(None),
        }
    }

    /// All ancestors of `ty`, nearest first
    pub fn ancestors(&self, module: &Module, ty: &TypeDef) -> Result<Vec<TypeHandle>, ResolveError> {
        let mut seen = FxHashSet::default();
        seen.insert(ty.name.clone());

        let mut chain = Vec::new();
        let mut next = self.base_of(module, ty)?;
        while let Some(handle) = next {
            let def = handle.def(module);
            if !seen.insert(def.name.clone()) {
                return Err(ResolveError::Cycle(def.name.clone()));
            }
            next = self.base_of(module, def)?;
            chain.push(handle);
        }
        Ok(chain)
    }

    /// Check if `ty` or one of its ancestors lists `interface`
    pub fn implements(
        &self,
        module: &Module,
        ty: &TypeDef,
        interface: &str,
    ) -> Result<bool, ResolveError> {
        if ty.implements(interface) {
            return Ok(true);
        }
        Ok(self
            .ancestors(module, ty)?
            .iter()
            .any(|a| a.def(module).implements(interface)))
    }

    /// Load every module transitively referenced by `module` that is not yet loaded
    fn load_references(&self, module: &Module) -> Result<(), ResolveError> {
        let mut pending: Vec<String> = module.references.clone();
        while let Some(name) = pending.pop() {
            if name == corlib::MODULE_NAME || name == contract::RUNTIME_MODULE {
                continue;
            }
            if !self.loaded.borrow_mut().insert(name.clone()) {
                continue;
            }

            let Some(path) = self.locate(&name) else {
                warn!("Referenced module {} not found in search directories", name);
                continue;
            };
            debug!("Loading referenced module {}", path.display());
            let referenced = Module::load(&path).map_err(|source| ResolveError::Module {
                path: path.clone(),
                source,
            })?;
            pending.extend(referenced.references.iter().cloned());

            let mut external = self.external.borrow_mut();
            for ty in referenced.types {
                external.entry(ty.name.clone()).or_insert_with(|| Rc::new(ty));
            }
        }
        Ok(())
    }

    fn locate(&self, name: &str) -> Option<PathBuf> {
        let file = format!("{}.{}", name, hotweave_bytecode::module::EXTENSION);
        self.search_dirs
            .iter()
            .map(|dir| dir.join(&file))
            .find(|path| path.is_file())
    }
}

/// Directories containing the modules of a semicolon-delimited reference list
///
/// `//` is collapsed to `/`, empty entries are ignored and each directory is
/// listed once, in first-seen order.
pub fn search_directories(references: &str) -> Vec<PathBuf> {
    let normalized = references.replace("//", "/");
    let mut dirs: Vec<PathBuf> = Vec::new();
    for entry in normalized.split(';').map(str::trim).filter(|e| !e.is_empty()) {
        let Some(parent) = Path::new(entry).parent() else {
            continue;
        };
        let parent = if parent.as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            parent.to_path_buf()
        };
        if !dirs.contains(&parent) {
            dirs.push(parent);
        }
    }
    dirs
}
