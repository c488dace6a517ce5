//! Type ordering and eligibility
//!
//! Types are woven base-first so that a derived type always sees the
//! capability its in-module ancestors were given. Eligibility rules decide
//! which types and methods are left untouched.

use crate::config::WeavePolicy;
use hotweave_bytecode::{contract, MethodDef, Module, TypeDef, TypeId};
use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;

/// In-module inheritance forest
#[derive(Debug, Clone)]
pub struct TypeGraph {
    parents: Vec<Option<TypeId>>,
}

impl TypeGraph {
    /// Build the graph of in-module base links
    pub fn build(module: &Module) -> Self {
        let by_name: FxHashMap<&str, TypeId> = module
            .type_ids()
            .map(|id| (module.type_def(id).name.as_str(), id))
            .collect();
        let parents = module
            .types
            .iter()
            .map(|ty| {
                ty.base
                    .as_ref()
                    .and_then(|b| by_name.get(b.full_name.as_str()).copied())
            })
            .collect();
        Self { parents }
    }

    /// In-module base type of `id`
    pub fn parent(&self, id: TypeId) -> Option<TypeId> {
        self.parents.get(id.index()).copied().flatten()
    }

    /// In-module ancestors of `id`, root-most first
    ///
    /// Stops at the first repeated type, so a malformed cyclic chain still
    /// terminates.
    pub fn ancestors(&self, id: TypeId) -> Vec<TypeId> {
        let mut seen = FxHashSet::default();
        seen.insert(id);
        let mut chain = Vec::new();
        let mut current = self.parent(id);
        while let Some(parent) = current {
            if !seen.insert(parent) {
                break;
            }
            chain.push(parent);
            current = self.parent(parent);
        }
        chain.reverse();
        chain
    }
}

/// Weaving order: every type after its in-module ancestors, no duplicates
///
/// Only types with a base link are candidates, which leaves out interfaces
/// and root types.
pub fn ordered_types(module: &Module) -> Vec<TypeId> {
    let graph = TypeGraph::build(module);
    let mut order = Vec::with_capacity(module.types.len());
    let mut placed = FxHashSet::default();

    for id in module.type_ids() {
        if module.type_def(id).base.is_none() {
            continue;
        }
        for ancestor in graph.ancestors(id) {
            if placed.insert(ancestor) {
                order.push(ancestor);
            }
        }
        if placed.insert(id) {
            order.push(id);
        }
    }
    order
}

/// Why a type or method was left unwoven
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Type name ends with the delegate suffix
    DelegateName,
    /// Type derives from a delegate base
    DelegateType,
    /// Value type
    ValueType,
    /// Enumeration
    Enum,
    /// Interface
    Interface,
    /// Compiler-synthesized method
    CompilerGenerated,
    /// Method takes a by-reference parameter
    ByRefParameter,
    /// Member added by the weaver
    Injected,
    /// Abstract or runtime-implemented method
    NoBody,
    /// Static type initializer
    TypeInitializer,
    /// Instance method of an abstract type without the capability
    NoCapability,
    /// Inherited method is abstract, nothing to call
    AbstractBase,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::DelegateName => "delegate-named type",
            SkipReason::DelegateType => "delegate type",
            SkipReason::ValueType => "value type",
            SkipReason::Enum => "enum",
            SkipReason::Interface => "interface",
            SkipReason::CompilerGenerated => "compiler generated",
            SkipReason::ByRefParameter => "by-reference parameter",
            SkipReason::Injected => "injected member",
            SkipReason::NoBody => "no body",
            SkipReason::TypeInitializer => "type initializer",
            SkipReason::NoCapability => "abstract type without capability",
            SkipReason::AbstractBase => "abstract base method",
        };
        f.write_str(text)
    }
}

/// Reason to leave a whole type alone, if any
pub fn type_skip_reason(policy: &WeavePolicy, ty: &TypeDef) -> Option<SkipReason> {
    if ty.is_interface() {
        Some(SkipReason::Interface)
    } else if policy.has_delegate_name(ty) {
        Some(SkipReason::DelegateName)
    } else if policy.is_delegate(ty) {
        Some(SkipReason::DelegateType)
    } else if policy.is_enum(ty) {
        Some(SkipReason::Enum)
    } else if policy.is_value_type(ty) {
        Some(SkipReason::ValueType)
    } else {
        None
    }
}

/// Reason to leave a method alone, if any
pub fn method_skip_reason(policy: &WeavePolicy, method: &MethodDef) -> Option<SkipReason> {
    if is_injected(method) {
        Some(SkipReason::Injected)
    } else if policy.is_compiler_generated(method) {
        Some(SkipReason::CompilerGenerated)
    } else if !method.has_body() {
        Some(SkipReason::NoBody)
    } else if method.is_type_initializer() {
        Some(SkipReason::TypeInitializer)
    } else if method.has_by_ref_params() {
        Some(SkipReason::ByRefParameter)
    } else {
        None
    }
}

/// Members the weaver itself adds
fn is_injected(method: &MethodDef) -> bool {
    method.name == contract::INSTANCE_METHODS_GETTER
        || method.name == contract::GET_INSTANCE_METHOD
        || method.name.starts_with(contract::BASE_CALL_PREFIX)
}
