//! Generic instantiation registry.
//!
//! Monomorphization happens at the type level: every distinct
//! `(base name, argument types)` pair gets exactly one registry entry and
//! exactly one specialized `type` symbol, inserted into the *defining*
//! module's global scope under the mangled name. The registry is owned by
//! the project-wide analysis call and shared by every per-module analyzer
//! so the uniqueness invariant holds across modules.

use crate::mangle;
use crate::symtable::{FieldDef, ModuleId, Symbol, SymbolKind};
use crate::types::{Type, TypeArgs};

/// One monomorphization of a generic struct or enum.
#[derive(Debug, Clone)]
pub struct GenericInstantiation {
    pub base_name: String,
    pub args: Vec<Type>,
    pub mangled: String,
    /// Module whose global scope owns the specialized symbol.
    pub module: ModuleId,
}

#[derive(Debug, Default)]
pub struct InstantiationRegistry {
    entries: Vec<GenericInstantiation>,
}

impl InstantiationRegistry {
    pub fn find(&self, base_name: &str, args: &[Type]) -> Option<&GenericInstantiation> {
        self.entries
            .iter()
            .find(|inst| inst.base_name == base_name && inst.args == args)
    }

    /// Looks up or creates the entry for `(base_name, args)`. Returns the
    /// mangled name and whether the entry was newly created.
    pub fn register(&mut self, base_name: &str, args: &[Type], module: ModuleId) -> (String, bool) {
        if let Some(existing) = self.find(base_name, args) {
            return (existing.mangled.clone(), false);
        }
        let mangled = mangle::instantiation(base_name, args);
        self.entries.push(GenericInstantiation {
            base_name: base_name.to_owned(),
            args: args.to_vec(),
            mangled: mangled.clone(),
            module,
        });
        (mangled, true)
    }

    pub fn entries(&self) -> &[GenericInstantiation] {
        &self.entries
    }
}

/// Builds the specialized `type` symbol for a generic struct/enum symbol:
/// fields go through substitution, enum variants are copied (variants carry
/// no payload types).
pub fn specialize_type_symbol(generic: &Symbol, mangled: &str, args: &[Type]) -> Symbol {
    let is_enum = matches!(generic.ty, Some(Type::Enum { .. }));
    let ty = if is_enum {
        Type::named_enum(mangled, TypeArgs::new())
    } else {
        Type::named_struct(mangled, TypeArgs::new())
    };

    let mut specialized = Symbol::new(mangled, SymbolKind::Type, Some(ty), generic.loc);
    specialized.is_public = generic.is_public;
    specialized.is_packed = generic.is_packed;

    if is_enum {
        specialized.variants = generic.variants.clone();
    } else {
        specialized.fields = generic
            .fields
            .iter()
            .map(|field| FieldDef {
                name: field.name.clone(),
                ty: field.ty.substitute(&generic.type_params, args),
            })
            .collect();
    }
    specialized
}
