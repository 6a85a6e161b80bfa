//! Symbol tables and lexical scopes.
//!
//! Each module owns one [`SymbolTable`]: a stack of [`Scope`]s whose first
//! entry is the module's global scope. Scopes are ordered maps so symbol
//! iteration (and therefore emitted C) is deterministic. Module-kind
//! symbols reference their target module by [`ModuleId`] — cross-module
//! lookup goes through the project's module list rather than a borrowed
//! pointer.

use indexmap::IndexMap;
use strum::Display;

use crate::ast::Loc;
use crate::types::Type;

/// Index of a module within its owning project.
pub type ModuleId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SymbolKind {
    #[strum(serialize = "variable")]
    Variable,
    #[strum(serialize = "function")]
    Function,
    #[strum(serialize = "type")]
    Type,
    #[strum(serialize = "module")]
    Module,
    #[strum(serialize = "constant")]
    Constant,
}

/// A resolved struct field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub ty: Type,
}

/// One named entity. The payload fields beyond `kind`/`ty` are only
/// meaningful for the kinds that use them (generic parameter names on
/// types and functions, the variant list on enums, the module id on module
/// symbols, and so on).
#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub ty: Option<Type>,
    pub is_const: bool,
    pub is_initialized: bool,
    pub is_public: bool,
    pub is_packed: bool,
    pub is_extern: bool,
    pub is_variadic: bool,
    pub loc: Loc,
    /// 0 = global, >0 = nesting depth at declaration.
    pub scope_depth: usize,
    pub param_count: usize,
    pub type_params: Vec<String>,
    pub enum_value: i64,
    pub variants: Vec<String>,
    pub module_id: Option<ModuleId>,
    pub fields: Vec<FieldDef>,
}

impl Symbol {
    pub fn new(name: impl Into<String>, kind: SymbolKind, ty: Option<Type>, loc: Loc) -> Self {
        Self {
            name: name.into(),
            kind,
            ty,
            is_const: false,
            is_initialized: false,
            is_public: false,
            is_packed: false,
            is_extern: false,
            is_variadic: false,
            loc,
            scope_depth: 0,
            param_count: 0,
            type_params: Vec::new(),
            enum_value: 0,
            variants: Vec::new(),
            module_id: None,
            fields: Vec::new(),
        }
    }
}

/// One lexical scope: symbols in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    symbols: IndexMap<String, Symbol>,
}

impl Scope {
    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values()
    }
}

/// A module's scope stack. Index 0 is the global scope and is never popped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SymbolTable {
    /// Module name, used for mangling.
    pub name: Option<String>,
    scopes: Vec<Scope>,
}

impl SymbolTable {
    pub fn new(name: Option<String>) -> Self {
        Self {
            name,
            scopes: vec![Scope::default()],
        }
    }

    /// Current nesting depth; 0 when only the global scope is open.
    pub fn depth(&self) -> usize {
        self.scopes.len().saturating_sub(1)
    }

    pub fn enter_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    /// Pops the innermost scope. Exiting the global scope is a caller bug
    /// and is refused.
    pub fn exit_scope(&mut self) -> bool {
        if self.scopes.len() <= 1 {
            return false;
        }
        self.scopes.pop();
        true
    }

    fn current_mut(&mut self) -> &mut Scope {
        self.scopes.last_mut().expect("scope stack never empty")
    }

    fn current(&self) -> &Scope {
        self.scopes.last().expect("scope stack never empty")
    }

    pub fn global(&self) -> &Scope {
        &self.scopes[0]
    }

    /// Inserts into the current scope. Only the current scope is checked
    /// for duplicates, so shadowing in nested scopes is allowed; returns
    /// false on a duplicate and the caller reports.
    pub fn insert(&mut self, symbol: Symbol) -> bool {
        let scope = self.current_mut();
        if scope.symbols.contains_key(&symbol.name) {
            return false;
        }
        scope.symbols.insert(symbol.name.clone(), symbol);
        true
    }

    /// Inserts directly into the global scope regardless of the current
    /// nesting (used for monomorphized specializations).
    pub fn insert_global(&mut self, symbol: Symbol) -> bool {
        let scope = &mut self.scopes[0];
        if scope.symbols.contains_key(&symbol.name) {
            return false;
        }
        scope.symbols.insert(symbol.name.clone(), symbol);
        true
    }

    /// Walks from the innermost scope toward the global one.
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.scopes.iter().rev().find_map(|scope| scope.symbols.get(name))
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut Symbol> {
        self.scopes.iter_mut().rev().find_map(|scope| scope.symbols.get_mut(name))
    }

    /// Searches only the innermost scope.
    pub fn lookup_current(&self, name: &str) -> Option<&Symbol> {
        self.current().symbols.get(name)
    }

    /// Searches only the global scope (cross-module resolution applies
    /// this to the imported module's table).
    pub fn lookup_global(&self, name: &str) -> Option<&Symbol> {
        self.scopes[0].symbols.get(name)
    }

    pub fn lookup_global_mut(&mut self, name: &str) -> Option<&mut Symbol> {
        self.scopes[0].symbols.get_mut(name)
    }
}
