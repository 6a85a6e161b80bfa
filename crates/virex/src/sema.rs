//! Semantic analysis.
//!
//! One [`Analyzer`] is created per module per phase; it borrows every
//! module's symbol table so cross-module lookups and monomorphized symbol
//! insertion work without pointer aliasing. Phase A ([`Analyzer::declare`])
//! runs the forward type pass, the population pass, and the function/global
//! pass; phase C ([`Analyzer::analyze_bodies`]) type-checks every function
//! body and global initializer. Expression analysis writes the resolved
//! type onto the expression node and never panics on ill-typed input — a
//! bad subexpression yields `None` and sibling checks continue.

use crate::ast::{DeclKind, Expr, ExprKind, Literal, Loc, Program, Stmt, StmtKind, VarDecl};
use crate::errors::{suggest_name, Diagnostic, ErrorReporter, Level};
use crate::generics::{specialize_type_symbol, InstantiationRegistry};
use crate::mangle;
use crate::symtable::{FieldDef, ModuleId, Symbol, SymbolKind, SymbolTable};
use crate::token::TokenKind;
use crate::types::{Prim, Type};

pub struct Analyzer<'a> {
    tables: &'a mut [SymbolTable],
    module: ModuleId,
    filename: &'a str,
    strict_unsafe: bool,
    reporter: &'a mut ErrorReporter,
    registry: &'a mut InstantiationRegistry,
    ret_type: Option<Type>,
    loop_depth: usize,
    in_unsafe: bool,
    unsafe_op_seen: bool,
}

impl<'a> Analyzer<'a> {
    pub fn new(
        tables: &'a mut [SymbolTable],
        module: ModuleId,
        filename: &'a str,
        strict_unsafe: bool,
        reporter: &'a mut ErrorReporter,
        registry: &'a mut InstantiationRegistry,
    ) -> Self {
        Self {
            tables,
            module,
            filename,
            strict_unsafe,
            reporter,
            registry,
            ret_type: None,
            loop_depth: 0,
            in_unsafe: false,
            unsafe_op_seen: false,
        }
    }

    fn table(&self) -> &SymbolTable {
        &self.tables[self.module]
    }

    fn table_mut(&mut self) -> &mut SymbolTable {
        &mut self.tables[self.module]
    }

    fn module_name(&self) -> String {
        self.table().name.clone().unwrap_or_default()
    }

    // --- Diagnostics ---

    fn error(&mut self, loc: Loc, message: impl Into<String>) {
        self.report(Level::Error, None, loc, message.into(), None);
    }

    fn error_code(&mut self, code: &'static str, loc: Loc, message: impl Into<String>, suggestion: &str) {
        self.report(Level::Error, Some(code), loc, message.into(), Some(suggestion.to_owned()));
    }

    fn warning(&mut self, loc: Loc, message: impl Into<String>) {
        self.report(Level::Warning, None, loc, message.into(), None);
    }

    fn report(
        &mut self,
        level: Level,
        code: Option<&'static str>,
        loc: Loc,
        message: String,
        suggestion: Option<String>,
    ) {
        self.reporter.report(Diagnostic {
            level,
            code,
            file: self.filename.to_owned(),
            line: loc.line,
            column: loc.column,
            message,
            suggestion,
            note: None,
        });
    }

    // --- Cross-module lookup helpers ---

    /// The module-kind symbol for `name`, if any.
    fn module_ref(&self, name: &str) -> Option<(ModuleId, String)> {
        let sym = self.table().lookup(name)?;
        if sym.kind != SymbolKind::Module {
            return None;
        }
        Some((sym.module_id?, sym.name.clone()))
    }

    fn lookup_in_module(&self, module: ModuleId, name: &str) -> Option<Symbol> {
        self.tables[module].lookup(name).cloned()
    }

    /// Finds a type symbol: a qualified `mod.Type` path, then the current
    /// module's scopes, then every imported module.
    fn find_type_symbol(&self, name: &str) -> Option<(ModuleId, Symbol)> {
        if let Some((module_part, type_part)) = name.split_once('.')
            && let Some((target, _)) = self.module_ref(module_part)
            && let Some(found) = self.lookup_in_module(target, type_part)
            && found.kind == SymbolKind::Type
        {
            return Some((target, found));
        }

        if let Some(sym) = self.table().lookup(name)
            && sym.kind == SymbolKind::Type
        {
            return Some((self.module, sym.clone()));
        }

        for sym in self.table().global().iter() {
            if sym.kind == SymbolKind::Module
                && let Some(target) = sym.module_id
                && let Some(found) = self.lookup_in_module(target, name)
                && found.kind == SymbolKind::Type
            {
                return Some((target, found));
            }
        }

        None
    }

    // --- Type resolution and monomorphization ---

    /// Resolves named type references in place: rewrites struct/enum names
    /// to their module-mangled (or instantiation-mangled) form, flips
    /// struct references that name enums, and registers generic
    /// instantiations.
    pub fn resolve_type(&mut self, ty: &mut Type, loc: Loc) {
        match ty {
            Type::Pointer { base, .. } => self.resolve_type(base, loc),
            Type::Array { elem, .. } | Type::Slice { elem } => self.resolve_type(elem, loc),
            Type::Function { ret, params } => {
                self.resolve_type(ret, loc);
                for param in params {
                    self.resolve_type(param, loc);
                }
            }
            Type::Result { ok, err } => {
                self.resolve_type(ok, loc);
                self.resolve_type(err, loc);
            }
            Type::Struct { .. } | Type::Enum { .. } => self.resolve_named(ty, loc),
            Type::Prim(_) => {}
        }
    }

    fn resolve_named(&mut self, ty: &mut Type, loc: Loc) {
        let name = ty.nominal_name().expect("resolve_named only sees nominal types").to_owned();
        let found = self.find_type_symbol(&name);

        // Enum references parse as struct types; flip once the symbol is known.
        if let Some((_, sym)) = &found
            && matches!(sym.ty, Some(Type::Enum { .. }))
            && matches!(ty, Type::Struct { .. })
            && let Type::Struct { name, args } = ty.clone()
        {
            *ty = Type::Enum { name, args };
        }

        // Resolve generic arguments first.
        let args_snapshot = {
            let args = match ty {
                Type::Struct { args, .. } | Type::Enum { args, .. } => args,
                _ => unreachable!(),
            };
            for arg in args.iter_mut() {
                self.resolve_type(arg, loc);
            }
            args.iter().cloned().collect::<Vec<Type>>()
        };

        let Some((def_module, sym)) = found else {
            return;
        };

        if args_snapshot.is_empty() {
            // Plain reference: rewrite to the symbol's (module-mangled) name.
            if let Some(mangled) = sym.ty.as_ref().and_then(Type::nominal_name)
                && mangled != name
            {
                match ty {
                    Type::Struct { name, .. } | Type::Enum { name, .. } => *name = mangled.to_owned(),
                    _ => {}
                }
            }
            return;
        }

        if sym.type_params.len() != args_snapshot.len() {
            self.error(
                loc,
                format!(
                    "type '{}' expects {} type arguments, got {}",
                    name,
                    sym.type_params.len(),
                    args_snapshot.len()
                ),
            );
            return;
        }

        // Register the instantiation under the symbol's source name, so
        // `Pair<i32, i64>` specializes to `Pair_i32_i64`.
        let (mangled, created) = self.registry.register(&sym.name, &args_snapshot, def_module);
        if created || self.tables[def_module].lookup_global(&mangled).is_none() {
            let specialized = specialize_type_symbol(&sym, &mangled, &args_snapshot);
            let _ = self.tables[def_module].insert_global(specialized);
        }

        match ty {
            Type::Struct { name, .. } | Type::Enum { name, .. } => *name = mangled,
            _ => {}
        }
    }

    // --- Phase A: declarations ---

    pub fn declare(&mut self, program: &mut Program) {
        self.forward_declare_types(program);
        self.populate_types(program);
        self.declare_functions_and_globals(program);
    }

    /// Pass 1: create a `type` symbol (plus its mangled twin) for every
    /// struct/enum declaration so later passes can reference them freely.
    fn forward_declare_types(&mut self, program: &Program) {
        let module_name = self.module_name();
        for decl in &program.decls {
            let (name, is_enum, is_public, is_packed) = match &decl.kind {
                DeclKind::Struct(s) => (s.name.clone(), false, s.is_public, s.is_packed),
                DeclKind::Enum(e) => (e.name.clone(), true, e.is_public, false),
                _ => continue,
            };
            let mangled = mangle::qualified(&module_name, &name);
            let ty = if is_enum {
                Type::named_enum(mangled.as_str(), Default::default())
            } else {
                Type::named_struct(mangled.as_str(), Default::default())
            };

            let mut symbol = Symbol::new(name.as_str(), SymbolKind::Type, Some(ty.clone()), decl.loc);
            symbol.is_public = is_public;
            symbol.is_packed = is_packed;
            if !self.table_mut().insert(symbol) {
                let kind = if is_enum { "enum" } else { "struct" };
                self.error(decl.loc, format!("duplicate declaration of {kind} '{name}'"));
                continue;
            }

            if mangled != name {
                let mut twin = Symbol::new(mangled.as_str(), SymbolKind::Type, Some(ty), decl.loc);
                twin.is_public = is_public;
                twin.is_packed = is_packed;
                let _ = self.table_mut().insert(twin);
            }
        }
    }

    /// Pass 2: resolve field types, store field/variant lists on the
    /// symbols, and create one constant symbol per enum variant.
    fn populate_types(&mut self, program: &mut Program) {
        let module_name = self.module_name();
        for decl in &mut program.decls {
            let loc = decl.loc;
            match &mut decl.kind {
                DeclKind::Struct(s) => {
                    let mut fields = Vec::with_capacity(s.fields.len());
                    // Resolve before borrowing the symbol: resolution may
                    // insert monomorphized symbols into this very table.
                    let type_params = s.type_params.clone();
                    let name = s.name.clone();
                    for field in &mut s.fields {
                        self.resolve_type(&mut field.ty, loc);
                        fields.push(FieldDef {
                            name: field.name.clone(),
                            ty: field.ty.clone(),
                        });
                    }

                    let Some(symbol) = self.tables[self.module].lookup_global_mut(&name) else {
                        continue;
                    };
                    symbol.type_params = type_params.clone();
                    symbol.fields = fields.clone();

                    let mangled = mangle::qualified(&module_name, &name);
                    if mangled != name
                        && let Some(twin) = self.tables[self.module].lookup_global_mut(&mangled)
                    {
                        twin.type_params = type_params;
                        twin.fields = fields;
                    }
                }
                DeclKind::Enum(e) => {
                    let name = e.name.clone();
                    let type_params = e.type_params.clone();
                    let variants = e.variants.clone();
                    let is_public = e.is_public;

                    let enum_ty = {
                        let Some(symbol) = self.tables[self.module].lookup_global_mut(&name) else {
                            continue;
                        };
                        symbol.type_params = type_params.clone();
                        symbol.variants = variants.clone();
                        symbol.ty.clone()
                    };

                    for (ordinal, variant) in variants.iter().enumerate() {
                        let mut constant = Symbol::new(variant.as_str(), SymbolKind::Constant, enum_ty.clone(), loc);
                        constant.is_initialized = true;
                        constant.is_public = is_public;
                        constant.enum_value = ordinal as i64;
                        let _ = self.table_mut().insert(constant);
                    }

                    let mangled = mangle::qualified(&module_name, &name);
                    if mangled != name
                        && let Some(twin) = self.tables[self.module].lookup_global_mut(&mangled)
                    {
                        twin.type_params = type_params;
                        twin.variants = variants;
                    }
                }
                _ => {}
            }
        }
    }

    /// Pass 3: function and global-variable symbols.
    fn declare_functions_and_globals(&mut self, program: &mut Program) {
        for decl in &mut program.decls {
            let loc = decl.loc;
            match &mut decl.kind {
                DeclKind::Function(f) => {
                    if self.table().lookup_current(&f.name).is_some() {
                        let name = f.name.clone();
                        self.error(loc, format!("duplicate declaration of function '{name}'"));
                        continue;
                    }

                    self.resolve_type(&mut f.ret, loc);
                    for param in &mut f.params {
                        self.resolve_type(&mut param.ty, loc);
                    }

                    let func_ty = Type::function(f.ret.clone(), f.params.iter().map(|p| p.ty.clone()).collect());
                    let mut symbol = Symbol::new(f.name.as_str(), SymbolKind::Function, Some(func_ty), loc);
                    symbol.param_count = f.params.len();
                    symbol.is_public = f.is_public;
                    symbol.is_extern = f.is_extern;
                    symbol.is_variadic = f.is_variadic;
                    symbol.type_params = f.type_params.clone();
                    let _ = self.table_mut().insert(symbol);
                }
                DeclKind::Global(g) => {
                    if self.table().lookup_current(&g.var.name).is_some() {
                        let name = g.var.name.clone();
                        self.error(loc, format!("duplicate declaration of variable '{name}'"));
                        continue;
                    }
                    self.resolve_type(&mut g.var.ty, loc);
                    let mut symbol = Symbol::new(g.var.name.as_str(), SymbolKind::Variable, Some(g.var.ty.clone()), loc);
                    symbol.is_public = g.is_public;
                    symbol.is_const = g.var.is_const;
                    let _ = self.table_mut().insert(symbol);
                }
                _ => {}
            }
        }
    }

    // --- Phase C: bodies ---

    pub fn analyze_bodies(&mut self, program: &mut Program) {
        for decl in &mut program.decls {
            let loc = decl.loc;
            match &mut decl.kind {
                DeclKind::Function(f) => {
                    let Some(body) = f.body.as_mut() else { continue };

                    // Generic bodies are checked per instantiation: their
                    // parameter types are placeholder names that would fail
                    // every operator rule here. Only the return-path shape
                    // is validated on the template itself.
                    if !f.type_params.is_empty() {
                        if !f.ret.is_void() && !guarantees_return(body) {
                            self.error_code(
                                "E0003",
                                loc,
                                "missing return statement in non-void function",
                                "all execution paths must return a value",
                            );
                        }
                        continue;
                    }

                    self.table_mut().enter_scope();
                    for param in &f.params {
                        let mut symbol =
                            Symbol::new(param.name.as_str(), SymbolKind::Variable, Some(param.ty.clone()), loc);
                        symbol.is_initialized = true;
                        let _ = self.table_mut().insert(symbol);
                    }

                    let prev_ret = self.ret_type.replace(f.ret.clone());
                    analyze_stmt(self, body);

                    if !f.ret.is_void() && !guarantees_return(body) {
                        self.error_code(
                            "E0003",
                            loc,
                            "missing return statement in non-void function",
                            "all execution paths must return a value",
                        );
                    }

                    self.ret_type = prev_ret;
                    self.table_mut().exit_scope();
                }
                DeclKind::Global(g) => {
                    let declared = g.var.ty.clone();
                    if let Some(init) = g.var.init.as_mut() {
                        let init_ty = analyze_expr(self, init);
                        if let Some(init_ty) = init_ty
                            && !declared.compatible(&init_ty)
                        {
                            self.error_code(
                                "E0001",
                                loc,
                                format!(
                                    "global variable initializer type mismatch: expected '{declared}', got '{init_ty}'"
                                ),
                                "global constants/variables must be initialized with compatible types",
                            );
                        }
                    }
                }
                _ => {}
            }
        }
    }
}

// --- Statement analysis ---

fn analyze_stmt(a: &mut Analyzer, stmt: &mut Stmt) {
    let loc = stmt.loc;
    match &mut stmt.kind {
        StmtKind::Expr(expr) => {
            analyze_expr(a, expr);
        }
        StmtKind::VarDecl(var) => analyze_var_decl(a, var, loc),
        StmtKind::If {
            cond,
            then_branch,
            else_branch,
        } => {
            if let Some(cond_ty) = analyze_expr(a, cond)
                && !cond_ty.is_bool()
            {
                a.error(loc, "if condition must be bool");
            }
            analyze_stmt(a, then_branch);
            if let Some(else_branch) = else_branch {
                analyze_stmt(a, else_branch);
            }
        }
        StmtKind::While { cond, body } => {
            if let Some(cond_ty) = analyze_expr(a, cond)
                && !cond_ty.is_bool()
            {
                a.error(loc, "while condition must be bool");
            }
            a.loop_depth += 1;
            analyze_stmt(a, body);
            a.loop_depth -= 1;
        }
        StmtKind::For { init, cond, step, body } => {
            if let Some(init) = init {
                analyze_stmt(a, init);
            }
            if let Some(cond) = cond
                && let Some(cond_ty) = analyze_expr(a, cond)
                && !cond_ty.is_bool()
            {
                a.error(loc, "for condition must be bool");
            }
            if let Some(step) = step {
                analyze_expr(a, step);
            }
            a.loop_depth += 1;
            analyze_stmt(a, body);
            a.loop_depth -= 1;
        }
        StmtKind::Return(value) => analyze_return(a, value.as_mut(), loc),
        StmtKind::Block(stmts) => {
            a.table_mut().enter_scope();
            let mut unreachable = false;
            for stmt in stmts.iter_mut() {
                if unreachable {
                    a.error_code(
                        "E0004",
                        stmt.loc,
                        "unreachable code detected",
                        "this code will never be executed",
                    );
                    break;
                }
                analyze_stmt(a, stmt);
                if guarantees_return(stmt) {
                    unreachable = true;
                }
            }
            a.table_mut().exit_scope();
        }
        StmtKind::Match { scrutinee, arms } => analyze_match(a, scrutinee, arms, loc),
        StmtKind::Fail(message) => {
            if let Some(message) = message {
                analyze_expr(a, message);
            }
        }
        StmtKind::Unsafe(body) => {
            let prev_unsafe = a.in_unsafe;
            let prev_seen = a.unsafe_op_seen;
            a.in_unsafe = true;
            a.unsafe_op_seen = false;

            analyze_stmt(a, body);

            if !a.unsafe_op_seen {
                if a.strict_unsafe {
                    a.error(loc, "unnecessary unsafe block (strict mode)");
                } else {
                    a.warning(loc, "unnecessary unsafe block");
                }
            }
            a.in_unsafe = prev_unsafe;
            // An inner block's usage also satisfies the enclosing block.
            a.unsafe_op_seen = a.unsafe_op_seen || prev_seen;
        }
        StmtKind::Break => {
            if a.loop_depth == 0 {
                a.error(loc, "break statement outside of loop");
            }
        }
        StmtKind::Continue => {
            if a.loop_depth == 0 {
                a.error(loc, "continue statement outside of loop");
            }
        }
    }
}

fn analyze_var_decl(a: &mut Analyzer, var: &mut VarDecl, loc: Loc) {
    if a.table().lookup_current(&var.name).is_some() {
        let name = var.name.clone();
        a.error_code(
            "E0006",
            loc,
            format!("redefinition of '{name}'"),
            "variable names must be unique within the same scope; consider a different name",
        );
        return;
    }

    a.resolve_type(&mut var.ty, loc);

    if let Some(init) = var.init.as_mut() {
        let init_loc = init.loc;
        if let Some(init_ty) = analyze_expr(a, init)
            && !var.ty.compatible(&init_ty)
        {
            a.error_code(
                "E0001",
                init_loc,
                "initializer type mismatch",
                "ensure the value's type matches the variable's declared type",
            );
        }
    }

    let mut symbol = Symbol::new(var.name.as_str(), SymbolKind::Variable, Some(var.ty.clone()), loc);
    symbol.is_const = var.is_const;
    symbol.is_initialized = var.init.is_some();
    symbol.scope_depth = a.table().depth();
    let _ = a.table_mut().insert(symbol);
}

fn analyze_return(a: &mut Analyzer, value: Option<&mut Expr>, loc: Loc) {
    let value_ty = value.and_then(|expr| analyze_expr(a, expr));

    let Some(expected) = a.ret_type.clone() else { return };
    let is_void = expected.is_void();

    match (&value_ty, is_void) {
        (Some(_), true) => a.error(loc, "void function cannot return a value"),
        (None, false) => a.error(loc, "non-void function must return a value"),
        (Some(actual), false) if !expected.compatible(actual) => {
            a.error_code(
                "E0001",
                loc,
                format!("return type mismatch: expected '{expected}', got '{actual}'"),
                "ensure the returned value matches the function's return type",
            );
        }
        _ => {}
    }
}

fn analyze_match(a: &mut Analyzer, scrutinee: &mut Expr, arms: &mut [crate::ast::MatchArm], loc: Loc) {
    let Some(scrutinee_ty) = analyze_expr(a, scrutinee) else {
        return;
    };

    match &scrutinee_ty {
        Type::Result { ok, err } => {
            let mut seen_ok = false;
            let mut seen_err = false;

            for arm in arms.iter_mut() {
                match arm.tag.as_str() {
                    "ok" => seen_ok = true,
                    "err" => seen_err = true,
                    other => a.error(loc, format!("invalid pattern tag '{other}' for result")),
                }

                a.table_mut().enter_scope();
                if let Some(capture) = &arm.capture {
                    let capture_ty = match arm.tag.as_str() {
                        "ok" => Some((**ok).clone()),
                        "err" => Some((**err).clone()),
                        _ => None,
                    };
                    if let Some(capture_ty) = capture_ty {
                        let mut symbol = Symbol::new(capture.as_str(), SymbolKind::Variable, Some(capture_ty), loc);
                        symbol.is_initialized = true;
                        let _ = a.table_mut().insert(symbol);
                    }
                }
                analyze_stmt(a, &mut arm.body);
                a.table_mut().exit_scope();
            }

            if !seen_ok || !seen_err {
                a.error(loc, "non-exhaustive patterns: result match must handle 'ok' and 'err'");
            }
        }
        Type::Enum { name, .. } => {
            let Some(enum_sym) = a.table().lookup(name).filter(|s| s.kind == SymbolKind::Type).cloned()
            else {
                a.error(loc, "unknown enum type in match");
                return;
            };

            let mut covered = vec![false; enum_sym.variants.len()];
            let mut has_wildcard = false;

            for arm in arms.iter_mut() {
                if arm.tag == "_" {
                    has_wildcard = true;
                } else if let Some(pos) = enum_sym.variants.iter().position(|v| *v == arm.tag) {
                    covered[pos] = true;
                } else {
                    let tag = arm.tag.clone();
                    a.error(loc, format!("invalid pattern variant '{tag}' for enum '{name}'"));
                }

                a.table_mut().enter_scope();
                analyze_stmt(a, &mut arm.body);
                a.table_mut().exit_scope();
            }

            if !has_wildcard
                && let Some(missing) = covered.iter().position(|c| !c)
            {
                let variant = enum_sym.variants[missing].clone();
                a.error(
                    loc,
                    format!("non-exhaustive patterns: enum variant '{variant}' not covered"),
                );
            }
        }
        _ => a.error(loc, "match expression must be a result or enum type"),
    }
}

// --- Expression analysis ---

/// Analyzes an expression and stores the resolved type on the node.
fn analyze_expr(a: &mut Analyzer, expr: &mut Expr) -> Option<Type> {
    let ty = analyze_expr_inner(a, expr);
    if let Some(ty) = &ty {
        expr.ty = Some(ty.clone());
    }
    ty
}

fn analyze_expr_inner(a: &mut Analyzer, expr: &mut Expr) -> Option<Type> {
    let loc = expr.loc;
    match &mut expr.kind {
        ExprKind::Literal(literal) => Some(match literal {
            Literal::Int(_) => Type::prim(Prim::I32),
            Literal::Float(_) => Type::prim(Prim::F64),
            Literal::Bool(_) => Type::prim(Prim::Bool),
            Literal::Str(_) => Type::slice(Type::prim(Prim::U8)),
            Literal::Null => Type::null_pointer(),
        }),

        ExprKind::Variable { name } => {
            if let Some(symbol) = a.table().lookup(name) {
                return symbol.ty.clone();
            }
            let name = name.clone();
            let candidates: Vec<String> = a.table().global().iter().map(|s| s.name.clone()).collect();
            let suggestion = suggest_name(&name, candidates.iter().map(String::as_str)).map_or_else(
                || "check for spelling mistakes or ensure the variable is declared in an accessible scope".to_owned(),
                |close| format!("did you mean '{close}'?"),
            );
            a.report(
                Level::Error,
                Some("E0002"),
                loc,
                format!("undefined variable '{name}'"),
                Some(suggestion),
            );
            None
        }

        ExprKind::Binary { op, left, right } => {
            let op = *op;
            let left_ty = analyze_expr(a, left)?;
            let right_ty = analyze_expr(a, right)?;
            analyze_binary(a, op, &left_ty, &right_ty, loc)
        }

        ExprKind::Unary { op, operand } => {
            let op = *op;
            let operand_ty = analyze_expr(a, operand)?;
            match op {
                TokenKind::Minus => {
                    if !operand_ty.is_numeric() {
                        a.error(loc, "unary minus requires numeric operand");
                        return None;
                    }
                    Some(operand_ty)
                }
                TokenKind::Bang => {
                    if !operand_ty.is_bool() {
                        a.error(loc, "logical not requires bool operand");
                        return None;
                    }
                    Some(operand_ty)
                }
                TokenKind::Amp => Some(Type::pointer(operand_ty, true)),
                TokenKind::Star => match operand_ty {
                    Type::Pointer { base, non_null } => {
                        if !non_null {
                            if !a.in_unsafe {
                                a.error(loc, "dereferencing nullable pointer requires unsafe block");
                                return None;
                            }
                            a.unsafe_op_seen = true;
                        }
                        Some(*base)
                    }
                    _ => {
                        a.error(loc, "dereference requires pointer operand");
                        None
                    }
                },
                _ => None,
            }
        }

        ExprKind::Call { .. } => analyze_call(a, expr),

        ExprKind::Index { base, index } => {
            let base_ty = analyze_expr(a, base)?;
            let index_ty = analyze_expr(a, index)?;

            if !matches!(
                base_ty,
                Type::Array { .. } | Type::Pointer { .. } | Type::Slice { .. }
            ) {
                a.error(loc, "indexing requires array, slice, or pointer");
                return None;
            }
            if !index_ty.is_integer() {
                a.error(loc, "array index must be integer");
                return None;
            }

            // Constant indices are bounds-checked against known array sizes.
            if let Type::Array { size, .. } = &base_ty
                && let ExprKind::Literal(Literal::Int(value)) = &index.kind
                && *value >= 0
                && (*value as usize) >= *size
            {
                a.error(loc, format!("array index {value} out of bounds (size {size})"));
            }

            match base_ty {
                Type::Array { elem, .. } | Type::Slice { elem } => Some(*elem),
                Type::Pointer { base, .. } => Some(*base),
                _ => None,
            }
        }

        ExprKind::SliceOf { base, start, end } => {
            let base_ty = analyze_expr(a, base);

            if let Some(start) = start
                && let Some(start_ty) = analyze_expr(a, start)
                && !start_ty.is_integer()
            {
                a.error(loc, "slice start index must be integer");
            }
            if let Some(end) = end
                && let Some(end_ty) = analyze_expr(a, end)
                && !end_ty.is_integer()
            {
                a.error(loc, "slice end index must be integer");
            }

            match base_ty? {
                Type::Array { elem, .. } | Type::Slice { elem } => Some(Type::Slice { elem }),
                Type::Pointer { base, .. } => Some(Type::Slice { elem: base }),
                _ => {
                    a.error(loc, "slicing requires array, slice, or pointer");
                    None
                }
            }
        }

        ExprKind::Member { object, member, arrow } => {
            // Module member access: `math.add`.
            if !*arrow
                && let ExprKind::Variable { name } = &object.kind
                && let Some((target, module_name)) = a.module_ref(name)
            {
                let Some(member_sym) = a.lookup_in_module(target, member) else {
                    let member = member.clone();
                    a.error(loc, format!("module '{module_name}' has no member '{member}'"));
                    return None;
                };
                if !member_sym.is_public {
                    let member = member.clone();
                    a.error(loc, format!("member '{member}' of module '{module_name}' is private"));
                    return None;
                }
                return member_sym.ty;
            }

            let mut object_ty = analyze_expr(a, object)?;

            if *arrow {
                match object_ty {
                    Type::Pointer { base, .. } => object_ty = *base,
                    _ => {
                        a.error(loc, "arrow operator requires pointer type");
                        return None;
                    }
                }
            }

            if let Type::Slice { elem } = &object_ty {
                return match member.as_str() {
                    "len" => Some(Type::prim(Prim::I64)),
                    "data" => Some(Type::pointer((**elem).clone(), false)),
                    other => {
                        a.error(loc, format!("slice has no member '{other}'"));
                        None
                    }
                };
            }

            let Type::Struct { name, .. } = &object_ty else {
                a.error(loc, "member access requires struct type");
                return None;
            };

            let Some((_, struct_sym)) = a.find_type_symbol(name) else {
                let name = name.clone();
                a.error(loc, format!("undefined struct '{name}'"));
                return None;
            };

            if let Some(field) = struct_sym.fields.iter().find(|f| f.name == *member) {
                return Some(field.ty.clone());
            }
            let (name, member) = (name.clone(), member.clone());
            a.error(loc, format!("struct '{name}' has no member '{member}'"));
            None
        }

        ExprKind::Cast { target, expr: inner } => {
            a.resolve_type(target, loc);
            let target = target.clone();
            analyze_expr(a, inner)?;
            Some(target)
        }
    }
}

fn analyze_binary(a: &mut Analyzer, op: TokenKind, left: &Type, right: &Type, loc: Loc) -> Option<Type> {
    use TokenKind::*;

    match op {
        Plus | Minus | Star | Slash | Percent => {
            // Pointer arithmetic special forms.
            let ptr_result = match (left, right, op) {
                (Type::Pointer { .. }, r, Plus | Minus) if r.is_integer() => Some(left.clone()),
                (l, Type::Pointer { .. }, Plus) if l.is_integer() => Some(right.clone()),
                (Type::Pointer { .. }, Type::Pointer { .. }, Minus) => {
                    if !left.compatible(right) {
                        a.error(loc, "pointer subtraction requires compatible pointer types");
                        return None;
                    }
                    Some(Type::prim(Prim::I64))
                }
                _ => None,
            };
            if let Some(result) = ptr_result {
                if !a.in_unsafe {
                    a.error(loc, "pointer arithmetic requires unsafe block");
                }
                a.unsafe_op_seen = true;
                return Some(result);
            }

            if !left.is_numeric() || !right.is_numeric() {
                a.error(loc, "arithmetic operators require numeric operands");
                return None;
            }
            if !left.compatible(right) {
                a.error(loc, "operand types must match");
                return None;
            }
            Some(left.clone())
        }

        Lt | Gt | LtEq | GtEq => {
            if !left.is_numeric() || !right.is_numeric() {
                a.error(loc, "comparison operators require numeric operands");
                return None;
            }
            Some(Type::prim(Prim::Bool))
        }

        EqEq | BangEq => {
            if !left.compatible(right) {
                a.error(loc, "equality comparison requires compatible types");
                return None;
            }
            Some(Type::prim(Prim::Bool))
        }

        AmpAmp | PipePipe => {
            if !left.is_bool() || !right.is_bool() {
                a.error(loc, "logical operators require bool operands");
                return None;
            }
            Some(Type::prim(Prim::Bool))
        }

        Eq => {
            if !left.compatible(right) {
                a.error_code(
                    "E0001",
                    loc,
                    "assignment type mismatch",
                    "ensure the value's type matches the variable's declared type",
                );
                return None;
            }
            Some(left.clone())
        }

        _ => None,
    }
}

fn analyze_call(a: &mut Analyzer, expr: &mut Expr) -> Option<Type> {
    let loc = expr.loc;
    let ExprKind::Call {
        callee,
        args,
        generic_args,
    } = &mut expr.kind
    else {
        return None;
    };

    // result::ok / result::err are recognized at the expression level
    // regardless of imports.
    if let ExprKind::Variable { name } = &callee.kind {
        let ctor = match name.as_str() {
            "result::ok" => Some(true),
            "result::err" => Some(false),
            _ => None,
        };
        if let Some(is_ok) = ctor {
            let ctor_name = if is_ok { "result::ok" } else { "result::err" };
            if args.len() != 1 {
                a.error(loc, format!("{ctor_name} expects exactly 1 argument"));
                return None;
            }
            let value_ty = analyze_expr(a, &mut args[0])?;
            return Some(if is_ok {
                Type::result(value_ty, Type::prim(Prim::Void))
            } else {
                Type::result(Type::prim(Prim::Void), value_ty)
            });
        }
    }

    // Resolve the callee to a function symbol: either a free identifier or
    // `module.member`.
    let mut module_alias: Option<String> = None;
    let func_symbol: Option<Symbol> = match &callee.kind {
        ExprKind::Variable { name } => a.table().lookup(name).cloned(),
        ExprKind::Member { object, member, arrow } if !arrow => {
            if let ExprKind::Variable { name } = &object.kind
                && let Some((target, alias)) = a.module_ref(name)
            {
                let symbol = a.lookup_in_module(target, member);
                if let Some(symbol) = &symbol
                    && !symbol.is_public
                {
                    let member = member.clone();
                    a.error(loc, format!("function '{member}' is private to module '{alias}'"));
                    return None;
                }
                module_alias = Some(alias);
                symbol
            } else {
                None
            }
        }
        _ => None,
    };

    let Some(func_symbol) = func_symbol else {
        a.error(loc, "could not resolve function call");
        return None;
    };
    if func_symbol.kind != SymbolKind::Function {
        a.error(loc, "not a function");
        return None;
    }

    // Extern and variadic calls need unsafe, unless whitelisted.
    if func_symbol.is_extern || func_symbol.is_variadic {
        let name = &func_symbol.name;
        let module = module_alias.as_deref().unwrap_or("");
        let safe_intrinsic = name == "print"
            || name == "exit"
            || name == "assert"
            || name.contains("print")
            || name.contains("math")
            || name.contains("result")
            || matches!(module, "math" | "std::math" | "result" | "std::result");
        if !safe_intrinsic {
            if !a.in_unsafe {
                a.error(loc, "call to extern/variadic function requires unsafe block");
            }
            a.unsafe_op_seen = true;
        }
    }

    let Some(Type::Function { ret, params }) = &func_symbol.ty else {
        a.error(loc, "not a function");
        return None;
    };
    let (ret, params) = (ret.clone(), params.clone());

    if func_symbol.is_variadic {
        if args.len() < params.len() {
            a.error(
                loc,
                format!("expected at least {} arguments, got {}", params.len(), args.len()),
            );
            return None;
        }
    } else if args.len() != params.len() {
        a.error(loc, format!("expected {} arguments, got {}", params.len(), args.len()));
        return None;
    }

    for arg in args.iter_mut() {
        analyze_expr(a, arg);
    }

    // Generic parameters are validated through inference instead.
    if func_symbol.type_params.is_empty() {
        for (i, (param_ty, arg)) in params.iter().zip(args.iter()).enumerate() {
            if let Some(arg_ty) = &arg.ty
                && !param_ty.compatible(arg_ty)
            {
                a.error(
                    loc,
                    format!("argument {} type mismatch: expected '{param_ty}', got '{arg_ty}'", i + 1),
                );
            }
        }
    }

    if !func_symbol.type_params.is_empty() {
        if generic_args.is_empty() {
            // Inference: unify each declared parameter template against the
            // corresponding argument's resolved type.
            let mut inferred: Vec<Option<Type>> = vec![None; func_symbol.type_params.len()];
            let mut ok = true;
            for (param_ty, arg) in params.iter().zip(args.iter()) {
                let Some(arg_ty) = &arg.ty else { continue };
                if !infer_type(param_ty, arg_ty, &func_symbol.type_params, &mut inferred) {
                    ok = false;
                    break;
                }
            }
            if ok && inferred.iter().all(Option::is_some) {
                *generic_args = inferred.into_iter().map(|t| t.expect("checked is_some")).collect();
            } else {
                a.error(loc, "cannot infer generic type arguments");
                return None;
            }
        } else if generic_args.len() != func_symbol.type_params.len() {
            a.error(
                loc,
                format!(
                    "expected {} generic arguments, got {}",
                    func_symbol.type_params.len(),
                    generic_args.len()
                ),
            );
            return None;
        }

        return Some(ret.substitute(&func_symbol.type_params, generic_args));
    } else if !generic_args.is_empty() {
        a.error(loc, "function is not generic but generic arguments provided");
        return None;
    }

    Some(*ret)
}

/// Unifies a declared parameter template against a concrete argument type,
/// capturing generic parameters by name. Repeated captures of the same
/// parameter must stay compatible. Function templates are skipped.
fn infer_type(template: &Type, actual: &Type, params: &[String], inferred: &mut [Option<Type>]) -> bool {
    if let Some(name) = template.nominal_name()
        && let Some(pos) = params.iter().position(|p| p == name)
    {
        return match &inferred[pos] {
            Some(existing) => existing.compatible(actual),
            None => {
                inferred[pos] = Some(actual.clone());
                true
            }
        };
    }

    match (template, actual) {
        (Type::Pointer { base: t, .. }, Type::Pointer { base: a, .. }) => infer_type(t, a, params, inferred),
        (Type::Array { elem: t, .. }, Type::Array { elem: a, .. }) => infer_type(t, a, params, inferred),
        (Type::Slice { elem: t }, Type::Slice { elem: a }) => infer_type(t, a, params, inferred),
        (Type::Result { ok: t_ok, err: t_err }, Type::Result { ok: a_ok, err: a_err }) => {
            infer_type(t_ok, a_ok, params, inferred) && infer_type(t_err, a_err, params, inferred)
        }
        _ => true,
    }
}

/// Whether a statement guarantees that control leaves the function:
/// `return`/`fail` do; a block does if any statement in it does; an `if`
/// needs both branches; `match` needs every arm; loops never do.
pub fn guarantees_return(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::Return(_) | StmtKind::Fail(_) => true,
        StmtKind::Block(stmts) => stmts.iter().any(guarantees_return),
        StmtKind::If {
            then_branch,
            else_branch,
            ..
        } => else_branch
            .as_ref()
            .is_some_and(|e| guarantees_return(then_branch) && guarantees_return(e)),
        StmtKind::Match { arms, .. } => {
            !arms.is_empty() && arms.iter().all(|arm| guarantees_return(&arm.body))
        }
        StmtKind::Unsafe(body) => guarantees_return(body),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::MatchArm;

    fn ret_stmt() -> Stmt {
        Stmt::new(StmtKind::Return(None), Loc::default())
    }

    fn expr_stmt() -> Stmt {
        Stmt::new(
            StmtKind::Expr(Expr::new(ExprKind::Literal(Literal::Int(0)), Loc::default())),
            Loc::default(),
        )
    }

    #[test]
    fn return_paths_if_requires_both_branches() {
        let one_armed = Stmt::new(
            StmtKind::If {
                cond: Expr::new(ExprKind::Literal(Literal::Bool(true)), Loc::default()),
                then_branch: Box::new(ret_stmt()),
                else_branch: None,
            },
            Loc::default(),
        );
        assert!(!guarantees_return(&one_armed));

        let both = Stmt::new(
            StmtKind::If {
                cond: Expr::new(ExprKind::Literal(Literal::Bool(true)), Loc::default()),
                then_branch: Box::new(ret_stmt()),
                else_branch: Some(Box::new(ret_stmt())),
            },
            Loc::default(),
        );
        assert!(guarantees_return(&both));
    }

    #[test]
    fn return_paths_loops_never_guarantee() {
        let lp = Stmt::new(
            StmtKind::While {
                cond: Expr::new(ExprKind::Literal(Literal::Bool(true)), Loc::default()),
                body: Box::new(ret_stmt()),
            },
            Loc::default(),
        );
        assert!(!guarantees_return(&lp));
    }

    #[test]
    fn return_paths_match_requires_all_arms() {
        let all = Stmt::new(
            StmtKind::Match {
                scrutinee: Expr::new(ExprKind::Literal(Literal::Int(0)), Loc::default()),
                arms: vec![
                    MatchArm {
                        tag: "ok".to_owned(),
                        capture: None,
                        body: ret_stmt(),
                    },
                    MatchArm {
                        tag: "err".to_owned(),
                        capture: None,
                        body: ret_stmt(),
                    },
                ],
            },
            Loc::default(),
        );
        assert!(guarantees_return(&all));

        let partial = Stmt::new(
            StmtKind::Match {
                scrutinee: Expr::new(ExprKind::Literal(Literal::Int(0)), Loc::default()),
                arms: vec![
                    MatchArm {
                        tag: "ok".to_owned(),
                        capture: None,
                        body: ret_stmt(),
                    },
                    MatchArm {
                        tag: "err".to_owned(),
                        capture: None,
                        body: expr_stmt(),
                    },
                ],
            },
            Loc::default(),
        );
        assert!(!guarantees_return(&partial));
    }
}
