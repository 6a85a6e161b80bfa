//! Lowering from the typed AST to the three-address IR.
//!
//! Each function gets fresh temporary/label counters, a variable-renaming
//! scope stack (`name_v<counter>` keeps shadowed source names distinct in
//! the flat C output), and a loop stack driving `break`/`continue`.
//! Member/index stores compose C lvalue strings instead of materializing
//! intermediate temporaries.
//!
//! Generic functions are not lowered as templates: every call site carries
//! its (explicit or inferred) type arguments after analysis, and one
//! specialized copy per distinct argument tuple is lowered under the
//! instantiation-mangled name.

use ahash::AHashMap;

use crate::ast::{Expr, ExprKind, FunctionDecl, Literal, Program, Stmt, StmtKind};
use crate::ctype::{c_type, slice_struct_name};
use crate::ir::{Instr, IrFunction, IrGlobal, IrLocal, IrModule, IrParam, Opcode, Operand, OperandList};
use crate::mangle;
use crate::symtable::{ModuleId, Symbol, SymbolKind, SymbolTable};
use crate::token::TokenKind;
use crate::types::{Prim, Type};

struct LoopLabels {
    continue_label: String,
    break_label: String,
}

pub struct IrGenerator<'a> {
    tables: &'a [SymbolTable],
    module: ModuleId,
    is_main: bool,
    func: IrFunction,
    label_counter: u32,
    var_counter: u32,
    scopes: Vec<AHashMap<String, String>>,
    loops: Vec<LoopLabels>,
}

/// Lowers one module. `is_main` controls whether `main` keeps its name.
pub fn generate(program: &Program, tables: &[SymbolTable], module: ModuleId, is_main: bool) -> IrModule {
    let mut generator = IrGenerator {
        tables,
        module,
        is_main,
        func: IrFunction::default(),
        label_counter: 0,
        var_counter: 0,
        scopes: Vec::new(),
        loops: Vec::new(),
    };
    let mut ir = IrModule::default();

    for decl in &program.decls {
        match &decl.kind {
            crate::ast::DeclKind::Function(f) => {
                if f.is_extern || !f.type_params.is_empty() {
                    continue;
                }
                ir.functions.push(generator.lower_function(f, None, None));
            }
            crate::ast::DeclKind::Global(g) => {
                let name = mangle::qualified(&generator.module_name(), &g.var.name);
                let init = match g.var.init.as_ref().map(|e| &e.kind) {
                    Some(ExprKind::Literal(Literal::Int(value))) => *value,
                    Some(ExprKind::Literal(Literal::Bool(true))) => 1,
                    _ => 0,
                };
                ir.globals.push(IrGlobal {
                    name,
                    c_type: c_type(Some(&g.var.ty)),
                    init,
                });
            }
            _ => {}
        }
    }

    // One specialized copy per distinct generic call signature.
    for (name, args) in collect_generic_calls(program) {
        let Some(f) = program.decls.iter().find_map(|d| match &d.kind {
            crate::ast::DeclKind::Function(f) if f.name == name => Some(f),
            _ => None,
        }) else {
            continue;
        };
        let specialized_name = mangle::instantiation(&f.name, &args);
        ir.functions
            .push(generator.lower_function(f, Some(&specialized_name), Some(args.as_slice())));
    }

    ir
}

/// Collects `(function name, type arguments)` pairs for every module-local
/// generic call whose arguments are fully concrete.
fn collect_generic_calls(program: &Program) -> Vec<(String, Vec<Type>)> {
    fn is_concrete(ty: &Type) -> bool {
        ty.nominal_name().is_none_or(|n| n.len() != 1 || !n.as_bytes()[0].is_ascii_uppercase())
    }

    fn visit_expr(expr: &Expr, generics: &AHashMap<&str, &FunctionDecl>, out: &mut Vec<(String, Vec<Type>)>) {
        match &expr.kind {
            ExprKind::Call {
                callee,
                args,
                generic_args,
            } => {
                if let ExprKind::Variable { name } = &callee.kind
                    && !generic_args.is_empty()
                    && generics.contains_key(name.as_str())
                    && generic_args.iter().all(is_concrete)
                {
                    let key = (name.clone(), generic_args.clone());
                    if !out.contains(&key) {
                        out.push(key);
                    }
                }
                visit_expr(callee, generics, out);
                for arg in args {
                    visit_expr(arg, generics, out);
                }
            }
            ExprKind::Binary { left, right, .. } => {
                visit_expr(left, generics, out);
                visit_expr(right, generics, out);
            }
            ExprKind::Unary { operand, .. } => visit_expr(operand, generics, out),
            ExprKind::Index { base, index } => {
                visit_expr(base, generics, out);
                visit_expr(index, generics, out);
            }
            ExprKind::SliceOf { base, start, end } => {
                visit_expr(base, generics, out);
                if let Some(start) = start {
                    visit_expr(start, generics, out);
                }
                if let Some(end) = end {
                    visit_expr(end, generics, out);
                }
            }
            ExprKind::Member { object, .. } => visit_expr(object, generics, out),
            ExprKind::Cast { expr, .. } => visit_expr(expr, generics, out),
            ExprKind::Literal(_) | ExprKind::Variable { .. } => {}
        }
    }

    fn visit_stmt(stmt: &Stmt, generics: &AHashMap<&str, &FunctionDecl>, out: &mut Vec<(String, Vec<Type>)>) {
        match &stmt.kind {
            StmtKind::Expr(expr) => visit_expr(expr, generics, out),
            StmtKind::VarDecl(var) => {
                if let Some(init) = &var.init {
                    visit_expr(init, generics, out);
                }
            }
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                visit_expr(cond, generics, out);
                visit_stmt(then_branch, generics, out);
                if let Some(else_branch) = else_branch {
                    visit_stmt(else_branch, generics, out);
                }
            }
            StmtKind::While { cond, body } => {
                visit_expr(cond, generics, out);
                visit_stmt(body, generics, out);
            }
            StmtKind::For { init, cond, step, body } => {
                if let Some(init) = init {
                    visit_stmt(init, generics, out);
                }
                if let Some(cond) = cond {
                    visit_expr(cond, generics, out);
                }
                if let Some(step) = step {
                    visit_expr(step, generics, out);
                }
                visit_stmt(body, generics, out);
            }
            StmtKind::Return(value) => {
                if let Some(value) = value {
                    visit_expr(value, generics, out);
                }
            }
            StmtKind::Block(stmts) => {
                for stmt in stmts {
                    visit_stmt(stmt, generics, out);
                }
            }
            StmtKind::Match { scrutinee, arms } => {
                visit_expr(scrutinee, generics, out);
                for arm in arms {
                    visit_stmt(&arm.body, generics, out);
                }
            }
            StmtKind::Fail(message) => {
                if let Some(message) = message {
                    visit_expr(message, generics, out);
                }
            }
            StmtKind::Unsafe(body) => visit_stmt(body, generics, out),
            StmtKind::Break | StmtKind::Continue => {}
        }
    }

    let generics: AHashMap<&str, &FunctionDecl> = program
        .decls
        .iter()
        .filter_map(|d| match &d.kind {
            crate::ast::DeclKind::Function(f) if !f.type_params.is_empty() => Some((f.name.as_str(), f)),
            _ => None,
        })
        .collect();

    let mut out = Vec::new();
    for decl in &program.decls {
        match &decl.kind {
            crate::ast::DeclKind::Function(f) => {
                if let Some(body) = &f.body {
                    visit_stmt(body, &generics, &mut out);
                }
            }
            crate::ast::DeclKind::Global(g) => {
                if let Some(init) = &g.var.init {
                    visit_expr(init, &generics, &mut out);
                }
            }
            _ => {}
        }
    }
    out
}

impl IrGenerator<'_> {
    fn module_name(&self) -> String {
        self.tables[self.module].name.clone().unwrap_or_default()
    }

    fn symbol(&self, name: &str) -> Option<&Symbol> {
        self.tables[self.module].lookup(name)
    }

    fn emit(&mut self, instr: Instr) {
        self.func.push(instr);
    }

    fn new_temp(&mut self, ty: Option<&Type>) -> u32 {
        let id = self.func.temp_types.len() as u32;
        self.func.temp_types.push(c_type(ty));
        id
    }

    fn new_label(&mut self, prefix: &str) -> String {
        let label = format!("{prefix}{}", self.label_counter);
        self.label_counter += 1;
        label
    }

    // --- Rename scopes ---

    fn scope_enter(&mut self) {
        self.scopes.push(AHashMap::new());
    }

    fn scope_exit(&mut self) {
        self.scopes.pop();
    }

    fn scope_define(&mut self, name: &str) -> String {
        let ir_name = format!("{name}_v{}", self.var_counter);
        self.var_counter += 1;
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_owned(), ir_name.clone());
        }
        ir_name
    }

    fn scope_lookup(&self, name: &str) -> Option<&str> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).map(String::as_str))
    }

    // --- Functions ---

    fn lower_function(
        &mut self,
        f: &FunctionDecl,
        override_name: Option<&str>,
        type_args: Option<&[Type]>,
    ) -> IrFunction {
        let module_name = self.module_name();
        let source_name = override_name.unwrap_or(&f.name);
        let mangled = mangle::function(&module_name, source_name, self.is_main);

        self.func = IrFunction::new(mangled);
        self.label_counter = 0;
        self.var_counter = 0;
        self.scopes.clear();
        self.loops.clear();
        self.scope_enter();

        let substituted = |ty: &Type| -> Type {
            match type_args {
                Some(args) => ty.substitute(&f.type_params, args),
                None => ty.clone(),
            }
        };

        for param in &f.params {
            let unique = self.scope_define(&param.name);
            self.func.params.push(IrParam {
                name: unique,
                c_type: c_type(Some(&substituted(&param.ty))),
            });
        }
        self.func.return_type = c_type(Some(&substituted(&f.ret)));

        if let Some(body) = &f.body {
            self.lower_stmt(body);
        }

        self.scope_exit();
        self.func.label_count = self.label_counter;
        std::mem::take(&mut self.func)
    }

    // --- Statements ---

    fn lower_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.lower_expr(expr);
            }
            StmtKind::VarDecl(var) => {
                let unique = self.scope_define(&var.name);
                if !var.name.is_empty() {
                    self.func.locals.push(IrLocal {
                        name: unique.clone(),
                        c_type: c_type(Some(&var.ty)),
                    });
                }
                if let Some(init) = &var.init {
                    let value = self.lower_expr(init);
                    self.emit(Instr::new(
                        Opcode::Store,
                        None,
                        Some(Operand::Var(unique)),
                        value,
                    ));
                }
            }
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let cond_op = self.lower_expr(cond);
                let then_label = self.new_label("L");
                let else_label = self.new_label("L");
                let end_label = self.new_label("L");

                self.emit(Instr::branch(cond_op.unwrap_or(Operand::Const(0)), &then_label));
                self.emit(Instr::jump(&else_label));

                self.emit(Instr::label(&then_label));
                self.lower_stmt(then_branch);
                self.emit(Instr::jump(&end_label));

                self.emit(Instr::label(&else_label));
                if let Some(else_branch) = else_branch {
                    self.lower_stmt(else_branch);
                }

                self.emit(Instr::label(&end_label));
            }
            StmtKind::While { cond, body } => {
                let loop_label = self.new_label("L");
                let body_label = self.new_label("L");
                let end_label = self.new_label("L");

                // continue re-tests the condition.
                self.loops.push(LoopLabels {
                    continue_label: loop_label.clone(),
                    break_label: end_label.clone(),
                });

                self.emit(Instr::label(&loop_label));
                let cond_op = self.lower_expr(cond);
                self.emit(Instr::branch(cond_op.unwrap_or(Operand::Const(0)), &body_label));
                self.emit(Instr::jump(&end_label));

                self.emit(Instr::label(&body_label));
                self.lower_stmt(body);
                self.emit(Instr::jump(&loop_label));

                self.emit(Instr::label(&end_label));
                self.loops.pop();
            }
            StmtKind::For { init, cond, step, body } => {
                let loop_label = self.new_label("L");
                let body_label = self.new_label("L");
                let end_label = self.new_label("L");

                if let Some(init) = init {
                    self.lower_stmt(init);
                }

                self.emit(Instr::label(&loop_label));
                if let Some(cond) = cond {
                    let cond_op = self.lower_expr(cond);
                    self.emit(Instr::branch(cond_op.unwrap_or(Operand::Const(0)), &body_label));
                    self.emit(Instr::jump(&end_label));
                } else {
                    self.emit(Instr::jump(&body_label));
                }

                // continue jumps to the increment.
                let continue_label = self.new_label("L_cont");
                self.loops.push(LoopLabels {
                    continue_label: continue_label.clone(),
                    break_label: end_label.clone(),
                });

                self.emit(Instr::label(&body_label));
                self.lower_stmt(body);

                self.emit(Instr::label(&continue_label));
                if let Some(step) = step {
                    self.lower_expr(step);
                }
                self.emit(Instr::jump(&loop_label));

                self.emit(Instr::label(&end_label));
                self.loops.pop();
            }
            StmtKind::Return(value) => {
                let operand = value.as_ref().and_then(|expr| self.lower_expr(expr));
                self.emit(Instr::new(Opcode::Return, None, operand, None));
            }
            StmtKind::Block(stmts) => {
                self.scope_enter();
                for stmt in stmts {
                    self.lower_stmt(stmt);
                }
                self.scope_exit();
            }
            StmtKind::Match { scrutinee, arms } => self.lower_match(scrutinee, arms),
            StmtKind::Fail(message) => {
                let operand = message.as_ref().and_then(|expr| self.lower_expr(expr));
                self.emit(Instr::new(Opcode::Fail, None, operand, None));
            }
            StmtKind::Unsafe(body) => self.lower_stmt(body),
            StmtKind::Break => {
                if let Some(label) = self.loops.last().map(|l| l.break_label.clone()) {
                    self.emit(Instr::jump(&label));
                }
            }
            StmtKind::Continue => {
                if let Some(label) = self.loops.last().map(|l| l.continue_label.clone()) {
                    self.emit(Instr::jump(&label));
                }
            }
        }
    }

    fn lower_match(&mut self, scrutinee: &Expr, arms: &[crate::ast::MatchArm]) {
        let scrutinee_op = self.lower_expr(scrutinee).unwrap_or(Operand::Const(0));

        if matches!(scrutinee.ty, Some(Type::Enum { .. })) {
            let end_label = self.new_label("match_end");

            for arm in arms {
                let next_label = self.new_label("match_next");
                if arm.tag == "_" {
                    self.scope_enter();
                    self.lower_stmt(&arm.body);
                    self.scope_exit();
                    self.emit(Instr::jump(&end_label));
                } else {
                    let value = self
                        .symbol(&arm.tag)
                        .filter(|s| s.kind == SymbolKind::Constant)
                        .map_or(0, |s| s.enum_value);

                    let cond = self.new_temp(Some(&Type::prim(Prim::Bool)));
                    self.emit(Instr::new(
                        Opcode::Eq,
                        Some(Operand::Temp(cond)),
                        Some(scrutinee_op.clone()),
                        Some(Operand::Const(value)),
                    ));

                    let case_label = self.new_label("case");
                    self.emit(Instr::branch(Operand::Temp(cond), &case_label));
                    self.emit(Instr::jump(&next_label));

                    self.emit(Instr::label(&case_label));
                    self.scope_enter();
                    self.lower_stmt(&arm.body);
                    self.scope_exit();
                    self.emit(Instr::jump(&end_label));
                }
                self.emit(Instr::label(&next_label));
            }

            self.emit(Instr::label(&end_label));
            return;
        }

        // Result match: read the tag through a boxed-result cast.
        let scrutinee_str = operand_cstr(&scrutinee_op);
        let tag_access = format!("((struct Result*){scrutinee_str})->is_ok");

        let is_ok = self.new_temp(Some(&Type::prim(Prim::I64)));
        self.emit(Instr::new(
            Opcode::Move,
            Some(Operand::Temp(is_ok)),
            Some(Operand::Var(tag_access)),
            None,
        ));

        let ok_label = self.new_label("match_ok");
        let err_label = self.new_label("match_err");
        let end_label = self.new_label("match_end");

        let cond = self.new_temp(Some(&Type::prim(Prim::Bool)));
        self.emit(Instr::new(
            Opcode::Eq,
            Some(Operand::Temp(cond)),
            Some(Operand::Temp(is_ok)),
            Some(Operand::Const(1)),
        ));
        self.emit(Instr::branch(Operand::Temp(cond), &ok_label));
        self.emit(Instr::jump(&err_label));

        let ok_arm = arms.iter().find(|arm| arm.tag == "ok");
        let err_arm = arms.iter().find(|arm| arm.tag == "err");

        self.emit(Instr::label(&ok_label));
        if let Some(arm) = ok_arm {
            self.lower_result_arm(arm, &scrutinee_str, "ok_val");
        }
        self.emit(Instr::jump(&end_label));

        self.emit(Instr::label(&err_label));
        if let Some(arm) = err_arm {
            self.lower_result_arm(arm, &scrutinee_str, "err_val");
        }
        self.emit(Instr::jump(&end_label));

        self.emit(Instr::label(&end_label));
    }

    fn lower_result_arm(&mut self, arm: &crate::ast::MatchArm, scrutinee: &str, payload_field: &str) {
        self.scope_enter();
        if let Some(capture) = &arm.capture {
            let payload = self.new_temp(Some(&Type::prim(Prim::I64)));
            let access = format!("((struct Result*){scrutinee})->data.{payload_field}");
            self.emit(Instr::new(
                Opcode::Move,
                Some(Operand::Temp(payload)),
                Some(Operand::Var(access)),
                None,
            ));

            // The payload slot is a long; the capture local is typed as one.
            let unique = self.scope_define(capture);
            self.func.locals.push(IrLocal {
                name: unique.clone(),
                c_type: "long".to_owned(),
            });
            self.emit(Instr::new(
                Opcode::Move,
                Some(Operand::Var(unique)),
                Some(Operand::Temp(payload)),
                None,
            ));
        }
        self.lower_stmt(&arm.body);
        self.scope_exit();
    }

    // --- Expressions ---

    fn lower_expr(&mut self, expr: &Expr) -> Option<Operand> {
        match &expr.kind {
            ExprKind::Literal(literal) => Some(match literal {
                Literal::Int(value) => Operand::Const(*value),
                Literal::Float(value) => Operand::Float(*value),
                Literal::Bool(true) => Operand::Const(1),
                Literal::Bool(false) => Operand::Const(0),
                Literal::Str(value) => Operand::Str(value.clone()),
                Literal::Null => Operand::Const(0),
            }),

            ExprKind::Variable { name } => Some(self.variable_operand(name)),

            ExprKind::Binary { op, left, right } => {
                if *op == TokenKind::Eq {
                    return self.lower_assignment(left, right);
                }

                let left_op = self.lower_expr(left)?;
                let right_op = self.lower_expr(right)?;

                let opcode = match op {
                    TokenKind::Plus => Opcode::Add,
                    TokenKind::Minus => Opcode::Sub,
                    TokenKind::Star => Opcode::Mul,
                    TokenKind::Slash => Opcode::Div,
                    TokenKind::Percent => Opcode::Mod,
                    TokenKind::EqEq => Opcode::Eq,
                    TokenKind::BangEq => Opcode::Ne,
                    TokenKind::Lt => Opcode::Lt,
                    TokenKind::LtEq => Opcode::Le,
                    TokenKind::Gt => Opcode::Gt,
                    TokenKind::GtEq => Opcode::Ge,
                    TokenKind::AmpAmp => Opcode::And,
                    TokenKind::PipePipe => Opcode::Or,
                    _ => Opcode::Add,
                };

                let temp = self.new_temp(expr.ty.as_ref());
                self.emit(Instr::new(
                    opcode,
                    Some(Operand::Temp(temp)),
                    Some(left_op),
                    Some(right_op),
                ));
                Some(Operand::Temp(temp))
            }

            ExprKind::Unary { op, operand } => {
                let operand_op = self.lower_expr(operand)?;
                let opcode = match op {
                    TokenKind::Minus => Opcode::Neg,
                    TokenKind::Bang => Opcode::Not,
                    TokenKind::Amp => Opcode::Addr,
                    TokenKind::Star => Opcode::Deref,
                    _ => return None,
                };
                let temp = self.new_temp(expr.ty.as_ref());
                self.emit(Instr::new(opcode, Some(Operand::Temp(temp)), Some(operand_op), None));
                Some(Operand::Temp(temp))
            }

            ExprKind::Call { .. } => self.lower_call(expr),

            ExprKind::Member { object, member, arrow } => {
                // Module member access resolves straight to a mangled global.
                if !*arrow
                    && let ExprKind::Variable { name } = &object.kind
                    && let Some(sym) = self.symbol(name)
                    && sym.kind == SymbolKind::Module
                {
                    let target = sym.module_id.unwrap_or(self.module);
                    let target_name = self.tables[target]
                        .name
                        .clone()
                        .unwrap_or_else(|| name.clone());
                    return Some(Operand::Var(mangle::qualified(&target_name, member)));
                }
                Some(Operand::Var(self.access_string(expr)))
            }

            ExprKind::Index { .. } => Some(Operand::Var(self.access_string(expr))),

            ExprKind::SliceOf { base, start, end } => {
                self.lower_slice(expr, base, start.as_deref(), end.as_deref())
            }

            ExprKind::Cast { target, expr: inner } => {
                let value = self.lower_expr(inner)?;
                let temp = self.new_temp(Some(target));
                self.emit(Instr::new(Opcode::Cast, Some(Operand::Temp(temp)), Some(value), None));
                Some(Operand::Temp(temp))
            }
        }
    }

    fn variable_operand(&self, name: &str) -> Operand {
        if let Some(sym) = self.symbol(name)
            && sym.kind == SymbolKind::Constant
        {
            return Operand::Const(sym.enum_value);
        }

        if let Some(unique) = self.scope_lookup(name) {
            return Operand::Var(unique.to_owned());
        }

        // Not a local: globals and constants mangle with the module prefix.
        if let Some(sym) = self.symbol(name)
            && matches!(sym.kind, SymbolKind::Variable | SymbolKind::Constant)
        {
            return Operand::Var(mangle::qualified(&self.module_name(), name));
        }

        Operand::Var(name.to_owned())
    }

    fn lower_assignment(&mut self, left: &Expr, right: &Expr) -> Option<Operand> {
        let value = self.lower_expr(right);

        match &left.kind {
            ExprKind::Variable { name } => {
                let target = self.variable_operand(name);
                self.emit(Instr::new(Opcode::Store, None, Some(target), value.clone()));
            }
            ExprKind::Member { .. } | ExprKind::Index { .. } => {
                let access = self.access_string(left);
                self.emit(Instr::new(Opcode::Store, None, Some(Operand::Var(access)), value.clone()));
            }
            ExprKind::Unary {
                op: TokenKind::Star,
                operand,
            } => {
                let pointer = self.lower_expr(operand)?;
                let target = format!("(*{})", operand_cstr(&pointer));
                self.emit(Instr::new(Opcode::Store, None, Some(Operand::Var(target)), value.clone()));
            }
            _ => {}
        }
        value
    }

    fn lower_call(&mut self, expr: &Expr) -> Option<Operand> {
        let ExprKind::Call {
            callee,
            args,
            generic_args,
        } = &expr.kind
        else {
            return None;
        };

        let mut lowered_args = OperandList::new();
        for arg in args {
            if let Some(operand) = self.lower_expr(arg) {
                lowered_args.push(operand);
            }
        }

        let mut is_extern = false;
        let mut name = match &callee.kind {
            ExprKind::Member { object, member, arrow } if !arrow => {
                if let ExprKind::Variable { name } = &object.kind {
                    self.mangle_member_callee(name, member, &mut is_extern)
                } else {
                    "unknown_call".to_owned()
                }
            }
            ExprKind::Variable { name } => self.mangle_simple_callee(name, generic_args, &mut is_extern),
            _ => "unknown_call".to_owned(),
        };

        // Builtin heuristic: bare print/exit spellings route to the runtime.
        if !is_extern && !name.starts_with("virex_") && (name.starts_with("print") || name == "exit") {
            name = format!("virex_{name}");
        }

        // Generic print/println dispatch by first-argument type.
        if (name == "virex_print" || name == "virex_println")
            && let Some(arg0) = args.first()
            && let Some(suffix) = print_suffix(arg0.ty.as_ref())
        {
            name.push_str(suffix);
        }

        let is_void = expr.ty.as_ref().is_some_and(Type::is_void);
        let dest = if is_void {
            None
        } else {
            Some(Operand::Temp(self.new_temp(expr.ty.as_ref())))
        };

        self.emit(Instr::call(dest.clone(), Operand::Var(name), lowered_args));
        dest
    }

    fn mangle_member_callee(&self, object: &str, member: &str, is_extern: &mut bool) -> String {
        let mut target_module_name = object.to_owned();

        if let Some(sym) = self.symbol(object)
            && sym.kind == SymbolKind::Module
        {
            let target = sym.module_id.unwrap_or(self.module);
            if let Some(real) = &self.tables[target].name {
                target_module_name = real.clone();
            }
            if let Some(member_sym) = self.tables[target].lookup(member)
                && member_sym.kind == SymbolKind::Function
                && member_sym.is_extern
            {
                *is_extern = true;
            }
        }

        let is_io = matches!(target_module_name.as_str(), "io" | "std::io");
        let is_result = matches!(target_module_name.as_str(), "result" | "std::result");

        if *is_extern && !is_io {
            return member.to_owned();
        }
        if is_io && (member == "print" || member == "println") {
            *is_extern = false;
            return format!("virex_{member}");
        }
        if is_result {
            *is_extern = false;
            return match member {
                "ok" => "virex_result_ok".to_owned(),
                "err" => "virex_result_err".to_owned(),
                other => mangle::qualified(&target_module_name, other),
            };
        }
        mangle::qualified(&target_module_name, member)
    }

    fn mangle_simple_callee(&self, name: &str, generic_args: &[Type], is_extern: &mut bool) -> String {
        if let Some(sym) = self.symbol(name)
            && sym.kind == SymbolKind::Function
            && sym.is_extern
        {
            *is_extern = true;
            return name.to_owned();
        }
        match name {
            "result::ok" => return "virex_result_ok".to_owned(),
            "result::err" => return "virex_result_err".to_owned(),
            _ => {}
        }
        if name == "main" || name.starts_with("virex_") {
            return name.to_owned();
        }

        // Generic calls dispatch to the specialized copy.
        if !generic_args.is_empty()
            && let Some(sym) = self.symbol(name)
            && !sym.type_params.is_empty()
        {
            let specialized = mangle::instantiation(name, generic_args);
            return mangle::qualified(&self.module_name(), &specialized);
        }

        mangle::qualified(&self.module_name(), name)
    }

    /// Composes the C lvalue string for member/index accesses.
    fn access_string(&mut self, expr: &Expr) -> String {
        match &expr.kind {
            ExprKind::Variable { name } => operand_cstr(&self.variable_operand(name)),
            ExprKind::Member { object, member, arrow } => {
                let base = self.access_string(object);
                format!("{base}{}{member}", if *arrow { "->" } else { "." })
            }
            ExprKind::Index { base, index } => {
                let base_str = self.access_string(base);
                let index_op = self.lower_expr(index).unwrap_or(Operand::Const(0));
                // Slices index through their data pointer.
                if matches!(base.ty, Some(Type::Slice { .. })) {
                    format!("{base_str}.data[{}]", operand_cstr(&index_op))
                } else {
                    format!("{base_str}[{}]", operand_cstr(&index_op))
                }
            }
            _ => "unknown".to_owned(),
        }
    }

    /// Lowers a slice expression to a compound-literal operand with the
    /// data pointer and length computed from the base.
    fn lower_slice(
        &mut self,
        expr: &Expr,
        base: &Expr,
        start: Option<&Expr>,
        end: Option<&Expr>,
    ) -> Option<Operand> {
        let elem_c = match &expr.ty {
            Some(Type::Slice { elem }) => c_type(Some(elem)),
            _ => "long".to_owned(),
        };
        let slice_name = slice_struct_name(&elem_c);

        let base_op = self.lower_expr(base)?;
        let base_str = operand_cstr(&base_op);
        let start_str = start
            .and_then(|e| self.lower_expr(e))
            .map(|op| operand_cstr(&op));
        let end_str = end.and_then(|e| self.lower_expr(e)).map(|op| operand_cstr(&op));

        let (data, len) = match base.ty.as_ref() {
            Some(Type::Array { size, .. }) => {
                let data = match &start_str {
                    Some(start) => format!("({base_str} + {start})"),
                    None => base_str.clone(),
                };
                let end = end_str.clone().unwrap_or_else(|| size.to_string());
                let len = match &start_str {
                    Some(start) => format!("({end} - {start})"),
                    None => end,
                };
                (data, len)
            }
            Some(Type::Slice { .. }) => {
                let data = match &start_str {
                    Some(start) => format!("({base_str}.data + {start})"),
                    None => format!("{base_str}.data"),
                };
                let end = end_str.clone().unwrap_or_else(|| format!("{base_str}.len"));
                let len = match &start_str {
                    Some(start) => format!("({end} - {start})"),
                    None => end,
                };
                (data, len)
            }
            _ => {
                // Pointer base: both bounds default to zero offsets.
                let start = start_str.clone().unwrap_or_else(|| "0".to_owned());
                let end = end_str.clone().unwrap_or_else(|| "0".to_owned());
                (format!("({base_str} + {start})"), format!("({end} - {start})"))
            }
        };

        Some(Operand::Var(format!(
            "(struct {slice_name}){{ .data = {data}, .len = {len} }}"
        )))
    }
}

/// The printable C form of an operand used inside composed access strings.
fn operand_cstr(operand: &Operand) -> String {
    match operand {
        Operand::Temp(id) => format!("t{id}"),
        Operand::Const(value) => value.to_string(),
        Operand::Float(value) => {
            let mut buffer = ryu::Buffer::new();
            buffer.format(*value).to_owned()
        }
        Operand::Var(name) | Operand::Label(name) => name.clone(),
        Operand::Str(_) => "0".to_owned(),
    }
}

/// Suffix for the runtime print dispatch, chosen by argument type.
fn print_suffix(ty: Option<&Type>) -> Option<&'static str> {
    match ty? {
        Type::Prim(Prim::I32) => Some("_i32"),
        Type::Prim(Prim::I64) => Some("_i64"),
        Type::Prim(Prim::Bool) => Some("_bool"),
        Type::Prim(Prim::F64) => Some("_f64"),
        Type::Prim(Prim::CString) => Some("_str"),
        Type::Slice { elem } if **elem == Type::Prim(Prim::U8) => Some("_slice_uint8_t"),
        Type::Enum { .. } => Some("_i32"),
        _ => None,
    }
}
