//! C code emission.
//!
//! The whole project becomes one translation unit, written in a fixed
//! order: headers, the boxed `Result` struct, materialized slice structs,
//! struct/enum definitions (monomorphized specializations included, generic
//! templates skipped), runtime prototypes, extern prototypes, forward
//! declarations, then function bodies. Bodies run through the loop-pattern
//! recognizer so counting loops come out as `for` statements with
//! vectorization hints instead of label/goto skeletons.

use std::fmt::Write as _;

use indexmap::IndexSet;

use crate::ast::{DeclKind, Expr, ExprKind, FunctionDecl, Program, Stmt, StmtKind};
use crate::ctype::{c_type, slice_struct_name, split_declarator};
use crate::ir::{r#gen, opt, Instr, IrFunction, IrModule, Opcode, Operand};
use crate::loops::{detect_simple_loop, LoopInfo};
use crate::project::Project;
use crate::symtable::SymbolKind;
use crate::types::Type;

/// Standard C functions already declared by the emitted headers; extern
/// declarations for these are suppressed.
const HEADER_FUNCTIONS: &[&str] = &[
    "printf", "puts", "malloc", "free", "exit", "sprintf", "snprintf", "fprintf", "strlen", "strcmp",
];

/// Lowers and optimizes every module. Shared by the emitter and the
/// `--emit-ir` dump.
pub fn lower_project(project: &Project) -> Vec<(String, IrModule)> {
    let main = project.main_module();
    project
        .modules
        .iter()
        .enumerate()
        .map(|(id, module)| {
            let mut ir = r#gen::generate(&module.ast, &project.tables, id, id == main);
            opt::optimize(&mut ir);
            (module.name.clone(), ir)
        })
        .collect()
}

/// Emits the complete C translation unit for an analyzed project.
pub fn emit_project(project: &Project) -> String {
    let lowered = lower_project(project);
    let mut emitter = Emitter {
        out: String::new(),
        indent: 0,
    };
    emitter.emit(project, &lowered);
    emitter.out
}

struct Emitter {
    out: String,
    indent: usize,
}

impl Emitter {
    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn raw(&mut self, text: &str) {
        self.out.push_str(text);
    }

    fn emit(&mut self, project: &Project, lowered: &[(String, IrModule)]) {
        self.raw("/* Generated by the Virex compiler */\n");
        self.raw("#include <stdio.h>\n");
        self.raw("#include <stdlib.h>\n");
        self.raw("#include <string.h>\n");
        self.raw("#include <stdint.h>\n\n");

        self.raw("/* Boxed result type */\n");
        self.raw("struct Result {\n");
        self.raw("    long is_ok;\n");
        self.raw("    union {\n");
        self.raw("        long ok_val;\n");
        self.raw("        long err_val;\n");
        self.raw("    } data;\n");
        self.raw("};\n\n");

        self.emit_slice_structs(project);
        self.emit_type_definitions(project);
        self.emit_runtime_prototypes();
        self.emit_extern_prototypes(project);
        self.emit_forward_declarations(lowered);

        for (name, ir) in lowered {
            let _ = writeln!(self.out, "/* Module: {name} */");
            for func in &ir.functions {
                self.emit_function(project, func);
            }
        }
    }

    /// One `struct Slice_<elem>` per element type appearing in any slice in
    /// the program. `[]u8` is always present: string literals produce it.
    fn emit_slice_structs(&mut self, project: &Project) {
        let mut elems: IndexSet<String> = IndexSet::new();
        elems.insert("uint8_t".to_owned());
        for module in &project.modules {
            collect_slice_elems_program(&module.ast, &mut elems);
        }
        // Monomorphized struct fields can introduce slices that never
        // appear literally in any AST (a `[]A` field instantiated with a
        // concrete argument); those live only on the symbols.
        for table in &project.tables {
            for symbol in table.global().iter() {
                for field in &symbol.fields {
                    collect_slice_elems_type(&field.ty, &mut elems);
                }
            }
        }

        self.raw("/* Slice views */\n");
        for elem in &elems {
            let name = slice_struct_name(elem);
            let _ = writeln!(self.out, "struct {name} {{\n    {elem}* data;\n    int64_t len;\n}};");
        }
        self.raw("\n");
    }

    /// Struct/enum definitions from the symbol tables. Generic templates
    /// are skipped; monomorphized specializations and module-mangled
    /// definitions are emitted once under their mangled names.
    fn emit_type_definitions(&mut self, project: &Project) {
        self.raw("/* Type definitions */\n");
        for table in &project.tables {
            for symbol in table.global().iter() {
                if symbol.kind != SymbolKind::Type || !symbol.type_params.is_empty() {
                    continue;
                }
                // The source-named symbol and its mangled twin share one
                // type; emit only the symbol whose name is the emitted name.
                let Some(type_name) = symbol.ty.as_ref().and_then(Type::nominal_name) else {
                    continue;
                };
                if type_name != symbol.name {
                    continue;
                }

                match symbol.ty.as_ref() {
                    Some(Type::Enum { .. }) => {
                        let _ = writeln!(self.out, "enum {type_name} {{");
                        for (i, variant) in symbol.variants.iter().enumerate() {
                            let comma = if i + 1 < symbol.variants.len() { "," } else { "" };
                            let _ = writeln!(self.out, "    {variant}{comma}");
                        }
                        self.raw("};\n\n");
                    }
                    Some(Type::Struct { .. }) => {
                        let _ = writeln!(self.out, "struct {type_name} {{");
                        for field in &symbol.fields {
                            let field_c = c_type(Some(&field.ty));
                            let (base, suffix) = split_declarator(&field_c);
                            let _ = writeln!(self.out, "    {base} {}{suffix};", field.name);
                        }
                        self.raw("}");
                        if symbol.is_packed {
                            self.raw(" __attribute__((packed))");
                        }
                        self.raw(";\n\n");
                    }
                    _ => {}
                }
            }
        }
    }

    fn emit_runtime_prototypes(&mut self) {
        self.raw("/* Virex runtime */\n");
        for proto in [
            "void* virex_alloc(long long size, long long count);",
            "void virex_free(void* ptr);",
            "void virex_copy(void* dst, const void* src, long long count);",
            "void virex_set(void* dst, int value, long long count);",
            "void virex_print_i32(int32_t value);",
            "void virex_println_i32(int32_t value);",
            "void virex_print_i64(long long value);",
            "void virex_println_i64(long long value);",
            "void virex_print_bool(int value);",
            "void virex_println_bool(int value);",
            "void virex_print_f64(double value);",
            "void virex_println_f64(double value);",
            "void virex_print_str(const char* str);",
            "void virex_println_str(const char* str);",
            "void virex_print_slice_uint8_t(struct Slice_uint8_t slice);",
            "void virex_println_slice_uint8_t(struct Slice_uint8_t slice);",
            "void virex_exit(int code);",
            "void virex_init_args(int argc, char** argv);",
            "int virex_get_argc(void);",
            "char* virex_get_argv(int index);",
            "void virex_slice_bounds_check(long long index, long long len);",
            "void virex_slice_range_check(long long start, long long end, long long len);",
            "double virex_math_sqrt(double x);",
            "double virex_math_pow(double base, double exp);",
            "double virex_math_abs(double x);",
            "double virex_math_floor(double x);",
            "double virex_math_ceil(double x);",
            "long virex_result_ok(long val);",
            "long virex_result_err(long val);",
        ] {
            self.raw(proto);
            self.raw("\n");
        }
        self.raw("\n");
    }

    /// Extern function prototypes from every module, minus names the
    /// standard headers already declare.
    fn emit_extern_prototypes(&mut self, project: &Project) {
        self.raw("/* Extern declarations */\n");
        for module in &project.modules {
            for decl in &module.ast.decls {
                let DeclKind::Function(f) = &decl.kind else { continue };
                if !f.is_extern || HEADER_FUNCTIONS.contains(&f.name.as_str()) {
                    continue;
                }

                let ret = c_type(Some(&f.ret));
                let _ = write!(self.out, "{ret} {}(", f.name);
                for (i, param) in f.params.iter().enumerate() {
                    if i > 0 {
                        self.raw(", ");
                    }
                    let param_c = c_type(Some(&param.ty));
                    self.raw(&param_c);
                }
                if f.is_variadic {
                    if !f.params.is_empty() {
                        self.raw(", ");
                    }
                    self.raw("...");
                }
                self.raw(");\n");
            }
        }
        self.raw("\n");
    }

    fn emit_forward_declarations(&mut self, lowered: &[(String, IrModule)]) {
        self.raw("/* Globals and forward declarations */\n");
        for (_, ir) in lowered {
            for global in &ir.globals {
                let (base, suffix) = split_declarator(&global.c_type);
                let _ = writeln!(self.out, "{base} {}{suffix} = {};", global.name, global.init);
            }
            for func in &ir.functions {
                let _ = write!(self.out, "{} {}(", func.return_type, func.name);
                for (i, param) in func.params.iter().enumerate() {
                    if i > 0 {
                        self.raw(", ");
                    }
                    // Array parameters decay in prototypes.
                    let (base, suffix) = split_declarator(&param.c_type);
                    if suffix.is_empty() {
                        self.raw(base);
                    } else {
                        let _ = write!(self.out, "{base}*");
                    }
                }
                self.raw(");\n");
            }
        }
        self.raw("\n");
    }

    fn emit_function(&mut self, project: &Project, func: &IrFunction) {
        let _ = write!(self.out, "{} {}(", func.return_type, func.name);
        for (i, param) in func.params.iter().enumerate() {
            if i > 0 {
                self.raw(", ");
            }
            let (base, suffix) = split_declarator(&param.c_type);
            if !suffix.is_empty() {
                let _ = write!(self.out, "{base} {}{suffix}", param.name);
            } else if param.c_type.contains('*') {
                let _ = write!(self.out, "{} restrict {}", param.c_type, param.name);
            } else {
                let _ = write!(self.out, "{} {}", param.c_type, param.name);
            }
        }
        self.raw(") {\n");
        self.indent += 1;

        for (id, temp_type) in func.temp_types.iter().enumerate() {
            let (base, suffix) = split_declarator(temp_type);
            self.line(&format!("{base} t{id}{suffix};"));
        }
        for local in &func.locals {
            let (base, suffix) = split_declarator(&local.c_type);
            self.line(&format!("{base} {}{suffix};", local.name));
        }

        let mut index = 0;
        while index < func.instrs.len() {
            if let Some(info) = detect_simple_loop(func, index) {
                self.emit_for_loop(project, func, &info);
                index = info.end + 1;
                continue;
            }
            self.emit_instruction(project, func, &func.instrs[index]);
            index += 1;
        }

        self.indent -= 1;
        self.raw("}\n\n");
    }

    /// Rewrites a recognized counting loop into a `for` statement. The
    /// initialization was already emitted just before the loop label, so
    /// the init clause stays empty.
    fn emit_for_loop(&mut self, project: &Project, func: &IrFunction, info: &LoopInfo) {
        let label = func.instrs[info.start]
            .src1
            .as_ref()
            .and_then(Operand::as_label)
            .unwrap_or("L");
        self.indent -= 1;
        self.line(&format!("{label}:;"));
        self.indent += 1;

        self.line("#pragma GCC ivdep");
        let cmp = match info.cmp {
            Opcode::Lt => "<",
            Opcode::Le => "<=",
            Opcode::Gt => ">",
            Opcode::Ge => ">=",
            _ => "<",
        };
        self.line(&format!(
            "for (; __builtin_expect({} {cmp} {}, 1); {} += {}) {{",
            operand_text(&info.loop_var),
            operand_text(&info.limit),
            operand_text(&info.loop_var),
            operand_text(&info.step),
        ));
        self.indent += 1;

        let mut index = info.body_start + 1;
        while index < info.step_index {
            if let Some(nested) = detect_simple_loop(func, index) {
                if nested.end < info.step_index {
                    self.emit_for_loop(project, func, &nested);
                    index = nested.end + 1;
                    continue;
                }
            }
            self.emit_instruction(project, func, &func.instrs[index]);
            index += 1;
        }

        self.indent -= 1;
        self.line("}");
    }

    fn emit_instruction(&mut self, project: &Project, func: &IrFunction, instr: &Instr) {
        match instr.op {
            Opcode::Label => {
                self.indent -= 1;
                self.line(&format!("{}:;", operand_text_opt(instr.src1.as_ref())));
                self.indent += 1;
            }
            Opcode::Add => {
                let dest_type = dest_type(instr.dest.as_ref(), func);
                let cast = if dest_type == "long" { "(long)" } else { "" };
                self.line(&format!(
                    "{} = {cast}({} + {});",
                    operand_text_opt(instr.dest.as_ref()),
                    operand_text_opt(instr.src1.as_ref()),
                    operand_text_opt(instr.src2.as_ref())
                ));
            }
            Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Mod
            | Opcode::Eq | Opcode::Ne | Opcode::Lt | Opcode::Le | Opcode::Gt | Opcode::Ge
            | Opcode::And | Opcode::Or => {
                let op = match instr.op {
                    Opcode::Sub => "-",
                    Opcode::Mul => "*",
                    Opcode::Div => "/",
                    Opcode::Mod => "%",
                    Opcode::Eq => "==",
                    Opcode::Ne => "!=",
                    Opcode::Lt => "<",
                    Opcode::Le => "<=",
                    Opcode::Gt => ">",
                    Opcode::Ge => ">=",
                    Opcode::And => "&&",
                    Opcode::Or => "||",
                    _ => unreachable!(),
                };
                self.line(&format!(
                    "{} = {} {op} {};",
                    operand_text_opt(instr.dest.as_ref()),
                    operand_text_opt(instr.src1.as_ref()),
                    operand_text_opt(instr.src2.as_ref())
                ));
            }
            Opcode::Not => self.line(&format!(
                "{} = !{};",
                operand_text_opt(instr.dest.as_ref()),
                operand_text_opt(instr.src1.as_ref())
            )),
            Opcode::Neg => self.line(&format!(
                "{} = -{};",
                operand_text_opt(instr.dest.as_ref()),
                operand_text_opt(instr.src1.as_ref())
            )),
            Opcode::Addr => {
                let dest_type = dest_type(instr.dest.as_ref(), func);
                self.line(&format!(
                    "{} = ({dest_type})&{};",
                    operand_text_opt(instr.dest.as_ref()),
                    operand_text_opt(instr.src1.as_ref())
                ));
            }
            Opcode::Deref => {
                let dest_type = dest_type(instr.dest.as_ref(), func);
                self.line(&format!(
                    "{} = *({dest_type}*){};",
                    operand_text_opt(instr.dest.as_ref()),
                    operand_text_opt(instr.src1.as_ref())
                ));
            }
            Opcode::Move | Opcode::Load => self.line(&format!(
                "{} = {};",
                operand_text_opt(instr.dest.as_ref()),
                operand_text_opt(instr.src1.as_ref())
            )),
            Opcode::Cast => {
                let dest_type = dest_type(instr.dest.as_ref(), func);
                self.line(&format!(
                    "{} = ({dest_type}){};",
                    operand_text_opt(instr.dest.as_ref()),
                    operand_text_opt(instr.src1.as_ref())
                ));
            }
            Opcode::Store => self.line(&format!(
                "{} = {};",
                operand_text_opt(instr.src1.as_ref()),
                operand_text_opt(instr.src2.as_ref())
            )),
            Opcode::Jump => self.line(&format!("goto {};", operand_text_opt(instr.src1.as_ref()))),
            Opcode::Branch => self.line(&format!(
                "if ({}) goto {};",
                operand_text_opt(instr.src1.as_ref()),
                operand_text_opt(instr.src2.as_ref())
            )),
            Opcode::Fail => {
                match &instr.src1 {
                    Some(Operand::Str(message)) => {
                        self.line(&format!(
                            "fprintf(stderr, \"Error: %s\\n\", \"{}\");",
                            escape_c(message)
                        ));
                    }
                    Some(operand) => {
                        self.line(&format!(
                            "fprintf(stderr, \"Error: %s\\n\", (char*){});",
                            operand_text(operand)
                        ));
                    }
                    None => self.line("fprintf(stderr, \"Error: program failure\\n\");"),
                }
                self.line("exit(1);");
            }
            Opcode::Call => {
                let mut text = String::new();
                if instr.dest.is_some() {
                    let dest_type = dest_type(instr.dest.as_ref(), func);
                    let _ = write!(text, "{} = ({dest_type})", operand_text_opt(instr.dest.as_ref()));
                }
                let callee = operand_text_opt(instr.src1.as_ref());
                let callee_decl = instr
                    .src1
                    .as_ref()
                    .and_then(|op| match op {
                        Operand::Var(name) => find_function_decl(project, name),
                        _ => None,
                    });
                let _ = write!(text, "{callee}(");
                for (i, arg) in instr.args.iter().enumerate() {
                    if i > 0 {
                        text.push_str(", ");
                    }
                    if let Some(decl) = callee_decl
                        && let Some(param) = decl.params.get(i)
                    {
                        let _ = write!(text, "({})", c_type(Some(&param.ty)));
                    }
                    text.push_str(&operand_text(arg));
                }
                text.push_str(");");
                self.line(&text);
            }
            Opcode::Return => {
                if let Some(value) = &instr.src1 {
                    self.line(&format!("return {};", operand_text(value)));
                } else {
                    self.line("return;");
                }
            }
            Opcode::Nop => {}
        }
    }
}

/// The C type of an instruction destination: temporaries from the
/// function's temp table, named variables from locals/params, `long`
/// otherwise.
fn dest_type(dest: Option<&Operand>, func: &IrFunction) -> String {
    match dest {
        Some(Operand::Temp(id)) => func
            .temp_types
            .get(*id as usize)
            .cloned()
            .unwrap_or_else(|| "long".to_owned()),
        Some(Operand::Var(name)) => func
            .locals
            .iter()
            .find(|local| &local.name == name)
            .map(|local| local.c_type.clone())
            .or_else(|| {
                func.params
                    .iter()
                    .find(|param| &param.name == name)
                    .map(|param| param.c_type.clone())
            })
            .unwrap_or_else(|| "long".to_owned()),
        _ => "long".to_owned(),
    }
}

fn escape_c(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            other => out.push(other),
        }
    }
    out
}

/// The C expression text of an operand. String operands materialize as
/// `[]u8` slice compound literals.
fn operand_text(operand: &Operand) -> String {
    match operand {
        Operand::Temp(id) => format!("t{id}"),
        Operand::Const(value) => value.to_string(),
        Operand::Float(value) => {
            let mut buffer = ryu::Buffer::new();
            buffer.format(*value).to_owned()
        }
        Operand::Var(name) | Operand::Label(name) => name.clone(),
        Operand::Str(value) => format!(
            "(struct Slice_uint8_t){{ .data = (uint8_t*)\"{}\", .len = {} }}",
            escape_c(value),
            value.len()
        ),
    }
}

fn operand_text_opt(operand: Option<&Operand>) -> String {
    operand.map_or_else(|| "0".to_owned(), operand_text)
}

/// Finds a function declaration by its emitted name: externs keep their
/// source names, `main` keeps its own.
fn find_function_decl<'p>(project: &'p Project, name: &str) -> Option<&'p FunctionDecl> {
    for module in &project.modules {
        for decl in &module.ast.decls {
            if let DeclKind::Function(f) = &decl.kind
                && f.name == name
            {
                return Some(f);
            }
        }
    }
    None
}

// --- Slice element collection ---

fn collect_slice_elems_type(ty: &Type, out: &mut IndexSet<String>) {
    match ty {
        Type::Slice { elem } => {
            collect_slice_elems_type(elem, out);
            out.insert(c_type(Some(elem)));
        }
        Type::Pointer { base, .. } => collect_slice_elems_type(base, out),
        Type::Array { elem, .. } => collect_slice_elems_type(elem, out),
        Type::Struct { args, .. } | Type::Enum { args, .. } => {
            for arg in args {
                collect_slice_elems_type(arg, out);
            }
        }
        Type::Function { ret, params } => {
            collect_slice_elems_type(ret, out);
            for param in params {
                collect_slice_elems_type(param, out);
            }
        }
        Type::Result { ok, err } => {
            collect_slice_elems_type(ok, out);
            collect_slice_elems_type(err, out);
        }
        Type::Prim(_) => {}
    }
}

fn collect_slice_elems_expr(expr: &Expr, out: &mut IndexSet<String>) {
    if let Some(ty) = &expr.ty {
        collect_slice_elems_type(ty, out);
    }
    match &expr.kind {
        ExprKind::Binary { left, right, .. } => {
            collect_slice_elems_expr(left, out);
            collect_slice_elems_expr(right, out);
        }
        ExprKind::Unary { operand, .. } => collect_slice_elems_expr(operand, out),
        ExprKind::Call { callee, args, .. } => {
            collect_slice_elems_expr(callee, out);
            for arg in args {
                collect_slice_elems_expr(arg, out);
            }
        }
        ExprKind::Index { base, index } => {
            collect_slice_elems_expr(base, out);
            collect_slice_elems_expr(index, out);
        }
        ExprKind::SliceOf { base, start, end } => {
            collect_slice_elems_expr(base, out);
            if let Some(start) = start {
                collect_slice_elems_expr(start, out);
            }
            if let Some(end) = end {
                collect_slice_elems_expr(end, out);
            }
        }
        ExprKind::Member { object, .. } => collect_slice_elems_expr(object, out),
        ExprKind::Cast { target, expr } => {
            collect_slice_elems_type(target, out);
            collect_slice_elems_expr(expr, out);
        }
        ExprKind::Literal(_) | ExprKind::Variable { .. } => {}
    }
}

fn collect_slice_elems_stmt(stmt: &Stmt, out: &mut IndexSet<String>) {
    match &stmt.kind {
        StmtKind::Expr(expr) => collect_slice_elems_expr(expr, out),
        StmtKind::VarDecl(var) => {
            collect_slice_elems_type(&var.ty, out);
            if let Some(init) = &var.init {
                collect_slice_elems_expr(init, out);
            }
        }
        StmtKind::If {
            cond,
            then_branch,
            else_branch,
        } => {
            collect_slice_elems_expr(cond, out);
            collect_slice_elems_stmt(then_branch, out);
            if let Some(else_branch) = else_branch {
                collect_slice_elems_stmt(else_branch, out);
            }
        }
        StmtKind::While { cond, body } => {
            collect_slice_elems_expr(cond, out);
            collect_slice_elems_stmt(body, out);
        }
        StmtKind::For { init, cond, step, body } => {
            if let Some(init) = init {
                collect_slice_elems_stmt(init, out);
            }
            if let Some(cond) = cond {
                collect_slice_elems_expr(cond, out);
            }
            if let Some(step) = step {
                collect_slice_elems_expr(step, out);
            }
            collect_slice_elems_stmt(body, out);
        }
        StmtKind::Return(value) => {
            if let Some(value) = value {
                collect_slice_elems_expr(value, out);
            }
        }
        StmtKind::Block(stmts) => {
            for stmt in stmts {
                collect_slice_elems_stmt(stmt, out);
            }
        }
        StmtKind::Match { scrutinee, arms } => {
            collect_slice_elems_expr(scrutinee, out);
            for arm in arms {
                collect_slice_elems_stmt(&arm.body, out);
            }
        }
        StmtKind::Fail(message) => {
            if let Some(message) = message {
                collect_slice_elems_expr(message, out);
            }
        }
        StmtKind::Unsafe(body) => collect_slice_elems_stmt(body, out),
        StmtKind::Break | StmtKind::Continue => {}
    }
}

fn collect_slice_elems_program(program: &Program, out: &mut IndexSet<String>) {
    for decl in &program.decls {
        match &decl.kind {
            DeclKind::Function(f) => {
                collect_slice_elems_type(&f.ret, out);
                for param in &f.params {
                    collect_slice_elems_type(&param.ty, out);
                }
                if let Some(body) = &f.body {
                    collect_slice_elems_stmt(body, out);
                }
            }
            DeclKind::Struct(s) => {
                for field in &s.fields {
                    collect_slice_elems_type(&field.ty, out);
                }
            }
            DeclKind::Global(g) => {
                collect_slice_elems_type(&g.var.ty, out);
                if let Some(init) = &g.var.init {
                    collect_slice_elems_expr(init, out);
                }
            }
            DeclKind::Enum(_) => {}
        }
    }
}
