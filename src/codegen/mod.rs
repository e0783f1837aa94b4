//! C transpiler for checked Lambda scripts.
//!
//! A visitor over the typed AST writing target source into a growable
//! buffer. Emission never aborts: a node that cannot be lowered records a
//! diagnostic and emits the error sentinel so the surrounding expression
//! still compiles. The same input AST always produces byte-identical
//! output.
//!
//! Top-level emission order: runtime prelude, shared runtime-context
//! pointer, closure environment records, forward declarations, module
//! import structs, global variable storage, function definitions, then a
//! single entry function that runs the script content and dispatches to a
//! user `main` procedure when one exists.

mod boxing;
mod calls;
mod context;
mod exprs;
mod items;
mod stams;

use std::collections::HashMap;

use log::debug;

use crate::ast::*;
use crate::codegen::context::EmitContext;
use crate::loader::{Modules, Script};
use crate::runtime::{RUNTIME_PRELUDE, STACK_CHECK_DEFINE};
use crate::typechecker::{Binding, FuncKind, FuncMeta, LambdaError, TypeInfo};
use crate::value::TypeId;

/// Result of transpiling one script.
#[derive(Debug)]
pub struct TranspileOutput {
    pub source: String,
    /// Emitted symbol → display name, for stack traces.
    pub func_names: HashMap<String, String>,
    /// Problems recovered during emission.
    pub errors: Vec<LambdaError>,
}

pub struct Transpiler<'a> {
    pub(crate) ctx: EmitContext,
    pub(crate) script: &'a Script,
    pub(crate) modules: &'a Modules,
}

/// Transpile a checked script against its module registry.
pub fn transpile(script: &Script, modules: &Modules) -> TranspileOutput {
    let mut tp = Transpiler {
        ctx: EmitContext::new(),
        script,
        modules,
    };
    tp.emit_script();
    TranspileOutput {
        source: tp.ctx.buf,
        func_names: tp.ctx.func_names,
        errors: tp.ctx.errors,
    }
}

/// Transpile a standalone script (no imports).
pub fn transpile_script(script: &Script) -> TranspileOutput {
    let no_modules = Modules::new();
    transpile(script, &no_modules)
}

impl<'a> Transpiler<'a> {
    fn emit_script(&mut self) {
        debug!("transpiling script '{}'", self.script.reference);
        self.ctx.out(RUNTIME_PRELUDE);
        self.ctx.out(STACK_CHECK_DEFINE);

        // All modules share one runtime context pointer.
        self.ctx.out("\nextern Context* _lambda_rt;\n");
        self.ctx.out("#define rt _lambda_rt\n");

        let funcs = collect_funcs(self.script.ast.nodes());

        // Closure environment records and forward declarations first, so
        // definitions can reference each other out of order and nested
        // functions can be taken as values before their hoisted bodies.
        for def in &funcs {
            if def.meta().has_captures() {
                self.define_closure_env(def.meta());
            }
            self.forward_declare_func(def);
        }

        for statement in self.script.ast.nodes() {
            if let Statement::Import(import) = statement {
                self.define_module_import(import);
            }
        }

        for statement in self.script.ast.nodes() {
            match statement {
                Statement::Let(stm) | Statement::Pub(stm) | Statement::Var(stm) => {
                    self.declare_global_var(stm)
                }
                _ => {}
            }
        }

        // Every function definition, nested ones hoisted to global level.
        for def in &funcs {
            self.define_func(def);
        }

        self.emit_entry();
    }

    /// The single entry function: initialize the runtime pointer, run the
    /// content (the last value-producing statement is the script's value),
    /// assign globals, then optionally dispatch to a user `main` procedure.
    fn emit_entry(&mut self) {
        self.ctx
            .out("\nItem main(Context *runtime) {\n _lambda_rt = runtime;\n");
        self.ctx.out(" Item result = ({");

        let mut has_content = false;
        for statement in self.script.ast.nodes() {
            match statement {
                Statement::Let(stm) | Statement::Pub(stm) | Statement::Var(stm) => {
                    self.assign_global_var(stm)
                }
                Statement::Import(_) | Statement::FuncDef(_) | Statement::PatternDef(_) => {}
                Statement::Expression(expr) => {
                    self.ctx.out("\n ");
                    self.emit_box_item(expr);
                    self.ctx.outc(';');
                    has_content = true;
                }
                Statement::For(fore) => {
                    self.ctx.out("\n ");
                    self.emit_for(fore);
                    self.ctx.outc(';');
                    has_content = true;
                }
                other => {
                    self.emit_proc_statement_top(other);
                }
            }
        }
        if !has_content {
            self.ctx.out("ITEM_NULL");
        }
        self.ctx.out(";});\n");

        for statement in self.script.ast.nodes() {
            if let Statement::FuncDef(def) = statement {
                if def.kind == FuncKind::Procedure && def.name.as_deref() == Some("main") {
                    self.ctx.out(" if (rt->run_main) result = ");
                    self.ctx.out(&def.meta().mangled);
                    self.ctx.out("();\n");
                }
            }
        }

        self.ctx.out(" return result;\n}\n");
    }

    /// Stray procedural statement at script top level; kept runnable.
    fn emit_proc_statement_top(&mut self, statement: &Statement<TypeInfo>) {
        match statement {
            Statement::While(stm) => self.emit_while(stm),
            Statement::If(stm) => {
                self.ctx.out("\n ");
                self.emit_if_statement(stm);
            }
            Statement::Assign(stm) => self.emit_assign_stam(stm),
            other => {
                self.shape_error("unsupported top-level statement", other.span());
            }
        }
    }

    fn define_closure_env(&mut self, meta: &FuncMeta) {
        self.ctx
            .outf(format_args!("\ntypedef struct {} {{\n", meta.env_name));
        for cap in meta.captures.borrow().iter() {
            // Captures store as Items: immutable capture by value.
            self.ctx.outf(format_args!("  Item {};\n", cap.name));
        }
        self.ctx.outf(format_args!("}} {};\n", meta.env_name));
    }

    fn write_signature(&mut self, def: &FuncDef<TypeInfo>, as_pointer: bool) {
        let meta = def.meta().clone();
        let is_closure = meta.has_captures();

        // Closures return Items so fn_call* can dispatch them uniformly.
        if is_closure {
            self.ctx.out("Item");
        } else {
            self.ctx
                .out(meta.signature.returned.type_id().c_type());
        }
        self.ctx.out(if as_pointer { " (*" } else { " " });
        self.ctx.out(&meta.mangled);
        if as_pointer {
            self.ctx.outc(')');
        }
        self.ctx.outc('(');

        let mut has_params = false;
        if is_closure {
            self.ctx.out("void* _env_ptr");
            has_params = true;
        }
        for param in &meta.signature.params {
            if has_params {
                self.ctx.outc(',');
            }
            // Closure and optional parameters arrive as Items.
            if is_closure || param.is_optional {
                self.ctx.out("Item");
            } else {
                self.ctx.out(param.ty.type_id().c_type());
            }
            self.ctx.outf(format_args!(" _{}", param.name));
            has_params = true;
        }
        if meta.signature.is_variadic {
            if has_params {
                self.ctx.outc(',');
            }
            self.ctx.out("List* _vargs");
        }
        self.ctx.outc(')');
    }

    fn forward_declare_func(&mut self, def: &FuncDef<TypeInfo>) {
        self.ctx.outc('\n');
        self.write_signature(def, false);
        self.ctx.out(";\n");
    }

    fn define_func(&mut self, def: &FuncDef<TypeInfo>) {
        let meta = def.meta().clone();
        let is_closure = meta.has_captures();
        self.ctx.register_func_name(&meta);

        self.ctx.outc('\n');
        self.write_signature(def, false);
        self.ctx.out("{\n");

        if is_closure {
            self.ctx.outf(format_args!(
                " {env}* _env = ({env}*)_env_ptr;\n",
                env = meta.env_name
            ));
        }

        // TCO-converted functions cannot grow the stack; everything else
        // gets the conservative entry check.
        let use_tco = meta.tco.get();
        if use_tco {
            self.ctx.out(" _tco_start:;\n");
        } else {
            let display = self.ctx.display_name(&meta);
            self.ctx
                .outf(format_args!(" LAMBDA_STACK_CHECK(\"{display}\");\n"));
        }

        if meta.signature.is_variadic {
            self.ctx.out(" set_vargs(_vargs);\n");
        }

        let saved_closure = self.ctx.current_closure.take();
        if is_closure {
            self.ctx.current_closure = Some(meta.clone());
        }
        let saved_tco = self.ctx.tco_func.take();
        let saved_tail = self.ctx.in_tail_position;
        if use_tco {
            self.ctx.tco_func = Some(meta.clone());
            self.ctx.in_tail_position = true;
        } else {
            self.ctx.in_tail_position = false;
        }

        let is_proc = def.kind == FuncKind::Procedure;
        self.ctx.out(" return ");
        match &def.body {
            Expression::Content(block) if is_proc => self.emit_proc_content(block),
            body => {
                // Box when the declared return is ANY (or this is a
                // closure); otherwise the native value returns directly.
                let returned = meta.signature.returned.type_id();
                if is_closure || returned == TypeId::Any {
                    self.emit_box_item(body);
                } else {
                    self.emit_expr(body);
                }
            }
        }
        self.ctx.out(";\n}\n");

        self.ctx.current_closure = saved_closure;
        self.ctx.tco_func = saved_tco;
        self.ctx.in_tail_position = saved_tail;
    }

    /// Import struct: one record per imported script listing its public
    /// functions (as pointers) and public variables.
    fn define_module_import(&mut self, import: &Import) {
        let Some(index) = import.script else {
            self.shape_error("unresolved import", import.span);
            return;
        };
        let Some(exported) = self.modules.by_index(index) else {
            self.shape_error("import index out of range", import.span);
            return;
        };

        self.ctx.outf(format_args!("struct Mod{index} {{\n"));
        for (name, binding) in &exported.exports.symbols {
            match binding {
                Binding::Func { meta, .. } => {
                    self.ctx
                        .out(meta.signature.returned.type_id().c_type());
                    self.ctx.outf(format_args!(" (*{})(", meta.mangled));
                    let mut first = true;
                    for param in &meta.signature.params {
                        if !first {
                            self.ctx.outc(',');
                        }
                        first = false;
                        if param.is_optional {
                            self.ctx.out("Item");
                        } else {
                            self.ctx.out(param.ty.type_id().c_type());
                        }
                    }
                    if meta.signature.is_variadic {
                        if !first {
                            self.ctx.outc(',');
                        }
                        self.ctx.out("List*");
                    }
                    self.ctx.out(");\n");
                }
                Binding::Local { ty, .. } => {
                    self.ctx
                        .outf(format_args!("{} _{name};\n", ty.type_id().c_type()));
                }
                _ => {}
            }
        }
        self.ctx.outf(format_args!("}} m{index};\n"));
    }
}

/// Every function definition in the script, outer before nested, in source
/// order. Definitions hoist to global level in the emitted C.
fn collect_funcs(statements: &[Statement<TypeInfo>]) -> Vec<&FuncDef<TypeInfo>> {
    let mut funcs = Vec::new();
    for statement in statements {
        collect_in_statement(statement, &mut funcs);
    }
    funcs
}

fn collect_in_statement<'x>(
    statement: &'x Statement<TypeInfo>,
    out: &mut Vec<&'x FuncDef<TypeInfo>>,
) {
    match statement {
        Statement::FuncDef(def) => {
            out.push(def);
            collect_in_fn(def, out);
        }
        Statement::Let(stm) | Statement::Pub(stm) | Statement::Var(stm) => {
            for decl in &stm.declarations {
                match decl {
                    Declaration::Single(decl) => collect_in_expression(&decl.value, out),
                    Declaration::Decompose(decl) => collect_in_expression(&decl.value, out),
                }
            }
        }
        Statement::Assign(stm) => collect_in_expression(&stm.value, out),
        Statement::If(stm) => collect_in_if(stm, out),
        Statement::While(stm) => {
            collect_in_expression(&stm.condition, out);
            for item in &stm.body.items {
                collect_in_statement(item, out);
            }
        }
        Statement::For(fore) => collect_in_for(fore, out),
        Statement::Return(stm) => {
            if let Some(value) = &stm.value {
                collect_in_expression(value, out);
            }
        }
        Statement::Expression(expr) => collect_in_expression(expr, out),
        _ => {}
    }
}

fn collect_in_if<'x>(stm: &'x IfStatement<TypeInfo>, out: &mut Vec<&'x FuncDef<TypeInfo>>) {
    collect_in_expression(&stm.condition, out);
    for item in &stm.then_branch.items {
        collect_in_statement(item, out);
    }
    match &stm.else_branch {
        Some(ElseBranch::Block(block)) => {
            for item in &block.items {
                collect_in_statement(item, out);
            }
        }
        Some(ElseBranch::ElseIf(nested)) => collect_in_if(nested, out),
        None => {}
    }
}

fn collect_in_for<'x>(fore: &'x ForExpression<TypeInfo>, out: &mut Vec<&'x FuncDef<TypeInfo>>) {
    for binding in &fore.loops {
        collect_in_expression(&binding.source, out);
    }
    for decl in &fore.lets {
        collect_in_expression(&decl.value, out);
    }
    if let Some(clause) = &fore.where_clause {
        collect_in_expression(clause, out);
    }
    collect_in_expression(&fore.body, out);
}

fn collect_in_fn<'x>(def: &'x FuncDef<TypeInfo>, out: &mut Vec<&'x FuncDef<TypeInfo>>) {
    for param in &def.params {
        if let Some(default) = &param.default {
            collect_in_expression(default, out);
        }
    }
    collect_in_expression(&def.body, out);
}

fn collect_in_expression<'x>(
    expr: &'x Expression<TypeInfo>,
    out: &mut Vec<&'x FuncDef<TypeInfo>>,
) {
    match expr {
        Expression::FnExpr(def) => {
            out.push(def);
            collect_in_fn(def, out);
        }
        Expression::Parens(inner) => collect_in_expression(inner, out),
        Expression::Unary(e) => collect_in_expression(&e.operand, out),
        Expression::Binary(e) => {
            collect_in_expression(&e.left, out);
            collect_in_expression(&e.right, out);
        }
        Expression::Pipe(e) => {
            collect_in_expression(&e.left, out);
            collect_in_expression(&e.right, out);
        }
        Expression::Member(e) => {
            collect_in_expression(&e.object, out);
            if let MemberField::Expr(field) = &e.field {
                collect_in_expression(field, out);
            }
        }
        Expression::Index(e) => {
            collect_in_expression(&e.object, out);
            collect_in_expression(&e.index, out);
        }
        Expression::PathIndex(e) => {
            collect_in_expression(&e.base, out);
            collect_in_expression(&e.segment, out);
        }
        Expression::Array(e) => {
            for item in &e.items {
                collect_in_expression(item, out);
            }
        }
        Expression::List(e) => {
            for stm in &e.declarations {
                for decl in &stm.declarations {
                    if let Declaration::Single(decl) = decl {
                        collect_in_expression(&decl.value, out);
                    }
                }
            }
            for item in &e.items {
                collect_in_expression(item, out);
            }
        }
        Expression::Content(block) => {
            for item in &block.items {
                collect_in_statement(item, out);
            }
        }
        Expression::Map(e) => {
            for entry in &e.entries {
                if let MapKey::Expr(key) = &entry.key {
                    collect_in_expression(key, out);
                }
                collect_in_expression(&entry.value, out);
            }
        }
        Expression::Element(e) => {
            for entry in &e.attrs {
                collect_in_expression(&entry.value, out);
            }
            for item in &e.content {
                collect_in_expression(item, out);
            }
        }
        Expression::If(e) => {
            collect_in_expression(&e.condition, out);
            collect_in_expression(&e.then_branch, out);
            if let Some(else_branch) = &e.else_branch {
                collect_in_expression(else_branch, out);
            }
        }
        Expression::For(e) => collect_in_for(e, out),
        Expression::Call(e) => {
            collect_in_expression(&e.callee, out);
            for arg in &e.arguments {
                collect_in_expression(&arg.value, out);
            }
        }
        _ => {}
    }
}
