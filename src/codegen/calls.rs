//! Call emission.
//!
//! The callee sum decides the strategy: direct native calls with coerced
//! arguments, `fn_call*` dispatch for function-valued expressions, prefixed
//! runtime calls for system functions, and `goto` rewrites for tail
//! recursive self-calls.

use std::rc::Rc;

use crate::ast::*;
use crate::codegen::context::non_tail;
use crate::codegen::Transpiler;
use crate::safety;
use crate::typechecker::{FuncMeta, ParamSig, TypeInfo};
use crate::value::TypeId;

impl<'a> Transpiler<'a> {
    /// Emit a function value: a plain pointer wrapper for non-capturing
    /// functions, or the environment-allocating closure builder.
    pub(crate) fn emit_function_value(&mut self, meta: &Rc<FuncMeta>, module: Option<usize>) {
        let display = self.ctx.display_name(meta);
        let arity = meta.arity();

        if meta.has_captures() {
            let env = meta.env_name.clone();
            self.ctx.outf(format_args!(
                "({{ {env}* _closure_env = heap_calloc(sizeof({env}), 0);\n"
            ));
            let captures = meta.captures.borrow().clone();
            for cap in &captures {
                self.ctx
                    .outf(format_args!("  _closure_env->{} = ", cap.name));
                // A capture already held by the enclosing closure copies
                // from its environment instead of reboxing.
                let from_outer = self
                    .ctx
                    .current_closure
                    .as_ref()
                    .and_then(|outer| outer.find_capture(&cap.name))
                    .is_some();
                self.emit_box_capture(cap, from_outer);
                self.ctx.out(";\n");
            }
            self.ctx.out("  to_closure_named(");
            self.emit_fn_name(meta, module);
            self.ctx
                .outf(format_args!(",{arity},_closure_env,\"{display}\"); }})"));
        } else {
            self.ctx.out("to_fn_named(");
            self.emit_fn_name(meta, module);
            self.ctx.outf(format_args!(",{arity},\"{display}\")"));
        }
    }

    pub(crate) fn emit_fn_name(&mut self, meta: &FuncMeta, module: Option<usize>) {
        if let Some(module) = module {
            self.ctx.outf(format_args!("m{module}."));
        }
        self.ctx.out(&meta.mangled);
    }

    pub(crate) fn emit_call(&mut self, call: &CallExpression<TypeInfo>) {
        // Tail recursive self-call: rewrite to parameter reassignment + goto.
        if self.ctx.in_tail_position {
            if let Some(tco) = self.ctx.tco_func.clone() {
                if safety::is_recursive_call(call, &tco) {
                    self.emit_tail_call(call, &tco);
                    return;
                }
            }
        }

        match call.resolved.clone() {
            Some(Callee::System(info)) => {
                let symbol = info.runtime_symbol(call.arguments.len());
                self.ctx.out(&symbol);
                self.ctx.outc('(');
                let mut first = true;
                for arg in &call.arguments {
                    if first {
                        first = false;
                    } else {
                        self.ctx.outc(',');
                    }
                    self.emit_call_argument(Some(&arg.value), None, true);
                }
                self.ctx.outc(')');
            }
            Some(Callee::Direct { meta, module }) => {
                if meta.has_captures() {
                    // The closure value carries the environment; dispatch
                    // through fn_call like any dynamic callee.
                    self.emit_dynamic_call(call, |tp| {
                        tp.emit_function_value(&meta, module);
                    });
                } else {
                    self.emit_direct_call(call, &meta, module);
                }
            }
            Some(Callee::Dynamic) | None => {
                let callee = call.callee.clone();
                self.emit_dynamic_call(call, move |tp| {
                    tp.emit_callee_pointer(&callee);
                });
            }
        }
    }

    /// Function pointer expression for a dynamic call.
    fn emit_callee_pointer(&mut self, callee: &Expression<TypeInfo>) {
        // A captured callee lives in the closure environment as an Item.
        if let Some(closure) = self.ctx.current_closure.clone() {
            if let Expression::Ident(ident) = callee.unwrap_parens() {
                if let Some(cap) = closure.find_capture(&ident.name) {
                    self.ctx
                        .outf(format_args!("(Function*)_env->{}", cap.name));
                    return;
                }
            }
        }
        match callee.unwrap_parens() {
            Expression::Ident(ident) => match &ident.target {
                Some(Binding::Param { name, ty, .. }) => {
                    // Item-typed parameters cast to the function pointer
                    // shape; declared function parameters are already it.
                    if ty.type_id() == TypeId::Func && self.ctx.current_closure.is_none() {
                        self.ctx.outf(format_args!("_{name}"));
                    } else {
                        self.ctx.outf(format_args!("(Function*)_{name}"));
                    }
                }
                Some(Binding::Local { name, ty, module, .. }) => {
                    if ty.type_id() != TypeId::Func {
                        self.ctx.out("(Function*)");
                    }
                    if let Some(module) = module {
                        self.ctx.outf(format_args!("m{module}."));
                    }
                    self.ctx.outf(format_args!("_{name}"));
                }
                _ => {
                    self.ctx.out("(Function*)");
                    non_tail!(self, self.emit_expr(callee));
                }
            },
            _ => {
                self.ctx.out("(Function*)");
                non_tail!(self, self.emit_expr(callee));
            }
        }
    }

    /// Dynamic dispatch: specialized `fn_callN` for up to three arguments,
    /// otherwise the general `fn_call` over an on-stack list header.
    fn emit_dynamic_call(
        &mut self,
        call: &CallExpression<TypeInfo>,
        emit_callee: impl FnOnce(&mut Self),
    ) {
        let arg_count = call.arguments.len();
        if arg_count <= 3 {
            self.ctx.outf(format_args!("fn_call{arg_count}("));
            emit_callee(self);
            for arg in &call.arguments {
                self.ctx.outc(',');
                non_tail!(self, self.emit_box_item(&arg.value));
            }
            self.ctx.outc(')');
        } else {
            self.ctx.out("fn_call(");
            emit_callee(self);
            self.ctx.out(",({Item _fa[]={");
            let mut first = true;
            for arg in &call.arguments {
                if first {
                    first = false;
                } else {
                    self.ctx.outc(',');
                }
                non_tail!(self, self.emit_box_item(&arg.value));
            }
            self.ctx.outf(format_args!(
                "}}; List _fl={{.type_id={},.items=_fa,.length={arg_count},.capacity={arg_count}}}; &_fl;}}))",
                TypeId::List as u8
            ));
        }
    }

    /// Positional/named arguments resolved into parameter order; `None`
    /// slots fall back to defaults or null.
    pub(crate) fn resolve_arg_order<'c>(
        &self,
        meta: &FuncMeta,
        arguments: &'c [Argument<TypeInfo>],
    ) -> (Vec<Option<&'c Argument<TypeInfo>>>, Vec<&'c Argument<TypeInfo>>) {
        let params = &meta.signature.params;
        let mut resolved: Vec<Option<&Argument<TypeInfo>>> = vec![None; params.len()];
        let mut rest = Vec::new();
        let mut positional = 0usize;

        for arg in arguments {
            match &arg.name {
                Some(name) => {
                    if let Some(index) = params.iter().position(|p| &p.name == name) {
                        if resolved[index].is_none() {
                            resolved[index] = Some(arg);
                        }
                    }
                }
                None => {
                    if positional < params.len() {
                        if resolved[positional].is_none() {
                            resolved[positional] = Some(arg);
                        }
                    } else {
                        // Extra positional arguments feed the variadic tail.
                        rest.push(arg);
                    }
                    positional += 1;
                }
            }
        }
        (resolved, rest)
    }

    fn emit_direct_call(
        &mut self,
        call: &CallExpression<TypeInfo>,
        meta: &Rc<FuncMeta>,
        module: Option<usize>,
    ) {
        let (resolved, rest) = {
            let (r, rest) = self.resolve_arg_order(meta, &call.arguments);
            (
                r.iter()
                    .map(|slot| slot.cloned())
                    .collect::<Vec<Option<Argument<TypeInfo>>>>(),
                rest.iter().map(|&arg| arg.clone()).collect::<Vec<_>>(),
            )
        };
        let signature = meta.signature.clone();
        let defaults = meta.defaults.borrow().clone();

        self.emit_fn_name(meta, module);
        self.ctx.outc('(');
        let mut wrote = false;
        for (index, param) in signature.params.iter().enumerate() {
            if wrote {
                self.ctx.outc(',');
            }
            wrote = true;
            match &resolved[index] {
                Some(arg) => self.emit_call_argument(Some(&arg.value), Some(param), false),
                None => match defaults.get(index).and_then(|d| d.as_ref()) {
                    Some(default) => {
                        let default = default.clone();
                        if param.is_optional || param.ty.type_id() == TypeId::Any {
                            non_tail!(self, self.emit_box_item(&default));
                        } else {
                            non_tail!(self, self.emit_expr(&default));
                        }
                    }
                    // Missing optional parameters become null.
                    None => self.ctx.out("ITEM_NULL"),
                },
            }
        }

        if signature.is_variadic {
            if wrote {
                self.ctx.outc(',');
            }
            if rest.is_empty() {
                self.ctx.out("null");
            } else {
                // Package the extra arguments into a lazy on-stack list.
                self.ctx.out("({Item _va[]={");
                let mut first = true;
                for arg in &rest {
                    if first {
                        first = false;
                    } else {
                        self.ctx.outc(',');
                    }
                    non_tail!(self, self.emit_box_item(&arg.value));
                }
                self.ctx.outf(format_args!(
                    "}}; List _vl={{.type_id={},.items=_va,.length={},.capacity={}}}; &_vl;}})",
                    TypeId::List as u8,
                    rest.len(),
                    rest.len()
                ));
            }
        } else if !rest.is_empty() {
            log::warn!(
                "discarding {} extra arguments to {}",
                rest.len(),
                meta.mangled
            );
        }
        self.ctx.outc(')');
    }

    /// One argument, coerced to its parameter slot.
    pub(crate) fn emit_call_argument(
        &mut self,
        value: Option<&Expression<TypeInfo>>,
        param: Option<&ParamSig>,
        is_sys_func: bool,
    ) {
        let Some(value) = value else {
            self.ctx.out("ITEM_NULL");
            return;
        };

        // System functions take Items; datetimes box explicitly since their
        // unboxed form is a pointer.
        if is_sys_func {
            if value.info().type_id() == TypeId::DateTime && !value.info().is_literal {
                self.ctx.out("k2it(");
                non_tail!(self, self.emit_expr(value));
                self.ctx.outc(')');
            } else {
                non_tail!(self, self.emit_box_item(value));
            }
            return;
        }

        let Some(param) = param else {
            non_tail!(self, self.emit_box_item(value));
            return;
        };

        // Optional parameters always receive Items.
        if param.is_optional {
            non_tail!(self, self.emit_box_item(value));
            return;
        }

        let value_id = value.info().type_id();
        match (param.ty.type_id(), value_id) {
            (want, have) if want == have => non_tail!(self, self.emit_expr(value)),
            (TypeId::Float, have) if have.is_numeric() => {
                non_tail!(self, self.emit_expr(value))
            }
            (TypeId::Float, TypeId::Any | TypeId::Number) => {
                self.ctx.out("it2f(");
                non_tail!(self, self.emit_expr(value));
                self.ctx.outc(')');
            }
            (TypeId::Int64, TypeId::Int) => non_tail!(self, self.emit_expr(value)),
            (TypeId::Int64, TypeId::Float) => {
                self.ctx.out("((int64_t)");
                non_tail!(self, self.emit_expr(value));
                self.ctx.outc(')');
            }
            (TypeId::Int64, TypeId::Any | TypeId::Number) => {
                self.ctx.out("it2l(");
                non_tail!(self, self.emit_expr(value));
                self.ctx.outc(')');
            }
            (TypeId::Int, TypeId::Int64 | TypeId::Float) => {
                self.ctx.out("((int32_t)");
                non_tail!(self, self.emit_expr(value));
                self.ctx.outc(')');
            }
            (TypeId::Int, TypeId::Any | TypeId::Number) => {
                self.ctx.out("it2i(");
                non_tail!(self, self.emit_expr(value));
                self.ctx.outc(')');
            }
            _ => non_tail!(self, self.emit_box_item(value)),
        }
    }

    /// Tail call → compute argument temporaries, reassign parameters, jump
    /// to the entry label. Temporaries make swapped-argument calls safe.
    fn emit_tail_call(&mut self, call: &CallExpression<TypeInfo>, tco: &Rc<FuncMeta>) {
        let (resolved, _) = {
            let (r, rest) = self.resolve_arg_order(tco, &call.arguments);
            (
                r.iter()
                    .map(|slot| slot.cloned())
                    .collect::<Vec<Option<Argument<TypeInfo>>>>(),
                rest,
            )
        };
        let signature = tco.signature.clone();
        let defaults = tco.defaults.borrow().clone();
        let is_closure = tco.has_captures();

        self.ctx.out("({ ");
        for (index, param) in signature.params.iter().enumerate() {
            // Temporaries mirror the parameter slot type: closure and
            // optional parameters live in Item slots, so their values box
            // before reassignment.
            let is_item_slot = is_closure || param.is_optional;
            let c_type = if is_item_slot {
                "Item"
            } else {
                param.ty.type_id().c_type()
            };
            self.ctx.outf(format_args!("{c_type} _tco_tmp{index} = "));
            match &resolved[index] {
                Some(arg) => {
                    if is_item_slot {
                        non_tail!(self, self.emit_box_item(&arg.value));
                    } else {
                        self.emit_call_argument(Some(&arg.value), Some(param), false);
                    }
                }
                None => match defaults.get(index).and_then(|d| d.as_ref()) {
                    Some(default) => {
                        let default = default.clone();
                        if is_item_slot {
                            non_tail!(self, self.emit_box_item(&default));
                        } else {
                            non_tail!(self, self.emit_expr(&default));
                        }
                    }
                    None => self.ctx.out("ITEM_NULL"),
                },
            }
            self.ctx.out("; ");
        }
        for (index, param) in signature.params.iter().enumerate() {
            self.ctx
                .outf(format_args!("_{} = _tco_tmp{index}; ", param.name));
        }
        self.ctx.out("goto _tco_start; ");

        // Unreached value keeping the statement expression typed; closures
        // always return Items.
        if is_closure {
            self.ctx.out("ITEM_NULL; })");
            return;
        }
        match signature.returned.type_id() {
            TypeId::Int => self.ctx.out("0; })"),
            TypeId::Int64 => self.ctx.out("0L; })"),
            TypeId::Float => self.ctx.out("0.0; })"),
            TypeId::Bool => self.ctx.out("false; })"),
            _ => self.ctx.out("ITEM_NULL; })"),
        }
    }
}
