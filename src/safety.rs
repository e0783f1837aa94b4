//! Stack-safety and tail-call analysis.
//!
//! Every user-defined function conservatively receives a stack-overflow
//! check at entry. A function may skip the check only when it is converted
//! to a loop: that requires every direct recursive self-call to sit in tail
//! position, so that replacing them with parameter reassignment and a jump
//! leaves no recursive call behind.
//!
//! Tail positions are structural: the function body; both branches of an
//! `if` whose own position is tail; the terminal item of a list/content
//! region in tail position; the operand of a procedural `return`. Nothing
//! else — operands, arguments, constructor items and clauses are never tail
//! positions.

use std::rc::Rc;

use log::debug;

use crate::ast::*;
use crate::typechecker::{FuncMeta, TypeInfo};

/// Walk a checked script and mark every TCO-eligible function on its meta.
pub fn analyze(ast: &Ast<TypeInfo>) {
    for statement in ast.nodes() {
        analyze_statement(statement);
    }
}

fn analyze_statement(statement: &Statement<TypeInfo>) {
    match statement {
        Statement::FuncDef(def) => analyze_fn(def),
        Statement::Let(stm) | Statement::Pub(stm) | Statement::Var(stm) => {
            for decl in &stm.declarations {
                match decl {
                    Declaration::Single(decl) => analyze_expression(&decl.value),
                    Declaration::Decompose(decl) => analyze_expression(&decl.value),
                }
            }
        }
        Statement::Assign(stm) => analyze_expression(&stm.value),
        Statement::If(stm) => analyze_if_statement(stm),
        Statement::While(stm) => {
            analyze_expression(&stm.condition);
            analyze_content(&stm.body);
        }
        Statement::For(stm) => analyze_for(stm),
        Statement::Return(stm) => {
            if let Some(value) = &stm.value {
                analyze_expression(value);
            }
        }
        Statement::Expression(expr) => analyze_expression(expr),
        Statement::Break(_) | Statement::Continue(_) | Statement::PatternDef(_)
        | Statement::Import(_) => {}
    }
}

fn analyze_if_statement(stm: &IfStatement<TypeInfo>) {
    analyze_expression(&stm.condition);
    analyze_content(&stm.then_branch);
    match &stm.else_branch {
        Some(ElseBranch::Block(block)) => analyze_content(block),
        Some(ElseBranch::ElseIf(nested)) => analyze_if_statement(nested),
        None => {}
    }
}

fn analyze_content(block: &ContentBlock<TypeInfo>) {
    for item in &block.items {
        analyze_statement(item);
    }
}

fn analyze_for(fore: &ForExpression<TypeInfo>) {
    for binding in &fore.loops {
        analyze_expression(&binding.source);
    }
    for decl in &fore.lets {
        analyze_expression(&decl.value);
    }
    if let Some(clause) = &fore.where_clause {
        analyze_expression(clause);
    }
    if let Some(group) = &fore.group {
        for key in &group.keys {
            analyze_expression(key);
        }
    }
    for spec in &fore.order {
        analyze_expression(&spec.key);
    }
    if let Some(limit) = &fore.limit {
        analyze_expression(limit);
    }
    if let Some(offset) = &fore.offset {
        analyze_expression(offset);
    }
    analyze_expression(&fore.body);
}

/// Recurse into nested function definitions only; recursive-call counting
/// happens separately per function.
fn analyze_expression(expr: &Expression<TypeInfo>) {
    match expr {
        Expression::FnExpr(def) => analyze_fn(def),
        Expression::Parens(inner) => analyze_expression(inner),
        Expression::Unary(e) => analyze_expression(&e.operand),
        Expression::Binary(e) => {
            analyze_expression(&e.left);
            analyze_expression(&e.right);
        }
        Expression::Pipe(e) => {
            analyze_expression(&e.left);
            analyze_expression(&e.right);
        }
        Expression::Member(e) => {
            analyze_expression(&e.object);
            if let MemberField::Expr(field) = &e.field {
                analyze_expression(field);
            }
        }
        Expression::Index(e) => {
            analyze_expression(&e.object);
            analyze_expression(&e.index);
        }
        Expression::PathIndex(e) => {
            analyze_expression(&e.base);
            analyze_expression(&e.segment);
        }
        Expression::Array(e) => e.items.iter().for_each(analyze_expression),
        Expression::List(e) => {
            for stm in &e.declarations {
                for decl in &stm.declarations {
                    match decl {
                        Declaration::Single(decl) => analyze_expression(&decl.value),
                        Declaration::Decompose(decl) => analyze_expression(&decl.value),
                    }
                }
            }
            e.items.iter().for_each(analyze_expression);
        }
        Expression::Content(block) => analyze_content(block),
        Expression::Map(e) => {
            for entry in &e.entries {
                if let MapKey::Expr(key) = &entry.key {
                    analyze_expression(key);
                }
                analyze_expression(&entry.value);
            }
        }
        Expression::Element(e) => {
            for entry in &e.attrs {
                analyze_expression(&entry.value);
            }
            e.content.iter().for_each(analyze_expression);
        }
        Expression::If(e) => {
            analyze_expression(&e.condition);
            analyze_expression(&e.then_branch);
            if let Some(else_branch) = &e.else_branch {
                analyze_expression(else_branch);
            }
        }
        Expression::For(e) => analyze_for(e),
        Expression::Call(e) => {
            analyze_expression(&e.callee);
            for arg in &e.arguments {
                analyze_expression(&arg.value);
            }
        }
        _ => {}
    }
}

fn analyze_fn(def: &FuncDef<TypeInfo>) {
    let meta = def.meta();
    let mut tail = 0usize;
    let mut inner = 0usize;
    count_recursive_calls(&def.body, meta, true, true, &mut tail, &mut inner);

    let eligible = tail > 0 && inner == 0;
    meta.tco.set(eligible);
    if eligible {
        debug!("{} is tail-recursive: converting to loop", meta.mangled);
    }

    // Nested definitions get their own analysis.
    analyze_expression(&def.body);
    for param in &def.params {
        if let Some(default) = &param.default {
            analyze_expression(default);
        }
    }
}

/// Whether a call expression is a direct recursive call to `meta`.
pub fn is_recursive_call(call: &CallExpression<TypeInfo>, meta: &Rc<FuncMeta>) -> bool {
    match &call.resolved {
        Some(Callee::Direct { meta: target, .. }) => Rc::ptr_eq(target, meta),
        _ => false,
    }
}

/// Count direct recursive calls, split by whether they sit in tail position.
fn count_recursive_calls(
    expr: &Expression<TypeInfo>,
    meta: &Rc<FuncMeta>,
    in_tail: bool,
    same_fn: bool,
    tail: &mut usize,
    inner: &mut usize,
) {
    match expr {
        Expression::Parens(e) => count_recursive_calls(e, meta, in_tail, same_fn, tail, inner),
        Expression::Call(call) => {
            if is_recursive_call(call, meta) {
                if in_tail {
                    *tail += 1;
                } else {
                    *inner += 1;
                }
            }
            // Callee and arguments are never tail positions.
            count_recursive_calls(&call.callee, meta, false, same_fn, tail, inner);
            for arg in &call.arguments {
                count_recursive_calls(&arg.value, meta, false, same_fn, tail, inner);
            }
        }
        Expression::If(e) => {
            count_recursive_calls(&e.condition, meta, false, same_fn, tail, inner);
            count_recursive_calls(&e.then_branch, meta, in_tail, same_fn, tail, inner);
            if let Some(else_branch) = &e.else_branch {
                count_recursive_calls(else_branch, meta, in_tail, same_fn, tail, inner);
            }
        }
        Expression::List(e) => {
            for stm in &e.declarations {
                for decl in &stm.declarations {
                    if let Declaration::Single(decl) = decl {
                        count_recursive_calls(&decl.value, meta, false, same_fn, tail, inner);
                    }
                }
            }
            // The terminal item of a let-expression is a tail position.
            if let Some((last, init)) = e.items.split_last() {
                for item in init {
                    count_recursive_calls(item, meta, false, same_fn, tail, inner);
                }
                count_recursive_calls(last, meta, in_tail, same_fn, tail, inner);
            }
        }
        Expression::Content(block) => {
            count_in_content(block, meta, in_tail, same_fn, tail, inner);
        }
        Expression::Unary(e) => count_recursive_calls(&e.operand, meta, false, same_fn, tail, inner),
        Expression::Binary(e) => {
            count_recursive_calls(&e.left, meta, false, same_fn, tail, inner);
            count_recursive_calls(&e.right, meta, false, same_fn, tail, inner);
        }
        Expression::Pipe(e) => {
            count_recursive_calls(&e.left, meta, false, same_fn, tail, inner);
            count_recursive_calls(&e.right, meta, false, same_fn, tail, inner);
        }
        Expression::Member(e) => {
            count_recursive_calls(&e.object, meta, false, same_fn, tail, inner);
            if let MemberField::Expr(field) = &e.field {
                count_recursive_calls(field, meta, false, same_fn, tail, inner);
            }
        }
        Expression::Index(e) => {
            count_recursive_calls(&e.object, meta, false, same_fn, tail, inner);
            count_recursive_calls(&e.index, meta, false, same_fn, tail, inner);
        }
        Expression::Array(e) => {
            for item in &e.items {
                count_recursive_calls(item, meta, false, same_fn, tail, inner);
            }
        }
        Expression::Map(e) => {
            for entry in &e.entries {
                count_recursive_calls(&entry.value, meta, false, same_fn, tail, inner);
            }
        }
        Expression::Element(e) => {
            for entry in &e.attrs {
                count_recursive_calls(&entry.value, meta, false, same_fn, tail, inner);
            }
            for item in &e.content {
                count_recursive_calls(item, meta, false, same_fn, tail, inner);
            }
        }
        Expression::For(e) => {
            for binding in &e.loops {
                count_recursive_calls(&binding.source, meta, false, same_fn, tail, inner);
            }
            count_recursive_calls(&e.body, meta, false, same_fn, tail, inner);
        }
        // Nested functions have their own self; calls to the outer function
        // from inside them are not tail calls of the outer function.
        Expression::FnExpr(def) => {
            count_recursive_calls(&def.body, meta, false, false, tail, inner);
        }
        _ => {}
    }
}

fn count_in_content(
    block: &ContentBlock<TypeInfo>,
    meta: &Rc<FuncMeta>,
    in_tail: bool,
    same_fn: bool,
    tail: &mut usize,
    inner: &mut usize,
) {
    for item in &block.items {
        match item {
            Statement::Return(stm) => {
                // `return expr` puts its operand in tail position whenever
                // the return belongs to the function under analysis.
                if let Some(value) = &stm.value {
                    count_recursive_calls(value, meta, same_fn, same_fn, tail, inner);
                }
            }
            Statement::Expression(expr) => {
                count_recursive_calls(expr, meta, false, same_fn, tail, inner);
            }
            Statement::Let(stm) | Statement::Pub(stm) | Statement::Var(stm) => {
                for decl in &stm.declarations {
                    if let Declaration::Single(decl) = decl {
                        count_recursive_calls(&decl.value, meta, false, same_fn, tail, inner);
                    }
                }
            }
            Statement::Assign(stm) => {
                count_recursive_calls(&stm.value, meta, false, same_fn, tail, inner);
            }
            Statement::If(stm) => count_in_if_statement(stm, meta, in_tail, same_fn, tail, inner),
            Statement::While(stm) => {
                count_recursive_calls(&stm.condition, meta, false, same_fn, tail, inner);
                count_in_content(&stm.body, meta, false, same_fn, tail, inner);
            }
            Statement::For(stm) => {
                count_recursive_calls(&stm.body, meta, false, same_fn, tail, inner);
            }
            _ => {}
        }
    }
}

fn count_in_if_statement(
    stm: &IfStatement<TypeInfo>,
    meta: &Rc<FuncMeta>,
    in_tail: bool,
    same_fn: bool,
    tail: &mut usize,
    inner: &mut usize,
) {
    count_recursive_calls(&stm.condition, meta, false, same_fn, tail, inner);
    count_in_content(&stm.then_branch, meta, in_tail, same_fn, tail, inner);
    match &stm.else_branch {
        Some(ElseBranch::Block(block)) => count_in_content(block, meta, in_tail, same_fn, tail, inner),
        Some(ElseBranch::ElseIf(nested)) => {
            count_in_if_statement(nested, meta, in_tail, same_fn, tail, inner)
        }
        None => {}
    }
}

/// Stack-check gate: every user function gets the entry check unless TCO
/// removed its recursion. System functions never come through here.
pub fn needs_stack_check(meta: &FuncMeta) -> bool {
    !meta.tco.get()
}
