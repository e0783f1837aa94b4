//! Procedural statement emission: procedure bodies, while loops, statement
//! ifs, returns, variable declarations and assignments.

use crate::ast::*;
use crate::codegen::context::non_tail;
use crate::codegen::Transpiler;
use crate::typechecker::TypeInfo;

impl<'a> Transpiler<'a> {
    /// A procedure body or procedural block: every statement runs for
    /// effect, the last value-producing item becomes the region's result.
    pub(crate) fn emit_proc_content(&mut self, block: &ContentBlock<TypeInfo>) {
        let last_value = block
            .items
            .iter()
            .rposition(|item| produces_value(item));

        self.ctx.out("({\n Item result = ITEM_NULL;");
        for (index, item) in block.items.iter().enumerate() {
            let is_last = Some(index) == last_value;
            self.emit_proc_statement(item, is_last);
        }
        self.ctx.out("\n result;})");
    }

    fn emit_proc_statement(&mut self, statement: &Statement<TypeInfo>, is_last: bool) {
        match statement {
            Statement::Let(stm) | Statement::Var(stm) => self.emit_let_local(stm, false),
            // Already hoisted to global scope or compiled at check time.
            Statement::Pub(_)
            | Statement::FuncDef(_)
            | Statement::PatternDef(_)
            | Statement::Import(_) => {}
            Statement::While(stm) => self.emit_while(stm),
            Statement::Break(_) => self.ctx.out("\n break;"),
            Statement::Continue(_) => self.ctx.out("\n continue;"),
            Statement::Return(stm) => self.emit_return(stm),
            Statement::Assign(stm) => self.emit_assign_stam(stm),
            Statement::If(stm) => {
                self.ctx.out("\n ");
                self.emit_if_statement(stm);
            }
            Statement::For(fore) => {
                self.ctx.out("\n ");
                if is_last {
                    self.ctx.out("result = (Item)(");
                    self.emit_for(fore);
                    self.ctx.out(");");
                } else {
                    self.emit_for(fore);
                    self.ctx.outc(';');
                }
            }
            Statement::Expression(expr) => {
                if is_last {
                    self.ctx.out("\n result = ");
                    non_tail!(self, self.emit_box_item(expr));
                    self.ctx.outc(';');
                } else {
                    self.ctx.out("\n ");
                    non_tail!(self, self.emit_expr(expr));
                    self.ctx.outc(';');
                }
            }
        }
    }

    /// Statement `if`: C if/else blocks so break/continue/return stay legal,
    /// with else-if chaining.
    pub(crate) fn emit_if_statement(&mut self, stm: &IfStatement<TypeInfo>) {
        self.ctx.out("if (");
        self.emit_condition(&stm.condition);
        self.ctx.out(") {");
        self.emit_proc_block(&stm.then_branch);
        self.ctx.out("\n}");
        match &stm.else_branch {
            Some(ElseBranch::Block(block)) => {
                self.ctx.out(" else {");
                self.emit_proc_block(block);
                self.ctx.out("\n}");
            }
            Some(ElseBranch::ElseIf(nested)) => {
                self.ctx.out(" else {\n ");
                self.emit_if_statement(nested);
                self.ctx.out("\n}");
            }
            None => {}
        }
    }

    /// Statements of a procedural block body, all for effect.
    fn emit_proc_block(&mut self, block: &ContentBlock<TypeInfo>) {
        for item in &block.items {
            self.emit_proc_statement(item, false);
        }
    }

    pub(crate) fn emit_while(&mut self, stm: &WhileStatement<TypeInfo>) {
        self.ctx.out("\n while (");
        self.emit_condition(&stm.condition);
        self.ctx.out(") {");
        self.emit_proc_block(&stm.body);
        self.ctx.out("\n }");
    }

    pub(crate) fn emit_return(&mut self, stm: &ReturnStatement<TypeInfo>) {
        self.ctx.out("\n return ");
        match &stm.value {
            Some(value) => {
                // The operand of a return is a tail position.
                let saved = self.ctx.in_tail_position;
                self.ctx.in_tail_position = self.ctx.tco_func.is_some();
                self.emit_box_item(value);
                self.ctx.in_tail_position = saved;
            }
            None => self.ctx.out("ITEM_NULL"),
        }
        self.ctx.outc(';');
    }

    pub(crate) fn emit_assign_stam(&mut self, stm: &AssignStatement<TypeInfo>) {
        self.ctx.outf(format_args!("\n _{}=", stm.target));
        non_tail!(self, self.emit_expr(&stm.value));
        self.ctx.outc(';');
    }

    /// Local `let`/`var`: typed slot declarations with initializers.
    pub(crate) fn emit_let_local(&mut self, stm: &LetStatement<TypeInfo>, is_global: bool) {
        for decl in &stm.declarations {
            match decl {
                Declaration::Single(decl) => self.emit_declaration(decl, is_global),
                Declaration::Decompose(decl) => self.emit_decompose(decl, is_global),
            }
        }
    }

    fn emit_declaration(&mut self, decl: &VariableDeclaration<TypeInfo>, is_global: bool) {
        self.ctx.out("\n ");
        if !is_global {
            self.ctx
                .outf(format_args!("{} ", decl.info.type_id().c_type()));
        }
        self.ctx.outf(format_args!("_{}=", decl.name));

        self.ctx.assign_names.push(decl.name.clone());
        non_tail!(self, self.emit_expr(&decl.value));
        self.ctx.assign_names.pop();

        self.ctx.outc(';');
    }

    /// Decomposition binds every name to an Item pulled from the source by
    /// position or attribute name.
    fn emit_decompose(&mut self, decl: &Decomposition<TypeInfo>, is_global: bool) {
        if !is_global {
            for name in &decl.names {
                self.ctx.outf(format_args!("\n Item _{name};"));
            }
        }
        // Nested scope keeps the source temporary from colliding.
        self.ctx.out("\n {Item _dec_src=");
        non_tail!(self, self.emit_box_item(&decl.value));
        self.ctx.outc(';');
        for (position, name) in decl.names.iter().enumerate() {
            if decl.is_named {
                self.ctx.outf(format_args!(
                    "\n _{name}=item_attr(_dec_src,\"{name}\");"
                ));
            } else {
                self.ctx
                    .outf(format_args!("\n _{name}=item_at(_dec_src,{position});"));
            }
        }
        self.ctx.out("}");
    }

    /// Global variable storage declarations, emitted before any function
    /// definitions.
    pub(crate) fn declare_global_var(&mut self, stm: &LetStatement<TypeInfo>) {
        for decl in &stm.declarations {
            match decl {
                Declaration::Single(decl) => {
                    self.ctx.outf(format_args!(
                        "{} _{};\n",
                        decl.info.type_id().c_type(),
                        decl.name
                    ));
                }
                Declaration::Decompose(decl) => {
                    for name in &decl.names {
                        self.ctx.outf(format_args!("Item _{name};\n"));
                    }
                }
            }
        }
    }

    /// Global variable initialization inside the entry function.
    pub(crate) fn assign_global_var(&mut self, stm: &LetStatement<TypeInfo>) {
        for decl in &stm.declarations {
            match decl {
                Declaration::Single(decl) => {
                    self.ctx.outf(format_args!("\n  _{}=", decl.name));
                    self.ctx.assign_names.push(decl.name.clone());
                    non_tail!(self, self.emit_expr(&decl.value));
                    self.ctx.assign_names.pop();
                    self.ctx.outc(';');
                }
                Declaration::Decompose(decl) => self.emit_decompose(decl, true),
            }
        }
    }
}

/// Whether a statement yields a value a procedural region can return.
fn produces_value(statement: &Statement<TypeInfo>) -> bool {
    matches!(statement, Statement::Expression(_) | Statement::For(_))
}
