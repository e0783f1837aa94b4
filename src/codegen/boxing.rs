//! The boxing bridge: wrapping typed expressions into Items and back.
//!
//! Every position that needs an Item goes through [`Transpiler::emit_box_item`];
//! it picks the immediate constructor, the constant-table accessor for
//! literals, or a pointer cast for containers. Captured variables and
//! Item-slot parameters short-circuit: they are already Items at runtime.

use crate::ast::{Binding, Expression};
use crate::codegen::context::non_tail;
use crate::codegen::Transpiler;
use crate::typechecker::{Capture, TypeInfo};
use crate::value::TypeId;

/// Unboxing helper for a primitive runtime type, if one exists.
pub(crate) fn unbox_fn(type_id: TypeId) -> Option<&'static str> {
    match type_id {
        TypeId::Int => Some("it2i"),
        TypeId::Int64 => Some("it2l"),
        TypeId::Float => Some("it2f"),
        TypeId::Bool => Some("it2b"),
        TypeId::String | TypeId::Symbol | TypeId::Binary => Some("it2s"),
        TypeId::Decimal => Some("it2d"),
        _ => None,
    }
}

impl<'a> Transpiler<'a> {
    /// A reference to a variable captured by the closure currently being
    /// emitted, unwrapped through parentheses.
    pub(crate) fn captured_ref(&self, expr: &Expression<TypeInfo>) -> Option<Capture> {
        let closure = self.ctx.current_closure.as_ref()?;
        match expr.unwrap_parens() {
            Expression::Ident(ident) => closure.find_capture(&ident.name),
            _ => None,
        }
    }

    /// A reference to a parameter stored as an Item slot: any parameter of
    /// the closure being emitted, or an optional parameter anywhere.
    pub(crate) fn item_param_ref(&self, expr: &Expression<TypeInfo>) -> Option<String> {
        match expr.unwrap_parens() {
            Expression::Ident(ident) => match &ident.target {
                Some(Binding::Param { name, is_optional, .. })
                    if *is_optional || self.ctx.current_closure.is_some() =>
                {
                    Some(name.clone())
                }
                _ => None,
            },
            _ => None,
        }
    }

    /// Emit `expr` as an Item.
    pub(crate) fn emit_box_item(&mut self, expr: &Expression<TypeInfo>) {
        let info = expr.info().clone();
        let type_id = info.type_id();

        // Already-Item storage needs no bridge.
        if matches!(
            type_id,
            TypeId::Bool
                | TypeId::Int
                | TypeId::Int64
                | TypeId::Float
                | TypeId::String
                | TypeId::Symbol
                | TypeId::Binary
                | TypeId::Decimal
                | TypeId::DateTime
        ) {
            if let Some(name) = self.item_param_ref(expr) {
                self.ctx.outc('_');
                self.ctx.out(&name);
                return;
            }
            if let Some(cap) = self.captured_ref(expr) {
                self.ctx.out("_env->");
                self.ctx.out(&cap.name);
                return;
            }
        }

        match type_id {
            TypeId::Null => {
                if info.is_literal {
                    self.ctx.out("ITEM_NULL");
                } else {
                    // Evaluate for effect, yield null (procedural results).
                    self.ctx.outc('(');
                    non_tail!(self, self.emit_expr(expr));
                    self.ctx.out(",ITEM_NULL)");
                }
            }
            TypeId::Bool => {
                self.ctx.out("b2it(");
                non_tail!(self, self.emit_expr(expr));
                self.ctx.outc(')');
            }
            TypeId::Int => {
                self.ctx.out("i2it(");
                non_tail!(self, self.emit_expr(expr));
                self.ctx.outc(')');
            }
            TypeId::Int64 => match info.const_index {
                Some(index) if info.is_literal => {
                    self.ctx.outf(format_args!("const_l2it({index})"));
                }
                _ => {
                    self.ctx.out("push_l(");
                    non_tail!(self, self.emit_expr(expr));
                    self.ctx.outc(')');
                }
            },
            TypeId::Float => match info.const_index {
                Some(index) if info.is_literal => {
                    self.ctx.outf(format_args!("const_d2it({index})"));
                }
                _ => {
                    self.ctx.out("push_d(");
                    non_tail!(self, self.emit_expr(expr));
                    self.ctx.outc(')');
                }
            },
            TypeId::DateTime => match info.const_index {
                Some(index) if info.is_literal => {
                    self.ctx.outf(format_args!("const_k2it({index})"));
                }
                _ => {
                    self.ctx.out("push_k(");
                    non_tail!(self, self.emit_expr(expr));
                    self.ctx.outc(')');
                }
            },
            TypeId::Decimal => match info.const_index {
                Some(index) if info.is_literal => {
                    self.ctx.outf(format_args!("const_c2it({index})"));
                }
                _ => {
                    self.ctx.out("c2it(");
                    non_tail!(self, self.emit_expr(expr));
                    self.ctx.outc(')');
                }
            },
            TypeId::String | TypeId::Symbol | TypeId::Binary => {
                let tag = match type_id {
                    TypeId::Symbol => 'y',
                    TypeId::Binary => 'x',
                    _ => 's',
                };
                match info.const_index {
                    Some(index) if info.is_literal => {
                        self.ctx.outf(format_args!("const_{tag}2it({index})"));
                    }
                    _ => {
                        self.ctx.outf(format_args!("{tag}2it("));
                        non_tail!(self, self.emit_expr(expr));
                        self.ctx.outc(')');
                    }
                }
            }
            // list_end() already yields an Item.
            TypeId::List => non_tail!(self, self.emit_expr(expr)),
            TypeId::Range
            | TypeId::Array
            | TypeId::ArrayInt
            | TypeId::ArrayInt64
            | TypeId::ArrayFloat
            | TypeId::Map
            | TypeId::Element
            | TypeId::Type
            | TypeId::Func
            | TypeId::Pattern => {
                self.ctx.out("(Item)(");
                non_tail!(self, self.emit_expr(expr));
                self.ctx.outc(')');
            }
            // NUMBER results and ANY/ERROR values are already Items.
            TypeId::Number | TypeId::Any | TypeId::Error => self.emit_expr(expr),
        }
    }

    /// Emit the storage expression for a captured variable while populating
    /// a closure environment.
    pub(crate) fn emit_box_capture(&mut self, cap: &Capture, from_outer_env: bool) {
        if from_outer_env {
            // Already boxed in the enclosing environment; copy the slot.
            self.ctx.out("_env->");
            self.ctx.out(&cap.name);
            return;
        }
        let call = match cap.ty.type_id() {
            TypeId::Int => "i2it(_",
            TypeId::Int64 => "l2it(&_",
            TypeId::Float => "d2it(&_",
            TypeId::Bool => "b2it(_",
            TypeId::String => "s2it(_",
            TypeId::Symbol => "y2it(_",
            TypeId::Binary => "x2it(_",
            TypeId::Decimal => "c2it(_",
            TypeId::DateTime => "k2it(&_",
            _ => {
                // Containers and Items store as-is.
                self.ctx.out("(Item)(_");
                self.ctx.out(&cap.name);
                self.ctx.outc(')');
                return;
            }
        };
        self.ctx.out(call);
        self.ctx.out(&cap.name);
        self.ctx.outc(')');
    }
}
