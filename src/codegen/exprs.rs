//! Per-node expression emission.

use crate::ast::*;
use crate::codegen::boxing::unbox_fn;
use crate::codegen::context::non_tail;
use crate::codegen::Transpiler;
use crate::syntax::Span;
use crate::typechecker::{LambdaError, ShapeError, TypeInfo};
use crate::value::{ConstValue, TypeId};

impl<'a> Transpiler<'a> {
    pub(crate) fn emit_expr(&mut self, expr: &Expression<TypeInfo>) {
        match expr {
            Expression::Literal(lit) => self.emit_literal(lit),
            Expression::Ident(ident) => self.emit_ident(ident),
            Expression::Parens(inner) => self.emit_expr(inner),
            Expression::Unary(unary) => self.emit_unary(unary),
            Expression::Binary(binary) => self.emit_binary(binary),
            Expression::Pipe(pipe) => self.emit_pipe(pipe),
            Expression::CurrentItem(node) => self.emit_current_item(node.span),
            Expression::CurrentIndex(node) => self.emit_current_index(node.span),
            Expression::Member(member) => self.emit_member(member),
            Expression::Index(index) => self.emit_index(index),
            Expression::Path(path) => self.emit_path(path),
            Expression::PathIndex(pix) => self.emit_path_index(pix),
            Expression::Array(array) => self.emit_array(array),
            Expression::List(list) => self.emit_list(list),
            Expression::Content(block) => self.emit_content(block),
            Expression::Map(map) => self.emit_map(map),
            Expression::Element(element) => self.emit_element(element),
            Expression::If(ife) => self.emit_if_expr(ife),
            Expression::For(fore) => self.emit_for(fore),
            Expression::FnExpr(def) => {
                let meta = def.meta().clone();
                self.emit_function_value(&meta, None);
            }
            Expression::Call(call) => self.emit_call(call),
            Expression::TypeLiteral(lit) => self.emit_type_literal(lit),
            Expression::SyntaxError(_) => self.ctx.out("ITEM_ERROR"),
        }
    }

    fn emit_literal(&mut self, lit: &Literal<TypeInfo>) {
        match (&lit.value, lit.info.const_index) {
            (LitValue::Null, _) => self.ctx.out("ITEM_NULL"),
            (LitValue::Bool(true), _) => self.ctx.out("true"),
            (LitValue::Bool(false), _) => self.ctx.out("false"),
            (LitValue::Int(v), _) => self.ctx.outf(format_args!("{v}")),
            // 'L' keeps large literals 64-bit in C.
            (LitValue::Int64(v), _) => self.ctx.outf(format_args!("{v}L")),
            (LitValue::Float(v), _) => {
                self.ctx.outf(format_args!("((double)({v:?}))"));
            }
            (LitValue::Str(_), Some(index))
            | (LitValue::Symbol(_), Some(index))
            | (LitValue::Binary(_), Some(index)) => {
                // Unboxed string position loads the constant directly.
                self.ctx.outf(format_args!("const_s({index})"));
            }
            (LitValue::DateTime(_), Some(index)) => {
                self.ctx.outf(format_args!("const_k({index})"));
            }
            (LitValue::Decimal(_), Some(index)) => {
                self.ctx.outf(format_args!("const_c2it({index})"));
            }
            _ => {
                self.shape_error("literal without interned constant", lit.span);
            }
        }
    }

    pub(crate) fn emit_ident(&mut self, ident: &Ident<TypeInfo>) {
        let type_id = ident.info.type_id();

        // Captured variables read from the closure environment, unboxed to
        // the use-site type where one exists; container values cast back to
        // their pointer shape so native accessors stay well-typed.
        if let Some(closure) = self.ctx.current_closure.clone() {
            if let Some(cap) = closure.find_capture(&ident.name) {
                match unbox_fn(type_id) {
                    Some(unbox) => {
                        self.ctx.outf(format_args!("{unbox}(_env->{})", cap.name));
                    }
                    None if type_id.is_container() => {
                        self.ctx
                            .outf(format_args!("({})_env->{}", type_id.c_type(), cap.name));
                    }
                    None => self.ctx.outf(format_args!("_env->{}", cap.name)),
                }
                return;
            }
        }

        match &ident.target {
            Some(Binding::Param {
                name, is_optional, ..
            }) => {
                // Item-slot parameters unbox at use sites, with the same
                // pointer cast for container types.
                let is_item = *is_optional || self.ctx.current_closure.is_some();
                if is_item {
                    match unbox_fn(type_id) {
                        Some(unbox) => self.ctx.outf(format_args!("{unbox}(_{name})")),
                        None if type_id.is_container() => {
                            self.ctx
                                .outf(format_args!("({})_{name}", type_id.c_type()));
                        }
                        None => self.ctx.outf(format_args!("_{name}")),
                    }
                } else {
                    self.ctx.outf(format_args!("_{name}"));
                }
            }
            Some(Binding::Func { meta, module }) => {
                let meta = meta.clone();
                self.emit_function_value(&meta, *module);
            }
            Some(Binding::Pattern { index, .. }) => {
                self.ctx.outf(format_args!("const_pattern({index})"));
            }
            Some(Binding::Local { name, module, .. }) => {
                if let Some(module) = module {
                    self.ctx.outf(format_args!("m{module}."));
                }
                self.ctx.outf(format_args!("_{name}"));
            }
            Some(Binding::System(_)) => {
                // A bare system-function reference has no first-class value.
                self.shape_error("system function used as a value", ident.span);
                self.ctx.out("ITEM_ERROR");
            }
            None => {
                self.shape_error("undefined identifier", ident.span);
                self.ctx.out("ITEM_ERROR");
            }
        }
    }

    fn emit_unary(&mut self, unary: &UnaryExpression<TypeInfo>) {
        let operand_id = unary.operand.info().type_id();
        match unary.op {
            UnaryOperator::Not => {
                if operand_id == TypeId::Bool {
                    self.ctx.out("!(");
                    non_tail!(self, self.emit_expr(&unary.operand));
                    self.ctx.outc(')');
                } else {
                    self.ctx.out("fn_not(");
                    non_tail!(self, self.emit_box_item(&unary.operand));
                    self.ctx.outc(')');
                }
            }
            UnaryOperator::Pos => {
                if operand_id.is_numeric() {
                    self.ctx.outc('(');
                    non_tail!(self, self.emit_expr(&unary.operand));
                    self.ctx.outc(')');
                } else {
                    self.ctx.out("fn_pos(");
                    non_tail!(self, self.emit_box_item(&unary.operand));
                    self.ctx.outc(')');
                }
            }
            UnaryOperator::Neg => {
                if operand_id.is_numeric() {
                    // Double brackets keep '-' from joining into '--'.
                    self.ctx.out("(-(");
                    non_tail!(self, self.emit_expr(&unary.operand));
                    self.ctx.out("))");
                } else {
                    self.ctx.out("fn_neg(");
                    non_tail!(self, self.emit_box_item(&unary.operand));
                    self.ctx.outc(')');
                }
            }
        }
    }

    fn emit_binary(&mut self, binary: &BinaryExpression<TypeInfo>) {
        use BinaryOperator::*;

        let left_id = binary.left.info().type_id();
        let right_id = binary.right.info().type_id();
        let both_numeric = left_id.is_numeric() && right_id.is_numeric();
        let both_bool = left_id == TypeId::Bool && right_id == TypeId::Bool;

        match binary.op {
            And | Or => {
                if both_bool {
                    self.ctx
                        .out(if binary.op == And { "op_and(" } else { "op_or(" });
                    non_tail!(self, self.emit_expr(&binary.left));
                    self.ctx.outc(',');
                    non_tail!(self, self.emit_expr(&binary.right));
                    self.ctx.outc(')');
                } else {
                    self.ctx
                        .out(if binary.op == And { "fn_and(" } else { "fn_or(" });
                    self.emit_boxed_pair(binary);
                }
            }
            Add | Sub | Mul => {
                if both_numeric {
                    let op = match binary.op {
                        Add => '+',
                        Sub => '-',
                        _ => '*',
                    };
                    self.ctx.outc('(');
                    non_tail!(self, self.emit_expr(&binary.left));
                    self.ctx.outc(op);
                    non_tail!(self, self.emit_expr(&binary.right));
                    self.ctx.outc(')');
                } else {
                    let call = match binary.op {
                        Add => "fn_add(",
                        Sub => "fn_sub(",
                        _ => "fn_mul(",
                    };
                    self.ctx.out(call);
                    self.emit_boxed_pair(binary);
                }
            }
            Div => {
                if both_numeric {
                    self.ctx.out("((double)(");
                    non_tail!(self, self.emit_expr(&binary.left));
                    self.ctx.out(")/(double)(");
                    non_tail!(self, self.emit_expr(&binary.right));
                    self.ctx.out("))");
                } else {
                    self.ctx.out("fn_div(");
                    self.emit_boxed_pair(binary);
                }
            }
            // Always routed to the runtime so division-by-zero reporting is
            // centralized.
            IntDiv => {
                self.ctx.out("fn_idiv(");
                self.emit_boxed_pair(binary);
            }
            Mod => {
                self.ctx.out("fn_mod(");
                self.emit_boxed_pair(binary);
            }
            Pow => {
                self.ctx.out("fn_pow(");
                self.emit_boxed_pair(binary);
            }
            // The tagged-error encoding leaves no safe fast path for
            // comparisons.
            Eq => {
                self.ctx.out("fn_eq(");
                self.emit_boxed_pair(binary);
            }
            Ne => {
                self.ctx.out("fn_ne(");
                self.emit_boxed_pair(binary);
            }
            Lt => {
                self.ctx.out("fn_lt(");
                self.emit_boxed_pair(binary);
            }
            Le => {
                self.ctx.out("fn_le(");
                self.emit_boxed_pair(binary);
            }
            Gt => {
                self.ctx.out("fn_gt(");
                self.emit_boxed_pair(binary);
            }
            Ge => {
                self.ctx.out("fn_ge(");
                self.emit_boxed_pair(binary);
            }
            Is => {
                self.ctx.out("fn_is(");
                self.emit_boxed_pair(binary);
            }
            In => {
                self.ctx.out("fn_in(");
                self.emit_boxed_pair(binary);
            }
            To => {
                self.ctx.out("fn_to(");
                self.emit_boxed_pair(binary);
            }
            Join => {
                self.ctx.out("fn_join(");
                self.emit_boxed_pair(binary);
            }
            Union | Intersect => match binary.info.type_index {
                Some(index) => self.ctx.outf(format_args!("const_type({index})")),
                None => {
                    self.shape_error("type operator outside type context", binary.span);
                    self.ctx.out("ITEM_ERROR");
                }
            },
        }
    }

    fn emit_boxed_pair(&mut self, binary: &BinaryExpression<TypeInfo>) {
        non_tail!(self, self.emit_box_item(&binary.left));
        self.ctx.outc(',');
        non_tail!(self, self.emit_box_item(&binary.right));
        self.ctx.outc(')');
    }

    /// Expression `if`: ternary lowering. Branches box when their types
    /// disagree; tail position propagates into both branches.
    fn emit_if_expr(&mut self, ife: &IfExpression<TypeInfo>) {
        self.ctx.outc('(');
        self.emit_condition(&ife.condition);
        self.ctx.out(" ? ");

        let then_id = ife.then_branch.info().type_id();
        let else_id = ife
            .else_branch
            .as_ref()
            .map(|e| e.info().type_id())
            .unwrap_or(TypeId::Null);
        let need_boxing = then_id != else_id || then_id == TypeId::Any;

        if need_boxing {
            self.emit_box_item(&ife.then_branch);
            self.ctx.out(" : ");
            match &ife.else_branch {
                Some(else_branch) => self.emit_box_item(else_branch),
                None => self.ctx.out("ITEM_NULL"),
            }
        } else {
            self.emit_expr(&ife.then_branch);
            self.ctx.out(" : ");
            match &ife.else_branch {
                Some(else_branch) => self.emit_expr(else_branch),
                None => self.ctx.out("ITEM_NULL"),
            }
        }
        self.ctx.outc(')');
    }

    /// A boolean C condition: direct for BOOL, `is_truthy` otherwise.
    pub(crate) fn emit_condition(&mut self, condition: &Expression<TypeInfo>) {
        if condition.info().type_id() == TypeId::Bool {
            non_tail!(self, self.emit_expr(condition));
        } else {
            self.ctx.out("is_truthy(");
            non_tail!(self, self.emit_box_item(condition));
            self.ctx.outc(')');
        }
    }

    fn emit_member(&mut self, member: &MemberExpression<TypeInfo>) {
        let object_id = member.object.info().type_id();
        match object_id {
            TypeId::Map => self.ctx.out("map_get("),
            TypeId::Element => self.ctx.out("elmt_get("),
            _ => self.ctx.out("fn_member("),
        }
        non_tail!(self, self.emit_expr(&member.object));
        self.ctx.outc(',');
        match &member.field {
            MemberField::Name(name, span) => {
                match self.script.consts.find(&ConstValue::String(name.clone())) {
                    Some(index) => self.ctx.outf(format_args!("const_s2it({index})")),
                    None => {
                        self.shape_error("member name missing from constants", *span);
                        self.ctx.out("ITEM_ERROR");
                    }
                }
            }
            MemberField::Expr(field) => non_tail!(self, self.emit_box_item(field)),
        }
        self.ctx.outc(')');
    }

    fn emit_index(&mut self, index: &IndexExpression<TypeInfo>) {
        let object_id = index.object.info().type_id();
        let key_id = index.index.info().type_id();

        // Non-numeric indices always take the polymorphic path.
        if !key_id.is_numeric() {
            self.ctx.out("fn_index(");
            non_tail!(self, self.emit_box_item(&index.object));
            self.ctx.outc(',');
            non_tail!(self, self.emit_box_item(&index.index));
            self.ctx.outc(')');
            return;
        }

        let accessor = match object_id {
            TypeId::ArrayInt => Some("array_int_get("),
            TypeId::ArrayInt64 => Some("array_int64_get("),
            TypeId::ArrayFloat => Some("array_float_get("),
            TypeId::Array => Some("array_get("),
            TypeId::List => Some("list_get("),
            _ => None,
        };

        match accessor {
            Some(accessor) => {
                self.ctx.out(accessor);
                non_tail!(self, self.emit_expr(&index.object));
                self.ctx.outc(',');
                non_tail!(self, self.emit_expr(&index.index));
                self.ctx.outc(')');
            }
            None => {
                self.ctx.out("fn_index(");
                non_tail!(self, self.emit_box_item(&index.object));
                self.ctx.outc(',');
                non_tail!(self, self.emit_box_item(&index.index));
                self.ctx.outc(')');
            }
        }
    }

    fn emit_path(&mut self, path: &PathExpression<TypeInfo>) {
        match path.info.const_index {
            Some(index) => self.ctx.outf(format_args!("fn_path(const_s2it({index}))")),
            None => {
                self.shape_error("path without interned text", path.span);
                self.ctx.out("ITEM_ERROR");
            }
        }
    }

    fn emit_path_index(&mut self, pix: &PathIndexExpression<TypeInfo>) {
        self.ctx.out("fn_path_index(");
        non_tail!(self, self.emit_box_item(&pix.base));
        self.ctx.outc(',');
        non_tail!(self, self.emit_box_item(&pix.segment));
        self.ctx.outc(')');
    }

    fn emit_current_item(&mut self, span: Span) {
        if self.ctx.pipe_depth == 0 {
            self.shape_error("'~' outside a pipe", span);
            self.ctx.out("ITEM_ERROR");
        } else {
            let name = self.ctx.pipe_item_name();
            self.ctx.out(&name);
        }
    }

    fn emit_current_index(&mut self, span: Span) {
        if self.ctx.pipe_depth == 0 {
            self.shape_error("'~#' outside a pipe", span);
            self.ctx.out("ITEM_ERROR");
        } else {
            let name = self.ctx.pipe_index_name();
            self.ctx.out(&name);
        }
    }

    /// Pipe lowering. Aggregate pipes pass the whole left value as the
    /// first argument; `~`/`~#` pipes and `where` iterate inline.
    fn emit_pipe(&mut self, pipe: &PipeExpression<TypeInfo>) {
        let auto_map = crate::typechecker::has_current_ref(&pipe.right);
        if !auto_map && pipe.op == PipeOperator::Pipe {
            // A bare built-in on the right takes the left value directly.
            if let Expression::Ident(ident) = pipe.right.unwrap_parens() {
                if let Some(Binding::System(info)) = &ident.target {
                    let symbol = info.runtime_symbol(1);
                    self.ctx.out(&symbol);
                    self.ctx.outc('(');
                    non_tail!(self, self.emit_box_item(&pipe.left));
                    self.ctx.outc(')');
                    return;
                }
            }
            self.ctx.out("fn_pipe_call(");
            non_tail!(self, self.emit_box_item(&pipe.left));
            self.ctx.out(", ");
            non_tail!(self, self.emit_box_item(&pipe.right));
            self.ctx.outc(')');
            return;
        }

        self.ctx.pipe_depth += 1;
        let item = self.ctx.pipe_item_name();
        let index = self.ctx.pipe_index_name();
        let result = if self.ctx.pipe_depth <= 1 {
            "_pipe_result".to_string()
        } else {
            format!("_pipe_result{}", self.ctx.pipe_depth)
        };
        let collection = if self.ctx.pipe_depth <= 1 {
            "_pipe_collection".to_string()
        } else {
            format!("_pipe_collection{}", self.ctx.pipe_depth)
        };

        self.ctx.out("({\n");
        self.ctx.outf(format_args!("  Item {collection} = "));
        {
            // The left side sits outside the pipe's bindings.
            self.ctx.pipe_depth -= 1;
            non_tail!(self, self.emit_box_item(&pipe.left));
            self.ctx.pipe_depth += 1;
        }
        self.ctx.out(";\n");
        self.ctx.outf(format_args!(
            "  TypeId _pipe_type = item_type_id({collection});\n"
        ));
        self.ctx.outf(format_args!("  Array* {result} = array();\n"));

        self.ctx.out(
            "  if (_pipe_type == LMD_TYPE_ARRAY || _pipe_type == LMD_TYPE_LIST || \
             _pipe_type == LMD_TYPE_RANGE || _pipe_type == LMD_TYPE_MAP || \
             _pipe_type == LMD_TYPE_ARRAY_INT || _pipe_type == LMD_TYPE_ARRAY_INT64 || \
             _pipe_type == LMD_TYPE_ARRAY_FLOAT || _pipe_type == LMD_TYPE_ELEMENT) {\n",
        );

        // Maps iterate key-value pairs; the key binds the current index.
        self.ctx.out("    if (_pipe_type == LMD_TYPE_MAP) {\n");
        self.ctx
            .outf(format_args!("      ArrayList* _pipe_keys = item_keys({collection});\n"));
        self.ctx.out("      if (_pipe_keys) {\n");
        self.ctx.out(
            "        for (int64_t _pipe_i = 0; _pipe_i < _pipe_keys->length; _pipe_i++) {\n",
        );
        self.ctx
            .out("          String* _key_str = (String*)_pipe_keys->data[_pipe_i];\n");
        self.ctx
            .outf(format_args!("          Item {index} = s2it(_key_str);\n"));
        self.ctx.outf(format_args!(
            "          Item {item} = item_attr({collection}, _key_str->chars);\n"
        ));
        self.emit_pipe_step(pipe, &result, &item, "          ");
        self.ctx.out("        }\n");
        self.ctx.out("      }\n");
        self.ctx.out("    } else {\n");

        // Arrays, lists and ranges iterate with a numeric index.
        self.ctx
            .outf(format_args!("      int64_t _pipe_len = fn_len({collection});\n"));
        self.ctx
            .out("      for (int64_t _pipe_i = 0; _pipe_i < _pipe_len; _pipe_i++) {\n");
        self.ctx
            .outf(format_args!("        Item {index} = i2it(_pipe_i);\n"));
        self.ctx.outf(format_args!(
            "        Item {item} = item_at({collection}, (int)_pipe_i);\n"
        ));
        self.emit_pipe_step(pipe, &result, &item, "        ");
        self.ctx.out("      }\n");
        self.ctx.out("    }\n");
        self.ctx.out("  } else {\n");

        // Scalars apply the right side once.
        self.ctx
            .outf(format_args!("    Item {item} = {collection};\n"));
        self.ctx.outf(format_args!("    Item {index} = ITEM_NULL;\n"));
        self.emit_pipe_step(pipe, &result, &item, "    ");
        self.ctx.out("  }\n");
        self.ctx.outf(format_args!("  array_end({result});\n"));
        self.ctx.out("})");
        self.ctx.pipe_depth -= 1;
    }

    fn emit_pipe_step(
        &mut self,
        pipe: &PipeExpression<TypeInfo>,
        result: &str,
        item: &str,
        indent: &str,
    ) {
        match pipe.op {
            PipeOperator::Where => {
                self.ctx.outf(format_args!("{indent}if (is_truthy("));
                non_tail!(self, self.emit_box_item(&pipe.right));
                self.ctx.out(")) {\n");
                self.ctx
                    .outf(format_args!("{indent}  array_push({result}, {item});\n"));
                self.ctx.outf(format_args!("{indent}}}\n"));
            }
            PipeOperator::Pipe => {
                self.ctx.outf(format_args!("{indent}array_push({result}, "));
                non_tail!(self, self.emit_box_item(&pipe.right));
                self.ctx.out(");\n");
            }
        }
    }

    fn emit_type_literal(&mut self, lit: &TypeLiteral<TypeInfo>) {
        match lit.info.type_index {
            Some(index) => self.ctx.outf(format_args!("const_type({index})")),
            None => self
                .ctx
                .outf(format_args!("base_type({})", lit.ty.type_id() as u8)),
        }
    }

    pub(crate) fn shape_error(&mut self, what: &str, span: Span) {
        self.ctx.error(LambdaError::Shape(
            ShapeError { what: what.into() },
            span,
        ));
    }
}
