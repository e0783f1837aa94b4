//! Constructor emission: arrays, lists, content regions, maps, elements,
//! and the for-expression loop that feeds a spreadable array.

use crate::ast::*;
use crate::codegen::context::non_tail;
use crate::codegen::Transpiler;
use crate::typechecker::TypeInfo;
use crate::value::{ConstValue, TypeId};

/// Whether any item needs spreading (for-expressions flatten into their
/// enclosing collection).
fn has_spreadable_item(items: &[Expression<TypeInfo>]) -> bool {
    items
        .iter()
        .any(|item| matches!(item.unwrap_parens(), Expression::For(_)))
}

impl<'a> Transpiler<'a> {
    fn emit_boxed_items(&mut self, items: &[Expression<TypeInfo>]) {
        let mut first = true;
        for item in items {
            if first {
                first = false;
            } else {
                self.ctx.out(", ");
            }
            non_tail!(self, self.emit_box_item(item));
        }
    }

    pub(crate) fn emit_array(&mut self, array: &ArrayLiteral<TypeInfo>) {
        let type_id = array.info.type_id();
        let specialized = matches!(
            type_id,
            TypeId::ArrayInt | TypeId::ArrayInt64 | TypeId::ArrayFloat
        );

        // Spreadable items force the push path.
        if !specialized && has_spreadable_item(&array.items) {
            self.ctx.out("({\n Array* arr = array();\n");
            for item in &array.items {
                self.ctx.out(" array_push_spread(arr, ");
                non_tail!(self, self.emit_box_item(item));
                self.ctx.out(");\n");
            }
            self.ctx.out(" (Item)arr; })");
            return;
        }

        let (ctor, fill) = match type_id {
            TypeId::ArrayInt => ("array_int()", "array_int_fill(arr,"),
            TypeId::ArrayInt64 => ("array_int64()", "array_int64_fill(arr,"),
            TypeId::ArrayFloat => ("array_float()", "array_float_fill(arr,"),
            _ => ("array()", "array_fill(arr,"),
        };
        self.ctx.outf(format_args!(
            "({{{} arr = {ctor}; {fill}",
            match type_id {
                TypeId::ArrayInt => "ArrayInt*",
                TypeId::ArrayInt64 => "ArrayInt64*",
                TypeId::ArrayFloat => "ArrayFloat*",
                _ => "Array*",
            }
        ));
        self.ctx.outf(format_args!("{}", array.items.len()));
        if !array.items.is_empty() {
            self.ctx.outc(',');
        }
        if specialized {
            // Specialized arrays fill with unboxed values.
            let mut first = true;
            for item in &array.items {
                if first {
                    first = false;
                } else {
                    self.ctx.outc(',');
                }
                non_tail!(self, self.emit_expr(item));
            }
        } else {
            self.emit_boxed_items(&array.items);
        }
        self.ctx.out("); })");
    }

    pub(crate) fn emit_list(&mut self, list: &ListLiteral<TypeInfo>) {
        // The list allocates before its declarations so it contains them.
        self.ctx.out("({\n List* ls = list();\n");
        for stm in &list.declarations {
            self.emit_let_local(stm, false);
            self.ctx.out("\n");
        }
        if list.items.is_empty() {
            self.ctx.out(" list_end(ls);})");
            return;
        }
        if list.items.len() < 10 && !has_spreadable_item(&list.items) {
            self.ctx
                .outf(format_args!("\n list_fill(ls,{},", list.items.len()));
            self.emit_boxed_items(&list.items);
            self.ctx.out(");})");
        } else {
            self.emit_push_items(&list.items, false);
        }
    }

    pub(crate) fn emit_push_items(&mut self, items: &[Expression<TypeInfo>], is_elmt: bool) {
        let target = if is_elmt { "el" } else { "ls" };
        for item in items {
            self.ctx
                .outf(format_args!("\n list_push_spread({target}, "));
            non_tail!(self, self.emit_box_item(item));
            self.ctx.out(");");
        }
        self.ctx.outf(format_args!("\n list_end({target});}})"));
    }

    /// Content region in expression position: declarations first, then the
    /// remaining items pushed into a list.
    pub(crate) fn emit_content(&mut self, block: &ContentBlock<TypeInfo>) {
        self.ctx.out("({\n List* ls = list();");

        let mut items = Vec::new();
        for statement in &block.items {
            match statement {
                Statement::Let(stm) | Statement::Var(stm) => {
                    self.emit_let_local(stm, false);
                }
                Statement::Pub(_)
                | Statement::FuncDef(_)
                | Statement::PatternDef(_)
                | Statement::Import(_) => {}
                Statement::Expression(expr) => items.push(expr),
                other => {
                    self.shape_error("procedural statement in content region", other.span());
                }
            }
        }

        if items.is_empty() {
            self.ctx.out("list_end(ls);})");
            return;
        }
        for item in items {
            self.ctx.out("\n list_push_spread(ls, ");
            non_tail!(self, self.emit_box_item(item));
            self.ctx.out(");");
        }
        self.ctx.out("\n list_end(ls);})");
    }

    pub(crate) fn emit_map(&mut self, map: &MapLiteral<TypeInfo>) {
        let type_index = map.info.type_index.unwrap_or(0);
        self.ctx.outf(format_args!("({{Map* m = map({type_index});"));
        if map.entries.is_empty() {
            self.ctx.out("m;})");
            return;
        }
        self.ctx.out("\n map_fill(m,");
        let mut first = true;
        for entry in &map.entries {
            if first {
                first = false;
            } else {
                self.ctx.outc(',');
            }
            self.emit_map_key(&entry.key);
            self.ctx.outc(',');
            non_tail!(self, self.emit_box_item(&entry.value));
        }
        self.ctx.out(");})");
    }

    fn emit_map_key(&mut self, key: &MapKey<TypeInfo>) {
        match key {
            MapKey::Name(name) => {
                match self.script.consts.find(&ConstValue::String(name.clone())) {
                    Some(index) => self.ctx.outf(format_args!("const_s2it({index})")),
                    None => self.ctx.out("ITEM_ERROR"),
                }
            }
            MapKey::Expr(expr) => non_tail!(self, self.emit_box_item(expr)),
        }
    }

    pub(crate) fn emit_element(&mut self, element: &ElementLiteral<TypeInfo>) {
        let type_index = element.info.type_index.unwrap_or(0);
        self.ctx
            .outf(format_args!("\n({{Element* el=elmt({type_index});"));

        if !element.attrs.is_empty() {
            self.ctx.out("\n elmt_fill(el,");
            let mut first = true;
            for entry in &element.attrs {
                if first {
                    first = false;
                } else {
                    self.ctx.outc(',');
                }
                self.emit_map_key(&entry.key);
                self.ctx.outc(',');
                non_tail!(self, self.emit_box_item(&entry.value));
            }
            self.ctx.out(");");
        }

        if !element.content.is_empty() {
            if element.content.len() < 10 && !has_spreadable_item(&element.content) {
                self.ctx
                    .outf(format_args!("\n list_fill(el,{},", element.content.len()));
                self.emit_boxed_items(&element.content);
                self.ctx.out(");})");
            } else {
                self.emit_push_items(&element.content, true);
            }
        } else if !element.attrs.is_empty() {
            self.ctx.out(" list_end(el);})");
        } else {
            self.ctx.out(" el;})");
        }
    }

    /// For-expression: a generated loop pushing each produced value into a
    /// spreadable array, with clauses applied in order: `let` and `where`
    /// inline in the loop, `group`/`order`/`limit`/`offset` as transforms
    /// over the collected array.
    pub(crate) fn emit_for(&mut self, fore: &ForExpression<TypeInfo>) {
        self.ctx.out("({\n Array* arr_out=array_spreadable(); \n");
        if !fore.loops.is_empty() {
            self.emit_loop_level(fore, 0);
        }

        let has_order = !fore.order.is_empty();
        let has_group = fore.group.is_some();
        if has_group && has_order {
            self.shape_error("order by combined with group by", fore.span);
        }
        if has_order && !has_group {
            let dirs: String = fore
                .order
                .iter()
                .map(|spec| if spec.descending { 'd' } else { 'a' })
                .collect();
            self.ctx.outf(format_args!(
                " arr_out=fn_order(arr_out,{},\"{dirs}\");\n",
                fore.order.len()
            ));
        }
        if fore.limit.is_some() || fore.offset.is_some() {
            self.ctx.out(" arr_out=fn_slice(arr_out,");
            match &fore.offset {
                Some(offset) => non_tail!(self, self.emit_box_item(offset)),
                None => self.ctx.out("ITEM_NULL"),
            }
            self.ctx.outc(',');
            match &fore.limit {
                Some(limit) => non_tail!(self, self.emit_box_item(limit)),
                None => self.ctx.out("ITEM_NULL"),
            }
            self.ctx.out(");\n");
        }
        if let Some(group) = &fore.group {
            self.ctx
                .outf(format_args!(" fn_group(arr_out,{});}})", group.keys.len()));
        } else {
            self.ctx.out(" array_end(arr_out);})");
        }
    }

    /// One nesting level of the generated loop; the innermost level emits
    /// the let bindings, the where guard and the pushes.
    fn emit_loop_level(&mut self, fore: &ForExpression<TypeInfo>, level: usize) {
        let binding = &fore.loops[level];
        let source_id = binding.source.info().type_id();
        let item_id = binding.info.type_id();

        if binding.is_named {
            // `at` iteration walks attribute keys.
            self.ctx.out(" Item it=");
            non_tail!(self, self.emit_box_item(&binding.source));
            self.ctx.out(";\n ArrayList* _attr_keys=item_keys(it);\n");
            self.ctx
                .out(" for (int _ki=0; _attr_keys && _ki<_attr_keys->length; _ki++) {\n");
            if let Some(index_name) = &binding.index_name {
                // Two-variable form: key and value.
                self.ctx.outf(format_args!(
                    "  String* _{index_name}=_attr_keys->data[_ki];\n"
                ));
                self.ctx.outf(format_args!(
                    "  Item _{}=item_attr(it, _{index_name}->chars);\n",
                    binding.name
                ));
            } else {
                // Single-variable form binds the key name.
                self.ctx.outf(format_args!(
                    "  String* _{}=_attr_keys->data[_ki];\n",
                    binding.name
                ));
            }
        } else {
            self.ctx.out(match source_id {
                TypeId::Range => " Range *rng=",
                TypeId::ArrayInt => " ArrayInt *arr=",
                TypeId::ArrayInt64 => " ArrayInt64 *arr=",
                TypeId::ArrayFloat => " ArrayFloat *arr=",
                TypeId::Array => " Array *arr=",
                _ => " Item it=",
            });
            match source_id {
                TypeId::Range
                | TypeId::ArrayInt
                | TypeId::ArrayInt64
                | TypeId::ArrayFloat
                | TypeId::Array => non_tail!(self, self.emit_expr(&binding.source)),
                _ => non_tail!(self, self.emit_box_item(&binding.source)),
            }

            self.ctx.out(match source_id {
                TypeId::Range => {
                    ";\n if (!rng) { array_push(arr_out, ITEM_ERROR); } else { \
                     for (long _idx=rng->start; _idx<=rng->end; _idx++) {\n "
                }
                TypeId::ArrayInt | TypeId::ArrayInt64 | TypeId::ArrayFloat | TypeId::Array => {
                    ";\n if (!arr) { array_push(arr_out, ITEM_ERROR); } else { \
                     for (int _idx=0; _idx<arr->length; _idx++) {\n "
                }
                _ => ";\n int ilen = fn_len(it);\n for (int _idx=0; _idx<ilen; _idx++) {\n ",
            });

            if let Some(index_name) = &binding.index_name {
                self.ctx
                    .outf(format_args!("  long _{index_name}=_idx;\n"));
            }

            self.ctx.outf(format_args!(
                " {} _{}",
                item_id.c_type(),
                binding.name
            ));
            match source_id {
                TypeId::Range => self.ctx.out("=_idx;\n"),
                TypeId::ArrayInt | TypeId::ArrayInt64 | TypeId::ArrayFloat => {
                    self.ctx.out("=arr->items[_idx];\n")
                }
                TypeId::Array => {
                    if item_id == TypeId::String {
                        self.ctx.out("=fn_string(arr->items[_idx]);\n")
                    } else {
                        self.ctx.out("=arr->items[_idx];\n")
                    }
                }
                _ => self.ctx.out("=item_at(it,_idx);\n"),
            }
        }

        if level + 1 < fore.loops.len() {
            self.emit_loop_level(fore, level + 1);
        } else {
            self.emit_loop_body(fore);
        }

        // Close the loop (and the null guard where one was opened).
        if !binding.is_named
            && matches!(
                source_id,
                TypeId::Range
                    | TypeId::ArrayInt
                    | TypeId::ArrayInt64
                    | TypeId::ArrayFloat
                    | TypeId::Array
            )
        {
            self.ctx.outc('}');
        }
        self.ctx.out(" }\n");
    }

    fn emit_loop_body(&mut self, fore: &ForExpression<TypeInfo>) {
        for decl in &fore.lets {
            self.ctx.outf(format_args!(
                " {} _{}=",
                decl.info.type_id().c_type(),
                decl.name
            ));
            non_tail!(self, self.emit_expr(&decl.value));
            self.ctx.out(";\n");
        }

        let mut guards = 0;
        if let Some(clause) = &fore.where_clause {
            self.ctx.out(" if (");
            self.emit_condition(clause);
            self.ctx.out(") {\n");
            guards += 1;
        }

        // Group and order keys push ahead of each value; the matching
        // runtime transform consumes the pair encoding after the loop.
        if let Some(group) = &fore.group {
            for key in &group.keys {
                self.ctx.out(" array_push(arr_out,");
                non_tail!(self, self.emit_box_item(key));
                self.ctx.out(");");
            }
        } else {
            for spec in &fore.order {
                self.ctx.out(" array_push(arr_out,");
                non_tail!(self, self.emit_box_item(&spec.key));
                self.ctx.out(");");
            }
        }

        self.ctx.out(" array_push(arr_out,");
        non_tail!(self, self.emit_box_item(&fore.body));
        self.ctx.out(");");

        for _ in 0..guards {
            self.ctx.out(" }\n");
        }
    }
}
