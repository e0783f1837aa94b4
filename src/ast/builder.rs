//! AST construction from the parser adapter.
//!
//! Walks an external syntax tree by symbol and field name and produces the
//! untyped AST. Anything malformed becomes a `SyntaxError` node so checking
//! can continue and report it in place.

use std::str::FromStr;

use log::debug;
use rust_decimal::Decimal;
use unescape::unescape;

use super::*;
use crate::syntax::{node_text, SyntaxNode};
use crate::typechecker::captures::FuncKind;
use crate::typechecker::types::Type;

/// Build a whole script from the adapter's root node.
pub fn build_script<N: SyntaxNode>(root: &N, source: &str) -> Ast<()> {
    let statements = root
        .named_children()
        .iter()
        .filter(|node| node.symbol() != "comment")
        .map(|node| build_statement(node, source))
        .collect();
    Ast::from_statements(statements)
}

fn build_statement<N: SyntaxNode>(node: &N, source: &str) -> Statement<()> {
    match node.symbol() {
        "let_stam" => Statement::Let(build_let(node, source)),
        "pub_stam" => Statement::Pub(build_let(node, source)),
        "var_stam" => Statement::Var(build_let(node, source)),
        "assign_stam" => Statement::Assign(AssignStatement {
            target: node
                .field("target")
                .map(|target| node_text(&target, source).to_string())
                .unwrap_or_default(),
            binding: None,
            value: build_field_expr(node, "value", source),
            span: node.span(),
        }),
        "if_stam" => Statement::If(build_if_statement(node, source)),
        "while_stam" => Statement::While(WhileStatement {
            condition: build_field_expr(node, "cond", source),
            body: build_content_field(node, "body", source),
            span: node.span(),
        }),
        "for_stam" => Statement::For(build_for(node, source)),
        "break_stam" => Statement::Break(node.span()),
        "continue_stam" => Statement::Continue(node.span()),
        "return_stam" => Statement::Return(ReturnStatement {
            value: node.field("value").map(|value| build_expr(&value, source)),
            span: node.span(),
        }),
        "fn_stam" | "fn_expr_stam" => Statement::FuncDef(build_fn(node, source, false)),
        "pn_stam" | "proc_stam" => Statement::FuncDef(build_fn(node, source, true)),
        "string_pattern" => Statement::PatternDef(build_pattern_def(node, source, false)),
        "symbol_pattern" => Statement::PatternDef(build_pattern_def(node, source, true)),
        "import_module" => Statement::Import(build_import(node, source)),
        _ => Statement::Expression(build_expr(node, source)),
    }
}

fn build_let<N: SyntaxNode>(node: &N, source: &str) -> LetStatement<()> {
    let declarations = node
        .field_all("declare")
        .iter()
        .map(|decl| build_declaration(decl, source))
        .collect();
    LetStatement {
        declarations,
        span: node.span(),
    }
}

fn build_declaration<N: SyntaxNode>(node: &N, source: &str) -> Declaration<()> {
    if node.symbol() == "decompose" || node.field("decompose").is_some() {
        let names = node
            .field_all("name")
            .iter()
            .map(|name| node_text(name, source).to_string())
            .collect();
        return Declaration::Decompose(Decomposition {
            names,
            is_named: node.field("kind").map(|kind| node_text(&kind, source) == "at")
                == Some(true),
            value: build_field_expr(node, "as", source),
            info: (),
            span: node.span(),
        });
    }
    Declaration::Single(VariableDeclaration {
        name: node
            .field("name")
            .map(|name| node_text(&name, source).to_string())
            .unwrap_or_default(),
        value: build_field_expr(node, "as", source),
        info: (),
        span: node.span(),
    })
}

fn build_if_statement<N: SyntaxNode>(node: &N, source: &str) -> IfStatement<()> {
    let else_branch = node.field("else").map(|branch| {
        if branch.symbol() == "if_stam" {
            ElseBranch::ElseIf(Box::new(build_if_statement(&branch, source)))
        } else {
            ElseBranch::Block(build_content(&branch, source))
        }
    });
    IfStatement {
        condition: build_field_expr(node, "cond", source),
        then_branch: build_content_field(node, "then", source),
        else_branch,
        span: node.span(),
    }
}

fn build_content_field<N: SyntaxNode>(node: &N, field: &str, source: &str) -> ContentBlock<()> {
    match node.field(field) {
        Some(body) => build_content(&body, source),
        None => ContentBlock {
            items: Vec::new(),
            info: (),
            span: node.span(),
        },
    }
}

fn build_content<N: SyntaxNode>(node: &N, source: &str) -> ContentBlock<()> {
    if node.symbol() != "content" {
        // A single statement body.
        return ContentBlock {
            items: vec![build_statement(node, source)],
            info: (),
            span: node.span(),
        };
    }
    ContentBlock {
        items: node
            .named_children()
            .iter()
            .filter(|child| child.symbol() != "comment")
            .map(|child| build_statement(child, source))
            .collect(),
        info: (),
        span: node.span(),
    }
}

fn build_field_expr<N: SyntaxNode>(node: &N, field: &str, source: &str) -> Expression<()> {
    match node.field(field) {
        Some(child) => build_expr(&child, source),
        None => {
            debug!("missing '{field}' child on {}", node.symbol());
            Expression::SyntaxError(CurrentRef {
                info: (),
                span: node.span(),
            })
        }
    }
}

pub fn build_expr<N: SyntaxNode>(node: &N, source: &str) -> Expression<()> {
    let span = node.span();
    match node.symbol() {
        "null" => literal(LitValue::Null, span),
        "true" => literal(LitValue::Bool(true), span),
        "false" => literal(LitValue::Bool(false), span),
        "integer" => build_integer(node_text(node, source), span),
        "float" => match f64::from_str(node_text(node, source)) {
            Ok(value) => literal(LitValue::Float(value), span),
            Err(_) => syntax_error(span),
        },
        "decimal" => {
            let text = node_text(node, source).trim_end_matches(['n', 'N']);
            match Decimal::from_str(text) {
                Ok(value) => literal(LitValue::Decimal(value), span),
                Err(_) => syntax_error(span),
            }
        }
        "string" => literal(LitValue::Str(string_content(node, source, '"')), span),
        "symbol" => literal(LitValue::Symbol(string_content(node, source, '\'')), span),
        "binary" => literal(LitValue::Binary(binary_content(node, source)), span),
        "datetime" | "time" => {
            literal(LitValue::DateTime(string_content(node, source, '\'')), span)
        }
        "identifier" => Expression::Ident(Ident {
            name: node_text(node, source).to_string(),
            target: None,
            info: (),
            span,
        }),
        "current_item" => Expression::CurrentItem(CurrentRef { info: (), span }),
        "current_index" => Expression::CurrentIndex(CurrentRef { info: (), span }),
        "primary_expr" | "parenthesized_expr" => match node.named_children().first() {
            Some(inner) => Expression::Parens(Box::new(build_expr(inner, source))),
            None => syntax_error(span),
        },
        "unary_expr" => {
            let op = match operator_text(node, source).as_str() {
                "-" => UnaryOperator::Neg,
                "+" => UnaryOperator::Pos,
                _ => UnaryOperator::Not,
            };
            Expression::Unary(Box::new(UnaryExpression {
                op,
                operand: build_field_expr(node, "operand", source),
                info: (),
                span,
            }))
        }
        "binary_expr" | "binary_expr_no_pipe" => build_binary(node, source),
        "member_expr" => {
            let field = match node.field("field") {
                Some(field) if field.symbol() == "identifier" => {
                    MemberField::Name(node_text(&field, source).to_string(), field.span())
                }
                Some(field) => MemberField::Expr(build_expr(&field, source)),
                None => MemberField::Name(String::new(), span),
            };
            Expression::Member(Box::new(MemberExpression {
                object: build_field_expr(node, "object", source),
                field,
                info: (),
                span,
            }))
        }
        "index_expr" => Expression::Index(Box::new(IndexExpression {
            object: build_field_expr(node, "object", source),
            index: build_field_expr(node, "field", source),
            info: (),
            span,
        })),
        "path_expr" => build_path(node, source),
        "path_index_expr" => Expression::PathIndex(Box::new(PathIndexExpression {
            base: build_field_expr(node, "object", source),
            segment: build_field_expr(node, "segment", source),
            info: (),
            span,
        })),
        "array" => Expression::Array(ArrayLiteral {
            items: build_items(node, source),
            info: (),
            span,
        }),
        "list" => {
            let declarations = node
                .named_children()
                .iter()
                .filter(|child| matches!(child.symbol(), "let_stam" | "pub_stam"))
                .map(|child| build_let(child, source))
                .collect();
            Expression::List(ListLiteral {
                declarations,
                items: build_items(node, source),
                info: (),
                span,
            })
        }
        "content" => Expression::Content(build_content(node, source)),
        "map" => Expression::Map(MapLiteral {
            entries: node
                .named_children()
                .iter()
                .filter(|child| child.symbol() == "map_item")
                .map(|child| build_map_entry(child, source))
                .collect(),
            info: (),
            span,
        }),
        "element" => build_element(node, source),
        "if_expr" => Expression::If(Box::new(IfExpression {
            condition: build_field_expr(node, "cond", source),
            then_branch: build_field_expr(node, "then", source),
            else_branch: node.field("else").map(|e| build_expr(&e, source)),
            info: (),
            span,
        })),
        "for_expr" => Expression::For(Box::new(build_for(node, source))),
        "fn_expr" => Expression::FnExpr(Box::new(build_fn(node, source, false))),
        "call_expr" => build_call(node, source),
        "base_type" => match base_type(node_text(node, source)) {
            Some(ty) => Expression::TypeLiteral(TypeLiteral { ty, info: (), span }),
            None => syntax_error(span),
        },
        "array_type" => Expression::TypeLiteral(TypeLiteral {
            ty: Type::Array(Box::new(
                node.named_children()
                    .first()
                    .and_then(|inner| base_type(node_text(inner, source)))
                    .unwrap_or(Type::Any),
            )),
            info: (),
            span,
        }),
        "list_type" => Expression::TypeLiteral(TypeLiteral {
            ty: Type::List,
            info: (),
            span,
        }),
        "ERROR" => syntax_error(span),
        other => {
            debug!("unknown expression symbol '{other}'");
            syntax_error(span)
        }
    }
}

fn literal(value: LitValue, span: crate::syntax::Span) -> Expression<()> {
    Expression::Literal(Literal {
        value,
        info: (),
        span,
    })
}

fn syntax_error(span: crate::syntax::Span) -> Expression<()> {
    Expression::SyntaxError(CurrentRef { info: (), span })
}

/// Small integers are 32-bit; wider literals take the 64-bit boxed form.
fn build_integer(text: &str, span: crate::syntax::Span) -> Expression<()> {
    match i64::from_str(text) {
        Ok(value) => {
            if let Ok(small) = i32::try_from(value) {
                literal(LitValue::Int(small), span)
            } else {
                literal(LitValue::Int64(value), span)
            }
        }
        Err(_) => syntax_error(span),
    }
}

fn string_content<N: SyntaxNode>(node: &N, source: &str, quote: char) -> String {
    let text = node_text(node, source);
    let trimmed = text
        .trim_start_matches(['t', 'b'])
        .trim_matches(quote)
        .to_string();
    unescape(&trimmed).unwrap_or(trimmed)
}

fn binary_content<N: SyntaxNode>(node: &N, source: &str) -> Vec<u8> {
    // b'\xDEADBEEF' carries hex digits.
    let text = node_text(node, source);
    let digits: String = text.chars().filter(|c| c.is_ascii_hexdigit()).collect();
    digits
        .as_bytes()
        .chunks(2)
        .filter_map(|pair| {
            let pair = std::str::from_utf8(pair).ok()?;
            u8::from_str_radix(pair, 16).ok()
        })
        .collect()
}

fn operator_text<N: SyntaxNode>(node: &N, source: &str) -> String {
    node.field("operator")
        .map(|op| node_text(&op, source).to_string())
        .unwrap_or_default()
}

fn build_binary<N: SyntaxNode>(node: &N, source: &str) -> Expression<()> {
    let span = node.span();
    let op_text = operator_text(node, source);

    // Pipe and filter share the binary surface syntax but lower through
    // their own node.
    if op_text == "|" || op_text == "where" {
        return Expression::Pipe(Box::new(PipeExpression {
            op: if op_text == "|" {
                PipeOperator::Pipe
            } else {
                PipeOperator::Where
            },
            left: build_field_expr(node, "left", source),
            right: build_field_expr(node, "right", source),
            info: (),
            span,
        }));
    }

    let op = match op_text.as_str() {
        "+" => BinaryOperator::Add,
        "-" => BinaryOperator::Sub,
        "*" => BinaryOperator::Mul,
        "/" => BinaryOperator::Div,
        "_/" | "idiv" => BinaryOperator::IntDiv,
        "%" | "mod" => BinaryOperator::Mod,
        "^" | "pow" => BinaryOperator::Pow,
        "==" => BinaryOperator::Eq,
        "!=" => BinaryOperator::Ne,
        "<" => BinaryOperator::Lt,
        "<=" => BinaryOperator::Le,
        ">" => BinaryOperator::Gt,
        ">=" => BinaryOperator::Ge,
        "and" => BinaryOperator::And,
        "or" => BinaryOperator::Or,
        "is" => BinaryOperator::Is,
        "in" => BinaryOperator::In,
        "to" => BinaryOperator::To,
        "++" | "join" => BinaryOperator::Join,
        "&" => BinaryOperator::Intersect,
        other => {
            debug!("unknown binary operator '{other}'");
            return syntax_error(span);
        }
    };
    Expression::Binary(Box::new(BinaryExpression {
        op,
        left: build_field_expr(node, "left", source),
        right: build_field_expr(node, "right", source),
        info: (),
        span,
    }))
}

fn build_items<N: SyntaxNode>(node: &N, source: &str) -> Vec<Expression<()>> {
    node.named_children()
        .iter()
        .filter(|child| {
            !matches!(
                child.symbol(),
                "comment" | "let_stam" | "pub_stam" | "map_item" | "attr"
            )
        })
        .map(|child| build_expr(child, source))
        .collect()
}

fn build_map_entry<N: SyntaxNode>(node: &N, source: &str) -> MapEntry<()> {
    let key = match node.field("name") {
        Some(name) if name.symbol() == "identifier" || name.symbol() == "string" => {
            if name.symbol() == "string" {
                MapKey::Name(string_content(&name, source, '"'))
            } else {
                MapKey::Name(node_text(&name, source).to_string())
            }
        }
        Some(key) => MapKey::Expr(build_expr(&key, source)),
        None => MapKey::Name(String::new()),
    };
    MapEntry {
        key,
        value: build_field_expr(node, "as", source),
        span: node.span(),
    }
}

fn build_element<N: SyntaxNode>(node: &N, source: &str) -> Expression<()> {
    let tag = node
        .field("name")
        .map(|name| node_text(&name, source).to_string())
        .unwrap_or_default();
    let attrs = node
        .named_children()
        .iter()
        .filter(|child| child.symbol() == "attr")
        .map(|child| build_map_entry(child, source))
        .collect();
    let content = node
        .field("body")
        .map(|body| {
            body.named_children()
                .iter()
                .filter(|child| child.symbol() != "comment")
                .map(|child| build_expr(child, source))
                .collect()
        })
        .unwrap_or_default();
    Expression::Element(Box::new(ElementLiteral {
        tag,
        attrs,
        content,
        info: (),
        span: node.span(),
    }))
}

fn build_for<N: SyntaxNode>(node: &N, source: &str) -> ForExpression<()> {
    let loops = node
        .field_all("declare")
        .iter()
        .map(|binding| build_loop_binding(binding, source))
        .collect();
    let lets = node
        .field_all("let")
        .iter()
        .map(|decl| match build_declaration(decl, source) {
            Declaration::Single(decl) => decl,
            Declaration::Decompose(decl) => VariableDeclaration {
                name: decl.names.first().cloned().unwrap_or_default(),
                value: decl.value,
                info: (),
                span: decl.span,
            },
        })
        .collect();
    let group = node.field("group").map(|group| GroupClause {
        keys: group
            .field_all("key")
            .iter()
            .map(|key| build_expr(key, source))
            .collect(),
        alias: group
            .field("as")
            .map(|alias| node_text(&alias, source).to_string()),
        span: group.span(),
    });
    let order = node
        .field_all("order")
        .iter()
        .flat_map(|clause| clause.field_all("spec"))
        .map(|spec| OrderSpec {
            key: build_field_expr(&spec, "expr", source),
            descending: spec
                .field("dir")
                .map(|dir| {
                    let text = node_text(&dir, source);
                    text == "desc" || text == "descending"
                })
                .unwrap_or(false),
            span: spec.span(),
        })
        .collect();

    ForExpression {
        loops,
        lets,
        where_clause: node.field("where").map(|clause| build_expr(&clause, source)),
        group,
        order,
        limit: node.field("limit").map(|limit| build_expr(&limit, source)),
        offset: node.field("offset").map(|offset| build_expr(&offset, source)),
        body: build_field_expr(node, "then", source),
        info: (),
        span: node.span(),
    }
}

fn build_loop_binding<N: SyntaxNode>(node: &N, source: &str) -> LoopBinding<()> {
    let names = node.field_all("name");
    let (index_name, name) = match names.as_slice() {
        // Two variables: `for i, v in ...` / `for k, v at ...`.
        [index, value] => (
            Some(node_text(index, source).to_string()),
            node_text(value, source).to_string(),
        ),
        [value] => (None, node_text(value, source).to_string()),
        _ => (None, String::new()),
    };
    LoopBinding {
        name,
        index_name,
        is_named: node
            .field("kind")
            .map(|kind| node_text(&kind, source) == "at")
            .unwrap_or(false),
        source: build_field_expr(node, "as", source),
        info: (),
        span: node.span(),
    }
}

fn build_call<N: SyntaxNode>(node: &N, source: &str) -> Expression<()> {
    let arguments = node
        .field_all("argument")
        .iter()
        .map(|arg| {
            if arg.symbol() == "named_argument" {
                Argument {
                    name: arg
                        .field("name")
                        .map(|name| node_text(&name, source).to_string()),
                    value: build_field_expr(arg, "value", source),
                    span: arg.span(),
                }
            } else {
                Argument {
                    name: None,
                    value: build_expr(arg, source),
                    span: arg.span(),
                }
            }
        })
        .collect();
    Expression::Call(Box::new(CallExpression {
        callee: build_field_expr(node, "function", source),
        arguments,
        resolved: None,
        info: (),
        span: node.span(),
    }))
}

fn build_path<N: SyntaxNode>(node: &N, source: &str) -> Expression<()> {
    let scheme = match node.field("kind").map(|kind| node_text(&kind, source).to_string()) {
        Some(kind) => match kind.as_str() {
            "file" => PathScheme::File,
            "http" => PathScheme::Http,
            "https" => PathScheme::Https,
            "sys" => PathScheme::Sys,
            "." => PathScheme::Relative,
            ".." => PathScheme::Parent,
            _ => PathScheme::Root,
        },
        None => PathScheme::Relative,
    };
    let segments = node
        .field_all("segment")
        .iter()
        .map(|segment| match segment.symbol() {
            "path_wildcard" => PathSegment::Wildcard,
            "path_wildcard_recursive" => PathSegment::RecursiveWildcard,
            _ => PathSegment::Name(node_text(segment, source).to_string()),
        })
        .collect();
    Expression::Path(PathExpression {
        scheme,
        segments,
        info: (),
        span: node.span(),
    })
}

fn build_fn<N: SyntaxNode>(node: &N, source: &str, is_proc: bool) -> FuncDef<()> {
    let name = node
        .field("name")
        .map(|name| node_text(&name, source).to_string());
    let kind = if is_proc {
        FuncKind::Procedure
    } else if name.is_some() {
        FuncKind::Function
    } else {
        FuncKind::Anonymous
    };

    let mut is_variadic = false;
    let params = node
        .field_all("declare")
        .iter()
        .map(|param| {
            if param.field("variadic").is_some() {
                is_variadic = true;
            }
            Parameter {
                name: param
                    .field("name")
                    .map(|name| node_text(&name, source).to_string())
                    .unwrap_or_default(),
                declared: param
                    .field("type")
                    .and_then(|ty| base_type(node_text(&ty, source))),
                default: param
                    .field("default")
                    .map(|default| build_expr(&default, source)),
                is_optional: param.field("optional").is_some(),
                info: (),
                span: param.span(),
            }
        })
        .collect();

    FuncDef {
        name,
        kind,
        params,
        return_type: node
            .field("type")
            .and_then(|ty| base_type(node_text(&ty, source))),
        body: build_field_expr(node, "body", source),
        is_public: node.field("pub").is_some(),
        is_variadic,
        meta: None,
        info: (),
        span: node.span(),
    }
}

fn build_import<N: SyntaxNode>(node: &N, source: &str) -> Import {
    let module = node
        .field("module")
        .map(|module| node_text(&module, source).trim_matches(['\'', '"']).to_string())
        .unwrap_or_default();
    Import {
        alias: node
            .field("alias")
            .map(|alias| node_text(&alias, source).to_string())
            .unwrap_or_else(|| module.clone()),
        is_relative: module.starts_with('.'),
        module,
        script: None,
        span: node.span(),
    }
}

fn build_pattern_def<N: SyntaxNode>(node: &N, source: &str, is_symbol: bool) -> PatternDef<()> {
    PatternDef {
        name: node
            .field("name")
            .map(|name| node_text(&name, source).to_string())
            .unwrap_or_default(),
        is_symbol,
        pattern: node
            .field("as")
            .map(|pattern| build_pattern(&pattern, source))
            .unwrap_or(PatternExpr::Seq(Vec::new())),
        index: None,
        info: (),
        span: node.span(),
    }
}

pub fn build_pattern<N: SyntaxNode>(node: &N, source: &str) -> PatternExpr {
    match node.symbol() {
        "string" => PatternExpr::Literal(string_content(node, source, '"')),
        "identifier" => PatternExpr::Ref(node_text(node, source).to_string()),
        "pattern_char_class" => PatternExpr::CharClass(match node_text(node, source) {
            "\\d" => CharClass::Digit,
            "\\w" => CharClass::Word,
            "\\s" => CharClass::Space,
            "\\a" => CharClass::Alpha,
            _ => CharClass::Any,
        }),
        "pattern_any" => PatternExpr::CharClass(CharClass::Any),
        "pattern_range" => PatternExpr::Range {
            start: node
                .field("left")
                .map(|left| string_content(&left, source, '"'))
                .unwrap_or_default(),
            end: node
                .field("right")
                .map(|right| string_content(&right, source, '"'))
                .unwrap_or_default(),
        },
        "pattern_seq" => PatternExpr::Seq(
            node.named_children()
                .iter()
                .map(|child| build_pattern(child, source))
                .collect(),
        ),
        "primary_pattern" => match node.named_children().first() {
            Some(inner) => build_pattern(inner, source),
            None => PatternExpr::Seq(Vec::new()),
        },
        "binary_pattern" => {
            let left = node
                .field("left")
                .map(|left| build_pattern(&left, source))
                .unwrap_or(PatternExpr::Seq(Vec::new()));
            let right = node
                .field("right")
                .map(|right| build_pattern(&right, source))
                .unwrap_or(PatternExpr::Seq(Vec::new()));
            match operator_text(node, source).as_str() {
                "&" => PatternExpr::Intersect(Box::new(left), Box::new(right)),
                "to" => {
                    if let (PatternExpr::Literal(start), PatternExpr::Literal(end)) =
                        (&left, &right)
                    {
                        PatternExpr::Range {
                            start: start.clone(),
                            end: end.clone(),
                        }
                    } else {
                        PatternExpr::Seq(vec![left, right])
                    }
                }
                _ => PatternExpr::Union(Box::new(left), Box::new(right)),
            }
        }
        "pattern_negation" => PatternExpr::Not(Box::new(
            node.named_children()
                .first()
                .map(|inner| build_pattern(inner, source))
                .unwrap_or(PatternExpr::Seq(Vec::new())),
        )),
        "pattern_occurrence" => {
            let inner = Box::new(
                node.field("operand")
                    .map(|operand| build_pattern(&operand, source))
                    .unwrap_or(PatternExpr::Seq(Vec::new())),
            );
            match node
                .field("operator")
                .map(|op| node_text(&op, source).to_string())
                .as_deref()
            {
                Some("?") => PatternExpr::Optional(inner),
                Some("+") => PatternExpr::OneOrMore(inner),
                Some("*") => PatternExpr::ZeroOrMore(inner),
                Some(count) => build_repeat(inner, count),
                None => *inner,
            }
        }
        _ => PatternExpr::Seq(
            node.named_children()
                .iter()
                .map(|child| build_pattern(child, source))
                .collect(),
        ),
    }
}

/// Occurrence counts `[n]`, `[n+]`, `[n, m]`.
fn build_repeat(inner: Box<PatternExpr>, count: &str) -> PatternExpr {
    let body = count.trim_start_matches('[').trim_end_matches(']');
    let at_least = body.trim_end().ends_with('+');
    let parts: Vec<&str> = body
        .trim_end_matches('+')
        .split(',')
        .map(str::trim)
        .collect();
    let min = parts
        .first()
        .and_then(|text| u32::from_str(text).ok())
        .unwrap_or(0);
    let max = parts.get(1).and_then(|text| u32::from_str(text).ok());
    PatternExpr::Repeat {
        inner,
        min,
        max,
        at_least,
    }
}

fn base_type(text: &str) -> Option<Type> {
    Some(match text {
        "null" => Type::Null,
        "bool" => Type::Bool,
        "int" => Type::Int,
        "int64" => Type::Int64,
        "float" => Type::Float,
        "number" => Type::Number,
        "decimal" => Type::Decimal,
        "datetime" => Type::DateTime,
        "string" => Type::String,
        "symbol" => Type::Symbol,
        "binary" => Type::Binary,
        "list" => Type::List,
        "range" => Type::Range,
        "any" => Type::Any,
        "error" => Type::Error,
        "fn" => Type::Function(std::rc::Rc::new(crate::typechecker::FuncSignature {
            params: Vec::new(),
            returned: Type::Any,
            is_variadic: false,
            is_public: false,
            is_anonymous: true,
        })),
        _ => return None,
    })
}
