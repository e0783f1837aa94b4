use std::rc::Rc;

use anyhow::Result;

use super::*;
use crate::ast::*;
use crate::syntax::Span;

fn span(start: usize) -> Span {
    Span::new(start, start + 1)
}

fn int(value: i32, at: usize) -> Expression<()> {
    Expression::Literal(Literal {
        value: LitValue::Int(value),
        info: (),
        span: span(at),
    })
}

fn float(value: f64, at: usize) -> Expression<()> {
    Expression::Literal(Literal {
        value: LitValue::Float(value),
        info: (),
        span: span(at),
    })
}

fn string(value: &str, at: usize) -> Expression<()> {
    Expression::Literal(Literal {
        value: LitValue::Str(value.into()),
        info: (),
        span: span(at),
    })
}

fn ident(name: &str, at: usize) -> Expression<()> {
    Expression::Ident(Ident {
        name: name.into(),
        target: None,
        info: (),
        span: span(at),
    })
}

fn binary(op: BinaryOperator, left: Expression<()>, right: Expression<()>) -> Expression<()> {
    let span = left.span();
    Expression::Binary(Box::new(BinaryExpression {
        op,
        left,
        right,
        info: (),
        span,
    }))
}

fn let_single(name: &str, value: Expression<()>, at: usize) -> Statement<()> {
    Statement::Let(LetStatement {
        declarations: vec![Declaration::Single(VariableDeclaration {
            name: name.into(),
            value,
            info: (),
            span: span(at),
        })],
        span: span(at),
    })
}

fn fn_def(
    name: Option<&str>,
    params: &[&str],
    body: Expression<()>,
    at: usize,
) -> FuncDef<()> {
    FuncDef {
        name: name.map(str::to_string),
        kind: if name.is_some() {
            FuncKind::Function
        } else {
            FuncKind::Anonymous
        },
        params: params
            .iter()
            .enumerate()
            .map(|(i, p)| Parameter {
                name: p.to_string(),
                declared: None,
                default: None,
                is_optional: false,
                info: (),
                span: span(at + 1 + i),
            })
            .collect(),
        return_type: None,
        body,
        is_public: false,
        is_variadic: false,
        meta: None,
        info: (),
        span: span(at),
    }
}

fn call(callee: Expression<()>, args: Vec<Expression<()>>, at: usize) -> Expression<()> {
    Expression::Call(Box::new(CallExpression {
        callee,
        arguments: args
            .into_iter()
            .map(|value| Argument {
                name: None,
                value,
                span: span(at),
            })
            .collect(),
        resolved: None,
        info: (),
        span: span(at),
    }))
}

fn check(statements: Vec<Statement<()>>) -> CheckOutput {
    Typechecker::new(&()).check(Ast::from_statements(statements))
}

fn expr_of(statement: &Statement<TypeInfo>) -> &Expression<TypeInfo> {
    match statement {
        Statement::Expression(expr) => expr,
        other => panic!("expected expression statement, got {other:?}"),
    }
}

#[test]
fn test_numeric_promotion() -> Result<()> {
    let output = check(vec![Statement::Expression(binary(
        BinaryOperator::Add,
        int(1, 0),
        float(2.5, 4),
    ))]);
    assert!(output.errors().is_empty());
    assert_eq!(expr_of(&output.ast.nodes()[0]).info().ty, Type::Float);
    Ok(())
}

#[test]
fn test_division_always_floats() {
    let output = check(vec![Statement::Expression(binary(
        BinaryOperator::Div,
        int(1, 0),
        int(2, 4),
    ))]);
    assert_eq!(expr_of(&output.ast.nodes()[0]).info().ty, Type::Float);
}

#[test]
fn test_idiv_routes_to_runtime() {
    let output = check(vec![Statement::Expression(binary(
        BinaryOperator::IntDiv,
        int(7, 0),
        int(2, 4),
    ))]);
    assert_eq!(expr_of(&output.ast.nodes()[0]).info().ty, Type::Number);
}

#[test]
fn test_comparison_is_bool() {
    let output = check(vec![Statement::Expression(binary(
        BinaryOperator::Le,
        int(1, 0),
        float(2.0, 4),
    ))]);
    assert_eq!(expr_of(&output.ast.nodes()[0]).info().ty, Type::Bool);
}

#[test]
fn test_mixed_add_is_any() {
    let output = check(vec![Statement::Expression(binary(
        BinaryOperator::Add,
        int(1, 0),
        string("x", 4),
    ))]);
    assert!(output.errors().is_empty());
    assert_eq!(expr_of(&output.ast.nodes()[0]).info().ty, Type::Any);
}

#[test]
fn test_undefined_identifier_accumulates_and_types_error() {
    let output = check(vec![Statement::Expression(binary(
        BinaryOperator::Add,
        ident("nope", 0),
        ident("nada", 7),
    ))]);
    assert_eq!(output.errors().len(), 2);
    assert!(matches!(
        &output.errors()[0],
        LambdaError::Name(NameError::Undefined { name }, _) if name == "nope"
    ));
    // The enclosing expression still type-checks.
    assert_eq!(expr_of(&output.ast.nodes()[0]).info().ty, Type::Any);
}

#[test]
fn test_let_binding_and_shadowing() {
    let output = check(vec![
        let_single("x", int(1, 0), 0),
        let_single("x", int(2, 10), 10),
    ]);
    // Redeclaration in the same scope is a name error.
    assert_eq!(output.errors().len(), 1);
    assert!(matches!(
        &output.errors()[0],
        LambdaError::Name(NameError::Duplicate { name }, _) if name == "x"
    ));
}

#[test]
fn test_literal_interning() {
    let output = check(vec![
        Statement::Expression(string("hello", 0)),
        Statement::Expression(string("hello", 10)),
        Statement::Expression(string("world", 20)),
    ]);
    assert_eq!(output.context.consts.len(), 2);
    let first = expr_of(&output.ast.nodes()[0]).info();
    let second = expr_of(&output.ast.nodes()[1]).info();
    assert!(first.is_literal);
    assert_eq!(first.const_index, second.const_index);
}

#[test]
fn test_capture_snapshot_semantics() {
    // let x = 1; let f = fn() => x
    let output = check(vec![
        let_single("x", int(1, 0), 0),
        let_single(
            "f",
            Expression::FnExpr(Box::new(fn_def(None, &[], ident("x", 25), 20))),
            16,
        ),
    ]);
    assert!(output.errors().is_empty());

    let Statement::Let(stm) = &output.ast.nodes()[1] else {
        panic!("expected let");
    };
    let Declaration::Single(decl) = &stm.declarations[0] else {
        panic!("expected single declaration");
    };
    let Expression::FnExpr(def) = &decl.value else {
        panic!("expected fn expression");
    };
    let meta = def.meta();

    // Top-level lets are globals, so nothing is captured...
    assert!(!meta.has_captures());

    // ...but the anonymous function adopts the assignment name.
    assert_eq!(*meta.display_name.borrow(), "f");
}

#[test]
fn test_capture_inside_function() {
    // fn outer(x) => (fn() => x)
    let inner = fn_def(None, &[], ident("x", 20), 15);
    let outer = fn_def(
        Some("outer"),
        &["x"],
        Expression::FnExpr(Box::new(inner)),
        0,
    );
    let output = check(vec![Statement::FuncDef(outer)]);
    assert!(output.errors().is_empty());

    let Statement::FuncDef(outer) = &output.ast.nodes()[0] else {
        panic!("expected fn");
    };
    let Expression::FnExpr(inner) = &outer.body else {
        panic!("expected nested fn");
    };
    let captures = inner.meta().captures.borrow();
    assert_eq!(captures.len(), 1);
    assert_eq!(captures[0].name, "x");
    assert!(!captures[0].from_outer_env);
    assert!(!outer.meta().has_captures());
}

#[test]
fn test_transitive_capture_uses_outer_env() {
    // fn outer(x) => (fn() => (fn() => x))
    let innermost = fn_def(None, &[], ident("x", 30), 25);
    let middle = fn_def(None, &[], Expression::FnExpr(Box::new(innermost)), 15);
    let outer = fn_def(
        Some("outer"),
        &["x"],
        Expression::FnExpr(Box::new(middle)),
        0,
    );
    let output = check(vec![Statement::FuncDef(outer)]);

    let Statement::FuncDef(outer) = &output.ast.nodes()[0] else {
        panic!("expected fn");
    };
    let Expression::FnExpr(middle) = &outer.body else {
        panic!("expected nested fn");
    };
    let Expression::FnExpr(innermost) = &middle.body else {
        panic!("expected doubly nested fn");
    };

    assert!(!middle.meta().captures.borrow()[0].from_outer_env);
    assert!(innermost.meta().captures.borrow()[0].from_outer_env);
}

#[test]
fn test_call_arity_and_missing_argument() {
    let def = fn_def(Some("f"), &["a", "b"], ident("a", 10), 0);
    let output = check(vec![
        Statement::FuncDef(def),
        Statement::Expression(call(ident("f", 20), vec![int(1, 22)], 20)),
    ]);
    assert_eq!(output.errors().len(), 1);
    assert!(matches!(
        &output.errors()[0],
        LambdaError::Type(TypeError::MissingArgument { name }, _) if name == "b"
    ));
}

#[test]
fn test_named_argument_resolution() {
    let def = fn_def(Some("greet"), &["name", "greeting"], ident("name", 10), 0);
    let output = check(vec![
        Statement::FuncDef(def),
        Statement::Expression(Expression::Call(Box::new(CallExpression {
            callee: ident("greet", 20),
            arguments: vec![
                Argument {
                    name: None,
                    value: string("World", 26),
                    span: span(26),
                },
                Argument {
                    name: Some("greeting".into()),
                    value: string("Hi", 35),
                    span: span(35),
                },
            ],
            resolved: None,
            info: (),
            span: span(20),
        }))),
    ]);
    assert!(output.errors().is_empty());
}

#[test]
fn test_duplicate_named_argument() {
    let def = fn_def(Some("f"), &["a"], ident("a", 10), 0);
    let output = check(vec![
        Statement::FuncDef(def),
        Statement::Expression(Expression::Call(Box::new(CallExpression {
            callee: ident("f", 20),
            arguments: vec![
                Argument {
                    name: Some("a".into()),
                    value: int(1, 24),
                    span: span(24),
                },
                Argument {
                    name: Some("a".into()),
                    value: int(2, 30),
                    span: span(30),
                },
            ],
            resolved: None,
            info: (),
            span: span(20),
        }))),
    ]);
    assert!(matches!(
        &output.errors()[0],
        LambdaError::Type(TypeError::DuplicateArgument { name }, _) if name == "a"
    ));
}

#[test]
fn test_named_argument_to_variadic_is_rejected() {
    let mut def = fn_def(Some("f"), &["a"], ident("a", 10), 0);
    def.is_variadic = true;
    let output = check(vec![
        Statement::FuncDef(def),
        Statement::Expression(Expression::Call(Box::new(CallExpression {
            callee: ident("f", 20),
            arguments: vec![
                Argument {
                    name: None,
                    value: int(1, 24),
                    span: span(24),
                },
                Argument {
                    name: Some("extra".into()),
                    value: int(2, 30),
                    span: span(30),
                },
            ],
            resolved: None,
            info: (),
            span: span(20),
        }))),
    ]);
    assert!(matches!(
        &output.errors()[0],
        LambdaError::Type(TypeError::NamedVariadic { name }, _) if name == "extra"
    ));
}

#[test]
fn test_system_function_fallback() {
    let output = check(vec![Statement::Expression(call(
        ident("len", 0),
        vec![string("abc", 4)],
        0,
    ))]);
    assert!(output.errors().is_empty());
    assert_eq!(expr_of(&output.ast.nodes()[0]).info().ty, Type::Int64);
}

#[test]
fn test_procedural_statement_outside_proc() {
    let output = check(vec![Statement::Break(span(0))]);
    assert!(matches!(
        &output.errors()[0],
        LambdaError::Type(TypeError::IllegalStatement { what }, _) if what == "break"
    ));
}

#[test]
fn test_pattern_definition_and_reference() {
    let hex = PatternDef {
        name: "hex".into(),
        is_symbol: false,
        pattern: PatternExpr::OneOrMore(Box::new(PatternExpr::CharClass(CharClass::Digit))),
        index: None,
        info: (),
        span: span(0),
    };
    let output = check(vec![
        Statement::PatternDef(hex),
        Statement::Expression(ident("hex", 30)),
    ]);
    assert!(output.errors().is_empty());
    assert_eq!(output.context.patterns.len(), 1);
    assert!(output.context.patterns[0].full_match("123"));

    let reference = expr_of(&output.ast.nodes()[1]);
    assert_eq!(reference.info().ty, Type::Pattern);
}

#[test]
fn test_monotonic_annotation() {
    // Checking the checked AST's types twice yields identical results: the
    // pass is a pure function of its input.
    let statements = vec![
        let_single("x", int(1, 0), 0),
        Statement::Expression(binary(BinaryOperator::Mul, ident("x", 10), int(3, 14))),
    ];
    let first = check(statements.clone());
    let second = check(statements);
    assert_eq!(
        expr_of(&first.ast.nodes()[1]).info(),
        expr_of(&second.ast.nodes()[1]).info()
    );
}

#[test]
fn test_structure_depth_limit() {
    let mut expr = int(1, 0);
    for _ in 0..200 {
        expr = Expression::Parens(Box::new(expr));
    }
    let output = check(vec![Statement::Expression(expr)]);
    assert!(output
        .errors()
        .iter()
        .any(|err| matches!(err, LambdaError::Overflow(_, _))));
}

#[test]
fn test_if_expression_branch_types() {
    let same = Expression::If(Box::new(IfExpression {
        condition: Expression::Literal(Literal {
            value: LitValue::Bool(true),
            info: (),
            span: span(0),
        }),
        then_branch: int(1, 5),
        else_branch: Some(int(2, 10)),
        info: (),
        span: span(0),
    }));
    let output = check(vec![Statement::Expression(same)]);
    assert_eq!(expr_of(&output.ast.nodes()[0]).info().ty, Type::Int);

    let mixed = Expression::If(Box::new(IfExpression {
        condition: Expression::Literal(Literal {
            value: LitValue::Bool(true),
            info: (),
            span: span(0),
        }),
        then_branch: int(1, 5),
        else_branch: Some(string("two", 10)),
        info: (),
        span: span(0),
    }));
    let output = check(vec![Statement::Expression(mixed)]);
    assert_eq!(expr_of(&output.ast.nodes()[0]).info().ty, Type::Any);
}

#[test]
fn test_array_element_specialization() {
    let ints = Expression::Array(ArrayLiteral {
        items: vec![int(1, 1), int(2, 3), int(3, 5)],
        info: (),
        span: span(0),
    });
    let output = check(vec![Statement::Expression(ints)]);
    assert_eq!(
        expr_of(&output.ast.nodes()[0]).info().ty,
        Type::Array(Box::new(Type::Int))
    );

    let mixed = Expression::Array(ArrayLiteral {
        items: vec![int(1, 1), string("x", 3)],
        info: (),
        span: span(0),
    });
    let output = check(vec![Statement::Expression(mixed)]);
    assert_eq!(
        expr_of(&output.ast.nodes()[0]).info().ty,
        Type::Array(Box::new(Type::Any))
    );
}

#[test]
fn test_map_shape_and_type_index() {
    let map = Expression::Map(MapLiteral {
        entries: vec![MapEntry {
            key: MapKey::Name("a".into()),
            value: int(1, 5),
            span: span(4),
        }],
        info: (),
        span: span(0),
    });
    let output = check(vec![Statement::Expression(map)]);
    let info = expr_of(&output.ast.nodes()[0]).info();
    assert_eq!(info.type_index, Some(0));
    let Type::Map(shape) = &info.ty else {
        panic!("expected map type");
    };
    assert_eq!(shape.fields, vec![("a".into(), Type::Int)]);
}

#[test]
fn test_pipe_modes() {
    // [1] | ~ * 2 : auto-map.
    let auto = Expression::Pipe(Box::new(PipeExpression {
        op: PipeOperator::Pipe,
        left: Expression::Array(ArrayLiteral {
            items: vec![int(1, 1)],
            info: (),
            span: span(0),
        }),
        right: binary(
            BinaryOperator::Mul,
            Expression::CurrentItem(CurrentRef {
                info: (),
                span: span(8),
            }),
            int(2, 12),
        ),
        info: (),
        span: span(0),
    }));
    let output = check(vec![Statement::Expression(auto)]);
    assert_eq!(
        expr_of(&output.ast.nodes()[0]).info().ty,
        Type::Array(Box::new(Type::Any))
    );

    // [1] | sum : aggregate, whole list to the callee.
    let aggregate = Expression::Pipe(Box::new(PipeExpression {
        op: PipeOperator::Pipe,
        left: Expression::Array(ArrayLiteral {
            items: vec![int(1, 1)],
            info: (),
            span: span(0),
        }),
        right: ident("sum", 8),
        info: (),
        span: span(0),
    }));
    let output = check(vec![Statement::Expression(aggregate)]);
    assert_eq!(expr_of(&output.ast.nodes()[0]).info().ty, Type::Any);
}

#[test]
fn test_tco_detection() -> Result<()> {
    // fn fact(n, acc) => if n <= 1 then acc else fact(n - 1, acc * n)
    let recursive = call(
        ident("fact", 40),
        vec![
            binary(BinaryOperator::Sub, ident("n", 45), int(1, 49)),
            binary(BinaryOperator::Mul, ident("acc", 52), ident("n", 58)),
        ],
        40,
    );
    let body = Expression::If(Box::new(IfExpression {
        condition: binary(BinaryOperator::Le, ident("n", 20), int(1, 25)),
        then_branch: ident("acc", 30),
        else_branch: Some(recursive),
        info: (),
        span: span(18),
    }));
    let def = fn_def(Some("fact"), &["n", "acc"], body, 0);
    let output = check(vec![Statement::FuncDef(def)]);
    assert!(output.errors().is_empty());

    crate::safety::analyze(&output.ast);
    let Statement::FuncDef(def) = &output.ast.nodes()[0] else {
        panic!("expected fn");
    };
    assert!(def.meta().tco.get());
    assert!(!crate::safety::needs_stack_check(def.meta()));
    Ok(())
}

#[test]
fn test_non_tail_recursion_keeps_stack_check() {
    // fn f(n) => f(n - 1) + 1 : recursive call feeds the addition.
    let body = binary(
        BinaryOperator::Add,
        call(
            ident("f", 12),
            vec![binary(BinaryOperator::Sub, ident("n", 14), int(1, 18))],
            12,
        ),
        int(1, 24),
    );
    let def = fn_def(Some("f"), &["n"], body, 0);
    let output = check(vec![Statement::FuncDef(def)]);

    crate::safety::analyze(&output.ast);
    let Statement::FuncDef(def) = &output.ast.nodes()[0] else {
        panic!("expected fn");
    };
    assert!(!def.meta().tco.get());
    assert!(crate::safety::needs_stack_check(def.meta()));
}
