//! Pipeline tests: build an AST, check it, run the analyzers, transpile,
//! and assert on the emitted C source and the accumulated diagnostics.

use anyhow::Result;
use pretty_assertions::assert_eq as assert_eq_pretty;

use lambda_lang::ast::*;
use lambda_lang::codegen::{transpile, transpile_script};
use lambda_lang::loader::{check_script, Modules};
use lambda_lang::syntax::Span;
use lambda_lang::typechecker::captures::FuncKind;
use lambda_lang::typechecker::{LambdaError, PatternError};

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

fn array(items: Vec<Expression<()>>, at: usize) -> Expression<()> {
    Expression::Array(ArrayLiteral {
        items,
        info: (),
        span: span(at),
    })
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

fn named_arg(name: &str, value: Expression<()>, at: usize) -> Argument<()> {
    Argument {
        name: Some(name.into()),
        value,
        span: span(at),
    }
}

fn fn_def(name: Option<&str>, params: &[&str], body: Expression<()>, at: usize) -> FuncDef<()> {
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

fn emit(statements: Vec<Statement<()>>) -> (String, Vec<LambdaError>) {
    let script = check_script("test.ls", Ast::from_statements(statements));
    assert!(
        script.errors.is_empty(),
        "unexpected check errors: {:?}",
        script.errors
    );
    let output = transpile_script(&script);
    (output.source, output.errors)
}

#[test]
fn test_tail_recursion_converts_to_loop() -> Result<()> {
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
    let (source, errors) = emit(vec![
        Statement::FuncDef(fn_def(Some("fact"), &["n", "acc"], body, 0)),
        Statement::Expression(call(ident("fact", 70), vec![int(50000, 75), int(1, 82)], 70)),
    ]);
    assert!(errors.is_empty());

    // Entry label plus goto instead of a recursive call; the stack check
    // is gone because the loop cannot grow the stack.
    assert!(source.contains(" _tco_start:;"));
    assert!(source.contains("goto _tco_start;"));
    assert!(!source.contains("LAMBDA_STACK_CHECK(\"fact\")"));

    // Arguments materialize into temporaries before any reassignment.
    assert!(source.contains("_tco_tmp0"));
    assert!(source.contains("_n = _tco_tmp0;"));
    assert!(source.contains("_acc = _tco_tmp1;"));
    Ok(())
}

#[test]
fn test_plain_function_keeps_stack_check() {
    let body = binary(BinaryOperator::Add, ident("n", 12), int(1, 16));
    let (source, _) = emit(vec![Statement::FuncDef(fn_def(
        Some("inc"),
        &["n"],
        body,
        0,
    ))]);
    assert!(source.contains("LAMBDA_STACK_CHECK(\"inc\")"));
    assert!(!source.contains("_tco_start"));
}

#[test]
fn test_named_arguments_with_defaults() {
    // fn greet(name, greeting: "Hello") => greeting ++ name
    let mut def = fn_def(
        Some("greet"),
        &["name", "greeting"],
        binary(
            BinaryOperator::Join,
            ident("greeting", 30),
            ident("name", 42),
        ),
        0,
    );
    def.params[1].default = Some(string("Hello", 20));

    let greet_named = Expression::Call(Box::new(CallExpression {
        callee: ident("greet", 60),
        arguments: vec![named_arg("name", string("World", 66), 66)],
        resolved: None,
        info: (),
        span: span(60),
    }));
    let greet_mixed = Expression::Call(Box::new(CallExpression {
        callee: ident("greet", 80),
        arguments: vec![
            Argument {
                name: None,
                value: string("World", 86),
                span: span(86),
            },
            named_arg("greeting", string("Hi", 95), 95),
        ],
        resolved: None,
        info: (),
        span: span(80),
    }));

    let (source, errors) = emit(vec![
        Statement::FuncDef(def),
        Statement::Expression(greet_named),
        Statement::Expression(greet_mixed),
    ]);
    assert!(errors.is_empty());

    // Both calls carry two arguments: the named one lands in parameter
    // order and the omitted greeting falls back to its default constant.
    let call_sites = source.matches("_greet0(const_s2it(").count();
    assert_eq!(call_sites, 2, "expected two call sites: {source}");
}

#[test]
fn test_pipe_auto_map_vs_aggregate() {
    // [1,2,3] | ~ * 2
    let auto = Expression::Pipe(Box::new(PipeExpression {
        op: PipeOperator::Pipe,
        left: array(vec![int(1, 1), int(2, 3), int(3, 5)], 0),
        right: binary(
            BinaryOperator::Mul,
            Expression::CurrentItem(CurrentRef {
                info: (),
                span: span(10),
            }),
            int(2, 14),
        ),
        info: (),
        span: span(0),
    }));
    let (source, _) = emit(vec![Statement::Expression(auto)]);
    assert!(source.contains("_pipe_item"));
    assert!(source.contains("item_at(_pipe_collection"));
    assert!(!source.contains("fn_pipe_call"));

    // [1,2,3] | sum
    let aggregate = Expression::Pipe(Box::new(PipeExpression {
        op: PipeOperator::Pipe,
        left: array(vec![int(1, 1), int(2, 3), int(3, 5)], 0),
        right: ident("sum", 10),
        info: (),
        span: span(0),
    }));
    let (source, _) = emit(vec![Statement::Expression(aggregate)]);
    // The built-in receives the whole list.
    assert!(source.contains("fn_sum("));
    assert!(!source.contains("_pipe_item ="));
}

#[test]
fn test_where_filters() {
    let filtered = Expression::Pipe(Box::new(PipeExpression {
        op: PipeOperator::Where,
        left: array(vec![int(1, 1), int(2, 3)], 0),
        right: binary(
            BinaryOperator::Gt,
            Expression::CurrentItem(CurrentRef {
                info: (),
                span: span(10),
            }),
            int(1, 14),
        ),
        info: (),
        span: span(0),
    }));
    let (source, _) = emit(vec![Statement::Expression(filtered)]);
    assert!(source.contains("if (is_truthy("));
    assert!(source.contains("array_push(_pipe_result, _pipe_item);"));
}

#[test]
fn test_pattern_full_match_pipeline() {
    // string hex = ("0x")? (\d | "a" to "z" | "A" to "F")+
    let hex = PatternDef {
        name: "hex".into(),
        is_symbol: false,
        pattern: PatternExpr::Seq(vec![
            PatternExpr::Optional(Box::new(PatternExpr::Literal("0x".into()))),
            PatternExpr::OneOrMore(Box::new(PatternExpr::Union(
                Box::new(PatternExpr::CharClass(CharClass::Digit)),
                Box::new(PatternExpr::Union(
                    Box::new(PatternExpr::Range {
                        start: "a".into(),
                        end: "f".into(),
                    }),
                    Box::new(PatternExpr::Range {
                        start: "A".into(),
                        end: "F".into(),
                    }),
                )),
            ))),
        ]),
        index: None,
        info: (),
        span: span(0),
    };
    let script = check_script(
        "patterns.ls",
        Ast::from_statements(vec![
            Statement::PatternDef(hex),
            Statement::Expression(call(
                ident("match", 40),
                vec![string("0xDEADBEEF", 46), ident("hex", 60)],
                40,
            )),
        ]),
    );
    assert!(script.errors.is_empty());

    let pattern = &script.patterns[0];
    assert!(pattern.full_match("0xDEADBEEF"));
    assert!(!pattern.full_match("0xGHI"));

    let output = transpile_script(&script);
    assert!(output.source.contains("fn_match("));
    assert!(output.source.contains("const_pattern(0)"));
}

#[test]
fn test_bad_pattern_reports_engine_error() {
    let bad = PatternDef {
        name: "broken".into(),
        is_symbol: false,
        pattern: PatternExpr::Ref("missing".into()),
        index: None,
        info: (),
        span: span(0),
    };
    let script = check_script(
        "bad.ls",
        Ast::from_statements(vec![Statement::PatternDef(bad)]),
    );
    assert!(script
        .errors
        .iter()
        .any(|err| matches!(err, LambdaError::Pattern(PatternError::Unresolved { .. }, _))));
}

#[test]
fn test_for_with_clauses() {
    // for i in 1 to 10 where i % 2 == 0 order by i desc limit 3
    let fore = ForExpression {
        loops: vec![LoopBinding {
            name: "i".into(),
            index_name: None,
            is_named: false,
            source: binary(BinaryOperator::To, int(1, 9), int(10, 14)),
            info: (),
            span: span(4),
        }],
        lets: Vec::new(),
        where_clause: Some(binary(
            BinaryOperator::Eq,
            binary(BinaryOperator::Mod, ident("i", 23), int(2, 27)),
            int(0, 32),
        )),
        group: None,
        order: vec![OrderSpec {
            key: ident("i", 44),
            descending: true,
            span: span(44),
        }],
        limit: Some(int(3, 57)),
        offset: None,
        body: ident("i", 4),
        info: (),
        span: span(0),
    };
    let (source, errors) = emit(vec![Statement::Expression(Expression::For(Box::new(
        fore,
    )))]);
    assert!(errors.is_empty());

    assert!(source.contains("array_spreadable()"));
    assert!(source.contains("if (is_truthy("));
    assert!(source.contains("fn_order(arr_out,1,\"d\");"));
    assert!(source.contains("fn_slice(arr_out,ITEM_NULL,i2it(3));"));
    assert!(source.contains("array_end(arr_out);"));
}

#[test]
fn test_for_over_range_iterates_natively() {
    let fore = ForExpression {
        loops: vec![LoopBinding {
            name: "i".into(),
            index_name: None,
            is_named: false,
            source: binary(BinaryOperator::To, int(1, 9), int(3, 14)),
            info: (),
            span: span(4),
        }],
        lets: Vec::new(),
        where_clause: None,
        group: None,
        order: Vec::new(),
        limit: None,
        offset: None,
        body: ident("i", 4),
        info: (),
        span: span(0),
    };
    let (source, _) = emit(vec![Statement::Expression(Expression::For(Box::new(
        fore,
    )))]);
    assert!(source.contains("Range *rng="));
    assert!(source.contains("for (long _idx=rng->start; _idx<=rng->end; _idx++)"));
    assert!(source.contains("int32_t _i=_idx;"));
}

#[test]
fn test_closure_environment_emission() {
    // fn outer(x) => (fn() => x)
    let inner = fn_def(None, &[], ident("x", 20), 15);
    let outer = fn_def(
        Some("outer"),
        &["x"],
        Expression::FnExpr(Box::new(inner)),
        0,
    );
    let (source, errors) = emit(vec![Statement::FuncDef(outer)]);
    assert!(errors.is_empty());

    // Environment record predefined, populated at construction, and the
    // closure function takes the hidden env pointer.
    assert!(source.contains("typedef struct Env_f15 {"));
    assert!(source.contains("  Item x;"));
    assert!(source.contains("heap_calloc(sizeof(Env_f15), 0)"));
    assert!(source.contains("_closure_env->x = "));
    assert!(source.contains("to_closure_named(_f15,0,_closure_env,"));
    assert!(source.contains("Item _f15(void* _env_ptr)"));
    assert!(source.contains("Env_f15* _env = (Env_f15*)_env_ptr;"));
}

#[test]
fn test_capturing_tail_recursion_boxes_temporaries() {
    // fn outer(x) => { fn go(n, acc) => if n <= 0 then acc
    //                                   else go(n - 1, acc + x); go(10, 0) }
    // `go` both captures x and tail-recurses: its parameters are Item
    // slots, so the loop temporaries must box.
    let recursive = call(
        ident("go", 60),
        vec![
            binary(BinaryOperator::Sub, ident("n", 64), int(1, 68)),
            binary(BinaryOperator::Add, ident("acc", 71), ident("x", 77)),
        ],
        60,
    );
    let go_body = Expression::If(Box::new(IfExpression {
        condition: binary(BinaryOperator::Le, ident("n", 38), int(0, 43)),
        then_branch: ident("acc", 50),
        else_branch: Some(recursive),
        info: (),
        span: span(35),
    }));
    let go = fn_def(Some("go"), &["n", "acc"], go_body, 20);
    let outer_body = Expression::Content(ContentBlock {
        items: vec![
            Statement::FuncDef(go),
            Statement::Expression(call(ident("go", 85), vec![int(10, 88), int(0, 92)], 85)),
        ],
        info: (),
        span: span(15),
    });
    let outer = fn_def(Some("outer"), &["x"], outer_body, 0);

    let (source, errors) = emit(vec![Statement::FuncDef(outer)]);
    assert!(errors.is_empty());

    // Still a loop: entry label, no stack check on go.
    assert!(source.contains("Item _go20(void* _env_ptr,Item _n,Item _acc)"));
    assert!(source.contains(" _tco_start:;"));
    assert!(!source.contains("LAMBDA_STACK_CHECK(\"go\")"));

    // Temporaries carry Items, never raw scalars, and the unreached
    // placeholder matches the Item return.
    assert!(source.contains("Item _tco_tmp0 = fn_sub(_n,i2it(1)); "));
    assert!(source.contains("Item _tco_tmp1 = fn_add(_acc,_env->x); "));
    assert!(source.contains("_n = _tco_tmp0; _acc = _tco_tmp1; goto _tco_start; ITEM_NULL; })"));
    assert!(!source.contains("int32_t _tco_tmp"));
}

#[test]
fn test_captured_container_casts_to_pointer() {
    // fn outer() => { let a = [1,2,3]; fn inner() => a[0]; inner() }
    // `a` is a non-global local captured by inner; the typed accessor
    // needs the pointer shape back from the Item slot.
    let inner = fn_def(
        Some("inner"),
        &[],
        Expression::Index(Box::new(IndexExpression {
            object: ident("a", 52),
            index: int(0, 54),
            info: (),
            span: span(52),
        })),
        40,
    );
    let outer_body = Expression::Content(ContentBlock {
        items: vec![
            let_single("a", array(vec![int(1, 25), int(2, 27), int(3, 29)], 24), 20),
            Statement::FuncDef(inner),
            Statement::Expression(call(ident("inner", 60), Vec::new(), 60)),
        ],
        info: (),
        span: span(15),
    });
    let outer = fn_def(Some("outer"), &[], outer_body, 0);

    let (source, errors) = emit(vec![Statement::FuncDef(outer)]);
    assert!(errors.is_empty());

    // The environment stores the array as an Item; reads in accessor
    // position cast it back.
    assert!(source.contains("  Item a;"));
    assert!(source.contains("_closure_env->a = (Item)(_a);"));
    assert!(source.contains("array_int_get((ArrayInt*)_env->a,0)"));
}

#[test]
fn test_non_capturing_function_is_plain_pointer() {
    let def = fn_def(
        Some("twice"),
        &["n"],
        binary(BinaryOperator::Mul, ident("n", 15), int(2, 19)),
        0,
    );
    let (source, _) = emit(vec![
        Statement::FuncDef(def),
        Statement::Expression(ident("twice", 30)),
    ]);
    assert!(source.contains("to_fn_named(_twice0,1,\"twice\")"));
    assert!(!source.contains("to_closure_named(_twice0"));
}

#[test]
fn test_dynamic_call_through_let_variable() {
    // let add10 = make_adder(10); add10(5) — the callee is a variable, so
    // dispatch goes through fn_call1.
    let make_adder = fn_def(
        Some("make_adder"),
        &["n"],
        Expression::FnExpr(Box::new(fn_def(
            None,
            &["m"],
            binary(BinaryOperator::Add, ident("n", 40), ident("m", 44)),
            30,
        ))),
        0,
    );
    let (source, errors) = emit(vec![
        Statement::FuncDef(make_adder),
        let_single("add10", call(ident("make_adder", 60), vec![int(10, 72)], 60), 55),
        Statement::Expression(call(ident("add10", 80), vec![int(5, 86)], 80)),
    ]);
    assert!(errors.is_empty());
    assert!(source.contains("fn_call1((Function*)_add10,i2it(5))"));
}

#[test]
fn test_empty_collection_literals() {
    let (source, errors) = emit(vec![
        Statement::Expression(array(Vec::new(), 0)),
        Statement::Expression(Expression::List(ListLiteral {
            declarations: Vec::new(),
            items: Vec::new(),
            info: (),
            span: span(10),
        })),
        Statement::Expression(Expression::Map(MapLiteral {
            entries: Vec::new(),
            info: (),
            span: span(20),
        })),
    ]);
    assert!(errors.is_empty());
    // Empty literals lower to empty collections, not error sentinels.
    assert!(source.contains("array_fill(arr,0)"));
    assert!(source.contains("list_end(ls);"));
    assert!(source.contains("Map* m = map(0);m;"));
}

#[test]
fn test_modulo_routes_to_runtime() {
    let (source, _) = emit(vec![Statement::Expression(binary(
        BinaryOperator::Mod,
        int(7, 0),
        int(0, 4),
    ))]);
    // Division-by-zero reporting is centralized in the runtime helper.
    assert!(source.contains("fn_mod(i2it(7),i2it(0))"));
}

#[test]
fn test_int_fast_path_addition() {
    let (source, _) = emit(vec![Statement::Expression(binary(
        BinaryOperator::Add,
        int(1, 0),
        int(2, 4),
    ))]);
    assert!(source.contains("i2it((1+2))"));
    assert!(!source.contains("fn_add"));
}

#[test]
fn test_deterministic_emission() {
    let build = || {
        vec![
            let_single("x", int(1, 0), 0),
            Statement::FuncDef(fn_def(
                Some("f"),
                &["a"],
                binary(BinaryOperator::Mul, ident("a", 20), ident("x", 24)),
                10,
            )),
            Statement::Expression(call(ident("f", 30), vec![int(3, 33)], 30)),
        ]
    };
    let (first, _) = emit(build());
    let (second, _) = emit(build());
    assert_eq_pretty!(first, second);
}

#[test]
fn test_module_import_emission() {
    let mut modules = Modules::new();

    // Module: pub fn double(n) => n * 2
    let mut exported = fn_def(
        Some("double"),
        &["n"],
        binary(BinaryOperator::Mul, ident("n", 20), int(2, 24)),
        0,
    );
    exported.is_public = true;
    modules.check_and_add(
        "lib/math.ls",
        Ast::from_statements(vec![Statement::FuncDef(exported)]),
    );

    // Importer: import m: 'lib/math.ls'; m.double(21)
    let importer = Ast::from_statements(vec![
        Statement::Import(Import {
            alias: "m".into(),
            module: "lib/math.ls".into(),
            is_relative: false,
            script: None,
            span: span(0),
        }),
        Statement::Expression(call(ident("m.double", 30), vec![int(21, 39)], 30)),
    ]);
    let index = modules.check_and_add("main.ls", importer);
    let script = modules.by_index(index).unwrap();
    assert!(script.errors.is_empty(), "errors: {:?}", script.errors);

    let output = transpile(script, &modules);
    assert!(output.errors.is_empty());
    // Import struct plus the prefixed reference.
    assert!(output.source.contains("struct Mod0 {"));
    assert!(output.source.contains("} m0;"));
    assert!(output.source.contains("m0._double0(i2it(21))"));
}

#[test]
fn test_entry_function_shape() {
    let (source, _) = emit(vec![
        let_single("x", int(41, 0), 0),
        Statement::Expression(binary(BinaryOperator::Add, ident("x", 10), int(1, 14))),
    ]);

    // Globals get storage declarations before functions and assignments
    // inside the entry function.
    assert!(source.contains("int32_t _x;\n"));
    assert!(source.contains("Item main(Context *runtime) {"));
    assert!(source.contains(" _lambda_rt = runtime;"));
    assert!(source.contains("_x=41;"));
    assert!(source.contains(" return result;\n}\n"));
}

#[test]
fn test_main_procedure_dispatch() {
    let body = Expression::Content(ContentBlock {
        items: vec![Statement::Return(ReturnStatement {
            value: Some(int(7, 20)),
            span: span(15),
        })],
        info: (),
        span: span(10),
    });
    let mut def = fn_def(Some("main"), &[], body, 0);
    def.kind = FuncKind::Procedure;

    let (source, errors) = emit(vec![Statement::FuncDef(def)]);
    assert!(errors.is_empty());
    assert!(source.contains("if (rt->run_main) result = _main0();"));
}

#[test]
fn test_procedure_with_while_loop() {
    // pn count() { var i = 0; while i < 3 { i = i + 1 }; return i }
    let body = Expression::Content(ContentBlock {
        items: vec![
            Statement::Var(LetStatement {
                declarations: vec![Declaration::Single(VariableDeclaration {
                    name: "i".into(),
                    value: int(0, 15),
                    info: (),
                    span: span(11),
                })],
                span: span(11),
            }),
            Statement::While(WhileStatement {
                condition: binary(BinaryOperator::Lt, ident("i", 24), int(3, 28)),
                body: ContentBlock {
                    items: vec![Statement::Assign(AssignStatement {
                        target: "i".into(),
                        binding: None,
                        value: binary(BinaryOperator::Add, ident("i", 36), int(1, 40)),
                        span: span(32),
                    })],
                    info: (),
                    span: span(30),
                },
                span: span(20),
            }),
            Statement::Return(ReturnStatement {
                value: Some(ident("i", 50)),
                span: span(44),
            }),
        ],
        info: (),
        span: span(10),
    });
    let mut def = fn_def(Some("count"), &[], body, 0);
    def.kind = FuncKind::Procedure;

    let (source, errors) = emit(vec![Statement::FuncDef(def)]);
    assert!(errors.is_empty());
    assert!(source.contains("int32_t _i=0;"));
    assert!(source.contains("while (fn_lt(i2it(_i),i2it(3)))"));
    assert!(source.contains("_i=(_i+1);"));
    assert!(source.contains("return i2it(_i);"));
}

#[test]
fn test_decomposition_lowering() {
    // let a, b = [1, 2]
    let stm = Statement::Let(LetStatement {
        declarations: vec![Declaration::Decompose(Decomposition {
            names: vec!["a".into(), "b".into()],
            is_named: false,
            value: array(vec![int(1, 10), int(2, 13)], 9),
            info: (),
            span: span(0),
        })],
        span: span(0),
    });
    let (source, errors) = emit(vec![stm, Statement::Expression(ident("b", 20))]);
    assert!(errors.is_empty());
    // Each name becomes an Item pulled out by position.
    assert!(source.contains("Item _a;"));
    assert!(source.contains("Item _b;"));
    assert!(source.contains("_a=item_at(_dec_src,0);"));
    assert!(source.contains("_b=item_at(_dec_src,1);"));
}

#[test]
fn test_function_name_map() {
    let def = fn_def(Some("fact"), &["n"], ident("n", 15), 3);
    let anon = let_single(
        "helper",
        Expression::FnExpr(Box::new(fn_def(None, &[], int(1, 40), 30))),
        25,
    );
    let script = check_script(
        "names.ls",
        Ast::from_statements(vec![Statement::FuncDef(def), anon]),
    );
    let output = transpile_script(&script);

    assert_eq!(output.func_names.get("_fact3").map(String::as_str), Some("fact"));
    // Anonymous functions adopt their assignment name for stack traces.
    assert_eq!(
        output.func_names.get("_f30").map(String::as_str),
        Some("helper")
    );
}
