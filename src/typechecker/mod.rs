//! Type checker for Lambda scripts.
//!
//! A bottom-up pass over the untyped AST that assigns a type to every
//! expression, resolves names, records closure captures and interns
//! constants, composite types and patterns. Checker methods always succeed
//! structurally: defects accumulate on the context and the offending node
//! comes back typed `Error` (or `Any` where inference merely gave up), so a
//! single pass reports as many problems as possible.

pub mod captures;
pub mod context;
pub mod error;
pub mod scope;
pub mod sysfunc;
pub mod types;

use std::collections::HashMap;
use std::rc::Rc;

use log::debug;

use crate::ast::*;
use crate::pattern;
use crate::syntax::Span;
use crate::value::{ConstValue, TypeId};

pub use self::captures::{Binding, Capture, FuncKind, FuncMeta};
pub use self::context::{CheckOptions, Context};
pub use self::error::{
    ImportError, LambdaError, NameError, OverflowError, PatternError, ShapeError, SyntaxReject,
    TypeError,
};
pub use self::types::{Coercion, ElementShape, FuncSignature, MapShape, ParamSig, Type};

/// Pattern index sentinel for definitions that failed to compile.
pub const PATTERN_UNRESOLVED: u32 = u32::MAX;

/// Annotation attached to every checked node.
#[derive(Clone, Debug, PartialEq)]
pub struct TypeInfo {
    pub ty: Type,
    pub is_literal: bool,
    /// Constants-table slot for literal values that have one.
    pub const_index: Option<u32>,
    /// Script type-list slot for map/element shapes and type values.
    pub type_index: Option<u32>,
}

impl TypeInfo {
    pub fn of(ty: Type) -> TypeInfo {
        TypeInfo {
            ty,
            is_literal: false,
            const_index: None,
            type_index: None,
        }
    }

    pub fn literal(ty: Type, const_index: Option<u32>) -> TypeInfo {
        TypeInfo {
            ty,
            is_literal: true,
            const_index,
            type_index: None,
        }
    }

    pub fn any() -> TypeInfo {
        TypeInfo::of(Type::Any)
    }

    pub fn type_id(&self) -> TypeId {
        self.ty.type_id()
    }
}

/// Exported symbols of an already-checked script, as seen by an importer.
#[derive(Clone, Debug, Default)]
pub struct ModuleExports {
    pub index: usize,
    pub symbols: Vec<(String, Binding)>,
}

/// Module resolution hook; the loader implements this over its script
/// registry. `()` resolves nothing, which is fine for single scripts.
pub trait ModuleResolver {
    fn resolve_module(&self, path: &str) -> Option<ModuleExports>;
}

impl ModuleResolver for () {
    fn resolve_module(&self, _path: &str) -> Option<ModuleExports> {
        None
    }
}

/// Result of checking one script.
#[derive(Debug)]
pub struct CheckOutput {
    pub ast: Ast<TypeInfo>,
    pub context: Context,
}

impl CheckOutput {
    pub fn errors(&self) -> &[LambdaError] {
        &self.context.errors
    }
}

pub struct Typechecker<'m> {
    ctx: Context,
    modules: &'m dyn ModuleResolver,
    /// Metas created by the shallow pass, keyed by definition start byte.
    predeclared: HashMap<usize, Rc<FuncMeta>>,
}

impl<'m> Typechecker<'m> {
    pub fn new(modules: &'m dyn ModuleResolver) -> Typechecker<'m> {
        Typechecker {
            ctx: Context::new(),
            modules,
            predeclared: HashMap::new(),
        }
    }

    pub fn with_options(modules: &'m dyn ModuleResolver, options: CheckOptions) -> Typechecker<'m> {
        let mut checker = Typechecker::new(modules);
        checker.ctx.options = options;
        checker
    }

    /// Check a whole script. Imports and function signatures are collected
    /// first so later statements can reference them out of order.
    pub fn check(mut self, ast: Ast<()>) -> CheckOutput {
        let statements = ast.into_nodes();

        for statement in &statements {
            self.shallow_declare(statement);
        }

        let mut checked = Vec::with_capacity(statements.len());
        for statement in statements {
            checked.push(self.check_statement(statement, true));
        }

        CheckOutput {
            ast: Ast::from_statements(checked),
            context: self.ctx,
        }
    }

    /// First pass over top-level statements: imports and function
    /// signatures, so forward references resolve.
    fn shallow_declare(&mut self, statement: &Statement<()>) {
        match statement {
            Statement::Import(import) => self.declare_import(import),
            Statement::FuncDef(def) => {
                let meta = self.make_meta(def);
                self.predeclared.insert(def.span.start, meta.clone());
                if let Some(name) = &def.name {
                    let binding = Binding::Func { meta, module: None };
                    if let Err(err) = self.ctx.scope.declare(name.clone(), binding) {
                        self.ctx.error(LambdaError::Name(err, def.span));
                    }
                }
            }
            _ => {}
        }
    }

    fn declare_import(&mut self, import: &Import) {
        match self.modules.resolve_module(&import.module) {
            Some(exports) => {
                for (name, binding) in exports.symbols {
                    let qualified = format!("{}.{}", import.alias, name);
                    let binding = with_module(binding, exports.index);
                    if let Err(err) = self.ctx.scope.declare(qualified, binding) {
                        self.ctx.error(LambdaError::Name(err, import.span));
                    }
                }
            }
            None => self.ctx.error(LambdaError::Import(
                ImportError {
                    module: import.module.clone(),
                },
                import.span,
            )),
        }
    }

    fn make_meta(&mut self, def: &FuncDef<()>) -> Rc<FuncMeta> {
        let signature = self.build_signature(def);
        Rc::new(FuncMeta::new(
            def.name.clone(),
            def.kind,
            signature,
            def.span,
        ))
    }

    fn build_signature(&mut self, def: &FuncDef<()>) -> Rc<FuncSignature> {
        let params = def
            .params
            .iter()
            .map(|p| ParamSig {
                name: p.name.clone(),
                ty: p.declared.clone().unwrap_or(Type::Any),
                is_optional: p.is_optional,
                has_default: p.default.is_some(),
            })
            .collect();
        Rc::new(FuncSignature {
            params,
            returned: def.return_type.clone().unwrap_or(Type::Any),
            is_variadic: def.is_variadic,
            is_public: def.is_public,
            is_anonymous: def.name.is_none(),
        })
    }

    // ---- statements ----

    fn check_statement(&mut self, statement: Statement<()>, top_level: bool) -> Statement<TypeInfo> {
        match statement {
            Statement::Let(stm) => Statement::Let(self.check_let(stm, false, top_level)),
            Statement::Pub(stm) => Statement::Pub(self.check_let(stm, false, top_level)),
            Statement::Var(stm) => {
                self.require_proc_scope("var statement", stm.span);
                Statement::Var(self.check_let(stm, true, top_level))
            }
            Statement::Assign(stm) => Statement::Assign(self.check_assign(stm)),
            Statement::If(stm) => Statement::If(self.check_if_statement(stm)),
            Statement::While(stm) => {
                self.require_proc_scope("while statement", stm.span);
                Statement::While(WhileStatement {
                    condition: self.check_expression(stm.condition),
                    body: self.check_content(stm.body, true),
                    span: stm.span,
                })
            }
            Statement::For(stm) => Statement::For(self.check_for(stm)),
            Statement::Break(span) => {
                self.require_proc_scope("break", span);
                Statement::Break(span)
            }
            Statement::Continue(span) => {
                self.require_proc_scope("continue", span);
                Statement::Continue(span)
            }
            Statement::Return(stm) => {
                self.require_proc_scope("return", stm.span);
                Statement::Return(ReturnStatement {
                    value: stm.value.map(|value| self.check_expression(value)),
                    span: stm.span,
                })
            }
            Statement::FuncDef(def) => Statement::FuncDef(self.check_fn_def(def, true)),
            Statement::PatternDef(def) => Statement::PatternDef(self.check_pattern_def(def)),
            Statement::Import(mut import) => {
                // Symbols were declared during the shallow pass at top
                // level; nested imports resolve here. Either way the node
                // records the exporter's index for emission.
                if !top_level {
                    self.declare_import(&import);
                }
                import.script = self
                    .modules
                    .resolve_module(&import.module)
                    .map(|exports| exports.index);
                Statement::Import(import)
            }
            Statement::Expression(expr) => Statement::Expression(self.check_expression(expr)),
        }
    }

    fn require_proc_scope(&mut self, what: &str, span: Span) {
        if !self.ctx.scope.in_proc_scope() {
            self.ctx.error(LambdaError::Type(
                TypeError::IllegalStatement { what: what.into() },
                span,
            ));
        }
    }

    fn check_let(
        &mut self,
        stm: LetStatement<()>,
        mutable: bool,
        top_level: bool,
    ) -> LetStatement<TypeInfo> {
        let declarations = stm
            .declarations
            .into_iter()
            .map(|decl| self.check_declaration(decl, mutable, top_level))
            .collect();
        LetStatement {
            declarations,
            span: stm.span,
        }
    }

    fn check_declaration(
        &mut self,
        decl: Declaration<()>,
        mutable: bool,
        top_level: bool,
    ) -> Declaration<TypeInfo> {
        match decl {
            Declaration::Single(decl) => {
                let value = self.check_expression(decl.value);
                self.adopt_display_name(&value, &decl.name);
                let ty = value.info().ty.clone();
                let binding = match &value {
                    // A let bound directly to a non-capturing function keeps
                    // its function binding so calls stay direct. Capturing
                    // closures stay dynamic: the closure value owns its
                    // environment.
                    Expression::FnExpr(def) if !def.meta().has_captures() => Binding::Func {
                        meta: def.meta().clone(),
                        module: None,
                    },
                    _ => Binding::Local {
                        name: decl.name.clone(),
                        ty: ty.clone(),
                        mutable,
                        global: top_level,
                        module: None,
                    },
                };
                if let Err(err) = self.ctx.scope.declare(decl.name.clone(), binding) {
                    self.ctx.error(LambdaError::Name(err, decl.span));
                }
                Declaration::Single(VariableDeclaration {
                    name: decl.name,
                    value,
                    info: TypeInfo::of(ty),
                    span: decl.span,
                })
            }
            Declaration::Decompose(decl) => {
                let value = self.check_expression(decl.value);
                for name in &decl.names {
                    let binding = Binding::Local {
                        name: name.clone(),
                        ty: Type::Any,
                        mutable,
                        global: top_level,
                        module: None,
                    };
                    if let Err(err) = self.ctx.scope.declare(name.clone(), binding) {
                        self.ctx.error(LambdaError::Name(err, decl.span));
                    }
                }
                Declaration::Decompose(Decomposition {
                    names: decl.names,
                    is_named: decl.is_named,
                    value,
                    info: TypeInfo::any(),
                    span: decl.span,
                })
            }
        }
    }

    /// Anonymous functions adopt the name they are being assigned to for
    /// stack traces.
    fn adopt_display_name(&mut self, value: &Expression<TypeInfo>, name: &str) {
        if let Expression::FnExpr(def) = value {
            let meta = def.meta();
            if meta.name.is_none() {
                *meta.display_name.borrow_mut() = name.to_string();
            }
        }
    }

    fn check_assign(&mut self, stm: AssignStatement<()>) -> AssignStatement<TypeInfo> {
        self.require_proc_scope("assignment", stm.span);
        let binding = self.ctx.resolve(&stm.target);
        match &binding {
            Some(Binding::Local { mutable: true, .. }) => {}
            Some(_) => self.ctx.error(LambdaError::Type(
                TypeError::IllegalStatement {
                    what: format!("assignment to immutable '{}'", stm.target),
                },
                stm.span,
            )),
            None => self.ctx.error(LambdaError::Name(
                NameError::Undefined {
                    name: stm.target.clone(),
                },
                stm.span,
            )),
        }
        AssignStatement {
            target: stm.target,
            binding,
            value: self.check_expression(stm.value),
            span: stm.span,
        }
    }

    fn check_if_statement(&mut self, stm: IfStatement<()>) -> IfStatement<TypeInfo> {
        IfStatement {
            condition: self.check_expression(stm.condition),
            then_branch: self.check_content(stm.then_branch, true),
            else_branch: stm.else_branch.map(|branch| match branch {
                ElseBranch::Block(block) => ElseBranch::Block(self.check_content(block, true)),
                ElseBranch::ElseIf(nested) => {
                    ElseBranch::ElseIf(Box::new(self.check_if_statement(*nested)))
                }
            }),
            span: stm.span,
        }
    }

    fn check_content(&mut self, block: ContentBlock<()>, is_proc: bool) -> ContentBlock<TypeInfo> {
        self.ctx.scope.enter_scope(is_proc);
        let items = block
            .items
            .into_iter()
            .map(|item| self.check_statement(item, false))
            .collect();
        self.ctx.scope.exit_scope();
        ContentBlock {
            items,
            info: TypeInfo::of(Type::List),
            span: block.span,
        }
    }

    // ---- expressions ----

    pub fn check_expression(&mut self, expr: Expression<()>) -> Expression<TypeInfo> {
        self.ctx.depth += 1;
        if self.ctx.depth > self.ctx.options.structure_depth_limit {
            let span = expr.span();
            self.ctx.error(LambdaError::Overflow(
                OverflowError {
                    what: "expression nesting".into(),
                    limit: self.ctx.options.structure_depth_limit,
                },
                span,
            ));
            self.ctx.depth -= 1;
            return Expression::SyntaxError(CurrentRef {
                info: TypeInfo::of(Type::Error),
                span,
            });
        }

        let checked = match expr {
            Expression::Literal(lit) => self.check_literal(lit),
            Expression::Ident(ident) => self.check_ident(ident),
            Expression::Parens(inner) => {
                Expression::Parens(Box::new(self.check_expression(*inner)))
            }
            Expression::Unary(unary) => self.check_unary(*unary),
            Expression::Binary(binary) => self.check_binary(*binary),
            Expression::Pipe(pipe) => self.check_pipe(*pipe),
            Expression::CurrentItem(node) => Expression::CurrentItem(CurrentRef {
                info: TypeInfo::any(),
                span: node.span,
            }),
            Expression::CurrentIndex(node) => Expression::CurrentIndex(CurrentRef {
                info: TypeInfo::any(),
                span: node.span,
            }),
            Expression::Member(member) => self.check_member(*member),
            Expression::Index(index) => self.check_index(*index),
            Expression::Path(path) => self.check_path(path),
            Expression::PathIndex(pix) => self.check_path_index(*pix),
            Expression::Array(array) => self.check_array(array),
            Expression::List(list) => self.check_list(list),
            Expression::Content(block) => Expression::Content(self.check_content(block, false)),
            Expression::Map(map) => self.check_map(map),
            Expression::Element(element) => self.check_element(*element),
            Expression::If(ife) => self.check_if_expression(*ife),
            Expression::For(fore) => Expression::For(Box::new(self.check_for(*fore))),
            Expression::FnExpr(def) => {
                let def = self.check_fn_def(*def, false);
                Expression::FnExpr(Box::new(def))
            }
            Expression::Call(call) => self.check_call(*call),
            Expression::TypeLiteral(lit) => self.check_type_literal(lit),
            Expression::SyntaxError(node) => {
                self.ctx.error(LambdaError::SyntaxReject(
                    SyntaxReject {
                        symbol: "ERROR".into(),
                    },
                    node.span,
                ));
                Expression::SyntaxError(CurrentRef {
                    info: TypeInfo::of(Type::Error),
                    span: node.span,
                })
            }
        };
        self.ctx.depth -= 1;
        checked
    }

    fn check_literal(&mut self, lit: Literal<()>) -> Expression<TypeInfo> {
        let info = match &lit.value {
            LitValue::Null => TypeInfo::literal(Type::Null, None),
            LitValue::Bool(_) => TypeInfo::literal(Type::Bool, None),
            LitValue::Int(_) => TypeInfo::literal(Type::Int, None),
            LitValue::Int64(v) => {
                let index = self.ctx.intern_const(ConstValue::Int64(*v));
                TypeInfo::literal(Type::Int64, Some(index))
            }
            LitValue::Float(v) => {
                let index = self.ctx.intern_const(ConstValue::Float(*v));
                TypeInfo::literal(Type::Float, Some(index))
            }
            LitValue::Decimal(v) => {
                let index = self.ctx.intern_const(ConstValue::Decimal(*v));
                TypeInfo::literal(Type::Decimal, Some(index))
            }
            LitValue::Str(v) => {
                let index = self.ctx.intern_const(ConstValue::String(v.clone()));
                TypeInfo::literal(Type::String, Some(index))
            }
            LitValue::Symbol(v) => {
                let index = self.ctx.intern_const(ConstValue::Symbol(v.clone()));
                TypeInfo::literal(Type::Symbol, Some(index))
            }
            LitValue::Binary(v) => {
                let index = self.ctx.intern_const(ConstValue::Binary(v.clone()));
                TypeInfo::literal(Type::Binary, Some(index))
            }
            LitValue::DateTime(v) => {
                let index = self.ctx.intern_const(ConstValue::DateTime(v.clone()));
                TypeInfo::literal(Type::DateTime, Some(index))
            }
        };
        Expression::Literal(Literal {
            value: lit.value,
            info,
            span: lit.span,
        })
    }

    fn check_ident(&mut self, ident: Ident<()>) -> Expression<TypeInfo> {
        let target = self
            .ctx
            .resolve(&ident.name)
            .or_else(|| sysfunc::lookup(&ident.name).map(Binding::System));

        let info = match &target {
            Some(Binding::Pattern { index, name }) if *index == PATTERN_UNRESOLVED => {
                self.ctx.error(LambdaError::Pattern(
                    PatternError::Unresolved { name: name.clone() },
                    ident.span,
                ));
                TypeInfo::of(Type::Error)
            }
            Some(binding) => TypeInfo::of(binding.ty()),
            None => {
                self.ctx.error(LambdaError::Name(
                    NameError::Undefined {
                        name: ident.name.clone(),
                    },
                    ident.span,
                ));
                TypeInfo::of(Type::Error)
            }
        };

        Expression::Ident(Ident {
            name: ident.name,
            target,
            info,
            span: ident.span,
        })
    }

    fn check_unary(&mut self, unary: UnaryExpression<()>) -> Expression<TypeInfo> {
        let operand = self.check_expression(unary.operand);
        let operand_ty = &operand.info().ty;
        let ty = match unary.op {
            UnaryOperator::Not => Type::Bool,
            UnaryOperator::Pos | UnaryOperator::Neg => {
                if operand_ty.is_numeric() {
                    operand_ty.clone()
                } else {
                    Type::Any
                }
            }
        };
        Expression::Unary(Box::new(UnaryExpression {
            op: unary.op,
            operand,
            info: TypeInfo::of(ty),
            span: unary.span,
        }))
    }

    fn check_binary(&mut self, binary: BinaryExpression<()>) -> Expression<TypeInfo> {
        let left = self.check_expression(binary.left);
        let right = self.check_expression(binary.right);
        let lt = left.info().ty.clone();
        let rt = right.info().ty.clone();

        use BinaryOperator::*;
        let mut type_index = None;
        let ty = match binary.op {
            Add | Sub | Mul => Type::numeric_join(&lt, &rt).unwrap_or(Type::Any),
            Div => {
                if lt.is_numeric() && rt.is_numeric() {
                    Type::Float
                } else {
                    Type::Any
                }
            }
            IntDiv | Mod | Pow => {
                if lt.is_numeric() && rt.is_numeric() {
                    Type::Number
                } else {
                    Type::Any
                }
            }
            Eq | Ne | Lt | Le | Gt | Ge | And | Or | Is | In => Type::Bool,
            To => {
                if lt.is_numeric() && rt.is_numeric() {
                    Type::Range
                } else {
                    Type::Any
                }
            }
            Join => Type::Any,
            Union | Intersect => match (&lt, &rt) {
                (Type::TypeValue(_), Type::TypeValue(_)) => {
                    let combined = Type::TypeValue(Box::new(Type::Any));
                    type_index = Some(self.ctx.intern_type(combined.clone()));
                    combined
                }
                _ => Type::Any,
            },
        };

        Expression::Binary(Box::new(BinaryExpression {
            op: binary.op,
            left,
            right,
            info: TypeInfo {
                ty,
                is_literal: false,
                const_index: None,
                type_index,
            },
            span: binary.span,
        }))
    }

    fn check_pipe(&mut self, pipe: PipeExpression<()>) -> Expression<TypeInfo> {
        let left = self.check_expression(pipe.left);
        let right = self.check_expression(pipe.right);

        // `where` always filters; `|` auto-maps only when the right side
        // references the current item or index.
        let ty = match pipe.op {
            PipeOperator::Where => Type::Array(Box::new(Type::Any)),
            PipeOperator::Pipe => {
                if has_current_ref(&right) {
                    Type::Array(Box::new(Type::Any))
                } else {
                    Type::Any
                }
            }
        };

        Expression::Pipe(Box::new(PipeExpression {
            op: pipe.op,
            left,
            right,
            info: TypeInfo::of(ty),
            span: pipe.span,
        }))
    }

    fn check_member(&mut self, member: MemberExpression<()>) -> Expression<TypeInfo> {
        let object = self.check_expression(member.object);
        let field = match member.field {
            MemberField::Name(name, span) => MemberField::Name(name, span),
            MemberField::Expr(expr) => MemberField::Expr(self.check_expression(expr)),
        };

        let ty = match (&object.info().ty, &field) {
            (Type::Map(shape), MemberField::Name(name, _)) => shape
                .fields
                .iter()
                .find(|(field_name, _)| field_name == name)
                .map(|(_, ty)| ty.clone())
                .unwrap_or(Type::Any),
            (Type::Element(shape), MemberField::Name(name, _)) => shape
                .attrs
                .iter()
                .find(|(attr, _)| attr == name)
                .map(|(_, ty)| ty.clone())
                .unwrap_or(Type::Any),
            _ => Type::Any,
        };

        // Field names intern like string literals so emission can reference
        // them through the constants table.
        if let MemberField::Name(name, _) = &field {
            self.ctx.intern_const(ConstValue::String(name.clone()));
        }

        Expression::Member(Box::new(MemberExpression {
            object,
            field,
            info: TypeInfo::of(ty),
            span: member.span,
        }))
    }

    fn check_index(&mut self, index: IndexExpression<()>) -> Expression<TypeInfo> {
        let object = self.check_expression(index.object);
        let key = self.check_expression(index.index);

        let ty = match (&object.info().ty, &key.info().ty) {
            (Type::Array(elem), k) if k.is_numeric() => (**elem).clone(),
            (Type::Range, k) if k.is_numeric() => Type::Int,
            (Type::List, k) if k.is_numeric() => Type::Any,
            _ => Type::Any,
        };

        Expression::Index(Box::new(IndexExpression {
            object,
            index: key,
            info: TypeInfo::of(ty),
            span: index.span,
        }))
    }

    fn check_path(&mut self, path: PathExpression<()>) -> Expression<TypeInfo> {
        let text = path_text(&path.scheme, &path.segments);
        let index = self.ctx.intern_const(ConstValue::String(text));
        Expression::Path(PathExpression {
            scheme: path.scheme,
            segments: path.segments,
            info: TypeInfo {
                ty: Type::Any,
                is_literal: false,
                const_index: Some(index),
                type_index: None,
            },
            span: path.span,
        })
    }

    fn check_path_index(&mut self, pix: PathIndexExpression<()>) -> Expression<TypeInfo> {
        Expression::PathIndex(Box::new(PathIndexExpression {
            base: self.check_expression(pix.base),
            segment: self.check_expression(pix.segment),
            info: TypeInfo::any(),
            span: pix.span,
        }))
    }

    fn check_array(&mut self, array: ArrayLiteral<()>) -> Expression<TypeInfo> {
        let items: Vec<_> = array
            .items
            .into_iter()
            .map(|item| self.check_expression(item))
            .collect();

        // Specialize to an unboxed element representation only when every
        // item is the same scalar numeric type.
        let elem = match items.split_first() {
            Some((first, rest)) => {
                let first_ty = first.info().ty.clone();
                let uniform = matches!(first_ty, Type::Int | Type::Int64 | Type::Float)
                    && rest.iter().all(|item| item.info().ty == first_ty);
                if uniform {
                    first_ty
                } else {
                    Type::Any
                }
            }
            None => Type::Any,
        };

        Expression::Array(ArrayLiteral {
            items,
            info: TypeInfo::of(Type::Array(Box::new(elem))),
            span: array.span,
        })
    }

    fn check_list(&mut self, list: ListLiteral<()>) -> Expression<TypeInfo> {
        self.ctx.scope.enter_scope(false);
        let declarations = list
            .declarations
            .into_iter()
            .map(|stm| self.check_let(stm, false, false))
            .collect();
        let items = list
            .items
            .into_iter()
            .map(|item| self.check_expression(item))
            .collect();
        self.ctx.scope.exit_scope();

        Expression::List(ListLiteral {
            declarations,
            items,
            info: TypeInfo::of(Type::List),
            span: list.span,
        })
    }

    fn check_map(&mut self, map: MapLiteral<()>) -> Expression<TypeInfo> {
        let entries: Vec<_> = map
            .entries
            .into_iter()
            .map(|entry| MapEntry {
                key: match entry.key {
                    MapKey::Name(name) => {
                        self.ctx.intern_const(ConstValue::String(name.clone()));
                        MapKey::Name(name)
                    }
                    MapKey::Expr(expr) => MapKey::Expr(self.check_expression(expr)),
                },
                value: self.check_expression(entry.value),
                span: entry.span,
            })
            .collect();

        let fields = entries
            .iter()
            .filter_map(|entry| match &entry.key {
                MapKey::Name(name) => Some((name.clone(), entry.value.info().ty.clone())),
                MapKey::Expr(_) => None,
            })
            .collect();
        let shape = Rc::new(MapShape { fields });
        let ty = Type::Map(shape);
        let type_index = self.ctx.intern_type(ty.clone());

        Expression::Map(MapLiteral {
            entries,
            info: TypeInfo {
                ty,
                is_literal: false,
                const_index: None,
                type_index: Some(type_index),
            },
            span: map.span,
        })
    }

    fn check_element(&mut self, element: ElementLiteral<()>) -> Expression<TypeInfo> {
        let attrs: Vec<_> = element
            .attrs
            .into_iter()
            .map(|entry| MapEntry {
                key: match entry.key {
                    MapKey::Name(name) => {
                        self.ctx.intern_const(ConstValue::String(name.clone()));
                        MapKey::Name(name)
                    }
                    MapKey::Expr(expr) => MapKey::Expr(self.check_expression(expr)),
                },
                value: self.check_expression(entry.value),
                span: entry.span,
            })
            .collect();
        let content: Vec<_> = element
            .content
            .into_iter()
            .map(|item| self.check_expression(item))
            .collect();

        let shape = Rc::new(ElementShape {
            tag: element.tag.clone(),
            attrs: attrs
                .iter()
                .filter_map(|entry| match &entry.key {
                    MapKey::Name(name) => Some((name.clone(), entry.value.info().ty.clone())),
                    MapKey::Expr(_) => None,
                })
                .collect(),
            content_length: content.len(),
        });
        let ty = Type::Element(shape);
        let type_index = self.ctx.intern_type(ty.clone());

        Expression::Element(Box::new(ElementLiteral {
            tag: element.tag,
            attrs,
            content,
            info: TypeInfo {
                ty,
                is_literal: false,
                const_index: None,
                type_index: Some(type_index),
            },
            span: element.span,
        }))
    }

    fn check_if_expression(&mut self, ife: IfExpression<()>) -> Expression<TypeInfo> {
        let condition = self.check_expression(ife.condition);
        let then_branch = self.check_expression(ife.then_branch);
        let else_branch = ife.else_branch.map(|e| self.check_expression(e));

        let then_ty = then_branch.info().ty.clone();
        let ty = match &else_branch {
            Some(else_branch) if else_branch.info().ty == then_ty => then_ty,
            // Branch types disagree (or there is no else): both branches box.
            _ => Type::Any,
        };

        Expression::If(Box::new(IfExpression {
            condition,
            then_branch,
            else_branch,
            info: TypeInfo::of(ty),
            span: ife.span,
        }))
    }

    fn check_for(&mut self, fore: ForExpression<()>) -> ForExpression<TypeInfo> {
        self.ctx.scope.enter_scope(self.ctx.scope.in_proc_scope());

        let loops: Vec<_> = fore
            .loops
            .into_iter()
            .map(|binding| self.check_loop_binding(binding))
            .collect();

        let lets: Vec<_> = fore
            .lets
            .into_iter()
            .map(|decl| {
                match self.check_declaration(Declaration::Single(decl), false, false) {
                    Declaration::Single(decl) => decl,
                    Declaration::Decompose(_) => unreachable!("for-let is always single"),
                }
            })
            .collect();

        let where_clause = fore.where_clause.map(|e| self.check_expression(e));

        let group = fore.group.map(|group| {
            let clause = GroupClause {
                keys: group
                    .keys
                    .into_iter()
                    .map(|key| self.check_expression(key))
                    .collect(),
                alias: group.alias.clone(),
                span: group.span,
            };
            if let Some(alias) = &group.alias {
                let binding = Binding::Local {
                    name: alias.clone(),
                    ty: Type::Any,
                    mutable: false,
                    global: false,
                    module: None,
                };
                if let Err(err) = self.ctx.scope.declare(alias.clone(), binding) {
                    self.ctx.error(LambdaError::Name(err, group.span));
                }
            }
            clause
        });

        let order = fore
            .order
            .into_iter()
            .map(|spec| OrderSpec {
                key: self.check_expression(spec.key),
                descending: spec.descending,
                span: spec.span,
            })
            .collect();
        let limit = fore.limit.map(|e| self.check_expression(e));
        let offset = fore.offset.map(|e| self.check_expression(e));

        let body = self.check_expression(fore.body);
        self.ctx.scope.exit_scope();

        ForExpression {
            loops,
            lets,
            where_clause,
            group,
            order,
            limit,
            offset,
            body,
            info: TypeInfo::of(Type::Array(Box::new(Type::Any))),
            span: fore.span,
        }
    }

    fn check_loop_binding(&mut self, binding: LoopBinding<()>) -> LoopBinding<TypeInfo> {
        let source = self.check_expression(binding.source);
        let source_ty = source.info().ty.clone();

        let (item_ty, index_ty) = if binding.is_named {
            // `at` iteration: single-variable form binds the key name,
            // two-variable form binds key and value.
            if binding.index_name.is_some() {
                (Type::Any, Type::String)
            } else {
                (Type::String, Type::Any)
            }
        } else {
            let item = match &source_ty {
                Type::Array(elem) => (**elem).clone(),
                Type::Range => Type::Int,
                _ => Type::Any,
            };
            (item, Type::Int64)
        };

        if let Some(index_name) = &binding.index_name {
            let index_binding = Binding::Local {
                name: index_name.clone(),
                ty: index_ty,
                mutable: false,
                global: false,
                module: None,
            };
            if let Err(err) = self.ctx.scope.declare(index_name.clone(), index_binding) {
                self.ctx.error(LambdaError::Name(err, binding.span));
            }
        }
        let item_binding = Binding::Local {
            name: binding.name.clone(),
            ty: item_ty.clone(),
            mutable: false,
            global: false,
            module: None,
        };
        if let Err(err) = self.ctx.scope.declare(binding.name.clone(), item_binding) {
            self.ctx.error(LambdaError::Name(err, binding.span));
        }

        LoopBinding {
            name: binding.name,
            index_name: binding.index_name,
            is_named: binding.is_named,
            source,
            info: TypeInfo::of(item_ty),
            span: binding.span,
        }
    }

    fn check_fn_def(&mut self, def: FuncDef<()>, declare_name: bool) -> FuncDef<TypeInfo> {
        let meta = self
            .predeclared
            .get(&def.span.start)
            .cloned()
            .unwrap_or_else(|| self.make_meta(&def));
        debug!("checking function {}", meta.mangled);

        // Named nested functions declare before their body so recursion
        // resolves; top-level names were declared by the shallow pass.
        if declare_name && !self.predeclared.contains_key(&def.span.start) {
            if let Some(name) = &def.name {
                let binding = Binding::Func {
                    meta: meta.clone(),
                    module: None,
                };
                if let Err(err) = self.ctx.scope.declare(name.clone(), binding) {
                    self.ctx.error(LambdaError::Name(err, def.span));
                }
            }
        }

        // Default values evaluate in the defining scope, not the body scope.
        let mut params = Vec::with_capacity(def.params.len());
        for (index, param) in def.params.into_iter().enumerate() {
            let default = param.default.map(|d| self.check_expression(d));
            let ty = param.declared.clone().unwrap_or(Type::Any);
            params.push((index, param.name, param.declared, default, param.is_optional, ty, param.span));
        }

        let is_proc = def.kind == FuncKind::Procedure;
        self.ctx.enter_function(meta.clone());
        self.ctx.scope.enter_scope(is_proc);

        let mut checked_params = Vec::with_capacity(params.len());
        for (index, name, declared, default, is_optional, ty, span) in params {
            let binding = Binding::Param {
                name: name.clone(),
                ty: ty.clone(),
                index,
                is_optional,
                has_default: default.is_some(),
            };
            if let Err(err) = self.ctx.scope.declare(name.clone(), binding) {
                self.ctx.error(LambdaError::Name(err, span));
            }
            checked_params.push(Parameter {
                name,
                declared,
                default,
                is_optional,
                info: TypeInfo::of(ty),
                span,
            });
        }

        *meta.defaults.borrow_mut() = checked_params
            .iter()
            .map(|p| p.default.clone())
            .collect();

        let body = if is_proc {
            match def.body {
                Expression::Content(block) => {
                    // The body frame is already procedural; check the block
                    // without pushing another frame so params stay visible.
                    let items = block
                        .items
                        .into_iter()
                        .map(|item| self.check_statement(item, false))
                        .collect();
                    Expression::Content(ContentBlock {
                        items,
                        info: TypeInfo::of(Type::List),
                        span: block.span,
                    })
                }
                other => self.check_expression(other),
            }
        } else {
            self.check_expression(def.body)
        };

        self.ctx.scope.exit_scope();
        self.ctx.exit_function();

        FuncDef {
            name: def.name,
            kind: def.kind,
            params: checked_params,
            return_type: def.return_type,
            body,
            is_public: def.is_public,
            is_variadic: def.is_variadic,
            info: TypeInfo::of(Type::Function(meta.signature.clone())),
            meta: Some(meta),
            span: def.span,
        }
    }

    fn check_call(&mut self, call: CallExpression<()>) -> Expression<TypeInfo> {
        let callee = self.check_expression(call.callee);
        let arguments: Vec<_> = call
            .arguments
            .into_iter()
            .map(|arg| Argument {
                name: arg.name,
                value: self.check_expression(arg.value),
                span: arg.span,
            })
            .collect();

        let resolved = match callee.unwrap_parens() {
            Expression::Ident(ident) => match &ident.target {
                Some(Binding::Func { meta, module }) => Callee::Direct {
                    meta: meta.clone(),
                    module: *module,
                },
                Some(Binding::System(info)) => Callee::System(*info),
                Some(Binding::Local { .. }) | Some(Binding::Param { .. }) => Callee::Dynamic,
                Some(Binding::Pattern { .. }) => {
                    self.ctx.error(LambdaError::Type(
                        TypeError::NotCallable { actual: Type::Pattern },
                        call.span,
                    ));
                    Callee::Dynamic
                }
                None => Callee::Dynamic,
            },
            Expression::FnExpr(def) => Callee::Direct {
                meta: def.meta().clone(),
                module: None,
            },
            _ => Callee::Dynamic,
        };

        let ty = match &resolved {
            Callee::Direct { meta, .. } => {
                self.check_call_arguments(&meta.signature.clone(), &arguments, call.span);
                meta.signature.returned.clone()
            }
            Callee::System(info) => {
                if info.is_proc {
                    self.require_proc_scope(info.name, call.span);
                }
                if info.arg_count >= 0 && arguments.len() != info.arg_count as usize {
                    self.ctx.error(LambdaError::Type(
                        TypeError::Arity {
                            expected: info.arg_count as usize,
                            actual: arguments.len(),
                        },
                        call.span,
                    ));
                }
                info.return_ty()
            }
            Callee::Dynamic => match &callee.info().ty {
                Type::Function(sig) => sig.returned.clone(),
                _ => Type::Any,
            },
        };

        Expression::Call(Box::new(CallExpression {
            callee,
            arguments,
            resolved: Some(resolved),
            info: TypeInfo::of(ty),
            span: call.span,
        }))
    }

    /// Build the arg→param mapping checks for a direct call: positional
    /// order, named matching, duplicates, defaults, variadic packaging.
    fn check_call_arguments(
        &mut self,
        signature: &Rc<FuncSignature>,
        arguments: &[Argument<TypeInfo>],
        span: Span,
    ) {
        let param_count = signature.param_count();
        let mut filled: Vec<bool> = vec![false; param_count];
        let mut positional = 0usize;

        for arg in arguments {
            match &arg.name {
                Some(name) => match signature.params.iter().position(|p| &p.name == name) {
                    Some(index) => {
                        if filled[index] {
                            self.ctx.error(LambdaError::Type(
                                TypeError::DuplicateArgument { name: name.clone() },
                                arg.span,
                            ));
                        }
                        filled[index] = true;
                        self.check_argument_type(&signature.params[index], &arg.value, arg.span);
                    }
                    None => {
                        // Named arguments never feed the variadic tail.
                        let err = if signature.is_variadic {
                            TypeError::NamedVariadic { name: name.clone() }
                        } else {
                            TypeError::UnknownParameter { name: name.clone() }
                        };
                        self.ctx.error(LambdaError::Type(err, arg.span));
                    }
                },
                None => {
                    if positional < param_count {
                        if !filled[positional] {
                            filled[positional] = true;
                            self.check_argument_type(
                                &signature.params[positional],
                                &arg.value,
                                arg.span,
                            );
                        }
                    } else if !signature.is_variadic {
                        self.ctx.error(LambdaError::Type(
                            TypeError::Arity {
                                expected: param_count,
                                actual: arguments.len(),
                            },
                            span,
                        ));
                        break;
                    }
                    positional += 1;
                }
            }
        }

        for (index, param) in signature.params.iter().enumerate() {
            if !filled[index] && !param.is_optional && !param.has_default {
                self.ctx.error(LambdaError::Type(
                    TypeError::MissingArgument {
                        name: param.name.clone(),
                    },
                    span,
                ));
            }
        }
    }

    fn check_argument_type(&mut self, param: &ParamSig, value: &Expression<TypeInfo>, span: Span) {
        let actual = &value.info().ty;
        if actual.coerce_to(&param.ty) == Coercion::Incompatible && *actual != Type::Error {
            self.ctx.error(LambdaError::Type(
                TypeError::Mismatch {
                    expected: param.ty.clone(),
                    actual: actual.clone(),
                    what: format!("parameter '{}'", param.name),
                },
                span,
            ));
        }
    }

    fn check_type_literal(&mut self, lit: TypeLiteral<()>) -> Expression<TypeInfo> {
        let inner = lit.ty.clone();
        let type_index = match inner {
            // Base types emit by id; composite types intern a slot.
            Type::Null
            | Type::Bool
            | Type::Int
            | Type::Int64
            | Type::Float
            | Type::Number
            | Type::Decimal
            | Type::DateTime
            | Type::String
            | Type::Symbol
            | Type::Binary
            | Type::Any
            | Type::Error => None,
            _ => Some(self.ctx.intern_type(inner.clone())),
        };
        Expression::TypeLiteral(TypeLiteral {
            ty: lit.ty.clone(),
            info: TypeInfo {
                ty: Type::TypeValue(Box::new(lit.ty)),
                is_literal: true,
                const_index: None,
                type_index,
            },
            span: lit.span,
        })
    }

    fn check_pattern_def(&mut self, def: PatternDef<()>) -> PatternDef<TypeInfo> {
        let compiled = pattern::compile_pattern(
            &def.name,
            &def.pattern,
            def.is_symbol,
            self.ctx.patterns.as_slice(),
        );

        let index = match compiled {
            Ok(compiled) => self.ctx.register_pattern(compiled),
            Err(failure) => {
                let payload = match failure {
                    pattern::PatternFailure::Engine(message) => PatternError::Compile {
                        name: def.name.clone(),
                        message,
                    },
                    pattern::PatternFailure::Unresolved(name) => {
                        PatternError::Unresolved { name }
                    }
                    pattern::PatternFailure::TooDeep => {
                        self.ctx.error(LambdaError::Overflow(
                            OverflowError {
                                what: format!("pattern '{}'", def.name),
                                limit: self.ctx.options.pattern_depth_limit,
                            },
                            def.span,
                        ));
                        PatternError::Unresolved {
                            name: def.name.clone(),
                        }
                    }
                };
                self.ctx.error(LambdaError::Pattern(payload, def.span));
                PATTERN_UNRESOLVED
            }
        };

        let binding = Binding::Pattern {
            name: def.name.clone(),
            index,
        };
        if let Err(err) = self.ctx.scope.declare(def.name.clone(), binding) {
            self.ctx.error(LambdaError::Name(err, def.span));
        }

        PatternDef {
            name: def.name,
            is_symbol: def.is_symbol,
            pattern: def.pattern,
            index: Some(index),
            info: TypeInfo::of(Type::Pattern),
            span: def.span,
        }
    }
}

fn with_module(binding: Binding, module: usize) -> Binding {
    match binding {
        Binding::Local {
            name,
            ty,
            mutable,
            global,
            ..
        } => Binding::Local {
            name,
            ty,
            mutable,
            global,
            module: Some(module),
        },
        Binding::Func { meta, .. } => Binding::Func {
            meta,
            module: Some(module),
        },
        other => other,
    }
}

/// Whether an expression references the pipe current item/index (`~`/`~#`),
/// without descending into nested pipes (they rebind the tokens).
pub fn has_current_ref<T>(expr: &Expression<T>) -> bool {
    match expr {
        Expression::CurrentItem(_) | Expression::CurrentIndex(_) => true,
        Expression::Parens(inner) => has_current_ref(inner),
        Expression::Unary(e) => has_current_ref(&e.operand),
        Expression::Binary(e) => has_current_ref(&e.left) || has_current_ref(&e.right),
        Expression::Pipe(_) => false,
        Expression::Member(e) => {
            has_current_ref(&e.object)
                || matches!(&e.field, MemberField::Expr(f) if has_current_ref(f))
        }
        Expression::Index(e) => has_current_ref(&e.object) || has_current_ref(&e.index),
        Expression::PathIndex(e) => has_current_ref(&e.base) || has_current_ref(&e.segment),
        Expression::Array(e) => e.items.iter().any(has_current_ref),
        Expression::List(e) => e.items.iter().any(has_current_ref),
        Expression::Map(e) => e.entries.iter().any(|entry| {
            has_current_ref(&entry.value)
                || matches!(&entry.key, MapKey::Expr(k) if has_current_ref(k))
        }),
        Expression::Element(e) => {
            e.content.iter().any(has_current_ref)
                || e.attrs.iter().any(|entry| has_current_ref(&entry.value))
        }
        Expression::If(e) => {
            has_current_ref(&e.condition)
                || has_current_ref(&e.then_branch)
                || e.else_branch.as_ref().map(has_current_ref).unwrap_or(false)
        }
        Expression::Call(e) => {
            has_current_ref(&e.callee) || e.arguments.iter().any(|arg| has_current_ref(&arg.value))
        }
        _ => false,
    }
}

fn path_text(scheme: &PathScheme, segments: &[PathSegment]) -> String {
    let mut text = String::from(match scheme {
        PathScheme::File => "file:",
        PathScheme::Http => "http:",
        PathScheme::Https => "https:",
        PathScheme::Sys => "sys:",
        PathScheme::Root => "/",
        PathScheme::Relative => ".",
        PathScheme::Parent => "..",
    });
    for segment in segments {
        text.push('/');
        match segment {
            PathSegment::Name(name) => text.push_str(name),
            PathSegment::Wildcard => text.push('*'),
            PathSegment::RecursiveWildcard => text.push_str("**"),
        }
    }
    text
}

#[cfg(test)]
mod tests;
