//! Name bindings and closure capture metadata.
//!
//! Identifier resolution produces a [`Binding`] value that is cloned onto
//! the typed identifier node, replacing pointer-chasing into the scope
//! table. Function definitions share a [`FuncMeta`] record through `Rc`;
//! the capture list and the TCO flag are the two slots filled in after the
//! meta is created (captures during checking, TCO by the safety analyzer).

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::sysfunc::SysFuncInfo;
use super::types::{FuncSignature, Type};
use super::TypeInfo;
use crate::ast::Expression;
use crate::syntax::Span;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FuncKind {
    Function,
    Procedure,
    Anonymous,
}

/// A captured free variable of a closure, in insertion order.
///
/// `from_outer_env` marks transitive captures: the variable is already
/// boxed in the enclosing closure's environment and the bridge reuses that
/// storage instead of boxing from a native slot.
#[derive(Clone, Debug, PartialEq)]
pub struct Capture {
    pub name: String,
    pub ty: Type,
    pub from_outer_env: bool,
}

/// Shared metadata for one function definition.
#[derive(Debug)]
pub struct FuncMeta {
    /// Source-level name; `None` for anonymous function expressions.
    pub name: Option<String>,
    /// Name used in stack traces: the function name, the nearest assignment
    /// name, or `<anonymous>`.
    pub display_name: RefCell<String>,
    /// Emitted symbol, unique per script via the definition's start byte.
    pub mangled: String,
    /// Emitted closure environment struct name.
    pub env_name: String,
    pub signature: Rc<FuncSignature>,
    pub kind: FuncKind,
    pub captures: RefCell<Vec<Capture>>,
    /// Checked default-value expressions, one slot per parameter; call
    /// sites emit these for omitted arguments.
    pub defaults: RefCell<Vec<Option<Expression<TypeInfo>>>>,
    /// Set by the safety analyzer when every direct self-call is a tail call.
    pub tco: Cell<bool>,
    pub span: Span,
}

impl FuncMeta {
    pub fn new(
        name: Option<String>,
        kind: FuncKind,
        signature: Rc<FuncSignature>,
        span: Span,
    ) -> FuncMeta {
        let mangled = match &name {
            Some(name) => format!("_{}{}", name, span.start),
            None => format!("_f{}", span.start),
        };
        let display_name = name.clone().unwrap_or_else(|| "<anonymous>".to_string());
        FuncMeta {
            name,
            display_name: RefCell::new(display_name),
            mangled,
            env_name: format!("Env_f{}", span.start),
            signature,
            kind,
            captures: RefCell::new(Vec::new()),
            defaults: RefCell::new(Vec::new()),
            tco: Cell::new(false),
            span,
        }
    }

    pub fn arity(&self) -> usize {
        self.signature.param_count()
    }

    pub fn has_captures(&self) -> bool {
        !self.captures.borrow().is_empty()
    }

    pub fn find_capture(&self, name: &str) -> Option<Capture> {
        self.captures
            .borrow()
            .iter()
            .find(|cap| cap.name == name)
            .cloned()
    }

    /// Record a capture unless already present. Insertion order is the
    /// environment slot order.
    pub fn add_capture(&self, name: &str, ty: Type, from_outer_env: bool) {
        let mut captures = self.captures.borrow_mut();
        if captures.iter().any(|cap| cap.name == name) {
            return;
        }
        captures.push(Capture {
            name: name.to_string(),
            ty,
            from_outer_env,
        });
    }
}

/// What an identifier resolved to.
///
/// Emission is a pattern match on this sum: each variant selects one
/// lowering strategy, so call sites need no flag chains.
#[derive(Clone, Debug)]
pub enum Binding {
    /// A `let`/`var` bound variable.
    Local {
        name: String,
        ty: Type,
        mutable: bool,
        /// Declared at script top level; globals are never captured.
        global: bool,
        /// Import origin: index of the defining script, for `m<i>.` prefixes.
        module: Option<usize>,
    },
    /// A function parameter.
    Param {
        name: String,
        ty: Type,
        index: usize,
        is_optional: bool,
        has_default: bool,
    },
    /// A named function, procedure or function expression.
    Func {
        meta: Rc<FuncMeta>,
        module: Option<usize>,
    },
    /// A compiled string/symbol pattern, by pattern index.
    Pattern { name: String, index: u32 },
    System(&'static SysFuncInfo),
}

impl Binding {
    pub fn ty(&self) -> Type {
        match self {
            Binding::Local { ty, .. } | Binding::Param { ty, .. } => ty.clone(),
            Binding::Func { meta, .. } => Type::Function(meta.signature.clone()),
            Binding::Pattern { .. } => Type::Pattern,
            Binding::System(info) => info.return_ty(),
        }
    }

    /// Whether resolving this binding from inside a nested function makes it
    /// a capture. Functions, patterns and system functions resolve
    /// statically; globals live in emitted global storage.
    pub fn is_capturable(&self) -> bool {
        match self {
            Binding::Local { global, .. } => !global,
            Binding::Param { .. } => true,
            _ => false,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Binding::Local { name, .. }
            | Binding::Param { name, .. }
            | Binding::Pattern { name, .. } => name,
            Binding::Func { meta, .. } => meta.name.as_deref().unwrap_or("<anonymous>"),
            Binding::System(info) => info.name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typechecker::types::ParamSig;

    fn signature(params: usize) -> Rc<FuncSignature> {
        Rc::new(FuncSignature {
            params: (0..params)
                .map(|i| ParamSig {
                    name: format!("p{i}"),
                    ty: Type::Any,
                    is_optional: false,
                    has_default: false,
                })
                .collect(),
            returned: Type::Any,
            is_variadic: false,
            is_public: false,
            is_anonymous: false,
        })
    }

    #[test]
    fn test_mangled_names() {
        let named = FuncMeta::new(
            Some("fact".into()),
            FuncKind::Function,
            signature(2),
            Span::new(10, 60),
        );
        assert_eq!(named.mangled, "_fact10");
        assert_eq!(named.env_name, "Env_f10");

        let anon = FuncMeta::new(None, FuncKind::Anonymous, signature(0), Span::new(7, 20));
        assert_eq!(anon.mangled, "_f7");
        assert_eq!(*anon.display_name.borrow(), "<anonymous>");
    }

    #[test]
    fn test_capture_order_and_dedup() {
        let meta = FuncMeta::new(None, FuncKind::Anonymous, signature(0), Span::default());
        meta.add_capture("b", Type::Int, false);
        meta.add_capture("a", Type::String, false);
        meta.add_capture("b", Type::Int, true);

        let captures = meta.captures.borrow();
        assert_eq!(captures.len(), 2);
        assert_eq!(captures[0].name, "b");
        assert!(!captures[0].from_outer_env);
        assert_eq!(captures[1].name, "a");
    }
}
