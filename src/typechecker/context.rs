//! Shared state threaded through checking.
//!
//! An explicit context object instead of module-level globals: the scope
//! stack, the accumulated diagnostics, the script's interned constants,
//! types and patterns, and the stack of functions currently being checked
//! (the capture-recording machinery).

use std::rc::Rc;

use log::debug;

use super::captures::{Binding, FuncMeta};
use super::error::LambdaError;
use super::scope::Scope;
use super::types::Type;
use crate::pattern::CompiledPattern;
use crate::value::{ConstPool, ConstValue};

/// Analyzer limits; defaults match the documented guards.
#[derive(Clone, Copy, Debug)]
pub struct CheckOptions {
    pub pattern_depth_limit: usize,
    pub structure_depth_limit: usize,
    /// Diagnostics beyond this count are dropped.
    pub error_limit: usize,
}

impl Default for CheckOptions {
    fn default() -> CheckOptions {
        CheckOptions {
            pattern_depth_limit: crate::pattern::PATTERN_DEPTH_LIMIT,
            structure_depth_limit: 100,
            error_limit: 100,
        }
    }
}

/// A function currently being checked. `base_depth` is the scope depth at
/// entry; bindings resolved from frames below it live outside the function.
#[derive(Debug)]
pub struct FnFrame {
    pub meta: Rc<FuncMeta>,
    pub base_depth: usize,
}

#[derive(Debug, Default)]
pub struct Context {
    pub scope: Scope,
    pub errors: Vec<LambdaError>,
    pub consts: ConstPool,
    /// Script type list; map/element shapes and type values intern here.
    pub type_list: Vec<Type>,
    pub patterns: Vec<CompiledPattern>,
    pub fn_stack: Vec<FnFrame>,
    pub options: CheckOptions,
    /// Structure-validation recursion depth.
    pub depth: usize,
}

impl Context {
    pub fn new() -> Context {
        Context::default()
    }

    /// Record a diagnostic; silently drops past the error limit so a
    /// pathological input cannot flood the host.
    pub fn error(&mut self, error: LambdaError) {
        if self.errors.len() < self.options.error_limit {
            debug!("check error: {error}");
            self.errors.push(error);
        }
    }

    pub fn intern_const(&mut self, value: ConstValue) -> u32 {
        self.consts.intern(value)
    }

    /// Intern a type into the script type list, reusing an existing slot for
    /// an equal type.
    pub fn intern_type(&mut self, ty: Type) -> u32 {
        if let Some(index) = self.type_list.iter().position(|t| *t == ty) {
            return index as u32;
        }
        self.type_list.push(ty);
        (self.type_list.len() - 1) as u32
    }

    pub fn register_pattern(&mut self, pattern: CompiledPattern) -> u32 {
        self.patterns.push(pattern);
        (self.patterns.len() - 1) as u32
    }

    pub fn enter_function(&mut self, meta: Rc<FuncMeta>) {
        self.fn_stack.push(FnFrame {
            meta,
            base_depth: self.scope.depth(),
        });
    }

    pub fn exit_function(&mut self) {
        self.fn_stack.pop();
    }

    pub fn current_function(&self) -> Option<&Rc<FuncMeta>> {
        self.fn_stack.last().map(|frame| &frame.meta)
    }

    /// Resolve a name and record captures.
    ///
    /// When the binding lives outside one or more functions on the check
    /// stack, each crossed function captures it: the outermost crossing
    /// boxes from the native slot, deeper crossings reuse the parent
    /// environment (`from_outer_env`).
    pub fn resolve(&mut self, name: &str) -> Option<Binding> {
        let (frame_index, binding) = self.scope.lookup(name)?;
        let binding = binding.clone();

        if binding.is_capturable() {
            let mut crossed_one = false;
            for frame in &self.fn_stack {
                if frame_index < frame.base_depth {
                    frame.meta.add_capture(name, binding.ty(), crossed_one);
                    crossed_one = true;
                }
            }
        }
        Some(binding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::Span;
    use crate::typechecker::captures::FuncKind;
    use crate::typechecker::types::FuncSignature;

    fn meta(start: usize) -> Rc<FuncMeta> {
        Rc::new(FuncMeta::new(
            None,
            FuncKind::Anonymous,
            Rc::new(FuncSignature {
                params: vec![],
                returned: Type::Any,
                is_variadic: false,
                is_public: false,
                is_anonymous: true,
            }),
            Span::new(start, start + 1),
        ))
    }

    fn local(name: &str, global: bool) -> Binding {
        Binding::Local {
            name: name.into(),
            ty: Type::Int,
            mutable: false,
            global,
            module: None,
        }
    }

    #[test]
    fn test_capture_across_one_boundary() {
        let mut ctx = Context::new();
        ctx.scope.enter_scope(false);
        ctx.scope.declare("x", local("x", false)).unwrap();

        let f = meta(10);
        ctx.enter_function(f.clone());
        ctx.scope.enter_scope(false);

        ctx.resolve("x").unwrap();
        let captures = f.captures.borrow();
        assert_eq!(captures.len(), 1);
        assert_eq!(captures[0].name, "x");
        assert!(!captures[0].from_outer_env);
    }

    #[test]
    fn test_transitive_capture_marks_outer_env() {
        let mut ctx = Context::new();
        ctx.scope.enter_scope(false);
        ctx.scope.declare("x", local("x", false)).unwrap();

        let outer = meta(10);
        ctx.enter_function(outer.clone());
        ctx.scope.enter_scope(false);

        let inner = meta(20);
        ctx.enter_function(inner.clone());
        ctx.scope.enter_scope(false);

        ctx.resolve("x").unwrap();

        assert!(!outer.captures.borrow()[0].from_outer_env);
        assert!(inner.captures.borrow()[0].from_outer_env);
    }

    #[test]
    fn test_globals_are_not_captured() {
        let mut ctx = Context::new();
        ctx.scope.declare("g", local("g", true)).unwrap();

        let f = meta(10);
        ctx.enter_function(f.clone());
        ctx.scope.enter_scope(false);

        ctx.resolve("g").unwrap();
        assert!(f.captures.borrow().is_empty());
    }

    #[test]
    fn test_own_locals_are_not_captured() {
        let mut ctx = Context::new();
        let f = meta(10);
        ctx.enter_function(f.clone());
        ctx.scope.enter_scope(false);
        ctx.scope.declare("y", local("y", false)).unwrap();

        ctx.resolve("y").unwrap();
        assert!(f.captures.borrow().is_empty());
    }
}
