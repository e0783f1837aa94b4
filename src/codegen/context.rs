//! Emission-time state.
//!
//! Everything the per-node emitters share: the output buffer and the
//! explicit scoped stacks — current closure, assignment names, pipe depth,
//! the TCO frame — plus the recovered-error list and the function-name map
//! for stack traces.

use std::collections::HashMap;
use std::fmt::Write;
use std::rc::Rc;

use crate::typechecker::{FuncMeta, LambdaError};

#[derive(Debug, Default)]
pub struct EmitContext {
    pub buf: String,
    /// The closure whose body is currently being emitted, if any.
    pub current_closure: Option<Rc<FuncMeta>>,
    /// Names of enclosing assignments; closures adopt the innermost for
    /// display when they have no name of their own.
    pub assign_names: Vec<String>,
    /// The function currently being emitted as a loop, if any.
    pub tco_func: Option<Rc<FuncMeta>>,
    /// Whether the position being emitted is a tail position of `tco_func`.
    pub in_tail_position: bool,
    /// Nesting depth of pipe loops; names the `_pipe_item`/`_pipe_index`
    /// locals so nested pipes do not collide.
    pub pipe_depth: usize,
    /// Problems recovered during emission (an error placeholder was
    /// emitted and emission continued).
    pub errors: Vec<LambdaError>,
    /// Emitted symbol → display name, for stack traces. Last write wins.
    pub func_names: HashMap<String, String>,
}

impl EmitContext {
    pub fn new() -> EmitContext {
        EmitContext::default()
    }

    pub fn out(&mut self, text: &str) {
        self.buf.push_str(text);
    }

    pub fn outc(&mut self, c: char) {
        self.buf.push(c);
    }

    pub fn outf(&mut self, args: std::fmt::Arguments<'_>) {
        let _ = self.buf.write_fmt(args);
    }

    pub fn error(&mut self, error: LambdaError) {
        log::error!("emit error: {error}");
        self.errors.push(error);
    }

    pub fn current_assign_name(&self) -> Option<&str> {
        self.assign_names.last().map(String::as_str)
    }

    /// Display name for a function value: its own name, the enclosing
    /// assignment, or `<anonymous>`.
    pub fn display_name(&self, meta: &FuncMeta) -> String {
        let display = meta.display_name.borrow().clone();
        if display != "<anonymous>" {
            return display;
        }
        self.current_assign_name()
            .map(str::to_string)
            .unwrap_or(display)
    }

    pub fn register_func_name(&mut self, meta: &FuncMeta) {
        let display = self.display_name(meta);
        self.func_names.insert(meta.mangled.clone(), display);
    }

    pub fn pipe_item_name(&self) -> String {
        if self.pipe_depth <= 1 {
            "_pipe_item".to_string()
        } else {
            format!("_pipe_item{}", self.pipe_depth)
        }
    }

    pub fn pipe_index_name(&self) -> String {
        if self.pipe_depth <= 1 {
            "_pipe_index".to_string()
        } else {
            format!("_pipe_index{}", self.pipe_depth)
        }
    }
}

/// Run `f` with the tail-position flag cleared: the position's value feeds
/// further computation, so a recursive call there cannot be a tail call.
macro_rules! non_tail {
    ($tp:expr, $f:expr) => {{
        let saved = $tp.ctx.in_tail_position;
        $tp.ctx.in_tail_position = false;
        let result = $f;
        $tp.ctx.in_tail_position = saved;
        result
    }};
}

pub(crate) use non_tail;
