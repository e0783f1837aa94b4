//! Built-in system function table.
//!
//! System functions are never user-defined and never recursive: calls to
//! them skip the stack check and emit as plain `fn_<name>` / `pn_<name>`
//! runtime calls. An `arg_count` of `-1` marks variable arity.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use super::types::Type;
use crate::value::TypeId;

#[derive(Debug)]
pub struct SysFuncInfo {
    pub name: &'static str,
    /// Expected argument count; -1 for variable arity.
    pub arg_count: i32,
    pub return_type: TypeId,
    /// Procedural built-ins emit with a `pn_` prefix and are only legal in
    /// procedural scope.
    pub is_proc: bool,
    /// Overloaded built-ins append the argument count to the emitted name.
    pub is_overloaded: bool,
}

impl SysFuncInfo {
    pub fn return_ty(&self) -> Type {
        match self.return_type {
            TypeId::Null => Type::Null,
            TypeId::Bool => Type::Bool,
            TypeId::Int => Type::Int,
            TypeId::Int64 => Type::Int64,
            TypeId::Float => Type::Float,
            TypeId::Number => Type::Number,
            TypeId::String => Type::String,
            TypeId::Symbol => Type::Symbol,
            TypeId::List => Type::List,
            TypeId::Range => Type::Range,
            _ => Type::Any,
        }
    }

    /// Emitted C symbol, e.g. `fn_len`, `pn_print`, `fn_min2`.
    pub fn runtime_symbol(&self, arg_count: usize) -> String {
        let prefix = if self.is_proc { "pn_" } else { "fn_" };
        if self.is_overloaded {
            format!("{prefix}{}{arg_count}", self.name)
        } else {
            format!("{prefix}{}", self.name)
        }
    }
}

macro_rules! sys_funcs {
    ($(($name:literal, $argc:literal, $ret:expr, $proc:literal, $over:literal)),* $(,)?) => {
        &[$(SysFuncInfo {
            name: $name,
            arg_count: $argc,
            return_type: $ret,
            is_proc: $proc,
            is_overloaded: $over,
        }),*]
    };
}

static SYS_FUNC_TABLE: &[SysFuncInfo] = sys_funcs![
    ("len", 1, TypeId::Int64, false, false),
    ("sum", 1, TypeId::Any, false, false),
    ("avg", 1, TypeId::Any, false, false),
    ("min", -1, TypeId::Any, false, true),
    ("max", -1, TypeId::Any, false, true),
    ("abs", 1, TypeId::Any, false, false),
    ("round", 1, TypeId::Float, false, false),
    ("floor", 1, TypeId::Float, false, false),
    ("ceil", 1, TypeId::Float, false, false),
    ("string", 1, TypeId::String, false, false),
    ("symbol", 1, TypeId::Symbol, false, false),
    ("int", 1, TypeId::Int64, false, false),
    ("float", 1, TypeId::Float, false, false),
    ("number", 1, TypeId::Number, false, false),
    ("type", 1, TypeId::Any, false, false),
    ("slice", -1, TypeId::Any, false, true),
    ("format", -1, TypeId::String, false, false),
    ("error", 1, TypeId::Error, false, false),
    ("match", 2, TypeId::Bool, false, false),
    ("contains", 2, TypeId::Bool, false, false),
    ("print", -1, TypeId::Null, true, false),
    ("input", -1, TypeId::Any, true, false),
];

static SYS_FUNCS: Lazy<HashMap<&'static str, &'static SysFuncInfo>> = Lazy::new(|| {
    SYS_FUNC_TABLE
        .iter()
        .map(|info| (info.name, info))
        .collect()
});

pub fn lookup(name: &str) -> Option<&'static SysFuncInfo> {
    SYS_FUNCS.get(name).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let len = lookup("len").unwrap();
        assert_eq!(len.arg_count, 1);
        assert_eq!(len.runtime_symbol(1), "fn_len");
        assert!(lookup("no_such_builtin").is_none());
    }

    #[test]
    fn test_overloaded_and_procedural_symbols() {
        assert_eq!(lookup("min").unwrap().runtime_symbol(2), "fn_min2");
        assert_eq!(lookup("print").unwrap().runtime_symbol(1), "pn_print");
        assert!(lookup("print").unwrap().is_proc);
    }
}
