//! Compilation core for the Lambda scripting language.
//!
//! The pipeline: a parsed syntax tree (consumed through the `syntax`
//! adapter) becomes a typed AST, the type checker resolves names and
//! assigns a type to every expression, the closure and safety analyzers
//! attach capture and tail-call metadata, and the transpiler lowers the
//! whole script to C source over a tagged-item runtime. An external backend
//! turns that source into a callable.

pub mod ast;
pub mod codegen;
pub mod loader;
pub mod pattern;
pub mod runtime;
pub mod safety;
pub mod syntax;
pub mod typechecker;
pub mod value;
