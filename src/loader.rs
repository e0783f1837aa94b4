//! Scripts and the cross-module registry.
//!
//! A [`Script`] is one checked compilation unit: its typed AST plus the
//! interned constants, types and patterns its emitted code will index into.
//! [`Modules`] is the registry the linker works against: scripts register
//! under their reference in dependency order, and an importer resolves a
//! module path to the exporter's public symbol table.

use std::collections::HashMap;

use log::{debug, info};

use crate::ast::{Ast, Declaration, Statement};
use crate::pattern::CompiledPattern;
use crate::safety;
use crate::typechecker::{
    Binding, CheckOptions, LambdaError, ModuleExports, ModuleResolver, Type, TypeInfo, Typechecker,
};
use crate::value::ConstPool;

#[derive(Debug)]
pub struct Script {
    /// Module reference this script registered under (usually its path).
    pub reference: String,
    /// Stable index; cross-module names emit as `m<index>.symbol`.
    pub index: usize,
    pub ast: Ast<TypeInfo>,
    pub consts: ConstPool,
    pub type_list: Vec<Type>,
    pub patterns: Vec<CompiledPattern>,
    pub errors: Vec<LambdaError>,
    pub exports: ModuleExports,
}

impl Script {
    /// Public symbols of a checked script: public functions and `pub` lets,
    /// in declaration order.
    fn collect_exports(index: usize, ast: &Ast<TypeInfo>) -> ModuleExports {
        let mut symbols = Vec::new();
        for statement in ast.nodes() {
            match statement {
                Statement::FuncDef(def) if def.is_public => {
                    if let Some(name) = &def.name {
                        symbols.push((
                            name.clone(),
                            Binding::Func {
                                meta: def.meta().clone(),
                                module: None,
                            },
                        ));
                    }
                }
                Statement::Pub(stm) => {
                    for decl in &stm.declarations {
                        if let Declaration::Single(decl) = decl {
                            symbols.push((
                                decl.name.clone(),
                                Binding::Local {
                                    name: decl.name.clone(),
                                    ty: decl.info.ty.clone(),
                                    mutable: false,
                                    global: true,
                                    module: None,
                                },
                            ));
                        }
                    }
                }
                _ => {}
            }
        }
        ModuleExports { index, symbols }
    }
}

#[derive(Debug, Default)]
pub struct Modules {
    scripts: Vec<Script>,
    by_reference: HashMap<String, usize>,
    options: CheckOptions,
}

impl Modules {
    pub fn new() -> Modules {
        Modules::default()
    }

    pub fn with_options(options: CheckOptions) -> Modules {
        Modules {
            options,
            ..Modules::default()
        }
    }

    /// Check a parsed script and register it. Scripts register in
    /// dependency order: imports resolve against what is already here.
    pub fn check_and_add(&mut self, reference: impl Into<String>, ast: Ast<()>) -> usize {
        let reference = reference.into();
        let index = self.scripts.len();
        info!("checking script '{reference}' as module {index}");

        let checker = Typechecker::with_options(self, self.options);
        let output = checker.check(ast);
        safety::analyze(&output.ast);

        let exports = Script::collect_exports(index, &output.ast);
        debug!(
            "script '{reference}' exports {} symbols, {} errors",
            exports.symbols.len(),
            output.context.errors.len()
        );

        let script = Script {
            reference: reference.clone(),
            index,
            ast: output.ast,
            consts: output.context.consts,
            type_list: output.context.type_list,
            patterns: output.context.patterns,
            errors: output.context.errors,
            exports,
        };
        self.scripts.push(script);
        self.by_reference.insert(reference, index);
        index
    }

    pub fn get(&self, reference: &str) -> Option<&Script> {
        self.by_reference
            .get(reference)
            .map(|&index| &self.scripts[index])
    }

    pub fn by_index(&self, index: usize) -> Option<&Script> {
        self.scripts.get(index)
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }
}

impl ModuleResolver for Modules {
    fn resolve_module(&self, path: &str) -> Option<ModuleExports> {
        self.get(path).map(|script| script.exports.clone())
    }
}

/// Check a single standalone script (no imports).
pub fn check_script(reference: impl Into<String>, ast: Ast<()>) -> Script {
    let mut modules = Modules::new();
    let index = modules.check_and_add(reference, ast);
    modules.scripts.swap_remove(index)
}
