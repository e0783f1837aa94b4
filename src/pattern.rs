//! String/symbol pattern compilation.
//!
//! Pattern definitions translate to a regex string and compile through the
//! `regex` crate. Full matching uses a `^(?:...)$`-anchored form; partial
//! matching keeps a second, unanchored compilation of the same source.
//! Intersection compiles to a lookahead approximation; full intersection of
//! regular languages is not attempted.

use std::fmt::Write;

use log::debug;
use regex::Regex;

use crate::ast::{CharClass, PatternExpr};

/// Nesting limit for pattern translation. One level past this fails with an
/// overflow error instead of recursing further.
pub const PATTERN_DEPTH_LIMIT: usize = 50;

/// A successfully compiled pattern, interned at a `pattern_index` in its
/// script.
#[derive(Clone, Debug)]
pub struct CompiledPattern {
    pub name: String,
    /// Unanchored regex source; what pattern references splice.
    pub source: String,
    pub is_symbol: bool,
    full: Regex,
    partial: Regex,
}

impl CompiledPattern {
    /// Whether the whole of `input` is in the pattern's language.
    pub fn full_match(&self, input: &str) -> bool {
        self.full.is_match(input)
    }

    /// Whether some substring of `input` is in the pattern's language.
    pub fn partial_match(&self, input: &str) -> bool {
        self.partial.is_match(input)
    }
}

/// Why a pattern failed to compile.
#[derive(Clone, Debug, PartialEq)]
pub enum PatternFailure {
    /// Regex engine rejected the translated source.
    Engine(String),
    /// A referenced pattern name is not (yet) compiled.
    Unresolved(String),
    /// Translation exceeded [`PATTERN_DEPTH_LIMIT`].
    TooDeep,
}

/// Resolver for `PatternExpr::Ref` nodes: maps a pattern name to its
/// already-compiled unanchored source.
pub trait RefResolver {
    fn resolve(&self, name: &str) -> Option<&str>;
}

impl RefResolver for [CompiledPattern] {
    fn resolve(&self, name: &str) -> Option<&str> {
        self.iter()
            .find(|p| p.name == name)
            .map(|p| p.source.as_str())
    }
}

impl RefResolver for () {
    fn resolve(&self, _name: &str) -> Option<&str> {
        None
    }
}

pub fn compile_pattern<R: RefResolver + ?Sized>(
    name: &str,
    expr: &PatternExpr,
    is_symbol: bool,
    refs: &R,
) -> Result<CompiledPattern, PatternFailure> {
    let mut source = String::new();
    write_regex(&mut source, expr, refs, 0)?;
    debug!("compiled pattern '{name}' to regex: {source}");

    let full = Regex::new(&format!("^(?:{source})$"))
        .map_err(|err| PatternFailure::Engine(err.to_string()))?;
    let partial = Regex::new(&source).map_err(|err| PatternFailure::Engine(err.to_string()))?;

    Ok(CompiledPattern {
        name: name.to_string(),
        source,
        is_symbol,
        full,
        partial,
    })
}

/// Escape regex metacharacters in a literal.
fn escape_literal(out: &mut String, literal: &str) {
    for c in literal.chars() {
        if matches!(
            c,
            '\\' | '.' | '+' | '*' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '^' | '$'
        ) {
            out.push('\\');
        }
        out.push(c);
    }
}

/// Escape a character inside a character class.
fn escape_in_class(out: &mut String, c: char) {
    if matches!(c, ']' | '\\' | '^' | '-') {
        out.push('\\');
    }
    out.push(c);
}

fn write_regex<R: RefResolver + ?Sized>(
    out: &mut String,
    expr: &PatternExpr,
    refs: &R,
    depth: usize,
) -> Result<(), PatternFailure> {
    if depth > PATTERN_DEPTH_LIMIT {
        return Err(PatternFailure::TooDeep);
    }
    match expr {
        PatternExpr::Literal(text) => escape_literal(out, text),
        PatternExpr::CharClass(class) => out.push_str(match class {
            CharClass::Digit => "[0-9]",
            CharClass::Word => "[A-Za-z0-9_]",
            CharClass::Space => "\\s",
            CharClass::Alpha => "[A-Za-z]",
            CharClass::Any => ".",
        }),
        PatternExpr::Range { start, end } => {
            out.push('[');
            if let Some(c) = start.chars().next() {
                escape_in_class(out, c);
            }
            out.push('-');
            if let Some(c) = end.chars().next() {
                escape_in_class(out, c);
            }
            out.push(']');
        }
        PatternExpr::Seq(items) => {
            for item in items {
                write_regex(out, item, refs, depth + 1)?;
            }
        }
        PatternExpr::Union(left, right) => {
            out.push_str("(?:");
            write_regex(out, left, refs, depth + 1)?;
            out.push('|');
            write_regex(out, right, refs, depth + 1)?;
            out.push(')');
        }
        PatternExpr::Intersect(left, right) => {
            // Lookahead approximation of intersection.
            out.push_str("(?=");
            write_regex(out, left, refs, depth + 1)?;
            out.push(')');
            write_regex(out, right, refs, depth + 1)?;
        }
        PatternExpr::Optional(inner) => {
            out.push_str("(?:");
            write_regex(out, inner, refs, depth + 1)?;
            out.push_str(")?");
        }
        PatternExpr::OneOrMore(inner) => {
            out.push_str("(?:");
            write_regex(out, inner, refs, depth + 1)?;
            out.push_str(")+");
        }
        PatternExpr::ZeroOrMore(inner) => {
            out.push_str("(?:");
            write_regex(out, inner, refs, depth + 1)?;
            out.push_str(")*");
        }
        PatternExpr::Repeat {
            inner,
            min,
            max,
            at_least,
        } => {
            out.push_str("(?:");
            write_regex(out, inner, refs, depth + 1)?;
            out.push(')');
            match (max, at_least) {
                (Some(max), _) => {
                    let _ = write!(out, "{{{min},{max}}}");
                }
                (None, true) => {
                    let _ = write!(out, "{{{min},}}");
                }
                (None, false) => {
                    let _ = write!(out, "{{{min}}}");
                }
            }
        }
        PatternExpr::Not(inner) => {
            // Negative lookahead plus any-char: matches one character not
            // starting the negated pattern.
            out.push_str("(?!");
            write_regex(out, inner, refs, depth + 1)?;
            out.push_str(").");
        }
        PatternExpr::Ref(name) => match refs.resolve(name) {
            Some(source) => {
                out.push_str("(?:");
                out.push_str(source);
                out.push(')');
            }
            None => return Err(PatternFailure::Unresolved(name.clone())),
        },
    }
    Ok(())
}
