//! Lexical scope stack.
//!
//! A stack of frames, innermost at the end; lookups walk from the end
//! backwards and the first match wins. Redeclaring a name inside one frame
//! is a name error, shadowing across frames is allowed. Pattern definitions
//! live in the same namespace as variables and functions.

use std::collections::HashMap;

use super::captures::Binding;
use super::error::NameError;

#[derive(Debug, Default)]
struct Frame {
    entries: HashMap<String, Binding>,
    /// Declaration order, kept so exported symbol tables are deterministic.
    order: Vec<String>,
    is_proc: bool,
}

#[derive(Debug)]
pub struct Scope {
    frames: Vec<Frame>,
}

impl Default for Scope {
    fn default() -> Scope {
        Scope {
            frames: vec![Frame::default()],
        }
    }
}

impl Scope {
    pub fn new() -> Scope {
        Scope::default()
    }

    /// Push a frame. `is_proc` marks statement-permitting regions: procedure
    /// bodies and the blocks nested inside them.
    pub fn enter_scope(&mut self, is_proc: bool) {
        self.frames.push(Frame {
            is_proc,
            ..Frame::default()
        });
    }

    pub fn exit_scope(&mut self) {
        debug_assert!(self.frames.len() > 1, "cannot exit the global scope");
        self.frames.pop();
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Whether procedural statements (while/break/return/var/assign) are
    /// legal here.
    pub fn in_proc_scope(&self) -> bool {
        self.frames.last().map(|f| f.is_proc).unwrap_or(false)
    }

    /// Append an entry to the innermost frame. Fails on redeclaration in
    /// the same frame.
    pub fn declare(&mut self, name: impl Into<String>, binding: Binding) -> Result<(), NameError> {
        let name = name.into();
        let frame = self.frames.last_mut().expect("scope stack is never empty");
        if frame.entries.contains_key(&name) {
            return Err(NameError::Duplicate { name });
        }
        frame.order.push(name.clone());
        frame.entries.insert(name, binding);
        Ok(())
    }

    /// Replace an entry wherever it is visible; used when a definition is
    /// refined in place (e.g. a pattern gets its compiled index).
    pub fn replace(&mut self, name: &str, binding: Binding) {
        for frame in self.frames.iter_mut().rev() {
            if let Some(slot) = frame.entries.get_mut(name) {
                *slot = binding;
                return;
            }
        }
    }

    /// Innermost-first lookup; returns the 0-based frame index the binding
    /// lives in (0 = global) alongside the binding.
    pub fn lookup(&self, name: &str) -> Option<(usize, &Binding)> {
        for (index, frame) in self.frames.iter().enumerate().rev() {
            if let Some(binding) = frame.entries.get(name) {
                return Some((index, binding));
            }
        }
        None
    }

    /// Entries of the global frame in declaration order.
    pub fn globals(&self) -> Vec<(&str, &Binding)> {
        let frame = &self.frames[0];
        frame
            .order
            .iter()
            .filter_map(|name| frame.entries.get(name).map(|b| (name.as_str(), b)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typechecker::types::Type;

    fn local(name: &str, ty: Type) -> Binding {
        Binding::Local {
            name: name.into(),
            ty,
            mutable: false,
            global: false,
            module: None,
        }
    }

    #[test]
    fn test_shadowing_across_frames() {
        let mut scope = Scope::new();
        scope.declare("x", local("x", Type::Int)).unwrap();

        scope.enter_scope(false);
        scope.declare("x", local("x", Type::String)).unwrap();
        let (frame, binding) = scope.lookup("x").unwrap();
        assert_eq!(frame, 1);
        assert_eq!(binding.ty(), Type::String);

        scope.exit_scope();
        let (frame, binding) = scope.lookup("x").unwrap();
        assert_eq!(frame, 0);
        assert_eq!(binding.ty(), Type::Int);
    }

    #[test]
    fn test_duplicate_in_same_frame() {
        let mut scope = Scope::new();
        scope.declare("x", local("x", Type::Int)).unwrap();
        let err = scope.declare("x", local("x", Type::Int)).unwrap_err();
        assert_eq!(err, NameError::Duplicate { name: "x".into() });
    }

    #[test]
    fn test_proc_flag() {
        let mut scope = Scope::new();
        assert!(!scope.in_proc_scope());
        scope.enter_scope(true);
        assert!(scope.in_proc_scope());
        scope.enter_scope(true);
        assert!(scope.in_proc_scope());
        scope.exit_scope();
        scope.exit_scope();
        assert!(!scope.in_proc_scope());
    }
}
