//! Lexical scopes inside function bodies, maintained by the caller while it
//! walks a file.
use std::collections::HashMap;

use crate::syntax::{Expr, Function, TypeNode};

#[derive(Debug, Clone, Copy)]
pub enum LocalValue<'p> {
    Var { ty: Option<&'p TypeNode>, init: Option<&'p Expr> },
    Param { ty: Option<&'p TypeNode> },
    Function(&'p Function),
    /// Classes, catch bindings, destructured names.
    Opaque,
}

#[derive(Debug, Default)]
struct Frame<'p> {
    values: HashMap<&'p str, LocalValue<'p>>,
    type_params: Vec<&'p str>,
}

#[derive(Debug, Default)]
pub struct LocalScope<'p> {
    frames: Vec<Frame<'p>>,
}

impl<'p> LocalScope<'p> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self) {
        self.frames.push(Frame::default());
    }

    pub fn pop(&mut self) {
        self.frames.pop();
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn declare(&mut self, name: &'p str, value: LocalValue<'p>) {
        if let Some(frame) = self.frames.last_mut() {
            frame.values.insert(name, value);
        }
    }

    pub fn declare_type_param(&mut self, name: &'p str) {
        if let Some(frame) = self.frames.last_mut() {
            frame.type_params.push(name);
        }
    }

    /// Innermost binding of `name`; `None` means "look at module scope".
    pub fn lookup(&self, name: &str) -> Option<LocalValue<'p>> {
        self.frames.iter().rev().find_map(|frame| frame.values.get(name).copied())
    }

    /// Type parameters in scope, outermost first.
    pub fn type_params(&self) -> impl Iterator<Item = &'p str> + '_ {
        self.frames.iter().flat_map(|frame| frame.type_params.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_frames_shadow_and_pop() {
        let mut scope = LocalScope::new();
        scope.push();
        scope.declare("x", LocalValue::Param { ty: None });
        scope.push();
        scope.declare("x", LocalValue::Opaque);
        assert!(matches!(scope.lookup("x"), Some(LocalValue::Opaque)));
        scope.pop();
        assert!(matches!(scope.lookup("x"), Some(LocalValue::Param { .. })));
        scope.pop();
        assert!(scope.lookup("x").is_none());
    }

    #[test]
    fn declarations_outside_any_frame_are_dropped() {
        let mut scope = LocalScope::new();
        scope.declare("x", LocalValue::Opaque);
        scope.declare_type_param("T");
        assert!(scope.lookup("x").is_none());
        assert_eq!(scope.type_params().count(), 0);
    }
}
