//! Conversion target: legality rules for dialect conversion.
//!
//! Which operations/dialects are legal, illegal, or dynamically checked.
//! Operations nothing declares an opinion about default by conversion mode:
//! illegal under full conversion, legal under partial conversion.

use std::collections::HashSet;

use crate::context::IrContext;
use crate::refs::{OpRef, RegionRef};
use crate::rewrite::driver::ConversionMode;
use crate::symbol::Symbol;
use crate::walk;

/// Result of a legality check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegalityCheck {
    /// The operation is legal (no conversion needed).
    Legal,
    /// The operation is illegal (must be converted).
    Illegal,
}

/// Dynamic legality check function signature.
///
/// Takes `&mut IrContext` because type-based predicates run the type
/// converter, which may intern new types.
type DynamicCheckFn = dyn Fn(&mut IrContext, OpRef) -> Option<LegalityCheck>;

/// Conversion target — defines which ops/dialects are legal or illegal.
///
/// After pattern application, `verify()` walks the module and checks that
/// no illegal operations remain.
pub struct ConversionTarget {
    /// Entire dialects marked as legal.
    legal_dialects: HashSet<Symbol>,
    /// Entire dialects marked as illegal.
    illegal_dialects: HashSet<Symbol>,
    /// Specific operations marked as legal: (dialect, op_name).
    legal_ops: HashSet<(Symbol, Symbol)>,
    /// Specific operations marked as illegal: (dialect, op_name).
    illegal_ops: HashSet<(Symbol, Symbol)>,
    /// Dynamic legality checks for specific operations.
    dynamic_checks: Vec<Box<DynamicCheckFn>>,
}

impl ConversionTarget {
    /// Create a new empty conversion target.
    pub fn new() -> Self {
        Self {
            legal_dialects: HashSet::new(),
            illegal_dialects: HashSet::new(),
            legal_ops: HashSet::new(),
            illegal_ops: HashSet::new(),
            dynamic_checks: Vec::new(),
        }
    }

    /// Mark an entire dialect as legal.
    pub fn add_legal_dialect(&mut self, dialect: &str) {
        self.legal_dialects.insert(Symbol::from_dynamic(dialect));
    }

    /// Mark an entire dialect as illegal.
    pub fn add_illegal_dialect(&mut self, dialect: &str) {
        self.illegal_dialects.insert(Symbol::from_dynamic(dialect));
    }

    /// Mark a specific operation as legal.
    pub fn add_legal_op(&mut self, dialect: &str, op_name: &str) {
        self.legal_ops
            .insert((Symbol::from_dynamic(dialect), Symbol::from_dynamic(op_name)));
    }

    /// Mark a specific operation as illegal.
    pub fn add_illegal_op(&mut self, dialect: &str, op_name: &str) {
        self.illegal_ops
            .insert((Symbol::from_dynamic(dialect), Symbol::from_dynamic(op_name)));
    }

    /// Add a dynamic legality check.
    ///
    /// Return `Some(Legal)` or `Some(Illegal)` to override, `None` to defer.
    pub fn add_dynamic_check(
        &mut self,
        f: impl Fn(&mut IrContext, OpRef) -> Option<LegalityCheck> + 'static,
    ) {
        self.dynamic_checks.push(Box::new(f));
    }

    /// The target's declared opinion on an operation, or `None` when
    /// nothing covers it.
    ///
    /// Resolution order:
    /// 1. Dynamic checks (first non-None wins)
    /// 2. Specific op rules (legal_ops / illegal_ops)
    /// 3. Dialect rules (legal_dialects / illegal_dialects)
    pub fn legality(&self, ctx: &mut IrContext, op: OpRef) -> Option<LegalityCheck> {
        // 1. Dynamic checks
        for check in &self.dynamic_checks {
            if let Some(result) = check(ctx, op) {
                return Some(result);
            }
        }

        let data = ctx.op(op);
        let key = (data.dialect, data.name);

        // 2. Specific op rules
        if self.legal_ops.contains(&key) {
            return Some(LegalityCheck::Legal);
        }
        if self.illegal_ops.contains(&key) {
            return Some(LegalityCheck::Illegal);
        }

        // 3. Dialect rules
        if self.legal_dialects.contains(&data.dialect) {
            return Some(LegalityCheck::Legal);
        }
        if self.illegal_dialects.contains(&data.dialect) {
            return Some(LegalityCheck::Illegal);
        }

        None
    }

    /// Check if a specific operation is legal under the given mode.
    ///
    /// Undeclared operations are illegal under `Full` (everything must be
    /// accounted for) and legal under `Partial` (only declared-illegal ops
    /// must go).
    pub fn is_legal(&self, ctx: &mut IrContext, op: OpRef, mode: ConversionMode) -> LegalityCheck {
        match self.legality(ctx, op) {
            Some(result) => result,
            None => match mode {
                ConversionMode::Full => LegalityCheck::Illegal,
                ConversionMode::Partial => LegalityCheck::Legal,
            },
        }
    }

    /// Verify that no illegal operations remain in the region.
    ///
    /// Returns a list of illegal operations found.
    pub fn verify(
        &self,
        ctx: &mut IrContext,
        body: RegionRef,
        mode: ConversionMode,
    ) -> Vec<IllegalOp> {
        let mut illegal = Vec::new();
        for op in walk::collect_ops(ctx, body) {
            if self.is_legal(ctx, op, mode) == LegalityCheck::Illegal {
                let data = ctx.op(op);
                illegal.push(IllegalOp {
                    op,
                    dialect: data.dialect,
                    name: data.name,
                });
            }
        }
        illegal
    }
}

impl Default for ConversionTarget {
    fn default() -> Self {
        Self::new()
    }
}

/// An illegal operation found during verification.
#[derive(Debug)]
pub struct IllegalOp {
    pub op: OpRef,
    pub dialect: Symbol,
    pub name: Symbol,
}

impl std::fmt::Display for IllegalOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{} ({})", self.dialect, self.name, self.op)
    }
}
