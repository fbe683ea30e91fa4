//! Worklist-based conversion driver.
//!
//! Seeds a worklist with every op in the module (walk order), then pops ops
//! one at a time: legal ops are skipped, illegal ops get one pattern applied
//! (the first that matches). Ops created by a rewrite are pushed back onto
//! the worklist, so lowering chains converge without fixpoint sweeps over
//! the whole module. There is no rollback; a failed match must leave the
//! graph untouched.

use std::collections::{HashSet, VecDeque};

use derive_more::{Display, Error};

use super::Module;
use super::conversion_target::{ConversionTarget, IllegalOp, LegalityCheck};
use super::pattern::RewritePattern;
use super::rewriter::{self, PatternRewriter};
use super::type_converter::TypeConverter;
use crate::context::IrContext;
use crate::refs::OpRef;
use crate::walk;

/// How strictly the target's silence is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionMode {
    /// Every op must end up declared legal; undeclared ops are illegal.
    Full,
    /// Only declared-illegal ops must be converted; undeclared ops pass.
    Partial,
}

/// Result of a successful conversion.
#[derive(Debug)]
pub struct ConversionOutcome {
    /// Number of pattern applications performed.
    pub rewrites: usize,
}

/// Conversion failure.
#[derive(Debug, Display, Error)]
pub enum ConversionError {
    /// Illegal operations remained after the worklist drained.
    #[display("{} illegal operation(s) remain after conversion", illegal.len())]
    Incomplete {
        #[error(not(source))]
        illegal: Vec<IllegalOp>,
    },
    /// The rewrite budget was exhausted, suggesting a pattern cycle.
    #[display("conversion exceeded {limit} rewrites without converging")]
    Diverged { limit: usize },
}

/// Applies rewrite patterns over a worklist until every op is legal.
pub struct ConversionDriver {
    patterns: Vec<Box<dyn RewritePattern>>,
    type_converter: TypeConverter,
    rewrite_limit: usize,
}

impl ConversionDriver {
    /// Create a new driver with the given type converter.
    pub fn new(type_converter: TypeConverter) -> Self {
        Self {
            patterns: Vec::new(),
            type_converter,
            rewrite_limit: 10_000,
        }
    }

    /// Add a rewrite pattern. Patterns are tried in registration order.
    pub fn add_pattern(mut self, pattern: impl RewritePattern + 'static) -> Self {
        self.patterns.push(Box::new(pattern));
        self
    }

    /// Cap the total number of rewrites before giving up.
    pub fn with_rewrite_limit(mut self, n: usize) -> Self {
        self.rewrite_limit = n;
        self
    }

    /// Get a reference to the type converter.
    pub fn type_converter(&self) -> &TypeConverter {
        &self.type_converter
    }

    /// Convert the module until no op the target (under `mode`) declares
    /// illegal remains.
    pub fn apply(
        &self,
        ctx: &mut IrContext,
        module: Module,
        target: &ConversionTarget,
        mode: ConversionMode,
    ) -> Result<ConversionOutcome, ConversionError> {
        let module_first_block = module.first_block(ctx);
        let body = module.body(ctx);

        // Seed the worklist with every op, outermost first.
        let mut worklist: VecDeque<OpRef> = VecDeque::new();
        let mut queued: HashSet<OpRef> = HashSet::new();
        for op in walk::collect_ops(ctx, body) {
            if queued.insert(op) {
                worklist.push_back(op);
            }
        }

        let mut rewrites = 0usize;
        while let Some(op) = worklist.pop_front() {
            queued.remove(&op);

            // Erased or detached since it was queued.
            if ctx.op(op).parent_block.is_none() {
                continue;
            }
            if target.is_legal(ctx, op, mode) == LegalityCheck::Legal {
                continue;
            }

            for pattern in &self.patterns {
                let mut rw = PatternRewriter::new(&self.type_converter);
                let matched = pattern.match_and_rewrite(ctx, op, &mut rw);
                debug_assert!(
                    matched || !rw.has_mutations(),
                    "pattern {} recorded mutations but did not match",
                    pattern.name()
                );
                if matched && rw.has_mutations() {
                    let mutations = rw.take_mutations();
                    let created = rewriter::apply_mutations(ctx, op, mutations, module_first_block);
                    rewrites += 1;
                    if rewrites > self.rewrite_limit {
                        return Err(ConversionError::Diverged {
                            limit: self.rewrite_limit,
                        });
                    }

                    // Re-enqueue created ops and everything nested in them.
                    for new_op in created {
                        if queued.insert(new_op) {
                            worklist.push_back(new_op);
                        }
                        let regions = ctx.op(new_op).regions.clone();
                        for region in regions {
                            for nested in walk::collect_ops(ctx, region) {
                                if queued.insert(nested) {
                                    worklist.push_back(nested);
                                }
                            }
                        }
                    }
                    break;
                }
            }
            // No pattern applied: the op stays; verification below decides
            // whether that is fatal.
        }

        let illegal = target.verify(ctx, module.body(ctx), mode);
        if illegal.is_empty() {
            Ok(ConversionOutcome { rewrites })
        } else {
            Err(ConversionError::Incomplete { illegal })
        }
    }
}
