//! Rewrite infrastructure: in-place mutation + RAUW-based legalization.
//!
//! A `ConversionDriver` pulls operations off a worklist, asks a
//! `ConversionTarget` whether each one is already legal, and otherwise tries
//! `RewritePattern`s in order. Patterns record mutations through a
//! `PatternRewriter`; type changes route through the shared `TypeConverter`.

pub mod conversion_target;
pub mod driver;
pub mod helpers;
pub mod pattern;
pub mod rewriter;
pub mod type_converter;

pub use conversion_target::{ConversionTarget, IllegalOp, LegalityCheck};
pub use driver::{ConversionDriver, ConversionError, ConversionMode, ConversionOutcome};
pub use helpers::{clone_op_stripped, remap_value};
pub use pattern::RewritePattern;
pub use rewriter::PatternRewriter;
pub use type_converter::{MaterializeResult, TypeConverter};

use crate::context::IrContext;
use crate::refs::{BlockRef, OpRef, RegionRef};
use crate::types::Attribute;

/// Thin wrapper around an `OpRef` pointing to a `core.module` operation.
///
/// Provides convenience methods for accessing module body and operations.
#[derive(Clone, Copy, Debug)]
pub struct Module(pub OpRef);

impl Module {
    /// Create a `Module` wrapper, verifying it points to a `core.module` op.
    pub fn new(ctx: &IrContext, op: OpRef) -> Option<Self> {
        let data = ctx.op(op);
        if data.dialect == crate::Symbol::new("core") && data.name == crate::Symbol::new("module") {
            Some(Module(op))
        } else {
            None
        }
    }

    /// Get the underlying `OpRef`.
    pub fn op(self) -> OpRef {
        self.0
    }

    /// Get the module's body region.
    pub fn body(self, ctx: &IrContext) -> RegionRef {
        ctx.op(self.0).regions[0]
    }

    /// Get all top-level operations in the module's first block.
    pub fn ops(self, ctx: &IrContext) -> Vec<OpRef> {
        let region = self.body(ctx);
        let blocks = &ctx.region(region).blocks;
        if blocks.is_empty() {
            return vec![];
        }
        ctx.block(blocks[0]).ops.to_vec()
    }

    /// Get the module name (from `sym_name` attribute).
    pub fn name(self, ctx: &IrContext) -> Option<crate::Symbol> {
        ctx.op(self.0)
            .attributes
            .get(&crate::Symbol::new("sym_name"))
            .and_then(|a| match a {
                Attribute::Symbol(s) => Some(*s),
                _ => None,
            })
    }

    /// Get the first block of the module body.
    pub fn first_block(self, ctx: &IrContext) -> Option<BlockRef> {
        let region = self.body(ctx);
        ctx.region(region).blocks.first().copied()
    }

    /// Find a top-level op whose `sym_name` attribute matches, e.g. a
    /// function declaration. Lets lowering passes add declarations
    /// idempotently.
    pub fn lookup_symbol(self, ctx: &IrContext, name: crate::Symbol) -> Option<OpRef> {
        self.ops(ctx).into_iter().find(|&op| {
            matches!(
                ctx.op(op).attributes.get(&crate::Symbol::new("sym_name")),
                Some(Attribute::Symbol(s)) if *s == name
            )
        })
    }
}
