//! Cleanup of `core.unrealized_conversion_cast` ops left behind by the
//! conversion driver.
//!
//! The driver bridges every type-changing replacement with a cast so the
//! graph stays well-typed mid-conversion. Once both sides of a boundary
//! have converted, the casts carry no information: an identity cast (input
//! and result type agree) forwards its input, a back-to-back pair that
//! round-trips a type collapses to the original value, and a cast nothing
//! reads is dropped. Runs to a fixpoint, since collapsing one cast can
//! orphan another. Casts that still bridge a genuine type change are left
//! in place for a later pass (or a verifier) to flag.

use graft_ir::dialect::core;
use graft_ir::rewrite::Module;
use graft_ir::{DialectOp, IrContext, OpRef, ValueDef, walk};

/// Fold and remove redundant conversion casts in `module`.
///
/// Returns the number of casts removed.
pub fn resolve_casts(ctx: &mut IrContext, module: Module) -> usize {
    let mut removed = 0;
    loop {
        let casts: Vec<OpRef> = walk::collect_ops(ctx, module.body(ctx))
            .into_iter()
            .filter(|&op| core::UnrealizedConversionCast::matches(ctx, op))
            .collect();

        let mut changed = false;
        for cast in casts {
            let result = ctx.op_result(cast, 0);
            let input = ctx.op_operands(cast)[0];
            let result_ty = ctx.value_ty(result);

            // Identity: the input already has the result type.
            if ctx.value_ty(input) == result_ty {
                ctx.replace_all_uses(result, input);
            } else if let ValueDef::OpResult(inner, _) = ctx.value_def(input) {
                // Round-trip pair: cast(cast(x : A -> B) : B -> A) == x.
                if core::UnrealizedConversionCast::matches(ctx, inner) {
                    let inner_input = ctx.op_operands(inner)[0];
                    if ctx.value_ty(inner_input) == result_ty {
                        ctx.replace_all_uses(result, inner_input);
                    }
                }
            }

            if !ctx.has_uses(result) {
                if let Some(block) = ctx.op(cast).parent_block {
                    ctx.remove_op_from_block(block, cast);
                }
                ctx.remove_op(cast);
                removed += 1;
                changed = true;
            }
        }

        if !changed {
            break;
        }
    }
    removed
}
