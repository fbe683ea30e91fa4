//! Type-conversion patterns for region-owning structured control flow.
//!
//! `scf.for` and `scf.if` produce loop-carried/branch-joined values whose
//! types must track the active type conversion. The conversion clones the
//! operation header with converted result types and transplants the original
//! regions into it, so every nested op keeps its identity (and its worklist
//! membership); only the entry-block argument types are rewritten in place.
//! `scf.yield` gets a pass-through pattern that re-emits it with its
//! operands remapped to their converted renditions, plus a parent-aware
//! legality rule: a yield is judged by whether its parent's conversion has
//! reached it, not by its own kind.

use graft_ir::dialect::scf;
use graft_ir::rewrite::{
    ConversionTarget, LegalityCheck, PatternRewriter, RewritePattern, TypeConverter,
    clone_op_stripped, remap_value,
};
use graft_ir::{DialectOp, IrContext, OpRef, RegionRef, TypeRef, ValueRef};

/// Nearest enclosing operation, if any.
fn parent_op(ctx: &IrContext, op: OpRef) -> Option<OpRef> {
    let block = ctx.op(op).parent_block?;
    let region = ctx.block(block).parent_region?;
    ctx.region(region).parent_op
}

/// Clone a region-owning op with converted result types, transplanting its
/// regions and retyping each region's entry-block arguments in place.
///
/// Returns `false` without touching the graph when every result and entry
/// argument type is already a fixpoint of the conversion.
pub(crate) fn convert_region_op_types(
    ctx: &mut IrContext,
    rewriter: &mut PatternRewriter,
    op: OpRef,
) -> bool {
    let result_tys: Vec<TypeRef> = ctx.op_result_types(op).to_vec();
    let mut converted = Vec::with_capacity(result_tys.len());
    let mut changed = false;
    for &ty in &result_tys {
        let new_ty = rewriter.type_converter().convert_type(ctx, ty);
        changed |= new_ty != ty;
        converted.push(new_ty);
    }

    let regions: Vec<RegionRef> = ctx.op(op).regions.to_vec();
    for &region in &regions {
        if let Some(&entry) = ctx.region(region).blocks.first() {
            for &arg in ctx.block_args(entry).to_vec().iter() {
                let ty = ctx.value_ty(arg);
                changed |= rewriter.type_converter().convert_type(ctx, ty) != ty;
            }
        }
    }

    if !changed {
        return false;
    }

    // Point of no return: retype entry args, transplant regions, clone.
    for &region in &regions {
        if let Some(&entry) = ctx.region(region).blocks.first() {
            let args: Vec<_> = ctx.block_args(entry).to_vec();
            for (index, &arg) in args.iter().enumerate() {
                let ty = ctx.value_ty(arg);
                let new_ty = rewriter.type_converter().convert_type(ctx, ty);
                if new_ty != ty {
                    ctx.set_block_arg_type(entry, index as u32, new_ty);
                }
            }
        }
        ctx.detach_region(op, region);
    }

    let new_op = clone_op_stripped(ctx, op, converted, regions);
    rewriter.replace_op(new_op);
    true
}

/// Converts `scf.for` result, iteration-argument, and induction types.
pub struct ForOpTypeConversion;

impl RewritePattern for ForOpTypeConversion {
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        rewriter: &mut PatternRewriter,
    ) -> bool {
        if !scf::For::matches(ctx, op) {
            return false;
        }
        convert_region_op_types(ctx, rewriter, op)
    }

    fn name(&self) -> &'static str {
        "for-op-type-conversion"
    }
}

/// Converts `scf.if` result types, transplanting both branch regions.
pub struct IfOpTypeConversion;

impl RewritePattern for IfOpTypeConversion {
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        rewriter: &mut PatternRewriter,
    ) -> bool {
        if !scf::If::matches(ctx, op) {
            return false;
        }
        convert_region_op_types(ctx, rewriter, op)
    }

    fn name(&self) -> &'static str {
        "if-op-type-conversion"
    }
}

/// Re-emits `scf.yield` with operands remapped to their converted values.
///
/// Applies only inside `scf.for`/`scf.if`; yields under other parents are
/// that parent's business.
pub struct YieldOpTypeConversion;

impl RewritePattern for YieldOpTypeConversion {
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        rewriter: &mut PatternRewriter,
    ) -> bool {
        if !scf::Yield::matches(ctx, op) {
            return false;
        }
        let inside_structured = parent_op(ctx, op)
            .is_some_and(|p| scf::For::matches(ctx, p) || scf::If::matches(ctx, p));
        if !inside_structured {
            return false;
        }

        let location = ctx.op(op).location;
        let operands: Vec<ValueRef> = ctx.op_operands(op).to_vec();
        let mut remapped = Vec::with_capacity(operands.len());
        let mut prefix = Vec::new();
        let mut changed = false;
        for &operand in &operands {
            let (mapped, ops) = remap_value(ctx, rewriter.type_converter(), location, operand);
            changed |= mapped != operand;
            remapped.push(mapped);
            prefix.extend(ops);
        }
        if !changed {
            return false;
        }

        let new_yield = scf::r#yield(ctx, location, remapped);
        rewriter.replace_with_prefix(prefix, new_yield.op_ref());
        true
    }

    fn name(&self) -> &'static str {
        "yield-op-type-conversion"
    }
}

/// Register the structural patterns' legality rules.
///
/// `scf.for` and `scf.if` are legal once their result types are fixpoints of
/// the conversion. `scf.yield` is judged relative to its parent: inside a
/// `for` or `if` it is legal only once its operand types have converted;
/// under any other parent it gets no opinion here.
pub fn add_structural_legality(target: &mut ConversionTarget, converter: TypeConverter) {
    target.add_dynamic_check(move |ctx, op| {
        if scf::For::matches(ctx, op) || scf::If::matches(ctx, op) {
            let tys: Vec<TypeRef> = ctx.op_result_types(op).to_vec();
            let legal = tys.iter().all(|&ty| converter.is_legal_type(ctx, ty));
            return Some(if legal {
                LegalityCheck::Legal
            } else {
                LegalityCheck::Illegal
            });
        }

        if scf::Yield::matches(ctx, op) {
            let structured_parent = parent_op(ctx, op)
                .is_some_and(|p| scf::For::matches(ctx, p) || scf::If::matches(ctx, p));
            if !structured_parent {
                return None;
            }
            let tys: Vec<TypeRef> = ctx
                .op_operands(op)
                .to_vec()
                .into_iter()
                .map(|v| ctx.value_ty(v))
                .collect();
            let legal = tys.iter().all(|&ty| converter.is_legal_type(ctx, ty));
            return Some(if legal {
                LegalityCheck::Legal
            } else {
                LegalityCheck::Illegal
            });
        }

        None
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use graft_ir::dialect::{self, core, scf};
    use graft_ir::rewrite::{ConversionDriver, ConversionMode, Module};
    use graft_ir::{BlockData, IrContext, Location, RegionData, Span, Symbol, TypeRef, walk};
    use smallvec::smallvec;

    fn test_ctx() -> (IrContext, Location) {
        let mut ctx = IrContext::new();
        let path = ctx.paths.intern("test.gr".to_owned());
        let loc = Location::new(path, Span::new(0, 0));
        (ctx, loc)
    }

    fn value_to_ptr_converter(ctx: &mut IrContext) -> TypeConverter {
        let ptr = dialect::llvm::ptr_ty(ctx);
        let mut converter = TypeConverter::new();
        converter.add_conversion(move |ctx, ty| {
            let data = ctx.types.get(ty);
            (data.dialect == "async" && data.name == "value").then_some(ptr)
        });
        converter
    }

    fn make_module(ctx: &mut IrContext, loc: Location, ops: Vec<graft_ir::OpRef>) -> Module {
        let block = ctx.create_block(BlockData::empty(loc));
        for op in ops {
            ctx.push_op(block, op);
        }
        let region = ctx.create_region(RegionData {
            location: loc,
            blocks: smallvec![block],
            parent_op: None,
        });
        let module = core::module(ctx, loc, Symbol::new("test"), region);
        Module::new(ctx, module.op_ref()).expect("core.module")
    }

    /// scf.if yielding one async.value<i64> in each arm.
    fn build_conditional(
        ctx: &mut IrContext,
        loc: Location,
        value_ty: TypeRef,
    ) -> (graft_ir::OpRef, Vec<graft_ir::OpRef>) {
        let i1 = core::i1_ty(ctx);
        let cond = dialect::arith::const_bool(ctx, loc, i1, true);

        let mut arm = |ctx: &mut IrContext| {
            let create = dialect::r#async::runtime_create(ctx, loc, value_ty);
            let yield_op = scf::r#yield(ctx, loc, [create.result(ctx)]);
            let block = ctx.create_block(BlockData::empty(loc));
            ctx.push_op(block, create.op_ref());
            ctx.push_op(block, yield_op.op_ref());
            let region = ctx.create_region(RegionData {
                location: loc,
                blocks: smallvec![block],
                parent_op: None,
            });
            (region, create.op_ref(), yield_op.op_ref())
        };
        let (then_region, then_create, then_yield) = arm(ctx);
        let (else_region, else_create, else_yield) = arm(ctx);

        let if_op = scf::r#if(
            ctx,
            loc,
            cond.result(ctx),
            [value_ty],
            then_region,
            else_region,
        );
        (
            if_op.op_ref(),
            vec![
                cond.op_ref(),
                then_create,
                then_yield,
                else_create,
                else_yield,
            ],
        )
    }

    #[test]
    fn conditional_result_type_converts_with_region_transplant() {
        let (mut ctx, loc) = test_ctx();
        let i64_ty = core::i64_ty(&mut ctx);
        let value_ty = dialect::r#async::value_ty(&mut ctx, i64_ty);
        let ptr = dialect::llvm::ptr_ty(&mut ctx);

        let (if_op, inner_ops) = build_conditional(&mut ctx, loc, value_ty);
        let cond_op = inner_ops[0];
        let module = make_module(&mut ctx, loc, vec![cond_op, if_op]);

        let mut target = ConversionTarget::new();
        target.add_legal_dialect("async");
        target.add_legal_dialect("arith");
        add_structural_legality(&mut target, value_to_ptr_converter(&mut ctx));

        let converter = value_to_ptr_converter(&mut ctx);
        let driver = ConversionDriver::new(converter)
            .add_pattern(ForOpTypeConversion)
            .add_pattern(IfOpTypeConversion)
            .add_pattern(YieldOpTypeConversion);

        driver
            .apply(&mut ctx, module, &target, ConversionMode::Partial)
            .unwrap();

        let top = module.ops(&ctx);
        let new_if = top[1];
        assert!(scf::If::matches(&ctx, new_if));
        assert_ne!(new_if, if_op);
        assert_eq!(ctx.op_result_types(new_if), &[ptr]);

        // Region transplanted: the producer keeps its identity; the yield
        // was re-emitted with a materialized cast to the converted type.
        let then_region = ctx.op(new_if).regions[0];
        let nested = walk::collect_ops(&ctx, then_region);
        assert_eq!(nested.len(), 3);
        assert_eq!(nested[0], inner_ops[1]);
        let new_yield = scf::Yield::from_op(&ctx, nested[2]).unwrap();
        let yielded = ctx.op_operands(new_yield.op_ref())[0];
        assert_eq!(ctx.value_ty(yielded), ptr);
    }

    #[test]
    fn identity_conversion_leaves_graph_untouched() {
        let (mut ctx, loc) = test_ctx();
        let i64_ty = core::i64_ty(&mut ctx);
        let value_ty = dialect::r#async::value_ty(&mut ctx, i64_ty);

        let (if_op, inner_ops) = build_conditional(&mut ctx, loc, value_ty);
        let module = make_module(&mut ctx, loc, vec![inner_ops[0], if_op]);

        // No conversion rules: everything is a fixpoint, zero rewrites.
        let mut target = ConversionTarget::new();
        add_structural_legality(&mut target, TypeConverter::new());
        let driver = ConversionDriver::new(TypeConverter::new())
            .add_pattern(ForOpTypeConversion)
            .add_pattern(IfOpTypeConversion);

        let outcome = driver
            .apply(&mut ctx, module, &target, ConversionMode::Partial)
            .unwrap();
        assert_eq!(outcome.rewrites, 0);
        assert_eq!(module.ops(&ctx), vec![inner_ops[0], if_op]);
    }

    #[test]
    fn for_loop_iter_args_retype_in_place() {
        let (mut ctx, loc) = test_ctx();
        let i64_ty = core::i64_ty(&mut ctx);
        let value_ty = dialect::r#async::value_ty(&mut ctx, i64_ty);
        let ptr = dialect::llvm::ptr_ty(&mut ctx);

        let lb = dialect::arith::const_int(&mut ctx, loc, i64_ty, 0);
        let ub = dialect::arith::const_int(&mut ctx, loc, i64_ty, 10);
        let step = dialect::arith::const_int(&mut ctx, loc, i64_ty, 1);
        let init = dialect::r#async::runtime_create(&mut ctx, loc, value_ty);

        // Body: ^bb(%iv: i64, %carried: value<i64>) { yield %carried }
        let entry = ctx.create_block(BlockData::with_arg_types(loc, [i64_ty, value_ty]));
        let carried = ctx.block_arg(entry, 1);
        let yield_op = scf::r#yield(&mut ctx, loc, [carried]);
        ctx.push_op(entry, yield_op.op_ref());
        let body = ctx.create_region(RegionData {
            location: loc,
            blocks: smallvec![entry],
            parent_op: None,
        });

        let lb_val = lb.result(&ctx);
        let ub_val = ub.result(&ctx);
        let step_val = step.result(&ctx);
        let init_val = init.result(&ctx);
        let for_op = scf::r#for(
            &mut ctx,
            loc,
            lb_val,
            ub_val,
            step_val,
            [init_val],
            [value_ty],
            body,
        );

        let module = make_module(
            &mut ctx,
            loc,
            vec![
                lb.op_ref(),
                ub.op_ref(),
                step.op_ref(),
                init.op_ref(),
                for_op.op_ref(),
            ],
        );

        let mut target = ConversionTarget::new();
        target.add_legal_dialect("async");
        target.add_legal_dialect("arith");
        add_structural_legality(&mut target, value_to_ptr_converter(&mut ctx));

        let converter = value_to_ptr_converter(&mut ctx);
        let driver = ConversionDriver::new(converter).add_pattern(ForOpTypeConversion);

        driver
            .apply(&mut ctx, module, &target, ConversionMode::Partial)
            .unwrap();

        // Same block, same arg values, converted carried type, same yield.
        assert_eq!(ctx.value_ty(ctx.block_arg(entry, 0)), i64_ty);
        assert_eq!(ctx.value_ty(carried), ptr);
        assert_eq!(ctx.block(entry).ops.to_vec(), vec![yield_op.op_ref()]);
        assert_eq!(ctx.op_operands(yield_op.op_ref()), &[carried]);

        let new_for = module.ops(&ctx)[4];
        assert!(scf::For::matches(&ctx, new_for));
        assert_eq!(ctx.op_result_types(new_for), &[ptr]);
    }

    #[test]
    fn yield_legality_tracks_parent() {
        let (mut ctx, loc) = test_ctx();
        let i64_ty = core::i64_ty(&mut ctx);
        let value_ty = dialect::r#async::value_ty(&mut ctx, i64_ty);

        let (if_op, inner_ops) = build_conditional(&mut ctx, loc, value_ty);
        let _module = make_module(&mut ctx, loc, vec![inner_ops[0], if_op]);
        let then_yield = inner_ops[2];

        let mut target = ConversionTarget::new();
        add_structural_legality(&mut target, value_to_ptr_converter(&mut ctx));

        // Yielding an unconverted async.value inside scf.if is illegal;
        // an identity ruleset has no complaint.
        assert_eq!(
            target.legality(&mut ctx, then_yield),
            Some(LegalityCheck::Illegal)
        );

        let mut identity_target = ConversionTarget::new();
        add_structural_legality(&mut identity_target, TypeConverter::new());
        assert_eq!(
            identity_target.legality(&mut ctx, then_yield),
            Some(LegalityCheck::Legal)
        );

        // A yield outside for/if gets no opinion.
        let detached_yield = scf::r#yield(&mut ctx, loc, []);
        assert_eq!(target.legality(&mut ctx, detached_yield.op_ref()), None);
    }
}
