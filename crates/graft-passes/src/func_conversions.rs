//! Function-boundary type conversion: signatures, calls, and returns.
//!
//! `func.func` conversion rewrites the `func.fn` signature type and retypes
//! the entry block's arguments in place, then transplants the body into a
//! fresh header — the body's ops keep their identity, only the boundary
//! types change. Calls and returns are re-emitted with their operands and
//! result types passed through the converter.

use graft_ir::dialect::func;
use graft_ir::rewrite::{
    ConversionTarget, LegalityCheck, PatternRewriter, RewritePattern, TypeConverter, remap_value,
};
use graft_ir::{DialectOp, IrContext, OpRef, TypeRef, ValueRef};

/// Converts a `func.func`'s signature and entry-block argument types.
pub struct FuncSignatureConversion;

impl RewritePattern for FuncSignatureConversion {
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        rewriter: &mut PatternRewriter,
    ) -> bool {
        let Ok(func_op) = func::Func::from_op(ctx, op) else {
            return false;
        };

        let sig = func_op.r#type(ctx);
        let new_sig = rewriter.type_converter().convert_signature(ctx, sig);
        let body = func_op.body(ctx);

        let mut changed = new_sig != sig;
        if let Some(&entry) = ctx.region(body).blocks.first() {
            for &arg in ctx.block_args(entry).to_vec().iter() {
                let ty = ctx.value_ty(arg);
                changed |= rewriter.type_converter().convert_type(ctx, ty) != ty;
            }
        }
        if !changed {
            return false;
        }

        if let Some(&entry) = ctx.region(body).blocks.first() {
            let args: Vec<ValueRef> = ctx.block_args(entry).to_vec();
            for (index, &arg) in args.iter().enumerate() {
                let ty = ctx.value_ty(arg);
                let new_ty = rewriter.type_converter().convert_type(ctx, ty);
                if new_ty != ty {
                    ctx.set_block_arg_type(entry, index as u32, new_ty);
                }
            }
        }

        let location = ctx.op(op).location;
        let name = func_op.sym_name(ctx);
        ctx.detach_region(op, body);
        let new_func = func::func(ctx, location, name, new_sig, body);
        rewriter.replace_op(new_func.op_ref());
        true
    }

    fn name(&self) -> &'static str {
        "func-signature-conversion"
    }
}

/// Re-emits `func.call` with converted operand values and result types.
pub struct CallTypeConversion;

impl RewritePattern for CallTypeConversion {
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        rewriter: &mut PatternRewriter,
    ) -> bool {
        let Ok(call) = func::Call::from_op(ctx, op) else {
            return false;
        };

        let location = ctx.op(op).location;
        let result_tys: Vec<TypeRef> = ctx.op_result_types(op).to_vec();
        let mut converted = Vec::with_capacity(result_tys.len());
        let mut changed = false;
        for &ty in &result_tys {
            let new_ty = rewriter.type_converter().convert_type(ctx, ty);
            changed |= new_ty != ty;
            converted.push(new_ty);
        }

        let operands: Vec<ValueRef> = ctx.op_operands(op).to_vec();
        let mut remapped = Vec::with_capacity(operands.len());
        let mut prefix = Vec::new();
        for &operand in &operands {
            let (mapped, ops) = remap_value(ctx, rewriter.type_converter(), location, operand);
            changed |= mapped != operand;
            remapped.push(mapped);
            prefix.extend(ops);
        }
        if !changed {
            return false;
        }

        let callee = call.callee(ctx);
        let new_call = func::call(ctx, location, remapped, converted, callee);
        rewriter.replace_with_prefix(prefix, new_call.op_ref());
        true
    }

    fn name(&self) -> &'static str {
        "call-type-conversion"
    }
}

/// Re-emits `func.return` with converted operand values.
pub struct ReturnTypeConversion;

impl RewritePattern for ReturnTypeConversion {
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        rewriter: &mut PatternRewriter,
    ) -> bool {
        if !func::Return::matches(ctx, op) {
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

        let new_return = func::r#return(ctx, location, remapped);
        rewriter.replace_with_prefix(prefix, new_return.op_ref());
        true
    }

    fn name(&self) -> &'static str {
        "return-type-conversion"
    }
}

/// Register legality rules for the func dialect under a type conversion:
/// functions, calls, and returns are legal once their types are fixpoints.
pub fn add_func_legality(target: &mut ConversionTarget, converter: TypeConverter) {
    target.add_dynamic_check(move |ctx, op| {
        if func::Func::matches(ctx, op) {
            let Ok(func_op) = func::Func::from_op(ctx, op) else {
                return None;
            };
            let sig = func_op.r#type(ctx);
            // Judge the signature per slot; the fn type itself is never a
            // rule target.
            let mut legal = converter.convert_signature(ctx, sig) == sig;
            let body = func_op.body(ctx);
            if let Some(&entry) = ctx.region(body).blocks.first() {
                for &arg in ctx.block_args(entry).to_vec().iter() {
                    let ty = ctx.value_ty(arg);
                    legal &= converter.is_legal_type(ctx, ty);
                }
            }
            return Some(if legal {
                LegalityCheck::Legal
            } else {
                LegalityCheck::Illegal
            });
        }

        if func::Call::matches(ctx, op) || func::Return::matches(ctx, op) {
            let mut tys: Vec<TypeRef> = ctx
                .op_operands(op)
                .to_vec()
                .into_iter()
                .map(|v| ctx.value_ty(v))
                .collect();
            tys.extend_from_slice(ctx.op_result_types(op));
            let legal = tys
                .into_iter()
                .all(|ty| converter.is_legal_type(ctx, ty));
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
    use graft_ir::dialect::{self, core, func};
    use graft_ir::rewrite::{ConversionDriver, ConversionMode, Module};
    use graft_ir::{BlockData, IrContext, Location, RegionData, Span, Symbol};
    use smallvec::smallvec;

    fn test_ctx() -> (IrContext, Location) {
        let mut ctx = IrContext::new();
        let path = ctx.paths.intern("test.gr".to_owned());
        let loc = Location::new(path, Span::new(0, 0));
        (ctx, loc)
    }

    fn token_to_ptr_converter(ctx: &mut IrContext) -> TypeConverter {
        let ptr = dialect::llvm::ptr_ty(ctx);
        let mut converter = TypeConverter::new();
        converter.add_conversion(move |ctx, ty| {
            let data = ctx.types.get(ty);
            (data.dialect == "async" && data.name == "token").then_some(ptr)
        });
        converter
    }

    #[test]
    fn signature_and_entry_args_convert_together() {
        let (mut ctx, loc) = test_ctx();
        let token = dialect::r#async::token_ty(&mut ctx);
        let ptr = dialect::llvm::ptr_ty(&mut ctx);
        let nil = core::nil_ty(&mut ctx);
        let sig = func::fn_ty(&mut ctx, nil, [token]);

        let entry = ctx.create_block(BlockData::with_arg_types(loc, [token]));
        let arg = ctx.block_arg(entry, 0);
        let ret = func::r#return(&mut ctx, loc, []);
        ctx.push_op(entry, ret.op_ref());
        let body = ctx.create_region(RegionData {
            location: loc,
            blocks: smallvec![entry],
            parent_op: None,
        });
        let f = func::func(&mut ctx, loc, Symbol::new("consume"), sig, body);

        let mod_block = ctx.create_block(BlockData::empty(loc));
        ctx.push_op(mod_block, f.op_ref());
        let mod_region = ctx.create_region(RegionData {
            location: loc,
            blocks: smallvec![mod_block],
            parent_op: None,
        });
        let module_op = core::module(&mut ctx, loc, Symbol::new("test"), mod_region);
        let module = Module::new(&ctx, module_op.op_ref()).unwrap();

        let mut target = ConversionTarget::new();
        add_func_legality(&mut target, token_to_ptr_converter(&mut ctx));

        let converter = token_to_ptr_converter(&mut ctx);
        let driver = ConversionDriver::new(converter)
            .add_pattern(FuncSignatureConversion)
            .add_pattern(CallTypeConversion)
            .add_pattern(ReturnTypeConversion);

        driver
            .apply(&mut ctx, module, &target, ConversionMode::Partial)
            .unwrap();

        let new_f = func::Func::from_op(&ctx, module.ops(&ctx)[0]).unwrap();
        let new_sig = new_f.r#type(&ctx);
        assert_eq!(func::fn_param_tys(&ctx, new_sig).as_slice(), &[ptr]);
        // The entry block (and its argument value) survive with a new type.
        assert_eq!(ctx.value_ty(arg), ptr);
        assert_eq!(ctx.block(entry).ops.to_vec(), vec![ret.op_ref()]);
    }

    #[test]
    fn call_results_convert_and_legality_follows() {
        let (mut ctx, loc) = test_ctx();
        let token = dialect::r#async::token_ty(&mut ctx);
        let ptr = dialect::llvm::ptr_ty(&mut ctx);

        let call = func::call(&mut ctx, loc, [], [token], Symbol::new("make_token"));
        let mod_block = ctx.create_block(BlockData::empty(loc));
        ctx.push_op(mod_block, call.op_ref());
        let mod_region = ctx.create_region(RegionData {
            location: loc,
            blocks: smallvec![mod_block],
            parent_op: None,
        });
        let module_op = core::module(&mut ctx, loc, Symbol::new("test"), mod_region);
        let module = Module::new(&ctx, module_op.op_ref()).unwrap();

        let mut target = ConversionTarget::new();
        add_func_legality(&mut target, token_to_ptr_converter(&mut ctx));
        assert_eq!(
            target.legality(&mut ctx, call.op_ref()),
            Some(LegalityCheck::Illegal)
        );

        let converter = token_to_ptr_converter(&mut ctx);
        let driver = ConversionDriver::new(converter).add_pattern(CallTypeConversion);
        driver
            .apply(&mut ctx, module, &target, ConversionMode::Partial)
            .unwrap();

        let new_call = module.ops(&ctx)[0];
        assert!(func::Call::matches(&ctx, new_call));
        assert_eq!(ctx.op_result_types(new_call), &[ptr]);
        assert_eq!(
            target.legality(&mut ctx, new_call),
            Some(LegalityCheck::Legal)
        );
    }
}
