//! Async runtime ABI: function names, signatures, and lazy declarations.
//!
//! Every handle crosses the ABI as an opaque `llvm.ptr`. Declarations are
//! inserted at module scope at most once, on first use, via
//! `Module::lookup_symbol`. The `__resume` trampoline wraps the raw
//! `llvm.coro_resume` primitive so a coroutine resumption can be handed to
//! the runtime as a plain function pointer.

use graft_ir::dialect::{core, func, llvm};
use graft_ir::rewrite::{Module, PatternRewriter};
use graft_ir::{BlockData, DialectOp, IrContext, Location, RegionData, Symbol, TypeRef, symbols};
use smallvec::smallvec;

symbols! {
    CREATE_TOKEN => "async_runtime_create_token",
    CREATE_VALUE => "async_runtime_create_value",
    CREATE_GROUP => "async_runtime_create_group",
    EMPLACE_TOKEN => "async_runtime_emplace_token",
    EMPLACE_VALUE => "async_runtime_emplace_value",
    GET_VALUE_STORAGE => "async_runtime_get_value_storage",
    ADD_TOKEN_TO_GROUP => "async_runtime_add_token_to_group",
    AWAIT_TOKEN => "async_runtime_await_token",
    AWAIT_VALUE => "async_runtime_await_value",
    AWAIT_ALL_IN_GROUP => "async_runtime_await_all_in_group",
    EXECUTE => "async_runtime_execute",
    AWAIT_TOKEN_AND_EXECUTE => "async_runtime_await_token_and_execute",
    AWAIT_VALUE_AND_EXECUTE => "async_runtime_await_value_and_execute",
    AWAIT_ALL_AND_EXECUTE => "async_runtime_await_all_and_execute",
    ADD_REF => "async_runtime_add_ref",
    DROP_REF => "async_runtime_drop_ref",
    MALLOC => "malloc",
    FREE => "free",
    RESUME_WRAPPER => "__resume",
}

/// One entry point of the fixed runtime/allocator ABI.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuntimeFunc {
    CreateToken,
    CreateValue,
    CreateGroup,
    EmplaceToken,
    EmplaceValue,
    GetValueStorage,
    AddTokenToGroup,
    AwaitToken,
    AwaitValue,
    AwaitAllInGroup,
    Execute,
    AwaitTokenAndExecute,
    AwaitValueAndExecute,
    AwaitAllAndExecute,
    AddRef,
    DropRef,
    Malloc,
    Free,
}

impl RuntimeFunc {
    /// The linkage name of this entry point.
    pub fn symbol(self) -> Symbol {
        match self {
            Self::CreateToken => CREATE_TOKEN(),
            Self::CreateValue => CREATE_VALUE(),
            Self::CreateGroup => CREATE_GROUP(),
            Self::EmplaceToken => EMPLACE_TOKEN(),
            Self::EmplaceValue => EMPLACE_VALUE(),
            Self::GetValueStorage => GET_VALUE_STORAGE(),
            Self::AddTokenToGroup => ADD_TOKEN_TO_GROUP(),
            Self::AwaitToken => AWAIT_TOKEN(),
            Self::AwaitValue => AWAIT_VALUE(),
            Self::AwaitAllInGroup => AWAIT_ALL_IN_GROUP(),
            Self::Execute => EXECUTE(),
            Self::AwaitTokenAndExecute => AWAIT_TOKEN_AND_EXECUTE(),
            Self::AwaitValueAndExecute => AWAIT_VALUE_AND_EXECUTE(),
            Self::AwaitAllAndExecute => AWAIT_ALL_AND_EXECUTE(),
            Self::AddRef => ADD_REF(),
            Self::DropRef => DROP_REF(),
            Self::Malloc => MALLOC(),
            Self::Free => FREE(),
        }
    }

    /// The `func.fn` signature of this entry point.
    pub fn signature(self, ctx: &mut IrContext) -> TypeRef {
        let ptr = llvm::ptr_ty(ctx);
        let nil = core::nil_ty(ctx);
        match self {
            Self::CreateToken | Self::CreateGroup => func::fn_ty(ctx, ptr, []),
            Self::CreateValue => {
                let i32_ty = core::i32_ty(ctx);
                func::fn_ty(ctx, ptr, [i32_ty])
            }
            Self::EmplaceToken
            | Self::EmplaceValue
            | Self::AwaitToken
            | Self::AwaitValue
            | Self::AwaitAllInGroup
            | Self::Free => func::fn_ty(ctx, nil, [ptr]),
            Self::GetValueStorage => func::fn_ty(ctx, ptr, [ptr]),
            Self::AddTokenToGroup => {
                let i64_ty = core::i64_ty(ctx);
                func::fn_ty(ctx, i64_ty, [ptr, ptr])
            }
            Self::Execute => func::fn_ty(ctx, nil, [ptr, ptr]),
            Self::AwaitTokenAndExecute
            | Self::AwaitValueAndExecute
            | Self::AwaitAllAndExecute => func::fn_ty(ctx, nil, [ptr, ptr, ptr]),
            Self::AddRef | Self::DropRef => {
                let i32_ty = core::i32_ty(ctx);
                func::fn_ty(ctx, nil, [ptr, i32_ty])
            }
            Self::Malloc => {
                let i64_ty = core::i64_ty(ctx);
                func::fn_ty(ctx, ptr, [i64_ty])
            }
        }
    }
}

/// Ensure a declaration for `f` exists in the module; returns the callee
/// symbol to use in `func.call`.
pub fn declare(
    ctx: &mut IrContext,
    module: Module,
    rewriter: &mut PatternRewriter,
    location: Location,
    f: RuntimeFunc,
) -> Symbol {
    let name = f.symbol();
    if module.lookup_symbol(ctx, name).is_none() {
        let sig = f.signature(ctx);
        let region = ctx.create_region(RegionData::empty(location));
        let decl = func::func(ctx, location, name, sig, region);
        rewriter.add_module_op(decl.op_ref());
    }
    name
}

/// Ensure the `__resume` trampoline exists; returns its symbol.
///
/// `fn __resume(%handle: llvm.ptr) { llvm.coro_resume %handle; return }` —
/// a plain function the runtime can invoke as a continuation callback.
pub fn ensure_resume_wrapper(
    ctx: &mut IrContext,
    module: Module,
    rewriter: &mut PatternRewriter,
    location: Location,
) -> Symbol {
    let name = RESUME_WRAPPER();
    if module.lookup_symbol(ctx, name).is_none() {
        let ptr = llvm::ptr_ty(ctx);
        let nil = core::nil_ty(ctx);
        let sig = func::fn_ty(ctx, nil, [ptr]);

        let entry = ctx.create_block(BlockData::with_arg_types(location, [ptr]));
        let handle = ctx.block_arg(entry, 0);
        let resume = llvm::coro_resume(ctx, location, handle);
        ctx.push_op(entry, resume.op_ref());
        let ret = func::r#return(ctx, location, []);
        ctx.push_op(entry, ret.op_ref());

        let body = ctx.create_region(RegionData {
            location,
            blocks: smallvec![entry],
            parent_op: None,
        });
        let wrapper = func::func(ctx, location, name, sig, body);
        rewriter.add_module_op(wrapper.op_ref());
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signatures_match_the_abi() {
        let mut ctx = IrContext::new();
        let ptr = llvm::ptr_ty(&mut ctx);
        let nil = core::nil_ty(&mut ctx);
        let i32_ty = core::i32_ty(&mut ctx);
        let i64_ty = core::i64_ty(&mut ctx);

        let sig = RuntimeFunc::CreateValue.signature(&mut ctx);
        assert_eq!(func::fn_return_ty(&ctx, sig), ptr);
        assert_eq!(func::fn_param_tys(&ctx, sig).as_slice(), &[i32_ty]);

        let sig = RuntimeFunc::AddTokenToGroup.signature(&mut ctx);
        assert_eq!(func::fn_return_ty(&ctx, sig), i64_ty);
        assert_eq!(func::fn_param_tys(&ctx, sig).as_slice(), &[ptr, ptr]);

        let sig = RuntimeFunc::DropRef.signature(&mut ctx);
        assert_eq!(func::fn_return_ty(&ctx, sig), nil);
        assert_eq!(func::fn_param_tys(&ctx, sig).as_slice(), &[ptr, i32_ty]);

        let sig = RuntimeFunc::AwaitTokenAndExecute.signature(&mut ctx);
        assert_eq!(func::fn_param_tys(&ctx, sig).as_slice(), &[ptr, ptr, ptr]);
    }

    #[test]
    fn every_entry_point_has_a_distinct_name() {
        let all = [
            RuntimeFunc::CreateToken,
            RuntimeFunc::CreateValue,
            RuntimeFunc::CreateGroup,
            RuntimeFunc::EmplaceToken,
            RuntimeFunc::EmplaceValue,
            RuntimeFunc::GetValueStorage,
            RuntimeFunc::AddTokenToGroup,
            RuntimeFunc::AwaitToken,
            RuntimeFunc::AwaitValue,
            RuntimeFunc::AwaitAllInGroup,
            RuntimeFunc::Execute,
            RuntimeFunc::AwaitTokenAndExecute,
            RuntimeFunc::AwaitValueAndExecute,
            RuntimeFunc::AwaitAllAndExecute,
            RuntimeFunc::AddRef,
            RuntimeFunc::DropRef,
            RuntimeFunc::Malloc,
            RuntimeFunc::Free,
        ];
        let mut names: Vec<Symbol> = all.iter().map(|f| f.symbol()).collect();
        names.sort_by_key(|s| s.with_str(|t| t.to_owned()));
        names.dedup();
        assert_eq!(names.len(), all.len());
    }
}
