//! Llvm dialect: the lowering target vocabulary.
//!
//! Pointers, memory access, and the `llvm.coro.*` intrinsic family, plus
//! the handful of constant/conversion ops the coroutine lowering needs.

use crate::{IrContext, Symbol, TypeDataBuilder, TypeRef};

crate::dialect! {
    mod llvm {
        type ptr;
        type token;

        fn null() -> result;

        /// Pointer offset: `&base[index]`.
        fn getelementptr(base, index) -> result;

        fn ptrtoint(ptr) -> result;
        fn bitcast(value) -> result;

        fn load(ptr) -> result;
        fn store(value, ptr);

        // ---- coroutine intrinsics ----

        fn coro_id(align, promise, coroaddr, fnaddrs) -> result;
        fn coro_size() -> result;
        fn coro_begin(id, mem) -> result;
        fn coro_free(id, handle) -> result;
        fn coro_end(handle, unwind) -> result;
        fn coro_save(handle) -> result;
        fn coro_suspend(save, is_final) -> result;
        fn coro_resume(handle);
    }
}

/// Opaque `llvm.ptr`.
pub fn ptr_ty(ctx: &mut IrContext) -> TypeRef {
    ctx.types
        .intern(TypeDataBuilder::new(DIALECT_NAME(), Symbol::new("ptr")).build())
}

/// Typed pointer `llvm.ptr<pointee>`.
pub fn ptr_to_ty(ctx: &mut IrContext, pointee: TypeRef) -> TypeRef {
    ctx.types.intern(
        TypeDataBuilder::new(DIALECT_NAME(), Symbol::new("ptr"))
            .param(pointee)
            .build(),
    )
}

/// `llvm.token`, produced by `coro_id` and `coro_save`.
pub fn token_ty(ctx: &mut IrContext) -> TypeRef {
    ctx.types
        .intern(TypeDataBuilder::new(DIALECT_NAME(), Symbol::new("token")).build())
}

/// Pointee of `llvm.ptr<T>`, if `ty` is a typed pointer.
pub fn pointee(ctx: &IrContext, ty: TypeRef) -> Option<TypeRef> {
    let data = ctx.types.get(ty);
    if data.dialect == DIALECT_NAME() && data.name == "ptr" {
        data.params.first().copied()
    } else {
        None
    }
}
