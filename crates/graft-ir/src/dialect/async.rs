//! Async dialect: coroutine markers and runtime operations.
//!
//! Two families live here. The `coro_*` ops are abstract coroutine
//! structure markers that elaborate into `llvm.coro_*` intrinsics plus
//! frame allocation. The `runtime_*` ops are calls into the async runtime
//! ABI, lowered 1:1 to `func.call`s of declared runtime functions.
//!
//! Types: `token` and `group` are opaque synchronization handles;
//! `value<T>` is a storage cell holding a `T`. `coro_id`/`coro_state` map
//! to LLVM token values, `coro_handle` to a pointer.

use crate::{IrContext, Symbol, TypeDataBuilder, TypeRef};

crate::dialect! {
    mod r#async {
        type token;
        type group;
        type value(inner);
        type coro_id;
        type coro_state;
        type coro_handle;

        // ---- coroutine structure markers ----

        /// Identity of the enclosing coroutine.
        fn coro_id() -> id;

        /// Allocate the coroutine frame and begin execution.
        fn coro_begin(id) -> handle;

        /// Free the coroutine frame on the cleanup path.
        fn coro_free(id, handle);

        /// Mark the end of the coroutine on the final path.
        fn coro_end(handle);

        /// Capture coroutine state ahead of a suspension point.
        fn coro_save(handle) -> state;

        /// Suspension point with three-way continuation.
        fn coro_suspend(state) {
            #[successor(suspend_dest)]
            #[successor(resume_dest)]
            #[successor(cleanup_dest)]
        };

        // ---- runtime API ----

        /// Create a token, value storage, or group (per result type).
        fn runtime_create() -> result;

        /// Make a token or value available, waking awaiters.
        fn runtime_set_available(operand);

        /// Block until the token, value, or group is available.
        fn runtime_await(operand);

        /// Resume a suspended coroutine by handle.
        fn runtime_resume(handle);

        /// Schedule a coroutine resumption once the operand is available.
        fn runtime_await_and_resume(operand, handle);

        /// Write into a value's storage.
        fn runtime_store(value, storage);

        /// Read from a value's storage.
        fn runtime_load(storage) -> result;

        /// Add a token to a group; returns the token's rank in the group.
        fn runtime_add_to_group(operand, group) -> rank;

        #[attr(count: i32)]
        fn runtime_add_ref(operand);

        #[attr(count: i32)]
        fn runtime_drop_ref(operand);
    }
}

fn simple_ty(ctx: &mut IrContext, name: &'static str) -> TypeRef {
    ctx.types
        .intern(TypeDataBuilder::new(DIALECT_NAME(), Symbol::new(name)).build())
}

pub fn token_ty(ctx: &mut IrContext) -> TypeRef {
    simple_ty(ctx, "token")
}

pub fn group_ty(ctx: &mut IrContext) -> TypeRef {
    simple_ty(ctx, "group")
}

/// `async.value<inner>`: storage for a single `inner` payload.
pub fn value_ty(ctx: &mut IrContext, inner: TypeRef) -> TypeRef {
    ctx.types.intern(
        TypeDataBuilder::new(DIALECT_NAME(), Symbol::new("value"))
            .param(inner)
            .build(),
    )
}

/// Payload type of an `async.value<T>`, if `ty` is one.
pub fn value_payload(ctx: &IrContext, ty: TypeRef) -> Option<TypeRef> {
    let data = ctx.types.get(ty);
    if data.dialect == DIALECT_NAME() && data.name == "value" {
        Some(data.params[0])
    } else {
        None
    }
}

pub fn coro_id_ty(ctx: &mut IrContext) -> TypeRef {
    simple_ty(ctx, "coro_id")
}

pub fn coro_state_ty(ctx: &mut IrContext) -> TypeRef {
    simple_ty(ctx, "coro_state")
}

pub fn coro_handle_ty(ctx: &mut IrContext) -> TypeRef {
    simple_ty(ctx, "coro_handle")
}
