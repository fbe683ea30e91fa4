//! Lowering of the `async` dialect to `llvm.coro_*` intrinsics and runtime
//! ABI calls.
//!
//! Coroutine structure markers elaborate into the LLVM coroutine intrinsic
//! protocol: `coro_id` gains its alignment/promise constants, `coro_begin`
//! allocates the frame through `malloc`, `coro_free` releases it through
//! `free`, and `coro_suspend` becomes a widened suspend code driving a
//! three-way `cf.switch` (0 resumes, 1 cleans up, anything else stays
//! suspended). Runtime ops lower 1:1 to calls against the ABI declared in
//! [`crate::runtime_api`], with the callee picked by the handle kind (token,
//! value, or group). Payload sizes are computed portably with the
//! null-pointer `getelementptr`/`ptrtoint` idiom, so the lowering never
//! needs a data layout.

use graft_ir::dialect::{arith, cf, core, func, llvm, r#async};
use graft_ir::rewrite::{
    ConversionDriver, ConversionError, ConversionMode, ConversionOutcome, ConversionTarget,
    Module, PatternRewriter, RewritePattern, TypeConverter, remap_value,
};
use graft_ir::{DialectOp, IrContext, OpRef, TypeRef};

use crate::func_conversions::{
    CallTypeConversion, FuncSignatureConversion, ReturnTypeConversion, add_func_legality,
};
use crate::runtime_api::{self, RuntimeFunc};
use crate::structural::{
    ForOpTypeConversion, IfOpTypeConversion, YieldOpTypeConversion, add_structural_legality,
};

/// The type conversion used throughout the async lowering.
///
/// Synchronization handles (`async.token`, `async.group`, `async.value<T>`)
/// and coroutine handles become opaque `llvm.ptr`; the coroutine id and
/// saved-state markers become `llvm.token`. Everything else is left alone.
pub fn async_type_converter() -> TypeConverter {
    let mut converter = TypeConverter::new();
    converter.add_conversion(|ctx, ty| {
        let (dialect, name) = {
            let data = ctx.types.get(ty);
            (data.dialect, data.name)
        };
        if dialect != r#async::DIALECT_NAME() {
            return None;
        }
        if name == "token" || name == "group" || name == "value" || name == "coro_handle" {
            Some(llvm::ptr_ty(ctx))
        } else if name == "coro_id" || name == "coro_state" {
            Some(llvm::token_ty(ctx))
        } else {
            None
        }
    });
    converter
}

/// Payload-only conversion stage: async handles keep their kind while value
/// payloads convert, `async.value<T>` becoming `async.value<T'>`. Pairs with
/// the structural and function-boundary patterns when a pipeline lowers
/// payload types ahead of the handles themselves.
pub fn async_payload_converter(payload: TypeConverter) -> TypeConverter {
    let mut converter = TypeConverter::new();
    converter.add_conversion(move |ctx, ty| {
        let inner = r#async::value_payload(ctx, ty)?;
        let converted = payload.convert_type(ctx, inner);
        (converted != inner).then(|| r#async::value_ty(ctx, converted))
    });
    converter
}

/// Which runtime handle kind a type denotes.
#[derive(Clone, Copy, PartialEq, Eq)]
enum HandleKind {
    Token,
    Value,
    Group,
}

fn handle_kind(ctx: &IrContext, ty: TypeRef) -> Option<HandleKind> {
    let data = ctx.types.get(ty);
    if data.dialect != r#async::DIALECT_NAME() {
        return None;
    }
    if data.name == "token" {
        Some(HandleKind::Token)
    } else if data.name == "value" {
        Some(HandleKind::Value)
    } else if data.name == "group" {
        Some(HandleKind::Group)
    } else {
        None
    }
}

// ---- coroutine structure lowering ----

/// `async.coro_id` → `llvm.coro_id` with zero alignment and null
/// promise/coroaddr/fnaddrs.
pub struct CoroIdLowering;

impl RewritePattern for CoroIdLowering {
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        rewriter: &mut PatternRewriter,
    ) -> bool {
        if !r#async::CoroId::matches(ctx, op) {
            return false;
        }
        let location = ctx.op(op).location;

        let i32_ty = core::i32_ty(ctx);
        let align = arith::const_int(ctx, location, i32_ty, 0);
        let ptr = llvm::ptr_ty(ctx);
        let null = llvm::null(ctx, location, ptr);
        let token = llvm::token_ty(ctx);
        let align_v = align.result(ctx);
        let null_v = null.result(ctx);
        let id = llvm::coro_id(ctx, location, align_v, null_v, null_v, null_v, token);

        rewriter.replace_with_prefix(vec![align.op_ref(), null.op_ref()], id.op_ref());
        true
    }

    fn name(&self) -> &'static str {
        "coro-id-lowering"
    }
}

/// `async.coro_begin` → frame allocation via `malloc(llvm.coro_size)` and
/// `llvm.coro_begin`.
pub struct CoroBeginLowering {
    pub module: Module,
}

impl RewritePattern for CoroBeginLowering {
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        rewriter: &mut PatternRewriter,
    ) -> bool {
        let Ok(begin) = r#async::CoroBegin::from_op(ctx, op) else {
            return false;
        };
        let location = ctx.op(op).location;
        let id = begin.id(ctx);

        let (id_v, mut prefix) = remap_value(ctx, rewriter.type_converter(), location, id);
        let i64_ty = core::i64_ty(ctx);
        let size = llvm::coro_size(ctx, location, i64_ty);
        prefix.push(size.op_ref());

        let malloc = runtime_api::declare(ctx, self.module, rewriter, location, RuntimeFunc::Malloc);
        let ptr = llvm::ptr_ty(ctx);
        let size_v = size.result(ctx);
        let mem = func::call(ctx, location, [size_v], [ptr], malloc);
        prefix.push(mem.op_ref());

        let mem_v = ctx.op_result(mem.op_ref(), 0);
        let handle = llvm::coro_begin(ctx, location, id_v, mem_v, ptr);
        rewriter.replace_with_prefix(prefix, handle.op_ref());
        true
    }

    fn name(&self) -> &'static str {
        "coro-begin-lowering"
    }
}

/// `async.coro_free` → `llvm.coro_free` feeding `free`.
pub struct CoroFreeLowering {
    pub module: Module,
}

impl RewritePattern for CoroFreeLowering {
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        rewriter: &mut PatternRewriter,
    ) -> bool {
        let Ok(coro_free) = r#async::CoroFree::from_op(ctx, op) else {
            return false;
        };
        let location = ctx.op(op).location;
        let id = coro_free.id(ctx);
        let handle = coro_free.handle(ctx);

        let (id_v, mut prefix) = remap_value(ctx, rewriter.type_converter(), location, id);
        let (handle_v, ops) = remap_value(ctx, rewriter.type_converter(), location, handle);
        prefix.extend(ops);

        let ptr = llvm::ptr_ty(ctx);
        let mem = llvm::coro_free(ctx, location, id_v, handle_v, ptr);
        prefix.push(mem.op_ref());

        let free = runtime_api::declare(ctx, self.module, rewriter, location, RuntimeFunc::Free);
        let mem_v = mem.result(ctx);
        let call = func::call(ctx, location, [mem_v], [], free);
        prefix.push(call.op_ref());

        for p in prefix {
            rewriter.insert_op(p);
        }
        rewriter.erase_op(vec![]);
        true
    }

    fn name(&self) -> &'static str {
        "coro-free-lowering"
    }
}

/// `async.coro_end` → `llvm.coro_end` on the non-unwind path.
pub struct CoroEndLowering;

impl RewritePattern for CoroEndLowering {
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        rewriter: &mut PatternRewriter,
    ) -> bool {
        let Ok(end) = r#async::CoroEnd::from_op(ctx, op) else {
            return false;
        };
        let location = ctx.op(op).location;
        let handle = end.handle(ctx);

        let (handle_v, mut prefix) = remap_value(ctx, rewriter.type_converter(), location, handle);
        let i1_ty = core::i1_ty(ctx);
        let unwind = arith::const_bool(ctx, location, i1_ty, false);
        prefix.push(unwind.op_ref());
        let unwind_v = unwind.result(ctx);
        let coro_end = llvm::coro_end(ctx, location, handle_v, unwind_v, i1_ty);
        prefix.push(coro_end.op_ref());

        for p in prefix {
            rewriter.insert_op(p);
        }
        rewriter.erase_op(vec![]);
        true
    }

    fn name(&self) -> &'static str {
        "coro-end-lowering"
    }
}

/// `async.coro_save` → `llvm.coro_save`.
pub struct CoroSaveLowering;

impl RewritePattern for CoroSaveLowering {
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        rewriter: &mut PatternRewriter,
    ) -> bool {
        let Ok(save) = r#async::CoroSave::from_op(ctx, op) else {
            return false;
        };
        let location = ctx.op(op).location;
        let handle = save.handle(ctx);

        let (handle_v, prefix) = remap_value(ctx, rewriter.type_converter(), location, handle);
        let token = llvm::token_ty(ctx);
        let lowered = llvm::coro_save(ctx, location, handle_v, token);
        rewriter.replace_with_prefix(prefix, lowered.op_ref());
        true
    }

    fn name(&self) -> &'static str {
        "coro-save-lowering"
    }
}

/// `async.coro_suspend` → `llvm.coro_suspend`, widened to i32, driving a
/// three-way `cf.switch`: case 0 resumes, case 1 cleans up, and the default
/// leaves the coroutine suspended.
pub struct CoroSuspendLowering;

impl RewritePattern for CoroSuspendLowering {
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        rewriter: &mut PatternRewriter,
    ) -> bool {
        let Ok(suspend) = r#async::CoroSuspend::from_op(ctx, op) else {
            return false;
        };
        let location = ctx.op(op).location;
        let state = suspend.state(ctx);
        let suspend_dest = suspend.suspend_dest(ctx);
        let resume_dest = suspend.resume_dest(ctx);
        let cleanup_dest = suspend.cleanup_dest(ctx);

        let (state_v, mut prefix) = remap_value(ctx, rewriter.type_converter(), location, state);
        let i1_ty = core::i1_ty(ctx);
        let is_final = arith::const_bool(ctx, location, i1_ty, false);
        prefix.push(is_final.op_ref());

        let i8_ty = core::i8_ty(ctx);
        let is_final_v = is_final.result(ctx);
        let code = llvm::coro_suspend(ctx, location, state_v, is_final_v, i8_ty);
        prefix.push(code.op_ref());

        let i32_ty = core::i32_ty(ctx);
        let code_v = code.result(ctx);
        let widened = arith::extend(ctx, location, code_v, i32_ty);
        prefix.push(widened.op_ref());

        let widened_v = widened.result(ctx);
        let switch = cf::switch(
            ctx,
            location,
            widened_v,
            suspend_dest,
            [(0, resume_dest), (1, cleanup_dest)],
        );
        rewriter.replace_with_prefix(prefix, switch.op_ref());
        true
    }

    fn name(&self) -> &'static str {
        "coro-suspend-lowering"
    }
}

// ---- runtime op lowering ----

/// `async.runtime_create` → the per-kind `create_*` runtime call. Value
/// storage passes the payload size, computed without a data layout by
/// indexing one element past a null typed pointer and reading the address.
pub struct RuntimeCreateLowering {
    pub module: Module,
}

impl RewritePattern for RuntimeCreateLowering {
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        rewriter: &mut PatternRewriter,
    ) -> bool {
        let Ok(create) = r#async::RuntimeCreate::from_op(ctx, op) else {
            return false;
        };
        let result_ty = create.result_ty(ctx);
        let Some(kind) = handle_kind(ctx, result_ty) else {
            return false;
        };
        let location = ctx.op(op).location;
        let ptr = llvm::ptr_ty(ctx);

        match kind {
            HandleKind::Token | HandleKind::Group => {
                let f = if kind == HandleKind::Token {
                    RuntimeFunc::CreateToken
                } else {
                    RuntimeFunc::CreateGroup
                };
                let callee = runtime_api::declare(ctx, self.module, rewriter, location, f);
                let call = func::call(ctx, location, [], [ptr], callee);
                rewriter.replace_op(call.op_ref());
            }
            HandleKind::Value => {
                let Some(payload) = r#async::value_payload(ctx, result_ty) else {
                    return false;
                };
                let payload = rewriter.type_converter().convert_type(ctx, payload);
                let typed_ptr = llvm::ptr_to_ty(ctx, payload);
                let null = llvm::null(ctx, location, typed_ptr);
                let i32_ty = core::i32_ty(ctx);
                let one = arith::const_int(ctx, location, i32_ty, 1);
                let null_v = null.result(ctx);
                let one_v = one.result(ctx);
                let gep = llvm::getelementptr(ctx, location, null_v, one_v, typed_ptr);
                let gep_v = gep.result(ctx);
                let size = llvm::ptrtoint(ctx, location, gep_v, i32_ty);

                let callee = runtime_api::declare(
                    ctx,
                    self.module,
                    rewriter,
                    location,
                    RuntimeFunc::CreateValue,
                );
                let size_v = size.result(ctx);
                let call = func::call(ctx, location, [size_v], [ptr], callee);
                rewriter.replace_with_prefix(
                    vec![null.op_ref(), one.op_ref(), gep.op_ref(), size.op_ref()],
                    call.op_ref(),
                );
            }
        }
        true
    }

    fn name(&self) -> &'static str {
        "runtime-create-lowering"
    }
}

/// `async.runtime_set_available` → `emplace_token` / `emplace_value`.
pub struct RuntimeSetAvailableLowering {
    pub module: Module,
}

impl RewritePattern for RuntimeSetAvailableLowering {
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        rewriter: &mut PatternRewriter,
    ) -> bool {
        let Ok(set) = r#async::RuntimeSetAvailable::from_op(ctx, op) else {
            return false;
        };
        let operand = set.operand(ctx);
        let f = match handle_kind(ctx, ctx.value_ty(operand)) {
            Some(HandleKind::Token) => RuntimeFunc::EmplaceToken,
            Some(HandleKind::Value) => RuntimeFunc::EmplaceValue,
            _ => return false,
        };
        let location = ctx.op(op).location;

        let (operand_v, prefix) = remap_value(ctx, rewriter.type_converter(), location, operand);
        let callee = runtime_api::declare(ctx, self.module, rewriter, location, f);
        let call = func::call(ctx, location, [operand_v], [], callee);
        rewriter.replace_with_prefix(prefix, call.op_ref());
        true
    }

    fn name(&self) -> &'static str {
        "runtime-set-available-lowering"
    }
}

/// `async.runtime_await` → the per-kind blocking `await_*` runtime call.
pub struct RuntimeAwaitLowering {
    pub module: Module,
}

impl RewritePattern for RuntimeAwaitLowering {
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        rewriter: &mut PatternRewriter,
    ) -> bool {
        let Ok(await_op) = r#async::RuntimeAwait::from_op(ctx, op) else {
            return false;
        };
        let operand = await_op.operand(ctx);
        let f = match handle_kind(ctx, ctx.value_ty(operand)) {
            Some(HandleKind::Token) => RuntimeFunc::AwaitToken,
            Some(HandleKind::Value) => RuntimeFunc::AwaitValue,
            Some(HandleKind::Group) => RuntimeFunc::AwaitAllInGroup,
            None => return false,
        };
        let location = ctx.op(op).location;

        let (operand_v, prefix) = remap_value(ctx, rewriter.type_converter(), location, operand);
        let callee = runtime_api::declare(ctx, self.module, rewriter, location, f);
        let call = func::call(ctx, location, [operand_v], [], callee);
        rewriter.replace_with_prefix(prefix, call.op_ref());
        true
    }

    fn name(&self) -> &'static str {
        "runtime-await-lowering"
    }
}

/// `async.runtime_resume` → `execute(handle, __resume)`.
pub struct RuntimeResumeLowering {
    pub module: Module,
}

impl RewritePattern for RuntimeResumeLowering {
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        rewriter: &mut PatternRewriter,
    ) -> bool {
        let Ok(resume) = r#async::RuntimeResume::from_op(ctx, op) else {
            return false;
        };
        let location = ctx.op(op).location;
        let handle = resume.handle(ctx);

        let (handle_v, mut prefix) = remap_value(ctx, rewriter.type_converter(), location, handle);
        let wrapper = runtime_api::ensure_resume_wrapper(ctx, self.module, rewriter, location);
        let ptr = llvm::ptr_ty(ctx);
        let fptr = func::constant(ctx, location, ptr, wrapper);
        prefix.push(fptr.op_ref());

        let callee =
            runtime_api::declare(ctx, self.module, rewriter, location, RuntimeFunc::Execute);
        let fptr_v = fptr.result(ctx);
        let call = func::call(ctx, location, [handle_v, fptr_v], [], callee);
        rewriter.replace_with_prefix(prefix, call.op_ref());
        true
    }

    fn name(&self) -> &'static str {
        "runtime-resume-lowering"
    }
}

/// `async.runtime_await_and_resume` → the per-kind `await_*_and_execute`
/// runtime call with the `__resume` trampoline as the continuation.
pub struct RuntimeAwaitAndResumeLowering {
    pub module: Module,
}

impl RewritePattern for RuntimeAwaitAndResumeLowering {
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        rewriter: &mut PatternRewriter,
    ) -> bool {
        let Ok(await_resume) = r#async::RuntimeAwaitAndResume::from_op(ctx, op) else {
            return false;
        };
        let operand = await_resume.operand(ctx);
        let f = match handle_kind(ctx, ctx.value_ty(operand)) {
            Some(HandleKind::Token) => RuntimeFunc::AwaitTokenAndExecute,
            Some(HandleKind::Value) => RuntimeFunc::AwaitValueAndExecute,
            Some(HandleKind::Group) => RuntimeFunc::AwaitAllAndExecute,
            None => return false,
        };
        let location = ctx.op(op).location;
        let handle = await_resume.handle(ctx);

        let (operand_v, mut prefix) = remap_value(ctx, rewriter.type_converter(), location, operand);
        let (handle_v, ops) = remap_value(ctx, rewriter.type_converter(), location, handle);
        prefix.extend(ops);

        let wrapper = runtime_api::ensure_resume_wrapper(ctx, self.module, rewriter, location);
        let ptr = llvm::ptr_ty(ctx);
        let fptr = func::constant(ctx, location, ptr, wrapper);
        prefix.push(fptr.op_ref());

        let callee = runtime_api::declare(ctx, self.module, rewriter, location, f);
        let fptr_v = fptr.result(ctx);
        let call = func::call(ctx, location, [operand_v, handle_v, fptr_v], [], callee);
        rewriter.replace_with_prefix(prefix, call.op_ref());
        true
    }

    fn name(&self) -> &'static str {
        "runtime-await-and-resume-lowering"
    }
}

/// `async.runtime_store` → write through the storage pointer returned by
/// `get_value_storage`, bitcast to the converted payload type.
pub struct RuntimeStoreLowering {
    pub module: Module,
}

impl RewritePattern for RuntimeStoreLowering {
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        rewriter: &mut PatternRewriter,
    ) -> bool {
        let Ok(store) = r#async::RuntimeStore::from_op(ctx, op) else {
            return false;
        };
        let storage = store.storage(ctx);
        let storage_ty = ctx.value_ty(storage);
        let Some(payload) = r#async::value_payload(ctx, storage_ty) else {
            return false;
        };
        let location = ctx.op(op).location;
        let value = store.value(ctx);

        let (value_v, mut prefix) = remap_value(ctx, rewriter.type_converter(), location, value);
        let (storage_v, ops) = remap_value(ctx, rewriter.type_converter(), location, storage);
        prefix.extend(ops);

        let callee = runtime_api::declare(
            ctx,
            self.module,
            rewriter,
            location,
            RuntimeFunc::GetValueStorage,
        );
        let ptr = llvm::ptr_ty(ctx);
        let raw = func::call(ctx, location, [storage_v], [ptr], callee);
        prefix.push(raw.op_ref());

        let payload = rewriter.type_converter().convert_type(ctx, payload);
        let typed_ptr = llvm::ptr_to_ty(ctx, payload);
        let raw_v = ctx.op_result(raw.op_ref(), 0);
        let typed = llvm::bitcast(ctx, location, raw_v, typed_ptr);
        prefix.push(typed.op_ref());

        let typed_v = typed.result(ctx);
        let lowered = llvm::store(ctx, location, value_v, typed_v);
        rewriter.replace_with_prefix(prefix, lowered.op_ref());
        true
    }

    fn name(&self) -> &'static str {
        "runtime-store-lowering"
    }
}

/// `async.runtime_load` → read through the storage pointer returned by
/// `get_value_storage`, bitcast to the converted payload type.
pub struct RuntimeLoadLowering {
    pub module: Module,
}

impl RewritePattern for RuntimeLoadLowering {
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        rewriter: &mut PatternRewriter,
    ) -> bool {
        let Ok(load) = r#async::RuntimeLoad::from_op(ctx, op) else {
            return false;
        };
        let storage = load.storage(ctx);
        let storage_ty = ctx.value_ty(storage);
        let Some(payload) = r#async::value_payload(ctx, storage_ty) else {
            return false;
        };
        let location = ctx.op(op).location;

        let (storage_v, mut prefix) =
            remap_value(ctx, rewriter.type_converter(), location, storage);
        let callee = runtime_api::declare(
            ctx,
            self.module,
            rewriter,
            location,
            RuntimeFunc::GetValueStorage,
        );
        let ptr = llvm::ptr_ty(ctx);
        let raw = func::call(ctx, location, [storage_v], [ptr], callee);
        prefix.push(raw.op_ref());

        let payload = rewriter.type_converter().convert_type(ctx, payload);
        let typed_ptr = llvm::ptr_to_ty(ctx, payload);
        let raw_v = ctx.op_result(raw.op_ref(), 0);
        let typed = llvm::bitcast(ctx, location, raw_v, typed_ptr);
        prefix.push(typed.op_ref());

        let typed_v = typed.result(ctx);
        let lowered = llvm::load(ctx, location, typed_v, payload);
        rewriter.replace_with_prefix(prefix, lowered.op_ref());
        true
    }

    fn name(&self) -> &'static str {
        "runtime-load-lowering"
    }
}

/// `async.runtime_add_to_group` → `add_token_to_group`, keeping the rank.
pub struct RuntimeAddToGroupLowering {
    pub module: Module,
}

impl RewritePattern for RuntimeAddToGroupLowering {
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        rewriter: &mut PatternRewriter,
    ) -> bool {
        let Ok(add) = r#async::RuntimeAddToGroup::from_op(ctx, op) else {
            return false;
        };
        let location = ctx.op(op).location;
        let operand = add.operand(ctx);
        let group = add.group(ctx);

        let (operand_v, mut prefix) = remap_value(ctx, rewriter.type_converter(), location, operand);
        let (group_v, ops) = remap_value(ctx, rewriter.type_converter(), location, group);
        prefix.extend(ops);

        let callee = runtime_api::declare(
            ctx,
            self.module,
            rewriter,
            location,
            RuntimeFunc::AddTokenToGroup,
        );
        let i64_ty = core::i64_ty(ctx);
        let call = func::call(ctx, location, [operand_v, group_v], [i64_ty], callee);
        rewriter.replace_with_prefix(prefix, call.op_ref());
        true
    }

    fn name(&self) -> &'static str {
        "runtime-add-to-group-lowering"
    }
}

/// `async.runtime_add_ref` / `async.runtime_drop_ref` → `add_ref` /
/// `drop_ref` with the count attribute materialized as an i32 constant.
pub struct RefCountLowering {
    pub module: Module,
}

impl RewritePattern for RefCountLowering {
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        rewriter: &mut PatternRewriter,
    ) -> bool {
        let (operand, count, f) = if let Ok(add) = r#async::RuntimeAddRef::from_op(ctx, op) {
            (add.operand(ctx), add.count(ctx), RuntimeFunc::AddRef)
        } else if let Ok(drop) = r#async::RuntimeDropRef::from_op(ctx, op) {
            (drop.operand(ctx), drop.count(ctx), RuntimeFunc::DropRef)
        } else {
            return false;
        };
        let location = ctx.op(op).location;

        let (operand_v, mut prefix) = remap_value(ctx, rewriter.type_converter(), location, operand);
        let i32_ty = core::i32_ty(ctx);
        let count = arith::const_int(ctx, location, i32_ty, count as u64);
        prefix.push(count.op_ref());

        let callee = runtime_api::declare(ctx, self.module, rewriter, location, f);
        let count_v = count.result(ctx);
        let call = func::call(ctx, location, [operand_v, count_v], [], callee);
        rewriter.replace_with_prefix(prefix, call.op_ref());
        true
    }

    fn name(&self) -> &'static str {
        "refcount-lowering"
    }
}

/// Run the full async-to-LLVM lowering over `module`.
///
/// The target declares the `async` dialect illegal and the lowering
/// vocabulary (`llvm`, `arith`, `cf`) legal; function and structured-control
/// ops are judged by whether their types are conversion fixpoints. Runs in
/// partial mode so ops outside the lowering's vocabulary survive untouched;
/// `resolve_casts` should run afterwards to fold the bridging casts.
pub fn lower_async_to_llvm(
    ctx: &mut IrContext,
    module: Module,
) -> Result<ConversionOutcome, ConversionError> {
    let mut target = ConversionTarget::new();
    target.add_illegal_dialect("async");
    target.add_legal_dialect("llvm");
    target.add_legal_dialect("arith");
    target.add_legal_dialect("cf");
    target.add_legal_op("core", "unrealized_conversion_cast");
    add_func_legality(&mut target, async_type_converter());
    add_structural_legality(&mut target, async_type_converter());

    let driver = ConversionDriver::new(async_type_converter())
        .add_pattern(CoroIdLowering)
        .add_pattern(CoroBeginLowering { module })
        .add_pattern(CoroFreeLowering { module })
        .add_pattern(CoroEndLowering)
        .add_pattern(CoroSaveLowering)
        .add_pattern(CoroSuspendLowering)
        .add_pattern(RuntimeCreateLowering { module })
        .add_pattern(RuntimeSetAvailableLowering { module })
        .add_pattern(RuntimeAwaitLowering { module })
        .add_pattern(RuntimeResumeLowering { module })
        .add_pattern(RuntimeAwaitAndResumeLowering { module })
        .add_pattern(RuntimeStoreLowering { module })
        .add_pattern(RuntimeLoadLowering { module })
        .add_pattern(RuntimeAddToGroupLowering { module })
        .add_pattern(RefCountLowering { module })
        .add_pattern(FuncSignatureConversion)
        .add_pattern(CallTypeConversion)
        .add_pattern(ReturnTypeConversion)
        .add_pattern(ForOpTypeConversion)
        .add_pattern(IfOpTypeConversion)
        .add_pattern(YieldOpTypeConversion);

    driver.apply(ctx, module, &target, ConversionMode::Partial)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve_casts;
    use crate::runtime_api::RESUME_WRAPPER;
    use graft_ir::dialect::r#async;
    use graft_ir::{BlockData, BlockRef, IrContext, Location, RegionData, Span, Symbol, walk};
    use smallvec::smallvec;

    fn test_ctx() -> (IrContext, Location) {
        let mut ctx = IrContext::new();
        let path = ctx.paths.intern("test.gr".to_owned());
        let loc = Location::new(path, Span::new(0, 0));
        (ctx, loc)
    }

    /// A module with a single function whose body is the given blocks.
    fn module_with_fn(
        ctx: &mut IrContext,
        loc: Location,
        param_tys: Vec<TypeRef>,
        blocks: Vec<BlockRef>,
    ) -> Module {
        let nil = core::nil_ty(ctx);
        let sig = func::fn_ty(ctx, nil, param_tys);
        let body = ctx.create_region(RegionData {
            location: loc,
            blocks: blocks.into(),
            parent_op: None,
        });
        let f = func::func(ctx, loc, Symbol::new("main"), sig, body);

        let mod_block = ctx.create_block(BlockData::empty(loc));
        ctx.push_op(mod_block, f.op_ref());
        let mod_region = ctx.create_region(RegionData {
            location: loc,
            blocks: smallvec![mod_block],
            parent_op: None,
        });
        let module_op = core::module(ctx, loc, Symbol::new("test"), mod_region);
        Module::new(ctx, module_op.op_ref()).unwrap()
    }

    fn calls_to(ctx: &IrContext, module: Module, name: Symbol) -> Vec<OpRef> {
        walk::collect_ops(ctx, module.body(ctx))
            .into_iter()
            .filter(|&op| {
                func::Call::from_op(ctx, op).is_ok_and(|call| call.callee(ctx) == name)
            })
            .collect()
    }

    fn count_ops(ctx: &IrContext, module: Module, dialect: &str, name: &str) -> usize {
        walk::collect_ops(ctx, module.body(ctx))
            .into_iter()
            .filter(|&op| {
                let data = ctx.op(op);
                data.dialect == dialect && data.name == name
            })
            .count()
    }

    fn assert_no_async_ops(ctx: &IrContext, module: Module) {
        for op in walk::collect_ops(ctx, module.body(ctx)) {
            let data = ctx.op(op);
            assert_ne!(
                data.dialect,
                Symbol::new("async"),
                "async op survived lowering: {}",
                data.name
            );
        }
    }

    #[test]
    fn payload_converter_rewraps_value_types() {
        let (mut ctx, _loc) = test_ctx();
        let token = r#async::token_ty(&mut ctx);
        let i32_ty = core::i32_ty(&mut ctx);
        let i64_ty = core::i64_ty(&mut ctx);
        let mut widen = TypeConverter::new();
        widen.add_conversion(move |_, ty| (ty == i32_ty).then_some(i64_ty));

        let converter = async_payload_converter(widen);
        let narrow = r#async::value_ty(&mut ctx, i32_ty);
        let wide = r#async::value_ty(&mut ctx, i64_ty);
        assert_eq!(converter.convert_type(&mut ctx, narrow), wide);
        // Handles and already-converted payloads are fixpoints.
        assert!(converter.is_legal_type(&mut ctx, token));
        assert!(converter.is_legal_type(&mut ctx, wide));
    }

    #[test]
    fn single_suspend_becomes_three_way_switch() {
        let (mut ctx, loc) = test_ctx();
        let id_ty = r#async::coro_id_ty(&mut ctx);
        let handle_ty = r#async::coro_handle_ty(&mut ctx);
        let state_ty = r#async::coro_state_ty(&mut ctx);

        let entry = ctx.create_block(BlockData::empty(loc));
        let suspend_bb = ctx.create_block(BlockData::empty(loc));
        let resume_bb = ctx.create_block(BlockData::empty(loc));
        let cleanup_bb = ctx.create_block(BlockData::empty(loc));

        let id = r#async::coro_id(&mut ctx, loc, id_ty);
        let id_v = id.id(&ctx);
        let begin = r#async::coro_begin(&mut ctx, loc, id_v, handle_ty);
        let handle_v = begin.handle(&ctx);
        let save = r#async::coro_save(&mut ctx, loc, handle_v, state_ty);
        let state_v = save.state(&ctx);
        let suspend =
            r#async::coro_suspend(&mut ctx, loc, state_v, suspend_bb, resume_bb, cleanup_bb);
        for op in [id.op_ref(), begin.op_ref(), save.op_ref(), suspend.op_ref()] {
            ctx.push_op(entry, op);
        }

        let ret = func::r#return(&mut ctx, loc, []);
        ctx.push_op(suspend_bb, ret.op_ref());
        let end = r#async::coro_end(&mut ctx, loc, handle_v);
        let resume_ret = func::r#return(&mut ctx, loc, []);
        ctx.push_op(resume_bb, end.op_ref());
        ctx.push_op(resume_bb, resume_ret.op_ref());
        let coro_free = r#async::coro_free(&mut ctx, loc, id_v, handle_v);
        let cleanup_ret = func::r#return(&mut ctx, loc, []);
        ctx.push_op(cleanup_bb, coro_free.op_ref());
        ctx.push_op(cleanup_bb, cleanup_ret.op_ref());

        let module = module_with_fn(
            &mut ctx,
            loc,
            vec![],
            vec![entry, suspend_bb, resume_bb, cleanup_bb],
        );

        lower_async_to_llvm(&mut ctx, module).unwrap();
        resolve_casts(&mut ctx, module);
        assert_no_async_ops(&ctx, module);

        // Exactly one suspend, widened once, driving one switch.
        assert_eq!(count_ops(&ctx, module, "llvm", "coro_suspend"), 1);
        assert_eq!(count_ops(&ctx, module, "arith", "extend"), 1);
        let switches: Vec<OpRef> = walk::collect_ops(&ctx, module.body(&ctx))
            .into_iter()
            .filter(|&op| cf::Switch::matches(&ctx, op))
            .collect();
        assert_eq!(switches.len(), 1);
        let switch = cf::Switch::from_op(&ctx, switches[0]).unwrap();
        assert_eq!(switch.default_dest(&ctx), suspend_bb);
        assert_eq!(switch.case_values(&ctx), vec![0, 1]);
        assert_eq!(switch.case_dests(&ctx), &[resume_bb, cleanup_bb]);

        // Frame allocation went through the allocator ABI.
        assert_eq!(calls_to(&ctx, module, Symbol::new("malloc")).len(), 1);
        assert_eq!(calls_to(&ctx, module, Symbol::new("free")).len(), 1);
        assert_eq!(count_ops(&ctx, module, "llvm", "coro_begin"), 1);
        assert_eq!(count_ops(&ctx, module, "llvm", "coro_free"), 1);
        assert_eq!(count_ops(&ctx, module, "llvm", "coro_end"), 1);
    }

    #[test]
    fn create_value_sizes_payload_without_data_layout() {
        let (mut ctx, loc) = test_ctx();
        let i64_ty = core::i64_ty(&mut ctx);
        let value_ty = r#async::value_ty(&mut ctx, i64_ty);

        let entry = ctx.create_block(BlockData::empty(loc));
        let first = r#async::runtime_create(&mut ctx, loc, value_ty);
        let second = r#async::runtime_create(&mut ctx, loc, value_ty);
        let first_v = first.result(&ctx);
        let set = r#async::runtime_set_available(&mut ctx, loc, first_v);
        let ret = func::r#return(&mut ctx, loc, []);
        for op in [first.op_ref(), second.op_ref(), set.op_ref(), ret.op_ref()] {
            ctx.push_op(entry, op);
        }
        let module = module_with_fn(&mut ctx, loc, vec![], vec![entry]);

        lower_async_to_llvm(&mut ctx, module).unwrap();
        resolve_casts(&mut ctx, module);
        assert_no_async_ops(&ctx, module);

        // Two creations, each sized with the null-gep/ptrtoint idiom.
        let creates = calls_to(&ctx, module, RuntimeFunc::CreateValue.symbol());
        assert_eq!(creates.len(), 2);
        assert_eq!(count_ops(&ctx, module, "llvm", "getelementptr"), 2);
        assert_eq!(count_ops(&ctx, module, "llvm", "ptrtoint"), 2);
        for &call in &creates {
            let size = ctx.op_operands(call)[0];
            let graft_ir::ValueDef::OpResult(def, _) = ctx.value_def(size) else {
                panic!("size operand is not an op result");
            };
            assert!(llvm::Ptrtoint::matches(&ctx, def));
        }
        assert_eq!(
            calls_to(&ctx, module, RuntimeFunc::EmplaceValue.symbol()).len(),
            1
        );

        // The declaration was added exactly once.
        let decls = module
            .ops(&ctx)
            .into_iter()
            .filter(|&op| {
                func::Func::from_op(&ctx, op)
                    .is_ok_and(|f| f.sym_name(&ctx) == RuntimeFunc::CreateValue.symbol())
            })
            .count();
        assert_eq!(decls, 1);
    }

    #[test]
    fn store_and_load_go_through_typed_storage_pointer() {
        let (mut ctx, loc) = test_ctx();
        let i32_ty = core::i32_ty(&mut ctx);
        let value_ty = r#async::value_ty(&mut ctx, i32_ty);

        let entry = ctx.create_block(BlockData::empty(loc));
        let storage = r#async::runtime_create(&mut ctx, loc, value_ty);
        let forty_two = arith::const_int(&mut ctx, loc, i32_ty, 42);
        let forty_two_v = forty_two.result(&ctx);
        let storage_v = storage.result(&ctx);
        let store = r#async::runtime_store(&mut ctx, loc, forty_two_v, storage_v);
        let load = r#async::runtime_load(&mut ctx, loc, storage_v, i32_ty);
        let ret = func::r#return(&mut ctx, loc, []);
        for op in [
            storage.op_ref(),
            forty_two.op_ref(),
            store.op_ref(),
            load.op_ref(),
            ret.op_ref(),
        ] {
            ctx.push_op(entry, op);
        }
        let module = module_with_fn(&mut ctx, loc, vec![], vec![entry]);

        lower_async_to_llvm(&mut ctx, module).unwrap();
        resolve_casts(&mut ctx, module);
        assert_no_async_ops(&ctx, module);

        // One storage lookup per access, each bitcast to llvm.ptr<i32>.
        let lookups = calls_to(&ctx, module, RuntimeFunc::GetValueStorage.symbol());
        assert_eq!(lookups.len(), 2);
        assert_eq!(count_ops(&ctx, module, "llvm", "bitcast"), 2);
        assert_eq!(count_ops(&ctx, module, "llvm", "store"), 1);
        assert_eq!(count_ops(&ctx, module, "llvm", "load"), 1);

        let typed_ptr = llvm::ptr_to_ty(&mut ctx, i32_ty);
        for op in walk::collect_ops(&ctx, module.body(&ctx)) {
            if let Ok(cast) = llvm::Bitcast::from_op(&ctx, op) {
                assert_eq!(cast.result_ty(&ctx), typed_ptr);
            }
        }
    }

    #[test]
    fn resume_goes_through_the_trampoline() {
        let (mut ctx, loc) = test_ctx();
        let handle_ty = r#async::coro_handle_ty(&mut ctx);

        let entry = ctx.create_block(BlockData::with_arg_types(loc, [handle_ty]));
        let handle = ctx.block_arg(entry, 0);
        let resume = r#async::runtime_resume(&mut ctx, loc, handle);
        let ret = func::r#return(&mut ctx, loc, []);
        ctx.push_op(entry, resume.op_ref());
        ctx.push_op(entry, ret.op_ref());
        let module = module_with_fn(&mut ctx, loc, vec![handle_ty], vec![entry]);

        lower_async_to_llvm(&mut ctx, module).unwrap();
        resolve_casts(&mut ctx, module);
        assert_no_async_ops(&ctx, module);

        // The wrapper exists, with a real body resuming its argument.
        let wrapper = module.lookup_symbol(&ctx, RESUME_WRAPPER()).unwrap();
        let wrapper = func::Func::from_op(&ctx, wrapper).unwrap();
        assert!(!wrapper.is_declaration(&ctx));
        let body_ops = walk::collect_ops(&ctx, wrapper.body(&ctx));
        assert!(body_ops.iter().any(|&op| llvm::CoroResume::matches(&ctx, op)));

        // Resumption is a plain execute(handle, __resume) call.
        let executes = calls_to(&ctx, module, RuntimeFunc::Execute.symbol());
        assert_eq!(executes.len(), 1);
        let fptr = ctx.op_operands(executes[0])[1];
        let graft_ir::ValueDef::OpResult(def, _) = ctx.value_def(fptr) else {
            panic!("function pointer is not an op result");
        };
        let constant = func::Constant::from_op(&ctx, def).unwrap();
        assert_eq!(constant.func_ref(&ctx), RESUME_WRAPPER());

        // The caller's signature converted to take an opaque pointer.
        let main = func::Func::from_op(&ctx, module.lookup_symbol(&ctx, Symbol::new("main")).unwrap())
            .unwrap();
        let ptr = llvm::ptr_ty(&mut ctx);
        let sig = main.r#type(&ctx);
        assert_eq!(func::fn_param_tys(&ctx, sig).as_slice(), &[ptr]);
    }

    #[test]
    fn group_await_and_resume_picks_the_group_entry_point() {
        let (mut ctx, loc) = test_ctx();
        let group_ty = r#async::group_ty(&mut ctx);
        let token_ty = r#async::token_ty(&mut ctx);
        let handle_ty = r#async::coro_handle_ty(&mut ctx);

        let entry = ctx.create_block(BlockData::with_arg_types(loc, [handle_ty]));
        let handle = ctx.block_arg(entry, 0);
        let group = r#async::runtime_create(&mut ctx, loc, group_ty);
        let token = r#async::runtime_create(&mut ctx, loc, token_ty);
        let i64_ty = core::i64_ty(&mut ctx);
        let token_v = token.result(&ctx);
        let group_v = group.result(&ctx);
        let rank = r#async::runtime_add_to_group(&mut ctx, loc, token_v, group_v, i64_ty);
        let await_resume = r#async::runtime_await_and_resume(&mut ctx, loc, group_v, handle);
        let ret = func::r#return(&mut ctx, loc, []);
        for op in [
            group.op_ref(),
            token.op_ref(),
            rank.op_ref(),
            await_resume.op_ref(),
            ret.op_ref(),
        ] {
            ctx.push_op(entry, op);
        }
        let module = module_with_fn(&mut ctx, loc, vec![handle_ty], vec![entry]);

        lower_async_to_llvm(&mut ctx, module).unwrap();
        resolve_casts(&mut ctx, module);
        assert_no_async_ops(&ctx, module);

        assert_eq!(
            calls_to(&ctx, module, RuntimeFunc::CreateGroup.symbol()).len(),
            1
        );
        assert_eq!(
            calls_to(&ctx, module, RuntimeFunc::CreateToken.symbol()).len(),
            1
        );
        let adds = calls_to(&ctx, module, RuntimeFunc::AddTokenToGroup.symbol());
        assert_eq!(adds.len(), 1);
        assert_eq!(ctx.op_result_types(adds[0]), &[i64_ty]);
        assert_eq!(
            calls_to(&ctx, module, RuntimeFunc::AwaitAllAndExecute.symbol()).len(),
            1
        );
    }

    #[test]
    fn refcounts_lower_to_counted_calls_and_stay_balanced() {
        let (mut ctx, loc) = test_ctx();
        let token_ty = r#async::token_ty(&mut ctx);

        let entry = ctx.create_block(BlockData::empty(loc));
        let token = r#async::runtime_create(&mut ctx, loc, token_ty);
        let token_v = token.result(&ctx);
        let add = r#async::runtime_add_ref(&mut ctx, loc, token_v, 2);
        let await_op = r#async::runtime_await(&mut ctx, loc, token_v);
        let drop = r#async::runtime_drop_ref(&mut ctx, loc, token_v, 2);
        let ret = func::r#return(&mut ctx, loc, []);
        for op in [
            token.op_ref(),
            add.op_ref(),
            await_op.op_ref(),
            drop.op_ref(),
            ret.op_ref(),
        ] {
            ctx.push_op(entry, op);
        }
        let module = module_with_fn(&mut ctx, loc, vec![], vec![entry]);

        lower_async_to_llvm(&mut ctx, module).unwrap();
        resolve_casts(&mut ctx, module);
        assert_no_async_ops(&ctx, module);

        let adds = calls_to(&ctx, module, RuntimeFunc::AddRef.symbol());
        let drops = calls_to(&ctx, module, RuntimeFunc::DropRef.symbol());
        assert_eq!(adds.len(), drops.len());
        for &call in adds.iter().chain(&drops) {
            let count = ctx.op_operands(call)[1];
            let graft_ir::ValueDef::OpResult(def, _) = ctx.value_def(count) else {
                panic!("count operand is not an op result");
            };
            let constant = arith::Const::from_op(&ctx, def).unwrap();
            assert_eq!(
                constant.value(&ctx),
                graft_ir::Attribute::IntBits(2)
            );
        }
        assert_eq!(
            calls_to(&ctx, module, RuntimeFunc::AwaitToken.symbol()).len(),
            1
        );
    }
}
