//! Graft: legalization of coroutine-shaped async programs onto LLVM
//! coroutine intrinsics and an async runtime ABI.
//!
//! [`graft_ir`] supplies the arena-based IR and the generic conversion
//! machinery (patterns, legality targets, the worklist driver).
//! [`graft_passes`] supplies the async-to-LLVM lowering built on top of it.
//! This crate ties the two together behind a single pipeline entry point.

pub use graft_ir as ir;
pub use graft_passes as passes;

pub use graft_ir::rewrite::{ConversionError, ConversionOutcome};
pub use graft_ir::{IrContext, Module, print_module};

/// Run the standard lowering pipeline over `module`: elaborate the `async`
/// dialect into `llvm.coro_*` intrinsics and runtime ABI calls, then fold
/// the conversion casts the driver materialized along the way.
pub fn legalize_module(
    ctx: &mut IrContext,
    module: Module,
) -> Result<ConversionOutcome, ConversionError> {
    let outcome = graft_passes::lower_async_to_llvm(ctx, module)?;
    graft_passes::resolve_casts(ctx, module);
    Ok(outcome)
}
