//! Lowering passes over GraftIR.
//!
//! The centerpiece is `async_to_llvm`, which elaborates the `async` dialect
//! into `llvm.coro.*` intrinsics and calls against the async runtime ABI.
//! `structural` and `func_conversions` supply the reusable type-conversion
//! patterns for region-owning ops and function signatures; `resolve_casts`
//! folds away the temporary casts the conversion driver materializes.

pub mod async_to_llvm;
pub mod func_conversions;
pub mod resolve_casts;
pub mod runtime_api;
pub mod structural;

pub use async_to_llvm::{async_payload_converter, async_type_converter, lower_async_to_llvm};
pub use resolve_casts::resolve_casts;
