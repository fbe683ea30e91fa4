//! Dialect vocabularies.
//!
//! Each submodule defines one dialect: its operation wrappers (via the
//! `dialect!` macro) and helper constructors for the dialect's types.
//! The lowering pipeline moves programs from the `async`/`scf` end of this
//! vocabulary toward `llvm` + `func` + `cf`.

pub mod arith;
pub mod r#async;
pub mod cf;
pub mod core;
pub mod func;
pub mod llvm;
pub mod scf;
