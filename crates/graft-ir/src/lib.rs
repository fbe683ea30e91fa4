//! GraftIR: an arena-based, mutable compiler IR plus the generic
//! legalization engine that rewrites it.
//!
//! The data model is a tree of typed, region-nesting operations stored in
//! `cranelift-entity` arenas with maintained use-chains, so rewriting is
//! in-place mutation + RAUW rather than functional rebuilds. The `rewrite`
//! module provides the pattern/driver machinery that lowers one dialect
//! vocabulary into another.

#![recursion_limit = "512"]

pub mod context;
pub mod dialect;
pub mod location;
pub mod ops;
pub mod printer;
pub mod refs;
pub mod rewrite;
pub mod symbol;
pub mod types;
pub mod walk;

// Re-export paste/smallvec for use inside the `dialect!` macro expansion.
#[doc(hidden)]
pub use paste;
pub use smallvec;

pub use context::{
    BlockArgData, BlockData, IrContext, OperationData, OperationDataBuilder, RegionData, Use,
    ValueData,
};
pub use location::Span;
pub use ops::{DialectOp, OpConversionError};
pub use printer::print_module;
pub use refs::{BlockRef, OpRef, PathRef, RegionRef, TypeRef, ValueDef, ValueRef};
pub use rewrite::Module;
pub use symbol::Symbol;
pub use types::{Attribute, Location, PathInterner, TypeData, TypeDataBuilder, TypeInterner};
pub use walk::WalkAction;

/// Small vector sized for the common one-or-two element case.
pub type IdVec<T> = smallvec::SmallVec<[T; 2]>;

/// Strip the `r#` prefix `stringify!` leaves on raw identifiers, so that
/// `dialect!` can name an op `r#return` and still register it as "return".
#[doc(hidden)]
pub const fn trim_raw_ident(s: &'static str) -> &'static str {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 && bytes[0] == b'r' && bytes[1] == b'#' {
        s.split_at(2).1
    } else {
        s
    }
}

#[doc(hidden)]
#[macro_export]
macro_rules! raw_ident_str {
    ($id:ident) => {
        $crate::trim_raw_ident(stringify!($id))
    };
}

/// Concatenate `a`, `"."`, `b` into a byte array at const time. `concat!`
/// only accepts literals, so `dialect!` uses this to build "dialect.op"
/// strings from `trim_raw_ident` results.
#[doc(hidden)]
pub const fn concat_dotted<const N: usize>(a: &str, b: &str) -> [u8; N] {
    let mut out = [0u8; N];
    let mut i = 0;
    let ab = a.as_bytes();
    let mut j = 0;
    while j < ab.len() {
        out[i] = ab[j];
        i += 1;
        j += 1;
    }
    out[i] = b'.';
    i += 1;
    let bb = b.as_bytes();
    j = 0;
    while j < bb.len() {
        out[i] = bb[j];
        i += 1;
        j += 1;
    }
    out
}

/// Build a `&'static str` of the form `"dialect.op"` from two identifiers,
/// stripping any `r#` prefixes.
#[doc(hidden)]
#[macro_export]
macro_rules! dotted_name_str {
    ($a:ident, $b:ident) => {{
        const A: &str = $crate::raw_ident_str!($a);
        const B: &str = $crate::raw_ident_str!($b);
        const N: usize = A.len() + 1 + B.len();
        const BYTES: [u8; N] = $crate::concat_dotted::<N>(A, B);
        const S: &str = match ::core::str::from_utf8(&BYTES) {
            Ok(s) => s,
            Err(_) => panic!("identifiers are valid utf8"),
        };
        S
    }};
}
