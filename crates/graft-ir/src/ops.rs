//! Dialect operation utilities.
//!
//! Provides the `DialectOp` trait and the `dialect!` macro for defining
//! typed wrappers over raw `OpRef`s. A wrapper is a newtype that knows its
//! dialect/op name, can be checked against an arbitrary op with `matches`,
//! and exposes named accessors for operands, results, attributes, regions
//! and successors.

use derive_more::{Display, Error};

use crate::context::IrContext;
use crate::refs::OpRef;

/// Error produced when viewing a raw operation through the wrong wrapper.
#[derive(Debug, Display, Error, PartialEq, Eq)]
pub enum OpConversionError {
    #[display("expected operation {expected}, found {actual}")]
    WrongOperation {
        expected: &'static str,
        actual: String,
    },
    #[display("missing attribute: {name}")]
    MissingAttribute { name: &'static str },
    #[display("attribute {name} has wrong type")]
    WrongAttributeType { name: &'static str },
    #[display("expected {expected} operand(s), found {actual}")]
    WrongOperandCount { expected: usize, actual: usize },
}

/// Trait for typed dialect operation wrappers.
pub trait DialectOp: Sized + Copy {
    const DIALECT_NAME: &'static str;
    const OP_NAME: &'static str;

    fn from_op(ctx: &IrContext, op: OpRef) -> Result<Self, OpConversionError>;
    fn op_ref(&self) -> OpRef;

    fn matches(ctx: &IrContext, op: OpRef) -> bool {
        let data = ctx.op(op);
        data.dialect == crate::Symbol::new(Self::DIALECT_NAME)
            && data.name == crate::Symbol::new(Self::OP_NAME)
    }
}

/// Helper macro for attribute type mappings.
#[doc(hidden)]
#[macro_export]
macro_rules! op_attr_type {
    (@rust_type any) => {
        $crate::Attribute
    };
    (@rust_type bool) => {
        bool
    };
    (@rust_type i32) => {
        i32
    };
    (@rust_type i64) => {
        i64
    };
    (@rust_type u32) => {
        u32
    };
    (@rust_type u64) => {
        u64
    };
    (@rust_type Type) => {
        $crate::TypeRef
    };
    (@rust_type String) => {
        std::string::String
    };
    (@rust_type Symbol) => {
        $crate::Symbol
    };

    (@to_attr any, $val:expr) => {
        $val
    };
    (@to_attr bool, $val:expr) => {
        $crate::Attribute::Bool($val)
    };
    (@to_attr i32, $val:expr) => {
        $crate::Attribute::IntBits($val as u64)
    };
    (@to_attr i64, $val:expr) => {
        $crate::Attribute::IntBits($val as u64)
    };
    (@to_attr u32, $val:expr) => {
        $crate::Attribute::IntBits($val as u64)
    };
    (@to_attr u64, $val:expr) => {
        $crate::Attribute::IntBits($val)
    };
    (@to_attr Type, $val:expr) => {
        $crate::Attribute::Type($val)
    };
    (@to_attr String, $val:expr) => {
        $crate::Attribute::String($val)
    };
    (@to_attr Symbol, $val:expr) => {
        $crate::Attribute::Symbol($val)
    };

    (@from_attr any, $attr:expr) => {
        $attr.clone()
    };
    (@from_attr bool, $attr:expr) => {
        match $attr {
            $crate::Attribute::Bool(v) => *v,
            _ => panic!("expected Bool attribute"),
        }
    };
    (@from_attr i32, $attr:expr) => {
        match $attr {
            $crate::Attribute::IntBits(v) => *v as i32,
            _ => panic!("expected IntBits attribute"),
        }
    };
    (@from_attr i64, $attr:expr) => {
        match $attr {
            $crate::Attribute::IntBits(v) => *v as i64,
            _ => panic!("expected IntBits attribute"),
        }
    };
    (@from_attr u32, $attr:expr) => {
        match $attr {
            $crate::Attribute::IntBits(v) => *v as u32,
            _ => panic!("expected IntBits attribute"),
        }
    };
    (@from_attr u64, $attr:expr) => {
        match $attr {
            $crate::Attribute::IntBits(v) => *v,
            _ => panic!("expected IntBits attribute"),
        }
    };
    (@from_attr Type, $attr:expr) => {
        match $attr {
            $crate::Attribute::Type(v) => *v,
            _ => panic!("expected Type attribute"),
        }
    };
    (@from_attr String, $attr:expr) => {
        match $attr {
            $crate::Attribute::String(v) => v.clone(),
            _ => panic!("expected String attribute"),
        }
    };
    (@from_attr Symbol, $attr:expr) => {
        match $attr {
            $crate::Attribute::Symbol(v) => *v,
            _ => panic!("expected Symbol attribute"),
        }
    };
}

/// Main macro for defining dialect operations.
///
/// Each `fn` item produces a wrapper struct, a `DialectOp` impl, named
/// accessors, and a constructor function of the same name. `type` items
/// are declarative only; type helper constructors live next to the
/// `dialect!` invocation.
#[macro_export]
macro_rules! dialect {
    // Entry point
    (mod $dialect:ident { $($body:tt)* }) => {
        #[allow(non_snake_case)]
        #[inline]
        pub fn DIALECT_NAME() -> $crate::Symbol {
            $crate::Symbol::new($crate::raw_ident_str!($dialect))
        }

        $crate::dialect!(@parse $dialect [$($body)*]);
    };

    // Base case
    (@parse $dialect:ident []) => {};

    // ========================================================================
    // Type definitions
    // ========================================================================

    // Type with no params and no attrs
    (@parse $dialect:ident
        [$(#[doc = $doc:literal])*
         type $name:ident;
         $($rest:tt)*]
    ) => {
        $crate::dialect!(@parse $dialect [$($rest)*]);
    };

    // Type with params (no attrs)
    (@parse $dialect:ident
        [$(#[doc = $doc:literal])*
         type $name:ident($($param:ident),*);
         $($rest:tt)*]
    ) => {
        $crate::dialect!(@parse $dialect [$($rest)*]);
    };

    // ========================================================================
    // Operations: variadic results `-> #[rest] name`
    // ========================================================================
    (@parse $dialect:ident
        [$(#[doc = $doc:literal])*
         $(#[attr($($attr_tokens:tt)*)])?
         fn $op:ident ($($operands:tt)*) -> #[rest] $result:ident $({ $($region_body:tt)* })?;
         $($rest:tt)*]
    ) => {
        $crate::paste::paste! {
            #[allow(non_snake_case)]
            #[inline]
            pub fn [<$op:upper>]() -> $crate::Symbol {
                $crate::Symbol::new($crate::raw_ident_str!($op))
            }
        }

        $crate::define_op! {
            dialect: $dialect,
            op: $op,
            attrs: [$($($attr_tokens)*)?],
            operands: [$($operands)*],
            results: [#[rest] $result],
            regions: [$($($region_body)*)?],
        }

        $crate::dialect!(@parse $dialect [$($rest)*]);
    };

    // ========================================================================
    // Operations: multi results `-> (a, b)`
    // ========================================================================
    (@parse $dialect:ident
        [$(#[doc = $doc:literal])*
         $(#[attr($($attr_tokens:tt)*)])?
         fn $op:ident ($($operands:tt)*) -> ($($result:ident),+) $({ $($region_body:tt)* })?;
         $($rest:tt)*]
    ) => {
        $crate::paste::paste! {
            #[allow(non_snake_case)]
            #[inline]
            pub fn [<$op:upper>]() -> $crate::Symbol {
                $crate::Symbol::new($crate::raw_ident_str!($op))
            }
        }

        $crate::define_op! {
            dialect: $dialect,
            op: $op,
            attrs: [$($($attr_tokens)*)?],
            operands: [$($operands)*],
            results: [$($result),+],
            regions: [$($($region_body)*)?],
        }

        $crate::dialect!(@parse $dialect [$($rest)*]);
    };

    // ========================================================================
    // Operations: single result `-> name`
    // ========================================================================
    (@parse $dialect:ident
        [$(#[doc = $doc:literal])*
         $(#[attr($($attr_tokens:tt)*)])?
         fn $op:ident ($($operands:tt)*) -> $result:ident $({ $($region_body:tt)* })?;
         $($rest:tt)*]
    ) => {
        $crate::paste::paste! {
            #[allow(non_snake_case)]
            #[inline]
            pub fn [<$op:upper>]() -> $crate::Symbol {
                $crate::Symbol::new($crate::raw_ident_str!($op))
            }
        }

        $crate::define_op! {
            dialect: $dialect,
            op: $op,
            attrs: [$($($attr_tokens)*)?],
            operands: [$($operands)*],
            results: [$result],
            regions: [$($($region_body)*)?],
        }

        $crate::dialect!(@parse $dialect [$($rest)*]);
    };

    // ========================================================================
    // Operations: no result, with body
    // ========================================================================
    (@parse $dialect:ident
        [$(#[doc = $doc:literal])*
         $(#[attr($($attr_tokens:tt)*)])?
         fn $op:ident ($($operands:tt)*) { $($region_body:tt)* };
         $($rest:tt)*]
    ) => {
        $crate::paste::paste! {
            #[allow(non_snake_case)]
            #[inline]
            pub fn [<$op:upper>]() -> $crate::Symbol {
                $crate::Symbol::new($crate::raw_ident_str!($op))
            }
        }

        $crate::define_op! {
            dialect: $dialect,
            op: $op,
            attrs: [$($($attr_tokens)*)?],
            operands: [$($operands)*],
            results: [],
            regions: [$($region_body)*],
        }

        $crate::dialect!(@parse $dialect [$($rest)*]);
    };

    // ========================================================================
    // Operations: no result, no body
    // ========================================================================
    (@parse $dialect:ident
        [$(#[doc = $doc:literal])*
         $(#[attr($($attr_tokens:tt)*)])?
         fn $op:ident ($($operands:tt)*);
         $($rest:tt)*]
    ) => {
        $crate::paste::paste! {
            #[allow(non_snake_case)]
            #[inline]
            pub fn [<$op:upper>]() -> $crate::Symbol {
                $crate::Symbol::new($crate::raw_ident_str!($op))
            }
        }

        $crate::define_op! {
            dialect: $dialect,
            op: $op,
            attrs: [$($($attr_tokens)*)?],
            operands: [$($operands)*],
            results: [],
            regions: [],
        }

        $crate::dialect!(@parse $dialect [$($rest)*]);
    };

    // ========================================================================
    // Operations: no operands, with body and optional result
    // ========================================================================
    (@parse $dialect:ident
        [$(#[doc = $doc:literal])*
         $(#[attr($($attr_tokens:tt)*)])?
         fn $op:ident () $(-> $result:ident)? { $($region_body:tt)* };
         $($rest:tt)*]
    ) => {
        $crate::paste::paste! {
            #[allow(non_snake_case)]
            #[inline]
            pub fn [<$op:upper>]() -> $crate::Symbol {
                $crate::Symbol::new($crate::raw_ident_str!($op))
            }
        }

        $crate::define_op! {
            dialect: $dialect,
            op: $op,
            attrs: [$($($attr_tokens)*)?],
            operands: [],
            results: [$($result)?],
            regions: [$($region_body)*],
        }

        $crate::dialect!(@parse $dialect [$($rest)*]);
    };

    // ========================================================================
    // Operations: no operands, no body, with result
    // ========================================================================
    (@parse $dialect:ident
        [$(#[doc = $doc:literal])*
         $(#[attr($($attr_tokens:tt)*)])?
         fn $op:ident () -> $result:ident;
         $($rest:tt)*]
    ) => {
        $crate::paste::paste! {
            #[allow(non_snake_case)]
            #[inline]
            pub fn [<$op:upper>]() -> $crate::Symbol {
                $crate::Symbol::new($crate::raw_ident_str!($op))
            }
        }

        $crate::define_op! {
            dialect: $dialect,
            op: $op,
            attrs: [$($($attr_tokens)*)?],
            operands: [],
            results: [$result],
            regions: [],
        }

        $crate::dialect!(@parse $dialect [$($rest)*]);
    };

    // ========================================================================
    // Operations: no operands, no body, no result
    // ========================================================================
    (@parse $dialect:ident
        [$(#[doc = $doc:literal])*
         $(#[attr($($attr_tokens:tt)*)])?
         fn $op:ident ();
         $($rest:tt)*]
    ) => {
        $crate::paste::paste! {
            #[allow(non_snake_case)]
            #[inline]
            pub fn [<$op:upper>]() -> $crate::Symbol {
                $crate::Symbol::new($crate::raw_ident_str!($op))
            }
        }

        $crate::define_op! {
            dialect: $dialect,
            op: $op,
            attrs: [$($($attr_tokens)*)?],
            operands: [],
            results: [],
            regions: [],
        }

        $crate::dialect!(@parse $dialect [$($rest)*]);
    };
}

/// Internal macro to define a single operation.
///
/// Generates:
/// - Wrapper struct (newtype over OpRef)
/// - DialectOp trait impl
/// - Operand, result, attribute, region, successor accessors
/// - Constructor function
#[macro_export]
macro_rules! define_op {
    (
        dialect: $dialect:ident,
        op: $op:ident,
        attrs: [$($attr_tokens:tt)*],
        operands: [$($operand_tokens:tt)*],
        results: [$($result_tokens:tt)*],
        regions: [$($region_tokens:tt)*],
    ) => {
        $crate::paste::paste! {
            /// Typed dialect operation wrapper.
            #[derive(Clone, Copy, Debug, PartialEq, Eq)]
            pub struct [<$op:camel>]($crate::OpRef);

            impl $crate::DialectOp for [<$op:camel>] {
                const DIALECT_NAME: &'static str = $crate::raw_ident_str!($dialect);
                const OP_NAME: &'static str = $crate::raw_ident_str!($op);

                fn from_op(
                    ctx: &$crate::IrContext,
                    op: $crate::OpRef,
                ) -> Result<Self, $crate::OpConversionError> {
                    if !Self::matches(ctx, op) {
                        return Err($crate::OpConversionError::WrongOperation {
                            expected: $crate::dotted_name_str!($dialect, $op),
                            actual: format!("{}.{}",
                                ctx.op(op).dialect,
                                ctx.op(op).name),
                        });
                    }
                    Ok(Self(op))
                }

                fn op_ref(&self) -> $crate::OpRef {
                    self.0
                }
            }

            impl [<$op:camel>] {
                /// Get the underlying OpRef.
                pub fn op_ref(&self) -> $crate::OpRef {
                    self.0
                }

                // Generate operand accessors
                $crate::op_operand_accessors!($op, [$($operand_tokens)*]);

                // Generate result accessors
                $crate::op_result_accessors!($op, [$($result_tokens)*]);

                // Generate attribute accessors
                $crate::op_attr_accessors!([$($attr_tokens)*]);

                // Generate region/successor accessors
                $crate::op_region_accessors!([$($region_tokens)*]);
            }

            // Generate constructor function
            $crate::op_constructor!(
                dialect: $dialect,
                op: $op,
                attrs: [$($attr_tokens)*],
                operands: [$($operand_tokens)*],
                results: [$($result_tokens)*],
                regions: [$($region_tokens)*],
            );
        }
    };
}

// ============================================================================
// Operand accessor generation
// ============================================================================

#[doc(hidden)]
#[macro_export]
macro_rules! op_operand_accessors {
    // No operands
    ($op:ident, []) => {};

    // Variadic only: `#[rest] name`
    ($op:ident, [#[rest] $name:ident]) => {
        pub fn $name<'a>(&self, ctx: &'a $crate::IrContext) -> &'a [$crate::ValueRef] {
            ctx.op_operands(self.0)
        }
    };

    // Parse operands recursively to collect fixed + optional rest
    ($op:ident, [$($tokens:tt)*]) => {
        $crate::op_operand_accessors!(@collect $op, 0, [], [$($tokens)*]);
    };

    // Collect: hit rest
    (@collect $op:ident, $idx:expr, [$($fixed:tt)*], [#[rest] $name:ident]) => {
        $crate::op_operand_accessors!(@emit_fixed $idx, [$($fixed)*]);
        pub fn $name<'a>(&self, ctx: &'a $crate::IrContext) -> &'a [$crate::ValueRef] {
            &ctx.op_operands(self.0)[$idx..]
        }
    };

    // Collect: more fixed operands (with comma)
    (@collect $op:ident, $idx:expr, [$($fixed:tt)*], [$name:ident, $($rest:tt)*]) => {
        $crate::op_operand_accessors!(@collect $op, $idx + 1, [$($fixed)* ($name, $idx)], [$($rest)*]);
    };

    // Collect: last fixed operand (no trailing comma, no rest)
    (@collect $op:ident, $idx:expr, [$($fixed:tt)*], [$name:ident]) => {
        $crate::op_operand_accessors!(@emit_fixed $idx + 1, [$($fixed)* ($name, $idx)]);
    };

    // Emit all fixed operand accessors
    (@emit_fixed $total:expr, [$(($name:ident, $idx:expr))*]) => {
        $(
            pub fn $name(&self, ctx: &$crate::IrContext) -> $crate::ValueRef {
                ctx.op_operands(self.0)[$idx]
            }
        )*
    };
}

// ============================================================================
// Result accessor generation
// ============================================================================

#[doc(hidden)]
#[macro_export]
macro_rules! op_result_accessors {
    // No results
    ($op:ident, []) => {};

    // Variadic results: `#[rest] name`
    ($op:ident, [#[rest] $name:ident]) => {
        pub fn $name<'a>(&self, ctx: &'a $crate::IrContext) -> &'a [$crate::ValueRef] {
            ctx.op_results(self.0)
        }
    };

    // Single result
    ($op:ident, [$result:ident]) => {
        pub fn $result(&self, ctx: &$crate::IrContext) -> $crate::ValueRef {
            ctx.op_result(self.0, 0)
        }

        pub fn result_ty(&self, ctx: &$crate::IrContext) -> $crate::TypeRef {
            ctx.op_result_types(self.0)[0]
        }
    };

    // Multi results: (a, b, ...)
    ($op:ident, [$($result:ident),+]) => {
        $crate::op_result_accessors!(@multi 0, $($result),+);
    };

    (@multi $idx:expr, $result:ident) => {
        pub fn $result(&self, ctx: &$crate::IrContext) -> $crate::ValueRef {
            ctx.op_result(self.0, $idx)
        }

        $crate::paste::paste! {
            pub fn [<$result _ty>](&self, ctx: &$crate::IrContext) -> $crate::TypeRef {
                ctx.op_result_types(self.0)[$idx as usize]
            }
        }
    };

    (@multi $idx:expr, $result:ident, $($rest:ident),+) => {
        pub fn $result(&self, ctx: &$crate::IrContext) -> $crate::ValueRef {
            ctx.op_result(self.0, $idx)
        }

        $crate::paste::paste! {
            pub fn [<$result _ty>](&self, ctx: &$crate::IrContext) -> $crate::TypeRef {
                ctx.op_result_types(self.0)[$idx as usize]
            }
        }

        $crate::op_result_accessors!(@multi $idx + 1, $($rest),+);
    };
}

// ============================================================================
// Attribute accessor generation
// ============================================================================

#[doc(hidden)]
#[macro_export]
macro_rules! op_attr_accessors {
    ([]) => {};

    ([$name:ident : $ty:ident $(, $($rest:tt)*)?]) => {
        $crate::paste::paste! {
            pub fn $name(&self, ctx: &$crate::IrContext) -> $crate::op_attr_type!(@rust_type $ty) {
                let attr = ctx.op(self.0).attributes
                    .get(&$crate::Symbol::new($crate::raw_ident_str!($name)))
                    .unwrap_or_else(|| {
                        panic!("missing attribute: {}", $crate::raw_ident_str!($name))
                    });
                $crate::op_attr_type!(@from_attr $ty, attr)
            }
        }

        $crate::op_attr_accessors!([$($($rest)*)?]);
    };

    // Handle optional attribute (marked with ?)
    ([$name:ident ?: $ty:ident $(, $($rest:tt)*)?]) => {
        $crate::paste::paste! {
            pub fn $name(&self, ctx: &$crate::IrContext) -> Option<$crate::op_attr_type!(@rust_type $ty)> {
                ctx.op(self.0).attributes
                    .get(&$crate::Symbol::new($crate::raw_ident_str!($name)))
                    .map(|attr| $crate::op_attr_type!(@from_attr $ty, attr))
            }
        }

        $crate::op_attr_accessors!([$($($rest)*)?]);
    };
}

// ============================================================================
// Region/successor accessor generation
// ============================================================================

#[doc(hidden)]
#[macro_export]
macro_rules! op_region_accessors {
    ([]) => {};

    ([$($tokens:tt)*]) => {
        $crate::op_region_accessors!(@parse 0, 0, [$($tokens)*]);
    };

    // Region
    (@parse $region_idx:expr, $succ_idx:expr,
     [#[region($name:ident)] {} $($rest:tt)*]
    ) => {
        pub fn $name(&self, ctx: &$crate::IrContext) -> $crate::RegionRef {
            ctx.op(self.0).regions[$region_idx]
        }

        $crate::op_region_accessors!(@parse $region_idx + 1, $succ_idx, [$($rest)*]);
    };

    // Successor
    (@parse $region_idx:expr, $succ_idx:expr,
     [#[successor($name:ident)] $($rest:tt)*]
    ) => {
        pub fn $name(&self, ctx: &$crate::IrContext) -> $crate::BlockRef {
            ctx.op(self.0).successors[$succ_idx]
        }

        $crate::op_region_accessors!(@parse $region_idx, $succ_idx + 1, [$($rest)*]);
    };

    // Done
    (@parse $region_idx:expr, $succ_idx:expr, []) => {};
}

// ============================================================================
// Constructor function generation (accumulator pattern)
// ============================================================================

/// Generates constructor functions for dialect operations.
///
/// Uses an accumulator pattern to collect all parameters into a token list,
/// then emits the complete function in one shot. Body code is generated at
/// emit time from structured descriptors to avoid macro hygiene issues.
#[doc(hidden)]
#[macro_export]
macro_rules! op_constructor {
    // Entry: start accumulating from operands
    (
        dialect: $dialect:ident,
        op: $op:ident,
        attrs: [$($attr_tokens:tt)*],
        operands: [$($operand_tokens:tt)*],
        results: [$($result_tokens:tt)*],
        regions: [$($region_tokens:tt)*],
    ) => {
        $crate::op_constructor!(@operands
            dialect: $dialect,
            op: $op,
            attrs: [$($attr_tokens)*],
            operand_tokens: [$($operand_tokens)*],
            results: [$($result_tokens)*],
            regions: [$($region_tokens)*],
            fixed_ops: [],
            variadic_op: [],
            params: [],
        );
    };

    // ========================================================================
    // Phase 1: Collect operand params
    // ========================================================================

    // No operands → move to results
    (@operands
        dialect: $dialect:ident, op: $op:ident,
        attrs: [$($attr_tokens:tt)*],
        operand_tokens: [],
        results: [$($result_tokens:tt)*],
        regions: [$($region_tokens:tt)*],
        fixed_ops: [$($fixed_ops:tt)*],
        variadic_op: [$($variadic_op:tt)*],
        params: [$($params:tt)*],
    ) => {
        $crate::op_constructor!(@results
            dialect: $dialect, op: $op,
            attrs: [$($attr_tokens)*],
            results: [$($result_tokens)*],
            regions: [$($region_tokens)*],
            fixed_ops: [$($fixed_ops)*],
            variadic_op: [$($variadic_op)*],
            params: [$($params)*],
        );
    };

    // Variadic operand
    (@operands
        dialect: $dialect:ident, op: $op:ident,
        attrs: [$($attr_tokens:tt)*],
        operand_tokens: [#[rest] $name:ident],
        results: [$($result_tokens:tt)*],
        regions: [$($region_tokens:tt)*],
        fixed_ops: [$($fixed_ops:tt)*],
        variadic_op: [],
        params: [$($params:tt)*],
    ) => {
        $crate::op_constructor!(@results
            dialect: $dialect, op: $op,
            attrs: [$($attr_tokens)*],
            results: [$($result_tokens)*],
            regions: [$($region_tokens)*],
            fixed_ops: [$($fixed_ops)*],
            variadic_op: [$name],
            params: [$($params)* $name: impl IntoIterator<Item = $crate::ValueRef>,],
        );
    };

    // Fixed operand with more
    (@operands
        dialect: $dialect:ident, op: $op:ident,
        attrs: [$($attr_tokens:tt)*],
        operand_tokens: [$name:ident, $($rest:tt)*],
        results: [$($result_tokens:tt)*],
        regions: [$($region_tokens:tt)*],
        fixed_ops: [$($fixed_ops:tt)*],
        variadic_op: [$($variadic_op:tt)*],
        params: [$($params:tt)*],
    ) => {
        $crate::op_constructor!(@operands
            dialect: $dialect, op: $op,
            attrs: [$($attr_tokens)*],
            operand_tokens: [$($rest)*],
            results: [$($result_tokens)*],
            regions: [$($region_tokens)*],
            fixed_ops: [$($fixed_ops)* $name],
            variadic_op: [$($variadic_op)*],
            params: [$($params)* $name: $crate::ValueRef,],
        );
    };

    // Last fixed operand
    (@operands
        dialect: $dialect:ident, op: $op:ident,
        attrs: [$($attr_tokens:tt)*],
        operand_tokens: [$name:ident],
        results: [$($result_tokens:tt)*],
        regions: [$($region_tokens:tt)*],
        fixed_ops: [$($fixed_ops:tt)*],
        variadic_op: [$($variadic_op:tt)*],
        params: [$($params:tt)*],
    ) => {
        $crate::op_constructor!(@results
            dialect: $dialect, op: $op,
            attrs: [$($attr_tokens)*],
            results: [$($result_tokens)*],
            regions: [$($region_tokens)*],
            fixed_ops: [$($fixed_ops)* $name],
            variadic_op: [$($variadic_op)*],
            params: [$($params)* $name: $crate::ValueRef,],
        );
    };

    // ========================================================================
    // Phase 2: Collect result type params
    // ========================================================================

    // No results
    (@results
        dialect: $dialect:ident, op: $op:ident,
        attrs: [$($attr_tokens:tt)*],
        results: [],
        regions: [$($region_tokens:tt)*],
        fixed_ops: [$($fixed_ops:tt)*],
        variadic_op: [$($variadic_op:tt)*],
        params: [$($params:tt)*],
    ) => {
        $crate::op_constructor!(@attrs
            dialect: $dialect, op: $op,
            attr_tokens: [$($attr_tokens)*],
            regions: [$($region_tokens)*],
            fixed_ops: [$($fixed_ops)*],
            variadic_op: [$($variadic_op)*],
            result_var: [],
            variadic_result_var: [],
            attrs_structured: [],
            params: [$($params)*],
        );
    };

    // Variadic results
    (@results
        dialect: $dialect:ident, op: $op:ident,
        attrs: [$($attr_tokens:tt)*],
        results: [#[rest] $name:ident],
        regions: [$($region_tokens:tt)*],
        fixed_ops: [$($fixed_ops:tt)*],
        variadic_op: [$($variadic_op:tt)*],
        params: [$($params:tt)*],
    ) => {
        $crate::op_constructor!(@attrs
            dialect: $dialect, op: $op,
            attr_tokens: [$($attr_tokens)*],
            regions: [$($region_tokens)*],
            fixed_ops: [$($fixed_ops)*],
            variadic_op: [$($variadic_op)*],
            result_var: [],
            variadic_result_var: [result_types],
            attrs_structured: [],
            params: [$($params)* result_types: impl IntoIterator<Item = $crate::TypeRef>,],
        );
    };

    // Single result
    (@results
        dialect: $dialect:ident, op: $op:ident,
        attrs: [$($attr_tokens:tt)*],
        results: [$result:ident],
        regions: [$($region_tokens:tt)*],
        fixed_ops: [$($fixed_ops:tt)*],
        variadic_op: [$($variadic_op:tt)*],
        params: [$($params:tt)*],
    ) => {
        $crate::op_constructor!(@attrs
            dialect: $dialect, op: $op,
            attr_tokens: [$($attr_tokens)*],
            regions: [$($region_tokens)*],
            fixed_ops: [$($fixed_ops)*],
            variadic_op: [$($variadic_op)*],
            result_var: [result_ty],
            variadic_result_var: [],
            attrs_structured: [],
            params: [$($params)* result_ty: $crate::TypeRef,],
        );
    };

    // Multi results
    (@results
        dialect: $dialect:ident, op: $op:ident,
        attrs: [$($attr_tokens:tt)*],
        results: [$result:ident, $($rest:ident),+],
        regions: [$($region_tokens:tt)*],
        fixed_ops: [$($fixed_ops:tt)*],
        variadic_op: [$($variadic_op:tt)*],
        params: [$($params:tt)*],
    ) => {
        $crate::paste::paste! {
            $crate::op_constructor!(@results
                dialect: $dialect, op: $op,
                attrs: [$($attr_tokens)*],
                results: [$($rest),+],
                regions: [$($region_tokens)*],
                fixed_ops: [$($fixed_ops)*],
                variadic_op: [$($variadic_op)*],
                params: [$($params)* [<$result _ty>]: $crate::TypeRef,],
            );
        }
    };

    // ========================================================================
    // Phase 3: Collect attribute params + structured descriptors
    // ========================================================================

    // No attrs
    (@attrs
        dialect: $dialect:ident, op: $op:ident,
        attr_tokens: [],
        regions: [$($region_tokens:tt)*],
        fixed_ops: [$($fixed_ops:tt)*],
        variadic_op: [$($variadic_op:tt)*],
        result_var: [$($result_var:tt)*],
        variadic_result_var: [$($variadic_result_var:tt)*],
        attrs_structured: [$($attrs_s:tt)*],
        params: [$($params:tt)*],
    ) => {
        $crate::op_constructor!(@regions
            dialect: $dialect, op: $op,
            region_tokens: [$($region_tokens)*],
            fixed_ops: [$($fixed_ops)*],
            variadic_op: [$($variadic_op)*],
            result_var: [$($result_var)*],
            variadic_result_var: [$($variadic_result_var)*],
            attrs_structured: [$($attrs_s)*],
            rs_items: [],
            params: [$($params)*],
        );
    };

    // Required attr with more
    (@attrs
        dialect: $dialect:ident, op: $op:ident,
        attr_tokens: [$name:ident : $ty:ident, $($rest:tt)*],
        regions: [$($region_tokens:tt)*],
        fixed_ops: [$($fixed_ops:tt)*],
        variadic_op: [$($variadic_op:tt)*],
        result_var: [$($result_var:tt)*],
        variadic_result_var: [$($variadic_result_var:tt)*],
        attrs_structured: [$($attrs_s:tt)*],
        params: [$($params:tt)*],
    ) => {
        $crate::op_constructor!(@attrs
            dialect: $dialect, op: $op,
            attr_tokens: [$($rest)*],
            regions: [$($region_tokens)*],
            fixed_ops: [$($fixed_ops)*],
            variadic_op: [$($variadic_op)*],
            result_var: [$($result_var)*],
            variadic_result_var: [$($variadic_result_var)*],
            attrs_structured: [$($attrs_s)* {required $name $ty}],
            params: [$($params)* $name: $crate::op_attr_type!(@rust_type $ty),],
        );
    };

    // Required attr (last)
    (@attrs
        dialect: $dialect:ident, op: $op:ident,
        attr_tokens: [$name:ident : $ty:ident],
        regions: [$($region_tokens:tt)*],
        fixed_ops: [$($fixed_ops:tt)*],
        variadic_op: [$($variadic_op:tt)*],
        result_var: [$($result_var:tt)*],
        variadic_result_var: [$($variadic_result_var:tt)*],
        attrs_structured: [$($attrs_s:tt)*],
        params: [$($params:tt)*],
    ) => {
        $crate::op_constructor!(@regions
            dialect: $dialect, op: $op,
            region_tokens: [$($region_tokens)*],
            fixed_ops: [$($fixed_ops)*],
            variadic_op: [$($variadic_op)*],
            result_var: [$($result_var)*],
            variadic_result_var: [$($variadic_result_var)*],
            attrs_structured: [$($attrs_s)* {required $name $ty}],
            rs_items: [],
            params: [$($params)* $name: $crate::op_attr_type!(@rust_type $ty),],
        );
    };

    // Optional attr with more
    (@attrs
        dialect: $dialect:ident, op: $op:ident,
        attr_tokens: [$name:ident ?: $ty:ident, $($rest:tt)*],
        regions: [$($region_tokens:tt)*],
        fixed_ops: [$($fixed_ops:tt)*],
        variadic_op: [$($variadic_op:tt)*],
        result_var: [$($result_var:tt)*],
        variadic_result_var: [$($variadic_result_var:tt)*],
        attrs_structured: [$($attrs_s:tt)*],
        params: [$($params:tt)*],
    ) => {
        $crate::op_constructor!(@attrs
            dialect: $dialect, op: $op,
            attr_tokens: [$($rest)*],
            regions: [$($region_tokens)*],
            fixed_ops: [$($fixed_ops)*],
            variadic_op: [$($variadic_op)*],
            result_var: [$($result_var)*],
            variadic_result_var: [$($variadic_result_var)*],
            attrs_structured: [$($attrs_s)* {optional $name $ty}],
            params: [$($params)* $name: Option<$crate::op_attr_type!(@rust_type $ty)>,],
        );
    };

    // Optional attr (last)
    (@attrs
        dialect: $dialect:ident, op: $op:ident,
        attr_tokens: [$name:ident ?: $ty:ident],
        regions: [$($region_tokens:tt)*],
        fixed_ops: [$($fixed_ops:tt)*],
        variadic_op: [$($variadic_op:tt)*],
        result_var: [$($result_var:tt)*],
        variadic_result_var: [$($variadic_result_var:tt)*],
        attrs_structured: [$($attrs_s:tt)*],
        params: [$($params:tt)*],
    ) => {
        $crate::op_constructor!(@regions
            dialect: $dialect, op: $op,
            region_tokens: [$($region_tokens)*],
            fixed_ops: [$($fixed_ops)*],
            variadic_op: [$($variadic_op)*],
            result_var: [$($result_var)*],
            variadic_result_var: [$($variadic_result_var)*],
            attrs_structured: [$($attrs_s)* {optional $name $ty}],
            rs_items: [],
            params: [$($params)* $name: Option<$crate::op_attr_type!(@rust_type $ty)>,],
        );
    };

    // ========================================================================
    // Phase 4: Collect region/successor params
    // ========================================================================

    // No regions → emit
    (@regions
        dialect: $dialect:ident, op: $op:ident,
        region_tokens: [],
        fixed_ops: [$($fixed_ops:tt)*],
        variadic_op: [$($variadic_op:tt)*],
        result_var: [$($result_var:tt)*],
        variadic_result_var: [$($variadic_result_var:tt)*],
        attrs_structured: [$($attrs_s:tt)*],
        rs_items: [$($rs_items:tt)*],
        params: [$($params:tt)*],
    ) => {
        $crate::op_constructor!(@emit
            dialect: $dialect, op: $op,
            fixed_ops: [$($fixed_ops)*],
            variadic_op: [$($variadic_op)*],
            result_var: [$($result_var)*],
            variadic_result_var: [$($variadic_result_var)*],
            attrs_structured: [$($attrs_s)*],
            rs_items: [$($rs_items)*],
            params: [$($params)*],
        );
    };

    // Region
    (@regions
        dialect: $dialect:ident, op: $op:ident,
        region_tokens: [#[region($name:ident)] {} $($rest:tt)*],
        fixed_ops: [$($fixed_ops:tt)*],
        variadic_op: [$($variadic_op:tt)*],
        result_var: [$($result_var:tt)*],
        variadic_result_var: [$($variadic_result_var:tt)*],
        attrs_structured: [$($attrs_s:tt)*],
        rs_items: [$($rs_items:tt)*],
        params: [$($params:tt)*],
    ) => {
        $crate::op_constructor!(@regions
            dialect: $dialect, op: $op,
            region_tokens: [$($rest)*],
            fixed_ops: [$($fixed_ops)*],
            variadic_op: [$($variadic_op)*],
            result_var: [$($result_var)*],
            variadic_result_var: [$($variadic_result_var)*],
            attrs_structured: [$($attrs_s)*],
            rs_items: [$($rs_items)* {region $name}],
            params: [$($params)* $name: $crate::RegionRef,],
        );
    };

    // Successor
    (@regions
        dialect: $dialect:ident, op: $op:ident,
        region_tokens: [#[successor($name:ident)] $($rest:tt)*],
        fixed_ops: [$($fixed_ops:tt)*],
        variadic_op: [$($variadic_op:tt)*],
        result_var: [$($result_var:tt)*],
        variadic_result_var: [$($variadic_result_var:tt)*],
        attrs_structured: [$($attrs_s:tt)*],
        rs_items: [$($rs_items:tt)*],
        params: [$($params:tt)*],
    ) => {
        $crate::op_constructor!(@regions
            dialect: $dialect, op: $op,
            region_tokens: [$($rest)*],
            fixed_ops: [$($fixed_ops)*],
            variadic_op: [$($variadic_op)*],
            result_var: [$($result_var)*],
            variadic_result_var: [$($variadic_result_var)*],
            attrs_structured: [$($attrs_s)*],
            rs_items: [$($rs_items)* {successor $name}],
            params: [$($params)* $name: $crate::BlockRef,],
        );
    };

    // ========================================================================
    // Final: Emit. All body code generated here from structured descriptors.
    // result_var/variadic_result_var carry tokens from the same expansion as
    // params, avoiding macro hygiene scope mismatches.
    // ========================================================================
    (@emit
        dialect: $dialect:ident, op: $op:ident,
        fixed_ops: [$($fixed_op:ident)*],
        variadic_op: [$($variadic_op:ident)?],
        result_var: [$($result_var:ident)?],
        variadic_result_var: [$($variadic_result_var:ident)?],
        attrs_structured: [$($as:tt)*],
        rs_items: [$($rs:tt)*],
        params: [$($params:tt)*],
    ) => {
        $crate::paste::paste! {
            #[allow(clippy::too_many_arguments)]
            pub fn $op(
                ctx: &mut $crate::IrContext,
                location: $crate::Location,
                $($params)*
            ) -> [<$op:camel>] {
                #[allow(unused_mut)]
                let mut __builder = $crate::OperationDataBuilder::new(
                    location,
                    $crate::Symbol::new($crate::raw_ident_str!($dialect)),
                    $crate::Symbol::new($crate::raw_ident_str!($op)),
                );
                // Operands
                $( __builder = __builder.operand($fixed_op); )*
                $( __builder = __builder.operands($variadic_op); )?
                // Results (tokens from same expansion as params → same hygiene)
                $( __builder = __builder.result($result_var); )?
                $( __builder = __builder.results($variadic_result_var); )?
                // Attributes
                $( $crate::op_constructor!(@emit_attr_item __builder, $as); )*
                // Regions/Successors
                $( $crate::op_constructor!(@emit_rs_item __builder, $rs); )*

                let __data = __builder.build(ctx);
                let __op_ref = ctx.create_op(__data);
                [<$op:camel>](__op_ref)
            }
        }
    };

    // Attribute emit helpers
    (@emit_attr_item $builder:ident, {required $name:ident $ty:ident}) => {
        $builder = $builder.attr(
            $crate::Symbol::new($crate::raw_ident_str!($name)),
            $crate::op_attr_type!(@to_attr $ty, $name),
        );
    };
    (@emit_attr_item $builder:ident, {optional $name:ident $ty:ident}) => {
        if let ::core::option::Option::Some(__attr_val) = $name {
            $builder = $builder.attr(
                $crate::Symbol::new($crate::raw_ident_str!($name)),
                $crate::op_attr_type!(@to_attr $ty, __attr_val),
            );
        }
    };

    // Region/successor emit helpers
    (@emit_rs_item $builder:ident, {region $name:ident}) => {
        $builder = $builder.region($name);
    };
    (@emit_rs_item $builder:ident, {successor $name:ident}) => {
        $builder = $builder.successor($name);
    };
}

#[cfg(test)]
mod tests {
    use crate::{DialectOp, IrContext, Location, Span, TypeDataBuilder};

    mod test_dialect {
        crate::dialect! {
            mod test {
                #[attr(value: i64)]
                fn lit() -> result;
                fn pair(lhs, rhs) -> result;
                #[attr(callee: Symbol)]
                fn invoke(#[rest] args) -> #[rest] results;
            }
        }
    }

    fn loc(ctx: &mut IrContext) -> Location {
        let path = ctx.paths.intern("file:///test.gr".to_owned());
        Location::new(path, Span::new(0, 0))
    }

    #[test]
    fn wrapper_round_trip() {
        let mut ctx = IrContext::new();
        let location = loc(&mut ctx);
        let i64_ty = ctx.types.intern(
            TypeDataBuilder::new(crate::Symbol::new("core"), crate::Symbol::new("i64")).build(),
        );

        let lit = test_dialect::lit(&mut ctx, location, i64_ty, 7);
        assert_eq!(lit.value(&ctx), 7);
        assert_eq!(lit.result_ty(&ctx), i64_ty);

        let again = test_dialect::Lit::from_op(&ctx, lit.op_ref()).unwrap();
        assert_eq!(again, lit);
    }

    #[test]
    fn from_op_rejects_other_ops() {
        let mut ctx = IrContext::new();
        let location = loc(&mut ctx);
        let i64_ty = ctx.types.intern(
            TypeDataBuilder::new(crate::Symbol::new("core"), crate::Symbol::new("i64")).build(),
        );

        let lit = test_dialect::lit(&mut ctx, location, i64_ty, 0);
        assert!(test_dialect::Pair::from_op(&ctx, lit.op_ref()).is_err());
        assert!(!test_dialect::Pair::matches(&ctx, lit.op_ref()));
    }

    #[test]
    fn fixed_and_variadic_operands() {
        let mut ctx = IrContext::new();
        let location = loc(&mut ctx);
        let i64_ty = ctx.types.intern(
            TypeDataBuilder::new(crate::Symbol::new("core"), crate::Symbol::new("i64")).build(),
        );

        let a = test_dialect::lit(&mut ctx, location, i64_ty, 1);
        let b = test_dialect::lit(&mut ctx, location, i64_ty, 2);
        let va = a.result(&ctx);
        let vb = b.result(&ctx);

        let pair = test_dialect::pair(&mut ctx, location, va, vb, i64_ty);
        assert_eq!(pair.lhs(&ctx), va);
        assert_eq!(pair.rhs(&ctx), vb);

        let call = test_dialect::invoke(
            &mut ctx,
            location,
            [va, vb],
            [i64_ty],
            crate::Symbol::new("callee_fn"),
        );
        assert_eq!(call.args(&ctx), &[va, vb]);
        assert_eq!(call.results(&ctx).len(), 1);
        assert_eq!(call.callee(&ctx), "callee_fn");
    }

    #[test]
    fn symbol_helpers() {
        assert_eq!(test_dialect::DIALECT_NAME(), "test");
        assert_eq!(test_dialect::LIT(), "lit");
    }
}
