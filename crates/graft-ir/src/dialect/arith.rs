//! Arith dialect: integer constants and arithmetic.

crate::dialect! {
    mod arith {
        #[attr(value: any)]
        fn r#const() -> result;

        fn add(lhs, rhs) -> result;
        fn sub(lhs, rhs) -> result;
        fn mul(lhs, rhs) -> result;

        fn cmp_eq(lhs, rhs) -> result;
        fn cmp_lt(lhs, rhs) -> result;

        /// Widen an integer to the result type (sign-extending).
        fn extend(operand) -> result;
        fn trunc(operand) -> result;
    }
}

use crate::{Attribute, IrContext, Location, TypeRef};

/// Integer constant of the given type and value bits.
pub fn const_int(ctx: &mut IrContext, location: Location, ty: TypeRef, bits: u64) -> Const {
    r#const(ctx, location, ty, Attribute::IntBits(bits))
}

/// Boolean (i1) constant.
pub fn const_bool(ctx: &mut IrContext, location: Location, ty: TypeRef, value: bool) -> Const {
    r#const(ctx, location, ty, Attribute::Bool(value))
}
