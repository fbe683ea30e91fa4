//! Core dialect: module container, integer types, and the temporary cast
//! op that the type converter's default materializer emits.

use crate::{IrContext, TypeDataBuilder, TypeRef};

crate::dialect! {
    mod core {
        type nil;
        type i1;
        type i8;
        type i32;
        type i64;

        #[attr(sym_name: Symbol)]
        fn module() {
            #[region(body)] {}
        };

        /// Bridges a value across a type boundary during conversion.
        /// Cast-resolution folds these away once both sides agree.
        fn unrealized_conversion_cast(value) -> result;
    }
}

fn simple_ty(ctx: &mut IrContext, name: &'static str) -> TypeRef {
    ctx.types
        .intern(TypeDataBuilder::new(DIALECT_NAME(), crate::Symbol::new(name)).build())
}

/// The empty type, used as the return type of void functions.
pub fn nil_ty(ctx: &mut IrContext) -> TypeRef {
    simple_ty(ctx, "nil")
}

pub fn i1_ty(ctx: &mut IrContext) -> TypeRef {
    simple_ty(ctx, "i1")
}

pub fn i8_ty(ctx: &mut IrContext) -> TypeRef {
    simple_ty(ctx, "i8")
}

pub fn i32_ty(ctx: &mut IrContext) -> TypeRef {
    simple_ty(ctx, "i32")
}

pub fn i64_ty(ctx: &mut IrContext) -> TypeRef {
    simple_ty(ctx, "i64")
}
