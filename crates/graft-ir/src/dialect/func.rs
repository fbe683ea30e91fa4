//! Func dialect: functions, calls, and returns.
//!
//! A function's signature is carried as a `func.fn` type in its `type`
//! attribute: params[0] is the return type, params[1..] are the parameter
//! types. A `func.func` whose body region has no blocks is a declaration.

use smallvec::SmallVec;

use crate::{IrContext, Symbol, TypeDataBuilder, TypeRef};

crate::dialect! {
    mod func {
        #[attr(sym_name: Symbol, r#type: Type)]
        fn func() {
            #[region(body)] {}
        };

        #[attr(callee: Symbol)]
        fn call(#[rest] args) -> #[rest] results;

        fn r#return(#[rest] values);

        /// Materialize a function reference as an SSA value.
        #[attr(func_ref: Symbol)]
        fn constant() -> result;
    }
}

impl Func {
    /// True when the function has no body blocks (an external declaration).
    pub fn is_declaration(&self, ctx: &IrContext) -> bool {
        ctx.region(self.body(ctx)).blocks.is_empty()
    }
}

/// Intern a `func.fn` signature type. params[0] is the return type.
pub fn fn_ty(
    ctx: &mut IrContext,
    return_ty: TypeRef,
    param_tys: impl IntoIterator<Item = TypeRef>,
) -> TypeRef {
    ctx.types.intern(
        TypeDataBuilder::new(DIALECT_NAME(), Symbol::new("fn"))
            .param(return_ty)
            .params(param_tys)
            .build(),
    )
}

/// The return type of a `func.fn` signature.
pub fn fn_return_ty(ctx: &IrContext, ty: TypeRef) -> TypeRef {
    ctx.types.get(ty).params[0]
}

/// The parameter types of a `func.fn` signature.
pub fn fn_param_tys(ctx: &IrContext, ty: TypeRef) -> SmallVec<[TypeRef; 4]> {
    ctx.types.get(ty).params[1..].into()
}
