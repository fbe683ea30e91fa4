//! Type converter: maps types during dialect conversion.
//!
//! Conversion rules are tried newest-first: the rule registered last wins,
//! so a pass can layer its own rules over a base converter and override
//! individual cases. A rule returns `None` to defer to the next one; when
//! every rule defers, the type converts to itself.

use crate::context::IrContext;
use crate::dialect::core;
use crate::refs::{OpRef, TypeRef, ValueRef};
use crate::types::Location;

/// Result of materializing a type conversion.
pub struct MaterializeResult {
    /// The converted value.
    pub value: ValueRef,
    /// Operations created during materialization (to be inserted).
    pub ops: Vec<OpRef>,
}

/// Type conversion function signature.
type ConversionFn = dyn Fn(&mut IrContext, TypeRef) -> Option<TypeRef>;

/// Materialization function signature: creates cast ops when needed.
type MaterializerFn =
    dyn Fn(&mut IrContext, Location, ValueRef, TypeRef, TypeRef) -> Option<MaterializeResult>;

/// Maps types during dialect conversion.
///
/// Holds an ordered collection of conversion rules and a materialization
/// callback for bridging values across unconverted boundaries.
pub struct TypeConverter {
    /// Conversion rules in registration order; tried back-to-front.
    conversions: Vec<Box<ConversionFn>>,
    /// Materialization function: creates cast ops when needed.
    materializer: Option<Box<MaterializerFn>>,
}

impl TypeConverter {
    /// Create a new converter with no rules. With no rules every type
    /// converts to itself.
    pub fn new() -> Self {
        Self {
            conversions: Vec::new(),
            materializer: None,
        }
    }

    /// Add a conversion rule. Rules added later take priority over rules
    /// added earlier.
    pub fn add_conversion(
        &mut self,
        f: impl Fn(&mut IrContext, TypeRef) -> Option<TypeRef> + 'static,
    ) {
        self.conversions.push(Box::new(f));
    }

    /// Layer this converter on top of `inner`: `inner`'s rules become the
    /// low-priority tail, consulted only when none of this converter's own
    /// rules apply.
    pub fn prepend(&mut self, inner: TypeConverter) {
        let mut rules = inner.conversions;
        rules.append(&mut self.conversions);
        self.conversions = rules;
    }

    /// Set the materialization function.
    pub fn set_materializer(
        &mut self,
        f: impl Fn(&mut IrContext, Location, ValueRef, TypeRef, TypeRef) -> Option<MaterializeResult>
        + 'static,
    ) {
        self.materializer = Some(Box::new(f));
    }

    /// Convert a type. Rules are consulted newest-first; if every rule
    /// defers, the type maps to itself.
    pub fn convert_type(&self, ctx: &mut IrContext, ty: TypeRef) -> TypeRef {
        for conv in self.conversions.iter().rev() {
            if let Some(converted) = conv(ctx, ty) {
                return converted;
            }
        }
        ty
    }

    /// True when the type is a fixpoint of the conversion.
    pub fn is_legal_type(&self, ctx: &mut IrContext, ty: TypeRef) -> bool {
        self.convert_type(ctx, ty) == ty
    }

    /// Convert a `func.fn` signature type: return type and each parameter
    /// type convert independently.
    pub fn convert_signature(&self, ctx: &mut IrContext, fn_ty: TypeRef) -> TypeRef {
        let params = ctx.types.get(fn_ty).params.clone();
        debug_assert!(
            !params.is_empty(),
            "convert_signature: fn type must carry a return type"
        );
        let return_ty = self.convert_type(ctx, params[0]);
        let param_tys: Vec<TypeRef> = params[1..]
            .iter()
            .map(|&p| self.convert_type(ctx, p))
            .collect();
        crate::dialect::func::fn_ty(ctx, return_ty, param_tys)
    }

    /// Materialize a conversion from one type to another by creating cast
    /// ops. Falls back to a `core.unrealized_conversion_cast` when no
    /// materializer is set.
    pub fn materialize(
        &self,
        ctx: &mut IrContext,
        location: Location,
        value: ValueRef,
        from_ty: TypeRef,
        to_ty: TypeRef,
    ) -> Option<MaterializeResult> {
        if from_ty == to_ty {
            return Some(MaterializeResult {
                value,
                ops: Vec::new(),
            });
        }
        if let Some(materializer) = &self.materializer {
            return materializer(ctx, location, value, from_ty, to_ty);
        }
        let cast = core::unrealized_conversion_cast(ctx, location, value, to_ty);
        Some(MaterializeResult {
            value: cast.result(ctx),
            ops: vec![cast.op_ref()],
        })
    }

    /// Check if this converter has any conversion rules.
    pub fn is_empty(&self) -> bool {
        self.conversions.is_empty()
    }
}

impl Default for TypeConverter {
    fn default() -> Self {
        Self::new()
    }
}
