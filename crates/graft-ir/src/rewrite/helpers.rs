//! Shared helpers for conversion patterns.

use crate::context::{IrContext, OperationDataBuilder};
use crate::refs::{OpRef, RegionRef, TypeRef, ValueDef, ValueRef};
use crate::rewrite::type_converter::TypeConverter;
use crate::types::Location;
use crate::Symbol;

/// Clone an operation's header — dialect, name, location, attributes,
/// operands, and successors — with fresh result types and the given regions.
///
/// The regions are typically the original op's own regions, detached with
/// `IrContext::detach_region` first so every block, op, and value inside
/// keeps its identity. The clone is created detached; the caller attaches it
/// via the rewriter.
pub fn clone_op_stripped(
    ctx: &mut IrContext,
    op: OpRef,
    result_types: impl IntoIterator<Item = TypeRef>,
    regions: impl IntoIterator<Item = RegionRef>,
) -> OpRef {
    let data = ctx.op(op);
    let location = data.location;
    let dialect = data.dialect;
    let name = data.name;
    let attributes = data.attributes.clone();
    let successors = data.successors.clone();
    let operands: Vec<ValueRef> = ctx.op_operands(op).to_vec();

    let mut builder = OperationDataBuilder::new(location, dialect, name)
        .operands(operands)
        .results(result_types);
    for (key, value) in attributes {
        builder = builder.attr(key, value);
    }
    for region in regions {
        builder = builder.region(region);
    }
    for successor in successors {
        builder = builder.successor(successor);
    }
    let data = builder.build(ctx);
    ctx.create_op(data)
}

/// The converted rendition of a value under `converter`.
///
/// Returns the value itself when its type is already a fixpoint. When the
/// value is the result of a materialized cast whose input already has the
/// target type, the cast is looked through. Otherwise a cast to the target
/// type is materialized; the returned ops must be inserted ahead of the use.
pub fn remap_value(
    ctx: &mut IrContext,
    converter: &TypeConverter,
    location: Location,
    value: ValueRef,
) -> (ValueRef, Vec<OpRef>) {
    let ty = ctx.value_ty(value);
    let target = converter.convert_type(ctx, ty);
    if target == ty {
        return (value, Vec::new());
    }

    // Look through a materialized cast back to the converted producer.
    if let ValueDef::OpResult(def_op, _) = ctx.value_def(value) {
        let data = ctx.op(def_op);
        if data.dialect == Symbol::new("core")
            && data.name == Symbol::new("unrealized_conversion_cast")
        {
            let input = ctx.op_operands(def_op)[0];
            if ctx.value_ty(input) == target {
                return (input, Vec::new());
            }
        }
    }

    match converter.materialize(ctx, location, value, ty, target) {
        Some(materialized) => (materialized.value, materialized.ops),
        None => (value, Vec::new()),
    }
}
