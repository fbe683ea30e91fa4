//! PatternRewriter: accumulates mutations from pattern rewrites.
//!
//! Patterns never splice the graph themselves; they create detached ops and
//! record what should happen through this interface. The driver applies the
//! mutations after the pattern returns, so a pattern that bails out early
//! leaves the graph untouched.

use crate::context::IrContext;
use crate::dialect::core;
use crate::refs::{BlockRef, OpRef, ValueRef};
use crate::rewrite::type_converter::TypeConverter;

/// Accumulated mutations from a pattern rewrite.
pub(crate) struct Mutations {
    /// Operations to insert before the current op's position.
    pub(crate) prefix_ops: Vec<OpRef>,
    /// The replacement operation (if any).
    pub(crate) replacement: Option<OpRef>,
    /// If set, the operation is erased and its results mapped to these values.
    pub(crate) erase_values: Option<Vec<ValueRef>>,
    /// Operations to add at module level.
    pub(crate) module_ops: Vec<OpRef>,
}

/// Rewriter interface for patterns.
///
/// Patterns use this to record mutations which are applied by the
/// `ConversionDriver` after the pattern returns. Operands are read directly
/// from the context, and value replacements happen via
/// `IrContext::replace_all_uses`.
pub struct PatternRewriter<'a> {
    type_converter: &'a TypeConverter,
    prefix_ops: Vec<OpRef>,
    replacement: Option<OpRef>,
    erase_values: Option<Vec<ValueRef>>,
    module_ops: Vec<OpRef>,
}

impl<'a> PatternRewriter<'a> {
    /// Create a new empty rewriter with a reference to the type converter.
    pub(crate) fn new(type_converter: &'a TypeConverter) -> Self {
        Self {
            type_converter,
            prefix_ops: Vec::new(),
            replacement: None,
            erase_values: None,
            module_ops: Vec::new(),
        }
    }

    /// Get a reference to the type converter.
    pub fn type_converter(&self) -> &TypeConverter {
        self.type_converter
    }

    // === Mutations ===

    /// Insert an operation before the current operation.
    ///
    /// The op must already be created via `ctx.create_op()` but not yet
    /// attached to a block. Multiple calls accumulate operations in order.
    pub fn insert_op(&mut self, op: OpRef) {
        self.prefix_ops.push(op);
    }

    /// Replace the current operation with a new one.
    ///
    /// The driver will RAUW old results → new results (1:1 by index),
    /// then remove the old op from its block and insert the new one.
    pub fn replace_op(&mut self, new_op: OpRef) {
        debug_assert!(
            self.replacement.is_none() && self.erase_values.is_none(),
            "replace_op called after replace_op or erase_op"
        );
        self.replacement = Some(new_op);
    }

    /// Erase the current operation, mapping its results to the given values.
    ///
    /// The replacement values must match the original result count.
    /// The driver will RAUW each old result to the corresponding value.
    pub fn erase_op(&mut self, replacement_values: Vec<ValueRef>) {
        debug_assert!(
            self.replacement.is_none() && self.erase_values.is_none(),
            "erase_op called after replace_op or erase_op"
        );
        self.erase_values = Some(replacement_values);
    }

    /// Add an operation at module level (e.g., a function declaration).
    pub fn add_module_op(&mut self, op: OpRef) {
        self.module_ops.push(op);
    }

    // === Query ===

    /// Check if any mutation was recorded.
    pub(crate) fn has_mutations(&self) -> bool {
        !self.prefix_ops.is_empty()
            || self.replacement.is_some()
            || self.erase_values.is_some()
            || !self.module_ops.is_empty()
    }

    /// Consume the rewriter and return accumulated mutations.
    pub(crate) fn take_mutations(self) -> Mutations {
        Mutations {
            prefix_ops: self.prefix_ops,
            replacement: self.replacement,
            erase_values: self.erase_values,
            module_ops: self.module_ops,
        }
    }

    // === Convenience helpers ===

    /// Replace the current op and also insert prefix ops in one call.
    pub fn replace_with_prefix(&mut self, prefix: Vec<OpRef>, replacement: OpRef) {
        self.prefix_ops.extend(prefix);
        self.replace_op(replacement);
    }
}

/// Apply mutations to the IR context.
///
/// Called by the driver after a pattern returns `true`. Returns the ops that
/// entered the graph (prefix, replacement, materialized casts, module-level)
/// so the driver can re-enqueue them.
///
/// When a replacement changes a result's type, remaining uses of the old
/// value cannot simply point at the new one; a
/// `core.unrealized_conversion_cast` back to the old type is materialized
/// and the uses are redirected through it. Cast resolution folds these away
/// once the consumers convert too.
pub(crate) fn apply_mutations(
    ctx: &mut IrContext,
    original_op: OpRef,
    mutations: Mutations,
    module_first_block: Option<BlockRef>,
) -> Vec<OpRef> {
    let parent_block = ctx.op(original_op).parent_block;
    let mut created = Vec::new();

    // 1. Insert prefix ops before the original op
    if let Some(block) = parent_block {
        for prefix_op in &mutations.prefix_ops {
            ctx.insert_op_before(block, original_op, *prefix_op);
        }
    }
    created.extend(mutations.prefix_ops.iter().copied());

    // 2. Handle replacement or erasure
    if let Some(new_op) = mutations.replacement {
        let old_results: Vec<ValueRef> = ctx.op_results(original_op).to_vec();
        let new_results: Vec<ValueRef> = ctx.op_results(new_op).to_vec();
        debug_assert_eq!(
            old_results.len(),
            new_results.len(),
            "replace_op: result count mismatch ({} vs {})",
            old_results.len(),
            new_results.len()
        );

        // Splice: remove old from block, insert new in its place
        if let Some(block) = parent_block {
            let ops = ctx.block(block).ops.to_vec();
            let pos = ops.iter().position(|&o| o == original_op);
            ctx.remove_op_from_block(block, original_op);
            if let Some(pos) = pos {
                let ops_after = ctx.block(block).ops.to_vec();
                if pos < ops_after.len() {
                    ctx.insert_op_before(block, ops_after[pos], new_op);
                } else {
                    ctx.push_op(block, new_op);
                }
            } else {
                ctx.push_op(block, new_op);
            }
        }

        // RAUW old results → new results, bridging type changes with casts
        let mut insert_point = new_op;
        for (&old_v, &new_v) in old_results.iter().zip(new_results.iter()) {
            let old_ty = ctx.value_ty(old_v);
            let new_ty = ctx.value_ty(new_v);
            if old_ty == new_ty || parent_block.is_none() || !ctx.has_uses(old_v) {
                ctx.replace_all_uses(old_v, new_v);
            } else {
                let location = ctx.op(new_op).location;
                let cast = core::unrealized_conversion_cast(ctx, location, new_v, old_ty);
                if let Some(block) = ctx.op(new_op).parent_block {
                    ctx.insert_op_after(block, insert_point, cast.op_ref());
                    insert_point = cast.op_ref();
                }
                ctx.replace_all_uses(old_v, cast.result(ctx));
                created.push(cast.op_ref());
            }
        }

        // Clean up old op
        ctx.remove_op(original_op);
        created.push(new_op);
    } else if let Some(erase_values) = mutations.erase_values {
        let old_results: Vec<ValueRef> = ctx.op_results(original_op).to_vec();
        debug_assert_eq!(
            old_results.len(),
            erase_values.len(),
            "erase_op: replacement value count mismatch ({} vs {})",
            old_results.len(),
            erase_values.len()
        );
        for (&old_v, &new_v) in old_results.iter().zip(erase_values.iter()) {
            let old_ty = ctx.value_ty(old_v);
            let new_ty = ctx.value_ty(new_v);
            if old_ty == new_ty || parent_block.is_none() || !ctx.has_uses(old_v) {
                ctx.replace_all_uses(old_v, new_v);
            } else {
                let location = ctx.op(original_op).location;
                let cast = core::unrealized_conversion_cast(ctx, location, new_v, old_ty);
                if let Some(block) = parent_block {
                    ctx.insert_op_before(block, original_op, cast.op_ref());
                }
                ctx.replace_all_uses(old_v, cast.result(ctx));
                created.push(cast.op_ref());
            }
        }

        // Remove from block and destroy
        if let Some(block) = parent_block {
            ctx.remove_op_from_block(block, original_op);
        }
        ctx.remove_op(original_op);
    }

    // 3. Add module-level ops
    if let Some(module_block) = module_first_block {
        for module_op in &mutations.module_ops {
            ctx.push_op(module_block, *module_op);
        }
    }
    created.extend(mutations.module_ops.iter().copied());

    created
}
