//! Text format printer for the IR.
//!
//! Prints IR in a deterministic format:
//!
//! ```text
//! core.module @name {
//!   func.func @main(%arg0: core.i32) -> core.i32 {
//!     %0 = arith.const {value = 42} : core.i32
//!     func.return %0
//!   }
//! }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::fmt::Write;

use crate::context::IrContext;
use crate::refs::*;
use crate::types::*;

/// Print state for value numbering and block labeling.
struct PrintState<'a> {
    ctx: &'a IrContext,
    value_names: HashMap<ValueRef, String>,
    block_labels: HashMap<BlockRef, String>,
    next_value_num: usize,
    next_block_num: usize,
}

impl<'a> PrintState<'a> {
    fn new(ctx: &'a IrContext) -> Self {
        Self {
            ctx,
            value_names: HashMap::new(),
            block_labels: HashMap::new(),
            next_value_num: 0,
            next_block_num: 0,
        }
    }

    fn assign_value_name(&mut self, v: ValueRef) -> String {
        let name = format!("%{}", self.next_value_num);
        self.next_value_num += 1;
        self.value_names.insert(v, name.clone());
        name
    }

    fn get_value_name(&self, v: ValueRef) -> &str {
        self.value_names.get(&v).map(|s| s.as_str()).unwrap_or("%?")
    }

    fn assign_block_label(&mut self, b: BlockRef) -> String {
        let label = format!("^bb{}", self.next_block_num);
        self.next_block_num += 1;
        self.block_labels.insert(b, label.clone());
        label
    }

    fn get_block_label(&self, b: BlockRef) -> &str {
        self.block_labels
            .get(&b)
            .map(|s| s.as_str())
            .unwrap_or("^bb?")
    }

    /// Save only counters (not maps). Use with `restore_counters`.
    fn save_counters(&self) -> (usize, usize) {
        (self.next_value_num, self.next_block_num)
    }

    fn reset_numbering(&mut self) {
        self.next_value_num = 0;
        self.next_block_num = 0;
        self.value_names.clear();
        self.block_labels.clear();
    }

    /// Restore only counters saved by `save_counters`.
    fn restore_counters(&mut self, state: (usize, usize)) {
        self.next_value_num = state.0;
        self.next_block_num = state.1;
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Print an operation as IR text.
pub fn print_op(ctx: &IrContext, op: OpRef) -> String {
    let mut state = PrintState::new(ctx);
    let mut out = String::new();
    print_operation(&mut state, &mut out, op, 0).expect("fmt::Write to String never fails");
    out
}

/// Print a type as IR text.
pub fn print_type(ctx: &IrContext, ty: TypeRef) -> String {
    let mut out = String::new();
    write_type(ctx, &mut out, ty).expect("fmt::Write to String never fails");
    out
}

/// Print a module (root operation with nested functions) as IR text.
pub fn print_module(ctx: &IrContext, root: OpRef) -> String {
    let mut state = PrintState::new(ctx);
    let mut out = String::new();
    print_module_op(&mut state, &mut out, root).expect("fmt::Write to String never fails");
    out
}

// ============================================================================
// Type printing
// ============================================================================

fn write_type(ctx: &IrContext, f: &mut impl Write, ty: TypeRef) -> fmt::Result {
    let data = ctx.types.get(ty);
    write!(f, "{}.{}", data.dialect, data.name)?;
    if !data.params.is_empty() {
        f.write_char('(')?;
        for (i, &param) in data.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write_type(ctx, f, param)?;
        }
        f.write_char(')')?;
    } else if !data.attrs.is_empty() {
        // Empty parens signal that attrs follow
        f.write_str("()")?;
    }
    if !data.attrs.is_empty() {
        f.write_str(" {")?;
        for (i, (key, val)) in data.attrs.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} = ", key)?;
            write_attribute(ctx, f, val)?;
        }
        f.write_char('}')?;
    }
    Ok(())
}

// ============================================================================
// Attribute printing
// ============================================================================

fn write_attribute(ctx: &IrContext, f: &mut impl Write, attr: &Attribute) -> fmt::Result {
    match attr {
        Attribute::Unit => f.write_str("unit"),
        Attribute::Bool(b) => write!(f, "{b}"),
        Attribute::IntBits(v) => write!(f, "{v}"),
        Attribute::String(s) => {
            f.write_char('"')?;
            write_escaped_string(f, s)?;
            f.write_char('"')
        }
        Attribute::Symbol(sym) => write_symbol(f, *sym),
        Attribute::Type(ty) => write_type(ctx, f, *ty),
        Attribute::List(list) => {
            f.write_char('[')?;
            for (i, item) in list.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write_attribute(ctx, f, item)?;
            }
            f.write_char(']')
        }
        Attribute::Location(loc) => {
            let path_str = ctx.paths.get(loc.path);
            f.write_str("loc(\"")?;
            write_escaped_string(f, path_str)?;
            write!(f, "\" {}:{})", loc.span.start, loc.span.end)
        }
    }
}

fn write_escaped_string(f: &mut impl Write, s: &str) -> fmt::Result {
    for ch in s.chars() {
        match ch {
            '\\' => f.write_str("\\\\")?,
            '"' => f.write_str("\\\"")?,
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            '\r' => f.write_str("\\r")?,
            '\0' => f.write_str("\\0")?,
            c if c.is_control() => write!(f, "\\x{:02x}", c as u32)?,
            c => f.write_char(c)?,
        }
    }
    Ok(())
}

fn write_symbol(f: &mut impl Write, sym: crate::Symbol) -> fmt::Result {
    sym.with_str(|s| {
        let needs_quoting = s.is_empty() || !s.chars().all(|c| c.is_alphanumeric() || c == '_');
        if needs_quoting {
            f.write_str("@\"")?;
            write_escaped_string(f, s)?;
            f.write_char('"')
        } else {
            write!(f, "@{s}")
        }
    })
}

// ============================================================================
// Operation printing
// ============================================================================

fn print_operation(
    state: &mut PrintState<'_>,
    f: &mut impl Write,
    op: OpRef,
    indent: usize,
) -> fmt::Result {
    let data = state.ctx.op(op);
    let dialect = data.dialect;
    let name = data.name;

    // Check for special ops
    let is_func = dialect == crate::Symbol::new("func") && name == crate::Symbol::new("func");
    let is_module = dialect == crate::Symbol::new("core") && name == crate::Symbol::new("module");

    if is_module {
        return print_module_op(state, f, op);
    }
    if is_func {
        return print_func_op(state, f, op, indent);
    }

    print_generic_op(state, f, op, indent)
}

fn print_generic_op(
    state: &mut PrintState<'_>,
    f: &mut impl Write,
    op: OpRef,
    indent: usize,
) -> fmt::Result {
    let indent_str = " ".repeat(indent);
    write!(f, "{indent_str}")?;

    // Results
    let results = state.ctx.op_results(op);
    if results.len() == 1 {
        let name = state.assign_value_name(results[0]);
        write!(f, "{name} = ")?;
    } else if results.len() > 1 {
        for (i, &v) in results.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            let name = state.assign_value_name(v);
            f.write_str(&name)?;
        }
        f.write_str(" = ")?;
    }

    // Dialect.op
    let data = state.ctx.op(op);
    write!(f, "{}.{}", data.dialect, data.name)?;

    // Operands
    let operands = state.ctx.op_operands(op);
    if !operands.is_empty() {
        f.write_char(' ')?;
        for (i, &v) in operands.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(state.get_value_name(v))?;
        }
    }

    // Successors
    let successors = &state.ctx.op(op).successors;
    if !successors.is_empty() {
        f.write_str(" [")?;
        for (i, &b) in successors.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(state.get_block_label(b))?;
        }
        f.write_char(']')?;
    }

    // Attributes
    let attrs = &state.ctx.op(op).attributes;
    if !attrs.is_empty() {
        f.write_str(" {")?;
        for (i, (key, val)) in attrs.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key} = ")?;
            write_attribute(state.ctx, f, val)?;
        }
        f.write_char('}')?;
    }

    // Result types
    let result_types = state.ctx.op_result_types(op);
    if !result_types.is_empty() {
        f.write_str(" : ")?;
        for (i, &ty) in result_types.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write_type(state.ctx, f, ty)?;
        }
    }

    // Regions
    let regions = &state.ctx.op(op).regions;
    for &region in regions.iter() {
        f.write_str(" {\n")?;
        print_region(state, f, region, indent + 2)?;
        write!(f, "{indent_str}}}")?;
    }

    f.write_char('\n')
}

// ============================================================================
// Region / Block printing
// ============================================================================

fn print_region(
    state: &mut PrintState<'_>,
    f: &mut impl Write,
    region: RegionRef,
    indent: usize,
) -> fmt::Result {
    let region_data = state.ctx.region(region);
    let blocks: Vec<_> = region_data.blocks.iter().copied().collect();

    // Pre-assign block labels
    for &block in &blocks {
        state.assign_block_label(block);
    }

    let can_elide_label = blocks.len() == 1 && state.ctx.block_args(blocks[0]).is_empty();

    for (i, &block) in blocks.iter().enumerate() {
        if !can_elide_label {
            let indent_str = " ".repeat(indent);
            let label = state.get_block_label(block).to_owned();
            write!(f, "{indent_str}{label}")?;
            let args = state.ctx.block_args(block);
            if !args.is_empty() {
                f.write_char('(')?;
                for (j, &arg) in args.iter().enumerate() {
                    if j > 0 {
                        f.write_str(", ")?;
                    }
                    let arg_name = state.assign_value_name(arg);
                    let ty = state.ctx.value_ty(arg);
                    write!(f, "{arg_name}: ")?;
                    write_type(state.ctx, f, ty)?;
                }
                f.write_char(')')?;
            }
            f.write_str(":\n")?;
        }

        // Print ops in this block
        let block_data = state.ctx.block(block);
        let ops: Vec<_> = block_data.ops.iter().copied().collect();
        for &op in &ops {
            print_operation(state, f, op, indent + 2)?;
        }
        if i + 1 < blocks.len() {
            // Blank line between blocks for readability
            f.write_char('\n')?;
        }
    }

    Ok(())
}

// ============================================================================
// Special operation printers
// ============================================================================

fn print_module_op(state: &mut PrintState<'_>, f: &mut impl Write, op: OpRef) -> fmt::Result {
    let data = state.ctx.op(op);
    write!(f, "core.module")?;

    // Module name
    if let Some(Attribute::Symbol(name)) = data.attributes.get(&crate::Symbol::new("sym_name")) {
        f.write_char(' ')?;
        write_symbol(f, *name)?;
    }

    let regions = &data.regions;
    if let Some(&region) = regions.first() {
        f.write_str(" {\n")?;

        // Print each top-level op with reset numbering
        let region_data = state.ctx.region(region);
        let blocks: Vec<_> = region_data.blocks.iter().copied().collect();
        for &block in &blocks {
            let block_data = state.ctx.block(block);
            let ops: Vec<_> = block_data.ops.iter().copied().collect();
            for &child_op in &ops {
                let saved = state.save_counters();
                state.reset_numbering();
                print_operation(state, f, child_op, 2)?;
                state.reset_numbering();
                state.restore_counters(saved);
            }
        }

        f.write_str("}\n")?;
    } else {
        f.write_char('\n')?;
    }

    Ok(())
}

fn print_func_op(
    state: &mut PrintState<'_>,
    f: &mut impl Write,
    op: OpRef,
    indent: usize,
) -> fmt::Result {
    let indent_str = " ".repeat(indent);
    let data = state.ctx.op(op);

    write!(f, "{indent_str}func.func")?;

    // Function name
    if let Some(Attribute::Symbol(name)) = data.attributes.get(&crate::Symbol::new("sym_name")) {
        f.write_char(' ')?;
        write_symbol(f, *name)?;
    }

    // Reset numbering for function body
    state.reset_numbering();

    let regions = &data.regions;
    if let Some(&region) = regions.first() {
        let region_data = state.ctx.region(region);
        let blocks: Vec<_> = region_data.blocks.iter().copied().collect();

        // Print entry block args as function signature
        if let Some(&entry_block) = blocks.first() {
            let args = state.ctx.block_args(entry_block);
            f.write_char('(')?;
            for (i, &arg) in args.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                let name = state.assign_value_name(arg);
                let ty = state.ctx.value_ty(arg);
                write!(f, "{name}: ")?;
                write_type(state.ctx, f, ty)?;
            }
            f.write_char(')')?;
        }

        // Return type from func type attribute
        if let Some(Attribute::Type(func_ty)) = data.attributes.get(&crate::Symbol::new("type")) {
            f.write_str(" -> ")?;
            write_type(state.ctx, f, *func_ty)?;
        }

        // Body
        f.write_str(" {\n")?;

        // Pre-assign block labels for all blocks
        for &block in &blocks {
            state.assign_block_label(block);
        }

        let single_block_no_args = blocks.len() == 1 && state.ctx.block_args(blocks[0]).is_empty();

        for (i, &block) in blocks.iter().enumerate() {
            // For entry block, args already printed in signature
            if i == 0 && single_block_no_args {
                // Elide entry block label
            } else if i > 0 || !single_block_no_args {
                let label = state.get_block_label(block).to_owned();
                write!(f, "{}  {label}", indent_str)?;
                if i > 0 {
                    // Non-entry blocks show args
                    let args = state.ctx.block_args(block);
                    if !args.is_empty() {
                        f.write_char('(')?;
                        for (j, &arg) in args.iter().enumerate() {
                            if j > 0 {
                                f.write_str(", ")?;
                            }
                            let name = state.assign_value_name(arg);
                            let ty = state.ctx.value_ty(arg);
                            write!(f, "{name}: ")?;
                            write_type(state.ctx, f, ty)?;
                        }
                        f.write_char(')')?;
                    }
                }
                f.write_str(":\n")?;
            }

            let block_data = state.ctx.block(block);
            let ops: Vec<_> = block_data.ops.iter().copied().collect();
            for &child_op in &ops {
                print_operation(state, f, child_op, indent + 4)?;
            }
        }

        writeln!(f, "{indent_str}}}")?;
    } else {
        f.write_char('\n')?;
    }

    Ok(())
}
