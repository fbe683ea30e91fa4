//! Cf dialect: unstructured branching between blocks.

use smallvec::SmallVec;

use crate::{
    Attribute, BlockRef, DialectOp, IrContext, Location, OpConversionError, OpRef,
    OperationDataBuilder, Symbol, ValueRef, symbols,
};

crate::dialect! {
    mod cf {
        fn br(#[rest] args) {
            #[successor(dest)]
        };

        fn cond_br(cond) {
            #[successor(then_dest)]
            #[successor(else_dest)]
        };
    }
}

symbols! {
    ATTR_CASE_VALUES => "case_values",
}

/// Multi-way branch on an integer selector.
///
/// Successor 0 is the default destination; successors 1.. pair up with the
/// `case_values` attribute in order. Defined by hand because the case list
/// is variadic in both values and successors, which `dialect!` cannot
/// express.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Switch(OpRef);

impl DialectOp for Switch {
    const DIALECT_NAME: &'static str = "cf";
    const OP_NAME: &'static str = "switch";

    fn from_op(ctx: &IrContext, op: OpRef) -> Result<Self, OpConversionError> {
        if !Self::matches(ctx, op) {
            return Err(OpConversionError::WrongOperation {
                expected: "cf.switch",
                actual: format!("{}.{}", ctx.op(op).dialect, ctx.op(op).name),
            });
        }
        Ok(Self(op))
    }

    fn op_ref(&self) -> OpRef {
        self.0
    }
}

impl Switch {
    pub fn op_ref(&self) -> OpRef {
        self.0
    }

    pub fn selector(&self, ctx: &IrContext) -> ValueRef {
        ctx.op_operands(self.0)[0]
    }

    pub fn default_dest(&self, ctx: &IrContext) -> BlockRef {
        ctx.op(self.0).successors[0]
    }

    pub fn case_values(&self, ctx: &IrContext) -> Vec<u64> {
        match ctx.op(self.0).attributes.get(&ATTR_CASE_VALUES()) {
            Some(Attribute::List(items)) => items
                .iter()
                .map(|a| match a {
                    Attribute::IntBits(v) => *v,
                    _ => panic!("expected IntBits in case_values"),
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Case destinations, aligned with `case_values`.
    pub fn case_dests<'a>(&self, ctx: &'a IrContext) -> &'a [BlockRef] {
        &ctx.op(self.0).successors[1..]
    }
}

/// Build a `cf.switch`. `cases` pairs a selector value with its destination.
pub fn switch(
    ctx: &mut IrContext,
    location: Location,
    selector: ValueRef,
    default_dest: BlockRef,
    cases: impl IntoIterator<Item = (u64, BlockRef)>,
) -> Switch {
    let mut values = Vec::new();
    let mut dests: SmallVec<[BlockRef; 4]> = SmallVec::new();
    for (value, dest) in cases {
        values.push(Attribute::IntBits(value));
        dests.push(dest);
    }

    let mut builder = OperationDataBuilder::new(location, DIALECT_NAME(), Symbol::new("switch"))
        .operand(selector)
        .attr(ATTR_CASE_VALUES(), Attribute::List(values))
        .successor(default_dest);
    for dest in dests {
        builder = builder.successor(dest);
    }

    let data = builder.build(ctx);
    Switch(ctx.create_op(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::BlockData;
    use crate::dialect::{arith, core};
    use crate::location::Span;

    #[test]
    fn switch_shape() {
        let mut ctx = IrContext::new();
        let path = ctx.paths.intern("test.gr".to_owned());
        let location = Location::new(path, Span::new(0, 0));

        let i32_ty = core::i32_ty(&mut ctx);
        let sel = arith::const_int(&mut ctx, location, i32_ty, 0).result(&ctx);

        let default_bb = ctx.create_block(BlockData::empty(location));
        let resume_bb = ctx.create_block(BlockData::empty(location));
        let cleanup_bb = ctx.create_block(BlockData::empty(location));

        let sw = switch(
            &mut ctx,
            location,
            sel,
            default_bb,
            [(0, resume_bb), (1, cleanup_bb)],
        );

        assert_eq!(sw.selector(&ctx), sel);
        assert_eq!(sw.default_dest(&ctx), default_bb);
        assert_eq!(sw.case_values(&ctx), vec![0, 1]);
        assert_eq!(sw.case_dests(&ctx), &[resume_bb, cleanup_bb]);

        let round = Switch::from_op(&ctx, sw.op_ref()).unwrap();
        assert_eq!(round, sw);
    }
}
