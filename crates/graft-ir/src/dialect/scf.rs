//! Scf dialect: structured control flow.
//!
//! `scf.for` and `scf.if` carry their bodies in regions and forward values
//! through `scf.yield`; a yield's meaning comes entirely from its parent op.

crate::dialect! {
    mod scf {
        fn r#for(lb, ub, step, #[rest] init) -> #[rest] results {
            #[region(body)] {}
        };

        fn r#if(cond) -> #[rest] results {
            #[region(then_region)] {}
            #[region(else_region)] {}
        };

        fn r#yield(#[rest] values);
    }
}
