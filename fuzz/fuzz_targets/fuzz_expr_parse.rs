#![no_main]
use grupin_rs::{ColumnExpr, Expression, ObjExpr};
use libfuzzer_sys::fuzz_target;

// Anything that parses must render back to itself
fuzz_target!(|data: &[u8]| {
    let Ok(raw) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(e) = raw.parse::<ObjExpr>() {
        let again: ObjExpr = e.to_string().parse().expect("rendering parses");
        assert_eq!(again, e);
        assert!(e.subset_of(&e));
    }
    if let Ok(c) = raw.parse::<ColumnExpr>() {
        let again: ColumnExpr = c.to_string().parse().expect("rendering parses");
        assert_eq!(again, c);
        assert!(c.object_expr().subset_of(&c.object_expr()));
    }
});
