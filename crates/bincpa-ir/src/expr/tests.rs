use super::*;

#[test]
fn test_expr_imm() {
    let expr = Expr::imm(42);
    assert!(matches!(expr, Expr::Imm(42)));
}

#[test]
fn test_expr_reg() {
    let expr = Expr::reg(10);
    assert!(matches!(expr, Expr::Reg(10)));
}

#[test]
fn test_add_folds_constants() {
    assert_eq!(Expr::add(Expr::imm(2), Expr::imm(3)), Expr::imm(5));
    assert_eq!(Expr::add(Expr::reg(1), Expr::imm(0)), Expr::reg(1));
    assert_eq!(Expr::add(Expr::imm(0), Expr::reg(1)), Expr::reg(1));
}

#[test]
fn test_sub_from_zero_is_neg() {
    let expr = Expr::sub(Expr::imm(0), Expr::reg(3));
    assert!(matches!(
        expr,
        Expr::Unary {
            op: UnaryOp::Neg,
            ..
        }
    ));
}

#[test]
fn test_eq_of_identical_terms() {
    assert_eq!(Expr::eq(Expr::reg(4), Expr::reg(4)), Expr::TRUE);
    assert_eq!(Expr::ne(Expr::reg(4), Expr::reg(4)), Expr::FALSE);
    assert_eq!(Expr::eq(Expr::imm(4), Expr::imm(5)), Expr::FALSE);
}

#[test]
fn test_logical_and_identities() {
    let cond = Expr::eq(Expr::reg(1), Expr::imm(7));
    assert_eq!(Expr::logical_and(Expr::TRUE, cond.clone()), cond);
    assert_eq!(Expr::logical_and(cond.clone(), Expr::TRUE), cond);
    assert_eq!(Expr::logical_and(Expr::FALSE, cond.clone()), Expr::FALSE);

    // Non-boolean operands keep the conjunction
    let kept = Expr::logical_and(Expr::TRUE, Expr::reg(1));
    assert!(matches!(
        kept,
        Expr::Binary {
            op: BinaryOp::LogicalAnd,
            ..
        }
    ));
}

#[test]
fn test_logical_not_flips_comparisons() {
    let expr = Expr::logical_not(Expr::eq(Expr::reg(1), Expr::imm(0)));
    assert_eq!(expr, Expr::ne(Expr::reg(1), Expr::imm(0)));
    assert_eq!(Expr::logical_not(Expr::imm(5)), Expr::FALSE);
}

#[test]
fn test_evaluate_substitutes_registers() {
    let expr = Expr::eq(Expr::add(Expr::reg(1), Expr::imm(4)), Expr::imm(0x1008));
    let ctx = Context::new().with_reg(1, 0x1004);
    assert_eq!(expr.evaluate(&ctx), Expr::TRUE);

    // Unknown registers stay symbolic
    assert_eq!(expr.simplify(), expr);
}

#[test]
fn test_simplify_jump_assumption() {
    // (1 != 0) && (0x2000 == 0x2000)
    let cond = Expr::binary(BinaryOp::Ne, Expr::imm(1), Expr::imm(0));
    let target = Expr::binary(BinaryOp::Eq, Expr::imm(0x2000), Expr::imm(0x2000));
    let assumption = Expr::Binary {
        op: BinaryOp::LogicalAnd,
        left: Box::new(cond),
        right: Box::new(target),
    };
    assert_eq!(assumption.simplify(), Expr::TRUE);
}

#[test]
fn test_signed_and_unsigned_compare() {
    let minus_one = u64::MAX;
    assert_eq!(BinaryOp::Ltu.apply(minus_one, 1), 0);
    assert_eq!(BinaryOp::Lt.apply(minus_one, 1), 1);
    assert_eq!(BinaryOp::Lt.apply(1, minus_one), 0);
    assert_eq!(BinaryOp::Lt.apply(1 << 63, 0), 1);
    assert_eq!(BinaryOp::Lt.apply(3, 3), 0);
}

#[test]
fn test_shift_amount_is_masked() {
    assert_eq!(BinaryOp::Shl.apply(1, 64), 1);
    assert_eq!(BinaryOp::Shr.apply(0x10, 4), 1);
}

#[test]
fn test_display() {
    let expr = Expr::add(Expr::mem(Expr::reg(2), 4), Expr::imm(0x10));
    assert_eq!(expr.to_string(), "(mem32[r2] + 0x10)");
}
