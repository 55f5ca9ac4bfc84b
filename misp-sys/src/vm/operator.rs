use num_integer::Integer;

use crate::vm::error::PanicKind;
use crate::vm::opcode::Opcode;

/// Numeric binary primitives (opcodes 20–32). Division, remainder and modulo
/// by zero are surfaced as a type error; overflow is left to the host's `i64`
/// arithmetic.
///
/// `/` and `remainder` truncate toward zero; `%` is the Euclidean modulo
/// (`mod_floor`), so `(% -7 3)` is `2` where `(remainder -7 3)` is `-1`.
/// Comparisons return `0` or `1`.
pub fn binary(op: Opcode, a: i64, b: i64) -> Result<i64, PanicKind> {
    match op {
        Opcode::Add => Ok(a + b),
        Opcode::Sub => Ok(a - b),
        Opcode::Mul => Ok(a * b),
        Opcode::Div if b == 0 => Err(PanicKind::TypeError),
        Opcode::Div => Ok(a / b),
        Opcode::Rem if b == 0 => Err(PanicKind::TypeError),
        Opcode::Rem => Ok(a % b),
        Opcode::Mod if b == 0 => Err(PanicKind::TypeError),
        Opcode::Mod => Ok(a.mod_floor(&b)),
        Opcode::And => Ok(a & b),
        Opcode::Or => Ok(a | b),
        Opcode::Xor => Ok(a ^ b),
        Opcode::LessThan => Ok((a < b) as i64),
        Opcode::GreaterThan => Ok((a > b) as i64),
        Opcode::GreaterEqual => Ok((a >= b) as i64),
        Opcode::LessEqual => Ok((a <= b) as i64),
        op => panic!("Not a numeric binary opcode: {:?}", op),
    }
}

/// Bitwise complement (opcode 35).
pub fn unary_not(a: i64) -> i64 {
    !a
}


#[cfg(test)]
mod test {
    use crate::vm::operator;
    use crate::vm::opcode::Opcode;

    fn binary(op: Opcode, a: i64, b: i64) -> i64 {
        operator::binary(op, a, b).unwrap()
    }

    #[test]
    fn test_mod() {
        assert_eq!(1, binary(Opcode::Mod, -5, 3));
        assert_eq!(2, binary(Opcode::Mod, -4, 3));
        assert_eq!(0, binary(Opcode::Mod, -3, 3));
        assert_eq!(2, binary(Opcode::Mod, -1, 3));
        assert_eq!(0, binary(Opcode::Mod, 0, 3));
        assert_eq!(2, binary(Opcode::Mod, 5, 3));
        assert_eq!(-2, binary(Opcode::Mod, 7, -3));

        assert!(operator::binary(Opcode::Mod, 5, 0).is_err());
    }

    #[test]
    fn test_rem() {
        assert_eq!(-2, binary(Opcode::Rem, -5, 3));
        assert_eq!(-1, binary(Opcode::Rem, -1, 3));
        assert_eq!(2, binary(Opcode::Rem, 5, 3));
        assert_eq!(1, binary(Opcode::Rem, 7, -3));

        assert!(operator::binary(Opcode::Rem, 5, 0).is_err());
    }

    #[test]
    fn test_div_truncates_toward_zero() {
        assert_eq!(-1, binary(Opcode::Div, -5, 3));
        assert_eq!(0, binary(Opcode::Div, -2, 3));
        assert_eq!(0, binary(Opcode::Div, 2, 3));
        assert_eq!(1, binary(Opcode::Div, 5, 3));
        assert_eq!(-2, binary(Opcode::Div, 7, -3));

        assert!(operator::binary(Opcode::Div, 5, 0).is_err());
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(1, binary(Opcode::LessThan, 1, 2));
        assert_eq!(0, binary(Opcode::LessThan, 2, 2));
        assert_eq!(1, binary(Opcode::LessEqual, 2, 2));
        assert_eq!(0, binary(Opcode::GreaterThan, 2, 2));
        assert_eq!(1, binary(Opcode::GreaterEqual, 2, 2));
    }

    #[test]
    fn test_bitwise() {
        assert_eq!(0b100, binary(Opcode::And, 0b111, 0b100));
        assert_eq!(0b1110, binary(Opcode::Or, 0b1100, 0b1010));
        assert_eq!(0b110, binary(Opcode::Xor, 0b1100, 0b1010));
        assert_eq!(-1, operator::unary_not(0));
        assert_eq!(-4, operator::unary_not(3));
    }
}
