//! Operator evaluation over heap variables.
//!
//! [`calculate`] receives fully evaluated operands and returns the result
//! handle. The result is either a fresh temporary or, for assignment,
//! prefix increment, array access and comma, one of the operands (or an
//! element of one). The caller releases every other operand.

use crate::error::{ExecError, ExecResult};
use crate::lexer::OperatorKind;
use crate::value::format_number;
use crate::variable::{Heap, Payload, VarId, VarType};

/// Largest array index the evaluator will grow an array to.
pub const MAX_ARRAY_INDEX: usize = 1 << 24;

// Bitwise operands live in [-2^31, 2^32 - 1]; negatives fold to u32.
const BIT_MIN: f64 = -2_147_483_648.0;
const BIT_MAX: f64 = 4_294_967_295.0;
const BIT_WRAP: f64 = 4_294_967_296.0;

/// Largest n for which n! is finite in an f64.
const FACTORIAL_MAX: f64 = 170.0;

pub fn arity(op: OperatorKind) -> Option<usize> {
    use OperatorKind::*;
    match op {
        Positive | Negative | Factorial | LogicNot | BitNot | PreIncrement | PreDecrement
        | PostIncrement | PostDecrement => Some(1),
        Add | Sub | Mul | Div | Mod | Power | LogicAnd | LogicOr | LogicXor | BitAnd | BitOr
        | BitXor | Equal | NotEqual | Less | Greater | LessEqual | GreaterEqual | Assign | Comma
        | Access => Some(2),
        Colon | Semicolon | LeftParen | RightParen | LeftBracket | RightBracket | LeftBrace
        | RightBrace | Call => None,
    }
}

pub fn calculate(op: OperatorKind, operands: &[VarId], heap: &mut Heap) -> ExecResult<VarId> {
    let expected = arity(op)
        .ok_or_else(|| ExecError::not_implemented(format!("'{}' is not a value operator", op.symbol())))?;
    if operands.len() != expected {
        return Err(ExecError::read_error(format!(
            "'{}' expects {} operand(s), found {}",
            op.symbol(),
            expected,
            operands.len()
        )));
    }

    use OperatorKind::*;
    match op {
        Add => add(heap, operands[0], operands[1]),
        Sub | Mul | Div | Mod | Power => arithmetic(op, heap, operands[0], operands[1]),
        Positive => {
            let n = number(heap, operands[0], op)?;
            Ok(heap.alloc_numeric(n))
        }
        Negative => {
            let n = number(heap, operands[0], op)?;
            Ok(heap.alloc_numeric(-n))
        }
        Factorial => {
            let n = number(heap, operands[0], op)?;
            Ok(heap.alloc_numeric(factorial(n)?))
        }

        LogicNot => {
            let b = heap.to_bool(operands[0])?;
            Ok(boolean(heap, !b))
        }
        LogicAnd | LogicOr | LogicXor => {
            let l = heap.to_bool(operands[0])?;
            let r = heap.to_bool(operands[1])?;
            let result = match op {
                LogicAnd => l && r,
                LogicOr => l || r,
                _ => l != r,
            };
            Ok(boolean(heap, result))
        }

        BitNot => {
            let n = bits(heap, operands[0])?;
            Ok(heap.alloc_numeric(f64::from(!n)))
        }
        BitAnd | BitOr | BitXor => {
            let l = bits(heap, operands[0])?;
            let r = bits(heap, operands[1])?;
            let result = match op {
                BitAnd => l & r,
                BitOr => l | r,
                _ => l ^ r,
            };
            Ok(heap.alloc_numeric(f64::from(result)))
        }

        Equal => {
            let eq = heap.equals(operands[0], operands[1])?;
            Ok(boolean(heap, eq))
        }
        NotEqual => {
            let eq = heap.equals(operands[0], operands[1])?;
            Ok(boolean(heap, !eq))
        }
        Less | Greater | LessEqual | GreaterEqual => {
            let l = number(heap, operands[0], op)?;
            let r = number(heap, operands[1], op)?;
            let result = match op {
                Less => l < r,
                Greater => l > r,
                LessEqual => l <= r,
                _ => l >= r,
            };
            Ok(boolean(heap, result))
        }

        Assign => assign(heap, operands[0], operands[1]),
        PreIncrement => step(heap, operands[0], 1.0, false),
        PreDecrement => step(heap, operands[0], -1.0, false),
        PostIncrement => step(heap, operands[0], 1.0, true),
        PostDecrement => step(heap, operands[0], -1.0, true),

        Comma => Ok(operands[1]),
        Access => access(heap, operands[0], operands[1]),

        Colon | Semicolon | LeftParen | RightParen | LeftBracket | RightBracket | LeftBrace
        | RightBrace | Call => Err(ExecError::not_implemented(format!(
            "'{}' is not a value operator",
            op.symbol()
        ))),
    }
}

fn boolean(heap: &mut Heap, b: bool) -> VarId {
    heap.alloc_numeric(if b { 1.0 } else { 0.0 })
}

fn number(heap: &Heap, id: VarId, op: OperatorKind) -> ExecResult<f64> {
    match heap.payload(id)? {
        Payload::Numeric(n) => Ok(*n),
        other => Err(ExecError::invalid_param(format!(
            "'{}' needs a numeric operand, found {}",
            op.symbol(),
            other.var_type()
        ))),
    }
}

fn add(heap: &mut Heap, left: VarId, right: VarId) -> ExecResult<VarId> {
    let payload = match (heap.payload(left)?, heap.payload(right)?) {
        (Payload::Numeric(l), Payload::Numeric(r)) => Payload::Numeric(l + r),
        (Payload::String(l), Payload::String(r)) => Payload::String(format!("{}{}", l, r)),
        (Payload::String(l), Payload::Numeric(r)) => Payload::String(format!("{}{}", l, format_number(*r))),
        (Payload::Numeric(l), Payload::String(r)) => Payload::String(format!("{}{}", format_number(*l), r)),
        (l, r) => {
            return Err(ExecError::invalid_param(format!(
                "Cannot add {} and {}",
                l.var_type(),
                r.var_type()
            )))
        }
    };
    Ok(heap.alloc(payload))
}

fn arithmetic(op: OperatorKind, heap: &mut Heap, left: VarId, right: VarId) -> ExecResult<VarId> {
    let l = number(heap, left, op)?;
    let r = number(heap, right, op)?;
    let result = match op {
        OperatorKind::Sub => l - r,
        OperatorKind::Mul => l * r,
        OperatorKind::Div | OperatorKind::Mod if r == 0.0 => {
            return Err(ExecError::invalid_param("Division by zero"));
        }
        OperatorKind::Div => l / r,
        OperatorKind::Mod => l % r,
        _ => l.powf(r),
    };
    Ok(heap.alloc_numeric(result))
}

/// Sign-preserving factorial: `n! = sign(n) * |n|!`.
pub fn factorial(n: f64) -> ExecResult<f64> {
    if !n.is_finite() || n.fract() != 0.0 {
        return Err(ExecError::invalid_param(format!(
            "factorial needs an integer, found {}",
            format_number(n)
        )));
    }
    let magnitude = n.abs();
    if magnitude > FACTORIAL_MAX {
        return Err(ExecError::overflow(format!(
            "{}! does not fit in a number",
            format_number(n)
        )));
    }
    let product = (2..=magnitude as u32).fold(1.0_f64, |acc, i| acc * f64::from(i));
    Ok(if n < 0.0 { -product } else { product })
}

fn bits(heap: &Heap, id: VarId) -> ExecResult<u32> {
    let n = heap.numeric(id)?;
    if n.fract() != 0.0 {
        return Err(ExecError::invalid_param(format!(
            "bitwise operand must be an integer, found {}",
            format_number(n)
        )));
    }
    if !(BIT_MIN..=BIT_MAX).contains(&n) {
        return Err(ExecError::overflow(format!(
            "bitwise operand {} is outside the 32-bit range",
            format_number(n)
        )));
    }
    Ok(if n < 0.0 { (n + BIT_WRAP) as u32 } else { n as u32 })
}

fn assign(heap: &mut Heap, target: VarId, source: VarId) -> ExecResult<VarId> {
    if !heap.is_left_value(target)? {
        return Err(ExecError::state("assignment target is not a left-value"));
    }
    if heap.is_write_protected(target)? {
        return Err(ExecError::state("assignment target is write-protected"));
    }
    heap.smart_copy(target, source)?;
    Ok(target)
}

fn step(heap: &mut Heap, id: VarId, delta: f64, postfix: bool) -> ExecResult<VarId> {
    let symbol = if delta > 0.0 { "++" } else { "--" };
    if !heap.is_left_value(id)? {
        return Err(ExecError::state(format!("'{}' needs a left-value", symbol)));
    }
    if heap.is_write_protected(id)? {
        return Err(ExecError::state(format!("'{}' on a write-protected variable", symbol)));
    }
    let current = match heap.payload(id)? {
        Payload::Null => 0.0,
        Payload::Numeric(n) => *n,
        other => {
            return Err(ExecError::invalid_param(format!(
                "'{}' needs a numeric operand, found {}",
                symbol,
                other.var_type()
            )))
        }
    };
    heap.set_numeric(id, current + delta)?;
    if postfix {
        Ok(heap.alloc_numeric(current))
    } else {
        Ok(id)
    }
}

fn access(heap: &mut Heap, target: VarId, index: VarId) -> ExecResult<VarId> {
    let tag = heap.var_type(target)?;
    if tag != VarType::Null && tag != VarType::Array {
        return Err(ExecError::invalid_param(format!("cannot index a {} value", tag)));
    }
    let i = heap.numeric(index)?;
    if !i.is_finite() || i < 0.0 || i.fract() != 0.0 {
        return Err(ExecError::invalid_param(format!(
            "array index must be a non-negative integer, found {}",
            format_number(i)
        )));
    }
    if i > MAX_ARRAY_INDEX as f64 {
        return Err(ExecError::new(
            crate::error::ErrorKind::OutOfMemory,
            format!("array index {} exceeds the limit of {}", format_number(i), MAX_ARRAY_INDEX),
        ));
    }
    let i = i as usize;
    let element = heap.element(target, i)?;
    if heap.is_left_value(element)? {
        Ok(element)
    } else {
        heap.detach_element(target, i)
    }
}

