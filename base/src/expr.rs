//! Arithmetic expression trees produced by the compiler front end.
//!
//! An expression is a function of a vector of real arguments; an
//! identifier refers to one argument by its position.  [`Expr::calc`]
//! evaluates an expression directly, which the compiler uses for
//! constant folding and tests use as the reference for generated
//! code.
use std::error::Error;
use std::fmt::{self, Display, Formatter};

use crate::token::{Tag, Token};

#[derive(Debug, PartialEq, Clone)]
pub enum Expr {
    /// The argument in position `slot`.
    Id { name: Token, slot: usize },
    Constant(f64),
    Unary { op: Token, operand: Box<Expr> },
    Arith { op: Token, lhs: Box<Expr>, rhs: Box<Expr> },
    Call { function: Token, args: Vec<Expr> },
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum EvalError {
    BadConstant(Token),
    UnknownOperator(Token),
    UnknownFunction(Token),
    WrongArity {
        function: Token,
        expected: usize,
        got: usize,
    },
    MissingArgument {
        name: Token,
        slot: usize,
        available: usize,
    },
}

impl Display for EvalError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            EvalError::BadConstant(token) => write!(f, "'{token}' is not a real number"),
            EvalError::UnknownOperator(token) => write!(f, "'{token}' is not an operator"),
            EvalError::UnknownFunction(token) => write!(f, "unknown function '{token}'"),
            EvalError::WrongArity {
                function,
                expected,
                got,
            } => write!(
                f,
                "function '{function}' takes {expected} arguments but was given {got}"
            ),
            EvalError::MissingArgument {
                name,
                slot,
                available,
            } => write!(
                f,
                "'{name}' refers to argument {slot} but only {available} arguments were supplied"
            ),
        }
    }
}

impl Error for EvalError {}

fn unary_function(name: &str) -> Option<fn(f64) -> f64> {
    let f: fn(f64) -> f64 = match name {
        "sin" => f64::sin,
        "cos" => f64::cos,
        "tan" => f64::tan,
        "cot" | "ctan" => |x: f64| x.tan().recip(),
        "asin" => f64::asin,
        "acos" => f64::acos,
        "atan" => f64::atan,
        "acot" | "actan" => |x: f64| x.recip().atan(),
        "sqrt" => f64::sqrt,
        "exp" => f64::exp,
        "ln" => f64::ln,
        "abs" => f64::abs,
        _ => {
            return None;
        }
    };
    Some(f)
}

fn binary_function(name: &str) -> Option<fn(f64, f64) -> f64> {
    let f: fn(f64, f64) -> f64 = match name {
        // log(b, x) is the logarithm of x to the base b.
        "log" => |b: f64, x: f64| x.log(b),
        "pow" => f64::powf,
        _ => {
            return None;
        }
    };
    Some(f)
}

impl Expr {
    /// Build a constant from a real-number literal.
    ///
    /// # Errors
    ///
    /// Fails if the token text is not a real number.
    pub fn constant(token: &Token) -> Result<Expr, EvalError> {
        token
            .text()
            .parse::<f64>()
            .map(Expr::Constant)
            .map_err(|_| EvalError::BadConstant(token.clone()))
    }

    /// Evaluate the expression with argument vector `args`.
    ///
    /// # Errors
    ///
    /// Fails when the tree contains an operator or function we don't
    /// know, a function is called with the wrong number of
    /// arguments, or an identifier refers past the end of `args`.
    pub fn calc(&self, args: &[f64]) -> Result<f64, EvalError> {
        match self {
            Expr::Id { name, slot } => {
                args.get(*slot)
                    .copied()
                    .ok_or_else(|| EvalError::MissingArgument {
                        name: name.clone(),
                        slot: *slot,
                        available: args.len(),
                    })
            }
            Expr::Constant(value) => Ok(*value),
            Expr::Unary { op, operand } => {
                let x = operand.calc(args)?;
                match op.tag() {
                    Tag::Minus => Ok(-x),
                    Tag::Plus => Ok(x),
                    _ => Err(EvalError::UnknownOperator(op.clone())),
                }
            }
            Expr::Arith { op, lhs, rhs } => {
                let (l, r) = (lhs.calc(args)?, rhs.calc(args)?);
                match op.tag() {
                    Tag::Plus => Ok(l + r),
                    Tag::Minus => Ok(l - r),
                    Tag::Star => Ok(l * r),
                    Tag::Slash => Ok(l / r),
                    Tag::Caret => Ok(l.powf(r)),
                    _ => Err(EvalError::UnknownOperator(op.clone())),
                }
            }
            Expr::Call {
                function,
                args: call_args,
            } => {
                let arity_error = |expected: usize| EvalError::WrongArity {
                    function: function.clone(),
                    expected,
                    got: call_args.len(),
                };
                if let Some(f) = unary_function(function.text()) {
                    match call_args.as_slice() {
                        [x] => Ok(f(x.calc(args)?)),
                        _ => Err(arity_error(1)),
                    }
                } else if let Some(f) = binary_function(function.text()) {
                    match call_args.as_slice() {
                        [x, y] => Ok(f(x.calc(args)?, y.calc(args)?)),
                        _ => Err(arity_error(2)),
                    }
                } else {
                    Err(EvalError::UnknownFunction(function.clone()))
                }
            }
        }
    }
}
