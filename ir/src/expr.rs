//! Expression trees of kernel instructions.
//!
//! Expressions are built with ordinary Rust operators:
//!
//! ```
//! use tally_ir::Expr;
//!
//! let i = Expr::var("i");
//! let e = Expr::subscript("a", [i.clone(), Expr::var("j")]) * 2 + Expr::subscript("b", [i]);
//! assert_eq!(e.to_string(), "a[i, j]*2 + b[i]");
//! ```
//!
//! `+`, `*`, `&`, `|` and `^` flatten into n-ary nodes; unary minus is a
//! product with `-1`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::{Add, BitAnd, BitOr, BitXor, Div, Mul, Neg, Not, Rem, Shl, Shr, Sub};

use itertools::Itertools;
use tally_poly::{Atom, LinExpr, QPoly};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(strum::Display, strum::EnumString, strum::IntoStaticStr)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CmpOp {
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    Le,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    Ge,
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    Ne,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(strum::Display, strum::EnumString, strum::IntoStaticStr, strum::EnumIter)]
#[strum(serialize_all = "lowercase")]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ReduceOp {
    Sum,
    Product,
    Max,
    Min,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Expr {
    Int(i64),
    Float(f64),
    /// Axis, parameter, scalar argument or temporary.
    Var(String),
    Subscript { array: String, index: Vec<Expr> },
    Sum(Vec<Expr>),
    Difference(Box<Expr>, Box<Expr>),
    Product(Vec<Expr>),
    /// True division.
    Quotient(Box<Expr>, Box<Expr>),
    FloorDiv(Box<Expr>, Box<Expr>),
    Remainder(Box<Expr>, Box<Expr>),
    Power(Box<Expr>, Box<Expr>),
    LeftShift(Box<Expr>, Box<Expr>),
    RightShift(Box<Expr>, Box<Expr>),
    BitNot(Box<Expr>),
    BitAnd(Vec<Expr>),
    BitOr(Vec<Expr>),
    BitXor(Vec<Expr>),
    Call { function: String, args: Vec<Expr> },
    Compare { op: CmpOp, lhs: Box<Expr>, rhs: Box<Expr> },
    LogicalNot(Box<Expr>),
    LogicalAnd(Vec<Expr>),
    LogicalOr(Vec<Expr>),
    If { condition: Box<Expr>, then: Box<Expr>, otherwise: Box<Expr> },
    Min(Vec<Expr>),
    Max(Vec<Expr>),
    /// `op` over every point of `axes`, evaluated once per enclosing iteration.
    Reduce { op: ReduceOp, axes: Vec<String>, body: Box<Expr> },
}

/// `sum(coefficients[a] * a) + offset` for a chosen set of axes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinearForm {
    pub coefficients: BTreeMap<String, QPoly>,
    pub offset: QPoly,
}

impl LinearForm {
    pub fn coefficient(&self, axis: &str) -> QPoly {
        self.coefficients.get(axis).cloned().unwrap_or_default()
    }
}

// ============================================================================
// CONSTRUCTORS
// ============================================================================

impl Expr {
    pub fn var(name: impl Into<String>) -> Self {
        Self::Var(name.into())
    }

    pub fn int(value: i64) -> Self {
        Self::Int(value)
    }

    pub fn float(value: f64) -> Self {
        Self::Float(value)
    }

    pub fn subscript<E: Into<Expr>>(array: impl Into<String>, index: impl IntoIterator<Item = E>) -> Self {
        Self::Subscript { array: array.into(), index: index.into_iter().map(Into::into).collect() }
    }

    pub fn call<E: Into<Expr>>(function: impl Into<String>, args: impl IntoIterator<Item = E>) -> Self {
        Self::Call { function: function.into(), args: args.into_iter().map(Into::into).collect() }
    }

    pub fn min<E: Into<Expr>>(args: impl IntoIterator<Item = E>) -> Self {
        Self::Min(args.into_iter().map(Into::into).collect())
    }

    pub fn max<E: Into<Expr>>(args: impl IntoIterator<Item = E>) -> Self {
        Self::Max(args.into_iter().map(Into::into).collect())
    }

    pub fn if_then_else(condition: Expr, then: impl Into<Expr>, otherwise: impl Into<Expr>) -> Self {
        Self::If { condition: Box::new(condition), then: Box::new(then.into()), otherwise: Box::new(otherwise.into()) }
    }

    pub fn reduce<S: Into<String>>(op: ReduceOp, axes: impl IntoIterator<Item = S>, body: Expr) -> Self {
        Self::Reduce { op, axes: axes.into_iter().map(Into::into).collect(), body: Box::new(body) }
    }

    pub fn floor_div(self, rhs: impl Into<Expr>) -> Self {
        Self::FloorDiv(Box::new(self), Box::new(rhs.into()))
    }

    pub fn pow(self, exponent: impl Into<Expr>) -> Self {
        Self::Power(Box::new(self), Box::new(exponent.into()))
    }

    fn compare(self, op: CmpOp, rhs: impl Into<Expr>) -> Self {
        Self::Compare { op, lhs: Box::new(self), rhs: Box::new(rhs.into()) }
    }

    pub fn less_than(self, rhs: impl Into<Expr>) -> Self {
        self.compare(CmpOp::Lt, rhs)
    }

    pub fn less_equal(self, rhs: impl Into<Expr>) -> Self {
        self.compare(CmpOp::Le, rhs)
    }

    pub fn greater_than(self, rhs: impl Into<Expr>) -> Self {
        self.compare(CmpOp::Gt, rhs)
    }

    pub fn greater_equal(self, rhs: impl Into<Expr>) -> Self {
        self.compare(CmpOp::Ge, rhs)
    }

    pub fn equal_to(self, rhs: impl Into<Expr>) -> Self {
        self.compare(CmpOp::Eq, rhs)
    }

    pub fn not_equal(self, rhs: impl Into<Expr>) -> Self {
        self.compare(CmpOp::Ne, rhs)
    }

    pub fn logical_and(self, rhs: Expr) -> Self {
        match self {
            Self::LogicalAnd(mut items) => {
                items.push(rhs);
                Self::LogicalAnd(items)
            }
            lhs => Self::LogicalAnd(vec![lhs, rhs]),
        }
    }

    pub fn logical_or(self, rhs: Expr) -> Self {
        match self {
            Self::LogicalOr(mut items) => {
                items.push(rhs);
                Self::LogicalOr(items)
            }
            lhs => Self::LogicalOr(vec![lhs, rhs]),
        }
    }

    pub fn logical_not(self) -> Self {
        Self::LogicalNot(Box::new(self))
    }
}

impl From<i64> for Expr {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Expr {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Expr {
    fn from(name: &str) -> Self {
        Self::Var(name.to_string())
    }
}

// ============================================================================
// OPERATORS
// ============================================================================

fn flatten(items: &mut Vec<Expr>, expr: Expr, unwrap: fn(Expr) -> Result<Vec<Expr>, Expr>) {
    match unwrap(expr) {
        Ok(inner) => items.extend(inner),
        Err(single) => items.push(single),
    }
}

macro_rules! nary_op {
    ($trait:ident, $method:ident, $variant:ident) => {
        impl<T: Into<Expr>> $trait<T> for Expr {
            type Output = Expr;
            fn $method(self, rhs: T) -> Expr {
                let unwrap = |e: Expr| match e {
                    Expr::$variant(items) => Ok(items),
                    other => Err(other),
                };
                let mut items = Vec::new();
                flatten(&mut items, self, unwrap);
                flatten(&mut items, rhs.into(), unwrap);
                Expr::$variant(items)
            }
        }
    };
}

macro_rules! binary_op {
    ($trait:ident, $method:ident, $variant:ident) => {
        impl<T: Into<Expr>> $trait<T> for Expr {
            type Output = Expr;
            fn $method(self, rhs: T) -> Expr {
                Expr::$variant(Box::new(self), Box::new(rhs.into()))
            }
        }
    };
}

nary_op!(Add, add, Sum);
nary_op!(Mul, mul, Product);
nary_op!(BitAnd, bitand, BitAnd);
nary_op!(BitOr, bitor, BitOr);
nary_op!(BitXor, bitxor, BitXor);
binary_op!(Sub, sub, Difference);
binary_op!(Div, div, Quotient);
binary_op!(Rem, rem, Remainder);
binary_op!(Shl, shl, LeftShift);
binary_op!(Shr, shr, RightShift);

impl Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        match self {
            Expr::Int(v) => Expr::Int(-v),
            Expr::Float(v) => Expr::Float(-v),
            other => Expr::Product(vec![Expr::Int(-1), other]),
        }
    }
}

/// Bitwise complement.
impl Not for Expr {
    type Output = Expr;
    fn not(self) -> Expr {
        Expr::BitNot(Box::new(self))
    }
}

// ============================================================================
// QUERIES
// ============================================================================

impl Expr {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Direct subexpressions, in evaluation order.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Self::Int(_) | Self::Float(_) | Self::Var(_) => Vec::new(),
            Self::Subscript { index, .. } => index.iter().collect(),
            Self::Sum(items)
            | Self::Product(items)
            | Self::BitAnd(items)
            | Self::BitOr(items)
            | Self::BitXor(items)
            | Self::LogicalAnd(items)
            | Self::LogicalOr(items)
            | Self::Min(items)
            | Self::Max(items)
            | Self::Call { args: items, .. } => items.iter().collect(),
            Self::Difference(a, b)
            | Self::Quotient(a, b)
            | Self::FloorDiv(a, b)
            | Self::Remainder(a, b)
            | Self::Power(a, b)
            | Self::LeftShift(a, b)
            | Self::RightShift(a, b)
            | Self::Compare { lhs: a, rhs: b, .. } => vec![a, b],
            Self::BitNot(a) | Self::LogicalNot(a) => vec![a],
            Self::If { condition, then, otherwise } => vec![condition, then, otherwise],
            Self::Reduce { body, .. } => vec![body],
        }
    }

    /// Pre-order traversal.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Expr)) {
        visit(self);
        for child in self.children() {
            child.walk(visit);
        }
    }

    /// Variable names referenced outside reductions that bind them. Array names
    /// are not included.
    pub fn free_variables(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_free(&mut Vec::new(), &mut out);
        out
    }

    fn collect_free(&self, bound: &mut Vec<String>, out: &mut BTreeSet<String>) {
        match self {
            Self::Var(name) if !bound.contains(name) => {
                out.insert(name.clone());
            }
            Self::Reduce { axes, body, .. } => {
                let depth = bound.len();
                bound.extend(axes.iter().cloned());
                body.collect_free(bound, out);
                bound.truncate(depth);
            }
            _ => {
                for child in self.children() {
                    child.collect_free(bound, out);
                }
            }
        }
    }

    /// Names of every subscripted array.
    pub fn arrays(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.walk(&mut |e| {
            if let Self::Subscript { array, .. } = e {
                out.insert(array.clone());
            }
        });
        out
    }

    /// Axes bound by reductions anywhere in the tree.
    pub fn reduction_axes(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.walk(&mut |e| {
            if let Self::Reduce { axes, .. } = e {
                out.extend(axes.iter().cloned());
            }
        });
        out
    }

    /// The expression as a quasi-polynomial in its variables, when it only uses
    /// integer arithmetic with constant divisors and exponents.
    pub fn to_qpoly(&self) -> Option<QPoly> {
        match self {
            Self::Int(v) => Some(QPoly::from(*v)),
            Self::Var(name) => Some(QPoly::param(name.as_str())),
            Self::Sum(items) => items.iter().try_fold(QPoly::zero(), |acc, e| Some(acc + e.to_qpoly()?)),
            Self::Product(items) => items.iter().try_fold(QPoly::one(), |acc, e| Some(acc * e.to_qpoly()?)),
            Self::Difference(a, b) => Some(a.to_qpoly()? - b.to_qpoly()?),
            Self::FloorDiv(a, b) => {
                let k = b.as_int().filter(|k| *k > 0)?;
                Some(a.to_qpoly()?.floor_div(k as i128))
            }
            Self::Remainder(a, b) => {
                let k = b.as_int().filter(|k| *k > 0)?;
                let a = a.to_qpoly()?;
                let quotient = a.floor_div(k as i128);
                Some(a - quotient.scale(k.into()))
            }
            Self::Power(a, b) => {
                let exp = u32::try_from(b.as_int()?).ok()?;
                Some(a.to_qpoly()?.pow(exp))
            }
            _ => None,
        }
    }

    /// The expression as an affine form with integer coefficients.
    pub fn to_lin_expr(&self) -> Option<LinExpr> {
        let poly = self.to_qpoly()?;
        let mut out = LinExpr::default();
        for (mono, coeff) in poly.terms() {
            let coeff = i64::try_from(coeff.to_integer()?).ok()?;
            if mono.is_one() {
                out = out + LinExpr::constant(coeff);
                continue;
            }
            let mut atoms = mono.atoms();
            match (atoms.next(), atoms.next()) {
                (Some((Atom::Param(name), 1)), None) => out = out + LinExpr::term(name.as_str(), coeff),
                _ => return None,
            }
        }
        Some(out)
    }

    /// Splits the expression into per-axis coefficients and an axis-free
    /// offset. Coefficients may be symbolic in parameters.
    ///
    /// Returns `None` when the expression is not affine in `axes`.
    pub fn linear_in<S: AsRef<str>>(&self, axes: &[S]) -> Option<LinearForm> {
        let poly = self.to_qpoly()?;
        let mut coefficients = BTreeMap::new();
        let mut offset = poly.clone();
        for axis in axes {
            let axis = axis.as_ref();
            let coeffs = poly.coefficients_in(axis)?;
            if coeffs.len() > 2 {
                return None;
            }
            let coefficient = coeffs.get(1).cloned().unwrap_or_default();
            if axes.iter().any(|other| coefficient.mentions(other.as_ref())) {
                return None;
            }
            offset = offset.substitute(axis, &QPoly::zero());
            if !coefficient.is_zero() {
                coefficients.insert(axis.to_string(), coefficient);
            }
        }
        Some(LinearForm { coefficients, offset })
    }
}

// ============================================================================
// DISPLAY
// ============================================================================

impl Expr {
    fn precedence(&self) -> u8 {
        match self {
            Self::LogicalOr(_) => 1,
            Self::LogicalAnd(_) => 2,
            Self::LogicalNot(_) => 3,
            Self::Compare { .. } => 4,
            Self::BitOr(_) => 5,
            Self::BitXor(_) => 6,
            Self::BitAnd(_) => 7,
            Self::LeftShift(..) | Self::RightShift(..) => 8,
            Self::Sum(_) | Self::Difference(..) => 9,
            Self::Product(_) | Self::Quotient(..) | Self::FloorDiv(..) | Self::Remainder(..) => 10,
            Self::BitNot(_) => 11,
            Self::Int(v) if *v < 0 => 11,
            Self::Float(v) if *v < 0.0 => 11,
            Self::Power(..) => 12,
            _ => 13,
        }
    }
}

struct Operand<'a>(&'a Expr, u8);

impl fmt::Display for Operand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.precedence() < self.1 { write!(f, "({})", self.0) } else { write!(f, "{}", self.0) }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prec = self.precedence();
        let join = |items: &[Expr], sep: &str, min: u8| items.iter().map(|e| Operand(e, min).to_string()).join(sep);
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v:?}"),
            Self::Var(name) => write!(f, "{name}"),
            Self::Subscript { array, index } => write!(f, "{array}[{}]", index.iter().join(", ")),
            Self::Sum(items) => write!(f, "{}", join(items, " + ", prec)),
            Self::Product(items) => match items.as_slice() {
                [Self::Int(-1), rest] => write!(f, "-{}", Operand(rest, prec + 1)),
                _ => write!(f, "{}", join(items, "*", prec)),
            },
            Self::BitAnd(items) => write!(f, "{}", join(items, " & ", prec)),
            Self::BitOr(items) => write!(f, "{}", join(items, " | ", prec)),
            Self::BitXor(items) => write!(f, "{}", join(items, " ^ ", prec)),
            Self::LogicalAnd(items) => write!(f, "{}", join(items, " and ", prec)),
            Self::LogicalOr(items) => write!(f, "{}", join(items, " or ", prec)),
            Self::Difference(a, b) => write!(f, "{} - {}", Operand(a, prec), Operand(b, prec + 1)),
            Self::Quotient(a, b) => write!(f, "{}/{}", Operand(a, prec), Operand(b, prec + 1)),
            Self::FloorDiv(a, b) => write!(f, "{} // {}", Operand(a, prec), Operand(b, prec + 1)),
            Self::Remainder(a, b) => write!(f, "{} % {}", Operand(a, prec), Operand(b, prec + 1)),
            Self::Power(a, b) => write!(f, "{}**{}", Operand(a, prec + 1), Operand(b, prec)),
            Self::LeftShift(a, b) => write!(f, "{} << {}", Operand(a, prec), Operand(b, prec + 1)),
            Self::RightShift(a, b) => write!(f, "{} >> {}", Operand(a, prec), Operand(b, prec + 1)),
            Self::BitNot(a) => write!(f, "~{}", Operand(a, prec)),
            Self::LogicalNot(a) => write!(f, "not {}", Operand(a, prec)),
            Self::Compare { op, lhs, rhs } => write!(f, "{} {op} {}", Operand(lhs, prec + 1), Operand(rhs, prec + 1)),
            Self::Call { function, args } => write!(f, "{function}({})", args.iter().join(", ")),
            Self::Min(items) => write!(f, "min({})", items.iter().join(", ")),
            Self::Max(items) => write!(f, "max({})", items.iter().join(", ")),
            Self::If { condition, then, otherwise } => write!(f, "if({condition}, {then}, {otherwise})"),
            Self::Reduce { op, axes, body } => match axes.as_slice() {
                [axis] => write!(f, "{op}({axis}, {body})"),
                _ => write!(f, "{op}([{}], {body})", axes.iter().join(", ")),
            },
        }
    }
}
