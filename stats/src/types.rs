//! Result types of expressions.
//!
//! Literals are weakly typed: they adopt the type of the strongly typed
//! operands they meet. A float literal meeting only integer operands promotes
//! the result to `float64`.

use snafu::OptionExt;
use tally_dtype::DType;
use tally_ir::{Expr, Kernel, ReduceOp};

use crate::error::*;

/// Builtin functions accepted in `Expr::Call`.
pub const BUILTIN_FUNCTIONS: &[&str] = &[
    "abs", "acos", "asin", "atan", "atan2", "cbrt", "ceil", "copysign", "cos", "cosh", "erf", "erfc", "exp", "exp2",
    "expm1", "fabs", "floor", "fma", "fmax", "fmin", "fmod", "hypot", "lgamma", "log", "log10", "log1p", "log2",
    "rint", "round", "rsqrt", "sin", "sinh", "sqrt", "tan", "tanh", "tgamma", "trunc",
];

/// Builtins whose result keeps an integer argument type.
const INTEGER_PRESERVING: &[&str] = &["abs"];

pub fn is_builtin(name: &str) -> bool {
    BUILTIN_FUNCTIONS.contains(&name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ty {
    Strong(DType),
    WeakInt,
    WeakFloat,
}

impl Ty {
    fn dtype(self) -> DType {
        match self {
            Self::Strong(dtype) => dtype,
            Self::WeakInt => DType::Int32,
            Self::WeakFloat => DType::Float64,
        }
    }

    fn join(items: impl IntoIterator<Item = Ty>) -> Ty {
        let mut strong = Vec::new();
        let mut weak_float = false;
        for ty in items {
            match ty {
                Self::Strong(dtype) => strong.push(dtype),
                Self::WeakFloat => weak_float = true,
                Self::WeakInt => {}
            }
        }
        match DType::least_upper_dtype(&strong) {
            Some(dtype) if weak_float && !dtype.is_float() => Self::Strong(DType::Float64),
            Some(dtype) => Self::Strong(dtype),
            None if weak_float => Self::WeakFloat,
            None => Self::WeakInt,
        }
    }
}

/// Infers expression types against a kernel's declarations.
#[derive(Debug, Clone, Copy)]
pub struct TypeOracle<'k> {
    kernel: &'k Kernel,
}

impl<'k> TypeOracle<'k> {
    pub fn new(kernel: &'k Kernel) -> Self {
        Self { kernel }
    }

    /// Concrete type of `expr`; weak literals default to `int32` / `float64`.
    pub fn dtype(&self, expr: &Expr) -> Result<DType> {
        Ok(self.infer(expr)?.dtype())
    }

    /// Type of a variable referenced by name.
    pub fn variable(&self, name: &str) -> Result<DType> {
        if let Some(dtype) = self.kernel.scalar_dtype(name) {
            return Ok(dtype);
        }
        if let Some(array) = self.kernel.array(name) {
            return Ok(array.dtype());
        }
        if self.kernel.domain().has_dim(name) || self.kernel.params().contains(name) {
            return Ok(self.kernel.index_dtype());
        }
        UnresolvedTypeSnafu { variable: name }.fail()
    }

    fn infer(&self, expr: &Expr) -> Result<Ty> {
        Ok(match expr {
            Expr::Int(_) => Ty::WeakInt,
            Expr::Float(_) => Ty::WeakFloat,
            Expr::Var(name) => Ty::Strong(self.variable(name)?),
            Expr::Subscript { array, .. } => {
                let decl = self.kernel.array(array).context(UnresolvedTypeSnafu { variable: array.as_str() })?;
                Ty::Strong(decl.dtype())
            }
            Expr::Sum(items)
            | Expr::Product(items)
            | Expr::BitAnd(items)
            | Expr::BitOr(items)
            | Expr::BitXor(items)
            | Expr::Min(items)
            | Expr::Max(items) => self.join(items)?,
            Expr::Difference(a, b) | Expr::FloorDiv(a, b) | Expr::Remainder(a, b) | Expr::Power(a, b) => {
                self.join([a.as_ref(), b.as_ref()])?
            }
            Expr::LeftShift(a, _) | Expr::RightShift(a, _) | Expr::BitNot(a) => self.infer(a)?,
            Expr::Quotient(a, b) => match self.join([a.as_ref(), b.as_ref()])? {
                Ty::Strong(dtype) => Ty::Strong(dtype.true_division_result()),
                Ty::WeakInt | Ty::WeakFloat => Ty::WeakFloat,
            },
            Expr::Compare { .. } | Expr::LogicalNot(_) | Expr::LogicalAnd(_) | Expr::LogicalOr(_) => {
                Ty::Strong(DType::Bool)
            }
            Expr::If { then, otherwise, .. } => self.join([then.as_ref(), otherwise.as_ref()])?,
            Expr::Call { function, args } => {
                ensure_builtin(function)?;
                let ty = self.join(args)?;
                if INTEGER_PRESERVING.contains(&function.as_str()) || ty.dtype().is_float() {
                    ty
                } else {
                    Ty::Strong(DType::Float64)
                }
            }
            Expr::Reduce { op, body, .. } => match (op, self.infer(body)?) {
                (ReduceOp::Sum | ReduceOp::Product, Ty::Strong(DType::Bool)) => Ty::Strong(DType::Int32),
                (_, ty) => ty,
            },
        })
    }

    fn join<'e>(&self, items: impl IntoIterator<Item = &'e Expr>) -> Result<Ty> {
        let tys = items.into_iter().map(|e| self.infer(e)).collect::<Result<Vec<_>>>()?;
        Ok(Ty::join(tys))
    }
}

pub(crate) fn ensure_builtin(function: &str) -> Result<()> {
    snafu::ensure!(is_builtin(function), UnclassifiedOperationSnafu { name: function });
    Ok(())
}
