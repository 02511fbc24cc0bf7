use std::fmt;

use num_traits::{One, Zero};
use rug::ops::RemRounding;
use rug::{Complex, Float};
use thiserror::Error;

use crate::complex::Rational;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MatrixError {
    #[error("matrix shapes are incompatible")]
    Shape,
    #[error("division by zero")]
    DivisionByZero,
    #[error("operation produced a non-finite value")]
    NonFinite,
}

/// A grid of exact complex rationals. Literal assembly may leave it ragged;
/// arithmetic validates shapes on entry. A 1x1 grid doubles as a scalar.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    pub values: Vec<Vec<Rational>>,
}

impl Matrix {
    pub fn from_scalar(value: Rational) -> Self {
        Matrix {
            values: vec![vec![value]],
        }
    }

    pub fn rows(&self) -> usize {
        self.values.len()
    }

    pub fn cols(&self) -> usize {
        self.values.first().map_or(0, Vec::len)
    }

    fn is_rectangular(&self) -> bool {
        let cols = self.cols();
        self.values.iter().all(|row| row.len() == cols)
    }

    /// The single entry of a 1x1 grid.
    pub fn scalar(&self) -> Option<&Rational> {
        if self.rows() == 1 && self.values[0].len() == 1 {
            Some(&self.values[0][0])
        } else {
            None
        }
    }

    fn same_shape(&self, rhs: &Matrix) -> bool {
        self.rows() == rhs.rows()
            && self
                .values
                .iter()
                .zip(&rhs.values)
                .all(|(a, b)| a.len() == b.len())
    }

    fn zip<F>(&self, rhs: &Matrix, f: F) -> Result<Matrix, MatrixError>
    where
        F: Fn(&Rational, &Rational) -> Rational,
    {
        if !self.same_shape(rhs) {
            return Err(MatrixError::Shape);
        }
        let values = self
            .values
            .iter()
            .zip(&rhs.values)
            .map(|(a, b)| a.iter().zip(b).map(|(x, y)| f(x, y)).collect())
            .collect();
        Ok(Matrix { values })
    }

    fn scale(&self, factor: &Rational) -> Matrix {
        let values = self
            .values
            .iter()
            .map(|row| row.iter().map(|v| v.clone() * factor.clone()).collect())
            .collect();
        Matrix { values }
    }

    pub fn add(&self, rhs: &Matrix) -> Result<Matrix, MatrixError> {
        self.zip(rhs, |a, b| a.clone() + b.clone())
    }

    pub fn sub(&self, rhs: &Matrix) -> Result<Matrix, MatrixError> {
        self.zip(rhs, |a, b| a.clone() - b.clone())
    }

    pub fn neg(&self) -> Matrix {
        let values = self
            .values
            .iter()
            .map(|row| row.iter().map(|v| -v.clone()).collect())
            .collect();
        Matrix { values }
    }

    /// Multiplication: a 1x1 operand scales the other side elementwise,
    /// otherwise the inner dimensions must agree and this is the product.
    pub fn mul(&self, rhs: &Matrix) -> Result<Matrix, MatrixError> {
        if let Some(factor) = self.scalar() {
            return Ok(rhs.scale(factor));
        }
        if let Some(factor) = rhs.scalar() {
            return Ok(self.scale(factor));
        }
        if !self.is_rectangular() || !rhs.is_rectangular() || self.cols() != rhs.rows() {
            return Err(MatrixError::Shape);
        }
        let inner = self.cols();
        let mut values = Vec::with_capacity(self.rows());
        for i in 0..self.rows() {
            let mut row = Vec::with_capacity(rhs.cols());
            for j in 0..rhs.cols() {
                let mut sum = Rational::zero();
                for k in 0..inner {
                    sum = sum + self.values[i][k].clone() * rhs.values[k][j].clone();
                }
                row.push(sum);
            }
            values.push(row);
        }
        Ok(Matrix { values })
    }

    /// Division: a scalar divisor divides every entry; a scalar dividend
    /// divides into every entry of the divisor. Matrix-by-matrix division
    /// is a shape error.
    pub fn div(&self, rhs: &Matrix) -> Result<Matrix, MatrixError> {
        if let Some(divisor) = rhs.scalar() {
            return self.try_map(|value| {
                value
                    .checked_div(divisor)
                    .ok_or(MatrixError::DivisionByZero)
            });
        }
        if let Some(dividend) = self.scalar() {
            return rhs.try_map(|value| {
                dividend
                    .checked_div(value)
                    .ok_or(MatrixError::DivisionByZero)
            });
        }
        Err(MatrixError::Shape)
    }

    fn try_map<F>(&self, f: F) -> Result<Matrix, MatrixError>
    where
        F: Fn(&Rational) -> Result<Rational, MatrixError>,
    {
        let mut values = Vec::with_capacity(self.rows());
        for row in &self.values {
            let mut out = Vec::with_capacity(row.len());
            for value in row {
                out.push(f(value)?);
            }
            values.push(out);
        }
        Ok(Matrix { values })
    }

    /// Exponentiation by a scalar. A scalar base may take any exponent
    /// (float excursion for non-integers); a square base requires a
    /// nonnegative integer exponent and repeats the product.
    pub fn pow(&self, exponent: &Matrix, prec: u32) -> Result<Matrix, MatrixError> {
        let e = exponent.scalar().ok_or(MatrixError::Shape)?;
        if let Some(base) = self.scalar() {
            return base
                .pow(e, prec)
                .map(Matrix::from_scalar)
                .ok_or(MatrixError::NonFinite);
        }
        if !self.is_rectangular() || self.rows() != self.cols() || !e.is_real() || !e.a.is_integer()
        {
            return Err(MatrixError::Shape);
        }
        let n = e.a.numer().to_u64().ok_or(MatrixError::Shape)?;
        let mut result = Matrix::identity(self.rows());
        for _ in 0..n {
            result = result.mul(self)?;
        }
        Ok(result)
    }

    fn identity(n: usize) -> Matrix {
        let values = (0..n)
            .map(|i| {
                (0..n)
                    .map(|j| if i == j { Rational::one() } else { Rational::zero() })
                    .collect()
            })
            .collect();
        Matrix { values }
    }

    /// Euclidean remainder over the real integer parts of two scalars.
    /// Anything else passes through unchanged.
    pub fn modulus(&self, rhs: &Matrix) -> Result<Matrix, MatrixError> {
        match (self.scalar(), rhs.scalar()) {
            (Some(a), Some(b)) if a.a.is_integer() && b.a.is_integer() => {
                if b.a == 0i32 {
                    return Err(MatrixError::DivisionByZero);
                }
                let remainder = a.a.numer().clone().rem_euc(b.a.numer());
                Ok(Matrix::from_scalar(Rational::new(
                    rug::Rational::from(remainder),
                    a.b.clone(),
                )))
            }
            _ => Ok(self.clone()),
        }
    }

    /// 1x1 transcendental via a float excursion at `prec` bits.
    pub fn map(
        &self,
        prec: u32,
        f: impl FnOnce(Complex) -> Complex,
    ) -> Result<Matrix, MatrixError> {
        let value = self.scalar().ok_or(MatrixError::Shape)?;
        value
            .map_float(prec, f)
            .map(Matrix::from_scalar)
            .ok_or(MatrixError::NonFinite)
    }

    /// Decimal expansion of a 1x1 value to `digits` fractional digits.
    pub fn float_string(&self, digits: usize, prec: u32) -> Option<String> {
        let value = self.scalar()?;
        let re = Float::with_val(prec, &value.a);
        if value.is_real() {
            Some(format!("{re:.digits$}"))
        } else {
            let im = Float::with_val(prec, &value.b);
            Some(format!("{re:.digits$} + {im:.digits$}i"))
        }
    }
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(value) = self.scalar() {
            return write!(f, "{value}");
        }
        write!(f, "[")?;
        for row in &self.values {
            write!(f, "[")?;
            for (i, value) in row.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{value}")?;
            }
            write!(f, "]")?;
        }
        write!(f, "]")
    }
}
