use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

use num_traits::{One, Zero};
use rug::ops::Pow;
use rug::{Complex, Float, Integer};

/// An exact complex number: real part `a` plus imaginary part `b`, both
/// arbitrary-precision rationals. Arithmetic stays exact; transcendental
/// operations take a float excursion at a caller-supplied precision and
/// rationalize the result.
#[derive(Debug, Clone, PartialEq)]
pub struct Rational {
    pub a: rug::Rational,
    pub b: rug::Rational,
}

impl Rational {
    pub fn new(a: rug::Rational, b: rug::Rational) -> Self {
        Rational { a, b }
    }

    /// A real value with zero imaginary part.
    pub fn real(a: rug::Rational) -> Self {
        Rational {
            a,
            b: rug::Rational::new(),
        }
    }

    pub fn is_real(&self) -> bool {
        self.b == 0i32
    }

    /// Lifts both parts into an MPC complex float at `prec` bits.
    pub fn to_float(&self, prec: u32) -> Complex {
        Complex::with_val(
            prec,
            (Float::with_val(prec, &self.a), Float::with_val(prec, &self.b)),
        )
    }

    /// Rationalizes a complex float. `None` when either part is not finite.
    pub fn from_float(value: &Complex) -> Option<Self> {
        Some(Rational {
            a: value.real().to_rational()?,
            b: value.imag().to_rational()?,
        })
    }

    /// Float excursion: lift, transform, rationalize.
    pub fn map_float<F>(&self, prec: u32, f: F) -> Option<Self>
    where
        F: FnOnce(Complex) -> Complex,
    {
        Self::from_float(&f(self.to_float(prec)))
    }

    /// Exact division. `None` when the divisor is zero.
    pub fn checked_div(&self, rhs: &Rational) -> Option<Self> {
        let denom = rug::Rational::from(&rhs.a * &rhs.a) + rug::Rational::from(&rhs.b * &rhs.b);
        if denom == 0i32 {
            return None;
        }
        let re = rug::Rational::from(&self.a * &rhs.a) + rug::Rational::from(&self.b * &rhs.b);
        let im = rug::Rational::from(&self.b * &rhs.a) - rug::Rational::from(&self.a * &rhs.b);
        Some(Rational {
            a: re / denom.clone(),
            b: im / denom,
        })
    }

    /// Exponentiation. Integer exponents stay exact via binary powering;
    /// everything else goes through MPC `pow`. `None` on a non-finite
    /// result or a negative power of zero.
    pub fn pow(&self, exponent: &Rational, prec: u32) -> Option<Self> {
        if exponent.is_real() && exponent.a.is_integer() {
            if let Some(n) = exponent.a.numer().to_i64() {
                return self.pow_int(n);
            }
        }
        let rhs = exponent.to_float(prec);
        self.map_float(prec, |base| base.pow(rhs))
    }

    fn pow_int(&self, n: i64) -> Option<Self> {
        if n < 0 {
            let inverse = Rational::one().checked_div(self)?;
            return inverse.pow_int(n.checked_neg()?);
        }
        let mut result = Rational::one();
        let mut base = self.clone();
        let mut n = n;
        while n > 0 {
            if n & 1 == 1 {
                result = result * base.clone();
            }
            base = base.clone() * base;
            n >>= 1;
        }
        Some(result)
    }
}

impl Add for Rational {
    type Output = Rational;

    fn add(self, rhs: Rational) -> Rational {
        Rational {
            a: self.a + rhs.a,
            b: self.b + rhs.b,
        }
    }
}

impl Sub for Rational {
    type Output = Rational;

    fn sub(self, rhs: Rational) -> Rational {
        Rational {
            a: self.a - rhs.a,
            b: self.b - rhs.b,
        }
    }
}

impl Mul for Rational {
    type Output = Rational;

    fn mul(self, rhs: Rational) -> Rational {
        let re =
            rug::Rational::from(&self.a * &rhs.a) - rug::Rational::from(&self.b * &rhs.b);
        let im =
            rug::Rational::from(&self.a * &rhs.b) + rug::Rational::from(&self.b * &rhs.a);
        Rational { a: re, b: im }
    }
}

impl Neg for Rational {
    type Output = Rational;

    fn neg(self) -> Rational {
        Rational {
            a: -self.a,
            b: -self.b,
        }
    }
}

impl Zero for Rational {
    fn zero() -> Self {
        Rational {
            a: rug::Rational::new(),
            b: rug::Rational::new(),
        }
    }

    fn is_zero(&self) -> bool {
        self.a == 0i32 && self.b == 0i32
    }
}

impl One for Rational {
    fn one() -> Self {
        Rational {
            a: rug::Rational::from(1),
            b: rug::Rational::new(),
        }
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_real() {
            write!(f, "{}", self.a)
        } else if self.a == 0i32 {
            write!(f, "{}i", self.b)
        } else if self.b < 0i32 {
            write!(f, "{}{}i", self.a, self.b)
        } else {
            write!(f, "{}+{}i", self.a, self.b)
        }
    }
}

/// Parses a decimal literal (`-?[0-9]+(.[0-9]*)?`) into an exact rational.
pub fn parse_decimal(text: &str) -> Option<rug::Rational> {
    let (negative, unsigned) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (whole, fraction) = match unsigned.split_once('.') {
        Some((w, f)) => (w, f),
        None => (unsigned, ""),
    };
    if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let digits = format!("{whole}{fraction}");
    let numer: Integer = digits.parse().ok()?;
    let denom = Integer::from(Integer::u_pow_u(10, fraction.len() as u32));
    let mut value = rug::Rational::from((numer, denom));
    if negative {
        value = -value;
    }
    Some(value)
}

/// π at `prec` bits via the arithmetic-geometric mean (Gauss-Legendre)
/// iteration, rationalized. Each pass doubles the correct digits.
pub fn pi(prec: u32) -> Option<rug::Rational> {
    let mut a = Float::with_val(prec, 1);
    let mut b = Float::with_val(prec, 0.5).sqrt();
    let mut t = Float::with_val(prec, 0.25);
    let mut p = Float::with_val(prec, 1);
    let eps = Float::with_val(prec, 1) >> prec.saturating_sub(8);
    for _ in 0..64 {
        let an = Float::with_val(prec, &a + &b) / 2u32;
        let bn = Float::with_val(prec, &a * &b).sqrt();
        let d = Float::with_val(prec, &a - &an);
        t -= Float::with_val(prec, &d * &d) * &p;
        p *= 2u32;
        a = an;
        b = bn;
        if Float::with_val(prec, &a - &b).abs() < eps {
            break;
        }
    }
    let sum = Float::with_val(prec, &a + &b);
    let value = Float::with_val(prec, &sum * &sum) / (Float::with_val(prec, 4) * t);
    value.to_rational()
}

#[cfg(test)]
mod tests {
    use super::{parse_decimal, pi, Rational};
    use num_traits::{One, Zero};
    use rug::float::Constant;
    use rug::Float;

    fn real(n: i32, d: i32) -> Rational {
        Rational::real(rug::Rational::from((n, d)))
    }

    fn imaginary(n: i32, d: i32) -> Rational {
        Rational::new(rug::Rational::new(), rug::Rational::from((n, d)))
    }

    #[test]
    fn complex_multiplication() {
        // (1 + 2i)(3 + 4i) = -5 + 10i
        let lhs = Rational::new(rug::Rational::from(1), rug::Rational::from(2));
        let rhs = Rational::new(rug::Rational::from(3), rug::Rational::from(4));
        let product = lhs * rhs;
        assert_eq!(product.a, -5i32);
        assert_eq!(product.b, 10i32);
    }

    #[test]
    fn division_by_zero_is_none() {
        assert!(real(1, 1).checked_div(&Rational::zero()).is_none());
    }

    #[test]
    fn division_of_imaginary_units() {
        // i / i = 1
        let quotient = imaginary(1, 1).checked_div(&imaginary(1, 1)).unwrap();
        assert!(quotient.is_real());
        assert_eq!(quotient.a, 1i32);
    }

    #[test]
    fn integer_powers_stay_exact() {
        let half = real(2, 1).pow(&real(-1, 1), 64).unwrap();
        assert_eq!(half.a, rug::Rational::from((1, 2)));
        let sixty_four = real(8, 1).pow(&real(2, 1), 64).unwrap();
        assert_eq!(sixty_four.a, 64i32);
    }

    #[test]
    fn zero_to_the_zero_is_one() {
        let value = Rational::zero().pow(&Rational::zero(), 64).unwrap();
        assert!(value.is_one());
    }

    #[test]
    fn imaginary_unit_squares_to_minus_one() {
        let squared = imaginary(1, 1).pow(&real(2, 1), 64).unwrap();
        assert!(squared.is_real());
        assert_eq!(squared.a, -1i32);
    }

    #[test]
    fn parses_decimal_literals() {
        assert_eq!(parse_decimal("1.5").unwrap(), rug::Rational::from((3, 2)));
        assert_eq!(
            parse_decimal("-0.25").unwrap(),
            rug::Rational::from((-1, 4))
        );
        assert_eq!(parse_decimal("42").unwrap(), 42i32);
        assert_eq!(parse_decimal("2.").unwrap(), 2i32);
        assert!(parse_decimal("").is_none());
        assert!(parse_decimal(".5").is_none());
    }

    #[test]
    fn agm_pi_matches_mpfr_constant() {
        let prec = 256;
        let computed = Float::with_val(prec, &pi(prec).unwrap());
        let reference = Float::with_val(prec, Constant::Pi);
        let error = Float::with_val(prec, &computed - &reference).abs();
        let bound = Float::with_val(prec, 1) >> 200u32;
        assert!(error < bound, "|agm - mpfr| = {error}");
    }

    #[test]
    fn float_excursion_round_trips_exact_values() {
        let value = Rational::new(rug::Rational::from((3, 4)), rug::Rational::from(-2));
        let back = Rational::from_float(&value.to_float(128)).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn display_forms() {
        assert_eq!(real(5, 3).to_string(), "5/3");
        assert_eq!(imaginary(2, 1).to_string(), "2i");
        assert_eq!(
            Rational::new(rug::Rational::from(1), rug::Rational::from(-2)).to_string(),
            "1-2i"
        );
        assert_eq!(
            Rational::new(rug::Rational::from(1), rug::Rational::from(2)).to_string(),
            "1+2i"
        );
    }
}
