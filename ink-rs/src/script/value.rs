//! Runtime values for story expressions.
//!
//! Numbers are decimal, not binary floating point: every arithmetic result is
//! rounded to [`PRECISION`] significant digits (round half to even) and stored
//! without trailing zeros, so `1.5 * 7` prints `10.5` and `0.1 + 0.2` prints
//! `0.3`.

use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use crate::error::ExprError;
use crate::host::HostObject;

/// Significant decimal digits kept by every arithmetic operation.
pub const PRECISION: u32 = 7;

/// Largest exponent magnitude accepted in a literal.
const MAX_LITERAL_EXP: i32 = 400;

// ── Number ────────────────────────────────────────────────────────────────────

/// A decimal number `coeff × 10^exp`.
///
/// Always normalised: `coeff` carries at most [`PRECISION`] digits, has no
/// trailing zeros, and zero is stored as `0 × 10^0`.  Derived equality is
/// therefore numeric equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Number {
    coeff: i64,
    exp: i32,
}

fn pow10(n: u32) -> i128 {
    10i128.pow(n)
}

fn digits(mut n: u128) -> u32 {
    let mut d = 1;
    while n >= 10 {
        n /= 10;
        d += 1;
    }
    d
}

impl Number {
    pub const ZERO: Number = Number { coeff: 0, exp: 0 };
    pub const ONE: Number = Number { coeff: 1, exp: 0 };

    /// Round `coeff × 10^exp` to the working precision.
    fn normalize(coeff: i128, exp: i32) -> Number {
        if coeff == 0 {
            return Number::ZERO;
        }
        let negative = coeff < 0;
        let mut mag = coeff.unsigned_abs();
        let mut exp = exp;

        let d = digits(mag);
        if d > PRECISION {
            let drop = d - PRECISION;
            let div = 10u128.pow(drop);
            let q = mag / div;
            let r = mag % div;
            let half = div / 2;
            mag = if r > half || (r == half && q % 2 == 1) { q + 1 } else { q };
            exp = exp.saturating_add(drop as i32);
            if digits(mag) > PRECISION {
                mag /= 10;
                exp = exp.saturating_add(1);
            }
        }
        while mag % 10 == 0 {
            mag /= 10;
            exp = exp.saturating_add(1);
        }
        // Fits: at most PRECISION digits.
        let coeff = mag as i64;
        Number {
            coeff: if negative { -coeff } else { coeff },
            exp,
        }
    }

    pub fn from_i64(n: i64) -> Number {
        Number::normalize(n as i128, 0)
    }

    /// Parse a plain or exponent-form decimal literal (`12`, `-0.25`, `1e3`).
    pub fn parse(s: &str) -> Option<Number> {
        let s = s.trim();
        let (negative, body) = match s.as_bytes().first()? {
            b'-' => (true, &s[1..]),
            b'+' => (false, &s[1..]),
            _ => (false, s),
        };
        let (mantissa, exponent) = match body.find(|c| c == 'e' || c == 'E') {
            Some(i) => (&body[..i], body[i + 1..].parse::<i32>().ok()?),
            None => (body, 0),
        };
        if exponent.abs() > MAX_LITERAL_EXP {
            return None;
        }
        let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }
        if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
            return None;
        }

        let all: String = int_part.chars().chain(frac_part.chars()).collect();
        let significant = all.trim_start_matches('0');
        let mut exp = exponent.checked_sub(frac_part.len() as i32)?;

        // Keep enough digits to round correctly; the rest only matter as a
        // sticky non-zero marker.
        const KEEP: usize = 30;
        let (kept, rest) = significant.split_at(significant.len().min(KEEP));
        let mut coeff: i128 = if kept.is_empty() { 0 } else { kept.parse().ok()? };
        exp = exp.checked_add(rest.len() as i32)?;
        if rest.bytes().any(|b| b != b'0') {
            coeff = coeff * 10 + 1;
            exp = exp.checked_sub(1)?;
        }
        if negative {
            coeff = -coeff;
        }
        Some(Number::normalize(coeff, exp))
    }

    pub fn is_zero(&self) -> bool {
        self.coeff == 0
    }

    pub fn signum(&self) -> i32 {
        self.coeff.signum() as i32
    }

    pub fn is_integer(&self) -> bool {
        self.exp >= 0
    }

    /// Truncate toward zero, saturating at the `i64` range.
    pub fn to_i64(&self) -> i64 {
        if self.exp >= 0 {
            let scale = 10i64.checked_pow(self.exp as u32);
            match scale.and_then(|s| self.coeff.checked_mul(s)) {
                Some(n) => n,
                None if self.coeff < 0 => i64::MIN,
                None => i64::MAX,
            }
        } else if self.exp < -18 {
            0
        } else {
            self.coeff / 10i64.pow((-self.exp) as u32)
        }
    }

    /// Drop the fraction, rounding toward zero.
    pub fn trunc(&self) -> Number {
        Number::from_i64(self.to_i64())
    }

    pub fn neg(&self) -> Number {
        Number {
            coeff: -self.coeff,
            exp: self.exp,
        }
    }

    pub fn add(&self, rhs: &Number) -> Number {
        if self.is_zero() {
            return *rhs;
        }
        if rhs.is_zero() {
            return *self;
        }
        let (hi, lo) = if self.exp >= rhs.exp { (self, rhs) } else { (rhs, self) };
        let diff = (hi.exp as i64 - lo.exp as i64) as u64;
        if diff > 20 {
            // `lo` lies entirely below the rounding digit of `hi`.
            return *hi;
        }
        let coeff = hi.coeff as i128 * pow10(diff as u32) + lo.coeff as i128;
        Number::normalize(coeff, lo.exp)
    }

    pub fn sub(&self, rhs: &Number) -> Number {
        self.add(&rhs.neg())
    }

    pub fn mul(&self, rhs: &Number) -> Number {
        let coeff = self.coeff as i128 * rhs.coeff as i128;
        Number::normalize(coeff, self.exp.saturating_add(rhs.exp))
    }

    pub fn div(&self, rhs: &Number) -> Result<Number, ExprError> {
        if rhs.is_zero() {
            return Err(ExprError::DivisionByZero);
        }
        if self.is_zero() {
            return Ok(Number::ZERO);
        }
        const SCALE: u32 = 20;
        let num = self.coeff.unsigned_abs() as u128 * 10u128.pow(SCALE);
        let den = rhs.coeff.unsigned_abs() as u128;
        let mut q = num / den;
        let mut exp = self.exp as i64 - rhs.exp as i64 - SCALE as i64;
        if num % den != 0 {
            q = q * 10 + 1;
            exp -= 1;
        }
        let negative = (self.coeff < 0) != (rhs.coeff < 0);
        let exp = i32::try_from(exp).map_err(|_| ExprError::Overflow("/".into()))?;
        let coeff = q as i128;
        Ok(Number::normalize(if negative { -coeff } else { coeff }, exp))
    }

    /// Remainder of truncated division; takes the sign of the dividend.
    pub fn rem(&self, rhs: &Number) -> Result<Number, ExprError> {
        if rhs.is_zero() {
            return Err(ExprError::DivisionByZero);
        }
        let e = self.exp.min(rhs.exp);
        let scale = |n: &Number| -> Option<i128> {
            let shift = u32::try_from(n.exp as i64 - e as i64).ok()?;
            10i128.checked_pow(shift)?.checked_mul(n.coeff as i128)
        };
        let overflow = || ExprError::Overflow("%".into());
        let a = scale(self).ok_or_else(overflow)?;
        let b = scale(rhs).ok_or_else(overflow)?;
        Ok(Number::normalize(a % b, e))
    }

    /// Raise to an integer power; negative powers divide.
    pub fn pow(&self, n: i64) -> Result<Number, ExprError> {
        if n.unsigned_abs() > 999 {
            return Err(ExprError::Overflow("^".into()));
        }
        let mut result = Number::ONE;
        let mut base = *self;
        let mut k = n.unsigned_abs();
        while k > 0 {
            if k & 1 == 1 {
                result = result.mul(&base);
            }
            base = base.mul(&base);
            k >>= 1;
        }
        if n < 0 {
            Number::ONE.div(&result)
        } else {
            Ok(result)
        }
    }
}

impl Ord for Number {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sub(other).signum().cmp(&0)
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<i64> for Number {
    fn from(n: i64) -> Self {
        Number::from_i64(n)
    }
}

impl fmt::Display for Number {
    /// Plain notation, never exponent form.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.coeff < 0 { "-" } else { "" };
        let digits = self.coeff.unsigned_abs().to_string();
        if self.exp >= 0 {
            write!(f, "{sign}{digits}{}", "0".repeat(self.exp as usize))
        } else {
            let point = -(self.exp as i64) as usize;
            if digits.len() > point {
                let (int, frac) = digits.split_at(digits.len() - point);
                write!(f, "{sign}{int}.{frac}")
            } else {
                write!(f, "{sign}0.{}{digits}", "0".repeat(point - digits.len()))
            }
        }
    }
}

// ── Value ─────────────────────────────────────────────────────────────────────

/// A story runtime value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    Str(String),
    /// A reference to a container, by id.
    Divert(String),
    Object(Rc<HostObject>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Divert(a), Value::Divert(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.key() == b.key(),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Divert(id) => write!(f, "{id}"),
            Value::Object(o) => write!(f, "{}", o.key()),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(Number::from_i64(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Value::Number(n)
    }
}

impl Value {
    pub fn int(n: i64) -> Value {
        Value::from(n)
    }

    /// Truthiness: positive integers and `true` hold; strings hold when
    /// non-empty; containers and objects always hold.
    pub fn as_bool(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => n.to_i64() > 0,
            Value::Str(s) => !s.is_empty(),
            Value::Divert(_) | Value::Object(_) => true,
        }
    }

    /// Numeric view used by arithmetic: booleans count as 1 and 0.
    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Bool(b) => Some(Number::from_i64(*b as i64)),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Name of the type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Divert(_) => "container",
            Value::Object(_) => "object",
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
