//! Runtime machine words.
use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};
use std::rc::Rc;

use crate::error::{PascalError, PascalResult};

/// A single word of the data store.
///
/// The p-machine is word addressed: every variable slot, stack cell and
/// heap cell holds one of these. Characters are one-character strings,
/// which is what lets the char-to-string implicit cast cost nothing at
/// run time. Data addresses (including `nil`, which is address 0) are
/// plain integers.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Real(f64),
    Bool(bool),
    Str(Rc<str>),
}

impl Value {
    pub fn string(s: impl AsRef<str>) -> Value {
        Value::Str(Rc::from(s.as_ref()))
    }

    /// The word `ENT` zero-fills fresh locals with.
    pub fn zero() -> Value {
        Value::Int(0)
    }

    pub fn as_int(&self) -> PascalResult<i32> {
        match self {
            Value::Int(i) => Ok(*i),
            other => Err(PascalError::new(format!("expected integer, found {other}"))),
        }
    }

    /// Integers widen silently; `FLT` exists for sites the compiler can
    /// prove, this covers zero-initialised words flowing into real math.
    pub fn as_real(&self) -> PascalResult<f64> {
        match self {
            Value::Real(r) => Ok(*r),
            Value::Int(i) => Ok(*i as f64),
            other => Err(PascalError::new(format!("expected real, found {other}"))),
        }
    }

    /// Zero-initialised words count as false.
    pub fn as_bool(&self) -> PascalResult<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            Value::Int(i) => Ok(*i != 0),
            other => Err(PascalError::new(format!("expected boolean, found {other}"))),
        }
    }

    pub fn as_addr(&self) -> PascalResult<usize> {
        match self {
            Value::Int(i) if *i >= 0 => Ok(*i as usize),
            other => Err(PascalError::new(format!("invalid data address {other}"))),
        }
    }

    pub fn as_str(&self) -> PascalResult<Rc<str>> {
        match self {
            Value::Str(s) => Ok(Rc::clone(s)),
            other => Err(PascalError::new(format!("expected string, found {other}"))),
        }
    }

    /// Value comparison for the `EQU`..`LEQ` family. Numeric kinds mix,
    /// everything else compares within its own kind.
    pub fn compare(&self, other: &Value) -> PascalResult<Ordering> {
        use Value::*;
        let ord = match (self, other) {
            (Int(l), Int(r)) => l.cmp(r),
            (Str(l), Str(r)) => l.cmp(r),
            (Bool(l), Bool(r)) => l.cmp(r),
            (Int(_) | Real(_), Int(_) | Real(_)) => {
                let (l, r) = (self.as_real()?, other.as_real()?);
                l.partial_cmp(&r)
                    .ok_or_else(|| PascalError::new("comparison with NaN"))?
            }
            (l, r) => {
                return Err(PascalError::new(format!("cannot compare {l} with {r}")));
            }
        };
        Ok(ord)
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Value::Str(s) => write!(f, "{s}"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_numeric_compare_mixes_kinds() {
        assert_eq!(
            Value::Int(2).compare(&Value::Real(2.5)).unwrap(),
            Ordering::Less
        );
        assert_eq!(
            Value::Real(3.0).compare(&Value::Int(3)).unwrap(),
            Ordering::Equal
        );
    }

    #[test]
    fn test_string_compare_is_lexicographic() {
        let l = Value::string("abc");
        let r = Value::string("abd");
        assert_eq!(l.compare(&r).unwrap(), Ordering::Less);
    }

    #[test]
    fn test_kind_mismatch_errors() {
        assert!(Value::Int(1).compare(&Value::string("1")).is_err());
        assert!(Value::string("x").as_int().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Bool(true).to_string(), "TRUE");
        assert_eq!(Value::Int(-7).to_string(), "-7");
        assert_eq!(Value::string("hi").to_string(), "hi");
    }
}
