use std::cmp::Ordering;
use std::fmt;
use std::mem;

use serde::{Deserialize, Serialize};

/// A single row flowing between operators.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub enum Value {
	#[default]
	None,
	Null,
	Bool(bool),
	Int(i64),
	Float(f64),
	String(String),
	Array(Vec<Value>),
}

impl Value {
	/// The position of this variant in the total ordering of values
	fn rank(&self) -> u8 {
		match self {
			Value::None => 0,
			Value::Null => 1,
			Value::Bool(_) => 2,
			Value::Int(_) | Value::Float(_) => 3,
			Value::String(_) => 4,
			Value::Array(_) => 5,
		}
	}

	/// Returns an estimate of the number of bytes this value occupies in memory.
	pub fn mem_size(&self) -> usize {
		mem::size_of::<Self>()
			+ match self {
				Value::String(v) => v.capacity(),
				Value::Array(v) => v.iter().map(Value::mem_size).sum(),
				_ => 0,
			}
	}
}

impl PartialEq for Value {
	fn eq(&self, other: &Self) -> bool {
		self.cmp(other) == Ordering::Equal
	}
}

impl Eq for Value {}

impl PartialOrd for Value {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for Value {
	fn cmp(&self, other: &Self) -> Ordering {
		match (self, other) {
			(Value::Bool(a), Value::Bool(b)) => a.cmp(b),
			(Value::Int(a), Value::Int(b)) => a.cmp(b),
			// Zeroes of either sign are equal, NaNs sort at the extremes
			(Value::Float(a), Value::Float(b)) => a.partial_cmp(b).unwrap_or_else(|| a.total_cmp(b)),
			(Value::Int(a), Value::Float(b)) => cmp_int_float(*a, *b),
			(Value::Float(a), Value::Int(b)) => cmp_int_float(*b, *a).reverse(),
			(Value::String(a), Value::String(b)) => a.cmp(b),
			(Value::Array(a), Value::Array(b)) => a.cmp(b),
			(a, b) => a.rank().cmp(&b.rank()),
		}
	}
}

/// Compares an integer with a float exactly, without rounding the integer.
fn cmp_int_float(i: i64, f: f64) -> Ordering {
	// 2^63, the smallest float above every i64
	const I64_END: f64 = 9_223_372_036_854_775_808.0;
	if f.is_nan() {
		return if f.is_sign_negative() {
			Ordering::Greater
		} else {
			Ordering::Less
		};
	}
	if f >= I64_END {
		return Ordering::Less;
	}
	if f < -I64_END {
		return Ordering::Greater;
	}
	let whole = f.trunc();
	match i.cmp(&(whole as i64)) {
		Ordering::Equal => whole.partial_cmp(&f).unwrap_or(Ordering::Equal),
		ord => ord,
	}
}

impl fmt::Display for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Value::None => f.write_str("NONE"),
			Value::Null => f.write_str("NULL"),
			Value::Bool(v) => write!(f, "{v}"),
			Value::Int(v) => write!(f, "{v}"),
			Value::Float(v) => write!(f, "{v}f"),
			Value::String(v) => write!(f, "{v:?}"),
			Value::Array(v) => {
				f.write_str("[")?;
				for (i, x) in v.iter().enumerate() {
					if i > 0 {
						f.write_str(", ")?;
					}
					write!(f, "{x}")?;
				}
				f.write_str("]")
			}
		}
	}
}

impl From<bool> for Value {
	fn from(v: bool) -> Self {
		Value::Bool(v)
	}
}

impl From<i64> for Value {
	fn from(v: i64) -> Self {
		Value::Int(v)
	}
}

impl From<f64> for Value {
	fn from(v: f64) -> Self {
		Value::Float(v)
	}
}

impl From<&str> for Value {
	fn from(v: &str) -> Self {
		Value::String(v.to_owned())
	}
}

impl From<String> for Value {
	fn from(v: String) -> Self {
		Value::String(v)
	}
}

impl<T: Into<Value>> From<Vec<T>> for Value {
	fn from(v: Vec<T>) -> Self {
		Value::Array(v.into_iter().map(Into::into).collect())
	}
}
