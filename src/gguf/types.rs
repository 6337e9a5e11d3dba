use std::error::Error;
use std::fmt;

/// A GGUF metadata value.
///
/// Array contents are not kept: tokenizer vocabularies run to hundreds of
/// thousands of entries and nothing at startup needs them, so only the element
/// type and length are recorded.
#[derive(Debug, Clone, PartialEq)]
pub enum GGUFValue {
    String(String),
    /// Any signed or unsigned integer type, widened to i64
    Int(i64),
    /// FLOAT32 or FLOAT64
    Float(f64),
    Bool(bool),
    Array { element_type: u32, len: u64 },
}

impl GGUFValue {
    /// Returns the value as an integer when it holds one
    pub fn as_int(&self) -> Option<i64> {
        match self {
            GGUFValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            GGUFValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for GGUFValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GGUFValue::String(s) => write!(f, "{}", s),
            GGUFValue::Int(i) => write!(f, "{}", i),
            GGUFValue::Float(v) => write!(f, "{}", v),
            GGUFValue::Bool(b) => write!(f, "{}", b),
            GGUFValue::Array { len, .. } => write!(f, "[{} items]", len),
        }
    }
}

/// Custom error types for GGUF operations
#[derive(Debug)]
pub enum GGUFError {
    /// Wraps std::io::Error for file operations
    IoError(std::io::Error),
    /// Invalid format errors with a message
    InvalidFormat(String),
}

/// Implements Display trait for GGUFError for error reporting
impl fmt::Display for GGUFError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GGUFError::IoError(e) => write!(f, "I/O error: {}", e),
            GGUFError::InvalidFormat(msg) => write!(f, "Invalid GGUF format: {}", msg),
        }
    }
}

impl Error for GGUFError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            GGUFError::IoError(e) => Some(e),
            GGUFError::InvalidFormat(_) => None,
        }
    }
}

/// Allows automatic conversion from std::io::Error to GGUFError
impl From<std::io::Error> for GGUFError {
    fn from(err: std::io::Error) -> Self {
        GGUFError::IoError(err)
    }
}
