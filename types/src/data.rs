use std::fmt;
use std::net::Ipv4Addr;

use thiserror::Error;

use crate::schema::Type;

/// Error for [`Datum`] related operations.
#[derive(Debug, Error)]
pub enum DatumError {
    #[error("cannot interpret '{text}' as {ty}")]
    InvalidText { text: String, ty: Type },
    #[error("type {0} has no literal form")]
    NotConstructible(Type),
}

/// A single typed constant value.
///
/// Datums are produced by the analyzer from literal tokens and carried
/// inside the resolved expression tree until the executor evaluates them.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Bool(bool),
    Byte(u8),
    Char(char),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Text(String),
    Bytes(Vec<u8>),
    Ipv4(Ipv4Addr),
}

impl Datum {
    /// Returns the [`Type`] this datum is an instance of.
    pub fn ty(&self) -> Type {
        match self {
            Datum::Bool(_) => Type::Bool,
            Datum::Byte(_) => Type::Byte,
            Datum::Char(_) => Type::Char,
            Datum::Short(_) => Type::Short,
            Datum::Int(_) => Type::Int,
            Datum::Long(_) => Type::Long,
            Datum::Float(_) => Type::Float,
            Datum::Double(_) => Type::Double,
            Datum::Text(_) => Type::String,
            Datum::Bytes(_) => Type::Bytes,
            Datum::Ipv4(_) => Type::Ipv4,
        }
    }

    /// Constructs a datum of type `ty` from the raw lexeme `text`.
    ///
    /// For [`Type::Char`] the first character of the lexeme is taken.
    pub fn parse(ty: Type, text: &str) -> Result<Datum, DatumError> {
        let invalid = || DatumError::InvalidText {
            text: text.into(),
            ty,
        };
        match ty {
            Type::Bool => text.parse().map(Datum::Bool).map_err(|_| invalid()),
            Type::Byte => text.parse().map(Datum::Byte).map_err(|_| invalid()),
            Type::Char => text.chars().next().map(Datum::Char).ok_or_else(invalid),
            Type::Short => text.parse().map(Datum::Short).map_err(|_| invalid()),
            Type::Int => text.parse().map(Datum::Int).map_err(|_| invalid()),
            Type::Long => text.parse().map(Datum::Long).map_err(|_| invalid()),
            Type::Float => text.parse().map(Datum::Float).map_err(|_| invalid()),
            Type::Double => text.parse().map(Datum::Double).map_err(|_| invalid()),
            Type::String => Ok(Datum::Text(text.into())),
            Type::Bytes => Ok(Datum::Bytes(text.as_bytes().to_vec())),
            Type::Ipv4 => text.parse().map(Datum::Ipv4).map_err(|_| invalid()),
            Type::Any => Err(DatumError::NotConstructible(Type::Any)),
        }
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Bool(v) => write!(f, "{v}"),
            Datum::Byte(v) => write!(f, "{v}"),
            Datum::Char(v) => write!(f, "{v}"),
            Datum::Short(v) => write!(f, "{v}"),
            Datum::Int(v) => write!(f, "{v}"),
            Datum::Long(v) => write!(f, "{v}"),
            Datum::Float(v) => write!(f, "{v}"),
            Datum::Double(v) => write!(f, "{v}"),
            Datum::Text(v) => write!(f, "{v}"),
            Datum::Bytes(v) => write!(f, "{v:?}"),
            Datum::Ipv4(v) => write!(f, "{v}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_integral_literals() {
        assert_eq!(Datum::parse(Type::Short, "3").unwrap(), Datum::Short(3));
        assert_eq!(Datum::parse(Type::Int, "3").unwrap(), Datum::Int(3));
        assert_eq!(Datum::parse(Type::Long, "3").unwrap(), Datum::Long(3));
    }

    #[test]
    fn parse_real_literals() {
        assert_eq!(Datum::parse(Type::Float, "1.5").unwrap(), Datum::Float(1.5));
        assert_eq!(
            Datum::parse(Type::Double, "1.5").unwrap(),
            Datum::Double(1.5)
        );
    }

    #[test]
    fn parse_char_takes_first_character() {
        assert_eq!(Datum::parse(Type::Char, "abc").unwrap(), Datum::Char('a'));
    }

    #[test]
    fn parse_ipv4() {
        assert_eq!(
            Datum::parse(Type::Ipv4, "10.0.0.1").unwrap(),
            Datum::Ipv4(Ipv4Addr::new(10, 0, 0, 1))
        );
    }

    #[test]
    fn parse_invalid_number_errors() {
        let err = Datum::parse(Type::Int, "abc").unwrap_err();
        assert!(matches!(err, DatumError::InvalidText { .. }));
    }

    #[test]
    fn parse_any_is_not_constructible() {
        let err = Datum::parse(Type::Any, "x").unwrap_err();
        assert!(matches!(err, DatumError::NotConstructible(Type::Any)));
    }

    #[test]
    fn datum_type_round_trip() {
        assert_eq!(Datum::Int(1).ty(), Type::Int);
        assert_eq!(Datum::Text("a".into()).ty(), Type::String);
        assert_eq!(Datum::Char('c').ty(), Type::Char);
    }
}
