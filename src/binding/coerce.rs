//! String → typed value coercion.

use chrono::{DateTime, FixedOffset, NaiveDate};
use url::Url;

use crate::routing::meta::{EnumCase, ParamSpec, TargetType};

/// A coerced scalar or collection.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    /// Canonical variant name.
    Enum(String),
    Date(NaiveDate),
    DateTime(DateTime<FixedOffset>),
    Uri(Url),
    List(Vec<Value>),
    Set(Vec<Value>),
    /// Entries in input order.
    Map(Vec<(Value, Value)>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::Enum(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(n) => Some(*n),
            Value::Integer(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_items(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) | Value::Set(items) => Some(items),
            _ => None,
        }
    }

    /// Map lookup by text key.
    pub fn entry(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(entries) => entries
                .iter()
                .find(|(k, _)| k.as_str() == Some(key))
                .map(|(_, v)| v),
            _ => None,
        }
    }
}

/// Convert `raw` into `target`. The error is a human-readable reason.
pub fn coerce(raw: &str, target: &TargetType, spec: &ParamSpec) -> Result<Value, String> {
    match target {
        TargetType::Text => Ok(Value::Text(raw.to_string())),
        TargetType::Integer => raw
            .trim()
            .parse::<i64>()
            .map(Value::Integer)
            .map_err(|e| format!("not an integer ({})", e)),
        TargetType::Float => raw
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|e| format!("not a number ({})", e)),
        TargetType::Boolean => match raw.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(Value::Boolean(true)),
            "false" => Ok(Value::Boolean(false)),
            _ => Err("expected true or false".to_string()),
        },
        TargetType::Enum(variants) => {
            let candidate = match spec.enum_case {
                EnumCase::AsIs => raw.trim().to_string(),
                EnumCase::Upper => raw.trim().to_uppercase(),
                EnumCase::Lower => raw.trim().to_lowercase(),
            };
            variants
                .iter()
                .find(|v| **v == candidate)
                .map(|v| Value::Enum(v.clone()))
                .ok_or_else(|| format!("expected one of [{}]", variants.join(", ")))
        }
        TargetType::Date => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .map(Value::Date)
            .map_err(|e| format!("expected YYYY-MM-DD ({})", e)),
        TargetType::DateTime => DateTime::parse_from_rfc3339(raw.trim())
            .map(Value::DateTime)
            .map_err(|e| format!("expected an RFC 3339 timestamp ({})", e)),
        TargetType::Uri => Url::parse(raw.trim())
            .map(Value::Uri)
            .map_err(|e| format!("not a URI ({})", e)),
        TargetType::List(inner) => split_items(raw, spec.list_delimiter)
            .map(|item| coerce(item, inner, spec))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        TargetType::Set(inner) => {
            let mut items: Vec<Value> = Vec::new();
            for item in split_items(raw, spec.list_delimiter) {
                let value = coerce(item, inner, spec)?;
                if !items.contains(&value) {
                    items.push(value);
                }
            }
            Ok(Value::Set(items))
        }
        TargetType::Map(key_type, value_type) => split_items(raw, spec.list_delimiter)
            .map(|pair| {
                let (k, v) = pair
                    .split_once(spec.pair_delimiter)
                    .ok_or_else(|| format!("entry `{}` lacks `{}`", pair, spec.pair_delimiter))?;
                Ok((coerce(k.trim(), key_type, spec)?, coerce(v.trim(), value_type, spec)?))
            })
            .collect::<Result<Vec<_>, String>>()
            .map(Value::Map),
        TargetType::Cookie | TargetType::Body(_) => Err("not convertible from text".to_string()),
    }
}

fn split_items(raw: &str, delimiter: char) -> impl Iterator<Item = &str> {
    raw.split(delimiter).map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> ParamSpec {
        ParamSpec::query("v")
    }

    #[test]
    fn test_scalars() {
        assert_eq!(coerce(" 42 ", &TargetType::Integer, &spec()), Ok(Value::Integer(42)));
        assert_eq!(coerce("TRUE", &TargetType::Boolean, &spec()), Ok(Value::Boolean(true)));
        assert!(coerce("4x", &TargetType::Integer, &spec()).is_err());
        assert!(coerce("yes", &TargetType::Boolean, &spec()).is_err());
        assert_eq!(coerce("2.5", &TargetType::Float, &spec()), Ok(Value::Float(2.5)));
    }

    #[test]
    fn test_enum_case_modes() {
        let target = TargetType::enumeration(["RED", "GREEN"]);
        assert!(coerce("red", &target, &spec()).is_err());
        let upper = spec().enum_case(EnumCase::Upper);
        assert_eq!(coerce("red", &target, &upper), Ok(Value::Enum("RED".into())));

        let lower_target = TargetType::enumeration(["asc", "desc"]);
        let lower = spec().enum_case(EnumCase::Lower);
        assert_eq!(coerce("DESC", &lower_target, &lower), Ok(Value::Enum("desc".into())));
    }

    #[test]
    fn test_date_and_uri() {
        let date = coerce("2024-02-29", &TargetType::Date, &spec()).unwrap();
        assert_eq!(date, Value::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()));
        assert!(coerce("2023-02-29", &TargetType::Date, &spec()).is_err());
        assert!(coerce("2024-01-01T10:00:00+02:00", &TargetType::DateTime, &spec()).is_ok());
        assert!(matches!(coerce("https://example.com/x", &TargetType::Uri, &spec()), Ok(Value::Uri(_))));
        assert!(coerce("not a uri", &TargetType::Uri, &spec()).is_err());
    }

    #[test]
    fn test_collections() {
        let list = coerce("1, 2,3", &TargetType::list_of(TargetType::Integer), &spec()).unwrap();
        assert_eq!(list.as_items().unwrap().len(), 3);

        let set = coerce("a,b,a", &TargetType::set_of(TargetType::Text), &spec()).unwrap();
        assert_eq!(set, Value::Set(vec![Value::Text("a".into()), Value::Text("b".into())]));

        let map = coerce("x:1,y:2", &TargetType::map_of(TargetType::Text, TargetType::Integer), &spec()).unwrap();
        assert_eq!(map.entry("y"), Some(&Value::Integer(2)));

        let piped = spec().delimiters('|', '=');
        let map = coerce("x=1|y=2", &TargetType::map_of(TargetType::Text, TargetType::Integer), &piped).unwrap();
        assert_eq!(map.entry("x"), Some(&Value::Integer(1)));

        assert!(coerce("x1", &TargetType::map_of(TargetType::Text, TargetType::Text), &spec()).is_err());
        assert!(coerce("1,b", &TargetType::list_of(TargetType::Integer), &spec()).is_err());
    }
}
