//! Typed request bodies.
//!
//! A `BodyType` is a pair of monomorphised decoders (JSON, XML) plus an
//! optional validator, built from a concrete Rust type at registration time.
//! Decoded values travel as `Box<dyn Any + Send + Sync>` until the handler takes them
//! back out with their real type.

use std::any::Any;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// One failed constraint on a decoded body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub field: String,
    pub message: String,
}

impl Violation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Constraint checks run on a decoded body.
pub trait Validate {
    /// Every violated constraint. Empty means valid.
    fn validate(&self) -> Vec<Violation>;
}

type DecodeFn = fn(&[u8]) -> Result<Box<dyn Any + Send + Sync>, String>;
type ValidateFn = fn(&(dyn Any + Send + Sync)) -> Vec<Violation>;

/// Decoding recipe for one body type.
#[derive(Clone, Copy)]
pub struct BodyType {
    name: &'static str,
    from_json: DecodeFn,
    from_xml: DecodeFn,
    validate: Option<ValidateFn>,
    collection: bool,
}

impl BodyType {
    /// Decode into `T`, no validation.
    pub fn of<T>() -> Self
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        Self {
            name: std::any::type_name::<T>(),
            from_json: decode_json::<T>,
            from_xml: decode_xml::<T>,
            validate: None,
            collection: false,
        }
    }

    /// Decode into `T` and validate it once.
    pub fn validated<T>() -> Self
    where
        T: DeserializeOwned + Validate + Send + Sync + 'static,
    {
        Self {
            validate: Some(validate_one::<T>),
            ..Self::of::<T>()
        }
    }

    /// Decode into `Vec<T>`.
    pub fn list_of<T>() -> Self
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        Self {
            name: std::any::type_name::<Vec<T>>(),
            from_json: decode_json::<Vec<T>>,
            from_xml: decode_xml_list::<T>,
            validate: None,
            collection: true,
        }
    }

    /// Decode into `Vec<T>` and validate every element.
    pub fn validated_list_of<T>() -> Self
    where
        T: DeserializeOwned + Validate + Send + Sync + 'static,
    {
        Self {
            validate: Some(validate_each::<T>),
            ..Self::list_of::<T>()
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_collection(&self) -> bool {
        self.collection
    }

    pub fn decode_json(&self, bytes: &[u8]) -> Result<Box<dyn Any + Send + Sync>, String> {
        (self.from_json)(bytes)
    }

    pub fn decode_xml(&self, bytes: &[u8]) -> Result<Box<dyn Any + Send + Sync>, String> {
        (self.from_xml)(bytes)
    }

    pub fn validate(&self, value: &(dyn Any + Send + Sync)) -> Vec<Violation> {
        self.validate.map(|f| f(value)).unwrap_or_default()
    }
}

impl fmt::Debug for BodyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyType")
            .field("name", &self.name)
            .field("validated", &self.validate.is_some())
            .field("collection", &self.collection)
            .finish()
    }
}

fn decode_json<T: DeserializeOwned + Send + Sync + 'static>(bytes: &[u8]) -> Result<Box<dyn Any + Send + Sync>, String> {
    serde_json::from_slice::<T>(bytes)
        .map(|v| Box::new(v) as Box<dyn Any + Send + Sync>)
        .map_err(|e| e.to_string())
}

fn decode_xml<T: DeserializeOwned + Send + Sync + 'static>(bytes: &[u8]) -> Result<Box<dyn Any + Send + Sync>, String> {
    let text = std::str::from_utf8(bytes).map_err(|e| e.to_string())?;
    quick_xml::de::from_str::<T>(text)
        .map(|v| Box::new(v) as Box<dyn Any + Send + Sync>)
        .map_err(|e| e.to_string())
}

/// Every child element of the root, whatever its tag.
#[derive(Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct XmlList<T> {
    #[serde(rename = "$value", default)]
    items: Vec<T>,
}

fn decode_xml_list<T: DeserializeOwned + Send + Sync + 'static>(bytes: &[u8]) -> Result<Box<dyn Any + Send + Sync>, String> {
    let text = std::str::from_utf8(bytes).map_err(|e| e.to_string())?;
    quick_xml::de::from_str::<XmlList<T>>(text)
        .map(|list| Box::new(list.items) as Box<dyn Any + Send + Sync>)
        .map_err(|e| e.to_string())
}

fn validate_one<T: Validate + 'static>(value: &(dyn Any + Send + Sync)) -> Vec<Violation> {
    value.downcast_ref::<T>().map(Validate::validate).unwrap_or_default()
}

fn validate_each<T: Validate + 'static>(value: &(dyn Any + Send + Sync)) -> Vec<Violation> {
    let Some(items) = value.downcast_ref::<Vec<T>>() else {
        return Vec::new();
    };
    items
        .iter()
        .enumerate()
        .flat_map(|(i, item)| {
            item.validate()
                .into_iter()
                .map(move |v| Violation::new(format!("[{}].{}", i, v.field), v.message))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Account {
        name: String,
        age: u32,
    }

    impl Validate for Account {
        fn validate(&self) -> Vec<Violation> {
            let mut out = Vec::new();
            if self.name.is_empty() {
                out.push(Violation::new("name", "must not be empty"));
            }
            if self.age > 150 {
                out.push(Violation::new("age", "must be at most 150"));
            }
            out
        }
    }

    #[test]
    fn test_json_decode() {
        let body = BodyType::of::<Account>();
        let value = body.decode_json(br#"{"name":"ana","age":31}"#).unwrap();
        let account = value.downcast::<Account>().unwrap();
        assert_eq!(account.name, "ana");
        assert!(body.decode_json(b"{not json").is_err());
    }

    #[test]
    fn test_xml_decode() {
        let body = BodyType::of::<Account>();
        let value = body
            .decode_xml(b"<account><name>bo</name><age>40</age></account>")
            .unwrap();
        assert_eq!(value.downcast::<Account>().unwrap().age, 40);
    }

    #[test]
    fn test_xml_list_decode() {
        let body = BodyType::list_of::<Account>();
        let value = body
            .decode_xml(b"<accounts><account><name>a</name><age>1</age></account><account><name>b</name><age>2</age></account></accounts>")
            .unwrap();
        let list = value.downcast::<Vec<Account>>().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].name, "b");
    }

    #[test]
    fn test_validation_once_and_per_element() {
        let one = BodyType::validated::<Account>();
        let value = one.decode_json(br#"{"name":"","age":200}"#).unwrap();
        assert_eq!(one.validate(value.as_ref()).len(), 2);

        let many = BodyType::validated_list_of::<Account>();
        let value = many
            .decode_json(br#"[{"name":"ok","age":1},{"name":"","age":2}]"#)
            .unwrap();
        let violations = many.validate(value.as_ref());
        assert_eq!(violations, vec![Violation::new("[1].name", "must not be empty")]);
        assert!(many.is_collection());
    }
}
