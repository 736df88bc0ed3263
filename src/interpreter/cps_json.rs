use num_bigint::BigInt;
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::interpreter::cps::list::{self, ListShape};
use crate::interpreter::cps::{Symbol, Value};

// The JSON shape of a datum. Integers travel as decimal strings so that
// bignums survive; anything that is not data (procedures, syntax nodes,
// circular lists) is written as its printed form and cannot be read back.
#[derive(Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
enum Datum {
    Symbol(String),
    Integer(String),
    Double(f64),
    Boolean(bool),
    String(String),
    List(Vec<Datum>),
    DottedList { items: Vec<Datum>, tail: Box<Datum> },
    Opaque(String),
}

impl Datum {
    fn from_value(value: &Value) -> Datum {
        match value {
            Value::Symbol(s) => Datum::Symbol(s.name().to_string()),
            Value::Integer(n) => Datum::Integer(n.to_string()),
            Value::Double(x) => Datum::Double(*x),
            Value::Boolean(b) => Datum::Boolean(*b),
            Value::String(s) => Datum::String(s.to_string()),
            Value::EmptyList => Datum::List(vec![]),
            Value::Pair(_) => match list::shape(value) {
                ListShape::Proper(_) => Datum::List(list::iter(value).map(|v| Datum::from_value(&v)).collect()),
                ListShape::Improper => {
                    let mut items = vec![];
                    let mut current = value.clone();
                    while let Value::Pair(pair) = current {
                        items.push(Datum::from_value(&pair.car()));
                        current = pair.cdr();
                    }
                    Datum::DottedList {
                        items,
                        tail: Box::new(Datum::from_value(&current)),
                    }
                }
                ListShape::Circular => Datum::Opaque(value.to_string()),
            },
            _ => Datum::Opaque(value.to_string()),
        }
    }

    fn into_value(self) -> Result<Value, String> {
        let value = match self {
            Datum::Symbol(s) => Value::Symbol(Symbol::new(&s)),
            Datum::Integer(digits) => match digits.parse::<BigInt>() {
                Ok(n) => Value::Integer(n),
                Err(_) => return Err(format!("invalid integer {:?}", digits)),
            },
            Datum::Double(x) => Value::Double(x),
            Datum::Boolean(b) => Value::Boolean(b),
            Datum::String(s) => Value::String(s.into()),
            Datum::List(items) => list::from_vec(items.into_iter().map(Datum::into_value).collect::<Result<_, _>>()?),
            Datum::DottedList { items, tail } => {
                let items = items.into_iter().map(Datum::into_value).collect::<Result<_, _>>()?;
                list::from_vec_with_tail(items, tail.into_value()?, None)
            }
            Datum::Opaque(printed) => return Err(format!("{} cannot be read back", printed)),
        };
        Ok(value)
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        Datum::from_value(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Datum::deserialize(deserializer)?.into_value().map_err(de::Error::custom)
    }
}

pub fn datum_to_json(value: &Value) -> Result<String, serde_json::Error> { serde_json::to_string(value) }

pub fn datum_from_json(json: &str) -> Result<Value, serde_json::Error> { serde_json::from_str(json) }
