//! Attribute-tagged values as they sit in the record store.
//!
//! Every read goes through [`AttributeValue::decode`], which is the only place
//! tagged wire values become plain JSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// A stored record: attribute name to tagged value.
pub type Item = BTreeMap<String, AttributeValue>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    #[serde(rename = "S")]
    String(String),
    #[serde(rename = "N")]
    Number(String),
    #[serde(rename = "BOOL")]
    Bool(bool),
    #[serde(rename = "NULL")]
    Null(bool),
    #[serde(rename = "L")]
    List(Vec<AttributeValue>),
    #[serde(rename = "M")]
    Map(BTreeMap<String, AttributeValue>),
    #[serde(rename = "SS")]
    StringSet(Vec<String>),
    #[serde(rename = "NS")]
    NumberSet(Vec<String>),
}

impl AttributeValue {
    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    pub fn number(value: impl ToString) -> Self {
        Self::Number(value.to_string())
    }

    pub fn decode(&self) -> Value {
        match self {
            Self::String(value) => Value::String(value.clone()),
            Self::Number(value) => decode_number(value),
            Self::Bool(value) => Value::Bool(*value),
            Self::Null(_) => Value::Null,
            Self::List(values) => Value::Array(values.iter().map(Self::decode).collect()),
            Self::Map(values) => Value::Object(decode_map(values)),
            Self::StringSet(values) => {
                Value::Array(values.iter().cloned().map(Value::String).collect())
            }
            Self::NumberSet(values) => {
                Value::Array(values.iter().map(|value| decode_number(value)).collect())
            }
        }
    }

    pub fn encode(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null(true),
            Value::Bool(value) => Self::Bool(*value),
            Value::Number(value) => Self::Number(value.to_string()),
            Value::String(value) => Self::String(value.clone()),
            Value::Array(values) => Self::List(values.iter().map(Self::encode).collect()),
            Value::Object(values) => Self::Map(
                values.iter().map(|(key, value)| (key.clone(), Self::encode(value))).collect(),
            ),
        }
    }
}

pub fn decode_item(item: &Item) -> Map<String, Value> {
    decode_map(item)
}

pub fn encode_item(record: &Map<String, Value>) -> Item {
    record.iter().map(|(key, value)| (key.clone(), AttributeValue::encode(value))).collect()
}

fn decode_map(values: &BTreeMap<String, AttributeValue>) -> Map<String, Value> {
    values.iter().map(|(key, value)| (key.clone(), value.decode())).collect()
}

/// Integer when there is no decimal point, float otherwise. Anything that
/// parses as neither is kept verbatim as a string.
fn decode_number(raw: &str) -> Value {
    let trimmed = raw.trim();
    if !trimmed.contains('.') {
        if let Ok(value) = trimmed.parse::<i64>() {
            return Value::Number(value.into());
        }
    }

    trimmed
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{decode_item, encode_item, AttributeValue, Item};

    #[test]
    fn numbers_decode_by_decimal_point() {
        assert_eq!(AttributeValue::number("4096").decode(), json!(4096));
        assert_eq!(AttributeValue::number("0.7").decode(), json!(0.7));
        assert_eq!(AttributeValue::number("-3").decode(), json!(-3));
        assert_eq!(AttributeValue::number("lots").decode(), json!("lots"));
    }

    #[test]
    fn wire_form_matches_tagged_layout() {
        let raw = r#"{
            "limits": {"M": {"max_minutes": {"N": "30"}, "ratio": {"N": "0.5"}}},
            "tool_refs": {"L": [{"S": "hang_up"}, {"S": "http:lookup@2"}]},
            "enabled": {"BOOL": true},
            "missing": {"NULL": true},
            "tags": {"SS": ["a", "b"]},
            "codes": {"NS": ["1", "2.5"]}
        }"#;
        let item: Item = serde_json::from_str(raw).expect("item should deserialize");

        assert_eq!(
            serde_json::Value::Object(decode_item(&item)),
            json!({
                "limits": {"max_minutes": 30, "ratio": 0.5},
                "tool_refs": ["hang_up", "http:lookup@2"],
                "enabled": true,
                "missing": null,
                "tags": ["a", "b"],
                "codes": [1, 2.5],
            })
        );
    }

    #[test]
    fn nested_lists_of_maps_decode_recursively() {
        let value = AttributeValue::List(vec![AttributeValue::Map(
            [("id".to_string(), AttributeValue::string("nova-3"))].into_iter().collect(),
        )]);

        assert_eq!(value.decode(), json!([{"id": "nova-3"}]));
    }

    #[test]
    fn encoded_records_decode_to_the_same_json() {
        let record = json!({
            "provider": "openai",
            "params": {"temperature": 0.7, "max_tokens": 4096, "stop": null},
            "flags": [true, "x"],
        });
        let record = record.as_object().cloned().unwrap_or_default();

        let item = encode_item(&record);
        assert_eq!(item.get("provider"), Some(&AttributeValue::string("openai")));
        assert_eq!(decode_item(&item), record);
    }
}
