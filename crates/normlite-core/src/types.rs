//! The bidirectional type engine: converts native values to Notion JSON
//! property fragments and back.
//!
//! Every variant must satisfy the round-trip law `result(bind(v)) == v` for
//! every `v` in its declared domain; this is exercised directly by the unit
//! tests at the bottom of this module.

use crate::error::{NormliteError, NormliteResult};
use serde_json::{json, Value as Json};

/// A native value flowing in or out of the type engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    Numeric(f64),
    Money(f64),
    Str(String),
    Boolean(bool),
    Date { start: String, end: Option<String> },
    Uuid(String),
    ObjectId(String),
    Archived(bool),
    Null,
}

/// A backend-agnostic column type. The `String` variant distinguishes a
/// Notion "title" property (`is_title = true`, at most one per table) from a
/// plain rich-text property; `Money`'s `currency` keeps two differently
/// denominated columns from collapsing into the same Notion number format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeEngine {
    Integer,
    Numeric,
    Money { currency: String },
    String { is_title: bool },
    Boolean,
    Date,
    Uuid,
    ObjectId,
    ArchivalFlag,
}

/// Maps an ISO 4217-ish currency code to the Notion number format it
/// selects at `CREATE TABLE` time. Codes outside this table fall back to
/// their own lowercased form, which still keeps distinct currencies from
/// becoming indistinguishable in the emitted schema.
fn currency_number_format(currency: &str) -> String {
    match currency.to_ascii_uppercase().as_str() {
        "USD" => "dollar",
        "EUR" => "euro",
        "GBP" => "pound",
        "JPY" => "yen",
        "CAD" => "canadian_dollar",
        "AUD" => "australian_dollar",
        "CHF" => "franc",
        "CNY" => "yuan",
        "INR" => "rupee",
        "KRW" => "won",
        _ => return currency.to_ascii_lowercase(),
    }
    .to_string()
}

/// The inverse of [`currency_number_format`], used when reflecting a
/// materialized table's properties back into column metadata.
pub(crate) fn currency_code_from_number_format(format: &str) -> String {
    match format {
        "dollar" => "USD",
        "euro" => "EUR",
        "pound" => "GBP",
        "yen" => "JPY",
        "canadian_dollar" => "CAD",
        "australian_dollar" => "AUD",
        "franc" => "CHF",
        "yuan" => "CNY",
        "rupee" => "INR",
        "won" => "KRW",
        other => return other.to_ascii_uppercase(),
    }
    .to_string()
}

impl TypeEngine {
    /// The Notion property type descriptor used at `CREATE TABLE` time.
    /// Never includes a `"type"` key — the wire form puts the type tag at
    /// the containing property level, not inside the spec object.
    #[must_use]
    pub fn col_spec(self) -> Json {
        match self {
            Self::Integer | Self::Numeric => json!({ "number": { "format": "number" } }),
            Self::Money { currency } => json!({ "number": { "format": currency_number_format(&currency) } }),
            Self::String { is_title: true } => json!({ "title": {} }),
            Self::String { is_title: false } => json!({ "rich_text": {} }),
            Self::Boolean => json!({ "checkbox": {} }),
            Self::Date => json!({ "date": {} }),
            Self::Uuid | Self::ObjectId => json!({ "rich_text": {} }),
            Self::ArchivalFlag => json!({ "checkbox": {} }),
        }
    }

    /// Converts a native value into the Notion property-value fragment.
    pub fn bind(self, value: &Value) -> NormliteResult<Json> {
        match (self.clone(), value) {
            (Self::Integer, Value::Integer(n)) => Ok(json!({ "number": n })),
            (Self::Numeric, Value::Numeric(n)) => Ok(json!({ "number": n })),
            (Self::Money { .. }, Value::Money(n)) => Ok(json!({ "number": n })),
            (Self::String { is_title: true }, Value::Str(s)) => {
                Ok(json!({ "title": [{ "text": { "content": s } }] }))
            }
            (Self::String { is_title: false }, Value::Str(s)) => {
                Ok(json!({ "rich_text": [{ "text": { "content": s } }] }))
            }
            (Self::Boolean, Value::Boolean(b)) => Ok(json!({ "checkbox": b })),
            (Self::Date, Value::Date { start, end }) => match end {
                Some(end) => Ok(json!({ "date": { "start": start, "end": end } })),
                None => Ok(json!({ "date": { "start": start, "end": null } })),
            },
            (Self::Uuid, Value::Uuid(s)) | (Self::ObjectId, Value::ObjectId(s)) => {
                Ok(json!({ "id": s }))
            }
            (Self::ArchivalFlag, Value::Archived(b)) => Ok(json!({ "archived": b })),
            _ => Err(NormliteError::interface(format!(
                "value {value:?} is not in the domain of type engine {self:?}"
            ))),
        }
    }

    /// Converts a Notion property-value fragment back into a native value.
    pub fn result(self, fragment: &Json) -> NormliteResult<Value> {
        let shape_error = || {
            NormliteError::internal(format!("unexpected payload shape {fragment} for {self:?}"))
        };
        match self {
            Self::Integer => fragment
                .get("number")
                .and_then(Json::as_i64)
                .map(Value::Integer)
                .ok_or_else(shape_error),
            Self::Numeric => fragment
                .get("number")
                .and_then(Json::as_f64)
                .map(Value::Numeric)
                .ok_or_else(shape_error),
            Self::Money { .. } => fragment
                .get("number")
                .and_then(Json::as_f64)
                .map(Value::Money)
                .ok_or_else(shape_error),
            Self::String { is_title } => {
                let key = if is_title { "title" } else { "rich_text" };
                fragment
                    .get(key)
                    .and_then(Json::as_array)
                    .and_then(|segments| segments.first())
                    .and_then(|segment| segment.pointer("/text/content"))
                    .and_then(Json::as_str)
                    .map(|s| Value::Str(s.to_string()))
                    .ok_or_else(shape_error)
            }
            Self::Boolean => fragment
                .get("checkbox")
                .and_then(Json::as_bool)
                .map(Value::Boolean)
                .ok_or_else(shape_error),
            Self::Date => fragment
                .get("date")
                .ok_or_else(shape_error)
                .map(|date| Value::Date {
                    start: date.get("start").and_then(Json::as_str).unwrap_or_default().to_string(),
                    end: date.get("end").and_then(Json::as_str).map(str::to_string),
                }),
            Self::Uuid => fragment
                .get("id")
                .and_then(Json::as_str)
                .map(|s| Value::Uuid(s.to_string()))
                .ok_or_else(shape_error),
            Self::ObjectId => fragment
                .get("id")
                .and_then(Json::as_str)
                .map(|s| Value::ObjectId(s.to_string()))
                .ok_or_else(shape_error),
            Self::ArchivalFlag => fragment
                .get("archived")
                .and_then(Json::as_bool)
                .map(Value::Archived)
                .ok_or_else(shape_error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(engine: TypeEngine, value: Value) {
        let fragment = engine.clone().bind(&value).unwrap();
        let back = engine.result(&fragment).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn integer_round_trips() {
        round_trip(TypeEngine::Integer, Value::Integer(2));
    }

    #[test]
    fn title_string_round_trips() {
        round_trip(TypeEngine::String { is_title: true }, Value::Str("Tuscan kale".to_string()));
    }

    #[test]
    fn rich_text_string_round_trips() {
        round_trip(TypeEngine::String { is_title: false }, Value::Str("B".to_string()));
    }

    #[test]
    fn boolean_round_trips() {
        round_trip(TypeEngine::Boolean, Value::Boolean(false));
    }

    #[test]
    fn object_id_round_trips() {
        round_trip(TypeEngine::ObjectId, Value::ObjectId("abc-123".to_string()));
    }

    #[test]
    fn bind_exemplars_match_spec() {
        assert_eq!(TypeEngine::Integer.bind(&Value::Integer(2)).unwrap(), json!({ "number": 2 }));
        assert_eq!(
            TypeEngine::String { is_title: true }.bind(&Value::Str("Tuscan kale".into())).unwrap(),
            json!({ "title": [{ "text": { "content": "Tuscan kale" } }] })
        );
        assert_eq!(TypeEngine::Boolean.bind(&Value::Boolean(false)).unwrap(), json!({ "checkbox": false }));
    }

    #[test]
    fn col_spec_never_carries_a_type_tag() {
        let spec = TypeEngine::Integer.col_spec();
        assert!(spec.get("type").is_none());
    }

    #[test]
    fn bind_rejects_value_outside_domain() {
        let err = TypeEngine::Integer.bind(&Value::Boolean(true)).unwrap_err();
        assert!(matches!(err, NormliteError::Interface { .. }));
    }

    #[test]
    fn money_round_trips_regardless_of_currency() {
        round_trip(TypeEngine::Money { currency: "USD".to_string() }, Value::Money(19.99));
    }

    #[test]
    fn money_col_spec_distinguishes_currencies() {
        let usd = TypeEngine::Money { currency: "USD".to_string() }.col_spec();
        let eur = TypeEngine::Money { currency: "EUR".to_string() }.col_spec();
        assert_ne!(usd, eur);
        assert_eq!(usd, json!({ "number": { "format": "dollar" } }));
        assert_eq!(eur, json!({ "number": { "format": "euro" } }));
    }

    #[test]
    fn money_col_spec_falls_back_to_the_lowercased_currency_code() {
        let spec = TypeEngine::Money { currency: "XAG".to_string() }.col_spec();
        assert_eq!(spec, json!({ "number": { "format": "xag" } }));
    }

    #[test]
    fn currency_code_recovers_from_a_known_number_format() {
        assert_eq!(currency_code_from_number_format("dollar"), "USD");
        assert_eq!(currency_code_from_number_format("xag"), "XAG");
    }
}
