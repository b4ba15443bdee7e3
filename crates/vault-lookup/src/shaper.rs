//! Turns a secret payload into the value handed back to the host
//!
//! | default_field | field present | behavior       | result                                  |
//! |---------------|---------------|----------------|-----------------------------------------|
//! | unset         | -             | any            | whole payload                           |
//! | set           | no            | unset / only   | whole payload                           |
//! | set           | no            | ignore         | not found                               |
//! | set           | yes           | unset / ignore | field value                             |
//! | set           | yes           | only           | field value if it is the only field,    |
//! |               |               |                | whole payload otherwise                 |
//!
//! With `default_field_parse = json` a string field value is parsed as JSON;
//! if that fails the string is returned untouched. Shaping never fails.

use serde_json::Value;

use crate::client::SecretPayload;
use crate::options::{FieldBehavior, FieldParse, LookupOptions};

/// Shaping rules taken from the lookup options
#[derive(Debug, Clone, Copy, Default)]
pub struct Shaping<'a> {
    pub default_field: Option<&'a str>,
    pub parse: FieldParse,
    pub behavior: Option<FieldBehavior>,
}

impl<'a> From<&'a LookupOptions> for Shaping<'a> {
    fn from(options: &'a LookupOptions) -> Self {
        Self {
            default_field: options.default_field.as_deref(),
            parse: options.default_field_parse,
            behavior: options.default_field_behavior,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Whole,
    Field,
    NotFound,
}

fn decide(payload: &SecretPayload, shaping: &Shaping<'_>) -> Decision {
    let Some(field) = shaping.default_field else {
        return Decision::Whole;
    };

    match (payload.contains_key(field), shaping.behavior) {
        (false, None | Some(FieldBehavior::Only)) => Decision::Whole,
        (false, Some(FieldBehavior::Ignore)) => Decision::NotFound,
        (true, None | Some(FieldBehavior::Ignore)) => Decision::Field,
        (true, Some(FieldBehavior::Only)) if payload.len() == 1 => Decision::Field,
        (true, Some(FieldBehavior::Only)) => Decision::Whole,
    }
}

/// Shape `payload`; `None` means "not found"
pub fn shape(mut payload: SecretPayload, shaping: &Shaping<'_>) -> Option<Value> {
    match decide(&payload, shaping) {
        Decision::Whole => Some(Value::Object(payload)),
        Decision::NotFound => None,
        Decision::Field => {
            let value = shaping
                .default_field
                .and_then(|field| payload.remove(field))
                .unwrap_or(Value::Null);
            Some(parse_field(value, shaping.parse))
        }
    }
}

fn parse_field(value: Value, parse: FieldParse) -> Value {
    match (parse, value) {
        (FieldParse::Json, Value::String(raw)) => match serde_json::from_str(&raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::debug!("default_field is not valid JSON, keeping string: {}", e);
                Value::String(raw)
            }
        },
        (_, value) => value,
    }
}
