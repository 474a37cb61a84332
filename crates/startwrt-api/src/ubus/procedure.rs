// Remote procedure declarations
//
// A `Procedure` describes one ubus method: which object and method to
// call, how positional arguments map onto named parameters, which part of
// the reply the caller cares about, and whether a non-zero status is fatal.

use serde_json::{Map, Value};

use crate::error::Error;
use crate::status::UbusStatus;

/// JSON shape the caller expects at the extracted reply key.
///
/// When the reply is missing the key, or holds a value of another shape,
/// the empty value of the expected shape is returned instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Object,
    Array,
    String,
    Boolean,
    Number,
}

impl Shape {
    pub fn default_value(self) -> Value {
        match self {
            Self::Object => Value::Object(Map::new()),
            Self::Array => Value::Array(Vec::new()),
            Self::String => Value::String(String::new()),
            Self::Boolean => Value::Bool(false),
            Self::Number => Value::from(0),
        }
    }

    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
            Self::String => value.is_string(),
            Self::Boolean => value.is_boolean(),
            Self::Number => value.is_number(),
        }
    }
}

/// Reply extraction rule. An empty `key` selects the whole reply object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expect {
    pub key: &'static str,
    pub shape: Shape,
}

/// Declaration of a remote ubus method.
#[derive(Debug, Clone, Copy)]
pub struct Procedure {
    pub object: &'static str,
    pub method: &'static str,
    pub params: &'static [&'static str],
    pub expect: Option<Expect>,
    /// Treat non-zero status codes as errors instead of yielding the
    /// expected default value.
    pub reject: bool,
}

impl Procedure {
    pub const fn new(object: &'static str, method: &'static str) -> Self {
        Self {
            object,
            method,
            params: &[],
            expect: None,
            reject: false,
        }
    }

    pub const fn params(mut self, params: &'static [&'static str]) -> Self {
        self.params = params;
        self
    }

    pub const fn expect(mut self, key: &'static str, shape: Shape) -> Self {
        self.expect = Some(Expect { key, shape });
        self
    }

    pub const fn reject(mut self) -> Self {
        self.reject = true;
        self
    }

    /// Bind positional values to the declared parameter names.
    ///
    /// `null` values are left out of the argument object, and values beyond
    /// the declared parameters are ignored.
    pub fn prepare(&self, values: Vec<Value>) -> PreparedCall<'_> {
        let args = self
            .params
            .iter()
            .zip(values)
            .filter(|(_, value)| !value.is_null())
            .map(|(name, value)| ((*name).to_owned(), value))
            .collect();
        PreparedCall {
            procedure: self,
            args,
        }
    }

    /// Turn a raw `(status, data)` reply into the value the caller expects.
    pub fn filter(&self, status: UbusStatus, data: Option<Value>) -> Result<Value, Error> {
        if !status.is_ok() {
            if self.reject {
                return Err(Error::Ubus {
                    object: self.object.to_owned(),
                    method: self.method.to_owned(),
                    status,
                });
            }
            return Ok(self
                .expect
                .map_or(Value::Null, |expect| expect.shape.default_value()));
        }

        let Some(expect) = self.expect else {
            return Ok(data.unwrap_or(Value::Null));
        };

        let picked = match data {
            Some(value) if expect.key.is_empty() => Some(value),
            Some(Value::Object(mut map)) => map.remove(expect.key),
            _ => None,
        };

        Ok(picked
            .filter(|value| expect.shape.matches(value))
            .unwrap_or_else(|| expect.shape.default_value()))
    }
}

/// A procedure with its arguments bound, ready to send alone or in a batch.
#[derive(Debug, Clone)]
pub struct PreparedCall<'a> {
    pub procedure: &'a Procedure,
    pub args: Map<String, Value>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    static LOAD: Procedure = Procedure::new("uci", "get")
        .params(&["config"])
        .expect("values", Shape::Object)
        .reject();

    static CHANGES: Procedure = Procedure::new("uci", "changes").expect("changes", Shape::Object);

    #[test]
    fn prepare_maps_positional_values_and_drops_nulls() {
        static ADD: Procedure =
            Procedure::new("uci", "add").params(&["config", "type", "name", "values"]);
        let call = ADD.prepare(vec![json!("firewall"), json!("zone"), Value::Null, json!({})]);

        assert_eq!(call.args.len(), 3);
        assert_eq!(call.args["config"], json!("firewall"));
        assert!(!call.args.contains_key("name"));
    }

    #[test]
    fn filter_extracts_expected_key() {
        let data = json!({ "values": { "lan": { ".type": "zone" } } });
        let value = LOAD.filter(UbusStatus::Ok, Some(data)).unwrap();
        assert_eq!(value, json!({ "lan": { ".type": "zone" } }));
    }

    #[test]
    fn filter_substitutes_default_on_shape_mismatch() {
        let value = LOAD
            .filter(UbusStatus::Ok, Some(json!({ "values": "nope" })))
            .unwrap();
        assert_eq!(value, json!({}));
    }

    #[test]
    fn filter_rejects_non_zero_status_when_declared() {
        let err = LOAD.filter(UbusStatus::NotFound, None).unwrap_err();
        assert_eq!(err.status(), Some(UbusStatus::NotFound));
    }

    #[test]
    fn filter_yields_default_for_non_zero_status_otherwise() {
        let value = CHANGES.filter(UbusStatus::NoData, None).unwrap();
        assert_eq!(value, json!({}));
    }

    #[test]
    fn empty_key_selects_whole_reply() {
        static FEATURES: Procedure = Procedure::new("luci", "getFeatures").expect("", Shape::Object);
        let value = FEATURES
            .filter(UbusStatus::Ok, Some(json!({ "firewall4": true })))
            .unwrap();
        assert_eq!(value, json!({ "firewall4": true }));
    }
}
