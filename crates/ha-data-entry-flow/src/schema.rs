//! Declarative form schemas
//!
//! A [`Schema`] is an ordered list of `(name, type, required, default)`
//! fields. Flows hand it to the frontend for rendering and the manager uses
//! it to validate the submitted mapping before the step sees it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FlowError;
use crate::UserInput;

/// Value type of a form field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Integer,
    Boolean,
}

/// Form field schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl FormField {
    pub fn required(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: true,
            default: None,
        }
    }

    pub fn optional(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            required: false,
            ..Self::required(name, field_type)
        }
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Coerce a submitted value to this field's type
    fn coerce(&self, value: &Value) -> Result<Value, FlowError> {
        let invalid = |expected: &str| FlowError::InvalidInput {
            field: self.name.clone(),
            message: format!("expected {expected}"),
        };

        match self.field_type {
            FieldType::String => match value {
                Value::String(_) => Ok(value.clone()),
                _ => Err(invalid("str")),
            },
            FieldType::Integer => match value {
                Value::Number(n) => n
                    .as_i64()
                    .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                    .map(Value::from)
                    .ok_or_else(|| invalid("int")),
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::from)
                    .map_err(|_| invalid("int")),
                _ => Err(invalid("int")),
            },
            FieldType::Boolean => match value {
                Value::Bool(_) => Ok(value.clone()),
                _ => Err(invalid("bool")),
            },
        }
    }
}

/// Ordered set of form fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    fields: Vec<FormField>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, field: FormField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fields(&self) -> &[FormField] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&FormField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Validate a submission: fill defaults, coerce types, reject missing
    /// required keys and keys the schema does not know.
    pub fn validate(&self, input: &UserInput) -> Result<UserInput, FlowError> {
        if let Some(extra) = input.keys().find(|key| self.get(key).is_none()) {
            return Err(FlowError::InvalidInput {
                field: extra.clone(),
                message: "extra keys not allowed".to_string(),
            });
        }

        let mut validated = UserInput::new();
        for field in &self.fields {
            let value = match input.get(&field.name).or(field.default.as_ref()) {
                Some(value) => value,
                None if field.required => {
                    return Err(FlowError::InvalidInput {
                        field: field.name.clone(),
                        message: "required key not provided".to_string(),
                    })
                }
                None => continue,
            };
            validated.insert(field.name.clone(), field.coerce(value)?);
        }
        Ok(validated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn connection_schema() -> Schema {
        Schema::new()
            .field(FormField::required("host", FieldType::String))
            .field(FormField::required("port", FieldType::Integer).with_default(80))
            .field(FormField::required("ssl", FieldType::Boolean).with_default(false))
            .field(FormField::optional("note", FieldType::String))
    }

    fn input(value: Value) -> UserInput {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_defaults_are_filled() {
        let validated = connection_schema()
            .validate(&input(json!({"host": "pi.hole"})))
            .unwrap();

        assert_eq!(validated["host"], json!("pi.hole"));
        assert_eq!(validated["port"], json!(80));
        assert_eq!(validated["ssl"], json!(false));
        assert!(!validated.contains_key("note"));
    }

    #[test]
    fn test_integer_coercion() {
        let schema = connection_schema();
        let from_string = schema
            .validate(&input(json!({"host": "h", "port": " 8080 "})))
            .unwrap();
        assert_eq!(from_string["port"], json!(8080));

        let from_float = schema
            .validate(&input(json!({"host": "h", "port": 443.0})))
            .unwrap();
        assert_eq!(from_float["port"], json!(443));

        let err = schema
            .validate(&input(json!({"host": "h", "port": "eighty"})))
            .unwrap_err();
        assert!(matches!(err, FlowError::InvalidInput { ref field, .. } if field == "port"));
    }

    #[test]
    fn test_missing_required_field() {
        let err = connection_schema()
            .validate(&input(json!({"port": 80})))
            .unwrap_err();
        assert!(matches!(err, FlowError::InvalidInput { ref field, .. } if field == "host"));
    }

    #[test]
    fn test_wrong_type_rejected() {
        let err = connection_schema()
            .validate(&input(json!({"host": "h", "ssl": "yes"})))
            .unwrap_err();
        assert!(matches!(err, FlowError::InvalidInput { ref field, .. } if field == "ssl"));
    }

    #[test]
    fn test_extra_keys_rejected() {
        let err = connection_schema()
            .validate(&input(json!({"host": "h", "password": "x"})))
            .unwrap_err();
        assert!(matches!(err, FlowError::InvalidInput { ref field, .. } if field == "password"));
    }

    #[test]
    fn test_empty_string_satisfies_required() {
        let schema = Schema::new().field(FormField::required("api_key", FieldType::String));
        let validated = schema.validate(&input(json!({"api_key": ""}))).unwrap();
        assert_eq!(validated["api_key"], json!(""));
    }

    #[test]
    fn test_serializes_as_field_list() {
        let schema = Schema::new()
            .field(FormField::required("port", FieldType::Integer).with_default(80));
        assert_eq!(
            serde_json::to_value(&schema).unwrap(),
            json!([{"name": "port", "type": "integer", "required": true, "default": 80}])
        );
    }
}
