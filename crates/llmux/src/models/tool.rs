use crate::errors::ConversionError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// A tool that can be offered to a model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tool {
    /// The name of the tool
    pub name: String,
    /// A description of what the tool does
    pub description: String,
    /// JSON schema of the arguments the tool accepts
    pub input_schema: Value,
}

impl Tool {
    /// Create a new tool with the given name and description
    pub fn new<N, D>(name: N, description: D, input_schema: Value) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        Tool {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }

    /// The input schema as an object schema, with `properties` and `required` always present
    pub fn object_schema(&self) -> Result<Value, ConversionError> {
        let mut schema = match &self.input_schema {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            other => {
                return Err(ConversionError::InvalidToolSchema {
                    name: self.name.clone(),
                    reason: format!("expected an object, got {}", other),
                })
            }
        };

        let properties = self
            .input_schema
            .get("properties")
            .filter(|v| !v.is_null())
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));
        let required = self
            .input_schema
            .get("required")
            .filter(|v| !v.is_null())
            .cloned()
            .unwrap_or_else(|| json!([]));

        schema.insert("type".to_string(), json!("object"));
        schema.insert("properties".to_string(), properties);
        schema.insert("required".to_string(), required);
        Ok(Value::Object(schema))
    }
}
