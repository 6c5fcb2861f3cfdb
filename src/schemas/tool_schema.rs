//! Tool descriptors and the constrained JSON Schema subset they carry.
//!
//! Properties keep declaration order so that serializing the same schema twice
//! produces the same bytes.

use serde::{
    de::{MapAccess, Visitor},
    ser::SerializeMap,
    Deserialize, Deserializer, Serialize, Serializer,
};
use serde_json::{json, Value};
use std::fmt;

/// JSON Schema primitive type names accepted on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

impl SchemaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaType::String => "string",
            SchemaType::Number => "number",
            SchemaType::Integer => "integer",
            SchemaType::Boolean => "boolean",
            SchemaType::Array => "array",
            SchemaType::Object => "object",
        }
    }

    /// Type of a JSON literal, used to type enums and defaults.
    pub fn of_value(value: &Value) -> Self {
        match value {
            Value::Bool(_) => SchemaType::Boolean,
            Value::Number(_) => SchemaType::Number,
            Value::Array(_) => SchemaType::Array,
            Value::Object(_) => SchemaType::Object,
            _ => SchemaType::String,
        }
    }
}

/// Schema of a single property (or of an array's items).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<SchemaType>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<PropertySchema>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Properties::is_empty")]
    pub properties: Properties,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

impl PropertySchema {
    pub fn of_type(schema_type: SchemaType) -> Self {
        Self {
            schema_type: Some(schema_type),
            ..Self::default()
        }
    }

    pub fn string() -> Self {
        Self::of_type(SchemaType::String)
    }

    /// An open object: any members accepted.
    pub fn object() -> Self {
        Self::of_type(SchemaType::Object)
    }

    pub fn array(items: PropertySchema) -> Self {
        Self {
            schema_type: Some(SchemaType::Array),
            items: Some(Box::new(items)),
            ..Self::default()
        }
    }

    /// Enum whose element type is inferred from the literals: all numbers
    /// give `number`, anything else `string`.
    pub fn enumeration(values: Vec<Value>) -> Self {
        let schema_type = if !values.is_empty() && values.iter().all(Value::is_number) {
            SchemaType::Number
        } else {
            SchemaType::String
        };
        Self {
            schema_type: Some(schema_type),
            enum_values: Some(values),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn is_object(&self) -> bool {
        self.schema_type == Some(SchemaType::Object)
    }
}

/// Ordered name → schema mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties(Vec<(String, PropertySchema)>);

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace, keeping the original position on replace.
    pub fn insert(&mut self, name: impl Into<String>, schema: PropertySchema) {
        let name = name.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = schema,
            None => self.0.push((name, schema)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&PropertySchema> {
        self.0
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, schema)| schema)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertySchema)> {
        self.0.iter().map(|(name, schema)| (name.as_str(), schema))
    }
}

impl FromIterator<(String, PropertySchema)> for Properties {
    fn from_iter<I: IntoIterator<Item = (String, PropertySchema)>>(iter: I) -> Self {
        let mut properties = Properties::new();
        for (name, schema) in iter {
            properties.insert(name, schema);
        }
        properties
    }
}

impl Serialize for Properties {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, schema) in &self.0 {
            map.serialize_entry(name, schema)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Properties {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PropertiesVisitor;

        impl<'de> Visitor<'de> for PropertiesVisitor {
            type Value = Properties;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map of property schemas")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Properties, A::Error> {
                let mut properties = Properties::new();
                while let Some((name, schema)) = access.next_entry::<String, PropertySchema>()? {
                    properties.insert(name, schema);
                }
                Ok(properties)
            }
        }

        deserializer.deserialize_map(PropertiesVisitor)
    }
}

/// Top-level input schema of a tool; always an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSchema {
    #[serde(rename = "type")]
    pub schema_type: SchemaType,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

impl Default for InputSchema {
    fn default() -> Self {
        Self {
            schema_type: SchemaType::Object,
            properties: Properties::new(),
            required: Vec::new(),
        }
    }
}

impl InputSchema {
    pub fn new(properties: Properties, required: Vec<String>) -> Self {
        let mut schema = Self {
            schema_type: SchemaType::Object,
            properties,
            required,
        };
        schema.normalize_required();
        schema
    }

    /// Lift an object property schema to the top level.
    pub fn from_object(schema: PropertySchema) -> Self {
        Self::new(schema.properties, schema.required)
    }

    /// Drop `required` names that have no property.
    pub fn normalize_required(&mut self) {
        let properties = &self.properties;
        self.required.retain(|name| properties.contains(name));
    }

    pub fn is_required(&self, name: &str) -> bool {
        self.required.iter().any(|required| required == name)
    }

    /// The schema as a JSON value with `required` always present, the shape
    /// chat endpoints expect for function parameters.
    pub fn to_wire(&self) -> Value {
        json!({
            "type": self.schema_type.as_str(),
            "properties": self.properties,
            "required": self.required,
        })
    }
}

/// A tool descriptor: what the chat capability sees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSchema {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub input_schema: InputSchema,
    #[serde(default)]
    pub positional: bool,
}

impl ToolSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: InputSchema) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            positional: false,
        }
    }

    pub fn positional(mut self, positional: bool) -> Self {
        self.positional = positional;
        self
    }

    /// Declared parameter order, used to spread positional arguments.
    pub fn param_order(&self) -> Vec<String> {
        self.input_schema
            .properties
            .names()
            .map(str::to_string)
            .collect()
    }

    /// Descriptor in the `{name, description, inputSchema}` wire shape.
    pub fn to_wire(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema.to_wire(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn properties_keep_declaration_order() {
        let mut properties = Properties::new();
        properties.insert("zeta", PropertySchema::string());
        properties.insert("alpha", PropertySchema::of_type(SchemaType::Number));
        let schema = InputSchema::new(properties, vec!["zeta".into(), "ghost".into()]);

        let text = serde_json::to_string(&schema).unwrap();
        assert_eq!(
            text,
            r#"{"type":"object","properties":{"zeta":{"type":"string"},"alpha":{"type":"number"}},"required":["zeta"]}"#
        );

        let back: InputSchema = serde_json::from_str(&text).unwrap();
        assert_eq!(back, schema);
    }

    #[test]
    fn enum_type_is_inferred_from_literals() {
        assert_eq!(
            PropertySchema::enumeration(vec![json!(1), json!(2)]).schema_type,
            Some(SchemaType::Number)
        );
        assert_eq!(
            PropertySchema::enumeration(vec![json!("a"), json!(2)]).schema_type,
            Some(SchemaType::String)
        );
    }
}
