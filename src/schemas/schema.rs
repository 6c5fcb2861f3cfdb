use crate::schemas::tool_schema::{InputSchema, Properties, PropertySchema, SchemaType};
use schemars::{gen::SchemaSettings, JsonSchema};
use serde_json::{Map, Value};
use std::any::type_name;

const MAX_REF_DEPTH: usize = 8;

/// Input schema for a `JsonSchema` parameter struct.
///
/// Definitions are inlined and nullable members collapse to their inner type,
/// so the result stays within the subset chat endpoints accept.
pub fn input_schema_for<T: JsonSchema>() -> InputSchema {
    let settings = SchemaSettings::draft07().with(|s| {
        s.option_nullable = false;
        s.option_add_null_type = false;
    });
    let root = settings.into_generator().into_root_schema_for::<T>();
    let json = serde_json::to_value(root).unwrap_or(Value::Null);
    let definitions = json
        .get("definitions")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let property = PropertySchema::from_json_schema(&json, &definitions);
    if property.is_object() {
        InputSchema::from_object(property)
    } else {
        InputSchema::default()
    }
}

impl PropertySchema {
    /// Convert a draft-07 schema fragment, resolving `#/definitions/` refs.
    pub fn from_json_schema(schema: &Value, definitions: &Map<String, Value>) -> Self {
        convert(schema, definitions, 0)
    }
}

fn convert(schema: &Value, definitions: &Map<String, Value>, depth: usize) -> PropertySchema {
    let Some(object) = schema.as_object() else {
        return PropertySchema::default();
    };
    if depth > MAX_REF_DEPTH {
        return PropertySchema::object();
    }

    let description = object
        .get("description")
        .and_then(Value::as_str)
        .map(str::to_string);

    if let Some(reference) = object.get("$ref").and_then(Value::as_str) {
        let name = reference.trim_start_matches("#/definitions/");
        let mut resolved = definitions
            .get(name)
            .map(|target| convert(target, definitions, depth + 1))
            .unwrap_or_else(PropertySchema::object);
        if description.is_some() {
            resolved.description = description;
        }
        return resolved;
    }

    for combinator in ["allOf", "anyOf", "oneOf"] {
        if let Some(variants) = object.get(combinator).and_then(Value::as_array) {
            let non_null: Vec<&Value> = variants
                .iter()
                .filter(|variant| variant.get("type").and_then(Value::as_str) != Some("null"))
                .collect();
            let mut merged = match non_null.as_slice() {
                [single] => convert(single, definitions, depth + 1),
                _ => merge_enum_variants(&non_null, definitions, depth),
            };
            if description.is_some() {
                merged.description = description;
            }
            if let Some(default) = object.get("default") {
                merged.default = Some(default.clone());
            }
            return merged;
        }
    }

    let schema_type = match object.get("type") {
        Some(Value::String(name)) => parse_type(name),
        Some(Value::Array(names)) => names
            .iter()
            .filter_map(Value::as_str)
            .filter(|name| *name != "null")
            .find_map(parse_type),
        _ => None,
    };

    let mut property = PropertySchema {
        schema_type,
        description,
        enum_values: object.get("enum").and_then(Value::as_array).map(|values| {
            values.iter().filter(|value| !value.is_null()).cloned().collect()
        }),
        default: object.get("default").cloned(),
        pattern: object
            .get("pattern")
            .and_then(Value::as_str)
            .map(str::to_string),
        ..PropertySchema::default()
    };

    if property.schema_type.is_none() {
        if let Some(values) = &property.enum_values {
            property.schema_type = PropertySchema::enumeration(values.clone()).schema_type;
        }
    }

    if let Some(items) = object.get("items") {
        if items.is_object() {
            property.items = Some(Box::new(convert(items, definitions, depth + 1)));
        }
    }

    if let Some(members) = object.get("properties").and_then(Value::as_object) {
        property.properties = members
            .iter()
            .map(|(name, member)| (name.clone(), convert(member, definitions, depth + 1)))
            .collect::<Properties>();
        property.required = object
            .get("required")
            .and_then(Value::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
    }

    property
}

/// schemars renders documented unit-variant enums as `oneOf` of single-value
/// enums; fold them back into one enum.
fn merge_enum_variants(variants: &[&Value], definitions: &Map<String, Value>, depth: usize) -> PropertySchema {
    let mut values = Vec::new();
    for variant in variants {
        let converted = convert(variant, definitions, depth + 1);
        match converted.enum_values {
            Some(literals) => values.extend(literals),
            None => return PropertySchema::object(),
        }
    }
    if values.is_empty() {
        PropertySchema::object()
    } else {
        PropertySchema::enumeration(values)
    }
}

fn parse_type(name: &str) -> Option<SchemaType> {
    match name {
        "string" => Some(SchemaType::String),
        "number" => Some(SchemaType::Number),
        "integer" => Some(SchemaType::Integer),
        "boolean" => Some(SchemaType::Boolean),
        "array" => Some(SchemaType::Array),
        "object" => Some(SchemaType::Object),
        _ => None,
    }
}

/// Helper so callers can retrieve the Rust type name of a parameter struct.
pub fn schema_type_name<T>() -> &'static str {
    type_name::<T>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[allow(dead_code)]
    #[derive(Deserialize, JsonSchema)]
    #[serde(rename_all = "lowercase")]
    enum Unit {
        Celsius,
        Fahrenheit,
    }

    #[allow(dead_code)]
    #[derive(Deserialize, JsonSchema)]
    struct Forecast {
        /// City to look up
        city: String,
        days: Option<u8>,
        unit: Unit,
        tags: Vec<String>,
    }

    #[test]
    fn typed_struct_becomes_input_schema() {
        let schema = input_schema_for::<Forecast>();
        assert_eq!(
            schema.properties.names().collect::<Vec<_>>(),
            ["city", "days", "unit", "tags"]
        );
        assert!(schema.is_required("city"));
        assert!(!schema.is_required("days"));

        let city = schema.properties.get("city").unwrap();
        assert_eq!(city.description.as_deref(), Some("City to look up"));
        assert_eq!(
            schema.properties.get("days").unwrap().schema_type,
            Some(SchemaType::Integer)
        );

        let unit = schema.properties.get("unit").unwrap();
        assert_eq!(unit.schema_type, Some(SchemaType::String));
        assert_eq!(
            unit.enum_values.as_deref(),
            Some(&[Value::from("celsius"), Value::from("fahrenheit")][..])
        );

        let tags = schema.properties.get("tags").unwrap();
        assert_eq!(tags.items.as_ref().unwrap().schema_type, Some(SchemaType::String));
    }
}
