use agentic_tools::{
    error::Constraint,
    schemas::{param_spec::parse_params, SchemaType},
    AgentError, ToolRecord,
};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize, JsonSchema)]
struct ComplexParams {
    /// A required string field
    name: String,
    /// A required integer
    age: u32,
    /// An optional email address
    #[serde(default)]
    email: Option<String>,
    /// A nested optional object
    #[serde(default)]
    address: Option<Address>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[allow(dead_code)]
struct Address {
    street: String,
    city: String,
    #[serde(default)]
    zip_code: Option<String>,
}

fn complex_tool() -> ToolRecord {
    ToolRecord::typed(
        "complex_tool",
        "A tool with complex nested parameters",
        |params: ComplexParams| async move {
            Ok(json!({
                "name": params.name,
                "age": params.age,
                "email": params.email,
                "has_address": params.address.is_some()
            }))
        },
    )
}

fn validation_error(err: AgentError) -> agentic_tools::ValidationError {
    match err {
        AgentError::Validation(validation) => validation,
        other => panic!("expected a validation error, got {other}"),
    }
}

#[test]
fn test_schema_has_correct_structure() {
    let schema = complex_tool().schema.input_schema.to_wire();

    assert_eq!(schema["type"], "object");
    let props = schema["properties"].as_object().unwrap();
    assert!(props.contains_key("name"));
    assert!(props.contains_key("age"));
    assert!(props.contains_key("email"));
    assert!(props.contains_key("address"));

    assert_eq!(props["name"]["type"], "string");
    assert_eq!(props["age"]["type"], "integer");
    let mut required: Vec<&str> = schema["required"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|name| name.as_str())
        .collect();
    required.sort();
    assert_eq!(required, ["age", "name"]);
}

#[test]
fn test_optional_and_nested_members_are_inlined() {
    let record = complex_tool();
    let props = &record.schema.input_schema.properties;

    assert_eq!(props.get("email").unwrap().schema_type, Some(SchemaType::String));
    assert_eq!(
        props.get("email").unwrap().description.as_deref(),
        Some("An optional email address")
    );

    let wire = record.schema.to_wire();
    let address = &wire["inputSchema"]["properties"]["address"];
    assert_eq!(address["type"], "object");
    assert!(address.get("$ref").is_none());
    assert_eq!(address["properties"]["city"]["type"], "string");
}

#[tokio::test]
async fn test_complex_tool_execution() {
    let result = complex_tool()
        .invoke(json!({
            "name": "Alice",
            "age": 30,
            "email": "alice@example.com",
            "address": {
                "street": "123 Main St",
                "city": "Springfield"
            }
        }))
        .await
        .unwrap();
    assert_eq!(result["name"], "Alice");
    assert_eq!(result["age"], 30);
    assert_eq!(result["has_address"], true);
}

#[tokio::test]
async fn test_schema_failures_name_the_field() {
    let record = complex_tool();

    let missing = validation_error(record.invoke(json!({"age": 3})).await.unwrap_err());
    assert_eq!(missing.field, "name");
    assert_eq!(missing.constraint, Constraint::Required);

    let wrong_type = validation_error(
        record
            .invoke(json!({"name": "Bob", "age": "old"}))
            .await
            .unwrap_err(),
    );
    assert_eq!(wrong_type.field, "age");
    assert_eq!(wrong_type.constraint, Constraint::Type);
}

#[test]
fn test_param_set_validation_fills_defaults_and_drops_unknown_keys() {
    let params = parse_params(&[
        "city!@City name",
        "days:int=3",
        "tags:string[]",
        "unit:{c,f}=c",
    ])
    .unwrap();

    let args = json!({"city": "Oslo", "extra": true, "tags": ["a", "b"]});
    let checked = params.validate(args.as_object().unwrap()).unwrap();
    assert_eq!(
        serde_json::Value::Object(checked),
        json!({"city": "Oslo", "days": 3, "tags": ["a", "b"], "unit": "c"})
    );

    let bad_items = params
        .validate(json!({"city": "Oslo", "tags": [1]}).as_object().unwrap())
        .unwrap_err();
    assert_eq!(bad_items.field, "tags[0]");
    assert_eq!(bad_items.constraint, Constraint::Items);

    let bad_enum = params
        .validate(json!({"city": "Oslo", "unit": "k"}).as_object().unwrap())
        .unwrap_err();
    assert_eq!(bad_enum.field, "unit");
    assert_eq!(bad_enum.constraint, Constraint::Enum);
}

#[test]
fn test_malformed_regex_is_fatal() {
    let err = parse_params(&["code:/([a-z/"]).unwrap_err();
    assert_eq!(err.error_code(), "SPEC_PARSE_ERROR");
}
