// src/llm/schema.rs
//! Strict structured-output schemas, adapted from rootsignal's ai-client
//! (`openai/schema.rs`), plus a runtime string-enum injector.

use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::ResponseSchema;

/// Types usable as strict structured output.
///
/// Automatically implemented for any type that implements `JsonSchema + DeserializeOwned`.
pub trait StructuredOutput: JsonSchema + DeserializeOwned {
    /// Strict-mode schema:
    /// 1. `additionalProperties: false` on all object schemas
    /// 2. ALL properties listed in `required`
    /// 3. Fully inlined (no `$ref`)
    fn strict_schema() -> Value {
        let schema = schema_for!(Self);
        let mut value = serde_json::to_value(schema).unwrap_or_default();

        fix_object_schemas(&mut value);
        inline_refs(&mut value);

        if let Value::Object(map) = &mut value {
            map.remove("definitions");
            map.remove("$schema");
            map.remove("title");
        }

        value
    }

    fn response_schema() -> ResponseSchema {
        ResponseSchema {
            name: <Self as JsonSchema>::schema_name(),
            schema: Self::strict_schema(),
        }
    }
}

impl<T: JsonSchema + DeserializeOwned> StructuredOutput for T {}

/// Constrain a top-level `array<string>` property to a runtime vocabulary.
pub fn with_string_enum(mut schema: Value, property: &str, values: &[String]) -> Value {
    if let Some(items) = schema
        .get_mut("properties")
        .and_then(|p| p.get_mut(property))
        .and_then(|p| p.get_mut("items"))
        .and_then(Value::as_object_mut)
    {
        items.insert(
            "enum".to_string(),
            Value::Array(values.iter().cloned().map(Value::String).collect()),
        );
    }
    schema
}

/// Parse model output, tolerating a ```json fence around the object.
pub fn parse_structured<T: DeserializeOwned>(text: &str) -> Result<T, serde_json::Error> {
    let t = text.trim();
    let t = t
        .strip_prefix("```json")
        .or_else(|| t.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .unwrap_or(t);
    serde_json::from_str(t.trim())
}

fn fix_object_schemas(value: &mut Value) {
    if let Value::Object(map) = value {
        if map.get("type") == Some(&Value::String("object".to_string())) {
            map.insert("additionalProperties".to_string(), Value::Bool(false));

            if let Some(Value::Object(props)) = map.get("properties") {
                let all_keys: Vec<Value> = props.keys().map(|k| Value::String(k.clone())).collect();
                map.insert("required".to_string(), Value::Array(all_keys));
            }
        }

        for (_, v) in map.iter_mut() {
            fix_object_schemas(v);
        }
    } else if let Value::Array(arr) = value {
        for item in arr.iter_mut() {
            fix_object_schemas(item);
        }
    }
}

fn inline_refs(value: &mut Value) {
    let definitions = if let Value::Object(map) = value {
        map.get("definitions").cloned()
    } else {
        None
    };

    if let Some(defs) = definitions {
        inline_refs_recursive(value, &defs);
    }
}

fn inline_refs_recursive(value: &mut Value, definitions: &Value) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(ref_path)) = map.get("$ref").cloned() {
                if let Some(type_name) = ref_path.strip_prefix("#/definitions/") {
                    if let Some(def) = definitions.get(type_name) {
                        *value = def.clone();
                        inline_refs_recursive(value, definitions);
                        return;
                    }
                }
            }

            if let Some(Value::Array(all_of)) = map.get("allOf").cloned() {
                if all_of.len() == 1 {
                    if let Some(only) = all_of.into_iter().next() {
                        *value = only;
                        inline_refs_recursive(value, definitions);
                        return;
                    }
                }
            }

            for (_, v) in map.iter_mut() {
                inline_refs_recursive(v, definitions);
            }
        }
        Value::Array(arr) => {
            for item in arr.iter_mut() {
                inline_refs_recursive(item, definitions);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize, JsonSchema)]
    #[allow(dead_code)]
    enum Tone {
        Calm,
        Loud,
    }

    #[derive(Deserialize, JsonSchema)]
    #[allow(dead_code)]
    struct Sample {
        text: String,
        tags: Vec<String>,
        tone: Tone,
        note: Option<String>,
    }

    #[test]
    fn strict_schema_inlines_and_requires_everything() {
        let s = Sample::strict_schema();
        assert_eq!(s["additionalProperties"], Value::Bool(false));
        assert_eq!(s["required"].as_array().unwrap().len(), 4);
        assert!(s.get("definitions").is_none());
        assert!(!s.to_string().contains("$ref"));
        assert_eq!(s["properties"]["tone"]["enum"], serde_json::json!(["Calm", "Loud"]));
    }

    #[test]
    fn vocabulary_enum_lands_on_array_items() {
        let s = with_string_enum(Sample::strict_schema(), "tags", &["AI".into(), "NHS".into()]);
        assert_eq!(s["properties"]["tags"]["items"]["enum"], serde_json::json!(["AI", "NHS"]));
    }

    #[test]
    fn fenced_json_parses() {
        let v: serde_json::Value = parse_structured("```json\n{\"a\":1}\n```").unwrap();
        assert_eq!(v["a"], 1);
    }
}
