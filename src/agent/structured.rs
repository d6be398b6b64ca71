//! Structured output forcing
//!
//! A declared result schema is offered to the model as one extra tool. The
//! first request forces that tool; later requests leave the choice to the
//! model. Whatever arguments come back are checked against the schema
//! before they reach the caller.

use serde_json::{Map, Value};

use crate::core::{AgentError, Result, ToolCall, ToolSchema};
use crate::llm::ToolChoice;

/// Declared shape of a run's result
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredOutputSpec {
    /// Name of the synthetic tool, usually the result type's name
    pub result_type_name: String,
    /// JSON Schema of the result
    pub schema: Value,
}

impl StructuredOutputSpec {
    pub fn new(result_type_name: impl Into<String>, schema: Value) -> Self {
        Self {
            result_type_name: result_type_name.into(),
            schema,
        }
    }
}

/// Turns a result spec into a forced tool and validates what the model sends back
#[derive(Debug, Clone)]
pub struct StructuredOutputBroker {
    spec: StructuredOutputSpec,
}

impl StructuredOutputBroker {
    pub fn new(spec: StructuredOutputSpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> &StructuredOutputSpec {
        &self.spec
    }

    pub fn tool_name(&self) -> &str {
        &self.spec.result_type_name
    }

    /// The synthetic tool offered alongside the registry's tools
    pub fn tool_schema(&self) -> ToolSchema {
        let description = self
            .spec
            .schema
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Structured output: {}", self.spec.result_type_name));

        ToolSchema::new(
            self.spec.result_type_name.clone(),
            description,
            self.spec.schema.clone(),
        )
    }

    /// Choice for the first request of a run
    pub fn initial_choice(&self) -> ToolChoice {
        ToolChoice::Named(self.spec.result_type_name.clone())
    }

    /// Whether this call carries the result
    pub fn is_result_call(&self, call: &ToolCall) -> bool {
        call.name == self.spec.result_type_name
    }

    /// First call in the batch that carries the result
    pub fn find_result_call<'a>(&self, calls: &'a [ToolCall]) -> Option<&'a ToolCall> {
        calls.iter().find(|call| self.is_result_call(call))
    }

    /// Check the model's arguments against the schema
    pub fn validate(&self, arguments: &Value) -> Result<Value> {
        validate_against_schema(&self.spec.schema, arguments).map_err(|e| {
            AgentError::validation(format!("{}: {}", self.spec.result_type_name, e))
        })?;
        Ok(arguments.clone())
    }
}

/// Validate a value against a JSON Schema.
///
/// Supports the keywords generated for plain data types: `type`,
/// `properties`, `required`, `additionalProperties: false`, `enum`, `const`,
/// `items`, numeric and length bounds, `anyOf`/`oneOf`/`allOf`, and local
/// `$ref`s into `$defs` or `definitions`. Unknown keywords are ignored.
pub fn validate_against_schema(schema: &Value, value: &Value) -> std::result::Result<(), String> {
    Validator { root: schema }.check(schema, value, "$", 0)
}

/// `$ref`s followed in a row against the same value. Reset on descending
/// into a property or item, so only non-advancing cycles hit it.
const MAX_REF_DEPTH: usize = 32;

struct Validator<'a> {
    root: &'a Value,
}

impl<'a> Validator<'a> {
    fn check(
        &self,
        schema: &'a Value,
        value: &Value,
        path: &str,
        depth: usize,
    ) -> std::result::Result<(), String> {
        let schema = match schema {
            Value::Bool(true) => return Ok(()),
            Value::Bool(false) => return Err(format!("{}: no value is allowed here", path)),
            Value::Object(map) => map,
            _ => return Ok(()),
        };

        if let Some(reference) = schema.get("$ref").and_then(Value::as_str) {
            if depth >= MAX_REF_DEPTH {
                return Err(format!("{}: $ref nesting too deep", path));
            }
            let target = self.resolve(reference)?;
            self.check(target, value, path, depth + 1)?;
        }

        if let Some(expected) = schema.get("type") {
            if !type_matches(expected, value) {
                return Err(format!(
                    "{}: expected type {}, got {}",
                    path,
                    expected,
                    type_name(value)
                ));
            }
        }

        if let Some(options) = schema.get("enum").and_then(Value::as_array) {
            if !options.contains(value) {
                return Err(format!("{}: {} is not one of {}", path, value, Value::Array(options.clone())));
            }
        }

        if let Some(constant) = schema.get("const") {
            if constant != value {
                return Err(format!("{}: expected {}", path, constant));
            }
        }

        match value {
            Value::Object(object) => self.check_object(schema, object, path)?,
            Value::Array(items) => self.check_array(schema, items, path)?,
            Value::String(s) => check_length(schema, s.chars().count(), path)?,
            Value::Number(n) => {
                if let Some(n) = n.as_f64() {
                    check_bounds(schema, n, path)?;
                }
            }
            _ => {}
        }

        if let Some(branches) = schema.get("anyOf").and_then(Value::as_array) {
            if !branches
                .iter()
                .any(|branch| self.check(branch, value, path, depth + 1).is_ok())
            {
                return Err(format!("{}: does not match any allowed schema", path));
            }
        }

        if let Some(branches) = schema.get("oneOf").and_then(Value::as_array) {
            let matched = branches
                .iter()
                .filter(|branch| self.check(branch, value, path, depth + 1).is_ok())
                .count();
            if matched != 1 {
                return Err(format!(
                    "{}: must match exactly one schema, matched {}",
                    path, matched
                ));
            }
        }

        if let Some(branches) = schema.get("allOf").and_then(Value::as_array) {
            for branch in branches {
                self.check(branch, value, path, depth + 1)?;
            }
        }

        Ok(())
    }

    fn check_object(
        &self,
        schema: &'a Map<String, Value>,
        object: &Map<String, Value>,
        path: &str,
    ) -> std::result::Result<(), String> {
        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            for key in required.iter().filter_map(Value::as_str) {
                if !object.contains_key(key) {
                    return Err(format!("{}: missing required field '{}'", path, key));
                }
            }
        }

        let properties = schema.get("properties").and_then(Value::as_object);
        for (key, item) in object {
            let item_path = format!("{}.{}", path, key);
            match properties.and_then(|p| p.get(key)) {
                Some(property) => self.check(property, item, &item_path, 0)?,
                None => match schema.get("additionalProperties") {
                    Some(Value::Bool(false)) => {
                        return Err(format!("{}: unexpected field '{}'", path, key));
                    }
                    Some(extra @ Value::Object(_)) => {
                        self.check(extra, item, &item_path, 0)?
                    }
                    _ => {}
                },
            }
        }
        Ok(())
    }

    fn check_array(
        &self,
        schema: &'a Map<String, Value>,
        items: &[Value],
        path: &str,
    ) -> std::result::Result<(), String> {
        check_count(schema, "minItems", "maxItems", items.len(), path)?;
        if let Some(item_schema) = schema.get("items") {
            for (i, item) in items.iter().enumerate() {
                self.check(item_schema, item, &format!("{}[{}]", path, i), 0)?;
            }
        }
        Ok(())
    }

    /// Resolve `#/$defs/Name` or `#/definitions/Name` against the root schema
    fn resolve(&self, reference: &str) -> std::result::Result<&'a Value, String> {
        let pointer = reference
            .strip_prefix('#')
            .ok_or_else(|| format!("unsupported $ref '{}'", reference))?;
        if pointer.is_empty() {
            return Ok(self.root);
        }
        self.root
            .pointer(pointer)
            .ok_or_else(|| format!("unresolved $ref '{}'", reference))
    }
}

fn type_matches(expected: &Value, value: &Value) -> bool {
    match expected {
        Value::String(name) => single_type_matches(name, value),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .any(|name| single_type_matches(name, value)),
        _ => true,
    }
}

fn single_type_matches(name: &str, value: &Value) -> bool {
    match name {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "number" => value.is_number(),
        "integer" => match value {
            Value::Number(n) => {
                n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            _ => false,
        },
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn check_bounds(schema: &Map<String, Value>, n: f64, path: &str) -> std::result::Result<(), String> {
    if let Some(min) = schema.get("minimum").and_then(Value::as_f64) {
        if n < min {
            return Err(format!("{}: {} is less than minimum {}", path, n, min));
        }
    }
    if let Some(max) = schema.get("maximum").and_then(Value::as_f64) {
        if n > max {
            return Err(format!("{}: {} is greater than maximum {}", path, n, max));
        }
    }
    if let Some(min) = schema.get("exclusiveMinimum").and_then(Value::as_f64) {
        if n <= min {
            return Err(format!("{}: {} must be greater than {}", path, n, min));
        }
    }
    if let Some(max) = schema.get("exclusiveMaximum").and_then(Value::as_f64) {
        if n >= max {
            return Err(format!("{}: {} must be less than {}", path, n, max));
        }
    }
    Ok(())
}

fn check_length(schema: &Map<String, Value>, len: usize, path: &str) -> std::result::Result<(), String> {
    check_count(schema, "minLength", "maxLength", len, path)
}

fn check_count(
    schema: &Map<String, Value>,
    min_key: &str,
    max_key: &str,
    count: usize,
    path: &str,
) -> std::result::Result<(), String> {
    let count = count as u64;
    if let Some(min) = schema.get(min_key).and_then(Value::as_u64) {
        if count < min {
            return Err(format!("{}: length {} is below {} {}", path, count, min_key, min));
        }
    }
    if let Some(max) = schema.get(max_key).and_then(Value::as_u64) {
        if count > max {
            return Err(format!("{}: length {} is above {} {}", path, count, max_key, max));
        }
    }
    Ok(())
}
