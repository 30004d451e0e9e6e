//! JMESPath expressions (`${...}`) evaluated against request documents.

use jmespath::Variable;
use serde_json::Value;
use std::rc::Rc;

/// Extract the expression from a `${...}` string.
pub fn parse_expression(s: &str) -> Option<&str> {
    s.trim()
        .strip_prefix("${")
        .and_then(|s| s.strip_suffix('}'))
        .map(str::trim)
}

/// Check that an expression compiles.
pub fn validate_expression(expression: &str) -> Result<(), String> {
    jmespath::compile(expression)
        .map(|_| ())
        .map_err(|e| e.to_string())
}

/// Convert serde_json::Value to jmespath::Variable.
fn value_to_variable(value: &Value) -> Rc<Variable> {
    match value {
        Value::Null => Rc::new(Variable::Null),
        Value::Bool(b) => Rc::new(Variable::Bool(*b)),
        Value::Number(n) => Rc::new(Variable::Number(n.clone())),
        Value::String(s) => Rc::new(Variable::String(s.clone())),
        Value::Array(arr) => {
            let vars: Vec<Rc<Variable>> = arr.iter().map(value_to_variable).collect();
            Rc::new(Variable::Array(vars))
        }
        Value::Object(obj) => {
            let map: std::collections::BTreeMap<String, Rc<Variable>> = obj
                .iter()
                .map(|(k, v)| (k.clone(), value_to_variable(v)))
                .collect();
            Rc::new(Variable::Object(map))
        }
    }
}

/// JMESPath truthiness of a search result.
fn variable_is_truthy(var: &Variable) -> bool {
    match var {
        Variable::Bool(b) => *b,
        Variable::Null => false,
        Variable::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Variable::String(s) => !s.is_empty(),
        Variable::Array(a) => !a.is_empty(),
        Variable::Object(o) => !o.is_empty(),
        Variable::Expref(_) => false,
    }
}

/// Match data using a JMESPath expression.
///
/// Invalid expressions and evaluation errors are reported as `Err`.
pub fn match_with_jmespath(expression: &str, data: &Value) -> Result<bool, String> {
    let expr = jmespath::compile(expression).map_err(|e| e.to_string())?;
    let data_var = value_to_variable(data);
    let result = expr.search(&data_var).map_err(|e| e.to_string())?;
    Ok(variable_is_truthy(&result))
}
