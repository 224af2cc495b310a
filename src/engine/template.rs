use serde_json::{Map, Value};
use tracing::warn;

use crate::domain::{fields, CaseRecord, ReplaceRule};
use crate::error::CaseError;

/// Replace `{{key}}` placeholders in a string.
fn interpolate(input: &str, key: &str, value: &str) -> String {
    input.replace(&format!("{{{{{key}}}}}"), value)
}

fn render(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

pub fn replace_rules(case: &CaseRecord) -> Result<Vec<ReplaceRule>, CaseError> {
    let Some(raw) = case.get(fields::REPLACE_MAPS) else {
        return Ok(Vec::new());
    };
    serde_json::from_value(raw.clone()).map_err(|err| {
        CaseError::Configuration(format!(
            "Property '{}' must be a list of {{propertyName, replaceValue}} rules: {err}",
            fields::REPLACE_MAPS
        ))
    })
}

/// Runs only the rules targeting `skipTest`, then reports the skip flag.
/// Nothing else on the case is touched, so skip is decided before any
/// request building happens.
pub fn resolve_skip(case: &mut CaseRecord) -> Result<bool, CaseError> {
    for rule in replace_rules(case)? {
        if rule.property_name == fields::SKIP_TEST {
            apply_rule(case, &rule);
        }
    }
    Ok(case.flag(fields::SKIP_TEST))
}

/// Runs every remaining rule in declaration order.
pub fn apply_substitutions(case: &mut CaseRecord) -> Result<(), CaseError> {
    for rule in replace_rules(case)? {
        if rule.property_name != fields::SKIP_TEST {
            apply_rule(case, &rule);
        }
    }
    Ok(())
}

/// Text destinations get `{{source}}` substituted in place; anything else is
/// overwritten with a structural copy of the source value.
fn apply_rule(case: &mut CaseRecord, rule: &ReplaceRule) {
    let Some(source) = case.lookup(&rule.replace_value).cloned() else {
        warn!(
            case = %case.id(),
            source = %rule.replace_value,
            "replace rule source is unset, leaving `{}` untouched",
            rule.property_name
        );
        return;
    };

    let replacement = match case.lookup(&rule.property_name) {
        Some(Value::String(text)) => {
            Value::String(interpolate(text, &rule.replace_value, &render(&source)))
        }
        _ => source,
    };

    if !case.assign(&rule.property_name, replacement) {
        warn!(
            case = %case.id(),
            "replace rule destination `{}` cannot be written",
            rule.property_name
        );
    }
}

/// Copies session values named by `sessionHeaders` into `httpHeaders`.
pub fn apply_session_headers(case: &mut CaseRecord) -> Result<(), CaseError> {
    let Some(Value::Object(mapping)) = case.get(fields::SESSION_HEADERS).cloned() else {
        return Ok(());
    };

    let mut headers = match case.get(fields::HTTP_HEADERS) {
        None => Map::new(),
        Some(Value::Object(existing)) => existing.clone(),
        Some(_) => {
            return Err(CaseError::Configuration(format!(
                "Property '{}' must be a mapping.",
                fields::HTTP_HEADERS
            )))
        }
    };

    for (header, path) in mapping {
        let Some(path) = path.as_str() else {
            return Err(CaseError::Configuration(format!(
                "Session header `{header}` must name a source path."
            )));
        };
        match case.lookup(path) {
            Some(value) => {
                headers.insert(header, Value::String(render(value)));
            }
            None => warn!(case = %case.id(), "session value `{path}` for header `{header}` is unset"),
        }
    }

    case.set(fields::HTTP_HEADERS, Value::Object(headers));
    Ok(())
}
