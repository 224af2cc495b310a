use std::collections::VecDeque;

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::domain::{fields, CaseRecord, DefaultValueRecord};
use crate::engine::defaults::apply_defaults;
use crate::error::ExpansionError;

/// Largest `parallel` or `repeats` count a case may ask for.
pub const MAX_DIRECTIVE_COUNT: u64 = 10_000;

/// One unit of the execution plan.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// A concrete case, run to completion before the next step starts.
    Run(CaseRecord),
    /// Independent branches run concurrently; the step completes when every
    /// branch has.
    FanOut(Vec<Vec<Step>>),
}

/// Turns a case tree (one case object or a list of them) into a plan.
///
/// The input is never mutated: every case is cloned before its directives
/// are consumed, so expanding the same tree twice yields two independent
/// plans with distinct markers.
pub fn expand(tree: &Value) -> Result<Vec<Step>, ExpansionError> {
    expand_with_defaults(tree, &DefaultValueRecord::default())
}

/// Like [`expand`], with the default record merged into every top-level case
/// before its directives are read. Clones inherit the merged fields, so a
/// defaulted `repeats`, `skipTest` or `queryString` reaches each of them.
pub fn expand_with_defaults(
    tree: &Value,
    defaults: &DefaultValueRecord,
) -> Result<Vec<Step>, ExpansionError> {
    let mut cases = match tree {
        Value::Object(map) => VecDeque::from([CaseRecord::from_map(map.clone())]),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(index, item)| match item {
                Value::Object(map) => Ok(CaseRecord::from_map(map.clone())),
                other => Err(ExpansionError::NotACase {
                    index,
                    found: kind(other),
                }),
            })
            .collect::<Result<VecDeque<_>, _>>()?,
        other => {
            return Err(ExpansionError::NotACaseTree {
                found: kind(other),
            })
        }
    };

    for case in cases.iter_mut() {
        apply_defaults(case, defaults);
    }
    expand_cases(cases)
}

/// Number of concrete cases in a plan.
pub fn case_count(steps: &[Step]) -> usize {
    steps
        .iter()
        .map(|step| match step {
            Step::Run(_) => 1,
            Step::FanOut(branches) => branches.iter().map(|branch| case_count(branch)).sum(),
        })
        .sum()
}

fn expand_cases(mut pending: VecDeque<CaseRecord>) -> Result<Vec<Step>, ExpansionError> {
    let mut steps = Vec::new();

    while let Some(mut item) = pending.pop_front() {
        let parallel = take_directive(&mut item, fields::PARALLEL)?;
        if parallel >= 2 {
            // `repeats` stays on the clones; each branch expands it on its own.
            let branches = (0..parallel)
                .map(|index| expand_cases(VecDeque::from([parallel_clone(&item, index)])))
                .collect::<Result<Vec<_>, _>>()?;
            steps.push(Step::FanOut(branches));
            continue;
        }

        let repeats = take_directive(&mut item, fields::REPEATS)?;
        if repeats >= 2 {
            for number in (1..=repeats).rev() {
                pending.push_front(repeat_clone(&item, number));
            }
            continue;
        }

        steps.push(Step::Run(item));
    }

    Ok(steps)
}

/// Removes a directive from the case and returns its count (0 when unset).
fn take_directive(case: &mut CaseRecord, directive: &'static str) -> Result<u64, ExpansionError> {
    let Some(value) = case.remove(directive) else {
        return Ok(0);
    };

    let count = match &value {
        Value::Null => Some(0),
        Value::Number(number) => number.as_u64().or_else(|| {
            number
                .as_f64()
                .filter(|float| *float >= 0.0 && float.fract() == 0.0)
                .map(|float| float as u64)
        }),
        _ => None,
    };

    count
        .filter(|count| *count <= MAX_DIRECTIVE_COUNT)
        .ok_or_else(|| ExpansionError::MalformedDirective {
            id: case.id().to_string(),
            directive,
            value: value.to_string(),
        })
}

fn parallel_clone(template: &CaseRecord, index: u64) -> CaseRecord {
    let mut clone = template.clone();
    let marker = fresh_marker();
    set_query_marker(&mut clone, "llid", &marker);
    clone.append_tag(fields::ID, &format!("parallel={index} llid={marker}"));
    clone.append_tag(fields::DESCRIPTION, &format!("llid={marker}"));
    clone
}

fn repeat_clone(template: &CaseRecord, number: u64) -> CaseRecord {
    let mut clone = template.clone();
    let marker = fresh_marker();
    set_query_marker(&mut clone, "uuid", &marker);
    clone.append_tag(fields::ID, &format!("repeat={number} uuid={marker}"));
    clone.append_tag(fields::DESCRIPTION, &format!("uuid={marker}"));
    clone
}

/// A list-shaped `queryString` is left alone here; the executor rejects it.
fn set_query_marker(case: &mut CaseRecord, key: &str, marker: &str) {
    match case.get_mut(fields::QUERY_STRING) {
        Some(Value::Object(query)) => {
            query.insert(key.to_string(), Value::String(marker.to_string()));
        }
        Some(_) => {}
        None => {
            let mut query = Map::new();
            query.insert(key.to_string(), Value::String(marker.to_string()));
            case.set(fields::QUERY_STRING, Value::Object(query));
        }
    }
}

fn fresh_marker() -> String {
    let mut marker = Uuid::new_v4().simple().to_string();
    marker.truncate(8);
    marker
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
