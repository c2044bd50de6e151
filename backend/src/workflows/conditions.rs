// Workflow Conditions - Decide whether a matched workflow should run for an event

use mint_shared::{Condition, ConditionGroup, ConditionLogic, ConditionOperator};
use serde_json::Value;

use super::executor::ExecutionContext;

/// Evaluate a condition group. Fields are dotted paths resolved like template
/// tokens; a missing or null field only satisfies the negative operators.
pub fn evaluate(group: &ConditionGroup, context: &ExecutionContext) -> bool {
    let mut results = group
        .conditions
        .iter()
        .map(|c| evaluate_condition(c, context))
        .chain(group.groups.iter().map(|g| evaluate(g, context)));

    match group.logic {
        ConditionLogic::And => results.all(|r| r),
        // An OR group with nothing in it places no restriction
        ConditionLogic::Or => group.is_empty() || results.any(|r| r),
    }
}

fn evaluate_condition(condition: &Condition, context: &ExecutionContext) -> bool {
    let field_value = context.lookup(&condition.field);
    let expected = &condition.value;

    match condition.operator {
        ConditionOperator::Equals => field_value.is_some_and(|v| loosely_equal(&v, expected)),
        ConditionOperator::NotEquals => !field_value.is_some_and(|v| loosely_equal(&v, expected)),
        ConditionOperator::Contains => text_test(field_value.as_ref(), expected, |s, p| s.contains(p)),
        ConditionOperator::NotContains => !text_test(field_value.as_ref(), expected, |s, p| s.contains(p)),
        ConditionOperator::StartsWith => text_test(field_value.as_ref(), expected, |s, p| s.starts_with(p)),
        ConditionOperator::EndsWith => text_test(field_value.as_ref(), expected, |s, p| s.ends_with(p)),
        ConditionOperator::GreaterThan => compare(field_value.as_ref(), expected, |a, b| a > b),
        ConditionOperator::GreaterThanOrEquals => compare(field_value.as_ref(), expected, |a, b| a >= b),
        ConditionOperator::LessThan => compare(field_value.as_ref(), expected, |a, b| a < b),
        ConditionOperator::LessThanOrEquals => compare(field_value.as_ref(), expected, |a, b| a <= b),
        ConditionOperator::In => in_list(field_value.as_ref(), expected),
        ConditionOperator::NotIn => !in_list(field_value.as_ref(), expected),
        ConditionOperator::IsNull => field_value.is_none(),
        ConditionOperator::IsNotNull => field_value.is_some(),
        ConditionOperator::IsEmpty => field_value.as_ref().is_none_or(is_empty),
        ConditionOperator::IsNotEmpty => !field_value.as_ref().is_none_or(is_empty),
        ConditionOperator::IsTrue => field_value.is_some_and(|v| v == Value::Bool(true)),
        ConditionOperator::IsFalse => field_value.is_some_and(|v| v == Value::Bool(false)),
    }
}

/// Strings compare case-insensitively, numbers by value
fn loosely_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::String(a), Value::String(b)) => a.eq_ignore_ascii_case(b),
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => actual == expected,
    }
}

fn text_test(actual: Option<&Value>, pattern: &Value, test: impl Fn(&str, &str) -> bool) -> bool {
    match (actual.and_then(Value::as_str), pattern.as_str()) {
        (Some(s), Some(p)) => test(&s.to_lowercase(), &p.to_lowercase()),
        _ => false,
    }
}

fn compare(actual: Option<&Value>, expected: &Value, test: impl Fn(f64, f64) -> bool) -> bool {
    match (actual.and_then(Value::as_f64), expected.as_f64()) {
        (Some(a), Some(b)) => test(a, b),
        _ => false,
    }
}

fn in_list(actual: Option<&Value>, list: &Value) -> bool {
    match (actual, list.as_array()) {
        (Some(v), Some(items)) => items.iter().any(|item| loosely_equal(v, item)),
        _ => false,
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
