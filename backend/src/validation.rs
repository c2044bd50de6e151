//! Request validation for the Mint API
//!
//! Collects every field problem before answering, so a client sees all of
//! them in one 422 response.

use crate::error::{AppError, ValidationBuilder};
use crate::workflows::{NewStep, NewWorkflow, StepConfig, StepUpdate, WorkflowUpdate};
use mint_shared::{ConditionGroup, ConditionOperator, StepKind, WorkflowStep};

/// Validation result type
pub type ValidationResult<T> = Result<T, AppError>;

pub const MAX_NAME_LENGTH: usize = 200;
pub const MAX_TRIGGER_EVENT_LENGTH: usize = 100;

/// Validator builder for complex validations
pub struct Validator {
    builder: ValidationBuilder,
}

impl Validator {
    pub fn new() -> Self {
        Self {
            builder: ValidationBuilder::new(),
        }
    }

    /// Add error for a field
    pub fn error(mut self, field: &str, message: &str) -> Self {
        self.builder = self.builder.error(field, message);
        self
    }

    /// Validate a required string: present, not blank, within `max` characters
    pub fn required_string(self, value: Option<&str>, field: &str, max: usize) -> Self {
        match value {
            Some(s) if s.trim().is_empty() => self.error(field, &format!("{} cannot be empty", field)),
            Some(s) => self.max_length(Some(s), field, max),
            None => self.error(field, &format!("{} is required", field)),
        }
    }

    /// Event names are matched exactly, so surrounding whitespace is an error rather than trimmed
    pub fn event_name(self, value: Option<&str>, field: &str) -> Self {
        match value {
            Some(s) if !s.trim().is_empty() && s.trim() != s => {
                self.error(field, &format!("{} must not start or end with whitespace", field))
            }
            _ => self.required_string(value, field, MAX_TRIGGER_EVENT_LENGTH),
        }
    }

    /// Every condition needs a field path and, unless it is a presence or
    /// boolean test, a value of the right shape
    pub fn conditions(mut self, group: Option<&ConditionGroup>) -> Self {
        let Some(group) = group else {
            return self;
        };

        for condition in &group.conditions {
            if condition.field.trim().is_empty() {
                self = self.error("conditions", "condition field cannot be empty");
            }
            let list_operator = matches!(condition.operator, ConditionOperator::In | ConditionOperator::NotIn);
            if list_operator && !condition.value.is_array() {
                self = self.error("conditions", &format!("'{}' needs a list of values", condition.field));
            } else if condition.operator.takes_value() && condition.value.is_null() {
                self = self.error("conditions", &format!("'{}' needs a value to compare with", condition.field));
            }
        }
        for nested in &group.groups {
            self = self.conditions(Some(nested));
        }
        self
    }

    /// Validate max length in characters
    pub fn max_length(self, value: Option<&str>, field: &str, max: usize) -> Self {
        match value {
            Some(s) if s.chars().count() > max => {
                self.error(field, &format!("{} must be {} characters or less", field, max))
            }
            _ => self,
        }
    }

    /// Validate an integer is at least `min`
    pub fn min_value(self, value: Option<i32>, field: &str, min: i32) -> Self {
        match value {
            Some(n) if n < min => self.error(field, &format!("{} must be at least {}", field, min)),
            _ => self,
        }
    }

    /// Finish validation, returning error if any
    pub fn finish(self) -> ValidationResult<()> {
        match self.builder.build() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

pub fn validate_new_workflow(input: &NewWorkflow) -> ValidationResult<()> {
    Validator::new()
        .required_string(Some(&input.name), "name", MAX_NAME_LENGTH)
        .event_name(Some(&input.trigger_event), "trigger_event")
        .conditions(input.conditions.as_ref())
        .finish()
}

pub fn validate_workflow_update(update: &WorkflowUpdate) -> ValidationResult<()> {
    let mut validator = Validator::new();
    if let Some(name) = &update.name {
        validator = validator.required_string(Some(name), "name", MAX_NAME_LENGTH);
    }
    if let Some(trigger) = &update.trigger_event {
        validator = validator.event_name(Some(trigger), "trigger_event");
    }
    validator.conditions(update.conditions.as_ref()).finish()
}

/// Field checks plus parsing the parameters against the step kind's config
pub fn validate_new_step(input: &NewStep) -> ValidationResult<()> {
    Validator::new()
        .required_string(Some(&input.name), "name", MAX_NAME_LENGTH)
        .min_value(Some(input.order), "order", 0)
        .finish()?;

    StepConfig::parse(input.step_type, &input.parameters)?;
    Ok(())
}

/// An update is checked against the step as it will look once applied
pub fn validate_step_update(existing: &WorkflowStep, update: &StepUpdate) -> ValidationResult<()> {
    let mut validator = Validator::new().min_value(update.order, "order", 0);
    if let Some(name) = &update.name {
        validator = validator.required_string(Some(name), "name", MAX_NAME_LENGTH);
    }
    validator.finish()?;

    if update.step_type.is_some() || update.parameters.is_some() {
        let kind: StepKind = update.step_type.unwrap_or(existing.step_type);
        let parameters = update.parameters.as_ref().unwrap_or(&existing.parameters);
        StepConfig::parse(kind, parameters)?;
    }
    Ok(())
}
