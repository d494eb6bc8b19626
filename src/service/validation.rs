//! Candidate validation against descriptor constraints.

use crate::config::{EntityDescriptor, FieldDescriptor, FieldFormat, FieldType};
use crate::entity::{Entity, Violation};
use serde_json::Value;

/// Produces every constraint violation of a candidate entity. Empty means valid.
pub trait Validator: Send + Sync {
    fn validate(&self, descriptor: &EntityDescriptor, entity: &Entity) -> Vec<Violation>;
}

/// Checks type and per-field rules for each data field; collects all failures.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConstraintValidator;

impl Validator for ConstraintValidator {
    fn validate(&self, descriptor: &EntityDescriptor, entity: &Entity) -> Vec<Violation> {
        let mut violations = Vec::new();
        for field in descriptor.data_fields() {
            validate_field(field, entity.value(&field.name), &mut violations);
        }
        violations
    }
}

fn validate_field(field: &FieldDescriptor, value: Option<&Value>, out: &mut Vec<Violation>) {
    let col = field.name.as_str();
    let rule = &field.rules;
    let v = match value {
        None | Some(Value::Null) => {
            if rule.not_blank == Some(true) {
                out.push(Violation::field(col, "must not be blank"));
            } else if rule.required == Some(true) {
                out.push(Violation::field(col, "must not be null"));
            }
            return;
        }
        Some(v) => v,
    };

    if !type_matches(field.field_type, v) {
        out.push(Violation::field(
            col,
            format!("must be of type {}", field.field_type.as_str()),
        ));
        return;
    }

    if let Some(s) = v.as_str() {
        let len = s.chars().count();
        if rule.not_blank == Some(true) && s.is_empty() {
            out.push(Violation::field(col, "must not be blank"));
        }
        if let Some(max) = rule.max_length {
            if len > max as usize {
                out.push(Violation::field(col, format!("must be at most {} characters", max)));
            }
        }
        if let Some(min) = rule.min_length {
            if len < min as usize {
                out.push(Violation::field(col, format!("must be at least {} characters", min)));
            }
        }
        match &field.format {
            Some(FieldFormat::Email(re)) if !s.is_empty() && !re.is_match(s) => {
                out.push(Violation::field(col, "must be a valid email address"));
            }
            Some(FieldFormat::Uuid) if uuid::Uuid::parse_str(s).is_err() => {
                out.push(Violation::field(col, "must be a valid UUID"));
            }
            _ => {}
        }
        if let Some(re) = &field.pattern {
            if !re.is_match(s) {
                out.push(Violation::field(col, "does not match required pattern"));
            }
        }
    }

    if let Some(ref allowed) = rule.allowed {
        if !allowed.iter().any(|a| value_eq(v, a)) {
            out.push(Violation::field(
                col,
                format!(
                    "must be one of: {:?}",
                    allowed.iter().take(5).collect::<Vec<_>>()
                ),
            ));
        }
    }

    if let Some(n) = v.as_f64() {
        if let Some(min) = rule.minimum {
            if n < min {
                out.push(Violation::field(col, format!("must be at least {}", min)));
            }
        }
        if let Some(max) = rule.maximum {
            if n > max {
                out.push(Violation::field(col, format!("must be at most {}", max)));
            }
        }
    }
}

fn type_matches(field_type: FieldType, v: &Value) -> bool {
    match field_type {
        FieldType::Integer => v.is_i64(),
        FieldType::Float => v.is_number(),
        FieldType::String => v.is_string(),
        FieldType::Boolean => v.is_boolean(),
    }
}

pub(crate) fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(s), Value::String(t)) => s == t,
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{builtin, resolve, Registry};
    use serde_json::json;

    fn registry() -> Registry {
        resolve(&builtin().unwrap()).unwrap()
    }

    fn user(name: Value, email: Value) -> Entity {
        Entity::new("user").with_value("name", name).with_value("email", email)
    }

    #[test]
    fn valid_user_has_no_violations() {
        let registry = registry();
        let d = registry.get("user").unwrap();
        let v = ConstraintValidator.validate(d, &user(json!("ann"), json!("ann@example.com")));
        assert!(v.is_empty(), "{v:?}");
    }

    #[test]
    fn collects_every_violation() {
        let registry = registry();
        let d = registry.get("user").unwrap();
        let v = ConstraintValidator.validate(d, &user(json!(""), json!("not-an-email")));
        assert_eq!(
            v,
            vec![
                Violation::field("name", "must not be blank"),
                Violation::field("email", "must be a valid email address"),
            ]
        );
    }

    #[test]
    fn missing_fields_are_blank() {
        let registry = registry();
        let d = registry.get("user").unwrap();
        let v = ConstraintValidator.validate(d, &Entity::new("user"));
        assert_eq!(v.len(), 2);
        assert!(v.iter().all(|v| v.message == "must not be blank"));
    }

    #[test]
    fn max_length_counts_characters() {
        let registry = registry();
        let d = registry.get("user").unwrap();
        let ok = ConstraintValidator.validate(d, &user(json!("é".repeat(30)), json!("a@b.io")));
        assert!(ok.is_empty());
        let long = ConstraintValidator.validate(d, &user(json!("x".repeat(31)), json!("a@b.io")));
        assert_eq!(long, vec![Violation::field("name", "must be at most 30 characters")]);
    }

    #[test]
    fn wrong_type_is_reported_once() {
        let registry = registry();
        let d = registry.get("user").unwrap();
        let v = ConstraintValidator.validate(d, &user(json!(12), json!("a@b.io")));
        assert_eq!(v, vec![Violation::field("name", "must be of type string")]);
    }

    #[test]
    fn group_name_allows_empty_but_not_null() {
        let registry = registry();
        let d = registry.get("group").unwrap();
        let empty = Entity::new("group").with_value("name", json!(""));
        assert!(ConstraintValidator.validate(d, &empty).is_empty());
        let null = Entity::new("group").with_value("name", Value::Null);
        assert_eq!(
            ConstraintValidator.validate(d, &null),
            vec![Violation::field("name", "must not be null")]
        );
    }
}
