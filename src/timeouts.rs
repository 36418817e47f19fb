//! Per-operation deadlines for resource lifecycle calls.
//!
//! Every resource declares defaults; configuration may override them with a
//! `timeouts` block such as `{"create": "90m", "delete": "1h30m"}`.

use std::time::Duration;

use serde_json::Value;

use crate::error::ProviderError;
use crate::schema::{Attribute, Block, NestedBlock};

/// The lifecycle operations that carry a deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Creating a resource.
    Create,
    /// Reading a resource.
    Read,
    /// Updating a resource in place.
    Update,
    /// Deleting a resource.
    Delete,
}

impl Operation {
    /// The key used for this operation in a `timeouts` block.
    pub fn key(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// Deadlines for each lifecycle operation of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Deadline for create.
    pub create: Duration,
    /// Deadline for read.
    pub read: Duration,
    /// Deadline for update.
    pub update: Duration,
    /// Deadline for delete.
    pub delete: Duration,
}

impl Timeouts {
    /// Build timeouts from minute counts.
    pub const fn minutes(create: u64, read: u64, update: u64, delete: u64) -> Self {
        Self {
            create: Duration::from_secs(create * 60),
            read: Duration::from_secs(read * 60),
            update: Duration::from_secs(update * 60),
            delete: Duration::from_secs(delete * 60),
        }
    }

    /// The deadline for `op`.
    pub fn get(&self, op: Operation) -> Duration {
        match op {
            Operation::Create => self.create,
            Operation::Read => self.read,
            Operation::Update => self.update,
            Operation::Delete => self.delete,
        }
    }

    /// Apply overrides from a configuration `timeouts` block.
    ///
    /// A missing or null block leaves the defaults untouched.
    pub fn with_overrides(mut self, block: Option<&Value>) -> Result<Self, ProviderError> {
        let obj = match block {
            None | Some(Value::Null) => return Ok(self),
            Some(Value::Object(obj)) => obj,
            Some(Value::Array(items)) => match items.first() {
                Some(Value::Object(obj)) => obj,
                None => return Ok(self),
                Some(_) => {
                    return Err(ProviderError::Validation(
                        "timeouts must be an object".to_string(),
                    ))
                },
            },
            Some(_) => {
                return Err(ProviderError::Validation(
                    "timeouts must be an object".to_string(),
                ))
            },
        };

        for op in [
            Operation::Create,
            Operation::Read,
            Operation::Update,
            Operation::Delete,
        ] {
            let Some(raw) = obj.get(op.key()).and_then(Value::as_str) else {
                continue;
            };
            let parsed = parse_duration(raw)
                .map_err(|e| ProviderError::Validation(format!("timeouts.{}: {e}", op.key())))?;
            match op {
                Operation::Create => self.create = parsed,
                Operation::Read => self.read = parsed,
                Operation::Update => self.update = parsed,
                Operation::Delete => self.delete = parsed,
            }
        }
        Ok(self)
    }

    /// The schema block accepted for overrides.
    pub fn block() -> NestedBlock {
        NestedBlock::single(
            Block::new()
                .with_attribute("create", Attribute::optional_string())
                .with_attribute("read", Attribute::optional_string())
                .with_attribute("update", Attribute::optional_string())
                .with_attribute("delete", Attribute::optional_string())
                .with_description("Overrides for the per-operation deadlines"),
        )
    }
}

/// Parse a duration such as `"90m"`, `"1h30m"` or `"45s"`.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("empty duration".to_string());
    }

    let mut total = 0u64;
    let mut digits = String::new();
    for c in input.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let unit = match c {
            'h' => 3600,
            'm' => 60,
            's' => 1,
            _ => return Err(format!("invalid unit {c:?} in duration {input:?}")),
        };
        let amount: u64 = digits
            .parse()
            .map_err(|_| format!("missing number before {c:?} in duration {input:?}"))?;
        total += amount * unit;
        digits.clear();
    }
    if !digits.is_empty() {
        return Err(format!("missing unit in duration {input:?}"));
    }
    Ok(Duration::from_secs(total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("90m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("45s").unwrap(), Duration::from_secs(45));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("10d").is_err());
        assert!(parse_duration("m").is_err());
    }

    #[test]
    fn test_overrides() {
        let defaults = Timeouts::minutes(60, 5, 60, 60);
        let t = defaults
            .with_overrides(Some(&json!({"create": "90m", "read": null})))
            .unwrap();
        assert_eq!(t.create, Duration::from_secs(90 * 60));
        assert_eq!(t.read, Duration::from_secs(5 * 60));
        assert_eq!(t.get(Operation::Delete), Duration::from_secs(60 * 60));
    }

    #[test]
    fn test_overrides_as_single_item_list() {
        let t = Timeouts::minutes(30, 5, 30, 30)
            .with_overrides(Some(&json!([{"delete": "2h"}])))
            .unwrap();
        assert_eq!(t.delete, Duration::from_secs(7200));
    }

    #[test]
    fn test_overrides_invalid() {
        let err = Timeouts::minutes(30, 5, 30, 30)
            .with_overrides(Some(&json!({"update": "soon"})))
            .unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
        assert!(err.message().contains("timeouts.update"));
    }

    #[test]
    fn test_missing_block_keeps_defaults() {
        let defaults = Timeouts::minutes(30, 5, 30, 30);
        assert_eq!(defaults.with_overrides(None).unwrap(), defaults);
        assert_eq!(defaults.with_overrides(Some(&Value::Null)).unwrap(), defaults);
    }
}
