//! Environment overrides for [`Builder`].
//!
//! Only variables that are set are applied, on top of whatever the builder
//! already holds. A variable that is set to something unparseable is an
//! error, never silently ignored.

use crate::runtime::{Builder, OverflowPolicy, SchedulerError, UnhandledPanic};

pub(crate) const ENV_QUEUE_CAPACITY: &str = "TURNSTILE_QUEUE_CAPACITY";
pub(crate) const ENV_QUEUE_OVERFLOW: &str = "TURNSTILE_QUEUE_OVERFLOW";
pub(crate) const ENV_UNHANDLED_PANIC: &str = "TURNSTILE_UNHANDLED_PANIC";

/// `lookup` returns the value of a variable, or `None` when unset.
pub(crate) fn apply_env_overrides<F>(mut builder: Builder, lookup: F) -> Result<Builder, SchedulerError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup(ENV_QUEUE_CAPACITY) {
        let capacity = parse_usize(ENV_QUEUE_CAPACITY, &val)?;
        if capacity == 0 {
            return Err(SchedulerError::Config(format!(
                "invalid value for {ENV_QUEUE_CAPACITY}: must be greater than 0"
            )));
        }
        builder = builder.queue_capacity(capacity);
    }

    if let Some(val) = lookup(ENV_QUEUE_OVERFLOW) {
        let policy = match val.trim().to_lowercase().as_str() {
            "reject" => OverflowPolicy::Reject,
            "grow" => OverflowPolicy::Grow,
            _ => return Err(invalid(ENV_QUEUE_OVERFLOW, "reject|grow", &val)),
        };
        builder = builder.queue_overflow(policy);
    }

    if let Some(val) = lookup(ENV_UNHANDLED_PANIC) {
        let policy = match val.trim().to_lowercase().as_str() {
            "abort" => UnhandledPanic::Abort,
            "propagate" => UnhandledPanic::Propagate,
            _ => return Err(invalid(ENV_UNHANDLED_PANIC, "abort|propagate", &val)),
        };
        builder = builder.unhandled_panic(policy);
    }

    Ok(builder)
}

fn parse_usize(var_name: &str, val: &str) -> Result<usize, SchedulerError> {
    val.trim().parse::<usize>().map_err(|e| {
        SchedulerError::Config(format!(
            "invalid value for {var_name}: expected unsigned integer, got {val:?} ({e})"
        ))
    })
}

fn invalid(var_name: &str, expected: &str, val: &str) -> SchedulerError {
    SchedulerError::Config(format!(
        "invalid value for {var_name}: expected {expected}, got {val:?}"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RuntimeConfig;
    use anyhow::Result;
    use rstest::rstest;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_unset_vars_keep_builder() -> Result<()> {
        let builder = Builder::new_local().queue_capacity(16);
        let cfg = RuntimeConfig::try_from(apply_env_overrides(builder, lookup(&[]))?)?;

        assert_eq!(cfg.queue_capacity, 16);
        assert_eq!(cfg.queue_overflow, OverflowPolicy::Reject);
        assert_eq!(cfg.unhandled_panic, UnhandledPanic::Abort);
        Ok(())
    }

    #[test]
    fn test_all_overrides_applied() -> Result<()> {
        let vars = lookup(&[
            (ENV_QUEUE_CAPACITY, " 32 "),
            (ENV_QUEUE_OVERFLOW, "Grow"),
            (ENV_UNHANDLED_PANIC, "propagate"),
        ]);
        let cfg = RuntimeConfig::try_from(apply_env_overrides(Builder::new_local(), vars)?)?;

        assert_eq!(cfg.queue_capacity, 32);
        assert_eq!(cfg.queue_overflow, OverflowPolicy::Grow);
        assert_eq!(cfg.unhandled_panic, UnhandledPanic::Propagate);
        Ok(())
    }

    #[rstest]
    #[case::not_a_number(ENV_QUEUE_CAPACITY, "lots")]
    #[case::zero_capacity(ENV_QUEUE_CAPACITY, "0")]
    #[case::negative(ENV_QUEUE_CAPACITY, "-4")]
    #[case::bad_overflow(ENV_QUEUE_OVERFLOW, "drop-oldest")]
    #[case::bad_panic_policy(ENV_UNHANDLED_PANIC, "ignore")]
    fn test_invalid_values_rejected(#[case] name: &str, #[case] val: &str) {
        let err = apply_env_overrides(Builder::new_local(), lookup(&[(name, val)]))
            .expect_err("value must be rejected");

        match err {
            SchedulerError::Config(msg) => assert!(msg.contains(name), "{msg}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
