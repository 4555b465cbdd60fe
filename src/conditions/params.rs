// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::args::{ArgElementType, ArgList};
use crate::conditions::{ConditionKind, PeriodicPolicy, SamplingMode};
use crate::errors::ConfigError;
use std::time::Duration;

/// Threshold rule of a multi-port condition.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SamplingRule {
    SumOfAll { min_sum: usize },
    PerReceiver { min_sizes: Vec<usize> },
}

/// Parameters of a condition, validated once at initialization.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ConditionParams {
    None,
    MessageAvailable {
        min_size: usize,
        front_stage_max_size: Option<usize>,
    },
    ExpiringMessageAvailable {
        max_batch_size: usize,
        max_delay: Duration,
    },
    MultiMessageAvailable {
        rule: SamplingRule,
        timeout: Option<Duration>,
    },
    DownstreamMessageAffordable {
        min_size: usize,
    },
    Count {
        count: u64,
    },
    Boolean,
    Periodic {
        period: Duration,
        policy: PeriodicPolicy,
    },
    Asynchronous,
}

struct Reader<'a> {
    condition: &'a str,
    args: &'a ArgList,
}

impl Reader<'_> {
    fn optional<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        self.args.value(key).map_err(|e| ConfigError::InvalidValue {
            component: self.condition.to_string(),
            arg: key.to_string(),
            reason: e.to_string(),
        })
    }

    fn required<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<T, ConfigError> {
        self.optional(key)?.ok_or_else(|| ConfigError::MissingArgument {
            component: self.condition.to_string(),
            arg: key.to_string(),
        })
    }

    fn parsed<T: std::str::FromStr<Err = String>>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        self.optional::<String>(key)?
            .map(|text| {
                text.parse().map_err(|reason| ConfigError::InvalidValue {
                    component: self.condition.to_string(),
                    arg: key.to_string(),
                    reason,
                })
            })
            .transpose()
    }

    /// Durations are integer nanoseconds or strings such as `"5ms"` or `"10hz"`.
    fn duration(&self, key: &str) -> Result<Option<Duration>, ConfigError> {
        let Some(arg) = self.args.get(key).filter(|a| a.has_value()) else {
            return Ok(None);
        };
        let is_text = arg
            .arg_type()
            .map(|t| t.element_type() == ArgElementType::String)
            .unwrap_or(false);
        if is_text {
            let text: String = self.required(key)?;
            parse_duration(&text)
                .map(Some)
                .map_err(|reason| ConfigError::InvalidValue {
                    component: self.condition.to_string(),
                    arg: key.to_string(),
                    reason,
                })
        } else {
            Ok(Some(Duration::from_nanos(self.required(key)?)))
        }
    }
}

impl ConditionParams {
    /// Validates the arguments of one condition.
    ///
    /// `port_count` is the number of ports the condition watches, used to
    /// check per-port threshold lists.
    pub(crate) fn parse(
        condition: &str,
        kind: ConditionKind,
        args: &ArgList,
        port_count: usize,
    ) -> Result<Self, ConfigError> {
        let reader = Reader { condition, args };
        let params = match kind {
            ConditionKind::None => ConditionParams::None,
            ConditionKind::MessageAvailable => ConditionParams::MessageAvailable {
                min_size: reader.optional("min_size")?.unwrap_or(1),
                front_stage_max_size: reader.optional("front_stage_max_size")?,
            },
            ConditionKind::ExpiringMessageAvailable => {
                let max_delay = reader.duration("max_delay_ns")?.ok_or_else(|| {
                    ConfigError::MissingArgument {
                        component: condition.to_string(),
                        arg: "max_delay_ns".to_string(),
                    }
                })?;
                ConditionParams::ExpiringMessageAvailable {
                    max_batch_size: reader.required("max_batch_size")?,
                    max_delay,
                }
            }
            ConditionKind::MultiMessageAvailable | ConditionKind::MultiMessageAvailableTimeout => {
                let rule = Self::sampling_rule(&reader, port_count)?;
                let timeout = if kind == ConditionKind::MultiMessageAvailableTimeout {
                    Some(reader.duration("execution_frequency")?.ok_or_else(|| {
                        ConfigError::MissingArgument {
                            component: condition.to_string(),
                            arg: "execution_frequency".to_string(),
                        }
                    })?)
                } else {
                    None
                };
                ConditionParams::MultiMessageAvailable { rule, timeout }
            }
            ConditionKind::DownstreamMessageAffordable => {
                ConditionParams::DownstreamMessageAffordable {
                    min_size: reader.optional("min_size")?.unwrap_or(1),
                }
            }
            ConditionKind::Count => ConditionParams::Count {
                count: reader.optional("count")?.unwrap_or(1),
            },
            ConditionKind::Boolean => ConditionParams::Boolean,
            ConditionKind::Periodic => ConditionParams::Periodic {
                period: reader.duration("recess_period")?.ok_or_else(|| {
                    ConfigError::MissingArgument {
                        component: condition.to_string(),
                        arg: "recess_period".to_string(),
                    }
                })?,
                policy: reader.parsed("policy")?.unwrap_or_default(),
            },
            ConditionKind::Asynchronous => ConditionParams::Asynchronous,
        };
        Ok(params)
    }

    fn sampling_rule(reader: &Reader<'_>, port_count: usize) -> Result<SamplingRule, ConfigError> {
        let min_sizes: Option<Vec<usize>> = reader.optional("min_sizes")?;
        let mode = match reader.parsed::<SamplingMode>("sampling_mode")? {
            Some(mode) => mode,
            None if min_sizes.is_some() => SamplingMode::PerReceiver,
            None => SamplingMode::SumOfAll,
        };
        match mode {
            SamplingMode::SumOfAll => Ok(SamplingRule::SumOfAll {
                min_sum: reader.optional("min_sum")?.unwrap_or(1),
            }),
            SamplingMode::PerReceiver => {
                let min_sizes = min_sizes.ok_or_else(|| ConfigError::MissingArgument {
                    component: reader.condition.to_string(),
                    arg: "min_sizes".to_string(),
                })?;
                if min_sizes.len() != port_count {
                    return Err(ConfigError::MismatchedPortList {
                        condition: reader.condition.to_string(),
                        ports: port_count,
                        sizes: min_sizes.len(),
                    });
                }
                Ok(SamplingRule::PerReceiver { min_sizes })
            }
        }
    }
}

/// Parses `"<n>ns"`, `"<n>us"`, `"<n>ms"`, `"<n>s"` and `"<n>hz"`.
///
/// A bare number is read as nanoseconds. Fractions are accepted, so
/// `"0.5s"` and `"2.5hz"` both work.
pub fn parse_duration(text: &str) -> Result<Duration, String> {
    let text = text.trim();
    let lower = text.to_ascii_lowercase();
    let split = lower
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(lower.len());
    let (number, unit) = lower.split_at(split);
    let value: f64 = number
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration '{}'", text))?;
    if !value.is_finite() || value < 0.0 {
        return Err(format!("invalid duration '{}'", text));
    }
    let nanos = match unit.trim() {
        "" | "ns" => value,
        "us" => value * 1e3,
        "ms" => value * 1e6,
        "s" => value * 1e9,
        "hz" if value > 0.0 => 1e9 / value,
        "hz" => return Err(format!("frequency must be positive in '{}'", text)),
        other => return Err(format!("unknown duration unit '{}' in '{}'", other, text)),
    };
    Ok(Duration::from_nanos(nanos.round() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::Arg;

    fn args(list: Vec<Arg>) -> ArgList {
        list.into_iter().collect()
    }

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("250").unwrap(), Duration::from_nanos(250));
        assert_eq!(parse_duration("3us").unwrap(), Duration::from_micros(3));
        assert_eq!(parse_duration("5ms").unwrap(), Duration::from_millis(5));
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("10hz").unwrap(), Duration::from_millis(100));
        assert_eq!(parse_duration("0.5s").unwrap(), Duration::from_millis(500));
        assert!(parse_duration("0hz").is_err());
        assert!(parse_duration("5 fortnights").is_err());
        assert!(parse_duration("-1ms").is_err());
    }

    #[test]
    fn test_message_available_defaults() {
        let params =
            ConditionParams::parse("c", ConditionKind::MessageAvailable, &ArgList::new(), 1).unwrap();
        assert_eq!(
            params,
            ConditionParams::MessageAvailable {
                min_size: 1,
                front_stage_max_size: None
            }
        );
    }

    #[test]
    fn test_per_receiver_list_must_match_ports() {
        let list = args(vec![
            Arg::new("sampling_mode", "PerReceiver"),
            Arg::new("min_sizes", vec![1usize, 2, 1]),
        ]);
        let err = ConditionParams::parse("joint", ConditionKind::MultiMessageAvailable, &list, 2)
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::MismatchedPortList {
                condition: "joint".to_string(),
                ports: 2,
                sizes: 3
            }
        );

        let ok = ConditionParams::parse("joint", ConditionKind::MultiMessageAvailable, &list, 3)
            .unwrap();
        assert_eq!(
            ok,
            ConditionParams::MultiMessageAvailable {
                rule: SamplingRule::PerReceiver {
                    min_sizes: vec![1, 2, 1]
                },
                timeout: None
            }
        );
    }

    #[test]
    fn test_timeout_variant_requires_execution_frequency() {
        let list = args(vec![Arg::new("min_sum", 4usize)]);
        let err = ConditionParams::parse(
            "joint",
            ConditionKind::MultiMessageAvailableTimeout,
            &list,
            2,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingArgument { .. }));

        let list = args(vec![
            Arg::new("min_sum", 4usize),
            Arg::new("execution_frequency", "20ms"),
        ]);
        let params = ConditionParams::parse(
            "joint",
            ConditionKind::MultiMessageAvailableTimeout,
            &list,
            2,
        )
        .unwrap();
        assert_eq!(
            params,
            ConditionParams::MultiMessageAvailable {
                rule: SamplingRule::SumOfAll { min_sum: 4 },
                timeout: Some(Duration::from_millis(20))
            }
        );
    }

    #[test]
    fn test_periodic_accepts_text_and_nanoseconds() {
        let text = args(vec![Arg::new("recess_period", "100hz")]);
        let params = ConditionParams::parse("p", ConditionKind::Periodic, &text, 0).unwrap();
        assert_eq!(
            params,
            ConditionParams::Periodic {
                period: Duration::from_millis(10),
                policy: PeriodicPolicy::CatchUpMissedTicks
            }
        );

        let nanos = args(vec![
            Arg::new("recess_period", 1_000u64),
            Arg::new("policy", "MinTimeBetweenTicks"),
        ]);
        let params = ConditionParams::parse("p", ConditionKind::Periodic, &nanos, 0).unwrap();
        assert_eq!(
            params,
            ConditionParams::Periodic {
                period: Duration::from_micros(1),
                policy: PeriodicPolicy::MinTimeBetweenTicks
            }
        );
    }

    #[test]
    fn test_invalid_argument_types_are_reported() {
        let list = args(vec![Arg::new("min_size", "lots")]);
        let err = ConditionParams::parse("c", ConditionKind::MessageAvailable, &list, 1).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
