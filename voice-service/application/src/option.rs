use voice_domain::{PitchParam, TransformOption, TransformParams};

use crate::ApplicationError;

const HIGH_PITCH_STEPS: f64 = 4.0;
const LOW_PITCH_STEPS: f64 = -4.0;
const RANDOM_PITCH_LOW: f64 = -6.0;
const RANDOM_PITCH_HIGH: f64 = 6.0;
const LOW_TEMPO_RATE: f64 = 0.7;
const HIGH_TEMPO_RATE: f64 = 1.5;

/// Ordered option keys with their parameters. Key order is the order
/// reported back to callers.
#[derive(Debug, Clone)]
pub struct OptionTable {
    entries: Vec<TransformOption>,
    default_key: String,
}

impl OptionTable {
    pub fn new(
        entries: Vec<TransformOption>,
        default_key: impl Into<String>,
    ) -> Result<Self, ApplicationError> {
        let default_key = default_key.into();
        if entries.is_empty() {
            return Err(ApplicationError::Validation(
                "option table must contain at least one entry".to_string(),
            ));
        }
        if !entries.iter().any(|entry| entry.key == default_key) {
            return Err(ApplicationError::Validation(format!(
                "default option `{default_key}` is not in the table"
            )));
        }
        for entry in &entries {
            validate_entry(entry)?;
        }

        Ok(Self {
            entries,
            default_key,
        })
    }

    /// Numeric keys, pitch only: `0` up, `1` down, `2` random.
    pub fn pitch() -> Self {
        Self {
            entries: vec![
                TransformOption::new("0", PitchParam::Fixed { steps: HIGH_PITCH_STEPS }, None),
                TransformOption::new("1", PitchParam::Fixed { steps: LOW_PITCH_STEPS }, None),
                TransformOption::new(
                    "2",
                    PitchParam::RandomRange {
                        low: RANDOM_PITCH_LOW,
                        high: RANDOM_PITCH_HIGH,
                    },
                    None,
                ),
            ],
            default_key: "1".to_string(),
        }
    }

    /// Named keys combining a pitch direction with a tempo rate.
    pub fn pitch_tempo() -> Self {
        let entry = |key: &str, steps: f64, rate: f64| {
            TransformOption::new(key, PitchParam::Fixed { steps }, Some(rate))
        };

        Self {
            entries: vec![
                entry("high_pitch_low_tempo", HIGH_PITCH_STEPS, LOW_TEMPO_RATE),
                entry("high_pitch_high_tempo", HIGH_PITCH_STEPS, HIGH_TEMPO_RATE),
                entry("low_pitch_low_tempo", LOW_PITCH_STEPS, LOW_TEMPO_RATE),
                entry("low_pitch_high_tempo", LOW_PITCH_STEPS, HIGH_TEMPO_RATE),
            ],
            default_key: "high_pitch_low_tempo".to_string(),
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.key.clone()).collect()
    }

    pub fn default_key(&self) -> &str {
        &self.default_key
    }

    pub fn get(&self, key: &str) -> Option<&TransformOption> {
        self.entries.iter().find(|entry| entry.key == key)
    }
}

fn validate_entry(entry: &TransformOption) -> Result<(), ApplicationError> {
    let pitch_ok = match entry.pitch {
        PitchParam::Fixed { steps } => steps.is_finite(),
        PitchParam::RandomRange { low, high } => low.is_finite() && high.is_finite() && low <= high,
    };
    if !pitch_ok {
        return Err(ApplicationError::Validation(format!(
            "option `{}` has an invalid pitch parameter",
            entry.key
        )));
    }
    if let Some(rate) = entry.tempo_rate {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(ApplicationError::Validation(format!(
                "option `{}` has a non-positive tempo rate",
                entry.key
            )));
        }
    }
    Ok(())
}

pub struct OptionResolver {
    table: OptionTable,
}

impl OptionResolver {
    pub fn new(table: OptionTable) -> Self {
        Self { table }
    }

    pub fn default_key(&self) -> &str {
        self.table.default_key()
    }

    pub fn keys(&self) -> Vec<String> {
        self.table.keys()
    }

    pub fn lookup(&self, key: &str) -> Result<&TransformOption, ApplicationError> {
        self.table
            .get(key)
            .ok_or_else(|| ApplicationError::InvalidOption {
                option: key.to_string(),
                valid: self.table.keys(),
            })
    }

    /// Looks the key up and draws concrete parameters.
    pub fn resolve(&self, key: &str) -> Result<TransformParams, ApplicationError> {
        self.lookup(key).map(draw_params)
    }
}

/// Turns a table entry into concrete parameters. Random ranges are drawn on
/// every call.
pub fn draw_params(option: &TransformOption) -> TransformParams {
    let pitch_steps = match option.pitch {
        PitchParam::Fixed { steps } => steps,
        PitchParam::RandomRange { low, high } => rand::random_range(low..=high),
    };

    TransformParams {
        pitch_steps,
        tempo_rate: option.tempo_rate,
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use voice_domain::{PitchParam, TransformOption};

    use super::{OptionResolver, OptionTable};
    use crate::ApplicationError;

    #[test]
    fn fixed_options_resolve_identically() {
        let resolver = OptionResolver::new(OptionTable::pitch_tempo());
        for key in resolver.keys() {
            let first = resolver.resolve(&key).expect("known key");
            let second = resolver.resolve(&key).expect("known key");
            assert_eq!(first, second, "key {key} should be deterministic");
        }

        let pitch = OptionResolver::new(OptionTable::pitch());
        assert_eq!(pitch.resolve("0").expect("known").pitch_steps, 4.0);
        assert_eq!(pitch.resolve("1").expect("known").pitch_steps, -4.0);
        assert_eq!(pitch.resolve("1").expect("known").tempo_rate, None);
    }

    #[test]
    fn named_table_pairs_pitch_with_tempo() {
        let resolver = OptionResolver::new(OptionTable::pitch_tempo());
        let params = resolver.resolve("low_pitch_high_tempo").expect("known key");

        assert_relative_eq!(params.pitch_steps, -4.0);
        assert_eq!(params.tempo_rate, Some(1.5));
        assert_eq!(resolver.default_key(), "high_pitch_low_tempo");
    }

    #[test]
    fn random_option_stays_in_range_and_spreads() {
        let resolver = OptionResolver::new(OptionTable::pitch());
        let draws: Vec<f64> = (0..4_000)
            .map(|_| resolver.resolve("2").expect("known key").pitch_steps)
            .collect();

        assert!(draws.iter().all(|value| (-6.0..=6.0).contains(value)));

        let mut buckets = [0usize; 4];
        for value in &draws {
            let bucket = (((value + 6.0) / 3.0) as usize).min(3);
            buckets[bucket] += 1;
        }
        // Uniform would put ~1000 in each quarter of the range.
        for count in buckets {
            assert!((700..=1300).contains(&count), "bucket counts {buckets:?}");
        }

        let mean = draws.iter().sum::<f64>() / draws.len() as f64;
        assert!(mean.abs() < 0.5, "mean {mean}");
    }

    #[test]
    fn unknown_key_lists_valid_keys() {
        let resolver = OptionResolver::new(OptionTable::pitch_tempo());
        let error = resolver.resolve("chipmunk").expect_err("unknown key");

        match &error {
            ApplicationError::InvalidOption { option, valid } => {
                assert_eq!(option, "chipmunk");
                assert_eq!(valid.len(), 4);
            }
            other => panic!("unexpected error {other:?}"),
        }
        let message = error.to_string();
        for key in resolver.keys() {
            assert!(message.contains(&key), "{message} should mention {key}");
        }
    }

    #[test]
    fn custom_table_rejects_missing_default_and_bad_rates() {
        let entries = vec![TransformOption::new(
            "up",
            PitchParam::Fixed { steps: 2.0 },
            Some(1.2),
        )];
        assert!(OptionTable::new(entries.clone(), "down").is_err());
        assert!(OptionTable::new(entries, "up").is_ok());

        let zero_rate = vec![TransformOption::new(
            "frozen",
            PitchParam::Fixed { steps: 0.0 },
            Some(0.0),
        )];
        assert!(OptionTable::new(zero_rate, "frozen").is_err());

        let inverted = vec![TransformOption::new(
            "odd",
            PitchParam::RandomRange { low: 3.0, high: -3.0 },
            None,
        )];
        assert!(OptionTable::new(inverted, "odd").is_err());
    }
}
