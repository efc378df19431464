//! Sample Plugin Module
//!
//! Text and typed plugins used to exercise the host, plus two diagnostic
//! plugins: one that honours cancellation while it waits, one that panics.

use std::time::{Duration, Instant};

use plughost_sdk::prelude::*;
use serde::{Deserialize, Serialize};

pub const TEXT_MODULE: &str = "Samples.Text";
pub const DIAGNOSTICS_MODULE: &str = "Samples.Diagnostics";

/// Uppercases its input.
pub struct Upper;

impl PluginClass for Upper {
    fn metadata() -> PluginMetadata {
        PluginMetadata::new(TEXT_MODULE, "Upper", Version::new(1, 0, 0))
            .with_description("Uppercases text")
            .with_author("plughost")
    }

    fn construct() -> PluginResult<Self> {
        Ok(Upper)
    }
}

impl Plugin for Upper {
    fn invoke(&self, ctx: &ExecutionContext, input: &str) -> PluginResult<String> {
        ctx.logger().debug(&format!("uppercasing {} bytes", input.len()));
        Ok(input.to_uppercase())
    }
}

/// Reverses its input by characters.
pub struct Reverse;

impl PluginClass for Reverse {
    fn metadata() -> PluginMetadata {
        PluginMetadata::new(TEXT_MODULE, "Reverse", Version::new(1, 2, 0))
            .with_description("Reverses text")
    }

    fn construct() -> PluginResult<Self> {
        Ok(Reverse)
    }
}

impl Plugin for Reverse {
    fn invoke(&self, _ctx: &ExecutionContext, input: &str) -> PluginResult<String> {
        Ok(input.chars().rev().collect())
    }
}

/// Request for [`WordStats`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsRequest {
    pub text: String,
}

/// Response of [`WordStats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextStats {
    pub words: usize,
    pub chars: usize,
    pub lines: usize,
}

/// Counts words, characters and lines.
pub struct WordStats;

impl PluginClass for WordStats {
    fn metadata() -> PluginMetadata {
        PluginMetadata::new(TEXT_MODULE, "WordStats", Version::new(1, 0, 0))
            .with_description("Counts words, characters and lines")
    }

    fn construct() -> PluginResult<Self> {
        Ok(WordStats)
    }
}

impl TypedPlugin for WordStats {
    type Input = StatsRequest;
    type Output = TextStats;

    fn execute(&self, _ctx: &ExecutionContext, input: StatsRequest) -> PluginResult<TextStats> {
        Ok(TextStats {
            words: input.text.split_whitespace().count(),
            chars: input.text.chars().count(),
            lines: input.text.lines().count(),
        })
    }
}

/// Request for [`Sleeper`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SleepRequest {
    pub millis: u64,
}

/// Waits for the requested time, unless cancelled first.
pub struct Sleeper;

impl PluginClass for Sleeper {
    fn metadata() -> PluginMetadata {
        PluginMetadata::new(DIAGNOSTICS_MODULE, "Sleeper", Version::new(0, 1, 0))
            .with_description("Waits, then answers; stops early when cancelled")
    }

    fn construct() -> PluginResult<Self> {
        Ok(Sleeper)
    }
}

impl TypedPlugin for Sleeper {
    type Input = SleepRequest;
    type Output = String;

    fn execute(&self, ctx: &ExecutionContext, input: SleepRequest) -> PluginResult<String> {
        let deadline = Instant::now() + Duration::from_millis(input.millis);
        while Instant::now() < deadline {
            if ctx.is_cancelled() {
                ctx.logger().info("sleeper cancelled");
                return Err(PluginError::Cancelled);
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        Ok(format!("slept {}ms", input.millis))
    }
}

/// Panics on every invocation.
pub struct Faulty;

impl PluginClass for Faulty {
    fn metadata() -> PluginMetadata {
        PluginMetadata::new(DIAGNOSTICS_MODULE, "Faulty", Version::new(0, 1, 0))
            .with_description("Always panics")
    }

    fn construct() -> PluginResult<Self> {
        Ok(Faulty)
    }
}

impl Plugin for Faulty {
    fn invoke(&self, _ctx: &ExecutionContext, input: &str) -> PluginResult<String> {
        panic!("faulty plugin invoked with '{}'", input);
    }
}

export_module!(
    basic Upper,
    basic Reverse,
    typed WordStats,
    typed Sleeper,
    basic Faulty,
);

#[cfg(test)]
mod tests {
    use super::*;
    use plughost_sdk::Typed;

    #[test]
    fn test_declares_all_plugins() {
        let names: Vec<String> = PLUGHOST_MODULE
            .declarations()
            .into_iter()
            .map(|d| d.metadata.name)
            .collect();
        assert_eq!(names, vec!["Upper", "Reverse", "WordStats", "Sleeper", "Faulty"]);
        assert!(PLUGHOST_MODULE.is_compatible());
    }

    #[test]
    fn test_sleeper_rejects_bad_input() {
        let err = Typed(Sleeper)
            .invoke(&ExecutionContext::default(), "soon")
            .unwrap_err();
        assert!(matches!(err, PluginError::Serialization(_)));
    }

    #[test]
    fn test_sleeper_stops_when_cancelled() {
        let ctx = ExecutionContext::default();
        ctx.cancellation().cancel();
        let err = Sleeper
            .execute(&ctx, SleepRequest { millis: 10_000 })
            .unwrap_err();
        assert!(matches!(err, PluginError::Cancelled));
    }

    #[test]
    fn test_word_stats() {
        let stats = WordStats
            .execute(
                &ExecutionContext::default(),
                StatsRequest {
                    text: "one two\nthree".to_string(),
                },
            )
            .unwrap();
        assert_eq!(
            stats,
            TextStats {
                words: 3,
                chars: 13,
                lines: 2
            }
        );
    }
}
