//! Builds the uniform result envelope returned by every run.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::model::{AnalysisError, AnalysisInfo, AnalysisStatus, RunArtifacts, RunOutcome, Timing};
use crate::types::ImageRef;

/// Compute formatted start/end timestamps and the elapsed seconds since `start`.
///
/// The end is clamped to `start` if the wall clock stepped backwards during
/// the run, so the delta is never negative.
pub fn analysis_timing(start: DateTime<Utc>) -> Timing {
    let end = Utc::now().max(start);
    let delta = end - start;
    let delta_seconds = delta
        .num_microseconds()
        .map(|us| us as f64 / 1_000_000.0)
        .unwrap_or_else(|| delta.num_seconds() as f64);

    Timing {
        start: start.to_rfc3339_opts(SecondsFormat::Millis, true),
        end: end.to_rfc3339_opts(SecondsFormat::Millis, true),
        delta_seconds,
    }
}

/// Wrap a finished run into a [`RunOutcome`].
pub fn generate_output(
    start: DateTime<Utc>,
    image: Option<ImageRef>,
    data: Option<Map<String, Value>>,
    text: String,
    status: AnalysisStatus,
    errors: Vec<AnalysisError>,
) -> RunOutcome {
    RunOutcome {
        result: RunArtifacts {
            image: image.map(ImageRef::into_inner).unwrap_or_default(),
            data,
            text,
        },
        analysis_info: AnalysisInfo {
            errors,
            time: analysis_timing(start),
            status,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_timing_is_monotonic() {
        let start = Utc::now() - Duration::milliseconds(250);
        let timing = analysis_timing(start);

        let parsed_start = DateTime::parse_from_rfc3339(&timing.start).unwrap();
        let parsed_end = DateTime::parse_from_rfc3339(&timing.end).unwrap();
        assert!(parsed_end >= parsed_start);
        assert!(timing.delta_seconds >= 0.25);
    }

    #[test]
    fn test_future_start_clamps_to_zero_delta() {
        let start = Utc::now() + Duration::seconds(30);
        let timing = analysis_timing(start);
        assert_eq!(timing.delta_seconds, 0.0);
        assert_eq!(timing.start, timing.end);
    }

    #[test]
    fn test_generate_output_fills_envelope() {
        let start = Utc::now();
        let outcome = generate_output(
            start,
            Some(ImageRef::new("abc")),
            None,
            "hello\n".to_string(),
            AnalysisStatus::Success,
            Vec::new(),
        );

        assert!(outcome.is_success());
        assert_eq!(outcome.result.image, "abc");
        assert_eq!(outcome.result.text, "hello\n");
        assert!(outcome.result.data.is_none());
        assert!(outcome.errors().is_empty());
    }

    #[test]
    fn test_generate_output_without_image_is_empty_string() {
        let outcome = generate_output(
            Utc::now(),
            None,
            None,
            String::new(),
            AnalysisStatus::Failure,
            Vec::new(),
        );
        assert_eq!(outcome.result.image, "");
        assert_eq!(outcome.status(), AnalysisStatus::Failure);
    }
}
