//! Window planning
//!
//! Pure translation from (source duration, policy) to the ordered list of
//! windows the scheduler will drive. Two policies are supported: fixed
//! back-to-back windows and fixed windows with an overlap stride.

use crate::config::ConfigError;
use serde::{Deserialize, Serialize};

/// Windowing policy selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowPolicy {
    /// Non-overlapping `window_seconds` windows
    Fixed,
    /// `window_seconds` windows advancing by `window - stride_overlap`
    Overlapping,
}

/// Windowing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowingConfig {
    pub policy: WindowPolicy,
    pub window_seconds: f64,
    /// Overlap between adjacent windows; required for `Overlapping`
    pub stride_overlap_seconds: f64,
    /// Windows shorter than this are dropped unless they end the source
    pub min_window_seconds: f64,
}

impl Default for WindowingConfig {
    fn default() -> Self {
        Self {
            policy: WindowPolicy::Overlapping,
            window_seconds: 30.0,
            stride_overlap_seconds: 5.0,
            min_window_seconds: 0.0,
        }
    }
}

impl WindowingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_seconds <= 0.0 {
            return Err(ConfigError::InvalidWindowing {
                message: format!("window_seconds must be positive, got {}", self.window_seconds),
            });
        }
        if self.stride_overlap_seconds < 0.0 {
            return Err(ConfigError::InvalidWindowing {
                message: "stride_overlap_seconds must not be negative".to_string(),
            });
        }
        if self.min_window_seconds < 0.0 {
            return Err(ConfigError::InvalidWindowing {
                message: "min_window_seconds must not be negative".to_string(),
            });
        }
        if self.policy == WindowPolicy::Overlapping
            && self.stride_overlap_seconds >= self.window_seconds
        {
            return Err(ConfigError::InvalidWindowing {
                message: format!(
                    "stride_overlap_seconds ({}) must be less than window_seconds ({})",
                    self.stride_overlap_seconds, self.window_seconds
                ),
            });
        }
        Ok(())
    }
}

/// One unit of transcription work: a `[start, end)` range of the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowSpec {
    /// 1-based dense index
    pub index: usize,
    pub start_seconds: f64,
    pub end_seconds: f64,
    /// Time shared with the previous window; zero for the first window
    pub expected_overlap_seconds: f64,
}

impl WindowSpec {
    pub fn duration_seconds(&self) -> f64 {
        self.end_seconds - self.start_seconds
    }

    /// Artifact stem shared by the chunk record and the slice file, e.g.
    /// `chunk_003_50s_62s`.
    pub fn artifact_stem(&self) -> String {
        format!(
            "chunk_{:03}_{}s_{}s",
            self.index,
            self.start_seconds.round() as u64,
            self.end_seconds.round() as u64
        )
    }
}

/// Plan the window sequence covering `[0, duration)`.
pub fn plan_windows(
    duration_seconds: f64,
    config: &WindowingConfig,
) -> Result<Vec<WindowSpec>, ConfigError> {
    config.validate()?;
    if duration_seconds <= 0.0 {
        return Err(ConfigError::InvalidWindowing {
            message: format!("source duration must be positive, got {}", duration_seconds),
        });
    }

    let windows = match config.policy {
        WindowPolicy::Fixed => plan_fixed(duration_seconds, config),
        WindowPolicy::Overlapping => plan_overlapping(duration_seconds, config),
    };
    Ok(windows)
}

fn plan_fixed(duration: f64, config: &WindowingConfig) -> Vec<WindowSpec> {
    let mut windows = Vec::new();
    let mut start = 0.0;
    while start < duration {
        let end = (start + config.window_seconds).min(duration);
        windows.push(WindowSpec {
            index: windows.len() + 1,
            start_seconds: start,
            end_seconds: end,
            expected_overlap_seconds: 0.0,
        });
        start = end;
    }
    windows
}

fn plan_overlapping(duration: f64, config: &WindowingConfig) -> Vec<WindowSpec> {
    let step = config.window_seconds - config.stride_overlap_seconds;
    let mut windows: Vec<WindowSpec> = Vec::new();
    let mut current = 0.0;

    while current < duration {
        let end = (current + config.window_seconds).min(duration);
        let is_terminal = end >= duration;

        // Interior windows always span window_seconds; only the terminal
        // window can fall below the minimum, and it is kept to preserve
        // coverage to the end of the source.
        if end - current >= config.min_window_seconds || is_terminal {
            let overlap = match windows.last() {
                Some(prev) => (prev.end_seconds - current).max(0.0),
                None => 0.0,
            };
            windows.push(WindowSpec {
                index: windows.len() + 1,
                start_seconds: current,
                end_seconds: end,
                expected_overlap_seconds: overlap,
            });
        }

        if is_terminal {
            break;
        }
        current += step;
    }

    windows
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn overlapping(window: f64, stride: f64, min: f64) -> WindowingConfig {
        WindowingConfig {
            policy: WindowPolicy::Overlapping,
            window_seconds: window,
            stride_overlap_seconds: stride,
            min_window_seconds: min,
        }
    }

    fn union_covers(windows: &[WindowSpec], duration: f64) -> bool {
        let mut cursor = 0.0;
        for w in windows {
            if w.start_seconds > cursor + 1e-9 {
                return false;
            }
            cursor = cursor.max(w.end_seconds);
        }
        (cursor - duration).abs() < 1e-9
    }

    #[test]
    fn overlapping_two_window_plan() {
        let windows = plan_windows(55.0, &overlapping(30.0, 5.0, 0.0)).unwrap();
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].start_seconds, 0.0);
        assert_eq!(windows[0].end_seconds, 30.0);
        assert_eq!(windows[1].start_seconds, 25.0);
        assert_eq!(windows[1].end_seconds, 55.0);
        assert_eq!(windows[1].expected_overlap_seconds, 5.0);
        assert!(union_covers(&windows, 55.0));
    }

    #[test]
    fn terminal_short_window_is_kept() {
        // 62s source: [0, 30), [25, 55), [50, 62); the 12s tail window
        // clears the 10s minimum and closes coverage at 62s.
        let windows = plan_windows(62.0, &overlapping(30.0, 5.0, 10.0)).unwrap();
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[2].start_seconds, 50.0);
        assert_eq!(windows[2].end_seconds, 62.0);
        assert!(union_covers(&windows, 62.0));
    }

    #[test]
    fn terminal_window_survives_below_minimum() {
        let windows = plan_windows(53.0, &overlapping(30.0, 5.0, 10.0)).unwrap();
        let last = windows.last().unwrap();
        assert_eq!(last.end_seconds, 53.0);
        assert!(last.duration_seconds() < 10.0);
        assert!(union_covers(&windows, 53.0));
    }

    #[rstest]
    #[case(30.0)] // duration == window
    #[case(29.5)] // duration slightly below window
    #[case(4.0)] // far below window
    fn single_window_cases(#[case] duration: f64) {
        let windows = plan_windows(duration, &overlapping(30.0, 5.0, 0.0)).unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].index, 1);
        assert_eq!(windows[0].start_seconds, 0.0);
        assert_eq!(windows[0].end_seconds, duration);
        assert_eq!(windows[0].expected_overlap_seconds, 0.0);
    }

    #[test]
    fn fixed_policy_tiles_without_overlap() {
        let config = WindowingConfig {
            policy: WindowPolicy::Fixed,
            window_seconds: 60.0,
            stride_overlap_seconds: 0.0,
            min_window_seconds: 0.0,
        };
        let windows = plan_windows(150.0, &config).unwrap();
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[1].start_seconds, 60.0);
        assert_eq!(windows[2].end_seconds, 150.0);
        assert!(windows.iter().all(|w| w.expected_overlap_seconds == 0.0));
        assert!(union_covers(&windows, 150.0));
    }

    #[test]
    fn fixed_last_window_may_be_short() {
        let config = WindowingConfig {
            policy: WindowPolicy::Fixed,
            window_seconds: 60.0,
            stride_overlap_seconds: 0.0,
            min_window_seconds: 0.0,
        };
        let windows = plan_windows(61.0, &config).unwrap();
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[1].duration_seconds(), 1.0);
    }

    #[rstest]
    #[case(30.0, 30.0)]
    #[case(30.0, 35.0)]
    fn stride_not_below_window_is_rejected(#[case] window: f64, #[case] stride: f64) {
        let result = plan_windows(100.0, &overlapping(window, stride, 0.0));
        assert!(matches!(result, Err(ConfigError::InvalidWindowing { .. })));
    }

    #[test]
    fn indices_are_dense_and_one_based() {
        let windows = plan_windows(200.0, &overlapping(30.0, 5.0, 0.0)).unwrap();
        for (i, w) in windows.iter().enumerate() {
            assert_eq!(w.index, i + 1);
        }
    }

    #[test]
    fn artifact_stem_formats_rounded_seconds() {
        let spec = WindowSpec {
            index: 3,
            start_seconds: 50.0,
            end_seconds: 62.0,
            expected_overlap_seconds: 5.0,
        };
        assert_eq!(spec.artifact_stem(), "chunk_003_50s_62s");
    }
}
