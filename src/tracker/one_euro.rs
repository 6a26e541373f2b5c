use crate::config::SmootherConfig;

/// alpha = 1 / (1 + tau/Te), tau = 1/(2*pi*fc)
pub(crate) fn smoothing_factor(te: f64, cutoff: f64) -> f64 {
    let r = 2.0 * std::f64::consts::PI * cutoff * te;
    r / (r + 1.0)
}

/// Per-channel memory of the One Euro filter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterState {
    /// Last filtered value
    pub value: f64,
    /// Last low-passed derivative (units/s)
    pub derivative: f64,
    /// Timestamp of the last accepted sample (seconds)
    pub timestamp: f64,
}

impl FilterState {
    fn start(value: f64, timestamp: f64) -> Self {
        Self {
            value,
            derivative: 0.0,
            timestamp,
        }
    }
}

/// What a single filter step did with its sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// No history yet; state seeded, raw returned
    First,
    /// Normal low-pass step
    Smoothed,
    /// Non-positive, non-monotonic or oversized dt; state reseeded, raw returned
    Discontinuity,
    /// Non-finite sample or timestamp; state untouched, raw returned
    Skipped,
}

/// One Euro Filter parameters. Stateless: the caller owns one
/// `Option<FilterState>` per channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OneEuroFilter {
    min_cutoff: f64,
    beta: f64,
    d_cutoff: f64,
    max_cutoff: f64,
    gap_threshold: f64,
}

impl OneEuroFilter {
    pub fn new(min_cutoff: f64, beta: f64, d_cutoff: f64) -> Self {
        Self::from_config(&SmootherConfig {
            min_cutoff,
            beta,
            derivative_cutoff: d_cutoff,
            ..SmootherConfig::default()
        })
    }

    pub fn from_config(config: &SmootherConfig) -> Self {
        Self {
            min_cutoff: config.min_cutoff,
            beta: config.beta,
            d_cutoff: config.derivative_cutoff,
            max_cutoff: config.max_cutoff.max(config.min_cutoff),
            gap_threshold: config.gap_threshold_secs,
        }
    }

    pub fn gap_threshold(&self) -> f64 {
        self.gap_threshold
    }

    /// Adaptive cutoff for a given derivative magnitude
    fn cutoff(&self, derivative: f64) -> f64 {
        (self.min_cutoff + self.beta * derivative.abs()).min(self.max_cutoff)
    }

    pub fn filter(&self, state: &mut Option<FilterState>, raw: f64, timestamp: f64) -> (f64, StepKind) {
        if !raw.is_finite() || !timestamp.is_finite() {
            return (raw, StepKind::Skipped);
        }

        let prev = match *state {
            Some(prev) => prev,
            None => {
                *state = Some(FilterState::start(raw, timestamp));
                return (raw, StepKind::First);
            }
        };

        let dt = timestamp - prev.timestamp;
        if dt <= 0.0 || dt > self.gap_threshold {
            *state = Some(FilterState::start(raw, timestamp));
            return (raw, StepKind::Discontinuity);
        }

        let dx = (raw - prev.value) / dt;
        let a_d = smoothing_factor(dt, self.d_cutoff);
        let edx = a_d * dx + (1.0 - a_d) * prev.derivative;

        let a = smoothing_factor(dt, self.cutoff(edx));
        let value = a * raw + (1.0 - a) * prev.value;

        *state = Some(FilterState {
            value,
            derivative: edx,
            timestamp,
        });
        (value, StepKind::Smoothed)
    }
}

impl Default for OneEuroFilter {
    fn default() -> Self {
        Self::from_config(&SmootherConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f64 = 1.0 / 30.0;

    #[test]
    fn test_smoothing_factor_bounds() {
        // alpha should be between 0 and 1
        for &cutoff in &[0.1, 1.0, 10.0, 100.0] {
            for &te in &[0.001, 0.01, 0.033, 0.1] {
                let alpha = smoothing_factor(te, cutoff);
                assert!(alpha > 0.0 && alpha < 1.0, "alpha={} for te={}, cutoff={}", alpha, te, cutoff);
            }
        }
    }

    #[test]
    fn test_passthrough_first() {
        let f = OneEuroFilter::new(1.0, 0.0, 1.0);
        let mut state = None;
        assert_eq!(f.filter(&mut state, 5.0, 0.0), (5.0, StepKind::First));
        assert_eq!(state.unwrap().value, 5.0);
    }

    #[test]
    fn test_smooths() {
        let f = OneEuroFilter::new(1.0, 0.0, 1.0);
        let mut state = None;
        f.filter(&mut state, 0.0, 0.0);
        let (result, kind) = f.filter(&mut state, 10.0, DT);
        assert_eq!(kind, StepKind::Smoothed);
        // With min_cutoff=1.0, beta=0, the filter should smooth significantly
        assert!(result < 10.0, "Expected smoothing, got {}", result);
        assert!(result > 0.0, "Expected positive value, got {}", result);
    }

    #[test]
    fn test_high_beta_responsive() {
        let low = OneEuroFilter::new(1.0, 0.0, 1.0);
        let high = OneEuroFilter::new(1.0, 1.0, 1.0);
        let (mut s_low, mut s_high) = (None, None);

        low.filter(&mut s_low, 0.0, 0.0);
        high.filter(&mut s_high, 0.0, 0.0);
        let (r_low, _) = low.filter(&mut s_low, 10.0, DT);
        let (r_high, _) = high.filter(&mut s_high, 10.0, DT);

        assert!(r_high > r_low, "High beta ({}) should be more responsive than low beta ({})", r_high, r_low);
    }

    #[test]
    fn test_cutoff_clamped() {
        // A huge beta would push the cutoff far past max_cutoff
        let f = OneEuroFilter::from_config(&SmootherConfig {
            beta: 1e6,
            max_cutoff: 10.0,
            ..SmootherConfig::default()
        });
        let mut state = None;
        f.filter(&mut state, 0.0, 0.0);
        let (result, _) = f.filter(&mut state, 1.0, DT);
        let expected = smoothing_factor(DT, 10.0);
        assert!((result - expected).abs() < 1e-12, "expected {}, got {}", expected, result);
        assert!(result < 1.0);
    }

    #[test]
    fn test_zero_dt_is_discontinuity() {
        let f = OneEuroFilter::default();
        let mut state = None;
        f.filter(&mut state, 0.0, 1.0);
        let (result, kind) = f.filter(&mut state, 3.0, 1.0);
        assert_eq!(kind, StepKind::Discontinuity);
        assert_eq!(result, 3.0);
        assert!(result.is_finite());
    }

    #[test]
    fn test_backwards_time_is_discontinuity() {
        let f = OneEuroFilter::default();
        let mut state = None;
        f.filter(&mut state, 0.0, 1.0);
        let (result, kind) = f.filter(&mut state, 2.0, 0.5);
        assert_eq!((result, kind), (2.0, StepKind::Discontinuity));
        assert_eq!(state.unwrap().timestamp, 0.5);
    }

    #[test]
    fn test_gap_is_discontinuity() {
        let f = OneEuroFilter::default();
        let mut state = None;
        f.filter(&mut state, 0.0, 0.0);
        let (result, kind) = f.filter(&mut state, 1.0, 0.31);
        assert_eq!((result, kind), (1.0, StepKind::Discontinuity));
        // Gap just under the threshold still filters
        let (_, kind) = f.filter(&mut state, 1.5, 0.6);
        assert_eq!(kind, StepKind::Smoothed);
    }

    #[test]
    fn test_non_finite_skipped() {
        let f = OneEuroFilter::default();
        let mut state = None;
        f.filter(&mut state, 0.5, 0.0);
        let before = state;

        let (result, kind) = f.filter(&mut state, f64::NAN, DT);
        assert!(result.is_nan());
        assert_eq!(kind, StepKind::Skipped);
        assert_eq!(state, before);

        let (result, kind) = f.filter(&mut state, f64::INFINITY, 2.0 * DT);
        assert_eq!(result, f64::INFINITY);
        assert_eq!(kind, StepKind::Skipped);
        assert_eq!(state, before);

        let (_, kind) = f.filter(&mut state, 0.5, f64::NAN);
        assert_eq!(kind, StepKind::Skipped);
        assert_eq!(state, before);
    }

    #[test]
    fn test_constant_input_is_fixed_point() {
        let f = OneEuroFilter::default();
        let mut state = None;
        for i in 0..30 {
            let (v, _) = f.filter(&mut state, 0.42, i as f64 * DT);
            assert!((v - 0.42).abs() < 1e-12);
        }
    }
}
