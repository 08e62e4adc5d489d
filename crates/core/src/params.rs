//! Physical and economic constants of the hopping/jamming game.
//!
//! A [`Parameters`] value is validated once at construction and never
//! mutated afterwards. The derived SINR thresholds and jammer power levels
//! are computed at the same time, so every holder sees the same numbers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::GameError;

/// Channel bandwidth used to invert the Shannon capacity formula.
pub const BANDWIDTH_HZ: f64 = 10e6;

/// How the single-channel-attack SINR is compared against a rate's threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinrComparison {
    /// The attack defeats the rate when `sinr < limit`.
    #[default]
    Strict,
    /// The attack defeats the rate when `sinr <= limit`.
    Inclusive,
}

impl SinrComparison {
    /// Whether `sinr` is low enough to break a link that needs `limit`.
    #[must_use]
    pub fn below(self, sinr: f64, limit: f64) -> bool {
        match self {
            Self::Strict => sinr < limit,
            Self::Inclusive => sinr <= limit,
        }
    }
}

/// Raw, unvalidated parameter values as they appear in a config file.
///
/// Every field has a default; `m` may be omitted and is then derived
/// from the rate list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParameterSpec {
    /// Number of channels.
    pub k: usize,
    /// Number of rates minus one.
    pub m: Option<usize>,
    /// Available transmission rates in Mbps, increasing.
    pub rates: Vec<f64>,
    /// Bound on the jammer's expected power.
    pub p_avg: f64,
    /// Maximum jammer power on a single channel.
    pub p_max: f64,
    /// Cost of a channel hop (Mbps).
    pub c: f64,
    /// Cost of being jammed (Mbps).
    pub l: f64,
    /// Channels the jammer can sweep or listen to per turn.
    pub n: usize,
    /// Attenuation of the jammer's power at the receiver.
    pub alpha: f64,
    /// Receiver noise variance.
    pub sigma_squared: f64,
    /// Received signal power.
    pub p_recv: f64,
    /// Turns in one repeated game.
    pub t: usize,
    /// SINR comparison used for single-channel attacks.
    pub sinr_comparison: SinrComparison,
}

const DEFAULT_P_MAX: f64 = 2.0;
const DEFAULT_P_AVG_FRACTION: f64 = 0.4;

impl Default for ParameterSpec {
    fn default() -> Self {
        Self {
            k: 4,
            m: Some(7),
            rates: vec![6.0, 9.0, 12.0, 18.0, 24.0, 36.0, 48.0, 54.0],
            p_avg: DEFAULT_P_AVG_FRACTION * DEFAULT_P_MAX,
            p_max: DEFAULT_P_MAX,
            c: 50.0,
            l: 25.0,
            n: 1,
            alpha: 1.0,
            sigma_squared: 0.01,
            p_recv: 1.0,
            t: 500,
            sinr_comparison: SinrComparison::Strict,
        }
    }
}

impl ParameterSpec {
    /// Default spec with a different rate list; `m` follows the rates.
    #[must_use]
    pub fn with_rates(rates: Vec<f64>) -> Self {
        Self {
            m: None,
            rates,
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<(), GameError> {
        let invalid = |msg: String| Err(GameError::InvalidConfiguration(msg));

        if self.rates.is_empty() {
            return invalid("rates cannot be empty".to_string());
        }
        if let Some(m) = self.m {
            if m != self.rates.len() - 1 {
                return invalid(format!(
                    "expected m == len(rates) - 1 = {}, got m = {m}",
                    self.rates.len() - 1
                ));
            }
        }
        if self.k == 0 {
            return invalid("k must be at least 1".to_string());
        }
        if self.n == 0 || self.n > self.k {
            return invalid(format!("n must be in 1..={}, got {}", self.k, self.n));
        }
        if self.t == 0 {
            return invalid("t must be at least 1".to_string());
        }
        if let Some(rate) = self.rates.iter().find(|&&r| !(r > 0.0 && r.is_finite())) {
            return invalid(format!("rates must be positive, got {rate}"));
        }
        if self.rates.windows(2).any(|w| w[0] >= w[1]) {
            return invalid(format!("rates must be strictly increasing: {:?}", self.rates));
        }
        for (name, value) in [
            ("alpha", self.alpha),
            ("sigma_squared", self.sigma_squared),
            ("p_recv", self.p_recv),
            ("p_max", self.p_max),
        ] {
            if !(value > 0.0 && value.is_finite()) {
                return invalid(format!("{name} must be positive, got {value}"));
            }
        }
        if !(self.p_avg >= 0.0 && self.p_avg.is_finite()) {
            return invalid(format!("p_avg must be non-negative, got {}", self.p_avg));
        }
        if !(self.c.is_finite() && self.l.is_finite()) {
            return invalid("hop and jamming costs must be finite".to_string());
        }
        Ok(())
    }
}

/// Validated parameter set with derived SINR limits and jammer power levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ParameterSpec", into = "ParameterSpec")]
pub struct Parameters {
    k: usize,
    m: usize,
    rates: Vec<f64>,
    p_avg: f64,
    p_max: f64,
    c: f64,
    l: f64,
    n: usize,
    alpha: f64,
    sigma_squared: f64,
    p_recv: f64,
    t: usize,
    sinr_comparison: SinrComparison,
    sinr_limits: Vec<f64>,
    p_jam: Vec<f64>,
}

impl Parameters {
    /// Validate a spec and derive the SINR limits and power levels.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidConfiguration`] if `m != len(rates) - 1`
    /// or any other constant is out of range.
    pub fn new(spec: ParameterSpec) -> Result<Self, GameError> {
        spec.validate()?;
        Ok(Self::derive(spec))
    }

    fn derive(spec: ParameterSpec) -> Self {
        let m = spec.rates.len() - 1;
        let sinr_limits: Vec<f64> = spec
            .rates
            .iter()
            .map(|&rate| 2f64.powf(rate * 1e6 / BANDWIDTH_HZ) - 1.0)
            .collect();

        // Level 0 is idle; level j denies rate index m - (j - 1).
        let mut p_jam = Vec::with_capacity(m + 2);
        p_jam.push(0.0);
        p_jam.extend((0..=m).map(|j| {
            let power = (spec.p_recv / sinr_limits[m - j] - spec.sigma_squared) / spec.alpha;
            power.max(0.0)
        }));

        Self {
            k: spec.k,
            m,
            rates: spec.rates,
            p_avg: spec.p_avg,
            p_max: spec.p_max,
            c: spec.c,
            l: spec.l,
            n: spec.n,
            alpha: spec.alpha,
            sigma_squared: spec.sigma_squared,
            p_recv: spec.p_recv,
            t: spec.t,
            sinr_comparison: spec.sinr_comparison,
            sinr_limits,
            p_jam,
        }
    }

    /// Copy of this parameter set with a different horizon.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidConfiguration`] if `t` is zero.
    pub fn with_horizon(&self, t: usize) -> Result<Self, GameError> {
        let mut spec = ParameterSpec::from(self.clone());
        spec.t = t;
        Self::new(spec)
    }

    #[must_use]
    pub fn k(&self) -> usize {
        self.k
    }

    #[must_use]
    pub fn m(&self) -> usize {
        self.m
    }

    #[must_use]
    pub fn rates(&self) -> &[f64] {
        &self.rates
    }

    /// Rate in Mbps for a rate index.
    #[must_use]
    pub fn rate(&self, rate_index: usize) -> f64 {
        self.rates[rate_index]
    }

    #[must_use]
    pub fn rate_count(&self) -> usize {
        self.m + 1
    }

    #[must_use]
    pub fn p_avg(&self) -> f64 {
        self.p_avg
    }

    #[must_use]
    pub fn p_max(&self) -> f64 {
        self.p_max
    }

    /// Channel-hop cost `c`.
    #[must_use]
    pub fn hop_cost(&self) -> f64 {
        self.c
    }

    /// Jamming-detection cost `l`.
    #[must_use]
    pub fn jam_cost(&self) -> f64 {
        self.l
    }

    /// Jammer sweep/listen width.
    #[must_use]
    pub fn n(&self) -> usize {
        self.n
    }

    #[must_use]
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    #[must_use]
    pub fn sigma_squared(&self) -> f64 {
        self.sigma_squared
    }

    #[must_use]
    pub fn p_recv(&self) -> f64 {
        self.p_recv
    }

    /// Turns per repeated game.
    #[must_use]
    pub fn t(&self) -> usize {
        self.t
    }

    #[must_use]
    pub fn sinr_comparison(&self) -> SinrComparison {
        self.sinr_comparison
    }

    /// Minimum SINR needed to sustain each rate.
    #[must_use]
    pub fn sinr_limits(&self) -> &[f64] {
        &self.sinr_limits
    }

    /// Jammer power per power level (`m + 2` entries, level 0 idle).
    #[must_use]
    pub fn p_jam(&self) -> &[f64] {
        &self.p_jam
    }

    #[must_use]
    pub fn power_level_count(&self) -> usize {
        self.p_jam.len()
    }

    /// Largest count of consecutive undetected transmissions, `ceil(k / n)`.
    #[must_use]
    pub fn max_undetected(&self) -> usize {
        self.k.div_ceil(self.n)
    }

    /// SINR at the receiver under a targeted attack, where the jammer's
    /// interference is `alpha * n * p_jam[power_index]`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn single_channel_attack_sinr(&self, power_index: usize) -> f64 {
        self.p_recv / (self.alpha * self.n as f64 * self.p_jam[power_index] + self.sigma_squared)
    }

    /// Whether power level `power_index` denies `rate_index` outright.
    #[must_use]
    pub fn denies_rate(&self, power_index: usize, rate_index: usize) -> bool {
        power_index + rate_index > self.m
    }

    /// Whether a targeted attack at `power_index` pushes the SINR under
    /// the threshold of `rate_index`.
    #[must_use]
    pub fn attack_defeats_rate(&self, power_index: usize, rate_index: usize) -> bool {
        self.sinr_comparison.below(
            self.single_channel_attack_sinr(power_index),
            self.sinr_limits[rate_index],
        )
    }

    /// Expected jammer power `Σ y[i]·p_jam[i]`.
    #[must_use]
    pub fn expected_power(&self, y: &[f64]) -> f64 {
        y.iter().zip(&self.p_jam).map(|(p, power)| p * power).sum()
    }
}

impl Default for Parameters {
    fn default() -> Self {
        Self::derive(ParameterSpec::default())
    }
}

impl TryFrom<ParameterSpec> for Parameters {
    type Error = GameError;

    fn try_from(spec: ParameterSpec) -> Result<Self, Self::Error> {
        Self::new(spec)
    }
}

impl From<Parameters> for ParameterSpec {
    fn from(params: Parameters) -> Self {
        Self {
            k: params.k,
            m: Some(params.m),
            rates: params.rates,
            p_avg: params.p_avg,
            p_max: params.p_max,
            c: params.c,
            l: params.l,
            n: params.n,
            alpha: params.alpha,
            sigma_squared: params.sigma_squared,
            p_recv: params.p_recv,
            t: params.t,
            sinr_comparison: params.sinr_comparison,
        }
    }
}

impl fmt::Display for Parameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Game parameters")?;
        writeln!(f, "  channels (k):            {}", self.k)?;
        writeln!(f, "  rates (m + 1 = {}):       {:?} Mbps", self.m + 1, self.rates)?;
        writeln!(f, "  jammer avg power bound:  {}", self.p_avg)?;
        writeln!(f, "  jammer max power:        {}", self.p_max)?;
        writeln!(f, "  hop cost (c):            {} Mbps", self.c)?;
        writeln!(f, "  jamming cost (l):        {} Mbps", self.l)?;
        writeln!(f, "  sweep/listen width (n):  {}", self.n)?;
        writeln!(f, "  alpha:                   {}", self.alpha)?;
        writeln!(f, "  sigma^2:                 {}", self.sigma_squared)?;
        writeln!(f, "  received power:          {}", self.p_recv)?;
        writeln!(f, "  turns (t):               {}", self.t)?;
        writeln!(f, "  SINR comparison:         {:?}", self.sinr_comparison)?;
        writeln!(f, "Derived")?;
        writeln!(f, "  SINR limits:             {:.4?}", self.sinr_limits)?;
        write!(f, "  jammer power levels:     {:.4?}", self.p_jam)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;
    use test_macros::timed_test;

    #[timed_test]
    fn default_parameters_validate() {
        let params = Parameters::new(ParameterSpec::default()).unwrap();
        assert_eq!(params, Parameters::default());
        assert_eq!(params.m(), 7);
        assert_eq!(params.rate_count(), 8);
        assert_eq!(params.power_level_count(), 9);
        assert_eq!(params.max_undetected(), 4);
    }

    #[timed_test]
    fn mismatched_m_fails() {
        let spec = ParameterSpec {
            m: Some(3),
            ..ParameterSpec::default()
        };
        let err = Parameters::new(spec).unwrap_err();
        assert!(matches!(err, GameError::InvalidConfiguration(_)));
        assert!(err.to_string().contains("len(rates) - 1"));
    }

    #[timed_test]
    fn omitted_m_follows_rates() {
        let params = Parameters::new(ParameterSpec::with_rates(vec![24.0])).unwrap();
        assert_eq!(params.m(), 0);
        assert_eq!(params.power_level_count(), 2);
    }

    #[timed_test]
    fn sweep_wider_than_band_fails() {
        let spec = ParameterSpec {
            n: 5,
            ..ParameterSpec::default()
        };
        assert!(matches!(
            Parameters::new(spec),
            Err(GameError::InvalidConfiguration(_))
        ));
    }

    #[timed_test]
    fn unsorted_rates_fail() {
        let spec = ParameterSpec::with_rates(vec![6.0, 12.0, 9.0]);
        assert!(Parameters::new(spec).is_err());
    }

    #[timed_test]
    fn sinr_limits_strictly_increase_with_rate() {
        let params = Parameters::default();
        let limits = params.sinr_limits();
        assert!(limits.windows(2).all(|w| w[0] < w[1]), "{limits:?}");
        // 54 Mbps over 10 MHz needs 2^5.4 - 1
        assert!((limits[7] - (2f64.powf(5.4) - 1.0)).abs() < 1e-12);
    }

    #[timed_test]
    fn power_levels_are_non_negative_and_increasing() {
        let params = Parameters::default();
        let p_jam = params.p_jam();
        assert_eq!(p_jam[0], 0.0);
        assert!(p_jam.iter().all(|&p| p >= 0.0));
        assert!(p_jam.windows(2).all(|w| w[0] <= w[1]), "{p_jam:?}");
        assert!(p_jam[p_jam.len() - 1] <= params.p_max());
    }

    #[timed_test]
    fn lowest_active_level_just_denies_top_rate() {
        let params = Parameters::default();
        let m = params.m();
        let expected = (params.p_recv() / params.sinr_limits()[m] - params.sigma_squared())
            / params.alpha();
        assert!((params.p_jam()[1] - expected).abs() < 1e-12);
        assert!(params.denies_rate(1, m));
        assert!(!params.denies_rate(1, m - 1));
        assert!(!params.denies_rate(0, m));
        assert!(params.denies_rate(m + 1, 0));
    }

    #[timed_test]
    fn idle_jammer_leaves_noise_limited_sinr() {
        let params = Parameters::default();
        assert!((params.single_channel_attack_sinr(0) - 100.0).abs() < 1e-9);
        for rate in 0..params.rate_count() {
            assert!(!params.attack_defeats_rate(0, rate));
        }
    }

    #[timed_test]
    fn attack_interference_scales_with_listen_width() {
        let spec = ParameterSpec {
            n: 2,
            ..ParameterSpec::default()
        };
        let params = Parameters::new(spec).unwrap();
        for level in 1..params.power_level_count() {
            let interference = params.alpha() * 2.0 * params.p_jam()[level];
            let expected = params.p_recv() / (interference + params.sigma_squared());
            assert!((params.single_channel_attack_sinr(level) - expected).abs() < 1e-9);
        }
    }

    #[timed_test]
    fn comparison_policy_differs_only_at_equality() {
        assert!(!SinrComparison::Strict.below(2.0, 2.0));
        assert!(SinrComparison::Inclusive.below(2.0, 2.0));
        assert!(SinrComparison::Strict.below(1.0, 2.0));
        assert!(!SinrComparison::Inclusive.below(3.0, 2.0));
    }

    #[timed_test]
    fn expected_power_weights_levels() {
        let params = Parameters::default();
        let mut y = vec![0.0; params.power_level_count()];
        y[2] = 0.5;
        y[4] = 0.5;
        let expected = 0.5 * params.p_jam()[2] + 0.5 * params.p_jam()[4];
        assert!((params.expected_power(&y) - expected).abs() < 1e-12);
    }

    #[timed_test]
    fn parses_from_yaml_with_defaults() {
        let yaml = "k: 5\nn: 2\nt: 100\nsinr_comparison: inclusive\n";
        let params: Parameters = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(params.k(), 5);
        assert_eq!(params.n(), 2);
        assert_eq!(params.t(), 100);
        assert_eq!(params.max_undetected(), 3);
        assert_eq!(params.sinr_comparison(), SinrComparison::Inclusive);
        assert_eq!(params.rates().len(), 8);
    }

    #[timed_test]
    fn invalid_yaml_values_are_rejected() {
        let yaml = "m: 2\n";
        let result: Result<Parameters, _> = serde_yaml::from_str(yaml);
        assert!(result.is_err());
    }

    #[timed_test]
    fn with_horizon_keeps_everything_else() {
        let params = Parameters::default();
        let short = params.with_horizon(1).unwrap();
        assert_eq!(short.t(), 1);
        assert_eq!(short.p_jam(), params.p_jam());
        assert!(params.with_horizon(0).is_err());
    }

    #[timed_test]
    fn display_lists_derived_values() {
        let text = Parameters::default().to_string();
        assert!(text.contains("channels (k):"));
        assert!(text.contains("jammer power levels"));
    }
}
