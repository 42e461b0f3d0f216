// THEORY:
// The `heuristics` module holds the engineering estimates layered on top of the
// tracked fronts: front strength, per-step energy, field oscillation, collision
// spikes and the thrust / specific-impulse performance figures.
//
// None of these is a first-principles computation. Each one is a small formula
// whose constants are configuration, with its assumptions written next to it, so
// a result never carries a number of hidden origin. Every estimate is total: a
// missing field yields 0 or `None`, never NaN.

use crate::core_modules::aggregator::SystemSnapshot;
use crate::core_modules::front_builder::DetectedFront;
use crate::core_modules::tracker::Front;
use serde::{Deserialize, Serialize};

/// Front strength as the ratio of a front's peak `field` to an ambient value.
///
/// With the defaults this is the peak-to-ambient temperature ratio, assuming an
/// ambient of 300 K regardless of what the case was initialised with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrengthHeuristic {
    pub field: String,
    pub ambient: f64,
}

impl Default for StrengthHeuristic {
    fn default() -> Self {
        Self { field: "T".to_string(), ambient: 300.0 }
    }
}

impl StrengthHeuristic {
    pub fn strength(&self, front: &DetectedFront) -> Option<f64> {
        if !(self.ambient > 0.0) {
            return None;
        }
        front.peak(&self.field).map(|peak| peak / self.ambient)
    }
}

/// Per-step energy proxy: `scale · Σ peak_pressure · peak_temperature` over the
/// active fronts.
///
/// Assumes each front's energy content grows with the product of its peak
/// pressure and temperature. Fronts lacking either peak contribute nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepEnergyHeuristic {
    pub pressure_field: String,
    pub temperature_field: String,
    pub scale: f64,
}

impl Default for StepEnergyHeuristic {
    fn default() -> Self {
        Self { pressure_field: "p".to_string(), temperature_field: "T".to_string(), scale: 1.0e-3 }
    }
}

impl StepEnergyHeuristic {
    pub fn total<'a>(&self, fronts: impl IntoIterator<Item = &'a Front>) -> f64 {
        fronts
            .into_iter()
            .filter_map(|f| Some(f.shape.peak(&self.pressure_field)? * f.shape.peak(&self.temperature_field)?))
            .sum::<f64>()
            * self.scale
    }
}

/// Root-mean-square deviation of a field from its own mean over one snapshot.
/// Non-finite samples are ignored; `None` when nothing finite remains.
pub fn field_oscillation(values: &[f64]) -> Option<f64> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }
    let n = finite.len() as f64;
    let mean = finite.iter().sum::<f64>() / n;
    Some((finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt())
}

/// Peak pressure and temperature spikes of a collision: the larger of the two
/// fronts' peaks, amplified by a fixed factor.
///
/// Assumes the interaction overshoots the stronger incoming front by a constant
/// ratio (20 % in pressure, 10 % in temperature by default).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpikeHeuristic {
    pub pressure_field: String,
    pub pressure_factor: f64,
    pub temperature_field: String,
    pub temperature_factor: f64,
}

impl Default for SpikeHeuristic {
    fn default() -> Self {
        Self {
            pressure_field: "p".to_string(),
            pressure_factor: 1.2,
            temperature_field: "T".to_string(),
            temperature_factor: 1.1,
        }
    }
}

impl SpikeHeuristic {
    /// `(pressure_spike, temperature_spike)`; 0 for a field neither front has.
    pub fn spikes(&self, a: &Front, b: &Front) -> (f64, f64) {
        let spike = |field: &str, factor: f64| {
            [a, b].iter().filter_map(|f| f.shape.peak(field)).reduce(f64::max).map_or(0.0, |peak| peak * factor)
        };
        (
            spike(self.pressure_field.as_str(), self.pressure_factor),
            spike(self.temperature_field.as_str(), self.temperature_factor),
        )
    }
}

/// Thrust and specific-impulse estimates for the whole run.
///
/// Thrust per step is the mean peak pressure of the active fronts acting on the
/// annular area; the run's thrust is the mean over steps, with frontless steps
/// contributing zero. Specific impulse is `thrust / (mass_flow_rate · gravity)`
/// and is only reported when a mass flow rate is configured, since none can be
/// read from the fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceHeuristic {
    pub pressure_field: String,
    /// Combustor annulus cross-section (m²).
    pub annular_area: f64,
    /// Propellant mass flow (kg/s).
    pub mass_flow_rate: Option<f64>,
    /// Standard gravity (m/s²).
    pub gravity: f64,
}

impl Default for PerformanceHeuristic {
    fn default() -> Self {
        Self { pressure_field: "p".to_string(), annular_area: 0.01, mass_flow_rate: None, gravity: 9.81 }
    }
}

/// Output of `PerformanceHeuristic::estimate`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceEstimate {
    /// Newtons.
    pub thrust: f64,
    /// Seconds; `None` without a configured mass flow rate.
    pub specific_impulse: Option<f64>,
}

impl PerformanceHeuristic {
    pub fn estimate(&self, history: &[SystemSnapshot]) -> PerformanceEstimate {
        if history.is_empty() {
            return PerformanceEstimate::default();
        }
        let per_step: f64 = history
            .iter()
            .map(|snapshot| {
                let peaks: Vec<f64> = snapshot.active_fronts().filter_map(|f| f.shape.peak(&self.pressure_field)).collect();
                if peaks.is_empty() { 0.0 } else { peaks.iter().sum::<f64>() / peaks.len() as f64 * self.annular_area }
            })
            .sum();
        let thrust = per_step / history.len() as f64;
        let specific_impulse = self.mass_flow_rate.filter(|m| *m > 0.0).map(|m| thrust / (m * self.gravity));
        PerformanceEstimate { thrust, specific_impulse }
    }
}

/// Every heuristic estimate of a run, configured together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsHeuristics {
    pub strength: StrengthHeuristic,
    pub step_energy: StepEnergyHeuristic,
    pub spikes: SpikeHeuristic,
    pub performance: PerformanceHeuristic,
    /// Field whose spread across a snapshot is reported as `pressure_oscillation`.
    pub oscillation_field: String,
}

impl Default for PhysicsHeuristics {
    fn default() -> Self {
        Self {
            strength: StrengthHeuristic::default(),
            step_energy: StepEnergyHeuristic::default(),
            spikes: SpikeHeuristic::default(),
            performance: PerformanceHeuristic::default(),
            oscillation_field: "p".to_string(),
        }
    }
}

impl PhysicsHeuristics {
    /// Fields the heuristics read peaks or samples of.
    pub fn fields(&self) -> Vec<&str> {
        vec![
            self.strength.field.as_str(),
            self.step_energy.pressure_field.as_str(),
            self.step_energy.temperature_field.as_str(),
            self.spikes.pressure_field.as_str(),
            self.spikes.temperature_field.as_str(),
            self.performance.pressure_field.as_str(),
            self.oscillation_field.as_str(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::geometry::Coordinate;
    use std::collections::BTreeMap;

    fn shape(peaks: &[(&str, f64)]) -> DetectedFront {
        DetectedFront {
            coordinates: vec![Coordinate::polar(0.065, 1.0)],
            mean_radius: 0.065,
            center_angle: 1.0,
            angular_span: 0.0,
            mean_axial: 0.0,
            axial_span: 0.0,
            peak_values: peaks.iter().map(|(k, v)| (k.to_string(), *v)).collect::<BTreeMap<_, _>>(),
            strength: None,
        }
    }

    fn front(id: u64, peaks: &[(&str, f64)]) -> Front {
        Front { id, detection_time: 0.0, observed_at: 0.0, shape: shape(peaks), speed: 0.0, age: 1, active: true }
    }

    #[test]
    fn strength_is_peak_over_ambient() {
        let heuristic = StrengthHeuristic::default();
        assert_eq!(heuristic.strength(&shape(&[("T", 3000.0)])), Some(10.0));
        assert_eq!(heuristic.strength(&shape(&[("p", 3.0e6)])), None);
        let broken = StrengthHeuristic { ambient: 0.0, ..StrengthHeuristic::default() };
        assert_eq!(broken.strength(&shape(&[("T", 3000.0)])), None);
    }

    #[test]
    fn step_energy_sums_fronts_with_both_peaks() {
        let fronts = [
            front(1, &[("p", 2.0e6), ("T", 3000.0)]),
            front(2, &[("p", 1.0e6), ("T", 2000.0)]),
            front(3, &[("p", 5.0e6)]),
        ];
        let total = StepEnergyHeuristic::default().total(fronts.iter());
        assert!((total - (6.0e9 + 2.0e9) * 1.0e-3).abs() < 1e-3);
        assert_eq!(StepEnergyHeuristic::default().total(std::iter::empty()), 0.0);
    }

    #[test]
    fn oscillation_is_rms_about_the_mean() {
        assert_eq!(field_oscillation(&[]), None);
        assert_eq!(field_oscillation(&[f64::NAN]), None);
        assert_eq!(field_oscillation(&[5.0, 5.0, 5.0]), Some(0.0));
        let rms = field_oscillation(&[1.0, 3.0, f64::INFINITY]).unwrap();
        assert!((rms - 1.0).abs() < 1e-12);
    }

    #[test]
    fn spikes_amplify_the_stronger_front() {
        let a = front(1, &[("p", 2.0e6), ("T", 2000.0)]);
        let b = front(2, &[("p", 3.0e6)]);
        let (pressure, temperature) = SpikeHeuristic::default().spikes(&a, &b);
        assert!((pressure - 3.6e6).abs() < 1e-6);
        assert!((temperature - 2200.0).abs() < 1e-9);

        let bare = front(3, &[]);
        assert_eq!(SpikeHeuristic::default().spikes(&bare, &bare), (0.0, 0.0));
    }

    #[test]
    fn performance_averages_thrust_over_steps() {
        let busy = SystemSnapshot::new(
            0,
            0.0,
            vec![front(1, &[("p", 2.0e6)]), front(2, &[("p", 4.0e6)])],
            Vec::new(),
        );
        let quiet = SystemSnapshot::new(1, 1e-5, Vec::new(), Vec::new());

        let heuristic = PerformanceHeuristic::default();
        let estimate = heuristic.estimate(&[busy.clone(), quiet]);
        // (3e6 · 0.01 + 0) / 2
        assert!((estimate.thrust - 1.5e4).abs() < 1e-6);
        assert_eq!(estimate.specific_impulse, None);

        let fed = PerformanceHeuristic { mass_flow_rate: Some(2.0), ..PerformanceHeuristic::default() };
        let isp = fed.estimate(&[busy]).specific_impulse.unwrap();
        assert!((isp - 3.0e4 / (2.0 * 9.81)).abs() < 1e-9);

        assert_eq!(heuristic.estimate(&[]), PerformanceEstimate::default());
    }
}
