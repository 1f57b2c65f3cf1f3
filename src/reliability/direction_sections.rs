//! Classification of a ray into safe, failing and undefined sections
//!
//! The ray is walked in steps of `dsdu`. Where the class of Z changes
//! inside a step the transition is located with the linear root finder,
//! or by halving when an end point is undefined. The last section runs to
//! [`BETA_MAX`] and the probability mass of the failing sections gives the
//! reliability index of the direction.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::core::error::{ReliabilityError, Result};
use crate::core::root_finder::{LinearRootFinder, RootFinder, XValue};
use crate::core::standard_normal::{self, BETA_MAX};
use crate::entities::settings::{DirectionReliabilitySettings, ModelVaryingType};
use crate::reliability::direction_calculation::DirectionCalculation;

/// Class of a (sign corrected) limit-state value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZType {
    /// Same side as the origin
    Positive,
    /// Opposite side of the origin
    Negative,
    Zero,
    /// Model could not be evaluated
    NaN,
}

impl ZType {
    pub fn of(z: f64) -> Self {
        if z.is_nan() {
            ZType::NaN
        } else if z > 0.0 {
            ZType::Positive
        } else if z < 0.0 {
            ZType::Negative
        } else {
            ZType::Zero
        }
    }

    fn is_sign(self) -> bool {
        matches!(self, ZType::Positive | ZType::Negative)
    }
}

/// Part of a ray with one class of Z
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DirectionSection {
    pub kind: ZType,
    pub u_low: f64,
    pub u_high: f64,
    pub z_low: f64,
    pub z_high: f64,
}

impl DirectionSection {
    pub fn new(kind: ZType, u_low: f64, u_high: f64, z_low: f64, z_high: f64) -> Self {
        Self {
            kind,
            u_low,
            u_high,
            z_low,
            z_high,
        }
    }

    /// One dimensional standard normal mass of the section
    pub fn probability(&self) -> f64 {
        (standard_normal::get_q_from_u(self.u_low) - standard_normal::get_q_from_u(self.u_high))
            .max(0.0)
    }
}

#[derive(Debug, Clone, Copy)]
struct Point {
    u: f64,
    z: f64,
}

/// Direction search for one ray
pub struct DirectionSectionsCalculation<'s> {
    settings: &'s DirectionReliabilitySettings,
}

impl<'s> DirectionSectionsCalculation<'s> {
    pub fn new(settings: &'s DirectionReliabilitySettings) -> Self {
        Self { settings }
    }

    /// Sections of the ray in order of increasing distance
    pub fn get_direction_sections(
        &self,
        calculation: &mut DirectionCalculation<'_>,
    ) -> Result<Vec<DirectionSection>> {
        let settings = self.settings;
        if !(settings.dsdu > 0.0) || !(settings.maximum_length_u > 0.0) {
            return Err(ReliabilityError::InvalidSettings(
                "dsdu and maximum_length_u must be positive".to_string(),
            ));
        }

        let monotone = settings.model_varying_type == ModelVaryingType::Monotone;
        let origin = Point {
            u: 0.0,
            z: calculation.get_z(0.0)?,
        };

        // A precomputed safe end point means no crossing on a monotone ray
        if monotone && ZType::of(origin.z) == ZType::Positive {
            if let Some(z_end) = calculation.known(settings.maximum_length_u) {
                if ZType::of(z_end) == ZType::Positive {
                    return Ok(vec![DirectionSection::new(
                        ZType::Positive,
                        0.0,
                        BETA_MAX,
                        origin.z,
                        z_end,
                    )]);
                }
            }
        }

        let mut sections = Vec::new();
        let mut low = origin;
        let mut crossed = false;

        for k in 1..=settings.section_count() {
            let u_high = (k as f64 * settings.dsdu).min(settings.maximum_length_u);
            let high = Point {
                u: u_high,
                z: calculation.get_z(u_high)?,
            };

            let start = sections.len();
            self.split(calculation, low, high, &mut sections, 0)?;
            let crossing = sections[start..]
                .iter()
                .any(|s| matches!(s.kind, ZType::Negative | ZType::Zero));

            trace!(k, u = u_high, z = high.z, crossing, "Direction section");

            if monotone && crossing {
                break;
            }
            if !monotone && crossed && !crossing && high.z.abs() > low.z.abs() {
                // Moving away from the limit state after a crossing
                break;
            }
            crossed |= crossing;
            low = high;
        }

        let mut sections = merge(sections);
        if let Some(last) = sections.last_mut() {
            if last.u_high < BETA_MAX {
                last.u_high = BETA_MAX;
            }
        }
        Ok(sections)
    }

    /// Sections between two evaluated points, refining class changes
    fn split(
        &self,
        calculation: &mut DirectionCalculation<'_>,
        low: Point,
        high: Point,
        sections: &mut Vec<DirectionSection>,
        depth: usize,
    ) -> Result<()> {
        const MAX_DEPTH: usize = 64;

        let low_type = ZType::of(low.z);
        let high_type = ZType::of(high.z);

        if low_type == high_type {
            sections.push(DirectionSection::new(low_type, low.u, high.u, low.z, high.z));
            return Ok(());
        }

        // A zero end point marks the transition itself
        if low_type == ZType::Zero && high_type.is_sign() {
            sections.push(DirectionSection::new(high_type, low.u, high.u, low.z, high.z));
            return Ok(());
        }
        if high_type == ZType::Zero && low_type.is_sign() {
            sections.push(DirectionSection::new(low_type, low.u, high.u, low.z, high.z));
            return Ok(());
        }

        let width = high.u - low.u;
        if width <= self.settings.epsilon_u_step_size || depth >= MAX_DEPTH {
            let mid = 0.5 * (low.u + high.u);
            sections.push(DirectionSection::new(low_type, low.u, mid, low.z, f64::NAN));
            sections.push(DirectionSection::new(high_type, mid, high.u, f64::NAN, high.z));
            return Ok(());
        }

        if low_type.is_sign() && high_type.is_sign() {
            let root = self.find_root(calculation, low, high)?;
            if root.is_finite() && root > low.u && root < high.u {
                sections.push(DirectionSection::new(low_type, low.u, root, low.z, 0.0));
                sections.push(DirectionSection::new(high_type, root, high.u, 0.0, high.z));
                return Ok(());
            }
        }

        // Undefined end point, or the root finder met an undefined value
        let mid_u = 0.5 * (low.u + high.u);
        let mid = Point {
            u: mid_u,
            z: calculation.get_z(mid_u)?,
        };
        self.split(calculation, low, mid, sections, depth + 1)?;
        self.split(calculation, mid, high, sections, depth + 1)
    }

    fn find_root(
        &self,
        calculation: &mut DirectionCalculation<'_>,
        low: Point,
        high: Point,
    ) -> Result<f64> {
        let finder = LinearRootFinder::new(
            self.settings.epsilon_z_step_size,
            self.settings.epsilon_u_step_size,
            self.settings.maximum_iterations,
        );

        let mut failure = None;
        let root = finder.calculate_value(
            XValue::new(low.u, low.z),
            XValue::new(high.u, high.z),
            0.0,
            &mut |u| match calculation.get_z(u) {
                Ok(z) => z,
                Err(e) => {
                    failure.get_or_insert(e);
                    f64::NAN
                }
            },
        );

        match failure {
            Some(e) => Err(e),
            None => Ok(root),
        }
    }

    /// Reliability index of the direction
    ///
    /// With `find_minimal_value` the distance of the smallest |Z| is
    /// returned instead.
    pub fn get_beta(&self, calculation: &mut DirectionCalculation<'_>) -> Result<f64> {
        let sections = self.get_direction_sections(calculation)?;
        if self.settings.find_minimal_value {
            return Ok(calculation.minimal_value_u());
        }
        Ok(get_beta_from_sections(&sections))
    }
}

/// Joins neighbouring sections of the same class
fn merge(sections: Vec<DirectionSection>) -> Vec<DirectionSection> {
    let mut merged: Vec<DirectionSection> = Vec::with_capacity(sections.len());
    for section in sections {
        match merged.last_mut() {
            Some(last) if last.kind == section.kind => {
                last.u_high = section.u_high;
                last.z_high = section.z_high;
            }
            _ => merged.push(section),
        }
    }
    merged
}

/// Reliability index from the failing mass of the sections
///
/// NaN when neither failing nor safe mass was found.
pub fn get_beta_from_sections(sections: &[DirectionSection]) -> f64 {
    let mut failing = 0.0;
    let mut defined = 0.0;
    for section in sections {
        match section.kind {
            ZType::Negative => {
                failing += section.probability();
                defined += section.probability();
            }
            ZType::Positive | ZType::Zero => defined += section.probability(),
            ZType::NaN => {}
        }
    }

    if defined <= 0.0 {
        return f64::NAN;
    }
    standard_normal::get_u_from_q(failing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model_runner::{ModelRunner, ZEvaluator, ZModel};
    use crate::core::uconverter::UConverter;
    use crate::entities::settings::RunSettings;
    use crate::entities::stochast::Stochast;
    use std::sync::Arc;

    fn runner(evaluator: Arc<dyn ZEvaluator>) -> ModelRunner {
        let converter = UConverter::uncorrelated(vec![
            Stochast::normal("a", 0.0, 1.0),
            Stochast::normal("b", 0.0, 1.0),
        ]);
        let mut runner =
            ModelRunner::new(ZModel::new(evaluator), converter, RunSettings::default()).unwrap();
        runner.initialize_for_run().unwrap();
        runner
    }

    fn beta_along(runner: &ModelRunner, direction: &[f64], settings: &DirectionReliabilitySettings) -> f64 {
        let mut calculation = DirectionCalculation::new(runner, direction, 1.0);
        DirectionSectionsCalculation::new(settings)
            .get_beta(&mut calculation)
            .unwrap()
    }

    #[test]
    fn test_linear_crossing() {
        let runner = runner(Arc::new(|x: &[f64]| 2.5 - x[0]));
        let settings = DirectionReliabilitySettings::default();
        let mut calculation = DirectionCalculation::new(&runner, &[1.0, 0.0], 1.0);
        let sections = DirectionSectionsCalculation::new(&settings)
            .get_direction_sections(&mut calculation)
            .unwrap();

        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].kind, ZType::Positive);
        assert_eq!(sections[1].kind, ZType::Negative);
        assert!((sections[0].u_high - 2.5).abs() < 1e-6);
        assert_eq!(sections[1].u_high, BETA_MAX);

        let beta = get_beta_from_sections(&sections);
        assert!((beta - 2.5).abs() < 1e-6);
    }

    #[test]
    fn test_no_crossing_gives_beta_max() {
        let runner = runner(Arc::new(|x: &[f64]| 2.5 - x[0]));
        let beta = beta_along(&runner, &[-1.0, 0.0], &DirectionReliabilitySettings::default());
        assert_eq!(beta, BETA_MAX);
    }

    #[test]
    fn test_all_nan_direction() {
        let runner = runner(Arc::new(|_: &[f64]| f64::NAN));
        let settings = DirectionReliabilitySettings::default();
        let mut calculation = DirectionCalculation::new(&runner, &[0.0, 1.0], 1.0);
        let sections = DirectionSectionsCalculation::new(&settings)
            .get_direction_sections(&mut calculation)
            .unwrap();

        assert!(sections.iter().all(|s| s.kind == ZType::NaN));
        assert!(get_beta_from_sections(&sections).is_nan());
    }

    #[test]
    fn test_nan_region_around_crossing() {
        // Undefined for 2.5 < u < 3.2, the interpolated root 3.0 falls inside
        let runner = runner(Arc::new(|x: &[f64]| {
            if x[0] > 2.5 && x[0] < 3.2 {
                f64::NAN
            } else {
                3.0 - x[0]
            }
        }));
        let settings = DirectionReliabilitySettings {
            dsdu: 4.0,
            ..Default::default()
        };
        let mut calculation = DirectionCalculation::new(&runner, &[1.0, 0.0], 1.0);
        let sections = DirectionSectionsCalculation::new(&settings)
            .get_direction_sections(&mut calculation)
            .unwrap();

        let kinds: Vec<ZType> = sections.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![ZType::Positive, ZType::NaN, ZType::Negative]);
        assert!((sections[1].u_low - 2.5).abs() < 0.01);
        assert!((sections[1].u_high - 3.2).abs() < 0.01);

        let beta = get_beta_from_sections(&sections);
        assert!((beta - 3.2).abs() < 0.02, "beta = {}", beta);
    }

    #[test]
    fn test_panicking_model_region_treated_as_nan() {
        let runner = runner(Arc::new(|x: &[f64]| {
            if x[0] > 2.5 && x[0] < 3.2 {
                panic!("model crashed at {}", x[0]);
            }
            3.0 - x[0]
        }));
        let settings = DirectionReliabilitySettings {
            dsdu: 4.0,
            ..Default::default()
        };
        let mut calculation = DirectionCalculation::new(&runner, &[1.0, 0.0], 1.0);
        let sections = DirectionSectionsCalculation::new(&settings)
            .get_direction_sections(&mut calculation)
            .unwrap();

        let kinds: Vec<ZType> = sections.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![ZType::Positive, ZType::NaN, ZType::Negative]);
        let beta = get_beta_from_sections(&sections);
        assert!((beta - 3.2).abs() < 0.02, "beta = {}", beta);
    }

    #[test]
    fn test_varying_model_finds_second_crossing() {
        // Failing only between u = 1.5 and u = 2.5
        let z = |x: &[f64]| (x[0] - 2.0).abs() - 0.5;
        let monotone = DirectionReliabilitySettings::default();
        let varying = DirectionReliabilitySettings {
            model_varying_type: ModelVaryingType::Varying,
            ..Default::default()
        };

        let runner = runner(Arc::new(z));
        let mut calculation = DirectionCalculation::new(&runner, &[1.0, 0.0], 1.0);
        let sections = DirectionSectionsCalculation::new(&varying)
            .get_direction_sections(&mut calculation)
            .unwrap();
        let kinds: Vec<ZType> = sections.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![ZType::Positive, ZType::Negative, ZType::Positive]);

        let expected = standard_normal::get_u_from_q(
            standard_normal::get_q_from_u(1.5) - standard_normal::get_q_from_u(2.5),
        );
        let beta = get_beta_from_sections(&sections);
        assert!((beta - expected).abs() < 1e-3);

        // The monotone search stops at the first crossing
        let beta = beta_along(&runner, &[1.0, 0.0], &monotone);
        assert!((beta - 1.5).abs() < 1e-3);
    }

    #[test]
    fn test_find_minimal_value() {
        let runner = runner(Arc::new(|x: &[f64]| (x[0] - 3.0).powi(2) + 1.0));
        let settings = DirectionReliabilitySettings {
            find_minimal_value: true,
            ..Default::default()
        };
        let beta = beta_along(&runner, &[1.0, 0.0], &settings);
        assert_eq!(beta, 3.0);
    }

    #[test]
    fn test_precomputed_safe_end_skips_search() {
        let runner = runner(Arc::new(|_: &[f64]| -> f64 { panic!("model must not be called") }));
        let settings = DirectionReliabilitySettings::default();
        let mut calculation = DirectionCalculation::new(&runner, &[1.0, 0.0], 1.0)
            .with_known_value(0.0, 1.0)
            .with_known_value(settings.maximum_length_u, 5.0);
        let sections = DirectionSectionsCalculation::new(&settings)
            .get_direction_sections(&mut calculation)
            .unwrap();
        assert_eq!(sections.len(), 1);
        assert_eq!(get_beta_from_sections(&sections), BETA_MAX);
    }
}
