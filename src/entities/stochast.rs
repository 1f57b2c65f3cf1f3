//! Stochast entity - a random input variable of a limit-state model
//!
//! A stochast combines a distribution family with its properties and the
//! truncated/inverted flags. A variable stochast takes its properties from
//! an interpolation table keyed by the realized value of another stochast.

use serde::{Deserialize, Serialize};

use crate::core::validation::ValidationReport;
use crate::entities::distributions::{
    create_distribution, Distribution, DistributionType, Inverted, StochastProperties, Truncated,
};

/// Properties valid at one value of the source stochast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableStochastValue {
    /// Realized x of the source stochast
    pub x: f64,

    #[serde(flatten)]
    pub properties: StochastProperties,
}

/// Interpolation table for a variable stochast
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariableStochastValuesSet {
    pub values: Vec<VariableStochastValue>,
}

impl VariableStochastValuesSet {
    /// Sort by source value; interpolation relies on it
    pub fn sort(&mut self) {
        self.values
            .sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal));
    }

    /// Linearly interpolated properties, clamped to the first/last entry
    pub fn interpolate(&self, x: f64) -> Option<StochastProperties> {
        let first = self.values.first()?;
        let last = self.values.last()?;

        if x.is_nan() {
            return None;
        }
        if x <= first.x {
            return Some(first.properties.clone());
        }
        if x >= last.x {
            return Some(last.properties.clone());
        }

        self.values.windows(2).find_map(|pair| {
            let (a, b) = (&pair[0], &pair[1]);
            if x >= a.x && x <= b.x {
                let width = b.x - a.x;
                let fraction = if width > 0.0 { (x - a.x) / width } else { 0.0 };
                Some(a.properties.interpolate(&b.properties, fraction))
            } else {
                None
            }
        })
    }
}

/// A random input variable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stochast {
    pub name: String,

    #[serde(default)]
    pub distribution: DistributionType,

    #[serde(flatten)]
    pub properties: StochastProperties,

    /// Restrict to [minimum, maximum]
    #[serde(default)]
    pub truncated: bool,

    /// Mirror around the shift (or zero)
    #[serde(default)]
    pub inverted: bool,

    /// Family specific initialization values, by default [mean, deviation]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<f64>,

    /// Name of the stochast whose realization drives the properties
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable_source: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_set: Option<VariableStochastValuesSet>,
}

impl Stochast {
    pub fn new(name: impl Into<String>, distribution: DistributionType) -> Self {
        Self {
            name: name.into(),
            distribution,
            properties: StochastProperties::default(),
            truncated: false,
            inverted: false,
            values: Vec::new(),
            variable_source: None,
            value_set: None,
        }
    }

    /// Normal stochast with the given mean and deviation
    pub fn normal(name: impl Into<String>, mean: f64, deviation: f64) -> Self {
        let mut stochast = Self::new(name, DistributionType::Normal);
        stochast.set_mean_and_deviation(mean, deviation);
        stochast
    }

    /// Deterministic stochast with a fixed value
    pub fn deterministic(name: impl Into<String>, value: f64) -> Self {
        let mut stochast = Self::new(name, DistributionType::Deterministic);
        stochast.properties.location = value;
        stochast
    }

    pub fn with_properties(mut self, properties: StochastProperties) -> Self {
        self.properties = properties;
        self
    }

    pub fn truncated(mut self, minimum: f64, maximum: f64) -> Self {
        self.truncated = true;
        self.properties.minimum = minimum;
        self.properties.maximum = maximum;
        self
    }

    pub fn inverted(mut self) -> Self {
        self.inverted = true;
        self
    }

    /// Make the properties depend on another stochast's realization
    pub fn with_variable_source(
        mut self,
        source: impl Into<String>,
        mut value_set: VariableStochastValuesSet,
    ) -> Self {
        value_set.sort();
        self.variable_source = Some(source.into());
        self.value_set = Some(value_set);
        self
    }

    pub fn is_variable(&self) -> bool {
        self.variable_source.is_some() && self.value_set.is_some()
    }

    /// Family implementation with the decorators applied
    pub fn create_distribution(&self) -> Box<dyn Distribution> {
        let mut distribution = create_distribution(self.distribution);
        if self.inverted {
            distribution = Box::new(Inverted::new(distribution));
        }
        if self.truncated {
            distribution = Box::new(Truncated::new(distribution));
        }
        distribution
    }

    /// Applies `values` through the family's initializer and orders the value set
    pub fn initialize(&mut self) {
        if let Some(set) = &mut self.value_set {
            set.sort();
        }
        if self.values.is_empty() {
            return;
        }
        let distribution = self.create_distribution();
        let values = self.values.clone();
        distribution.initialize(&mut self.properties, &values);
    }

    /// Properties in effect for a realization of the source stochast
    pub fn properties_for_source(&self, source_x: Option<f64>) -> StochastProperties {
        match (&self.value_set, source_x) {
            (Some(set), Some(x)) if self.variable_source.is_some() => {
                set.interpolate(x).unwrap_or_else(|| self.properties.clone())
            }
            _ => self.properties.clone(),
        }
    }

    pub fn get_x_from_u(&self, u: f64) -> f64 {
        self.create_distribution().get_x_from_u(&self.properties, u)
    }

    pub fn get_u_from_x(&self, x: f64) -> f64 {
        self.create_distribution().get_u_from_x(&self.properties, x)
    }

    /// True when the stochast can take more than one value
    pub fn is_varying(&self) -> bool {
        let distribution = self.create_distribution();
        match &self.value_set {
            Some(set) if self.variable_source.is_some() && !set.values.is_empty() => set
                .values
                .iter()
                .any(|value| distribution.is_varying(&value.properties)),
            _ => distribution.is_varying(&self.properties),
        }
    }

    pub fn mean(&self) -> f64 {
        self.create_distribution().get_mean(&self.properties)
    }

    pub fn deviation(&self) -> f64 {
        self.create_distribution().get_deviation(&self.properties)
    }

    pub fn set_mean_and_deviation(&mut self, mean: f64, deviation: f64) {
        let distribution = self.create_distribution();
        distribution.set_mean_and_deviation(&mut self.properties, mean, deviation);
    }

    pub fn validate(&self, report: &mut ValidationReport) {
        let subject = format!("stochast '{}'", self.name);
        let base = create_distribution(self.distribution);

        if self.name.trim().is_empty() {
            report.add_error("stochast", "name must not be empty");
        }
        if self.truncated && !base.can_truncate() {
            report.add_error(
                &subject,
                format!("{} distribution cannot be truncated", self.distribution),
            );
        }
        if self.inverted && !base.can_invert() {
            report.add_error(
                &subject,
                format!("{} distribution cannot be inverted", self.distribution),
            );
        }
        if self.variable_source.is_some() != self.value_set.is_some() {
            report.add_error(
                &subject,
                "variable stochast needs both a variable_source and a value_set",
            );
        }
        if let Some(set) = &self.value_set {
            if set.values.is_empty() {
                report.add_error(&subject, "value_set is empty");
            }
            if set.values.iter().any(|value| !value.x.is_finite()) {
                report.add_error(&subject, "value_set entries need a finite x");
            }
        }

        self.create_distribution()
            .validate(&self.properties, &subject, report);
    }
}
