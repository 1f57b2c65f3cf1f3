//! PTK: Probabilistic Toolkit
//!
//! Reliability analysis of limit-state functions Z(x) over random inputs.
//! Inputs are mapped to independent standard normal space, where FORM,
//! directional sampling and crude Monte Carlo estimate the reliability
//! index, the failure probability and the design point.
//!
//! ```no_run
//! use std::sync::Arc;
//! use ptk::core::{ModelRunner, UConverter, ZModel};
//! use ptk::entities::{RunSettings, Stochast};
//! use ptk::reliability::{Form, Solve};
//!
//! let converter = UConverter::uncorrelated(vec![
//!     Stochast::normal("r", 10.0, 2.0),
//!     Stochast::normal("s", 4.0, 1.0),
//! ]);
//! let model = ZModel::new(Arc::new(|x: &[f64]| x[0] - x[1]));
//! let mut runner = ModelRunner::new(model, converter, RunSettings::default())?;
//! runner.initialize_for_run()?;
//! let design_point = Form::default().solve(&runner)?;
//! println!("beta = {}", design_point.beta());
//! # Ok::<(), ptk::core::ReliabilityError>(())
//! ```

pub mod cli;
pub mod core;
pub mod entities;
pub mod reliability;
pub mod yaml;
