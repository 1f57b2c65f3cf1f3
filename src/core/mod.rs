//! Core module - numerical engine and model plumbing

pub mod correlation;
pub mod error;
pub mod model_runner;
pub mod random;
pub mod root_finder;
pub mod special;
pub mod standard_normal;
pub mod uconverter;
pub mod validation;

pub use correlation::{CorrelationMatrix, CorrelationValue};
pub use error::{ReliabilityError, Result};
pub use model_runner::{ModelRunner, ProgressSink, StopHandle, ZEvaluator, ZModel};
pub use random::{RandomGeneratorType, RandomSampleGenerator, RandomSettings};
pub use uconverter::UConverter;
pub use validation::{MessageType, ValidationMessage, ValidationReport};
