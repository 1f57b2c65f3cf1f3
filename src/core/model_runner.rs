//! Model evaluation orchestration
//!
//! The runner converts samples to physical values, calls the limit-state
//! model in chunks on a worker pool, and keeps the opt-in evaluation,
//! message and convergence histories of a run.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use rayon::prelude::*;
use tracing::{debug, error, info, warn};

use crate::core::error::{ReliabilityError, Result};
use crate::core::uconverter::UConverter;
use crate::core::validation::MessageType;
use crate::entities::design_point::{
    DesignPoint, Evaluation, Message, ReliabilityReport, ReliabilityResult, StochastPoint,
};
use crate::entities::sample::Sample;
use crate::entities::settings::RunSettings;

/// Limit-state function supplied by the caller
///
/// Z > 0 is safe, Z < 0 is failing and NaN marks an inadmissible input.
/// Implementations are called concurrently for distinct samples.
pub trait ZEvaluator: Send + Sync {
    fn evaluate(&self, x: &[f64]) -> f64;

    /// Batched evaluation; `None` falls back to per sample calls
    fn evaluate_many(&self, _xs: &[Vec<f64>]) -> Option<Vec<f64>> {
        None
    }

    /// Resources tied to an iteration may be released
    fn remove_task(&self, _iteration: i32) {}
}

impl<F> ZEvaluator for F
where
    F: Fn(&[f64]) -> f64 + Send + Sync,
{
    fn evaluate(&self, x: &[f64]) -> f64 {
        self(x)
    }
}

/// Receiver of progress reports that may ask a run to end early
pub trait ProgressSink: Send + Sync {
    fn report(&self, _report: &ReliabilityReport) {}

    /// Premature exit, for example to restart with other settings
    fn should_exit(&self) -> bool {
        false
    }

    /// Hard stop requested by the user
    fn is_stopped(&self) -> bool {
        false
    }
}

/// Shareable stop and exit flags
#[derive(Debug, Default)]
pub struct StopHandle {
    stopped: AtomicBool,
    exit: AtomicBool,
}

impl StopHandle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
    }

    pub fn request_exit(&self) {
        self.exit.store(true, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.stopped.store(false, Ordering::Relaxed);
        self.exit.store(false, Ordering::Relaxed);
    }
}

impl ProgressSink for StopHandle {
    fn should_exit(&self) -> bool {
        self.exit.load(Ordering::Relaxed)
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }
}

/// Z of one evaluator call; a panicking evaluator counts as inadmissible
fn guarded_evaluate(evaluator: &dyn ZEvaluator, x: &[f64]) -> f64 {
    panic::catch_unwind(AssertUnwindSafe(|| evaluator.evaluate(x))).unwrap_or_else(|_| {
        warn!("Model evaluation panicked, treating the result as NaN");
        f64::NAN
    })
}

/// Authoritative model with an optional cheap proxy
///
/// Authoritative results of memoized samples are remembered per iteration
/// index. A proxy request for a remembered iteration returns that value
/// instead of calling the proxy. Only one point per iteration may be
/// memoized; other points of the iteration bypass the memo.
pub struct ZModel {
    evaluator: Arc<dyn ZEvaluator>,
    proxy: Option<Arc<dyn ZEvaluator>>,
    memo: Mutex<HashMap<i32, f64>>,
}

impl fmt::Debug for ZModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZModel")
            .field("has_proxy", &self.proxy.is_some())
            .field("memo", &self.memo_len())
            .finish()
    }
}

impl ZModel {
    pub fn new(evaluator: Arc<dyn ZEvaluator>) -> Self {
        Self {
            evaluator,
            proxy: None,
            memo: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_proxy(mut self, proxy: Arc<dyn ZEvaluator>) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn has_proxy(&self) -> bool {
        self.proxy.is_some()
    }

    fn uses_proxy(&self, sample: &Sample) -> bool {
        self.proxy.is_some() && sample.allow_proxy
    }

    /// Z for one sample and its physical values
    pub fn evaluate(&self, sample: &Sample, x: &[f64]) -> f64 {
        if sample.is_restart_required {
            self.invalidate(sample.iteration_index);
        }

        match &self.proxy {
            Some(proxy) if sample.allow_proxy => {
                if let Some(z) = self.remembered(sample) {
                    return z;
                }
                guarded_evaluate(&**proxy, x)
            }
            _ => {
                let z = guarded_evaluate(&*self.evaluator, x);
                self.remember(sample, z);
                z
            }
        }
    }

    /// Batched authoritative evaluation when no sample may use the proxy
    fn evaluate_batch(&self, samples: &[Sample], xs: &[Vec<f64>]) -> Option<Vec<f64>> {
        if samples.iter().any(|s| self.uses_proxy(s)) {
            return None;
        }
        let z_values = panic::catch_unwind(AssertUnwindSafe(|| self.evaluator.evaluate_many(xs)))
            .unwrap_or_else(|_| {
                warn!("Batched evaluation panicked, evaluating per sample");
                None
            })?;
        if z_values.len() != xs.len() {
            warn!(
                expected = xs.len(),
                actual = z_values.len(),
                "Batched evaluation returned the wrong number of results, evaluating per sample"
            );
            return None;
        }
        for (sample, &z) in samples.iter().zip(&z_values) {
            if sample.is_restart_required {
                self.invalidate(sample.iteration_index);
            }
            self.remember(sample, z);
        }
        Some(z_values)
    }

    fn remembered(&self, sample: &Sample) -> Option<f64> {
        if !sample.memoize || sample.iteration_index < 0 {
            return None;
        }
        self.memo
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&sample.iteration_index)
            .copied()
    }

    fn remember(&self, sample: &Sample, z: f64) {
        if !sample.memoize || sample.iteration_index < 0 || self.proxy.is_none() {
            return;
        }
        self.memo
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(sample.iteration_index, z);
    }

    /// Forget the authoritative result of an iteration
    pub fn invalidate(&self, iteration: i32) {
        self.memo
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&iteration);
    }

    pub fn clear_memo(&self) {
        self.memo.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    pub fn memo_len(&self) -> usize {
        self.memo.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn remove_task(&self, iteration: i32) {
        self.evaluator.remove_task(iteration);
        if let Some(proxy) = &self.proxy {
            proxy.remove_task(iteration);
        }
    }
}

/// Evaluates samples for a reliability method
pub struct ModelRunner {
    model: ZModel,
    converter: UConverter,
    settings: RunSettings,
    pool: Option<rayon::ThreadPool>,
    progress: Option<Arc<dyn ProgressSink>>,
    evaluations: Mutex<Vec<Evaluation>>,
    messages: Mutex<Vec<Message>>,
    results: Mutex<Vec<ReliabilityResult>>,
}

impl fmt::Debug for ModelRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRunner")
            .field("model", &self.model)
            .field("converter", &self.converter)
            .field("settings", &self.settings)
            .field("parallel", &self.pool.is_some())
            .finish()
    }
}

impl ModelRunner {
    pub fn new(model: ZModel, converter: UConverter, settings: RunSettings) -> Result<Self> {
        let pool = if settings.max_parallel_processes > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(settings.max_parallel_processes)
                .thread_name(|i| format!("ptk-model-{}", i))
                .build()
                .map_err(|e| ReliabilityError::InvalidSettings(format!("thread pool: {}", e)))?;
            Some(pool)
        } else {
            None
        };

        Ok(Self {
            model,
            converter,
            settings,
            pool,
            progress: None,
            evaluations: Mutex::new(Vec::new()),
            messages: Mutex::new(Vec::new()),
            results: Mutex::new(Vec::new()),
        })
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Prepares the converter and clears the histories of a previous run
    pub fn initialize_for_run(&mut self) -> Result<()> {
        self.converter.initialize_for_run()?;
        self.model.clear_memo();
        lock(&self.evaluations).clear();
        lock(&self.messages).clear();
        lock(&self.results).clear();
        info!(
            varying = self.converter.varying_count(),
            threads = self.settings.max_parallel_processes,
            "Model runner initialized"
        );
        Ok(())
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.converter.is_initialized() {
            Ok(())
        } else {
            Err(ReliabilityError::UnsupportedOperation(
                "model runner used before initialize_for_run".to_string(),
            ))
        }
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    pub fn converter(&self) -> &UConverter {
        &self.converter
    }

    pub fn model(&self) -> &ZModel {
        &self.model
    }

    /// Sample dimension of the run
    pub fn vary_count(&self) -> usize {
        self.converter.varying_count()
    }

    pub fn is_stopped(&self) -> bool {
        self.progress.as_ref().is_some_and(|p| p.is_stopped())
    }

    pub fn should_exit(&self) -> bool {
        self.progress
            .as_ref()
            .is_some_and(|p| p.is_stopped() || p.should_exit())
    }

    /// Evaluates one sample and stores Z on it
    pub fn get_z_value(&self, sample: &mut Sample) -> Result<f64> {
        self.ensure_initialized()?;
        let x = self.converter.get_x_values(sample)?;
        let z = self.model.evaluate(sample, &x);
        sample.z = z;
        self.record_evaluation(sample, x);
        Ok(z)
    }

    /// Evaluates samples chunk by chunk and stores Z on each
    ///
    /// Exit requests are honoured between chunks; samples of skipped chunks
    /// keep a NaN Z.
    pub fn get_z_values(&self, samples: &mut [Sample]) -> Result<Vec<f64>> {
        self.ensure_initialized()?;
        let chunk_size = self.settings.chunk_size();

        for (chunk_index, chunk) in samples.chunks_mut(chunk_size).enumerate() {
            if self.should_exit() {
                debug!(chunk = chunk_index, "Evaluation ended early on exit request");
                for sample in chunk.iter_mut() {
                    sample.z = f64::NAN;
                }
                continue;
            }

            let xs = chunk
                .iter()
                .map(|s| self.converter.get_x_values(s))
                .collect::<Result<Vec<_>>>()?;

            let z_values = match self.model.evaluate_batch(chunk, &xs) {
                Some(z_values) => z_values,
                None => self.evaluate_parallel(chunk, &xs),
            };

            for ((sample, x), z) in chunk.iter_mut().zip(xs).zip(z_values) {
                sample.z = z;
                self.record_evaluation(sample, x);
            }
            debug!(chunk = chunk_index, size = chunk.len(), "Chunk evaluated");
        }

        Ok(samples.iter().map(|s| s.z).collect())
    }

    fn evaluate_parallel(&self, samples: &[Sample], xs: &[Vec<f64>]) -> Vec<f64> {
        let model = &self.model;
        match &self.pool {
            Some(pool) => pool.install(|| {
                samples
                    .par_iter()
                    .zip(xs.par_iter())
                    .map(|(sample, x)| model.evaluate(sample, x))
                    .collect()
            }),
            None => samples
                .iter()
                .zip(xs)
                .map(|(sample, x)| model.evaluate(sample, x))
                .collect(),
        }
    }

    /// Runs `task` for every item of one chunk on the worker pool
    ///
    /// Results keep the item order. Items must not depend on each other;
    /// the return of this call is the chunk barrier.
    pub fn run_parallel<T, R, F>(&self, items: &[T], task: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(usize, &T) -> R + Send + Sync,
    {
        match &self.pool {
            Some(pool) => pool.install(|| {
                items
                    .par_iter()
                    .enumerate()
                    .map(|(i, item)| task(i, item))
                    .collect()
            }),
            None => items
                .iter()
                .enumerate()
                .map(|(i, item)| task(i, item))
                .collect(),
        }
    }

    fn record_evaluation(&self, sample: &Sample, x: Vec<f64>) {
        if !self.settings.save_evaluations {
            return;
        }
        lock(&self.evaluations).push(Evaluation {
            z: sample.z,
            iteration: sample.iteration_index,
            weight: sample.weight,
            tag: sample.tag,
            input_values: x,
        });
    }

    /// Sign convention of the run: +1 when the origin is safe or undefined
    pub fn z0_fac(&self) -> Result<f64> {
        let mut origin = Sample::origin(self.vary_count());
        let z = self.get_z_value(&mut origin)?;
        Ok(if z < 0.0 { -1.0 } else { 1.0 })
    }

    pub fn remove_task(&self, iteration: i32) {
        self.model.remove_task(iteration);
    }

    /// Sends a progress report to the sink, if any
    pub fn report(&self, report: ReliabilityReport) {
        if let Some(progress) = &self.progress {
            progress.report(&report);
        }
    }

    /// Appends an intermediate result and forwards it as progress
    pub fn report_result(&self, result: ReliabilityResult, max_steps: usize) {
        self.report(ReliabilityReport {
            step: result.index,
            max_steps,
            reliability: result.beta,
            convergence: result.convergence,
        });
        if self.settings.save_convergence {
            lock(&self.results).push(result);
        }
    }

    /// Logs a message and keeps it when the run settings allow
    pub fn add_message(&self, kind: MessageType, text: impl Into<String>) {
        let text = text.into();
        match kind {
            MessageType::Error => error!("{}", text),
            MessageType::Warning => warn!("{}", text),
            MessageType::Info => info!("{}", text),
            MessageType::Debug => debug!("{}", text),
        }

        if !self.settings.save_messages || kind < self.settings.lowest_message_type {
            return;
        }
        let mut messages = lock(&self.messages);
        if messages.len() < self.settings.max_messages {
            messages.push(Message::new(kind, text));
        }
    }

    pub fn get_stochast_point(&self, u_values: &[f64], beta: f64) -> Result<StochastPoint> {
        self.converter.get_stochast_point(u_values, beta)
    }

    /// Moves the collected histories onto a design point
    pub fn attach_histories(&self, design_point: &mut DesignPoint) {
        design_point
            .evaluations
            .extend(lock(&self.evaluations).drain(..));
        design_point.messages.extend(lock(&self.messages).drain(..));
        design_point
            .reliability_results
            .extend(lock(&self.results).drain(..));
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::stochast::Stochast;
    use std::sync::atomic::AtomicUsize;

    fn runner_with(evaluator: Arc<dyn ZEvaluator>, settings: RunSettings) -> ModelRunner {
        let converter = UConverter::uncorrelated(vec![
            Stochast::normal("r", 5.0, 1.0),
            Stochast::normal("s", 2.0, 1.0),
        ]);
        let mut runner = ModelRunner::new(ZModel::new(evaluator), converter, settings).unwrap();
        runner.initialize_for_run().unwrap();
        runner
    }

    fn resistance_load(x: &[f64]) -> f64 {
        x[0] - x[1]
    }

    #[test]
    fn test_single_evaluation() {
        let runner = runner_with(Arc::new(resistance_load), RunSettings::default());
        let mut sample = Sample::new(vec![-1.0, 1.0]);
        let z = runner.get_z_value(&mut sample).unwrap();
        assert_eq!(z, 1.0);
        assert_eq!(sample.z, 1.0);
        assert_eq!(runner.z0_fac().unwrap(), 1.0);
    }

    #[test]
    fn test_requires_initialization() {
        let converter = UConverter::uncorrelated(vec![Stochast::normal("a", 0.0, 1.0)]);
        let runner = ModelRunner::new(
            ZModel::new(Arc::new(|x: &[f64]| x[0])),
            converter,
            RunSettings::default(),
        )
        .unwrap();
        assert!(runner.get_z_value(&mut Sample::new(vec![0.0])).is_err());
    }

    #[test]
    fn test_parallel_chunks_match_sequential() {
        let settings = RunSettings {
            max_parallel_processes: 4,
            max_chunk_size: 7,
            save_evaluations: true,
            ..Default::default()
        };
        let runner = runner_with(Arc::new(resistance_load), settings);
        let mut samples: Vec<Sample> = (0..50)
            .map(|i| Sample::new(vec![i as f64 * 0.1, -(i as f64) * 0.1]).with_iteration(i))
            .collect();
        let z = runner.get_z_values(&mut samples).unwrap();
        for (i, value) in z.iter().enumerate() {
            assert!((value - (3.0 + 0.2 * i as f64)).abs() < 1e-12);
        }

        let mut point = DesignPoint::default();
        runner.attach_histories(&mut point);
        assert_eq!(point.evaluations.len(), 50);
    }

    struct Batched {
        batches: AtomicUsize,
    }

    impl ZEvaluator for Batched {
        fn evaluate(&self, x: &[f64]) -> f64 {
            x[0] - x[1]
        }

        fn evaluate_many(&self, xs: &[Vec<f64>]) -> Option<Vec<f64>> {
            self.batches.fetch_add(1, Ordering::Relaxed);
            Some(xs.iter().map(|x| self.evaluate(x)).collect())
        }
    }

    #[test]
    fn test_batched_evaluator_used_per_chunk() {
        let evaluator = Arc::new(Batched {
            batches: AtomicUsize::new(0),
        });
        let settings = RunSettings {
            max_chunk_size: 10,
            ..Default::default()
        };
        let runner = runner_with(evaluator.clone(), settings);
        let mut samples: Vec<Sample> = (0..25).map(|_| Sample::origin(2)).collect();
        runner.get_z_values(&mut samples).unwrap();
        assert_eq!(evaluator.batches.load(Ordering::Relaxed), 3);
        assert!(samples.iter().all(|s| s.z == 3.0));
    }

    #[test]
    fn test_exit_request_skips_remaining_chunks() {
        let stop = StopHandle::new();
        stop.request_exit();
        let settings = RunSettings {
            max_chunk_size: 2,
            ..Default::default()
        };
        let runner = runner_with(Arc::new(resistance_load), settings).with_progress(stop.clone());
        let mut samples: Vec<Sample> = (0..5).map(|_| Sample::origin(2)).collect();
        let z = runner.get_z_values(&mut samples).unwrap();
        assert!(z.iter().all(|v| v.is_nan()));
        assert!(runner.should_exit());
        assert!(!runner.is_stopped());
    }

    #[test]
    fn test_proxy_reuses_authoritative_results() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let main = Arc::new(move |x: &[f64]| {
            counter.fetch_add(1, Ordering::Relaxed);
            x[0]
        });
        let proxy = Arc::new(|_: &[f64]| -100.0);
        let model = ZModel::new(main).with_proxy(proxy);

        let mut exact = Sample::new(vec![1.0]).with_iteration(3).memoized();
        exact.allow_proxy = false;
        assert_eq!(model.evaluate(&exact, &[1.0]), 1.0);

        let cheap = Sample::new(vec![1.0]).with_iteration(3).memoized();
        assert_eq!(model.evaluate(&cheap, &[1.0]), 1.0);
        assert_eq!(calls.load(Ordering::Relaxed), 1);

        let other = Sample::new(vec![1.0]).with_iteration(4).memoized();
        assert_eq!(model.evaluate(&other, &[1.0]), -100.0);

        let mut restarted = Sample::new(vec![1.0]).with_iteration(3).memoized();
        restarted.is_restart_required = true;
        assert_eq!(model.evaluate(&restarted, &[1.0]), -100.0);
        assert_eq!(model.memo_len(), 0);
    }

    #[test]
    fn test_unmemoized_points_bypass_memo() {
        let model = ZModel::new(Arc::new(|x: &[f64]| 3.0 - x[0]))
            .with_proxy(Arc::new(|x: &[f64]| 3.0 - x[0]));

        let mut exact = Sample::new(vec![1.0]).with_iteration(7).memoized();
        exact.allow_proxy = false;
        assert_eq!(model.evaluate(&exact, &[1.0]), 2.0);

        // Other points of iteration 7 are neither read from nor written to the memo
        let along = Sample::new(vec![2.0]).with_iteration(7);
        assert_eq!(model.evaluate(&along, &[2.0]), 1.0);
        let mut further = Sample::new(vec![5.0]).with_iteration(7);
        further.allow_proxy = false;
        assert_eq!(model.evaluate(&further, &[5.0]), -2.0);
        assert_eq!(model.memo_len(), 1);

        let again = Sample::new(vec![1.0]).with_iteration(7).memoized();
        assert_eq!(model.evaluate(&again, &[1.0]), 2.0);
    }

    #[test]
    fn test_panicking_model_gives_nan() {
        let runner = runner_with(
            Arc::new(|x: &[f64]| {
                if x[0] > 6.0 {
                    panic!("model crashed");
                }
                x[0] - x[1]
            }),
            RunSettings {
                max_parallel_processes: 2,
                ..Default::default()
            },
        );
        let mut samples = vec![Sample::new(vec![0.0, 0.0]), Sample::new(vec![2.0, 0.0])];
        let z = runner.get_z_values(&mut samples).unwrap();
        assert_eq!(z[0], 3.0);
        assert!(z[1].is_nan());
    }

    #[test]
    fn test_message_filtering() {
        let settings = RunSettings {
            max_messages: 2,
            lowest_message_type: MessageType::Warning,
            ..Default::default()
        };
        let runner = runner_with(Arc::new(resistance_load), settings);
        runner.add_message(MessageType::Info, "ignored");
        runner.add_message(MessageType::Warning, "first");
        runner.add_message(MessageType::Error, "second");
        runner.add_message(MessageType::Error, "over the limit");

        let mut point = DesignPoint::default();
        runner.attach_histories(&mut point);
        let texts: Vec<&str> = point.messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second"]);
    }

    #[test]
    fn test_negative_origin_flips_sign() {
        let runner = runner_with(Arc::new(|x: &[f64]| x[1] - x[0]), RunSettings::default());
        assert_eq!(runner.z0_fac().unwrap(), -1.0);

        let runner = runner_with(Arc::new(|_: &[f64]| f64::NAN), RunSettings::default());
        assert_eq!(runner.z0_fac().unwrap(), 1.0);
    }
}
