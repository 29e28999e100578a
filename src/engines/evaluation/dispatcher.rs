//! Fan-out/fan-in of evaluation requests over a bounded set of workers.
//!
//! The coordinating thread owns admission: at most `workers` evaluations are
//! in flight, each on its own named thread reporting over an mpsc channel.
//! Deadlines start when a job is launched. An evaluation abandoned at its
//! deadline releases its slot at once; the detached thread finishes on its
//! own and its late result is dropped.

use crate::config::{CancelPolicy, EvaluationConfig};
use crate::engines::evaluation::collaborators::{
    EvaluationFailure, EvaluationRequest, StrategyArtifact, StrategyEvaluator,
};
use crate::types::{GenomeId, RawMetrics};
use log::{debug, warn};
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct EvaluationJob {
    pub genome_id: GenomeId,
    pub artifact: StrategyArtifact,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationOutcome {
    Metrics(RawMetrics),
    Timeout(Duration),
    Error(String),
    /// Never ran, or was abandoned, because the run is stopping.
    Cancelled,
}

#[derive(Debug, Default)]
pub struct DispatchReport {
    pub outcomes: BTreeMap<GenomeId, EvaluationOutcome>,
    pub cancelled: bool,
}

struct Finished {
    id: GenomeId,
    outcome: EvaluationOutcome,
    elapsed: Duration,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "evaluator panicked".to_string()
    }
}

pub struct EvaluationDispatcher {
    evaluator: Arc<dyn StrategyEvaluator>,
    config: Arc<EvaluationConfig>,
}

impl EvaluationDispatcher {
    pub fn new(config: &EvaluationConfig, evaluator: Arc<dyn StrategyEvaluator>) -> Self {
        Self {
            evaluator,
            config: Arc::new(config.clone()),
        }
    }

    pub fn workers(&self) -> usize {
        self.config.workers.max(1)
    }

    fn launch(&self, job: EvaluationJob, tx: Sender<Finished>) -> io::Result<()> {
        let evaluator = Arc::clone(&self.evaluator);
        let config = Arc::clone(&self.config);
        let id = job.genome_id;

        thread::Builder::new()
            .name(format!("evaluator-{}", id))
            .spawn(move || {
                let at = Instant::now();
                let request = EvaluationRequest {
                    genome_id: id,
                    artifact: &job.artifact,
                    timeout: config.timeout(),
                    config: &config,
                };
                let outcome = match catch_unwind(AssertUnwindSafe(|| evaluator.evaluate(&request))) {
                    Ok(Ok(metrics)) => EvaluationOutcome::Metrics(metrics),
                    Ok(Err(EvaluationFailure::Timeout(after))) => EvaluationOutcome::Timeout(after),
                    Ok(Err(EvaluationFailure::Error(e))) => EvaluationOutcome::Error(format!("{:#}", e)),
                    Err(payload) => EvaluationOutcome::Error(panic_message(payload.as_ref())),
                };

                // the coordinator may have stopped listening; nothing to do then
                let _ = tx.send(Finished {
                    id,
                    outcome,
                    elapsed: at.elapsed(),
                });
            })?;
        Ok(())
    }

    /// Evaluate every job and block until each has an outcome, has timed out,
    /// or the run is stopped. `on_outcome` is called on this thread as
    /// results arrive.
    pub fn dispatch<F>(
        &self,
        jobs: Vec<EvaluationJob>,
        stop: &Arc<AtomicBool>,
        mut on_outcome: F,
    ) -> DispatchReport
    where
        F: FnMut(GenomeId, &EvaluationOutcome),
    {
        let timeout = self.config.timeout();
        let poll = self.config.poll_interval();
        let workers = self.workers();
        let mut report = DispatchReport::default();
        let mut pending: BTreeSet<GenomeId> = jobs.iter().map(|j| j.genome_id).collect();
        let mut queue: VecDeque<EvaluationJob> = jobs.into();
        let mut in_flight: BTreeMap<GenomeId, Instant> = BTreeMap::new();

        let (tx, rx) = mpsc::channel();

        let mut record = |report: &mut DispatchReport, id: GenomeId, outcome: EvaluationOutcome| {
            if !matches!(outcome, EvaluationOutcome::Cancelled) {
                on_outcome(id, &outcome);
            }
            report.outcomes.insert(id, outcome);
        };

        while !pending.is_empty() {
            if stop.load(Ordering::SeqCst) && !report.cancelled {
                report.cancelled = true;
                debug!("Stop requested with {} evaluations outstanding", pending.len());
                for job in queue.drain(..) {
                    pending.remove(&job.genome_id);
                    record(&mut report, job.genome_id, EvaluationOutcome::Cancelled);
                }
                if self.config.cancel_policy == CancelPolicy::Abandon {
                    for id in std::mem::take(&mut pending) {
                        record(&mut report, id, EvaluationOutcome::Cancelled);
                    }
                    break;
                }
            }

            while in_flight.len() < workers {
                let Some(job) = queue.pop_front() else { break };
                let id = job.genome_id;
                match self.launch(job, tx.clone()) {
                    Ok(()) => {
                        in_flight.insert(id, Instant::now());
                    }
                    Err(e) => {
                        warn!("Could not start evaluation of {}: {}", id, e);
                        pending.remove(&id);
                        record(
                            &mut report,
                            id,
                            EvaluationOutcome::Error(format!("could not start evaluation thread: {}", e)),
                        );
                    }
                }
            }
            if pending.is_empty() {
                break;
            }

            let now = Instant::now();
            let wait = if self.config.abandon_timed_out {
                in_flight
                    .values()
                    .filter_map(|at| at.checked_add(timeout))
                    .min()
                    .map(|deadline| deadline.saturating_duration_since(now).min(poll))
                    .unwrap_or(poll)
            } else {
                poll
            };

            // `tx` stays alive here, so the only error is the poll timeout
            if let Ok(Finished { id, outcome, elapsed }) = rx.recv_timeout(wait) {
                if in_flight.remove(&id).is_none() || !pending.remove(&id) {
                    debug!("Discarding late result for {}", id);
                    continue;
                }
                let outcome = match outcome {
                    EvaluationOutcome::Metrics(_) | EvaluationOutcome::Error(_) if elapsed > timeout => {
                        EvaluationOutcome::Timeout(elapsed)
                    }
                    other => other,
                };
                record(&mut report, id, outcome);
            }

            if self.config.abandon_timed_out {
                let now = Instant::now();
                let expired: Vec<(GenomeId, Duration)> = in_flight
                    .iter()
                    .map(|(id, at)| (*id, now.saturating_duration_since(*at)))
                    .filter(|(_, elapsed)| *elapsed >= timeout)
                    .collect();
                for (id, elapsed) in expired {
                    in_flight.remove(&id);
                    if pending.remove(&id) {
                        warn!("Evaluation of {} abandoned after {:?}", id, elapsed);
                        record(&mut report, id, EvaluationOutcome::Timeout(elapsed));
                    }
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::thread;

    /// Behaviour keyed on the genome id: 0 mod 4 fails, 1 mod 4 panics,
    /// everything else succeeds after `delay`.
    struct ScriptedEvaluator {
        delay: Duration,
    }

    impl StrategyEvaluator for ScriptedEvaluator {
        fn evaluate(&self, request: &EvaluationRequest<'_>) -> std::result::Result<RawMetrics, EvaluationFailure> {
            thread::sleep(self.delay);
            match request.genome_id.0 % 4 {
                0 => Err(EvaluationFailure::Error(anyhow!("backtest crashed"))),
                1 => panic!("evaluator bug"),
                _ => Ok(RawMetrics {
                    trade_count: request.genome_id.0,
                    ..RawMetrics::default()
                }),
            }
        }
    }

    fn jobs(ids: std::ops::Range<u64>) -> Vec<EvaluationJob> {
        ids.map(|i| EvaluationJob {
            genome_id: GenomeId(i),
            artifact: StrategyArtifact::new(format!("strategy_{}", i)),
        })
        .collect()
    }

    fn config(timeout_secs: f64) -> EvaluationConfig {
        EvaluationConfig {
            workers: 3,
            timeout_secs,
            poll_interval_ms: 10,
            ..EvaluationConfig::default()
        }
    }

    #[test]
    fn test_every_job_gets_an_outcome() {
        let evaluator = Arc::new(ScriptedEvaluator { delay: Duration::ZERO });
        let dispatcher = EvaluationDispatcher::new(&config(10.0), evaluator);
        let stop = Arc::new(AtomicBool::new(false));
        let mut seen = Vec::new();

        let report = dispatcher.dispatch(jobs(0..8), &stop, |id, _| seen.push(id));

        assert!(!report.cancelled);
        assert_eq!(report.outcomes.len(), 8);
        assert_eq!(seen.len(), 8);
        assert!(matches!(report.outcomes[&GenomeId(0)], EvaluationOutcome::Error(_)));
        match &report.outcomes[&GenomeId(1)] {
            EvaluationOutcome::Error(msg) => assert!(msg.contains("evaluator bug")),
            other => panic!("expected panic to be captured, got {:?}", other),
        }
        match report.outcomes[&GenomeId(6)] {
            EvaluationOutcome::Metrics(m) => assert_eq!(m.trade_count, 6),
            ref other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_slow_evaluation_abandoned_at_timeout() {
        let evaluator = Arc::new(ScriptedEvaluator { delay: Duration::from_millis(600) });
        let dispatcher = EvaluationDispatcher::new(&config(0.05), evaluator);
        let stop = Arc::new(AtomicBool::new(false));

        let started = Instant::now();
        let report = dispatcher.dispatch(jobs(2..4), &stop, |_, _| {});

        assert!(started.elapsed() < Duration::from_millis(500));
        for outcome in report.outcomes.values() {
            assert!(matches!(outcome, EvaluationOutcome::Timeout(_)));
        }
    }

    #[test]
    fn test_hung_evaluation_frees_its_worker() {
        let evaluator = Arc::new(|request: &EvaluationRequest<'_>| -> std::result::Result<RawMetrics, EvaluationFailure> {
            if request.genome_id == GenomeId(2) {
                thread::sleep(Duration::from_secs(3));
            }
            Ok(RawMetrics {
                trade_count: request.genome_id.0,
                ..RawMetrics::default()
            })
        });
        let config = EvaluationConfig {
            workers: 1,
            ..config(0.05)
        };
        let dispatcher = EvaluationDispatcher::new(&config, evaluator);
        let stop = Arc::new(AtomicBool::new(false));

        let started = Instant::now();
        let report = dispatcher.dispatch(jobs(2..4), &stop, |_, _| {});

        assert!(started.elapsed() < Duration::from_secs(1), "blocked for {:?}", started.elapsed());
        assert!(matches!(report.outcomes[&GenomeId(2)], EvaluationOutcome::Timeout(_)));
        assert!(matches!(report.outcomes[&GenomeId(3)], EvaluationOutcome::Metrics(_)));
    }

    #[test]
    fn test_concurrency_capped_at_workers() {
        let running = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let peak = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let (now, max) = (Arc::clone(&running), Arc::clone(&peak));
        let evaluator = Arc::new(move |_: &EvaluationRequest<'_>| -> std::result::Result<RawMetrics, EvaluationFailure> {
            let current = now.fetch_add(1, Ordering::SeqCst) + 1;
            max.fetch_max(current, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(30));
            now.fetch_sub(1, Ordering::SeqCst);
            Ok(RawMetrics::default())
        });
        let dispatcher = EvaluationDispatcher::new(&config(10.0), evaluator);
        let stop = Arc::new(AtomicBool::new(false));

        let report = dispatcher.dispatch(jobs(0..9), &stop, |_, _| {});

        assert_eq!(report.outcomes.len(), 9);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn test_late_result_classified_as_timeout_when_waiting() {
        let evaluator = Arc::new(ScriptedEvaluator { delay: Duration::from_millis(100) });
        let config = EvaluationConfig {
            abandon_timed_out: false,
            ..config(0.02)
        };
        let dispatcher = EvaluationDispatcher::new(&config, evaluator);
        let stop = Arc::new(AtomicBool::new(false));

        let report = dispatcher.dispatch(jobs(2..3), &stop, |_, _| {});
        match report.outcomes[&GenomeId(2)] {
            EvaluationOutcome::Timeout(elapsed) => assert!(elapsed >= Duration::from_millis(100)),
            ref other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_stop_before_dispatch_skips_everything() {
        let evaluator = Arc::new(ScriptedEvaluator { delay: Duration::ZERO });
        let dispatcher = EvaluationDispatcher::new(&config(10.0), evaluator);
        let stop = Arc::new(AtomicBool::new(true));
        let mut calls = 0;

        let report = dispatcher.dispatch(jobs(0..5), &stop, |_, _| calls += 1);

        assert!(report.cancelled);
        assert_eq!(calls, 0);
        assert!(report.outcomes.values().all(|o| *o == EvaluationOutcome::Cancelled));
    }

    #[test]
    fn test_abandon_policy_returns_promptly() {
        let evaluator = Arc::new(ScriptedEvaluator { delay: Duration::from_millis(400) });
        let config = EvaluationConfig {
            cancel_policy: CancelPolicy::Abandon,
            ..config(10.0)
        };
        let dispatcher = EvaluationDispatcher::new(&config, evaluator);
        let stop = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&stop);
        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            flag.store(true, Ordering::SeqCst);
        });

        let started = Instant::now();
        let report = dispatcher.dispatch(jobs(2..8), &stop, |_, _| {});
        stopper.join().unwrap();

        assert!(report.cancelled);
        assert!(started.elapsed() < Duration::from_millis(350));
        assert_eq!(report.outcomes.len(), 6);
    }
}
