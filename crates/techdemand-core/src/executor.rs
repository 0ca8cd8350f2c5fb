use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::RunConfig;
use crate::error::AppError;
use crate::fetch::CountService;
use crate::pacing::{Pacer, Pacing};
use crate::task::{Task, TaskFailure, TaskStatus};
use crate::traits::{CountExtractor, Fetcher};

/// Events emitted by the executor for monitoring/logging.
#[derive(Debug, Clone)]
pub enum RunEvent<'a> {
    Started {
        run_id: &'a str,
        tasks: usize,
        max_concurrency: usize,
    },
    TaskAdmitted {
        task: &'a Task,
    },
    TaskResolved {
        task: &'a Task,
    },
    TaskExhausted {
        task: &'a Task,
    },
    TaskFailed {
        task: &'a Task,
        failure: Option<&'a TaskFailure>,
    },
    Cancelled {
        run_id: &'a str,
        unfinished: usize,
    },
    Finished {
        run_id: &'a str,
        resolved: usize,
        exhausted: usize,
        failed: usize,
        elapsed: Duration,
    },
}

/// Trait for receiving run events (decoupled logging).
pub trait RunReporter: Send + Sync {
    fn report(&self, event: RunEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingRunReporter;

impl RunReporter for TracingRunReporter {
    fn report(&self, event: RunEvent<'_>) {
        match event {
            RunEvent::Started {
                run_id,
                tasks,
                max_concurrency,
            } => {
                tracing::info!(%run_id, %tasks, %max_concurrency, "Run started");
            }
            RunEvent::TaskAdmitted { task } => {
                tracing::debug!(
                    technology = %task.technology_name,
                    city = task.city_code,
                    "Task admitted"
                );
            }
            RunEvent::TaskResolved { task } => {
                tracing::info!(
                    technology = %task.technology_name,
                    city = task.city_code,
                    count = task.count,
                    attempts = task.attempts,
                    "Task resolved"
                );
            }
            RunEvent::TaskExhausted { task } => {
                tracing::warn!(
                    technology = %task.technology_name,
                    city = task.city_code,
                    attempts = task.attempts,
                    "No positive count after all attempts"
                );
            }
            RunEvent::TaskFailed { task, failure } => {
                let (kind, message) = failure
                    .map(|f| (f.kind.as_str(), f.message.as_str()))
                    .unwrap_or(("unknown", ""));
                tracing::error!(
                    technology = %task.technology_name,
                    city = task.city_code,
                    attempts = task.attempts,
                    %kind,
                    error = %message,
                    "Task failed"
                );
            }
            RunEvent::Cancelled { run_id, unfinished } => {
                tracing::warn!(%run_id, %unfinished, "Run cancelled");
            }
            RunEvent::Finished {
                run_id,
                resolved,
                exhausted,
                failed,
                elapsed,
            } => {
                tracing::info!(
                    %run_id,
                    %resolved,
                    %exhausted,
                    %failed,
                    elapsed_ms = %elapsed.as_millis(),
                    "Run finished"
                );
            }
        }
    }
}

/// Tasks after the completion barrier, in task-set order.
#[derive(Debug)]
pub struct CompletedRun {
    pub run_id: String,
    pub tasks: Vec<Task>,
    pub elapsed: Duration,
}

impl CompletedRun {
    pub fn failures(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(|t| t.is_failed())
    }

    /// Error out if any task ended in a fetch failure.
    pub fn ensure_complete(&self) -> Result<(), AppError> {
        let failed = self.failures().count();
        let Some(first) = self.failures().next() else {
            return Ok(());
        };
        let (kind, message) = match &first.failure {
            Some(f) => (f.kind, f.message.clone()),
            None => (crate::task::FailureKind::Request, String::new()),
        };
        Err(AppError::FetchFailed {
            failed,
            kind,
            technology: first.technology_name.clone(),
            city_code: first.city_code,
            message,
        })
    }
}

/// Runs every task's fetch under a concurrency cap and waits for all of them.
pub struct Executor<F, E>
where
    F: Fetcher,
    E: CountExtractor,
{
    service: CountService<F, E>,
    config: RunConfig,
}

impl<F, E> Executor<F, E>
where
    F: Fetcher,
    E: CountExtractor,
{
    pub fn new(fetcher: F, extractor: E, config: RunConfig) -> Self {
        let mut service = CountService::new(
            fetcher,
            extractor,
            config.url_template.clone(),
            config.max_attempts,
        );
        if config.pacing == Pacing::Attempts {
            service = service.with_attempt_interval(config.rate_limit);
        }
        Self { service, config }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run all tasks to completion.
    ///
    /// Permits are handed out in task order; at most `max_concurrency` tasks
    /// fetch at once. Returns only after every admitted task has finished.
    /// If `cancel_token` fires, no further tasks are admitted, in-flight tasks
    /// stop at their next attempt boundary and the run returns
    /// [`AppError::Cancelled`].
    pub async fn run<R: RunReporter>(
        &self,
        tasks: Vec<Task>,
        cancel_token: CancellationToken,
        reporter: &R,
    ) -> Result<CompletedRun, AppError> {
        let started = Instant::now();
        let total = tasks.len();
        let max_concurrency = self.config.max_concurrency.max(1);

        reporter.report(RunEvent::Started {
            run_id: &self.config.run_id,
            tasks: total,
            max_concurrency,
        });

        let semaphore = Arc::new(Semaphore::new(max_concurrency));
        let launch_pacer =
            (self.config.pacing == Pacing::Launches).then(|| Pacer::new(self.config.rate_limit));

        let mut queue = tasks.into_iter().enumerate();
        let mut admitted = 0usize;
        let mut results: Vec<Option<Task>> = (0..total).map(|_| None).collect();
        let mut join_set: JoinSet<(usize, Task)> = JoinSet::new();
        let mut cancelled = false;

        loop {
            if (admitted == total || cancelled) && join_set.is_empty() {
                break;
            }

            tokio::select! {
                biased;

                () = cancel_token.cancelled(), if !cancelled => {
                    cancelled = true;
                    reporter.report(RunEvent::Cancelled {
                        run_id: &self.config.run_id,
                        unfinished: unfinished(&results),
                    });
                }

                Some(joined) = join_set.join_next(), if !join_set.is_empty() => {
                    let (index, task) =
                        joined.map_err(|e| AppError::TaskAborted(e.to_string()))?;
                    report_finished(&task, reporter);
                    results[index] = Some(task);
                }

                permit = semaphore.clone().acquire_owned(), if admitted < total && !cancelled => {
                    let permit = permit.map_err(|e| AppError::TaskAborted(e.to_string()))?;
                    let Some((index, mut task)) = queue.next() else {
                        break;
                    };
                    if let Some(pacer) = &launch_pacer {
                        tokio::select! {
                            () = pacer.wait() => {}
                            () = cancel_token.cancelled() => {
                                // The popped task is dropped unadmitted with its permit.
                                cancelled = true;
                                reporter.report(RunEvent::Cancelled {
                                    run_id: &self.config.run_id,
                                    unfinished: unfinished(&results),
                                });
                                continue;
                            }
                        }
                    }
                    admitted += 1;
                    reporter.report(RunEvent::TaskAdmitted { task: &task });

                    let service = self.service.clone();
                    let cancel = cancel_token.clone();
                    join_set.spawn(async move {
                        let _permit = permit;
                        service.resolve(&mut task, &cancel).await;
                        (index, task)
                    });
                }
            }
        }

        let finished: Vec<Task> = results.into_iter().flatten().collect();
        if cancelled || finished.len() < total || finished.iter().any(|t| !t.status.is_terminal())
        {
            return Err(AppError::Cancelled);
        }

        let elapsed = started.elapsed();
        let count = |status: TaskStatus| finished.iter().filter(|t| t.status == status).count();
        reporter.report(RunEvent::Finished {
            run_id: &self.config.run_id,
            resolved: count(TaskStatus::Resolved),
            exhausted: count(TaskStatus::Exhausted),
            failed: count(TaskStatus::Failed),
            elapsed,
        });

        Ok(CompletedRun {
            run_id: self.config.run_id.clone(),
            tasks: finished,
            elapsed,
        })
    }
}

fn unfinished(results: &[Option<Task>]) -> usize {
    results.iter().filter(|r| r.is_none()).count()
}

fn report_finished<R: RunReporter>(task: &Task, reporter: &R) {
    match task.status {
        TaskStatus::Resolved => reporter.report(RunEvent::TaskResolved { task }),
        TaskStatus::Exhausted => reporter.report(RunEvent::TaskExhausted { task }),
        TaskStatus::Failed => reporter.report(RunEvent::TaskFailed {
            task,
            failure: task.failure.as_ref(),
        }),
        TaskStatus::Pending => {}
    }
}
