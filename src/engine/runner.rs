use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info};

use crate::domain::RunReport;
use crate::engine::aggregate::RunAggregator;
use crate::engine::executor::CaseExecutor;
use crate::engine::expand::{case_count, expand_with_defaults, Step};
use crate::error::RunError;

type StepsFuture = Pin<Box<dyn Future<Output = Result<(), RunError>> + Send>>;

/// Expands a case tree and drives every resulting case through the
/// executor. Sequential steps run in order; a fan-out starts one task per
/// branch and waits for all of them.
#[derive(Clone)]
pub struct Engine {
    executor: Arc<CaseExecutor>,
}

impl Engine {
    pub fn new(executor: CaseExecutor) -> Self {
        Self {
            executor: Arc::new(executor),
        }
    }

    pub fn aggregator(&self) -> &Arc<RunAggregator> {
        self.executor.aggregator()
    }

    /// Runs the tree without touching counters from earlier runs. The
    /// executor's defaults are merged before expansion so defaulted
    /// directives and query parameters reach every clone.
    pub async fn run(&self, tree: &Value) -> Result<(), RunError> {
        let plan = expand_with_defaults(tree, self.executor.defaults())?;
        info!(cases = case_count(&plan), "expanded case tree");
        run_steps(self.executor.clone(), plan).await
    }

    /// Resets the aggregator, runs the tree, and prints the run summary.
    pub async fn run_fresh(&self, tree: &Value) -> Result<RunReport, RunError> {
        let aggregator = self.aggregator().clone();
        aggregator.new_run();

        self.run(tree).await?;

        let reporter = self.executor.reporter();
        reporter.line(&aggregator.summary());
        reporter.line(&aggregator.elapsed_message());
        Ok(aggregator.report())
    }
}

fn run_steps(executor: Arc<CaseExecutor>, steps: Vec<Step>) -> StepsFuture {
    Box::pin(async move {
        for step in steps {
            match step {
                Step::Run(case) => {
                    executor.execute(case).await;
                }
                Step::FanOut(branches) => fan_out(&executor, branches).await?,
            }
        }
        Ok(())
    })
}

/// Every branch is awaited before the first error is surfaced.
async fn fan_out(executor: &Arc<CaseExecutor>, branches: Vec<Vec<Step>>) -> Result<(), RunError> {
    let handles: Vec<_> = branches
        .into_iter()
        .map(|branch| tokio::spawn(run_steps(executor.clone(), branch)))
        .collect();

    let mut first_error = None;
    for handle in handles {
        let result = match handle.await {
            Ok(result) => result,
            Err(err) => {
                error!("parallel branch aborted: {err}");
                Err(RunError::BranchPanicked(err.to_string()))
            }
        };
        if let Err(err) = result {
            first_error.get_or_insert(err);
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
