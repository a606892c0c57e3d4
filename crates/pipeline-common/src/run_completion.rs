use tokio::task::JoinHandle;

use crate::PipelineError;

/// Wait for every stage task and resolve the run outcome deterministically.
///
/// - If the output side failed, its error is returned; stage failures are
///   then secondary (usually a closed channel caused by the same failure).
/// - If the output side succeeded and a stage task failed, the first stage
///   error in task order is returned.
/// - Otherwise the output value is returned.
///
/// All tasks are awaited in every case.
pub async fn settle_stages<Out>(
    output_result: Result<Out, PipelineError>,
    stage_tasks: Vec<JoinHandle<Result<(), PipelineError>>>,
) -> Result<Out, PipelineError> {
    let output_ok = output_result.is_ok();
    let mut first_stage_error: Option<PipelineError> = None;

    for task in stage_tasks {
        let task_result = match task.await {
            Ok(result) => result,
            Err(join_error) if join_error.is_cancelled() => Err(PipelineError::Cancelled),
            Err(join_error) => Err(PipelineError::StageProcess {
                stage: "task",
                source: Box::new(std::io::Error::other(format!(
                    "Stage task panicked: {join_error}"
                ))),
            }),
        };

        if output_ok
            && let Err(err) = task_result
            && first_stage_error.is_none()
        {
            first_stage_error = Some(err);
        }
    }

    match (output_result, first_stage_error) {
        (Ok(_), Some(err)) => Err(err),
        (Ok(output), None) => Ok(output),
        (Err(err), _) => Err(err),
    }
}
