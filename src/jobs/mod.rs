/// Grading jobs: charged submission, dispatch and result polling
///
/// A job moves `processing → completed` or `processing → failed` and never
/// leaves a terminal state. It is created in the same unit of work as the
/// `spend` that pays for it; see [`crate::storage::UnitOfWork::insert_job`].
///
/// ## Usage
///
/// ```rust,ignore
/// use gradebox::jobs::{JobInput, JobOrchestrator};
///
/// let submission = jobs.submit(user_id, JobInput::Text { content, context: None }).await?;
/// let view = jobs.get_result(user_id, submission.job_id).await?;
/// ```

pub mod dispatch;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod orchestrator;

pub use dispatch::{spawn_workers, DispatchError, Dispatcher, InFlight};
pub use error::{JobError, Result};
pub use model::{Job, JobInput, JobStatus, JobSummary, JobView, Transition};
pub use orchestrator::{JobOrchestrator, Submission, SUBMISSION_DESCRIPTION};
