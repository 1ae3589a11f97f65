/// CSV export of task collections
///
/// Encodes tasks into a fixed column layout, one record at a time, so an
/// export can be streamed straight from the repository into a response body.
///
/// # Columns
///
/// `ID, Title, Description, Due Date, Status, User, Created At, Updated At`
///
/// - Due dates are `YYYY-MM-DD` (empty when unset)
/// - Status is `Completed` or `Pending`
/// - User is the owner's display name
/// - Timestamps are `YYYY-MM-DD HH:MM:SS` in UTC
///
/// # Example
///
/// ```no_run
/// use futures::StreamExt;
/// use taskdesk_shared::export::csv_stream;
/// use taskdesk_shared::query::{Scope, TaskQuery};
/// use taskdesk_shared::repository::TaskRepository;
///
/// # async fn example(repo: &dyn TaskRepository) {
/// let tasks = repo.stream_tasks(TaskQuery::new(Scope::AllTasks));
/// let mut chunks = csv_stream(tasks);
/// while let Some(chunk) = chunks.next().await {
///     let bytes = chunk.unwrap();
///     // write bytes to the response body
/// }
/// # }
/// ```

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use thiserror::Error;

use crate::models::task::Task;
use crate::repository::RepositoryError;

/// Header record of every export
pub const CSV_HEADER: [&str; 8] = [
    "ID",
    "Title",
    "Description",
    "Due Date",
    "Status",
    "User",
    "Created At",
    "Updated At",
];

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Export errors
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV encoding failed: {0}")]
    Encode(#[from] csv::Error),

    #[error("CSV buffer could not be flushed: {0}")]
    Flush(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

fn encode_record<I, T>(fields: I) -> Result<Bytes, ExportError>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(fields)?;

    writer
        .into_inner()
        .map(Bytes::from)
        .map_err(|e| ExportError::Flush(e.error().to_string()))
}

/// Encodes the header record
pub fn encode_header() -> Result<Bytes, ExportError> {
    encode_record(CSV_HEADER)
}

/// Encodes one task as a CSV record
pub fn encode_row(task: &Task) -> Result<Bytes, ExportError> {
    let due_date = task
        .due_date
        .map(|d| d.format(DATE_FORMAT).to_string())
        .unwrap_or_default();
    let status = if task.completed { "Completed" } else { "Pending" };

    encode_record([
        task.id.to_string(),
        task.title.clone(),
        task.description.clone().unwrap_or_default(),
        due_date,
        status.to_string(),
        task.owner.name.clone(),
        task.created_at.format(TIMESTAMP_FORMAT).to_string(),
        task.updated_at.format(TIMESTAMP_FORMAT).to_string(),
    ])
}

/// Turns a task stream into a stream of CSV chunks, header first
///
/// A repository error ends the export with that error; rows already
/// yielded stay written.
pub fn csv_stream(
    tasks: BoxStream<'static, Result<Task, RepositoryError>>,
) -> BoxStream<'static, Result<Bytes, ExportError>> {
    let rows = tasks.map(|item| item.map_err(ExportError::from).and_then(|t| encode_row(&t)));

    stream::once(async { encode_header() }).chain(rows).boxed()
}

/// Encodes a whole collection into one buffer
pub fn encode_all<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Result<Vec<u8>, ExportError> {
    let mut out = encode_header()?.to_vec();
    for task in tasks {
        out.extend_from_slice(&encode_row(task)?);
    }
    Ok(out)
}
