//! `pdftk`-backed concatenation of poster PDFs.

use std::{path::PathBuf, process::Stdio, sync::Arc};

use async_stream::try_stream;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::Command,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::application::storage::{ConcatError, PdfMerger, PdfStream};

use super::artifacts::PdfArtifacts;

const READ_CHUNK_BYTES: usize = 64 * 1024;

/// Runs `pdftk <files...> cat output -` and streams its stdout.
pub struct PdftkMerger {
    tool: PathBuf,
    artifacts: Arc<PdfArtifacts>,
}

impl PdftkMerger {
    pub fn new(tool: PathBuf, artifacts: Arc<PdfArtifacts>) -> Self {
        Self { tool, artifacts }
    }
}

#[async_trait]
impl PdfMerger for PdftkMerger {
    fn concatenate(&self, ids: &[Uuid]) -> PdfStream {
        if ids.is_empty() {
            return Box::pin(futures::stream::empty());
        }

        let tool = self.tool.clone();
        let inputs: Vec<PathBuf> = ids.iter().map(|id| self.artifacts.path_for(*id)).collect();

        into_pdf_stream(try_stream! {
            debug!(
                target = "infra::pdf::concatenate",
                tool = %tool.display(),
                inputs = inputs.len(),
                "starting concatenation"
            );

            let mut child = Command::new(&tool)
                .args(&inputs)
                .args(["cat", "output", "-"])
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(|err| ConcatError::Spawn(err.to_string()))?;

            let mut stdout = child
                .stdout
                .take()
                .ok_or_else(|| ConcatError::Spawn("stdout was not captured".to_string()))?;
            let stderr = child
                .stderr
                .take()
                .ok_or_else(|| ConcatError::Spawn("stderr was not captured".to_string()))?;
            let stderr_task = tokio::spawn(collect_output(stderr));

            let mut buffer = vec![0u8; READ_CHUNK_BYTES];
            loop {
                let read = stdout
                    .read(&mut buffer)
                    .await
                    .map_err(|err| ConcatError::Io(err.to_string()))?;
                if read == 0 {
                    break;
                }
                yield Bytes::copy_from_slice(&buffer[..read]);
            }

            let status = child
                .wait()
                .await
                .map_err(|err| ConcatError::Io(err.to_string()))?;
            let diagnostics = stderr_task.await.unwrap_or_default();

            check_exit(status, &diagnostics)?;
        })
    }

    async fn remove_files(&self, ids: &[Uuid]) {
        self.artifacts.remove_files(ids).await;
    }
}

fn check_exit(status: std::process::ExitStatus, diagnostics: &str) -> Result<(), ConcatError> {
    let diagnostics = diagnostics.trim();
    if !diagnostics.is_empty() {
        warn!(
            target = "infra::pdf::concatenate",
            stderr = %diagnostics,
            "concatenation tool wrote to stderr"
        );
        return Err(ConcatError::Tool(diagnostics.to_string()));
    }
    if !status.success() {
        return Err(ConcatError::Exit(status.to_string()));
    }
    Ok(())
}

fn into_pdf_stream<S>(stream: S) -> PdfStream
where
    S: Stream<Item = Result<Bytes, ConcatError>> + Send + 'static,
{
    Box::pin(stream)
}

async fn collect_output<R>(mut reader: R) -> String
where
    R: AsyncRead + Unpin,
{
    let mut output = Vec::new();
    let _ = reader.read_to_end(&mut output).await;
    String::from_utf8_lossy(&output).into_owned()
}
