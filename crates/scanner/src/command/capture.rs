#![forbid(unsafe_code)]

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tracing::warn;

const CHUNK_SIZE: usize = 8 * 1024;

/// Background reader draining one child pipe into a shared buffer.
///
/// The buffer is filled chunk by chunk so whatever arrived before a kill
/// can still be recovered.
pub(crate) struct Capture {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: Option<JoinHandle<()>>,
}

impl Capture {
    pub(crate) fn spawn<R>(pipe: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let task = pipe.map(|mut pipe| {
            let buffer = Arc::clone(&buffer);
            tokio::spawn(async move {
                let mut chunk = vec![0u8; CHUNK_SIZE];
                loop {
                    match pipe.read(&mut chunk).await {
                        Ok(0) => break,
                        Ok(n) => lock(&buffer).extend_from_slice(&chunk[..n]),
                        Err(err) => {
                            warn!(%err, "failed to read command output");
                            break;
                        }
                    }
                }
            })
        });
        Self { buffer, task }
    }

    /// Resolve once the pipe reached end of file. Cancel safe.
    pub(crate) async fn finished(&mut self) {
        if let Some(task) = self.task.as_mut() {
            let _ = task.await;
        }
        self.task = None;
    }

    /// Read until end of file and return everything captured.
    pub(crate) async fn collect(self) -> Vec<u8> {
        if let Some(task) = self.task {
            let _ = task.await;
        }
        std::mem::take(&mut *lock(&self.buffer))
    }

    /// Allow `grace` for the pipe to drain, then return what was captured so far.
    pub(crate) async fn collect_within(self, grace: Duration) -> Vec<u8> {
        if let Some(mut task) = self.task
            && tokio::time::timeout(grace, &mut task).await.is_err()
        {
            task.abort();
        }
        std::mem::take(&mut *lock(&self.buffer))
    }
}

fn lock(buffer: &Mutex<Vec<u8>>) -> MutexGuard<'_, Vec<u8>> {
    match buffer.lock() {
        Ok(b) => b,
        Err(poisoned) => poisoned.into_inner(),
    }
}
