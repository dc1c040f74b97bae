use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};

use crate::engine::batch::{columns_for_schema, transform_batch};
use crate::engine::NativeBatchStream;
use crate::error::DataSourceError;
use crate::types::{FieldInfo, ResultBatch};

/// Lazily transformed result batches of one query.
///
/// Each pull fetches and converts one engine batch. The stream is finite and
/// not restartable; once it has returned `None` (or an error) it stays done.
pub struct ResultBatchStream {
    native: NativeBatchStream,
    columns: Vec<FieldInfo>,
    pulled: usize,
    done: bool,
}

impl ResultBatchStream {
    pub(crate) fn new(native: NativeBatchStream) -> Self {
        let columns = columns_for_schema(native.schema().as_ref());
        Self {
            native,
            columns,
            pulled: 0,
            done: false,
        }
    }

    /// Columns of the result as declared by the engine, before any pull.
    pub fn columns(&self) -> &[FieldInfo] {
        &self.columns
    }

    /// Number of batches pulled so far.
    pub fn batches_pulled(&self) -> usize {
        self.pulled
    }

    /// Pull the next batch; `Ok(None)` marks the end of the result.
    pub async fn next_batch(&mut self) -> Result<Option<ResultBatch>, DataSourceError> {
        self.next().await.transpose()
    }
}

impl Stream for ResultBatchStream {
    type Item = Result<ResultBatch, DataSourceError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        match this.native.poll_next_unpin(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(None) => {
                this.done = true;
                Poll::Ready(None)
            }
            Poll::Ready(Some(Err(err))) => {
                this.done = true;
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(Some(Ok(batch))) => {
                this.pulled += 1;
                let transformed = transform_batch(&batch);
                if transformed.is_err() {
                    this.done = true;
                }
                Poll::Ready(Some(transformed))
            }
        }
    }
}
