//! Cancellable node listings
//!
//! A listing is a producer task feeding a bounded channel. The consumer side,
//! [`NodeStream`], is a lazy `Stream` that owns the cancellation token: calling
//! [`NodeStream::cancel`] or dropping the stream tells the producer to stop and
//! release whatever cursor it holds.

use arbor_common::{Result, TreeNode};
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

/// Consumer side of a listing
pub struct NodeStream {
    inner: ReceiverStream<Result<TreeNode>>,
    cancel: CancellationToken,
}

/// Producer side of a listing
pub struct NodeSink {
    tx: mpsc::Sender<Result<TreeNode>>,
    cancel: CancellationToken,
}

impl NodeStream {
    /// Create a connected sink/stream pair with room for `buffer` items
    pub fn channel(buffer: usize) -> (NodeSink, Self) {
        Self::channel_with_cancel(buffer, CancellationToken::new())
    }

    /// Create a pair that also stops when `cancel` fires
    pub fn channel_with_cancel(buffer: usize, cancel: CancellationToken) -> (NodeSink, Self) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let sink = NodeSink {
            tx,
            cancel: cancel.clone(),
        };
        let stream = Self {
            inner: ReceiverStream::new(rx),
            cancel,
        };
        (sink, stream)
    }

    /// Stop the listing. Items not yet received are discarded.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this listing when fired
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Drain the listing, stopping at the first error
    pub async fn try_collect_nodes(mut self) -> Result<Vec<TreeNode>> {
        let mut nodes = Vec::new();
        while let Some(item) = self.next().await {
            nodes.push(item?);
        }
        Ok(nodes)
    }
}

impl Stream for NodeStream {
    type Item = Result<TreeNode>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.cancel.is_cancelled() {
            self.inner.close();
            return Poll::Ready(None);
        }
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Drop for NodeStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl NodeSink {
    /// Forward one item.
    ///
    /// Waits for channel capacity, but gives up as soon as the listing is
    /// cancelled. Returns `false` when the producer should stop.
    pub async fn send(&self, item: Result<TreeNode>) -> bool {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => false,
            sent = self.tx.send(item) => sent.is_ok(),
        }
    }

    /// Resolves once the listing is cancelled or the consumer is gone
    pub async fn cancelled(&self) {
        tokio::select! {
            () = self.cancel.cancelled() => {}
            () = self.tx.closed() => {}
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }
}
