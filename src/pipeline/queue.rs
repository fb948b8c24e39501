//! Per-kind worker pools running signing operations in FIFO order.

// std
use std::task::{Context, Poll};
// crates.io
use tokio::{
	runtime::Handle,
	sync::{mpsc, oneshot},
};
// self
use crate::{
	_prelude::*,
	auth::CredentialKind,
	pipeline::operation::{SignedRequest, SigningOperation},
};

struct Job {
	operation: SigningOperation,
	reply: oneshot::Sender<Result<SignedRequest>>,
}

/// Bounded-concurrency queue for one credential kind.
///
/// `concurrency` workers share a single FIFO channel; each worker runs one operation at a
/// time. Workers exit once the queue is dropped and the channel drains.
pub(crate) struct PipelineQueue {
	kind: CredentialKind,
	sender: mpsc::UnboundedSender<Job>,
}
impl PipelineQueue {
	pub(crate) fn spawn(kind: CredentialKind, concurrency: usize, runtime: &Handle) -> Self {
		let (sender, receiver) = mpsc::unbounded_channel();
		let receiver = Arc::new(AsyncMutex::new(receiver));

		for _ in 0..concurrency {
			runtime.spawn(work(receiver.clone()));
		}

		Self { kind, sender }
	}

	/// Queues `operation`; dropping the ticket abandons it.
	pub(crate) fn submit(&self, operation: SigningOperation) -> QueueTicket {
		let (reply, ticket) = oneshot::channel();

		// A closed channel drops the job and its reply, so the ticket resolves to shutdown.
		let _ = self.sender.send(Job { operation, reply });

		QueueTicket(ticket)
	}
}
impl Debug for PipelineQueue {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PipelineQueue")
			.field("kind", &self.kind)
			.field("closed", &self.sender.is_closed())
			.finish()
	}
}

/// Pending result of a queued signing operation.
pub(crate) struct QueueTicket(oneshot::Receiver<Result<SignedRequest>>);
impl Future for QueueTicket {
	type Output = Result<SignedRequest>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		Pin::new(&mut self.0).poll(cx).map(|received| received.unwrap_or(Err(Error::PipelineShutdown)))
	}
}

async fn work(receiver: Arc<AsyncMutex<mpsc::UnboundedReceiver<Job>>>) {
	loop {
		let next = receiver.lock().await.recv().await;
		let Some(Job { operation, mut reply }) = next else {
			break;
		};
		let outcome = tokio::select! {
			result = operation.run() => Some(result),
			_ = reply.closed() => None,
		};

		if let Some(result) = outcome {
			let _ = reply.send(result);
		}
	}
}
