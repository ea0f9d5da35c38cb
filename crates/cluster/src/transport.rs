//! In-process transport and executor.

use std::sync::Arc;

use pgas_finish::{Executor, Job, Place, PlaceMessage, Transport};
use pgas_place::{PlaceError, PlaceId};
use pgas_worker::{ExecutorStats, Inbox, InboxReceiver, InboxSender, TaskClass};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

/// Delivers messages through one FIFO inbox per place.
pub struct LocalTransport {
	inboxes: Vec<InboxSender<PlaceMessage>>,
}

impl LocalTransport {
	/// Creates inboxes for `places` places, returning their receivers in place order.
	pub fn new(places: usize) -> (Self, Vec<InboxReceiver<PlaceMessage>>) {
		let inboxes: Vec<Inbox<PlaceMessage>> = (0..places).map(|_| Inbox::new()).collect();
		let receivers = inboxes.iter().map(Inbox::receiver).collect();
		let senders = inboxes.iter().map(Inbox::sender).collect();
		(Self { inboxes: senders }, receivers)
	}

	fn inbox(&self, place: PlaceId) -> pgas_place::Result<&InboxSender<PlaceMessage>> {
		self.inboxes.get(place.index()).ok_or(PlaceError::BadPlace {
			place,
			places: self.inboxes.len(),
		})
	}

	/// Stops accepting messages for `place`. Queued messages are still applied.
	pub fn kill(&self, place: PlaceId) -> pgas_place::Result<()> {
		self.inbox(place)?.close();
		tracing::warn!(place = %place, "transport.kill");
		Ok(())
	}

	/// Returns true once `place` has been killed or shut down.
	pub fn is_dead(&self, place: PlaceId) -> bool {
		self.inbox(place).map_or(true, InboxSender::is_closed)
	}

	pub(crate) fn close_all(&self) {
		for inbox in &self.inboxes {
			inbox.close();
		}
	}
}

impl Transport for LocalTransport {
	fn max_place(&self) -> usize {
		self.inboxes.len()
	}

	fn send(&self, from: PlaceId, to: PlaceId, msg: PlaceMessage) -> pgas_place::Result<()> {
		let sent = self.inbox(to)?.send(msg);
		if sent.is_err() {
			tracing::warn!(from = %from, to = %to, "transport.send.dead");
			return Err(PlaceError::Dead(to));
		}
		tracing::trace!(from = %from, to = %to, "transport.send");
		Ok(())
	}
}

/// Runs task bodies on a runtime's blocking pool.
pub struct PoolExecutor {
	handle: Handle,
	stats: Arc<ExecutorStats>,
}

impl PoolExecutor {
	/// Creates an executor spawning onto `handle`, counting into `stats`.
	pub fn new(handle: Handle, stats: Arc<ExecutorStats>) -> Self {
		Self { handle, stats }
	}
}

impl Executor for PoolExecutor {
	fn execute(&self, job: Job) {
		self.stats.activity_started();
		let stats = Arc::clone(&self.stats);
		let _detached = pgas_worker::spawn_blocking_on(&self.handle, TaskClass::Activity, move || {
			job();
			stats.activity_completed();
		});
	}
}

/// Applies messages delivered to `place` strictly in arrival order.
pub(crate) async fn pump(place: Arc<Place>, inbox: InboxReceiver<PlaceMessage>, stats: Arc<ExecutorStats>, shutdown: CancellationToken) {
	loop {
		let msg = tokio::select! {
			_ = shutdown.cancelled() => break,
			msg = inbox.recv() => match msg {
				Some(msg) => msg,
				None => break,
			},
		};
		msg(&place);
		stats.message_delivered();
	}
	tracing::debug!(place = %place.here(), "place.pump.stopped");
}
