use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

/// Error returned when sending into a closed inbox.
///
/// Carries the rejected message back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InboxClosed<T>(pub T);

struct InboxState<T> {
	queue: VecDeque<T>,
	closed: bool,
}

struct InboxInner<T> {
	state: Mutex<InboxState<T>>,
	notify_recv: Notify,
}

/// Unbounded FIFO inbox feeding one place.
///
/// Senders never wait, so an inbox can be fed while the caller holds other
/// locks. Messages from one sender are received in the order they were sent.
pub struct Inbox<T> {
	inner: Arc<InboxInner<T>>,
}

/// Multi-producer inbox sender.
pub struct InboxSender<T> {
	inner: Arc<InboxInner<T>>,
}

/// Inbox receiver.
pub struct InboxReceiver<T> {
	inner: Arc<InboxInner<T>>,
}

impl<T> Clone for InboxSender<T> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<T> Default for Inbox<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T> Inbox<T> {
	/// Creates an empty open inbox.
	pub fn new() -> Self {
		Self {
			inner: Arc::new(InboxInner {
				state: Mutex::new(InboxState {
					queue: VecDeque::new(),
					closed: false,
				}),
				notify_recv: Notify::new(),
			}),
		}
	}

	/// Returns a sender handle.
	pub fn sender(&self) -> InboxSender<T> {
		InboxSender {
			inner: Arc::clone(&self.inner),
		}
	}

	/// Returns a receiver handle.
	pub fn receiver(&self) -> InboxReceiver<T> {
		InboxReceiver {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<T> InboxSender<T> {
	/// Enqueues one message.
	pub fn send(&self, msg: T) -> Result<(), InboxClosed<T>> {
		let mut state = self.inner.state.lock();
		if state.closed {
			return Err(InboxClosed(msg));
		}
		state.queue.push_back(msg);
		drop(state);
		self.inner.notify_recv.notify_one();
		Ok(())
	}

	/// Closes the inbox. Receivers drain queued messages then return `None`.
	pub fn close(&self) {
		self.inner.state.lock().closed = true;
		self.inner.notify_recv.notify_waiters();
		self.inner.notify_recv.notify_one();
	}

	/// Returns true once the inbox has been closed.
	pub fn is_closed(&self) -> bool {
		self.inner.state.lock().closed
	}
}

impl<T> InboxReceiver<T> {
	/// Receives one message. Returns `None` once the inbox is closed and drained.
	pub async fn recv(&self) -> Option<T> {
		loop {
			// Register interest before inspecting the queue so a send racing
			// with this check still wakes us.
			let notified = self.inner.notify_recv.notified();
			{
				let mut state = self.inner.state.lock();
				if let Some(msg) = state.queue.pop_front() {
					return Some(msg);
				}
				if state.closed {
					return None;
				}
			}
			notified.await;
		}
	}

	/// Takes one message without waiting.
	pub fn try_recv(&self) -> Option<T> {
		self.inner.state.lock().queue.pop_front()
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use super::*;

	#[tokio::test]
	async fn delivers_in_send_order() {
		let inbox = Inbox::new();
		let tx = inbox.sender();
		let rx = inbox.receiver();

		for n in 1..=5u32 {
			tx.send(n).unwrap();
		}
		tx.close();

		let mut seen = Vec::new();
		while let Some(n) = rx.recv().await {
			seen.push(n);
		}
		assert_eq!(seen, vec![1, 2, 3, 4, 5]);
	}

	#[tokio::test]
	async fn send_after_close_returns_message() {
		let inbox = Inbox::new();
		let tx = inbox.sender();
		tx.close();
		assert_eq!(tx.send(7u8), Err(InboxClosed(7)));
		assert!(tx.is_closed());
	}

	#[tokio::test]
	async fn recv_wakes_on_later_send() {
		let inbox = Inbox::new();
		let tx = inbox.sender();
		let rx = inbox.receiver();

		let waiter = tokio::spawn(async move { rx.recv().await });
		tokio::time::sleep(Duration::from_millis(10)).await;
		tx.send("late").unwrap();

		let got = tokio::time::timeout(Duration::from_secs(1), waiter)
			.await
			.expect("receiver should wake")
			.unwrap();
		assert_eq!(got, Some("late"));
	}

	#[tokio::test]
	async fn close_wakes_idle_receiver() {
		let inbox: Inbox<()> = Inbox::new();
		let tx = inbox.sender();
		let rx = inbox.receiver();

		let waiter = tokio::spawn(async move { rx.recv().await });
		tokio::time::sleep(Duration::from_millis(10)).await;
		tx.close();

		let got = tokio::time::timeout(Duration::from_secs(1), waiter)
			.await
			.expect("close should wake receiver")
			.unwrap();
		assert_eq!(got, None);
	}

	#[test]
	fn senders_from_many_threads_keep_per_sender_order() {
		let inbox = Inbox::new();
		let rx = inbox.receiver();

		let handles: Vec<_> = (0..4u32)
			.map(|sender| {
				let tx = inbox.sender();
				std::thread::spawn(move || {
					for seq in 0..100u32 {
						tx.send((sender, seq)).unwrap();
					}
				})
			})
			.collect();
		for h in handles {
			h.join().unwrap();
		}

		let mut last = [None::<u32>; 4];
		while let Some((sender, seq)) = rx.try_recv() {
			let slot = &mut last[sender as usize];
			assert!(slot.is_none_or(|prev| prev < seq), "sender {sender} reordered");
			*slot = Some(seq);
		}
		assert!(last.iter().all(|s| *s == Some(99)));
	}
}
