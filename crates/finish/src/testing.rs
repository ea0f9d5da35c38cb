//! Deterministic in-process places for protocol tests.
//!
//! Messages wait in one queue per (sender, destination) channel until a test
//! delivers them, so tests choose any interleaving across senders while each
//! channel stays FIFO. Jobs wait in one queue until [`Sim::run_jobs`].

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use pgas_place::{PlaceError, PlaceId};

use crate::{Executor, FinishKind, Job, Place, PlaceMessage, Transport};

pub(crate) struct SimNet {
	max_place: AtomicUsize,
	channels: Mutex<BTreeMap<(PlaceId, PlaceId), VecDeque<PlaceMessage>>>,
	dead: Mutex<HashSet<PlaceId>>,
}

impl Transport for SimNet {
	fn max_place(&self) -> usize {
		self.max_place.load(Ordering::Acquire)
	}

	fn send(&self, from: PlaceId, to: PlaceId, msg: PlaceMessage) -> pgas_place::Result<()> {
		let places = self.max_place();
		if to.index() >= places {
			return Err(PlaceError::BadPlace { place: to, places });
		}
		if self.dead.lock().contains(&to) {
			return Err(PlaceError::Dead(to));
		}
		self.channels.lock().entry((from, to)).or_default().push_back(msg);
		Ok(())
	}
}

#[derive(Default)]
pub(crate) struct SimExecutor {
	jobs: Mutex<VecDeque<Job>>,
}

impl Executor for SimExecutor {
	fn execute(&self, job: Job) {
		self.jobs.lock().push_back(job);
	}
}

pub(crate) struct Sim {
	net: Arc<SimNet>,
	executor: Arc<SimExecutor>,
	places: Vec<Arc<Place>>,
}

impl Sim {
	pub fn new(places: u32) -> Self {
		Self::with_kind(places, FinishKind::Default)
	}

	pub fn with_kind(places: u32, kind: FinishKind) -> Self {
		let net = Arc::new(SimNet {
			max_place: AtomicUsize::new(places as usize),
			channels: Mutex::new(BTreeMap::new()),
			dead: Mutex::new(HashSet::new()),
		});
		let executor = Arc::new(SimExecutor::default());
		let places = (0..places)
			.map(|p| {
				let transport: Arc<dyn Transport> = Arc::clone(&net) as Arc<dyn Transport>;
				let exec: Arc<dyn Executor> = Arc::clone(&executor) as Arc<dyn Executor>;
				Arc::new(Place::new(PlaceId(p), transport, exec).with_finish_kind(kind).with_spin_before_block(0))
			})
			.collect();
		Self { net, executor, places }
	}

	pub fn place(&self, p: u32) -> &Arc<Place> {
		&self.places[p as usize]
	}

	/// Messages waiting on the `from -> to` channel.
	pub fn pending(&self, from: u32, to: u32) -> usize {
		self.net.channels.lock().get(&(PlaceId(from), PlaceId(to))).map_or(0, VecDeque::len)
	}

	/// Applies the oldest message of the `from -> to` channel.
	pub fn deliver(&self, from: u32, to: u32) -> bool {
		let msg = self
			.net
			.channels
			.lock()
			.get_mut(&(PlaceId(from), PlaceId(to)))
			.and_then(VecDeque::pop_front);
		match msg {
			Some(msg) => {
				msg(self.place(to));
				true
			}
			None => false,
		}
	}

	/// Applies queued messages until every channel is empty.
	pub fn deliver_all(&self) -> usize {
		let mut delivered = 0;
		loop {
			let next = {
				let mut channels = self.net.channels.lock();
				channels
					.iter_mut()
					.find_map(|(&(_, to), queue)| queue.pop_front().map(|msg| (to, msg)))
			};
			let Some((to, msg)) = next else {
				return delivered;
			};
			msg(&self.places[to.index()]);
			delivered += 1;
		}
	}

	/// Runs queued jobs until none is left.
	pub fn run_jobs(&self) -> usize {
		let mut ran = 0;
		loop {
			let job = self.executor.jobs.lock().pop_front();
			let Some(job) = job else {
				return ran;
			};
			job();
			ran += 1;
		}
	}

	/// Delivers messages and runs jobs until nothing is left to do.
	pub fn run_until_quiet(&self) {
		while self.deliver_all() + self.run_jobs() > 0 {}
	}

	pub fn kill(&self, p: u32) {
		self.net.dead.lock().insert(PlaceId(p));
	}

	/// Raises the number of known places without creating new ones.
	pub fn grow(&self, places: usize) {
		self.net.max_place.store(places, Ordering::Release);
	}
}
