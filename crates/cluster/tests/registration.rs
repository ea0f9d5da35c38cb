use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use pgas_cluster::{Cluster, RuntimeConfig};
use pgas_finish::{
	Error, async_arbitrary_finish, async_at_with_co_finish, async_different_finish, current_finish, finish, here,
};
use pgas_place::PlaceId;

fn cluster() -> Cluster {
	Cluster::start(RuntimeConfig {
		places: 3,
		..RuntimeConfig::default()
	})
	.unwrap()
}

fn slow_flag(flag: &Arc<AtomicBool>) -> impl FnOnce() -> anyhow::Result<()> + Send + 'static {
	let flag = Arc::clone(flag);
	move || {
		std::thread::sleep(Duration::from_millis(30));
		flag.store(true, Ordering::SeqCst);
		Ok(())
	}
}

#[test]
fn co_finish_holds_both_scopes() {
	let cluster = cluster();
	let done = Arc::new(AtomicBool::new(false));
	let inner_saw = Arc::new(AtomicBool::new(false));
	let (job_flag, inner_flag, check) = (Arc::clone(&done), Arc::clone(&inner_saw), Arc::clone(&done));

	cluster
		.finish(move || {
			let outer = current_finish()?;
			finish(|| {
				let inner = current_finish()?;
				// Governed by the inner scope, also registered with the outer one.
				async_at_with_co_finish(PlaceId(1), slow_flag(&job_flag), &[Arc::clone(&outer)])?;
				assert!(!Arc::ptr_eq(&inner, &outer));
				Ok(())
			})?;
			inner_flag.store(check.load(Ordering::SeqCst), Ordering::SeqCst);
			Ok(())
		})
		.unwrap();

	assert!(inner_saw.load(Ordering::SeqCst), "inner scope waited for the task");
	assert!(done.load(Ordering::SeqCst));
}

#[test]
fn co_finish_failure_goes_to_governing_scope() {
	let cluster = cluster();
	let inner_failures = Arc::new(AtomicBool::new(false));
	let seen = Arc::clone(&inner_failures);

	cluster
		.finish(move || {
			let outer = current_finish()?;
			let err = finish(|| {
				async_at_with_co_finish(PlaceId(2), || anyhow::bail!("shared task failed"), &[outer])?;
				Ok(())
			})
			.unwrap_err();
			seen.store(err.failures().is_some_and(|f| f.len() == 1), Ordering::SeqCst);
			Ok(())
		})
		.unwrap();

	assert!(inner_failures.load(Ordering::SeqCst));
}

#[test]
fn arbitrary_finish_escapes_the_current_scope() {
	let cluster = cluster();
	let done = Arc::new(AtomicBool::new(false));
	let (job_flag, check) = (Arc::clone(&done), Arc::clone(&done));
	let inner_saw = Arc::new(AtomicBool::new(true));
	let inner_flag = Arc::clone(&inner_saw);

	cluster
		.finish(move || {
			let outer = current_finish()?;
			finish(|| {
				async_arbitrary_finish(PlaceId(2), slow_flag(&job_flag), &[outer])?;
				Ok(())
			})?;
			inner_flag.store(check.load(Ordering::SeqCst), Ordering::SeqCst);
			Ok(())
		})
		.unwrap();

	assert!(!inner_saw.load(Ordering::SeqCst), "inner scope did not wait");
	assert!(done.load(Ordering::SeqCst), "outer scope waited");
}

#[test]
fn arbitrary_finish_needs_a_finish() {
	let cluster = cluster();
	cluster
		.finish(|| {
			let err = async_arbitrary_finish(PlaceId(1), || Ok(()), &[]).unwrap_err();
			assert!(matches!(err, Error::NoFinish));
			Ok(())
		})
		.unwrap();
}

#[test]
fn different_finish_is_told_instead_of_current() {
	let cluster = cluster();
	let done = Arc::new(AtomicBool::new(false));
	let job_flag = Arc::clone(&done);

	let err = cluster
		.finish(move || {
			let outer = current_finish()?;
			finish(|| {
				async_different_finish(&outer, slow_flag(&job_flag));
				async_different_finish(&outer, || anyhow::bail!("reported to outer at {}", here()?));
				Ok(())
			})?;
			Ok(())
		})
		.unwrap_err();

	assert!(done.load(Ordering::SeqCst));
	let failures = err.failures().unwrap();
	assert_eq!(failures.len(), 1);
	assert_eq!(failures.failures()[0].message(), "reported to outer at place(0)");
}
