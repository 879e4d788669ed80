#![allow(dead_code)]

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;

use field_access::*;

/// What one rank posts to a collective.
#[derive(Clone)]
enum Payload {
    Ints(Vec<i64>),
    Fragments(Vec<Fragment>),
}

struct State {
    arrived: usize,
    generation: usize,
    poisoned: bool,
    slots: Vec<Option<Payload>>,
}

/// A reusable barrier plus the slots the ranks post to. Unlike
/// `std::sync::Barrier` it is released when any rank panics.
struct Shared {
    size: usize,
    state: Mutex<State>,
    turn: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn wait(&self) {
        let mut state = self.lock();
        if state.poisoned {
            panic!("another rank panicked");
        }
        state.arrived += 1;
        if state.arrived == self.size {
            state.arrived = 0;
            state.generation += 1;
            self.turn.notify_all();
            return;
        }
        let generation = state.generation;
        while state.generation == generation {
            if state.poisoned {
                panic!("another rank panicked");
            }
            state = self.turn.wait(state).unwrap_or_else(|e| e.into_inner());
        }
    }

    fn poison(&self) {
        self.lock().poisoned = true;
        self.turn.notify_all();
    }
}

/// A worker group whose ranks are threads of the test process.
pub struct ThreadGroup {
    rank: usize,
    size: usize,
    shared: Arc<Shared>,
}

impl Drop for ThreadGroup {
    fn drop(&mut self) {
        if thread::panicking() {
            self.shared.poison();
        }
    }
}

impl ThreadGroup {
    /// Posts this rank's payload and returns every rank's, in rank order.
    fn exchange(&self, payload: Payload) -> Vec<Payload> {
        self.shared.lock().slots[self.rank] = Some(payload);
        self.shared.wait();
        let all = self.shared
            .lock()
            .slots
            .iter()
            .map(|p| p.clone().expect("every rank posts before the barrier"))
            .collect();
        // no rank may post again until everyone has read
        self.shared.wait();
        all
    }

    fn reduce(&self, local: &[i64], op: fn(i64, i64) -> i64) -> Vec<i64> {
        let all = self.exchange(Payload::Ints(local.to_vec()));
        let mut out = local.to_vec();
        for p in all {
            if let Payload::Ints(v) = p {
                for (o, x) in out.iter_mut().zip(v) {
                    *o = op(*o, x);
                }
            }
        }
        out
    }
}

impl WorkerGroup for ThreadGroup {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn all_reduce_min(&self, local: &[i64]) -> Vec<i64> {
        self.reduce(local, i64::min)
    }

    fn all_reduce_max(&self, local: &[i64]) -> Vec<i64> {
        self.reduce(local, i64::max)
    }

    fn all_gather(&self, local: Vec<Fragment>) -> Result<Vec<Vec<Fragment>>> {
        let all = self.exchange(Payload::Fragments(local))
            .into_iter()
            .map(|p| match p {
                Payload::Fragments(f) => f,
                Payload::Ints(_) => panic!("ranks called different collectives"),
            })
            .collect();
        Ok(all)
    }
}

/// Runs `f` on `size` ranks at once, returning their results in rank order.
pub fn run_group<T, F>(size: usize, f: F) -> Vec<T>
where
    F: Fn(ThreadGroup) -> T + Send + Sync + 'static,
    T: Send + 'static,
{
    let shared = Arc::new(Shared {
        size,
        state: Mutex::new(State {
            arrived: 0,
            generation: 0,
            poisoned: false,
            slots: vec![None; size],
        }),
        turn: Condvar::new(),
    });
    let f = Arc::new(f);

    let handles: Vec<_> = (0..size)
        .map(|rank| {
            let group = ThreadGroup { rank, size, shared: Arc::clone(&shared) };
            let f = Arc::clone(&f);
            thread::spawn(move || f(group))
        })
        .collect();

    handles.into_iter().map(|h| h.join().expect("rank panicked")).collect()
}

/// A smooth, easily recognized value for each global index.
pub fn signature(index: &[i64], comp: usize) -> Real {
    index.iter().fold(0.0, |acc, &i| 100.0 * acc + i as Real) + 0.5 * comp as Real
}

pub fn field(name: &str, variant: PatchVariant) -> FieldId {
    FieldId::parse(name, variant).unwrap()
}

pub fn store(design: StoreDesign) -> PatchStore {
    PatchStore::new(design, &SingleProcess).unwrap()
}
