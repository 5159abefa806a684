//! Single-assignment completion primitive.
//!
//! A [`Completion`] starts pending, resolves exactly once and delivers the
//! value to every observer exactly once, in registration order. Observers
//! attached after resolution run immediately on the attaching thread. The
//! "channel becomes open" signal and every per-call outcome use this type.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;

use super::error::Error;

type Observer<T> = Box<dyn FnOnce(&T) + Send + 'static>;

enum State<T> {
    Pending(Vec<Observer<T>>),
    Resolved(Arc<T>),
}

pub struct Completion<T> {
    state: Arc<Mutex<State<T>>>,
}

/// Cloning yields another handle onto the same pending value.
impl<T> Clone for Completion<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> std::fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let resolved = matches!(
            &*self.state.lock().expect("completion state poisoned"),
            State::Resolved(_)
        );
        f.debug_struct("Completion")
            .field("resolved", &resolved)
            .finish()
    }
}

impl<T: Send + 'static> Default for Completion<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> Completion<T> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::Pending(Vec::new()))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().expect("completion state poisoned")
    }

    /// Resolve with `value`. A second call is a programming error and leaves
    /// the stored value untouched.
    ///
    /// Observers run on the calling thread, with no internal lock held, so
    /// an observer may itself attach observers or issue new operations.
    pub fn resolve(&self, value: T) -> Result<(), Error> {
        let (observers, value) = {
            let mut state = self.lock();
            if matches!(&*state, State::Resolved(_)) {
                return Err(Error::AlreadyResolved);
            }
            let value = Arc::new(value);
            let previous = std::mem::replace(&mut *state, State::Resolved(Arc::clone(&value)));
            match previous {
                State::Pending(observers) => (observers, value),
                State::Resolved(_) => unreachable!("checked pending above"),
            }
        };
        for observer in observers {
            observer(&value);
        }
        Ok(())
    }

    /// Register an observer. Runs at resolution time, or immediately if the
    /// completion is already resolved.
    pub fn on_resolved<F>(&self, observer: F)
    where
        F: FnOnce(&T) + Send + 'static,
    {
        let value = {
            let mut state = self.lock();
            match &mut *state {
                State::Pending(observers) => {
                    observers.push(Box::new(observer));
                    return;
                }
                State::Resolved(value) => Arc::clone(value),
            }
        };
        observer(&value);
    }

    pub fn is_resolved(&self) -> bool {
        matches!(&*self.lock(), State::Resolved(_))
    }
}

impl<T: Clone + Send + 'static> Completion<T> {
    /// Copy of the resolved value, `None` while pending.
    pub fn try_get(&self) -> Option<T> {
        match &*self.lock() {
            State::Resolved(value) => Some((**value).clone()),
            State::Pending(_) => None,
        }
    }
}

/// The outcome handle returned by channel operations: success or failure is
/// delivered through one path per call site.
pub type Pending<T> = Completion<std::result::Result<T, Error>>;

impl<T: Clone + Send + 'static> Completion<std::result::Result<T, Error>> {
    /// Await resolution from async code.
    pub async fn wait(&self) -> std::result::Result<T, Error> {
        let (tx, rx) = oneshot::channel();
        self.on_resolved(move |outcome: &std::result::Result<T, Error>| {
            let _ = tx.send(outcome.clone());
        });
        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::InternalChannelError(
                "completion dropped before resolution".to_string(),
            )),
        }
    }
}

/////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::{Completion, Error, Pending};

    #[test]
    fn test_resolve_at_most_once() {
        let completion = Completion::new();
        assert_eq!(Ok(()), completion.resolve(1u32));
        // second resolution must not overwrite the value
        assert_eq!(Err(Error::AlreadyResolved), completion.resolve(2u32));
        assert_eq!(Some(1), completion.try_get());
    }

    #[test]
    fn test_observers_run_in_registration_order() {
        let completion: Completion<u32> = Completion::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..4 {
            let order = Arc::clone(&order);
            completion.on_resolved(move |v| order.lock().unwrap().push((i, *v)));
        }
        assert_eq!(true, order.lock().unwrap().is_empty());

        completion.resolve(7).unwrap();
        assert_eq!(
            vec![(0, 7), (1, 7), (2, 7), (3, 7)],
            *order.lock().unwrap()
        );
    }

    #[test]
    fn test_late_observer_runs_immediately() {
        let completion = Completion::new();
        completion.resolve("done".to_string()).unwrap();

        let seen = Arc::new(Mutex::new(None));
        let observed = Arc::clone(&seen);
        completion.on_resolved(move |v: &String| *observed.lock().unwrap() = Some(v.clone()));
        assert_eq!(Some("done".to_string()), *seen.lock().unwrap());
    }

    #[test]
    fn test_observer_may_reenter() {
        let completion: Completion<u32> = Completion::new();
        let seen = Arc::new(Mutex::new(None));

        let clone = completion.clone();
        let observed = Arc::clone(&seen);
        completion.on_resolved(move |v| {
            // re-entrant use of the same completion from an observer
            assert!(clone.is_resolved());
            *observed.lock().unwrap() = clone.try_get().map(|got| got + *v);
        });
        completion.resolve(21).unwrap();
        assert_eq!(Some(42), *seen.lock().unwrap());
    }

    #[tokio::test]
    async fn test_wait_bridges_to_async() {
        let pending: Pending<u8> = Completion::new();
        let waiter = {
            let pending = pending.clone();
            tokio::spawn(async move { pending.wait().await })
        };
        pending.resolve(Ok(9)).unwrap();
        assert_eq!(Ok(9), waiter.await.unwrap());
    }
}
