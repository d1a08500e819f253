// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

pub const PRIORITY_HIGH: i32 = 100;
pub const PRIORITY_NORMAL: i32 = 0;
pub const PRIORITY_LOW: i32 = -100;

/// A subscriber callback. Kept behind an `Arc` so the same value can later be handed to
/// [`PriorityDispatcher::unregister`].
pub type Handler<A> = Arc<dyn Fn(&A, &Veto) + Send + Sync>;

/// Handed to every callback of a single dispatch. Calling [`Veto::veto`] stops the dispatch once
/// the current priority bucket has finished.
#[derive(Debug, Default)]
pub struct Veto(AtomicBool);

impl Veto {
    pub fn veto(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_vetoed(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Ordered fan-out to callbacks grouped by priority. Higher priorities run first, and callbacks
/// within a priority run in registration order.
pub struct PriorityDispatcher<A> {
    handlers: Mutex<BTreeMap<i32, Vec<Handler<A>>>>,
}

impl<A> Default for PriorityDispatcher<A> {
    fn default() -> Self {
        Self {
            handlers: Mutex::new(BTreeMap::new()),
        }
    }
}

impl<A> PriorityDispatcher<A> {
    /// Add `handler` at `priority`. Any integer is a valid priority. Returns the handler so it
    /// can be unregistered later.
    pub fn register(&self, handler: Handler<A>, priority: i32) -> Handler<A> {
        self.handlers
            .lock()
            .entry(priority)
            .or_default()
            .push(handler.clone());
        handler
    }

    pub fn register_fn<F>(&self, priority: i32, f: F) -> Handler<A>
    where
        F: Fn(&A, &Veto) + Send + Sync + 'static,
    {
        self.register(Arc::new(f), priority)
    }

    /// Remove `handler`, once from each priority it was registered at. Returns how many
    /// registrations were removed.
    pub fn unregister(&self, handler: &Handler<A>) -> usize {
        let target = Arc::as_ptr(handler).cast::<()>();
        let mut removed = 0;
        let mut handlers = self.handlers.lock();
        for bucket in handlers.values_mut() {
            if let Some(position) = bucket
                .iter()
                .position(|h| Arc::as_ptr(h).cast::<()>() == target)
            {
                bucket.remove(position);
                removed += 1;
            }
        }
        handlers.retain(|_, bucket| !bucket.is_empty());
        removed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.lock().values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run every callback with `args`. Returns false if any callback vetoed.
    ///
    /// The veto is only observed between buckets: the rest of the vetoing callback's bucket still
    /// runs. Callbacks are invoked without the registration lock held, so they may register,
    /// unregister or dispatch on this same dispatcher.
    pub fn dispatch(&self, args: &A) -> bool {
        let buckets: Vec<Vec<Handler<A>>> = self.handlers.lock().values().rev().cloned().collect();
        let veto = Veto::default();
        for bucket in buckets {
            if veto.is_vetoed() {
                return false;
            }
            for handler in bucket {
                handler(args, &veto);
            }
        }
        !veto.is_vetoed()
    }
}
