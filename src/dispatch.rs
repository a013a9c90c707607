use crate::{entities::EntityError, registers::Address};
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

/// Something that wants to be refreshed when one of its registers changes.
pub trait AddressListener: Send + Sync {
    fn responds_to_address(&self, address: Address) -> bool;

    fn refresh(&self) -> Result<(), EntityError>;

    /// Label used when reporting a failed refresh.
    fn describe(&self) -> String;
}

/// Identifies one attached listener across all the addresses it is registered on.
#[derive(Debug, PartialEq, Eq, Hash, Copy, Clone, PartialOrd, Ord)]
pub struct ListenerHandle(u64);

#[derive(Debug, PartialEq, Eq, Copy, Clone, Default)]
pub struct DispatchSummary {
    pub notified: usize,
    pub failed: usize,
}

#[derive(Default)]
struct Registrations {
    next_handle: u64,
    listeners: HashMap<ListenerHandle, Weak<dyn AddressListener>>,
    by_address: HashMap<Address, Vec<ListenerHandle>>,
}

impl Registrations {
    fn handle_for(&mut self, listener: &Weak<dyn AddressListener>) -> ListenerHandle {
        if let Some((handle, _)) = self.listeners.iter().find(|(_, known)| known.ptr_eq(listener)) {
            return *handle;
        }

        let handle = ListenerHandle(self.next_handle);
        self.next_handle += 1;
        self.listeners.insert(handle, listener.clone());
        handle
    }

    /// Drops every listener whose owner is gone.
    fn prune(&mut self) {
        let dead: Vec<ListenerHandle> = self
            .listeners
            .iter()
            .filter(|(_, listener)| listener.strong_count() == 0)
            .map(|(handle, _)| *handle)
            .collect();

        for handle in dead {
            tracing::debug!(?handle, "pruning dropped listener");
            self.detach(handle);
        }
    }

    fn is_registered_anywhere(&self, handle: ListenerHandle) -> bool {
        self.by_address.values().any(|handles| handles.contains(&handle))
    }

    fn remove(&mut self, address: Address, handle: ListenerHandle) {
        if let Some(handles) = self.by_address.get_mut(&address) {
            handles.retain(|h| *h != handle);

            if handles.is_empty() {
                self.by_address.remove(&address);
            }
        }

        if !self.is_registered_anywhere(handle) {
            self.listeners.remove(&handle);
        }
    }

    fn detach(&mut self, handle: ListenerHandle) {
        self.by_address.retain(|_, handles| {
            handles.retain(|h| *h != handle);
            !handles.is_empty()
        });
        self.listeners.remove(&handle);
    }
}

/// Maps changed register addresses to the listeners that read them.
///
/// Only weak references are kept: a listener that has been dropped is never invoked and is
/// pruned on the next dispatch or registration.
#[derive(Default)]
pub struct ChangeDispatcher {
    registrations: Mutex<Registrations>,
}

impl ChangeDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registrations> {
        self.registrations.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `listener` on `address`.
    ///
    /// Registering the same listener on several addresses returns the same handle, so that a
    /// dispatch touching more than one of them still refreshes it only once.
    pub fn register<L>(&self, address: Address, listener: &Arc<L>) -> ListenerHandle
    where
        L: AddressListener + 'static,
    {
        let weak: Weak<L> = Arc::downgrade(listener);
        let weak: Weak<dyn AddressListener> = weak;

        let mut registrations = self.lock();
        registrations.prune();
        let handle = registrations.handle_for(&weak);

        let handles = registrations.by_address.entry(address).or_default();
        if !handles.contains(&handle) {
            handles.push(handle);
        }

        handle
    }

    pub fn unregister(&self, address: Address, handle: ListenerHandle) {
        self.lock().remove(address, handle);
    }

    /// Removes every registration of `handle`.
    pub fn detach(&self, handle: ListenerHandle) {
        self.lock().detach(handle);
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    pub fn notify(&self, changed: &HashSet<Address>) -> DispatchSummary {
        let targets: Vec<(ListenerHandle, Arc<dyn AddressListener>)> = {
            let mut registrations = self.lock();

            let handles: HashSet<ListenerHandle> = changed
                .iter()
                .filter_map(|address| registrations.by_address.get(address))
                .flatten()
                .copied()
                .collect();

            let mut targets = Vec::with_capacity(handles.len());
            let mut dead = Vec::new();

            for handle in handles {
                match registrations.listeners.get(&handle).map(Weak::upgrade) {
                    Some(Some(listener)) => targets.push((handle, listener)),
                    _ => dead.push(handle),
                }
            }

            for handle in dead {
                tracing::debug!(?handle, "pruning dropped listener");
                registrations.detach(handle);
            }

            targets
        };

        let mut summary = DispatchSummary::default();

        for (handle, listener) in targets {
            summary.notified += 1;

            if let Err(e) = listener.refresh() {
                summary.failed += 1;
                tracing::warn!(?handle, listener = %listener.describe(), "Unable to refresh entity: {e}");
            }
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Recorder {
        addresses: Vec<Address>,
        calls: AtomicUsize,
        fail: bool,
    }

    impl Recorder {
        fn new(addresses: &[Address]) -> Arc<Self> {
            Arc::new(Self {
                addresses: addresses.to_vec(),
                calls: AtomicUsize::new(0),
                fail: false,
            })
        }

        fn failing(addresses: &[Address]) -> Arc<Self> {
            Arc::new(Self {
                addresses: addresses.to_vec(),
                calls: AtomicUsize::new(0),
                fail: true,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl AddressListener for Recorder {
        fn responds_to_address(&self, address: Address) -> bool {
            self.addresses.contains(&address)
        }

        fn refresh(&self) -> Result<(), EntityError> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            if self.fail {
                Err(EntityError::NoData(self.addresses[0]))
            } else {
                Ok(())
            }
        }

        fn describe(&self) -> String {
            format!("recorder {:?}", self.addresses)
        }
    }

    fn attach(dispatcher: &ChangeDispatcher, recorder: &Arc<Recorder>) -> ListenerHandle {
        let mut handle = None;
        for &address in &recorder.addresses {
            handle = Some(dispatcher.register(address, recorder));
        }
        handle.unwrap()
    }

    fn changed(addresses: &[Address]) -> HashSet<Address> {
        addresses.iter().copied().collect()
    }

    #[test]
    fn notifies_each_affected_listener_once() {
        let dispatcher = ChangeDispatcher::new();
        let l1 = Recorder::new(&[100]);
        let l2 = Recorder::new(&[200]);
        let l3 = Recorder::new(&[100, 200]);

        attach(&dispatcher, &l1);
        attach(&dispatcher, &l2);
        attach(&dispatcher, &l3);

        let summary = dispatcher.notify(&changed(&[100]));

        assert_eq!(summary, DispatchSummary { notified: 2, failed: 0 });
        assert_eq!((l1.calls(), l2.calls(), l3.calls()), (1, 0, 1));
    }

    #[test]
    fn listener_on_several_changed_addresses_is_refreshed_once() {
        let dispatcher = ChangeDispatcher::new();
        let l3 = Recorder::new(&[100, 200]);

        let h1 = dispatcher.register(100, &l3);
        let h2 = dispatcher.register(200, &l3);
        assert_eq!(h1, h2);

        dispatcher.notify(&changed(&[100, 200, 300]));
        assert_eq!(l3.calls(), 1);
    }

    #[test]
    fn unregistered_listener_is_not_notified() {
        let dispatcher = ChangeDispatcher::new();
        let l1 = Recorder::new(&[100]);
        let other = Recorder::new(&[100]);

        let handle = attach(&dispatcher, &l1);
        attach(&dispatcher, &other);

        dispatcher.unregister(100, handle);
        dispatcher.unregister(100, handle);
        dispatcher.notify(&changed(&[100]));

        assert_eq!(l1.calls(), 0);
        assert_eq!(other.calls(), 1);
        assert_eq!(dispatcher.listener_count(), 1);
    }

    #[test]
    fn unregister_keeps_other_addresses() {
        let dispatcher = ChangeDispatcher::new();
        let l3 = Recorder::new(&[100, 200]);
        let handle = attach(&dispatcher, &l3);

        dispatcher.unregister(100, handle);
        dispatcher.notify(&changed(&[100]));
        assert_eq!(l3.calls(), 0);

        dispatcher.notify(&changed(&[200]));
        assert_eq!(l3.calls(), 1);

        dispatcher.detach(handle);
        dispatcher.notify(&changed(&[200]));
        assert_eq!(l3.calls(), 1);
        assert_eq!(dispatcher.listener_count(), 0);
    }

    #[test]
    fn failing_listener_does_not_stop_dispatch() {
        let dispatcher = ChangeDispatcher::new();
        let broken = Recorder::failing(&[100]);
        let healthy = Recorder::new(&[100]);

        attach(&dispatcher, &broken);
        attach(&dispatcher, &healthy);

        let summary = dispatcher.notify(&changed(&[100]));

        assert_eq!(summary, DispatchSummary { notified: 2, failed: 1 });
        assert_eq!(healthy.calls(), 1);
        assert_eq!(broken.calls(), 1);
    }

    #[test]
    fn dropped_listener_is_pruned() {
        let dispatcher = ChangeDispatcher::new();
        let survivor = Recorder::new(&[100]);
        let dropped = Recorder::new(&[100]);

        attach(&dispatcher, &survivor);
        attach(&dispatcher, &dropped);
        drop(dropped);

        let summary = dispatcher.notify(&changed(&[100]));

        assert_eq!(summary.notified, 1);
        assert_eq!(dispatcher.listener_count(), 1);
    }

    #[test]
    fn dropped_listener_is_pruned_on_register() {
        let dispatcher = ChangeDispatcher::new();
        let dropped = Recorder::new(&[100, 101]);
        let dropped_handle = attach(&dispatcher, &dropped);
        drop(dropped);

        let fresh = Recorder::new(&[300]);
        let fresh_handle = attach(&dispatcher, &fresh);

        assert_ne!(fresh_handle, dropped_handle);
        assert_eq!(dispatcher.listener_count(), 1);
        assert!(dispatcher.lock().by_address.get(&100).is_none());
    }

    #[test]
    fn notify_runs_alongside_registration_on_other_threads() {
        let dispatcher = ChangeDispatcher::new();
        let steady = Recorder::new(&[100]);
        attach(&dispatcher, &steady);

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for _ in 0..500 {
                    dispatcher.notify(&changed(&[100, 200]));
                }
            });

            scope.spawn(|| {
                for _ in 0..500 {
                    let transient = Recorder::new(&[100, 200]);
                    let handle = attach(&dispatcher, &transient);
                    dispatcher.unregister(100, handle);
                    dispatcher.detach(handle);
                }
            });
        });

        assert_eq!(steady.calls(), 500);
        assert_eq!(dispatcher.listener_count(), 1);
    }

    struct SelfRemoving {
        dispatcher: Arc<ChangeDispatcher>,
        handle: Mutex<Option<ListenerHandle>>,
        calls: AtomicUsize,
    }

    impl AddressListener for SelfRemoving {
        fn responds_to_address(&self, address: Address) -> bool {
            address == 7
        }

        fn refresh(&self) -> Result<(), EntityError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(handle) = self.handle.lock().unwrap().take() {
                self.dispatcher.detach(handle);
            }
            Ok(())
        }

        fn describe(&self) -> String {
            "self-removing".to_owned()
        }
    }

    #[test]
    fn listener_may_detach_itself_during_dispatch() {
        let dispatcher = Arc::new(ChangeDispatcher::new());
        let listener = Arc::new(SelfRemoving {
            dispatcher: dispatcher.clone(),
            handle: Mutex::new(None),
            calls: AtomicUsize::new(0),
        });
        let neighbour = Recorder::new(&[7]);

        let handle = dispatcher.register(7, &listener);
        *listener.handle.lock().unwrap() = Some(handle);
        attach(&dispatcher, &neighbour);

        assert_eq!(dispatcher.notify(&changed(&[7])).notified, 2);
        assert_eq!(dispatcher.notify(&changed(&[7])).notified, 1);
        assert_eq!(listener.calls.load(Ordering::SeqCst), 1);
        assert_eq!(neighbour.calls(), 2);
    }
}
