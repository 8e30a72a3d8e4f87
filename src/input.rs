//! Input events and the listeners that react to them.

use instant::Instant;

use crate::viewport::Viewport;

#[derive(Clone, Debug, PartialEq)]
pub enum InputEvent {
    /// Pointer position normalized to `[0,1] x [0,1]` of the viewport.
    PointerMoved { x: f32, y: f32 },
    /// Scrub progress of a named page section in `[0,1]`.
    ScrollProgress { section: String, progress: f32 },
    Hover { element: String, entered: bool },
    Resized(Viewport),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Pointer,
    Scroll,
    Hover,
    Resize,
}

impl InputEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::PointerMoved { .. } => EventKind::Pointer,
            Self::ScrollProgress { .. } => EventKind::Scroll,
            Self::Hover { .. } => EventKind::Hover,
            Self::Resized(_) => EventKind::Resize,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

type Listener<C> = Box<dyn FnMut(&mut C, &InputEvent, Instant)>;

/// Routes input events to the listeners subscribed to their kind.
///
/// `C` is the context the listeners mutate, handed in on every dispatch so
/// that no listener holds on to it.
pub struct EventHub<C> {
    next_id: u64,
    listeners: Vec<(ListenerId, EventKind, Listener<C>)>,
}

impl<C> EventHub<C> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            listeners: Vec::new(),
        }
    }

    pub fn subscribe<F>(&mut self, kind: EventKind, listener: F) -> ListenerId
    where
        F: FnMut(&mut C, &InputEvent, Instant) + 'static,
    {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, kind, Box::new(listener)));
        id
    }

    /// Returns whether `id` was still registered.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener, ..)| *listener != id);
        before != self.listeners.len()
    }

    /// Call every listener of the event's kind in subscription order. Returns
    /// how many were called.
    pub fn dispatch(&mut self, context: &mut C, event: &InputEvent, now: Instant) -> usize {
        let kind = event.kind();
        let mut called = 0;
        for (_, _, listener) in self.listeners.iter_mut().filter(|(_, k, _)| *k == kind) {
            listener(context, event, now);
            called += 1;
        }
        if called == 0 {
            log::trace!("no listener for {kind:?}");
        }
        called
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl<C> Default for EventHub<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handles of a group of listeners installed together.
#[derive(Debug, Default)]
#[must_use = "listeners stay registered until the subscriptions are released"]
pub struct Subscriptions(Vec<ListenerId>);

impl Subscriptions {
    pub fn new(ids: Vec<ListenerId>) -> Self {
        Self(ids)
    }

    pub fn ids(&self) -> &[ListenerId] {
        &self.0
    }

    /// Unsubscribe every listener of the group. Returns how many were still
    /// registered.
    pub fn release<C>(self, hub: &mut EventHub<C>) -> usize {
        self.0.into_iter().filter(|id| hub.unsubscribe(*id)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_reach_only_their_kind() {
        let mut hub: EventHub<Vec<String>> = EventHub::new();
        hub.subscribe(EventKind::Pointer, |log, event, _| {
            log.push(format!("pointer {event:?}"))
        });
        hub.subscribe(EventKind::Hover, |log, _, _| log.push("hover".to_string()));

        let mut log = Vec::new();
        let now = Instant::now();
        assert_eq!(
            hub.dispatch(&mut log, &InputEvent::PointerMoved { x: 0.1, y: 0.2 }, now),
            1
        );
        assert_eq!(
            hub.dispatch(
                &mut log,
                &InputEvent::ScrollProgress {
                    section: "section2".into(),
                    progress: 0.5
                },
                now
            ),
            0
        );
        assert_eq!(log.len(), 1);
        assert!(log[0].starts_with("pointer"));
    }

    #[test]
    fn listeners_run_in_subscription_order() {
        let mut hub: EventHub<Vec<u8>> = EventHub::new();
        hub.subscribe(EventKind::Resize, |log, _, _| log.push(1));
        hub.subscribe(EventKind::Resize, |log, _, _| log.push(2));
        let mut log = Vec::new();
        hub.dispatch(
            &mut log,
            &InputEvent::Resized(Viewport::default()),
            Instant::now(),
        );
        assert_eq!(log, vec![1, 2]);
    }

    #[test]
    fn released_subscriptions_stop_listening() {
        let mut hub: EventHub<u32> = EventHub::new();
        let a = hub.subscribe(EventKind::Pointer, |count, _, _| *count += 1);
        let b = hub.subscribe(EventKind::Pointer, |count, _, _| *count += 10);
        let keep = hub.subscribe(EventKind::Pointer, |count, _, _| *count += 100);
        let group = Subscriptions::new(vec![a, b]);

        assert!(hub.unsubscribe(a));
        assert_eq!(group.release(&mut hub), 1);
        assert!(!hub.unsubscribe(b));

        let mut count = 0;
        hub.dispatch(
            &mut count,
            &InputEvent::PointerMoved { x: 0.5, y: 0.5 },
            Instant::now(),
        );
        assert_eq!(count, 100);
        assert!(hub.unsubscribe(keep));
        assert!(hub.is_empty());
    }
}
