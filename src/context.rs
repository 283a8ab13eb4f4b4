//! The protocol context: one per transport connection.
//!
//! [`DndContext`] owns the selection registry, the single drag session slot
//! and the event dispatch loop glue. All blocking the crate ever does goes
//! through [`DndContext::wait_for`], which keeps servicing inbound conversion
//! requests while waiting so that two peers waiting on each other's data
//! cannot deadlock.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::atoms::KnownAtoms;
use crate::locate;
use crate::protocol::{Atom, DndMessage, WindowId};
use crate::selection::{OfferSource, SelectionRegistry};
use crate::session::{DragSession, Hooks, Role};
use crate::transport::{Event, Transport, TransportError};

/// Upper bound on every blocking wait in the protocol (status replies,
/// finished notifications, conversion replies, incremental chunks).
///
/// A peer that stays silent longer than this is treated as unresponsive and
/// the operation fails or degrades instead of hanging the process.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Protocol state for one transport connection.
pub struct DndContext<T: Transport> {
    pub(crate) transport: T,
    pub(crate) atoms: KnownAtoms,
    pub(crate) registry: SelectionRegistry,
    pub(crate) session: Option<DragSession>,
    /// Negotiation messages received while blocked inside a wait; replayed by
    /// the next dispatch step in arrival order.
    pub(crate) pending: VecDeque<Event>,
}

impl<T: Transport> std::fmt::Debug for DndContext<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DndContext")
            .field("session", &self.session)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl<T: Transport> DndContext<T> {
    /// Wrap a transport connection, interning the protocol atoms.
    pub fn new(transport: T) -> DndContext<T> {
        let atoms = KnownAtoms::intern(&transport);
        DndContext {
            transport,
            atoms,
            registry: SelectionRegistry::new(),
            session: None,
            pending: VecDeque::new(),
        }
    }

    /// The interned protocol atoms.
    pub fn atoms(&self) -> &KnownAtoms {
        &self.atoms
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Whether a drag session is currently active.
    pub fn is_dragging(&self) -> bool {
        self.session.is_some()
    }

    /// Mark `window` as a drop-capable top level so foreign drags find it.
    pub fn advertise(&self, window: WindowId) -> Result<(), TransportError> {
        locate::advertise(&self.transport, &self.atoms, window)
    }

    /// Claim `selection` with a long-lived offer (clipboard-style).
    ///
    /// Returns `false` if another client won the ownership race.
    pub fn claim_selection(
        &mut self,
        selection: Atom,
        owner: WindowId,
        types: Vec<Atom>,
        source: Box<dyn OfferSource>,
    ) -> bool {
        let now = self.transport.timestamp();
        self.registry.claim(&self.transport, selection, owner, types, source, false, now)
    }

    /// Give up `selection` voluntarily. Ended offers stay resolvable for the
    /// retention window.
    pub fn release_selection(&mut self, selection: Atom) {
        let now = self.transport.timestamp();
        self.registry.release(&self.transport, selection, None, now);
    }

    /// Pull the next transport event and dispatch it. Returns `false` on
    /// timeout with nothing to do.
    pub fn poll(&mut self, hooks: &mut Hooks<'_>, timeout: Duration) -> bool {
        self.reap_session(hooks);
        if let Some(event) = self.pending.pop_front() {
            self.route(hooks, event);
            return true;
        }
        match self.transport.next_event(timeout) {
            Some(event) => {
                self.route(hooks, event);
                true
            }
            None => false,
        }
    }

    /// Dispatch one transport event the toolkit's own loop already read.
    pub fn dispatch_event(&mut self, hooks: &mut Hooks<'_>, event: Event) {
        self.reap_session(hooks);
        while let Some(queued) = self.pending.pop_front() {
            self.route(hooks, queued);
        }
        self.route(hooks, event);
    }

    fn route(&mut self, hooks: &mut Hooks<'_>, event: Event) {
        match event {
            Event::Dnd { window, msg } => self.handle_dnd(hooks, window, msg),
            Event::Conversion(request) => self.handle_conversion_request(&request),
            Event::SelectionCleared { selection, time } => {
                let time = if time.is_current() { self.transport.timestamp() } else { time };
                self.registry.handle_clear(selection, time);
            }
            Event::WindowDestroyed(window) => {
                self.note_destroyed(window);
                self.reap_session(hooks);
            }
            Event::PropertyNotify { window, property, .. } => {
                // meaningful only inside a transfer wait; stray here
                crate::log_debug!("stray property notification for {property} on {window}");
            }
            Event::ConversionReply { selection, .. } => {
                crate::log_debug!("stray conversion reply for {selection}");
            }
        }
    }

    fn handle_dnd(&mut self, hooks: &mut Hooks<'_>, window: WindowId, msg: DndMessage) {
        match msg {
            DndMessage::Enter { source, version, more_types, types } => {
                self.handle_enter(window, source, version, more_types, &types)
            }
            DndMessage::Position { source, point, time, action } => {
                self.handle_position(hooks, source, point, time, action)
            }
            DndMessage::Leave { source } => self.handle_leave(hooks, source),
            DndMessage::Drop { source, time } => self.handle_drop(hooks, source, time),
            DndMessage::Status { target, accepted, suppress, action } => {
                self.handle_status(hooks, target, accepted, suppress, action)
            }
            DndMessage::Finished { target, .. } => {
                // consumed inside the drop wait; anything surfacing here is
                // stale
                crate::log_debug!("stray finished message from {target}");
            }
        }
    }

    /// Block for at most `timeout` until an event satisfying `interest`
    /// arrives.
    ///
    /// Events that do not satisfy `interest` are serviced inline where they
    /// must not wait (conversion requests, selection clears, destruction
    /// notices) and queued for later dispatch where they may (negotiation
    /// messages). `None` means the deadline passed.
    pub(crate) fn wait_for(
        &mut self,
        timeout: Duration,
        mut interest: impl FnMut(&Event) -> bool,
    ) -> Option<Event> {
        let deadline = Instant::now() + timeout;
        loop {
            // a nested wait may already have queued the event this one is
            // after
            if let Some(i) = self.pending.iter().position(|e| interest(e)) {
                return self.pending.remove(i);
            }
            let remaining = deadline.checked_duration_since(Instant::now())?;
            let event = match self.transport.next_event(remaining) {
                Some(event) => event,
                None => continue,
            };
            if interest(&event) {
                return Some(event);
            }
            match event {
                Event::Conversion(request) => self.handle_conversion_request(&request),
                Event::SelectionCleared { selection, time } => {
                    let time = if time.is_current() { self.transport.timestamp() } else { time };
                    self.registry.handle_clear(selection, time);
                }
                Event::WindowDestroyed(window) => self.note_destroyed(window),
                Event::Dnd { .. } => self.pending.push_back(event),
                Event::PropertyNotify { .. } | Event::ConversionReply { .. } => {
                    crate::log_debug!("dropping stale transfer event while waiting");
                }
            }
        }
    }

    /// Flag the session for teardown if `window` was its peer. Hooks are not
    /// available on every path that learns about a destruction, so the actual
    /// teardown runs at the next dispatch step.
    pub(crate) fn note_destroyed(&mut self, window: WindowId) {
        if let Some(session) = &mut self.session {
            if window == session.peer_window || Some(window) == session.target_window {
                crate::log_debug!("drag peer {window} destroyed");
                session.peer_dead = true;
            }
        }
    }

    /// Tear down a session whose peer crashed, as if a leave had arrived.
    pub(crate) fn reap_session(&mut self, hooks: &mut Hooks<'_>) {
        let role = match self.session.as_ref() {
            Some(s) if s.peer_dead => s.role,
            _ => return,
        };
        match role {
            Role::Source => {
                let hovered = self.session.as_ref().and_then(|s| {
                    s.local_accepted().and(s.hovered_target)
                });
                if let Some(target) = hovered {
                    hooks.targets.leave(target);
                }
                self.teardown_source(hooks, None);
            }
            Role::Target => {
                if let Some(session) = self.session.take() {
                    if let (Some(target), Some(_)) =
                        (session.hovered_target, session.local_accepted())
                    {
                        hooks.targets.leave(target);
                    }
                    self.transport.unwatch_window(session.peer_window);
                }
            }
        }
    }
}

impl<T: Transport> Drop for DndContext<T> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            if session.role == Role::Target {
                self.transport.unwatch_window(session.peer_window);
            }
        }
        let now = self.transport.timestamp();
        self.registry.release_all(&self.transport, now);
    }
}
