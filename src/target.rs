//! Target side of a drag
//!
//! These handlers run from the dispatch loop when a foreign drag addresses
//! one of our advertised windows. Stray messages (wrong sender, no session,
//! unsupported version) are ignored; a well-behaved peer never produces
//! them, and a misbehaving one must not be able to disturb an unrelated
//! session.

use crate::actions;
use crate::context::DndContext;
use crate::protocol::{
    unpack_atom_list, Atom, DndAction, DndMessage, Point, Timestamp, WindowId,
    MIN_PROTOCOL_VERSION, PROTOCOL_VERSION,
};
use crate::session::{DragSession, Hooks, Role};
use crate::transport::Transport;

impl<T: Transport> DndContext<T> {
    /// A foreign drag entered `window`.
    pub(crate) fn handle_enter(
        &mut self,
        window: WindowId,
        source: WindowId,
        version: u8,
        more_types: bool,
        types: &[Atom],
    ) {
        if self.session.is_some() {
            crate::log_debug!("ignoring enter from {source} during an active session");
            return;
        }
        if version < MIN_PROTOCOL_VERSION {
            crate::log_debug!("ignoring enter from {source} at unsupported version {version}");
            return;
        }
        let types: Vec<Atom> = if more_types {
            match self.transport.read_property(source, self.atoms.dnd_type_list, false) {
                Ok(value) => unpack_atom_list(&value.bytes),
                Err(e) => {
                    crate::log_debug!("could not read the type list of {source}: {e}");
                    types.to_vec()
                }
            }
        } else {
            types.to_vec()
        };
        if types.is_empty() {
            crate::log_debug!("ignoring enter from {source} with no types");
            return;
        }
        self.transport.watch_window(source);
        self.session =
            Some(DragSession::target(source, window, version.min(PROTOCOL_VERSION), types));
    }

    /// The foreign drag moved over our window.
    pub(crate) fn handle_position(
        &mut self,
        hooks: &mut Hooks<'_>,
        source: WindowId,
        point: Point,
        time: Timestamp,
        action: DndAction,
    ) {
        let valid = self
            .session
            .as_ref()
            .map_or(false, |s| s.role == Role::Target && s.peer_window == source);
        if !valid {
            crate::log_debug!("ignoring position from unrelated window {source}");
            return;
        }
        let time = if time.is_current() { self.transport.timestamp() } else { time };

        let (local_window, prev_hovered, prev, prev_action) = {
            let Some(s) = self.session.as_ref() else { return };
            (s.local_window, s.hovered_target, s.local_acceptance, s.latest_action)
        };
        let root = self.transport.root_window();
        let local_point = self.transport.translate_point(root, local_window, point);
        let found = local_point.and_then(|p| hooks.targets.locate(local_window, p));

        let verdict = if found != prev_hovered {
            if let (Some(old), Some(_)) = (prev_hovered, prev.flatten()) {
                hooks.targets.leave(old);
            }
            let verdict = found.and_then(|target| {
                let types = self
                    .session
                    .as_ref()
                    .map(|s| s.offered_types.clone())
                    .unwrap_or_default();
                hooks.targets.will_accept(target, &types, action, time)
            });
            if let (Some(target), Some(_)) = (found, verdict) {
                hooks.targets.enter(target);
            }
            verdict
        } else if prev.is_none() || prev_action != action {
            let verdict = found.and_then(|target| {
                let types = self
                    .session
                    .as_ref()
                    .map(|s| s.offered_types.clone())
                    .unwrap_or_default();
                hooks.targets.will_accept(target, &types, action, time)
            });
            let was = prev.flatten().is_some();
            if let Some(target) = found {
                if verdict.is_some() && !was {
                    hooks.targets.enter(target);
                } else if verdict.is_none() && was {
                    hooks.targets.leave(target);
                }
            }
            verdict
        } else {
            prev.flatten()
        };

        if let (Some(target), Some(p), Some(_)) = (found, local_point, verdict) {
            hooks.targets.here(target, p);
        }

        if let Some(s) = self.session.as_mut() {
            s.hovered_target = found;
            s.local_acceptance = Some(verdict);
            s.latest_point = local_point.unwrap_or(point);
            s.latest_action = action;
            s.last_time = time;
        }

        let reply = DndMessage::Status {
            target: local_window,
            accepted: verdict.is_some(),
            suppress: None,
            action: verdict.unwrap_or(DndAction::None),
        };
        if let Err(e) = self.transport.send_dnd(source, &reply) {
            crate::log_warn!("failed to send status to {source}: {e}");
            self.note_destroyed(source);
        }
    }

    /// The foreign drag left our window without dropping.
    pub(crate) fn handle_leave(&mut self, hooks: &mut Hooks<'_>, source: WindowId) {
        let valid = self
            .session
            .as_ref()
            .map_or(false, |s| s.role == Role::Target && s.peer_window == source);
        if !valid {
            crate::log_debug!("ignoring leave from unrelated window {source}");
            return;
        }
        let Some(session) = self.session.take() else { return };
        if let (Some(target), Some(_)) = (session.hovered_target, session.local_accepted()) {
            hooks.targets.leave(target);
        }
        self.transport.unwatch_window(session.peer_window);
    }

    /// The foreign drag dropped its payload on our window.
    ///
    /// The finished acknowledgement goes out before the drop hook runs so the
    /// source is not held hostage by a slow handler; the payload offer stays
    /// resolvable at the drop timestamp for the retention window, so fetching
    /// the data from inside the hook still works.
    pub(crate) fn handle_drop(&mut self, hooks: &mut Hooks<'_>, source: WindowId, time: Timestamp) {
        let valid = self
            .session
            .as_ref()
            .map_or(false, |s| s.role == Role::Target && s.peer_window == source);
        if !valid {
            crate::log_debug!("ignoring drop from unrelated window {source}");
            return;
        }
        let time = if time.is_current() { self.transport.timestamp() } else { time };

        let Some(session) = self.session.take() else { return };
        let accepted = session.hovered_target.zip(session.local_accepted());

        let resolved = accepted.and_then(|(target, action)| {
            let action = if action == DndAction::Ask {
                actions::resolve_ask(
                    &self.transport,
                    &self.atoms,
                    session.peer_window,
                    hooks.dialog,
                    DndAction::Copy,
                )?
            } else {
                action
            };
            Some((target, action))
        });

        let reply = DndMessage::Finished {
            target: session.local_window,
            accepted: resolved.is_some(),
            action: resolved.map_or(DndAction::None, |(_, a)| a),
        };
        if let Err(e) = self.transport.send_dnd(source, &reply) {
            crate::log_warn!("failed to acknowledge drop to {source}: {e}");
        }

        match resolved {
            Some((target, action)) => {
                hooks.targets.dropped(
                    target,
                    session.latest_point,
                    &session.offered_types,
                    action,
                    time,
                );
            }
            None => {
                if let (Some(target), Some(_)) = (session.hovered_target, session.local_accepted())
                {
                    hooks.targets.leave(target);
                }
            }
        }
        self.transport.unwatch_window(session.peer_window);
    }
}
