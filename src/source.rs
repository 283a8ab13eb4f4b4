//! Source side of a drag
//!
//! The toolkit drives these entry points from its pointer grab: one call to
//! start the drag, one per motion, one to drop or cancel. Everything else
//! (status replies, the finished acknowledgement, payload conversion
//! requests from the target) arrives through the transport and is either
//! handled by the dispatch loop or consumed by the bounded waits here.

use crate::actions;
use crate::context::{DndContext, WAIT_TIMEOUT};
use crate::locate::{locate, LocateResult};
use crate::protocol::{
    pack_atom_list, Atom, DndAction, DndMessage, Point, Rect, WindowId, INLINE_TYPES,
};
use crate::selection::OfferSource;
use crate::session::{BeginDragError, Buttons, DragSession, Hooks, Modifiers, Role};
use crate::transport::{Event, Transport, TransportError, UnitSize};

/// Hysteresis margin, in pixels, around an accepting local target window.
/// The drag stays attached to it while the pointer skims its border.
pub(crate) const STAY_MARGIN: u16 = 8;

impl<T: Transport> DndContext<T> {
    /// Start dragging.
    ///
    /// Claims the transient payload selection, publishes the full type list
    /// when it does not fit inline in enter messages, and performs the first
    /// position update. The caller keeps feeding motion through
    /// [`update_drag`](DndContext::update_drag) and ends the drag with
    /// [`finish_drag`](DndContext::finish_drag) or
    /// [`cancel_drag`](DndContext::cancel_drag).
    #[allow(clippy::too_many_arguments)]
    pub fn begin_drag(
        &mut self,
        hooks: &mut Hooks<'_>,
        source_window: WindowId,
        types: Vec<Atom>,
        payload: Box<dyn OfferSource>,
        point: Point,
        buttons: Buttons,
        modifiers: Modifiers,
    ) -> Result<(), BeginDragError> {
        if self.session.is_some() {
            return Err(BeginDragError::SessionActive);
        }
        let now = self.transport.timestamp();
        let claimed = self.registry.claim(
            &self.transport,
            self.atoms.dnd_selection,
            source_window,
            types.clone(),
            payload,
            true,
            now,
        );
        if !claimed {
            return Err(BeginDragError::ClaimFailed);
        }
        if types.len() > INLINE_TYPES {
            if let Err(e) = self.transport.write_property(
                source_window,
                self.atoms.dnd_type_list,
                self.atoms.atom,
                UnitSize::U32,
                &pack_atom_list(&types),
            ) {
                // no session exists yet to tear the claim down later
                let now = self.transport.timestamp();
                self.registry.release(&self.transport, self.atoms.dnd_selection, None, now);
                return Err(e.into());
            }
        }
        self.session = Some(DragSession::source(source_window, types));
        self.update_drag(hooks, point, buttons, modifiers)?;
        Ok(())
    }

    /// Feed one pointer motion into the active drag.
    ///
    /// Relocates the target under the pointer, sends enter/leave/position
    /// messages as needed and keeps the dragger's cursor feedback current.
    /// A call without an active source session is ignored.
    pub fn update_drag(
        &mut self,
        hooks: &mut Hooks<'_>,
        point: Point,
        buttons: Buttons,
        modifiers: Modifiers,
    ) -> Result<(), TransportError> {
        match self.session.as_ref() {
            Some(s) if s.role == Role::Source => {}
            _ => {
                crate::log_debug!("drag update without an active drag");
                return Ok(());
            }
        }

        if !self.keeps_target(point) {
            let found = locate(&self.transport, &self.atoms, hooks.targets, point);
            self.switch_target(hooks, found)?;
        }

        let hovering = self.session.as_ref().map_or(false, |s| s.accept);
        let action = hooks.dragger.preferred_action(hovering, buttons, modifiers);

        let ask_edge = action == DndAction::Ask
            && self.session.as_ref().map_or(false, |s| s.last_sent_action != DndAction::Ask);
        if ask_edge {
            let (choices, descriptions) = hooks.dragger.ask_actions();
            if let Some(own) = self.session.as_ref().map(|s| s.peer_window) {
                actions::publish_ask_actions(
                    &self.transport,
                    &self.atoms,
                    own,
                    &choices,
                    &descriptions,
                )?;
            }
        }

        if let Some(s) = self.session.as_mut() {
            s.latest_point = point;
            s.latest_action = action;
        }
        self.send_here(hooks, point, action)
    }

    /// Whether the current target keeps the pointer despite the motion.
    ///
    /// Only local accepting targets get the hysteresis margin; foreign
    /// windows may be overlapped by others, so they are re-located on every
    /// motion.
    fn keeps_target(&self, point: Point) -> bool {
        let Some(s) = self.session.as_ref() else { return false };
        let Some(target) = s.target_window else { return false };
        if s.local_accepted().is_none() || !self.transport.is_local_window(target) {
            return false;
        }
        match self.transport.window_geometry(target) {
            Some(geometry) => geometry.inflate(STAY_MARGIN).contains(point),
            None => false,
        }
    }

    fn switch_target(
        &mut self,
        hooks: &mut Hooks<'_>,
        found: LocateResult,
    ) -> Result<(), TransportError> {
        let same =
            self.session.as_ref().map_or(false, |s| s.target_window == Some(found.window));
        if same {
            // same window; only the widget under the pointer may have moved
            if let Some(s) = self.session.as_mut() {
                if s.hovered_target != found.local_target {
                    if let (Some(old), Some(_)) = (s.hovered_target, s.local_accepted()) {
                        hooks.targets.leave(old);
                    }
                    s.hovered_target = found.local_target;
                    s.local_acceptance = None;
                    s.last_sent_point = None;
                }
            }
            return Ok(());
        }

        self.leave_target(hooks)?;

        let foreign = !self.transport.is_local_window(found.window);
        let Some(s) = self.session.as_mut() else { return Ok(()) };
        s.target_window = Some(found.window);
        s.message_window = found.message_window;
        s.target_version = found.version;
        s.foreign_aware = found.aware && foreign;
        s.foreign_entered = false;
        s.hovered_target = found.local_target;
        s.local_acceptance = None;
        s.accept = false;
        s.wait_for_status = false;
        s.pending_repeat = false;
        s.received_any_status = false;
        s.suppress_rect = None;
        s.last_sent_point = None;
        s.last_sent_action = DndAction::None;
        s.last_accepted_action = DndAction::None;

        if s.foreign_aware {
            let msg = DndMessage::Enter {
                source: s.peer_window,
                version: s.target_version,
                more_types: s.offered_types.len() > INLINE_TYPES,
                types: s.offered_types.iter().copied().take(INLINE_TYPES).collect(),
            };
            let to = s.message_window;
            self.transport.watch_window(found.window);
            self.transport.send_dnd(to, &msg)?;
            if let Some(s) = self.session.as_mut() {
                s.foreign_entered = true;
            }
        }
        Ok(())
    }

    /// Detach from the current target, telling it (and the local hooks) that
    /// the drag left.
    fn leave_target(&mut self, hooks: &mut Hooks<'_>) -> Result<(), TransportError> {
        let Some(s) = self.session.as_mut() else { return Ok(()) };
        if let (Some(old), Some(_)) = (s.hovered_target, s.local_accepted()) {
            hooks.targets.leave(old);
        }
        s.hovered_target = None;
        s.local_acceptance = None;
        let entered = std::mem::take(&mut s.foreign_entered);
        let to = s.message_window;
        let source = s.peer_window;
        let had_target = s.target_window.take();
        let was_accepting = std::mem::take(&mut s.accept);
        if entered {
            self.transport.send_dnd(to, &DndMessage::Leave { source })?;
        }
        if let Some(w) = had_target {
            if !self.transport.is_local_window(w) {
                self.transport.unwatch_window(w);
            }
        }
        if was_accepting {
            hooks.dragger.feedback(false, false, DndAction::None);
        }
        Ok(())
    }

    /// Deliver the current point/action to the target, over the wire or
    /// through the local hooks.
    fn send_here(
        &mut self,
        hooks: &mut Hooks<'_>,
        point: Point,
        action: DndAction,
    ) -> Result<(), TransportError> {
        let local = {
            let Some(s) = self.session.as_ref() else { return Ok(()) };
            s.target_window.map_or(false, |w| self.transport.is_local_window(w))
        };
        if local {
            return self.local_here(hooks, point, action);
        }

        let Some(s) = self.session.as_mut() else { return Ok(()) };
        if !s.foreign_entered {
            // unaware window; there is nobody to tell
            return Ok(());
        }
        if s.wait_for_status {
            s.pending_repeat = true;
            s.latest_point = point;
            s.latest_action = action;
            return Ok(());
        }
        if s.last_sent_point == Some(point) && s.last_sent_action == action {
            return Ok(());
        }
        if s.received_any_status && action == s.last_sent_action {
            if let Some(rect) = s.suppress_rect {
                if rect.contains(point) {
                    s.last_sent_point = Some(point);
                    return Ok(());
                }
            }
        }
        let to = s.message_window;
        let source = s.peer_window;
        s.wait_for_status = true;
        s.last_sent_point = Some(point);
        s.last_sent_action = action;
        let time = self.transport.timestamp();
        self.transport.send_dnd(to, &DndMessage::Position { source, point, time, action })
    }

    /// Same-process delivery: the located target belongs to us, so the
    /// position round-trip collapses into direct hook calls.
    fn local_here(
        &mut self,
        hooks: &mut Hooks<'_>,
        point: Point,
        action: DndAction,
    ) -> Result<(), TransportError> {
        let (window, hovered, prev, prev_action) = {
            let Some(s) = self.session.as_ref() else { return Ok(()) };
            (s.target_window, s.hovered_target, s.local_acceptance, s.last_sent_action)
        };
        let Some(window) = window else { return Ok(()) };
        let root = self.transport.root_window();
        let local_point = match self.transport.translate_point(root, window, point) {
            Some(p) => p,
            None => return Ok(()),
        };

        let Some(target) = hovered else {
            if let Some(s) = self.session.as_mut() {
                if std::mem::take(&mut s.accept) {
                    hooks.dragger.feedback(false, false, DndAction::None);
                }
                s.last_accepted_action = DndAction::None;
                s.last_sent_point = Some(point);
                s.last_sent_action = action;
            }
            return Ok(());
        };

        let need_check = prev.is_none() || prev_action != action;
        let accepted = if need_check {
            let types =
                self.session.as_ref().map(|s| s.offered_types.clone()).unwrap_or_default();
            let time = self.transport.timestamp();
            let verdict = hooks.targets.will_accept(target, &types, action, time);
            let was = prev.flatten().is_some();
            if verdict.is_some() && !was {
                hooks.targets.enter(target);
            } else if verdict.is_none() && was {
                hooks.targets.leave(target);
            }
            if let Some(s) = self.session.as_mut() {
                s.local_acceptance = Some(verdict);
            }
            verdict
        } else {
            prev.flatten()
        };

        if accepted.is_some() {
            hooks.targets.here(target, local_point);
        }

        let accept_now = accepted.is_some();
        let action_now = accepted.unwrap_or(DndAction::None);
        if let Some(s) = self.session.as_mut() {
            if s.accept != accept_now || s.last_accepted_action != action_now {
                hooks.dragger.feedback(true, accept_now, action_now);
            }
            s.accept = accept_now;
            s.last_accepted_action = action_now;
            s.last_sent_point = Some(point);
            s.last_sent_action = action;
        }
        Ok(())
    }

    /// Status reply from the target of an outgoing drag.
    pub(crate) fn handle_status(
        &mut self,
        hooks: &mut Hooks<'_>,
        target: WindowId,
        accepted: bool,
        suppress: Option<Rect>,
        action: DndAction,
    ) {
        let valid = self.session.as_ref().map_or(false, |s| {
            s.role == Role::Source
                && (Some(target) == s.target_window || target == s.message_window)
        });
        if !valid {
            crate::log_debug!("ignoring status from unrelated window {target}");
            return;
        }
        let action = if accepted { action } else { DndAction::None };
        let (changed, repeat, point, latest_action);
        {
            let Some(s) = self.session.as_mut() else { return };
            s.wait_for_status = false;
            s.received_any_status = true;
            s.suppress_rect = suppress;
            changed = s.accept != accepted || s.last_accepted_action != action;
            s.accept = accepted;
            s.last_accepted_action = action;
            repeat = std::mem::take(&mut s.pending_repeat);
            point = s.latest_point;
            latest_action = s.latest_action;
        }
        if changed {
            hooks.dragger.feedback(true, accepted, action);
        }
        if repeat {
            if let Err(e) = self.send_here(hooks, point, latest_action) {
                crate::log_warn!("failed to resend position: {e}");
            }
        }
    }

    /// Drop the payload at `point`, ending the drag.
    ///
    /// Waits (bounded) for the outstanding status reply, then either delivers
    /// the drop and waits for the target's finished acknowledgement, or tells
    /// the rejecting target that the drag left. Payload conversion requests
    /// from the target are serviced inline during the waits. Returns whether
    /// the drop was taken.
    pub fn finish_drag(
        &mut self,
        hooks: &mut Hooks<'_>,
        point: Point,
        buttons: Buttons,
        modifiers: Modifiers,
    ) -> Result<bool, TransportError> {
        match self.session.as_ref() {
            Some(s) if s.role == Role::Source => {}
            _ => {
                crate::log_debug!("drop without an active drag");
                return Ok(false);
            }
        }
        self.update_drag(hooks, point, buttons, modifiers)?;

        while self.session.as_ref().map_or(false, |s| s.wait_for_status && !s.peer_dead) {
            let Some((target_window, message_window)) =
                self.session.as_ref().map(|s| (s.target_window, s.message_window))
            else {
                break;
            };
            let got = self.wait_for(WAIT_TIMEOUT, |event| {
                matches!(event, Event::Dnd { msg: DndMessage::Status { target, .. }, .. }
                    if Some(*target) == target_window || *target == message_window)
            });
            match got {
                Some(Event::Dnd {
                    msg: DndMessage::Status { target, accepted, suppress, action },
                    ..
                }) => self.handle_status(hooks, target, accepted, suppress, action),
                Some(_) => {}
                None => {
                    crate::log_warn!("target never answered the last position");
                    if let Some(s) = self.session.as_mut() {
                        s.wait_for_status = false;
                        s.accept = false;
                    }
                }
            }
        }

        if self.session.as_ref().map_or(true, |s| s.peer_dead) {
            self.reap_session(hooks);
            return Ok(false);
        }

        // same-process fast path
        let local_drop = self.session.as_ref().and_then(|s| {
            let window = s.target_window?;
            if !self.transport.is_local_window(window) {
                return None;
            }
            Some((window, s.hovered_target?, s.local_accepted()?))
        });
        if let Some((window, target, action)) = local_drop {
            let own = self
                .session
                .as_ref()
                .map_or(WindowId::NONE, |s| s.peer_window);
            let action = if action == DndAction::Ask {
                actions::resolve_ask(&self.transport, &self.atoms, own, hooks.dialog, DndAction::Copy)
            } else {
                Some(action)
            };
            let took = match action {
                Some(action) => {
                    let root = self.transport.root_window();
                    let local_point =
                        self.transport.translate_point(root, window, point).unwrap_or(point);
                    let types = self
                        .session
                        .as_ref()
                        .map(|s| s.offered_types.clone())
                        .unwrap_or_default();
                    let time = self.transport.timestamp();
                    hooks.targets.dropped(target, local_point, &types, action, time);
                    true
                }
                None => {
                    hooks.targets.leave(target);
                    false
                }
            };
            self.teardown_source(hooks, took.then_some(window));
            return Ok(took);
        }

        let Some((accept, entered, to, source, target_window)) = self.session.as_ref().map(|s| {
            (s.accept, s.foreign_entered, s.message_window, s.peer_window, s.target_window)
        }) else {
            return Ok(false);
        };

        if !(accept && entered) {
            if entered {
                self.transport.send_dnd(to, &DndMessage::Leave { source })?;
            }
            self.teardown_source(hooks, None);
            return Ok(false);
        }

        let time = self.transport.timestamp();
        self.transport.send_dnd(to, &DndMessage::Drop { source, time })?;

        // the target fetches the payload during this wait; answering its
        // conversion requests is what most of the time here goes to
        let got = self.wait_for(WAIT_TIMEOUT, |event| {
            matches!(event, Event::Dnd { msg: DndMessage::Finished { target, .. }, .. }
                if Some(*target) == target_window || *target == to)
        });
        let took = match got {
            Some(Event::Dnd { msg: DndMessage::Finished { accepted, .. }, .. }) => accepted,
            Some(_) => true,
            None => {
                // an old-version or sluggish target; assume it took the drop
                // it accepted
                crate::log_warn!("target never acknowledged the drop");
                true
            }
        };
        self.teardown_source(hooks, took.then(|| target_window.unwrap_or(to)));
        Ok(took)
    }

    /// Abort the drag without dropping.
    pub fn cancel_drag(&mut self, hooks: &mut Hooks<'_>) {
        let info = match self.session.as_ref() {
            Some(s) if s.role == Role::Source => (
                s.foreign_entered,
                s.message_window,
                s.peer_window,
                s.hovered_target,
                s.local_accepted().is_some(),
            ),
            _ => return,
        };
        let (entered, to, source, hovered, was_accepted) = info;
        if entered {
            if let Err(e) = self.transport.send_dnd(to, &DndMessage::Leave { source }) {
                crate::log_debug!("failed to send leave while cancelling: {e}");
            }
        }
        if was_accepted {
            if let Some(target) = hovered {
                hooks.targets.leave(target);
            }
        }
        self.teardown_source(hooks, None);
    }

    /// Drop the session, release the payload selection and clean the
    /// auxiliary properties off the source window. `target` names the window
    /// that took the drop, if any.
    pub(crate) fn teardown_source(&mut self, hooks: &mut Hooks<'_>, target: Option<WindowId>) {
        let Some(session) = self.session.take() else { return };
        if let Some(w) = session.target_window {
            if !self.transport.is_local_window(w) {
                self.transport.unwatch_window(w);
            }
        }
        let own = session.peer_window;
        let _ = self.transport.delete_property(own, self.atoms.dnd_type_list);
        let _ = self.transport.delete_property(own, self.atoms.action_list);
        let _ = self.transport.delete_property(own, self.atoms.action_descriptions);
        // the released offer stays resolvable for the retention window, so a
        // target that is still fetching at the drop timestamp is not cut off
        let now = self.transport.timestamp();
        self.registry.release(&self.transport, self.atoms.dnd_selection, None, now);
        hooks.dragger.finished(target);
    }
}
