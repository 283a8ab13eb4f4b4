//! Drag session state and widget-side capability interfaces
//!
//! At most one [`DragSession`] exists per context at a time, whichever role
//! this process plays in it. The widget toolkit plugs into the state machine
//! through the three capability traits bundled in [`Hooks`]; the state
//! machine calls out through them and never owns widget code.

use std::fmt;

use crate::protocol::{Atom, DndAction, Point, Rect, Timestamp, WindowId};

bitflags::bitflags! {
    /// Pointer buttons held during a drag, as reported by the toolkit.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Buttons: u32 {
        /// Primary button.
        const PRIMARY = 1;
        /// Middle button.
        const MIDDLE = 2;
        /// Secondary button.
        const SECONDARY = 4;
    }
}

bitflags::bitflags! {
    /// Keyboard modifiers held during a drag.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Modifiers: u32 {
        /// Shift.
        const SHIFT = 1;
        /// Control.
        const CONTROL = 2;
        /// Alt/Meta.
        const ALT = 4;
    }
}

/// Opaque identifier of an in-process drop target, allocated by the toolkit's
/// [`DropTargets`] implementation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TargetId(pub u64);

/// Which side of a drag this process currently plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// This process started the drag.
    Source,
    /// A foreign drag entered one of our windows.
    Target,
}

/// The in-process drop-target capability.
///
/// One implementation serves the whole toolkit; individual widgets and
/// containers are addressed by [`TargetId`]. Deactivated containers must not
/// be reported by [`locate`](DropTargets::locate), so a drag never addresses
/// messages to itself through a dead widget.
pub trait DropTargets {
    /// The active target containing `point` (window coordinates), if any.
    fn locate(&mut self, window: WindowId, point: Point) -> Option<TargetId>;

    /// Whether the target would accept a drop of one of `types` with the
    /// proposed action. May substitute its own preferred action.
    fn will_accept(
        &mut self,
        target: TargetId,
        types: &[Atom],
        action: DndAction,
        time: Timestamp,
    ) -> Option<DndAction>;

    /// An accepted drag entered the target.
    fn enter(&mut self, target: TargetId);

    /// The drag left the target without dropping.
    fn leave(&mut self, target: TargetId);

    /// The drag moved over the target (window coordinates).
    fn here(&mut self, target: TargetId, point: Point);

    /// The payload was dropped on the target.
    fn dropped(
        &mut self,
        target: TargetId,
        point: Point,
        types: &[Atom],
        action: DndAction,
        time: Timestamp,
    );
}

/// The dragger capability: action selection and cursor feedback for the
/// widget that started the drag.
pub trait DragSource {
    /// The action the dragger wants for the current pointer state.
    fn preferred_action(&mut self, hovered: bool, buttons: Buttons, modifiers: Modifiers)
        -> DndAction;

    /// Cursor feedback after an acceptance change from the target.
    fn feedback(&mut self, hovered: bool, accepted: bool, action: DndAction);

    /// The alternatives to publish when the action becomes
    /// [`DndAction::Ask`], with human-readable descriptions.
    fn ask_actions(&mut self) -> (Vec<DndAction>, Vec<String>);

    /// The drag is over; release resources tied to the payload. `target` is
    /// the window that took the drop, or `None`.
    fn finished(&mut self, target: Option<WindowId>);
}

/// The "choose an action" dialog collaborator.
pub trait AskDialog {
    /// Block and let the user pick one of `actions`; `None` if cancelled.
    fn choose(
        &mut self,
        actions: &[DndAction],
        descriptions: &[String],
        default: DndAction,
    ) -> Option<DndAction>;
}

/// Do-nothing capabilities, for processes that only play one role.
impl DropTargets for () {
    fn locate(&mut self, _: WindowId, _: Point) -> Option<TargetId> {
        None
    }
    fn will_accept(&mut self, _: TargetId, _: &[Atom], _: DndAction, _: Timestamp) -> Option<DndAction> {
        None
    }
    fn enter(&mut self, _: TargetId) {}
    fn leave(&mut self, _: TargetId) {}
    fn here(&mut self, _: TargetId, _: Point) {}
    fn dropped(&mut self, _: TargetId, _: Point, _: &[Atom], _: DndAction, _: Timestamp) {}
}

impl DragSource for () {
    fn preferred_action(&mut self, _: bool, _: Buttons, _: Modifiers) -> DndAction {
        DndAction::Copy
    }
    fn feedback(&mut self, _: bool, _: bool, _: DndAction) {}
    fn ask_actions(&mut self) -> (Vec<DndAction>, Vec<String>) {
        (Vec::new(), Vec::new())
    }
    fn finished(&mut self, _: Option<WindowId>) {}
}

impl AskDialog for () {
    fn choose(&mut self, _: &[DndAction], _: &[String], default: DndAction) -> Option<DndAction> {
        Some(default)
    }
}

/// An error preventing a drag from starting.
#[derive(Debug)]
pub enum BeginDragError {
    /// A drag session is already active in this context.
    SessionActive,
    /// The transient payload selection could not be claimed; another client
    /// won the ownership race.
    ClaimFailed,
    /// The transport failed.
    Transport(crate::transport::TransportError),
}

impl std::error::Error for BeginDragError {}

impl fmt::Display for BeginDragError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BeginDragError::SessionActive => f.write_str("a drag session is already active"),
            BeginDragError::ClaimFailed => f.write_str("could not claim the drag payload selection"),
            BeginDragError::Transport(e) => write!(f, "transport error: {e}"),
        }
    }
}

impl From<crate::transport::TransportError> for BeginDragError {
    fn from(e: crate::transport::TransportError) -> BeginDragError {
        BeginDragError::Transport(e)
    }
}

/// The capability bundle passed into every state-machine entry point.
pub struct Hooks<'a> {
    /// Drop-target capability of the toolkit.
    pub targets: &'a mut dyn DropTargets,
    /// Dragger capability of the widget that started (or may start) a drag.
    pub dragger: &'a mut dyn DragSource,
    /// Ask-dialog collaborator.
    pub dialog: &'a mut dyn AskDialog,
}

impl fmt::Debug for Hooks<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Hooks { .. }")
    }
}

/// The single active drag session.
///
/// Created by [`begin_drag`](crate::DndContext::begin_drag) (source role) or
/// on receipt of an enter message (target role); destroyed on drop
/// completion, explicit cancel or detected peer crash. Starting a new drag
/// while one is active is a contract violation and is rejected.
pub struct DragSession {
    /// Which role this process plays.
    pub(crate) role: Role,
    /// The partner window named in negotiation messages: our own top level
    /// when acting as source, the remote source's top level when acting as
    /// target.
    pub(crate) peer_window: WindowId,
    /// Types available from the dragger.
    pub(crate) offered_types: Vec<Atom>,
    /// Our own top-level window the foreign drag entered (target role).
    pub(crate) local_window: WindowId,
    /// The located window under the pointer (source role).
    pub(crate) target_window: Option<WindowId>,
    /// Where negotiation messages for `target_window` go (proxy-aware).
    pub(crate) message_window: WindowId,
    /// Negotiated protocol version with the current target.
    pub(crate) target_version: u8,
    /// Whether the current target is a foreign, protocol-aware window.
    pub(crate) foreign_aware: bool,
    /// Whether we sent an enter message to the current foreign target.
    pub(crate) foreign_entered: bool,
    /// Local widget currently under the pointer, or none (foreign window or
    /// no active local target).
    pub(crate) hovered_target: Option<TargetId>,
    /// Result of the last acceptance predicate call for the hovered local
    /// target; outer `None` means the predicate has not run yet.
    pub(crate) local_acceptance: Option<Option<DndAction>>,
    /// Latest acceptance state from the target (either path).
    pub(crate) accept: bool,
    /// A position message is outstanding, replies pending.
    pub(crate) wait_for_status: bool,
    /// A position update arrived while a reply was outstanding; resend when
    /// the status lands.
    pub(crate) pending_repeat: bool,
    /// At least one status reply arrived from the current target.
    pub(crate) received_any_status: bool,
    /// Target-advertised "don't re-notify while inside" rectangle.
    pub(crate) suppress_rect: Option<Rect>,
    /// Last point actually sent (or delivered locally).
    pub(crate) last_sent_point: Option<Point>,
    /// Last action actually sent (or delivered locally).
    pub(crate) last_sent_action: DndAction,
    /// Last action the target accepted.
    pub(crate) last_accepted_action: DndAction,
    /// Most recent pointer position seen by the session.
    pub(crate) latest_point: Point,
    /// Most recent proposed action seen by the session.
    pub(crate) latest_action: DndAction,
    /// Timestamp of the most recent position handled (target role).
    pub(crate) last_time: Timestamp,
    /// The peer window was destroyed; teardown at the next dispatch step.
    pub(crate) peer_dead: bool,
}

impl fmt::Debug for DragSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DragSession")
            .field("role", &self.role)
            .field("peer_window", &self.peer_window)
            .field("target_window", &self.target_window)
            .field("hovered_target", &self.hovered_target)
            .field("accept", &self.accept)
            .field("peer_dead", &self.peer_dead)
            .finish_non_exhaustive()
    }
}

impl DragSession {
    pub(crate) fn source(source_window: WindowId, types: Vec<Atom>) -> DragSession {
        DragSession {
            role: Role::Source,
            peer_window: source_window,
            offered_types: types,
            local_window: source_window,
            target_window: None,
            message_window: WindowId::NONE,
            target_version: 0,
            foreign_aware: false,
            foreign_entered: false,
            hovered_target: None,
            local_acceptance: None,
            accept: false,
            wait_for_status: false,
            pending_repeat: false,
            received_any_status: false,
            suppress_rect: None,
            last_sent_point: None,
            last_sent_action: DndAction::None,
            last_accepted_action: DndAction::None,
            latest_point: Point::default(),
            latest_action: DndAction::None,
            last_time: Timestamp::CURRENT,
            peer_dead: false,
        }
    }

    pub(crate) fn target(
        source_window: WindowId,
        local_window: WindowId,
        version: u8,
        types: Vec<Atom>,
    ) -> DragSession {
        DragSession {
            role: Role::Target,
            peer_window: source_window,
            offered_types: types,
            local_window,
            target_window: None,
            message_window: source_window,
            target_version: version,
            foreign_aware: false,
            foreign_entered: false,
            hovered_target: None,
            local_acceptance: None,
            accept: false,
            wait_for_status: false,
            pending_repeat: false,
            received_any_status: false,
            suppress_rect: None,
            last_sent_point: None,
            last_sent_action: DndAction::None,
            last_accepted_action: DndAction::None,
            latest_point: Point::default(),
            latest_action: DndAction::None,
            last_time: Timestamp::CURRENT,
            peer_dead: false,
        }
    }

    /// The action accepted by the hovered local target, if any.
    pub(crate) fn local_accepted(&self) -> Option<DndAction> {
        self.local_acceptance.flatten()
    }
}
