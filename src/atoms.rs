//! Interned protocol names
//!
//! All selection names, pseudo-types, property names, message kinds and action
//! identifiers the protocol uses are opaque atoms interned with the display
//! server once, when the context is created.

use crate::protocol::{Atom, DndAction};
use crate::transport::Transport;

/// The set of atoms the protocol machinery needs, interned up front.
#[derive(Clone, Copy, Debug)]
#[allow(missing_docs)]
pub struct KnownAtoms {
    // pseudo-types every non-transient offer answers
    pub type_list: Atom,
    pub timestamp: Atom,
    // property value types
    pub atom: Atom,
    pub window: Atom,
    pub integer: Atom,
    // incremental transfer marker type
    pub incremental: Atom,
    // the transient drag payload selection
    pub dnd_selection: Atom,
    // awareness marker and proxy redirection properties
    pub aware: Atom,
    pub proxy: Atom,
    // auxiliary properties on the source window
    pub dnd_type_list: Atom,
    pub action_list: Atom,
    pub action_descriptions: Atom,
    // staging property for conversion replies on our transfer window
    pub staging: Atom,
    // message kinds
    pub enter: Atom,
    pub position: Atom,
    pub status: Atom,
    pub leave: Atom,
    pub drop: Atom,
    pub finished: Atom,
    // action identifiers
    pub action_copy: Atom,
    pub action_move: Atom,
    pub action_link: Atom,
    pub action_ask: Atom,
    pub action_private: Atom,
}

impl KnownAtoms {
    /// Intern every known atom through `transport`.
    pub fn intern<T: Transport>(transport: &T) -> KnownAtoms {
        KnownAtoms {
            type_list: transport.intern_atom("TARGETS"),
            timestamp: transport.intern_atom("TIMESTAMP"),
            atom: transport.intern_atom("ATOM"),
            window: transport.intern_atom("WINDOW"),
            integer: transport.intern_atom("INTEGER"),
            incremental: transport.intern_atom("INCR"),
            dnd_selection: transport.intern_atom("DND_SELECTION"),
            aware: transport.intern_atom("DND_AWARE"),
            proxy: transport.intern_atom("DND_PROXY"),
            dnd_type_list: transport.intern_atom("DND_TYPE_LIST"),
            action_list: transport.intern_atom("DND_ACTION_LIST"),
            action_descriptions: transport.intern_atom("DND_ACTION_DESCRIPTIONS"),
            staging: transport.intern_atom("DND_STAGING"),
            enter: transport.intern_atom("DND_ENTER"),
            position: transport.intern_atom("DND_POSITION"),
            status: transport.intern_atom("DND_STATUS"),
            leave: transport.intern_atom("DND_LEAVE"),
            drop: transport.intern_atom("DND_DROP"),
            finished: transport.intern_atom("DND_FINISHED"),
            action_copy: transport.intern_atom("DND_ACTION_COPY"),
            action_move: transport.intern_atom("DND_ACTION_MOVE"),
            action_link: transport.intern_atom("DND_ACTION_LINK"),
            action_ask: transport.intern_atom("DND_ACTION_ASK"),
            action_private: transport.intern_atom("DND_ACTION_PRIVATE"),
        }
    }

    /// The atom identifying `action` on the wire; the null atom for
    /// [`DndAction::None`].
    pub fn action_atom(&self, action: DndAction) -> Atom {
        match action {
            DndAction::None => Atom::NONE,
            DndAction::Copy => self.action_copy,
            DndAction::Move => self.action_move,
            DndAction::Link => self.action_link,
            DndAction::Ask => self.action_ask,
            DndAction::Private => self.action_private,
        }
    }

    /// Decode an action atom; unknown atoms decode as [`DndAction::None`].
    pub fn action_from_atom(&self, atom: Atom) -> DndAction {
        if atom == self.action_copy {
            DndAction::Copy
        } else if atom == self.action_move {
            DndAction::Move
        } else if atom == self.action_link {
            DndAction::Link
        } else if atom == self.action_ask {
            DndAction::Ask
        } else if atom == self.action_private {
            DndAction::Private
        } else {
            DndAction::None
        }
    }
}
