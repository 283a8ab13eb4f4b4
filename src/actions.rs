//! Action negotiation
//!
//! Maps drop actions to their protocol identifiers and mediates the "ask"
//! action: the source publishes the list of actions it is willing to perform
//! (with human-readable descriptions) as properties on its window, and the
//! target presents them through the dialog collaborator when the drop
//! resolves to "ask".

use crate::atoms::KnownAtoms;
use crate::protocol::{
    pack_atom_list, pack_string_list, unpack_atom_list, unpack_string_list, Atom, DndAction,
    WindowId,
};
use crate::session::{AskDialog, Modifiers};
use crate::transport::{Transport, TransportError, UnitSize};

/// The conventional modifier mapping toolkits use to force an action while
/// dragging. No modifier leaves the choice to the target ([`DndAction::Copy`]
/// proposal); both control and shift together ask for a link.
pub fn action_for_modifiers(modifiers: Modifiers) -> DndAction {
    let ctrl = modifiers.contains(Modifiers::CONTROL);
    let shift = modifiers.contains(Modifiers::SHIFT);
    match (ctrl, shift) {
        (true, true) => DndAction::Link,
        (true, false) => DndAction::Copy,
        (false, true) => DndAction::Move,
        (false, false) => DndAction::Copy,
    }
}

/// Publish the ask alternatives on the source window.
///
/// Called by the source when the negotiated action first becomes
/// [`DndAction::Ask`] during a drag.
pub fn publish_ask_actions<T: Transport>(
    transport: &T,
    atoms: &KnownAtoms,
    source: WindowId,
    actions: &[DndAction],
    descriptions: &[String],
) -> Result<(), TransportError> {
    let action_atoms: Vec<Atom> = actions.iter().map(|&a| atoms.action_atom(a)).collect();
    transport.write_property(
        source,
        atoms.action_list,
        atoms.atom,
        UnitSize::U32,
        &pack_atom_list(&action_atoms),
    )?;
    transport.write_property(
        source,
        atoms.action_descriptions,
        atoms.integer, // opaque string blob; readers only care about the bytes
        UnitSize::U8,
        &pack_string_list(descriptions),
    )
}

/// Read the ask alternatives published on a source window.
///
/// Missing or malformed properties yield an empty list; the caller falls back
/// to the default action.
pub fn read_ask_actions<T: Transport>(
    transport: &T,
    atoms: &KnownAtoms,
    source: WindowId,
) -> (Vec<DndAction>, Vec<String>) {
    let actions = transport
        .read_property(source, atoms.action_list, false)
        .map(|v| {
            unpack_atom_list(&v.bytes)
                .into_iter()
                .map(|a| atoms.action_from_atom(a))
                .filter(|a| a.is_some())
                .collect()
        })
        .unwrap_or_default();
    let descriptions = transport
        .read_property(source, atoms.action_descriptions, false)
        .map(|v| unpack_string_list(&v.bytes))
        .unwrap_or_default();
    (actions, descriptions)
}

/// Resolve an "ask" drop into a concrete action through the dialog
/// collaborator. `None` means the user cancelled and the drop must be
/// treated as rejected.
pub fn resolve_ask<T: Transport>(
    transport: &T,
    atoms: &KnownAtoms,
    source: WindowId,
    dialog: &mut dyn AskDialog,
    default: DndAction,
) -> Option<DndAction> {
    let (mut actions, descriptions) = read_ask_actions(transport, atoms, source);
    if actions.is_empty() {
        actions.push(default);
    }
    dialog.choose(&actions, &descriptions, default).filter(|a| a.is_some())
}
