//! Target locator
//!
//! Given a screen point, walks the window hierarchy from the root toward the
//! leaf under the point, across process boundaries, looking for the first
//! window that advertises awareness of the drag-and-drop protocol. Awareness
//! may be redirected through a proxy window, which is only trusted if it
//! points back at itself.

use crate::atoms::KnownAtoms;
use crate::protocol::{
    unpack_atom_list, Point, WindowId, MIN_PROTOCOL_VERSION, PROTOCOL_VERSION,
};
use crate::session::{DropTargets, TargetId};
use crate::transport::Transport;

/// What the locator found under a screen point.
#[derive(Clone, Copy, Debug)]
pub struct LocateResult {
    /// The window under the point (the first aware one, or the unaware leaf).
    pub window: WindowId,
    /// The window negotiation messages should be addressed to. Differs from
    /// `window` only when a trusted proxy redirects them.
    pub message_window: WindowId,
    /// The in-process widget/container under the point, when `window`
    /// belongs to this process and an active target contains the point.
    pub local_target: Option<TargetId>,
    /// Whether `window` advertises the protocol at a usable version.
    pub aware: bool,
    /// Negotiated protocol version (min of both sides); zero when not aware.
    pub version: u8,
}

/// Find the topmost window under `point` and its protocol capabilities.
pub fn locate<T: Transport>(
    transport: &T,
    atoms: &KnownAtoms,
    targets: &mut dyn DropTargets,
    point: Point,
) -> LocateResult {
    let root = transport.root_window();
    let mut window = root;
    loop {
        if let Some((message_window, version)) = awareness(transport, atoms, window) {
            let local_target = if transport.is_local_window(window) {
                transport
                    .translate_point(root, window, point)
                    .and_then(|p| targets.locate(window, p))
            } else {
                None
            };
            return LocateResult { window, message_window, local_target, aware: true, version };
        }
        let in_window = match transport.translate_point(root, window, point) {
            Some(p) => p,
            None => break,
        };
        match transport.child_at(window, in_window) {
            Some(child) => window = child,
            None => break,
        }
    }
    LocateResult {
        window,
        message_window: window,
        local_target: None,
        aware: false,
        version: 0,
    }
}

/// Check whether `window` advertises the protocol, resolving a proxy
/// redirection first. Returns the window messages should go to and the
/// negotiated version.
fn awareness<T: Transport>(
    transport: &T,
    atoms: &KnownAtoms,
    window: WindowId,
) -> Option<(WindowId, u8)> {
    let advertiser = match proxy_of(transport, atoms, window) {
        // a proxy is only trusted if its own proxy property points back at
        // itself, otherwise it could be a stale id reused by an unrelated
        // window
        Some(proxy) if proxy_of(transport, atoms, proxy) == Some(proxy) => proxy,
        _ => window,
    };
    let value = transport.read_property(advertiser, atoms.aware, false).ok()?;
    let version = *unpack_atom_list(&value.bytes).first()?;
    let version = u8::try_from(version.0.min(255)).ok()?;
    if version < MIN_PROTOCOL_VERSION {
        return None;
    }
    Some((advertiser, version.min(PROTOCOL_VERSION)))
}

fn proxy_of<T: Transport>(
    transport: &T,
    atoms: &KnownAtoms,
    window: WindowId,
) -> Option<WindowId> {
    let value = transport.read_property(window, atoms.proxy, false).ok()?;
    if value.type_ != atoms.window {
        return None;
    }
    unpack_atom_list(&value.bytes).first().map(|a| WindowId(a.0))
}

/// Publish the awareness marker on `window` so foreign drags can find it.
pub fn advertise<T: Transport>(
    transport: &T,
    atoms: &KnownAtoms,
    window: WindowId,
) -> Result<(), crate::transport::TransportError> {
    transport.write_property(
        window,
        atoms.aware,
        atoms.atom,
        crate::transport::UnitSize::U32,
        &u32::from(PROTOCOL_VERSION).to_ne_bytes(),
    )
}
