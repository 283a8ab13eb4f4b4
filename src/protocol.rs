//! Wire-level vocabulary of the drag-and-drop protocol
//!
//! This module defines the opaque identifiers shared with the transport, the
//! geometry types, the typed negotiation messages and the small packing
//! utilities used to encode them (and auxiliary property payloads) as flat
//! 32-bit words and byte blobs.

use smallvec::SmallVec;

use crate::atoms::KnownAtoms;

/// Highest protocol version this implementation speaks.
pub const PROTOCOL_VERSION: u8 = 5;

/// Lowest advertised version we are willing to negotiate with.
///
/// Windows advertising an older version are treated as not aware of the
/// protocol at all.
pub const MIN_PROTOCOL_VERSION: u8 = 2;

/// Number of type identifiers an enter message can carry inline.
///
/// Offers with more types publish the full list as a property on the source
/// window and set the more-types flag instead.
pub const INLINE_TYPES: usize = 3;

/// An opaque, namespace-scoped identifier interned with the display server.
///
/// Atoms name selections, convertible data types, properties and message
/// kinds. `Atom::NONE` (the zero atom) never names anything.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Atom(pub u32);

impl Atom {
    /// The null atom.
    pub const NONE: Atom = Atom(0);

    /// Whether this is the null atom.
    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for Atom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "atom#{}", self.0)
    }
}

/// Handle identifying a window in the shared display server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WindowId(pub u32);

impl WindowId {
    /// The null window.
    pub const NONE: WindowId = WindowId(0);

    /// Whether this is the null window.
    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for WindowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "window#0x{:x}", self.0)
    }
}

/// A server timestamp.
///
/// The zero value is [`Timestamp::CURRENT`], meaning "right now". Lookups with
/// `CURRENT` match only a still-active offer, while lookups with an explicit
/// timestamp match the offer that was valid at that instant, so replayed or
/// delayed protocol messages resolve against the data they were generated for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Timestamp(pub u32);

impl Timestamp {
    /// The special "right now" timestamp.
    pub const CURRENT: Timestamp = Timestamp(0);

    /// Whether this is the special "right now" timestamp.
    pub fn is_current(self) -> bool {
        self.0 == 0
    }
}

/// A point, in signed 16-bit screen coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Point {
    /// Horizontal coordinate.
    pub x: i16,
    /// Vertical coordinate.
    pub y: i16,
}

impl Point {
    /// Shorthand constructor.
    pub fn new(x: i16, y: i16) -> Point {
        Point { x, y }
    }
}

/// A rectangle, position in signed and size in unsigned 16-bit units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rect {
    /// Left edge.
    pub x: i16,
    /// Top edge.
    pub y: i16,
    /// Width in pixels.
    pub width: u16,
    /// Height in pixels.
    pub height: u16,
}

impl Rect {
    /// Shorthand constructor.
    pub fn new(x: i16, y: i16, width: u16, height: u16) -> Rect {
        Rect { x, y, width, height }
    }

    /// Whether `point` falls inside this rectangle.
    pub fn contains(&self, point: Point) -> bool {
        let (x, y) = (i32::from(point.x), i32::from(point.y));
        x >= i32::from(self.x)
            && y >= i32::from(self.y)
            && x < i32::from(self.x) + i32::from(self.width)
            && y < i32::from(self.y) + i32::from(self.height)
    }

    /// This rectangle grown by `margin` pixels on every side.
    ///
    /// Used for the hysteresis bound that keeps a drag attached to the source
    /// window while the pointer skims its border.
    pub fn inflate(&self, margin: u16) -> Rect {
        let m = i32::from(margin);
        Rect {
            x: (i32::from(self.x) - m).clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16,
            y: (i32::from(self.y) - m).clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16,
            width: (i32::from(self.width) + 2 * m).min(i32::from(u16::MAX)) as u16,
            height: (i32::from(self.height) + 2 * m).min(i32::from(u16::MAX)) as u16,
        }
    }
}

/// Pack a point into a single 32-bit word, x in the high half.
pub fn pack_point(point: Point) -> u32 {
    (u32::from(point.x as u16) << 16) | u32::from(point.y as u16)
}

/// Inverse of [`pack_point`].
pub fn unpack_point(word: u32) -> Point {
    Point { x: (word >> 16) as u16 as i16, y: word as u16 as i16 }
}

/// Pack a rectangle into two 32-bit words: position, then size.
pub fn pack_rect(rect: Rect) -> [u32; 2] {
    [
        pack_point(Point { x: rect.x, y: rect.y }),
        (u32::from(rect.width) << 16) | u32::from(rect.height),
    ]
}

/// Inverse of [`pack_rect`].
pub fn unpack_rect(words: [u32; 2]) -> Rect {
    let pos = unpack_point(words[0]);
    Rect {
        x: pos.x,
        y: pos.y,
        width: (words[1] >> 16) as u16,
        height: words[1] as u16,
    }
}

/// Serialize a list of atoms as a 32-bit-unit property payload.
pub fn pack_atom_list(atoms: &[Atom]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(atoms.len() * 4);
    for atom in atoms {
        bytes.extend_from_slice(&atom.0.to_ne_bytes());
    }
    bytes
}

/// Inverse of [`pack_atom_list`]. Trailing partial words are discarded.
pub fn unpack_atom_list(bytes: &[u8]) -> Vec<Atom> {
    bytes
        .chunks_exact(4)
        .map(|c| Atom(u32::from_ne_bytes([c[0], c[1], c[2], c[3]])))
        .collect()
}

/// Serialize a list of strings as a NUL-separated property payload.
///
/// Every entry is NUL-terminated, including the last one, so an empty list
/// packs to an empty blob.
pub fn pack_string_list<S: AsRef<str>>(strings: &[S]) -> Vec<u8> {
    let mut bytes = Vec::new();
    for s in strings {
        bytes.extend_from_slice(s.as_ref().as_bytes());
        bytes.push(0);
    }
    bytes
}

/// Inverse of [`pack_string_list`]. Invalid UTF-8 entries are replaced
/// lossily.
pub fn unpack_string_list(bytes: &[u8]) -> Vec<String> {
    bytes
        .split(|&b| b == 0)
        .filter(|s| !s.is_empty())
        .map(|s| String::from_utf8_lossy(s).into_owned())
        .collect()
}

/// Serialize a list of URIs in the `text/uri-list` shape (CRLF separated,
/// trailing CRLF).
pub fn pack_uri_list<S: AsRef<str>>(uris: &[S]) -> Vec<u8> {
    let mut bytes = Vec::new();
    for uri in uris {
        bytes.extend_from_slice(uri.as_ref().as_bytes());
        bytes.extend_from_slice(b"\r\n");
    }
    bytes
}

/// Inverse of [`pack_uri_list`]. Comment lines (starting with `#`) and blank
/// lines are skipped, and a lone `\n` separator is tolerated.
pub fn unpack_uri_list(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_owned)
        .collect()
}

/// A drop action negotiated between the two sides of a drag.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DndAction {
    /// No action; a rejection when carried by a status or finished message.
    #[default]
    None,
    /// Copy the data to the target.
    Copy,
    /// Move the data to the target; the source deletes its copy afterwards.
    Move,
    /// Create a link/reference to the data.
    Link,
    /// Let the user pick among the actions the source published.
    Ask,
    /// A source-private action the two sides agreed upon out of band.
    Private,
}

impl DndAction {
    /// Whether this is an actual action rather than a rejection.
    pub fn is_some(self) -> bool {
        self != DndAction::None
    }
}

/// A typed negotiation message exchanged between peer windows.
///
/// Every message embeds the top-level window of its sender; handlers validate
/// that window against the current session peer and silently ignore stray or
/// duplicate messages from unrelated sessions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DndMessage {
    /// A drag entered the addressee: advertises the source, its protocol
    /// version and the offered types.
    Enter {
        /// Top-level window of the dragging source.
        source: WindowId,
        /// Protocol version the source speaks.
        version: u8,
        /// Set when the offer has more types than fit inline; the full list
        /// is published as a property on the source window.
        more_types: bool,
        /// Up to [`INLINE_TYPES`] offered types.
        types: SmallVec<[Atom; INLINE_TYPES]>,
    },
    /// The pointer moved over the target while dragging.
    Position {
        /// Top-level window of the dragging source.
        source: WindowId,
        /// Pointer position in screen coordinates.
        point: Point,
        /// Server time of the motion.
        time: Timestamp,
        /// Action the source proposes.
        action: DndAction,
    },
    /// The target's reply to a position message.
    Status {
        /// Top-level window of the target.
        target: WindowId,
        /// Whether the target would accept a drop right now.
        accepted: bool,
        /// Screen rectangle within which the source need not send further
        /// position messages while the action is unchanged.
        suppress: Option<Rect>,
        /// The action the target accepted, possibly substituted.
        action: DndAction,
    },
    /// The drag left the addressee without dropping.
    Leave {
        /// Top-level window of the dragging source.
        source: WindowId,
    },
    /// The source dropped the payload on the addressee.
    Drop {
        /// Top-level window of the dragging source.
        source: WindowId,
        /// Server time of the drop; also the timestamp targets should use to
        /// request conversions of the payload selection.
        time: Timestamp,
    },
    /// The target is done with the drop; unblocks the source.
    Finished {
        /// Top-level window of the target.
        target: WindowId,
        /// Whether the drop was actually taken.
        accepted: bool,
        /// The action the drop was performed with.
        action: DndAction,
    },
}

impl DndMessage {
    /// The window embedded in the message, i.e. the sender's top level.
    pub fn sender(&self) -> WindowId {
        match *self {
            DndMessage::Enter { source, .. }
            | DndMessage::Position { source, .. }
            | DndMessage::Leave { source }
            | DndMessage::Drop { source, .. } => source,
            DndMessage::Status { target, .. } | DndMessage::Finished { target, .. } => target,
        }
    }

    /// The message-kind atom identifying this message on the wire.
    pub fn kind(&self, atoms: &KnownAtoms) -> Atom {
        match self {
            DndMessage::Enter { .. } => atoms.enter,
            DndMessage::Position { .. } => atoms.position,
            DndMessage::Status { .. } => atoms.status,
            DndMessage::Leave { .. } => atoms.leave,
            DndMessage::Drop { .. } => atoms.drop,
            DndMessage::Finished { .. } => atoms.finished,
        }
    }

    /// Encode this message as a kind atom plus five 32-bit data words.
    pub fn to_data32(&self, atoms: &KnownAtoms) -> (Atom, [u32; 5]) {
        let mut data = [0u32; 5];
        match self {
            DndMessage::Enter { source, version, more_types, types } => {
                data[0] = source.0;
                data[1] = (u32::from(*version) << 24) | u32::from(*more_types);
                for (slot, atom) in data[2..].iter_mut().zip(types.iter()) {
                    *slot = atom.0;
                }
            }
            DndMessage::Position { source, point, time, action } => {
                data[0] = source.0;
                data[2] = pack_point(*point);
                data[3] = time.0;
                data[4] = atoms.action_atom(*action).0;
            }
            DndMessage::Status { target, accepted, suppress, action } => {
                data[0] = target.0;
                data[1] = u32::from(*accepted) | (u32::from(suppress.is_some()) << 1);
                let rect = pack_rect(suppress.unwrap_or_default());
                data[2] = rect[0];
                data[3] = rect[1];
                data[4] = atoms.action_atom(*action).0;
            }
            DndMessage::Leave { source } => {
                data[0] = source.0;
            }
            DndMessage::Drop { source, time } => {
                data[0] = source.0;
                data[2] = time.0;
            }
            DndMessage::Finished { target, accepted, action } => {
                data[0] = target.0;
                data[1] = u32::from(*accepted);
                data[2] = atoms.action_atom(*action).0;
            }
        }
        (self.kind(atoms), data)
    }

    /// Decode a message from its kind atom and data words.
    ///
    /// Returns `None` for unknown kinds; unknown action atoms decode as
    /// [`DndAction::None`] rather than failing, the protocol must stay robust
    /// against newer peers.
    pub fn from_data32(atoms: &KnownAtoms, kind: Atom, data: [u32; 5]) -> Option<DndMessage> {
        let msg = if kind == atoms.enter {
            DndMessage::Enter {
                source: WindowId(data[0]),
                version: (data[1] >> 24) as u8,
                more_types: data[1] & 1 != 0,
                types: data[2..]
                    .iter()
                    .map(|&w| Atom(w))
                    .filter(|a| !a.is_none())
                    .collect(),
            }
        } else if kind == atoms.position {
            DndMessage::Position {
                source: WindowId(data[0]),
                point: unpack_point(data[2]),
                time: Timestamp(data[3]),
                action: atoms.action_from_atom(Atom(data[4])),
            }
        } else if kind == atoms.status {
            DndMessage::Status {
                target: WindowId(data[0]),
                accepted: data[1] & 1 != 0,
                suppress: (data[1] & 2 != 0).then(|| unpack_rect([data[2], data[3]])),
                action: atoms.action_from_atom(Atom(data[4])),
            }
        } else if kind == atoms.leave {
            DndMessage::Leave { source: WindowId(data[0]) }
        } else if kind == atoms.drop {
            DndMessage::Drop { source: WindowId(data[0]), time: Timestamp(data[2]) }
        } else if kind == atoms.finished {
            DndMessage::Finished {
                target: WindowId(data[0]),
                accepted: data[1] & 1 != 0,
                action: atoms.action_from_atom(Atom(data[2])),
            }
        } else {
            return None;
        };
        Some(msg)
    }
}
