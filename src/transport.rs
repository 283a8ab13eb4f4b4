//! Abstract message transport
//!
//! The display/message server is an external collaborator. Everything the
//! protocol machinery needs from it is captured by the [`Transport`] trait:
//! typed point-to-point messages, named byte-blob properties on windows,
//! selection ownership, destruction notification, a time source and window
//! hierarchy walking. Implementations wrap one connection to a concrete
//! server; the crate itself never opens sockets.

use std::time::Duration;

use crate::protocol::{Atom, DndMessage, Point, Rect, Timestamp, WindowId};

/// Unit size of a property payload.
///
/// Properties carry arrays of 8, 16 or 32-bit units; the unit is also the
/// floor below which the adaptive chunk size of an incremental transfer never
/// shrinks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnitSize {
    /// Byte units.
    U8,
    /// 16-bit units.
    U16,
    /// 32-bit units.
    U32,
}

impl UnitSize {
    /// The unit width in bytes.
    pub fn bytes(self) -> usize {
        match self {
            UnitSize::U8 => 1,
            UnitSize::U16 => 2,
            UnitSize::U32 => 4,
        }
    }
}

/// A property value read from a window.
#[derive(Clone, Debug)]
pub struct PropertyValue {
    /// Declared type of the payload.
    pub type_: Atom,
    /// Unit size of the payload.
    pub unit: UnitSize,
    /// The payload bytes actually read.
    pub bytes: Vec<u8>,
    /// Bytes left unread on the property after this read.
    ///
    /// A single-shot conversion reply must be fully present in one read, so a
    /// non-zero remainder there is a protocol violation.
    pub remaining: usize,
}

/// An error reported by the transport.
#[derive(Clone, Debug)]
pub enum TransportError {
    /// The addressed window no longer exists.
    WindowGone,
    /// The server could not allocate resources for the request.
    ///
    /// During an incremental send this is retried transparently with a
    /// smaller chunk, down to one unit.
    Alloc,
    /// The connection failed.
    Io(String),
}

impl std::error::Error for TransportError {}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::WindowGone => f.write_str("window no longer exists"),
            TransportError::Alloc => f.write_str("server resource allocation failed"),
            TransportError::Io(msg) => write!(f, "transport error: {msg}"),
        }
    }
}

/// State transition reported by a property notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PropertyState {
    /// The property was created or replaced.
    NewValue,
    /// The property was deleted.
    Deleted,
}

/// A request from another peer to convert one of our selections.
#[derive(Clone, Copy, Debug)]
pub struct ConversionRequest {
    /// Window the converted data should be attached to.
    pub requestor: WindowId,
    /// Selection being converted.
    pub selection: Atom,
    /// Requested data type.
    pub target: Atom,
    /// Property on `requestor` to attach the result to.
    pub property: Atom,
    /// Time at which the requester believes the selection was valid.
    pub time: Timestamp,
}

/// An inbound event delivered by the transport.
#[derive(Clone, Debug)]
pub enum Event {
    /// A typed drag-and-drop message addressed to one of our windows.
    Dnd {
        /// The addressed window.
        window: WindowId,
        /// The decoded message.
        msg: DndMessage,
    },
    /// Another peer asks us to convert a selection we own.
    Conversion(ConversionRequest),
    /// The reply to one of our own conversion requests.
    ConversionReply {
        /// Selection that was requested.
        selection: Atom,
        /// Type that was requested.
        target: Atom,
        /// Property holding the result, or `None` if the owner had no data.
        property: Option<Atom>,
        /// Time echoed from the request.
        time: Timestamp,
    },
    /// A property changed on one of our windows or on a watched window.
    PropertyNotify {
        /// The window the property lives on.
        window: WindowId,
        /// The property that changed.
        property: Atom,
        /// Whether it gained a new value or was deleted.
        state: PropertyState,
    },
    /// The server revoked our ownership of a selection because another
    /// client claimed it.
    SelectionCleared {
        /// The selection that was taken over.
        selection: Atom,
        /// Time of the takeover.
        time: Timestamp,
    },
    /// A watched window was destroyed.
    WindowDestroyed(WindowId),
}

/// One connection to the shared display/message server.
///
/// All methods take `&self`: the transport is free to keep its own interior
/// queue state, and the protocol machinery holds the one logical thread of
/// control, so no locking discipline is imposed here.
pub trait Transport {
    /// Intern a name, returning its stable atom.
    fn intern_atom(&self, name: &str) -> Atom;

    /// Current server time.
    fn timestamp(&self) -> Timestamp;

    /// The connection's utility window, used as requestor for conversions
    /// and holder of staging properties.
    fn transfer_window(&self) -> WindowId;

    /// Largest property payload (in bytes) one request can carry; the
    /// starting chunk size of incremental transfers.
    fn max_payload_bytes(&self) -> usize;

    /// Send a typed drag-and-drop message to a window.
    fn send_dnd(&self, to: WindowId, msg: &DndMessage) -> Result<(), TransportError>;

    /// Read a property, optionally deleting it in the same request.
    fn read_property(
        &self,
        window: WindowId,
        property: Atom,
        delete: bool,
    ) -> Result<PropertyValue, TransportError>;

    /// Replace a property's value.
    fn write_property(
        &self,
        window: WindowId,
        property: Atom,
        type_: Atom,
        unit: UnitSize,
        bytes: &[u8],
    ) -> Result<(), TransportError>;

    /// Delete a property.
    fn delete_property(&self, window: WindowId, property: Atom) -> Result<(), TransportError>;

    /// Current owner of a selection, if any.
    fn selection_owner(&self, selection: Atom) -> Option<WindowId>;

    /// Claim or relinquish ownership of a selection.
    ///
    /// Claims are not guaranteed; callers must re-read the owner to confirm.
    fn set_selection_owner(
        &self,
        selection: Atom,
        owner: Option<WindowId>,
        time: Timestamp,
    ) -> Result<(), TransportError>;

    /// Ask the current owner of `selection` to convert it to `target` and
    /// attach the result to `property` on our transfer window.
    fn request_conversion(
        &self,
        selection: Atom,
        target: Atom,
        property: Atom,
        time: Timestamp,
    ) -> Result<(), TransportError>;

    /// Answer a conversion request; `property` is `None` to report that no
    /// data is available. Never staying silent is part of the protocol
    /// contract, silence would strand the requester's bounded wait.
    fn send_conversion_reply(
        &self,
        request: &ConversionRequest,
        property: Option<Atom>,
    ) -> Result<(), TransportError>;

    /// Subscribe to destruction and property notifications for a foreign
    /// window. Notifications for our own windows are always delivered.
    fn watch_window(&self, window: WindowId);

    /// Undo [`watch_window`](Transport::watch_window).
    fn unwatch_window(&self, window: WindowId);

    /// Block for at most `timeout` waiting for the next inbound event.
    ///
    /// `None` means the timeout elapsed, which is not an error by itself.
    fn next_event(&self, timeout: Duration) -> Option<Event>;

    /// The root of the window hierarchy.
    fn root_window(&self) -> WindowId;

    /// The topmost mapped child of `window` containing `point` (in `window`
    /// coordinates), if any.
    fn child_at(&self, window: WindowId, point: Point) -> Option<WindowId>;

    /// Translate a point between the coordinate spaces of two windows.
    /// `None` if either window is gone or unrelated.
    fn translate_point(&self, from: WindowId, to: WindowId, point: Point) -> Option<Point>;

    /// Geometry of a window in root coordinates, `None` if it is gone.
    fn window_geometry(&self, window: WindowId) -> Option<Rect>;

    /// Whether this window was created by this connection.
    fn is_local_window(&self, window: WindowId) -> bool;
}
