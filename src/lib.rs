//! Inter-window drag-and-drop negotiation and selection data transfer
//!
//! This crate implements the two protocols a windowing toolkit needs to move
//! typed data between peer windows owned by different processes sharing one
//! display server:
//!
//! - the *selection* protocol: a process publishes a named, time-bounded offer
//!   of data ([`OfferSource`]) and other processes request conversions of that
//!   offer to the types they understand, including a chunked incremental
//!   sub-protocol for payloads larger than one server message
//!   ([`DndContext::get_selection_data`]);
//! - the *drag-and-drop* protocol: a two-role (source/target) negotiation state
//!   machine layered on top of the selection protocol, exchanging enter,
//!   position, status, leave, drop and finished messages between the dragging
//!   window and the window under the pointer.
//!
//! The display server itself is abstracted behind the [`Transport`] trait: the
//! crate never talks to an OS connection directly, it only sends typed
//! messages, manipulates window properties and walks the window hierarchy
//! through that trait. Widget-side behavior (hit testing, accept predicates,
//! drop handling, cursor feedback, the "ask" dialog) is likewise abstracted
//! behind the capability traits of the [`session`] module, so the state
//! machine never owns or inherits from widget code.
//!
//! Everything is single-threaded and cooperative. The only suspensions are
//! *bounded active waits* of at most [`WAIT_TIMEOUT`]: while waiting for one
//! specific reply the context keeps servicing incoming conversion requests
//! from third parties inline, because two peers that are simultaneously each
//! other's data source and requester would otherwise deadlock.
//!
//! ## Logging
//!
//! This crate can generate some runtime diagnostics (notably when stray or
//! malformed protocol messages are ignored). By default those messages are
//! printed to stderr. If you activate the `log` cargo feature, they will
//! instead be piped through the `log` crate.

#![warn(missing_docs, missing_debug_implementations)]
#![forbid(unsafe_code)]

// internal imports for dispatching logging depending on the `log` feature
#[cfg(feature = "log")]
#[allow(unused_imports)]
use log::{debug as log_debug, error as log_error, info as log_info, warn as log_warn};
#[cfg(not(feature = "log"))]
#[allow(unused_imports)]
use std::{
    eprintln as log_error, eprintln as log_warn, eprintln as log_info, eprintln as log_debug,
};

pub mod actions;
pub mod atoms;
mod context;
pub mod locate;
pub mod protocol;
pub mod selection;
pub mod session;
mod source;
mod target;
pub mod transfer;
pub mod transport;

#[cfg(test)]
mod test;

pub use context::{DndContext, WAIT_TIMEOUT};
pub use protocol::{Atom, DndAction, DndMessage, Point, Rect, Timestamp, WindowId};
pub use selection::{ConvertedData, OfferSource};
pub use session::{
    AskDialog, BeginDragError, Buttons, DragSource, DropTargets, Hooks, Modifiers, TargetId,
};
pub use transfer::TransferError;
pub use transport::{Event, Transport, TransportError};
