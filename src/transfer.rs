//! Selection data transfer
//!
//! Fetching converts a selection through its owner: in-process offers resolve
//! directly, everything else goes through a conversion request, a staging
//! property on our transfer window and, for payloads above the transport's
//! per-request limit, an incremental stream of chunks gated on property
//! deletions. Serving is the mirror image, with an adaptive chunk size that
//! shrinks when the server reports allocation pressure.

use std::fmt;

use crate::context::{DndContext, WAIT_TIMEOUT};
use crate::protocol::{Atom, Timestamp, WindowId};
use crate::selection::ConvertedData;
use crate::transport::{
    ConversionRequest, Event, PropertyState, Transport, TransportError, UnitSize,
};

/// An error ending a data transfer.
#[derive(Debug)]
pub enum TransferError {
    /// The offer cannot produce the requested type.
    Unsupported,
    /// The owner answered the conversion request with "no data".
    Refused,
    /// The peer did not respond within the bounded wait.
    Timeout,
    /// The peer window was destroyed mid-transfer.
    PeerGone,
    /// The server kept failing allocation even at the minimum chunk size.
    Exhausted,
    /// The peer violated the transfer protocol.
    Protocol(&'static str),
    /// The transport failed.
    Transport(TransportError),
}

impl std::error::Error for TransferError {}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferError::Unsupported => f.write_str("the offer does not provide this type"),
            TransferError::Refused => f.write_str("the selection owner refused the conversion"),
            TransferError::Timeout => f.write_str("the peer did not respond in time"),
            TransferError::PeerGone => f.write_str("the peer window was destroyed"),
            TransferError::Exhausted => {
                f.write_str("server allocation failed at the minimum chunk size")
            }
            TransferError::Protocol(msg) => write!(f, "protocol violation: {msg}"),
            TransferError::Transport(e) => write!(f, "transport error: {e}"),
        }
    }
}

impl From<TransportError> for TransferError {
    fn from(e: TransportError) -> TransferError {
        match e {
            TransportError::WindowGone => TransferError::PeerGone,
            e => TransferError::Transport(e),
        }
    }
}

impl<T: Transport> DndContext<T> {
    /// Fetch `selection` converted to `target`, as it was valid at `time`.
    ///
    /// Blocks for at most [`WAIT_TIMEOUT`] per protocol step, servicing
    /// inbound conversion requests inline, so two peers fetching from each
    /// other cannot deadlock.
    pub fn get_selection_data(
        &mut self,
        selection: Atom,
        target: Atom,
        time: Timestamp,
    ) -> Result<ConvertedData, TransferError> {
        let atoms = self.atoms;
        if let Some(offer) = self.registry.lookup_mut(selection, time) {
            // our own offer; no round-trip needed
            return offer.convert(&atoms, target).ok_or(TransferError::Unsupported);
        }

        let window = self.transport.transfer_window();
        let staging = atoms.staging;
        // a stale value from an aborted earlier transfer must not be mistaken
        // for the reply
        let _ = self.transport.delete_property(window, staging);
        self.transport.request_conversion(selection, target, staging, time)?;

        let got = self.wait_for(WAIT_TIMEOUT, |event| {
            matches!(event, Event::ConversionReply { selection: s, target: t, .. }
                if *s == selection && *t == target)
        });
        let property = match got {
            Some(Event::ConversionReply { property, .. }) => property,
            Some(_) => None,
            None => return Err(TransferError::Timeout),
        };
        let Some(property) = property else { return Err(TransferError::Refused) };

        // deleting in the same read signals consumption to the owner
        let value = self.transport.read_property(window, property, true)?;
        if value.type_ == atoms.incremental {
            let owner = self.transport.selection_owner(selection);
            return self.receive_incremental(window, property, owner);
        }
        if value.remaining > 0 {
            return Err(TransferError::Protocol("single-shot reply larger than one read"));
        }
        Ok(ConvertedData { type_: value.type_, unit: value.unit, bytes: value.bytes })
    }

    fn receive_incremental(
        &mut self,
        window: WindowId,
        property: Atom,
        owner: Option<WindowId>,
    ) -> Result<ConvertedData, TransferError> {
        if let Some(owner) = owner {
            self.transport.watch_window(owner);
        }
        let result = self.receive_chunks(window, property, owner);
        if let Some(owner) = owner {
            self.transport.unwatch_window(owner);
        }
        result
    }

    fn receive_chunks(
        &mut self,
        window: WindowId,
        property: Atom,
        owner: Option<WindowId>,
    ) -> Result<ConvertedData, TransferError> {
        let mut data: Option<ConvertedData> = None;
        loop {
            let got = self.wait_for(WAIT_TIMEOUT, |event| match event {
                Event::PropertyNotify { window: w, property: p, state } => {
                    *w == window && *p == property && *state == PropertyState::NewValue
                }
                Event::WindowDestroyed(w) => Some(*w) == owner,
                _ => false,
            });
            match got {
                None => return Err(TransferError::Timeout),
                Some(Event::WindowDestroyed(_)) => return Err(TransferError::PeerGone),
                Some(_) => {}
            }
            let value = self.transport.read_property(window, property, true)?;
            if value.bytes.is_empty() {
                // zero-length terminator
                return Ok(data.unwrap_or(ConvertedData {
                    type_: value.type_,
                    unit: value.unit,
                    bytes: Vec::new(),
                }));
            }
            match &mut data {
                Some(d) => d.bytes.extend_from_slice(&value.bytes),
                None => {
                    // the first chunk fixes the type of the whole transfer
                    data = Some(ConvertedData {
                        type_: value.type_,
                        unit: value.unit,
                        bytes: value.bytes,
                    });
                }
            }
        }
    }

    /// Answer a conversion request from another peer against our registry.
    ///
    /// The requester is never left without a reply; any failure before the
    /// reply went out is reported as "no data".
    pub(crate) fn handle_conversion_request(&mut self, request: &ConversionRequest) {
        let atoms = self.atoms;
        let data = self
            .registry
            .lookup_mut(request.selection, request.time)
            .and_then(|offer| offer.convert(&atoms, request.target));
        match data {
            Some(data) => {
                if let Err(e) = self.send_data(request, data) {
                    crate::log_warn!(
                        "conversion for {} failed: {e}",
                        request.requestor
                    );
                }
            }
            None => {
                crate::log_debug!(
                    "refusing to convert {} to {} for {}",
                    request.selection,
                    request.target,
                    request.requestor
                );
                if let Err(e) = self.transport.send_conversion_reply(request, None) {
                    crate::log_debug!("could not refuse conversion: {e}");
                }
            }
        }
    }

    /// Attach `data` to the requestor per `request` and send the reply,
    /// incrementally if it exceeds the transport's per-request limit.
    pub(crate) fn send_data(
        &mut self,
        request: &ConversionRequest,
        data: ConvertedData,
    ) -> Result<(), TransferError> {
        if data.bytes.len() <= self.transport.max_payload_bytes() {
            if let Err(e) = self.transport.write_property(
                request.requestor,
                request.property,
                data.type_,
                data.unit,
                &data.bytes,
            ) {
                let _ = self.transport.send_conversion_reply(request, None);
                return Err(e.into());
            }
            self.transport.send_conversion_reply(request, Some(request.property))?;
            return Ok(());
        }

        // the watch must precede the announcement or the first deletion
        // notification can be lost
        self.transport.watch_window(request.requestor);
        let result = self.send_incremental(request, &data);
        self.transport.unwatch_window(request.requestor);
        result
    }

    fn send_incremental(
        &mut self,
        request: &ConversionRequest,
        data: &ConvertedData,
    ) -> Result<(), TransferError> {
        // announce the incremental transfer with the total size, then stream
        // chunks gated on the requester deleting the previous one
        let total = data.bytes.len().min(u32::MAX as usize) as u32;
        if let Err(e) = self.transport.write_property(
            request.requestor,
            request.property,
            self.atoms.incremental,
            UnitSize::U32,
            &total.to_ne_bytes(),
        ) {
            let _ = self.transport.send_conversion_reply(request, None);
            return Err(e.into());
        }
        self.transport.send_conversion_reply(request, Some(request.property))?;
        self.stream_chunks(request, data)
    }

    fn stream_chunks(
        &mut self,
        request: &ConversionRequest,
        data: &ConvertedData,
    ) -> Result<(), TransferError> {
        let unit = data.unit.bytes();
        let mut chunk = (self.transport.max_payload_bytes() / unit).max(1) * unit;
        let mut sent = 0;
        let mut done = false;
        while !done {
            let got = self.wait_for(WAIT_TIMEOUT, |event| match event {
                Event::PropertyNotify { window, property, state } => {
                    *window == request.requestor
                        && *property == request.property
                        && *state == PropertyState::Deleted
                }
                Event::WindowDestroyed(w) => *w == request.requestor,
                _ => false,
            });
            match got {
                None => return Err(TransferError::Timeout),
                Some(Event::WindowDestroyed(_)) => return Err(TransferError::PeerGone),
                Some(_) => {}
            }
            let remaining = &data.bytes[sent..];
            // an empty write is the terminator
            done = remaining.is_empty();
            loop {
                let len = remaining.len().min(chunk);
                match self.transport.write_property(
                    request.requestor,
                    request.property,
                    data.type_,
                    data.unit,
                    &remaining[..len],
                ) {
                    Ok(()) => {
                        sent += len;
                        break;
                    }
                    Err(TransportError::Alloc) if chunk > unit => {
                        // the server is short on space; retry smaller, never
                        // below one unit
                        chunk = ((chunk / 2).max(unit) / unit) * unit;
                        crate::log_debug!("shrinking transfer chunk to {chunk} bytes");
                    }
                    Err(TransportError::Alloc) => return Err(TransferError::Exhausted),
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(())
    }
}
