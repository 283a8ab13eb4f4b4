//! Selection registry
//!
//! A selection is a named, time-bounded offer of data this process makes
//! available to others. The registry owns every offer this process ever
//! claimed, keeps ended offers around for a retention window so that delayed
//! conversion requests can still be resolved against the offer that was valid
//! when they were generated, and performs the type conversions.

use std::fmt;

use downcast_rs::{impl_downcast, Downcast};

use crate::atoms::KnownAtoms;
use crate::protocol::{pack_atom_list, Atom, Timestamp, WindowId};
use crate::transport::{Transport, UnitSize};

/// How long an ended offer stays resolvable by explicit timestamp, in
/// timestamp units past its end time.
pub const OFFER_RETENTION: u32 = 30_000;

/// The result of converting an offer to some requested type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConvertedData {
    /// Type of the produced payload (may differ from the requested type).
    pub type_: Atom,
    /// Unit size of the payload.
    pub unit: UnitSize,
    /// The payload.
    pub bytes: Vec<u8>,
}

/// The data behind an offer.
///
/// [`resolve`](OfferSource::resolve) is invoked at most once, the first time
/// any type other than the two pseudo-types is requested, so drag payloads
/// can defer computing their contents until somebody actually wants them.
pub trait OfferSource: Downcast {
    /// Perform the deferred computation of the offer contents, if any.
    fn resolve(&mut self) {}

    /// Convert the contents to `target`, or `None` if unsupported.
    fn convert(&mut self, target: Atom) -> Option<ConvertedData>;
}

impl_downcast!(OfferSource);

/// One "this process owns selection X" record.
pub struct SelectionOffer {
    selection: Atom,
    owner: WindowId,
    types: Vec<Atom>,
    start_time: Timestamp,
    end_time: Option<Timestamp>,
    /// Transient offers (the drag payload selection) do not advertise the
    /// pseudo-types.
    transient: bool,
    resolved: bool,
    source: Box<dyn OfferSource>,
}

impl fmt::Debug for SelectionOffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectionOffer")
            .field("selection", &self.selection)
            .field("owner", &self.owner)
            .field("types", &self.types)
            .field("start_time", &self.start_time)
            .field("end_time", &self.end_time)
            .field("transient", &self.transient)
            .field("resolved", &self.resolved)
            .finish_non_exhaustive()
    }
}

impl SelectionOffer {
    /// The window registered as the server-recognized owner.
    pub fn owner(&self) -> WindowId {
        self.owner
    }

    /// The types the offer data itself can be converted to.
    pub fn types(&self) -> &[Atom] {
        &self.types
    }

    /// Whether the offer is current, i.e. has no end time yet.
    pub fn is_current(&self) -> bool {
        self.end_time.is_none()
    }

    /// Whether this offer was valid at `time`.
    ///
    /// [`Timestamp::CURRENT`] matches only a still-current offer; an explicit
    /// timestamp matches an offer whose validity interval contains it, or a
    /// still-current offer started at or before it.
    pub fn matches_time(&self, time: Timestamp) -> bool {
        if time.is_current() {
            return self.is_current();
        }
        self.start_time <= time && self.end_time.map_or(true, |end| time <= end)
    }

    /// Convert the offer to `target`.
    ///
    /// The two pseudo-types are handled uniformly for every offer; all other
    /// types first trigger the one-time resolver and then delegate to the
    /// offer's own converter.
    pub fn convert(&mut self, atoms: &KnownAtoms, target: Atom) -> Option<ConvertedData> {
        if target == atoms.type_list {
            let mut advertised = self.types.clone();
            if !self.transient {
                advertised.push(atoms.type_list);
                advertised.push(atoms.timestamp);
            }
            return Some(ConvertedData {
                type_: atoms.atom,
                unit: UnitSize::U32,
                bytes: pack_atom_list(&advertised),
            });
        }
        if target == atoms.timestamp {
            return Some(ConvertedData {
                type_: atoms.integer,
                unit: UnitSize::U32,
                bytes: self.start_time.0.to_ne_bytes().to_vec(),
            });
        }
        if !self.types.contains(&target) {
            return None;
        }
        if !self.resolved {
            self.resolved = true;
            self.source.resolve();
        }
        self.source.convert(target)
    }

    /// Take the offer source back, consuming the offer.
    pub fn into_source(self) -> Box<dyn OfferSource> {
        self.source
    }
}

/// The offers this process holds, current and recently ended.
#[derive(Debug, Default)]
pub struct SelectionRegistry {
    offers: Vec<SelectionOffer>,
}

impl SelectionRegistry {
    /// Create an empty registry.
    pub fn new() -> SelectionRegistry {
        SelectionRegistry { offers: Vec::new() }
    }

    /// Claim ownership of `selection` and store a new current offer for it.
    ///
    /// Any existing current offer for the name is marked as ended first.
    /// Ownership claims can race with other clients, so the claim is verified
    /// by re-reading the recognized owner; on a lost race the new offer is
    /// discarded, `false` is returned, and the previous offer's end time is
    /// left set only if the recognized ownership genuinely changed.
    #[allow(clippy::too_many_arguments)]
    pub fn claim<T: Transport>(
        &mut self,
        transport: &T,
        selection: Atom,
        owner: WindowId,
        types: Vec<Atom>,
        source: Box<dyn OfferSource>,
        transient: bool,
        now: Timestamp,
    ) -> bool {
        self.collect_expired(now);

        let prev = self.current_index(selection);
        let prev_owner = prev.map(|i| self.offers[i].owner);
        if let Some(i) = prev {
            self.offers[i].end_time = Some(now);
        }

        let claimed = transport.set_selection_owner(selection, Some(owner), now).is_ok()
            && transport.selection_owner(selection) == Some(owner);

        if claimed {
            self.offers.push(SelectionOffer {
                selection,
                owner,
                types,
                start_time: now,
                end_time: None,
                transient,
                resolved: false,
                source,
            });
            true
        } else {
            crate::log_debug!("lost ownership race for {selection}");
            // un-end the previous offer unless the recognized owner really
            // moved away from it
            if let (Some(i), Some(prev_owner)) = (prev, prev_owner) {
                if transport.selection_owner(selection) == Some(prev_owner) {
                    self.offers[i].end_time = None;
                }
            }
            false
        }
    }

    /// End the current offer for `selection` and relinquish server ownership
    /// if this process is still the recognized owner.
    pub fn release<T: Transport>(
        &mut self,
        transport: &T,
        selection: Atom,
        end: Option<Timestamp>,
        now: Timestamp,
    ) {
        if let Some(i) = self.current_index(selection) {
            self.offers[i].end_time = Some(end.unwrap_or(now));
            if transport.selection_owner(selection) == Some(self.offers[i].owner) {
                let _ = transport.set_selection_owner(selection, None, now);
            }
        }
    }

    /// End every current offer and relinquish the ones we still own.
    /// Context teardown path.
    pub fn release_all<T: Transport>(&mut self, transport: &T, now: Timestamp) {
        let selections: Vec<Atom> =
            self.offers.iter().filter(|o| o.is_current()).map(|o| o.selection).collect();
        for selection in selections {
            self.release(transport, selection, None, now);
        }
    }

    /// The offer for `selection` valid at `time`, if any.
    pub fn lookup(&self, selection: Atom, time: Timestamp) -> Option<&SelectionOffer> {
        self.offers
            .iter()
            .filter(|o| o.selection == selection && o.matches_time(time))
            .last()
    }

    /// Mutable variant of [`lookup`](SelectionRegistry::lookup), for
    /// conversion (conversion may trigger the one-time resolver).
    pub fn lookup_mut(&mut self, selection: Atom, time: Timestamp) -> Option<&mut SelectionOffer> {
        self.offers
            .iter_mut()
            .filter(|o| o.selection == selection && o.matches_time(time))
            .last()
    }

    /// The current (unended) offer for `selection`, if any.
    pub fn current(&self, selection: Atom) -> Option<&SelectionOffer> {
        self.lookup(selection, Timestamp::CURRENT)
    }

    /// Server notification that another client took `selection` over.
    /// `time` must be a real timestamp, not [`Timestamp::CURRENT`].
    pub fn handle_clear(&mut self, selection: Atom, time: Timestamp) {
        if let Some(i) = self.current_index(selection) {
            crate::log_debug!("selection {selection} taken over by another client");
            self.offers[i].end_time = Some(time);
        }
    }

    fn current_index(&self, selection: Atom) -> Option<usize> {
        self.offers.iter().position(|o| o.selection == selection && o.is_current())
    }

    /// Drop offers whose retention window has passed. Called lazily from
    /// claim; ended offers are never collected eagerly because delayed
    /// requests may still name them.
    pub fn collect_expired(&mut self, now: Timestamp) {
        self.offers.retain(|o| match o.end_time {
            Some(end) => end.0.saturating_add(OFFER_RETENTION) >= now.0,
            None => true,
        });
    }
}
