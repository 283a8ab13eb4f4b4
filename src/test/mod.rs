//! In-process fake of the display/message server.
//!
//! One [`Server`] is shared by any number of [`FakeTransport`] connections.
//! Foreign peers are scripted: the server can impersonate a drop target that
//! answers position messages, a selection owner that serves conversions
//! (single-shot or incremental) and a requester that consumes chunks by
//! deleting them, so every blocking wait in the crate finds its reply without
//! a second thread.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use crate::protocol::{Atom, DndAction, DndMessage, Point, Rect, Timestamp, WindowId};
use crate::transport::{
    ConversionRequest, Event, PropertyState, PropertyValue, Transport, TransportError, UnitSize,
};


/// Connection id used for scripted peers; it has no event queue.
const SCRIPT_CONN: usize = usize::MAX;

pub(crate) fn setup() {
    #[cfg(feature = "log")]
    let _ = env_logger::builder().is_test(true).try_init();
}

struct Win {
    conn: usize,
    parent: WindowId,
    /// Geometry in root coordinates.
    rect: Rect,
    children: Vec<WindowId>,
}

struct Prop {
    type_: Atom,
    unit: UnitSize,
    bytes: Vec<u8>,
}

/// A canned answer for conversions of a selection owned by a scripted peer.
pub(crate) enum ScriptedConversion {
    Refuse,
    Oneshot { type_: Atom, unit: UnitSize, bytes: Vec<u8> },
    Incremental { type_: Atom, unit: UnitSize, chunks: Vec<Vec<u8>> },
    /// Like `Incremental`, but the owner window dies after the last chunk is
    /// consumed instead of sending the terminator.
    Interrupted { type_: Atom, unit: UnitSize, chunks: Vec<Vec<u8>> },
}

/// A scripted foreign drop target.
pub(crate) struct ScriptedTarget {
    pub window: WindowId,
    pub accept: bool,
    pub action: DndAction,
    pub suppress: Option<Rect>,
    /// Events injected into the sender's queue when the drop arrives, before
    /// the finished acknowledgement.
    pub on_drop: Vec<Event>,
}

struct ServerInner {
    atoms: HashMap<String, u32>,
    next_atom: u32,
    time: u32,
    root: WindowId,
    next_window: u32,
    windows: HashMap<u32, Win>,
    props: HashMap<(u32, u32), Prop>,
    owners: HashMap<u32, (WindowId, usize)>,
    queues: HashMap<usize, VecDeque<Event>>,
    watches: HashMap<usize, HashSet<u32>>,
    next_conn: usize,
    max_payload: usize,
    /// Property writes larger than this fail with [`TransportError::Alloc`].
    alloc_limit: Option<usize>,
    /// Sizes of every attempted property write, including failed ones.
    write_sizes: Vec<usize>,
    /// Keys whose writes are consumed (recorded and deleted) immediately, as
    /// a scripted incremental requester would.
    auto_consume: HashSet<(u32, u32)>,
    consumed: HashMap<(u32, u32), Vec<Vec<u8>>>,
    /// Chunk queues fed one entry per deletion of the key, as a scripted
    /// incremental owner would.
    feeders: HashMap<(u32, u32), VecDeque<Vec<u8>>>,
    feeder_meta: HashMap<(u32, u32), (Atom, UnitSize)>,
    /// Owners that crash once their feeder for the key has run dry.
    dying_feeders: HashMap<(u32, u32), WindowId>,
    conversions: HashMap<u32, ScriptedConversion>,
    targets: Vec<ScriptedTarget>,
    dnd_log: Vec<(WindowId, DndMessage)>,
    /// When set, the next ownership claim silently goes to this window.
    steal_next_claim: Option<WindowId>,
    /// When set, reads return at most this many bytes and report a remainder.
    truncate_read_at: Option<usize>,
}

impl ServerInner {
    fn intern(&mut self, name: &str) -> Atom {
        if let Some(&id) = self.atoms.get(name) {
            return Atom(id);
        }
        let id = self.next_atom;
        self.next_atom += 1;
        self.atoms.insert(name.to_owned(), id);
        Atom(id)
    }

    fn push(&mut self, conn: usize, event: Event) {
        if let Some(queue) = self.queues.get_mut(&conn) {
            queue.push_back(event);
        }
    }

    /// Every connection interested in notifications about `window`.
    fn audience(&self, window: WindowId) -> Vec<usize> {
        let mut conns = Vec::new();
        if let Some(win) = self.windows.get(&window.0) {
            conns.push(win.conn);
        }
        for (&conn, watched) in &self.watches {
            if watched.contains(&window.0) && !conns.contains(&conn) {
                conns.push(conn);
            }
        }
        conns
    }

    fn notify_property(&mut self, window: WindowId, property: Atom, state: PropertyState) {
        for conn in self.audience(window) {
            self.push(conn, Event::PropertyNotify { window, property, state });
        }
    }

    fn store(&mut self, window: WindowId, property: Atom, prop: Prop) {
        self.props.insert((window.0, property.0), prop);
        self.notify_property(window, property, PropertyState::NewValue);
    }

    fn remove_prop(&mut self, window: WindowId, property: Atom) {
        if self.props.remove(&(window.0, property.0)).is_some() {
            self.notify_property(window, property, PropertyState::Deleted);
            self.feed(window, property);
        }
    }

    /// Serve the next scripted incremental chunk after a deletion.
    fn feed(&mut self, window: WindowId, property: Atom) {
        let key = (window.0, property.0);
        let Some(chunk) = self.feeders.get_mut(&key).and_then(|q| q.pop_front()) else {
            if let Some(owner) = self.dying_feeders.remove(&key) {
                self.destroy(owner);
            }
            return;
        };
        if self.feeders.get(&key).map_or(false, |q| q.is_empty()) {
            self.feeders.remove(&key);
        }
        let (type_, unit) = self.feeder_meta[&key];
        self.store(window, property, Prop { type_, unit, bytes: chunk });
    }

    fn destroy(&mut self, window: WindowId) {
        self.windows.remove(&window.0);
        let root = self.root;
        if let Some(root) = self.windows.get_mut(&root.0) {
            root.children.retain(|&c| c != window);
        }
        let conns: Vec<usize> = self
            .watches
            .iter()
            .filter(|(_, watched)| watched.contains(&window.0))
            .map(|(&conn, _)| conn)
            .collect();
        for conn in conns {
            self.push(conn, Event::WindowDestroyed(window));
        }
    }

    fn new_window(&mut self, conn: usize, rect: Rect) -> WindowId {
        let id = WindowId(self.next_window);
        self.next_window += 1;
        let root = self.root;
        self.windows.insert(id.0, Win { conn, parent: root, rect, children: Vec::new() });
        if let Some(root) = self.windows.get_mut(&root.0) {
            root.children.push(id);
        }
        id
    }

    fn scripted_target(&mut self, sender: usize, to: WindowId, msg: &DndMessage) -> bool {
        let Some(idx) = self.targets.iter().position(|t| t.window == to) else { return false };
        self.dnd_log.push((to, msg.clone()));
        let (window, accept, action, suppress) = {
            let t = &self.targets[idx];
            (t.window, t.accept, t.action, t.suppress)
        };
        match msg {
            DndMessage::Position { .. } => {
                let reply = DndMessage::Status {
                    target: window,
                    accepted: accept,
                    suppress,
                    action: if accept { action } else { DndAction::None },
                };
                self.push(sender, Event::Dnd { window: to, msg: reply });
            }
            DndMessage::Drop { .. } => {
                let injected = std::mem::take(&mut self.targets[idx].on_drop);
                for event in injected {
                    self.push(sender, event);
                }
                let reply = DndMessage::Finished {
                    target: window,
                    accepted: accept,
                    action: if accept { action } else { DndAction::None },
                };
                self.push(sender, Event::Dnd { window: to, msg: reply });
            }
            _ => {}
        }
        true
    }
}

/// Shared fake server handle.
#[derive(Clone)]
pub(crate) struct Server {
    inner: Rc<RefCell<ServerInner>>,
}

impl Server {
    pub fn new() -> Server {
        let root = WindowId(1);
        let mut windows = HashMap::new();
        windows.insert(
            root.0,
            Win {
                conn: SCRIPT_CONN,
                parent: WindowId::NONE,
                rect: Rect::new(0, 0, 4096, 4096),
                children: Vec::new(),
            },
        );
        Server {
            inner: Rc::new(RefCell::new(ServerInner {
                atoms: HashMap::new(),
                next_atom: 100,
                time: 1000,
                root,
                next_window: 2,
                windows,
                props: HashMap::new(),
                owners: HashMap::new(),
                queues: HashMap::new(),
                watches: HashMap::new(),
                next_conn: 0,
                max_payload: 4096,
                alloc_limit: None,
                write_sizes: Vec::new(),
                auto_consume: HashSet::new(),
                consumed: HashMap::new(),
                feeders: HashMap::new(),
                feeder_meta: HashMap::new(),
                dying_feeders: HashMap::new(),
                conversions: HashMap::new(),
                targets: Vec::new(),
                dnd_log: Vec::new(),
                steal_next_claim: None,
                truncate_read_at: None,
            })),
        }
    }

    pub fn connect(&self) -> FakeTransport {
        let mut inner = self.inner.borrow_mut();
        let conn = inner.next_conn;
        inner.next_conn += 1;
        inner.queues.insert(conn, VecDeque::new());
        inner.watches.insert(conn, HashSet::new());
        let transfer = inner.new_window(conn, Rect::new(0, 0, 1, 1));
        FakeTransport { server: self.inner.clone(), conn, transfer }
    }

    pub fn intern(&self, name: &str) -> Atom {
        self.inner.borrow_mut().intern(name)
    }

    /// A window belonging to no real connection, for impersonating peers.
    pub fn foreign_window(&self, rect: Rect) -> WindowId {
        self.inner.borrow_mut().new_window(SCRIPT_CONN, rect)
    }

    /// Publish the protocol awareness marker on a window.
    pub fn set_aware(&self, window: WindowId, version: u8) {
        let mut inner = self.inner.borrow_mut();
        let aware = inner.intern("DND_AWARE");
        let atom = inner.intern("ATOM");
        inner.store(
            window,
            aware,
            Prop { type_: atom, unit: UnitSize::U32, bytes: u32::from(version).to_ne_bytes().to_vec() },
        );
    }

    /// Publish a proxy redirection on a window.
    pub fn set_proxy(&self, window: WindowId, proxy: WindowId) {
        let mut inner = self.inner.borrow_mut();
        let prop = inner.intern("DND_PROXY");
        let type_ = inner.intern("WINDOW");
        inner.store(
            window,
            prop,
            Prop { type_, unit: UnitSize::U32, bytes: proxy.0.to_ne_bytes().to_vec() },
        );
    }

    pub fn add_target(&self, target: ScriptedTarget) {
        self.inner.borrow_mut().targets.push(target);
    }

    /// Messages scripted targets received, in order.
    pub fn dnd_log(&self) -> Vec<(WindowId, DndMessage)> {
        self.inner.borrow().dnd_log.clone()
    }

    /// Make a scripted peer the owner of `selection`, answering conversions
    /// with `reply`.
    pub fn foreign_selection(&self, selection: Atom, owner: WindowId, reply: ScriptedConversion) {
        let mut inner = self.inner.borrow_mut();
        inner.owners.insert(selection.0, (owner, SCRIPT_CONN));
        inner.conversions.insert(selection.0, reply);
    }

    pub fn destroy_window(&self, window: WindowId) {
        self.inner.borrow_mut().destroy(window);
    }

    pub fn set_max_payload(&self, bytes: usize) {
        self.inner.borrow_mut().max_payload = bytes;
    }

    pub fn set_alloc_limit(&self, bytes: Option<usize>) {
        self.inner.borrow_mut().alloc_limit = bytes;
    }

    pub fn write_sizes(&self) -> Vec<usize> {
        self.inner.borrow().write_sizes.clone()
    }

    /// Consume every write to (window, property) immediately, recording the
    /// chunks, like an incremental requester would.
    pub fn auto_consume(&self, window: WindowId, property: Atom) {
        self.inner.borrow_mut().auto_consume.insert((window.0, property.0));
    }

    pub fn consumed(&self, window: WindowId, property: Atom) -> Vec<Vec<u8>> {
        self.inner.borrow().consumed.get(&(window.0, property.0)).cloned().unwrap_or_default()
    }

    pub fn steal_next_claim(&self, thief: WindowId) {
        self.inner.borrow_mut().steal_next_claim = Some(thief);
    }

    pub fn truncate_reads_at(&self, bytes: Option<usize>) {
        self.inner.borrow_mut().truncate_read_at = bytes;
    }

    pub fn property_bytes(&self, window: WindowId, property: Atom) -> Option<Vec<u8>> {
        self.inner.borrow().props.get(&(window.0, property.0)).map(|p| p.bytes.clone())
    }

    pub fn selection_owner(&self, selection: Atom) -> Option<WindowId> {
        self.inner.borrow().owners.get(&selection.0).map(|&(w, _)| w)
    }

    /// Queue an event straight into a connection, as the server would.
    pub fn inject(&self, transport: &FakeTransport, event: Event) {
        self.inner.borrow_mut().push(transport.conn, event);
    }

    pub fn advance_time(&self, delta: u32) {
        self.inner.borrow_mut().time += delta;
    }
}

/// One fake connection.
pub(crate) struct FakeTransport {
    server: Rc<RefCell<ServerInner>>,
    conn: usize,
    transfer: WindowId,
}

impl FakeTransport {
    /// Create a top-level window owned by this connection, in root
    /// coordinates.
    pub fn new_window(&self, rect: Rect) -> WindowId {
        self.server.borrow_mut().new_window(self.conn, rect)
    }
}

impl std::fmt::Debug for FakeTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeTransport").field("conn", &self.conn).finish()
    }
}

impl Transport for FakeTransport {
    fn intern_atom(&self, name: &str) -> Atom {
        self.server.borrow_mut().intern(name)
    }

    fn timestamp(&self) -> Timestamp {
        let mut inner = self.server.borrow_mut();
        inner.time += 1;
        Timestamp(inner.time)
    }

    fn transfer_window(&self) -> WindowId {
        self.transfer
    }

    fn max_payload_bytes(&self) -> usize {
        self.server.borrow().max_payload
    }

    fn send_dnd(&self, to: WindowId, msg: &DndMessage) -> Result<(), TransportError> {
        let mut inner = self.server.borrow_mut();
        if inner.scripted_target(self.conn, to, msg) {
            return Ok(());
        }
        let conn = match inner.windows.get(&to.0) {
            Some(win) => win.conn,
            None => return Err(TransportError::WindowGone),
        };
        inner.push(conn, Event::Dnd { window: to, msg: msg.clone() });
        Ok(())
    }

    fn read_property(
        &self,
        window: WindowId,
        property: Atom,
        delete: bool,
    ) -> Result<PropertyValue, TransportError> {
        let mut inner = self.server.borrow_mut();
        if !inner.windows.contains_key(&window.0) {
            return Err(TransportError::WindowGone);
        }
        let Some(prop) = inner.props.get(&(window.0, property.0)) else {
            return Err(TransportError::Io("no such property".into()));
        };
        let (bytes, remaining) = match inner.truncate_read_at {
            Some(limit) if prop.bytes.len() > limit => {
                (prop.bytes[..limit].to_vec(), prop.bytes.len() - limit)
            }
            _ => (prop.bytes.clone(), 0),
        };
        let value = PropertyValue { type_: prop.type_, unit: prop.unit, bytes, remaining };
        if delete {
            inner.remove_prop(window, property);
        }
        Ok(value)
    }

    fn write_property(
        &self,
        window: WindowId,
        property: Atom,
        type_: Atom,
        unit: UnitSize,
        bytes: &[u8],
    ) -> Result<(), TransportError> {
        let mut inner = self.server.borrow_mut();
        if !inner.windows.contains_key(&window.0) {
            return Err(TransportError::WindowGone);
        }
        inner.write_sizes.push(bytes.len());
        if let Some(limit) = inner.alloc_limit {
            if bytes.len() > limit {
                return Err(TransportError::Alloc);
            }
        }
        let key = (window.0, property.0);
        if inner.auto_consume.contains(&key) {
            inner.consumed.entry(key).or_default().push(bytes.to_vec());
            // consumed straight away; only the deletion is observable
            self.server_consume(&mut inner, window, property);
            return Ok(());
        }
        inner.store(window, property, Prop { type_, unit, bytes: bytes.to_vec() });
        Ok(())
    }

    fn delete_property(&self, window: WindowId, property: Atom) -> Result<(), TransportError> {
        let mut inner = self.server.borrow_mut();
        if !inner.windows.contains_key(&window.0) {
            return Err(TransportError::WindowGone);
        }
        inner.remove_prop(window, property);
        Ok(())
    }

    fn selection_owner(&self, selection: Atom) -> Option<WindowId> {
        self.server.borrow().owners.get(&selection.0).map(|&(w, _)| w)
    }

    fn set_selection_owner(
        &self,
        selection: Atom,
        owner: Option<WindowId>,
        time: Timestamp,
    ) -> Result<(), TransportError> {
        let mut inner = self.server.borrow_mut();
        if let Some(thief) = inner.steal_next_claim.take() {
            if owner.is_some() {
                inner.owners.insert(selection.0, (thief, SCRIPT_CONN));
                return Ok(());
            }
        }
        let prev = inner.owners.get(&selection.0).copied();
        match owner {
            Some(window) => {
                inner.owners.insert(selection.0, (window, self.conn));
                if let Some((_, prev_conn)) = prev {
                    if prev_conn != self.conn {
                        inner.push(prev_conn, Event::SelectionCleared { selection, time });
                    }
                }
            }
            None => {
                inner.owners.remove(&selection.0);
            }
        }
        Ok(())
    }

    fn request_conversion(
        &self,
        selection: Atom,
        target: Atom,
        property: Atom,
        time: Timestamp,
    ) -> Result<(), TransportError> {
        let mut inner = self.server.borrow_mut();
        let requestor = self.transfer;
        match inner.owners.get(&selection.0).copied() {
            Some((_, conn)) if conn != SCRIPT_CONN => {
                let request = ConversionRequest { requestor, selection, target, property, time };
                inner.push(conn, Event::Conversion(request));
            }
            Some(_) => {
                let reply = self.scripted_conversion(&mut inner, selection, target, property);
                inner.push(
                    self.conn,
                    Event::ConversionReply { selection, target, property: reply, time },
                );
            }
            None => {
                inner.push(
                    self.conn,
                    Event::ConversionReply { selection, target, property: None, time },
                );
            }
        }
        Ok(())
    }

    fn send_conversion_reply(
        &self,
        request: &ConversionRequest,
        property: Option<Atom>,
    ) -> Result<(), TransportError> {
        let mut inner = self.server.borrow_mut();
        let conn = match inner.windows.get(&request.requestor.0) {
            Some(win) => win.conn,
            None => return Err(TransportError::WindowGone),
        };
        inner.push(
            conn,
            Event::ConversionReply {
                selection: request.selection,
                target: request.target,
                property,
                time: request.time,
            },
        );
        Ok(())
    }

    fn watch_window(&self, window: WindowId) {
        let mut inner = self.server.borrow_mut();
        if let Some(watched) = inner.watches.get_mut(&self.conn) {
            watched.insert(window.0);
        }
    }

    fn unwatch_window(&self, window: WindowId) {
        let mut inner = self.server.borrow_mut();
        if let Some(watched) = inner.watches.get_mut(&self.conn) {
            watched.remove(&window.0);
        }
    }

    fn next_event(&self, timeout: Duration) -> Option<Event> {
        let popped = self.server.borrow_mut().queues.get_mut(&self.conn)?.pop_front();
        if popped.is_none() && !timeout.is_zero() {
            // nothing scripted left; skip straight to the deadline
            std::thread::sleep(timeout);
        }
        popped
    }

    fn root_window(&self) -> WindowId {
        self.server.borrow().root
    }

    fn child_at(&self, window: WindowId, point: Point) -> Option<WindowId> {
        let inner = self.server.borrow();
        let win = inner.windows.get(&window.0)?;
        let root_point =
            Point::new(win.rect.x.saturating_add(point.x), win.rect.y.saturating_add(point.y));
        win.children
            .iter()
            .rev()
            .find(|c| {
                inner.windows.get(&c.0).map_or(false, |child| child.rect.contains(root_point))
            })
            .copied()
    }

    fn translate_point(&self, from: WindowId, to: WindowId, point: Point) -> Option<Point> {
        let inner = self.server.borrow();
        let from = inner.windows.get(&from.0)?;
        let to = inner.windows.get(&to.0)?;
        Some(Point::new(
            from.rect.x.saturating_add(point.x).saturating_sub(to.rect.x),
            from.rect.y.saturating_add(point.y).saturating_sub(to.rect.y),
        ))
    }

    fn window_geometry(&self, window: WindowId) -> Option<Rect> {
        self.server.borrow().windows.get(&window.0).map(|w| w.rect)
    }

    fn is_local_window(&self, window: WindowId) -> bool {
        self.server.borrow().windows.get(&window.0).map_or(false, |w| w.conn == self.conn)
    }
}

impl FakeTransport {
    fn server_consume(&self, inner: &mut ServerInner, window: WindowId, property: Atom) {
        inner.notify_property(window, property, PropertyState::Deleted);
    }

    fn scripted_conversion(
        &self,
        inner: &mut ServerInner,
        selection: Atom,
        target: Atom,
        property: Atom,
    ) -> Option<Atom> {
        let _ = target;
        let requestor = self.transfer;
        match inner.conversions.get(&selection.0) {
            Some(ScriptedConversion::Refuse) | None => None,
            Some(ScriptedConversion::Oneshot { type_, unit, bytes }) => {
                let prop = Prop { type_: *type_, unit: *unit, bytes: bytes.clone() };
                inner.store(requestor, property, prop);
                Some(property)
            }
            Some(ScriptedConversion::Incremental { type_, unit, chunks }) => {
                let total: usize = chunks.iter().map(|c| c.len()).sum();
                let mut queue: VecDeque<Vec<u8>> = chunks.iter().cloned().collect();
                queue.push_back(Vec::new());
                let (type_, unit) = (*type_, *unit);
                self.install_feeder(inner, selection, property, type_, unit, queue, total, false)
            }
            Some(ScriptedConversion::Interrupted { type_, unit, chunks }) => {
                // announce more than the chunks deliver, then crash instead
                // of terminating
                let total: usize = chunks.iter().map(|c| c.len()).sum::<usize>() + 1;
                let queue: VecDeque<Vec<u8>> = chunks.iter().cloned().collect();
                let (type_, unit) = (*type_, *unit);
                self.install_feeder(inner, selection, property, type_, unit, queue, total, true)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn install_feeder(
        &self,
        inner: &mut ServerInner,
        selection: Atom,
        property: Atom,
        type_: Atom,
        unit: UnitSize,
        queue: VecDeque<Vec<u8>>,
        total: usize,
        dying: bool,
    ) -> Option<Atom> {
        let requestor = self.transfer;
        let key = (requestor.0, property.0);
        let incr = inner.intern("INCR");
        inner.feeders.insert(key, queue);
        inner.feeder_meta.insert(key, (type_, unit));
        if dying {
            if let Some(&(owner, _)) = inner.owners.get(&selection.0) {
                inner.dying_feeders.insert(key, owner);
            }
        }
        inner.store(
            requestor,
            property,
            Prop { type_: incr, unit: UnitSize::U32, bytes: (total as u32).to_ne_bytes().to_vec() },
        );
        Some(property)
    }
}

use std::cell::Cell;

use crate::selection::{ConvertedData, OfferSource};
use crate::session::{AskDialog, Buttons, DragSource, DropTargets, Modifiers, TargetId};

/// An offer source producing fixed bytes for one type and counting how often
/// the deferred resolver ran.
pub(crate) struct TestPayload {
    pub type_: Atom,
    pub bytes: Vec<u8>,
    pub resolved: Rc<Cell<u32>>,
}

impl OfferSource for TestPayload {
    fn resolve(&mut self) {
        self.resolved.set(self.resolved.get() + 1);
    }

    fn convert(&mut self, target: Atom) -> Option<ConvertedData> {
        (target == self.type_).then(|| ConvertedData {
            type_: self.type_,
            unit: UnitSize::U8,
            bytes: self.bytes.clone(),
        })
    }
}

/// Drop-target hooks with one configurable widget, recording every call.
pub(crate) struct TestTargets {
    /// The widget `locate` reports under any point, if any.
    pub target: Option<TargetId>,
    /// `None` rejects; `Some(action)` accepts with that action.
    pub accept: Option<DndAction>,
    pub log: Rc<RefCell<Vec<String>>>,
    /// Timestamp passed to the last `dropped` call.
    pub drop_time: Rc<Cell<u32>>,
}

impl TestTargets {
    pub fn new(target: Option<TargetId>, accept: Option<DndAction>) -> TestTargets {
        TestTargets {
            target,
            accept,
            log: Rc::new(RefCell::new(Vec::new())),
            drop_time: Rc::default(),
        }
    }
}

impl DropTargets for TestTargets {
    fn locate(&mut self, _window: WindowId, _point: Point) -> Option<TargetId> {
        self.target
    }

    fn will_accept(
        &mut self,
        target: TargetId,
        _types: &[Atom],
        action: DndAction,
        _time: Timestamp,
    ) -> Option<DndAction> {
        self.log.borrow_mut().push(format!("will_accept {} {action:?}", target.0));
        self.accept
    }

    fn enter(&mut self, target: TargetId) {
        self.log.borrow_mut().push(format!("enter {}", target.0));
    }

    fn leave(&mut self, target: TargetId) {
        self.log.borrow_mut().push(format!("leave {}", target.0));
    }

    fn here(&mut self, target: TargetId, point: Point) {
        self.log.borrow_mut().push(format!("here {} {},{}", target.0, point.x, point.y));
    }

    fn dropped(
        &mut self,
        target: TargetId,
        _point: Point,
        _types: &[Atom],
        action: DndAction,
        time: Timestamp,
    ) {
        self.drop_time.set(time.0);
        self.log.borrow_mut().push(format!("dropped {} {action:?}", target.0));
    }
}

/// Dragger hooks with a fixed preferred action, recording feedback.
pub(crate) struct TestDragger {
    pub action: DndAction,
    pub ask: (Vec<DndAction>, Vec<String>),
    pub log: Rc<RefCell<Vec<String>>>,
}

impl TestDragger {
    pub fn new(action: DndAction) -> TestDragger {
        TestDragger {
            action,
            ask: (Vec::new(), Vec::new()),
            log: Rc::new(RefCell::new(Vec::new())),
        }
    }
}

impl DragSource for TestDragger {
    fn preferred_action(&mut self, _: bool, _: Buttons, _: Modifiers) -> DndAction {
        self.action
    }

    fn feedback(&mut self, hovered: bool, accepted: bool, action: DndAction) {
        self.log.borrow_mut().push(format!("feedback {hovered} {accepted} {action:?}"));
    }

    fn ask_actions(&mut self) -> (Vec<DndAction>, Vec<String>) {
        self.ask.clone()
    }

    fn finished(&mut self, target: Option<WindowId>) {
        self.log.borrow_mut().push(format!("finished {:?}", target.map(|w| w.0)));
    }
}

/// Dialog that always picks the same action (or cancels).
pub(crate) struct TestDialog {
    pub pick: Option<DndAction>,
}

impl AskDialog for TestDialog {
    fn choose(
        &mut self,
        _actions: &[DndAction],
        _descriptions: &[String],
        _default: DndAction,
    ) -> Option<DndAction> {
        self.pick
    }
}
