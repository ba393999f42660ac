//! The switch core (C4): admission, routing, synthetic-message
//! generation and replier-bind-event distribution, plus one backend
//! thread per `Switch`, owning every device's mutable state.
//!
//! Grounded on the teacher's `SocketImpl` (`socket_impl.rs`): there, one
//! `SocketImpl` per socket owns its protocol state and pipes, reachable
//! only through methods called from the event-loop thread in response to
//! `SocketCmdSignal`s; here, one `DeviceState` per device owns its
//! endpoints and binding table, reachable only through `Command`s
//! dispatched from this module's backend-thread loop. The single thread
//! *is* the "single logical critical section per device" of spec §5.

use std::collections::{HashMap, VecDeque};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use log::{debug, info, warn};

use crate::binding::{BindingTable, Role};
use crate::endpoint::{Endpoint, EndpointId, Mode};
use crate::error::{Result, SwitchError};
use crate::event_loop_msg::{Command, DeviceId, Reply, Request};
use crate::message::{Flags, Message, MessageBuilder, MessageId, NetworkRef};
use crate::name::Name;
use crate::Limits;

const DEFERRED_UNBIND_CAPACITY: usize = 64;

/// A fully-validated message waiting for recipient queue space under
/// `ALL_OR_WAIT` backpressure (spec §4.2). Kept until every recipient
/// has room, or until the owning endpoint closes (cancellation, spec
/// §5).
struct PendingSend {
    sender: EndpointId,
    msg: Message,
    replier: Option<EndpointId>,
    listeners: Vec<EndpointId>,
    reply: mpsc::Sender<Reply>,
}

struct Subscriber {
    deferred_unbind: VecDeque<Message>,
    lost_notice_pending: bool,
    lost_notice_delivered_and_unread: bool,
}

impl Subscriber {
    fn new() -> Subscriber {
        Subscriber {
            deferred_unbind: VecDeque::new(),
            lost_notice_pending: false,
            lost_notice_delivered_and_unread: false,
        }
    }
}

/// One independent message bus namespace: its own endpoint ids, binding
/// table, and serial counter (spec §3, §9 "global state is per-device").
struct DeviceState {
    endpoints: HashMap<EndpointId, Endpoint>,
    bindings: BindingTable,
    next_endpoint_id: EndpointId,
    next_serial: u32,
    pending_sends: VecDeque<PendingSend>,
    subscribers: HashMap<EndpointId, Subscriber>,
    /// Tracks, for every Request awaiting a Reply, which endpoint sent
    /// it — so that if the designated replier disappears the switch
    /// knows exactly who to deliver the synthetic `Replier.GoneAway` to
    /// (spec §4.4), rather than guessing from endpoint-level counters.
    requests_awaiting_reply: HashMap<MessageId, EndpointId>,
    limits: Limits,
}

impl DeviceState {
    fn new(limits: Limits) -> DeviceState {
        DeviceState {
            endpoints: HashMap::new(),
            bindings: BindingTable::new(),
            next_endpoint_id: 1,
            next_serial: 1,
            pending_sends: VecDeque::new(),
            subscribers: HashMap::new(),
            requests_awaiting_reply: HashMap::new(),
            limits,
        }
    }

    fn endpoint_mut(&mut self, id: EndpointId) -> Result<&mut Endpoint> {
        self.endpoints
            .get_mut(&id)
            .ok_or(SwitchError::NoSuchEndpoint(id))
    }

    fn endpoint(&self, id: EndpointId) -> Result<&Endpoint> {
        self.endpoints.get(&id).ok_or(SwitchError::NoSuchEndpoint(id))
    }

    fn open(&mut self, mode: Mode) -> EndpointId {
        let id = self.next_endpoint_id;
        self.next_endpoint_id += 1;
        self.endpoints.insert(id, Endpoint::new(id, 0, mode));
        id
    }

    // -- bind / unbind, with replier-bind-event distribution ----------

    fn bind(&mut self, endpoint: EndpointId, name: &str, role: Role) -> Result<()> {
        let pattern = Name::parse_pattern(name)?;
        self.endpoints.get(&endpoint).ok_or(SwitchError::NoSuchEndpoint(endpoint))?;

        if role == Role::Replier {
            // Tentatively check conflict first so we never emit a bind
            // event for a bind that's about to fail.
            self.bindings.bind(endpoint, pattern.clone(), role)?;
            if let Err(e) = self.emit_replier_bind_event(endpoint, &pattern, true) {
                // Delivery to a subscriber failed under backpressure:
                // the bind itself does not happen (spec §4.4).
                let _ = self.bindings.unbind(endpoint, &pattern, role);
                return Err(e);
            }
            Ok(())
        } else {
            self.bindings.bind(endpoint, pattern, role)
        }
    }

    fn unbind(&mut self, endpoint: EndpointId, name: &str, role: Role) -> Result<()> {
        let pattern = Name::parse_pattern(name)?;
        self.bindings.unbind(endpoint, &pattern, role)?;
        if role == Role::Replier {
            // An explicit unbind behaves like close's implicit one: it
            // must eventually be observed, but (unlike close) there is a
            // caller we can fail synchronously, so we still try
            // immediate delivery first and only defer on backpressure.
            self.emit_replier_bind_event(endpoint, &pattern, false).ok();
            // Same as close, but the synthetic name is Replier.Unbound
            // rather than Replier.GoneAway, and only requests that were
            // routed under the pattern being unbound are affected (spec
            // §4.4) -- an endpoint may still hold other Replier bindings.
            self.synthesize_for_unbound_pattern(endpoint, &pattern);
        }
        Ok(())
    }

    fn emit_replier_bind_event(
        &mut self,
        binder: EndpointId,
        name: &Name,
        is_bind: bool,
    ) -> Result<()> {
        let event_name = Name::parse_literal("$.KBUS.ReplierBindEvent").unwrap();
        let subscribers = self.bindings.subscribers_of(&event_name);

        let mut data = Vec::with_capacity(8 + name.to_string().len() + 4);
        data.extend_from_slice(&(is_bind as u32).to_be_bytes());
        data.extend_from_slice(&binder.to_be_bytes());
        let name_bytes = name.to_string().into_bytes();
        data.extend_from_slice(&(name_bytes.len() as u32).to_be_bytes());
        data.extend_from_slice(&name_bytes);
        while data.len() % 4 != 0 {
            data.push(0);
        }

        for sub in subscribers {
            if !self
                .endpoints
                .get(&sub)
                .map(|e| e.report_replier_binds)
                .unwrap_or(false)
            {
                continue;
            }

            let msg = synthetic_message(&event_name, data.clone(), sub);
            let delivered = self
                .endpoint_mut(sub)
                .and_then(|e| e.enqueue(Arc::new(msg.clone())));

            match delivered {
                Ok(_) => continue,
                Err(_) if !is_bind => {
                    // Unbind events may never be silently dropped: park
                    // it for redelivery once the subscriber drains its
                    // queue (spec §4.4, §9 design note).
                    self.defer_unbind_event(sub, msg);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn defer_unbind_event(&mut self, subscriber: EndpointId, msg: Message) {
        let sub = self
            .subscribers
            .entry(subscriber)
            .or_insert_with(Subscriber::new);

        if sub.lost_notice_delivered_and_unread {
            // The sentinel is already sitting in the subscriber's queue,
            // unread: further unbind events are dropped until it is
            // consumed (spec §4.4).
            return;
        }

        if sub.deferred_unbind.len() >= DEFERRED_UNBIND_CAPACITY {
            sub.lost_notice_pending = true;
            return;
        }
        sub.deferred_unbind.push_back(msg);
    }

    /// Called after any dequeue from `subscriber`'s inbound queue: tries
    /// to flush deferred unbind events (and the lost-events sentinel, if
    /// one is owed) now that there may be room.
    fn flush_deferred_unbinds(&mut self, subscriber: EndpointId) {
        let lost_event_name = Name::parse_literal("$.KBUS.UnbindEventsLost").unwrap();

        loop {
            let next = match self.subscribers.get_mut(&subscriber) {
                Some(sub) => sub.deferred_unbind.front().cloned(),
                None => None,
            };
            let Some(msg) = next else { break };

            let delivered = self
                .endpoint_mut(subscriber)
                .and_then(|e| e.enqueue(Arc::new(msg)));
            match delivered {
                Ok(_) => {
                    if let Some(sub) = self.subscribers.get_mut(&subscriber) {
                        sub.deferred_unbind.pop_front();
                    }
                }
                Err(_) => break,
            }
        }

        if let Some(sub) = self.subscribers.get_mut(&subscriber) {
            if sub.lost_notice_pending && sub.deferred_unbind.is_empty() {
                let msg = synthetic_message(&lost_event_name, Vec::new(), subscriber);
                if self
                    .endpoint_mut(subscriber)
                    .and_then(|e| e.enqueue(Arc::new(msg)))
                    .is_ok()
                {
                    sub.lost_notice_pending = false;
                    sub.lost_notice_delivered_and_unread = true;
                }
            }
        }
    }

    // -- send / routing (spec §4.4) ------------------------------------

    fn send(
        &mut self,
        sender: EndpointId,
        builder: MessageBuilder,
        reply_tx: mpsc::Sender<Reply>,
    ) -> Result<Option<MessageId>> {
        let msg = builder.build(&self.limits)?;

        if msg.is_reply() {
            let id = self.send_reply(sender, msg)?;
            return Ok(Some(id));
        }

        let resolution = self.bindings.resolve(&msg.name);

        if msg.is_request() {
            self.send_request(sender, msg, resolution, reply_tx)
        } else {
            self.send_announcement(sender, msg, resolution, reply_tx)
        }
    }

    fn send_reply(&mut self, sender: EndpointId, mut msg: Message) -> Result<MessageId> {
        let to = msg.to;
        // The obligation being discharged lives on `sender` -- the
        // designated Replier who read the Request with `WANT_YOU_TO_REPLY`
        // set (`deliver_request` inserts into the replier's own
        // `unreplied_requests`, not the original requester's). `to` is
        // just the addressee the Reply is being delivered to.
        let was_expected = self
            .endpoint_mut(sender)
            .map(|e| e.unreplied_requests.contains_key(&msg.in_reply_to))
            .unwrap_or(false);
        if !was_expected {
            return Err(SwitchError::ConnectionRefused);
        }

        msg.id = self.stamp_id(msg.id);
        msg.from = sender;
        let id = msg.id;

        self.endpoint_mut(sender)?.unreplied_requests.remove(&msg.in_reply_to);
        if let Some(s) = self.endpoints.get_mut(&to) {
            if s.outstanding_sent_requests > 0 {
                s.outstanding_sent_requests -= 1;
            }
        }
        self.requests_awaiting_reply.remove(&msg.in_reply_to);
        self.endpoint_mut(to)?.enqueue(Arc::new(msg))?;
        self.endpoint_mut(sender)?.record_sent_id(id);
        Ok(id)
    }

    fn send_request(
        &mut self,
        sender: EndpointId,
        mut msg: Message,
        resolution: crate::binding::Resolution,
        reply_tx: mpsc::Sender<Reply>,
    ) -> Result<Option<MessageId>> {
        let replier = match resolution.replier {
            Some(r) => r,
            None => return Err(SwitchError::AddressNotAvailable(msg.name.to_string())),
        };

        if let Some(expected_to) = non_zero(msg.to) {
            if expected_to != replier {
                return Err(SwitchError::AddressNotAvailable(msg.name.to_string()));
            }
        }

        {
            let s = self.endpoint_mut(sender)?;
            if s.num_messages() as isize
                >= s.max_messages() as isize - s.outstanding_sent_requests as isize
            {
                return Err(SwitchError::NoLocks);
            }
        }

        msg.id = self.stamp_id(msg.id);
        msg.from = sender;
        msg.to = replier;
        let id = msg.id;

        let all_or_wait = msg.flags.contains(Flags::ALL_OR_WAIT);
        let all_or_fail = msg.flags.contains(Flags::ALL_OR_FAIL);

        let fits = self.recipients_have_room(sender, &resolution.listeners, replier, true);

        if !fits {
            if all_or_fail || !all_or_wait {
                // Replier queue full is always Busy for a request, even
                // under default flags (spec §4.2).
                return Err(SwitchError::Busy);
            }
            self.endpoint_mut(sender)?.outstanding_sent_requests += 1;
            self.requests_awaiting_reply.insert(id, sender);
            self.pending_sends.push_back(PendingSend {
                sender,
                msg,
                replier: Some(replier),
                listeners: resolution.listeners,
                reply: reply_tx,
            });
            return Ok(None);
        }

        self.endpoint_mut(sender)?.outstanding_sent_requests += 1;
        self.endpoint_mut(sender)?.record_sent_id(id);
        self.requests_awaiting_reply.insert(id, sender);
        self.deliver_request(sender, &msg, replier, &resolution.listeners);
        Ok(Some(id))
    }

    fn send_announcement(
        &mut self,
        sender: EndpointId,
        mut msg: Message,
        resolution: crate::binding::Resolution,
        reply_tx: mpsc::Sender<Reply>,
    ) -> Result<Option<MessageId>> {
        msg.id = self.stamp_id(msg.id);
        msg.from = sender;
        let id = msg.id;

        let all_or_wait = msg.flags.contains(Flags::ALL_OR_WAIT);
        let all_or_fail = msg.flags.contains(Flags::ALL_OR_FAIL);

        if all_or_fail || all_or_wait {
            let fits = self.recipients_have_room(sender, &resolution.listeners, sender, false);
            if !fits {
                if all_or_fail {
                    return Err(SwitchError::Busy);
                }
                self.pending_sends.push_back(PendingSend {
                    sender,
                    msg,
                    replier: None,
                    listeners: resolution.listeners,
                    reply: reply_tx,
                });
                return Ok(None);
            }
        }

        let shared = Arc::new(msg);
        for listener in &resolution.listeners {
            if let Ok(e) = self.endpoint_mut(*listener) {
                // Default (non-all-or-*) flags: a full queue is simply
                // skipped, never an error (spec §4.2).
                let _ = e.enqueue(shared.clone());
            }
        }
        self.endpoint_mut(sender)?.record_sent_id(id);
        Ok(Some(id))
    }

    fn recipients_have_room(
        &self,
        _origin: EndpointId,
        listeners: &[EndpointId],
        replier: EndpointId,
        include_replier: bool,
    ) -> bool {
        if include_replier {
            if !self.endpoints.get(&replier).map(|e| e.has_room()).unwrap_or(false) {
                return false;
            }
        }
        listeners
            .iter()
            .all(|l| self.endpoints.get(l).map(|e| e.has_room()).unwrap_or(true))
    }

    fn deliver_request(
        &mut self,
        sender: EndpointId,
        msg: &Message,
        replier: EndpointId,
        listeners: &[EndpointId],
    ) {
        let mut replier_copy = msg.clone();
        replier_copy.flags.insert(Flags::WANT_YOU_TO_REPLY);
        let id = replier_copy.id;

        if let Ok(e) = self.endpoint_mut(replier) {
            if e.enqueue(Arc::new(replier_copy)).is_ok() {
                e.unreplied_requests.insert(id, msg.name.clone());
            }
        }

        // An endpoint holding both the Replier and a Listener binding for
        // this name gets two queued copies — the Replier copy above (with
        // `WANT_YOU_TO_REPLY`) and its own Listener copy here, in that
        // order (spec.md §9, preserved per OQ-1 in DESIGN.md).
        let listener_copy = Arc::new(msg.clone());
        for l in listeners {
            if let Ok(e) = self.endpoint_mut(*l) {
                let _ = e.enqueue(listener_copy.clone());
            }
        }

        debug!(
            "[device] request {:?} from {} routed to replier {}",
            id, sender, replier
        );
    }

    fn stamp_id(&mut self, id: MessageId) -> MessageId {
        if id.network_id == 0 {
            let serial = self.next_serial;
            self.next_serial += 1;
            MessageId {
                network_id: 0,
                serial,
            }
        } else {
            id
        }
    }

    fn retry_pending_sends(&mut self) {
        let mut still_pending = VecDeque::new();
        while let Some(p) = self.pending_sends.pop_front() {
            let fits = match p.replier {
                Some(r) => self.recipients_have_room(p.sender, &p.listeners, r, true),
                None => self.recipients_have_room(p.sender, &p.listeners, p.sender, false),
            };
            if !fits {
                still_pending.push_back(p);
                continue;
            }
            let id = p.msg.id;
            match p.replier {
                Some(r) => {
                    self.deliver_request(p.sender, &p.msg, r, &p.listeners);
                }
                None => {
                    let shared = Arc::new(p.msg);
                    for l in &p.listeners {
                        if let Ok(e) = self.endpoint_mut(*l) {
                            let _ = e.enqueue(shared.clone());
                        }
                    }
                }
            }
            if let Ok(e) = self.endpoint_mut(p.sender) {
                e.record_sent_id(id);
            }
            let _ = p.reply.send(Reply::Sent(id));
        }
        self.pending_sends = still_pending;
    }

    // -- close (spec §4.4) ----------------------------------------------

    fn close(&mut self, endpoint: EndpointId) {
        let removed_bindings = self.bindings.remove_endpoint(endpoint);
        self.pending_sends.retain(|p| p.sender != endpoint);
        self.subscribers.remove(&endpoint);
        // Requests this endpoint sent and is no longer around to receive
        // a reply (or a GoneAway) for are simply forgotten.
        self.requests_awaiting_reply.retain(|_, sender| *sender != endpoint);

        if let Some(ep) = self.endpoints.remove(&endpoint) {
            // For every outstanding obligation where this endpoint was
            // the expected replier, synthesize Replier.GoneAway to each
            // original sender (spec §4.4).
            for req_id in ep.unreplied_requests.into_keys() {
                self.synthesize_reply_failure(endpoint, req_id, "$.KBUS.Replier.GoneAway");
            }
        }

        for (name, role) in removed_bindings {
            if role == Role::Replier {
                self.emit_replier_bind_event(endpoint, &name, false).ok();
            }
        }

        info!("endpoint {} closed", endpoint);
    }

    /// Explicit Replier unbind (spec §4.4): synthesizes `Replier.Unbound`
    /// to the original sender of every outstanding request this endpoint
    /// accepted under `pattern` specifically, leaving any obligations
    /// under a different, still-bound Replier pattern untouched.
    fn synthesize_for_unbound_pattern(&mut self, endpoint: EndpointId, pattern: &Name) {
        let matching: Vec<MessageId> = match self.endpoints.get(&endpoint) {
            Some(e) => e
                .unreplied_requests
                .iter()
                .filter(|(_, name)| pattern.matches_literal(name))
                .map(|(id, _)| *id)
                .collect(),
            None => return,
        };

        for req_id in matching {
            if let Some(e) = self.endpoints.get_mut(&endpoint) {
                e.unreplied_requests.remove(&req_id);
            }
            self.synthesize_reply_failure(endpoint, req_id, "$.KBUS.Replier.Unbound");
        }
    }

    fn synthesize_reply_failure(&mut self, from: EndpointId, in_reply_to: MessageId, name: &str) {
        let target = match self.requests_awaiting_reply.remove(&in_reply_to) {
            Some(sender) => sender,
            None => return,
        };

        let event_name = Name::parse_literal(name).unwrap();
        let mut msg = synthetic_message(&event_name, Vec::new(), target);
        msg.in_reply_to = in_reply_to;
        msg.from = from;
        if let Ok(e) = self.endpoint_mut(target) {
            if e.enqueue(Arc::new(msg)).is_ok() && e.outstanding_sent_requests > 0 {
                e.outstanding_sent_requests -= 1;
            }
        }
    }
}

fn non_zero(v: u32) -> Option<u32> {
    if v == 0 {
        None
    } else {
        Some(v)
    }
}

fn synthetic_message(name: &Name, data: Vec<u8>, to: EndpointId) -> Message {
    Message {
        id: MessageId::UNSET,
        in_reply_to: MessageId::UNSET,
        to,
        from: 0,
        orig_from: NetworkRef::UNSET,
        final_to: NetworkRef::UNSET,
        flags: Flags::SYNTHETIC,
        name: name.clone(),
        data,
    }
}

/// Owns the backend thread for one `Switch`: a process may host several
/// independent devices (spec §3, §9), each a `DeviceState` keyed by
/// `DeviceId` inside this single thread's loop.
pub struct SwitchCore {
    devices: HashMap<DeviceId, DeviceState>,
    next_device: DeviceId,
    limits: Limits,
}

impl SwitchCore {
    fn new(limits: Limits) -> SwitchCore {
        let mut core = SwitchCore {
            devices: HashMap::new(),
            next_device: 0,
            limits,
        };
        core.create_device();
        core
    }

    fn create_device(&mut self) -> DeviceId {
        let id = self.next_device;
        self.next_device += 1;
        self.devices.insert(id, DeviceState::new(self.limits.clone()));
        id
    }

    /// Spawns the backend thread and returns the channel to send
    /// requests to it.
    pub fn spawn(limits: Limits) -> mpsc::Sender<Request> {
        let (tx, rx) = mpsc::channel::<Request>();
        thread::Builder::new()
            .name("kswitch-backend".to_owned())
            .spawn(move || {
                let mut core = SwitchCore::new(limits);
                for req in rx {
                    core.handle(req);
                }
            })
            .expect("failed to spawn switch backend thread");
        tx
    }

    fn handle(&mut self, req: Request) {
        let Request {
            device,
            command,
            reply,
        } = req;

        // Device creation is a Switch-level operation (spec §9, "a device
        // factory creates new devices on demand"), not something routed
        // through any single device's own command stream, so it is
        // handled here rather than in `dispatch`.
        if let Command::CreateNewDevice = command {
            let id = self.create_device();
            let _ = reply.send(Reply::DeviceCreated(id));
            return;
        }

        let dev = match self.devices.get_mut(&device) {
            Some(d) => d,
            None => {
                let _ = reply.send(Reply::Err(SwitchError::NoSuchDevice(device)));
                return;
            }
        };

        let result = dispatch(dev, device, command, reply.clone());
        match result {
            Ok(Some(r)) => {
                let _ = reply.send(r);
            }
            Ok(None) => {
                // Reply deferred (e.g. parked under ALL_OR_WAIT); the
                // backend will send it later from `retry_pending_sends`.
            }
            Err(e) => {
                let _ = reply.send(Reply::Err(e));
            }
        }
    }
}

fn dispatch(
    dev: &mut DeviceState,
    device_id: DeviceId,
    command: Command,
    reply_tx: mpsc::Sender<Reply>,
) -> Result<Option<Reply>> {
    use Command::*;

    match command {
        Open { mode } => Ok(Some(Reply::Opened(dev.open(mode)))),
        Close { endpoint } => {
            dev.close(endpoint);
            Ok(Some(Reply::Closed))
        }
        Bind { endpoint, name, role } => {
            dev.bind(endpoint, &name, role)?;
            Ok(Some(Reply::Bound))
        }
        Unbind { endpoint, name, role } => {
            dev.unbind(endpoint, &name, role)?;
            Ok(Some(Reply::Unbound))
        }
        StartWrite { endpoint, name } => {
            let pattern = Name::parse_literal(&name)?;
            dev.endpoint_mut(endpoint)?.start_write(pattern)?;
            Ok(Some(Reply::Written))
        }
        Write { endpoint, data } => {
            dev.endpoint_mut(endpoint)?.append_write(&data)?;
            Ok(Some(Reply::Written))
        }
        SetWriteOptions {
            endpoint,
            to,
            in_reply_to,
            flags,
            final_to,
        } => {
            dev.endpoint_mut(endpoint)?
                .set_write_options(to, in_reply_to, flags, final_to)?;
            Ok(Some(Reply::Written))
        }
        Send { endpoint } => {
            let builder = dev.endpoint_mut(endpoint)?.take_composed()?;
            match dev.send(endpoint, builder, reply_tx)? {
                Some(id) => {
                    dev.retry_pending_sends();
                    Ok(Some(Reply::Sent(id)))
                }
                None => Ok(None),
            }
        }
        Discard { endpoint } => {
            dev.endpoint_mut(endpoint)?.discard();
            Ok(Some(Reply::Discarded))
        }
        NextMessageLength { endpoint } => {
            let len = dev.endpoint_mut(endpoint)?.next_message_length();
            Ok(Some(Reply::MessageLength(len)))
        }
        BytesLeftInCurrent { endpoint } => {
            let left = dev.endpoint(endpoint)?.bytes_left_in_current();
            Ok(Some(Reply::BytesLeft(left)))
        }
        ReadBytes { endpoint, n } => {
            let bytes = dev.endpoint_mut(endpoint)?.read_bytes(n)?;
            dev.flush_deferred_unbinds(endpoint);
            dev.retry_pending_sends();
            Ok(Some(Reply::Bytes(bytes)))
        }
        LastSentId { endpoint } => Ok(Some(Reply::LastSentId(dev.endpoint(endpoint)?.last_sent_id()))),
        FindReplier { name } => {
            let literal = Name::parse_literal(&name)?;
            Ok(Some(Reply::Replier(dev.bindings.replier_for(&literal))))
        }
        SetMaxMessages { endpoint, n } => {
            dev.endpoint_mut(endpoint)?.set_max_messages(n)?;
            Ok(Some(Reply::MaxMessagesSet))
        }
        GetMaxMessages { endpoint } => {
            Ok(Some(Reply::MaxMessages(dev.endpoint(endpoint)?.max_messages())))
        }
        NumMessages { endpoint } => Ok(Some(Reply::Count(dev.endpoint(endpoint)?.num_messages()))),
        NumUnrepliedTo { endpoint } => {
            Ok(Some(Reply::Count(dev.endpoint(endpoint)?.unreplied_requests.len())))
        }
        SetOnlyOnce { endpoint, value } => {
            dev.endpoint_mut(endpoint)?.only_once = value;
            Ok(Some(Reply::FlagSet))
        }
        GetOnlyOnce { endpoint } => Ok(Some(Reply::BoolValue(dev.endpoint(endpoint)?.only_once))),
        SetReportReplierBinds { endpoint, value } => {
            dev.endpoint_mut(endpoint)?.report_replier_binds = value;
            Ok(Some(Reply::FlagSet))
        }
        GetReportReplierBinds { endpoint } => {
            Ok(Some(Reply::BoolValue(dev.endpoint(endpoint)?.report_replier_binds)))
        }
        SetVerbose { endpoint, value } => {
            dev.endpoint_mut(endpoint)?.verbose = value;
            Ok(Some(Reply::FlagSet))
        }
        GetVerbose { endpoint } => Ok(Some(Reply::BoolValue(dev.endpoint(endpoint)?.verbose))),
        CreateNewDevice => {
            warn!("create_new_device requested from within an existing device's command stream; devices are created at the Switch level");
            Err(SwitchError::Invalid(
                "create_new_device must be issued through Switch, not an endpoint",
            ))
        }
        Introspect => Ok(Some(Reply::Introspection(crate::introspect::render(
            dev.bindings.rows(),
            device_id,
        )))),
        ProxyReplierBind { endpoint, name, bind } => {
            if bind {
                dev.bind(endpoint, &name, Role::Replier)?;
            } else {
                dev.unbind(endpoint, &name, Role::Replier)?;
            }
            Ok(Some(Reply::Bound))
        }
        CheckReplierIs { name, expected } => {
            let literal = Name::parse_literal(&name)?;
            let current = dev.bindings.replier_for(&literal);
            Ok(Some(Reply::ReplierIs(current == Some(expected))))
        }
        ProxySetPresetId { endpoint, id } => {
            dev.endpoint_mut(endpoint)?.set_preset_id(id)?;
            Ok(Some(Reply::Written))
        }
    }
}
