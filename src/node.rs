//! Round-lifecycle driver
//!
//! A running [`Node`] is two tasks sharing one locked [`NodeState`]: a timer task that ticks
//! rounds at the root and fires phase, heartbeat and view-change deadlines, and an inbound
//! task that feeds received messages to the current round. Every handler runs to completion
//! under the lock and leaves what it wants sent in an [`Outbox`], which is flushed after the
//! lock is released.
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::CosiConfig;
use crate::error::{DriverError, RoundError};
use crate::group::{GroupPoint, KeyPair};
use crate::messages::{MessageBody, SignatureBroadcastMessage, SigningMessage};
use crate::payload::{Delivery, EmptyPayload, Payload, PayloadSource};
use crate::round::{Round, RoundKind, RoundPhase};
use crate::stats::RoundStats;
use crate::transport::{Inbox, Transport};
use crate::tree::{NodeId, Roster, Tree};
use crate::view::{Majority, QuorumRule, Role, ViewState, VoteTally};

/// What a node reports about its own progress.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeEvent {
    RoundStarted {
        view: u64,
        round: u64,
    },
    RoundCompleted {
        view: u64,
        round: u64,
        broadcast: SignatureBroadcastMessage,
    },
    RoundAbandoned {
        view: u64,
        round: u64,
    },
    /// We asked for `view` after losing our parent.
    VoteRaised {
        view: u64,
    },
    ViewChanged {
        view: u64,
        role: Role,
    },
    Closed,
}

pub struct Node {
    id: NodeId,
    key: KeyPair,
    roster: Roster,
    config: CosiConfig,
    kind: RoundKind,
    transport: Arc<dyn Transport>,
    payload: Box<dyn PayloadSource>,
    quorum: Box<dyn QuorumRule>,
    stats: Option<RoundStats>,
}

impl Node {
    pub fn new(
        id: NodeId,
        key: KeyPair,
        roster: Roster,
        config: CosiConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Node, DriverError> {
        config.validate()?;
        if !roster.contains(id) {
            return Err(DriverError::NotAMember(id));
        }
        Ok(Node {
            id,
            key,
            roster,
            kind: config.round_kind()?,
            config,
            transport,
            payload: Box::new(EmptyPayload),
            quorum: Box::new(Majority),
            stats: None,
        })
    }

    pub fn with_payload(mut self, payload: impl PayloadSource + 'static) -> Self {
        self.payload = Box::new(payload);
        self
    }

    pub fn with_quorum(mut self, quorum: impl QuorumRule + 'static) -> Self {
        self.quorum = Box::new(quorum);
        self
    }

    pub fn with_stats(mut self, stats: RoundStats) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Spawn the timer and inbound tasks and return a handle to the running node.
    pub fn run(self, inbox: Inbox) -> Result<NodeHandle, DriverError> {
        let tree = Tree::for_view(&self.roster, 0, self.config.branching_factor)
            .ok_or(DriverError::NotAMember(self.id))?;
        let view = ViewState::new(tree, Instant::now() + self.config.heartbeat_timeout());
        let role = view.role_of(self.id);

        let (events, event_receiver) = unbounded_channel();
        let (role_sender, role_receiver) = watch::channel(role);
        let (shutdown, _) = watch::channel(false);

        let shared = Arc::new(Shared {
            ctx: Context {
                id: self.id,
                key: self.key,
                roster: self.roster,
                config: self.config,
                kind: self.kind,
                quorum: self.quorum,
                stats: self.stats,
            },
            state: Mutex::new(NodeState {
                view,
                tally: VoteTally::default(),
                round: None,
                round_deadline: None,
                missed: 0,
                rounds_started: 0,
                last_excluded: Vec::new(),
                status_sent: false,
                payload: self.payload,
                closed: false,
                fatal: None,
            }),
            transport: self.transport,
            events,
            role: role_sender,
            shutdown,
            wake: Notify::new(),
        });
        info!(node = %self.id, ?role, "node starting");

        let timer = tokio::spawn(run_timer(shared.clone()));
        let inbound = tokio::spawn(run_inbound(shared.clone(), inbox));
        Ok(NodeHandle {
            id: self.id,
            shared,
            events: event_receiver,
            role: role_receiver,
            timer,
            inbound,
        })
    }
}

pub struct NodeHandle {
    id: NodeId,
    shared: Arc<Shared>,
    events: UnboundedReceiver<NodeEvent>,
    role: watch::Receiver<Role>,
    timer: JoinHandle<Result<(), DriverError>>,
    inbound: JoinHandle<Result<(), DriverError>>,
}

impl NodeHandle {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn role(&self) -> Role {
        *self.role.borrow()
    }

    /// Follow role changes as views change.
    pub fn role_watch(&self) -> watch::Receiver<Role> {
        self.role.clone()
    }

    pub fn view(&self) -> u64 {
        self.shared.lock().view.view()
    }

    pub async fn next_event(&mut self) -> Option<NodeEvent> {
        self.events.recv().await
    }

    /// An event that has already been reported, without waiting for more.
    pub fn try_next_event(&mut self) -> Option<NodeEvent> {
        self.events.try_recv().ok()
    }

    pub fn shutdown(&self) {
        self.shared.shutdown.send_replace(true);
    }

    /// Wait for both tasks; the error is the reason the node stopped, if it did not stop
    /// cleanly.
    pub async fn join(self) -> Result<(), DriverError> {
        let timer = self.timer.await?;
        let inbound = self.inbound.await?;
        timer.and(inbound)
    }
}

struct Context {
    id: NodeId,
    key: KeyPair,
    roster: Roster,
    config: CosiConfig,
    kind: RoundKind,
    quorum: Box<dyn QuorumRule>,
    stats: Option<RoundStats>,
}

struct Shared {
    ctx: Context,
    state: Mutex<NodeState>,
    transport: Arc<dyn Transport>,
    events: UnboundedSender<NodeEvent>,
    role: watch::Sender<Role>,
    shutdown: watch::Sender<bool>,
    wake: Notify,
}

struct NodeState {
    view: ViewState,
    tally: VoteTally,
    round: Option<Round>,
    round_deadline: Option<Instant>,
    missed: u32,
    rounds_started: u64,
    /// Keys excluded from the last signature this node saw in the current view.
    last_excluded: Vec<GroupPoint>,
    status_sent: bool,
    payload: Box<dyn PayloadSource>,
    closed: bool,
    fatal: Option<DriverError>,
}

/// Side effects of one handler, applied once the state lock is released.
#[derive(Default)]
struct Outbox {
    messages: Vec<SigningMessage>,
    events: Vec<NodeEvent>,
    role: Option<Role>,
    close: bool,
}

async fn run_timer(shared: Arc<Shared>) -> Result<(), DriverError> {
    let mut shutdown = shared.shutdown.subscribe();
    let mut ticker = interval(shared.ctx.config.round_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let deadline = shared.lock().next_deadline(shared.ctx.id);
        let sleep = async move {
            match deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            _ = ticker.tick() => shared.handle(|state, ctx, out| state.on_tick(ctx, out, Instant::now())),
            _ = sleep => shared.handle(|state, ctx, out| state.on_deadline(ctx, out, Instant::now())),
            _ = shared.wake.notified() => {}
            _ = shutdown.changed() => {}
        }

        if let Some(fatal) = shared.lock().fatal.take() {
            error!(node = %shared.ctx.id, error = %fatal, "driver stopped");
            shared.shutdown.send_replace(true);
            return Err(fatal);
        }
        if *shutdown.borrow() || shared.lock().closed {
            debug!(node = %shared.ctx.id, "timer stopped");
            return Ok(());
        }
    }
}

async fn run_inbound(shared: Arc<Shared>, mut inbox: Inbox) -> Result<(), DriverError> {
    let mut shutdown = shared.shutdown.subscribe();
    loop {
        tokio::select! {
            message = inbox.recv() => match message {
                Some(message) => {
                    shared.handle(|state, ctx, out| state.on_message(ctx, out, message, Instant::now()));
                    shared.wake.notify_one();
                }
                None => {
                    debug!(node = %shared.ctx.id, "network gone");
                    return Ok(());
                }
            },
            _ = shutdown.changed() => {}
        }
        if *shutdown.borrow() {
            debug!(node = %shared.ctx.id, "inbound stopped");
            return Ok(());
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, NodeState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn handle(&self, f: impl FnOnce(&mut NodeState, &Context, &mut Outbox)) {
        let mut out = Outbox::default();
        {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            f(&mut *state, &self.ctx, &mut out);
        }
        self.flush(out);
    }

    fn flush(&self, out: Outbox) {
        for message in out.messages {
            let (to, kind) = (message.to, message.body.name());
            if let Err(e) = self.transport.send(message) {
                debug!(node = %self.ctx.id, %to, kind, error = %e, "send failed");
            }
        }
        if let Some(role) = out.role {
            self.role.send_replace(role);
        }
        for event in out.events {
            // nobody listening is fine
            let _ = self.events.send(event);
        }
        if out.close {
            self.shutdown.send_replace(true);
        }
    }
}

impl NodeState {
    fn next_deadline(&self, id: NodeId) -> Option<Instant> {
        let heartbeat = match self.view.pending() {
            Some(pending) => Some(pending.deadline),
            None if self.view.role_of(id) == Role::Regular => Some(self.view.heartbeat_deadline()),
            None => None,
        };
        [heartbeat, self.round_deadline].into_iter().flatten().min()
    }

    fn is_root(&self, ctx: &Context) -> bool {
        self.view.role_of(ctx.id) == Role::Root
    }

    fn message(&self, ctx: &Context, to: NodeId, round: u64, body: MessageBody) -> SigningMessage {
        SigningMessage {
            from: ctx.id,
            to,
            view: self.view.view(),
            round,
            last_seen_vote: self.view.last_seen_vote(),
            body,
        }
    }

    fn to_children(&self, ctx: &Context, out: &mut Outbox, round: u64, body: &MessageBody) {
        for child in self.view.tree().children_of(ctx.id) {
            out.messages.push(self.message(ctx, child, round, body.clone()));
        }
    }

    fn to_parent(&self, ctx: &Context, out: &mut Outbox, round: u64, body: MessageBody) {
        if let Some(parent) = self.view.parent_of(ctx.id) {
            out.messages.push(self.message(ctx, parent, round, body));
        }
    }

    fn round_in_flight(&self) -> bool {
        self.round
            .as_ref()
            .map_or(false, |round| round.phase() < RoundPhase::Finalized)
    }

    fn on_tick(&mut self, ctx: &Context, out: &mut Outbox, now: Instant) {
        if !self.is_root(ctx) || self.view.pending().is_some() {
            return;
        }
        if self.round_in_flight() {
            self.missed += 1;
            if self.missed < ctx.config.max_missed_deadlines {
                return;
            }
            self.abandon_round(ctx, out);
        }
        if let Some(max_rounds) = ctx.config.max_rounds {
            if self.rounds_started >= max_rounds {
                info!(node = %ctx.id, rounds = self.rounds_started, "all rounds done, closing the tree");
                self.to_children(ctx, out, self.rounds_started, &MessageBody::CloseAll);
                self.close(ctx, out);
                return;
            }
        }
        self.start_round_as_root(ctx, out, now);
    }

    fn start_round_as_root(&mut self, ctx: &Context, out: &mut Outbox, now: Instant) {
        let view = self.view.view();
        let number = self.rounds_started + 1;
        let payload = self.seal_payload(ctx.kind, view, number);
        let mut round = match Round::start(self.view.tree(), ctx.id, &ctx.key, number, ctx.kind, payload) {
            Ok(round) => round,
            Err(e) => {
                error!(node = %ctx.id, view, round = number, error = %e, "could not start round");
                return;
            }
        };
        let announcement = match round.create_announcement(unix_millis()) {
            Ok(announcement) => announcement,
            Err(e) => {
                error!(node = %ctx.id, view, round = number, error = %e, "could not announce round");
                return;
            }
        };

        self.rounds_started = number;
        self.missed = 0;
        self.status_sent = false;
        self.round = Some(round);
        self.round_deadline = Some(now + ctx.config.phase_timeout(self.height(ctx)));
        if let Some(stats) = &ctx.stats {
            stats.record_started(number);
        }
        info!(node = %ctx.id, view, round = number, "announcing round");
        out.events.push(NodeEvent::RoundStarted { view, round: number });
        self.to_children(ctx, out, number, &MessageBody::Announcement(announcement));
        self.advance(ctx, out, now);
    }

    fn on_deadline(&mut self, ctx: &Context, out: &mut Outbox, now: Instant) {
        if let Some(pending) = self.view.pending() {
            if now >= pending.deadline {
                if pending.attempts >= ctx.config.max_view_change_attempts {
                    self.fatal = Some(DriverError::ViewChangeExhausted {
                        attempts: pending.attempts,
                    });
                    self.close(ctx, out);
                    return;
                }
                warn!(node = %ctx.id, view = pending.proposed, "view change timed out, proposing the next");
                self.raise_vote(ctx, out, pending.proposed + 1, now);
            }
        } else if !self.is_root(ctx) && now >= self.view.heartbeat_deadline() {
            warn!(node = %ctx.id, view = self.view.view(), "no heartbeat from parent");
            self.raise_vote(ctx, out, self.view.view() + 1, now);
        }

        if self.round_deadline.map_or(false, |deadline| now >= deadline) {
            self.advance(ctx, out, now);
        }
    }

    fn raise_vote(&mut self, ctx: &Context, out: &mut Outbox, proposed: u64, now: Instant) {
        self.view.propose(proposed, now, ctx.config.view_change_timeout());
        out.events.push(NodeEvent::VoteRaised { view: proposed });
        self.send_vote(ctx, out, proposed);
        self.count_vote(ctx, out, proposed, ctx.id, now);
    }

    fn send_vote(&self, ctx: &Context, out: &mut Outbox, proposed: u64) {
        for member in ctx.roster.ids().filter(|member| *member != ctx.id) {
            let mut vote = self.message(ctx, member, 0, MessageBody::ViewChangeVote { view: proposed });
            vote.view = proposed;
            out.messages.push(vote);
        }
    }

    /// Whether the last signature excluded the whole subtree of `voter`'s parent, i.e. this
    /// node has seen for itself that the parent dropped out.
    fn saw_parent_fail(&self, voter: NodeId) -> bool {
        let tree = self.view.tree();
        tree.parent_of(voter)
            .map_or(false, |parent| self.last_excluded.contains(&tree.subtree_public(parent)))
    }

    fn count_vote(&mut self, ctx: &Context, out: &mut Outbox, view: u64, voter: NodeId, now: Instant) {
        if view <= self.view.view() {
            return;
        }
        self.view.note_vote(view);
        let votes = self.tally.record(view, voter);
        debug!(node = %ctx.id, view, %voter, votes, "view change vote");
        if ctx.roster.root_for(view) == Some(ctx.id) && ctx.quorum.reached(votes, ctx.roster.len()) {
            for member in ctx.roster.ids().filter(|member| *member != ctx.id) {
                let mut changed = self.message(ctx, member, 0, MessageBody::ViewChanged { view });
                changed.view = view;
                out.messages.push(changed);
            }
            return self.change_view(ctx, out, view, now);
        }
        if voter != ctx.id && !self.tally.has_voted(view, ctx.id) && self.saw_parent_fail(voter) {
            info!(node = %ctx.id, view, %voter, "parent of the voter was excluded, seconding");
            self.send_vote(ctx, out, view);
            self.count_vote(ctx, out, view, ctx.id, now);
        }
    }

    fn change_view(&mut self, ctx: &Context, out: &mut Outbox, view: u64, now: Instant) {
        if self.round_in_flight() {
            self.abandon_round(ctx, out);
        }
        self.round = None;
        self.round_deadline = None;
        self.last_excluded.clear();
        if !self
            .view
            .apply(&ctx.roster, view, ctx.config.branching_factor, now + ctx.config.heartbeat_timeout())
        {
            error!(node = %ctx.id, view, "no tree for view");
            return;
        }
        self.tally.settle(view);
        let role = self.view.role_of(ctx.id);
        info!(node = %ctx.id, view, ?role, "view changed");
        out.role = Some(role);
        out.events.push(NodeEvent::ViewChanged { view, role });
    }

    fn on_message(&mut self, ctx: &Context, out: &mut Outbox, message: SigningMessage, now: Instant) {
        let SigningMessage {
            from,
            view,
            round: number,
            last_seen_vote,
            body,
            ..
        } = message;
        self.view.note_vote(last_seen_vote);

        match body {
            MessageBody::ViewChangeVote { view: proposed } => {
                return self.count_vote(ctx, out, proposed, from, now);
            }
            MessageBody::ViewChanged { view: changed } => {
                if changed > self.view.view() && ctx.roster.root_for(changed) == Some(from) {
                    self.change_view(ctx, out, changed, now);
                }
                return;
            }
            _ => {}
        }

        if view != self.view.view() {
            debug!(node = %ctx.id, %from, view, current = self.view.view(), kind = body.name(), "stale view, ignored");
            return;
        }
        let from_parent = self.view.parent_of(ctx.id) == Some(from);
        if from_parent {
            self.view.reset_heartbeat(now + ctx.config.heartbeat_timeout());
            if let Some(pending) = self.view.cancel_pending() {
                info!(node = %ctx.id, %from, proposed = pending.proposed, "parent is back, dropping view change");
            }
        }

        match body {
            MessageBody::Announcement(announcement) if from_parent => {
                if self.round.as_ref().map_or(false, |round| round.number() == number) {
                    return;
                }
                if self.round_in_flight() {
                    self.abandon_round(ctx, out);
                }
                let view = self.view.view();
                let payload = self.seal_payload(announcement.kind, view, number);
                let result = Round::start(self.view.tree(), ctx.id, &ctx.key, number, announcement.kind, payload)
                    .and_then(|mut round| {
                        let relay = round.announce(announcement.announcement)?;
                        Ok((round, relay))
                    });
                match result {
                    Ok((round, relay)) => {
                        debug!(node = %ctx.id, view, round = number, "announced");
                        self.round = Some(round);
                        self.rounds_started = self.rounds_started.max(number);
                        self.status_sent = false;
                        self.round_deadline = Some(now + ctx.config.phase_timeout(self.height(ctx)));
                        out.events.push(NodeEvent::RoundStarted { view, round: number });
                        self.to_children(ctx, out, number, &MessageBody::Announcement(relay));
                    }
                    Err(e) => warn!(node = %ctx.id, view, round = number, error = %e, "could not join round"),
                }
            }
            MessageBody::Commitment(commitment) => {
                if let Some(round) = self.current_round(number) {
                    if let Err(e) = round.absorb_child_commitment(from, commitment) {
                        debug!(node = %ctx.id, %from, round = number, error = %e, "commitment not absorbed");
                    }
                }
            }
            MessageBody::Challenge(challenge) if from_parent => {
                let result = match self.current_round(number) {
                    Some(round) => round.absorb_challenge(challenge),
                    None => return,
                };
                match result {
                    Ok(challenges) => {
                        for (child, challenge) in challenges {
                            out.messages.push(self.message(ctx, child, number, MessageBody::Challenge(challenge)));
                        }
                        self.round_deadline = Some(now + ctx.config.phase_timeout(self.height(ctx)));
                    }
                    Err(e) => return self.fail_round(ctx, out, e),
                }
            }
            MessageBody::Response(response) => {
                if let Some(round) = self.current_round(number) {
                    if let Err(e) = round.absorb_child_response(from, response) {
                        debug!(node = %ctx.id, %from, round = number, error = %e, "response not absorbed");
                    }
                }
            }
            MessageBody::SignatureBroadcast(broadcast) if from_parent => {
                let result = match self.current_round(number) {
                    Some(round) => round.absorb_signature(&broadcast),
                    None => return,
                };
                if let Err(e) = result {
                    return self.fail_round(ctx, out, e);
                }
                self.to_children(ctx, out, number, &MessageBody::SignatureBroadcast(broadcast.clone()));
                self.complete_round(ctx, out, broadcast);
            }
            MessageBody::StatusReturn(status) => {
                if let Some(round) = self.current_round(number) {
                    round.absorb_status(from, status);
                }
                self.report_status(ctx, out);
            }
            MessageBody::CloseAll => {
                if from_parent {
                    info!(node = %ctx.id, "closing on request of the root");
                    self.to_children(ctx, out, number, &MessageBody::CloseAll);
                    self.close(ctx, out);
                }
                return;
            }
            other => {
                debug!(node = %ctx.id, %from, kind = other.name(), "unexpected sender, ignored");
                return;
            }
        }
        self.advance(ctx, out, now);
    }

    fn current_round(&mut self, number: u64) -> Option<&mut Round> {
        self.round.as_mut().filter(|round| round.number() == number)
    }

    /// Move the round forward as far as the messages received so far, or an expired phase
    /// deadline, allow.
    fn advance(&mut self, ctx: &Context, out: &mut Outbox, now: Instant) {
        loop {
            let expired = self.round_deadline.map_or(false, |deadline| now >= deadline);
            let round = match self.round.as_mut() {
                Some(round) => round,
                None => return,
            };
            let number = round.number();
            match round.phase() {
                RoundPhase::Announced if expired || round.children_committed() => {
                    let commitment = match round.close_commitments(&mut rand::thread_rng()) {
                        Ok(commitment) => commitment,
                        Err(e) => return self.fail_round(ctx, out, e),
                    };
                    if !round.is_root() {
                        self.round_deadline = None;
                        self.to_parent(ctx, out, number, MessageBody::Commitment(commitment));
                        return;
                    }
                    let context = challenge_context(self.view.view(), number);
                    match round.create_challenge(&context) {
                        Ok(challenges) => {
                            for (child, challenge) in challenges {
                                let message = self.message(ctx, child, number, MessageBody::Challenge(challenge));
                                out.messages.push(message);
                            }
                            self.round_deadline = Some(now + ctx.config.phase_timeout(self.height(ctx)));
                        }
                        Err(e) => return self.fail_round(ctx, out, e),
                    }
                }
                RoundPhase::Challenged if expired || round.children_responded() => {
                    let response = match round.close_responses() {
                        Ok(response) => response,
                        Err(e) => return self.fail_round(ctx, out, e),
                    };
                    self.round_deadline = None;
                    if !round.is_root() {
                        self.to_parent(ctx, out, number, MessageBody::Response(response));
                        return;
                    }
                    let (broadcast, _) = match round.finalize_signature() {
                        Ok(finalized) => finalized,
                        Err(e) => return self.fail_round(ctx, out, e),
                    };
                    info!(
                        node = %ctx.id,
                        view = self.view.view(),
                        round = number,
                        exceptions = broadcast.exceptions.len(),
                        messages = broadcast.messages,
                        "collective signature ready"
                    );
                    self.to_children(ctx, out, number, &MessageBody::SignatureBroadcast(broadcast.clone()));
                    self.complete_round(ctx, out, broadcast);
                    return;
                }
                _ => return,
            }
        }
    }

    fn complete_round(&mut self, ctx: &Context, out: &mut Outbox, broadcast: SignatureBroadcastMessage) {
        let round = match self.round.as_ref() {
            Some(round) => round,
            None => return,
        };
        let (view, number) = (round.view(), round.number());
        self.last_excluded = broadcast
            .exceptions
            .iter()
            .map(|exception| exception.public)
            .collect();
        if round.kind().uses_payload() {
            let proof = round.local_proof().cloned().unwrap_or_default();
            self.payload.deliver(Delivery {
                view,
                round: number,
                proof,
                broadcast: broadcast.clone(),
            });
        }
        if round.is_root() {
            self.missed = 0;
            if let Some(stats) = &ctx.stats {
                stats.record_completed(number, broadcast.messages, broadcast.exceptions.len() as u64);
            }
        }
        out.events.push(NodeEvent::RoundCompleted {
            view,
            round: number,
            broadcast,
        });
        self.report_status(ctx, out);
    }

    fn report_status(&mut self, ctx: &Context, out: &mut Outbox) {
        if self.status_sent {
            return;
        }
        let round = match self.round.as_ref() {
            Some(round) if round.phase() == RoundPhase::Finalized => round,
            _ => return,
        };
        let status = match round.status_report() {
            Some(status) => status,
            None => return,
        };
        let number = round.number();
        self.status_sent = true;
        if round.is_root() {
            if let Some(stats) = &ctx.stats {
                stats.record_status(number, status);
            }
            if round.kind().reports_stats() {
                info!(
                    node = %ctx.id,
                    round = number,
                    responders = status.responders,
                    peers = status.peers,
                    "round statistics"
                );
            }
        } else {
            self.to_parent(ctx, out, number, MessageBody::StatusReturn(status));
        }
    }

    fn fail_round(&mut self, ctx: &Context, out: &mut Outbox, e: RoundError) {
        error!(node = %ctx.id, view = self.view.view(), error = %e, "round failed");
        self.abandon_round(ctx, out);
    }

    fn abandon_round(&mut self, ctx: &Context, out: &mut Outbox) {
        self.round_deadline = None;
        self.missed = 0;
        if let Some(round) = self.round.take() {
            let (view, number) = (round.view(), round.number());
            warn!(node = %ctx.id, view, round = number, phase = ?round.phase(), "abandoning round");
            if round.kind().uses_payload() {
                self.payload.abandon(view, number);
            }
            if round.is_root() {
                if let Some(stats) = &ctx.stats {
                    stats.record_abandoned(number);
                }
            }
            out.events.push(NodeEvent::RoundAbandoned { view, round: number });
        }
    }

    fn close(&mut self, ctx: &Context, out: &mut Outbox) {
        if self.round_in_flight() {
            self.abandon_round(ctx, out);
        }
        self.closed = true;
        self.round = None;
        self.round_deadline = None;
        out.events.push(NodeEvent::Closed);
        out.close = true;
    }

    fn seal_payload(&mut self, kind: RoundKind, view: u64, number: u64) -> Payload {
        if kind.uses_payload() {
            self.payload.local_leaf(view, number)
        } else {
            Payload::empty()
        }
    }

    fn height(&self, ctx: &Context) -> u32 {
        self.view.tree().height_of(ctx.id)
    }
}

fn challenge_context(view: u64, round: u64) -> Vec<u8> {
    let mut context = view.to_be_bytes().to_vec();
    context.extend_from_slice(&round.to_be_bytes());
    context
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
