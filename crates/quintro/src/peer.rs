//! The peer actor: one event loop per participant.
//!
//! Every participant — host or not — runs exactly one `Peer` task. It
//! owns the transport endpoint, the presence tracker, the timers, and
//! one of two roles:
//!
//! - **Host**: a [`HostAuthority`] holding the authoritative session.
//! - **Guest**: a [`ClientMirror`] reconciling broadcasts.
//!
//! The loop is single-threaded and runs each handler to completion
//! before the next message, so the host serializes all accepted actions:
//! "first received, first applied" needs no locks. Roles can switch at
//! runtime — a guest promotes itself to host when the deterministic
//! failover computation names it.
//!
//! The embedding application talks to the task through a [`PeerHandle`]
//! (commands in) and an event channel ([`PeerEvent`]s out).

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use quintro_protocol::{
    Codec, ConnectionStatus, GameMessage, JsonCodec, PlayerId, Recipient,
    RoomId, SessionStatus,
};
use quintro_presence::{PresenceConfig, PresenceTracker};
use quintro_state::GameSession;
use quintro_sync::{
    ClientMirror, DeltaOutcome, HostAuthority, Outgoing, PendingIntent,
    SeededCards,
};
use quintro_timer::{HeartbeatTicker, TurnTimer};
use quintro_transport::{RoomTransport, TransportEvent};

use crate::{PeerConfig, PeerError, PeerEvent, RecoveryRecord};

/// Command channel depth; enough that a UI can never realistically
/// fill it between polls.
const COMMAND_CHANNEL_SIZE: usize = 64;

/// Wall clock in unix millis. Timestamps are labels (join order ties
/// are broken by roster position), so a weird clock is cosmetic only.
fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Commands the embedding application can send to its peer task.
enum PeerCommand {
    Start { first_turn: Option<usize> },
    Call { number: u8 },
    DeclareWin { lines: u8 },
    PlayAgain,
    Leave,
    GetSession {
        reply: oneshot::Sender<Option<GameSession>>,
    },
    GetRecovery {
        reply: oneshot::Sender<RecoveryRecord>,
    },
}

/// Handle to a running peer task. Cheap to clone.
///
/// Gameplay methods are fire-and-forget on purpose: an intent is never
/// assumed to have succeeded until the corresponding broadcast comes
/// back as a [`PeerEvent`]. Only the queries wait for a reply.
#[derive(Clone)]
pub struct PeerHandle {
    player_id: PlayerId,
    commands: mpsc::Sender<PeerCommand>,
}

impl PeerHandle {
    /// The local player's id.
    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    /// Asks the host (ourselves, if hosting) to start the game.
    /// `first_turn` of `None` lets the host pick at random.
    pub async fn start(
        &self,
        first_turn: Option<usize>,
    ) -> Result<(), PeerError> {
        self.send(PeerCommand::Start { first_turn }).await
    }

    /// Calls a number on our turn.
    pub async fn call_number(&self, number: u8) -> Result<(), PeerError> {
        self.send(PeerCommand::Call { number }).await
    }

    /// Declares that our card has `lines` completed lines.
    pub async fn declare_win(&self, lines: u8) -> Result<(), PeerError> {
        self.send(PeerCommand::DeclareWin { lines }).await
    }

    /// Asks for a rematch (host only).
    pub async fn play_again(&self) -> Result<(), PeerError> {
        self.send(PeerCommand::PlayAgain).await
    }

    /// Leaves the room and stops the peer task.
    pub async fn leave(&self) -> Result<(), PeerError> {
        self.send(PeerCommand::Leave).await
    }

    /// The current local copy of the session (`None` before the first
    /// snapshot lands on a joining peer).
    pub async fn session(
        &self,
    ) -> Result<Option<GameSession>, PeerError> {
        let (tx, rx) = oneshot::channel();
        self.send(PeerCommand::GetSession { reply: tx }).await?;
        rx.await.map_err(|_| PeerError::Stopped)
    }

    /// A recovery record for resuming after a reload.
    pub async fn recovery_record(
        &self,
    ) -> Result<RecoveryRecord, PeerError> {
        let (tx, rx) = oneshot::channel();
        self.send(PeerCommand::GetRecovery { reply: tx }).await?;
        rx.await.map_err(|_| PeerError::Stopped)
    }

    async fn send(&self, cmd: PeerCommand) -> Result<(), PeerError> {
        self.commands
            .send(cmd)
            .await
            .map_err(|_| PeerError::Stopped)
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Configures and launches a peer.
pub struct PeerBuilder {
    name: String,
    config: PeerConfig,
    player_id: Option<PlayerId>,
    resume: Option<RecoveryRecord>,
}

impl PeerBuilder {
    /// A builder for a player with the given display name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: PeerConfig::default(),
            player_id: None,
            resume: None,
        }
    }

    /// Overrides the timing configuration.
    pub fn config(mut self, config: PeerConfig) -> Self {
        self.config = config.validated();
        self
    }

    /// Uses a specific player id instead of minting a random one. The
    /// id must match the identity the transport endpoint was opened
    /// with.
    pub fn with_player_id(mut self, id: PlayerId) -> Self {
        self.player_id = Some(id);
        self
    }

    /// Resumes a previous identity instead of minting a fresh one. The
    /// host recognizes the returning id and answers with a snapshot
    /// instead of a new roster slot.
    pub fn resume(mut self, record: RecoveryRecord) -> Self {
        self.resume = Some(record);
        self
    }

    /// Creates a brand-new session in `room` with this peer as host.
    pub async fn host<T: RoomTransport + Sync>(
        self,
        transport: T,
        room: RoomId,
    ) -> Result<
        (PeerHandle, mpsc::UnboundedReceiver<PeerEvent>),
        PeerError,
    > {
        let (me, name, card_seed) = self.identity();
        let session =
            GameSession::create(room.clone(), me, name.clone(), unix_millis());
        let role = Role::Host(HostAuthority::new(
            session.clone(),
            SeededCards::new(room.clone()),
        ));

        let (peer, handle, events) =
            Peer::assemble(me, name, room, self.config, card_seed, transport, role);
        peer.emit(PeerEvent::SessionChanged(session));
        tokio::spawn(peer.run());
        Ok((handle, events))
    }

    /// Joins an existing session in `room`. The join request is
    /// announced before the loop starts; the host's snapshot populates
    /// the mirror.
    pub async fn join<T: RoomTransport + Sync>(
        self,
        transport: T,
        room: RoomId,
    ) -> Result<
        (PeerHandle, mpsc::UnboundedReceiver<PeerEvent>),
        PeerError,
    > {
        let (me, name, card_seed) = self.identity();
        let role = Role::Guest(ClientMirror::new(me));

        let (peer, handle, events) = Peer::assemble(
            me,
            name.clone(),
            room,
            self.config,
            card_seed,
            transport,
            role,
        );

        // Announce ourselves. The host is unknown until its snapshot
        // arrives, so this one goes to everyone; only the host acts.
        let join = GameMessage::PlayerJoin {
            player_id: me,
            name,
        };
        let data = peer
            .codec
            .encode(&join)
            .map_err(|e| PeerError::Transport(e.to_string()))?;
        peer.transport
            .broadcast(&data)
            .await
            .map_err(|e| PeerError::Transport(e.to_string()))?;

        tokio::spawn(peer.run());
        Ok((handle, events))
    }

    fn identity(&self) -> (PlayerId, String, u64) {
        match &self.resume {
            Some(record) => (
                record.player_id,
                record.player_name.clone(),
                record.card_seed,
            ),
            None => (
                self.player_id.unwrap_or(PlayerId(rand::random())),
                self.name.clone(),
                rand::random(),
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// The actor
// ---------------------------------------------------------------------------

enum Role {
    Host(HostAuthority<SeededCards>),
    Guest(ClientMirror),
}

/// Deferred work computed while the role was mutably borrowed.
enum FollowUp {
    None,
    /// The mirror fell behind; ask the host for a snapshot.
    RequestResync,
    /// This peer is the new host.
    Promote,
}

struct Peer<T: RoomTransport> {
    me: PlayerId,
    name: String,
    room: RoomId,
    config: PeerConfig,
    card_seed: u64,
    codec: JsonCodec,
    transport: T,
    role: Role,
    presence: PresenceTracker,
    turn_timer: TurnTimer,
    heartbeat: HeartbeatTicker,
    sweep: tokio::time::Interval,
    commands: mpsc::Receiver<PeerCommand>,
    events: mpsc::UnboundedSender<PeerEvent>,
}

impl<T: RoomTransport> Peer<T> {
    #[allow(clippy::too_many_arguments)]
    fn assemble(
        me: PlayerId,
        name: String,
        room: RoomId,
        config: PeerConfig,
        card_seed: u64,
        transport: T,
        role: Role,
    ) -> (Self, PeerHandle, mpsc::UnboundedReceiver<PeerEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let presence = PresenceTracker::new(PresenceConfig {
            reconnect_grace: config.reconnect_grace,
            heartbeat_window: config.heartbeat_window(),
        });
        let heartbeat = HeartbeatTicker::new(config.heartbeat_interval);
        let sweep = tokio::time::interval(config.sweep_interval);

        let peer = Self {
            me,
            name,
            room,
            config,
            card_seed,
            codec: JsonCodec,
            transport,
            role,
            presence,
            turn_timer: TurnTimer::new(),
            heartbeat,
            sweep,
            commands: cmd_rx,
            events: event_tx,
        };
        let handle = PeerHandle {
            player_id: me,
            commands: cmd_tx,
        };
        (peer, handle, event_rx)
    }

    async fn run(mut self) {
        info!(me = %self.me, room = %self.room, "peer started");

        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => {
                        if self.handle_command(cmd).await {
                            break;
                        }
                    }
                    // Every handle dropped: the application is done
                    // with us.
                    None => break,
                },
                event = self.transport.recv() => match event {
                    Ok(Some(event)) => {
                        self.handle_transport(event).await;
                    }
                    Ok(None) => {
                        info!(me = %self.me, "transport closed");
                        break;
                    }
                    Err(e) => {
                        warn!(me = %self.me, error = %e, "transport failed");
                        break;
                    }
                },
                expired_turn = self.turn_timer.expired() => {
                    self.handle_turn_deadline(expired_turn).await;
                }
                _ = self.heartbeat.tick() => {
                    self.send_heartbeat().await;
                }
                _ = self.sweep.tick() => {
                    self.handle_sweep().await;
                }
            }
        }

        info!(me = %self.me, "peer stopped");
    }

    // -- Commands (local intents) -----------------------------------------

    /// Returns `true` when the loop should stop.
    async fn handle_command(&mut self, cmd: PeerCommand) -> bool {
        match cmd {
            PeerCommand::Start { first_turn } => {
                let result = match &mut self.role {
                    Role::Host(authority) => {
                        Some(authority.start(first_turn))
                    }
                    Role::Guest(_) => None,
                };
                match result {
                    Some(Ok(out)) => {
                        self.dispatch(out).await;
                        self.sync_turn_timer();
                    }
                    Some(Err(e)) => self.emit(PeerEvent::ActionRejected {
                        reason: e.to_string(),
                    }),
                    None => self.emit(PeerEvent::ActionRejected {
                        reason: "only the host can start the game".into(),
                    }),
                }
            }

            PeerCommand::Call { number } => {
                let me = self.me;
                let intent = match &mut self.role {
                    Role::Host(authority) => {
                        Ok(authority.on_call_number(me, me, number))
                    }
                    Role::Guest(mirror) => {
                        mirror.set_pending(PendingIntent::Call(number));
                        Err((
                            mirror.expected_host(),
                            GameMessage::CallNumber {
                                player_id: me,
                                number,
                            },
                        ))
                    }
                };
                match intent {
                    Ok(out) => {
                        self.dispatch(out).await;
                        self.sync_turn_timer();
                    }
                    Err((host, msg)) => {
                        self.send_to_host(host, msg).await;
                    }
                }
            }

            PeerCommand::DeclareWin { lines } => {
                let me = self.me;
                let intent = match &mut self.role {
                    Role::Host(authority) => {
                        Ok(authority.on_declare_winner(me, me, lines))
                    }
                    Role::Guest(mirror) => {
                        mirror.set_pending(PendingIntent::DeclareWin(
                            lines,
                        ));
                        Err((
                            mirror.expected_host(),
                            GameMessage::DeclareWinner {
                                player_id: me,
                                lines,
                            },
                        ))
                    }
                };
                match intent {
                    Ok(out) => {
                        self.dispatch(out).await;
                        self.sync_turn_timer();
                    }
                    Err((host, msg)) => {
                        self.send_to_host(host, msg).await;
                    }
                }
            }

            PeerCommand::PlayAgain => {
                let now = unix_millis();
                let out = match &mut self.role {
                    Role::Host(authority) => {
                        Some(authority.play_again(now))
                    }
                    Role::Guest(_) => None,
                };
                match out {
                    Some(out) => {
                        self.dispatch(out).await;
                        self.sync_turn_timer();
                    }
                    None => self.emit(PeerEvent::ActionRejected {
                        reason: "only the host can reset the game".into(),
                    }),
                }
            }

            PeerCommand::Leave => {
                let goodbye = GameMessage::PlayerLeave {
                    player_id: self.me,
                };
                self.send_all(&goodbye).await;
                if let Err(e) = self.transport.leave().await {
                    debug!(error = %e, "leave failed");
                }
                return true;
            }

            PeerCommand::GetSession { reply } => {
                let _ = reply.send(self.session().cloned());
            }

            PeerCommand::GetRecovery { reply } => {
                let record = RecoveryRecord {
                    player_id: self.me,
                    player_name: self.name.clone(),
                    room_code: self.room.clone(),
                    was_host: matches!(self.role, Role::Host(_)),
                    card_seed: self.card_seed,
                    saved_at: unix_millis(),
                };
                let _ = reply.send(record);
            }
        }
        false
    }

    // -- Transport events --------------------------------------------------

    async fn handle_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::PeerJoined(peer) => {
                let restored = self.presence.mark_connected(peer);
                if restored {
                    self.emit(PeerEvent::PresenceChanged {
                        player: peer,
                        status: ConnectionStatus::Connected,
                    });
                }
                // A returning roster member gets a private snapshot so
                // they resume at their prior turn order immediately.
                let out = match &mut self.role {
                    Role::Host(authority)
                        if authority.session().player(peer).is_some() =>
                    {
                        let mut out = authority.on_presence_change(
                            peer,
                            ConnectionStatus::Connected,
                        );
                        out.extend(authority.on_request_sync(peer));
                        out
                    }
                    _ => Vec::new(),
                };
                self.dispatch(out).await;
            }

            TransportEvent::PeerLeft(peer) => {
                self.presence.mark_reconnecting(peer);
                self.emit(PeerEvent::PresenceChanged {
                    player: peer,
                    status: ConnectionStatus::Reconnecting,
                });
                let out = match &mut self.role {
                    Role::Host(authority) => authority
                        .on_presence_change(
                            peer,
                            ConnectionStatus::Reconnecting,
                        ),
                    Role::Guest(_) => Vec::new(),
                };
                self.dispatch(out).await;
            }

            TransportEvent::Message { from, data } => {
                let msg: GameMessage = match self.codec.decode(&data) {
                    Ok(msg) => msg,
                    Err(e) => {
                        debug!(%from, error = %e, "dropping undecodable payload");
                        return;
                    }
                };
                if let Err(e) = msg.validate() {
                    debug!(
                        %from,
                        kind = msg.kind(),
                        error = %e,
                        "dropping invalid message"
                    );
                    return;
                }

                // Any message is evidence of life.
                let restored = self.presence.mark_connected(from);
                if restored {
                    self.emit(PeerEvent::PresenceChanged {
                        player: from,
                        status: ConnectionStatus::Connected,
                    });
                    let out = match &mut self.role {
                        Role::Host(authority) => authority
                            .on_presence_change(
                                from,
                                ConnectionStatus::Connected,
                            ),
                        Role::Guest(_) => Vec::new(),
                    };
                    self.dispatch(out).await;
                }

                if matches!(self.role, Role::Host(_)) {
                    self.host_message(from, msg).await;
                } else {
                    self.guest_message(from, msg).await;
                }
            }
        }
    }

    /// Inbound message while we are the authority.
    async fn host_message(&mut self, from: PlayerId, msg: GameMessage) {
        let now = unix_millis();
        let out: Outgoing = {
            let Role::Host(authority) = &mut self.role else {
                return;
            };
            match msg {
                GameMessage::PlayerJoin { player_id, name } => {
                    if player_id != from {
                        debug!(%from, claimed = %player_id, "join id mismatch");
                        Vec::new()
                    } else if authority
                        .session()
                        .player(player_id)
                        .is_some()
                    {
                        // A reload-resume: same identity, prior slot.
                        authority.on_request_sync(from)
                    } else {
                        authority.on_player_join(from, &name, now)
                    }
                }
                GameMessage::CallNumber { player_id, number } => {
                    authority.on_call_number(from, player_id, number)
                }
                GameMessage::DeclareWinner { player_id, lines } => {
                    authority.on_declare_winner(from, player_id, lines)
                }
                GameMessage::RequestSync { .. } => {
                    authority.on_request_sync(from)
                }
                GameMessage::PlayerLeave { player_id } => {
                    if player_id == from {
                        self.presence.forget(from);
                        authority.on_player_gone(from)
                    } else {
                        Vec::new()
                    }
                }
                GameMessage::Heartbeat { .. } => Vec::new(),
                GameMessage::SyncState { session } => {
                    // Someone else believes they are the authority.
                    warn!(
                        %from,
                        claimed_host = %session.host_id,
                        "snapshot received while hosting"
                    );
                    let _ = self.events.send(
                        PeerEvent::SplitBrainSuspected {
                            claimed_host: session.host_id,
                        },
                    );
                    Vec::new()
                }
                other => {
                    debug!(
                        %from,
                        kind = other.kind(),
                        "host ignoring broadcast-only message"
                    );
                    Vec::new()
                }
            }
        };
        self.dispatch(out).await;
        self.sync_turn_timer();
        self.sync_presence_roster();
    }

    /// Inbound message while we mirror someone else's authority.
    async fn guest_message(&mut self, from: PlayerId, msg: GameMessage) {
        let me = self.me;
        let follow_up: FollowUp = {
            let Role::Guest(mirror) = &mut self.role else {
                return;
            };
            match msg {
                GameMessage::SyncState { session: snapshot } => {
                    let expected = mirror.expected_host();
                    // Before the first snapshot we accept anyone — we
                    // have no basis for suspicion yet.
                    if expected.is_some() && expected != Some(from) {
                        warn!(
                            %from,
                            claimed_host = %snapshot.host_id,
                            "snapshot from unexpected sender"
                        );
                        let _ = self.events.send(
                            PeerEvent::SplitBrainSuspected {
                                claimed_host: snapshot.host_id,
                            },
                        );
                        FollowUp::None
                    } else {
                        match mirror.apply_snapshot(&snapshot) {
                            Ok(true) => {
                                let session = mirror
                                    .session()
                                    .cloned()
                                    .expect("snapshot just applied");
                                let promoted = session.host_id == me;
                                let _ = self.events.send(
                                    PeerEvent::SessionChanged(session),
                                );
                                if promoted {
                                    FollowUp::Promote
                                } else {
                                    FollowUp::None
                                }
                            }
                            Ok(false) => FollowUp::None,
                            Err(e) => {
                                debug!(%from, error = %e, "dropping bad snapshot");
                                FollowUp::None
                            }
                        }
                    }
                }

                GameMessage::StartGame { first_turn_index } => {
                    match mirror.apply_start(first_turn_index) {
                        DeltaOutcome::Applied => {
                            let session = mirror
                                .session()
                                .cloned()
                                .expect("mirror populated");
                            let _ = self.events.send(
                                PeerEvent::SessionChanged(session),
                            );
                            FollowUp::None
                        }
                        DeltaOutcome::Desynced => FollowUp::RequestResync,
                    }
                }

                GameMessage::NumberCalled {
                    number,
                    called_by,
                    next_turn_index,
                } => {
                    match mirror.apply_number_called(
                        number,
                        called_by,
                        next_turn_index,
                    ) {
                        DeltaOutcome::Applied => {
                            let _ = self.events.send(
                                PeerEvent::NumberCalled {
                                    number,
                                    by: called_by,
                                    next_turn_index,
                                },
                            );
                            FollowUp::None
                        }
                        DeltaOutcome::Desynced => FollowUp::RequestResync,
                    }
                }

                GameMessage::GameOver { winner_id } => {
                    match mirror.apply_game_over(winner_id) {
                        DeltaOutcome::Applied => {
                            let _ = self.events.send(
                                PeerEvent::GameOver { winner: winner_id },
                            );
                            FollowUp::None
                        }
                        DeltaOutcome::Desynced => FollowUp::RequestResync,
                    }
                }

                GameMessage::ActionRejected { reason } => {
                    mirror.clear_pending();
                    let _ = self
                        .events
                        .send(PeerEvent::ActionRejected { reason });
                    FollowUp::None
                }

                GameMessage::PlayerLeave { player_id } => {
                    self.presence.forget(player_id);
                    if mirror.expected_host() == Some(player_id) {
                        match mirror.host_lost() {
                            Some(new_host) if new_host == me => {
                                FollowUp::Promote
                            }
                            Some(new_host) => {
                                let _ = self.events.send(
                                    PeerEvent::HostChanged { new_host },
                                );
                                if let Some(session) = mirror.session() {
                                    let _ = self.events.send(
                                        PeerEvent::SessionChanged(
                                            session.clone(),
                                        ),
                                    );
                                }
                                FollowUp::None
                            }
                            None => FollowUp::None,
                        }
                    } else {
                        // The host's snapshot will carry the roster
                        // change; nothing to do locally.
                        FollowUp::None
                    }
                }

                GameMessage::Heartbeat { .. } => FollowUp::None,

                other => {
                    // Host-bound requests travel as broadcasts before
                    // the host is known; every guest sees and ignores
                    // them.
                    debug!(
                        %from,
                        kind = other.kind(),
                        "guest ignoring host-bound message"
                    );
                    FollowUp::None
                }
            }
        };

        match follow_up {
            FollowUp::None => {}
            FollowUp::RequestResync => self.request_resync().await,
            FollowUp::Promote => self.promote_to_host().await,
        }
        self.sync_presence_roster();
    }

    // -- Timers and sweeps -------------------------------------------------

    async fn handle_turn_deadline(&mut self, expired_turn: usize) {
        let out = match &mut self.role {
            Role::Host(authority) => {
                authority.on_turn_timeout(expired_turn)
            }
            // Guests never arm the turn timer; a stray expiry after a
            // demotion is dropped here.
            Role::Guest(_) => Vec::new(),
        };
        self.dispatch(out).await;
        self.sync_turn_timer();
    }

    async fn handle_sweep(&mut self) {
        let outcome = self.presence.sweep();
        if outcome.is_empty() {
            return;
        }

        for player in outcome.newly_reconnecting {
            self.emit(PeerEvent::PresenceChanged {
                player,
                status: ConnectionStatus::Reconnecting,
            });
            let out = match &mut self.role {
                Role::Host(authority) => authority.on_presence_change(
                    player,
                    ConnectionStatus::Reconnecting,
                ),
                Role::Guest(_) => Vec::new(),
            };
            self.dispatch(out).await;
        }

        for player in outcome.newly_disconnected {
            self.emit(PeerEvent::PresenceChanged {
                player,
                status: ConnectionStatus::Disconnected,
            });

            let me = self.me;
            let (out, follow_up) = match &mut self.role {
                Role::Host(authority) => {
                    let out = authority.on_player_gone(player);
                    self.presence.forget(player);
                    (out, FollowUp::None)
                }
                Role::Guest(mirror) => {
                    let follow_up = if mirror.expected_host()
                        == Some(player)
                    {
                        match mirror.host_lost() {
                            Some(new_host) if new_host == me => {
                                FollowUp::Promote
                            }
                            Some(new_host) => {
                                let _ = self.events.send(
                                    PeerEvent::HostChanged { new_host },
                                );
                                if let Some(session) = mirror.session() {
                                    let _ = self.events.send(
                                        PeerEvent::SessionChanged(
                                            session.clone(),
                                        ),
                                    );
                                }
                                FollowUp::None
                            }
                            None => FollowUp::None,
                        }
                    } else {
                        // Not the host: the host's roster update will
                        // arrive as a snapshot.
                        FollowUp::None
                    };
                    (Vec::new(), follow_up)
                }
            };
            self.dispatch(out).await;
            self.sync_turn_timer();
            if matches!(follow_up, FollowUp::Promote) {
                self.promote_to_host().await;
            }
        }
        self.sync_presence_roster();
    }

    async fn send_heartbeat(&mut self) {
        let beacon = GameMessage::Heartbeat {
            player_id: self.me,
            sent_at: unix_millis(),
        };
        self.send_all(&beacon).await;
    }

    // -- Role management ---------------------------------------------------

    /// Takes authority over the mirror's session: the failover
    /// computation (or a graceful handoff snapshot) named us.
    async fn promote_to_host(&mut self) {
        let Role::Guest(mirror) = &self.role else {
            return;
        };
        let Some(session) = mirror.session().cloned() else {
            return;
        };

        info!(me = %self.me, "assuming host authority");
        self.role = Role::Host(HostAuthority::new(
            session.clone(),
            SeededCards::new(self.room.clone()),
        ));
        self.emit(PeerEvent::BecameHost);
        self.emit(PeerEvent::HostChanged { new_host: self.me });
        self.emit(PeerEvent::SessionChanged(session));

        // First act as host: a snapshot, so every surviving mirror
        // converges on the same roster and authority.
        let out = match &self.role {
            Role::Host(authority) => authority.on_request_sync(self.me),
            Role::Guest(_) => Vec::new(),
        };
        // on_request_sync addresses us; rewrite it as a broadcast.
        let out: Outgoing = out
            .into_iter()
            .map(|(_, msg)| (Recipient::All, msg))
            .collect();
        self.dispatch(out).await;
        self.sync_turn_timer();
    }

    /// Our mirror fell behind; ask the host for a snapshot. An
    /// in-flight intent is abandoned — it was formed against a state
    /// we now know was stale.
    async fn request_resync(&mut self) {
        let host = match &mut self.role {
            Role::Guest(mirror) => {
                mirror.clear_pending();
                mirror.expected_host()
            }
            Role::Host(_) => return,
        };
        self.emit(PeerEvent::ResyncRequested);
        self.send_to_host(
            host,
            GameMessage::RequestSync {
                player_id: self.me,
            },
        )
        .await;
    }

    // -- Plumbing ----------------------------------------------------------

    /// Delivers host output: broadcasts go to the mesh (and surface as
    /// local events — the host's UI learns from the same messages as
    /// everyone else), targeted messages go to one peer, and messages
    /// addressed to ourselves are handled locally.
    async fn dispatch(&self, out: Outgoing) {
        for (recipient, msg) in out {
            match recipient {
                Recipient::All => {
                    self.emit_broadcast(&msg);
                    self.send_all(&msg).await;
                }
                Recipient::Peer(peer) if peer == self.me => {
                    self.deliver_local(msg);
                }
                Recipient::Peer(peer) => {
                    self.send_one(peer, &msg).await;
                }
                Recipient::AllExcept(excluded) => {
                    self.emit_broadcast(&msg);
                    for peer in self.transport.peers() {
                        if peer != excluded {
                            self.send_one(peer, &msg).await;
                        }
                    }
                }
            }
        }
    }

    /// Local events mirroring what a broadcast tells everyone else.
    fn emit_broadcast(&self, msg: &GameMessage) {
        match msg {
            GameMessage::SyncState { session } => {
                if let Ok(session) = GameSession::from_snapshot(session) {
                    self.emit(PeerEvent::SessionChanged(session));
                }
            }
            GameMessage::NumberCalled {
                number,
                called_by,
                next_turn_index,
            } => self.emit(PeerEvent::NumberCalled {
                number: *number,
                by: *called_by,
                next_turn_index: *next_turn_index,
            }),
            GameMessage::GameOver { winner_id } => {
                self.emit(PeerEvent::GameOver { winner: *winner_id });
            }
            // start-game is always chased by a snapshot; one event is
            // enough.
            _ => {}
        }
    }

    /// A message the authority addressed to this very peer.
    fn deliver_local(&self, msg: GameMessage) {
        if let GameMessage::ActionRejected { reason } = msg {
            self.emit(PeerEvent::ActionRejected { reason });
        }
    }

    async fn send_all(&self, msg: &GameMessage) {
        match self.codec.encode(msg) {
            Ok(data) => {
                if let Err(e) = self.transport.broadcast(&data).await {
                    debug!(error = %e, kind = msg.kind(), "broadcast failed");
                }
            }
            Err(e) => debug!(error = %e, "encode failed"),
        }
    }

    async fn send_one(&self, peer: PlayerId, msg: &GameMessage) {
        match self.codec.encode(msg) {
            Ok(data) => {
                if let Err(e) = self.transport.send_to(peer, &data).await
                {
                    debug!(%peer, error = %e, kind = msg.kind(), "send failed");
                }
            }
            Err(e) => debug!(error = %e, "encode failed"),
        }
    }

    /// Sends toward the host; falls back to broadcast while the host
    /// is still unknown (only the host will act on it either way).
    async fn send_to_host(
        &self,
        host: Option<PlayerId>,
        msg: GameMessage,
    ) {
        match host {
            Some(host) => self.send_one(host, &msg).await,
            None => self.send_all(&msg).await,
        }
    }

    /// Keeps the armed deadline aligned with the session: armed for the
    /// current turn while playing (arming the moment a turn begins),
    /// disarmed otherwise. Re-arming for the same turn index is a
    /// no-op, so an unrelated message never extends a running deadline.
    fn sync_turn_timer(&mut self) {
        match &self.role {
            Role::Host(authority) => {
                let session = authority.session();
                if session.status == SessionStatus::Playing {
                    let turn = session.current_turn_index;
                    if self.turn_timer.armed_turn() != Some(turn) {
                        self.turn_timer
                            .arm(turn, self.config.turn_timeout);
                    }
                } else {
                    self.turn_timer.cancel();
                }
            }
            Role::Guest(_) => self.turn_timer.cancel(),
        }
    }

    /// Aligns the presence tracker with the roster: track newcomers,
    /// forget departures.
    fn sync_presence_roster(&mut self) {
        let roster: Vec<PlayerId> = match self.session() {
            Some(session) => {
                session.players.iter().map(|p| p.id).collect()
            }
            None => return,
        };
        for id in &roster {
            if *id != self.me && self.presence.status(*id).is_none() {
                self.presence.track(*id);
            }
        }
        for id in self.presence.tracked() {
            if !roster.contains(&id) {
                self.presence.forget(id);
            }
        }
    }

    fn session(&self) -> Option<&GameSession> {
        match &self.role {
            Role::Host(authority) => Some(authority.session()),
            Role::Guest(mirror) => mirror.session(),
        }
    }

    fn emit(&self, event: PeerEvent) {
        let _ = self.events.send(event);
    }
}
