//! In-process IRC server for tests and local demos.
//!
//! Implements just enough of the protocol for the built-in scenarios:
//! registration with first-come nickname claims, JOIN with a names reply,
//! PRIVMSG relay to channels and nicks, and PING. Every outbound line can be
//! delayed by a fixed latency, every inbound line can be held for a fixed
//! processing time, and the server can instead stay silent or hang up
//! mid-line to exercise client timeouts and tail flushing.
//!
//! # Linked nodes
//!
//! [`MockServer::start_linked`] listens on several ports that act as linked
//! servers. The nickname table is network-wide, but each node keeps its own
//! view of channel membership: a JOIN is visible on the joiner's node at
//! once and reaches the other nodes only after `link_delay`. Messages to a
//! client on another node are delayed by `link_delay` too.
//!
//! All sessions share one [`State`] behind a `tokio::sync::Mutex`, so
//! nickname claims are serialized in arrival order.

use std::{
    collections::{BTreeSet, HashMap},
    io,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use ircprobe_client::Endpoint;
use ircprobe_proto::{
    LineBuffer, Message,
    numeric::{
        ERR_NEEDMOREPARAMS, ERR_NICKNAMEINUSE, ERR_NONICKNAMEGIVEN, ERR_NOSUCHNICK,
        ERR_NOTREGISTERED, ERR_UNKNOWNCOMMAND, RPL_ENDOFNAMES, RPL_NAMREPLY, RPL_WELCOME,
        RPL_YOURHOST,
    },
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream, tcp::OwnedWriteHalf},
    sync::{Mutex, mpsc, watch},
    task::JoinHandle,
    time::Instant,
};

const LOOPBACK: &str = "127.0.0.1:0";

/// How the server treats each accepted connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Behavior {
    /// Speak IRC.
    Irc,
    /// Read and discard everything, never reply.
    Silent,
    /// Write these bytes, then close the write side.
    HangUp(Vec<u8>),
}

/// Mock server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockConfig {
    /// Prefix on server replies. Linked nodes after the first are named
    /// `node<N>.<server_name>`.
    pub server_name: String,
    /// Delay applied to every outbound line.
    pub reply_delay: Duration,
    /// Time each inbound line is held before it takes effect.
    pub processing_delay: Duration,
    /// Propagation delay between linked nodes.
    pub link_delay: Duration,
    /// Per-connection behaviour.
    pub behavior: Behavior,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            server_name: "mock.irc".to_string(),
            reply_delay: Duration::ZERO,
            processing_delay: Duration::ZERO,
            link_delay: Duration::ZERO,
            behavior: Behavior::Irc,
        }
    }
}

type ConnId = u64;

type Channels = HashMap<String, BTreeSet<ConnId>>;

struct Outbound {
    due: Instant,
    line: String,
}

struct Peer {
    node: usize,
    nick: Option<String>,
    username: Option<String>,
    registered: bool,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl Peer {
    fn nick_or_star(&self) -> &str {
        self.nick.as_deref().unwrap_or("*")
    }

    fn mask(&self) -> String {
        format!(
            "{}!{}@mock",
            self.nick_or_star(),
            self.username.as_deref().unwrap_or("user")
        )
    }
}

/// A join still travelling to another node.
struct Hop {
    node: usize,
    channel: String,
    member: ConnId,
}

struct State {
    nicks: HashMap<String, ConnId>,
    peers: HashMap<ConnId, Peer>,
    /// Channel membership as each node sees it.
    views: Vec<Channels>,
    link_delay: Duration,
    /// Joins queued by the last `handle` call, drained by the session.
    hops: Vec<Hop>,
}

struct Shared {
    config: MockConfig,
    state: Mutex<State>,
    next_id: AtomicU64,
    closed: watch::Sender<usize>,
}

impl Shared {
    fn server_name(&self, node: usize) -> String {
        if node == 0 {
            self.config.server_name.clone()
        } else {
            format!("node{node}.{}", self.config.server_name)
        }
    }
}

/// Running mock server. Dropping it stops accepting new connections.
pub struct MockServer {
    endpoint: Endpoint,
    nodes: Vec<Endpoint>,
    shared: Arc<Shared>,
    accept: Vec<JoinHandle<()>>,
}

impl MockServer {
    /// Bind an ephemeral loopback port and start accepting.
    pub async fn start(config: MockConfig) -> io::Result<Self> {
        Self::start_linked(config, 1).await
    }

    /// Start `nodes` linked servers, each on its own ephemeral port.
    pub async fn start_linked(config: MockConfig, nodes: usize) -> io::Result<Self> {
        let primary = TcpListener::bind(LOOPBACK).await?;
        let endpoint = Endpoint::from(primary.local_addr()?);
        let mut listeners = vec![primary];
        for _ in 1..nodes {
            listeners.push(TcpListener::bind(LOOPBACK).await?);
        }
        let nodes = listeners
            .iter()
            .map(|listener| listener.local_addr().map(Endpoint::from))
            .collect::<io::Result<Vec<_>>>()?;

        let (closed, _) = watch::channel(0);
        let state = State::new(listeners.len(), config.link_delay);
        let shared =
            Arc::new(Shared {
                config,
                state: Mutex::new(state),
                next_id: AtomicU64::new(0),
                closed,
            });

        tracing::debug!(
            %endpoint,
            nodes = nodes.len(),
            behavior = ?shared.config.behavior,
            "mock server listening"
        );
        let accept = listeners
            .into_iter()
            .enumerate()
            .map(|(node, listener)| tokio::spawn(accept_loop(listener, Arc::clone(&shared), node)))
            .collect();

        Ok(Self { endpoint, nodes, shared, accept })
    }

    /// Address clients should connect to.
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint.clone()
    }

    /// Address of one linked node; node 0 is [`endpoint`](Self::endpoint).
    pub fn node_endpoint(&self, node: usize) -> Option<Endpoint> {
        self.nodes.get(node).cloned()
    }

    /// Wait until at least `count` connections have ended. False on timeout.
    pub async fn wait_closed(&self, count: usize, timeout: Duration) -> bool {
        let mut closed = self.shared.closed.subscribe();
        matches!(tokio::time::timeout(timeout, closed.wait_for(|n| *n >= count)).await, Ok(Ok(_)))
    }

    /// Connection currently holding `nick`, if any.
    pub async fn nick_holder(&self, nick: &str) -> Option<u64> {
        self.shared.state.lock().await.nicks.get(&nick.to_ascii_lowercase()).copied()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        for accept in &self.accept {
            accept.abort();
        }
    }
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>, node: usize) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let shared = Arc::clone(&shared);
                tokio::spawn(async move {
                    serve(stream, addr, &shared, node).await;
                    shared.closed.send_modify(|n| *n += 1);
                });
            },
            Err(err) => {
                tracing::warn!(node, error = %err, "mock accept failed");
            },
        }
    }
}

async fn serve(mut stream: TcpStream, addr: SocketAddr, shared: &Arc<Shared>, node: usize) {
    tracing::debug!(%addr, node, "mock connection accepted");
    match &shared.config.behavior {
        Behavior::Irc => session(stream, shared, node).await,
        Behavior::Silent => discard(&mut stream).await,
        Behavior::HangUp(bytes) => {
            if stream.write_all(bytes).await.is_ok() {
                let _ = stream.shutdown().await;
            }
            // Keep reading so unread client data does not turn the close
            // into a reset.
            discard(&mut stream).await;
        },
    }
    tracing::debug!(%addr, node, "mock connection closed");
}

async fn discard(stream: &mut TcpStream) {
    let mut chunk = [0u8; 1024];
    while matches!(stream.read(&mut chunk).await, Ok(n) if n > 0) {}
}

async fn session(stream: TcpStream, shared: &Arc<Shared>, node: usize) {
    let id = shared.next_id.fetch_add(1, Ordering::Relaxed);
    let server = shared.server_name(node);
    let (mut reader, writer) = stream.into_split();
    let (tx, rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_loop(writer, rx));

    shared.state.lock().await.peers.insert(id, Peer {
        node,
        nick: None,
        username: None,
        registered: false,
        tx,
    });

    let mut buffer = LineBuffer::new();
    let mut chunk = vec![0u8; 4096];
    'read: loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        buffer.extend(&chunk[..n]);
        while let Some(line) = buffer.next_line() {
            let Ok(message) = Message::parse(&line) else { continue };
            if !shared.config.processing_delay.is_zero() {
                tokio::time::sleep(shared.config.processing_delay).await;
            }
            let due = Instant::now() + shared.config.reply_delay;
            let (keep, hops) = {
                let mut state = shared.state.lock().await;
                let keep = state.handle(id, &message, &server, due);
                (keep, std::mem::take(&mut state.hops))
            };
            for hop in hops {
                tokio::spawn(propagate(Arc::clone(shared), hop));
            }
            if !keep {
                break 'read;
            }
        }
    }

    shared.state.lock().await.disconnect(id);
    // The peer entry held the only sender, so the writer ends once its
    // queue is flushed.
    let _ = writer.await;
}

async fn propagate(shared: Arc<Shared>, hop: Hop) {
    tokio::time::sleep(shared.config.link_delay).await;
    let due = Instant::now() + shared.config.reply_delay;
    let Hop { node, channel, member } = hop;
    if shared.state.lock().await.reveal(node, &channel, member, due) {
        tracing::trace!(node, %channel, member, "mock join propagated");
    }
}

async fn write_loop(mut writer: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<Outbound>) {
    while let Some(Outbound { due, mut line }) = rx.recv().await {
        tokio::time::sleep_until(due).await;
        line.push_str("\r\n");
        if writer.write_all(line.as_bytes()).await.is_err() {
            break;
        }
    }
}

impl State {
    fn new(nodes: usize, link_delay: Duration) -> Self {
        Self {
            nicks: HashMap::new(),
            peers: HashMap::new(),
            views: vec![Channels::new(); nodes.max(1)],
            link_delay,
            hops: Vec::new(),
        }
    }

    fn send(&self, to: ConnId, due: Instant, line: String) {
        if let Some(peer) = self.peers.get(&to) {
            let _ = peer.tx.send(Outbound { due, line });
        }
    }

    fn numeric(&self, to: ConnId, due: Instant, server: &str, code: u16, rest: &str) {
        let target = self.peers.get(&to).map_or("*", Peer::nick_or_star);
        self.send(to, due, format!(":{server} {code:03} {target} {rest}"));
    }

    /// Apply one client line. False ends the session.
    fn handle(&mut self, id: ConnId, message: &Message, server: &str, due: Instant) -> bool {
        let registered = self.peers.get(&id).is_some_and(|p| p.registered);

        match message.command.as_str() {
            "NICK" => self.nick(id, message.param(0), server, due),
            "USER" => match message.param(0) {
                Some(username) => {
                    if let Some(peer) = self.peers.get_mut(&id) {
                        peer.username = Some(username.to_string());
                    }
                    self.try_welcome(id, server, due);
                },
                None => {
                    let rest = "USER :Not enough parameters";
                    self.numeric(id, due, server, ERR_NEEDMOREPARAMS, rest);
                },
            },
            "PING" => {
                let token = message.param(0).unwrap_or(server);
                self.send(id, due, format!(":{server} PONG {server} :{token}"));
            },
            "PONG" => {},
            "QUIT" => return false,
            _ if !registered => {
                self.numeric(id, due, server, ERR_NOTREGISTERED, ":You have not registered");
            },
            "JOIN" => match message.param(0) {
                Some(channels) => {
                    for channel in channels.split(',').filter(|c| !c.is_empty()) {
                        self.join(id, channel, server, due);
                    }
                },
                None => {
                    let rest = "JOIN :Not enough parameters";
                    self.numeric(id, due, server, ERR_NEEDMOREPARAMS, rest);
                },
            },
            "PRIVMSG" => match (message.param(0), message.param(1)) {
                (Some(target), Some(text)) => self.privmsg(id, target, text, server, due),
                _ => {
                    let rest = "PRIVMSG :Not enough parameters";
                    self.numeric(id, due, server, ERR_NEEDMOREPARAMS, rest);
                },
            },
            other => {
                let rest = format!("{other} :Unknown command");
                self.numeric(id, due, server, ERR_UNKNOWNCOMMAND, &rest);
            },
        }
        true
    }

    fn nick(&mut self, id: ConnId, nick: Option<&str>, server: &str, due: Instant) {
        let Some(nick) = nick.filter(|n| !n.is_empty()) else {
            self.numeric(id, due, server, ERR_NONICKNAMEGIVEN, ":No nickname given");
            return;
        };

        let key = nick.to_ascii_lowercase();
        if self.nicks.get(&key).is_some_and(|owner| *owner != id) {
            tracing::debug!(conn = id, nick, "mock rejected nick");
            let rest = format!("{nick} :Nickname is already in use");
            self.numeric(id, due, server, ERR_NICKNAMEINUSE, &rest);
            return;
        }

        let Some(peer) = self.peers.get_mut(&id) else { return };
        if let Some(old) = peer.nick.replace(nick.to_string()) {
            self.nicks.remove(&old.to_ascii_lowercase());
        }
        self.nicks.insert(key, id);
        tracing::debug!(conn = id, nick, "mock claimed nick");
        self.try_welcome(id, server, due);
    }

    fn try_welcome(&mut self, id: ConnId, server: &str, due: Instant) {
        let Some(peer) = self.peers.get_mut(&id) else { return };
        if peer.registered || peer.nick.is_none() || peer.username.is_none() {
            return;
        }
        peer.registered = true;
        let mask = peer.mask();

        let welcome = format!(":Welcome to the Internet Relay Network {mask}");
        self.numeric(id, due, server, RPL_WELCOME, &welcome);
        self.numeric(id, due, server, RPL_YOURHOST, &format!(":Your host is {server}"));
    }

    fn join(&mut self, id: ConnId, channel: &str, server: &str, due: Instant) {
        let Some(node) = self.peers.get(&id).map(|p| p.node) else { return };
        if !self.reveal(node, channel, id, due) {
            return;
        }

        let names = self
            .views
            .get(node)
            .and_then(|view| view.get(&channel.to_ascii_lowercase()))
            .map(|members| {
                members
                    .iter()
                    .filter_map(|m| self.peers.get(m).map(Peer::nick_or_star))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .unwrap_or_default();
        self.numeric(id, due, server, RPL_NAMREPLY, &format!("= {channel} :{names}"));
        self.numeric(id, due, server, RPL_ENDOFNAMES, &format!("{channel} :End of /NAMES list"));

        let remote = (0..self.views.len()).filter(|n| *n != node);
        self.hops.extend(remote.map(|n| Hop { node: n, channel: channel.to_string(), member: id }));
    }

    /// Add `member` to `channel` as `node` sees it and announce the JOIN to
    /// that node's own clients. False if it was already there or has left.
    fn reveal(&mut self, node: usize, channel: &str, member: ConnId, due: Instant) -> bool {
        let Some(mask) = self.peers.get(&member).map(Peer::mask) else { return false };
        let Some(view) = self.views.get_mut(node) else { return false };
        let members = view.entry(channel.to_ascii_lowercase()).or_default();
        if !members.insert(member) {
            return false;
        }
        let members: Vec<ConnId> = members.iter().copied().collect();

        let local =
            members.into_iter().filter(|m| self.peers.get(m).is_some_and(|p| p.node == node));
        for to in local {
            self.send(to, due, format!(":{mask} JOIN {channel}"));
        }
        true
    }

    fn privmsg(&self, id: ConnId, target: &str, text: &str, server: &str, due: Instant) {
        let Some((mask, node)) = self.peers.get(&id).map(|p| (p.mask(), p.node)) else { return };
        let line = format!(":{mask} PRIVMSG {target} :{text}");
        let is_channel = target.starts_with(['#', '&']);

        // Channel messages reach the members the sender's node knows about.
        let recipients: Vec<ConnId> = if is_channel {
            self.views
                .get(node)
                .and_then(|view| view.get(&target.to_ascii_lowercase()))
                .map(|members| members.iter().copied().filter(|m| *m != id).collect())
                .unwrap_or_default()
        } else {
            self.nicks.get(&target.to_ascii_lowercase()).copied().into_iter().collect()
        };

        if recipients.is_empty() && !is_channel {
            let rest = format!("{target} :No such nick/channel");
            self.numeric(id, due, server, ERR_NOSUCHNICK, &rest);
        }
        for recipient in recipients {
            let remote = self.peers.get(&recipient).is_some_and(|p| p.node != node);
            let due = if remote { due + self.link_delay } else { due };
            self.send(recipient, due, line.clone());
        }
    }

    fn disconnect(&mut self, id: ConnId) {
        if let Some(nick) = self.peers.remove(&id).and_then(|peer| peer.nick) {
            self.nicks.remove(&nick.to_ascii_lowercase());
        }
        for view in &mut self.views {
            view.retain(|_, members| {
                members.remove(&id);
                !members.is_empty()
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use ircprobe_proto::decode_all;

    use super::*;

    const WAIT: Duration = Duration::from_millis(50);

    async fn exchange(endpoint: &Endpoint, lines: &str, wait: Duration) -> Vec<String> {
        let mut stream = TcpStream::connect(endpoint.to_string()).await.unwrap();
        stream.write_all(lines.as_bytes()).await.unwrap();
        tokio::time::sleep(wait).await;
        stream.shutdown().await.unwrap();
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes).await.unwrap();
        decode_all(&bytes)
    }

    #[tokio::test]
    async fn registers_and_welcomes() {
        let server = MockServer::start(MockConfig::default()).await.unwrap();
        let lines =
            exchange(&server.endpoint(), "NICK alice\r\nUSER alice 0 * :Alice\r\n", WAIT).await;
        assert!(lines[0].starts_with(":mock.irc 001 alice :Welcome"));
        assert!(lines[1].starts_with(":mock.irc 002 alice"));
    }

    #[tokio::test]
    async fn second_claim_is_rejected_until_release() {
        let server = MockServer::start(MockConfig::default()).await.unwrap();
        let mut first = TcpStream::connect(server.endpoint().to_string()).await.unwrap();
        first.write_all(b"NICK bob\r\nUSER bob 0 * :Bob\r\n").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(server.nick_holder("BOB").await.is_some());

        let lines = exchange(&server.endpoint(), "NICK bob\r\n", Duration::from_millis(50)).await;
        assert_eq!(lines, vec![":mock.irc 433 * bob :Nickname is already in use"]);

        drop(first);
        assert!(server.wait_closed(2, Duration::from_secs(1)).await);
        assert_eq!(server.nick_holder("bob").await, None);
    }

    #[tokio::test]
    async fn unregistered_commands_refused() {
        let server = MockServer::start(MockConfig::default()).await.unwrap();
        let lines = exchange(&server.endpoint(), "JOIN #test\r\nPING :tok\r\n", WAIT).await;
        assert_eq!(lines, vec![
            ":mock.irc 451 * :You have not registered".to_string(),
            ":mock.irc PONG mock.irc :tok".to_string(),
        ]);
    }

    #[tokio::test]
    async fn hang_up_sends_partial_line() {
        let server = MockServer::start(MockConfig {
            behavior: Behavior::HangUp(b":mock.irc NOTICE * :bye".to_vec()),
            ..MockConfig::default()
        })
        .await
        .unwrap();
        let mut stream = TcpStream::connect(server.endpoint().to_string()).await.unwrap();
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes).await.unwrap();
        assert_eq!(bytes, b":mock.irc NOTICE * :bye");
    }

    #[tokio::test]
    async fn processing_delay_holds_each_line() {
        let server = MockServer::start(MockConfig {
            processing_delay: Duration::from_millis(100),
            ..MockConfig::default()
        })
        .await
        .unwrap();
        let mut stream = TcpStream::connect(server.endpoint().to_string()).await.unwrap();
        let sent = Instant::now();
        stream.write_all(b"PING :tok\r\n").await.unwrap();

        let mut buf = [0u8; 64];
        let n = stream.read(&mut buf).await.unwrap();
        assert!(n > 0);
        assert!(sent.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn linked_join_reaches_other_node_after_link_delay() {
        let network = MockServer::start_linked(
            MockConfig { link_delay: Duration::from_millis(200), ..MockConfig::default() },
            2,
        )
        .await
        .unwrap();
        let mut alice = TcpStream::connect(network.endpoint().to_string()).await.unwrap();
        alice.write_all(b"NICK alice\r\nUSER alice 0 * :Alice\r\nJOIN #c\r\n").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let leaf = network.node_endpoint(1).unwrap();
        assert_eq!(network.node_endpoint(2), None);
        let lines =
            exchange(&leaf, "NICK bob\r\nUSER bob 0 * :Bob\r\nJOIN #c\r\n", WAIT * 8)
                .await;

        // alice is not yet known on node 1 when bob joins.
        let names = lines.iter().position(|l| l.contains(" 353 ")).unwrap();
        assert_eq!(lines[names], ":node1.mock.irc 353 bob = #c :bob");
        let relayed = lines.iter().position(|l| l == ":alice!alice@mock JOIN #c").unwrap();
        assert!(relayed > names);
    }
}
