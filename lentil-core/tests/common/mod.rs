//! In-process beanstalkd stand-in for the integration tests.
//!
//! Implements the subset of the protocol the client speaks, keeps jobs in
//! memory and can sever every open connection on demand to simulate a
//! network failure.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobState {
    Ready,
    Reserved(u64),
    Buried,
    Delayed,
}

impl JobState {
    fn name(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Reserved(_) => "reserved",
            Self::Buried => "buried",
            Self::Delayed => "delayed",
        }
    }
}

struct StoredJob {
    tube: String,
    priority: u32,
    ttr: u32,
    body: Vec<u8>,
    state: JobState,
}

struct Store {
    next_id: u64,
    jobs: BTreeMap<u64, StoredJob>,
    /// Tube name → total jobs ever put into it.
    tubes: BTreeMap<String, u64>,
}

impl Default for Store {
    fn default() -> Self {
        Self {
            next_id: 1,
            jobs: BTreeMap::new(),
            tubes: BTreeMap::from([("default".to_string(), 0)]),
        }
    }
}

impl Store {
    fn count(&self, tube: Option<&str>, state: JobState) -> usize {
        self.jobs
            .values()
            .filter(|j| tube.is_none_or(|t| j.tube == t))
            .filter(|j| match (j.state, state) {
                (JobState::Reserved(_), JobState::Reserved(_)) => true,
                (a, b) => a == b,
            })
            .count()
    }

    fn next_ready(&self, tubes: &[String]) -> Option<u64> {
        self.jobs
            .iter()
            .filter(|(_, j)| j.state == JobState::Ready && tubes.contains(&j.tube))
            .min_by_key(|(id, j)| (j.priority, **id))
            .map(|(id, _)| *id)
    }

    fn first_in(&self, tube: &str, state: JobState) -> Option<u64> {
        self.jobs
            .iter()
            .filter(|(_, j)| j.tube == tube && j.state == state)
            .min_by_key(|(id, j)| (j.priority, **id))
            .map(|(id, _)| *id)
    }

    fn reserved_by(&mut self, id: u64, conn: u64) -> Option<&mut StoredJob> {
        self.jobs
            .get_mut(&id)
            .filter(|j| j.state == JobState::Reserved(conn))
    }
}

struct Session {
    conn: u64,
    used: String,
    watched: Vec<String>,
}

// ── MockBeanstalkd ───────────────────────────────────────────────

pub struct MockBeanstalkd {
    addr: SocketAddr,
    store: Arc<Mutex<Store>>,
    kill: broadcast::Sender<()>,
    accepted: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
}

impl MockBeanstalkd {
    /// Listen on an OS-assigned localhost port.
    pub async fn start() -> Self {
        Self::start_on("127.0.0.1:0").await
    }

    pub async fn start_on(addr: &str) -> Self {
        let listener = TcpListener::bind(addr).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let store = Arc::new(Mutex::new(Store::default()));
        let (kill, _) = broadcast::channel(4);
        let accepted = Arc::new(AtomicUsize::new(0));
        let active = Arc::new(AtomicUsize::new(0));

        tokio::spawn({
            let store = Arc::clone(&store);
            let kill = kill.clone();
            let accepted = Arc::clone(&accepted);
            let active = Arc::clone(&active);
            async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let conn = accepted.fetch_add(1, Ordering::SeqCst) as u64 + 1;
                    active.fetch_add(1, Ordering::SeqCst);
                    let store = Arc::clone(&store);
                    let kill_rx = kill.subscribe();
                    let active = Arc::clone(&active);
                    tokio::spawn(async move {
                        serve(stream, conn, store, kill_rx).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                    });
                }
            }
        });

        Self {
            addr,
            store,
            kill,
            accepted,
            active,
        }
    }

    pub fn addr(&self) -> String {
        self.addr.to_string()
    }

    /// Connections accepted since start.
    pub fn connections_accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Close every open connection and wait until they are gone.
    pub async fn drop_connections(&self) {
        let _ = self.kill.send(());
        let deadline = Instant::now() + Duration::from_secs(5);
        while self.active.load(Ordering::SeqCst) > 0 {
            assert!(Instant::now() < deadline, "connections did not close");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Total jobs ever put into `tube`.
    pub fn total_jobs(&self, tube: &str) -> u64 {
        self.store
            .lock()
            .unwrap()
            .tubes
            .get(tube)
            .copied()
            .unwrap_or(0)
    }
}

// ── Connection handling ──────────────────────────────────────────

async fn serve(
    stream: TcpStream,
    conn: u64,
    store: Arc<Mutex<Store>>,
    mut kill: broadcast::Receiver<()>,
) {
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read);
    let mut session = Session {
        conn,
        used: "default".into(),
        watched: vec!["default".into()],
    };

    loop {
        let mut raw = String::new();
        let n = tokio::select! {
            biased;
            _ = kill.recv() => break,
            n = reader.read_line(&mut raw) => match n {
                Ok(n) => n,
                Err(_) => break,
            },
        };
        if n == 0 {
            break;
        }
        let line = raw.trim_end_matches(['\r', '\n']);

        let reply = if line == "quit" {
            break;
        } else if let Some(args) = line.strip_prefix("put ") {
            match put(args, &mut reader, &session, &store).await {
                Some(reply) => reply,
                None => break,
            }
        } else if line == "reserve" {
            match reserve(None, &session, &store, &mut kill).await {
                Some(reply) => reply,
                None => break,
            }
        } else if let Some(seconds) = line.strip_prefix("reserve-with-timeout ") {
            let seconds = seconds.parse::<u64>().unwrap_or(0);
            let deadline = Instant::now() + Duration::from_secs(seconds);
            match reserve(Some(deadline), &session, &store, &mut kill).await {
                Some(reply) => reply,
                None => break,
            }
        } else {
            handle(line, &mut session, &store)
        };

        if write.write_all(&reply).await.is_err() {
            break;
        }
    }

    // The server releases whatever a departing client had reserved.
    let mut store = store.lock().unwrap();
    for job in store.jobs.values_mut() {
        if job.state == JobState::Reserved(conn) {
            job.state = JobState::Ready;
        }
    }
}

async fn put(
    args: &str,
    reader: &mut BufReader<OwnedReadHalf>,
    session: &Session,
    store: &Mutex<Store>,
) -> Option<Vec<u8>> {
    let fields: Vec<u64> = args.split(' ').filter_map(|f| f.parse().ok()).collect();
    let [priority, delay, ttr, len] = fields[..] else {
        return Some(status("BAD_FORMAT"));
    };

    let mut body = vec![0u8; len as usize + 2];
    reader.read_exact(&mut body).await.ok()?;
    if !body.ends_with(b"\r\n") {
        return Some(status("EXPECTED_CRLF"));
    }
    body.truncate(len as usize);

    let mut store = store.lock().unwrap();
    let id = store.next_id;
    store.next_id += 1;
    *store.tubes.entry(session.used.clone()).or_default() += 1;
    store.jobs.insert(
        id,
        StoredJob {
            tube: session.used.clone(),
            priority: priority as u32,
            ttr: ttr as u32,
            body,
            state: if delay > 0 {
                JobState::Delayed
            } else {
                JobState::Ready
            },
        },
    );
    Some(status(&format!("INSERTED {id}")))
}

/// Poll for a ready job. `None` means the connection was killed.
async fn reserve(
    deadline: Option<Instant>,
    session: &Session,
    store: &Mutex<Store>,
    kill: &mut broadcast::Receiver<()>,
) -> Option<Vec<u8>> {
    loop {
        {
            let mut store = store.lock().unwrap();
            if let Some(id) = store.next_ready(&session.watched) {
                let job = store.jobs.get_mut(&id)?;
                job.state = JobState::Reserved(session.conn);
                return Some(job_reply("RESERVED", id, &job.body));
            }
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Some(status("TIMED_OUT"));
        }
        tokio::select! {
            biased;
            _ = kill.recv() => return None,
            _ = tokio::time::sleep(Duration::from_millis(5)) => {}
        }
    }
}

fn handle(line: &str, session: &mut Session, store: &Mutex<Store>) -> Vec<u8> {
    let mut parts = line.split(' ');
    let verb = parts.next().unwrap_or_default();
    let args: Vec<&str> = parts.collect();
    let id = || args.first().and_then(|a| a.parse::<u64>().ok()).unwrap_or(0);
    let mut store = store.lock().unwrap();

    match (verb, args.as_slice()) {
        ("use", [tube]) => {
            store.tubes.entry(tube.to_string()).or_default();
            session.used = tube.to_string();
            status(&format!("USING {tube}"))
        }
        ("watch", [tube]) => {
            store.tubes.entry(tube.to_string()).or_default();
            if !session.watched.iter().any(|t| t == tube) {
                session.watched.push(tube.to_string());
            }
            status(&format!("WATCHING {}", session.watched.len()))
        }
        ("ignore", [tube]) => {
            if session.watched.len() == 1 && session.watched[0] == *tube {
                return status("NOT_IGNORED");
            }
            session.watched.retain(|t| t != tube);
            status(&format!("WATCHING {}", session.watched.len()))
        }
        ("delete", [_]) => {
            let id = id();
            let deletable = store.jobs.get(&id).is_some_and(|j| match j.state {
                JobState::Reserved(by) => by == session.conn,
                _ => true,
            });
            if deletable {
                store.jobs.remove(&id);
                status("DELETED")
            } else {
                status("NOT_FOUND")
            }
        }
        ("release", [_, priority, _]) => match store.reserved_by(id(), session.conn) {
            Some(job) => {
                job.priority = priority.parse().unwrap_or(job.priority);
                job.state = JobState::Ready;
                status("RELEASED")
            }
            None => status("NOT_FOUND"),
        },
        ("bury", [_, priority]) => match store.reserved_by(id(), session.conn) {
            Some(job) => {
                job.priority = priority.parse().unwrap_or(job.priority);
                job.state = JobState::Buried;
                status("BURIED")
            }
            None => status("NOT_FOUND"),
        },
        ("touch", [_]) => match store.reserved_by(id(), session.conn) {
            Some(_) => status("TOUCHED"),
            None => status("NOT_FOUND"),
        },
        ("peek", [_]) => found(&store, Some(id())),
        ("peek-ready", []) => found(&store, store.first_in(&session.used, JobState::Ready)),
        ("peek-delayed", []) => found(&store, store.first_in(&session.used, JobState::Delayed)),
        ("peek-buried", []) => found(&store, store.first_in(&session.used, JobState::Buried)),
        ("kick", [bound]) => {
            let bound = bound.parse::<usize>().unwrap_or(0);
            let from = if store.count(Some(session.used.as_str()), JobState::Buried) > 0 {
                JobState::Buried
            } else {
                JobState::Delayed
            };
            let used = session.used.clone();
            let kicked = store
                .jobs
                .values_mut()
                .filter(|j| j.tube == used && j.state == from)
                .take(bound)
                .map(|j| j.state = JobState::Ready)
                .count();
            status(&format!("KICKED {kicked}"))
        }
        ("stats-job", [_]) => match store.jobs.get(&id()) {
            Some(job) => ok_block(&format!(
                "---\nid: {}\ntube: {}\nstate: {}\npri: {}\nttr: {}\n",
                id(),
                job.tube,
                job.state.name(),
                job.priority,
                job.ttr
            )),
            None => status("NOT_FOUND"),
        },
        ("stats-tube", [tube]) => match store.tubes.get(*tube) {
            Some(total) => ok_block(&format!(
                "---\nname: {tube}\ncurrent-jobs-ready: {}\ncurrent-jobs-reserved: {}\n\
                 current-jobs-delayed: {}\ncurrent-jobs-buried: {}\ntotal-jobs: {total}\n",
                store.count(Some(*tube), JobState::Ready),
                store.count(Some(*tube), JobState::Reserved(0)),
                store.count(Some(*tube), JobState::Delayed),
                store.count(Some(*tube), JobState::Buried),
            )),
            None => status("NOT_FOUND"),
        },
        ("stats", []) => ok_block(&format!(
            "---\ncurrent-jobs-ready: {}\ncurrent-jobs-buried: {}\ntotal-jobs: {}\n\
             current-tubes: {}\nversion: mock\n",
            store.count(None, JobState::Ready),
            store.count(None, JobState::Buried),
            store.tubes.values().sum::<u64>(),
            store.tubes.len(),
        )),
        ("list-tubes", []) => ok_block(&yaml_list(store.tubes.keys())),
        ("list-tube-used", []) => status(&format!("USING {}", session.used)),
        ("list-tubes-watched", []) => ok_block(&yaml_list(session.watched.iter())),
        ("pause-tube", [tube, _]) => {
            if store.tubes.contains_key(*tube) {
                status("PAUSED")
            } else {
                status("NOT_FOUND")
            }
        }
        _ => status("UNKNOWN_COMMAND"),
    }
}

// ── Reply builders ───────────────────────────────────────────────

fn status(line: &str) -> Vec<u8> {
    format!("{line}\r\n").into_bytes()
}

fn job_reply(token: &str, id: u64, body: &[u8]) -> Vec<u8> {
    let mut reply = format!("{token} {id} {}\r\n", body.len()).into_bytes();
    reply.extend_from_slice(body);
    reply.extend_from_slice(b"\r\n");
    reply
}

fn found(store: &Store, id: Option<u64>) -> Vec<u8> {
    match id.and_then(|id| store.jobs.get(&id).map(|job| (id, job))) {
        Some((id, job)) => job_reply("FOUND", id, &job.body),
        None => status("NOT_FOUND"),
    }
}

fn ok_block(text: &str) -> Vec<u8> {
    format!("OK {}\r\n{text}\r\n", text.len()).into_bytes()
}

fn yaml_list<'a>(names: impl Iterator<Item = &'a String>) -> String {
    let mut text = String::from("---\n");
    for name in names {
        text.push_str("- ");
        text.push_str(name);
        text.push('\n');
    }
    text
}
