//! Remote objects, handles and liveness watches.
//!
//! A [`RemoteHandle`] is the only way one component reaches another. It pairs
//! a connection identity ([`HandleToken`]) with a liveness-watch table:
//! components that keep state keyed on a peer register a [`DeathRecipient`]
//! and get exactly one `on_remote_died` call when that peer goes away.
//!
//! Recipients are held weakly. A recipient never keeps the component that
//! owns it alive, and a recipient dropped without deregistering is skipped.

use crate::parcel::Parcel;
use async_trait::async_trait;
use parking_lot::Mutex;
use samgr_common::errors::check_code;
use samgr_common::{Error, Result};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Opaque connection identity. Two handles for the same remote object share
/// a token; callbacks and listeners are compared by token, never by address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleToken(u64);

impl HandleToken {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifies one liveness-watch registration on a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(u64);

/// Whether the caller waits for the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOption {
    Sync,
    /// Fire and forget; the reply is always empty.
    OneWay,
}

/// Caller identity supplied by the transport with every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    pub calling_pid: i32,
}

impl CallContext {
    pub fn new(calling_pid: i32) -> Self {
        Self { calling_pid }
    }
}

/// Server side of an interface. Stubs implement this.
#[async_trait]
pub trait RemoteObject: Send + Sync {
    /// Interface descriptor, used in logs.
    fn descriptor(&self) -> &str;

    /// Handles one request and returns the transport status code.
    async fn on_remote_request(
        &self,
        code: u32,
        data: &mut Parcel,
        reply: &mut Parcel,
        ctx: CallContext,
    ) -> i32;
}

/// Receives the death notification of a watched handle.
pub trait DeathRecipient: Send + Sync {
    fn on_remote_died(&self, handle: &RemoteHandle);
}

struct Liveness {
    alive: bool,
    next_watch: u64,
    watches: Vec<(WatchId, Weak<dyn DeathRecipient>)>,
}

struct HandleInner {
    token: HandleToken,
    owner_pid: i32,
    object: Arc<dyn RemoteObject>,
    liveness: Mutex<Liveness>,
}

/// Reference to a remote object plus its liveness-watch registrations.
#[derive(Clone)]
pub struct RemoteHandle {
    inner: Arc<HandleInner>,
}

impl RemoteHandle {
    /// Wraps a stub served by the process `owner_pid`.
    pub fn new(object: Arc<dyn RemoteObject>, owner_pid: i32) -> Self {
        let token = HandleToken(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed));
        Self {
            inner: Arc::new(HandleInner {
                token,
                owner_pid,
                object,
                liveness: Mutex::new(Liveness {
                    alive: true,
                    next_watch: 1,
                    watches: Vec::new(),
                }),
            }),
        }
    }

    pub fn token(&self) -> HandleToken {
        self.inner.token
    }

    /// Pid of the process serving this object.
    pub fn owner_pid(&self) -> i32 {
        self.inner.owner_pid
    }

    pub fn descriptor(&self) -> &str {
        self.inner.object.descriptor()
    }

    pub fn is_alive(&self) -> bool {
        self.inner.liveness.lock().alive
    }

    /// Sends a request. A non-zero status from the stub becomes an error.
    pub async fn transact(
        &self,
        code: u32,
        mut data: Parcel,
        option: MessageOption,
        ctx: CallContext,
    ) -> Result<Parcel> {
        if !self.is_alive() {
            return Err(Error::transport(format!(
                "{} ({}) is dead",
                self.descriptor(),
                self.token()
            )));
        }
        data.rewind();
        trace!("transact {} code={} {:?}", self.token(), code, option);

        match option {
            MessageOption::OneWay => {
                let object = Arc::clone(&self.inner.object);
                let token = self.token();
                tokio::spawn(async move {
                    let mut reply = Parcel::new();
                    let status = object.on_remote_request(code, &mut data, &mut reply, ctx).await;
                    if status != 0 {
                        debug!("one-way call {} code={} returned {}", token, code, status);
                    }
                });
                Ok(Parcel::new())
            }
            MessageOption::Sync => {
                let mut reply = Parcel::new();
                let status = self
                    .inner
                    .object
                    .on_remote_request(code, &mut data, &mut reply, ctx)
                    .await;
                check_code(status)?;
                reply.rewind();
                Ok(reply)
            }
        }
    }

    /// Registers a liveness watch. Returns `None` if the handle is already
    /// dead, in which case the recipient is never called.
    pub fn add_death_recipient(&self, recipient: Weak<dyn DeathRecipient>) -> Option<WatchId> {
        let mut liveness = self.inner.liveness.lock();
        if !liveness.alive {
            return None;
        }
        let id = WatchId(liveness.next_watch);
        liveness.next_watch += 1;
        liveness.watches.push((id, recipient));
        Some(id)
    }

    /// Removes a liveness watch. Returns false if it was not registered.
    pub fn remove_death_recipient(&self, watch: WatchId) -> bool {
        let mut liveness = self.inner.liveness.lock();
        let before = liveness.watches.len();
        liveness.watches.retain(|(id, _)| *id != watch);
        liveness.watches.len() != before
    }

    /// Number of registered watches.
    pub fn watch_count(&self) -> usize {
        self.inner.liveness.lock().watches.len()
    }

    /// Marks the handle dead and fires every registered watch once.
    ///
    /// Called by the transport when the owning process terminates.
    pub fn notify_died(&self) {
        let watches = {
            let mut liveness = self.inner.liveness.lock();
            if !liveness.alive {
                return;
            }
            liveness.alive = false;
            std::mem::take(&mut liveness.watches)
        };
        debug!(
            "{} ({}) died, {} watches",
            self.descriptor(),
            self.token(),
            watches.len()
        );
        for (_, recipient) in watches {
            if let Some(recipient) = recipient.upgrade() {
                recipient.on_remote_died(self);
            }
        }
    }
}

impl PartialEq for RemoteHandle {
    fn eq(&self, other: &Self) -> bool {
        self.token() == other.token()
    }
}

impl Eq for RemoteHandle {}

impl Hash for RemoteHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.token().hash(state);
    }
}

impl fmt::Debug for RemoteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteHandle")
            .field("token", &self.token())
            .field("descriptor", &self.descriptor())
            .field("owner_pid", &self.owner_pid())
            .finish()
    }
}
