//! Supervisor: owns the connect/auth/subscribe/multicast-bootstrap
//! sequence, the session and the multicast receiver, and drives reconnect
//! on any session-level failure. The only thing that spawns or joins the
//! message-loop and multicast worker threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::client::{get_multicast_info, run_message_loop};
use crate::endpoint::ServerEndpoint;
use crate::error::ClientError;
use crate::identity::NodeIdentity;
use crate::keystore::Keystore;
use crate::multicast::{MulticastReceiver, SessionSender};
use crate::output::OutputChannel;
use crate::subscription::SubscriptionManager;
use crate::transport::SecureSession;
use crate::wire::MCC_SUCCESS;

pub struct Supervisor {
    endpoint: ServerEndpoint,
    identity: NodeIdentity,
    read_timeout: Duration,
    channels: Arc<Vec<Arc<dyn OutputChannel>>>,
    shutdown: Arc<AtomicBool>,
}

impl Supervisor {
    pub fn new(endpoint: ServerEndpoint, identity: NodeIdentity, read_timeout: Duration, channels: Vec<Arc<dyn OutputChannel>>) -> Self {
        Self {
            endpoint,
            identity,
            read_timeout,
            channels: Arc::new(channels),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request shutdown. Safe to call from another thread (e.g. a signal
    /// handler) and safe to call more than once.
    pub fn terminate(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    fn shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Run until `terminate()` is called or a process-fatal error occurs.
    /// Any other session-level error reconnects from scratch.
    pub fn run(&self) -> Result<(), ClientError> {
        while !self.shutting_down() {
            match self.run_session() {
                Ok(()) => {
                    if self.shutting_down() {
                        return Ok(());
                    }
                    info!("session ended cleanly, reconnecting");
                }
                Err(e) if e.is_process_fatal() => {
                    error!(error = %e, "process-fatal error, exiting");
                    return Err(e);
                }
                Err(e) => {
                    warn!(error = %e, "session-level error, reconnecting");
                }
            }
        }
        Ok(())
    }

    /// One full connect -> auth -> subscribe -> multicast-bootstrap ->
    /// message-loop cycle, with reverse-order teardown.
    fn run_session(&self) -> Result<(), ClientError> {
        let addr = self.endpoint.resolve()?;
        let session = Arc::new(SecureSession::connect(addr, self.read_timeout, &self.identity)?);

        let subscriptions = SubscriptionManager::new();
        subscriptions
            .subscribe_all(&session, &self.channels)
            .map_err(|e| ClientError::SubscribeFailed(e.to_string()))?;

        let info = get_multicast_info(&session)?;
        if info.status != MCC_SUCCESS {
            return Err(ClientError::TransportFatal(format!("multicast info request denied, status {}", info.status)));
        }

        let keystore = Arc::new(Keystore::new(info.key_id));
        let sender: Arc<dyn SessionSender> = session.clone();
        let mcast = MulticastReceiver::new(sender, keystore, Arc::clone(&self.channels));
        mcast
            .set_group_info(&info.address, info.port, info.key_id)
            .map_err(|e| ClientError::TransportFatal(e.to_string()))?;

        let result = run_message_loop(&session, &mcast, &self.channels, &self.shutdown);

        mcast.stop();
        subscriptions.unsubscribe_all(&session);
        session.close();

        result
    }
}
