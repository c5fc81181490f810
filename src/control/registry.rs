//! Client Registry
//!
//! Tracks at most one registered remote controller per transport. A binding
//! is only ever cleared by an explicit, matching unregister; a second
//! registration while one is active is refused and the newcomer is told so.

use super::engine::{Engine, EngineEvent};
use super::notifier::{callback_message, OscSender, ReplyTarget};
use super::origin_url::parse_origin_url;
use super::types::{ControlError, ControlResult, Origin, Transport};
use rosc::{OscMessage, OscType};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

/// Text of the notice sent to a refused controller
pub const CONFLICT_NOTICE: &str = "OSC already registered to another client";

/// The registered controller of one transport
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientBinding {
    owner: String,
    target: ReplyTarget,
    path: String,
}

impl ClientBinding {
    /// Origin URL exactly as the controller registered it
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn target(&self) -> &ReplyTarget {
        &self.target
    }

    /// Base path notifications are sent under
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// One single-owner slot per transport
pub struct ClientRegistry {
    tcp: RwLock<Option<ClientBinding>>,
    udp: RwLock<Option<ClientBinding>>,
    sender: Arc<dyn OscSender>,
}

impl ClientRegistry {
    pub fn new(sender: Arc<dyn OscSender>) -> Self {
        Self {
            tcp: RwLock::new(None),
            udp: RwLock::new(None),
            sender,
        }
    }

    fn slot(&self, transport: Transport) -> &RwLock<Option<ClientBinding>> {
        match transport {
            Transport::Tcp => &self.tcp,
            Transport::Udp => &self.udp,
        }
    }

    fn read(&self, transport: Transport) -> RwLockReadGuard<'_, Option<ClientBinding>> {
        self.slot(transport)
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, transport: Transport) -> RwLockWriteGuard<'_, Option<ClientBinding>> {
        self.slot(transport)
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current binding, if any
    pub fn binding(&self, transport: Transport) -> Option<ClientBinding> {
        self.read(transport).clone()
    }

    pub fn is_registered(&self, transport: Transport) -> bool {
        self.read(transport).is_some()
    }

    /// Build and send a message to the bound controller while holding the
    /// slot's read lock. Returns `false` if nobody is bound.
    pub fn send_to<F>(&self, transport: Transport, build: F) -> ControlResult<bool>
    where
        F: FnOnce(&ClientBinding) -> OscMessage,
    {
        let slot = self.read(transport);
        match slot.as_ref() {
            Some(binding) => {
                self.sender.send(&binding.target, build(binding))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Bind `url` as the controller of `transport`.
    ///
    /// On the stream transport the new controller also receives the engine
    /// snapshot: engine info, one plugin-added notice per plugin, then a
    /// patchbay refresh.
    pub fn register(&self, transport: Transport, url: &str, engine: &dyn Engine) -> ControlResult<()> {
        let mut slot = self.write(transport);

        if let Some(existing) = slot.as_ref() {
            let owner = existing.owner.clone();
            drop(slot);
            self.send_conflict_notice(transport, url);
            return Err(ControlError::RegistrationConflict { transport, owner });
        }

        let origin = parse_origin_url(url)?;
        let binding = ClientBinding {
            owner: url.to_string(),
            target: ReplyTarget {
                transport,
                addr: origin.socket_addr(url)?,
            },
            path: origin.path,
        };

        info!("{} backend registered to {}", transport, url);

        // A stream left over from an earlier binding at this address may be dead
        self.sender.forget(&binding.target);

        if !transport.is_stream() {
            *slot = Some(binding);
            return Ok(());
        }

        // The write lock is held while the snapshot goes out, so engine
        // events racing with registration queue up behind it.
        let snapshot = engine.snapshot();
        let mut events = Vec::with_capacity(snapshot.plugins.len() + 1);
        events.push(EngineEvent::EngineStarted(snapshot.info.clone()));
        events.extend(
            snapshot
                .plugins
                .iter()
                .map(|(id, name)| EngineEvent::PluginAdded {
                    id: *id,
                    name: name.clone(),
                }),
        );

        for event in &events {
            let message = callback_message(&binding.path, event);
            if let Err(e) = self.sender.send(&binding.target, message) {
                debug!("Failed to send snapshot to {}: {}", url, e);
                break;
            }
        }

        *slot = Some(binding);
        drop(slot);

        // Graph notices flow back through the notifier, which needs the lock
        if let Err(e) = engine.patchbay_refresh(snapshot.external_patchbay, Origin::Internal) {
            debug!("Patchbay refresh after registration failed: {}", e);
        }

        Ok(())
    }

    /// Tell a refused controller that the slot is taken
    fn send_conflict_notice(&self, transport: Transport, url: &str) {
        let origin = match parse_origin_url(url) {
            Ok(origin) => origin,
            Err(e) => {
                debug!("Cannot send conflict notice: {}", e);
                return;
            }
        };

        let target = match origin.socket_addr(url) {
            Ok(addr) => ReplyTarget { transport, addr },
            Err(e) => {
                debug!("Cannot send conflict notice: {}", e);
                return;
            }
        };

        let message = OscMessage {
            addr: format!("{}/exit-error", origin.path),
            args: vec![OscType::String(CONFLICT_NOTICE.to_string())],
        };

        if let Err(e) = self.sender.send(&target, message) {
            debug!("Failed to send conflict notice to {}: {}", url, e);
        }
    }

    /// Clear the binding of `transport` if `url` is its owner
    pub fn unregister(&self, transport: Transport, url: &str) -> ControlResult<()> {
        let mut slot = self.write(transport);

        match slot.as_ref() {
            None => Err(ControlError::NotRegistered { transport }),
            Some(binding) if binding.owner != url => Err(ControlError::UnregisterOwnerMismatch {
                transport,
                owner: binding.owner.clone(),
                requested: url.to_string(),
            }),
            Some(binding) => {
                self.sender.forget(&binding.target);
                *slot = None;
                info!("{} client {} unregistered", transport, url);
                Ok(())
            }
        }
    }
}
