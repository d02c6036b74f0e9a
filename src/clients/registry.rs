//! Registry of connected wands
//!
//! Each wand sits behind its own lock. Readers lock only their own wand to
//! enqueue; the mixer snapshots the entry list and then locks one wand at a
//! time, so a slow wand never stalls decoding for the others.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;

use super::client::{ClientSlot, ClientStatus, Lifecycle};
use crate::audio::buffer::PushOutcome;
use crate::config::RelayConfig;
use crate::protocol::frame::AudioPacket;

/// Shared handle to one wand
pub type SharedClient = Arc<Mutex<ClientSlot>>;

/// Per-wand buffer settings
#[derive(Debug, Clone, Copy)]
pub struct BufferSettings {
    pub buffer_limit: usize,
    pub max_queue_depth: usize,
    pub fade_length: usize,
}

impl From<&RelayConfig> for BufferSettings {
    fn from(config: &RelayConfig) -> Self {
        Self {
            buffer_limit: config.buffer_limit,
            max_queue_depth: config.max_queue_depth,
            fade_length: config.fade_length,
        }
    }
}

/// Map of wand address to its audio state
pub struct ClientRegistry {
    clients: DashMap<SocketAddr, SharedClient>,
    settings: BufferSettings,
}

impl ClientRegistry {
    pub fn new(settings: BufferSettings) -> Self {
        Self {
            clients: DashMap::new(),
            settings,
        }
    }

    fn new_slot(&self, addr: SocketAddr) -> SharedClient {
        Arc::new(Mutex::new(ClientSlot::new(
            addr,
            self.settings.buffer_limit,
            self.settings.max_queue_depth,
            self.settings.fade_length,
        )))
    }

    /// Register a wand. An open wand is returned as is; a closing or closed
    /// one is replaced by a fresh slot (the peer reconnected).
    pub fn register(&self, addr: SocketAddr) -> SharedClient {
        match self.clients.entry(addr) {
            Entry::Occupied(mut entry) => {
                let reusable = entry.get().lock().lifecycle() == Lifecycle::Open;
                if !reusable {
                    tracing::info!("Wand {} re-registered", addr);
                    entry.insert(self.new_slot(addr));
                }
                entry.get().clone()
            }
            Entry::Vacant(entry) => entry.insert(self.new_slot(addr)).value().clone(),
        }
    }

    pub fn get(&self, addr: &SocketAddr) -> Option<SharedClient> {
        self.clients.get(addr).map(|c| c.value().clone())
    }

    /// Queue a packet for a registered wand
    pub fn enqueue(&self, addr: &SocketAddr, packet: AudioPacket) -> Option<PushOutcome> {
        let client = self.get(addr)?;
        let outcome = client.lock().enqueue(packet);
        outcome
    }

    /// Next raw packet for a wand, honouring its buffering state
    pub fn try_dequeue(&self, addr: &SocketAddr) -> Option<AudioPacket> {
        let client = self.get(addr)?;
        let packet = client.lock().try_dequeue();
        packet
    }

    /// The peer went away
    pub fn mark_closing(&self, addr: &SocketAddr) -> bool {
        match self.get(addr) {
            Some(client) => client.lock().mark_closing(),
            None => false,
        }
    }

    /// Every wand that is not closed
    pub fn active(&self) -> Vec<(SocketAddr, SharedClient)> {
        self.clients
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .filter(|(_, client)| client.lock().lifecycle() != Lifecycle::Closed)
            .collect()
    }

    /// Drop a wand's slot once it is closed. A slot that was re-registered in
    /// the meantime is left alone.
    pub fn reap(&self, addr: &SocketAddr) -> bool {
        self.clients
            .remove_if(addr, |_, client| client.lock().lifecycle() == Lifecycle::Closed)
            .is_some()
    }

    pub fn statuses(&self) -> Vec<ClientStatus> {
        let mut statuses: Vec<_> = self.clients.iter().map(|c| c.value().lock().status()).collect();
        statuses.sort_by_key(|s| s.address);
        statuses
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn settings(&self) -> BufferSettings {
        self.settings
    }
}
