//! TN3270 session facade
//!
//! A [`Session`] owns one protocol state machine behind an
//! [`AdmissionGate`], a transport, and the channels callers observe it
//! through. Inbound chunks are processed by a reader task, one chunk at a
//! time with the gate held; operator actions take the same gate.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::AbortHandle;

use crate::config::SessionConfig;
use crate::error::{ConfigError, Result, SessionError};
use crate::events::SessionEvent;
use crate::gate::AdmissionGate;
use crate::lib3270::codes::AidKey;
use crate::lib3270::negotiation::SessionState;
use crate::lib3270::orders::OrderHandler;
use crate::protocol_common::ebcdic::{CodePageRegistry, CodePageTranslator};
use crate::protocol_state::ProtocolStateMachine;
use crate::transport::{TcpTransport, Transport, TransportEvent, TransportLink};

/// Read-only view of the session, refreshed after every gated operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub state: SessionState,
    pub connected: bool,
    pub tn3270e: bool,
    pub keyboard_locked: bool,
    pub device_name: String,
    /// (row, column) of the cursor
    pub cursor: (usize, usize),
    pub connected_at: Option<DateTime<Utc>>,
}

impl SessionStatus {
    fn capture(core: &SessionCore) -> Self {
        let machine = &core.machine;
        Self {
            state: machine.state(),
            connected: core.link.is_some() && machine.is_connected(),
            tn3270e: machine.is_tn3270e(),
            keyboard_locked: machine.is_keyboard_locked(),
            device_name: machine.device_name().to_string(),
            cursor: machine.screen().cursor_position(),
            connected_at: core.connected_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CursorPosition {
    pub row: usize,
    pub column: usize,
}

/// Diagnostic snapshot, serialized with camelCase keys
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub device_type: String,
    pub device_name: String,
    pub model: u8,
    pub rows: usize,
    pub columns: usize,
    pub cursor: CursorPosition,
    pub state: String,
    pub connected: bool,
    pub tn3270e: bool,
    pub keyboard_locked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_at: Option<DateTime<Utc>>,
}

/// Everything guarded by the admission gate
#[derive(Debug)]
struct SessionCore {
    machine: ProtocolStateMachine,
    link: Option<TransportLink>,
    /// Bumped on every connect and teardown; stale readers stop
    epoch: u64,
    connected_at: Option<DateTime<Utc>>,
    code_pages: CodePageRegistry,
}

#[derive(Debug)]
struct Shared {
    gate: AdmissionGate<SessionCore>,
    events: broadcast::Sender<SessionEvent>,
    status: watch::Sender<SessionStatus>,
    /// Kept outside the gate so a drop can stop a reader that holds it
    reader: Mutex<Option<AbortHandle>>,
}

impl Shared {
    fn emit(&self, event: SessionEvent) {
        log::debug!("event: {}", event);
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn publish(&self, core: &SessionCore) {
        self.status.send_replace(SessionStatus::capture(core));
    }

    fn replace_reader(&self, reader: Option<AbortHandle>) -> Option<AbortHandle> {
        let mut slot = self.reader.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *slot, reader)
    }

    fn send_outbound(core: &SessionCore, outbound: Vec<Vec<u8>>) {
        for bytes in outbound {
            match &core.link {
                Some(link) => {
                    if let Err(e) = link.send(bytes) {
                        log::error!("write failed: {}", e);
                    }
                }
                None => log::warn!("dropping {} byte write, no transport", bytes.len()),
            }
        }
    }

    /// Send queued writes, publish the new status, then the queued events
    fn flush(&self, core: &mut SessionCore) {
        let effects = core.machine.take_effects();
        Self::send_outbound(core, effects.outbound);
        self.publish(core);
        for event in effects.events {
            self.emit(event);
        }
    }

    /// Reset the protocol state and drop the transport
    fn teardown(&self, core: &mut SessionCore) {
        core.machine.disconnect();
        let effects = core.machine.take_effects();
        Self::send_outbound(core, effects.outbound);

        if let Some(link) = core.link.take() {
            link.close();
        }
        if let Some(reader) = self.replace_reader(None) {
            reader.abort();
        }
        core.epoch += 1;
        core.connected_at = None;

        self.publish(core);
        for event in effects.events {
            self.emit(event);
        }
    }
}

async fn run_reader(shared: Arc<Shared>, mut inbound: mpsc::Receiver<TransportEvent>, epoch: u64) {
    while let Some(event) = inbound.recv().await {
        match event {
            TransportEvent::Data(bytes) => {
                shared.emit(SessionEvent::Data(bytes.clone()));
                let mut core = match shared.gate.acquire().await {
                    Ok(core) => core,
                    Err(e) => {
                        log::error!("dropping {} received bytes: {}", bytes.len(), e);
                        shared.emit(SessionEvent::SocketError(e.to_string()));
                        continue;
                    }
                };
                if core.epoch != epoch {
                    break;
                }

                let result = core.machine.process_chunk(&bytes);
                shared.flush(&mut core);
                if let Err(e) = result {
                    log::error!("disconnecting: {}", e);
                    shared.teardown(&mut core);
                    break;
                }
            }
            TransportEvent::Error(message) => shared.emit(SessionEvent::SocketError(message)),
            TransportEvent::Closed => {
                match shared.gate.acquire().await {
                    Ok(mut core) if core.epoch == epoch => {
                        shared.emit(SessionEvent::SocketClose);
                        shared.teardown(&mut core);
                    }
                    Ok(_) => {}
                    Err(e) => log::error!("socket closed but session not reset: {}", e),
                }
                break;
            }
        }
    }
    log::debug!("reader for connection {} finished", epoch);
}

/// Builder for sessions with a custom transport, code pages or orders
pub struct SessionBuilder {
    config: SessionConfig,
    transport: Option<Arc<dyn Transport>>,
    code_pages: CodePageRegistry,
    order_handlers: Vec<(u8, Arc<dyn OrderHandler>)>,
}

impl SessionBuilder {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            transport: None,
            code_pages: CodePageRegistry::new(),
            order_handlers: Vec::new(),
        }
    }

    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn code_page_translator(
        mut self,
        name: impl Into<String>,
        translator: Arc<dyn CodePageTranslator>,
    ) -> Self {
        self.code_pages.register(name, translator);
        self
    }

    pub fn order_handler(mut self, code: u8, handler: Arc<dyn OrderHandler>) -> Self {
        self.order_handlers.push((code, handler));
        self
    }

    /// Validate the configuration and create a disconnected session
    pub fn build(self) -> std::result::Result<Session, ConfigError> {
        self.config.validate()?;
        let translator = self.config.resolve_code_page(&self.code_pages)?;

        let mut machine = ProtocolStateMachine::new(
            self.config.device_type,
            self.config.device_name.clone(),
            translator,
        );
        for (code, handler) in self.order_handlers {
            machine.register_order_handler(code, handler);
        }

        let core = SessionCore {
            machine,
            link: None,
            epoch: 0,
            connected_at: None,
            code_pages: self.code_pages,
        };
        let (events, _) = broadcast::channel(self.config.event_capacity.max(1));
        let (status, _) = watch::channel(SessionStatus::capture(&core));

        Ok(Session {
            shared: Arc::new(Shared {
                gate: AdmissionGate::new(core, self.config.lock_timeout()),
                events,
                status,
                reader: Mutex::new(None),
            }),
            transport: self.transport.unwrap_or_else(|| Arc::new(TcpTransport)),
            config: self.config,
        })
    }
}

/// A TN3270 client session
pub struct Session {
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    shared: Arc<Shared>,
}

impl Session {
    /// Session over TCP
    pub fn new(config: SessionConfig) -> std::result::Result<Self, ConfigError> {
        SessionBuilder::new(config).build()
    }

    pub fn builder(config: SessionConfig) -> SessionBuilder {
        SessionBuilder::new(config)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Lifecycle events from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    /// Status updates from now on
    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.shared.status.subscribe()
    }

    pub fn status(&self) -> SessionStatus {
        self.shared.status.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.status.borrow().connected
    }

    pub fn is_tn3270e(&self) -> bool {
        self.shared.status.borrow().tn3270e
    }

    pub fn is_keyboard_locked(&self) -> bool {
        self.shared.status.borrow().keyboard_locked
    }

    /// Device name assigned by the host, or the one requested
    pub fn device_name(&self) -> String {
        self.shared.status.borrow().device_name.clone()
    }

    pub fn state(&self) -> SessionState {
        self.shared.status.borrow().state
    }

    /// Open the transport and start negotiating
    pub async fn connect(&self) -> Result<()> {
        let mut core = self.shared.gate.acquire().await?;
        if core.link.is_some() {
            return Err(SessionError::AlreadyConnected);
        }

        let mut link = match self.transport.connect(&self.config.host, self.config.port).await {
            Ok(link) => link,
            Err(e) => {
                log::error!("connection to {}:{} failed: {}", self.config.host, self.config.port, e);
                self.shared.emit(SessionEvent::SocketError(e.to_string()));
                return Err(e.into());
            }
        };
        let inbound = link.take_inbound().ok_or_else(|| {
            SessionError::Transport(std::io::Error::new(
                std::io::ErrorKind::Other,
                "transport link has no inbound channel",
            ))
        })?;

        core.epoch += 1;
        let epoch = core.epoch;
        core.link = Some(link);
        core.connected_at = Some(Utc::now());
        core.machine.on_connected();
        self.shared.flush(&mut core);

        let reader = tokio::spawn(run_reader(self.shared.clone(), inbound, epoch));
        self.shared.replace_reader(Some(reader.abort_handle()));
        log::debug!("connected to {}:{}", self.config.host, self.config.port);
        Ok(())
    }

    /// Tear down the transport and reset negotiation state
    ///
    /// Emits `close` every time it runs, connected or not.
    pub async fn disconnect(&self) -> Result<()> {
        let mut core = self.shared.gate.acquire().await?;
        self.shared.teardown(&mut core);
        Ok(())
    }

    /// Send PF1..PF24 with all modified fields
    pub async fn send_pf(&self, number: u8) -> Result<()> {
        let aid = AidKey::pf(number).ok_or(SessionError::InvalidFunctionKey(number))?;
        self.send_aid(aid).await
    }

    pub async fn send_enter(&self) -> Result<()> {
        self.send_aid(AidKey::Enter).await
    }

    /// Send any attention key
    ///
    /// Enter and PF keys carry every modified field; Clear and PA keys
    /// carry only the AID and cursor address.
    pub async fn send_aid(&self, aid: AidKey) -> Result<()> {
        let mut core = self.shared.gate.acquire().await?;
        if core.link.is_none() {
            return Err(SessionError::NotConnected);
        }

        match aid {
            AidKey::Enter | AidKey::PF(_) => {
                let payload = core.machine.screen().read_all_modified();
                core.machine.send_aid(aid, &payload);
            }
            _ => core.machine.send_aid(aid, &[]),
        }
        self.shared.flush(&mut core);
        Ok(())
    }

    /// Type text at the cursor or at (row, column)
    pub async fn write_string(&self, text: &str, position: Option<(usize, usize)>) -> Result<()> {
        let mut core = self.shared.gate.acquire().await?;
        let result = core.machine.write_string(text, position);
        self.shared.publish(&core);
        Ok(result?)
    }

    pub async fn register_order_handler(&self, code: u8, handler: Arc<dyn OrderHandler>) -> Result<()> {
        let mut core = self.shared.gate.acquire().await?;
        core.machine.register_order_handler(code, handler);
        Ok(())
    }

    /// Register a translator; one registered under the configured code
    /// page name takes effect immediately
    pub async fn register_code_page_translator(
        &self,
        name: impl Into<String>,
        translator: Arc<dyn CodePageTranslator>,
    ) -> Result<()> {
        let name = name.into();
        let mut core = self.shared.gate.acquire().await?;
        if name == self.config.code_page {
            core.machine.set_translator(translator.clone());
        }
        core.code_pages.register(name, translator);
        Ok(())
    }

    /// Screen text, one line per row
    pub async fn screen_text(&self) -> Result<String> {
        let core = self.shared.gate.acquire().await?;
        Ok(core.machine.screen().to_string())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let status = self.status();
        let device_type = self.config.device_type;
        let model = device_type.model();
        SessionSnapshot {
            device_type: device_type.as_str().to_string(),
            device_name: status.device_name,
            model: model.number(),
            rows: model.rows(),
            columns: model.cols(),
            cursor: CursorPosition {
                row: status.cursor.0,
                column: status.cursor.1,
            },
            state: status.state.name().to_string(),
            connected: status.connected,
            tn3270e: status.tn3270e,
            keyboard_locked: status.keyboard_locked,
            connected_at: status.connected_at,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self.snapshot()).unwrap_or_default()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("status", &*self.shared.status.borrow())
            .finish()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(reader) = self.shared.replace_reader(None) {
            reader.abort();
        }
        if let Some(mut core) = self.shared.gate.try_acquire() {
            core.link.take();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ChannelTransport;

    #[test]
    fn test_build_rejects_unknown_code_page() {
        let config = SessionConfig::new("zos").with_code_page("cp500");
        assert!(matches!(
            Session::new(config),
            Err(ConfigError::UnknownCodePage(name)) if name == "cp500"
        ));
    }

    #[test]
    fn test_build_accepts_registered_code_page() {
        let config = SessionConfig::new("zos").with_code_page("cp500");
        let session = Session::builder(config)
            .code_page_translator("cp500", Arc::new(crate::protocol_common::ebcdic::Cp037Translator))
            .build()
            .unwrap();
        assert!(!session.is_connected());
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_snapshot_before_connect() {
        let (transport, _accepted) = ChannelTransport::new();
        let config = SessionConfig::new("zos").with_device_type("IBM-3278-3").unwrap();
        let session = Session::builder(config).transport(transport).build().unwrap();

        let json = session.to_json();
        assert_eq!(json["deviceType"], "IBM-3278-3");
        assert_eq!(json["model"], 3);
        assert_eq!(json["rows"], 32);
        assert_eq!(json["columns"], 80);
        assert_eq!(json["cursor"]["row"], 0);
        assert_eq!(json["state"], "DISCONNECTED");
        assert!(json.get("connectedAt").is_none());
    }

    #[tokio::test]
    async fn test_send_enter_requires_connection() {
        let (transport, _accepted) = ChannelTransport::new();
        let session = Session::builder(SessionConfig::new("zos"))
            .transport(transport)
            .build()
            .unwrap();
        assert!(matches!(session.send_enter().await, Err(SessionError::NotConnected)));
        assert!(matches!(
            session.send_pf(30).await,
            Err(SessionError::InvalidFunctionKey(30))
        ));
    }

    #[tokio::test]
    async fn test_drop_stops_reader_while_gate_is_held() {
        let (transport, mut accepted) = ChannelTransport::new();
        let session = Session::builder(SessionConfig::new("zos"))
            .transport(transport)
            .build()
            .unwrap();
        session.connect().await.unwrap();
        let mut host = accepted.recv().await.unwrap();

        let shared = session.shared.clone();
        let guard = shared.gate.acquire().await.unwrap();
        drop(session);
        drop(guard);
        drop(shared);

        let closed = tokio::time::timeout(std::time::Duration::from_secs(1), async {
            while host.recv().await.is_some() {}
        })
        .await;
        assert!(closed.is_ok(), "transport still open after the session was dropped");
    }
}
