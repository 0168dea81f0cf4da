use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use huddle_protocol::{Packet, ProtocolError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, warn};

use crate::broadcast::BroadcastMessage;
use crate::config::{
    MAX_BUFFER_SIZE, MAX_CHANNEL_NAME_LEN, MAX_CHAT_MESSAGE_LEN, MAX_DISPLAY_NAME_LEN,
    MAX_SIGNAL_PAYLOAD_LEN, PACKET_BUFFER_SIZE,
};
use crate::error::ServerError;
use crate::state::{ClientId, Outgoing, RelayState, SignalKind};

/// Per-connection task: reads client packets, funnels mutations through
/// the shared state, and forwards broadcast frames addressed to this
/// client.
pub struct ClientHandler {
    id: ClientId,
    socket: TcpStream,
    address: SocketAddr,
    state: Arc<RwLock<RelayState>>,
    broadcast_tx: broadcast::Sender<BroadcastMessage>,
}

impl ClientHandler {
    pub fn new(
        id: ClientId,
        socket: TcpStream,
        address: SocketAddr,
        state: Arc<RwLock<RelayState>>,
        broadcast_tx: broadcast::Sender<BroadcastMessage>,
    ) -> Self {
        Self {
            id,
            socket,
            address,
            state,
            broadcast_tx,
        }
    }

    /// Drives the connection until it closes, then runs the disconnect
    /// cleanup exactly once.
    pub async fn handle(&mut self) -> Result<(), ServerError> {
        let result = self.run_loop().await;
        self.disconnect().await;
        result
    }

    async fn run_loop(&mut self) -> Result<(), ServerError> {
        let mut read_buf = vec![0u8; PACKET_BUFFER_SIZE];
        let mut packet_buffer = Vec::new(); // Accumulates partial packets
        let mut broadcast_rx = self.broadcast_tx.subscribe();

        loop {
            tokio::select! {
                read_result = self.socket.read(&mut read_buf) => {
                    match read_result {
                        Ok(0) => {
                            debug!("[{}] connection closed", self.address);
                            return Ok(());
                        }
                        Ok(n) => {
                            packet_buffer.extend_from_slice(&read_buf[..n]);
                            if packet_buffer.len() > MAX_BUFFER_SIZE {
                                error!("[{}] reassembly buffer overflow", self.address);
                                return Ok(());
                            }

                            // Process all complete packets in the buffer.
                            loop {
                                match Packet::decode(&packet_buffer) {
                                    Ok((packet, size)) => {
                                        packet_buffer.drain(..size);
                                        if let Err(e) = self.dispatch(packet).await {
                                            error!("[{}] error handling packet: {}", self.address, e);
                                        }
                                    }
                                    Err(ProtocolError::IncompletePayload { .. })
                                    | Err(ProtocolError::PacketTooShort { .. }) => {
                                        // Not enough data yet, wait for more.
                                        break;
                                    }
                                    Err(e) => {
                                        warn!("[{}] protocol error: {}, clearing buffer", self.address, e);
                                        packet_buffer.clear();
                                        break;
                                    }
                                }
                            }
                        }
                        Err(e) => {
                            error!("[{}] TCP receive error: {}", self.address, e);
                            return Ok(());
                        }
                    }
                }

                broadcast_result = broadcast_rx.recv() => {
                    match broadcast_result {
                        Ok(message) => {
                            if message.should_send_to(self.id) {
                                if let Err(e) = self.send_frame(message.data()).await {
                                    error!("[{}] failed to forward event: {}", self.address, e);
                                    return Ok(());
                                }
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("[{}] broadcast channel lagged, {} events dropped", self.address, skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            error!("[{}] broadcast channel closed", self.address);
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    async fn dispatch(&mut self, packet: Packet) -> Result<(), ServerError> {
        match packet {
            Packet::Join { display_name } => self.handle_join(display_name).await,
            Packet::ChatMessage { message } => self.handle_chat(message).await,
            Packet::JoinVoiceChannel { channel } => self.handle_join_channel(channel).await,
            Packet::LeaveVoiceChannel => {
                let mut state = self.state.write().await;
                let effects = state.leave_channel(self.id);
                self.publish(effects);
                Ok(())
            }
            Packet::WebrtcOffer { target_id, payload } => {
                self.relay(target_id, SignalKind::Offer, payload).await
            }
            Packet::WebrtcAnswer { target_id, payload } => {
                self.relay(target_id, SignalKind::Answer, payload).await
            }
            Packet::WebrtcIceCandidate { target_id, payload } => {
                self.relay(target_id, SignalKind::IceCandidate, payload).await
            }
            Packet::Ping { nonce } => {
                self.send_packet(&Packet::Pong { nonce }).await
            }
            other => {
                warn!("[{}] unexpected packet: {:?}", self.address, other);
                Ok(())
            }
        }
    }

    async fn handle_join(&mut self, display_name: String) -> Result<(), ServerError> {
        if let Err(reason) = validate_display_name(&display_name) {
            warn!("[{}] rejected join: {}", self.address, reason);
            return self
                .send_packet(&Packet::Error {
                    message: reason.to_string(),
                })
                .await;
        }

        debug!("[{}] {} joined as client {}", self.address, display_name, self.id);
        let mut state = self.state.write().await;
        let effects = state.join(self.id, display_name)?;
        self.publish(effects);
        Ok(())
    }

    async fn handle_chat(&mut self, message: String) -> Result<(), ServerError> {
        if message.len() > MAX_CHAT_MESSAGE_LEN {
            warn!("[{}] rejected chat: message too long", self.address);
            return self
                .send_packet(&Packet::Error {
                    message: "chat message too long".to_string(),
                })
                .await;
        }

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        let mut state = self.state.write().await;
        let effects = state.chat(self.id, message, timestamp)?;
        self.publish(effects);
        Ok(())
    }

    async fn handle_join_channel(&mut self, channel: String) -> Result<(), ServerError> {
        if let Err(reason) = validate_channel_name(&channel) {
            warn!("[{}] rejected channel join: {}", self.address, reason);
            return self
                .send_packet(&Packet::Error {
                    message: reason.to_string(),
                })
                .await;
        }

        let mut state = self.state.write().await;
        let effects = state.join_channel(self.id, &channel)?;
        self.publish(effects);
        Ok(())
    }

    async fn relay(
        &mut self,
        target_id: ClientId,
        kind: SignalKind,
        payload: Vec<u8>,
    ) -> Result<(), ServerError> {
        if payload.len() > MAX_SIGNAL_PAYLOAD_LEN {
            warn!("[{}] rejected {:?}: payload too large", self.address, kind);
            return self
                .send_packet(&Packet::Error {
                    message: "signaling payload too large".to_string(),
                })
                .await;
        }

        let mut state = self.state.write().await;
        let effects = state.relay_signal(self.id, target_id, kind, payload);
        self.publish(effects);
        Ok(())
    }

    /// Publishes state-op effects in order on the broadcast channel.
    /// Callers keep the state write guard held across this call, so
    /// publish order on the channel matches mutation order in the
    /// state. Send errors mean no subscribers, which is fine.
    fn publish(&self, effects: Vec<Outgoing>) {
        for effect in effects {
            let _ = self
                .broadcast_tx
                .send(BroadcastMessage::new(effect.recipients, &effect.packet));
        }
    }

    async fn send_packet(&mut self, packet: &Packet) -> Result<(), ServerError> {
        self.send_frame(&packet.encode()).await
    }

    async fn send_frame(&mut self, frame: &[u8]) -> Result<(), ServerError> {
        self.socket.write_all(frame).await?;
        self.socket.flush().await?;
        Ok(())
    }

    async fn disconnect(&mut self) {
        let mut state = self.state.write().await;
        let effects = state.disconnect_cleanup(self.id);
        self.publish(effects);
        debug!("[{}] client {} cleaned up", self.address, self.id);
    }
}

/// Display names are self-asserted but still bounded and printable.
fn validate_display_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("display name must not be empty");
    }
    if name.len() > MAX_DISPLAY_NAME_LEN {
        return Err("display name too long");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == ' ')
    {
        return Err("display name contains invalid characters");
    }
    Ok(())
}

fn validate_channel_name(channel: &str) -> Result<(), &'static str> {
    if channel.trim().is_empty() {
        return Err("channel name must not be empty");
    }
    if channel.len() > MAX_CHANNEL_NAME_LEN {
        return Err("channel name too long");
    }
    Ok(())
}
