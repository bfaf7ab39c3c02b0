//! Doorbell notification.
//!
//! Buffer hand-offs are announced through a payload-free hardware doorbell:
//! the receiving side learns nothing from the interrupt itself and re-scans
//! the control block, so duplicate and spurious rings are harmless and a
//! lost ring is healed by the next one (or by a timed poll).
//!
//! The [`Mailbox`] trait is the whole contract consumed from the platform;
//! the [`Notifier`] adds the one rule the protocol needs on top: a full
//! memory fence before every ring, so the peer's ISR observes all buffer
//! and state writes that preceded the hand-off.

use core::sync::atomic::{fence, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyError {
    /// The channel is not usable (unpowered peer, bad channel id).
    ChannelUnavailable,
    /// The mailbox rejected the operation.
    SendFailed,
}

impl core::fmt::Display for NotifyError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            NotifyError::ChannelUnavailable => f.write_str("doorbell channel unavailable"),
            NotifyError::SendFailed => f.write_str("doorbell send failed"),
        }
    }
}

/// Contract consumed from the platform's inter-processor mailbox.
///
/// Channels are unidirectional and carry no payload. Callbacks run in ISR
/// context: they must only acknowledge the doorbell and schedule work.
pub trait Mailbox {
    /// Enable interrupt delivery on a receive channel.
    fn enable(&self, channel: u32) -> Result<(), NotifyError>;
    /// Ring the doorbell on a transmit channel.
    fn send(&self, channel: u32) -> Result<(), NotifyError>;
    /// Register the ISR callback for a receive channel. Called once at
    /// initialization.
    fn register_callback(&self, channel: u32, callback: fn()) -> Result<(), NotifyError>;
}

/// Doorbell channel pair for one side.
#[derive(Debug, Clone, Copy)]
pub struct DoorbellConfig {
    /// Channel that rings the peer.
    pub tx_channel: u32,
    /// Channel the peer rings us on.
    pub rx_channel: u32,
}

/// One side's view of the doorbell pair: ring the peer, hear the peer.
pub struct Notifier<M: Mailbox> {
    mailbox: M,
    config: DoorbellConfig,
}

impl<M: Mailbox> Notifier<M> {
    pub fn new(mailbox: M, config: DoorbellConfig) -> Self {
        Self { mailbox, config }
    }

    /// Enable the receive channel and register the ISR callback.
    pub fn initialize(&self, on_doorbell: fn()) -> Result<(), NotifyError> {
        self.mailbox.enable(self.config.rx_channel)?;
        self.mailbox
            .register_callback(self.config.rx_channel, on_doorbell)
    }

    /// Fence, then ring the peer. Fire and forget: the ring itself carries
    /// no meaning beyond "scan the control block".
    pub fn notify(&self) -> Result<(), NotifyError> {
        fence(Ordering::SeqCst);
        self.mailbox.send(self.config.tx_channel)
    }
}
