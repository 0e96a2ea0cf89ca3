//! Connection establishment with the remote model
//!
//! This module handles:
//! - Ephemeral credential issuance
//! - Microphone acquisition
//! - Offer/answer exchange with the remote peer
//! - The transport carrying audio tracks and the protocol data channel

mod client;
mod negotiate;
mod token;
mod transport;

pub use client::{ConnectTimeouts, Connection, SignalingClient};
pub use negotiate::{HttpNegotiator, Negotiator, SdpType, SessionDescription};
pub use token::{EphemeralCredential, HttpTokenIssuer, TokenIssuer};
pub use transport::{PeerTransport, TransportEvent, TransportFactory, TransportGuard, TransportSpec};
