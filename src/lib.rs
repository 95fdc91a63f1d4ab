//! Offline SRTP/SRTCP decoder.
//!
//! Reads a captured network trace, finds the RTP or RTCP packet in every frame
//! and prints the plaintext of those that decrypt and authenticate under a
//! user supplied crypto policy.
//!
//! The pieces, leaves first:
//!
//! * [`suite`] maps RFC 4568 crypto suite names to key and tag sizes.
//! * [`policy`] resolves command line knobs into a [`ProtectionPolicy`].
//! * [`classify`] tells RTP from RTCP, including the multiplexed case.
//! * [`decoder`] runs the per-frame loop against a [`ProtectionContext`].
//! * [`stats`] keeps the counters reported at the end of a run.
//!
//! The protection engine ([`srtp`]) and the capture source ([`capture`]) sit
//! behind traits so the decode loop can be driven by anything that yields
//! frames and unprotects packets.
//!
//! ```no_run
//! use rtp_decoder::capture::PcapSource;
//! use rtp_decoder::classify::OperatingMode;
//! use rtp_decoder::decoder::DecoderContext;
//! use rtp_decoder::key::KeyMaterial;
//! use rtp_decoder::policy::{resolve, PolicyRequest, SecurityServices};
//! use rtp_decoder::srtp::{ProtectionEngine, SrtpEngine};
//!
//! # fn main() -> Result<(), rtp_decoder::Error> {
//! let req = PolicyRequest {
//!     services: SecurityServices::CONF_AND_AUTH,
//!     key: Some(KeyMaterial::hex(
//!         "e1f97a0d3e018be0d64fa32c06de41390ec675ad498afeebb6960b3aabe6",
//!     )),
//!     ..Default::default()
//! };
//!
//! let engine = SrtpEngine::new();
//! let policy = resolve(&req, engine.capabilities())?;
//!
//! let mut source = PcapSource::open("capture.pcap".as_ref())?;
//! let offset = rtp_decoder::capture::default_payload_offset(source.datalink());
//!
//! let mut decoder = DecoderContext::new(engine.create(&policy)?, OperatingMode::Rtp, offset);
//! decoder.run(&mut source, &mut std::io::stdout())?;
//!
//! eprintln!("{}", decoder.stats().summary(OperatingMode::Rtp));
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![allow(clippy::new_without_default)]
#![allow(clippy::manual_range_contains)]

#[macro_use]
extern crate tracing;

pub mod capture;
pub mod classify;
pub mod config;
pub mod decoder;
pub mod key;
pub mod output;
pub mod policy;
pub mod srtp;
pub mod stats;
pub mod suite;

mod error;
pub use error::{ConfigError, Error};

mod util;

pub use policy::ProtectionPolicy;
pub use srtp::ProtectionContext;
