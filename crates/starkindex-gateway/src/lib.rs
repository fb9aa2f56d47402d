//! starkindex-gateway: Starknet feeder-gateway [`BlockSource`](starkindex_core::ports::BlockSource).
//!
//! ```rust,no_run
//! use starkindex_gateway::FeederGatewayClient;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let source = FeederGatewayClient::default_for("https://alpha-mainnet.starknet.io")?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod feeder;

pub use client::{FeederGatewayClient, GatewayConfig};
pub use feeder::{decode_block, RawBlock};
