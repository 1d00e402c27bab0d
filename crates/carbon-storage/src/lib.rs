//! sled-backed block store for the carbon chain.
//!
//! Blocks are kept as bincode records keyed by their big-endian index, so a
//! tree scan yields them in chain order. The store does not validate what it
//! holds; `SharedChain::restore` audits the loaded blocks before use.
pub mod sled_store;

pub use sled_store::SledStore;
