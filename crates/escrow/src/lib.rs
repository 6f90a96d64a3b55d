//! Hash time locked escrow lifecycle and the chain abstraction it runs on.
//!
//! The state machine in [`state`] is pure and shared by every backend, the
//! [`chain`] module defines how backends expose it and [`sim`] provides the
//! in process backend used for local runs and tests.

pub mod chain;
pub mod sim;
pub mod state;

pub use self::{
    chain::{Chain, ChainError, ChainRegistry, EscrowView},
    sim::SimChain,
    state::{Asset, Escrow, EscrowError, EscrowState, Transfer},
};
