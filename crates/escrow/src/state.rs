//! The escrow state machine.
//!
//! Transitions are pure: they take the caller, the clock and the revealed
//! secret and return the transfers the chain backend must execute. Keeping
//! the machine free of chain specifics means every backend enforces exactly
//! the same rules.

use model::{
    chain::ChainAddress,
    escrow::EscrowImmutables,
    secret::Secret,
    timelocks::Side,
};
use primitive_types::U256;
use thiserror::Error;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum EscrowState {
    #[default]
    Active,
    Withdrawn,
    Cancelled,
}

#[derive(Debug, Error, Eq, PartialEq)]
pub enum EscrowError {
    #[error("secret does not match the hashlock")]
    InvalidSecret,
    #[error("the stage permitting this transition has not opened yet")]
    TooEarly,
    #[error("caller may not perform this transition in the current stage")]
    Unauthorized,
    #[error("escrow is already in a terminal state")]
    AlreadyFinal,
    #[error("principal is not fully funded")]
    NotFunded,
}

/// What an escrow holds or pays out.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum Asset {
    /// The chain's native coin, used for safety deposits.
    Native,
    Token(ChainAddress),
}

/// A payout produced by a transition, to be executed by the backend.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Transfer {
    pub asset: Asset,
    pub to: ChainAddress,
    pub amount: U256,
}

/// A deployed escrow and its funding ledger.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Escrow {
    pub immutables: EscrowImmutables,
    pub side: Side,
    pub state: EscrowState,
    /// Principal deposited so far, in the escrowed token.
    pub principal: U256,
    /// Safety deposit posted so far, in the native coin.
    pub safety: U256,
    /// Source side cancellation deadline recorded at deployment, only set
    /// for destination escrows.
    pub src_cancellation: Option<u64>,
}

impl Escrow {
    /// Creates the escrow, stamping the deployment timestamp into the
    /// timelock word. All stage deadlines derive from this moment.
    pub fn deploy(
        immutables: EscrowImmutables,
        side: Side,
        deployed_at: u64,
        src_cancellation: Option<u64>,
    ) -> Self {
        let immutables = EscrowImmutables {
            timelocks: immutables.timelocks.with_deployed_at(deployed_at),
            ..immutables
        };
        Self {
            immutables,
            side,
            state: EscrowState::Active,
            principal: U256::zero(),
            safety: U256::zero(),
            src_cancellation,
        }
    }

    pub fn deposit_principal(&mut self, amount: U256) -> Result<(), EscrowError> {
        self.ensure_active()?;
        self.principal = self.principal.saturating_add(amount);
        Ok(())
    }

    pub fn deposit_safety(&mut self, amount: U256) -> Result<(), EscrowError> {
        self.ensure_active()?;
        self.safety = self.safety.saturating_add(amount);
        Ok(())
    }

    /// Whether both the principal and the safety deposit reached the
    /// amounts fixed in the immutables.
    pub fn is_funded(&self) -> bool {
        self.principal >= self.immutables.amount
            && self.safety >= self.immutables.safety_deposit
    }

    /// Who receives the principal on withdrawal: the resolver claims the
    /// source side, the maker's beneficiary the destination side.
    pub fn recipient(&self) -> &ChainAddress {
        match self.side {
            Side::Src => &self.immutables.taker,
            Side::Dst => &self.immutables.maker,
        }
    }

    /// Where the principal returns on cancellation.
    fn refund_target(&self) -> &ChainAddress {
        match self.side {
            Side::Src => &self.immutables.maker,
            Side::Dst => &self.immutables.taker,
        }
    }

    /// Pays out the principal to the designated recipient in exchange for
    /// the secret.
    ///
    /// The payout destination is fixed by the immutables, so anyone holding
    /// the secret may trigger the transition once the withdrawal stage
    /// opened. During the public window a caller other than the swap
    /// parties collects the whole safety deposit as reward, otherwise the
    /// deposit returns to the resolver that posted it.
    pub fn withdraw(
        &mut self,
        caller: &ChainAddress,
        secret: &Secret,
        now: u64,
    ) -> Result<Vec<Transfer>, EscrowError> {
        self.ensure_active()?;
        if secret.hashlock() != self.immutables.hashlock {
            return Err(EscrowError::InvalidSecret);
        }
        let timelocks = &self.immutables.timelocks;
        if now < timelocks.deadline(self.side.withdrawal()) {
            return Err(EscrowError::TooEarly);
        }
        // A destination escrow must hold the full payment before the secret
        // can be spent on it, otherwise revealing would drain the hashlock
        // without paying the maker.
        if self.side == Side::Dst && !self.is_funded() {
            return Err(EscrowError::NotFunded);
        }
        let public = now >= timelocks.deadline(self.side.public_withdrawal());
        let transfers = self.drain(self.recipient().clone(), caller, public);
        self.state = EscrowState::Withdrawn;
        Ok(transfers)
    }

    /// Returns the principal to its depositor after the cancellation stage.
    ///
    /// Privately only the resolver may cancel. Once the public window opens
    /// on the source side anyone may, collecting the safety deposit. A
    /// destination escrow additionally waits for the recorded source side
    /// cancellation deadline so it can never cancel while the source escrow
    /// is still withdrawable.
    pub fn cancel(
        &mut self,
        caller: &ChainAddress,
        now: u64,
    ) -> Result<Vec<Transfer>, EscrowError> {
        self.ensure_active()?;
        let timelocks = &self.immutables.timelocks;
        if now < timelocks.deadline(self.side.cancellation()) {
            return Err(EscrowError::TooEarly);
        }
        if let Some(src_cancellation) = self.src_cancellation {
            if now < src_cancellation {
                return Err(EscrowError::TooEarly);
            }
        }
        let public = match self.side.public_cancellation() {
            Some(stage) => now >= timelocks.deadline(stage),
            None => false,
        };
        if !public && caller != &self.immutables.taker {
            return Err(EscrowError::Unauthorized);
        }
        let transfers = self.drain(self.refund_target().clone(), caller, public);
        self.state = EscrowState::Cancelled;
        Ok(transfers)
    }

    fn ensure_active(&self) -> Result<(), EscrowError> {
        match self.state {
            EscrowState::Active => Ok(()),
            _ => Err(EscrowError::AlreadyFinal),
        }
    }

    /// Empties the escrow: principal to `principal_to`, the safety deposit
    /// to the caller when it acted during a public window without being a
    /// swap party, to the resolver otherwise.
    fn drain(
        &mut self,
        principal_to: ChainAddress,
        caller: &ChainAddress,
        public: bool,
    ) -> Vec<Transfer> {
        let mut transfers = Vec::new();
        if !self.principal.is_zero() {
            transfers.push(Transfer {
                asset: Asset::Token(self.immutables.token.clone()),
                to: principal_to,
                amount: self.principal,
            });
        }
        if !self.safety.is_zero() {
            let participant =
                caller == &self.immutables.maker || caller == &self.immutables.taker;
            let to = if public && !participant {
                caller.clone()
            } else {
                self.immutables.taker.clone()
            };
            transfers.push(Transfer {
                asset: Asset::Native,
                to,
                amount: self.safety,
            });
        }
        self.principal = U256::zero();
        self.safety = U256::zero();
        transfers
    }
}
