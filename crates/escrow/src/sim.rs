//! In process chain backend.
//!
//! Keeps a token ledger and a set of escrows behind a settable clock. Used
//! by the test suites and by local runs of the services, and doubles as the
//! reference semantics any real backend has to match.

use crate::{
    chain::{Chain, ChainError, EscrowView},
    state::{Asset, Escrow, EscrowState, Transfer},
};
use async_trait::async_trait;
use model::{
    chain::ChainAddress,
    escrow::{EscrowId, EscrowImmutables},
    order::OrderHash,
    secret::Secret,
    timelocks::Side,
};
use primitive_types::U256;
use std::{collections::HashMap, sync::Mutex};

pub struct SimChain {
    chain_id: u64,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    now: u64,
    escrows: HashMap<EscrowId, Escrow>,
    revealed: HashMap<OrderHash, Secret>,
    balances: HashMap<(ChainAddress, Asset), U256>,
}

impl SimChain {
    pub fn new(chain_id: u64, now: u64) -> Self {
        Self {
            chain_id,
            inner: Mutex::new(Inner {
                now,
                ..Default::default()
            }),
        }
    }

    pub fn set_now(&self, now: u64) {
        self.inner.lock().unwrap().now = now;
    }

    pub fn advance(&self, seconds: u64) {
        self.inner.lock().unwrap().now += seconds;
    }

    /// Creates balance out of thin air, the sim equivalent of acquiring
    /// funds and setting allowances.
    pub fn mint(&self, owner: ChainAddress, asset: Asset, amount: U256) {
        credit(
            &mut self.inner.lock().unwrap().balances,
            owner,
            asset,
            amount,
        );
    }

    pub fn balance(&self, owner: &ChainAddress, asset: &Asset) -> U256 {
        self.inner
            .lock()
            .unwrap()
            .balances
            .get(&(owner.clone(), asset.clone()))
            .copied()
            .unwrap_or_default()
    }
}

fn credit(
    balances: &mut HashMap<(ChainAddress, Asset), U256>,
    owner: ChainAddress,
    asset: Asset,
    amount: U256,
) {
    let balance = balances.entry((owner, asset)).or_default();
    *balance = balance.saturating_add(amount);
}

fn debit(
    balances: &mut HashMap<(ChainAddress, Asset), U256>,
    owner: &ChainAddress,
    asset: &Asset,
    amount: U256,
) -> Result<(), ChainError> {
    let balance = balances
        .get_mut(&(owner.clone(), asset.clone()))
        .filter(|balance| **balance >= amount)
        .ok_or(ChainError::InsufficientBalance)?;
    *balance -= amount;
    Ok(())
}

fn apply(balances: &mut HashMap<(ChainAddress, Asset), U256>, transfers: Vec<Transfer>) {
    for transfer in transfers {
        credit(balances, transfer.to, transfer.asset, transfer.amount);
    }
}

#[async_trait]
impl Chain for SimChain {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn now(&self) -> Result<u64, ChainError> {
        Ok(self.inner.lock().unwrap().now)
    }

    async fn deploy_escrow(
        &self,
        immutables: EscrowImmutables,
        side: Side,
        src_cancellation: Option<u64>,
    ) -> Result<EscrowId, ChainError> {
        if !immutables.timelocks.durations().is_ordered() {
            return Err(ChainError::InvalidTimelock);
        }
        if side == Side::Dst && src_cancellation.is_none() {
            return Err(ChainError::MissingSrcCancellation);
        }
        let mut inner = self.inner.lock().unwrap();
        let id = immutables.id();
        if inner.escrows.contains_key(&id) {
            return Err(ChainError::EscrowExists);
        }
        let escrow = Escrow::deploy(immutables, side, inner.now, src_cancellation);
        inner.escrows.insert(id, escrow);
        tracing::debug!(chain = self.chain_id, %id, ?side, "escrow deployed");
        Ok(id)
    }

    async fn deposit_principal(
        &self,
        escrow: EscrowId,
        from: ChainAddress,
        amount: U256,
    ) -> Result<(), ChainError> {
        let mut inner = self.inner.lock().unwrap();
        let Inner {
            escrows, balances, ..
        } = &mut *inner;
        let state = escrows.get_mut(&escrow).ok_or(ChainError::UnknownEscrow)?;
        if state.state != EscrowState::Active {
            return Err(crate::state::EscrowError::AlreadyFinal.into());
        }
        let token = Asset::Token(state.immutables.token.clone());
        debit(balances, &from, &token, amount)?;
        state.deposit_principal(amount)?;
        Ok(())
    }

    async fn deposit_safety(
        &self,
        escrow: EscrowId,
        from: ChainAddress,
        amount: U256,
    ) -> Result<(), ChainError> {
        let mut inner = self.inner.lock().unwrap();
        let Inner {
            escrows, balances, ..
        } = &mut *inner;
        let state = escrows.get_mut(&escrow).ok_or(ChainError::UnknownEscrow)?;
        if state.state != EscrowState::Active {
            return Err(crate::state::EscrowError::AlreadyFinal.into());
        }
        debit(balances, &from, &Asset::Native, amount)?;
        state.deposit_safety(amount)?;
        Ok(())
    }

    async fn withdraw(
        &self,
        escrow: EscrowId,
        caller: ChainAddress,
        secret: Secret,
    ) -> Result<(), ChainError> {
        let mut inner = self.inner.lock().unwrap();
        let now = inner.now;
        let Inner {
            escrows,
            revealed,
            balances,
            ..
        } = &mut *inner;
        let state = escrows.get_mut(&escrow).ok_or(ChainError::UnknownEscrow)?;
        let transfers = state.withdraw(&caller, &secret, now)?;
        // Spending the secret publishes it.
        revealed.insert(state.immutables.order_hash, secret);
        apply(balances, transfers);
        tracing::debug!(chain = self.chain_id, %escrow, "escrow withdrawn");
        Ok(())
    }

    async fn cancel(&self, escrow: EscrowId, caller: ChainAddress) -> Result<(), ChainError> {
        let mut inner = self.inner.lock().unwrap();
        let now = inner.now;
        let Inner {
            escrows, balances, ..
        } = &mut *inner;
        let state = escrows.get_mut(&escrow).ok_or(ChainError::UnknownEscrow)?;
        let transfers = state.cancel(&caller, now)?;
        apply(balances, transfers);
        tracing::debug!(chain = self.chain_id, %escrow, "escrow cancelled");
        Ok(())
    }

    async fn escrow(&self, escrow: EscrowId) -> Result<Option<EscrowView>, ChainError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.escrows.get(&escrow).map(|state| EscrowView {
            id: escrow,
            immutables: state.immutables.clone(),
            side: state.side,
            state: state.state,
            principal: state.principal,
            safety: state.safety,
            src_cancellation: state.src_cancellation,
        }))
    }

    async fn revealed_secret(&self, order: OrderHash) -> Result<Option<Secret>, ChainError> {
        Ok(self.inner.lock().unwrap().revealed.get(&order).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::{order::OrderHash, timelocks::Durations};
    use primitive_types::{H160, H256};

    fn maker() -> ChainAddress {
        ChainAddress::Evm(H160([0x01; 20]))
    }

    fn resolver() -> ChainAddress {
        ChainAddress::Evm(H160([0x02; 20]))
    }

    fn token() -> Asset {
        Asset::Token(ChainAddress::Evm(H160([0x04; 20])))
    }

    fn immutables() -> EscrowImmutables {
        EscrowImmutables {
            order_hash: OrderHash([0x10; 32]),
            hashlock: Secret(H256([0x42; 32])).hashlock(),
            maker: maker(),
            taker: resolver(),
            token: ChainAddress::Evm(H160([0x04; 20])),
            amount: 1_000.into(),
            safety_deposit: 10.into(),
            timelocks: Durations::default().pack(),
        }
    }

    #[tokio::test]
    async fn full_escrow_lifecycle_moves_balances() {
        let chain = SimChain::new(31_337, 1_000_000);
        chain.mint(maker(), token(), 1_500.into());
        chain.mint(resolver(), Asset::Native, 50.into());

        let id = chain
            .deploy_escrow(immutables(), Side::Src, None)
            .await
            .unwrap();
        assert_eq!(id, immutables().id());

        chain
            .deposit_principal(id, maker(), 1_000.into())
            .await
            .unwrap();
        chain.deposit_safety(id, resolver(), 10.into()).await.unwrap();
        assert_eq!(chain.balance(&maker(), &token()), 500.into());
        assert_eq!(chain.balance(&resolver(), &Asset::Native), 40.into());

        let view = chain.escrow(id).await.unwrap().unwrap();
        assert!(view.is_funded());
        assert_eq!(view.immutables.timelocks.deployed_at(), 1_000_000);

        chain
            .withdraw(id, resolver(), Secret(H256([0x42; 32])))
            .await
            .unwrap();
        assert_eq!(chain.balance(&resolver(), &token()), 1_000.into());
        assert_eq!(chain.balance(&resolver(), &Asset::Native), 50.into());
        assert_eq!(
            chain.revealed_secret(OrderHash([0x10; 32])).await.unwrap(),
            Some(Secret(H256([0x42; 32]))),
        );
        assert_eq!(
            chain.escrow(id).await.unwrap().unwrap().state,
            EscrowState::Withdrawn,
        );
    }

    #[tokio::test]
    async fn clock_gates_transitions() {
        let chain = SimChain::new(31_337, 1_000_000);
        chain.mint(maker(), token(), 1_000.into());
        let mut schedule = Durations::default();
        schedule.src_withdrawal = 60;
        let immutables = EscrowImmutables {
            timelocks: schedule.pack(),
            ..immutables()
        };
        let id = chain
            .deploy_escrow(immutables, Side::Src, None)
            .await
            .unwrap();
        chain
            .deposit_principal(id, maker(), 1_000.into())
            .await
            .unwrap();

        let result = chain.withdraw(id, resolver(), Secret(H256([0x42; 32]))).await;
        assert!(matches!(
            result,
            Err(ChainError::Escrow(crate::state::EscrowError::TooEarly)),
        ));

        chain.advance(60);
        chain
            .withdraw(id, resolver(), Secret(H256([0x42; 32])))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn deployment_validations() {
        let chain = SimChain::new(31_337, 1_000_000);
        let unordered = EscrowImmutables {
            timelocks: Durations {
                src_withdrawal: 100,
                src_public_withdrawal: 50,
                ..Durations::default()
            }
            .pack(),
            ..immutables()
        };
        assert!(matches!(
            chain.deploy_escrow(unordered, Side::Src, None).await,
            Err(ChainError::InvalidTimelock),
        ));

        assert!(matches!(
            chain.deploy_escrow(immutables(), Side::Dst, None).await,
            Err(ChainError::MissingSrcCancellation),
        ));

        chain
            .deploy_escrow(immutables(), Side::Src, None)
            .await
            .unwrap();
        assert!(matches!(
            chain.deploy_escrow(immutables(), Side::Src, None).await,
            Err(ChainError::EscrowExists),
        ));
    }

    #[tokio::test]
    async fn deposits_require_balance() {
        let chain = SimChain::new(31_337, 1_000_000);
        let id = chain
            .deploy_escrow(immutables(), Side::Src, None)
            .await
            .unwrap();
        assert!(matches!(
            chain.deposit_principal(id, maker(), 1.into()).await,
            Err(ChainError::InsufficientBalance),
        ));
        assert!(matches!(
            chain
                .deposit_principal(EscrowId::default(), maker(), 1.into())
                .await,
            Err(ChainError::UnknownEscrow),
        ));
    }
}
