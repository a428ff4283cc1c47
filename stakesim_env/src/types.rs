//! Common types shared by the chain boundary, the reference ledger, and the
//! fuzzing framework.

use ed25519_dalek::Signature;
use serde::{Deserialize, Serialize};

/// Parts-per-million denominator for operator shares and stake weights.
pub const PPM_DENOMINATOR: u32 = 1_000_000;

/// Weight applied to non-operator ("member") delegated stake when computing a
/// pool's weighted stake for reward purposes.
pub const MEMBER_STAKE_WEIGHT_PPM: u32 = 900_000;

/// Epoch the chain (and the mirror) starts in.
pub const INITIAL_EPOCH: Epoch = 1;

/// A staking epoch number. Only ever increases.
pub type Epoch = u64;

/// A 20-byte account address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// Creates a deterministic address from a seed (for simulation).
    pub fn from_seed(seed: u64) -> Self {
        let mut bytes = [0u8; 20];
        bytes[0..8].copy_from_slice(&seed.to_be_bytes());
        bytes[8..16].copy_from_slice(&seed.wrapping_mul(0x517cc1b727220a95).to_be_bytes());
        bytes[16..20].copy_from_slice(&(seed.wrapping_mul(0x9e3779b9) as u32).to_be_bytes());
        Self(bytes)
    }

    /// Full 0x-prefixed hex rendering.
    pub fn to_hex(&self) -> String {
        let mut s = String::with_capacity(42);
        s.push_str("0x");
        for b in self.0 {
            s.push_str(&format!("{:02x}", b));
        }
        s
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show first 4 bytes for readability
        write!(
            f,
            "0x{:02x}{:02x}{:02x}{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

/// Identifier of a staking pool.
///
/// Pool ids are assigned sequentially (one more than the last observed id)
/// and rendered as a fixed-width big-endian hex string, which is the id's
/// canonical form on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PoolId(pub u64);

impl PoolId {
    /// The id assigned to the first pool ever created.
    pub fn first() -> Self {
        Self(1)
    }

    /// The id that follows this one.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Canonical fixed-width (32-byte) big-endian hex form.
    pub fn to_hex(&self) -> String {
        format!("0x{:064x}", self.0)
    }
}

impl std::fmt::Display for PoolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// The two stake states an owner's stake can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StakeStatus {
    /// Stake held directly by the owner, not backing any pool.
    Undelegated,
    /// Stake delegated to a staking pool.
    Delegated,
}

/// Fully-qualified stake position: a status plus, for delegated stake, the
/// pool it backs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StakeInfo {
    Undelegated,
    Delegated(PoolId),
}

impl StakeInfo {
    pub fn status(&self) -> StakeStatus {
        match self {
            StakeInfo::Undelegated => StakeStatus::Undelegated,
            StakeInfo::Delegated(_) => StakeStatus::Delegated,
        }
    }

    pub fn pool_id(&self) -> Option<PoolId> {
        match self {
            StakeInfo::Undelegated => None,
            StakeInfo::Delegated(id) => Some(*id),
        }
    }
}

impl std::fmt::Display for StakeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StakeInfo::Undelegated => write!(f, "undelegated"),
            StakeInfo::Delegated(id) => write!(f, "delegated({})", id),
        }
    }
}

/// An asset that can appear in the balance mirror: either native ETH or an
/// ERC20 token identified by its contract address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Asset {
    Eth,
    Erc20(Address),
}

impl std::fmt::Display for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Asset::Eth => write!(f, "ETH"),
            Asset::Erc20(token) => write!(f, "ERC20({})", token),
        }
    }
}

/// A balance that changes only at epoch boundaries.
///
/// Writes for the current epoch update `current_epoch_balance` directly;
/// writes for a future epoch update `next_epoch_balance`. The first write
/// after an epoch roll promotes `next_epoch_balance` into
/// `current_epoch_balance` (see [`StoredBalance::sync`]).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredBalance {
    /// Epoch this balance was last written in.
    pub current_epoch: Epoch,
    /// Balance effective in `current_epoch`.
    pub current_epoch_balance: u128,
    /// Balance that becomes effective at the next epoch boundary.
    pub next_epoch_balance: u128,
}

impl StoredBalance {
    /// Rolls the balance forward to `epoch`, promoting the next-epoch value
    /// if at least one boundary has passed since the last write.
    pub fn sync(&mut self, epoch: Epoch) {
        if self.current_epoch < epoch {
            self.current_epoch_balance = self.next_epoch_balance;
            self.current_epoch = epoch;
        }
    }

    /// The balance as it reads at `epoch`, without mutating storage.
    pub fn synced(&self, epoch: Epoch) -> StoredBalance {
        let mut copy = *self;
        copy.sync(epoch);
        copy
    }

    /// Raises both the current and next epoch balances (instant stake).
    pub fn increase_current_and_next(&mut self, epoch: Epoch, amount: u128) {
        self.sync(epoch);
        self.current_epoch_balance += amount;
        self.next_epoch_balance += amount;
    }

    /// Lowers both the current and next epoch balances (instant unstake).
    /// Fails when `amount` exceeds the withdrawable minimum of the two.
    pub fn decrease_current_and_next(
        &mut self,
        epoch: Epoch,
        amount: u128,
    ) -> Result<(), crate::ChainError> {
        self.sync(epoch);
        let available = self.current_epoch_balance.min(self.next_epoch_balance);
        if amount > available {
            return Err(crate::ChainError::InsufficientStake {
                required: amount,
                available,
            });
        }
        self.current_epoch_balance -= amount;
        self.next_epoch_balance -= amount;
        Ok(())
    }

    /// Raises only the next-epoch balance (delegation takes effect next epoch).
    pub fn increase_next(&mut self, epoch: Epoch, amount: u128) {
        self.sync(epoch);
        self.next_epoch_balance += amount;
    }

    /// Lowers only the next-epoch balance.
    pub fn decrease_next(&mut self, epoch: Epoch, amount: u128) -> Result<(), crate::ChainError> {
        self.sync(epoch);
        if amount > self.next_epoch_balance {
            return Err(crate::ChainError::InsufficientStake {
                required: amount,
                available: self.next_epoch_balance,
            });
        }
        self.next_epoch_balance -= amount;
        Ok(())
    }

    /// Amount that can be unstaked at `epoch`: the minimum of the current and
    /// next epoch balances.
    pub fn withdrawable(&self, epoch: Epoch) -> u128 {
        let s = self.synced(epoch);
        s.current_epoch_balance.min(s.next_epoch_balance)
    }

    /// Amount that can be moved between stake positions at `epoch`: the
    /// next-epoch balance.
    pub fn moveable(&self, epoch: Epoch) -> u128 {
        self.synced(epoch).next_epoch_balance
    }

    pub fn is_zero(&self) -> bool {
        self.current_epoch_balance == 0 && self.next_epoch_balance == 0
    }
}

/// A limit order: the maker sells `maker_amount` of `maker_token` for
/// `taker_amount` of `taker_token`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub maker: Address,
    pub maker_token: Address,
    pub taker_token: Address,
    pub maker_amount: u128,
    pub taker_amount: u128,
    /// Unix timestamp after which the order is unfillable.
    pub expiry: u64,
    /// Distinguishes otherwise-identical orders from the same maker.
    pub salt: u64,
}

impl Order {
    /// Canonical byte encoding signed by the maker.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(104);
        bytes.extend_from_slice(&self.maker.0);
        bytes.extend_from_slice(&self.maker_token.0);
        bytes.extend_from_slice(&self.taker_token.0);
        bytes.extend_from_slice(&self.maker_amount.to_be_bytes());
        bytes.extend_from_slice(&self.taker_amount.to_be_bytes());
        bytes.extend_from_slice(&self.expiry.to_be_bytes());
        bytes.extend_from_slice(&self.salt.to_be_bytes());
        bytes
    }

    /// Key used to track fills: maker plus salt.
    pub fn id(&self) -> (Address, u64) {
        (self.maker, self.salt)
    }
}

/// An order together with the maker's Ed25519 signature over its
/// [`Order::signing_bytes`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedOrder {
    pub order: Order,
    pub signature: Signature,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_deterministic() {
        assert_eq!(Address::from_seed(7), Address::from_seed(7));
        assert_ne!(Address::from_seed(7), Address::from_seed(8));
    }

    #[test]
    fn test_pool_id_fixed_width_hex() {
        let id = PoolId::first();
        let hex = id.to_hex();
        assert_eq!(hex.len(), 66);
        assert_eq!(
            hex,
            "0x0000000000000000000000000000000000000000000000000000000000000001"
        );
        assert_eq!(id.next().0, 2);
    }

    #[test]
    fn test_stored_balance_promotion_on_sync() {
        let mut balance = StoredBalance::default();
        balance.increase_next(1, 100);
        assert_eq!(balance.current_epoch_balance, 0);
        assert_eq!(balance.next_epoch_balance, 100);

        // First write after the epoch rolls promotes next into current.
        balance.increase_next(2, 50);
        assert_eq!(balance.current_epoch, 2);
        assert_eq!(balance.current_epoch_balance, 100);
        assert_eq!(balance.next_epoch_balance, 150);
    }

    #[test]
    fn test_stored_balance_current_write_is_direct() {
        let mut balance = StoredBalance::default();
        balance.increase_current_and_next(3, 40);
        assert_eq!(balance.current_epoch_balance, 40);
        assert_eq!(balance.next_epoch_balance, 40);

        balance.increase_current_and_next(3, 10);
        assert_eq!(balance.current_epoch_balance, 50);
        assert_eq!(balance.next_epoch_balance, 50);
    }

    #[test]
    fn test_stored_balance_withdrawable_is_min() {
        let mut balance = StoredBalance::default();
        balance.increase_current_and_next(1, 100);
        balance.decrease_next(1, 30).unwrap();
        assert_eq!(balance.withdrawable(1), 70);
        assert_eq!(balance.moveable(1), 70);
        assert!(balance.decrease_current_and_next(1, 80).is_err());
        balance.decrease_current_and_next(1, 70).unwrap();
        assert_eq!(balance.current_epoch_balance, 30);
        assert_eq!(balance.next_epoch_balance, 0);
    }

    #[test]
    fn test_order_signing_bytes_distinct_by_salt() {
        let order = Order {
            maker: Address::from_seed(1),
            maker_token: Address::from_seed(2),
            taker_token: Address::from_seed(3),
            maker_amount: 500,
            taker_amount: 1000,
            expiry: 10_000,
            salt: 1,
        };
        let mut other = order;
        other.salt = 2;
        assert_ne!(order.signing_bytes(), other.signing_bytes());
    }
}
