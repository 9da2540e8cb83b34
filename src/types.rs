use crate::error::ScanError;
use alloy_primitives::{Address, B256, U256};
use std::fmt;

/// 10^18, the number of wei in one ether.
const WEI_PER_ETHER: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Inclusive block interval `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockRange {
    pub start: u64,
    pub end: u64,
}

impl BlockRange {
    pub fn new(start: u64, end: u64) -> Result<Self, ScanError> {
        if start > end {
            return Err(ScanError::invalid(format!(
                "block range start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Number of blocks covered, saturating at `u64::MAX`.
    pub fn width(&self) -> u64 {
        (self.end - self.start).saturating_add(1)
    }

    pub fn contains(&self, block: u64) -> bool {
        self.start <= block && block <= self.end
    }
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Position a wallet occupies in a matched marketplace order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Order taker.
    Buyer,
    /// Order maker.
    Seller,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Buyer => write!(f, "buyer"),
            Role::Seller => write!(f, "seller"),
        }
    }
}

/// What a single log query matches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
    /// `Transfer(from = 0x0, to = *)` on the claims contract.
    Claims,
    /// `OrdersMatched` on the marketplace with `wallet` in the given role.
    Activity { role: Role, wallet: Address },
}

impl fmt::Display for EventFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventFilter::Claims => write!(f, "Transfer(from=0x0)"),
            EventFilter::Activity { role, wallet } => {
                write!(f, "OrdersMatched({role}={wallet})")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimEvent {
    pub recipient: Address,
    pub amount_raw: U256,
    pub tx_hash: B256,
    pub block_number: u64,
    pub log_index: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityEvent {
    pub price: U256,
    pub role: Role,
}

/// Classification outcome for one claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletVerdict {
    pub wallet: Address,
    pub claimed: String,
    pub claimed_raw: U256,
    pub tx_hash: B256,
    pub block_number: u64,
    pub has_buy: bool,
    pub has_sell: bool,
    pub buy_count: u32,
    pub sell_count: u32,
    pub total_buy_wei: U256,
    pub total_sell_wei: U256,
}

impl WalletVerdict {
    pub fn new(claim: &ClaimEvent, buys: &[ActivityEvent], sells: &[ActivityEvent]) -> Self {
        Self {
            wallet: claim.recipient,
            claimed: format_ether(claim.amount_raw),
            claimed_raw: claim.amount_raw,
            tx_hash: claim.tx_hash,
            block_number: claim.block_number,
            has_buy: !buys.is_empty(),
            has_sell: !sells.is_empty(),
            buy_count: count(buys),
            sell_count: count(sells),
            total_buy_wei: sum_prices(buys),
            total_sell_wei: sum_prices(sells),
        }
    }

    /// A claimant with neither buy nor sell activity before the cutoff.
    pub fn is_suspicious(&self) -> bool {
        !self.has_buy && !self.has_sell
    }
}

/// A claimant whose classification could not be completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedClassification {
    pub wallet: Address,
    pub tx_hash: B256,
    pub block_number: u64,
    pub error: String,
}

fn count(events: &[ActivityEvent]) -> u32 {
    u32::try_from(events.len()).unwrap_or(u32::MAX)
}

fn sum_prices(events: &[ActivityEvent]) -> U256 {
    events
        .iter()
        .fold(U256::ZERO, |acc, e| acc.saturating_add(e.price))
}

/// Render a wei amount as an ether decimal string without precision loss.
///
/// Trailing fractional zeros are trimmed but at least one fractional digit
/// is kept, so `1000 * 10^18` renders as `"1000.0"`.
pub fn format_ether(wei: U256) -> String {
    let whole = wei / WEI_PER_ETHER;
    let frac = wei % WEI_PER_ETHER;

    let frac = format!("{:0>18}", frac.to_string());
    let frac = frac.trim_end_matches('0');
    if frac.is_empty() {
        format!("{whole}.0")
    } else {
        format!("{whole}.{frac}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ether(n: u64) -> U256 {
        U256::from(n) * WEI_PER_ETHER
    }

    #[test]
    fn test_format_ether() {
        assert_eq!(format_ether(ether(1000)), "1000.0");
        assert_eq!(format_ether(U256::ZERO), "0.0");
        assert_eq!(format_ether(U256::from(1u64)), "0.000000000000000001");
        assert_eq!(
            format_ether(ether(1) + U256::from(500_000_000_000_000_000u64)),
            "1.5"
        );
        assert_eq!(
            format_ether(U256::MAX),
            "115792089237316195423570985008687907853269984665640564039457.584007913129639935"
        );
    }

    #[test]
    fn test_block_range_rejects_inverted_bounds() {
        assert!(matches!(
            BlockRange::new(10, 9),
            Err(ScanError::InvalidArgument(_))
        ));
        let range = BlockRange::new(5, 5).unwrap();
        assert_eq!(range.width(), 1);
        assert_eq!(BlockRange::new(0, u64::MAX).unwrap().width(), u64::MAX);
    }

    #[test]
    fn test_verdict_totals() {
        let claim = ClaimEvent {
            recipient: Address::repeat_byte(0xaa),
            amount_raw: ether(1000),
            tx_hash: B256::with_last_byte(1),
            block_number: 100,
            log_index: 0,
        };
        let sells = [
            ActivityEvent {
                price: ether(5),
                role: Role::Seller,
            },
            ActivityEvent {
                price: ether(2),
                role: Role::Seller,
            },
        ];

        let verdict = WalletVerdict::new(&claim, &[], &sells);
        assert!(!verdict.is_suspicious());
        assert_eq!(verdict.claimed, "1000.0");
        assert_eq!(verdict.sell_count, 2);
        assert_eq!(verdict.total_sell_wei, ether(7));
        assert_eq!(verdict.buy_count, 0);
        assert_eq!(verdict.total_buy_wei, U256::ZERO);

        let verdict = WalletVerdict::new(&claim, &[], &[]);
        assert!(verdict.is_suspicious());
    }
}
