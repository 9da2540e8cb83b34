use alloy_primitives::{Address, U256};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanProgress {
    pub claims_contract: Address,
    pub last_processed_block: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerdictStats {
    pub total_verdicts: usize,
    pub suspicious_wallets: usize,
    pub suspicious_claimed: U256,
    pub failed_classifications: usize,
    pub earliest_block: Option<u64>,
    pub latest_block: Option<u64>,
}
