use crate::types::{ActivityEvent, ClaimEvent, Role};
use alloy::rpc::types::Log;
use alloy::sol;
use alloy::sol_types::SolEvent;

sol! {
    event Transfer(address indexed from, address indexed to, uint256 value);

    event OrdersMatched(
        bytes32 buyHash,
        bytes32 sellHash,
        address indexed maker,
        address indexed taker,
        uint256 price,
        bytes32 indexed metadata
    );
}

pub fn decode_claim_event(log: &Log) -> anyhow::Result<ClaimEvent> {
    let log_data = log.data();
    let decoded = Transfer::decode_raw_log(log.topics(), &log_data.data)?;

    Ok(ClaimEvent {
        recipient: decoded.to,
        amount_raw: decoded.value,
        tx_hash: log
            .transaction_hash
            .ok_or_else(|| anyhow::anyhow!("claim log without transaction hash"))?,
        block_number: log
            .block_number
            .ok_or_else(|| anyhow::anyhow!("claim log without block number"))?,
        log_index: log.log_index.unwrap_or_default(),
    })
}

pub fn decode_activity_event(log: &Log, role: Role) -> anyhow::Result<ActivityEvent> {
    let log_data = log.data();
    let decoded = OrdersMatched::decode_raw_log(log.topics(), &log_data.data)?;
    Ok(ActivityEvent {
        price: decoded.price,
        role,
    })
}
