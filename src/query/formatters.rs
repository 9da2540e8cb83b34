use crate::repository::{ScanProgress, VerdictStats};
use crate::types::{FailedClassification, WalletVerdict, format_ether};
use comfy_table::{Cell, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use csv::Writer;
use serde_json::json;

#[derive(Debug, Clone)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "csv" => OutputFormat::Csv,
            _ => OutputFormat::Table,
        }
    }
}

pub fn format_verdicts(verdicts: &[WalletVerdict], format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => format_verdicts_table(verdicts),
        OutputFormat::Json => format_verdicts_json(verdicts),
        OutputFormat::Csv => format_verdicts_csv(verdicts),
    }
}

fn format_verdicts_table(verdicts: &[WalletVerdict]) -> String {
    if verdicts.is_empty() {
        return "No verdicts found.".to_string();
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            "Block",
            "Wallet",
            "Claimed",
            "Buys",
            "Total ETH Buy",
            "Sells",
            "Total ETH Sell",
            "Suspicious",
            "Tx Hash",
        ]);

    for v in verdicts {
        table.add_row(vec![
            Cell::new(v.block_number),
            Cell::new(v.wallet.to_checksum(None)),
            Cell::new(&v.claimed),
            Cell::new(v.buy_count),
            Cell::new(format_ether(v.total_buy_wei)),
            Cell::new(v.sell_count),
            Cell::new(format_ether(v.total_sell_wei)),
            Cell::new(if v.is_suspicious() { "yes" } else { "no" }),
            Cell::new(format_tx_hash(&format!("{:?}", v.tx_hash))),
        ]);
    }

    table.to_string()
}

fn format_verdicts_json(verdicts: &[WalletVerdict]) -> String {
    let json_verdicts: Vec<_> = verdicts
        .iter()
        .map(|v| {
            json!({
                "block_number": v.block_number,
                "transaction_hash": format!("{:?}", v.tx_hash),
                "wallet": v.wallet.to_checksum(None),
                "claimed": v.claimed,
                "claimed_wei": v.claimed_raw.to_string(),
                "buy_count": v.buy_count,
                "total_eth_buy": format_ether(v.total_buy_wei),
                "sell_count": v.sell_count,
                "total_eth_sell": format_ether(v.total_sell_wei),
                "suspicious": v.is_suspicious(),
            })
        })
        .collect();

    serde_json::to_string_pretty(&json_verdicts).unwrap_or_else(|_| "[]".to_string())
}

fn format_verdicts_csv(verdicts: &[WalletVerdict]) -> String {
    let mut wtr = Writer::from_writer(vec![]);

    let _ = wtr.write_record([
        "block_number",
        "wallet",
        "claimed",
        "buy_count",
        "total_eth_buy",
        "sell_count",
        "total_eth_sell",
        "suspicious",
        "transaction_hash",
    ]);

    for v in verdicts {
        let _ = wtr.write_record([
            &v.block_number.to_string(),
            &v.wallet.to_checksum(None),
            &v.claimed,
            &v.buy_count.to_string(),
            &format_ether(v.total_buy_wei),
            &v.sell_count.to_string(),
            &format_ether(v.total_sell_wei),
            &v.is_suspicious().to_string(),
            &format!("{:?}", v.tx_hash),
        ]);
    }

    String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
}

pub fn format_failures(failures: &[FailedClassification], format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            if failures.is_empty() {
                return "No failed classifications.".to_string();
            }

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(vec!["Block", "Wallet", "Tx Hash", "Error"]);

            for f in failures {
                table.add_row(vec![
                    Cell::new(f.block_number),
                    Cell::new(f.wallet.to_checksum(None)),
                    Cell::new(format_tx_hash(&format!("{:?}", f.tx_hash))),
                    Cell::new(&f.error),
                ]);
            }
            table.to_string()
        }
        OutputFormat::Json => {
            let json_failures: Vec<_> = failures
                .iter()
                .map(|f| {
                    json!({
                        "block_number": f.block_number,
                        "wallet": f.wallet.to_checksum(None),
                        "transaction_hash": format!("{:?}", f.tx_hash),
                        "error": f.error,
                    })
                })
                .collect();
            serde_json::to_string_pretty(&json_failures).unwrap_or_else(|_| "[]".to_string())
        }
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record(["block_number", "wallet", "transaction_hash", "error"]);
            for f in failures {
                let _ = wtr.write_record([
                    &f.block_number.to_string(),
                    &f.wallet.to_checksum(None),
                    &format!("{:?}", f.tx_hash),
                    &f.error,
                ]);
            }
            String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
        }
    }
}

pub fn format_stats(stats: &VerdictStats, progress: &[ScanProgress], format: &OutputFormat) -> String {
    let block_or_na = |b: Option<u64>| b.map_or("N/A".to_string(), |b| b.to_string());
    let suspicious_claimed = format_ether(stats.suspicious_claimed);

    match format {
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(vec!["Metric", "Value"]);

            table.add_row(vec![
                Cell::new("Classified Claims"),
                Cell::new(stats.total_verdicts),
            ]);
            table.add_row(vec![
                Cell::new("Suspicious Wallets"),
                Cell::new(stats.suspicious_wallets),
            ]);
            table.add_row(vec![
                Cell::new("Claimed By Suspicious"),
                Cell::new(&suspicious_claimed),
            ]);
            table.add_row(vec![
                Cell::new("Failed Classifications"),
                Cell::new(stats.failed_classifications),
            ]);
            table.add_row(vec![
                Cell::new("Earliest Block"),
                Cell::new(block_or_na(stats.earliest_block)),
            ]);
            table.add_row(vec![
                Cell::new("Latest Block"),
                Cell::new(block_or_na(stats.latest_block)),
            ]);
            for p in progress {
                table.add_row(vec![
                    Cell::new(format!("Checkpoint {}", p.claims_contract.to_checksum(None))),
                    Cell::new(p.last_processed_block),
                ]);
            }

            table.to_string()
        }
        OutputFormat::Json => serde_json::to_string_pretty(&json!({
            "classified_claims": stats.total_verdicts,
            "suspicious_wallets": stats.suspicious_wallets,
            "suspicious_claimed": suspicious_claimed,
            "suspicious_claimed_wei": stats.suspicious_claimed.to_string(),
            "failed_classifications": stats.failed_classifications,
            "earliest_block": stats.earliest_block,
            "latest_block": stats.latest_block,
            "checkpoints": progress
                .iter()
                .map(|p| json!({
                    "claims_contract": p.claims_contract.to_checksum(None),
                    "last_processed_block": p.last_processed_block,
                }))
                .collect::<Vec<_>>(),
        }))
        .unwrap_or_else(|_| "{}".to_string()),
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record(["metric", "value"]);
            let _ = wtr.write_record(["classified_claims", &stats.total_verdicts.to_string()]);
            let _ = wtr.write_record([
                "suspicious_wallets",
                &stats.suspicious_wallets.to_string(),
            ]);
            let _ = wtr.write_record(["suspicious_claimed", &suspicious_claimed]);
            let _ = wtr.write_record([
                "failed_classifications",
                &stats.failed_classifications.to_string(),
            ]);
            let _ = wtr.write_record(["earliest_block", &block_or_na(stats.earliest_block)]);
            let _ = wtr.write_record(["latest_block", &block_or_na(stats.latest_block)]);
            String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
        }
    }
}

fn format_tx_hash(hash: &str) -> String {
    format!("{}...{}", &hash[..6], &hash[hash.len() - 4..])
}
