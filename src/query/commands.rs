use crate::query::formatters::{OutputFormat, format_failures, format_stats, format_verdicts};
use crate::repository::{ProgressRepository, VerdictRepository};
use alloy_primitives::Address;
use anyhow::Result;
use std::str::FromStr;

#[derive(Default)]
pub struct SuspiciousQuery {
    pub block: Option<u64>,
    pub block_range: Option<(u64, u64)>,
    pub limit: usize,
    pub offset: usize,
}

pub fn cmd_suspicious(
    repo: &VerdictRepository,
    query: SuspiciousQuery,
    format: &OutputFormat,
) -> Result<()> {
    let block_range = if let Some(block_num) = query.block {
        Some((block_num, block_num))
    } else {
        query.block_range
    };

    if let Some((start, end)) = block_range
        && start > end
    {
        return Err(anyhow::anyhow!("Invalid block range: {start} > {end}"));
    }

    let verdicts = repo.query_suspicious(block_range, query.limit, query.offset)?;
    println!("{}", format_verdicts(&verdicts, format));

    Ok(())
}

pub fn cmd_wallet(repo: &VerdictRepository, address: &str, format: &OutputFormat) -> Result<()> {
    let address = Address::from_str(address)
        .map_err(|_| anyhow::anyhow!("Invalid address format: {}", address))?;

    let verdicts = repo.get_wallet(&address)?;
    println!("{}", format_verdicts(&verdicts, format));

    Ok(())
}

pub fn cmd_failures(
    repo: &VerdictRepository,
    limit: usize,
    offset: usize,
    format: &OutputFormat,
) -> Result<()> {
    let failures = repo.get_failures(limit, offset)?;
    println!("{}", format_failures(&failures, format));

    Ok(())
}

pub fn cmd_stats(
    verdict_repo: &VerdictRepository,
    progress_repo: &ProgressRepository,
    format: &OutputFormat,
) -> Result<()> {
    let stats = verdict_repo.get_statistics()?;
    let progress = progress_repo.list()?;
    println!("{}", format_stats(&stats, &progress, format));

    Ok(())
}
