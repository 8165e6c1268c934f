//! Presentation helpers for the wallet status panel.

use rust_decimal::Decimal;

use crate::provider::Address;
use crate::sync::{ChainObservation, WalletStatus};

const ETHER_DECIMALS: u32 = 18;
const WEI_PER_ETHER: u128 = 1_000_000_000_000_000_000;

/// Format a wei amount as ether, keeping at least one fractional digit
/// (`10000.0`, `0.5`, `9999.999526999999999`).
pub fn format_ether(wei: u128) -> String {
    let text = i128::try_from(wei)
        .ok()
        .and_then(|wei| Decimal::try_from_i128_with_scale(wei, ETHER_DECIMALS).ok())
        .map(|amount| amount.normalize().to_string())
        .unwrap_or_else(|| format_ether_exact(wei));
    if text.contains('.') {
        text
    } else {
        format!("{text}.0")
    }
}

// Decimal tops out at 96 bits; larger amounts go through integer math.
fn format_ether_exact(wei: u128) -> String {
    let whole = wei / WEI_PER_ETHER;
    let fraction = wei % WEI_PER_ETHER;
    if fraction == 0 {
        return whole.to_string();
    }
    let digits = format!("{fraction:018}");
    format!("{whole}.{}", digits.trim_end_matches('0'))
}

/// `0x1234...abcd`
pub fn short_account(address: &Address) -> String {
    let text = address.as_str();
    if text.len() <= 10 {
        return text.to_string();
    }
    format!("{}...{}", &text[..6], &text[text.len() - 4..])
}

/// Empty while unknown, `Error` after a failed fetch, else the rendered value.
pub fn indicator<T>(observation: &ChainObservation<T>, render: impl Fn(&T) -> String) -> String {
    match (&observation.value, &observation.error) {
        (Some(value), _) => render(value),
        (None, Some(_)) => "Error".to_string(),
        (None, None) => String::new(),
    }
}

pub fn balance_indicator(observation: &ChainObservation<u128>) -> String {
    indicator(observation, |wei| format!("{} ETH", format_ether(*wei)))
}

/// One-line wallet status.
pub fn status_line(status: &WalletStatus) -> String {
    format!(
        "chain={} block={} account={} balance={} nonce={}",
        status.chain_id.map(|id| id.to_string()).unwrap_or_default(),
        indicator(&status.block_number, u64::to_string),
        status.account.as_ref().map(short_account).unwrap_or_default(),
        balance_indicator(&status.balance),
        indicator(&status.next_nonce, u64::to_string),
    )
}
