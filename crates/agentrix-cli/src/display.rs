//! Display utilities for the CLI

use agentrix_agent::AgentAccount;
use agentrix_ledger::{Account, HistoryEntry};
use colored::*;

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", "━".repeat(60).bright_black());
    println!(" {}", title.bright_white().bold());
    println!("{}", "━".repeat(60).bright_black());
}

/// Print a success message
pub fn success(message: &str) {
    println!("  {} {}", "✓".bright_green(), message);
}

/// Print a warning message
pub fn warning(message: &str) {
    println!("  {} {}", "⚠".yellow(), message.yellow());
}

/// Print a labeled value
pub fn labeled(label: &str, value: &str) {
    println!("  {}: {}", label.bright_white(), value.bright_cyan());
}

pub fn account_summary(account: &Account) {
    let marker = if account.is_default { "★" } else { " " };
    println!(
        "  {} {}  {}  {} {}  [{}]",
        marker.bright_yellow(),
        account.account_code.bright_white(),
        account.name,
        account.available_balance.to_string().bright_cyan(),
        account.currency,
        account.status.as_str().bright_black(),
    );
}

pub fn account_detail(account: &Account) {
    section(&format!("Account {}", account.account_code));
    labeled("Id", &account.id.to_string());
    labeled("Name", &account.name);
    labeled("Owner", &account.owner().to_string());
    labeled("Wallet", account.wallet_type.as_str());
    labeled("Status", account.status.as_str());
    if let Some(reason) = &account.status_reason {
        labeled("Status reason", reason);
    }

    let balance = account.balance_view();
    labeled("Available", &format!("{} {}", balance.available_balance, balance.currency));
    labeled("Frozen", &format!("{} {}", balance.frozen_balance, balance.currency));
    labeled("Pending", &format!("{} {}", balance.pending_balance, balance.currency));
    labeled("Total", &format!("{} {}", balance.total_balance, balance.currency));
    for (currency, amount) in &account.multi_currency_balances {
        labeled(&format!("Side balance {}", currency), &amount.to_string());
    }

    let stats = account.stats();
    labeled("Deposited", &stats.total_deposit.to_string());
    labeled("Withdrawn", &stats.total_withdraw.to_string());
    labeled("Net flow", &stats.net_flow.to_string());
    labeled("Transactions", &stats.transaction_count.to_string());
}

pub fn history_line(entry: &HistoryEntry) {
    let direction = entry.direction.map(|d| d.as_str()).unwrap_or("-");
    println!(
        "  {}  {:<10} {:>3}  {} {}  {}",
        entry.created_at.format("%Y-%m-%d %H:%M:%S").to_string().bright_black(),
        entry.kind.as_str().bright_white(),
        direction,
        entry.amount.to_string().bright_cyan(),
        entry.currency,
        entry
            .reference
            .as_deref()
            .or(entry.reason.as_deref())
            .unwrap_or(""),
    );
}

pub fn agent_detail(agent: &AgentAccount) {
    section(&format!("Agent {}", agent.name));
    labeled("Id", &agent.id.to_string());
    labeled("Code", &agent.agent_unique_id);
    labeled("Owner", &agent.owner_id);
    labeled("Status", agent.status.as_str());
    labeled(
        "Credit score",
        &format!("{} ({})", agent.credit_score, agent.risk_level),
    );
    labeled("Used today", &agent.used_today_amount.to_string());
    labeled("Used this month", &agent.used_month_amount.to_string());
    labeled(
        "Transactions",
        &format!(
            "{} ({} ok, {} failed)",
            agent.total_transactions, agent.successful_transactions, agent.failed_transactions
        ),
    );
    if let Some(limits) = &agent.spending_limits {
        let show = |limit: Option<rust_decimal::Decimal>| {
            limit.map_or_else(|| "none".to_string(), |l| format!("{} {}", l, limits.currency))
        };
        labeled("Single tx limit", &show(limits.single_tx_limit));
        labeled("Daily limit", &show(limits.daily_limit));
        labeled("Monthly limit", &show(limits.monthly_limit));
    }
    match agent.default_account_id {
        Some(account) => labeled("Default account", &account.to_string()),
        None => warning("no default account"),
    }
}
