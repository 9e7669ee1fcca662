//! Human-diagnosable codes for accounts and agents
//!
//! Codes are display identifiers only. Uniqueness is enforced by the store,
//! the millisecond timestamp plus random suffix just makes collisions rare.

use chrono::Utc;
use rand::Rng;

use crate::OwnerType;

/// `ACC-{PREFIX}-{unix millis}-{6 base-36 chars}`
pub fn generate_account_code(owner_type: OwnerType) -> String {
    format!(
        "ACC-{}-{}-{}",
        owner_type.code_prefix(),
        Utc::now().timestamp_millis(),
        random_base36(6)
    )
}

/// `AGT-{unix millis}-{8 base-36 chars}`
pub fn generate_agent_code() -> String {
    format!("AGT-{}-{}", Utc::now().timestamp_millis(), random_base36(8))
}

fn random_base36(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .filter_map(|_| std::char::from_digit(rng.gen_range(0..36), 36))
        .collect()
}
