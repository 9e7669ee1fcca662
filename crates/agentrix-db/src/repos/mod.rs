//! Store implementations

mod account;
mod agent;

pub use account::PgAccountStore;
pub use agent::PgAgentStore;
