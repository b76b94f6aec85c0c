//! Operator flows: genesis bootstrap and per-round execution

pub mod genesis;
pub mod round;

pub use genesis::{run_genesis, GenesisReport, GenesisState};
pub use round::{
    fetch_settlement_price, read_current_round_end, read_current_round_id, run_round, HouseBets,
    RoundPlan, RoundReport, SettlementPrice,
};
