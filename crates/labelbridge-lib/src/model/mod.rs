pub mod export;
pub mod turn;
