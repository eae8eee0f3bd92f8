pub mod channel;
pub mod ladder;
pub mod logic;
pub mod scale;
