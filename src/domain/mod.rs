pub mod account;
pub mod audit;
pub mod ports;
pub mod statement;
pub mod transaction;
pub mod validation;
