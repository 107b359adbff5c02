pub mod account_csv;
pub mod operation_reader;
