//! Per-market ETL jobs. Each reads raw or previously merged files, pulls
//! from a source where needed, normalizes keys and writes its output file.

pub mod astock;
pub mod crypto_index;
pub mod forex;
pub mod index_metrics;
pub mod nasdaq;
