pub mod contract;
pub mod report;
