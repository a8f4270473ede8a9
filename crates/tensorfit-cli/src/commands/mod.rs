pub mod compare;
pub mod fit;
pub mod report;
