mod aggregation_tests;
mod common;
mod dedup_tests;
mod health_tests;
