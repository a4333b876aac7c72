pub mod activation;
pub mod audit;
pub mod cms;
pub mod config;
pub mod enrichment;
pub mod handlers;
pub mod marketing;
pub mod model;
pub mod rate_limit;
pub mod server;
pub mod validation;
pub mod vocabulary;
