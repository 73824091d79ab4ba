pub mod cache;
pub mod catalog;
pub mod client;
pub mod config;
pub mod etymology;
pub mod harvest;
pub mod html;
pub mod model;
pub mod origin;
pub mod output;
pub mod rules;
pub mod tcg;
pub mod transport;
pub mod types;
