pub mod client;

pub use client::LawClient;
