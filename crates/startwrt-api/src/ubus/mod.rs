pub mod client;
pub mod models;
pub mod procedure;
pub mod session;
pub mod uci;
