pub mod connection;
pub mod rooms;
