pub mod connection;
pub mod dispatcher;
pub mod rooms;
pub mod sessions;

#[cfg(test)]
mod testing;
