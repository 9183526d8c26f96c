pub mod binding;
pub mod config;
pub mod decode;
pub mod dispatch;
pub mod logging;
pub mod patch;
pub mod session;
pub mod state;
pub mod transport;
pub mod types;
pub mod util;

#[cfg(test)]
pub(crate) mod test_support;
