pub mod config;
pub mod docs;
pub mod error;
pub mod keys;
pub mod origin;
pub mod response;

pub mod handlers;
pub mod routes;
pub mod services;
pub mod storage;
pub mod urls;

#[cfg(test)]
pub(crate) mod test_utils;
