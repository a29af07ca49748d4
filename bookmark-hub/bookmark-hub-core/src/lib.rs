pub mod codec;
pub mod handle;
pub mod platform;
pub mod provider;
pub mod resolver;
pub mod scope;
