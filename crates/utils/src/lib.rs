//! Pipeline-agnostic helpers for Dagger modules.
//!
//! The main export is [`bust_cache`], a with-function factory that defeats
//! Dagger's layer memoization by injecting a uniquely named environment
//! variable into a container definition. [`ContainerSpec`] provides an
//! inspectable, immutable container description for code that builds up a
//! container plan outside of a live Dagger session.

pub mod cache;
pub mod container;

pub use cache::{BUST_CACHE_PREFIX, RandomTokens, TokenSource, bust_cache, bust_cache_with};
pub use container::{CacheMount, ContainerSpec, EnvVariableExt};
