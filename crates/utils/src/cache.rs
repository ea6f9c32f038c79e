//! Layer-cache busting for Dagger containers.
//!
//! Dagger memoizes container layers by content: re-running a pipeline with
//! a byte-identical definition replays the cached result. Injecting an
//! environment variable whose name embeds a fresh random token makes the
//! definition unique, so every layer after the injection point is rebuilt.
//!
//! The token source is an explicit capability so tests can substitute a
//! deterministic sequence; production code uses [`RandomTokens`].

use uuid::Uuid;

use crate::container::EnvVariableExt;

/// Name prefix of the injected busting variable. Systems that inspect or
/// filter container environments key off this exact literal.
pub const BUST_CACHE_PREFIX: &str = "_DAGGERVERSE_BUST_CACHE_";

/// A supplier of effectively-unique tokens.
///
/// Implementations must be safe to call from multiple threads and should
/// draw from at least 122 bits of randomness; anything weaker voids the
/// distinctness guarantee of [`bust_cache`].
pub trait TokenSource {
    /// Produce the next token.
    fn token(&self) -> Uuid;
}

/// The default token source: random version-4 UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomTokens;

impl TokenSource for RandomTokens {
    fn token(&self) -> Uuid {
        Uuid::new_v4()
    }
}

/// Create a with-function that busts the Dagger layer cache by adding a
/// random but unique environment variable to the container.
///
/// The variable is named `_DAGGERVERSE_BUST_CACHE_<uuid>` and carries an
/// empty value; everything else in the container is left untouched. A fresh
/// token is drawn on every application, so applying the same with-function
/// twice adds two distinct variables.
///
/// ```
/// use daggerverse_utils::{ContainerSpec, bust_cache};
///
/// let bust = bust_cache();
/// let ctr = bust(ContainerSpec::from_image("alpine"));
/// assert_eq!(ctr.env_variables().len(), 1);
/// ```
pub fn bust_cache<C: EnvVariableExt>() -> impl Fn(C) -> C {
    bust_cache_with(RandomTokens)
}

/// Like [`bust_cache`], with an explicit token source.
pub fn bust_cache_with<C, S>(tokens: S) -> impl Fn(C) -> C
where
    C: EnvVariableExt,
    S: TokenSource,
{
    move |ctr| ctr.with_env_variable(format!("{BUST_CACHE_PREFIX}{}", tokens.token()), "")
}
