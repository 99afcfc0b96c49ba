pub mod session;
pub mod signing_key;

pub use session::SessionRepository;
pub use signing_key::SigningKeyRepository;

#[cfg(test)]
pub use session::MockSessionRepository;
#[cfg(test)]
pub use signing_key::MockSigningKeyRepository;
