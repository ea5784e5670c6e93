pub mod gate;
pub mod pending;
pub mod store;

pub use gate::AuthorizationGate;
