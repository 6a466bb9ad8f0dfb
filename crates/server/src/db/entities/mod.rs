//! SeaORM entities for the records the core pipeline reads.

pub mod monitor;
pub mod probe_credential;

pub mod prelude {
    pub use super::monitor::Entity as Monitor;
    pub use super::probe_credential::Entity as ProbeCredential;
}
