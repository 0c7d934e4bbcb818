pub mod cleanup;
pub mod host;
pub mod instance_management;
pub mod power;
pub mod spec_store;
