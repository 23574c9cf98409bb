pub mod test_store;

pub use test_store::TestValidatorStore;
