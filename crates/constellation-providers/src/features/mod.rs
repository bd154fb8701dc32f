pub mod provider_registry;
