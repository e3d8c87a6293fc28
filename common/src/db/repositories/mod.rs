// Repository implementations

pub mod subscription;

pub use subscription::PgBroadcastStore;
