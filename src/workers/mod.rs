pub mod channel_gc;
pub mod trust_reconcile;

pub use channel_gc::ChannelGcWorker;
pub use trust_reconcile::TrustReconcileWorker;
